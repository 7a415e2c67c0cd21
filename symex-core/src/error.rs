use std::fmt;

use miette::Diagnostic;
use serde::Serialize;
use symex_types::FormatError;
use thiserror::Error;

/// Category of a per-declaration resolution failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    NotFound,
    AmbiguousSelector,
    ArityMismatch,
    KindMismatch,
    IncompatibleTypes,
    CyclicType,
    UnresolvedSymbol,
    Grammar,
    DuplicateSymbol,
}

impl ErrorKind {
    pub fn tag(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not-found",
            ErrorKind::AmbiguousSelector => "ambiguous-selector",
            ErrorKind::ArityMismatch => "arity-mismatch",
            ErrorKind::KindMismatch => "kind-mismatch",
            ErrorKind::IncompatibleTypes => "incompatible-types",
            ErrorKind::CyclicType => "cyclic-type",
            ErrorKind::UnresolvedSymbol => "unresolved-symbol",
            ErrorKind::Grammar => "grammar",
            ErrorKind::DuplicateSymbol => "duplicate-symbol",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Recoverable failure. Recorded against a declaration; extraction goes on.
#[derive(Clone, Debug, PartialEq, Eq, Error, Diagnostic, Serialize)]
#[error("{kind}: {message}")]
#[diagnostic(code(symex::resolve))]
pub struct ResolveError {
    pub kind: ErrorKind,
    pub message: String,
    /// Offending symbol.
    pub symbol: String,
    pub pos: Option<String>,
}

impl ResolveError {
    pub fn new(kind: ErrorKind, symbol: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            symbol: symbol.into(),
            pos: None,
        }
    }

    pub fn not_found(symbol: &str) -> Self {
        Self::new(ErrorKind::NotFound, symbol, format!("undefined: {symbol}"))
    }

    pub fn at(mut self, pos: Option<String>) -> Self {
        if self.pos.is_none() {
            self.pos = pos;
        }
        self
    }
}

/// A resolution error tied to the top-level declaration it was found in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeclError {
    pub declaration: String,
    pub error: ResolveError,
}

impl DeclError {
    pub fn display(&self) -> String {
        match &self.error.pos {
            Some(pos) => format!("{pos}: {} (in {})", self.error, self.declaration),
            None => format!("{} (in {})", self.error, self.declaration),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    ArrayLength,
    UntypedConstant,
}

/// Attached to a declaration without marking it incomplete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    pub symbol: String,
    pub pos: Option<String>,
}

impl Warning {
    pub fn new(kind: WarningKind, symbol: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            symbol: symbol.into(),
            pos: None,
        }
    }

    pub fn display(&self) -> String {
        let tag = match self.kind {
            WarningKind::ArrayLength => "array-length",
            WarningKind::UntypedConstant => "untyped-constant",
        };
        match &self.pos {
            Some(pos) => format!("{pos}: warning {tag}: {} ({})", self.message, self.symbol),
            None => format!("warning {tag}: {} ({})", self.message, self.symbol),
        }
    }
}

/// Aborts extraction of one package.
#[derive(Debug, Error, Diagnostic)]
pub enum FatalError {
    #[error("invalid input: {0}")]
    #[diagnostic(code(symex::input))]
    InvalidInput(String),

    #[error("missing dependency: no symbol table for package `{0}`")]
    #[diagnostic(
        code(symex::missing_dependency),
        help("extract the dependency first or point --symbol-table-dir at its catalog")
    )]
    MissingDependency(String),

    #[error("unsupported builtin version `{0}`")]
    #[diagnostic(code(symex::builtin_version))]
    BuiltinVersion(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Format(#[from] FormatError),
}
