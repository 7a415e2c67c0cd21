use std::path::PathBuf;

use miette::Diagnostic;
use symex_core::ResolveError;
use symex_types::FormatError;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("cannot access {}", path.display())]
    #[diagnostic(code(symex::catalog::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed catalog {}", path.display())]
    #[diagnostic(code(symex::catalog::format))]
    Format {
        path: PathBuf,
        #[source]
        #[diagnostic_source]
        source: FormatError,
    },

    #[error("inconsistent catalog for package `{package}`")]
    #[diagnostic(code(symex::catalog::table))]
    Table {
        package: String,
        #[source]
        #[diagnostic_source]
        source: ResolveError,
    },

    #[error("no catalog for package `{0}`")]
    #[diagnostic(
        code(symex::catalog::missing),
        help("extract the package first, or check --symbol-table-dir and --builtin-version")
    )]
    Missing(String),

    #[error("`{0}` is not a valid package path")]
    #[diagnostic(code(symex::catalog::package_path))]
    PackagePath(String),

    #[error("cgo side-table describes package `{0}`, expected `C`")]
    #[diagnostic(code(symex::catalog::cgo))]
    CgoPackage(String),

    #[error("invalid configuration {}: {message}", path.display())]
    #[diagnostic(code(symex::catalog::config))]
    Config { path: PathBuf, message: String },
}

impl CatalogError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CatalogError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, source: FormatError) -> Self {
        CatalogError::Format {
            path: path.into(),
            source,
        }
    }
}
