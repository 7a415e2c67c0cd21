#![forbid(unsafe_code)]

//! Syntax tree handed over by the front-end.
//!
//! The extractor never lexes or parses source itself. A front-end produces one
//! [`Package`] per target-language package (either directly through the
//! [`build`] helpers or as a JSON document) and the core walks it.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

pub mod build;

/// Opaque `(file, line)` position.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pos {
    pub file: String,
    pub line: u32,
}

impl Pos {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    pub fn display(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }
}

/// Identity of an expression node. Resolved types are reported against it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExprId(pub u32);

static NEXT_EXPR_ID: AtomicU32 = AtomicU32::new(1);

impl ExprId {
    /// Allocate a process-unique id.
    pub fn fresh() -> Self {
        ExprId(NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Package {
    /// Fully qualified import path.
    pub path: String,
    pub files: Vec<File>,
}

impl Package {
    pub fn new(path: impl Into<String>, files: Vec<File>) -> Self {
        Self {
            path: path.into(),
            files,
        }
    }

    /// Distinct import paths over all files, sorted.
    pub fn imports(&self) -> BTreeSet<String> {
        self.files
            .iter()
            .flat_map(|f| f.imports.iter().map(|i| i.path.clone()))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub name: String,
    #[serde(default)]
    pub imports: Vec<ImportSpec>,
    #[serde(default)]
    pub decls: Vec<Decl>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImportSpec {
    pub path: String,
    /// Explicit local name, `_` or `.`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pos: Option<Pos>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decl {
    Type(TypeSpec),
    Const(ConstGroup),
    Var(ValueSpec),
    Func(FuncDecl),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeSpec {
    pub name: String,
    pub ty: TypeExpr,
    /// `type A = B`
    #[serde(default)]
    pub alias: bool,
    #[serde(default)]
    pub pos: Option<Pos>,
}

/// A parenthesised `const ( ... )` block. Specs without values repeat the
/// previous value list; `iota` is the index of the value spec within the group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstGroup {
    pub specs: Vec<ValueSpec>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueSpec {
    pub names: Vec<String>,
    #[serde(default)]
    pub ty: Option<TypeExpr>,
    #[serde(default)]
    pub values: Vec<Expr>,
    #[serde(default)]
    pub pos: Option<Pos>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FuncDecl {
    pub name: String,
    #[serde(default)]
    pub recv: Option<Field>,
    pub ty: FuncType,
    #[serde(default)]
    pub body: Option<Block>,
    #[serde(default)]
    pub pos: Option<Pos>,
}

/// Struct field, parameter, result or receiver. Empty `names` means an
/// anonymous (embedded or unnamed) entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    #[serde(default)]
    pub names: Vec<String>,
    pub ty: TypeExpr,
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FuncType {
    #[serde(default)]
    pub params: Vec<Field>,
    #[serde(default)]
    pub results: Vec<Field>,
}

impl FuncType {
    /// Results are named when at least one result field carries a name.
    pub fn has_named_results(&self) -> bool {
        self.results.iter().any(|f| !f.names.is_empty())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChanDir {
    Send,
    Recv,
    Both,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayLen {
    Expr(Box<Expr>),
    /// `[...]T`, only valid as a composite literal type.
    Inferred,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeExpr {
    Name(String),
    Qualified { package: String, name: String },
    Pointer(Box<TypeExpr>),
    Array { len: ArrayLen, elem: Box<TypeExpr> },
    Slice(Box<TypeExpr>),
    Map { key: Box<TypeExpr>, value: Box<TypeExpr> },
    Chan { dir: ChanDir, value: Box<TypeExpr> },
    Func(FuncType),
    Struct(Vec<Field>),
    Interface(Vec<InterfaceElem>),
    Ellipsis(Box<TypeExpr>),
    Paren(Box<TypeExpr>),
}

impl TypeExpr {
    pub fn node_name(&self) -> &'static str {
        match self {
            TypeExpr::Name(_) => "Ident",
            TypeExpr::Qualified { .. } => "SelectorExpr",
            TypeExpr::Pointer(_) => "StarExpr",
            TypeExpr::Array { .. } => "ArrayType",
            TypeExpr::Slice(_) => "ArrayType",
            TypeExpr::Map { .. } => "MapType",
            TypeExpr::Chan { .. } => "ChanType",
            TypeExpr::Func(_) => "FuncType",
            TypeExpr::Struct(_) => "StructType",
            TypeExpr::Interface(_) => "InterfaceType",
            TypeExpr::Ellipsis(_) => "Ellipsis",
            TypeExpr::Paren(_) => "ParenExpr",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceElem {
    Method { name: String, ty: FuncType },
    Embedded(TypeExpr),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    #[serde(default = "ExprId::fresh")]
    pub id: ExprId,
    #[serde(default)]
    pub pos: Option<Pos>,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            id: ExprId::fresh(),
            pos: None,
            kind,
        }
    }

    pub fn at(mut self, pos: Pos) -> Self {
        self.pos = Some(pos);
        self
    }

    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Strip any number of enclosing parentheses.
    pub fn unparen(&self) -> &Expr {
        match &self.kind {
            ExprKind::Paren(inner) => inner.unparen(),
            _ => self,
        }
    }

    pub fn node_name(&self) -> &'static str {
        match &self.kind {
            ExprKind::Ident(_) => "Ident",
            ExprKind::BasicLit { .. } => "BasicLit",
            ExprKind::CompositeLit { .. } => "CompositeLit",
            ExprKind::FuncLit { .. } => "FuncLit",
            ExprKind::Paren(_) => "ParenExpr",
            ExprKind::Selector { .. } => "SelectorExpr",
            ExprKind::Index { .. } => "IndexExpr",
            ExprKind::SliceExpr { .. } => "SliceExpr",
            ExprKind::TypeAssert { .. } => "TypeAssertExpr",
            ExprKind::Call { .. } => "CallExpr",
            ExprKind::Star(_) => "StarExpr",
            ExprKind::Unary { .. } => "UnaryExpr",
            ExprKind::Binary { .. } => "BinaryExpr",
            ExprKind::Type(t) => t.node_name(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LitKind {
    Int,
    Float,
    Imag,
    Char,
    String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// `&x`
    Addr,
    /// `<-x`
    Recv,
    Not,
    Neg,
    Plus,
    /// `^x`
    Complement,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Addr => "&",
            UnaryOp::Recv => "<-",
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Complement => "^",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Quo,
    Rem,
    And,
    Or,
    Xor,
    AndNot,
    Shl,
    Shr,
    LAnd,
    LOr,
    Eql,
    Neq,
    Lss,
    Leq,
    Gtr,
    Geq,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Quo => "/",
            BinaryOp::Rem => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::AndNot => "&^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::LAnd => "&&",
            BinaryOp::LOr => "||",
            BinaryOp::Eql => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Lss => "<",
            BinaryOp::Leq => "<=",
            BinaryOp::Gtr => ">",
            BinaryOp::Geq => ">=",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eql | BinaryOp::Neq | BinaryOp::Lss | BinaryOp::Leq | BinaryOp::Gtr | BinaryOp::Geq
        )
    }

    /// `==` and `!=` only need comparable operands; the rest need ordered ones.
    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOp::Eql | BinaryOp::Neq)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::LAnd | BinaryOp::LOr)
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr)
    }

    /// Operators restricted to integer operands.
    pub fn is_integer_only(self) -> bool {
        matches!(
            self,
            BinaryOp::Rem | BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::AndNot
        ) || self.is_shift()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    Ident(String),
    BasicLit {
        kind: LitKind,
        value: String,
    },
    /// `ty` is absent for elided literals nested in another composite literal.
    CompositeLit {
        #[serde(default)]
        ty: Option<TypeExpr>,
        #[serde(default)]
        elts: Vec<Element>,
    },
    FuncLit {
        ty: FuncType,
        body: Block,
    },
    Paren(Box<Expr>),
    Selector {
        x: Box<Expr>,
        sel: String,
    },
    Index {
        x: Box<Expr>,
        index: Box<Expr>,
    },
    SliceExpr {
        x: Box<Expr>,
        #[serde(default)]
        low: Option<Box<Expr>>,
        #[serde(default)]
        high: Option<Box<Expr>>,
        #[serde(default)]
        max: Option<Box<Expr>>,
    },
    /// `ty == None` is the `x.(type)` form of a type switch guard.
    TypeAssert {
        x: Box<Expr>,
        #[serde(default)]
        ty: Option<TypeExpr>,
    },
    Call {
        fun: Box<Expr>,
        #[serde(default)]
        args: Vec<Expr>,
        /// Trailing `...` on the last argument.
        #[serde(default)]
        spread: bool,
    },
    /// `*x`: dereference, or a pointer type when `x` denotes a type.
    Star(Box<Expr>),
    Unary {
        op: UnaryOp,
        x: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        x: Box<Expr>,
        y: Box<Expr>,
    },
    /// Type syntax in operand position, e.g. the callee of `[]byte(s)`.
    Type(TypeExpr),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Element {
    #[serde(default)]
    pub key: Option<Expr>,
    pub value: Expr,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self { stmts }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignTok {
    /// `=`
    Assign,
    /// `:=`
    Define,
    /// `op=`
    Op(BinaryOp),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchKind {
    Break,
    Continue,
    Goto,
    Fallthrough,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalDecl {
    Var(ValueSpec),
    Const(ConstGroup),
    Type(TypeSpec),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaseClause {
    /// Empty for `default`.
    #[serde(default)]
    pub exprs: Vec<Expr>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeCaseClause {
    /// Empty for `default`; `TypeExpr::Name("nil")` stands for `case nil`.
    #[serde(default)]
    pub types: Vec<TypeExpr>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommClause {
    /// Send or receive statement; `None` for `default`.
    #[serde(default)]
    pub comm: Option<Box<Stmt>>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stmt {
    Expr(Expr),
    Assign {
        lhs: Vec<Expr>,
        tok: AssignTok,
        rhs: Vec<Expr>,
    },
    Decl(LocalDecl),
    IncDec {
        x: Expr,
        inc: bool,
    },
    Send {
        chan: Expr,
        value: Expr,
    },
    Return(Vec<Expr>),
    Block(Block),
    If {
        #[serde(default)]
        init: Option<Box<Stmt>>,
        cond: Expr,
        then: Block,
        #[serde(default)]
        els: Option<Box<Stmt>>,
    },
    For {
        #[serde(default)]
        init: Option<Box<Stmt>>,
        #[serde(default)]
        cond: Option<Expr>,
        #[serde(default)]
        post: Option<Box<Stmt>>,
        body: Block,
    },
    Range {
        #[serde(default)]
        key: Option<Expr>,
        #[serde(default)]
        value: Option<Expr>,
        #[serde(default)]
        define: bool,
        x: Expr,
        body: Block,
    },
    Switch {
        #[serde(default)]
        init: Option<Box<Stmt>>,
        #[serde(default)]
        tag: Option<Expr>,
        clauses: Vec<CaseClause>,
    },
    TypeSwitch {
        #[serde(default)]
        init: Option<Box<Stmt>>,
        /// `v` in `switch v := x.(type)`.
        #[serde(default)]
        bind: Option<String>,
        x: Expr,
        clauses: Vec<TypeCaseClause>,
    },
    Select(Vec<CommClause>),
    Go(Expr),
    Defer(Expr),
    Labeled {
        label: String,
        stmt: Box<Stmt>,
    },
    Branch {
        kind: BranchKind,
        #[serde(default)]
        label: Option<String>,
    },
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_document_uses_defaults() {
        let text = r#"{"path":"p","files":[{"name":"a.go","decls":[
            {"var":{"names":["x"],"values":[{"kind":{"ident":"y"}}]}}
        ]}]}"#;
        let pkg: Package = serde_json::from_str(text).expect("valid document");
        assert_eq!(pkg.files[0].imports, vec![]);
        let Decl::Var(spec) = &pkg.files[0].decls[0] else {
            panic!("expected a var declaration");
        };
        assert_eq!(spec.ty, None);
        assert_eq!(spec.values[0].kind, ExprKind::Ident("y".into()));
        assert_ne!(spec.values[0].id, ExprId(0));
    }

    #[test]
    fn imports_are_distinct_and_sorted() {
        use build::{file, import, import_as, package};
        let pkg = package(
            "p",
            vec![
                file("a.go", vec![import("strings"), import("fmt")], vec![]),
                file("b.go", vec![import_as("f", "fmt")], vec![]),
            ],
        );
        let imports: Vec<String> = pkg.imports().into_iter().collect();
        assert_eq!(imports, vec!["fmt".to_string(), "strings".to_string()]);
    }
}
