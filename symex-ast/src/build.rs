//! Terse constructors for assembling trees by hand.
//!
//! Front-ends that do not go through JSON, and most tests, build packages with
//! these instead of spelling out the enums.

use crate::*;

pub fn ident(name: &str) -> Expr {
    Expr::new(ExprKind::Ident(name.to_string()))
}

fn lit(kind: LitKind, value: &str) -> Expr {
    Expr::new(ExprKind::BasicLit {
        kind,
        value: value.to_string(),
    })
}

pub fn int(value: &str) -> Expr {
    lit(LitKind::Int, value)
}

pub fn float(value: &str) -> Expr {
    lit(LitKind::Float, value)
}

pub fn imag(value: &str) -> Expr {
    lit(LitKind::Imag, value)
}

pub fn char_lit(value: &str) -> Expr {
    lit(LitKind::Char, value)
}

pub fn string(value: &str) -> Expr {
    lit(LitKind::String, value)
}

pub fn paren(x: Expr) -> Expr {
    Expr::new(ExprKind::Paren(Box::new(x)))
}

pub fn sel(x: Expr, name: &str) -> Expr {
    Expr::new(ExprKind::Selector {
        x: Box::new(x),
        sel: name.to_string(),
    })
}

pub fn index(x: Expr, i: Expr) -> Expr {
    Expr::new(ExprKind::Index {
        x: Box::new(x),
        index: Box::new(i),
    })
}

pub fn slice_expr(x: Expr, low: Option<Expr>, high: Option<Expr>) -> Expr {
    Expr::new(ExprKind::SliceExpr {
        x: Box::new(x),
        low: low.map(Box::new),
        high: high.map(Box::new),
        max: None,
    })
}

pub fn assert_to(x: Expr, ty: TypeExpr) -> Expr {
    Expr::new(ExprKind::TypeAssert {
        x: Box::new(x),
        ty: Some(ty),
    })
}

pub fn call(fun: Expr, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Call {
        fun: Box::new(fun),
        args,
        spread: false,
    })
}

pub fn call_spread(fun: Expr, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Call {
        fun: Box::new(fun),
        args,
        spread: true,
    })
}

pub fn star(x: Expr) -> Expr {
    Expr::new(ExprKind::Star(Box::new(x)))
}

pub fn unary(op: UnaryOp, x: Expr) -> Expr {
    Expr::new(ExprKind::Unary { op, x: Box::new(x) })
}

pub fn addr(x: Expr) -> Expr {
    unary(UnaryOp::Addr, x)
}

pub fn binary(op: BinaryOp, x: Expr, y: Expr) -> Expr {
    Expr::new(ExprKind::Binary {
        op,
        x: Box::new(x),
        y: Box::new(y),
    })
}

pub fn composite(ty: Option<TypeExpr>, elts: Vec<Element>) -> Expr {
    Expr::new(ExprKind::CompositeLit { ty, elts })
}

pub fn elem(value: Expr) -> Element {
    Element { key: None, value }
}

pub fn keyed(key: Expr, value: Expr) -> Element {
    Element {
        key: Some(key),
        value,
    }
}

pub fn func_lit(ty: FuncType, stmts: Vec<Stmt>) -> Expr {
    Expr::new(ExprKind::FuncLit {
        ty,
        body: Block::new(stmts),
    })
}

pub fn type_operand(ty: TypeExpr) -> Expr {
    Expr::new(ExprKind::Type(ty))
}

// types

pub fn named(name: &str) -> TypeExpr {
    TypeExpr::Name(name.to_string())
}

pub fn qualified(package: &str, name: &str) -> TypeExpr {
    TypeExpr::Qualified {
        package: package.to_string(),
        name: name.to_string(),
    }
}

pub fn pointer(t: TypeExpr) -> TypeExpr {
    TypeExpr::Pointer(Box::new(t))
}

pub fn slice_of(t: TypeExpr) -> TypeExpr {
    TypeExpr::Slice(Box::new(t))
}

pub fn array_of(len: Expr, t: TypeExpr) -> TypeExpr {
    TypeExpr::Array {
        len: ArrayLen::Expr(Box::new(len)),
        elem: Box::new(t),
    }
}

pub fn array_inferred(t: TypeExpr) -> TypeExpr {
    TypeExpr::Array {
        len: ArrayLen::Inferred,
        elem: Box::new(t),
    }
}

pub fn map_of(key: TypeExpr, value: TypeExpr) -> TypeExpr {
    TypeExpr::Map {
        key: Box::new(key),
        value: Box::new(value),
    }
}

pub fn chan_of(dir: ChanDir, value: TypeExpr) -> TypeExpr {
    TypeExpr::Chan {
        dir,
        value: Box::new(value),
    }
}

pub fn ellipsis(t: TypeExpr) -> TypeExpr {
    TypeExpr::Ellipsis(Box::new(t))
}

pub fn field(names: &[&str], ty: TypeExpr) -> Field {
    Field {
        names: names.iter().map(|n| n.to_string()).collect(),
        ty,
        tag: None,
    }
}

pub fn embedded(ty: TypeExpr) -> Field {
    Field {
        names: Vec::new(),
        ty,
        tag: None,
    }
}

pub fn struct_of(fields: Vec<Field>) -> TypeExpr {
    TypeExpr::Struct(fields)
}

pub fn interface_of(elems: Vec<InterfaceElem>) -> TypeExpr {
    TypeExpr::Interface(elems)
}

pub fn method_elem(name: &str, ty: FuncType) -> InterfaceElem {
    InterfaceElem::Method {
        name: name.to_string(),
        ty,
    }
}

pub fn func_type(params: Vec<Field>, results: Vec<Field>) -> FuncType {
    FuncType { params, results }
}

/// Unnamed parameters or results.
pub fn types(tys: Vec<TypeExpr>) -> Vec<Field> {
    tys.into_iter().map(embedded).collect()
}

// statements

pub fn expr_stmt(x: Expr) -> Stmt {
    Stmt::Expr(x)
}

pub fn define(names: &[&str], rhs: Vec<Expr>) -> Stmt {
    Stmt::Assign {
        lhs: names.iter().map(|n| ident(n)).collect(),
        tok: AssignTok::Define,
        rhs,
    }
}

pub fn assign(lhs: Vec<Expr>, rhs: Vec<Expr>) -> Stmt {
    Stmt::Assign {
        lhs,
        tok: AssignTok::Assign,
        rhs,
    }
}

pub fn ret(values: Vec<Expr>) -> Stmt {
    Stmt::Return(values)
}

pub fn local_var(names: &[&str], ty: Option<TypeExpr>, values: Vec<Expr>) -> Stmt {
    Stmt::Decl(LocalDecl::Var(value_spec(names, ty, values)))
}

pub fn if_stmt(cond: Expr, then: Vec<Stmt>) -> Stmt {
    Stmt::If {
        init: None,
        cond,
        then: Block::new(then),
        els: None,
    }
}

pub fn range(key: Option<&str>, value: Option<&str>, x: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::Range {
        key: key.map(ident),
        value: value.map(ident),
        define: true,
        x,
        body: Block::new(body),
    }
}

// declarations

pub fn import(path: &str) -> ImportSpec {
    ImportSpec {
        path: path.to_string(),
        name: None,
        pos: None,
    }
}

pub fn import_as(name: &str, path: &str) -> ImportSpec {
    ImportSpec {
        path: path.to_string(),
        name: Some(name.to_string()),
        pos: None,
    }
}

pub fn value_spec(names: &[&str], ty: Option<TypeExpr>, values: Vec<Expr>) -> ValueSpec {
    ValueSpec {
        names: names.iter().map(|n| n.to_string()).collect(),
        ty,
        values,
        pos: None,
    }
}

pub fn type_decl(name: &str, ty: TypeExpr) -> Decl {
    Decl::Type(TypeSpec {
        name: name.to_string(),
        ty,
        alias: false,
        pos: None,
    })
}

pub fn alias_decl(name: &str, ty: TypeExpr) -> Decl {
    Decl::Type(TypeSpec {
        name: name.to_string(),
        ty,
        alias: true,
        pos: None,
    })
}

pub fn var(names: &[&str], ty: Option<TypeExpr>, values: Vec<Expr>) -> Decl {
    Decl::Var(value_spec(names, ty, values))
}

pub fn const_group(specs: Vec<ValueSpec>) -> Decl {
    Decl::Const(ConstGroup { specs })
}

pub fn func(name: &str, ty: FuncType, body: Vec<Stmt>) -> Decl {
    Decl::Func(FuncDecl {
        name: name.to_string(),
        recv: None,
        ty,
        body: Some(Block::new(body)),
        pos: None,
    })
}

pub fn method(recv: Field, name: &str, ty: FuncType, body: Vec<Stmt>) -> Decl {
    Decl::Func(FuncDecl {
        name: name.to_string(),
        recv: Some(recv),
        ty,
        body: Some(Block::new(body)),
        pos: None,
    })
}

/// Declarations are stamped with `file:N` positions in order, starting at 1.
pub fn file(name: &str, imports: Vec<ImportSpec>, decls: Vec<Decl>) -> File {
    let decls = decls
        .into_iter()
        .enumerate()
        .map(|(i, mut d)| {
            let pos = Some(Pos::new(name, i as u32 + 1));
            match &mut d {
                Decl::Type(t) => t.pos = pos,
                Decl::Var(v) => v.pos = pos,
                Decl::Func(f) => f.pos = pos,
                Decl::Const(g) => {
                    for s in &mut g.specs {
                        s.pos = pos.clone();
                    }
                }
            }
            d
        })
        .collect();
    File {
        name: name.to_string(),
        imports,
        decls,
    }
}

pub fn package(path: &str, files: Vec<File>) -> Package {
    Package::new(path, files)
}
