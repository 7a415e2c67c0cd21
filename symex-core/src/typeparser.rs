//! Declaration-level type syntax to type model.

use symex_ast::{ArrayLen, BinaryOp, ChanDir as AstChanDir, Expr, ExprKind, Field, FuncType, InterfaceElem, LitKind, TypeExpr};
use symex_types::{ChanDir, FunctionType, InterfaceMethod, StructField, Type, BUILTIN_PACKAGE};

use crate::error::{ErrorKind, ResolveError, Warning, WarningKind};

/// Name resolution used while parsing types.
pub trait TypeNames {
    /// Unqualified type name.
    fn type_name(&self, name: &str) -> Result<Type, ResolveError>;

    /// `qualifier.name`, where `qualifier` is a file-local package name.
    fn qualified_type(&self, qualifier: &str, name: &str) -> Result<Type, ResolveError>;
}

pub struct TypeParser<'a> {
    package: &'a str,
    names: &'a dyn TypeNames,
    symbol: String,
    warnings: Vec<Warning>,
    references: Vec<(String, String)>,
}

impl<'a> TypeParser<'a> {
    pub fn new(package: &'a str, names: &'a dyn TypeNames) -> Self {
        Self {
            package,
            names,
            symbol: String::new(),
            warnings: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Name of the declaration being parsed, used in warnings.
    pub fn for_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    /// `(package, name)` of every qualified type reference parsed so far.
    pub fn take_references(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.references)
    }

    pub fn parse(&mut self, t: &TypeExpr) -> Result<Type, ResolveError> {
        match t {
            TypeExpr::Name(name) => {
                let resolved = self.names.type_name(name)?;
                // Dot imports make foreign names look local.
                if let Type::Identifier { package, name } = &resolved {
                    if package != self.package && !package.is_empty() && package != BUILTIN_PACKAGE {
                        self.references.push((package.clone(), name.clone()));
                    }
                }
                Ok(resolved)
            }
            TypeExpr::Qualified { package, name } => {
                let resolved = self.names.qualified_type(package, name)?;
                if let Type::Identifier { package, name } = &resolved {
                    self.references.push((package.clone(), name.clone()));
                }
                Ok(resolved)
            }
            TypeExpr::Pointer(inner) => Ok(Type::pointer(self.parse(inner)?)),
            TypeExpr::Array { len, elem } => match len {
                ArrayLen::Expr(e) => {
                    let element = self.parse(elem)?;
                    let length = const_length(e);
                    if length.is_none() {
                        self.warnings.push(Warning::new(
                            WarningKind::ArrayLength,
                            self.symbol.clone(),
                            format!("array length of [?]{} is not a constant literal", element.display()),
                        ));
                    }
                    Ok(Type::array(element, length))
                }
                ArrayLen::Inferred => Err(grammar(t, "[...] array outside a composite literal")),
            },
            TypeExpr::Slice(inner) => Ok(Type::slice(self.parse(inner)?)),
            TypeExpr::Map { key, value } => Ok(Type::map(self.parse(key)?, self.parse(value)?)),
            TypeExpr::Chan { dir, value } => {
                let dir = match dir {
                    AstChanDir::Send => ChanDir::Send,
                    AstChanDir::Recv => ChanDir::Recv,
                    AstChanDir::Both => ChanDir::Bidir,
                };
                Ok(Type::channel(dir, self.parse(value)?))
            }
            TypeExpr::Func(f) => Ok(Type::Function(self.parse_signature(f)?)),
            TypeExpr::Struct(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                for field in fields {
                    let def = self.parse(&field.ty)?;
                    if field.names.is_empty() {
                        out.push(StructField {
                            name: String::new(),
                            def,
                            tag: field.tag.clone(),
                        });
                    } else {
                        for name in &field.names {
                            out.push(StructField {
                                name: name.clone(),
                                def: def.clone(),
                                tag: field.tag.clone(),
                            });
                        }
                    }
                }
                Ok(Type::structure(out))
            }
            TypeExpr::Interface(elems) => {
                let mut methods = Vec::with_capacity(elems.len());
                for elem in elems {
                    match elem {
                        InterfaceElem::Method { name, ty } => {
                            let sig = self.parse_signature(ty)?;
                            methods.push(InterfaceMethod::new(name.clone(), self.package, Type::Function(sig)));
                        }
                        InterfaceElem::Embedded(inner) => {
                            methods.push(InterfaceMethod::embedded(self.parse(inner)?));
                        }
                    }
                }
                Ok(Type::interface(methods))
            }
            TypeExpr::Ellipsis(_) => Err(grammar(t, "variadic marker outside a parameter list")),
            TypeExpr::Paren(inner) => self.parse(inner),
        }
    }

    /// Composite literal type; `[...]T` takes its length from the literal.
    pub fn parse_literal(&mut self, t: &TypeExpr, elements: u64) -> Result<Type, ResolveError> {
        match t {
            TypeExpr::Array {
                len: ArrayLen::Inferred,
                elem,
            } => Ok(Type::array(self.parse(elem)?, Some(elements))),
            TypeExpr::Paren(inner) => self.parse_literal(inner, elements),
            other => self.parse(other),
        }
    }

    pub fn parse_signature(&mut self, f: &FuncType) -> Result<FunctionType, ResolveError> {
        let mut params = Vec::new();
        for (i, field) in f.params.iter().enumerate() {
            match &field.ty {
                TypeExpr::Ellipsis(inner) => {
                    if i + 1 != f.params.len() || field.names.len() > 1 {
                        return Err(grammar(&field.ty, "can only use ... with final parameter"));
                    }
                    params.push(Type::ellipsis(self.parse(inner)?));
                }
                _ => self.push_fields(field, &mut params)?,
            }
        }
        let mut results = Vec::new();
        for field in &f.results {
            self.push_fields(field, &mut results)?;
        }
        Ok(FunctionType::new(params, results))
    }

    /// A receiver must denote `T` or `*T` for a named type `T`.
    pub fn parse_receiver(&mut self, recv: &Field) -> Result<Type, ResolveError> {
        let t = self.parse(&recv.ty)?;
        crate::table::receiver_type_name(&t)?;
        Ok(t)
    }

    /// Each name of a multi-name field repeats the field type.
    fn push_fields(&mut self, field: &Field, out: &mut Vec<Type>) -> Result<(), ResolveError> {
        let t = self.parse(&field.ty)?;
        let n = field.names.len().max(1);
        out.extend(std::iter::repeat_n(t, n));
        Ok(())
    }
}

fn grammar(t: &TypeExpr, what: &str) -> ResolveError {
    ResolveError::new(
        ErrorKind::Grammar,
        t.node_name(),
        format!("unexpected {}: {what}", t.node_name()),
    )
}

/// Value of a constant array-length expression built from integer literals.
pub fn const_length(e: &Expr) -> Option<u64> {
    match &e.kind {
        ExprKind::BasicLit {
            kind: LitKind::Int,
            value,
        } => parse_int_literal(value),
        ExprKind::Paren(inner) => const_length(inner),
        ExprKind::Binary { op, x, y } => {
            let (x, y) = (const_length(x)?, const_length(y)?);
            match op {
                BinaryOp::Add => x.checked_add(y),
                BinaryOp::Sub => x.checked_sub(y),
                BinaryOp::Mul => x.checked_mul(y),
                BinaryOp::Quo => x.checked_div(y),
                BinaryOp::Rem => x.checked_rem(y),
                BinaryOp::Shl => u32::try_from(y).ok().and_then(|s| x.checked_shl(s)),
                BinaryOp::Shr => u32::try_from(y).ok().and_then(|s| x.checked_shr(s)),
                BinaryOp::And => Some(x & y),
                BinaryOp::Or => Some(x | y),
                BinaryOp::Xor => Some(x ^ y),
                BinaryOp::AndNot => Some(x & !y),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Decimal, hex, octal and binary integer literals, with `_` separators.
pub fn parse_int_literal(text: &str) -> Option<u64> {
    let clean: String = text.chars().filter(|&c| c != '_').collect();
    let lower = clean.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        u64::from_str_radix(bin, 2).ok()
    } else if let Some(oct) = lower.strip_prefix("0o") {
        u64::from_str_radix(oct, 8).ok()
    } else if lower.len() > 1 && lower.starts_with('0') {
        u64::from_str_radix(&lower[1..], 8).ok()
    } else {
        lower.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symex_ast::build::*;

    #[test]
    fn integer_literal_bases() {
        assert_eq!(parse_int_literal("1_000"), Some(1000));
        assert_eq!(parse_int_literal("0x1F"), Some(31));
        assert_eq!(parse_int_literal("0b101"), Some(5));
        assert_eq!(parse_int_literal("017"), Some(15));
        assert_eq!(parse_int_literal("0o17"), Some(15));
        assert_eq!(parse_int_literal("0"), Some(0));
        assert_eq!(parse_int_literal("1.5"), None);
    }

    /// `Local` and builtins resolve here; anything else comes from a dot import of `q`.
    struct DotImport;

    impl TypeNames for DotImport {
        fn type_name(&self, name: &str) -> Result<Type, ResolveError> {
            Ok(match name {
                "Local" => Type::ident("p", "Local"),
                "int" | "string" => Type::builtin(name),
                other => Type::ident("q", other),
            })
        }

        fn qualified_type(&self, qualifier: &str, name: &str) -> Result<Type, ResolveError> {
            Ok(Type::ident(qualifier, name))
        }
    }

    #[test]
    fn dot_imported_type_names_are_references() {
        let names = DotImport;
        let mut parser = TypeParser::new("p", &names);
        parser
            .parse(&map_of(named("Point"), slice_of(named("Local"))))
            .expect("map");
        parser.parse(&named("int")).expect("int");
        assert_eq!(
            parser.take_references(),
            vec![("q".to_string(), "Point".to_string())]
        );
    }

    #[test]
    fn embedded_and_named_fields() {
        let names = DotImport;
        let mut parser = TypeParser::new("p", &names);
        let t = parser
            .parse(&struct_of(vec![
                embedded(named("Local")),
                field(&["a", "b"], named("string")),
            ]))
            .expect("struct");
        let Type::Struct { fields } = t else {
            panic!("expected struct");
        };
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["", "a", "b"]);
        assert_eq!(fields[0].def, Type::ident("p", "Local"));
        assert_eq!(fields[2].def, Type::builtin("string"));
    }

    #[test]
    fn constant_lengths_fold() {
        let e = binary(BinaryOp::Shl, int("1"), paren(binary(BinaryOp::Add, int("2"), int("1"))));
        assert_eq!(const_length(&e), Some(8));
        assert_eq!(const_length(&ident("N")), None);
    }
}
