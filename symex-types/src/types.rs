use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::codec::{canonical_methods, serialize_canonical, tagged_function};

/// Package path of the predeclared generic placeholders (`Type`, `Type1`, ...).
pub const BUILTIN_PACKAGE: &str = "builtin";

/// Every type the target language can express.
///
/// Named types are never unfolded here: an [`Type::Identifier`] is the back-edge
/// for recursive and cross-package references and is compared by
/// `(package, name)` only. Interface elements compare as a set.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Type {
    Builtin {
        name: String,
        #[serde(default)]
        untyped: bool,
    },
    Nil,
    Identifier {
        name: String,
        #[serde(default)]
        package: String,
    },
    PackageQualifier {
        path: String,
        name: String,
    },
    Selector {
        prefix: Box<Type>,
        item: String,
    },
    Pointer {
        target: Box<Type>,
    },
    Array {
        element: Box<Type>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        length: Option<u64>,
    },
    Slice {
        element: Box<Type>,
    },
    Map {
        key: Box<Type>,
        value: Box<Type>,
    },
    Channel {
        dir: ChanDir,
        value: Box<Type>,
    },
    Struct {
        fields: Vec<StructField>,
    },
    Interface {
        #[serde(
            serialize_with = "serialize_canonical",
            deserialize_with = "canonical_methods"
        )]
        methods: Vec<InterfaceMethod>,
    },
    Function(FunctionType),
    Method {
        receiver: Box<Type>,
        #[serde(with = "tagged_function")]
        def: FunctionType,
    },
    Ellipsis {
        element: Box<Type>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChanDir {
    Send,
    Recv,
    Bidir,
}

/// Struct field. An empty `name` marks an embedded field.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub def: Type,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl StructField {
    pub fn new(name: impl Into<String>, def: Type) -> Self {
        Self {
            name: name.into(),
            def,
            tag: None,
        }
    }

    pub fn is_embedded(&self) -> bool {
        self.name.is_empty()
    }

    /// Selector name of the field: its own name, or for an embedded field the
    /// name of the embedded type.
    pub fn selector_name(&self) -> Option<&str> {
        if !self.name.is_empty() {
            return Some(&self.name);
        }
        match &self.def {
            Type::Identifier { name, .. } => Some(name),
            Type::Pointer { target } => match target.as_ref() {
                Type::Identifier { name, .. } => Some(name),
                _ => None,
            },
            Type::Builtin { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Interface element. An empty `name` marks an embedded interface whose `def`
/// is the embedded type; otherwise `def` is a [`Type::Function`].
///
/// `package` is only recorded for unexported names, which are distinct per
/// declaring package.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceMethod {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    pub def: Type,
}

impl InterfaceMethod {
    pub fn new(name: impl Into<String>, package: &str, def: Type) -> Self {
        let name = name.into();
        let package = if is_exported(&name) || name.is_empty() {
            None
        } else {
            Some(package.to_string())
        };
        Self { name, package, def }
    }

    pub fn embedded(def: Type) -> Self {
        Self {
            name: String::new(),
            package: None,
            def,
        }
    }

    pub fn is_embedded(&self) -> bool {
        self.name.is_empty()
    }

    fn sort_key(&self) -> (&str, &str) {
        (&self.name, self.package.as_deref().unwrap_or(""))
    }
}

/// Sort interface elements into their canonical order (name, then package).
pub fn canonicalize(methods: &mut [InterfaceMethod]) {
    methods.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// Borrowed view of `methods` in canonical order, leaving the list untouched.
pub fn canonical_order(methods: &[InterfaceMethod]) -> Vec<&InterfaceMethod> {
    let mut view: Vec<&InterfaceMethod> = methods.iter().collect();
    view.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    view
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        use Type::*;
        match (self, other) {
            (Builtin { name: a, untyped: x }, Builtin { name: b, untyped: y }) => a == b && x == y,
            (Nil, Nil) => true,
            (Identifier { name: a, package: p }, Identifier { name: b, package: q }) => a == b && p == q,
            (PackageQualifier { path: p, name: a }, PackageQualifier { path: q, name: b }) => {
                p == q && a == b
            }
            (Selector { prefix: p, item: a }, Selector { prefix: q, item: b }) => p == q && a == b,
            (Pointer { target: a }, Pointer { target: b }) => a == b,
            (Array { element: a, length: m }, Array { element: b, length: n }) => a == b && m == n,
            (Slice { element: a }, Slice { element: b })
            | (Ellipsis { element: a }, Ellipsis { element: b }) => a == b,
            (Map { key: k, value: v }, Map { key: l, value: w }) => k == l && v == w,
            (Channel { dir: d, value: a }, Channel { dir: e, value: b }) => d == e && a == b,
            (Struct { fields: a }, Struct { fields: b }) => a == b,
            (Interface { methods: a }, Interface { methods: b }) => {
                a.len() == b.len() && canonical_order(a) == canonical_order(b)
            }
            (Function(f), Function(g)) => f == g,
            (Method { receiver: r, def: f }, Method { receiver: s, def: g }) => r == s && f == g,
            _ => false,
        }
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Type::Builtin { name, untyped } => {
                name.hash(state);
                untyped.hash(state);
            }
            Type::Nil => {}
            Type::Identifier { name, package } => {
                name.hash(state);
                package.hash(state);
            }
            Type::PackageQualifier { path, name } => {
                path.hash(state);
                name.hash(state);
            }
            Type::Selector { prefix, item } => {
                prefix.hash(state);
                item.hash(state);
            }
            Type::Pointer { target } => target.hash(state),
            Type::Array { element, length } => {
                element.hash(state);
                length.hash(state);
            }
            Type::Slice { element } | Type::Ellipsis { element } => element.hash(state),
            Type::Map { key, value } => {
                key.hash(state);
                value.hash(state);
            }
            Type::Channel { dir, value } => {
                dir.hash(state);
                value.hash(state);
            }
            Type::Struct { fields } => fields.hash(state),
            Type::Interface { methods } => canonical_order(methods).hash(state),
            Type::Function(f) => f.hash(state),
            Type::Method { receiver, def } => {
                receiver.hash(state);
                def.hash(state);
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionType {
    #[serde(default)]
    pub params: Vec<Type>,
    #[serde(default)]
    pub results: Vec<Type>,
    /// The last parameter is a [`Type::Ellipsis`].
    #[serde(default)]
    pub variadic: bool,
}

impl FunctionType {
    pub fn new(params: Vec<Type>, results: Vec<Type>) -> Self {
        let variadic = matches!(params.last(), Some(Type::Ellipsis { .. }));
        Self {
            params,
            results,
            variadic,
        }
    }

    pub fn display(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|t| t.display())
            .collect::<Vec<_>>()
            .join(", ");
        match self.results.as_slice() {
            [] => format!("func({params})"),
            [single] if !matches!(single, Type::Function(_)) => {
                format!("func({params}) {}", single.display())
            }
            many => {
                let results = many
                    .iter()
                    .map(|t| t.display())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("func({params}) ({results})")
            }
        }
    }
}

/// Go-style exportedness: the name starts with an upper-case letter.
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

impl Type {
    pub fn builtin(name: &str) -> Self {
        Type::Builtin {
            name: name.to_string(),
            untyped: false,
        }
    }

    /// Untyped literal family, named after its default type.
    pub fn untyped(name: &str) -> Self {
        Type::Builtin {
            name: name.to_string(),
            untyped: true,
        }
    }

    pub fn ident(package: &str, name: &str) -> Self {
        Type::Identifier {
            name: name.to_string(),
            package: package.to_string(),
        }
    }

    pub fn qualifier(path: &str, name: &str) -> Self {
        Type::PackageQualifier {
            path: path.to_string(),
            name: name.to_string(),
        }
    }

    pub fn pointer(target: Type) -> Self {
        Type::Pointer {
            target: Box::new(target),
        }
    }

    pub fn slice(element: Type) -> Self {
        Type::Slice {
            element: Box::new(element),
        }
    }

    pub fn array(element: Type, length: Option<u64>) -> Self {
        Type::Array {
            element: Box::new(element),
            length,
        }
    }

    pub fn map(key: Type, value: Type) -> Self {
        Type::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn channel(dir: ChanDir, value: Type) -> Self {
        Type::Channel {
            dir,
            value: Box::new(value),
        }
    }

    pub fn ellipsis(element: Type) -> Self {
        Type::Ellipsis {
            element: Box::new(element),
        }
    }

    pub fn function(params: Vec<Type>, results: Vec<Type>) -> Self {
        Type::Function(FunctionType::new(params, results))
    }

    pub fn method(receiver: Type, def: FunctionType) -> Self {
        Type::Method {
            receiver: Box::new(receiver),
            def,
        }
    }

    pub fn structure(fields: Vec<StructField>) -> Self {
        Type::Struct { fields }
    }

    /// Interface with its elements brought into canonical order.
    pub fn interface(mut methods: Vec<InterfaceMethod>) -> Self {
        canonicalize(&mut methods);
        Type::Interface { methods }
    }

    pub fn empty_interface() -> Self {
        Type::Interface {
            methods: Vec::new(),
        }
    }

    pub fn is_untyped(&self) -> bool {
        matches!(self, Type::Builtin { untyped: true, .. })
    }

    pub fn is_named(&self) -> bool {
        matches!(self, Type::Identifier { .. })
    }

    /// Typed form of an untyped family; any other type is returned unchanged.
    pub fn defaulted(&self) -> Type {
        match self {
            Type::Builtin {
                name,
                untyped: true,
            } => Type::builtin(name),
            other => other.clone(),
        }
    }

    /// The function signature behind a function or method type.
    pub fn signature(&self) -> Option<&FunctionType> {
        match self {
            Type::Function(f) => Some(f),
            Type::Method { def, .. } => Some(def),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Type::Builtin { .. } => "builtin",
            Type::Nil => "nil",
            Type::Identifier { .. } => "identifier",
            Type::PackageQualifier { .. } => "packagequalifier",
            Type::Selector { .. } => "selector",
            Type::Pointer { .. } => "pointer",
            Type::Array { .. } => "array",
            Type::Slice { .. } => "slice",
            Type::Map { .. } => "map",
            Type::Channel { .. } => "channel",
            Type::Struct { .. } => "struct",
            Type::Interface { .. } => "interface",
            Type::Function(_) => "function",
            Type::Method { .. } => "method",
            Type::Ellipsis { .. } => "ellipsis",
        }
    }

    /// Render in target-language syntax.
    pub fn display(&self) -> String {
        match self {
            Type::Builtin { name, untyped } => {
                if *untyped {
                    format!("untyped {name}")
                } else {
                    name.clone()
                }
            }
            Type::Nil => "nil".to_string(),
            Type::Identifier { name, package } => {
                if package.is_empty() {
                    name.clone()
                } else {
                    format!("{package}.{name}")
                }
            }
            Type::PackageQualifier { path, name } => format!("package {name} (\"{path}\")"),
            Type::Selector { prefix, item } => format!("{}.{item}", prefix.display()),
            Type::Pointer { target } => format!("*{}", target.display()),
            Type::Array { element, length } => match length {
                Some(n) => format!("[{n}]{}", element.display()),
                None => format!("[?]{}", element.display()),
            },
            Type::Slice { element } => format!("[]{}", element.display()),
            Type::Map { key, value } => format!("map[{}]{}", key.display(), value.display()),
            Type::Channel { dir, value } => match dir {
                ChanDir::Send => format!("chan<- {}", value.display()),
                ChanDir::Recv => format!("<-chan {}", value.display()),
                ChanDir::Bidir => format!("chan {}", value.display()),
            },
            Type::Struct { fields } => {
                if fields.is_empty() {
                    return "struct{}".to_string();
                }
                let body = fields
                    .iter()
                    .map(|f| {
                        if f.is_embedded() {
                            f.def.display()
                        } else {
                            format!("{} {}", f.name, f.def.display())
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                format!("struct{{ {body} }}")
            }
            Type::Interface { methods } => {
                if methods.is_empty() {
                    return "interface{}".to_string();
                }
                let body = methods
                    .iter()
                    .map(|m| {
                        if m.is_embedded() {
                            m.def.display()
                        } else {
                            let sig = m.def.display();
                            format!("{}{}", m.name, sig.strip_prefix("func").unwrap_or(&sig))
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                format!("interface{{ {body} }}")
            }
            Type::Function(f) => f.display(),
            Type::Method { receiver, def } => {
                let sig = def.display();
                format!(
                    "func ({}) {}",
                    receiver.display(),
                    sig.strip_prefix("func").unwrap_or(&sig)
                )
            }
            Type::Ellipsis { element } => format!("...{}", element.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_constructor_sorts_methods() {
        let f = Type::function(vec![], vec![]);
        let i = Type::interface(vec![
            InterfaceMethod::new("b", "p", f.clone()),
            InterfaceMethod::new("A", "p", f.clone()),
            InterfaceMethod::new("b", "o", f.clone()),
        ]);
        let Type::Interface { methods } = i else {
            panic!("expected interface");
        };
        let keys: Vec<_> = methods
            .iter()
            .map(|m| (m.name.as_str(), m.package.as_deref()))
            .collect();
        assert_eq!(keys, vec![("A", None), ("b", Some("o")), ("b", Some("p"))]);
    }

    #[test]
    fn interface_equality_ignores_element_order() {
        use std::collections::hash_map::DefaultHasher;

        let f = Type::function(vec![], vec![]);
        let z = InterfaceMethod::new("Z", "p", f.clone());
        let a = InterfaceMethod::new("A", "p", f.clone());
        let raw = Type::Interface {
            methods: vec![z.clone(), a.clone()],
        };
        let sorted = Type::interface(vec![z.clone(), a]);
        assert_eq!(raw, sorted);

        let digest = |t: &Type| {
            let mut h = DefaultHasher::new();
            t.hash(&mut h);
            h.finish()
        };
        assert_eq!(digest(&raw), digest(&sorted));
        assert_ne!(raw, Type::interface(vec![z]));
    }

    #[test]
    fn display_reads_like_source() {
        let t = Type::function(
            vec![Type::builtin("int"), Type::ellipsis(Type::builtin("string"))],
            vec![Type::pointer(Type::ident("q", "T")), Type::builtin("error")],
        );
        assert_eq!(t.display(), "func(int, ...string) (*q.T, error)");
        assert_eq!(
            Type::channel(ChanDir::Recv, Type::untyped("int")).display(),
            "<-chan untyped int"
        );
    }

    #[test]
    fn variadic_follows_last_param() {
        let f = FunctionType::new(vec![Type::ellipsis(Type::builtin("int"))], vec![]);
        assert!(f.variadic);
        assert!(!FunctionType::new(vec![Type::builtin("int")], vec![]).variadic);
    }
}
