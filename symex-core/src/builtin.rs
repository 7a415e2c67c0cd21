use symex_types::{FunctionType, InterfaceMethod, SymbolDef, Type, BUILTIN_PACKAGE};

use crate::error::FatalError;
use crate::table::{SymbolKind, SymbolTable};

pub const UNSAFE_PACKAGE: &str = "unsafe";

/// Release of the target language the builtin scope is modelled on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuiltinVersion {
    pub major: u32,
    pub minor: u32,
}

impl Default for BuiltinVersion {
    fn default() -> Self {
        Self::LATEST
    }
}

impl BuiltinVersion {
    pub const LATEST: BuiltinVersion = BuiltinVersion { major: 1, minor: 22 };

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Accepts `1.21`, `1.21.4` and `go1.21`.
    pub fn parse(text: &str) -> Result<Self, FatalError> {
        let trimmed = text.trim();
        let digits = trimmed.strip_prefix("go").unwrap_or(trimmed);
        let mut parts = digits.split('.');
        let major = parts.next().and_then(|p| p.parse::<u32>().ok());
        let minor = parts.next().and_then(|p| p.parse::<u32>().ok());
        match (major, minor) {
            (Some(major), Some(minor)) if major == 1 && parts.all(|p| p.parse::<u32>().is_ok()) => {
                Ok(Self { major, minor })
            }
            _ => Err(FatalError::BuiltinVersion(text.to_string())),
        }
    }

    pub fn display(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        *self >= BuiltinVersion::new(major, minor)
    }
}

/// Predeclared functions. Their calls are typed by name, not by signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinFunc {
    Append,
    Cap,
    Clear,
    Close,
    Complex,
    Copy,
    Delete,
    Imag,
    Len,
    Make,
    Max,
    Min,
    New,
    Panic,
    Print,
    Println,
    Real,
    Recover,
}

impl BuiltinFunc {
    pub const ALL: [BuiltinFunc; 18] = [
        BuiltinFunc::Append,
        BuiltinFunc::Cap,
        BuiltinFunc::Clear,
        BuiltinFunc::Close,
        BuiltinFunc::Complex,
        BuiltinFunc::Copy,
        BuiltinFunc::Delete,
        BuiltinFunc::Imag,
        BuiltinFunc::Len,
        BuiltinFunc::Make,
        BuiltinFunc::Max,
        BuiltinFunc::Min,
        BuiltinFunc::New,
        BuiltinFunc::Panic,
        BuiltinFunc::Print,
        BuiltinFunc::Println,
        BuiltinFunc::Real,
        BuiltinFunc::Recover,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuiltinFunc::Append => "append",
            BuiltinFunc::Cap => "cap",
            BuiltinFunc::Clear => "clear",
            BuiltinFunc::Close => "close",
            BuiltinFunc::Complex => "complex",
            BuiltinFunc::Copy => "copy",
            BuiltinFunc::Delete => "delete",
            BuiltinFunc::Imag => "imag",
            BuiltinFunc::Len => "len",
            BuiltinFunc::Make => "make",
            BuiltinFunc::Max => "max",
            BuiltinFunc::Min => "min",
            BuiltinFunc::New => "new",
            BuiltinFunc::Panic => "panic",
            BuiltinFunc::Print => "print",
            BuiltinFunc::Println => "println",
            BuiltinFunc::Real => "real",
            BuiltinFunc::Recover => "recover",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    fn since(self) -> BuiltinVersion {
        match self {
            BuiltinFunc::Clear | BuiltinFunc::Min | BuiltinFunc::Max => BuiltinVersion::new(1, 21),
            _ => BuiltinVersion::new(1, 0),
        }
    }

    /// Placeholder signature recorded in the builtin table.
    fn signature(self) -> FunctionType {
        let t = || placeholder("Type");
        let int = || Type::builtin("int");
        let (params, results) = match self {
            BuiltinFunc::Append => (vec![Type::slice(t()), Type::ellipsis(t())], vec![Type::slice(t())]),
            BuiltinFunc::Cap | BuiltinFunc::Len => (vec![t()], vec![int()]),
            BuiltinFunc::Clear => (vec![t()], vec![]),
            BuiltinFunc::Close => (vec![Type::channel(symex_types::ChanDir::Send, t())], vec![]),
            BuiltinFunc::Complex => (
                vec![placeholder("FloatType"), placeholder("FloatType")],
                vec![placeholder("ComplexType")],
            ),
            BuiltinFunc::Copy => (vec![Type::slice(t()), Type::slice(t())], vec![int()]),
            BuiltinFunc::Delete => (vec![Type::map(t(), placeholder("Type1")), t()], vec![]),
            BuiltinFunc::Imag | BuiltinFunc::Real => {
                (vec![placeholder("ComplexType")], vec![placeholder("FloatType")])
            }
            BuiltinFunc::Make => (
                vec![t(), Type::ellipsis(placeholder("IntegerType"))],
                vec![t()],
            ),
            BuiltinFunc::Max | BuiltinFunc::Min => (vec![t(), Type::ellipsis(t())], vec![t()]),
            BuiltinFunc::New => (vec![t()], vec![Type::pointer(t())]),
            BuiltinFunc::Panic => (vec![Type::empty_interface()], vec![]),
            BuiltinFunc::Print | BuiltinFunc::Println => (vec![Type::ellipsis(t())], vec![]),
            BuiltinFunc::Recover => (vec![], vec![Type::empty_interface()]),
        };
        FunctionType::new(params, results)
    }
}

/// Generic stand-in used by builtin signatures; assignable from anything.
pub fn placeholder(name: &str) -> Type {
    Type::ident(BUILTIN_PACKAGE, name)
}

pub fn is_placeholder(t: &Type) -> bool {
    matches!(t, Type::Identifier { package, .. } if package == BUILTIN_PACKAGE)
}

const BASIC_TYPES: [&str; 20] = [
    "bool",
    "string",
    "int",
    "int8",
    "int16",
    "int32",
    "int64",
    "uint",
    "uint8",
    "uint16",
    "uint32",
    "uint64",
    "uintptr",
    "float32",
    "float64",
    "complex64",
    "complex128",
    "byte",
    "rune",
    "error",
];

/// The predeclared scope of one language release. Read-only once built.
#[derive(Clone, Debug)]
pub struct Universe {
    version: BuiltinVersion,
    table: SymbolTable,
    unsafe_pkg: SymbolTable,
}

impl Default for Universe {
    fn default() -> Self {
        Self::new(BuiltinVersion::LATEST)
    }
}

impl Universe {
    pub fn new(version: BuiltinVersion) -> Self {
        Self {
            version,
            table: builtin_table(version),
            unsafe_pkg: unsafe_table(version),
        }
    }

    pub fn version(&self) -> BuiltinVersion {
        self.version
    }

    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    /// Tables served without a catalog (`unsafe`).
    pub fn package(&self, path: &str) -> Option<&SymbolTable> {
        (path == UNSAFE_PACKAGE).then_some(&self.unsafe_pkg)
    }

    /// Type denoted by a predeclared type name.
    pub fn type_named(&self, name: &str) -> Option<Type> {
        self.table
            .get(SymbolKind::Type, name)
            .and_then(|d| d.def.clone())
    }

    pub fn builtin_func(&self, name: &str) -> Option<BuiltinFunc> {
        BuiltinFunc::from_name(name).filter(|f| self.version >= f.since())
    }

    pub fn constant(&self, name: &str) -> Option<Type> {
        self.table
            .get(SymbolKind::Constant, name)
            .and_then(|d| d.def.clone())
    }

    /// `interface{ Error() string }`
    pub fn error_interface() -> Type {
        Type::interface(vec![InterfaceMethod::new(
            "Error",
            "",
            Type::function(vec![], vec![Type::builtin("string")]),
        )])
    }
}

fn builtin_table(version: BuiltinVersion) -> SymbolTable {
    let mut table = SymbolTable::new("");
    let mut add = |kind: SymbolKind, name: &str, def: Type| {
        // names are distinct per kind, so insertion cannot collide
        let _ = table.add(kind, SymbolDef::new(name, "", def));
    };
    for name in BASIC_TYPES {
        add(SymbolKind::Type, name, Type::builtin(name));
    }
    if version.at_least(1, 18) {
        add(SymbolKind::Type, "any", Type::empty_interface());
        add(SymbolKind::Type, "comparable", Type::builtin("comparable"));
    }
    add(SymbolKind::Constant, "true", Type::untyped("bool"));
    add(SymbolKind::Constant, "false", Type::untyped("bool"));
    add(SymbolKind::Constant, "iota", Type::untyped("int"));
    for f in BuiltinFunc::ALL {
        if version >= f.since() {
            add(SymbolKind::Function, f.name(), Type::Function(f.signature()));
        }
    }
    table
}

fn unsafe_table(version: BuiltinVersion) -> SymbolTable {
    let mut table = SymbolTable::new(UNSAFE_PACKAGE);
    let pointer = Type::ident(UNSAFE_PACKAGE, "Pointer");
    let uintptr = Type::builtin("uintptr");
    let any = placeholder("ArbitraryType");
    let mut add = |kind: SymbolKind, name: &str, def: Type| {
        let _ = table.add(kind, SymbolDef::new(name, UNSAFE_PACKAGE, def));
    };
    add(SymbolKind::Type, "Pointer", Type::pointer(any.clone()));
    for name in ["Sizeof", "Alignof", "Offsetof"] {
        add(
            SymbolKind::Function,
            name,
            Type::function(vec![any.clone()], vec![uintptr.clone()]),
        );
    }
    if version.at_least(1, 17) {
        add(
            SymbolKind::Function,
            "Add",
            Type::function(
                vec![pointer.clone(), placeholder("IntegerType")],
                vec![pointer.clone()],
            ),
        );
        add(
            SymbolKind::Function,
            "Slice",
            Type::function(
                vec![Type::pointer(any.clone()), placeholder("IntegerType")],
                vec![Type::slice(any.clone())],
            ),
        );
    }
    if version.at_least(1, 20) {
        add(
            SymbolKind::Function,
            "String",
            Type::function(
                vec![Type::pointer(Type::builtin("byte")), placeholder("IntegerType")],
                vec![Type::builtin("string")],
            ),
        );
        add(
            SymbolKind::Function,
            "StringData",
            Type::function(
                vec![Type::builtin("string")],
                vec![Type::pointer(Type::builtin("byte"))],
            ),
        );
        add(
            SymbolKind::Function,
            "SliceData",
            Type::function(vec![Type::slice(any.clone())], vec![Type::pointer(any)]),
        );
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parsing() {
        assert_eq!(BuiltinVersion::parse("1.9").ok(), Some(BuiltinVersion::new(1, 9)));
        assert_eq!(BuiltinVersion::parse("go1.21.4").ok(), Some(BuiltinVersion::new(1, 21)));
        assert!(BuiltinVersion::parse("latest").is_err());
        assert!(BuiltinVersion::parse("2.0").is_err());
    }

    #[test]
    fn gated_names_follow_the_version() {
        let old = Universe::new(BuiltinVersion::new(1, 9));
        assert!(old.type_named("any").is_none());
        assert!(old.builtin_func("min").is_none());
        assert!(old.builtin_func("append").is_some());

        let new = Universe::new(BuiltinVersion::new(1, 21));
        assert_eq!(new.type_named("any"), Some(Type::empty_interface()));
        assert_eq!(new.builtin_func("clear"), Some(BuiltinFunc::Clear));
    }

    #[test]
    fn predeclared_contents() {
        let u = Universe::default();
        assert_eq!(u.type_named("rune"), Some(Type::builtin("rune")));
        assert_eq!(u.constant("true"), Some(Type::untyped("bool")));
        assert!(u.table().get(SymbolKind::Constant, "nil").is_none());
        assert!(u.package(UNSAFE_PACKAGE).is_some_and(|t| t.get(SymbolKind::Function, "Sizeof").is_some()));
    }
}
