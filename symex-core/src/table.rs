use std::collections::HashMap;

use serde::Serialize;
use symex_types::{PackageCatalog, SymbolDef, Type};

use crate::error::{ErrorKind, ResolveError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Variable,
    Function,
    Constant,
    Type,
}

impl SymbolKind {
    /// Tie-break order of [`SymbolTable::lookup`].
    pub const LOOKUP_ORDER: [SymbolKind; 4] = [
        SymbolKind::Variable,
        SymbolKind::Function,
        SymbolKind::Constant,
        SymbolKind::Type,
    ];

    fn slot(self) -> usize {
        match self {
            SymbolKind::Variable => 0,
            SymbolKind::Function => 1,
            SymbolKind::Constant => 2,
            SymbolKind::Type => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SymbolKind::Variable => "variable",
            SymbolKind::Function => "function",
            SymbolKind::Constant => "constant",
            SymbolKind::Type => "type",
        }
    }

    /// Only types and variables may be declared before their type is known.
    pub fn allows_stub(self) -> bool {
        matches!(self, SymbolKind::Type | SymbolKind::Variable)
    }
}

#[derive(Clone, Debug, Default)]
struct Entries {
    defs: Vec<SymbolDef>,
    index: HashMap<String, usize>,
}

/// Flat per-package table, one namespace per [`SymbolKind`].
///
/// Methods live in the function namespace under `Recv.Name` and are also
/// indexed by the receiver's type name.
#[derive(Clone, Debug)]
pub struct SymbolTable {
    package: String,
    entries: [Entries; 4],
    methods: HashMap<String, Vec<usize>>,
}

/// Type name a method is declared on: `T` or `*T`.
pub fn receiver_type_name(receiver: &Type) -> Result<&str, ResolveError> {
    match receiver {
        Type::Identifier { name, .. } => Ok(name),
        Type::Pointer { target } => match target.as_ref() {
            Type::Identifier { name, .. } => Ok(name),
            other => Err(bad_receiver(other)),
        },
        other => Err(bad_receiver(other)),
    }
}

fn bad_receiver(t: &Type) -> ResolveError {
    ResolveError::new(
        ErrorKind::KindMismatch,
        t.display(),
        format!("invalid receiver type {}", t.display()),
    )
}

impl SymbolTable {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            entries: Default::default(),
            methods: HashMap::new(),
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// Insert a definition. Adding over a stub completes it; adding over a
    /// complete entry of the same kind fails.
    pub fn add(&mut self, kind: SymbolKind, def: SymbolDef) -> Result<(), ResolveError> {
        if def.is_stub() && !kind.allows_stub() {
            return Err(ResolveError::new(
                ErrorKind::KindMismatch,
                &def.name,
                format!("{} `{}` cannot be declared without a type", kind.name(), def.name),
            ));
        }
        self.insert(kind, def).map(|_| ())
    }

    pub fn add_stub(&mut self, kind: SymbolKind, name: &str, pos: &str) -> Result<(), ResolveError> {
        self.add(kind, SymbolDef::stub(name, self.package.clone()).at(pos))
    }

    /// Complete (or insert) `name` with `def` in this table's package.
    pub fn complete(&mut self, kind: SymbolKind, name: &str, def: Type) -> Result<(), ResolveError> {
        self.add(kind, SymbolDef::new(name, self.package.clone(), def))
    }

    /// Register a method of `type_name` under the key `type_name.method`.
    pub fn add_method(&mut self, type_name: &str, method: &str, mut def: SymbolDef) -> Result<(), ResolveError> {
        def.name = format!("{type_name}.{method}");
        let index = self.insert(SymbolKind::Function, def)?;
        let list = self.methods.entry(type_name.to_string()).or_default();
        if !list.contains(&index) {
            list.push(index);
        }
        Ok(())
    }

    /// Record a declaration whose resolution failed, whatever its kind, so
    /// the catalog still lists it with an unset definition.
    pub fn add_unresolved(&mut self, kind: SymbolKind, name: &str, pos: &str) {
        let entries = &mut self.entries[kind.slot()];
        if entries.index.contains_key(name) {
            return;
        }
        entries.index.insert(name.to_string(), entries.defs.len());
        entries
            .defs
            .push(SymbolDef::stub(name, self.package.clone()).at(pos));
    }

    /// Drop the definition of an entry, turning it back into an incomplete one.
    pub fn unset(&mut self, kind: SymbolKind, name: &str) {
        let entries = &mut self.entries[kind.slot()];
        if let Some(&i) = entries.index.get(name) {
            entries.defs[i].def = None;
        }
    }

    fn insert(&mut self, kind: SymbolKind, def: SymbolDef) -> Result<usize, ResolveError> {
        let entries = &mut self.entries[kind.slot()];
        if let Some(&i) = entries.index.get(&def.name) {
            let existing = &mut entries.defs[i];
            if !existing.is_stub() {
                return Err(ResolveError::new(
                    ErrorKind::DuplicateSymbol,
                    &def.name,
                    format!("{} `{}` already exists", kind.name(), def.name),
                ));
            }
            if def.def.is_some() {
                existing.def = def.def;
            }
            if !def.pos.is_empty() {
                existing.pos = def.pos;
            }
            return Ok(i);
        }
        entries.index.insert(def.name.clone(), entries.defs.len());
        entries.defs.push(def);
        Ok(entries.defs.len() - 1)
    }

    pub fn get(&self, kind: SymbolKind, name: &str) -> Option<&SymbolDef> {
        let entries = &self.entries[kind.slot()];
        entries.index.get(name).map(|&i| &entries.defs[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        SymbolKind::LOOKUP_ORDER
            .iter()
            .any(|&k| self.get(k, name).is_some())
    }

    /// Search variables, then functions, then constants, then types.
    pub fn lookup(&self, name: &str) -> Result<(&SymbolDef, SymbolKind), ResolveError> {
        SymbolKind::LOOKUP_ORDER
            .iter()
            .find_map(|&k| self.get(k, name).map(|d| (d, k)))
            .ok_or_else(|| ResolveError::not_found(name))
    }

    pub fn lookup_in_kind(&self, name: &str, kind: SymbolKind) -> Result<&SymbolDef, ResolveError> {
        self.get(kind, name).ok_or_else(|| {
            ResolveError::new(
                ErrorKind::NotFound,
                name,
                format!("{} `{}` not found in `{}`", kind.name(), name, self.package),
            )
        })
    }

    pub fn lookup_method(&self, type_name: &str, method: &str) -> Option<&SymbolDef> {
        self.get(SymbolKind::Function, &format!("{type_name}.{method}"))
    }

    pub fn methods_of<'a>(&'a self, type_name: &str) -> impl Iterator<Item = &'a SymbolDef> + use<'a> {
        let functions = &self.entries[SymbolKind::Function.slot()].defs;
        self.methods
            .get(type_name)
            .into_iter()
            .flatten()
            .map(move |&i| &functions[i])
    }

    pub fn defs(&self, kind: SymbolKind) -> &[SymbolDef] {
        &self.entries[kind.slot()].defs
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.defs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_catalog(&self) -> PackageCatalog {
        PackageCatalog {
            package: self.package.clone(),
            datatypes: self.defs(SymbolKind::Type).to_vec(),
            variables: self.defs(SymbolKind::Variable).to_vec(),
            constants: self.defs(SymbolKind::Constant).to_vec(),
            functions: self.defs(SymbolKind::Function).to_vec(),
        }
    }

    /// Rebuild a table, method index included, from its persisted form.
    pub fn from_catalog(catalog: &PackageCatalog) -> Result<Self, ResolveError> {
        let mut table = SymbolTable::new(catalog.package.clone());
        let lists = [
            (SymbolKind::Type, &catalog.datatypes),
            (SymbolKind::Variable, &catalog.variables),
            (SymbolKind::Constant, &catalog.constants),
        ];
        for (kind, defs) in lists {
            for def in defs {
                table.insert(kind, def.clone())?;
            }
        }
        for def in &catalog.functions {
            match &def.def {
                Some(Type::Method { receiver, .. }) => {
                    let type_name = receiver_type_name(receiver)?.to_string();
                    let method = def
                        .name
                        .rsplit_once('.')
                        .map(|(_, m)| m.to_string())
                        .unwrap_or_else(|| def.name.clone());
                    table.add_method(&type_name, &method, def.clone())?;
                }
                // An unresolved method keeps only its `T.M` key.
                None => match def.name.split_once('.') {
                    Some((type_name, method)) => table.add_method(type_name, method, def.clone())?,
                    None => {
                        table.insert(SymbolKind::Function, def.clone())?;
                    }
                },
                _ => {
                    table.insert(SymbolKind::Function, def.clone())?;
                }
            }
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symex_types::FunctionType;

    #[test]
    fn stub_then_complete() {
        let mut t = SymbolTable::new("p");
        t.add_stub(SymbolKind::Type, "S", "a.go:1").expect("stub");
        assert!(t.get(SymbolKind::Type, "S").is_some_and(|d| d.is_stub()));
        t.complete(SymbolKind::Type, "S", Type::structure(vec![]))
            .expect("complete");
        let def = t.get(SymbolKind::Type, "S").expect("present");
        assert_eq!(def.def, Some(Type::structure(vec![])));
        assert_eq!(def.pos, "a.go:1");
        let err = t
            .complete(SymbolKind::Type, "S", Type::builtin("int"))
            .expect_err("duplicate");
        assert_eq!(err.kind, ErrorKind::DuplicateSymbol);
    }

    #[test]
    fn stubs_are_limited_to_types_and_variables() {
        let mut t = SymbolTable::new("p");
        let err = t
            .add_stub(SymbolKind::Constant, "c", "")
            .expect_err("constant stub");
        assert_eq!(err.kind, ErrorKind::KindMismatch);
        t.add_stub(SymbolKind::Variable, "v", "").expect("variable stub");
    }

    #[test]
    fn lookup_prefers_variables() {
        let mut t = SymbolTable::new("p");
        t.complete(SymbolKind::Type, "x", Type::builtin("int")).expect("type");
        t.complete(SymbolKind::Variable, "x", Type::builtin("string"))
            .expect("var");
        let (def, kind) = t.lookup("x").expect("found");
        assert_eq!(kind, SymbolKind::Variable);
        assert_eq!(def.def, Some(Type::builtin("string")));
        assert!(t.lookup_in_kind("x", SymbolKind::Type).is_ok());
        let err = t.lookup("y").expect_err("missing");
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.symbol, "y");
    }

    #[test]
    fn methods_round_trip_through_catalog() {
        let mut t = SymbolTable::new("p");
        t.complete(SymbolKind::Type, "T", Type::structure(vec![])).expect("type");
        let m = Type::method(
            Type::pointer(Type::ident("p", "T")),
            FunctionType::new(vec![], vec![Type::builtin("int")]),
        );
        t.add_method("T", "M", SymbolDef::new("M", "p", m)).expect("method");
        assert!(t.lookup_method("T", "M").is_some());
        assert!(t.get(SymbolKind::Function, "T.M").is_some());

        let back = SymbolTable::from_catalog(&t.to_catalog()).expect("reload");
        let names: Vec<_> = back.methods_of("T").map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["T.M".to_string()]);
    }

    #[test]
    fn unresolved_method_is_reindexed_on_reload() {
        let mut t = SymbolTable::new("p");
        t.complete(SymbolKind::Type, "T", Type::structure(vec![])).expect("type");
        t.add_method("T", "Broken", SymbolDef::stub("Broken", "p")).expect("method stub");
        t.add_unresolved(SymbolKind::Function, "helper", "a.go:3");

        let back = SymbolTable::from_catalog(&t.to_catalog()).expect("reload");
        let method = back.lookup_method("T", "Broken").expect("still keyed by type");
        assert!(method.is_stub());
        assert_eq!(back.methods_of("T").count(), 1);
        assert!(back.get(SymbolKind::Function, "helper").is_some_and(|d| d.is_stub()));
        assert_eq!(back.methods_of("helper").count(), 0);
    }

    #[test]
    fn receivers_must_be_named() {
        assert_eq!(receiver_type_name(&Type::pointer(Type::ident("p", "T"))).ok(), Some("T"));
        let err = receiver_type_name(&Type::slice(Type::builtin("int"))).expect_err("slice");
        assert_eq!(err.kind, ErrorKind::KindMismatch);
    }
}
