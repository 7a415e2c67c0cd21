use serde::{Deserialize, Serialize};

use crate::codec::{read_json, write_json, FormatError};
use crate::types::Type;

/// One declared symbol. `def == None` marks a stub, or a declaration whose
/// resolution failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDef {
    #[serde(default)]
    pub pos: String,
    pub name: String,
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub def: Option<Type>,
}

impl SymbolDef {
    pub fn new(name: impl Into<String>, package: impl Into<String>, def: Type) -> Self {
        Self {
            pos: String::new(),
            name: name.into(),
            package: package.into(),
            def: Some(def),
        }
    }

    pub fn stub(name: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            pos: String::new(),
            name: name.into(),
            package: package.into(),
            def: None,
        }
    }

    pub fn at(mut self, pos: impl Into<String>) -> Self {
        self.pos = pos.into();
        self
    }

    pub fn is_stub(&self) -> bool {
        self.def.is_none()
    }
}

/// Persisted symbol catalog of a single package.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageCatalog {
    pub package: String,
    #[serde(default)]
    pub datatypes: Vec<SymbolDef>,
    #[serde(default)]
    pub variables: Vec<SymbolDef>,
    #[serde(default)]
    pub constants: Vec<SymbolDef>,
    #[serde(default)]
    pub functions: Vec<SymbolDef>,
}

impl PackageCatalog {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            ..Self::default()
        }
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, FormatError> {
        write_json(self, pretty)
    }

    pub fn from_json(text: &str) -> Result<Self, FormatError> {
        read_json(text)
    }

    /// Number of entries whose definition is missing.
    pub fn incomplete(&self) -> usize {
        [&self.datatypes, &self.variables, &self.constants, &self.functions]
            .iter()
            .flat_map(|list| list.iter())
            .filter(|d| d.is_stub())
            .count()
    }
}

/// Several catalogs in one document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSet {
    pub packages: Vec<PackageCatalog>,
}

impl CatalogSet {
    pub fn to_json(&self, pretty: bool) -> Result<String, FormatError> {
        write_json(self, pretty)
    }

    pub fn from_json(text: &str) -> Result<Self, FormatError> {
        read_json(text)
    }

    pub fn get(&self, package: &str) -> Option<&PackageCatalog> {
        self.packages.iter().find(|p| p.package == package)
    }
}
