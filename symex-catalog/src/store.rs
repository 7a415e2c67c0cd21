use std::fs;
use std::path::{Component, Path, PathBuf};

use symex_core::{AllocationReport, BuiltinVersion, PackageSet, SymbolTable, UNSAFE_PACKAGE};
use symex_types::{read_json, write_json, CatalogSet, PackageCatalog};
use tracing::{debug, info};

use crate::error::CatalogError;

pub const CATALOG_FILE: &str = "api.json";
pub const ALLOCATIONS_FILE: &str = "allocated.json";
pub const CGO_PACKAGE: &str = "C";

/// Catalogs laid out under a symbol-table directory.
///
/// Reads prefer the standard-library snapshot of the selected builtin
/// version (`<root>/golang/<version>/<pkg>/api.json`), then the project
/// catalog (`<root>/<pkg>/api.json`). Writes always go to the latter.
#[derive(Clone, Debug)]
pub struct CatalogStore {
    root: PathBuf,
    version: BuiltinVersion,
}

impl CatalogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            version: BuiltinVersion::default(),
        }
    }

    pub fn with_version(mut self, version: BuiltinVersion) -> Self {
        self.version = version;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn version(&self) -> BuiltinVersion {
        self.version
    }

    fn package_dir(&self, base: &Path, package: &str) -> Result<PathBuf, CatalogError> {
        let relative = Path::new(package);
        let valid = !package.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(CatalogError::PackagePath(package.to_string()));
        }
        Ok(base.join(relative))
    }

    /// Catalog paths for `package`, most specific first.
    pub fn candidates(&self, package: &str) -> Result<Vec<PathBuf>, CatalogError> {
        let snapshot = self.root.join("golang").join(self.version.display());
        Ok(vec![
            self.package_dir(&snapshot, package)?.join(CATALOG_FILE),
            self.package_dir(&self.root, package)?.join(CATALOG_FILE),
        ])
    }

    pub fn locate(&self, package: &str) -> Result<Option<PathBuf>, CatalogError> {
        Ok(self.candidates(package)?.into_iter().find(|p| p.is_file()))
    }

    pub fn load(&self, package: &str) -> Result<Option<PackageCatalog>, CatalogError> {
        let Some(path) = self.locate(package)? else {
            debug!(target: "symex::catalog", package, "no catalog on disk");
            return Ok(None);
        };
        let catalog: PackageCatalog = read_file(&path)?;
        debug!(
            target: "symex::catalog",
            package,
            path = %path.display(),
            symbols = catalog.datatypes.len() + catalog.variables.len() + catalog.constants.len() + catalog.functions.len(),
            "loaded catalog"
        );
        Ok(Some(catalog))
    }

    pub fn require(&self, package: &str) -> Result<PackageCatalog, CatalogError> {
        self.load(package)?
            .ok_or_else(|| CatalogError::Missing(package.to_string()))
    }

    pub fn load_allocations(&self, package: &str) -> Result<Option<AllocationReport>, CatalogError> {
        let path = self.package_dir(&self.root, package)?.join(ALLOCATIONS_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        read_file(&path).map(Some)
    }

    /// Write `catalog`, and its allocation report when given, under the
    /// project layout. Returns the catalog path.
    pub fn save(
        &self,
        catalog: &PackageCatalog,
        allocations: Option<&AllocationReport>,
        pretty: bool,
    ) -> Result<PathBuf, CatalogError> {
        let dir = self.package_dir(&self.root, &catalog.package)?;
        fs::create_dir_all(&dir).map_err(|e| CatalogError::io(&dir, e))?;
        let path = dir.join(CATALOG_FILE);
        write_file(&path, catalog, pretty)?;
        if let Some(report) = allocations {
            write_file(&dir.join(ALLOCATIONS_FILE), report, pretty)?;
        }
        info!(target: "symex::catalog", package = %catalog.package, path = %path.display(), "saved catalog");
        Ok(path)
    }

    /// Load the tables of every path in `imports` that `deps` does not
    /// already hold. `unsafe` and `C` are skipped; the universe and the cgo
    /// side-table serve them.
    pub fn load_dependencies<'p>(
        &self,
        imports: impl IntoIterator<Item = &'p str>,
        deps: &mut PackageSet,
    ) -> Result<usize, CatalogError> {
        let mut loaded = 0;
        for path in imports {
            if path == UNSAFE_PACKAGE || path == CGO_PACKAGE || deps.contains(path) {
                continue;
            }
            let catalog = self.require(path)?;
            deps.insert(into_table(&catalog)?);
            loaded += 1;
        }
        Ok(loaded)
    }
}

/// Rebuild the symbol table held by `catalog`.
pub fn into_table(catalog: &PackageCatalog) -> Result<SymbolTable, CatalogError> {
    SymbolTable::from_catalog(catalog).map_err(|source| CatalogError::Table {
        package: catalog.package.clone(),
        source,
    })
}

/// A `{"packages":[…]}` document.
pub fn load_bundle(path: &Path) -> Result<CatalogSet, CatalogError> {
    let bundle: CatalogSet = read_file(path)?;
    debug!(target: "symex::catalog", path = %path.display(), packages = bundle.packages.len(), "loaded bundle");
    Ok(bundle)
}

/// The cgo side-table: a catalog of package `C`. An unnamed catalog is
/// taken to be `C`.
pub fn load_cgo(path: &Path) -> Result<SymbolTable, CatalogError> {
    let mut catalog: PackageCatalog = read_file(path)?;
    if catalog.package.is_empty() {
        catalog.package = CGO_PACKAGE.to_string();
    }
    if catalog.package != CGO_PACKAGE {
        return Err(CatalogError::CgoPackage(catalog.package));
    }
    debug!(target: "symex::catalog", path = %path.display(), "loaded cgo symbols");
    into_table(&catalog)
}

fn read_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CatalogError> {
    let text = fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;
    read_json(&text).map_err(|e| CatalogError::format(path, e))
}

fn write_file<T: serde::Serialize>(path: &Path, value: &T, pretty: bool) -> Result<(), CatalogError> {
    let mut text = write_json(value, pretty).map_err(|e| CatalogError::format(path, e))?;
    text.push('\n');
    fs::write(path, text).map_err(|e| CatalogError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_path_comes_first() {
        let store = CatalogStore::new("/tables").with_version(BuiltinVersion::new(1, 21));
        let paths = store.candidates("net/http").expect("valid path");
        assert_eq!(paths[0], Path::new("/tables/golang/1.21/net/http/api.json"));
        assert_eq!(paths[1], Path::new("/tables/net/http/api.json"));
    }

    #[test]
    fn escaping_package_paths_are_rejected() {
        let store = CatalogStore::new("/tables");
        for bad in ["", "../etc", "/abs", "a/../b"] {
            assert!(
                matches!(store.candidates(bad), Err(CatalogError::PackagePath(_))),
                "{bad}"
            );
        }
    }
}
