//! Extractor settings read from `symex.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use symex_core::{BuiltinVersion, DriverOptions, FatalError, UntypedConstMode};

use crate::error::CatalogError;

pub const CONFIG_FILE: &str = "symex.toml";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Directory of dependency catalogs; extracted catalogs are saved here too.
    pub symbol_table_dir: Option<PathBuf>,

    /// Builtin scope and standard-library snapshot, e.g. `"1.21"`.
    pub builtin_version: Option<String>,

    pub cgo_symbols_path: Option<PathBuf>,

    pub untyped_constants: UntypedConstMode,

    pub pretty: bool,

    /// Also emit allocation reports.
    pub allocated: bool,
}

impl ExtractorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;
        Self::parse(&content).map_err(|message| CatalogError::Config {
            path: path.to_path_buf(),
            message,
        })
    }

    /// `symex.toml` in `dir`, if present.
    pub fn discover(dir: &Path) -> Result<Option<Self>, CatalogError> {
        let path = dir.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        Self::from_file(&path).map(Some)
    }

    pub fn to_file(&self, path: &Path) -> Result<(), CatalogError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
        }
        let content = self.to_toml().map_err(|message| CatalogError::Config {
            path: path.to_path_buf(),
            message,
        })?;
        std::fs::write(path, content).map_err(|e| CatalogError::io(path, e))
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| e.to_string())
    }

    pub fn builtin_version(&self) -> Result<BuiltinVersion, FatalError> {
        match &self.builtin_version {
            Some(v) => BuiltinVersion::parse(v),
            None => Ok(BuiltinVersion::default()),
        }
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            untyped_constants: self.untyped_constants,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ExtractorConfig::parse("").expect("empty config");
        assert_eq!(config, ExtractorConfig::default());
        assert_eq!(config.untyped_constants, UntypedConstMode::Preserve);
        assert_eq!(
            config.builtin_version().expect("default version"),
            BuiltinVersion::default()
        );
    }

    #[test]
    fn fields_are_read() {
        let toml = r#"
symbol_table_dir = "tables"
builtin_version = "1.9"
untyped_constants = "default"
allocated = true
"#;
        let config = ExtractorConfig::parse(toml).expect("config");
        assert_eq!(config.symbol_table_dir, Some(PathBuf::from("tables")));
        assert_eq!(
            config.builtin_version().expect("version"),
            BuiltinVersion::new(1, 9)
        );
        assert_eq!(
            config.driver_options().untyped_constants,
            UntypedConstMode::Default
        );
        assert!(config.allocated);
        assert!(!config.pretty);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = ExtractorConfig::parse(r#"untyped_constants = "maybe""#).expect_err("bad mode");
        assert!(err.contains("maybe") || err.contains("variant"), "{err}");
    }

    #[test]
    fn file_round_trip() {
        let temp = tempfile::TempDir::new().expect("create temp dir");
        let path = temp.path().join("nested").join(CONFIG_FILE);
        let config = ExtractorConfig {
            cgo_symbols_path: Some(PathBuf::from("cgo.json")),
            pretty: true,
            ..ExtractorConfig::default()
        };
        config.to_file(&path).expect("write");
        let loaded = ExtractorConfig::discover(&temp.path().join("nested"))
            .expect("read")
            .expect("present");
        assert_eq!(loaded, config);
        assert!(ExtractorConfig::discover(temp.path()).expect("read").is_none());
    }
}
