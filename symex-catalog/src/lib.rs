#![forbid(unsafe_code)]

pub mod config;
mod error;
mod store;

pub use config::{ExtractorConfig, CONFIG_FILE};
pub use error::CatalogError;
pub use store::{
    into_table, load_bundle, load_cgo, CatalogStore, ALLOCATIONS_FILE, CATALOG_FILE, CGO_PACKAGE,
};
