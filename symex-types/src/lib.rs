#![forbid(unsafe_code)]

mod catalog;
mod codec;
mod types;

pub use catalog::{CatalogSet, PackageCatalog, SymbolDef};
pub use codec::{decode, encode, from_value, read_json, to_value, write_json, FormatError};
pub use types::{
    canonical_order, canonicalize, is_exported, ChanDir, FunctionType, InterfaceMethod, StructField, Type,
    BUILTIN_PACKAGE,
};
