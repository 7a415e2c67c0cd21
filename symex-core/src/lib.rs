#![forbid(unsafe_code)]

mod alloc;
mod builtin;
mod contracts;
mod driver;
mod engine;
mod env;
mod error;
mod scope;
mod table;
mod typeparser;

pub use alloc::{AllocationEntry, AllocationIndex, AllocationReport, FileAllocations, PackageAllocations};
pub use builtin::{is_placeholder, placeholder, BuiltinFunc, BuiltinVersion, Universe, UNSAFE_PACKAGE};
pub use contracts::{
    solve, CompositeElem, Contract, ContractGraph, ElemKey, Operand, RangePart, Slot, SlotId, Solution,
};
pub use driver::{DriverOptions, Extraction, PackageDriver, UntypedConstMode};
pub use engine::{
    default_import_name, BodyReport, BodyResolver, Context, FileNames, FileScope, LocalBinding, UnitOutcome,
    UnitResult,
};
pub use env::{
    builtin_family, untyped_of, Family, MemberKind, MethodEntry, MethodSet, PackageProvider, PackageSet, Selection,
    TypeEnv,
};
pub use error::{DeclError, ErrorKind, FatalError, ResolveError, Warning, WarningKind};
pub use scope::ScopeStack;
pub use table::{receiver_type_name, SymbolKind, SymbolTable};
pub use typeparser::{const_length, parse_int_literal, TypeNames, TypeParser};
