//! Stage contracts.
//!
//! This module provides:
//! - The declarative contract model
//! - Contract sources (in-memory, directory)
//! - The caching contract store

mod errors;
mod model;
mod source;
mod store;

pub use errors::{codes, ContractError, ContractErrorInfo};
pub use model::{
    BusinessRule, Contract, FieldSpec, InputSchema, OutputSchema, PerformanceHints, RuleKind,
};
pub use source::{ContractSource, DirectoryContractSource, InMemoryContractSource};
pub use store::ContractStore;
