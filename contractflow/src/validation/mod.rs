//! Strict contract validation.
//!
//! This module provides:
//! - The strict validator (input and output directions)
//! - Pluggable per-type checkers
//! - Declarative business rule evaluation
//! - Violation reports and failures

mod rules;
mod types;
mod validator;
mod violation;

pub use rules::RulePredicate;
pub use types::{
    ArrayChecker, BooleanChecker, CheckContext, EnumChecker, Format, FormatChecker,
    NumberChecker, ObjectChecker, PatternCache, StringChecker, TypeChecker, TypeCheckerRegistry,
};
pub use validator::StrictValidator;
pub use violation::{Direction, ValidationFailure, ValidationReport, Violation, ViolationKind};
