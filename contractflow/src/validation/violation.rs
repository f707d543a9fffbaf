//! Violation and report types produced by the strict validator.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::mapping::kind_of;

/// Which side of a stage boundary is being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Data entering a stage.
    Input,
    /// Data produced by a stage.
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Category of a single violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    /// The contract names a type with no registered checker.
    UnknownFieldType,
    /// A required input field is absent or null.
    RequiredFieldMissing,
    /// A value has the wrong type or breaks a type constraint.
    TypeMismatch,
    /// A business rule rejected the value.
    BusinessRuleFailed,
    /// A declared dependency path does not resolve.
    DependencyMissing,
    /// A declared output field is absent.
    OutputMissingFields,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UnknownFieldType => "UnknownFieldType",
            Self::RequiredFieldMissing => "RequiredFieldMissing",
            Self::TypeMismatch => "TypeMismatch",
            Self::BusinessRuleFailed => "BusinessRuleFailed",
            Self::DependencyMissing => "DependencyMissing",
            Self::OutputMissingFields => "OutputMissingFields",
        };
        f.write_str(name)
    }
}

/// One failed check, with enough context to point at the exact field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Category.
    pub kind: ViolationKind,
    /// Field path (or rule name for business rules).
    pub field: String,
    /// What the contract expected.
    pub expected: String,
    /// What was actually received.
    pub received: String,
    /// Human-readable message.
    pub message: String,
}

impl Violation {
    /// Creates a violation.
    #[must_use]
    pub fn new(
        kind: ViolationKind,
        field: impl Into<String>,
        expected: impl Into<String>,
        received: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            field: field.into(),
            expected: expected.into(),
            received: received.into(),
            message: message.into(),
        }
    }

    /// Required field absent or null.
    #[must_use]
    pub fn required_missing(field: &str, expected_type: &str, received: Option<&serde_json::Value>) -> Self {
        let received = received.map_or("undefined", kind_of);
        Self::new(
            ViolationKind::RequiredFieldMissing,
            field,
            expected_type,
            received,
            format!("Required field '{field}' is missing"),
        )
    }

    /// Wrong JSON type.
    #[must_use]
    pub fn type_mismatch(field: &str, expected: &str, value: &serde_json::Value) -> Self {
        let received = kind_of(value);
        Self::new(
            ViolationKind::TypeMismatch,
            field,
            expected,
            received,
            format!("Field '{field}' must be {expected}, got {received}"),
        )
    }

    /// Right type, but a constraint (length, range, pattern, format) failed.
    #[must_use]
    pub fn constraint(field: &str, expected: impl Into<String>, value: &serde_json::Value) -> Self {
        let expected = expected.into();
        let received = preview(value);
        let message = format!("Field '{field}' must be {expected}, got {received}");
        Self::new(ViolationKind::TypeMismatch, field, expected, received, message)
    }

    /// No checker registered for the declared type.
    #[must_use]
    pub fn unknown_type(field: &str, type_name: &str) -> Self {
        Self::new(
            ViolationKind::UnknownFieldType,
            field,
            "a registered field type",
            type_name,
            format!("Field '{field}' declares unknown type '{type_name}'"),
        )
    }

    /// Business rule rejected the value.
    #[must_use]
    pub fn rule_failed(rule: &str, expected: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            ViolationKind::BusinessRuleFailed,
            rule,
            expected,
            reason.clone(),
            format!("Business rule '{rule}' failed: {reason}"),
        )
    }

    /// Dependency path does not resolve.
    #[must_use]
    pub fn dependency_missing(path: &str) -> Self {
        Self::new(
            ViolationKind::DependencyMissing,
            path,
            "a resolvable value",
            "undefined",
            format!("Dependency '{path}' is not resolvable"),
        )
    }

    /// Declared output field absent.
    #[must_use]
    pub fn output_missing(field: &str) -> Self {
        Self::new(
            ViolationKind::OutputMissingFields,
            field,
            "present",
            "undefined",
            format!("Output field '{field}' is missing"),
        )
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (expected {}, received {})",
            self.kind, self.message, self.expected, self.received
        )
    }
}

/// Outcome of a full check: every violation found, in check order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True when `errors` is empty.
    pub valid: bool,
    /// All violations.
    pub errors: Vec<Violation>,
}

impl ValidationReport {
    /// Builds a report from collected violations.
    #[must_use]
    pub fn from_violations(errors: Vec<Violation>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// True when a violation names `field`.
    #[must_use]
    pub fn has_violation_for(&self, field: &str) -> bool {
        self.errors.iter().any(|v| v.field == field)
    }

    /// Converts an invalid report into a [`ValidationFailure`].
    pub fn into_result(
        self,
        stage_id: &str,
        direction: Direction,
    ) -> Result<Self, ValidationFailure> {
        match self.errors.first() {
            None => Ok(self),
            Some(first) => Err(ValidationFailure {
                stage_id: stage_id.to_string(),
                direction,
                first: first.clone(),
                violations: self.errors,
            }),
        }
    }
}

/// Strict validation failed: the first violation plus the complete list.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{direction} validation failed for stage '{stage_id}': {first}")]
pub struct ValidationFailure {
    /// Stage whose contract was applied.
    pub stage_id: String,
    /// Which boundary.
    pub direction: Direction,
    /// The first violation found.
    pub first: Violation,
    /// Every violation found.
    pub violations: Vec<Violation>,
}

impl ValidationFailure {
    /// Category of the first violation.
    #[must_use]
    pub fn kind(&self) -> ViolationKind {
        self.first.kind
    }

    /// Field of the first violation.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.first.field
    }
}

fn preview(value: &serde_json::Value) -> String {
    const LIMIT: usize = 64;
    let text = value.to_string();
    if text.chars().count() <= LIMIT {
        text
    } else {
        let cut: String = text.chars().take(LIMIT).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_into_result() {
        let ok = ValidationReport::from_violations(vec![]);
        assert!(ok.valid);
        assert!(ok.into_result("s", Direction::Input).is_ok());

        let report = ValidationReport::from_violations(vec![
            Violation::required_missing("b", "number", None),
            Violation::type_mismatch("a", "string", &json!(1)),
        ]);
        assert!(!report.valid);
        assert!(report.has_violation_for("b"));

        let failure = report.into_result("gen", Direction::Input).unwrap_err();
        assert_eq!(failure.kind(), ViolationKind::RequiredFieldMissing);
        assert_eq!(failure.field(), "b");
        assert_eq!(failure.violations.len(), 2);
        assert!(failure.to_string().starts_with("input validation failed for stage 'gen'"));
    }

    #[test]
    fn test_violation_context() {
        let v = Violation::type_mismatch("count", "integer", &json!("3"));
        assert_eq!(v.expected, "integer");
        assert_eq!(v.received, "string");

        let missing = Violation::required_missing("x", "string", Some(&json!(null)));
        assert_eq!(missing.received, "null");
    }

    #[test]
    fn test_constraint_preview_truncates() {
        let long = json!("x".repeat(200));
        let v = Violation::constraint("s", "at most 10 characters", &long);
        assert!(v.received.ends_with("..."));
        assert!(v.received.chars().count() <= 67);
    }
}
