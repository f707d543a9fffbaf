//! The strict validator.
//!
//! Validation never coerces and never fills defaults: any mismatch is a
//! violation. Every violation is collected so callers get the full list,
//! with the first one surfaced prominently.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use super::rules::{self, RulePredicate};
use super::types::{CheckContext, PatternCache, TypeChecker, TypeCheckerRegistry};
use super::{Direction, ValidationFailure, ValidationReport, Violation, ViolationKind};
use crate::contracts::{Contract, FieldSpec};
use crate::mapping::is_present;

const ROOT: &str = "<root>";

/// Validates data against contracts in either direction.
pub struct StrictValidator {
    types: TypeCheckerRegistry,
    rules: HashMap<String, RulePredicate>,
    patterns: PatternCache,
}

impl std::fmt::Debug for StrictValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut rules: Vec<_> = self.rules.keys().collect();
        rules.sort();
        f.debug_struct("StrictValidator")
            .field("types", &self.types)
            .field("rules", &rules)
            .finish_non_exhaustive()
    }
}

impl Default for StrictValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl StrictValidator {
    /// Creates a validator with the built-in type checkers.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(TypeCheckerRegistry::with_builtins())
    }

    /// Creates a validator over an explicit checker registry.
    #[must_use]
    pub fn with_registry(types: TypeCheckerRegistry) -> Self {
        Self {
            types,
            rules: HashMap::new(),
            patterns: PatternCache::default(),
        }
    }

    /// Adds or replaces a type checker.
    pub fn register_type(&mut self, type_name: impl Into<String>, checker: impl TypeChecker + 'static) {
        self.types.register(type_name, checker);
    }

    /// Registers the predicate behind `custom` business rules named `name`.
    pub fn register_rule<F>(&mut self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.rules.insert(name.into(), Arc::new(predicate));
    }

    /// Builder form of [`StrictValidator::register_rule`].
    #[must_use]
    pub fn with_rule<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.register_rule(name, predicate);
        self
    }

    /// Runs every check and returns the full report.
    #[must_use]
    pub fn check(&self, value: &Value, contract: &Contract, direction: Direction) -> ValidationReport {
        let ctx = CheckContext::new(&self.types, &self.patterns);
        let mut violations = self.unknown_declared_types(contract, direction);
        let checked = match direction {
            Direction::Input => self.check_input(value, contract, &ctx),
            Direction::Output => check_output(value, contract, &ctx),
        };
        // Unknown types were already reported per declaration.
        violations.extend(
            checked
                .into_iter()
                .filter(|v| v.kind != ViolationKind::UnknownFieldType),
        );

        debug!(
            stage_id = %contract.name,
            %direction,
            violations = violations.len(),
            "Contract validation finished"
        );
        ValidationReport::from_violations(violations)
    }

    /// Like [`StrictValidator::check`] but fails on the first violation,
    /// carrying the complete list.
    pub fn validate(
        &self,
        value: &Value,
        contract: &Contract,
        direction: Direction,
    ) -> Result<ValidationReport, ValidationFailure> {
        self.check(value, contract, direction)
            .into_result(&contract.name, direction)
    }

    /// Every declared type with no registered checker, whether or not the
    /// field is present in the value.
    fn unknown_declared_types(&self, contract: &Contract, direction: Direction) -> Vec<Violation> {
        let declared: Vec<(&String, &FieldSpec)> = match direction {
            Direction::Input => contract
                .input
                .iter()
                .flat_map(|input| input.required.iter().chain(&input.optional))
                .collect(),
            Direction::Output => contract
                .output
                .iter()
                .flat_map(|output| &output.fields)
                .collect(),
        };

        let mut violations = Vec::new();
        for (name, spec) in declared {
            collect_unknown_types(name, spec, &self.types, &mut violations);
        }
        violations
    }

    fn check_input(&self, value: &Value, contract: &Contract, ctx: &CheckContext<'_>) -> Vec<Violation> {
        let Some(object) = value.as_object() else {
            return vec![Violation::type_mismatch(ROOT, "object", value)];
        };

        let mut violations = Vec::new();
        if let Some(input) = &contract.input {
            for (name, spec) in &input.required {
                match object.get(name) {
                    Some(field) if !field.is_null() => violations.extend(ctx.check_field(name, field, spec)),
                    field => violations.push(Violation::required_missing(name, &spec.field_type, field)),
                }
            }
            for (name, spec) in &input.optional {
                if let Some(field) = object.get(name).filter(|f| !f.is_null()) {
                    violations.extend(ctx.check_field(name, field, spec));
                }
            }
        }

        violations.extend(
            contract
                .business_rules
                .iter()
                .filter_map(|rule| rules::evaluate(rule, value, &self.rules)),
        );

        violations.extend(
            contract
                .dependencies
                .iter()
                .filter(|path| !is_present(path, value))
                .map(|path| Violation::dependency_missing(path)),
        );
        violations
    }
}

fn check_output(value: &Value, contract: &Contract, ctx: &CheckContext<'_>) -> Vec<Violation> {
    let Some(output) = &contract.output else {
        return vec![Violation::new(
            ViolationKind::OutputMissingFields,
            ROOT,
            "a declared output schema",
            "none",
            format!("Contract '{}' declares no output schema", contract.name),
        )];
    };
    if !value.is_object() {
        return vec![Violation::type_mismatch(ROOT, "object", value)];
    }

    let mut violations = Vec::new();
    check_declared_fields(None, value, &output.fields, ctx, &mut violations);
    violations
}

fn collect_unknown_types(
    path: &str,
    spec: &FieldSpec,
    types: &TypeCheckerRegistry,
    violations: &mut Vec<Violation>,
) {
    if !types.contains(&spec.field_type) {
        violations.push(Violation::unknown_type(path, &spec.field_type));
    }
    if let Some(items) = &spec.items {
        collect_unknown_types(&format!("{path}[]"), items, types, violations);
    }
    for (name, nested) in spec.properties.iter().chain(&spec.required_fields).flatten() {
        collect_unknown_types(&format!("{path}.{name}"), nested, types, violations);
    }
}

/// Presence, type and required sub-field checks for output fields.
fn check_declared_fields(
    parent: Option<&str>,
    value: &Value,
    fields: &BTreeMap<String, FieldSpec>,
    ctx: &CheckContext<'_>,
    violations: &mut Vec<Violation>,
) {
    let Some(object) = value.as_object() else {
        // The parent's own type check already reported this.
        return;
    };

    for (name, spec) in fields {
        let path = parent.map_or_else(|| name.clone(), |p| format!("{p}.{name}"));
        let Some(field) = object.get(name) else {
            violations.push(Violation::output_missing(&path));
            continue;
        };
        if parent.is_some() && field.is_null() {
            violations.push(Violation::output_missing(&path));
            continue;
        }

        violations.extend(ctx.check_field(&path, field, spec));
        if let Some(required) = &spec.required_fields {
            if field.is_object() {
                check_declared_fields(Some(&path), field, required, ctx, violations);
            } else if spec.field_type != "object" {
                violations.push(Violation::type_mismatch(&path, "object", field));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{BusinessRule, RuleKind};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ab_contract() -> Contract {
        Contract::new("ab", "1.0.0", "needs a and b")
            .with_required_input("a", FieldSpec::string())
            .with_required_input("b", FieldSpec::number())
    }

    #[test]
    fn test_missing_required_field_named() {
        let validator = StrictValidator::new();
        let failure = validator
            .validate(&json!({"a": "x"}), &ab_contract(), Direction::Input)
            .unwrap_err();

        assert_eq!(failure.kind(), ViolationKind::RequiredFieldMissing);
        assert_eq!(failure.field(), "b");
        assert_eq!(failure.first.received, "undefined");
    }

    #[test]
    fn test_valid_input_passes() {
        let validator = StrictValidator::new();
        let report = validator
            .validate(&json!({"a": "x", "b": 5}), &ab_contract(), Direction::Input)
            .unwrap();
        assert!(report.valid);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_null_required_is_missing() {
        let report = StrictValidator::new().check(&json!({"a": "x", "b": null}), &ab_contract(), Direction::Input);
        assert!(!report.valid);
        assert_eq!(report.errors[0].kind, ViolationKind::RequiredFieldMissing);
        assert_eq!(report.errors[0].received, "null");
    }

    #[test]
    fn test_no_coercion_of_strings_to_numbers() {
        let report = StrictValidator::new().check(&json!({"a": "x", "b": "5"}), &ab_contract(), Direction::Input);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, ViolationKind::TypeMismatch);
        assert_eq!(report.errors[0].expected, "number");
        assert_eq!(report.errors[0].received, "string");
    }

    #[test]
    fn test_all_violations_collected() {
        let report = StrictValidator::new().check(&json!({"a": 1}), &ab_contract(), Direction::Input);
        assert_eq!(report.errors.len(), 2);
        assert!(report.has_violation_for("a"));
        assert!(report.has_violation_for("b"));
    }

    #[test]
    fn test_optional_fields_checked_when_present() {
        let contract = ab_contract().with_optional_input("voice", FieldSpec::one_of([json!("nova")]));
        let validator = StrictValidator::new();

        assert!(validator.check(&json!({"a": "x", "b": 1}), &contract, Direction::Input).valid);
        assert!(validator.check(&json!({"a": "x", "b": 1, "voice": null}), &contract, Direction::Input).valid);
        assert!(!validator.check(&json!({"a": "x", "b": 1, "voice": "echo"}), &contract, Direction::Input).valid);
    }

    #[test]
    fn test_unknown_type_is_fatal() {
        let contract = Contract::new("s", "1.0.0", "d").with_required_input("when", FieldSpec::new("datetime"));
        let failure = StrictValidator::new()
            .validate(&json!({"when": "2024-01-01"}), &contract, Direction::Input)
            .unwrap_err();
        assert_eq!(failure.kind(), ViolationKind::UnknownFieldType);
    }

    #[test]
    fn test_unknown_type_reported_when_field_absent() {
        let contract = Contract::new("s", "1.0.0", "d")
            .with_required_input("a", FieldSpec::string())
            .with_optional_input("when", FieldSpec::new("datetime"));

        let report = StrictValidator::new().check(&json!({"a": "x"}), &contract, Direction::Input);
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, ViolationKind::UnknownFieldType);
        assert_eq!(report.errors[0].field, "when");

        let report = StrictValidator::new().check(&json!({"a": "x", "when": null}), &contract, Direction::Input);
        assert!(!report.valid);
    }

    #[test]
    fn test_unknown_nested_types_reported_once() {
        let contract = Contract::new("s", "1.0.0", "d")
            .with_optional_input("tags", FieldSpec::array(FieldSpec::new("tag")))
            .with_optional_input("meta", FieldSpec::object([("at", FieldSpec::new("datetime"))]));

        let report = StrictValidator::new().check(&json!({}), &contract, Direction::Input);
        let fields: Vec<&str> = report.errors.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["meta.at", "tags[]"]);

        // A present value does not add a second report for the same declaration.
        let report = StrictValidator::new().check(&json!({"tags": ["x", "y"]}), &contract, Direction::Input);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors.iter().all(|v| v.kind == ViolationKind::UnknownFieldType));
    }

    #[test]
    fn test_unknown_output_type_reported() {
        let contract = Contract::new("s", "1.0.0", "d")
            .with_output_field("clip", FieldSpec::string())
            .with_output_field("shape", FieldSpec::new("waveform"));

        let failure = StrictValidator::new()
            .validate(&json!({"clip": "a.mp3"}), &contract, Direction::Output)
            .unwrap_err();
        assert_eq!(failure.kind(), ViolationKind::UnknownFieldType);
        assert_eq!(failure.field(), "shape");
        assert_eq!(failure.violations.len(), 2);
    }

    #[test]
    fn test_non_object_input() {
        let report = StrictValidator::new().check(&json!([1]), &ab_contract(), Direction::Input);
        assert_eq!(report.errors[0].field, ROOT);
    }

    #[test]
    fn test_business_rules_and_dependencies() {
        let contract = Contract::new("s", "1.0.0", "d")
            .with_optional_input("url", FieldSpec::new("url"))
            .with_optional_input("text", FieldSpec::string())
            .with_rule(BusinessRule::new(
                "one_source",
                RuleKind::AtLeastOne {
                    fields: vec!["url".to_string(), "text".to_string()],
                },
            ))
            .with_rule(BusinessRule::new("budget", RuleKind::Custom { name: "budget".to_string() }))
            .with_dependency("settings.voice");

        let validator = StrictValidator::new().with_rule("budget", |v| {
            if v.get("text").and_then(Value::as_str).map_or(0, str::len) > 10 {
                Err("text over budget".to_string())
            } else {
                Ok(())
            }
        });

        let ok = json!({"text": "short", "settings": {"voice": "nova"}});
        assert!(validator.check(&ok, &contract, Direction::Input).valid);

        let report = validator.check(&json!({"text": "much too long text"}), &contract, Direction::Input);
        let kinds: Vec<_> = report.errors.iter().map(|v| v.kind).collect();
        assert_eq!(kinds, vec![ViolationKind::BusinessRuleFailed, ViolationKind::DependencyMissing]);
        assert_eq!(report.errors[1].field, "settings.voice");
    }

    fn output_contract() -> Contract {
        Contract::new("gen", "1.0.0", "d")
            .with_output_field("script", FieldSpec::string())
            .with_output_field(
                "stats",
                FieldSpec::new("object").with_required_field("words", FieldSpec::integer()),
            )
    }

    #[test]
    fn test_output_fields_present() {
        let validator = StrictValidator::new();
        let ok = json!({"script": "hi", "stats": {"words": 1}, "extra": true});
        assert!(validator.check(&ok, &output_contract(), Direction::Output).valid);

        let failure = validator
            .validate(&json!({"stats": {"words": 1}}), &output_contract(), Direction::Output)
            .unwrap_err();
        assert_eq!(failure.kind(), ViolationKind::OutputMissingFields);
        assert_eq!(failure.field(), "script");
    }

    #[test]
    fn test_output_required_sub_fields() {
        let validator = StrictValidator::new();
        let report = validator.check(&json!({"script": "hi", "stats": {}}), &output_contract(), Direction::Output);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].field, "stats.words");
        assert_eq!(report.errors[0].kind, ViolationKind::OutputMissingFields);

        let report = validator.check(
            &json!({"script": "hi", "stats": {"words": 1.5}}),
            &output_contract(),
            Direction::Output,
        );
        assert_eq!(report.errors[0].kind, ViolationKind::TypeMismatch);
    }

    #[test]
    fn test_output_without_schema() {
        let mut contract = output_contract();
        contract.output = None;
        let report = StrictValidator::new().check(&json!({}), &contract, Direction::Output);
        assert_eq!(report.errors[0].kind, ViolationKind::OutputMissingFields);
    }
}
