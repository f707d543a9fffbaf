//! Pluggable per-type checkers.
//!
//! Each declared field type maps to a [`TypeChecker`]. Checkers never coerce:
//! `"5"` is not a number and `5.0` is not an integer.

use chrono::{DateTime, NaiveDate};
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use super::Violation;
use crate::contracts::FieldSpec;

#[allow(clippy::expect_used)]
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
});

/// Checks a value against a field descriptor of one type.
pub trait TypeChecker: Send + Sync {
    /// Returns every violation for `value` at `path`.
    fn check(&self, path: &str, value: &Value, spec: &FieldSpec, ctx: &CheckContext<'_>) -> Vec<Violation>;
}

/// Shared state handed to checkers so they can recurse into nested fields.
pub struct CheckContext<'a> {
    registry: &'a TypeCheckerRegistry,
    patterns: &'a PatternCache,
}

impl<'a> CheckContext<'a> {
    pub(crate) fn new(registry: &'a TypeCheckerRegistry, patterns: &'a PatternCache) -> Self {
        Self { registry, patterns }
    }

    /// Dispatches to the checker registered for `spec.field_type`.
    #[must_use]
    pub fn check_field(&self, path: &str, value: &Value, spec: &FieldSpec) -> Vec<Violation> {
        match self.registry.get(&spec.field_type) {
            Some(checker) => checker.check(path, value, spec, self),
            None => vec![Violation::unknown_type(path, &spec.field_type)],
        }
    }

    /// Compiled regex for `pattern`, cached.
    pub fn pattern(&self, pattern: &str) -> Result<Regex, regex::Error> {
        self.patterns.get(pattern)
    }
}

/// Compiled-regex cache shared by all checks of one validator.
#[derive(Debug, Default)]
pub struct PatternCache {
    compiled: Mutex<HashMap<String, Regex>>,
}

impl PatternCache {
    fn get(&self, pattern: &str) -> Result<Regex, regex::Error> {
        if let Some(re) = self.compiled.lock().get(pattern) {
            return Ok(re.clone());
        }
        let re = Regex::new(pattern)?;
        self.compiled.lock().insert(pattern.to_string(), re.clone());
        Ok(re)
    }
}

/// Type name to checker map.
#[derive(Clone)]
pub struct TypeCheckerRegistry {
    checkers: HashMap<String, Arc<dyn TypeChecker>>,
}

impl std::fmt::Debug for TypeCheckerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.checkers.keys().collect();
        names.sort();
        f.debug_struct("TypeCheckerRegistry").field("types", &names).finish()
    }
}

impl Default for TypeCheckerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TypeCheckerRegistry {
    /// A registry with no checkers at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            checkers: HashMap::new(),
        }
    }

    /// A registry with every built-in type.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("string", StringChecker);
        registry.register("number", NumberChecker { integer: false });
        registry.register("integer", NumberChecker { integer: true });
        registry.register("boolean", BooleanChecker);
        registry.register("array", ArrayChecker);
        registry.register("object", ObjectChecker);
        registry.register("enum", EnumChecker);
        registry.register("url", FormatChecker(Format::Url));
        registry.register("email", FormatChecker(Format::Email));
        registry.register("date", FormatChecker(Format::Date));
        registry.register("uuid", FormatChecker(Format::Uuid));
        registry
    }

    /// Adds or replaces the checker for `type_name`.
    pub fn register(&mut self, type_name: impl Into<String>, checker: impl TypeChecker + 'static) {
        self.checkers.insert(type_name.into(), Arc::new(checker));
    }

    /// Looks up a checker.
    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<&Arc<dyn TypeChecker>> {
        self.checkers.get(type_name)
    }

    /// True when `type_name` has a checker.
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.checkers.contains_key(type_name)
    }
}

/// `string` with optional length bounds and pattern.
#[derive(Debug, Clone, Copy)]
pub struct StringChecker;

impl TypeChecker for StringChecker {
    fn check(&self, path: &str, value: &Value, spec: &FieldSpec, ctx: &CheckContext<'_>) -> Vec<Violation> {
        let Some(text) = value.as_str() else {
            return vec![Violation::type_mismatch(path, "string", value)];
        };

        let mut violations = Vec::new();
        let len = text.chars().count();
        if let Some(min) = spec.min_length {
            if len < min {
                violations.push(Violation::constraint(path, format!("at least {min} characters"), value));
            }
        }
        if let Some(max) = spec.max_length {
            if len > max {
                violations.push(Violation::constraint(path, format!("at most {max} characters"), value));
            }
        }
        if let Some(pattern) = &spec.pattern {
            match ctx.pattern(pattern) {
                Ok(re) if re.is_match(text) => {}
                Ok(_) => violations.push(Violation::constraint(path, format!("matching /{pattern}/"), value)),
                Err(e) => violations.push(Violation::constraint(path, format!("a valid pattern ({e})"), value)),
            }
        }
        violations
    }
}

/// `number` or `integer` with optional inclusive bounds.
#[derive(Debug, Clone, Copy)]
pub struct NumberChecker {
    /// Require an integral JSON number.
    pub integer: bool,
}

impl TypeChecker for NumberChecker {
    fn check(&self, path: &str, value: &Value, spec: &FieldSpec, _ctx: &CheckContext<'_>) -> Vec<Violation> {
        let expected = if self.integer { "integer" } else { "number" };
        let Value::Number(number) = value else {
            return vec![Violation::type_mismatch(path, expected, value)];
        };
        if self.integer && !(number.is_i64() || number.is_u64()) {
            return vec![Violation::type_mismatch(path, expected, value)];
        }

        let mut violations = Vec::new();
        let Some(n) = number.as_f64() else {
            return violations;
        };
        if let Some(min) = spec.min {
            if n < min {
                violations.push(Violation::constraint(path, format!(">= {min}"), value));
            }
        }
        if let Some(max) = spec.max {
            if n > max {
                violations.push(Violation::constraint(path, format!("<= {max}"), value));
            }
        }
        violations
    }
}

/// `boolean`.
#[derive(Debug, Clone, Copy)]
pub struct BooleanChecker;

impl TypeChecker for BooleanChecker {
    fn check(&self, path: &str, value: &Value, _spec: &FieldSpec, _ctx: &CheckContext<'_>) -> Vec<Violation> {
        if value.is_boolean() {
            Vec::new()
        } else {
            vec![Violation::type_mismatch(path, "boolean", value)]
        }
    }
}

/// `array` with optional item type and length bounds.
#[derive(Debug, Clone, Copy)]
pub struct ArrayChecker;

impl TypeChecker for ArrayChecker {
    fn check(&self, path: &str, value: &Value, spec: &FieldSpec, ctx: &CheckContext<'_>) -> Vec<Violation> {
        let Some(items) = value.as_array() else {
            return vec![Violation::type_mismatch(path, "array", value)];
        };

        let mut violations = Vec::new();
        if let Some(min) = spec.min_items {
            if items.len() < min {
                violations.push(Violation::constraint(path, format!("at least {min} items"), value));
            }
        }
        if let Some(max) = spec.max_items {
            if items.len() > max {
                violations.push(Violation::constraint(path, format!("at most {max} items"), value));
            }
        }
        if let Some(item_spec) = &spec.items {
            for (i, item) in items.iter().enumerate() {
                violations.extend(ctx.check_field(&format!("{path}[{i}]"), item, item_spec));
            }
        }
        violations
    }
}

/// `object` with optional nested property schema.
#[derive(Debug, Clone, Copy)]
pub struct ObjectChecker;

impl TypeChecker for ObjectChecker {
    fn check(&self, path: &str, value: &Value, spec: &FieldSpec, ctx: &CheckContext<'_>) -> Vec<Violation> {
        let Some(object) = value.as_object() else {
            return vec![Violation::type_mismatch(path, "object", value)];
        };

        let mut violations = Vec::new();
        let properties = spec.properties.as_ref();
        for name in &spec.required {
            let nested = object.get(name);
            if nested.map_or(true, Value::is_null) {
                let expected = properties
                    .and_then(|p| p.get(name))
                    .map_or("any", |s| s.field_type.as_str());
                violations.push(Violation::required_missing(&format!("{path}.{name}"), expected, nested));
            }
        }
        for (name, nested_spec) in properties.into_iter().flatten() {
            match object.get(name) {
                Some(nested) if !nested.is_null() => {
                    violations.extend(ctx.check_field(&format!("{path}.{name}"), nested, nested_spec));
                }
                _ => {}
            }
        }
        violations
    }
}

/// `enum`: exact membership in `values`.
#[derive(Debug, Clone, Copy)]
pub struct EnumChecker;

impl TypeChecker for EnumChecker {
    fn check(&self, path: &str, value: &Value, spec: &FieldSpec, _ctx: &CheckContext<'_>) -> Vec<Violation> {
        let allowed = spec.values.as_deref().unwrap_or_default();
        if allowed.contains(value) {
            return Vec::new();
        }
        let listed: Vec<String> = allowed.iter().map(ToString::to_string).collect();
        vec![Violation::constraint(path, format!("one of [{}]", listed.join(", ")), value)]
    }
}

/// String formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Absolute URL with a host.
    Url,
    /// `local@domain.tld`.
    Email,
    /// `YYYY-MM-DD` or RFC 3339 timestamp.
    Date,
    /// Hyphenated or simple UUID.
    Uuid,
}

impl Format {
    fn name(self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Email => "email",
            Self::Date => "date",
            Self::Uuid => "uuid",
        }
    }

    fn accepts(self, text: &str) -> bool {
        match self {
            Self::Url => url::Url::parse(text).is_ok_and(|u| u.has_host()),
            Self::Email => EMAIL.is_match(text),
            Self::Date => {
                NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
                    || DateTime::parse_from_rfc3339(text).is_ok()
            }
            Self::Uuid => uuid::Uuid::parse_str(text).is_ok(),
        }
    }
}

/// String checked against a [`Format`].
#[derive(Debug, Clone, Copy)]
pub struct FormatChecker(pub Format);

impl TypeChecker for FormatChecker {
    fn check(&self, path: &str, value: &Value, _spec: &FieldSpec, _ctx: &CheckContext<'_>) -> Vec<Violation> {
        let format = self.0;
        match value.as_str() {
            None => vec![Violation::type_mismatch(path, format.name(), value)],
            Some(text) if format.accepts(text) => Vec::new(),
            Some(_) => vec![Violation::constraint(path, format!("a valid {}", format.name()), value)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ViolationKind;
    use serde_json::json;

    fn check(value: Value, spec: &FieldSpec) -> Vec<Violation> {
        let registry = TypeCheckerRegistry::with_builtins();
        let patterns = PatternCache::default();
        CheckContext::new(&registry, &patterns).check_field("f", &value, spec)
    }

    #[test]
    fn test_string_constraints() {
        let spec = FieldSpec::string()
            .with_length(Some(2), Some(4))
            .with_pattern("^[a-z]+$");
        assert!(check(json!("abc"), &spec).is_empty());
        assert_eq!(check(json!("a"), &spec).len(), 1);
        assert_eq!(check(json!("ABCDE"), &spec).len(), 2);
        assert_eq!(check(json!(12), &spec)[0].kind, ViolationKind::TypeMismatch);
    }

    #[test]
    fn test_numbers_are_not_coerced() {
        assert!(check(json!(5), &FieldSpec::number()).is_empty());
        assert!(check(json!(5.5), &FieldSpec::number()).is_empty());
        assert_eq!(check(json!("5"), &FieldSpec::number()).len(), 1);

        assert!(check(json!(5), &FieldSpec::integer()).is_empty());
        assert_eq!(check(json!(5.0), &FieldSpec::integer()).len(), 1);
        assert_eq!(check(json!(true), &FieldSpec::integer()).len(), 1);
    }

    #[test]
    fn test_number_bounds() {
        let spec = FieldSpec::integer().with_range(Some(1.0), Some(10.0));
        assert!(check(json!(1), &spec).is_empty());
        assert!(check(json!(10), &spec).is_empty());
        assert_eq!(check(json!(0), &spec)[0].expected, ">= 1");
        assert_eq!(check(json!(11), &spec)[0].expected, "<= 10");
    }

    #[test]
    fn test_array_items_and_bounds() {
        let spec = FieldSpec::array(FieldSpec::string()).with_items_bounds(Some(1), Some(2));
        assert!(check(json!(["a"]), &spec).is_empty());
        assert_eq!(check(json!([]), &spec).len(), 1);

        let bad = check(json!(["a", 2, "c"]), &spec);
        assert_eq!(bad.len(), 2);
        assert!(bad.iter().any(|v| v.field == "f[1]"));
    }

    #[test]
    fn test_object_nested_schema() {
        let spec = FieldSpec::object([
            ("id", FieldSpec::new("uuid")),
            ("tags", FieldSpec::array(FieldSpec::string())),
        ])
        .with_required(["id"]);

        let ok = json!({"id": "67e55044-10b1-426f-9247-bb680e5fe0c8", "tags": ["x"]});
        assert!(check(ok, &spec).is_empty());

        let missing = check(json!({"tags": ["x"]}), &spec);
        assert_eq!(missing[0].kind, ViolationKind::RequiredFieldMissing);
        assert_eq!(missing[0].field, "f.id");

        let wrong = check(json!({"id": "nope", "tags": "x"}), &spec);
        assert_eq!(wrong.len(), 2);
    }

    #[test]
    fn test_enum_membership() {
        let spec = FieldSpec::one_of([json!("nova"), json!("alloy")]);
        assert!(check(json!("nova"), &spec).is_empty());
        let v = check(json!("echo"), &spec);
        assert_eq!(v[0].expected, r#"one of ["nova", "alloy"]"#);
    }

    #[test]
    fn test_formats() {
        assert!(check(json!("https://example.com/a"), &FieldSpec::new("url")).is_empty());
        assert_eq!(check(json!("not a url"), &FieldSpec::new("url")).len(), 1);
        assert!(check(json!("a@b.io"), &FieldSpec::new("email")).is_empty());
        assert_eq!(check(json!("a@b"), &FieldSpec::new("email")).len(), 1);
        assert!(check(json!("2024-02-29"), &FieldSpec::new("date")).is_empty());
        assert!(check(json!("2024-02-29T10:00:00Z"), &FieldSpec::new("date")).is_empty());
        assert_eq!(check(json!("2023-02-29"), &FieldSpec::new("date")).len(), 1);
        assert_eq!(check(json!(7), &FieldSpec::new("uuid"))[0].kind, ViolationKind::TypeMismatch);
    }

    #[test]
    fn test_unknown_type_reported() {
        let v = check(json!("x"), &FieldSpec::new("timestamp"));
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].kind, ViolationKind::UnknownFieldType);
        assert_eq!(v[0].received, "timestamp");
    }

    #[test]
    fn test_custom_checker_registration() {
        struct EvenChecker;
        impl TypeChecker for EvenChecker {
            fn check(&self, path: &str, value: &Value, _spec: &FieldSpec, _ctx: &CheckContext<'_>) -> Vec<Violation> {
                match value.as_i64() {
                    Some(n) if n % 2 == 0 => Vec::new(),
                    _ => vec![Violation::constraint(path, "an even integer", value)],
                }
            }
        }

        let mut registry = TypeCheckerRegistry::with_builtins();
        registry.register("even", EvenChecker);
        assert!(registry.contains("even"));

        let patterns = PatternCache::default();
        let ctx = CheckContext::new(&registry, &patterns);
        assert!(ctx.check_field("n", &json!(4), &FieldSpec::new("even")).is_empty());
        assert_eq!(ctx.check_field("n", &json!(3), &FieldSpec::new("even")).len(), 1);
    }
}
