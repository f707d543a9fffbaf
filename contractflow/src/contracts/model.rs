//! Declarative contract model.
//!
//! Contracts are parsed from plain data (JSON) and never executed. Maps are
//! ordered so that serialization, and therefore fingerprints, are stable.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;

/// Descriptor for a single field.
///
/// `field_type` is kept as a raw name; unknown names are reported by the
/// validator rather than rejected at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Declared type name (`string`, `integer`, `object`, ...).
    #[serde(rename = "type")]
    pub field_type: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Minimum string length in characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Maximum string length in characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Regex the string must match (anchor it for a full match).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Inclusive numeric lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive numeric upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Item descriptor for arrays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<FieldSpec>>,
    /// Minimum array length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    /// Maximum array length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    /// Nested property schema for objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, FieldSpec>>,
    /// Names of nested properties that must be present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    /// Allowed values for `enum`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<serde_json::Value>>,
    /// Required sub-fields of an output field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_fields: Option<BTreeMap<String, FieldSpec>>,
}

impl FieldSpec {
    /// Creates a descriptor of the given type with no constraints.
    #[must_use]
    pub fn new(field_type: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            description: None,
            min_length: None,
            max_length: None,
            pattern: None,
            min: None,
            max: None,
            items: None,
            min_items: None,
            max_items: None,
            properties: None,
            required: Vec::new(),
            values: None,
            required_fields: None,
        }
    }

    /// `string` descriptor.
    #[must_use]
    pub fn string() -> Self {
        Self::new("string")
    }

    /// `number` descriptor.
    #[must_use]
    pub fn number() -> Self {
        Self::new("number")
    }

    /// `integer` descriptor.
    #[must_use]
    pub fn integer() -> Self {
        Self::new("integer")
    }

    /// `boolean` descriptor.
    #[must_use]
    pub fn boolean() -> Self {
        Self::new("boolean")
    }

    /// `array` descriptor with an item type.
    #[must_use]
    pub fn array(items: Self) -> Self {
        let mut spec = Self::new("array");
        spec.items = Some(Box::new(items));
        spec
    }

    /// `object` descriptor with nested properties.
    #[must_use]
    pub fn object(properties: impl IntoIterator<Item = (impl Into<String>, Self)>) -> Self {
        let mut spec = Self::new("object");
        spec.properties = Some(
            properties
                .into_iter()
                .map(|(name, field)| (name.into(), field))
                .collect(),
        );
        spec
    }

    /// `enum` descriptor.
    #[must_use]
    pub fn one_of(values: impl IntoIterator<Item = serde_json::Value>) -> Self {
        let mut spec = Self::new("enum");
        spec.values = Some(values.into_iter().collect());
        spec
    }

    /// Sets string length bounds.
    #[must_use]
    pub fn with_length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    /// Sets a regex pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Sets numeric bounds.
    #[must_use]
    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Sets array length bounds.
    #[must_use]
    pub fn with_items_bounds(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_items = min;
        self.max_items = max;
        self
    }

    /// Marks nested properties as required.
    #[must_use]
    pub fn with_required(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required = names.into_iter().map(Into::into).collect();
        self
    }

    /// Declares a required sub-field (output descriptors).
    #[must_use]
    pub fn with_required_field(mut self, name: impl Into<String>, spec: Self) -> Self {
        self.required_fields
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), spec);
        self
    }
}

/// Input side of a contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    /// Fields that must be present and non-null.
    #[serde(default)]
    pub required: BTreeMap<String, FieldSpec>,
    /// Fields that are type-checked only when present.
    #[serde(default)]
    pub optional: BTreeMap<String, FieldSpec>,
}

/// Output side of a contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    /// Top-level output fields; every one must be present.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
}

/// Declarative predicate evaluated over the whole input value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    /// If any of the fields is present, all must be.
    RequiredTogether {
        /// Field paths.
        fields: Vec<String>,
    },
    /// At most one of the fields may be present.
    MutuallyExclusive {
        /// Field paths.
        fields: Vec<String>,
    },
    /// At least one of the fields must be present.
    AtLeastOne {
        /// Field paths.
        fields: Vec<String>,
    },
    /// Summed length of strings/arrays at the paths must not exceed `max`.
    MaxCombinedLength {
        /// Field paths.
        fields: Vec<String>,
        /// Upper bound.
        max: usize,
    },
    /// Numeric value at `left` must be below the value at `right`.
    LessThan {
        /// Left-hand path.
        left: String,
        /// Right-hand path.
        right: String,
        /// Accept equality.
        #[serde(default)]
        allow_equal: bool,
    },
    /// When `when` equals `equals`, every path in `then` must be present.
    ConditionalRequired {
        /// Trigger path.
        when: String,
        /// Trigger value.
        equals: serde_json::Value,
        /// Paths that become required.
        then: Vec<String>,
    },
    /// Predicate registered on the validator under `name`.
    Custom {
        /// Registered predicate name.
        name: String,
    },
}

/// A named business rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRule {
    /// Rule name reported in violations.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The predicate.
    pub rule: RuleKind,
}

impl BusinessRule {
    /// Creates a rule.
    #[must_use]
    pub fn new(name: impl Into<String>, rule: RuleKind) -> Self {
        Self {
            name: name.into(),
            description: None,
            rule,
        }
    }
}

/// Performance metadata. `timeout_ms` is enforced by the executor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceHints {
    /// Per-invocation deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Typical duration, informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_duration_ms: Option<u64>,
    /// Memory budget, informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory_mb: Option<u64>,
}

/// Interface descriptor for a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// Stage identifier.
    #[serde(default)]
    pub name: String,
    /// Semantic version.
    #[serde(default)]
    pub version: String,
    /// Human description.
    #[serde(default)]
    pub description: String,
    /// Input schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputSchema>,
    /// Output schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSchema>,
    /// Business rules checked on input.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub business_rules: Vec<BusinessRule>,
    /// Data paths that must resolve in the input.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Performance metadata.
    #[serde(default)]
    pub performance: PerformanceHints,
}

impl Contract {
    /// Creates a contract with empty input and output schemas.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
            input: Some(InputSchema::default()),
            output: Some(OutputSchema::default()),
            business_rules: Vec::new(),
            dependencies: Vec::new(),
            performance: PerformanceHints::default(),
        }
    }

    /// Adds a required input field.
    #[must_use]
    pub fn with_required_input(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.input
            .get_or_insert_with(InputSchema::default)
            .required
            .insert(name.into(), spec);
        self
    }

    /// Adds an optional input field.
    #[must_use]
    pub fn with_optional_input(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.input
            .get_or_insert_with(InputSchema::default)
            .optional
            .insert(name.into(), spec);
        self
    }

    /// Adds an output field.
    #[must_use]
    pub fn with_output_field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.output
            .get_or_insert_with(OutputSchema::default)
            .fields
            .insert(name.into(), spec);
        self
    }

    /// Adds a business rule.
    #[must_use]
    pub fn with_rule(mut self, rule: BusinessRule) -> Self {
        self.business_rules.push(rule);
        self
    }

    /// Adds a dependency path.
    #[must_use]
    pub fn with_dependency(mut self, path: impl Into<String>) -> Self {
        self.dependencies.push(path.into());
        self
    }

    /// Sets the timeout hint.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.performance.timeout_ms = Some(timeout_ms);
        self
    }

    /// Declared invocation deadline.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.performance.timeout_ms.map(Duration::from_millis)
    }

    /// SHA-256 digest of the serialized contract.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}
