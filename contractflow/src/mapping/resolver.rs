//! Path resolution and template projection.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Prefix that marks a mapping string as a literal value.
pub const DEFAULT_LITERAL_MARKER: &str = "literal:";

/// What to do when a mapped path does not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPathPolicy {
    /// Leave the target field out.
    #[default]
    Omit,
    /// Write an explicit `null`.
    Null,
    /// Fail the projection.
    Fail,
}

/// Errors raised while projecting a mapping template.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MappingError {
    /// A path did not resolve under [`MissingPathPolicy::Fail`].
    #[error("Mapped path '{path}' for field '{target}' did not resolve")]
    UnresolvedPath {
        /// Target field in the projected object.
        target: String,
        /// Source path that failed.
        path: String,
    },

    /// The template root was not an object.
    #[error("Mapping template must be a JSON object, found {found}")]
    InvalidTemplate {
        /// JSON kind that was found.
        found: String,
    },
}

/// Resolves paths and literals against nested JSON data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldResolver {
    literal_marker: String,
    missing: MissingPathPolicy,
}

impl Default for FieldResolver {
    fn default() -> Self {
        Self {
            literal_marker: DEFAULT_LITERAL_MARKER.to_string(),
            missing: MissingPathPolicy::default(),
        }
    }
}

impl FieldResolver {
    /// Creates a resolver with the default marker and `Omit` policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the literal marker.
    #[must_use]
    pub fn with_literal_marker(mut self, marker: impl Into<String>) -> Self {
        self.literal_marker = marker.into();
        self
    }

    /// Sets the policy for unresolved paths.
    #[must_use]
    pub fn with_missing_policy(mut self, policy: MissingPathPolicy) -> Self {
        self.missing = policy;
        self
    }

    /// The policy for unresolved paths.
    #[must_use]
    pub fn missing_policy(&self) -> MissingPathPolicy {
        self.missing
    }

    /// Resolves a path or literal.
    ///
    /// Non-string sources are literals. Strings starting with the literal
    /// marker yield the remainder verbatim. Anything else is a key or a
    /// dotted path; `None` means it did not resolve.
    #[must_use]
    pub fn resolve(&self, source: &Value, data: &Value) -> Option<Value> {
        let Value::String(path) = source else {
            return Some(source.clone());
        };
        if let Some(literal) = path.strip_prefix(self.literal_marker.as_str()) {
            return Some(Value::String(literal.to_string()));
        }
        lookup(path, data).cloned()
    }

    /// Applies `resolve` to every leaf of `template`, producing an object
    /// with exactly the template's shape.
    pub fn project(&self, template: &Value, data: &Value) -> Result<Value, MappingError> {
        if !template.is_object() {
            return Err(MappingError::InvalidTemplate {
                found: kind_of(template).to_string(),
            });
        }
        Ok(self
            .project_node("", template, data)?
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    fn project_node(
        &self,
        target: &str,
        node: &Value,
        data: &Value,
    ) -> Result<Option<Value>, MappingError> {
        match node {
            Value::Object(fields) => {
                let mut out = Map::with_capacity(fields.len());
                for (key, child) in fields {
                    let child_target = if target.is_empty() {
                        key.clone()
                    } else {
                        format!("{target}.{key}")
                    };
                    if let Some(value) = self.project_node(&child_target, child, data)? {
                        out.insert(key.clone(), value);
                    }
                }
                Ok(Some(Value::Object(out)))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, child) in items.iter().enumerate() {
                    if let Some(value) = self.project_node(&format!("{target}[{i}]"), child, data)? {
                        out.push(value);
                    }
                }
                Ok(Some(Value::Array(out)))
            }
            Value::String(path) => match self.resolve(node, data) {
                Some(value) => Ok(Some(value)),
                None => match self.missing {
                    MissingPathPolicy::Omit => Ok(None),
                    MissingPathPolicy::Null => Ok(Some(Value::Null)),
                    MissingPathPolicy::Fail => Err(MappingError::UnresolvedPath {
                        target: target.to_string(),
                        path: path.clone(),
                    }),
                },
            },
            literal => Ok(Some(literal.clone())),
        }
    }
}

/// Walks a key or dotted path. Numeric segments index into arrays.
#[must_use]
pub fn lookup<'a>(path: &str, data: &'a Value) -> Option<&'a Value> {
    path.split('.').try_fold(data, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// True when `path` resolves to a non-null value.
#[must_use]
pub fn is_present(path: &str, data: &Value) -> bool {
    lookup(path, data).is_some_and(|v| !v.is_null())
}

/// JSON kind name used in diagnostics.
#[must_use]
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
