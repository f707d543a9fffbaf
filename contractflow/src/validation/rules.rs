//! Business rule evaluation.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::Violation;
use crate::contracts::{BusinessRule, RuleKind};
use crate::mapping::{is_present, lookup};

/// Predicate registered for `custom` rules. `Err` carries the reason.
pub type RulePredicate = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Evaluates one rule against the whole input value.
pub(crate) fn evaluate(
    rule: &BusinessRule,
    value: &Value,
    custom: &HashMap<String, RulePredicate>,
) -> Option<Violation> {
    let fail = |expected: String, reason: String| Some(Violation::rule_failed(&rule.name, expected, reason));

    match &rule.rule {
        RuleKind::RequiredTogether { fields } => {
            let (present, absent): (Vec<&String>, Vec<&String>) =
                fields.iter().partition(|f| is_present(f, value));
            if present.is_empty() || absent.is_empty() {
                None
            } else {
                fail(
                    format!("all of [{}] together", fields.join(", ")),
                    format!("missing {}", join(&absent)),
                )
            }
        }
        RuleKind::MutuallyExclusive { fields } => {
            let present: Vec<&String> = fields.iter().filter(|f| is_present(f, value)).collect();
            if present.len() <= 1 {
                None
            } else {
                fail(
                    format!("at most one of [{}]", fields.join(", ")),
                    format!("found {}", join(&present)),
                )
            }
        }
        RuleKind::AtLeastOne { fields } => {
            if fields.iter().any(|f| is_present(f, value)) {
                None
            } else {
                fail(format!("one of [{}]", fields.join(", ")), "none present".to_string())
            }
        }
        RuleKind::MaxCombinedLength { fields, max } => {
            let total: usize = fields
                .iter()
                .filter_map(|f| lookup(f, value))
                .map(|v| match v {
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    _ => 0,
                })
                .sum();
            if total <= *max {
                None
            } else {
                fail(format!("combined length <= {max}"), format!("combined length {total}"))
            }
        }
        RuleKind::LessThan {
            left,
            right,
            allow_equal,
        } => {
            let l = lookup(left, value).and_then(Value::as_f64);
            let r = lookup(right, value).and_then(Value::as_f64);
            let op = if *allow_equal { "<=" } else { "<" };
            match (l, r) {
                // Absent operands are the business of required/optional checks.
                (None, _) | (_, None) => None,
                (Some(l), Some(r)) if l < r || (*allow_equal && l == r) => None,
                (Some(l), Some(r)) => fail(format!("{left} {op} {right}"), format!("{l} vs {r}")),
            }
        }
        RuleKind::ConditionalRequired { when, equals, then } => {
            if lookup(when, value) != Some(equals) {
                return None;
            }
            let absent: Vec<&String> = then.iter().filter(|f| !is_present(f, value)).collect();
            if absent.is_empty() {
                None
            } else {
                fail(
                    format!("[{}] when {when} = {equals}", then.join(", ")),
                    format!("missing {}", join(&absent)),
                )
            }
        }
        RuleKind::Custom { name } => match custom.get(name) {
            None => fail(
                format!("registered predicate '{name}'"),
                "no predicate registered".to_string(),
            ),
            Some(predicate) => predicate(value)
                .err()
                .and_then(|reason| fail(format!("predicate '{name}' to pass"), reason)),
        },
    }
}

fn join(fields: &[&String]) -> String {
    fields.iter().map(|f| f.as_str()).collect::<Vec<_>>().join(", ")
}
