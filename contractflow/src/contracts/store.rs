//! Cached, validated access to stage contracts.

use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use super::{Contract, ContractError, ContractSource, FieldSpec};

#[allow(clippy::expect_used)]
static SEMVER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+(?:[-+][0-9A-Za-z.\-+]*)?$").expect("semver pattern compiles")
});

const REQUIRED_SECTIONS: [&str; 5] = ["name", "version", "description", "input", "output"];

/// Loads contracts from a [`ContractSource`] and caches them per stage id.
///
/// Reads take a shared lock and clone an `Arc`, so they never wait on each
/// other. Fetching and parsing happen outside the lock; `reload` swaps the
/// cached `Arc`, leaving readers that already hold the old one untouched.
pub struct ContractStore {
    source: Arc<dyn ContractSource>,
    cache: RwLock<HashMap<String, Arc<Contract>>>,
}

impl std::fmt::Debug for ContractStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractStore")
            .field("cached", &self.len())
            .finish_non_exhaustive()
    }
}

impl ContractStore {
    /// Creates an empty store over `source`.
    #[must_use]
    pub fn new(source: Arc<dyn ContractSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached contract or fetches, validates and caches it.
    pub fn load(&self, stage_id: &str) -> Result<Arc<Contract>, ContractError> {
        if let Some(contract) = self.get(stage_id) {
            return Ok(contract);
        }

        let contract = Arc::new(self.fetch_validated(stage_id)?);
        let mut cache = self.cache.write();
        // A concurrent loader may have won; keep its entry.
        let entry = cache
            .entry(stage_id.to_string())
            .or_insert_with(|| contract.clone());
        debug!(stage_id, version = %entry.version, "Contract cached");
        Ok(entry.clone())
    }

    /// Bypasses the cache, re-fetches and replaces the entry.
    pub fn reload(&self, stage_id: &str) -> Result<Arc<Contract>, ContractError> {
        let contract = Arc::new(self.fetch_validated(stage_id)?);
        let previous = self
            .cache
            .write()
            .insert(stage_id.to_string(), contract.clone());

        match previous {
            Some(old) if old.fingerprint() == contract.fingerprint() => {
                debug!(stage_id, "Contract reloaded without changes");
            }
            Some(old) => {
                info!(
                    stage_id,
                    from = %old.version,
                    to = %contract.version,
                    "Contract reloaded with changes"
                );
            }
            None => debug!(stage_id, "Contract loaded via reload"),
        }
        Ok(contract)
    }

    /// Loads every id, stopping at the first failure.
    pub fn preload<'a>(
        &self,
        stage_ids: impl IntoIterator<Item = &'a str>,
    ) -> Result<usize, ContractError> {
        let mut count = 0;
        for id in stage_ids {
            self.load(id)?;
            count += 1;
        }
        Ok(count)
    }

    /// Returns a cached contract without touching the source.
    #[must_use]
    pub fn get(&self, stage_id: &str) -> Option<Arc<Contract>> {
        self.cache.read().get(stage_id).cloned()
    }

    /// True when `stage_id` is cached.
    #[must_use]
    pub fn contains(&self, stage_id: &str) -> bool {
        self.cache.read().contains_key(stage_id)
    }

    /// All cached contracts sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<Contract>> {
        let mut contracts: Vec<_> = self.cache.read().values().cloned().collect();
        contracts.sort_by(|a, b| a.name.cmp(&b.name));
        contracts
    }

    /// Drops a cached entry.
    pub fn invalidate(&self, stage_id: &str) -> bool {
        self.cache.write().remove(stage_id).is_some()
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        self.cache.write().clear();
    }

    /// Number of cached contracts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    fn fetch_validated(&self, stage_id: &str) -> Result<Contract, ContractError> {
        let raw = self
            .source
            .fetch(stage_id)?
            .ok_or_else(|| ContractError::ContractNotFound {
                stage_id: stage_id.to_string(),
            })?;
        Self::parse(raw, stage_id)
    }

    /// Parses a raw descriptor and runs [`ContractStore::validate`].
    pub fn parse(raw: serde_json::Value, stage_id: &str) -> Result<Contract, ContractError> {
        let Some(object) = raw.as_object() else {
            return Err(ContractError::ContractMalformed {
                stage_id: stage_id.to_string(),
                reason: "descriptor must be a JSON object".to_string(),
            });
        };

        let missing: Vec<&str> = REQUIRED_SECTIONS
            .iter()
            .copied()
            .filter(|key| object.get(*key).map_or(true, serde_json::Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(ContractError::InvalidContractStructure {
                stage_id: stage_id.to_string(),
                missing: missing.join(", "),
            });
        }

        let contract: Contract =
            serde_json::from_value(raw).map_err(|e| ContractError::ContractMalformed {
                stage_id: stage_id.to_string(),
                reason: e.to_string(),
            })?;
        Self::validate(&contract, stage_id)?;
        Ok(contract)
    }

    /// Structural checks on a typed contract.
    ///
    /// A `name` that differs from `stage_id` is logged, not rejected.
    pub fn validate(contract: &Contract, stage_id: &str) -> Result<(), ContractError> {
        let mut missing = Vec::new();
        if contract.name.trim().is_empty() {
            missing.push("name");
        }
        if contract.version.trim().is_empty() {
            missing.push("version");
        }
        if contract.description.trim().is_empty() {
            missing.push("description");
        }
        if contract.input.is_none() {
            missing.push("input");
        }
        if contract.output.is_none() {
            missing.push("output");
        }
        if !missing.is_empty() {
            return Err(ContractError::InvalidContractStructure {
                stage_id: stage_id.to_string(),
                missing: missing.join(", "),
            });
        }

        if !SEMVER.is_match(&contract.version) {
            return Err(ContractError::InvalidVersion {
                stage_id: stage_id.to_string(),
                version: contract.version.clone(),
            });
        }

        if contract.name != stage_id {
            warn!(
                stage_id,
                contract_name = %contract.name,
                "Contract name does not match the stage id it is stored under"
            );
        }

        let input = contract.input.iter().flat_map(|i| i.required.iter().chain(&i.optional));
        let output = contract.output.iter().flat_map(|o| o.fields.iter());
        for (name, spec) in input.chain(output) {
            check_patterns(name, spec).map_err(|reason| ContractError::ContractMalformed {
                stage_id: stage_id.to_string(),
                reason,
            })?;
        }
        Ok(())
    }
}

fn check_patterns(path: &str, spec: &FieldSpec) -> Result<(), String> {
    if let Some(pattern) = &spec.pattern {
        Regex::new(pattern).map_err(|e| format!("field '{path}' has an invalid pattern: {e}"))?;
    }
    if let Some(items) = &spec.items {
        check_patterns(&format!("{path}[]"), items)?;
    }
    let nested = spec.properties.iter().chain(&spec.required_fields).flatten();
    for (name, child) in nested {
        check_patterns(&format!("{path}.{name}"), child)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::source::{InMemoryContractSource, MockContractSource};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn descriptor(name: &str, version: &str) -> serde_json::Value {
        json!({
            "name": name,
            "version": version,
            "description": "test stage",
            "input": {"required": {"a": {"type": "string"}}},
            "output": {"fields": {"b": {"type": "number"}}}
        })
    }

    fn store_with(entries: &[(&str, serde_json::Value)]) -> (Arc<InMemoryContractSource>, ContractStore) {
        let source = Arc::new(InMemoryContractSource::new());
        for (id, raw) in entries {
            source.insert(*id, raw.clone());
        }
        let store = ContractStore::new(source.clone());
        (source, store)
    }

    #[test]
    fn test_load_caches_contract() {
        let (_, store) = store_with(&[("gen", descriptor("gen", "1.0.0"))]);
        assert!(store.is_empty());

        let first = store.load("gen").unwrap();
        let second = store.load("gen").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_load_uses_source_once() {
        let mut source = MockContractSource::new();
        source
            .expect_fetch()
            .withf(|id| id == "gen")
            .times(1)
            .returning(|_| Ok(Some(descriptor("gen", "2.1.3"))));

        let store = ContractStore::new(Arc::new(source));
        store.load("gen").unwrap();
        store.load("gen").unwrap();
        assert!(store.contains("gen"));
    }

    #[test]
    fn test_load_not_found() {
        let (_, store) = store_with(&[]);
        let err = store.load("ghost").unwrap_err();
        assert_eq!(
            err,
            ContractError::ContractNotFound {
                stage_id: "ghost".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_version_is_fatal() {
        let (_, store) = store_with(&[("gen", descriptor("gen", "v1"))]);
        let err = store.load("gen").unwrap_err();
        assert!(matches!(err, ContractError::InvalidVersion { ref version, .. } if version == "v1"));
        assert!(!store.contains("gen"));
    }

    #[test]
    fn test_prerelease_version_accepted() {
        let (_, store) = store_with(&[("gen", descriptor("gen", "1.0.0-beta.2"))]);
        assert!(store.load("gen").is_ok());
    }

    #[test]
    fn test_missing_sections() {
        let (_, store) = store_with(&[("gen", json!({"name": "gen", "version": "1.0.0"}))]);
        let err = store.load("gen").unwrap_err();
        match err {
            ContractError::InvalidContractStructure { missing, .. } => {
                assert_eq!(missing, "description, input, output");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_descriptor() {
        let mut raw = descriptor("gen", "1.0.0");
        raw["input"] = json!("not an object");
        let (_, store) = store_with(&[("gen", raw)]);
        assert!(matches!(
            store.load("gen").unwrap_err(),
            ContractError::ContractMalformed { .. }
        ));

        let (_, store) = store_with(&[("arr", json!([1, 2]))]);
        assert!(matches!(
            store.load("arr").unwrap_err(),
            ContractError::ContractMalformed { .. }
        ));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut raw = descriptor("gen", "1.0.0");
        raw["input"]["required"]["a"]["pattern"] = json!("([unclosed");
        let (_, store) = store_with(&[("gen", raw)]);
        assert!(matches!(
            store.load("gen").unwrap_err(),
            ContractError::ContractMalformed { .. }
        ));
    }

    #[test]
    fn test_name_mismatch_is_not_fatal() {
        let (_, store) = store_with(&[("gen", descriptor("other_name", "1.0.0"))]);
        let contract = store.load("gen").unwrap();
        assert_eq!(contract.name, "other_name");
    }

    #[test]
    fn test_reload_replaces_entry_without_disturbing_readers() {
        let (source, store) = store_with(&[("gen", descriptor("gen", "1.0.0"))]);
        let before = store.load("gen").unwrap();

        source.insert("gen", descriptor("gen", "1.1.0"));
        // Cached copy is still served until reload.
        assert_eq!(store.load("gen").unwrap().version, "1.0.0");

        let after = store.reload("gen").unwrap();
        assert_eq!(after.version, "1.1.0");
        assert_eq!(before.version, "1.0.0");
        assert_eq!(store.load("gen").unwrap().version, "1.1.0");
    }

    #[test]
    fn test_reload_propagates_failures() {
        let (source, store) = store_with(&[("gen", descriptor("gen", "1.0.0"))]);
        store.load("gen").unwrap();
        source.remove("gen");

        assert!(matches!(
            store.reload("gen").unwrap_err(),
            ContractError::ContractNotFound { .. }
        ));
        // Failed reload leaves the previous entry in place.
        assert!(store.contains("gen"));
    }

    #[test]
    fn test_list_preload_and_invalidate() {
        let (_, store) = store_with(&[
            ("b", descriptor("b", "1.0.0")),
            ("a", descriptor("a", "1.0.0")),
        ]);
        assert_eq!(store.preload(["b", "a"]).unwrap(), 2);

        let names: Vec<_> = store.list().iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

        assert!(store.invalidate("a"));
        assert!(!store.invalidate("a"));
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_source_error_propagates() {
        let mut source = MockContractSource::new();
        source.expect_fetch().returning(|id| {
            Err(ContractError::SourceUnavailable {
                stage_id: id.to_string(),
                reason: "disk on fire".to_string(),
            })
        });
        let store = ContractStore::new(Arc::new(source));
        assert!(matches!(
            store.load("x").unwrap_err(),
            ContractError::SourceUnavailable { .. }
        ));
    }
}
