//! Collaborators that supply raw contract descriptors.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::ContractError;

/// Supplies the raw, declarative descriptor for a stage id.
///
/// Returning `Ok(None)` means "no such stage" and surfaces as
/// `ContractNotFound`; `Err` is reserved for a source that could not answer.
#[cfg_attr(test, mockall::automock)]
pub trait ContractSource: Send + Sync {
    /// Fetches the descriptor for `stage_id`.
    fn fetch(&self, stage_id: &str) -> Result<Option<serde_json::Value>, ContractError>;
}

/// In-memory descriptor map.
#[derive(Debug, Default)]
pub struct InMemoryContractSource {
    descriptors: RwLock<HashMap<String, serde_json::Value>>,
}

impl InMemoryContractSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a descriptor.
    pub fn insert(&self, stage_id: impl Into<String>, descriptor: serde_json::Value) {
        self.descriptors.write().insert(stage_id.into(), descriptor);
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(self, stage_id: impl Into<String>, descriptor: serde_json::Value) -> Self {
        self.insert(stage_id, descriptor);
        self
    }

    /// Removes a descriptor.
    pub fn remove(&self, stage_id: &str) -> Option<serde_json::Value> {
        self.descriptors.write().remove(stage_id)
    }
}

impl ContractSource for InMemoryContractSource {
    fn fetch(&self, stage_id: &str) -> Result<Option<serde_json::Value>, ContractError> {
        Ok(self.descriptors.read().get(stage_id).cloned())
    }
}

/// Reads `<root>/<stage_id>.json`.
#[derive(Debug, Clone)]
pub struct DirectoryContractSource {
    root: PathBuf,
}

impl DirectoryContractSource {
    /// Creates a source rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, stage_id: &str) -> Option<PathBuf> {
        let safe = !stage_id.is_empty()
            && !stage_id.contains(['/', '\\'])
            && stage_id != "."
            && stage_id != "..";
        safe.then(|| self.root.join(format!("{stage_id}.json")))
    }
}

impl ContractSource for DirectoryContractSource {
    fn fetch(&self, stage_id: &str) -> Result<Option<serde_json::Value>, ContractError> {
        let Some(path) = self.path_for(stage_id) else {
            debug!(stage_id, "Rejected stage id that is not a plain file name");
            return Ok(None);
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ContractError::SourceUnavailable {
                    stage_id: stage_id.to_string(),
                    reason: format!("{}: {e}", path.display()),
                })
            }
        };

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ContractError::ContractMalformed {
                stage_id: stage_id.to_string(),
                reason: e.to_string(),
            })
    }
}
