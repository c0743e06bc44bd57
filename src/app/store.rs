// VoteTally - app/store.rs
//
// Durable documents: submission registry, aggregation store, scope settings.
//
// Rules:
// - Every write is atomic (write temp → fsync → rename). The previous good
//   copy survives until the rename lands.
// - The registry and aggregation documents are REQUIRED at startup. Missing
//   or corrupt documents are fatal.
// - Scope settings are optional (absent = all defaults) but a corrupt
//   settings document is still fatal.
// - `initialise` is the only way empty documents come into existence, and it
//   never overwrites an existing file.
// - Registry and aggregation are separate files, written registry first.
//   A crash between their two renames loses that one score; it can never
//   leave a scored submission still registered.

use crate::core::aggregation::AggregationStore;
use crate::core::registry::SubmissionRegistry;
use crate::core::settings::ScopeSettings;
use crate::util::constants::{AGGREGATION_FILE_NAME, REGISTRY_FILE_NAME, SCOPES_FILE_NAME};
use crate::util::error::StoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Handle to the data directory holding all durable documents.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    data_dir: PathBuf,
}

impl DocumentStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join(REGISTRY_FILE_NAME)
    }

    pub fn aggregation_path(&self) -> PathBuf {
        self.data_dir.join(AGGREGATION_FILE_NAME)
    }

    pub fn scopes_path(&self) -> PathBuf {
        self.data_dir.join(SCOPES_FILE_NAME)
    }

    /// Create the data directory and empty registry/aggregation documents.
    ///
    /// Existing documents are left untouched. Returns the paths created.
    pub fn initialise(&self) -> Result<Vec<PathBuf>, StoreError> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| StoreError::Io {
            path: self.data_dir.clone(),
            operation: "create directory",
            source: e,
        })?;

        let mut created = Vec::new();
        let registry = self.registry_path();
        if !registry.exists() {
            write_atomic(&SubmissionRegistry::new(), &registry)?;
            created.push(registry);
        }
        let aggregation = self.aggregation_path();
        if !aggregation.exists() {
            write_atomic(&AggregationStore::new(), &aggregation)?;
            created.push(aggregation);
        }

        tracing::info!(
            dir = %self.data_dir.display(),
            created = created.len(),
            "Data directory initialised"
        );
        Ok(created)
    }

    pub fn load_registry(&self) -> Result<SubmissionRegistry, StoreError> {
        let path = self.registry_path();
        let registry: SubmissionRegistry = read_required(&path)?;
        tracing::info!(path = %path.display(), open = registry.len(), "Registry loaded");
        Ok(registry)
    }

    /// Load the aggregation document and verify every scope's invariants.
    pub fn load_aggregation(&self) -> Result<AggregationStore, StoreError> {
        let path = self.aggregation_path();
        let aggregation: AggregationStore = read_required(&path)?;
        aggregation
            .check_consistency()
            .map_err(|(scope, reason)| StoreError::Inconsistent {
                path: path.clone(),
                scope: scope.0,
                reason,
            })?;
        tracing::info!(
            path = %path.display(),
            scopes = aggregation.scopes().count(),
            "Aggregation loaded"
        );
        Ok(aggregation)
    }

    /// Load scope settings; a missing document means every scope uses defaults.
    pub fn load_settings(&self) -> Result<ScopeSettings, StoreError> {
        let path = self.scopes_path();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No scope settings; using defaults");
            return Ok(ScopeSettings::new());
        }
        read_required(&path)
    }

    pub fn save_registry(&self, registry: &SubmissionRegistry) -> Result<(), StoreError> {
        write_atomic(registry, &self.registry_path())
    }

    pub fn save_aggregation(&self, aggregation: &AggregationStore) -> Result<(), StoreError> {
        write_atomic(aggregation, &self.aggregation_path())
    }

    pub fn save_settings(&self, settings: &ScopeSettings) -> Result<(), StoreError> {
        write_atomic(settings, &self.scopes_path())
    }
}

// =============================================================================
// I/O helpers
// =============================================================================

fn read_required<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            StoreError::Io {
                path: path.to_path_buf(),
                operation: "read",
                source: e,
            }
        }
    })?;

    serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Save `value` to `path` atomically (write temp → fsync → rename).
fn write_atomic<T: Serialize>(value: &T, path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
            path: parent.to_path_buf(),
            operation: "create directory",
            source: e,
        })?;
    }

    let json = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialise {
        path: path.to_path_buf(),
        source: e,
    })?;

    let tmp = path.with_extension("json.tmp");
    let io_err = |operation: &'static str| {
        let path = tmp.clone();
        move |source: std::io::Error| StoreError::Io {
            path,
            operation,
            source,
        }
    };

    let mut file = std::fs::File::create(&tmp).map_err(io_err("create temp file"))?;
    file.write_all(&json).map_err(io_err("write temp file"))?;
    file.sync_all().map_err(io_err("sync temp file"))?;
    drop(file);

    std::fs::rename(&tmp, path).map_err(|e| {
        // Clean up the temp file on failure; ignore any secondary error.
        let _ = std::fs::remove_file(&tmp);
        StoreError::Io {
            path: path.to_path_buf(),
            operation: "rename",
            source: e,
        }
    })?;

    tracing::trace!(path = %path.display(), bytes = json.len(), "Document saved");
    Ok(())
}

// =============================================================================
// Unit tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{ChannelId, ScopeId, SubmissionId, UserId};
    use tempfile::TempDir;

    #[test]
    fn test_initialise_creates_documents_once() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path().join("data"));
        assert_eq!(store.initialise().unwrap().len(), 2);

        let mut agg = AggregationStore::new();
        agg.record(ScopeId(1), UserId(2), SubmissionId(3), ChannelId(4), 5);
        store.save_aggregation(&agg).unwrap();

        assert!(store.initialise().unwrap().is_empty());
        assert_eq!(store.load_aggregation().unwrap(), agg);
    }

    #[test]
    fn test_missing_documents_are_fatal() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path());
        assert!(matches!(
            store.load_registry(),
            Err(StoreError::Missing { .. })
        ));
        assert!(matches!(
            store.load_aggregation(),
            Err(StoreError::Missing { .. })
        ));
        assert_eq!(store.load_settings().unwrap(), ScopeSettings::new());
    }

    #[test]
    fn test_corrupt_documents_are_fatal() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path());
        std::fs::write(store.registry_path(), b"{ \"1\": [2, ").unwrap();
        std::fs::write(store.scopes_path(), b"not json").unwrap();
        assert!(matches!(
            store.load_registry(),
            Err(StoreError::Corrupt { .. })
        ));
        assert!(matches!(
            store.load_settings(),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_inconsistent_aggregation_is_fatal() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path());
        let doc = r#"{ "9": {
            "leaderboard": { "1": { "score": 4, "submitted": 1 } },
            "series": { "1": [[3, 1]] },
            "submitted": 1,
            "records": { "best": [5, 6, 3], "worst": [5, 6, 3] }
        } }"#;
        std::fs::write(store.aggregation_path(), doc).unwrap();
        match store.load_aggregation() {
            Err(StoreError::Inconsistent { scope, .. }) => assert_eq!(scope, 9),
            other => panic!("expected Inconsistent, got {other:?}"),
        }
    }

    #[test]
    fn test_leftover_temp_file_does_not_corrupt_save() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path());
        store.initialise().unwrap();

        let tmp = store.registry_path().with_extension("json.tmp");
        std::fs::write(&tmp, b"garbage").unwrap();

        store.save_registry(&SubmissionRegistry::new()).unwrap();
        assert!(store.load_registry().unwrap().is_empty());
        assert!(!tmp.exists());
    }
}
