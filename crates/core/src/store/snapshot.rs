//! On-disk JSON snapshots of a [`MemoryStore`].
//!
//! The snapshot is the persistence format used by the CLI between invocations. Parsing is
//! strict: every struct denies unknown fields and failures report the JSON path of the
//! offending value via `serde_path_to_error`.

use super::memory::MemoryStore;
use crate::constants::STORE_SNAPSHOT_VERSION;
use crate::{CareError, CareResult};
use care_uuid::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// A uniqueness constraint value held by one record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UniqueKey {
    pub constraint: String,
    pub value: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotRow {
    pub id: RecordId,
    #[serde(default)]
    pub unique: Vec<UniqueKey>,
    pub document: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub collections: BTreeMap<String, Vec<SnapshotRow>>,
}

impl StoreSnapshot {
    /// Parse a snapshot from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`CareError::SnapshotSchema`] with the failing path if the text does not match
    /// the snapshot schema, or if the version is not the one this build writes.
    pub fn parse(json_text: &str) -> CareResult<Self> {
        let mut deserializer = serde_json::Deserializer::from_str(json_text);
        let snapshot: StoreSnapshot = serde_path_to_error::deserialize(&mut deserializer)
            .map_err(|err| {
                let path = err.path().to_string();
                let path = if path.is_empty() || path == "." {
                    "<root>".to_string()
                } else {
                    path
                };
                CareError::SnapshotSchema {
                    path,
                    message: err.into_inner().to_string(),
                }
            })?;

        if snapshot.version != STORE_SNAPSHOT_VERSION {
            return Err(CareError::SnapshotSchema {
                path: "version".into(),
                message: format!(
                    "unsupported snapshot version {} (expected {})",
                    snapshot.version, STORE_SNAPSHOT_VERSION
                ),
            });
        }

        Ok(snapshot)
    }

    pub fn render(&self) -> CareResult<String> {
        serde_json::to_string_pretty(self).map_err(CareError::Serialization)
    }
}

/// Captures the current contents of `store`.
pub fn capture(store: &MemoryStore) -> CareResult<StoreSnapshot> {
    Ok(StoreSnapshot {
        version: STORE_SNAPSHOT_VERSION,
        saved_at: Utc::now(),
        collections: store.export_rows()?,
    })
}

/// Rebuilds a store from a parsed snapshot.
pub fn restore(snapshot: StoreSnapshot, lock_timeout: Duration) -> CareResult<MemoryStore> {
    MemoryStore::from_rows(snapshot.collections, lock_timeout)
}

/// Writes `store` to `path`, replacing any previous snapshot.
///
/// The snapshot is written to a sibling temporary file first and then renamed into place,
/// so a crash never leaves a half-written snapshot behind.
pub fn save(store: &MemoryStore, path: &Path) -> CareResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(CareError::DataDirCreation)?;
    }

    let rendered = capture(store)?.render()?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, rendered).map_err(CareError::FileWrite)?;
    fs::rename(&tmp_path, path).map_err(CareError::FileWrite)?;

    tracing::debug!("wrote store snapshot to {}", path.display());
    Ok(())
}

/// Loads the snapshot at `path`, or returns an empty store if none exists yet.
pub fn load_or_empty(path: &Path, lock_timeout: Duration) -> CareResult<MemoryStore> {
    if !path.exists() {
        tracing::info!(
            "no store snapshot at {}; starting with an empty store",
            path.display()
        );
        return Ok(MemoryStore::new(lock_timeout));
    }

    let contents = fs::read_to_string(path).map_err(CareError::FileRead)?;
    let snapshot = StoreSnapshot::parse(&contents)?;
    restore(snapshot, lock_timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Person, Role};
    use crate::store::EntityStore;
    use care_types::{EmailAddress, NonEmptyText};
    use tempfile::TempDir;

    fn timeout() -> Duration {
        Duration::from_millis(500)
    }

    fn person(email: &str) -> Person {
        Person::new(
            EmailAddress::parse(email).unwrap(),
            Role::Nurse,
            NonEmptyText::new("Florence").unwrap(),
            NonEmptyText::new("Nightingale").unwrap(),
        )
    }

    #[test]
    fn save_and_load_preserves_records_and_constraints() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("nested").join("store.json");

        let store = MemoryStore::new(timeout());
        let florence = store.create(person("florence@ward.org")).unwrap();
        save(&store, &path).expect("save should succeed");

        let reloaded = load_or_empty(&path, timeout()).expect("load should succeed");
        let found: Person = reloaded.get(&florence.id).unwrap().expect("person present");
        assert_eq!(found, florence);

        // Unique email constraint survives the round trip.
        let err = reloaded
            .create(person("FLORENCE@ward.org"))
            .expect_err("duplicate email should conflict");
        assert!(matches!(err, CareError::Conflict(_)));
    }

    #[test]
    fn missing_snapshot_yields_empty_store() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = load_or_empty(&temp_dir.path().join("store.json"), timeout()).unwrap();
        let people: Vec<Person> = store.find(&crate::store::Query::new()).unwrap();
        assert!(people.is_empty());
    }

    #[test]
    fn rejects_unknown_keys_with_path() {
        let input = r#"{
            "version": 1,
            "saved_at": "2026-01-01T00:00:00Z",
            "collections": {},
            "unexpected": true
        }"#;

        let err = StoreSnapshot::parse(input).expect_err("unknown key should fail");
        match err {
            CareError::SnapshotSchema { message, .. } => assert!(message.contains("unexpected")),
            other => panic!("expected SnapshotSchema error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_row_identifier_with_path() {
        let input = r#"{
            "version": 1,
            "saved_at": "2026-01-01T00:00:00Z",
            "collections": {
                "persons": [ { "id": "NOT-CANONICAL", "document": {} } ]
            }
        }"#;

        let err = StoreSnapshot::parse(input).expect_err("bad id should fail");
        match err {
            CareError::SnapshotSchema { path, .. } => {
                assert!(path.contains("persons"), "path was {path}")
            }
            other => panic!("expected SnapshotSchema error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_other_versions() {
        let input = r#"{ "version": 99, "saved_at": "2026-01-01T00:00:00Z", "collections": {} }"#;
        let err = StoreSnapshot::parse(input).expect_err("version mismatch");
        assert!(matches!(err, CareError::SnapshotSchema { ref path, .. } if path == "version"));
    }
}
