//! Policy document loading, hot reload, and validation.
//!
//! A single mtime-keyed cache behind a lock, atomic swap on reload, no lock
//! held by readers once they have cloned the `Arc`.

pub mod canonical;
pub mod header_pattern;
pub mod matcher;
pub mod role_match;
pub mod types;
pub mod validation;

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

pub use matcher::{Matcher, MatcherOp};
pub use types::PolicyDocument;
pub use validation::{validate, ValidationReport};

use crate::error::PolicyError;

struct Cached {
    mtime: SystemTime,
    doc: Arc<PolicyDocument>,
}

/// Process-wide handle to the policy document. Cheap to clone; all clones
/// share the same cache and file path.
#[derive(Clone)]
pub struct PolicyStore {
    path: PathBuf,
    cache: Arc<RwLock<Option<Cached>>>,
}

impl PolicyStore {
    /// Build a store pointed at `path`. Nothing is read from disk until the
    /// first call to [`PolicyStore::load`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Arc::new(RwLock::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the effective policy document, re-parsing only if the file's
    /// mtime has advanced since the last load. Never holds a lock across
    /// the parse step: parse happens outside the write guard, then the
    /// cache is swapped atomically.
    pub fn load(&self) -> Result<Arc<PolicyDocument>, PolicyError> {
        let metadata = std::fs::metadata(&self.path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                PolicyError::FileNotFound {
                    path: self.path.display().to_string(),
                }
            } else {
                PolicyError::Io {
                    path: self.path.display().to_string(),
                    source,
                }
            }
        })?;
        let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        if let Some(cached) = self.cache.read().expect("policy cache poisoned").as_ref() {
            if cached.mtime == mtime {
                return Ok(cached.doc.clone());
            }
        }

        let raw = std::fs::read_to_string(&self.path).map_err(|source| PolicyError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        let doc: PolicyDocument = parse_document(&raw)?;
        let doc = Arc::new(doc);

        let mut guard = self.cache.write().expect("policy cache poisoned");
        *guard = Some(Cached {
            mtime,
            doc: doc.clone(),
        });
        Ok(doc)
    }

    /// Persist `doc` atomically (temp file + rename) and invalidate the
    /// cache so the next `load()` re-reads it.
    pub fn save(&self, doc: &PolicyDocument) -> Result<(), PolicyError> {
        let report = validate(doc);
        if !report.ok() {
            return Err(PolicyError::Invalid(report.errors));
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| PolicyError::Write { source })?;
            }
        }

        let yaml = serde_yaml::to_string(doc)
            .map_err(|e| PolicyError::Parse { message: e.to_string() })?;

        let mut tmp_path = self.path.clone();
        let tmp_name = match self.path.file_name() {
            Some(name) => format!("{}.tmp", name.to_string_lossy()),
            None => "policy.yaml.tmp".to_string(),
        };
        tmp_path.set_file_name(tmp_name);

        std::fs::write(&tmp_path, yaml).map_err(|source| PolicyError::Write { source })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|source| PolicyError::Write { source })?;

        let mut guard = self.cache.write().expect("policy cache poisoned");
        *guard = None;
        Ok(())
    }

    /// SHA-256 of the canonical JSON encoding of `doc`.
    pub fn etag(doc: &PolicyDocument) -> String {
        canonical::canonical_hash(doc).expect("PolicyDocument always serializes")
    }

    pub fn revision(doc: &PolicyDocument) -> u64 {
        doc.revision
    }
}

fn parse_document(raw: &str) -> Result<PolicyDocument, PolicyError> {
    serde_yaml::from_str(raw).map_err(|e| PolicyError::Parse {
        message: e.to_string(),
    })
}

/// Apply RFC 7396 JSON Merge Patch semantics: a non-object patch replaces
/// the target wholesale; an object patch merges key by key, with `null`
/// values deleting the corresponding target key.
pub fn merge_patch(target: &serde_json::Value, patch: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    let Value::Object(patch_map) = patch else {
        return patch.clone();
    };

    let mut result = match target {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };

    for (key, value) in patch_map {
        if value.is_null() {
            result.remove(key);
        } else {
            let merged = merge_patch(result.get(key).unwrap_or(&Value::Null), value);
            result.insert(key.clone(), merged);
        }
    }

    Value::Object(result)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Save/reload round-trips the etag for any revision number, and two
        /// documents differing only in `revision` never collide.
        #[test]
        fn etag_round_trips_and_tracks_revision(revision in 0u64..10_000, other_revision in 0u64..10_000) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("policy.yaml");
            let store = PolicyStore::new(&path);

            let mut doc = PolicyDocument::default();
            doc.revision = revision;
            store.save(&doc).unwrap();
            let reloaded = store.load().unwrap();
            prop_assert_eq!(PolicyStore::etag(&doc), PolicyStore::etag(&reloaded));

            let mut other = PolicyDocument::default();
            other.revision = other_revision;
            other.updated_at = doc.updated_at;
            if revision == other_revision {
                prop_assert_eq!(PolicyStore::etag(&doc), PolicyStore::etag(&other));
            } else {
                prop_assert_ne!(PolicyStore::etag(&doc), PolicyStore::etag(&other));
            }
        }
    }
}
