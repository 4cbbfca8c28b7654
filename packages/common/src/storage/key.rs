use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::StorageError;

/// Namespace every document blob key lives under.
pub const KEY_PREFIX: &str = "documents";

/// Address of a single blob: `documents/{document id}/{revision}`.
///
/// A fresh revision is minted for every write, so a key is never reused for
/// different content and a replacement never overwrites the blob it replaces.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey {
    document_id: Uuid,
    revision: Uuid,
}

impl StorageKey {
    /// Mint a new key for a blob owned by `document_id`.
    pub fn generate(document_id: Uuid) -> Self {
        Self {
            document_id,
            revision: Uuid::now_v7(),
        }
    }

    /// Parse the canonical string form produced by `Display`.
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(KEY_PREFIX), Some(doc), Some(rev), None) => {
                let document_id = parse_segment(doc)?;
                let revision = parse_segment(rev)?;
                Ok(Self {
                    document_id,
                    revision,
                })
            }
            _ => Err(StorageError::InvalidKey(format!(
                "expected '{KEY_PREFIX}/<uuid>/<uuid>', got {s:?}"
            ))),
        }
    }

    pub fn document_id(&self) -> Uuid {
        self.document_id
    }

    /// Path segments used by hierarchical backends (directories, object prefixes).
    pub fn segments(&self) -> [String; 3] {
        [
            KEY_PREFIX.to_string(),
            self.document_id.to_string(),
            self.revision.to_string(),
        ]
    }
}

fn parse_segment(segment: &str) -> Result<Uuid, StorageError> {
    // Only the hyphenated form round-trips through `Display`.
    if segment.len() != 36 {
        return Err(StorageError::InvalidKey(format!(
            "segment {segment:?} is not a hyphenated UUID"
        )));
    }
    Uuid::parse_str(segment)
        .map_err(|e| StorageError::InvalidKey(format!("segment {segment:?}: {e}")))
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({self})")
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{KEY_PREFIX}/{}/{}", self.document_id, self.revision)
    }
}

impl Serialize for StorageKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StorageKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
