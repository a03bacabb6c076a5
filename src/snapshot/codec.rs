//! Versioned on-disk encoding of a [`DirectorySnapshot`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tree::{DirectorySnapshot, EntryState, FileIdentity};
use crate::error::SnapshotError;
use crate::Result;

/// Current snapshot file format.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    format_version: u32,
    root: String,
    taken_at: DateTime<Utc>,
    entries: Vec<WireEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireEntry {
    path: String,
    mtime_ns: i64,
    size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dev: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ino: Option<u64>,
}

/// Encode a snapshot as a versioned JSON document.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(snapshot: &DirectorySnapshot) -> Result<Vec<u8>> {
    let file = SnapshotFile {
        format_version: FORMAT_VERSION,
        root: snapshot.root().to_string_lossy().into_owned(),
        taken_at: snapshot.taken_at(),
        entries: snapshot
            .entries()
            .iter()
            .map(|(path, state)| WireEntry {
                path: path.to_string_lossy().into_owned(),
                mtime_ns: state.mtime_ns,
                size: state.size,
                dev: state.identity.map(|i| i.dev),
                ino: state.identity.map(|i| i.ino),
            })
            .collect(),
    };

    serde_json::to_vec(&file).map_err(|e| crate::Error::internal(format!("encode snapshot: {e}")))
}

/// Decode a snapshot written by [`encode`].
///
/// `source` names the blob in error messages.
///
/// # Errors
///
/// Returns `SnapshotError::Decode` for malformed data and
/// `SnapshotError::UnsupportedVersion` for unknown format versions.
pub fn decode(bytes: &[u8], source: &str) -> Result<DirectorySnapshot> {
    let file: SnapshotFile = serde_json::from_slice(bytes).map_err(|e| SnapshotError::Decode {
        path: source.to_string(),
        reason: e.to_string(),
    })?;

    if file.format_version != FORMAT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(file.format_version).into());
    }

    let entries: BTreeMap<PathBuf, EntryState> = file
        .entries
        .into_iter()
        .map(|e| {
            let identity = match (e.dev, e.ino) {
                (Some(dev), Some(ino)) => Some(FileIdentity { dev, ino }),
                _ => None,
            };
            (
                PathBuf::from(e.path),
                EntryState {
                    mtime_ns: e.mtime_ns,
                    size: e.size,
                    identity,
                },
            )
        })
        .collect();

    Ok(DirectorySnapshot::from_parts(
        PathBuf::from(file.root),
        file.taken_at,
        entries,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DirectorySnapshot {
        let mut entries = BTreeMap::new();
        entries.insert(
            PathBuf::from("/r/a.txt"),
            EntryState {
                mtime_ns: 1_700_000_000_123_456_789,
                size: 42,
                identity: Some(FileIdentity { dev: 3, ino: 99 }),
            },
        );
        entries.insert(
            PathBuf::from("/r/sub/b.md"),
            EntryState {
                mtime_ns: 5,
                size: 0,
                identity: None,
            },
        );
        DirectorySnapshot::from_entries("/r", entries)
    }

    #[test]
    fn test_encode_decode_preserves_snapshot() {
        let snap = sample();
        let bytes = encode(&snap).unwrap();
        let back = decode(&bytes, "mem").unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn test_encoding_is_versioned_json() {
        let bytes = encode(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["format_version"], 1);
        assert_eq!(value["entries"][0]["path"], "/r/a.txt");
        assert!(value["entries"][1].get("ino").is_none());
    }

    #[test]
    fn test_decode_garbage() {
        let err = decode(b"\x00not json", "snap.json").unwrap_err();
        assert!(err.to_string().contains("snap.json"));
    }

    #[test]
    fn test_decode_unknown_version() {
        let doc = br#"{"format_version":7,"root":"/r","taken_at":"2024-01-01T00:00:00Z","entries":[]}"#;
        assert!(matches!(
            decode(doc, "x"),
            Err(crate::Error::Snapshot(SnapshotError::UnsupportedVersion(7)))
        ));
    }
}
