//! One-shot export of the topic tree to a directory structure.
//!
//! Every node becomes a directory nested like its topic path; nodes that hold
//! at least one message get their most recent payload written to
//! `payload.txt`. This is a dump for offline inspection, not a format that is
//! ever read back.
//!
//! Segment to directory names are one-to-one: `%` is written as `%25`, and the
//! segments the filesystem can't hold as-is are escaped.
//!
//! | Segment       | Directory        |
//! |---------------|------------------|
//! | `""`          | `%`              |
//! | `.`           | `%2E`            |
//! | `..`          | `%2E%2E`         |
//! | `payload.txt` | `payload%2Etxt`  |
//! | `50%`         | `50%25`          |

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::TopicStore;
use crate::error::ExportError;

pub const PAYLOAD_FILE: &str = "payload.txt";

/// Directory and last payload of every node, taken while the store is locked.
#[derive(Debug, Default, Clone)]
pub struct ExportSnapshot {
    entries: Vec<(Vec<String>, Option<Vec<u8>>)>,
}

impl ExportSnapshot {
    pub fn capture(store: &TopicStore) -> Self {
        let mut entries = Vec::new();
        store.for_each_node(|path, node| {
            let segments = path.iter().map(|segment| segment.to_string()).collect();
            entries.push((segments, node.last_message().map(<[u8]>::to_vec)));
        });
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the snapshot below `directory`, which must be missing or empty.
    ///
    /// Returns the number of payload files written.
    pub async fn write_to(&self, directory: &Path) -> Result<usize, ExportError> {
        ensure_empty_dir(directory).await?;

        let mut written = 0;
        for (segments, payload) in &self.entries {
            let node_dir = segments
                .iter()
                .fold(directory.to_path_buf(), |dir, segment| dir.join(&*dir_name(segment)));

            tokio::fs::create_dir_all(&node_dir)
                .await
                .map_err(|e| io_error(&node_dir, e))?;

            if let Some(payload) = payload {
                let file = node_dir.join(PAYLOAD_FILE);
                tokio::fs::write(&file, payload)
                    .await
                    .map_err(|e| io_error(&file, e))?;
                debug!("Exported {} bytes to {}", payload.len(), file.display());
                written += 1;
            }
        }

        info!(
            "Exported {} topics ({} payloads) to {}",
            self.entries.len(),
            written,
            directory.display()
        );
        Ok(written)
    }
}

async fn ensure_empty_dir(directory: &Path) -> Result<(), ExportError> {
    let exists = tokio::fs::try_exists(directory)
        .await
        .map_err(|e| io_error(directory, e))?;

    if !exists {
        return tokio::fs::create_dir_all(directory)
            .await
            .map_err(|e| io_error(directory, e));
    }

    let mut entries = tokio::fs::read_dir(directory)
        .await
        .map_err(|e| io_error(directory, e))?;
    if entries
        .next_entry()
        .await
        .map_err(|e| io_error(directory, e))?
        .is_some()
    {
        return Err(ExportError::DirectoryNotEmpty(directory.to_path_buf()));
    }
    Ok(())
}

/// Directory name of a topic segment. No two segments share a name, and no
/// name walks the filesystem or shadows the payload file.
fn dir_name(segment: &str) -> Cow<'_, str> {
    match segment {
        "" => Cow::Borrowed("%"),
        "." => Cow::Borrowed("%2E"),
        ".." => Cow::Borrowed("%2E%2E"),
        PAYLOAD_FILE => Cow::Borrowed("payload%2Etxt"),
        other if other.contains('%') => Cow::Owned(other.replace('%', "%25")),
        other => Cow::Borrowed(other),
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ExportError {
    ExportError::Io {
        path: PathBuf::from(path),
        source,
    }
}
