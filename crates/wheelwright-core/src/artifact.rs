//! Content-addressed artifact storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::{Error, JobId, Result};

/// Reference to a file deposited in the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// File name, e.g. `pkg-1.0-cp39-cp39-manylinux_2_17_x86_64.whl`.
    pub name: String,
    /// Hex-encoded SHA-256 of the contents.
    pub digest: String,
    /// Size in bytes.
    pub size: u64,
}

impl ArtifactRef {
    /// Hash a file on disk into a reference.
    pub fn from_file(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Internal(format!("artifact has no file name: {}", path.display())))?
            .to_string();
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        let size = std::io::copy(&mut file, &mut hasher)?;
        Ok(Self {
            name,
            digest: hex::encode(hasher.finalize()),
            size,
        })
    }
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} bytes, sha256:{})", self.name, self.size, &self.digest[..12])
    }
}

/// A stored artifact plus its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArtifact {
    /// The reference (name, digest, size).
    pub reference: ArtifactRef,
    /// Job that deposited it.
    pub job_id: JobId,
    /// Label of that job, for reports.
    pub job_label: String,
    /// Absolute path inside the store.
    pub path: PathBuf,
    /// When it was deposited.
    pub stored_at: DateTime<Utc>,
    /// Labels of later jobs that deposited an identical copy.
    pub also_produced_by: Vec<String>,
}

/// Append-only store for release artifacts, addressed by file name and
/// content hash.
///
/// Successful build jobs deposit here and the publisher reads from here,
/// nowhere else. The index is the single synchronization point between the
/// build fan-out and the publish phase; the lock guards index bookkeeping
/// and the final rename, never a full file copy.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    index: Mutex<StoreIndex>,
}

#[derive(Debug, Default)]
struct StoreIndex {
    /// Deposit order. The publisher uploads in exactly this order.
    entries: Vec<StoredArtifact>,
    /// File name to content digest, for conflict detection.
    by_name: HashMap<String, String>,
}

impl ArtifactStore {
    /// Open (creating if necessary) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            index: Mutex::new(StoreIndex::default()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index(&self) -> MutexGuard<'_, StoreIndex> {
        self.index.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deposit the files a job produced.
    ///
    /// Each file is hashed and copied into the store. A file whose name and
    /// digest both match an existing entry is deduplicated: the existing
    /// reference is returned and the extra producer recorded on the entry.
    /// A name collision with a different digest is an
    /// [`Error::ArtifactConflict`], since two jobs of one release must
    /// never disagree about an artifact's contents.
    pub fn deposit(&self, job_id: JobId, job_label: &str, files: &[PathBuf]) -> Result<Vec<ArtifactRef>> {
        let mut refs = Vec::with_capacity(files.len());
        for file in files {
            refs.push(self.deposit_one(job_id, job_label, file)?);
        }
        Ok(refs)
    }

    fn deposit_one(&self, job_id: JobId, job_label: &str, file: &Path) -> Result<ArtifactRef> {
        let reference = ArtifactRef::from_file(file)?;

        // Copy outside the lock, commit with a rename inside it.
        let staging = self.root.join(format!(".{}.partial", Uuid::new_v4()));
        std::fs::copy(file, &staging)?;

        let mut index = self.index();
        match index.by_name.get(&reference.name) {
            Some(existing) if *existing == reference.digest => {
                if let Some(entry) = index
                    .entries
                    .iter_mut()
                    .find(|e| e.reference.name == reference.name)
                {
                    if entry.job_id != job_id {
                        entry.also_produced_by.push(job_label.to_string());
                    }
                }
                drop(index);
                let _ = std::fs::remove_file(&staging);
                Ok(reference)
            }
            Some(_) => {
                let earlier = index
                    .entries
                    .iter()
                    .find(|e| e.reference.name == reference.name)
                    .map(|e| e.job_label.clone())
                    .unwrap_or_else(|| "unknown".to_string());
                drop(index);
                let _ = std::fs::remove_file(&staging);
                Err(Error::ArtifactConflict(format!(
                    "{} from {job_label} does not match the copy deposited by {earlier}",
                    reference.name
                )))
            }
            None => {
                let path = self.root.join(&reference.name);
                if let Err(e) = std::fs::rename(&staging, &path) {
                    drop(index);
                    let _ = std::fs::remove_file(&staging);
                    return Err(e.into());
                }
                index.by_name.insert(reference.name.clone(), reference.digest.clone());
                index.entries.push(StoredArtifact {
                    reference: reference.clone(),
                    job_id,
                    job_label: job_label.to_string(),
                    path,
                    stored_at: Utc::now(),
                    also_produced_by: Vec::new(),
                });
                Ok(reference)
            }
        }
    }

    /// All stored artifacts, in deposit order.
    pub fn list(&self) -> Vec<StoredArtifact> {
        self.index().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.index().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index().entries.is_empty()
    }
}
