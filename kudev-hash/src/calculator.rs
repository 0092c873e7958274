//! Source tree digest.
//!
//! ## Algorithm
//!
//! 1. Walk `root`; skip excluded directories without descending.
//! 2. For each remaining file: `sha256(relative_path || bytes)` → hex.
//! 3. Sort the per-file hex digests (traversal order is filesystem-dependent).
//! 4. `sha256(concat(sorted))` → first 8 hex characters.
//!
//! The relative path is part of each file hash, so a pure rename changes the
//! digest.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use kudev_core::SourceDigest;

use crate::error::{io_err, HashError};
use crate::exclude::Exclusions;

/// Length of the truncated digest, in hex characters.
pub const DIGEST_LEN: usize = 8;

/// Digest calculator bound to a root and an exclusion set.
#[derive(Debug, Clone)]
pub struct HashCalculator {
    root: PathBuf,
    exclusions: Exclusions,
}

impl HashCalculator {
    pub fn new(root: impl Into<PathBuf>, exclusions: Exclusions) -> Self {
        Self {
            root: root.into(),
            exclusions,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exclusions(&self) -> &Exclusions {
        &self.exclusions
    }

    /// Digest the tree as it is right now.
    pub fn calculate(&self) -> Result<SourceDigest, HashError> {
        let mut file_hashes = Vec::new();
        let mut dirs = vec![self.root.clone()];

        while let Some(dir) = dirs.pop() {
            let entries = fs::read_dir(&dir).map_err(|e| io_err(&dir, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| io_err(&dir, e))?;
                let path = entry.path();
                let rel = relative_key(&self.root, &path);
                if self.exclusions.should_exclude(&rel) {
                    continue;
                }

                let ty = entry.file_type().map_err(|e| io_err(&path, e))?;
                if ty.is_dir() {
                    dirs.push(path);
                } else if ty.is_file() || (ty.is_symlink() && path.is_file()) {
                    file_hashes.push(hash_file(&path, &rel)?);
                }
            }
        }

        if file_hashes.is_empty() {
            return Err(HashError::NoFiles {
                root: self.root.clone(),
            });
        }

        file_hashes.sort_unstable();
        let mut combined = Sha256::new();
        for hash in &file_hashes {
            combined.update(hash.as_bytes());
        }
        let full = hex::encode(combined.finalize());
        let digest = SourceDigest(full[..DIGEST_LEN].to_string());

        tracing::debug!(
            root = %self.root.display(),
            files = file_hashes.len(),
            digest = %digest,
            "calculated source digest",
        );
        Ok(digest)
    }
}

/// Digest `root` with the default exclusions plus `extra`.
pub fn calculate<S: AsRef<str>>(root: &Path, extra: &[S]) -> Result<SourceDigest, HashError> {
    HashCalculator::new(root, Exclusions::new(extra)?).calculate()
}

fn hash_file(path: &Path, rel: &str) -> Result<String, HashError> {
    let mut hasher = Sha256::new();
    hasher.update(rel.as_bytes());
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    io::copy(&mut file, &mut hasher).map_err(|e| io_err(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// `/`-separated path of `path` relative to `root`.
pub fn relative_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
