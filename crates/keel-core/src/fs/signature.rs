//! Content signatures used for change detection.
//!
//! A signature is a blake3 digest rendered as lowercase hex. Two payloads
//! with the same signature are treated as the same content; the signature is
//! never used as an identity.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Hex digest of a resource's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentSignature(String);

impl ContentSignature {
    /// Wrap a signature received from elsewhere, e.g. a commit item.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into().to_ascii_lowercase())
    }

    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes signatures of files on disk.
pub trait SignatureCalculator: Send + Sync {
    fn file_signature(&self, path: &Path) -> anyhow::Result<ContentSignature>;
}

/// blake3 over the raw file content.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3SignatureCalculator;

impl SignatureCalculator for Blake3SignatureCalculator {
    fn file_signature(&self, path: &Path) -> anyhow::Result<ContentSignature> {
        let mut file = fs::File::open(path)
            .with_context(|| format!("Failed to open file for signing: {}", path.display()))?;
        let mut hasher = blake3::Hasher::new();
        std::io::copy(&mut file, &mut hasher)
            .with_context(|| format!("Failed to read file for signing: {}", path.display()))?;
        Ok(ContentSignature(hasher.finalize().to_hex().to_string()))
    }
}

/// Signature of an unpacked directory tree.
///
/// Entries are visited in lexicographic order and hashed as
/// `relative_path || 0x00 || content` for files and
/// `relative_path || 0xFF` for directories, so the result does not depend on
/// creation order. Symlinks are rejected.
pub fn tree_signature(root: &Path) -> anyhow::Result<ContentSignature> {
    let mut hasher = blake3::Hasher::new();
    hash_dir(&mut hasher, root, "")?;
    Ok(ContentSignature(hasher.finalize().to_hex().to_string()))
}

fn hash_dir(hasher: &mut blake3::Hasher, dir: &Path, base: &str) -> anyhow::Result<()> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read directory entries: {}", dir.display()))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        let rel_path = if base.is_empty() {
            name.to_string_lossy().to_string()
        } else {
            format!("{}/{}", base, name.to_string_lossy())
        };

        let ty = entry
            .file_type()
            .with_context(|| format!("Failed to stat: {}", entry.path().display()))?;

        hasher.update(rel_path.as_bytes());
        if ty.is_dir() {
            hasher.update(&[0xFF]);
            hash_dir(hasher, &entry.path(), &rel_path)?;
        } else if ty.is_file() {
            hasher.update(&[0x00]);
            let mut file = fs::File::open(entry.path())
                .with_context(|| format!("Failed to open: {}", entry.path().display()))?;
            std::io::copy(&mut file, hasher)
                .with_context(|| format!("Failed to read: {}", entry.path().display()))?;
        } else {
            anyhow::bail!(
                "Unsupported filesystem entry in signed tree: {}",
                entry.path().display()
            );
        }
    }

    Ok(())
}
