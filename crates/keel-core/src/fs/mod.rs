//! Filesystem primitives shared across features.

pub mod archive;
pub mod signature;

pub use archive::unpack_zip;
pub use signature::{Blake3SignatureCalculator, ContentSignature, SignatureCalculator, tree_signature};

/// Reject names received from peers that cannot be used as a single path
/// segment.
pub fn ensure_plain_name(kind: &str, name: &str) -> anyhow::Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        anyhow::bail!("Illegal {} '{}': must be a single path segment", kind, name);
    }
    Ok(())
}
