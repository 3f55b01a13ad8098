//! Zip archive extraction for packed live activities.

use std::fs;
use std::io::{Read, Seek};
use std::path::Path;

use anyhow::Context;

/// Extract a zip archive into `dest`, creating it if needed.
///
/// Entries whose names would land outside `dest` (absolute paths, `..`)
/// abort the extraction.
pub fn unpack_zip<R: Read + Seek>(reader: R, dest: &Path) -> anyhow::Result<usize> {
    let mut archive = zip::ZipArchive::new(reader).context("Failed to read zip archive")?;

    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create directory: {}", dest.display()))?;

    let mut files = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read zip entry {}", i))?;

        let Some(relative) = entry.enclosed_name() else {
            anyhow::bail!("Zip entry '{}' escapes the extraction directory", entry.name());
        };
        let outpath = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath)
                .with_context(|| format!("Failed to create directory: {}", outpath.display()))?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create parent directory: {}", parent.display())
            })?;
        }

        let mut outfile = fs::File::create(&outpath)
            .with_context(|| format!("Failed to create file: {}", outpath.display()))?;
        std::io::copy(&mut entry, &mut outfile)
            .with_context(|| format!("Failed to extract zip entry: {}", entry.name()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode)).ok();
            }
        }

        files += 1;
    }

    Ok(files)
}
