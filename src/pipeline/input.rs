//! Input resolution: validate a user-supplied path before rendering.
//!
//! pdfium reports a missing file and a corrupt file with the same opaque
//! error, so the checks here run first and give the record a message the
//! caller can act on. The `%PDF` magic-byte check also keeps obviously wrong
//! inputs (a JPEG, a Word file) from reaching the renderer at all.

use crate::error::FileError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate `path_str` and return it as a `PathBuf`.
pub fn resolve_local(path_str: &str) -> Result<PathBuf, FileError> {
    let path = PathBuf::from(path_str);

    if !path.is_file() {
        return Err(FileError::render(format!(
            "PDF file not found: '{}'",
            path.display()
        )));
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
                return Err(FileError::render(format!(
                    "File is not a valid PDF: '{}'",
                    path.display()
                )));
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(FileError::render(format!(
                "Permission denied reading '{}'",
                path.display()
            )));
        }
        Err(e) => {
            return Err(FileError::render(format!(
                "Cannot open '{}': {}",
                path.display(),
                e
            )));
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

/// The name a record is tagged with: the file name without its directory.
pub fn source_name(path_str: &str) -> String {
    Path::new(path_str)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str.to_string())
}
