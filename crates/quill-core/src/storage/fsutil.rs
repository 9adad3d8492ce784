//! Filesystem utilities for atomic writes.

use std::fs;
use std::io;
use std::path::Path;

/// Write `contents` to `path` atomically: write a temp file in the same
/// directory, then rename over the destination.
///
/// On platforms where rename fails if the target exists (notably
/// Windows), the destination is removed and the rename retried. The temp
/// file is cleaned up on failure.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, contents)?;

    if let Err(initial_err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(path);
        fs::rename(&temp_path, path).map_err(|retry_err| {
            let _ = fs::remove_file(&temp_path);
            io::Error::new(
                retry_err.kind(),
                format!(
                    "Atomic write failed (initial: {}, retry: {})",
                    initial_err, retry_err
                ),
            )
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_new_file() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("record.json");

        write_atomic(&dest, b"test").unwrap();

        assert_eq!(fs::read_to_string(&dest).unwrap(), "test");
        assert!(!dest.with_extension("tmp").exists());
    }

    #[test]
    fn test_write_overwrites_existing() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("record.json");

        fs::write(&dest, b"old").unwrap();
        write_atomic(&dest, b"new").unwrap();

        assert_eq!(fs::read_to_string(&dest).unwrap(), "new");
    }
}
