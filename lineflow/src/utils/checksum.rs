//! Content checksums for change detection.
//!
//! The digest identifies different code being used across runs of
//! textually-identical configuration; it is a change detector, not a
//! security boundary, so a fast fixed-width hash is sufficient.

use md5::{Digest, Md5};
use std::path::Path;

/// Hex-encoded MD5 digest of the given bytes.
#[must_use]
pub fn md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Checksums the module file at `path`, if it exists.
///
/// Returns `Ok(None)` when the path does not name an existing file,
/// matching the caller's "checksum only what is resolvable" contract.
pub async fn module_file_checksum(path: &str) -> std::io::Result<Option<String>> {
    if path.is_empty() || !Path::new(path).is_file() {
        return Ok(None);
    }
    let contents = tokio::fs::read(path).await?;
    Ok(Some(md5_hex(&contents)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_md5_hex_is_stable() {
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[tokio::test]
    async fn test_missing_file_yields_none() {
        let checksum = module_file_checksum("/no/such/module.py").await.unwrap();
        assert_eq!(checksum, None);
    }

    #[tokio::test]
    async fn test_contents_drive_checksum() {
        let mut first = tempfile::NamedTempFile::new().unwrap();
        writeln!(first, "def preprocess(): pass").unwrap();
        let mut second = tempfile::NamedTempFile::new().unwrap();
        writeln!(second, "def preprocess(): return 1").unwrap();

        let a = module_file_checksum(first.path().to_str().unwrap())
            .await
            .unwrap();
        let b = module_file_checksum(second.path().to_str().unwrap())
            .await
            .unwrap();
        assert!(a.is_some());
        assert_ne!(a, b);
    }
}
