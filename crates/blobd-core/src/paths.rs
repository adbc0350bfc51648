//! Destination and checkpoint path derivation.

use std::path::{Path, PathBuf};

use crate::job::{JobDecodeError, SourceLocation};

/// Suffix appended to a destination path to name its checkpoint file.
pub const CHECKPOINT_SUFFIX: &str = ".resume-download";

/// Rejects buckets and keys that would escape the destination folder.
///
/// The bucket must be one plain path segment; the key must be relative with
/// no empty, `.` or `..` segments.
pub fn validate_source(source: &SourceLocation) -> Result<(), JobDecodeError> {
    let bucket = source.bucket.as_str();
    if bucket.is_empty() || bucket == "." || bucket == ".." || bucket.contains(['/', '\\', '\0']) {
        return Err(JobDecodeError::InvalidSource(format!("bucket {:?}", bucket)));
    }
    let key = source.key.as_str();
    if key.is_empty() || key.contains(['\\', '\0']) {
        return Err(JobDecodeError::InvalidSource(format!("key {:?}", key)));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(JobDecodeError::InvalidSource(format!("key {:?}", key)));
    }
    Ok(())
}

/// Destination for an object: `<root>/<bucket>/<key>`.
pub fn destination_path(root: &Path, source: &SourceLocation) -> PathBuf {
    let mut path = root.join(&source.bucket);
    path.extend(source.key.split('/'));
    path
}

/// Checkpoint location for a destination (e.g. `file.iso` → `file.iso.resume-download`).
pub fn checkpoint_path(destination: &Path) -> PathBuf {
    let mut o = destination.as_os_str().to_owned();
    o.push(CHECKPOINT_SUFFIX);
    PathBuf::from(o)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(bucket: &str, key: &str) -> SourceLocation {
        SourceLocation {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    #[test]
    fn destination_joins_bucket_and_key() {
        let p = destination_path(Path::new("/data/downloads"), &source("b", "k"));
        assert_eq!(p, PathBuf::from("/data/downloads/b/k"));
        let p = destination_path(Path::new("/data"), &source("media", "2024/clip.mp4"));
        assert_eq!(p, PathBuf::from("/data/media/2024/clip.mp4"));
    }

    #[test]
    fn checkpoint_appends_suffix() {
        let p = checkpoint_path(Path::new("/data/b/k.bin"));
        assert_eq!(p.to_string_lossy(), "/data/b/k.bin.resume-download");
    }

    #[test]
    fn accepts_nested_keys() {
        assert!(validate_source(&source("b", "a/b/c.txt")).is_ok());
        assert!(validate_source(&source("my-bucket", "file..name")).is_ok());
    }

    #[test]
    fn rejects_traversal() {
        assert!(validate_source(&source("b", "../etc/passwd")).is_err());
        assert!(validate_source(&source("b", "a/../../x")).is_err());
        assert!(validate_source(&source("b", "/abs")).is_err());
        assert!(validate_source(&source("..", "k")).is_err());
        assert!(validate_source(&source("a/b", "k")).is_err());
    }

    #[test]
    fn rejects_empty_parts() {
        assert!(validate_source(&source("", "k")).is_err());
        assert!(validate_source(&source("b", "")).is_err());
        assert!(validate_source(&source("b", "a//b")).is_err());
        assert!(validate_source(&source("b", "dir/")).is_err());
    }
}
