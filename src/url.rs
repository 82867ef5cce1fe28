use std::fmt;

use crate::error::{StorageError, StorageResult};

/// Store kinds recognized in a file URL scheme. The scheme token must contain
/// one of these (case-insensitive); this is a coarse filter, not a full
/// validation.
const KNOWN_STORE_TOKENS: [&str; 4] = ["minio", "fs", "gcs", "s3"];

/// Parsed `store://container/blob` address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUrl {
    /// Logical store name (file URL scheme)
    pub store: String,
    /// Container segment; never contains `/`
    pub container: String,
    /// Blob key; may itself contain slashes
    pub blob: String,
}

impl FileUrl {
    pub fn new<S, C, B>(store: S, container: C, blob: B) -> Self
    where
        S: Into<String>,
        C: Into<String>,
        B: Into<String>,
    {
        Self {
            store: store.into(),
            container: container.into(),
            blob: blob.into(),
        }
    }

    /// Parse a file URL, preserving the case of every segment.
    pub fn parse(url: &str) -> StorageResult<Self> {
        match split_file_url(url) {
            Some((store, container, blob)) if is_known_store(store) => Ok(Self {
                store: store.to_string(),
                container: container.to_string(),
                blob: blob.to_string(),
            }),
            _ => Err(StorageError::invalid_file_url(url)),
        }
    }
}

impl fmt::Display for FileUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.store, self.container, self.blob)
    }
}

/// True iff `url` matches `scheme://container/blob` and the scheme names a
/// known store kind.
pub fn is_file_url(url: &str) -> bool {
    matches!(split_file_url(url), Some((store, _, _)) if is_known_store(store))
}

/// `^([a-z0-9A-Z]{2,}):\/\/([^\/]+)\/(.{2,})$`
fn split_file_url(url: &str) -> Option<(&str, &str, &str)> {
    let (scheme, rest) = url.split_once("://")?;
    if scheme.chars().count() < 2 || !scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let (container, blob) = rest.split_once('/')?;
    if container.is_empty() || blob.chars().count() < 2 {
        return None;
    }
    Some((scheme, container, blob))
}

fn is_known_store(scheme: &str) -> bool {
    let scheme = scheme.to_ascii_lowercase();
    KNOWN_STORE_TOKENS
        .iter()
        .any(|token| scheme.contains(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_file_url() {
        assert!(is_file_url("fs://trash/abc.jpg"));
        assert!(is_file_url("fs12://trash/abc/jhfdf$#122.jpg"));
        assert!(is_file_url("minio://trash/abc/jhfdf$#122.jpg"));
        assert!(is_file_url("MINIO://trash/abc/jhfdf$#122.jpg"));
        assert!(is_file_url("S3://trash123/abc/jhfdf$#122.jpg"));
        assert!(is_file_url("GCS://trash123/abc/jhfdf$#122.jpg"));
        assert!(!is_file_url("RCS://trash123/abc/jhfdf$#122.jpg"));
        assert!(!is_file_url("HTTP://trash123/abc/jhfdf$#122.jpg"));
        assert!(!is_file_url("SSh://trash123/abc/jhfdf$#122.jpg"));
        assert!(!is_file_url("/trash123/abc/jhfdf$#122.jpg"));
        assert!(!is_file_url("http122.jpg"));
    }

    #[test]
    fn test_parse_file_url() {
        assert_eq!(
            FileUrl::parse("fs://trash/abc.jpg").unwrap(),
            FileUrl::new("fs", "trash", "abc.jpg")
        );
        assert_eq!(
            FileUrl::parse("fs12://trash/abc/jhfdf$#122.jpg").unwrap(),
            FileUrl::new("fs12", "trash", "abc/jhfdf$#122.jpg")
        );
        // Case is preserved exactly
        assert_eq!(
            FileUrl::parse("MINIO://trash/abc/jhfdf$#122.jpg").unwrap(),
            FileUrl::new("MINIO", "trash", "abc/jhfdf$#122.jpg")
        );
        assert!(FileUrl::parse("HTTP://trash123/abc.jpg").is_err());
        assert!(FileUrl::parse("not a url").is_err());
    }

    #[test]
    fn test_round_trip() {
        for (store, container, blob) in [
            ("fs", "trash", "abc.jpg"),
            ("minio", "bucket-1", "deep/path/to/key.bin"),
            ("S3", "caps", "Key.With.Dots"),
        ] {
            let url = FileUrl::new(store, container, blob).to_string();
            let parsed = FileUrl::parse(&url).unwrap();
            assert_eq!(parsed.store, store);
            assert_eq!(parsed.container, container);
            assert_eq!(parsed.blob, blob);
        }
    }
}
