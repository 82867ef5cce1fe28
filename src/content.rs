use md5::{Digest, Md5};
use std::collections::HashMap;
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::error::{StorageError, StorageResult};

/// Chunk size for checksum reads
pub const DEFAULT_CHECKSUM_BLOCK_SIZE: usize = 4096;

/// Bytes read from the head of a file for content sniffing
const SNIFF_LEN: usize = 512;

/// Infer the content type of a local file: sniff well-known magic bytes when
/// the file exists, otherwise guess from the extension. Returns an empty
/// string when undetermined; never fails.
pub async fn infer_content_type(path: &Path) -> String {
    let is_file = tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false);

    if is_file {
        if let Ok(mut file) = tokio::fs::File::open(path).await {
            let mut head = [0u8; SNIFF_LEN];
            if let Ok(read) = file.read(&mut head).await {
                if let Some(sniffed) = sniff_content_type(&head[..read]) {
                    return sniffed.to_string();
                }
            }
        }
    }

    guess_content_type(&path.to_string_lossy())
}

/// Guess a content type from a name/extension alone. Returns an empty string
/// when undetermined.
pub fn guess_content_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first_raw()
        .map(str::to_string)
        .unwrap_or_default()
}

fn sniff_content_type(head: &[u8]) -> Option<&'static str> {
    const SIGNATURES: [(&[u8], &str); 10] = [
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF8", "image/gif"),
        (b"%PDF", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1f\x8b", "application/gzip"),
        (b"BM", "image/bmp"),
        (b"OggS", "audio/ogg"),
        (b"fLaC", "audio/flac"),
        (b"ID3", "audio/mpeg"),
    ];

    for (magic, content_type) in SIGNATURES {
        if head.starts_with(magic) {
            return Some(content_type);
        }
    }
    // RIFF containers carry their subtype at offset 8
    if head.starts_with(b"RIFF") && head.len() >= 12 {
        return match &head[8..12] {
            b"WEBP" => Some("image/webp"),
            b"WAVE" => Some("audio/wav"),
            _ => None,
        };
    }
    None
}

/// Parse a Content-Disposition header value into its disposition type and
/// lowercase-keyed parameters.
///
/// A single left-to-right character scan: on each unquoted `;` the preceding
/// segment is committed (the first commit is the disposition type, later ones
/// become `field=value` parameters with literal backslashes stripped); quotes
/// toggle on unescaped `"` and adjust segment bounds; unquoted leading spaces
/// are skipped; whatever segment remains at end of input is committed.
///
/// Quoting is tracked for commit boundaries only, not for suppressing `=`
/// recognition, so a literal `=` inside a quoted value re-keys the parameter
/// to the text before it. Known quirk, kept as documented behavior.
pub fn parse_content_disposition(data: &str) -> (Option<String>, HashMap<String, String>) {
    let chars: Vec<char> = data.chars().collect();
    let length = chars.len();

    let mut dtype: Option<String> = None;
    let mut params: HashMap<String, String> = HashMap::new();
    let mut start = 0usize;
    let mut end = 0usize;
    let mut i = 0usize;
    let mut quoted = false;
    let mut previous: Option<char> = None;
    let mut field: Option<String> = None;

    let segment = |from: usize, to: usize| -> String {
        if to <= from {
            String::new()
        } else {
            chars[from..to].iter().collect()
        }
    };

    while i < length {
        let c = chars[i];
        if !quoted && c == ';' {
            if dtype.is_none() {
                dtype = Some(segment(start, end));
            } else if let Some(name) = field.take() {
                params.insert(name.to_lowercase(), segment(start, end).replace('\\', ""));
            }
            i += 1;
            start = i;
            end = i;
        } else if c == '"' {
            i += 1;
            if previous != Some('\\') {
                if !quoted {
                    start = i;
                }
                quoted = !quoted;
            } else {
                end = i;
            }
        } else if c == '=' {
            field = Some(segment(start, end));
            i += 1;
            start = i;
            end = i;
        } else if c == ' ' {
            i += 1;
            if !quoted && start == end {
                // Leading spaces
                start = i;
                end = i;
            }
        } else {
            i += 1;
            end = i;
        }

        previous = Some(c);
    }

    if i > 0 {
        if dtype.is_none() {
            dtype = Some(segment(start, end).to_lowercase());
        } else if let Some(name) = field.take() {
            params.insert(name.to_lowercase(), segment(start, end).replace('\\', ""));
        }
    }

    (dtype, params)
}

/// MD5 hex digest of a file, read in `block_size` chunks.
pub async fn file_checksum(path: &Path, block_size: usize) -> StorageResult<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; block_size.max(1)];
    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// MD5 hex digest of an in-memory buffer.
pub fn bytes_checksum(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}

/// Fail with [`StorageError::Empty`] if the file at `path` has no content.
pub async fn check_file_not_empty(path: &Path) -> StorageResult<()> {
    let meta = tokio::fs::metadata(path).await?;
    if meta.len() == 0 {
        return Err(StorageError::empty(path.to_string_lossy()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parsed(value: &str) -> (Option<String>, HashMap<String, String>) {
        parse_content_disposition(value)
    }

    #[test]
    fn test_parse_content_disposition_table() {
        assert_eq!(parsed(""), (None, HashMap::new()));
        assert_eq!(parsed("inline"), (Some("inline".into()), HashMap::new()));
        assert_eq!(parsed("\"inline\""), (Some("inline".into()), HashMap::new()));
        assert_eq!(
            parsed("attachment"),
            (Some("attachment".into()), HashMap::new())
        );
        assert_eq!(
            parsed("\"attachment\""),
            (Some("attachment".into()), HashMap::new())
        );

        let (dtype, params) = parsed("inline; filename=\"foo.html\"");
        assert_eq!(dtype.as_deref(), Some("inline"));
        assert_eq!(params.get("filename").map(String::as_str), Some("foo.html"));
        assert_eq!(params.len(), 1);

        let (dtype, params) = parsed("attachment; filename=\"foo.html\"");
        assert_eq!(dtype.as_deref(), Some("attachment"));
        assert_eq!(params.get("filename").map(String::as_str), Some("foo.html"));
    }

    #[test]
    fn test_parse_content_disposition_multiple_params() {
        let (dtype, params) = parsed("form-data; name=\"field\"; filename=\"a=b.txt\"");
        assert_eq!(dtype.as_deref(), Some("form-data"));
        assert_eq!(params.get("name").map(String::as_str), Some("field"));
        // `=` splits even inside quotes: the quoted value re-keys the
        // parameter and the original field name is lost
        assert_eq!(params.get("a").map(String::as_str), Some("b.txt"));
        assert!(!params.contains_key("filename"));
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("report.txt"), "text/plain");
        assert_eq!(guess_content_type("page.html"), "text/html");
        assert_eq!(guess_content_type("photo.jpg"), "image/jpeg");
        assert_eq!(guess_content_type("mystery.unknownext"), "");
    }

    #[test]
    fn test_sniff_content_type() {
        assert_eq!(
            sniff_content_type(b"\x89PNG\r\n\x1a\n0000"),
            Some("image/png")
        );
        assert_eq!(sniff_content_type(b"%PDF-1.7 ..."), Some("application/pdf"));
        assert_eq!(sniff_content_type(b"RIFF\x00\x00\x00\x00WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_content_type(b"plain old text"), None);
    }

    #[test]
    fn test_bytes_checksum() {
        assert_eq!(bytes_checksum(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(bytes_checksum(b"hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[tokio::test]
    async fn test_file_checksum_and_empty_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"hello")
            .unwrap();

        let digest = file_checksum(&path, 2).await.unwrap();
        assert_eq!(digest, "5d41402abc4b2a76b9719d911017c592");
        assert!(check_file_not_empty(&path).await.is_ok());

        let empty = dir.path().join("empty.bin");
        std::fs::File::create(&empty).unwrap();
        assert!(matches!(
            check_file_not_empty(&empty).await,
            Err(StorageError::Empty { .. })
        ));
    }

    #[tokio::test]
    async fn test_infer_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.dat");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"\x89PNG\r\n\x1a\n....")
            .unwrap();
        // Sniffed by content, not by the misleading extension
        assert_eq!(infer_content_type(&path).await, "image/png");

        // Missing file falls back to extension guessing
        assert_eq!(
            infer_content_type(Path::new("no/such/file.css")).await,
            "text/css"
        );
    }
}
