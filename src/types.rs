use bytes::Bytes;
use futures_core::Stream;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::Pin;

/// Stream of bytes for blob content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Source of an upload: a file path, a raw byte stream, or a byte stream that
/// declares its own filename.
pub enum UploadSource {
    /// Path to a file on the local filesystem
    Path(PathBuf),
    /// Anonymous byte stream
    Stream(ByteStream),
    /// Byte stream with a declared filename (e.g. a form upload)
    NamedStream {
        name: String,
        stream: ByteStream,
    },
}

impl UploadSource {
    /// Source from a file path
    pub fn path<P: Into<PathBuf>>(path: P) -> Self {
        Self::Path(path.into())
    }

    /// Source from a byte stream
    pub fn stream(stream: ByteStream) -> Self {
        Self::Stream(stream)
    }

    /// Source from a byte stream carrying its own filename
    pub fn named_stream<S: Into<String>>(name: S, stream: ByteStream) -> Self {
        Self::NamedStream {
            name: name.into(),
            stream,
        }
    }

    /// Source from an in-memory buffer
    pub fn bytes<B: Into<Bytes>>(data: B) -> Self {
        let data = data.into();
        Self::Stream(Box::pin(futures_util::stream::once(async move {
            Ok(data)
        })))
    }

    /// Source from an in-memory buffer carrying a filename
    pub fn named_bytes<S: Into<String>, B: Into<Bytes>>(name: S, data: B) -> Self {
        let data = data.into();
        Self::NamedStream {
            name: name.into(),
            stream: Box::pin(futures_util::stream::once(async move { Ok(data) })),
        }
    }

    /// Filename suggested by the source itself: the basename of the path or
    /// of the declared stream name. Anonymous streams suggest nothing.
    pub fn suggested_name(&self) -> Option<String> {
        match self {
            Self::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            Self::NamedStream { name, .. } => {
                Some(basename(name).to_string())
            }
            Self::Stream(_) => None,
        }
    }
}

impl std::fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::NamedStream { name, .. } => {
                f.debug_struct("NamedStream").field("name", name).finish()
            }
        }
    }
}

impl From<&Path> for UploadSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for UploadSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

/// Destination name policy for uploads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestName {
    /// Derive the name from the source's own filename
    Auto,
    /// Generate a random unique token, preserving the source's extension
    Random,
    /// Use the batch item's mapping key as the name (bulk uploads only)
    UseKey,
    /// Use the given name verbatim
    Name(String),
}

impl From<&str> for DestName {
    fn from(value: &str) -> Self {
        match value {
            "auto" => Self::Auto,
            "random" => Self::Random,
            "usekey" => Self::UseKey,
            other => Self::Name(other.to_string()),
        }
    }
}

impl From<String> for DestName {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

/// Destination of a driver-level download: a path opened for binary write or
/// an already-open writable handle. Each transfer owns its destination
/// exclusively.
pub enum DownloadTarget {
    /// Write to the file at this path, creating or truncating it
    Path(PathBuf),
    /// Write into an already-open synchronous handle
    Writer(Box<dyn Write + Send>),
}

impl DownloadTarget {
    /// Target the file at `path`
    pub fn path<P: Into<PathBuf>>(path: P) -> Self {
        Self::Path(path.into())
    }

    /// Target an open writable handle
    pub fn writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self::Writer(Box::new(writer))
    }
}

impl std::fmt::Debug for DownloadTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

/// Options for a driver-level blob upload
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Key prefix joined in front of the blob name
    pub blob_path: String,
    /// Canned ACL to apply, if the backend supports one
    pub acl: Option<String>,
    /// Free-form object metadata
    pub meta_data: HashMap<String, String>,
    /// Content type; inferred from the source when empty
    pub content_type: String,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
    /// Extra driver-specific options
    pub extra: HashMap<String, String>,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key prefix joined in front of the blob name
    pub fn with_blob_path<S: Into<String>>(mut self, blob_path: S) -> Self {
        self.blob_path = blob_path.into();
        self
    }

    /// Set the canned ACL
    pub fn with_acl<S: Into<String>>(mut self, acl: S) -> Self {
        self.acl = Some(acl.into());
        self
    }

    /// Add one metadata entry
    pub fn with_meta<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.meta_data.insert(key.into(), value.into());
        self
    }

    /// Set the content type explicitly, disabling inference
    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_content_disposition<S: Into<String>>(mut self, value: S) -> Self {
        self.content_disposition = Some(value.into());
        self
    }

    pub fn with_cache_control<S: Into<String>>(mut self, value: S) -> Self {
        self.cache_control = Some(value.into());
        self
    }

    /// Add one extra driver-specific option
    pub fn with_extra<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Presigned upload descriptor: the URL to send the object to plus the form
/// fields/headers the backend expects alongside it.
#[derive(Debug, Clone)]
pub struct FormPost {
    pub url: String,
    pub fields: HashMap<String, String>,
}

/// Options for generating a presigned upload URL
#[derive(Debug, Clone)]
pub struct UploadUrlOptions {
    /// Seconds until the URL expires
    pub expires: u64,
    pub acl: Option<String>,
    pub meta_data: HashMap<String, String>,
    pub content_disposition: Option<String>,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    /// Accepted content length range `(min, max)` in bytes
    pub content_length: Option<(u64, u64)>,
}

impl Default for UploadUrlOptions {
    fn default() -> Self {
        Self {
            expires: 3600,
            acl: None,
            meta_data: HashMap::new(),
            content_disposition: None,
            content_type: None,
            cache_control: None,
            content_length: None,
        }
    }
}

impl UploadUrlOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_expires(mut self, seconds: u64) -> Self {
        self.expires = seconds;
        self
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_content_length(mut self, min: u64, max: u64) -> Self {
        self.content_length = Some((min, max));
        self
    }
}

/// Options for generating a presigned download URL
#[derive(Debug, Clone)]
pub struct DownloadUrlOptions {
    /// Seconds until the URL expires
    pub expires: u64,
    pub content_disposition: Option<String>,
}

impl Default for DownloadUrlOptions {
    fn default() -> Self {
        Self {
            expires: 3600,
            content_disposition: None,
        }
    }
}

impl DownloadUrlOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_expires(mut self, seconds: u64) -> Self {
        self.expires = seconds;
        self
    }

    pub fn with_content_disposition<S: Into<String>>(mut self, value: S) -> Self {
        self.content_disposition = Some(value.into());
        self
    }
}

/// Last path segment of a slash-delimited key
pub(crate) fn basename(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
