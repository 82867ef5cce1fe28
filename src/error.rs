use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Container or object name failed validation. Never retried; the caller
    /// must fix its input.
    #[error("Invalid name: {message}")]
    InvalidName { message: String },

    /// Address string does not match `store://container/blob` or names an
    /// unknown store kind.
    #[error("Invalid file URL: {url}")]
    InvalidFileUrl { url: String },

    /// Referenced container or blob does not exist at the backend.
    #[error("{message}")]
    NotFound { message: String },

    /// Container deletion blocked by non-empty contents.
    #[error("Container {name} is not empty")]
    NotEmpty { name: String },

    /// Source content is zero-length where a non-empty source is required.
    #[error("File {name} is empty")]
    Empty { name: String },

    /// Permission or credential failure.
    #[error("Credentials error: {message}")]
    Credentials { message: String },

    /// Operation not supported by this driver.
    #[error("Operation not supported by this driver")]
    Unsupported,

    /// Configuration and orchestration failures that map to nothing more
    /// specific.
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Backend fault carrying the original error for diagnostics.
    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Create an invalid name error
    pub fn invalid_name<S: Into<String>>(message: S) -> Self {
        Self::InvalidName {
            message: message.into(),
        }
    }

    /// Create an invalid file URL error
    pub fn invalid_file_url<S: Into<String>>(url: S) -> Self {
        Self::InvalidFileUrl { url: url.into() }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a blob not found error with the standard message
    pub fn blob_not_found(blob_name: &str, container_name: &str) -> Self {
        Self::NotFound {
            message: format!("Blob {blob_name} not found in container {container_name}"),
        }
    }

    /// Create a container not found error with the standard message
    pub fn container_not_found(container_name: &str) -> Self {
        Self::NotFound {
            message: format!("Container {container_name} not found"),
        }
    }

    /// Create a not empty error
    pub fn not_empty<S: Into<String>>(name: S) -> Self {
        Self::NotEmpty { name: name.into() }
    }

    /// Create an empty file error
    pub fn empty<S: Into<String>>(name: S) -> Self {
        Self::Empty { name: name.into() }
    }

    /// Create a credentials error
    pub fn credentials<S: Into<String>>(message: S) -> Self {
        Self::Credentials {
            message: message.into(),
        }
    }

    /// Create a generic storage error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }
}
