//! # dog-store: Unified blob-storage façade
//!
//! `dog-store` gives DogRS applications one API surface for uploading,
//! downloading, and enumerating binary objects across heterogeneous backing
//! stores (local filesystem, S3-compatible object storage), addressed through
//! a single `store://container/blob` URL scheme independent of the provider.
//!
//! ## Key Features
//!
//! - **One address scheme**: every stored object is identified by a
//!   `store://container/blob` file URL, reconstructible from its parts
//! - **Pluggable drivers**: a local filesystem backend and an S3-compatible
//!   backend ship in the box, behind one `StorageDriver` contract
//! - **Streaming transfers**: uploads and downloads move in bounded chunks,
//!   never buffering whole objects where the backend allows it
//! - **Naming policies**: destination names derive from the source (`Auto`),
//!   a collision-free random token (`Random`), the batch key (`UseKey`), or a
//!   literal name
//! - **Concurrent batches**: `bulk_upload`/`bulk_download` fan out over all
//!   items at once and key their results by the caller's own map keys
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dog_store::prelude::*;
//! use dog_store::{StoreSettings, DestName};
//!
//! # #[tokio::main]
//! # async fn main() -> StorageResult<()> {
//! // 1. Declare stores and configure the façade
//! let settings = StorageSettings::new()
//!     .with_store(StoreSettings::new("fs", "/var/lib/app-storage", "local"))
//!     .enable_driver("local")
//!     .with_default_store("fs")
//!     .with_default_container("uploads");
//! let storage = CloudStorage::configure(&settings).await?;
//!
//! // 2. Upload; the blob's file URL is its stable address
//! let blob = storage
//!     .upload(
//!         UploadSource::path("photos/cat.jpg"),
//!         DestName::Random,
//!         "",
//!         None,
//!         None,
//!     )
//!     .await?;
//! let url = blob.file_url();
//!
//! // 3. Download it anywhere by URL
//! let path = storage
//!     .download(&url, DownloadDest::Auto, Some("/tmp/out".as_ref()))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
mod config;
pub mod content;
pub mod driver;
pub mod drivers;
mod entity;
mod error;
pub mod names;
mod registry;
mod types;
pub mod url;

// Re-export main types for clean API
pub use adapter::{CloudStorage, DownloadDest};
pub use config::{DriverKind, StorageSettings, StoreSettings};
pub use driver::{BlobStream, ContainerStream, StorageDriver, DEFAULT_CHUNK_SIZE};
pub use drivers::{LocalDriver, MinioDriver};
pub use entity::{Blob, Container};
pub use error::{StorageError, StorageResult};
pub use registry::Registry;
pub use types::{
    ByteStream, DestName, DownloadTarget, DownloadUrlOptions, FormPost, UploadOptions,
    UploadSource, UploadUrlOptions,
};
pub use url::{is_file_url, FileUrl};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Blob, CloudStorage, Container, DownloadDest, FileUrl, Registry, StorageDriver,
        StorageError, StorageResult, StorageSettings, UploadSource,
    };
}
