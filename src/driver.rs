use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use crate::entity::{Blob, Container};
use crate::error::{StorageError, StorageResult};
use crate::types::{
    ByteStream, DownloadTarget, DownloadUrlOptions, FormPost, UploadOptions, UploadSource,
    UploadUrlOptions,
};

/// Chunk size used when streaming blob content
pub const DEFAULT_CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// Lazy stream of containers
pub type ContainerStream = Pin<Box<dyn Stream<Item = StorageResult<Container>> + Send>>;

/// Lazy stream of blobs
pub type BlobStream = Pin<Box<dyn Stream<Item = StorageResult<Blob>> + Send>>;

/// Contract every storage backend implements.
///
/// Methods take `self: Arc<Self>` so drivers can hand entities a reference
/// back to themselves; callers hold drivers behind `Arc<dyn StorageDriver>`.
///
/// Transfers stream in bounded chunks. Entities returned by enumeration carry
/// the same capabilities as entities fetched directly.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Logical store name; doubles as the file URL scheme
    fn alias(&self) -> &str;

    /// Checksum algorithm reported in [`Blob::checksum`]
    fn hash_type(&self) -> &str {
        "md5"
    }

    /// Enumerate all containers in the store
    fn get_containers(self: Arc<Self>) -> ContainerStream;

    /// Fetch one container by name. With `validate` the name is checked
    /// against the container naming rules first.
    async fn get_container(self: Arc<Self>, name: &str, validate: bool)
        -> StorageResult<Container>;

    /// Create a container, or return the existing one. Creation is
    /// idempotent.
    async fn create_container(
        self: Arc<Self>,
        name: &str,
        acl: Option<&str>,
    ) -> StorageResult<Container>;

    /// Delete a container. Returns `false` if it was already absent and
    /// fails with [`StorageError::NotEmpty`] when it still holds blobs.
    async fn delete_container(self: Arc<Self>, container: &Container) -> StorageResult<bool>;

    /// Enumerate a container's blobs lazily
    fn get_blobs(self: Arc<Self>, container: Container) -> BlobStream;

    /// Fetch one blob's metadata
    async fn get_blob(self: Arc<Self>, container: &Container, blob_name: &str)
        -> StorageResult<Blob>;

    /// Store content under `blob_name`, overwriting any existing blob with
    /// that name.
    async fn upload_blob(
        self: Arc<Self>,
        container: &Container,
        source: UploadSource,
        blob_name: &str,
        options: UploadOptions,
    ) -> StorageResult<Blob>;

    /// Stream a blob's content into the destination
    async fn download_blob(
        self: Arc<Self>,
        blob: &Blob,
        destination: DownloadTarget,
    ) -> StorageResult<()>;

    /// Delete a blob
    async fn delete_blob(self: Arc<Self>, blob: &Blob) -> StorageResult<()>;

    /// Push updated blob metadata to the backend
    async fn patch_blob(self: Arc<Self>, blob: &Blob) -> StorageResult<()> {
        let _ = blob;
        Err(StorageError::Unsupported)
    }

    /// Generate a presigned upload descriptor scoped to one blob name
    async fn generate_container_upload_url(
        self: Arc<Self>,
        container: &Container,
        blob_name: &str,
        options: UploadUrlOptions,
    ) -> StorageResult<FormPost> {
        let _ = (container, blob_name, options);
        Err(StorageError::Unsupported)
    }

    /// Generate a presigned download URL for a blob
    async fn generate_blob_download_url(
        self: Arc<Self>,
        blob: &Blob,
        options: DownloadUrlOptions,
    ) -> StorageResult<String> {
        let _ = (blob, options);
        Err(StorageError::Unsupported)
    }
}

/// Drain a content stream into a download target. Path targets get their
/// parent directories created; writer targets are flushed but stay open.
pub(crate) async fn transfer_to_target(
    mut stream: ByteStream,
    destination: DownloadTarget,
) -> StorageResult<()> {
    match destination {
        DownloadTarget::Path(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            let mut file = tokio::fs::File::create(&path).await?;
            while let Some(chunk) = stream.next().await {
                file.write_all(&chunk?).await?;
            }
            file.flush().await?;
        }
        DownloadTarget::Writer(mut writer) => {
            while let Some(chunk) = stream.next().await {
                std::io::Write::write_all(&mut writer, &chunk?)?;
            }
            std::io::Write::flush(&mut writer)?;
        }
    }
    Ok(())
}
