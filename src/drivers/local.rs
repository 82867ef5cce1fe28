//! Local filesystem backend: containers are first-level directories under a
//! base path, blobs are files below them.

use async_stream::try_stream;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::content::{file_checksum, infer_content_type, DEFAULT_CHECKSUM_BLOCK_SIZE};
use crate::driver::{
    transfer_to_target, BlobStream, ContainerStream, StorageDriver, DEFAULT_CHUNK_SIZE,
};
use crate::entity::{Blob, Container};
use crate::error::{StorageError, StorageResult};
use crate::names::{sanitize_object_name, validate_container_name};
use crate::types::{ByteStream, DownloadTarget, UploadOptions, UploadSource};

/// Filesystem-backed [`StorageDriver`].
pub struct LocalDriver {
    base_path: PathBuf,
    alias: String,
}

impl LocalDriver {
    /// Open (and create if absent) the storage root at `base_path`.
    pub async fn new<P, S>(base_path: P, alias: S) -> StorageResult<Self>
    where
        P: Into<PathBuf>,
        S: Into<String>,
    {
        let base_path = base_path.into();
        tokio::fs::create_dir_all(&base_path)
            .await
            .map_err(|err| classify_fs_error(err, "cannot create storage root"))?;
        Ok(Self {
            base_path,
            alias: alias.into(),
        })
    }

    /// Root directory this driver stores containers under
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn container_path(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }

    /// Join a blob key under a container, rejecting traversal components.
    fn blob_fs_path(&self, container_name: &str, blob_name: &str) -> StorageResult<PathBuf> {
        let mut path = self.container_path(container_name);
        for part in blob_name.split('/') {
            if part.is_empty() || part == "." || part == ".." {
                return Err(StorageError::invalid_name(format!(
                    "Invalid blob name {blob_name:?}"
                )));
            }
            path.push(part);
        }
        Ok(path)
    }

    async fn make_blob(
        self: Arc<Self>,
        container: &Container,
        name: String,
        path: &Path,
    ) -> StorageResult<Blob> {
        let meta = tokio::fs::metadata(path).await?;
        let checksum = file_checksum(path, DEFAULT_CHECKSUM_BLOCK_SIZE).await?;
        let content_type = match infer_content_type(path).await {
            ct if ct.is_empty() => None,
            ct => Some(ct),
        };

        Ok(Blob {
            name,
            size: meta.len(),
            etag: checksum.clone(),
            checksum,
            content_type,
            content_disposition: None,
            cache_control: None,
            meta_data: Default::default(),
            created_at: meta.created().ok().map(DateTime::<Utc>::from),
            modified_at: meta.modified().ok().map(DateTime::<Utc>::from),
            expires_at: None,
            container: container.clone(),
            driver: self.clone() as Arc<dyn StorageDriver>,
        })
    }
}

#[async_trait::async_trait]
impl StorageDriver for LocalDriver {
    fn name(&self) -> &str {
        "Local"
    }

    fn alias(&self) -> &str {
        &self.alias
    }

    fn get_containers(self: Arc<Self>) -> ContainerStream {
        Box::pin(try_stream! {
            let mut entries = tokio::fs::read_dir(&self.base_path).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    yield Container::new(
                        name,
                        Default::default(),
                        self.clone() as Arc<dyn StorageDriver>,
                    );
                }
            }
        })
    }

    async fn get_container(
        self: Arc<Self>,
        name: &str,
        validate: bool,
    ) -> StorageResult<Container> {
        if validate {
            let exists = tokio::fs::metadata(self.container_path(name))
                .await
                .map(|meta| meta.is_dir())
                .unwrap_or(false);
            if !exists {
                return Err(StorageError::container_not_found(name));
            }
        }
        Ok(Container::new(
            name.to_string(),
            Default::default(),
            self as Arc<dyn StorageDriver>,
        ))
    }

    async fn create_container(
        self: Arc<Self>,
        name: &str,
        _acl: Option<&str>,
    ) -> StorageResult<Container> {
        validate_container_name(name, false)?;
        tokio::fs::create_dir_all(self.container_path(name))
            .await
            .map_err(|err| classify_fs_error(err, "cannot create container directory"))?;
        debug!(container = name, "created container directory");
        Ok(Container::new(
            name.to_string(),
            Default::default(),
            self as Arc<dyn StorageDriver>,
        ))
    }

    async fn delete_container(self: Arc<Self>, container: &Container) -> StorageResult<bool> {
        let path = self.container_path(&container.name);
        if tokio::fs::metadata(&path).await.is_err() {
            return Ok(false);
        }
        let mut entries = tokio::fs::read_dir(&path).await?;
        if entries.next_entry().await?.is_some() {
            return Err(StorageError::not_empty(&container.name));
        }
        tokio::fs::remove_dir(&path).await?;
        Ok(true)
    }

    fn get_blobs(self: Arc<Self>, container: Container) -> BlobStream {
        let root = self.container_path(&container.name);
        Box::pin(try_stream! {
            let mut pending = vec![root.clone()];
            while let Some(dir) = pending.pop() {
                let mut entries = tokio::fs::read_dir(&dir).await?;
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    if entry.file_type().await?.is_dir() {
                        pending.push(path);
                        continue;
                    }
                    let name = path
                        .strip_prefix(&root)
                        .map(|p| p.to_string_lossy().into_owned())
                        .unwrap_or_else(|_| entry.file_name().to_string_lossy().into_owned());
                    let blob = self.clone().make_blob(&container, name, &path).await?;
                    yield blob;
                }
            }
        })
    }

    async fn get_blob(
        self: Arc<Self>,
        container: &Container,
        blob_name: &str,
    ) -> StorageResult<Blob> {
        let path = self.blob_fs_path(&container.name, blob_name)?;
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(StorageError::blob_not_found(blob_name, &container.name));
        }
        self.make_blob(container, blob_name.to_string(), &path).await
    }

    async fn upload_blob(
        self: Arc<Self>,
        container: &Container,
        source: UploadSource,
        blob_name: &str,
        options: UploadOptions,
    ) -> StorageResult<Blob> {
        let key = if options.blob_path.is_empty() {
            blob_name.to_string()
        } else {
            format!("{}/{}", options.blob_path, blob_name)
        };
        let key = sanitize_object_name(&key);
        if key.is_empty() {
            return Err(StorageError::invalid_name("Blob name cannot be empty."));
        }

        let path = self.blob_fs_path(&container.name, &key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| classify_fs_error(err, "cannot create blob directory"))?;
        }

        match source {
            UploadSource::Path(src) => {
                tokio::fs::copy(&src, &path).await?;
            }
            UploadSource::Stream(stream) | UploadSource::NamedStream { stream, .. } => {
                write_stream(stream, &path).await?;
            }
        }
        debug!(container = %container.name, blob = %key, "stored blob");

        self.get_blob(container, &key).await
    }

    async fn download_blob(
        self: Arc<Self>,
        blob: &Blob,
        destination: DownloadTarget,
    ) -> StorageResult<()> {
        let path = self.blob_fs_path(&blob.container.name, &blob.name)?;
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(StorageError::blob_not_found(&blob.name, &blob.container.name));
        }
        transfer_to_target(file_byte_stream(path, DEFAULT_CHUNK_SIZE), destination).await
    }

    async fn delete_blob(self: Arc<Self>, blob: &Blob) -> StorageResult<()> {
        let path = self.blob_fs_path(&blob.container.name, &blob.name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(
                StorageError::blob_not_found(&blob.name, &blob.container.name),
            ),
            Err(err) => Err(err.into()),
        }
    }
}

/// Permission failures surface as credential errors, everything else as I/O.
fn classify_fs_error(err: std::io::Error, context: &str) -> StorageError {
    if err.kind() == std::io::ErrorKind::PermissionDenied {
        StorageError::credentials(format!("{context}: {err}"))
    } else {
        err.into()
    }
}

fn file_byte_stream(path: PathBuf, chunk_size: usize) -> ByteStream {
    Box::pin(try_stream! {
        let mut file = tokio::fs::File::open(&path).await?;
        let mut buf = vec![0u8; chunk_size];
        loop {
            let read = file.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            yield Bytes::copy_from_slice(&buf[..read]);
        }
    })
}

async fn write_stream(mut stream: ByteStream, path: &Path) -> StorageResult<()> {
    use futures_util::StreamExt;

    let mut file = tokio::fs::File::create(path).await?;
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    async fn driver() -> (tempfile::TempDir, Arc<LocalDriver>) {
        let dir = tempfile::tempdir().unwrap();
        let driver = LocalDriver::new(dir.path(), "fs").await.unwrap();
        (dir, Arc::new(driver))
    }

    #[tokio::test]
    async fn test_container_lifecycle() {
        let (_dir, driver) = driver().await;

        let container = driver.clone().create_container("bucket-a", None).await.unwrap();
        assert_eq!(container.name, "bucket-a");
        // Idempotent
        driver.clone().create_container("bucket-a", None).await.unwrap();

        let fetched = driver.clone().get_container("bucket-a", true).await.unwrap();
        assert_eq!(fetched, container);
        assert!(matches!(
            driver.clone().get_container("missing", true).await,
            Err(StorageError::NotFound { .. })
        ));

        assert!(driver.clone().delete_container(&container).await.unwrap());
        // Second delete reports absence, not an error
        assert!(!driver.clone().delete_container(&container).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_container_not_empty() {
        let (_dir, driver) = driver().await;
        let container = driver.clone().create_container("full", None).await.unwrap();
        driver
            .clone()
            .upload_blob(
                &container,
                UploadSource::bytes("content"),
                "file.txt",
                UploadOptions::new(),
            )
            .await
            .unwrap();

        assert!(matches!(
            driver.clone().delete_container(&container).await,
            Err(StorageError::NotEmpty { .. })
        ));
    }

    #[tokio::test]
    async fn test_blob_round_trip() {
        let (dir, driver) = driver().await;
        let container = driver.clone().create_container("data", None).await.unwrap();

        let blob = driver
            .clone()
            .upload_blob(
                &container,
                UploadSource::bytes(&b"hello"[..]),
                "greeting.txt",
                UploadOptions::new().with_blob_path("nested"),
            )
            .await
            .unwrap();
        assert_eq!(blob.name, "nested/greeting.txt");
        assert_eq!(blob.size, 5);
        assert_eq!(blob.checksum, "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(blob.content_type.as_deref(), Some("text/plain"));

        let dest = dir.path().join("out.txt");
        driver
            .clone()
            .download_blob(&blob, DownloadTarget::path(&dest))
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");

        driver.clone().delete_blob(&blob).await.unwrap();
        assert!(matches!(
            driver.clone().get_blob(&container, "nested/greeting.txt").await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_enumeration_walks_nested_keys() {
        let (_dir, driver) = driver().await;
        let container = driver.clone().create_container("walk", None).await.unwrap();
        for name in ["a.txt", "sub/b.txt", "sub/deep/c.txt"] {
            driver
                .clone()
                .upload_blob(
                    &container,
                    UploadSource::bytes("x"),
                    name,
                    UploadOptions::new(),
                )
                .await
                .unwrap();
        }

        let blobs: Vec<Blob> = driver
            .clone()
            .get_blobs(container.clone())
            .try_collect()
            .await
            .unwrap();
        let mut names: Vec<String> = blobs.into_iter().map(|b| b.name).collect();
        names.sort();
        assert_eq!(names, ["a.txt", "sub/b.txt", "sub/deep/c.txt"]);
    }

    #[tokio::test]
    async fn test_traversal_components_rejected() {
        let (_dir, driver) = driver().await;
        let container = driver.clone().create_container("jail", None).await.unwrap();
        assert!(matches!(
            driver.clone().get_blob(&container, "../escape.txt").await,
            Err(StorageError::InvalidName { .. })
        ));
    }

    #[tokio::test]
    async fn test_zero_byte_upload() {
        let (_dir, driver) = driver().await;
        let container = driver.clone().create_container("empty", None).await.unwrap();
        let blob = driver
            .clone()
            .upload_blob(
                &container,
                UploadSource::bytes(Bytes::new()),
                "zero.bin",
                UploadOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(blob.size, 0);
        assert_eq!(blob.checksum, "d41d8cd98f00b204e9800998ecf8427e");
    }
}
