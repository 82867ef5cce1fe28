use futures::future::try_join_all;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::config::StorageSettings;
use crate::entity::{Blob, Container};
use crate::error::{StorageError, StorageResult};
use crate::names::resolve_dest_name;
use crate::registry::Registry;
use crate::types::{basename, DestName, DownloadTarget, UploadOptions, UploadSource};
use crate::url::FileUrl;

/// Destination of a façade-level download.
pub enum DownloadDest {
    /// Name the file after the blob key's basename; without a directory the
    /// content lands in a fresh uniquely named temporary file.
    Auto,
    /// Caller-supplied filename, or full path when no directory is given
    Name(PathBuf),
    /// Stream into an already-open writable handle; no path to report
    Writer(Box<dyn Write + Send>),
}

impl DownloadDest {
    pub fn name<P: Into<PathBuf>>(path: P) -> Self {
        Self::Name(path.into())
    }

    pub fn writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self::Writer(Box::new(writer))
    }
}

impl std::fmt::Debug for DownloadDest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => f.write_str("Auto"),
            Self::Name(path) => f.debug_tuple("Name").field(path).finish(),
            Self::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

/// The storage façade: resolves `store://container/blob` addresses against
/// its registry, applies naming policy, and fans bulk operations out
/// concurrently.
///
/// Bulk calls are all-or-nothing from the caller's point of view: the first
/// failing item aborts the batch result, though items that already completed
/// may have landed in storage.
#[derive(Debug)]
pub struct CloudStorage {
    registry: Registry,
}

impl CloudStorage {
    /// Configure a registry from settings and wrap it
    pub async fn configure(settings: &StorageSettings) -> StorageResult<Self> {
        Ok(Self {
            registry: Registry::configure(settings).await?,
        })
    }

    /// Wrap an already-built registry
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn is_enabled(&self) -> bool {
        self.registry.is_enabled()
    }

    /// Upload one source into the resolved (or default) container, naming it
    /// per `dest_name`.
    #[instrument(skip(self, source), fields(dest = ?dest_name))]
    pub async fn upload(
        &self,
        source: UploadSource,
        dest_name: DestName,
        dest_path: &str,
        container_name: Option<&str>,
        store_name: Option<&str>,
    ) -> StorageResult<Blob> {
        self.registry.check_enabled()?;
        let container = self
            .registry
            .resolve_container(container_name, store_name)
            .await?;
        self.upload_to_container(&container, source, dest_name, dest_path)
            .await
    }

    /// Upload into an already-resolved container, bypassing name/store
    /// resolution. The caller asserts the container is valid.
    pub async fn upload_to_container(
        &self,
        container: &Container,
        source: UploadSource,
        dest_name: DestName,
        dest_path: &str,
    ) -> StorageResult<Blob> {
        self.registry.check_enabled()?;
        let blob_name = resolve_dest_name(&dest_name, &source)?;
        container
            .upload_blob(
                source,
                &blob_name,
                UploadOptions::new().with_blob_path(dest_path),
            )
            .await
    }

    /// Upload a batch concurrently into one shared container. Returns each
    /// key mapped to the stored blob's file URL. With [`DestName::UseKey`]
    /// every item is named after its own key.
    #[instrument(skip(self, sources), fields(items = sources.len(), dest = ?dest_name))]
    pub async fn bulk_upload(
        &self,
        sources: HashMap<String, UploadSource>,
        dest_name: DestName,
        dest_path: &str,
        container_name: Option<&str>,
        store_name: Option<&str>,
    ) -> StorageResult<HashMap<String, String>> {
        self.registry.check_enabled()?;
        if sources.is_empty() {
            return Ok(HashMap::new());
        }

        // One shared container for the whole batch
        let container = self
            .registry
            .resolve_container(container_name, store_name)
            .await?;

        let uploads = sources.into_iter().map(|(key, source)| {
            let container = container.clone();
            let dest_name = dest_name.clone();
            let dest_path = dest_path.to_string();
            async move {
                let blob_name = match &dest_name {
                    DestName::UseKey => key.clone(),
                    other => resolve_dest_name(other, &source)?,
                };
                let blob = container
                    .upload_blob(
                        source,
                        &blob_name,
                        UploadOptions::new().with_blob_path(&dest_path),
                    )
                    .await?;
                Ok::<_, StorageError>((key, blob.file_url()))
            }
        });

        let results = try_join_all(uploads).await?;
        debug!(uploaded = results.len(), "bulk upload finished");
        Ok(results.into_iter().collect())
    }

    /// Download the blob at `file_url`. Returns the path written to, or an
    /// empty path when streaming into a writer.
    #[instrument(skip(self, dest), fields(url = %file_url))]
    pub async fn download(
        &self,
        file_url: &str,
        dest: DownloadDest,
        dest_path: Option<&Path>,
    ) -> StorageResult<PathBuf> {
        self.registry.check_enabled()?;
        let parsed = FileUrl::parse(file_url)?;
        let container = self
            .registry
            .resolve_container(Some(&parsed.container), Some(&parsed.store))
            .await?;
        self.download_from_container(&container, &parsed.blob, dest, dest_path)
            .await
    }

    /// Download a batch concurrently, naming each file after its blob key's
    /// basename. Returns each key mapped to the path written. With
    /// `multi_container` false the container is resolved once from the first
    /// entry and shared, so all entries must address the same store and
    /// container.
    #[instrument(skip(self, file_urls), fields(items = file_urls.len()))]
    pub async fn bulk_download(
        &self,
        file_urls: &HashMap<String, String>,
        dest_path: Option<&Path>,
        multi_container: bool,
    ) -> StorageResult<HashMap<String, PathBuf>> {
        self.registry.check_enabled()?;
        if file_urls.is_empty() {
            return Ok(HashMap::new());
        }

        let mut shared: Option<Container> = None;
        if !multi_container {
            if let Some(first) = file_urls.values().next() {
                let parsed = FileUrl::parse(first)?;
                shared = Some(
                    self.registry
                        .resolve_container(Some(&parsed.container), Some(&parsed.store))
                        .await?,
                );
            }
        }

        let downloads = file_urls.iter().map(|(key, url)| {
            let shared = shared.clone();
            async move {
                let parsed = FileUrl::parse(url)?;
                let container = match shared {
                    Some(container) => container,
                    None => {
                        self.registry
                            .resolve_container(Some(&parsed.container), Some(&parsed.store))
                            .await?
                    }
                };
                let path = self
                    .download_from_container(&container, &parsed.blob, DownloadDest::Auto, dest_path)
                    .await?;
                Ok::<_, StorageError>((key.clone(), path))
            }
        });

        let results = try_join_all(downloads).await?;
        debug!(downloaded = results.len(), "bulk download finished");
        Ok(results.into_iter().collect())
    }

    async fn download_from_container(
        &self,
        container: &Container,
        blob_name: &str,
        dest: DownloadDest,
        dest_path: Option<&Path>,
    ) -> StorageResult<PathBuf> {
        let blob = container.get_blob(blob_name).await?;

        match dest {
            DownloadDest::Writer(writer) => {
                if dest_path.is_some() {
                    return Err(StorageError::storage(
                        "dest_path is invalid when downloading to a writer",
                    ));
                }
                blob.download(DownloadTarget::Writer(writer)).await?;
                // No path exists to report
                Ok(PathBuf::new())
            }
            DownloadDest::Auto => match dest_path {
                Some(dir) => {
                    ensure_directory(dir).await?;
                    let path = dir.join(basename(&blob.name));
                    blob.download(DownloadTarget::path(&path)).await?;
                    Ok(path)
                }
                None => {
                    let (file, path) = tempfile::NamedTempFile::new()?
                        .keep()
                        .map_err(|err| StorageError::from(err.error))?;
                    drop(file);
                    blob.download(DownloadTarget::path(&path)).await?;
                    Ok(path)
                }
            },
            DownloadDest::Name(name) => {
                let (dir, file_name) = match dest_path {
                    Some(dir) => (dir.to_path_buf(), name),
                    None => {
                        let file_name = name
                            .file_name()
                            .map(PathBuf::from)
                            .ok_or_else(|| {
                                StorageError::storage("Invalid destination filename")
                            })?;
                        let dir = name
                            .parent()
                            .map(Path::to_path_buf)
                            .unwrap_or_default();
                        (dir, file_name)
                    }
                };
                if !dir.as_os_str().is_empty() {
                    ensure_directory(&dir).await?;
                }
                let path = dir.join(file_name);
                blob.download(DownloadTarget::path(&path)).await?;
                Ok(path)
            }
        }
    }
}

/// Idempotent directory creation; a pre-existing directory is not an error,
/// a permission failure is a credentials error.
async fn ensure_directory(dir: &Path) -> StorageResult<()> {
    tokio::fs::create_dir_all(dir).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            StorageError::credentials(err.to_string())
        } else {
            err.into()
        }
    })
}
