use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::driver::{BlobStream, StorageDriver};
use crate::error::StorageResult;
use crate::types::{
    DownloadTarget, DownloadUrlOptions, FormPost, UploadOptions, UploadSource, UploadUrlOptions,
};
use crate::url::FileUrl;

/// A namespace of blobs within one store (bucket/directory equivalent).
///
/// Carries a non-owning reference to its driver so operations can be
/// delegated without going back through the registry.
#[derive(Clone)]
pub struct Container {
    /// Name, unique within its store
    pub name: String,
    /// Opaque backend metadata
    pub meta_data: HashMap<String, String>,
    pub(crate) driver: Arc<dyn StorageDriver>,
}

impl Container {
    pub(crate) fn new(
        name: String,
        meta_data: HashMap<String, String>,
        driver: Arc<dyn StorageDriver>,
    ) -> Self {
        Self {
            name,
            meta_data,
            driver,
        }
    }

    /// The driver this container belongs to
    pub fn driver(&self) -> Arc<dyn StorageDriver> {
        self.driver.clone()
    }

    /// Fetch one blob by name
    pub async fn get_blob(&self, blob_name: &str) -> StorageResult<Blob> {
        self.driver.clone().get_blob(self, blob_name).await
    }

    /// Enumerate the container's blobs lazily
    pub fn get_blobs(&self) -> BlobStream {
        self.driver.clone().get_blobs(self.clone())
    }

    /// Upload a blob into this container under the given (policy-resolved)
    /// name
    pub async fn upload_blob(
        &self,
        source: UploadSource,
        blob_name: &str,
        options: UploadOptions,
    ) -> StorageResult<Blob> {
        self.driver
            .clone()
            .upload_blob(self, source, blob_name, options)
            .await
    }

    /// Delete this container. Returns `false` if it was already absent.
    pub async fn delete(&self) -> StorageResult<bool> {
        self.driver.clone().delete_container(self).await
    }

    /// Generate a presigned upload descriptor for this container
    pub async fn generate_upload_url(
        &self,
        blob_name: &str,
        options: UploadUrlOptions,
    ) -> StorageResult<FormPost> {
        self.driver
            .clone()
            .generate_container_upload_url(self, blob_name, options)
            .await
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name)
            .field("store", &self.driver.alias())
            .finish()
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.driver.alias() == other.driver.alias()
    }
}

/// One stored binary object and its metadata.
#[derive(Clone)]
pub struct Blob {
    /// Full object key, slash-delimited within the container
    pub name: String,
    /// Size in bytes as stored by the backend
    pub size: u64,
    /// Content hash (driver-defined algorithm, MD5 by default)
    pub checksum: String,
    /// Backend entity tag
    pub etag: String,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
    /// Free-form object metadata
    pub meta_data: HashMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Owning container
    pub container: Container,
    pub(crate) driver: Arc<dyn StorageDriver>,
}

impl Blob {
    /// The `store://container/blob` address of this blob: the only externally
    /// stable identifier.
    pub fn file_url(&self) -> String {
        FileUrl::new(
            self.driver.alias(),
            self.container.name.as_str(),
            self.name.as_str(),
        )
        .to_string()
    }

    /// The driver this blob belongs to
    pub fn driver(&self) -> Arc<dyn StorageDriver> {
        self.driver.clone()
    }

    /// Stream this blob's content into the destination
    pub async fn download(&self, destination: DownloadTarget) -> StorageResult<()> {
        self.driver.clone().download_blob(self, destination).await
    }

    /// Delete this blob
    pub async fn delete(&self) -> StorageResult<()> {
        self.driver.clone().delete_blob(self).await
    }

    /// Push updated metadata to the backend (unsupported by some drivers)
    pub async fn patch(&self) -> StorageResult<()> {
        self.driver.clone().patch_blob(self).await
    }

    /// Generate a presigned download URL for this blob
    pub async fn generate_download_url(
        &self,
        options: DownloadUrlOptions,
    ) -> StorageResult<String> {
        self.driver
            .clone()
            .generate_blob_download_url(self, options)
            .await
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("name", &self.name)
            .field("container", &self.container.name)
            .field("size", &self.size)
            .field("checksum", &self.checksum)
            .finish()
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.container == other.container
    }
}
