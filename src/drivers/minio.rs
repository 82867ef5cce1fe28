//! S3-compatible backend (MinIO, AWS S3, anything speaking the S3 API)
//! driven through `aws-sdk-s3` against a custom endpoint.

use async_stream::try_stream;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{Object, ObjectCannedAcl};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::content::{guess_content_type, infer_content_type};
use crate::driver::{transfer_to_target, BlobStream, ContainerStream, StorageDriver};
use crate::entity::{Blob, Container};
use crate::error::{StorageError, StorageResult};
use crate::names::{sanitize_object_name, validate_container_name};
use crate::types::{
    DownloadTarget, DownloadUrlOptions, FormPost, UploadOptions, UploadSource, UploadUrlOptions,
};

/// Header prefix S3 uses for user metadata on presigned requests
const OBJECT_META_PREFIX: &str = "x-amz-meta-";

/// S3-compatible [`StorageDriver`]. The SDK client is constructed lazily on
/// first use and shared by every call for the driver's lifetime.
pub struct MinioDriver {
    endpoint: String,
    key: Option<String>,
    secret: Option<String>,
    region: String,
    alias: String,
    client: OnceCell<Client>,
}

impl MinioDriver {
    pub fn new<E, S>(endpoint: E, alias: S) -> Self
    where
        E: Into<String>,
        S: Into<String>,
    {
        Self {
            endpoint: endpoint.into(),
            key: None,
            secret: None,
            region: "us-east-1".to_string(),
            alias: alias.into(),
            client: OnceCell::new(),
        }
    }

    /// Use explicit static credentials instead of the ambient provider chain
    pub fn with_credentials<K, S>(mut self, key: K, secret: S) -> Self
    where
        K: Into<String>,
        S: Into<String>,
    {
        self.key = Some(key.into());
        self.secret = Some(secret.into());
        self
    }

    pub fn with_region<R: Into<String>>(mut self, region: R) -> Self {
        self.region = region.into().to_lowercase();
        self
    }

    /// Endpoint this driver talks to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn client(&self) -> &Client {
        self.client
            .get_or_init(|| async {
                let mut loader = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(self.region.clone()));
                if let Some(key) = &self.key {
                    loader = loader.credentials_provider(Credentials::new(
                        key.clone(),
                        self.secret.clone().unwrap_or_default(),
                        None,
                        None,
                        "dog-store-config",
                    ));
                }
                let shared = loader.load().await;
                // Path-style addressing: MinIO buckets are not DNS hosts
                let config = aws_sdk_s3::config::Builder::from(&shared)
                    .endpoint_url(self.endpoint.clone())
                    .force_path_style(true)
                    .build();
                Client::from_conf(config)
            })
            .await
    }

    fn make_blob(self: Arc<Self>, container: &Container, object: &Object) -> Blob {
        let checksum = object
            .e_tag()
            .map(|etag| etag.replace('"', ""))
            .unwrap_or_default();
        Blob {
            name: object.key().unwrap_or_default().to_string(),
            // Backends report i64; a nonsensical negative size clamps to zero
            size: object.size().unwrap_or_default().try_into().unwrap_or_default(),
            etag: checksum.clone(),
            checksum,
            content_type: None,
            content_disposition: None,
            cache_control: None,
            meta_data: HashMap::new(),
            created_at: None,
            modified_at: object
                .last_modified()
                .and_then(|ts| DateTime::<Utc>::from_timestamp_millis(ts.to_millis().ok()?)),
            expires_at: None,
            container: container.clone(),
            driver: self.clone() as Arc<dyn StorageDriver>,
        }
    }
}

#[async_trait::async_trait]
impl StorageDriver for MinioDriver {
    fn name(&self) -> &str {
        "Minio"
    }

    fn alias(&self) -> &str {
        &self.alias
    }

    fn get_containers(self: Arc<Self>) -> ContainerStream {
        Box::pin(try_stream! {
            let client = self.client().await.clone();
            let resp = client
                .list_buckets()
                .send()
                .await
                .map_err(|err| storage_fault(&err))?;
            for bucket in resp.buckets() {
                let name = bucket.name().unwrap_or_default().to_string();
                if name.is_empty() {
                    continue;
                }
                yield Container::new(
                    name,
                    Default::default(),
                    self.clone() as Arc<dyn StorageDriver>,
                );
            }
        })
    }

    async fn get_container(
        self: Arc<Self>,
        name: &str,
        validate: bool,
    ) -> StorageResult<Container> {
        if validate {
            let client = self.client().await;
            if let Err(err) = client.head_bucket().bucket(name).send().await {
                let service = err.into_service_error();
                if service.is_not_found() {
                    return Err(StorageError::container_not_found(name));
                }
                return Err(storage_fault(&service));
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
        validate_container_name(name, true)?;
        let client = self.client().await;
        if let Err(err) = client.create_bucket().bucket(name).send().await {
            let service = err.into_service_error();
            // Creation is idempotent
            if !service.is_bucket_already_owned_by_you() && !service.is_bucket_already_exists() {
                return Err(storage_fault(&service));
            }
        }
        debug!(container = name, "ensured bucket");
        Ok(Container::new(
            name.to_string(),
            Default::default(),
            self as Arc<dyn StorageDriver>,
        ))
    }

    async fn delete_container(self: Arc<Self>, container: &Container) -> StorageResult<bool> {
        let client = self.client().await;
        if let Err(err) = client.delete_bucket().bucket(&container.name).send().await {
            return match err.code() {
                Some("BucketNotEmpty") => Err(StorageError::not_empty(&container.name)),
                Some("NoSuchBucket") => Ok(false),
                _ => Err(storage_fault(&err)),
            };
        }
        Ok(true)
    }

    fn get_blobs(self: Arc<Self>, container: Container) -> BlobStream {
        Box::pin(try_stream! {
            let client = self.client().await.clone();
            let mut pages = client
                .list_objects_v2()
                .bucket(&container.name)
                .into_paginator()
                .send();
            while let Some(page) = pages.next().await {
                let page = page.map_err(|err| storage_fault(&err))?;
                for object in page.contents() {
                    yield self.clone().make_blob(&container, object);
                }
            }
        })
    }

    async fn get_blob(
        self: Arc<Self>,
        container: &Container,
        blob_name: &str,
    ) -> StorageResult<Blob> {
        let client = self.client().await;
        let resp = client
            .head_object()
            .bucket(&container.name)
            .key(blob_name)
            .send()
            .await
            .map_err(|err| {
                let service = err.into_service_error();
                if service.is_not_found() {
                    StorageError::blob_not_found(blob_name, &container.name)
                } else {
                    storage_fault(&service)
                }
            })?;

        let checksum = resp
            .e_tag()
            .map(|etag| etag.replace('"', ""))
            .unwrap_or_default();
        Ok(Blob {
            name: blob_name.to_string(),
            size: resp.content_length().unwrap_or_default().try_into().unwrap_or_default(),
            etag: checksum.clone(),
            checksum,
            content_type: resp.content_type().map(str::to_string),
            content_disposition: resp.content_disposition().map(str::to_string),
            cache_control: resp.cache_control().map(str::to_string),
            meta_data: resp.metadata().cloned().unwrap_or_default(),
            created_at: None,
            modified_at: resp
                .last_modified()
                .and_then(|ts| DateTime::<Utc>::from_timestamp_millis(ts.to_millis().ok()?)),
            expires_at: None,
            container: container.clone(),
            driver: self.clone() as Arc<dyn StorageDriver>,
        })
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

        let content_type = if options.content_type.is_empty() {
            match &source {
                UploadSource::Path(path) => infer_content_type(path).await,
                _ => guess_content_type(&key),
            }
        } else {
            options.content_type.clone()
        };

        let body = match source {
            UploadSource::Path(path) => aws_sdk_s3::primitives::ByteStream::from_path(&path)
                .await
                .map_err(StorageError::backend)?,
            UploadSource::Stream(mut stream) | UploadSource::NamedStream { mut stream, .. } => {
                // S3 put_object needs a sized body; buffer the stream
                let mut buffer = Vec::new();
                while let Some(chunk) = stream.next().await {
                    buffer.extend_from_slice(&chunk?);
                }
                aws_sdk_s3::primitives::ByteStream::from(buffer)
            }
        };

        let client = self.client().await;
        let mut request = client
            .put_object()
            .bucket(&container.name)
            .key(&key)
            .body(body);
        if !content_type.is_empty() {
            request = request.content_type(&content_type);
        }
        if let Some(acl) = &options.acl {
            request = request.acl(ObjectCannedAcl::from(acl.to_lowercase().as_str()));
        }
        if let Some(value) = &options.content_disposition {
            request = request.content_disposition(value);
        }
        if let Some(value) = &options.cache_control {
            request = request.cache_control(value);
        }
        for (meta_key, meta_value) in &options.meta_data {
            request = request.metadata(meta_key, meta_value);
        }

        request
            .send()
            .await
            .map_err(|err| storage_fault(&err))?;
        debug!(container = %container.name, blob = %key, "stored object");

        self.get_blob(container, &key).await
    }

    async fn download_blob(
        self: Arc<Self>,
        blob: &Blob,
        destination: DownloadTarget,
    ) -> StorageResult<()> {
        let client = self.client().await;
        let resp = client
            .get_object()
            .bucket(&blob.container.name)
            .key(&blob.name)
            .send()
            .await
            .map_err(|err| {
                let service = err.into_service_error();
                if service.is_no_such_key() {
                    StorageError::blob_not_found(&blob.name, &blob.container.name)
                } else {
                    storage_fault(&service)
                }
            })?;

        let mut body = resp.body;
        let stream: crate::types::ByteStream = Box::pin(try_stream! {
            while let Some(chunk) = body
                .try_next()
                .await
                .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?
            {
                yield chunk;
            }
        });
        transfer_to_target(stream, destination).await
    }

    async fn delete_blob(self: Arc<Self>, blob: &Blob) -> StorageResult<()> {
        let client = self.client().await;
        client
            .delete_object()
            .bucket(&blob.container.name)
            .key(&blob.name)
            .send()
            .await
            .map_err(|err| storage_fault(&err))?;
        Ok(())
    }

    async fn generate_container_upload_url(
        self: Arc<Self>,
        container: &Container,
        blob_name: &str,
        options: UploadUrlOptions,
    ) -> StorageResult<FormPost> {
        if options.content_length.is_some() {
            // A presigned PUT cannot constrain the uploaded length
            warn!(
                container = %container.name,
                blob = blob_name,
                "content_length range is not enforceable on a presigned upload, ignoring"
            );
        }
        let client = self.client().await;
        let mut request = client
            .put_object()
            .bucket(&container.name)
            .key(blob_name);

        let mut fields = HashMap::new();
        if let Some(acl) = &options.acl {
            request = request.acl(ObjectCannedAcl::from(acl.to_lowercase().as_str()));
            fields.insert("acl".to_string(), acl.clone());
        }
        if let Some(value) = &options.content_type {
            request = request.content_type(value);
            fields.insert("content-type".to_string(), value.clone());
        }
        if let Some(value) = &options.content_disposition {
            request = request.content_disposition(value);
            fields.insert("content-disposition".to_string(), value.clone());
        }
        if let Some(value) = &options.cache_control {
            request = request.cache_control(value);
            fields.insert("cache-control".to_string(), value.clone());
        }
        for (meta_key, meta_value) in &options.meta_data {
            request = request.metadata(meta_key, meta_value);
            fields.insert(
                format!("{OBJECT_META_PREFIX}{meta_key}"),
                meta_value.clone(),
            );
        }

        let config = PresigningConfig::expires_in(Duration::from_secs(options.expires))
            .map_err(StorageError::backend)?;
        let presigned = request
            .presigned(config)
            .await
            .map_err(|err| storage_fault(&err))?;
        Ok(FormPost {
            url: presigned.uri().to_string(),
            fields,
        })
    }

    async fn generate_blob_download_url(
        self: Arc<Self>,
        blob: &Blob,
        options: DownloadUrlOptions,
    ) -> StorageResult<String> {
        let client = self.client().await;
        let mut request = client
            .get_object()
            .bucket(&blob.container.name)
            .key(&blob.name);
        if let Some(value) = &options.content_disposition {
            request = request.response_content_disposition(value);
        }

        let config = PresigningConfig::expires_in(Duration::from_secs(options.expires))
            .map_err(StorageError::backend)?;
        let presigned = request
            .presigned(config)
            .await
            .map_err(|err| storage_fault(&err))?;
        Ok(presigned.uri().to_string())
    }
}

/// Normalize an SDK fault to the shared taxonomy, keeping the backend's code
/// and message for diagnostics.
fn storage_fault<E: ProvideErrorMetadata>(err: &E) -> StorageError {
    StorageError::storage(format!(
        "{}: {}",
        err.code().unwrap_or("Unknown"),
        err.message().unwrap_or("backend call failed"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let driver = MinioDriver::new("http://localhost:9000", "minio");
        assert_eq!(driver.alias(), "minio");
        assert_eq!(driver.endpoint(), "http://localhost:9000");
        assert_eq!(driver.name(), "Minio");
        assert_eq!(driver.hash_type(), "md5");
    }

    #[test]
    fn test_region_is_lowercased() {
        let driver = MinioDriver::new("http://localhost:9000", "minio").with_region("US-EAST-2");
        assert_eq!(driver.region, "us-east-2");
    }

    #[tokio::test]
    async fn test_negative_reported_size_clamps_to_zero() {
        let driver = Arc::new(MinioDriver::new("http://localhost:9000", "minio"));
        let container = driver
            .clone()
            .get_container("bucket", false)
            .await
            .unwrap();
        let object = Object::builder()
            .key("weird.bin")
            .size(-1)
            .e_tag("\"abc\"")
            .build();

        let blob = driver.clone().make_blob(&container, &object);
        assert_eq!(blob.size, 0);
        assert_eq!(blob.checksum, "abc");
    }

    #[tokio::test]
    async fn test_presigned_upload_descriptor_fields() {
        // Presigning signs locally; no endpoint is contacted
        let driver = Arc::new(
            MinioDriver::new("http://localhost:9000", "minio").with_credentials("ak", "sk"),
        );
        let container = driver
            .clone()
            .get_container("bucket", false)
            .await
            .unwrap();
        let mut options = UploadUrlOptions::new()
            .with_content_type("image/png")
            .with_content_length(0, 1024);
        options.meta_data.insert("owner".into(), "uploads".into());

        let form = driver
            .clone()
            .generate_container_upload_url(&container, "pic.png", options)
            .await
            .unwrap();

        assert!(form.url.contains("/bucket/pic.png"));
        assert_eq!(
            form.fields.get("content-type").map(String::as_str),
            Some("image/png")
        );
        assert_eq!(
            form.fields.get("x-amz-meta-owner").map(String::as_str),
            Some("uploads")
        );
    }
}
