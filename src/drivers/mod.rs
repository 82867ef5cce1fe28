//! Shipped storage backends.

pub mod local;
pub mod minio;

pub use local::LocalDriver;
pub use minio::MinioDriver;
