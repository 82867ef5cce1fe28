use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::StorageError;

/// Backend kind a store entry resolves to. Resolved once at configure time;
/// there is no runtime driver lookup by string after that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    /// Local filesystem directories
    Local,
    /// Anything speaking the S3 API (MinIO, AWS S3)
    Minio,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Minio => "minio",
        }
    }
}

impl FromStr for DriverKind {
    type Err = StorageError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.to_ascii_lowercase().as_str() {
            "local" | "fs" => Ok(Self::Local),
            "minio" | "s3" => Ok(Self::Minio),
            other => Err(StorageError::storage(format!(
                "Invalid driver name provided: {other}"
            ))),
        }
    }
}

/// One declared store entry. `name`, `endpoint` and `driver` are required;
/// presence is checked at configure time so a malformed entry fails with a
/// storage error instead of a deserialization error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub name: Option<String>,
    /// Backend endpoint: a URL for S3-compatible stores, a base directory for
    /// the local driver
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Driver-kind token (`local`/`fs`/`minio`/`s3`, case-insensitive)
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

impl StoreSettings {
    pub fn new<N, E, D>(name: N, endpoint: E, driver: D) -> Self
    where
        N: Into<String>,
        E: Into<String>,
        D: Into<String>,
    {
        Self {
            name: Some(name.into()),
            endpoint: Some(endpoint.into()),
            driver: Some(driver.into()),
            key: None,
            secret: None,
            region: None,
        }
    }

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
        self.region = Some(region.into());
        self
    }
}

/// Storage configuration consumed by [`Registry::configure`].
///
/// The serde names match the wire shape
/// (`STORAGE_ENABLED`, `STORAGE_CONFIG`, `DEFAULT_STORE`, `DEFAULT_CONTAINER`);
/// per-driver enable flags arrive as flattened `DRIVER_<token>_ENABLED` keys.
///
/// [`Registry::configure`]: crate::registry::Registry::configure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(rename = "STORAGE_ENABLED", default)]
    pub enabled: bool,
    #[serde(rename = "STORAGE_CONFIG", default)]
    pub stores: Vec<StoreSettings>,
    #[serde(rename = "DEFAULT_STORE", default)]
    pub default_store: Option<String>,
    #[serde(rename = "DEFAULT_CONTAINER", default)]
    pub default_container: Option<String>,
    /// Flattened remainder, holding the `DRIVER_<token>_ENABLED` flags
    #[serde(flatten)]
    pub flags: HashMap<String, Value>,
}

impl StorageSettings {
    /// Enabled settings with no stores declared yet
    pub fn new() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    pub fn with_store(mut self, store: StoreSettings) -> Self {
        self.stores.push(store);
        self
    }

    /// Set the `DRIVER_<token>_ENABLED` flag for a driver token
    pub fn enable_driver<T: AsRef<str>>(mut self, token: T) -> Self {
        self.flags.insert(
            format!("DRIVER_{}_ENABLED", token.as_ref()),
            Value::Bool(true),
        );
        self
    }

    pub fn with_default_store<S: Into<String>>(mut self, store: S) -> Self {
        self.default_store = Some(store.into());
        self
    }

    pub fn with_default_container<C: Into<String>>(mut self, container: C) -> Self {
        self.default_container = Some(container.into());
        self
    }

    /// Whether the `DRIVER_<token>_ENABLED` flag is present and truthy. An
    /// absent flag means the driver stays off.
    pub fn driver_enabled(&self, token: &str) -> bool {
        let exact = format!("DRIVER_{token}_ENABLED");
        let upper = format!("DRIVER_{}_ENABLED", token.to_uppercase());
        self.flags
            .get(&exact)
            .or_else(|| self.flags.get(&upper))
            .map(truthy)
            .unwrap_or(false)
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => {
            let text = text.to_ascii_lowercase();
            !(text.is_empty() || text == "false" || text == "0")
        }
        Value::Number(number) => number.as_f64() != Some(0.0),
        _ => false,
    }
}
