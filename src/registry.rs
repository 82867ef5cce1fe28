use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::config::{DriverKind, StorageSettings, StoreSettings};
use crate::driver::StorageDriver;
use crate::drivers::{LocalDriver, MinioDriver};
use crate::entity::Container;
use crate::error::{StorageError, StorageResult};

pub(crate) const STORAGE_NOT_ENABLED: &str = "Storage is not enabled";

/// Table mapping logical store names to live drivers, built once by
/// [`Registry::configure`] and read-only afterwards. Reconfiguration means
/// building a new registry; nothing is merged.
pub struct Registry {
    stores: HashMap<String, Arc<dyn StorageDriver>>,
    default_store: Option<String>,
    default_container: Option<String>,
    enabled: bool,
}

impl Registry {
    /// A registry for administratively disabled storage. Every operation
    /// against it fails with a storage error.
    pub fn disabled() -> Self {
        Self {
            stores: HashMap::new(),
            default_store: None,
            default_container: None,
            enabled: false,
        }
    }

    /// Build a registry from settings.
    ///
    /// Disabled storage short-circuits with no validation at all. Otherwise
    /// every declared entry must carry name/endpoint/driver and a known
    /// driver token; entries whose enable flag is off are skipped, the rest
    /// are constructed and connectivity-probed. Zero enabled stores, an
    /// unknown default store, or a failing probe all fail configuration.
    #[instrument(skip(settings))]
    pub async fn configure(settings: &StorageSettings) -> StorageResult<Self> {
        if !settings.enabled {
            debug!("storage disabled, skipping driver setup");
            return Ok(Self::disabled());
        }
        if settings.stores.is_empty() {
            return Err(StorageError::storage("No storage configuration found"));
        }

        let mut stores: HashMap<String, Arc<dyn StorageDriver>> = HashMap::new();
        for entry in &settings.stores {
            let name = required(entry.name.as_deref(), "name")?;
            let endpoint = required(entry.endpoint.as_deref(), "endpoint")?;
            let token = required(entry.driver.as_deref(), "driver")?;
            // An unknown driver token fails the whole configuration, even for
            // entries that are not enabled.
            let kind: DriverKind = token.parse()?;

            if !settings.driver_enabled(token) {
                debug!(store = name, driver = token, "driver not enabled, skipping");
                continue;
            }

            let driver = build_driver(kind, name, endpoint, entry).await?;
            probe(name, &driver).await?;
            info!(store = name, driver = kind.as_str(), "registered store");
            stores.insert(name.to_string(), driver);
        }

        if stores.is_empty() {
            return Err(StorageError::storage(
                "No storage driver has been enabled. Please check storage configuration",
            ));
        }

        if let Some(default_store) = &settings.default_store {
            if !stores.contains_key(default_store) {
                return Err(StorageError::storage(format!(
                    "Default store {default_store} not found in configuration or driver not enabled"
                )));
            }
            if let Some(default_container) = &settings.default_container {
                stores[default_store]
                    .clone()
                    .create_container(default_container, None)
                    .await?;
                debug!(
                    store = %default_store,
                    container = %default_container,
                    "ensured default container"
                );
            }
        }

        Ok(Self {
            stores,
            default_store: settings.default_store.clone(),
            default_container: settings.default_container.clone(),
            enabled: true,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn check_enabled(&self) -> StorageResult<()> {
        if self.enabled {
            Ok(())
        } else {
            Err(StorageError::storage(STORAGE_NOT_ENABLED))
        }
    }

    /// Look up a configured store's driver
    pub fn store(&self, name: &str) -> StorageResult<Arc<dyn StorageDriver>> {
        self.stores
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::storage(format!("store name {name} not configured")))
    }

    pub fn store_names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    pub fn default_store(&self) -> Option<&str> {
        self.default_store.as_deref()
    }

    pub fn default_container(&self) -> Option<&str> {
        self.default_container.as_deref()
    }

    /// Resolve a container, filling absent names from the configured
    /// defaults and validating that the container exists.
    pub async fn resolve_container(
        &self,
        container_name: Option<&str>,
        store_name: Option<&str>,
    ) -> StorageResult<Container> {
        self.check_enabled()?;

        let container_name = container_name
            .or(self.default_container.as_deref())
            .ok_or_else(|| {
                StorageError::storage(
                    "container_name must be provided. No default container configured",
                )
            })?;
        if let Some(store) = store_name {
            if !self.stores.contains_key(store) {
                return Err(StorageError::storage(format!(
                    "store name {store} not configured"
                )));
            }
        }
        let store_name = store_name.or(self.default_store.as_deref()).ok_or_else(|| {
            StorageError::storage("store_name must be provided. No default store configured")
        })?;

        let driver = self.store(store_name)?;
        driver.get_container(container_name, true).await
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("stores", &self.stores.keys().collect::<Vec<_>>())
            .field("default_store", &self.default_store)
            .field("default_container", &self.default_container)
            .field("enabled", &self.enabled)
            .finish()
    }
}

fn required<'a>(value: Option<&'a str>, key: &str) -> StorageResult<&'a str> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(StorageError::storage(format!(
            "{key} key not found in storage config entry"
        ))),
    }
}

async fn build_driver(
    kind: DriverKind,
    name: &str,
    endpoint: &str,
    entry: &StoreSettings,
) -> StorageResult<Arc<dyn StorageDriver>> {
    Ok(match kind {
        DriverKind::Local => {
            Arc::new(LocalDriver::new(endpoint, name).await?) as Arc<dyn StorageDriver>
        }
        DriverKind::Minio => {
            let mut driver = MinioDriver::new(endpoint, name);
            if let (Some(key), Some(secret)) = (&entry.key, &entry.secret) {
                driver = driver.with_credentials(key, secret);
            }
            if let Some(region) = &entry.region {
                driver = driver.with_region(region);
            }
            Arc::new(driver) as Arc<dyn StorageDriver>
        }
    })
}

/// Listing containers once is the admission check for a store.
async fn probe(name: &str, driver: &Arc<dyn StorageDriver>) -> StorageResult<()> {
    let mut containers = driver.clone().get_containers();
    if let Some(Err(err)) = containers.next().await {
        return Err(StorageError::storage(format!(
            "Error connecting to store {name}: {err}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_settings_skip_all_validation() {
        // Malformed entries and no enable flags: still fine when disabled
        let settings: StorageSettings = serde_json::from_value(serde_json::json!({
            "STORAGE_ENABLED": false,
            "STORAGE_CONFIG": [{"driver": "gopher"}],
        }))
        .unwrap();

        let registry = Registry::configure(&settings).await.unwrap();
        assert!(!registry.is_enabled());
        assert!(matches!(
            registry.resolve_container(Some("any"), Some("fs")).await,
            Err(StorageError::Storage { .. })
        ));
    }

    #[tokio::test]
    async fn test_enabled_without_config_fails() {
        let settings = StorageSettings::new();
        assert!(Registry::configure(&settings).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_driver_fails_even_when_not_enabled() {
        let settings = StorageSettings::new().with_store(StoreSettings::new(
            "store-x",
            "/tmp/anywhere",
            "gopher",
        ));
        assert!(Registry::configure(&settings).await.is_err());
    }

    #[tokio::test]
    async fn test_zero_enabled_drivers_fails() {
        // Valid entry, but no DRIVER_local_ENABLED flag
        let dir = tempfile::tempdir().unwrap();
        let settings = StorageSettings::new().with_store(StoreSettings::new(
            "fs",
            dir.path().to_string_lossy(),
            "local",
        ));
        assert!(Registry::configure(&settings).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_required_key_fails() {
        let settings = StorageSettings::new()
            .with_store(StoreSettings {
                name: Some("fs".into()),
                endpoint: None,
                driver: Some("local".into()),
                ..Default::default()
            })
            .enable_driver("local");
        assert!(Registry::configure(&settings).await.is_err());
    }

    #[tokio::test]
    async fn test_default_store_must_be_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let settings = StorageSettings::new()
            .with_store(StoreSettings::new(
                "fs",
                dir.path().to_string_lossy(),
                "local",
            ))
            .enable_driver("local")
            .with_default_store("cloud");
        assert!(Registry::configure(&settings).await.is_err());
    }
}
