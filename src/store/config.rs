//! Configuration for object store backends

use crate::store::local_store::LocalStoreFactory;
use crate::store::mock_store::MockStoreFactory;
use crate::store::StoreFactory;
use std::env;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

/// Available object store backends
#[derive(Debug, Clone, PartialEq)]
pub enum StoreBackend {
    LocalDir,
    Mock,
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::LocalDir
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "localdir" | "local" | "dir" => Ok(StoreBackend::LocalDir),
            "mock" => Ok(StoreBackend::Mock),
            _ => Err(format!("Unknown store backend: {}", s)),
        }
    }
}

/// Configuration for the object store client
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub base_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            base_path: "./data/object_store".to_string(),
        }
    }
}

impl StoreConfig {
    /// Create a store configuration from environment variables
    pub fn from_env() -> Self {
        let backend = match env::var("STORE_BACKEND") {
            Ok(backend_str) => match backend_str.parse::<StoreBackend>() {
                Ok(backend) => {
                    info!("Using store backend from environment: {:?}", backend);
                    backend
                }
                Err(e) => {
                    warn!(
                        "Invalid store backend in environment: {}. Using default LocalDir.",
                        e
                    );
                    StoreBackend::default()
                }
            },
            Err(_) => {
                info!("No store backend specified in environment, using default LocalDir");
                StoreBackend::default()
            }
        };

        let base_path = env::var("STORE_DIRECTORY")
            .unwrap_or_else(|_| StoreConfig::default().base_path);

        Self { backend, base_path }
    }

    /// Create a session factory based on the configuration
    pub fn create_factory(&self) -> Arc<dyn StoreFactory> {
        match self.backend {
            StoreBackend::LocalDir => Arc::new(LocalStoreFactory::new(Path::new(&self.base_path))),
            StoreBackend::Mock => Arc::new(MockStoreFactory::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_store_backend_from_str() {
        assert_eq!(
            "localdir".parse::<StoreBackend>().unwrap(),
            StoreBackend::LocalDir
        );
        assert_eq!(
            "LocalDir".parse::<StoreBackend>().unwrap(),
            StoreBackend::LocalDir
        );
        assert_eq!(
            "local".parse::<StoreBackend>().unwrap(),
            StoreBackend::LocalDir
        );
        assert_eq!("dir".parse::<StoreBackend>().unwrap(), StoreBackend::LocalDir);
        assert_eq!("mock".parse::<StoreBackend>().unwrap(), StoreBackend::Mock);
        assert_eq!("MOCK".parse::<StoreBackend>().unwrap(), StoreBackend::Mock);

        assert!("invalid".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_store_config_default() {
        let config = StoreConfig::default();
        assert_eq!(config.backend, StoreBackend::LocalDir);
    }

    #[test]
    #[serial]
    fn test_store_config_from_env() {
        env::set_var("STORE_BACKEND", "mock");
        let config = StoreConfig::from_env();
        assert_eq!(config.backend, StoreBackend::Mock);

        env::set_var("STORE_BACKEND", "garbage");
        let config = StoreConfig::from_env();
        assert_eq!(config.backend, StoreBackend::LocalDir);

        env::remove_var("STORE_BACKEND");
        let config = StoreConfig::from_env();
        assert_eq!(config.backend, StoreBackend::LocalDir);
    }

    #[test]
    #[serial]
    fn test_create_factory() {
        env::remove_var("STORE_BACKEND");
        let mock_config = StoreConfig {
            backend: StoreBackend::Mock,
            base_path: String::new(),
        };
        let _factory = mock_config.create_factory();

        // Just verify the factories can be created without errors
    }
}
