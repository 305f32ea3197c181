pub mod fetch;
pub mod keys;
pub mod register;
pub mod token;

use anyhow::{Context as _, Result};
use fhirbridge_auth::config::loader::load_config;
use fhirbridge_auth::{ClientAssertionAuthenticator, FhirBridgeConfig, FileStore};

use crate::observability;

/// Configuration and store shared by every command.
pub struct Context {
    pub config: FhirBridgeConfig,
    pub store: FileStore,
}

impl Context {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let config = load_config(config_path).context("Failed to load configuration")?;
        observability::apply_logging_level(&config.logging.level);

        let dir = config.storage.resolve_dir()?;
        tracing::debug!(dir = %dir.display(), "Using storage directory");
        Ok(Self {
            store: FileStore::new(dir),
            config,
        })
    }

    pub fn authenticator(&self) -> Result<ClientAssertionAuthenticator<FileStore>> {
        Ok(ClientAssertionAuthenticator::new(
            self.config.clone(),
            self.store.clone(),
        )?)
    }
}
