//! Configuration for the client authentication flow.
//!
//! Endpoint URLs, client metadata, HTTP options, storage location and
//! logging level are passed explicitly to every stage; nothing is read from
//! process-wide globals.
//!
//! # Example (TOML)
//!
//! ```toml
//! [endpoints]
//! token_url = "https://localhost:9300/oauth2/default/token"
//! registration_url = "https://localhost:9300/oauth2/default/registration"
//! fhir_base_url = "https://localhost:9300/apis/default/fhir"
//!
//! [client]
//! scope = "system/Patient.read api:oemr api:fhir"
//! algorithm = "RS384"
//!
//! [http]
//! timeout = "30s"
//! accept_invalid_certs = true   # debug builds only
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::AuthResult;
use crate::error::AuthError;
use crate::keys::SigningAlgorithm;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FhirBridgeConfig {
    /// Authorization server and FHIR endpoints.
    pub endpoints: EndpointsConfig,

    /// Client identity and registration metadata.
    pub client: ClientSettings,

    /// HTTP client options.
    pub http: HttpConfig,

    /// Where keys, JWKS and the registration record are kept.
    pub storage: StorageConfig,

    /// Logging options.
    pub logging: LoggingConfig,
}

/// Authorization server and FHIR endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointsConfig {
    /// OAuth 2.0 token endpoint. Also the `aud` of client assertions.
    pub token_url: String,

    /// RFC 7591 registration endpoint.
    pub registration_url: String,

    /// FHIR base URL (resources are fetched as `<base>/<ResourceType>`).
    pub fhir_base_url: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            token_url: "https://localhost:9300/oauth2/default/token".to_string(),
            registration_url: "https://localhost:9300/oauth2/default/registration".to_string(),
            fhir_base_url: "https://localhost:9300/apis/default/fhir".to_string(),
        }
    }
}

impl EndpointsConfig {
    /// Parsed token endpoint.
    pub fn token_url(&self) -> AuthResult<Url> {
        parse_http_url("endpoints.token_url", &self.token_url)
    }

    /// Parsed registration endpoint.
    pub fn registration_url(&self) -> AuthResult<Url> {
        parse_http_url("endpoints.registration_url", &self.registration_url)
    }

    /// Parsed FHIR base URL.
    pub fn fhir_base_url(&self) -> AuthResult<Url> {
        parse_http_url("endpoints.fhir_base_url", &self.fhir_base_url)
    }
}

/// Client identity and registration metadata.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Space-delimited scopes requested at registration and token exchange.
    pub scope: String,

    /// Assertion signing algorithm.
    pub algorithm: SigningAlgorithm,

    /// Client name sent at registration.
    pub client_name: String,

    /// Application type sent at registration.
    pub application_type: Option<String>,

    /// Redirect URIs sent at registration.
    pub redirect_uris: Vec<String>,

    /// Post-logout redirect URIs sent at registration.
    pub post_logout_redirect_uris: Vec<String>,

    /// Contact addresses sent at registration.
    pub contacts: Vec<String>,

    /// Third-party initiated login URI sent at registration.
    pub initiate_login_url: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            scope: "openid offline_access api:oemr api:fhir api:port patient/Patient.read system/Patient.read"
                .to_string(),
            algorithm: SigningAlgorithm::RS384,
            client_name: "fhirbridge".to_string(),
            application_type: Some("private".to_string()),
            redirect_uris: vec!["https://localhost:8080/redirect".to_string()],
            post_logout_redirect_uris: vec!["https://localhost:8080/logout".to_string()],
            contacts: Vec::new(),
            initiate_login_url: None,
        }
    }
}

/// HTTP client options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Skip TLS certificate verification for this client.
    /// Honored only in debug builds, for local servers with self-signed
    /// certificates.
    pub accept_invalid_certs: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            accept_invalid_certs: false,
        }
    }
}

/// Storage location.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for persisted material. Defaults to `~/.fhirbridge`.
    pub dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Returns the configured directory or the default under the home dir.
    pub fn resolve_dir(&self) -> AuthResult<PathBuf> {
        match &self.dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::home_dir()
                .map(|home| home.join(".fhirbridge"))
                .ok_or_else(|| AuthError::configuration("Cannot determine home directory")),
        }
    }
}

/// Logging options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration sources could not be read or merged.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl FhirBridgeConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - An endpoint is not an absolute http(s) URL
    /// - The timeout is zero
    /// - The logging level is unknown
    ///
    /// Returns `ConfigError::Missing` if the scope or client name is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("endpoints.token_url", &self.endpoints.token_url),
            ("endpoints.registration_url", &self.endpoints.registration_url),
            ("endpoints.fhir_base_url", &self.endpoints.fhir_base_url),
        ] {
            parse_http_url(name, value).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        }

        if self.client.scope.trim().is_empty() {
            return Err(ConfigError::Missing("client.scope".to_string()));
        }
        if self.client.client_name.trim().is_empty() {
            return Err(ConfigError::Missing("client.client_name".to_string()));
        }

        if self.http.timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "http.timeout must be > 0".to_string(),
            ));
        }

        let level = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&level.as_str()) {
            return Err(ConfigError::InvalidValue(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }

        Ok(())
    }
}

fn parse_http_url(name: &str, value: &str) -> AuthResult<Url> {
    let url = Url::parse(value)
        .map_err(|e| AuthError::configuration(format!("{name} is not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AuthError::configuration(format!(
            "{name} must use http or https, got '{other}'"
        ))),
    }
}

pub mod loader {
    //! Layered configuration loading: TOML file, then environment.

    use std::path::PathBuf;

    use config::{Config, Environment, File};

    use super::{ConfigError, FhirBridgeConfig};

    /// Default configuration file looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "fhirbridge.toml";

    /// Environment variable prefix, e.g. `FHIRBRIDGE__HTTP__TIMEOUT=10s`.
    pub const ENV_PREFIX: &str = "FHIRBRIDGE";

    /// Loads and validates the configuration.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load_config(path: Option<&str>) -> Result<FhirBridgeConfig, ConfigError> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if !pathbuf.exists() {
                    return Err(ConfigError::Load(format!("{p} does not exist")));
                }
                builder = builder.add_source(File::from(pathbuf));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__"),
        );

        let cfg = builder
            .build()
            .map_err(|e| ConfigError::Load(format!("config build error: {e}")))?;
        let merged: FhirBridgeConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Load(format!("config deserialize error: {e}")))?;
        merged.validate()?;
        tracing::debug!(path = ?path, "Configuration loaded");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FhirBridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http.timeout, Duration::from_secs(30));
        assert!(!config.http.accept_invalid_certs);
        assert_eq!(config.client.algorithm, SigningAlgorithm::RS384);
        assert_eq!(
            config.endpoints.token_url().unwrap().as_str(),
            "https://localhost:9300/oauth2/default/token"
        );
    }

    #[test]
    fn test_invalid_url_rejected() {
        let mut config = FhirBridgeConfig::default();
        config.endpoints.token_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));

        config.endpoints.token_url = "ftp://localhost/token".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_scope_rejected() {
        let mut config = FhirBridgeConfig::default();
        config.client.scope = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_zero_timeout_and_bad_level_rejected() {
        let mut config = FhirBridgeConfig::default();
        config.http.timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = FhirBridgeConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_parsing() {
        let toml = r#"
            [endpoints]
            token_url = "https://emr.example.test/oauth2/default/token"

            [client]
            scope = "system/Patient.read"
            algorithm = "RS256"

            [http]
            timeout = "5s"
        "#;
        let config: FhirBridgeConfig = toml_from_str(toml);
        assert_eq!(config.client.algorithm, SigningAlgorithm::RS256);
        assert_eq!(config.http.timeout, Duration::from_secs(5));
        assert_eq!(
            config.endpoints.registration_url,
            EndpointsConfig::default().registration_url
        );
    }

    #[test]
    fn test_storage_dir_override() {
        let storage = StorageConfig {
            dir: Some(PathBuf::from("/tmp/fhirbridge-test")),
        };
        assert_eq!(
            storage.resolve_dir().unwrap(),
            PathBuf::from("/tmp/fhirbridge-test")
        );
    }

    fn toml_from_str(s: &str) -> FhirBridgeConfig {
        config::Config::builder()
            .add_source(config::File::from_str(s, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }
}
