//! Configuration management for Crosscast

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};
use crate::registry::ProviderKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Server-held key used to sign OAuth state round-tripped through
    /// provider redirects.
    pub state_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Per-adapter-call deadline during a fan-out.
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u64,
    /// Upper bound on concurrently running adapter calls.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_publishes: usize,
}

fn default_publish_timeout() -> u64 {
    30
}

fn default_max_concurrent() -> usize {
    num_cpus::get().min(4).max(1)
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            publish_timeout_secs: default_publish_timeout(),
            max_concurrent_publishes: default_max_concurrent(),
        }
    }
}

/// OAuth application credentials for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub x: Option<AppCredentials>,
    pub facebook: Option<AppCredentials>,
    pub linkedin: Option<AppCredentials>,
    pub instagram: Option<AppCredentials>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// App credentials for an OAuth provider.
    ///
    /// Environment variables (`CROSSCAST_<PROVIDER>_CLIENT_ID`,
    /// `_CLIENT_SECRET`, `_REDIRECT_URI`) take precedence over the config
    /// file so deployments can keep secrets out of it. Returns `None` when
    /// the provider is not set up in this environment.
    pub fn app_credentials(&self, kind: ProviderKind) -> Option<AppCredentials> {
        if let Some(creds) = app_credentials_from_env(kind) {
            return Some(creds);
        }

        match kind {
            ProviderKind::X => self.providers.x.clone(),
            ProviderKind::Facebook => self.providers.facebook.clone(),
            ProviderKind::Linkedin => self.providers.linkedin.clone(),
            ProviderKind::Instagram => self.providers.instagram.clone(),
            ProviderKind::Bluesky => None,
        }
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/crosscast/crosscast.db".to_string(),
            },
            security: SecurityConfig {
                state_secret: String::new(),
            },
            dispatch: DispatchConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

fn app_credentials_from_env(kind: ProviderKind) -> Option<AppCredentials> {
    let prefix = format!("CROSSCAST_{}", kind.as_str().to_uppercase());
    let client_id = std::env::var(format!("{}_CLIENT_ID", prefix)).ok()?;
    let client_secret = std::env::var(format!("{}_CLIENT_SECRET", prefix)).ok()?;
    let redirect_uri = std::env::var(format!("{}_REDIRECT_URI", prefix)).ok()?;

    Some(AppCredentials {
        client_id,
        client_secret,
        redirect_uri,
    })
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosscast").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SAMPLE: &str = r#"
[database]
path = "/tmp/crosscast-test.db"

[security]
state_secret = "sekrit"

[dispatch]
publish_timeout_secs = 10
max_concurrent_publishes = 2

[providers.x]
client_id = "x-app"
client_secret = "x-secret"
redirect_uri = "https://app.example.com/callback/x"
"#;

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.database.path, "/tmp/crosscast-test.db");
        assert_eq!(config.security.state_secret, "sekrit");
        assert_eq!(config.dispatch.publish_timeout_secs, 10);
        assert_eq!(config.dispatch.max_concurrent_publishes, 2);
        assert!(config.providers.x.is_some());
        assert!(config.providers.facebook.is_none());
    }

    #[test]
    fn test_dispatch_defaults_applied() {
        let config: Config = toml::from_str(
            r#"
[database]
path = ":memory:"

[security]
state_secret = "k"
"#,
        )
        .unwrap();

        assert_eq!(config.dispatch.publish_timeout_secs, 30);
        assert!(config.dispatch.max_concurrent_publishes >= 1);
        assert!(config.dispatch.max_concurrent_publishes <= 4);
    }

    #[test]
    #[serial]
    fn test_app_credentials_from_config_file() {
        std::env::remove_var("CROSSCAST_X_CLIENT_ID");
        std::env::remove_var("CROSSCAST_X_CLIENT_SECRET");
        std::env::remove_var("CROSSCAST_X_REDIRECT_URI");

        let config: Config = toml::from_str(SAMPLE).unwrap();
        let creds = config.app_credentials(ProviderKind::X).unwrap();
        assert_eq!(creds.client_id, "x-app");

        assert!(config.app_credentials(ProviderKind::Linkedin).is_none());
    }

    #[test]
    #[serial]
    fn test_app_credentials_env_override() {
        std::env::set_var("CROSSCAST_X_CLIENT_ID", "env-app");
        std::env::set_var("CROSSCAST_X_CLIENT_SECRET", "env-secret");
        std::env::set_var("CROSSCAST_X_REDIRECT_URI", "https://env.example.com/cb");

        let config: Config = toml::from_str(SAMPLE).unwrap();
        let creds = config.app_credentials(ProviderKind::X).unwrap();
        assert_eq!(creds.client_id, "env-app");

        std::env::remove_var("CROSSCAST_X_CLIENT_ID");
        std::env::remove_var("CROSSCAST_X_CLIENT_SECRET");
        std::env::remove_var("CROSSCAST_X_REDIRECT_URI");
    }

    #[test]
    fn test_bluesky_never_has_app_credentials() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert!(config.app_credentials(ProviderKind::Bluesky).is_none());
    }

    #[test]
    fn test_default_config_paths() {
        let config = Config::default_config();
        assert!(config.database.path.contains("crosscast"));
    }
}
