use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use dd_lifecycle::RetryPolicy;
use dd_registrar::factory::ProviderConfig;
use dd_registrar::transport::TransportOptions;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "domain-desk.toml";
pub const ENV_PREFIX: &str = "DOMAIN_DESK";
pub const DEFAULT_STATE_FILE: &str = "domain-desk-state.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Live,
    /// Every provider is served by the sandbox adapter.
    #[default]
    Simulated,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_renewal_window_days")]
    pub renewal_window_days: i64,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Provider used when `--provider` is not given and more than one is configured.
    #[serde(default)]
    pub default_provider: Option<String>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Domain records and renewal markers kept between `sweep` runs.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_renewal_window_days() -> i64 {
    30
}

fn default_state_file() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_FILE)
}

impl AppConfig {
    pub fn simulate(&self) -> bool {
        self.mode == Mode::Simulated
    }

    pub fn transport(&self) -> TransportOptions {
        TransportOptions {
            timeout: Duration::from_secs(self.http_timeout_secs),
            ..TransportOptions::default()
        }
    }

    pub fn renewal_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.renewal_window_days)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid("http_timeout_secs must be positive".into()));
        }
        if self.renewal_window_days < 0 {
            return Err(ConfigError::Invalid("renewal_window_days must not be negative".into()));
        }
        if let Some(name) = &self.default_provider {
            if !self.providers.iter().any(|p| &p.name == name) {
                return Err(ConfigError::Invalid(format!("default_provider '{}' is not configured", name)));
            }
        }
        Ok(())
    }
}

/// Load the TOML file, then overlay `DOMAIN_DESK__*` environment variables
/// (`DOMAIN_DESK__MODE=live`, `DOMAIN_DESK__LOGGING__JSON=true`).
///
/// An explicit `path` must exist; the default file is optional.
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    load_with_env(path, None)
}

fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<AppConfig, ConfigError> {
    let (file, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    tracing::debug!(path = %file.display(), required, "loading configuration");

    let config: AppConfig = Config::builder()
        .add_source(File::from(file.as_path()).required(required))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(env),
        )
        .build()?
        .try_deserialize()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dd_registrar::RegistrarProvider;
    use std::io::Write;

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn reads_tagged_provider_sections() {
        let file = write_toml(
            r#"
            mode = "live"
            http_timeout_secs = 10

            [logging]
            level = "debug"
            json = true

            [retry]
            max_attempts = 4
            initial_delay_ms = 250

            [[providers]]
            name = "main"
            provider = "namecheap"
            sandbox = true
            api_user = "acme"
            api_key = "k"
            client_ip = "203.0.113.9"
            "#,
        );
        let config = load_with_env(Some(file.path()), Some(HashMap::new())).unwrap();
        assert_eq!(config.mode, Mode::Live);
        assert!(config.logging.json);
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(250));
        assert_eq!(config.transport().timeout, Duration::from_secs(10));
        assert_eq!(config.providers.len(), 1);
        assert!(config.providers[0].sandbox);
        assert_eq!(config.providers[0].settings.provider(), RegistrarProvider::Namecheap);
    }

    #[test]
    fn environment_overrides_the_file() {
        let file = write_toml("mode = \"simulated\"\n");
        let env = HashMap::from([
            ("DOMAIN_DESK__MODE".to_string(), "live".to_string()),
            ("DOMAIN_DESK__RENEWAL_WINDOW_DAYS".to_string(), "45".to_string()),
        ]);
        let config = load_with_env(Some(file.path()), Some(env)).unwrap();
        assert_eq!(config.mode, Mode::Live);
        assert_eq!(config.renewal_window_days, 45);
    }

    #[test]
    fn defaults_to_simulated_without_a_file() {
        let config = load_with_env(Some(write_toml("").path()), Some(HashMap::new())).unwrap();
        assert!(config.simulate());
        assert_eq!(config.http_timeout_secs, 30);
        assert_eq!(config.state_file, PathBuf::from(DEFAULT_STATE_FILE));
        assert!(config.providers.is_empty());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load_with_env(Some(Path::new("/nonexistent/domain-desk.toml")), Some(HashMap::new())).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn unknown_default_provider_is_rejected() {
        let file = write_toml("default_provider = \"ghost\"\n");
        let err = load_with_env(Some(file.path()), Some(HashMap::new())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
