//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use crate::reload::CoordinatorOptions;
use crate::snapshot::BindingNamePolicy;
use serde::Deserialize;
use std::fmt::Display;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load environment variables: {0}")]
    EnvLoad(#[from] dotenvy::Error),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0), // Bind to 0.0.0.0 for Docker
            port: 3000,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Models generation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Where user files live and artifacts are written
    pub directory: PathBuf,
    /// JSON schema document read by the file schema store
    pub schema_file: PathBuf,
    pub module_name: String,
    pub binding_names: BindingNamePolicy,
    pub lock_timeout: Duration,
    pub flag_out_of_date: bool,
    pub watch_files: bool,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        let directory = PathBuf::from("./data/models");
        Self {
            schema_file: directory.join("schema.json"),
            directory,
            module_name: "Generated.Models".to_string(),
            binding_names: BindingNamePolicy::default(),
            lock_timeout: Duration::from_secs(120),
            flag_out_of_date: true,
            watch_files: true,
        }
    }
}

impl ModelsConfig {
    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            module_name: self.module_name.clone(),
            lock_timeout: self.lock_timeout,
            flag_out_of_date: self.flag_out_of_date,
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub models: ModelsConfig,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists; a missing file is fine, a broken one is not
        env_file_loaded(dotenvy::dotenv())?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key -> value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_defaults = ServerConfig::default();
        let server = ServerConfig {
            host: parse_var(&lookup, "HOST", server_defaults.host)?,
            port: parse_var(&lookup, "PORT", server_defaults.port)?,
        };

        let cors = CorsConfig {
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        let defaults = ModelsConfig::default();
        let directory = lookup("MODELS_DIR").map(PathBuf::from).unwrap_or(defaults.directory);
        let models = ModelsConfig {
            schema_file: lookup("SCHEMA_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| directory.join("schema.json")),
            directory,
            module_name: lookup("MODELS_MODULE_NAME").unwrap_or(defaults.module_name),
            binding_names: parse_var(&lookup, "MODELS_BINDING_NAMES", defaults.binding_names)?,
            lock_timeout: Duration::from_secs(parse_var(
                &lookup,
                "MODELS_LOCK_TIMEOUT_SECS",
                defaults.lock_timeout.as_secs(),
            )?),
            flag_out_of_date: parse_var(&lookup, "MODELS_FLAG_OUT_OF_DATE", defaults.flag_out_of_date)?,
            watch_files: parse_var(&lookup, "MODELS_WATCH_FILES", defaults.watch_files)?,
        };

        Ok(Self { server, cors, models })
    }
}

fn env_file_loaded<T>(result: dotenvy::Result<T>) -> Result<(), ConfigError> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{:?}: {}", raw, e),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, Ipv4Addr::new(0, 0, 0, 0));
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let settings = settings(&[]).unwrap();
        assert_eq!(settings.models.directory, PathBuf::from("./data/models"));
        assert_eq!(settings.models.schema_file, PathBuf::from("./data/models/schema.json"));
        assert_eq!(settings.models.binding_names, BindingNamePolicy::PascalAlias);
        assert_eq!(settings.models.lock_timeout, Duration::from_secs(120));
        assert!(settings.models.watch_files);
    }

    #[test]
    fn test_models_overrides() {
        let settings = settings(&[
            ("MODELS_DIR", "/srv/models"),
            ("MODELS_BINDING_NAMES", "raw-alias"),
            ("MODELS_LOCK_TIMEOUT_SECS", "5"),
            ("MODELS_FLAG_OUT_OF_DATE", "false"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example"),
        ])
        .unwrap();
        assert_eq!(settings.models.schema_file, PathBuf::from("/srv/models/schema.json"));
        assert_eq!(settings.models.binding_names, BindingNamePolicy::RawAlias);

        let options = settings.models.coordinator_options();
        assert_eq!(options.lock_timeout, Duration::from_secs(5));
        assert!(!options.flag_out_of_date);
        assert_eq!(settings.cors.allowed_origins.len(), 2);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            settings(&[("PORT", "eighty")]),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "PORT"
        ));
        assert!(matches!(
            settings(&[("MODELS_BINDING_NAMES", "camel")]),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "MODELS_BINDING_NAMES"
        ));
    }

    #[test]
    fn test_env_file_missing_is_fine_broken_is_not() {
        let dir = TempDir::new().unwrap();
        assert!(env_file_loaded(dotenvy::from_path(dir.path().join(".env"))).is_ok());

        let broken = dir.path().join("broken.env");
        std::fs::write(&broken, "MODELS DIR /srv/models\n").unwrap();
        assert!(matches!(
            env_file_loaded(dotenvy::from_path(&broken)),
            Err(ConfigError::EnvLoad(_))
        ));
    }
}
