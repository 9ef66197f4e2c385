//! Configuration parser for loading configuration files.
//!
//! This module handles loading configuration from YAML files, `.env` files
//! and environment variables, with proper precedence and error handling.

use crate::api::Credentials;
use crate::error::{BowtieError, ConfigError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::BowtieConfig;

/// Controller URL variable.
pub const ENV_HOST: &str = "BOWTIE_HOST";
/// Login email variable.
pub const ENV_USERNAME: &str = "BOWTIE_USERNAME";
/// Login password variable.
pub const ENV_PASSWORD: &str = "BOWTIE_PASSWORD";
/// State file override variable.
pub const ENV_STATE_PATH: &str = "BOWTIE_STATE_PATH";

/// Configuration parser.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving the `.env` file.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<BowtieConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(BowtieError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            BowtieError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<BowtieConfig> {
        debug!("Parsing YAML configuration");

        let config: BowtieConfig = serde_yaml::from_str(content).map_err(|e| {
            BowtieError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })?;

        debug!(
            "Parsed configuration with {} declared entities",
            config.entity_count()
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<BowtieConfig> {
        let mut config = self.load_file(path)?;
        apply_overrides(&mut config, |name| std::env::var(name).ok());
        Ok(config)
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                BowtieError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Reads login credentials from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if either variable is missing.
    pub fn credentials() -> Result<Credentials> {
        Ok(Credentials {
            username: required_env(ENV_USERNAME)?,
            password: required_env(ENV_PASSWORD)?,
        })
    }

    /// Returns the controller URL, preferring the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if neither `BOWTIE_HOST` nor `host` is set.
    pub fn host(config: &BowtieConfig) -> Result<String> {
        std::env::var(ENV_HOST)
            .ok()
            .or_else(|| config.host.clone())
            .filter(|host| !host.is_empty())
            .ok_or_else(|| {
                BowtieError::Config(ConfigError::MissingEnvVar {
                    name: String::from(ENV_HOST),
                })
            })
    }
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            BowtieError::Config(ConfigError::MissingEnvVar {
                name: name.to_string(),
            })
        })
}

/// Applies `BOWTIE_*` overrides using the given variable lookup.
pub fn apply_overrides(config: &mut BowtieConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup(ENV_HOST) {
        debug!("Overriding host from environment");
        config.host = Some(host);
    }

    if let Some(path) = lookup(ENV_STATE_PATH) {
        debug!("Overriding state.path from environment");
        config.state.path = Some(path);
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["bowtie.yaml", "bowtie.yml"];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(BowtieError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::codec::ResourcePorts;
    use crate::planner::MembershipMode;

    #[test]
    fn test_parse_empty_config() {
        let config = ConfigParser::new().parse_yaml("{}", None).unwrap();
        assert_eq!(config.entity_count(), 0);
        assert!(config.host.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r"
host: https://bowtie.example.com
sites:
  - name: office
    ranges:
      - name: lan
        ipv4_range: 10.0.0.0/16
        weight: 1
        metric: 255
dns:
  - name: example.com
    servers: [1.1.1.1, 4.4.4.4]
    excludes: [skip.example.com]
    include_only_sites: [office]
groups:
  - name: engineering
    users: [user-1, user-2]
    membership_mode: wholesale
resources:
  - name: intranet
    protocol: http
    location:
      dns: intranet.example.com
    ports:
      range: [80, 443]
  - name: ssh
    protocol: tcp
    location:
      type: cidr
      value: 10.0.0.0/8
    ports:
      collection: [22]
resource_groups:
  - name: internal
    resources: [intranet, ssh]
";
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();

        assert_eq!(config.entity_count(), 7);
        assert_eq!(config.sites[0].ranges[0].metric, 255);
        assert_eq!(config.dns[0].servers, vec!["1.1.1.1", "4.4.4.4"]);
        assert_eq!(config.groups[0].membership_mode, MembershipMode::Wholesale);
        assert_eq!(config.groups[0].users.as_ref().map(|u| u.len()), Some(2));
        assert_eq!(config.resources[1].location.kind.as_deref(), Some("cidr"));
        assert_eq!(
            config.resources[1].ports.to_ports(),
            ResourcePorts::Collection(vec![22])
        );
    }

    #[test]
    fn test_parse_error_has_location() {
        let err = ConfigParser::new()
            .parse_yaml("sites: 3", Some(Path::new("bowtie.yaml")))
            .unwrap_err();
        assert!(matches!(
            err,
            BowtieError::Config(ConfigError::ParseError { location: Some(_), .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let mut config = BowtieConfig::default();
        apply_overrides(&mut config, |name| match name {
            ENV_HOST => Some(String::from("http://localhost:3000")),
            _ => None,
        });
        assert_eq!(config.host.as_deref(), Some("http://localhost:3000"));
        assert!(config.state.path.is_none());
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("bowtie.yml"), "{}").unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, dir.path().join("bowtie.yml"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigParser::new()
            .load_file(dir.path().join("nope.yaml"))
            .unwrap_err();
        assert!(matches!(err, BowtieError::Config(ConfigError::FileNotFound { .. })));
    }
}
