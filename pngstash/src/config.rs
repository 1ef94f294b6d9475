//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `PNGSTASH_CONFIG`
//! environment variable. A missing file is not an error: every field has a default.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `PNGSTASH_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `PNGSTASH_AUTH__USERNAME=uploader` sets the `auth.username` field.
//!
//! ## Example
//!
//! ```yaml
//! port: 8080
//! root: /srv/www
//! image_dir: /var/lib/pngstash/images
//! auth:
//!   username: images
//!   password: change-me
//! naming:
//!   collision: disambiguate
//! index:
//!   url: postgres://pngstash@localhost/pngstash
//!   timeout: 2s
//! ```
//!
//! The configuration is read once at startup and shared immutably afterwards.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::Error;
use crate::ingest::CollisionPolicy;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "PNGSTASH_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Document root of the site embedding the uploader. Informational only.
    pub root: Option<String>,
    /// Directory stored images are written to and served from
    pub image_dir: PathBuf,
    /// Basic-auth credentials guarding the ingest endpoint
    pub auth: AuthConfig,
    pub cors: CorsConfig,
    pub naming: NamingConfig,
    pub limits: LimitsConfig,
    /// Optional PostgreSQL index of stored images
    pub index: IndexConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Require basic auth on the ingest endpoint
    pub enabled: bool,
    pub username: String,
    pub password: String,
    /// Realm advertised in `WWW-Authenticate` challenges
    pub realm: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins; `*` allows any
    pub allowed_origins: Vec<CorsOrigin>,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// CORS origin specification: `*` or a specific origin URL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamingConfig {
    /// Behaviour when two uploads with the same label land in the same second
    pub collision: CollisionPolicy,
    /// Require the PNG signature in addition to the declared `image/png` type
    pub verify_signature: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum accepted request body in bytes
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    /// PostgreSQL connection string. Indexing is disabled when unset.
    pub url: Option<String>,
    /// Upper bound on a single index write
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub max_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            root: None,
            image_dir: PathBuf::from("images"),
            auth: AuthConfig::default(),
            cors: CorsConfig::default(),
            naming: NamingConfig::default(),
            limits: LimitsConfig::default(),
            index: IndexConfig::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            username: "images".to_string(),
            password: "dataurltopng".to_string(),
            realm: "pngstash".to_string(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            max_age: Some(3600),
        }
    }
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            collision: CollisionPolicy::Overwrite,
            verify_signature: true,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_secs(5),
            max_connections: 2,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            // PNGSTASH_CONFIG names the file itself, it is not a config key
            .merge(Env::prefixed("PNGSTASH_").ignore(&["config"]).split("__"))
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.image_dir.as_os_str().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: image_dir cannot be empty".to_string(),
            });
        }

        if self.auth.enabled {
            if self.auth.username.is_empty() || self.auth.password.is_empty() {
                return Err(Error::Internal {
                    operation: "Config validation: auth is enabled but username or password is empty. \
                     Set PNGSTASH_AUTH__USERNAME and PNGSTASH_AUTH__PASSWORD or disable auth."
                        .to_string(),
                });
            }

            // Basic auth splits on the first ':'
            if self.auth.username.contains(':') {
                return Err(Error::Internal {
                    operation: "Config validation: auth username cannot contain ':'".to_string(),
                });
            }
        }

        if self.cors.allowed_origins.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: CORS allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            });
        }

        if self.limits.max_body_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: limits.max_body_size must be positive".to_string(),
            });
        }

        if self.index.url.is_some() {
            if self.index.timeout.is_zero() {
                return Err(Error::Internal {
                    operation: "Config validation: index.timeout must be positive".to_string(),
                });
            }
            if self.index.max_connections == 0 {
                return Err(Error::Internal {
                    operation: "Config validation: index.max_connections must be positive".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
