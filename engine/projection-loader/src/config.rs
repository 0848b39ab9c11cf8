//! Loader configuration: defaults, optional TOML file, environment overrides

use std::path::Path;

use projection_store::StoreConfig;
use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, Result};
use crate::names::{DistanceMetric, DEFAULT_CANDIDATE_LIMIT};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Database configuration
    pub database: StoreConfig,

    /// Name resolution configuration
    pub resolver: ResolverConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Candidates listed when a name cannot be resolved
    pub candidate_limit: usize,

    /// Edit distance used for fuzzy matching
    pub metric: DistanceMetric,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { candidate_limit: DEFAULT_CANDIDATE_LIMIT, metric: DistanceMetric::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. "info" or "projection_loader=debug"
    pub level: String,

    /// "text", "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "text".to_string() }
    }
}

impl LoaderConfig {
    /// Read a configuration file; sections and fields it omits keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let settings = config::Config::builder().add_source(config::File::from(path)).build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Defaults overridden by the environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Defaults, then `path` if given, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps variable names to values
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(max) = lookup("PROJECTION_DB_MAX_CONNECTIONS") {
            self.database.max_connections = max.trim().parse().map_err(|_| {
                let message = format!("PROJECTION_DB_MAX_CONNECTIONS is not a number: {max}");
                LoaderError::InvalidConfig(message)
            })?;
        }
        if let Some(timezone) = lookup("PROJECTION_DB_TIMEZONE") {
            self.database.timezone = Some(timezone);
        }
        if let Some(limit) = lookup("PROJECTION_CANDIDATE_LIMIT") {
            self.resolver.candidate_limit = limit.trim().parse().map_err(|_| {
                let message = format!("PROJECTION_CANDIDATE_LIMIT is not a number: {limit}");
                LoaderError::InvalidConfig(message)
            })?;
        }
        if let Some(metric) = lookup("PROJECTION_NAME_METRIC") {
            self.resolver.metric = metric.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(LoaderError::InvalidConfig("database.url is empty".to_string()));
        }
        if self.database.max_connections == 0 {
            let message = "database.max_connections must be positive";
            return Err(LoaderError::InvalidConfig(message.to_string()));
        }
        if self.resolver.candidate_limit == 0 {
            let message = "resolver.candidate_limit must be positive";
            return Err(LoaderError::InvalidConfig(message.to_string()));
        }
        Ok(())
    }
}
