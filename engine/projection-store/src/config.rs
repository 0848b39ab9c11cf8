//! Connection settings for the PostgreSQL backend

use serde::{Deserialize, Serialize};

/// Database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// PostgreSQL connection URL of the nfldb database
    pub url: String,

    /// Connection pool size
    pub max_connections: u32,

    /// Session time zone once the schema is up to date (UTC when unset)
    pub timezone: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://nfldb@localhost/nfldb".to_string(),
            max_connections: 5,
            timezone: None,
        }
    }
}

impl StoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), ..Self::default() }
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Time zone sessions are switched to after connecting
    pub fn session_timezone(&self) -> &str {
        self.timezone.as_deref().filter(|tz| !tz.trim().is_empty()).unwrap_or("UTC")
    }
}
