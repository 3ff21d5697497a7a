//! Service configuration loaded from TOML.
//!
//! ```toml
//! service_url = "https://archive.eso.org/tap_cat"
//! schema = "safcat"
//! query_type = "sync"        # sync or async
//! maxrec = 1000              # default row cap per query
//! fallback_maxrec = 100      # row cap for the retry after a failed sync query
//! timeout_secs = 60          # HTTP request timeout
//! poll_interval_ms = 500     # async job polling
//! job_timeout_secs = 600
//! ```
//!
//! Every key is optional.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

use crate::error::{TapError, TapResult};
use crate::service::QueryType;

/// ESO catalogue facility TAP endpoint.
pub const ESO_TAP_CAT_URL: &str = "https://archive.eso.org/tap_cat";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapConfig {
    /// Base URL of the TAP service (without `/sync` or `/async`).
    #[serde(default = "default_service_url")]
    pub service_url: String,

    /// Schema holding the catalogue tables in `TAP_SCHEMA.tables`.
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Endpoint used when a query does not choose one. Unknown values fall
    /// back to sync with a warning.
    #[serde(default, deserialize_with = "lenient_query_type")]
    pub query_type: QueryType,

    /// Row cap applied when a query does not set its own.
    #[serde(default = "default_maxrec")]
    pub maxrec: u64,

    /// Row cap used for the single retry of a failed sync query.
    #[serde(default = "default_fallback_maxrec")]
    pub fallback_maxrec: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

fn lenient_query_type<'de, D: Deserializer<'de>>(deserializer: D) -> Result<QueryType, D::Error> {
    let value = String::deserialize(deserializer)?;
    Ok(QueryType::parse_or_sync(&value))
}

fn default_service_url() -> String {
    ESO_TAP_CAT_URL.to_string()
}

fn default_schema() -> String {
    "safcat".to_string()
}

fn default_maxrec() -> u64 {
    1000
}

fn default_fallback_maxrec() -> u64 {
    100
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_job_timeout_secs() -> u64 {
    600
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            schema: default_schema(),
            query_type: QueryType::default(),
            maxrec: default_maxrec(),
            fallback_maxrec: default_fallback_maxrec(),
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            job_timeout_secs: default_job_timeout_secs(),
        }
    }
}

impl TapConfig {
    /// Read and parse a TOML config file.
    ///
    /// # Errors
    /// [`TapError::Config`] if the file cannot be read or is not valid TOML.
    pub fn load(path: impl AsRef<Path>) -> TapResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| TapError::config(path.display().to_string(), e.to_string()))?;
        Self::from_toml_str(&content)
            .map_err(|e| TapError::config(path.display().to_string(), e.to_string()))
    }

    /// Like [`TapConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> TapResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml_string(&self) -> TapResult<String> {
        toml::to_string_pretty(self).map_err(|e| TapError::config("<memory>", e.to_string()))
    }

    pub fn with_service_url(mut self, url: impl Into<String>) -> Self {
        self.service_url = url.into();
        self
    }

    /// Service URL with any trailing slash removed.
    pub fn base_url(&self) -> &str {
        self.service_url.trim_end_matches('/')
    }
}
