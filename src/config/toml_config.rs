use crate::core::cache::CacheSettings;
use crate::core::catalog::CatalogSettings;
use crate::core::engine::DEFAULT_FANOUT_TIMEOUT;
use crate::core::executor::{RetryPolicy, DEFAULT_MAX_RETRIES};
use crate::utils::error::{Result, StatsError};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub store: StoreConfig,
    pub execution: ExecutionConfig,
    pub cache: CacheSettings,
    pub catalog: CatalogSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Csv,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Directory holding players.csv, memberships.csv and the name files.
    pub data_dir: String,
    /// SQL-over-HTTP endpoint for the http backend.
    pub endpoint: Option<String>,
    pub auth_token: Option<String>,
    pub pool_size: usize,
    pub request_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Csv,
            data_dir: "./data".to_string(),
            endpoint: None,
            auth_token: None,
            pool_size: 8,
            request_timeout_secs: 10,
        }
    }
}

impl StoreConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_retries: u32,
    pub fanout_timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            fanout_timeout_ms: DEFAULT_FANOUT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl ExecutionConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
        }
    }

    pub fn fanout_timeout(&self) -> Duration {
        Duration::from_millis(self.fanout_timeout_ms)
    }
}

impl StatsConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(StatsError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| StatsError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR_NAME}` with the environment value; unknown variables
    /// are left as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| StatsError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        match self.store.backend {
            StoreBackend::Csv => validation::validate_path("store.data_dir", &self.store.data_dir)?,
            StoreBackend::Http => {
                let endpoint = validation::validate_required_field("store.endpoint", &self.store.endpoint)?;
                validation::validate_url("store.endpoint", endpoint)?;
            }
        }
        validation::validate_positive_number("store.pool_size", self.store.pool_size as u64, 1)?;
        validation::validate_positive_number(
            "store.request_timeout_secs",
            self.store.request_timeout_secs,
            1,
        )?;

        validation::validate_range("execution.max_retries", self.execution.max_retries, 0, 5)?;
        validation::validate_positive_number(
            "execution.fanout_timeout_ms",
            self.execution.fanout_timeout_ms,
            1,
        )?;

        if self.cache.idle_evict_secs < self.cache.fresh_secs {
            return Err(StatsError::InvalidConfigValue {
                field: "cache.idle_evict_secs".to_string(),
                value: self.cache.idle_evict_secs.to_string(),
                reason: "Must not be shorter than cache.fresh_secs".to_string(),
            });
        }

        validation::validate_country_code("catalog.state_country", &self.catalog.state_country)?;
        Ok(())
    }
}

impl Validate for StatsConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
