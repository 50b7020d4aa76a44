//! Configuration - ファイル + 環境変数
//!
//! 優先順位（後勝ち）:
//! 1. 各フィールドの serde default
//! 2. 設定ファイル（拡張子で TOML / JSON / YAML を判定）
//! 3. 環境変数 `COURIER_<SECTION>__<KEY>`（例: `COURIER_WORKER__CONCURRENCY=4`）

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::{Backoff, WorkerSettings};

pub const ENV_PREFIX: &str = "COURIER";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub broker: BrokerConfig,
    pub store: StoreConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Unacked deliveries become visible again after this long.
    pub visibility_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Retention of every task record, counted from submission.
    pub result_ttl_secs: u64,
    pub gc_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            result_ttl_secs: 86_400,
            gc_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub dequeue_wait_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            dequeue_wait_ms: 1_000,
            backoff_base_ms: 100,
            backoff_max_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            filter: "info".to_string(),
        }
    }
}

impl CourierConfig {
    /// Load from an optional file plus `COURIER_*` environment variables, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Same as [`load`](Self::load) but reads variables from `env` instead of the process
    /// environment when given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<::config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("broker.visibility_timeout_ms", self.broker.visibility_timeout_ms),
            ("store.result_ttl_secs", self.store.result_ttl_secs),
            ("store.gc_interval_ms", self.store.gc_interval_ms),
            ("worker.concurrency", self.worker.concurrency as u64),
            ("worker.dequeue_wait_ms", self.worker.dequeue_wait_ms),
            ("worker.backoff_base_ms", self.worker.backoff_base_ms),
            ("worker.backoff_max_ms", self.worker.backoff_max_ms),
        ];
        if let Some((key, _)) = checks.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{key} must be greater than zero")));
        }
        if self.worker.backoff_base_ms > self.worker.backoff_max_ms {
            return Err(ConfigError::Invalid(
                "worker.backoff_base_ms must not exceed worker.backoff_max_ms".to_string(),
            ));
        }
        Ok(())
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_millis(self.broker.visibility_timeout_ms)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.store.result_ttl_secs)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.store.gc_interval_ms)
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            dequeue_wait: Duration::from_millis(self.worker.dequeue_wait_ms),
            backoff: Backoff::new(
                Duration::from_millis(self.worker.backoff_base_ms),
                Duration::from_millis(self.worker.backoff_max_ms),
            ),
        }
    }
}
