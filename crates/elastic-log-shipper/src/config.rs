// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::watch;

use crate::debug::DebugConfig;
use crate::error::ShipperError;
use crate::item::Severity;
use crate::queue::QueueEntry;
use crate::retry::RetryStrategy;
use crate::routing::ShardingPolicy;

const DEFAULT_INDEX_NAME: &str = "logs";
const DEFAULT_QUEUE_SIZE: usize = 1_000;
const DEFAULT_POOL_SIZE: usize = 2;
const DEFAULT_BULK_SIZE: usize = 500;
const DEFAULT_BULK_TIMEOUT: Duration = Duration::from_secs(1);

/// Settings applied when the shipper creates an index or template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSettings {
    pub number_of_shards: u16,
    pub number_of_replicas: u16,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            number_of_shards: 1,
            number_of_replicas: 1,
        }
    }
}

impl IndexSettings {
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "number_of_shards": self.number_of_shards,
            "number_of_replicas": self.number_of_replicas,
        })
    }
}

/// How much the shipper is allowed to manage indices on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdminMode {
    /// Touch nothing; writes fail later if the index is missing.
    None,
    /// Verify the index (or template, when sharding) exists; fail startup otherwise.
    CheckOnly,
    /// Create the index (or template) and its mapping when missing.
    #[default]
    Full,
}

impl FromStr for AdminMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(AdminMode::None),
            "check-only" | "check_only" | "check" => Ok(AdminMode::CheckOnly),
            "full" => Ok(AdminMode::Full),
            other => Err(format!("unknown admin mode '{other}'")),
        }
    }
}

/// How hard `submit` tries to get an item into a full queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoggingGuarantee {
    /// One attempt; the item is dropped if the queue is full.
    #[default]
    None,
    /// Up to `n` attempts, spaced by [`crate::ENQUEUE_RETRY_DELAY_MS`].
    TryNTimes(u64),
    /// Attempts spaced and limited by the given strategy.
    TryWithPolicy(RetryStrategy),
    /// Never drops; blocks the submitting task until there is room.
    TryForever,
}

impl LoggingGuarantee {
    pub(crate) fn strategy(&self) -> RetryStrategy {
        match self {
            LoggingGuarantee::None => RetryStrategy::Immediate(1),
            LoggingGuarantee::TryNTimes(n) => {
                RetryStrategy::Constant(*n, crate::ENQUEUE_RETRY_DELAY_MS)
            }
            LoggingGuarantee::TryWithPolicy(strategy) => *strategy,
            LoggingGuarantee::TryForever => RetryStrategy::Forever(crate::ENQUEUE_RETRY_DELAY_MS),
        }
    }
}

/// Predicate over the accumulated batch: keep waiting while it returns `true`.
pub type KeepWaitingFn = Arc<dyn Fn(&[QueueEntry]) -> bool + Send + Sync>;

/// When the bulk sender stops waiting for more entries.
#[derive(Clone)]
pub enum SendThreshold {
    /// Send once at least this many entries are accumulated.
    Count(usize),
    /// Send once the predicate returns `false`.
    KeepWaitingWhile(KeepWaitingFn),
}

impl SendThreshold {
    /// Whether the sender should keep waiting given the current batch.
    #[must_use]
    pub fn keep_waiting(&self, batch: &[QueueEntry]) -> bool {
        match self {
            SendThreshold::Count(n) => batch.len() < *n,
            SendThreshold::KeepWaitingWhile(predicate) => predicate(batch),
        }
    }
}

impl fmt::Debug for SendThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendThreshold::Count(n) => write!(f, "Count({n})"),
            SendThreshold::KeepWaitingWhile(_) => write!(f, "KeepWaitingWhile"),
        }
    }
}

/// Externally fired timeout for the bulk sender, used to drive flushes
/// deterministically.
///
/// A fire ends every wait in progress, across all workers sharing the timer.
/// Waits started after the fire are not affected by it.
#[derive(Debug, Clone)]
pub struct ManualTimer {
    fired: Arc<watch::Sender<u64>>,
}

impl Default for ManualTimer {
    fn default() -> Self {
        let (fired, _) = watch::channel(0);
        Self {
            fired: Arc::new(fired),
        }
    }
}

impl ManualTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.fired.send_modify(|generation| *generation += 1);
    }

    /// Starts a wait ended by the next fire.
    pub(crate) fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut fired = self.fired.subscribe();
        async move {
            // the sender lives as long as the timer, so this only returns on a fire
            let _ = fired.changed().await;
        }
    }
}

/// Upper bound on how long the bulk sender waits for the threshold.
#[derive(Debug, Clone)]
pub enum FlushTimeout {
    Fixed(Duration),
    Manual(ManualTimer),
}

impl FlushTimeout {
    /// Starts the timeout of one wait.
    pub(crate) fn start(&self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        match self {
            FlushTimeout::Fixed(duration) => Box::pin(tokio::time::sleep(*duration)),
            FlushTimeout::Manual(timer) => Box::pin(timer.wait()),
        }
    }
}

/// Whether a bulk send runs inside the sender loop or on its own task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BulkDispatch {
    #[default]
    Inline,
    /// Fire-and-forget; the worker still joins these sends before it exits.
    Detached,
}

#[derive(Debug, Clone)]
pub struct BulkConfig {
    pub threshold: SendThreshold,
    pub timeout: FlushTimeout,
    /// Pause between two dequeues of the accumulation task.
    pub accumulate_delay: Option<Duration>,
    pub dispatch: BulkDispatch,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            threshold: SendThreshold::Count(DEFAULT_BULK_SIZE),
            timeout: FlushTimeout::Fixed(DEFAULT_BULK_TIMEOUT),
            accumulate_delay: None,
            dispatch: BulkDispatch::Inline,
        }
    }
}

/// Delivery strategy run by every worker of the pool.
#[derive(Debug, Clone, Default)]
pub enum SendStrategy {
    /// One index request per item.
    #[default]
    Single,
    /// Accumulate and send `_bulk` requests.
    Bulk(BulkConfig),
}

/// Configuration of a [`crate::Shipper`].
#[derive(Debug, Clone)]
pub struct ShipperConfig {
    /// Base index name; sharded indices use it as a prefix.
    pub index_name: String,
    pub index_settings: IndexSettings,
    /// Capacity of the delivery queue.
    pub queue_size: usize,
    /// Number of concurrent workers draining the queue.
    pub pool_size: usize,
    /// Suffix payload keys with their value type.
    pub annotate_types: bool,
    pub sharding: ShardingPolicy,
    pub send_strategy: SendStrategy,
    pub guarantee: LoggingGuarantee,
    pub admin_mode: AdminMode,
    /// Retries of a delivery to the backend.
    pub retry_strategy: RetryStrategy,
    /// Items below this severity are dropped on submit.
    pub min_severity: Severity,
    pub debug: DebugConfig,
    /// Bound on the graceful drain; in-flight sends are cancelled after it.
    pub shutdown_timeout: Option<Duration>,
    /// Overrides the `app` field of items that leave it empty.
    pub app: String,
    /// Overrides the `env` field of items that leave it empty.
    pub env: String,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            index_name: DEFAULT_INDEX_NAME.to_string(),
            index_settings: IndexSettings::default(),
            queue_size: DEFAULT_QUEUE_SIZE,
            pool_size: DEFAULT_POOL_SIZE,
            annotate_types: false,
            sharding: ShardingPolicy::None,
            send_strategy: SendStrategy::Single,
            guarantee: LoggingGuarantee::None,
            admin_mode: AdminMode::Full,
            retry_strategy: RetryStrategy::default(),
            min_severity: Severity::Debug,
            debug: DebugConfig::default(),
            shutdown_timeout: None,
            app: String::new(),
            env: String::new(),
        }
    }
}

impl ShipperConfig {
    /// Defaults overridden by `LOG_SHIPPER_*` environment variables.
    pub fn from_env() -> Result<Self, ShipperError> {
        let mut config = Self::default();

        if let Ok(index) = env::var("LOG_SHIPPER_INDEX") {
            config.index_name = index;
        }
        if let Ok(size) = env::var("LOG_SHIPPER_QUEUE_SIZE") {
            config.queue_size = parse_var("LOG_SHIPPER_QUEUE_SIZE", &size)?;
        }
        if let Ok(size) = env::var("LOG_SHIPPER_POOL_SIZE") {
            config.pool_size = parse_var("LOG_SHIPPER_POOL_SIZE", &size)?;
        }
        if let Ok(policy) = env::var("LOG_SHIPPER_SHARDING") {
            config.sharding = policy.parse().map_err(ShipperError::InvalidConfig)?;
        }
        if let Ok(mode) = env::var("LOG_SHIPPER_ADMIN_MODE") {
            config.admin_mode = mode.parse().map_err(ShipperError::InvalidConfig)?;
        }
        if let Ok(severity) = env::var("LOG_SHIPPER_MIN_SEVERITY") {
            config.min_severity = severity.parse().map_err(ShipperError::InvalidConfig)?;
        }
        if let Ok(annotate) = env::var("LOG_SHIPPER_ANNOTATE_TYPES") {
            config.annotate_types = annotate.to_lowercase() == "true";
        }
        if let Ok(app) = env::var("LOG_SHIPPER_APP") {
            config.app = app;
        }
        if let Ok(environment) = env::var("LOG_SHIPPER_ENV") {
            config.env = environment;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ShipperError> {
        if self.queue_size == 0 {
            return Err(ShipperError::InvalidConfig(
                "queue_size must be at least 1".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(ShipperError::InvalidConfig(
                "pool_size must be at least 1".to_string(),
            ));
        }
        if self.index_name.trim().is_empty() {
            return Err(ShipperError::InvalidConfig(
                "index_name cannot be empty".to_string(),
            ));
        }
        // Elasticsearch rejects upper case index names
        if self.index_name.chars().any(char::is_uppercase) {
            return Err(ShipperError::InvalidConfig(format!(
                "index_name '{}' must be lower case",
                self.index_name
            )));
        }
        if self.retry_strategy.max_attempts() == Some(0) {
            return Err(ShipperError::InvalidConfig(
                "retry_strategy must allow at least one attempt".to_string(),
            ));
        }
        if let SendStrategy::Bulk(bulk) = &self.send_strategy {
            if matches!(bulk.threshold, SendThreshold::Count(0)) {
                return Err(ShipperError::InvalidConfig(
                    "bulk send threshold must be at least 1".to_string(),
                ));
            }
        }
        if self.debug.is_enabled() && self.debug.report_interval.is_zero() {
            return Err(ShipperError::InvalidConfig(
                "debug report_interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T, ShipperError> {
    value
        .trim()
        .parse()
        .map_err(|_| ShipperError::InvalidConfig(format!("{name} has invalid value '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ShipperConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_sizes() {
        let config = ShipperConfig {
            queue_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ShipperConfig {
            pool_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_index_name() {
        let config = ShipperConfig {
            index_name: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ShipperConfig {
            index_name: "Logs".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bulk_threshold() {
        let config = ShipperConfig {
            send_strategy: SendStrategy::Bulk(BulkConfig {
                threshold: SendThreshold::Count(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_admin_mode_from_str() {
        assert_eq!(AdminMode::from_str("none").unwrap(), AdminMode::None);
        assert_eq!(
            AdminMode::from_str("Check-Only").unwrap(),
            AdminMode::CheckOnly
        );
        assert_eq!(AdminMode::from_str("FULL").unwrap(), AdminMode::Full);
        assert!(AdminMode::from_str("some").is_err());
    }

    #[test]
    fn test_count_threshold() {
        let threshold = SendThreshold::Count(2);
        let entry = QueueEntry::new("logs".to_string(), json!({}));
        assert!(threshold.keep_waiting(&[]));
        assert!(threshold.keep_waiting(&[entry.clone()]));
        assert!(!threshold.keep_waiting(&[entry.clone(), entry]));
    }

    #[test]
    fn test_guarantee_strategies() {
        assert_eq!(LoggingGuarantee::None.strategy().max_attempts(), Some(1));
        assert_eq!(
            LoggingGuarantee::TryNTimes(4).strategy().max_attempts(),
            Some(4)
        );
        assert_eq!(
            LoggingGuarantee::TryNTimes(4).strategy().delay_before(3),
            Some(Duration::from_millis(crate::ENQUEUE_RETRY_DELAY_MS))
        );
        assert_eq!(LoggingGuarantee::TryForever.strategy().max_attempts(), None);
    }

    #[test]
    fn test_validate_zero_attempt_retry() {
        for retry_strategy in [
            RetryStrategy::Immediate(0),
            RetryStrategy::Constant(0, 10),
            RetryStrategy::ExponentialBackoff {
                attempts: 0,
                base_ms: 25,
                cap_ms: 100,
            },
        ] {
            let config = ShipperConfig {
                retry_strategy,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{retry_strategy:?}");
        }

        let config = ShipperConfig {
            retry_strategy: RetryStrategy::Forever(10),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_manual_timer_fire_ends_every_wait() {
        let timer = ManualTimer::new();
        let first = tokio::spawn(timer.wait());
        let second = tokio::spawn(timer.wait());
        timer.fire();

        for wait in [first, second] {
            tokio::time::timeout(Duration::from_millis(500), wait)
                .await
                .expect("fire should end the wait")
                .expect("wait task should not panic");
        }
    }

    #[tokio::test]
    async fn test_manual_timer_fire_before_wait_is_not_kept() {
        let timer = ManualTimer::new();
        timer.fire();
        let late = timer.wait();
        assert!(tokio::time::timeout(Duration::from_millis(50), late)
            .await
            .is_err());
    }

    #[test]
    fn test_from_env() {
        env::set_var("LOG_SHIPPER_INDEX", "app-logs");
        env::set_var("LOG_SHIPPER_QUEUE_SIZE", "64");
        env::set_var("LOG_SHIPPER_SHARDING", "daily");
        env::set_var("LOG_SHIPPER_ADMIN_MODE", "check-only");
        env::set_var("LOG_SHIPPER_MIN_SEVERITY", "warning");
        let config = ShipperConfig::from_env().unwrap();
        assert_eq!(config.index_name, "app-logs");
        assert_eq!(config.queue_size, 64);
        assert!(matches!(config.sharding, ShardingPolicy::Daily));
        assert_eq!(config.admin_mode, AdminMode::CheckOnly);
        assert_eq!(config.min_severity, Severity::Warning);

        env::set_var("LOG_SHIPPER_POOL_SIZE", "many");
        assert!(ShipperConfig::from_env().is_err());

        for var in [
            "LOG_SHIPPER_INDEX",
            "LOG_SHIPPER_QUEUE_SIZE",
            "LOG_SHIPPER_SHARDING",
            "LOG_SHIPPER_ADMIN_MODE",
            "LOG_SHIPPER_MIN_SEVERITY",
            "LOG_SHIPPER_POOL_SIZE",
        ] {
            env::remove_var(var);
        }
    }
}
