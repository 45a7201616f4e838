use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{WatcherError, WatcherResult};
use crate::settlement::policy::FailurePolicy;

pub const DEFAULT_RPC_URL: &str = "https://fullnode.testnet.sui.io:443";

/// Signing credential as read from the environment. Never printed.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Immutable watcher configuration, shared read-only by every step
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub signing_credential: Credential,
    pub package_id: String,
    pub module: String,
    pub created_event: String,
    pub event_id_field: String,
    pub settle_function: String,
    pub clock_object_id: String,
    pub rpc_url: String,
    pub sweep_interval: Duration,
    pub grace_period: Duration,
    /// Gas budget ceiling per settlement, in MIST
    pub max_gas_budget: u64,
    pub submission_pacing: Duration,
    pub discovery_page_size: usize,
    pub discovery_max_pages: usize,
    /// Incremental discovery when set
    pub discovery_cursor_path: Option<PathBuf>,
    pub fetch_concurrency: usize,
    pub rpc_requests_per_second: u32,
    pub rpc_timeout: Duration,
    pub submission_timeout: Duration,
    /// Move abort codes of the settle function that mean "already terminal"
    pub terminal_abort_codes: Vec<u64>,
    pub failure_policy: FailurePolicy,
    pub status_bind_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    bot_private_key: Option<String>,
    alarm_package_id: Option<String>,
    alarm_module: String,
    created_event: String,
    event_id_field: String,
    settle_function: String,
    clock_object_id: String,
    sui_rpc_url: String,
    check_interval_minutes: u64,
    grace_period_minutes: u64,
    max_gas_budget: u64,
    submission_pacing_ms: u64,
    discovery_page_size: usize,
    discovery_max_pages: usize,
    discovery_cursor_path: Option<String>,
    fetch_concurrency: usize,
    rpc_requests_per_second: u32,
    rpc_timeout_secs: u64,
    submission_timeout_secs: u64,
    terminal_abort_codes: Vec<u64>,
    settlement_failure_policy: String,
    failure_quarantine_after: u32,
    failure_backoff_max_sweeps: u32,
    status_bind_address: Option<String>,
}

impl WatcherConfig {
    /// Load from process environment (after `.env`)
    pub fn from_env() -> WatcherResult<Self> {
        Self::load(None)
    }

    /// Load from an explicit variable map instead of the process environment
    pub fn from_map(vars: HashMap<String, String>) -> WatcherResult<Self> {
        Self::load(Some(vars))
    }

    fn load(vars: Option<HashMap<String, String>>) -> WatcherResult<Self> {
        let environment = config::Environment::default()
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("terminal_abort_codes")
            .source(vars);

        let settings = config::Config::builder()
            .set_default("alarm_module", "alarm")?
            .set_default("created_event", "AlarmCreated")?
            .set_default("event_id_field", "alarm_id")?
            .set_default("settle_function", "fail_alarm")?
            .set_default("clock_object_id", "0x6")?
            .set_default("sui_rpc_url", DEFAULT_RPC_URL)?
            .set_default("check_interval_minutes", 5)?
            .set_default("grace_period_minutes", 60)?
            .set_default("max_gas_budget", 10_000_000)?
            .set_default("submission_pacing_ms", 1000)?
            .set_default("discovery_page_size", 50)?
            .set_default("discovery_max_pages", 20)?
            .set_default("fetch_concurrency", 8)?
            .set_default("rpc_requests_per_second", 20)?
            .set_default("rpc_timeout_secs", 30)?
            .set_default("submission_timeout_secs", 60)?
            .set_default("terminal_abort_codes", Vec::<i64>::new())?
            .set_default("settlement_failure_policy", "retry")?
            .set_default("failure_quarantine_after", 5)?
            .set_default("failure_backoff_max_sweeps", 12)?
            .add_source(environment)
            .build()?;

        let raw: RawSettings = settings.try_deserialize()?;
        Self::validate(raw)
    }

    fn validate(raw: RawSettings) -> WatcherResult<Self> {
        let signing_credential = non_empty(raw.bot_private_key)
            .map(Credential)
            .ok_or_else(|| {
                WatcherError::Config("BOT_PRIVATE_KEY environment variable is required".to_string())
            })?;

        let package_id = non_empty(raw.alarm_package_id).ok_or_else(|| {
            WatcherError::Config("ALARM_PACKAGE_ID environment variable is required".to_string())
        })?;

        if raw.check_interval_minutes == 0 {
            return Err(WatcherError::Config(
                "CHECK_INTERVAL_MINUTES must be at least 1".to_string(),
            ));
        }
        if raw.rpc_timeout_secs == 0 || raw.submission_timeout_secs == 0 {
            return Err(WatcherError::Config(
                "RPC_TIMEOUT_SECS and SUBMISSION_TIMEOUT_SECS must be positive".to_string(),
            ));
        }
        let sweep_interval = minutes("CHECK_INTERVAL_MINUTES", raw.check_interval_minutes)?;
        let grace_period = minutes("GRACE_PERIOD_MINUTES", raw.grace_period_minutes)?;
        if raw.max_gas_budget == 0 {
            return Err(WatcherError::Config("MAX_GAS_BUDGET must be positive".to_string()));
        }
        if raw.discovery_page_size == 0 || raw.discovery_max_pages == 0 {
            return Err(WatcherError::Config(
                "DISCOVERY_PAGE_SIZE and DISCOVERY_MAX_PAGES must be positive".to_string(),
            ));
        }
        if raw.fetch_concurrency == 0 || raw.rpc_requests_per_second == 0 {
            return Err(WatcherError::Config(
                "FETCH_CONCURRENCY and RPC_REQUESTS_PER_SECOND must be positive".to_string(),
            ));
        }

        let failure_policy = FailurePolicy::parse(
            &raw.settlement_failure_policy,
            raw.failure_quarantine_after,
            raw.failure_backoff_max_sweeps,
        )
        .ok_or_else(|| {
            WatcherError::Config(format!(
                "Unknown SETTLEMENT_FAILURE_POLICY: {} (expected retry, backoff or quarantine)",
                raw.settlement_failure_policy
            ))
        })?;

        Ok(Self {
            signing_credential,
            package_id,
            module: raw.alarm_module,
            created_event: raw.created_event,
            event_id_field: raw.event_id_field,
            settle_function: raw.settle_function,
            clock_object_id: raw.clock_object_id,
            rpc_url: raw.sui_rpc_url,
            sweep_interval,
            grace_period,
            max_gas_budget: raw.max_gas_budget,
            submission_pacing: Duration::from_millis(raw.submission_pacing_ms),
            discovery_page_size: raw.discovery_page_size,
            discovery_max_pages: raw.discovery_max_pages,
            discovery_cursor_path: non_empty(raw.discovery_cursor_path).map(PathBuf::from),
            fetch_concurrency: raw.fetch_concurrency,
            rpc_requests_per_second: raw.rpc_requests_per_second,
            rpc_timeout: Duration::from_secs(raw.rpc_timeout_secs),
            submission_timeout: Duration::from_secs(raw.submission_timeout_secs),
            terminal_abort_codes: raw.terminal_abort_codes,
            failure_policy,
            status_bind_address: non_empty(raw.status_bind_address),
        })
    }

    /// `<package>::<module>::<CreatedEvent>`
    pub fn created_event_type(&self) -> String {
        format!("{}::{}::{}", self.package_id, self.module, self.created_event)
    }

    /// `<package>::<module>::<settle function>`
    pub fn settle_target(&self) -> String {
        format!("{}::{}::{}", self.package_id, self.module, self.settle_function)
    }
}

fn minutes(key: &str, value: u64) -> WatcherResult<Duration> {
    value
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| WatcherError::Config(format!("{} is out of range: {}", key, value)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
impl WatcherConfig {
    /// Config with test-friendly timings
    pub fn for_tests() -> Self {
        Self {
            signing_credential: Credential(format!("0x{}", "07".repeat(32))),
            package_id: "0x2a".to_string(),
            module: "alarm".to_string(),
            created_event: "AlarmCreated".to_string(),
            event_id_field: "alarm_id".to_string(),
            settle_function: "fail_alarm".to_string(),
            clock_object_id: "0x6".to_string(),
            rpc_url: DEFAULT_RPC_URL.to_string(),
            sweep_interval: Duration::from_secs(300),
            grace_period: Duration::from_secs(3600),
            max_gas_budget: 10_000_000,
            submission_pacing: Duration::from_millis(1000),
            discovery_page_size: 2,
            discovery_max_pages: 20,
            discovery_cursor_path: None,
            fetch_concurrency: 4,
            rpc_requests_per_second: 1000,
            rpc_timeout: Duration::from_secs(5),
            submission_timeout: Duration::from_secs(10),
            terminal_abort_codes: vec![],
            failure_policy: FailurePolicy::Retry,
            status_bind_address: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_applied() {
        let config = WatcherConfig::from_map(vars(&[
            ("BOT_PRIVATE_KEY", "suiprivkey1qqexample"),
            ("ALARM_PACKAGE_ID", "0xabc"),
        ]))
        .unwrap();

        assert_eq!(config.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.grace_period, Duration::from_secs(3600));
        assert_eq!(config.max_gas_budget, 10_000_000);
        assert_eq!(config.submission_pacing, Duration::from_millis(1000));
        assert_eq!(config.failure_policy, FailurePolicy::Retry);
        assert!(config.terminal_abort_codes.is_empty());
        assert!(config.discovery_cursor_path.is_none());
        assert_eq!(config.created_event_type(), "0xabc::alarm::AlarmCreated");
        assert_eq!(config.settle_target(), "0xabc::alarm::fail_alarm");
    }

    #[test]
    fn test_overrides() {
        let config = WatcherConfig::from_map(vars(&[
            ("BOT_PRIVATE_KEY", "key"),
            ("ALARM_PACKAGE_ID", "0xabc"),
            ("CHECK_INTERVAL_MINUTES", "2"),
            ("GRACE_PERIOD_MINUTES", "15"),
            ("TERMINAL_ABORT_CODES", "2,3"),
            ("SETTLEMENT_FAILURE_POLICY", "quarantine"),
            ("FAILURE_QUARANTINE_AFTER", "4"),
            ("DISCOVERY_CURSOR_PATH", "/tmp/cursor.json"),
        ]))
        .unwrap();

        assert_eq!(config.sweep_interval, Duration::from_secs(120));
        assert_eq!(config.grace_period, Duration::from_secs(900));
        assert_eq!(config.terminal_abort_codes, vec![2, 3]);
        assert_eq!(config.failure_policy, FailurePolicy::Quarantine { after: 4 });
        assert_eq!(
            config.discovery_cursor_path,
            Some(PathBuf::from("/tmp/cursor.json"))
        );
    }

    #[test]
    fn test_missing_credential_is_fatal() {
        let result = WatcherConfig::from_map(vars(&[("ALARM_PACKAGE_ID", "0xabc")]));
        assert!(matches!(result, Err(WatcherError::Config(msg)) if msg.contains("BOT_PRIVATE_KEY")));

        let result = WatcherConfig::from_map(vars(&[("BOT_PRIVATE_KEY", "key")]));
        assert!(matches!(result, Err(WatcherError::Config(msg)) if msg.contains("ALARM_PACKAGE_ID")));
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let result = WatcherConfig::from_map(vars(&[
            ("BOT_PRIVATE_KEY", "key"),
            ("ALARM_PACKAGE_ID", "0xabc"),
            ("SETTLEMENT_FAILURE_POLICY", "escalate-to-pager"),
        ]));
        assert!(matches!(result, Err(WatcherError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        for key in ["RPC_TIMEOUT_SECS", "SUBMISSION_TIMEOUT_SECS"] {
            let result = WatcherConfig::from_map(vars(&[
                ("BOT_PRIVATE_KEY", "key"),
                ("ALARM_PACKAGE_ID", "0xabc"),
                (key, "0"),
            ]));
            assert!(matches!(result, Err(WatcherError::Config(msg)) if msg.contains(key)));
        }
    }

    #[test]
    fn test_rejects_overflowing_minutes() {
        // fits the parser's integer range but not in seconds
        let huge = "9000000000000000000";
        for key in ["CHECK_INTERVAL_MINUTES", "GRACE_PERIOD_MINUTES"] {
            let result = WatcherConfig::from_map(vars(&[
                ("BOT_PRIVATE_KEY", "key"),
                ("ALARM_PACKAGE_ID", "0xabc"),
                (key, huge),
            ]));
            assert!(matches!(result, Err(WatcherError::Config(msg)) if msg.contains(key)));
        }
    }

    #[test]
    fn test_credential_not_printed() {
        let config = WatcherConfig::from_map(vars(&[
            ("BOT_PRIVATE_KEY", "supersecret"),
            ("ALARM_PACKAGE_ID", "0xabc"),
        ]))
        .unwrap();
        assert!(!format!("{:?}", config).contains("supersecret"));
    }
}
