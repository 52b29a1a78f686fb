use std::fmt;

use serde::{Deserialize, Serialize};

use crate::wallet::Decimal3;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Every configuration option the engine recognizes. The engine never
/// reads this from a file itself — loading/reloading config is an ambient
/// concern left to the caller (consistent with `Store`/`Clock` being
/// injected rather than owned).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub policy: PolicyCacheConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub fees: FeesConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub event_bus: EventBusConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyCacheConfig {
    /// TTL in seconds. 0 disables caching (used in tests).
    #[serde(default = "d_10")]
    pub cache_ttl_secs: u64,
}

impl Default for PolicyCacheConfig {
    fn default() -> Self {
        Self { cache_ttl_secs: d_10() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "d_60")]
    pub window_minutes: i64,
    #[serde(default = "d_50")]
    pub max_entries: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_minutes: d_60(),
            max_entries: d_50(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Soft cooperative-cancellation budget for chain analysis (ms).
    #[serde(default = "d_100")]
    pub soft_cap_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self { soft_cap_ms: d_100() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeesConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "d_initial_balance")]
    pub wallet_initial_balance: Decimal3,
}

impl Default for FeesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            wallet_initial_balance: d_initial_balance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// `block` decisions in the trailing window that trigger an auto-kill.
    #[serde(default = "d_3")]
    pub block_threshold: u32,
    /// Trailing window size the thresholds are evaluated over.
    #[serde(default = "d_10")]
    pub window: usize,
    /// Average risk over the window that triggers an auto-kill.
    #[serde(default = "d_82")]
    pub risk_threshold: u8,
    #[serde(default = "d_3600")]
    pub expiry_secs: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            block_threshold: d_3(),
            window: d_10(),
            risk_threshold: d_82(),
            expiry_secs: d_3600(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    #[serde(default = "d_64")]
    pub subscriber_buffer_size: usize,
    #[serde(default = "d_15")]
    pub heartbeat_interval_secs: u64,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer_size: d_64(),
            heartbeat_interval_secs: d_15(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    #[serde(default = "d_10240")]
    pub diff_size_limit_bytes: usize,
    #[serde(default = "d_500")]
    pub drift_baseline_depth: usize,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            diff_size_limit_bytes: d_10240(),
            drift_baseline_depth: d_500(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_10() -> u64 {
    10
}
fn d_60() -> i64 {
    60
}
fn d_50() -> usize {
    50
}
fn d_100() -> u64 {
    100
}
fn d_3() -> u32 {
    3
}
fn d_82() -> u8 {
    82
}
fn d_3600() -> u64 {
    3600
}
fn d_64() -> usize {
    64
}
fn d_15() -> u64 {
    15
}
fn d_10240() -> usize {
    10 * 1024
}
fn d_500() -> usize {
    500
}
fn d_initial_balance() -> Decimal3 {
    Decimal3::from_millis(100_000)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl EngineConfig {
    /// Validate the configuration and return a list of issues. An empty
    /// vec means everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.escalation.block_threshold as usize > self.escalation.window {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "escalation.block_threshold".into(),
                message: "block_threshold cannot exceed escalation.window".into(),
            });
        }

        if self.escalation.window == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "escalation.window".into(),
                message: "window must be greater than 0".into(),
            });
        }

        if self.event_bus.subscriber_buffer_size == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "event_bus.subscriber_buffer_size".into(),
                message: "subscriber_buffer_size must be greater than 0".into(),
            });
        }

        if self.session.max_entries == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "session.max_entries".into(),
                message: "max_entries is 0 — session history will always be empty".into(),
            });
        }

        if self.session.window_minutes <= 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "session.window_minutes".into(),
                message: "window_minutes must be greater than 0".into(),
            });
        }

        if self.verification.diff_size_limit_bytes == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "verification.diff_size_limit_bytes".into(),
                message: "diff_size_limit_bytes is 0 — every diff-size check will fail".into(),
            });
        }

        errors
    }
}
