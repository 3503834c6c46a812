use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lowest margin the auto-tuner may settle on, in percent.
pub const MIN_MARGIN_PCT: Decimal = Decimal::from_parts(5, 0, 0, false, 0);
/// Highest margin the auto-tuner may settle on, in percent.
pub const MAX_MARGIN_PCT: Decimal = Decimal::from_parts(30, 0, 0, false, 0);

/// Clamp a margin percentage into `[MIN_MARGIN_PCT, MAX_MARGIN_PCT]`.
pub fn clamp_margin(margin_pct: Decimal) -> Decimal {
    margin_pct.clamp(MIN_MARGIN_PCT, MAX_MARGIN_PCT)
}

/// Top-level configuration for the dispatcher engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FreightdeskConfig {
    #[serde(default)]
    pub cost: CostSettings,
    #[serde(default)]
    pub levels: LevelFlags,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Operating costs of the carrier, used by the cost calculator.
///
/// `margin_pct` is the only field the engine mutates itself (through the
/// auto-tuner); everything else comes from user settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CostSettings {
    /// EUR per kilometre (fuel, tolls, wear).
    pub cost_per_km: Decimal,
    /// EUR per driving hour.
    pub cost_per_hour: Decimal,
    pub average_speed_kmh: Decimal,
    pub insurance_fee: Decimal,
    pub road_fee: Decimal,
    /// Markup over total cost, in percent. Always within `[5, 30]`.
    pub margin_pct: Decimal,
}

impl Default for CostSettings {
    fn default() -> Self {
        Self {
            cost_per_km: Decimal::new(12, 1),
            cost_per_hour: Decimal::from(25),
            average_speed_kmh: Decimal::from(80),
            insurance_fee: Decimal::from(50),
            road_fee: Decimal::from(30),
            margin_pct: Decimal::from(15),
        }
    }
}

impl CostSettings {
    /// Same settings with `margin_pct` pulled into the allowed band.
    pub fn normalized(mut self) -> Self {
        self.margin_pct = clamp_margin(self.margin_pct);
        self
    }
}

/// Pipeline stages of the dispatcher engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Offer intake.
    L0,
    /// Cost and profit calculator.
    L1,
    /// Quote suggestions.
    L2,
    /// Margin auto-tuning.
    L3,
    /// Counter-offer negotiation.
    L4,
}

/// Per-level enable switches. Supplied by user settings and re-read on every pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LevelFlags {
    pub l0: bool,
    pub l1: bool,
    pub l2: bool,
    pub l3: bool,
    pub l4: bool,
}

impl Default for LevelFlags {
    fn default() -> Self {
        Self {
            l0: true,
            l1: true,
            l2: true,
            l3: true,
            l4: true,
        }
    }
}

impl LevelFlags {
    pub fn is_enabled(&self, level: Level) -> bool {
        match level {
            Level::L0 => self.l0,
            Level::L1 => self.l1,
            Level::L2 => self.l2,
            Level::L3 => self.l3,
            Level::L4 => self.l4,
        }
    }

    pub fn set(&mut self, level: Level, enabled: bool) {
        match level {
            Level::L0 => self.l0 = enabled,
            Level::L1 => self.l1 = enabled,
            Level::L2 => self.l2 = enabled,
            Level::L3 => self.l3 = enabled,
            Level::L4 => self.l4 = enabled,
        }
    }
}

/// Behaviour of the suggestion, learning and negotiation levels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Dispatch auto-send eligible quotes without human confirmation.
    pub auto_send: bool,
    /// Confidence must be strictly above this for auto-send.
    pub auto_send_confidence: Decimal,
    /// Running acceptance rate must be strictly above this for auto-send.
    pub auto_send_acceptance_rate: Decimal,
    /// Counter-offer rounds before the negotiator hands over to a human.
    pub max_counters: u32,
    /// Number of suggestions kept in the rolling buffer.
    pub suggestion_buffer_size: usize,
    /// Age in seconds after which a suggestion is swept.
    pub suggestion_ttl_seconds: u64,
    pub metrics_interval_seconds: u64,
    pub sweep_interval_seconds: u64,
    /// Added to learning progress on every resolved agent quote.
    pub learning_increment: Decimal,
    /// Margin adjustment (percentage points) per resolved agent quote.
    pub margin_step: Decimal,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            auto_send: false,
            auto_send_confidence: Decimal::new(8, 1),
            auto_send_acceptance_rate: Decimal::new(6, 1),
            max_counters: 3,
            suggestion_buffer_size: 20,
            suggestion_ttl_seconds: 2 * 60 * 60,
            metrics_interval_seconds: 60,
            sweep_interval_seconds: 30 * 60,
            learning_increment: Decimal::new(1, 2),
            margin_step: Decimal::new(5, 1),
        }
    }
}

/// Pacing and resilience of quote submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Minimum seconds between two quotes for the same cargo.
    pub rate_limit_window_seconds: u64,
    /// Retries after the initial failed submission.
    pub max_retries: u32,
    /// Backoff base; attempt `n` waits `base * 2^n`.
    pub retry_base_delay_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            rate_limit_window_seconds: 30,
            max_retries: 3,
            retry_base_delay_ms: 1000,
        }
    }
}

/// Local adapters used by the command-line front end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file holding the local quote ledger.
    pub sqlite_path: String,
    pub distance_cache_capacity: u64,
    pub distance_cache_ttl_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "data/freightdesk.db".to_string(),
            distance_cache_capacity: 10_000,
            distance_cache_ttl_seconds: 24 * 60 * 60,
        }
    }
}
