//! TOML configuration schema.
//!
//! All fields carry `#[serde(default)]` so a partially-filled `config.toml`
//! still loads correctly; missing sections fall back to `Default`.
//!
//! Example `~/.gatehouse/config.toml`:
//! ```toml
//! [store]
//! state_dir = "/home/user/.gatehouse/state"
//! max_run_history_per_job = 200
//!
//! [scheduler]
//! tick_floor_ms = 5000
//! lease_ttl_ms = 60000
//! claim_batch = 10
//! killed = false
//!
//! [dispatcher]
//! global_parallelism = 1
//! lane_queue_cap = 16
//!
//! [heartbeat]
//! interval_secs = 1800
//! enabled = true
//! ```

use serde::{Deserialize, Serialize};

// ─── StoreConfig ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory for the job catalog and run-history log.
    pub state_dir: String,
    /// Run-history entries retained per job before pruning.
    pub max_run_history_per_job: usize,
    /// Minimum allowed `every_ms` for `Schedule::Every` jobs.
    pub min_interval_ms: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_dir: "~/.gatehouse/state".to_owned(),
            max_run_history_per_job: 200,
            min_interval_ms: 1_000,
        }
    }
}

// ─── SchedulerConfig ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Sleep ceiling between ticks when nothing wakes the loop early.
    pub tick_floor_ms: i64,
    /// Lease duration granted to a claimed-but-not-yet-advanced job.
    pub lease_ttl_ms: i64,
    /// Max jobs claimed per tick.
    pub claim_batch: usize,
    /// Global kill-switch: when true, the Scheduler stops claiming work.
    pub killed: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_floor_ms: 5_000,
            lease_ttl_ms: 60_000,
            claim_batch: 10,
            killed: false,
        }
    }
}

// ─── DispatcherConfig ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Global concurrent-run cap across all lanes.
    pub global_parallelism: usize,
    /// Bounded queue capacity per lane before `LaneQueueFull`.
    pub lane_queue_cap: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            global_parallelism: 1,
            lane_queue_cap: 16,
        }
    }
}

// ─── HeartbeatConfig ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_secs: u64,
    pub enabled: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: crate::heartbeat::DEFAULT_HEARTBEAT_INTERVAL_SECS,
            enabled: true,
        }
    }
}

// ─── GatewayConfig ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the HTTP/WebSocket API binds to.
    pub bind_addr: String,
    /// Bearer token required on every request. Empty disables auth (local only).
    pub auth_token: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_owned(),
            auth_token: String::new(),
        }
    }
}

// ─── EngineConfig ─────────────────────────────────────────────────────────────

/// Top-level configuration, loaded from `~/.gatehouse/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub scheduler: SchedulerConfig,
    pub dispatcher: DispatcherConfig,
    pub heartbeat: HeartbeatConfig,
    pub gateway: GatewayConfig,
}
