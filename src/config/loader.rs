//! TOML configuration loading, env-var overrides, and atomic saves.
//!
//! # Loading order
//! 1. Parse `~/.gatehouse/config.toml` (or the path in `GATEHOUSE_CONFIG`)
//! 2. Apply `GATEWAY_*` environment variable overrides
//! 3. Fall back to [`EngineConfig::default()`] if the file is missing
//!
//! # Atomic save
//! Writes to `<path>.tmp`, backs up the existing file to `<path>.bak`, then
//! renames the temp file into place, mirroring the teacher's
//! `config::loader::save_config`.

use std::{
    env,
    fs,
    path::{Path, PathBuf},
};

use super::schema::EngineConfig;

/// Default config path: `~/.gatehouse/config.toml`.
pub fn default_config_path() -> Result<PathBuf, String> {
    dirs::home_dir()
        .map(|h| h.join(".gatehouse").join("config.toml"))
        .ok_or_else(|| "could not determine home directory".to_string())
}

/// Load [`EngineConfig`] from `path`, falling back to defaults if missing,
/// then applying environment variable overrides.
pub fn load_config(path: &Path) -> Result<EngineConfig, String> {
    let mut config = match fs::read_to_string(path) {
        Ok(content) => toml::from_str::<EngineConfig>(&content)
            .map_err(|e| format!("failed to parse config at {path:?}: {e}"))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => EngineConfig::default(),
        Err(e) => return Err(format!("failed to read config at {path:?}: {e}")),
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load config from the default path (or `GATEHOUSE_CONFIG`), defaulting on
/// any error.
pub fn load_default_config() -> EngineConfig {
    let path = env::var("GATEHOUSE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_config_path().unwrap_or_else(|_| PathBuf::from("config.toml")));

    load_config(&path).unwrap_or_default()
}

/// Apply `GATEWAY_*` environment variable overrides to `config`.
///
/// Supported overrides:
/// - `GATEWAY_STATE_DIR`           → `store.state_dir`
/// - `GATEWAY_TICK_FLOOR_MS`       → `scheduler.tick_floor_ms`
/// - `GATEWAY_LEASE_TTL_MS`        → `scheduler.lease_ttl_ms`
/// - `GATEWAY_CLAIM_BATCH`         → `scheduler.claim_batch`
/// - `GATEWAY_KILLED`              → `scheduler.killed` (1/0/true/false)
/// - `GATEWAY_GLOBAL_PARALLELISM`  → `dispatcher.global_parallelism`
/// - `GATEWAY_LANE_QUEUE_CAP`      → `dispatcher.lane_queue_cap`
/// - `GATEWAY_HEARTBEAT_INTERVAL`  → `heartbeat.interval_secs`
/// - `GATEWAY_HEARTBEAT_ENABLED`   → `heartbeat.enabled` (1/0/true/false)
/// - `GATEWAY_BIND_ADDR`           → `gateway.bind_addr`
/// - `GATEWAY_AUTH_TOKEN`          → `gateway.auth_token`
fn apply_env_overrides(config: &mut EngineConfig) {
    if let Ok(v) = env::var("GATEWAY_STATE_DIR") {
        config.store.state_dir = v;
    }
    if let Ok(v) = env::var("GATEWAY_TICK_FLOOR_MS") {
        if let Ok(n) = v.parse() {
            config.scheduler.tick_floor_ms = n;
        }
    }
    if let Ok(v) = env::var("GATEWAY_LEASE_TTL_MS") {
        if let Ok(n) = v.parse() {
            config.scheduler.lease_ttl_ms = n;
        }
    }
    if let Ok(v) = env::var("GATEWAY_CLAIM_BATCH") {
        if let Ok(n) = v.parse() {
            config.scheduler.claim_batch = n;
        }
    }
    if let Ok(v) = env::var("GATEWAY_KILLED") {
        config.scheduler.killed = is_truthy(&v);
    }
    if let Ok(v) = env::var("GATEWAY_GLOBAL_PARALLELISM") {
        if let Ok(n) = v.parse() {
            config.dispatcher.global_parallelism = n;
        }
    }
    if let Ok(v) = env::var("GATEWAY_LANE_QUEUE_CAP") {
        if let Ok(n) = v.parse() {
            config.dispatcher.lane_queue_cap = n;
        }
    }
    if let Ok(v) = env::var("GATEWAY_HEARTBEAT_INTERVAL") {
        if let Ok(n) = v.parse() {
            config.heartbeat.interval_secs = n;
        }
    }
    if let Ok(v) = env::var("GATEWAY_HEARTBEAT_ENABLED") {
        config.heartbeat.enabled = is_truthy(&v);
    }
    if let Ok(v) = env::var("GATEWAY_BIND_ADDR") {
        config.gateway.bind_addr = v;
    }
    if let Ok(v) = env::var("GATEWAY_AUTH_TOKEN") {
        config.gateway.auth_token = v;
    }
}

fn is_truthy(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true")
}

/// Atomically save `config` to `path`: write `<path>.tmp`, back up any
/// existing file to `<path>.bak`, then rename the temp file into place.
pub fn save_config(path: &Path, config: &EngineConfig) -> Result<(), String> {
    let content =
        toml::to_string_pretty(config).map_err(|e| format!("failed to serialise config: {e}"))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("failed to create config dir: {e}"))?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, &content).map_err(|e| format!("failed to write temp config: {e}"))?;

    if path.exists() {
        let bak_path = path.with_extension("toml.bak");
        fs::copy(path, &bak_path).map_err(|e| format!("failed to backup config: {e}"))?;
    }

    fs::rename(&tmp_path, path).map_err(|e| format!("failed to replace config file: {e}"))?;
    Ok(())
}
