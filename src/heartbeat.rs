//! Heartbeat checklist parsing and error-backoff scheduling.
//!
//! The heartbeat is the periodic main-session turn the GLOSSARY describes:
//! outside the job catalog, driven by configuration, with `wake_mode =
//! next-heartbeat` jobs feeding it events to consume. Grounded on
//! `scheduler::heartbeat`'s checklist parser and back-off table.

/// Parse checklist items out of a `HEARTBEAT.md`-style document.
///
/// Lines starting with `- [ ]` or `- [x]`/`- [X]` are extracted as action
/// items; the checkbox prefix is stripped. Completed items are included so
/// the agent can re-verify they still hold.
pub fn parse_heartbeat_items(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("- [ ]") {
                Some(rest.trim().to_owned())
            } else if let Some(rest) = trimmed.strip_prefix("- [x]") {
                Some(rest.trim().to_owned())
            } else {
                trimmed.strip_prefix("- [X]").map(|rest| rest.trim().to_owned())
            }
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Default heartbeat interval in seconds (30 minutes).
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30 * 60;

/// Back-off levels in seconds: 30s → 60s → 300s → 900s → 3600s.
pub const ERROR_BACKOFF_SECS: &[u64] = &[30, 60, 300, 900, 3_600];

/// Back-off delay for `error_count` consecutive heartbeat failures.
///
/// Beyond `ERROR_BACKOFF_SECS.len()` failures, the maximum back-off holds.
pub fn backoff_secs(error_count: u32) -> u64 {
    let idx = (error_count as usize).min(ERROR_BACKOFF_SECS.len() - 1);
    ERROR_BACKOFF_SECS[idx]
}
