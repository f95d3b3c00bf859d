//! 5-field cron expression evaluation with IANA timezone support.
//!
//! Grounded in `scheduler::tokio_scheduler::compute_next_run`, which pads a
//! 5-field expression to the `cron` crate's native 6-field (with seconds)
//! form by prepending `"0 "`. Timezone handling is new: the upstream
//! scheduler only ever evaluated cron expressions in naive local time.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;

use super::CronParseError;
use crate::tz::resolve_tz;

/// Earliest instant strictly after `after` matching `expr` (5-field,
/// standard `*,-/ ` syntax plus `SUN..SAT` day-of-week aliases), evaluated
/// in `tz` or host local time if `tz` is `None`.
pub fn next_after(
    expr: &str,
    tz: Option<&str>,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>, CronParseError> {
    let schedule = parse(expr)?;
    let zone = resolve_tz(tz)?;
    let after_in_zone = after.with_timezone(&zone);
    schedule
        .after(&after_in_zone)
        .next()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| CronParseError::NoUpcomingOccurrence(expr.to_string()))
}

/// Validate `expr` without resolving a concrete occurrence. Used by the
/// Job Store at ingest to reject malformed schedules eagerly.
pub fn validate(expr: &str) -> Result<(), CronParseError> {
    parse(expr).map(|_| ())
}

fn parse(expr: &str) -> Result<CronSchedule, CronParseError> {
    let padded = pad_to_six_fields(expr)?;
    CronSchedule::from_str(&padded)
        .map_err(|e| CronParseError::InvalidExpression(expr.to_string(), e.to_string()))
}

fn pad_to_six_fields(expr: &str) -> Result<String, CronParseError> {
    let fields = expr.split_whitespace().count();
    match fields {
        5 => Ok(format!("0 {expr}")),
        6 => Ok(expr.to_string()),
        n => Err(CronParseError::InvalidExpression(
            expr.to_string(),
            format!("expected a 5-field cron expression, got {n} fields"),
        )),
    }
}
