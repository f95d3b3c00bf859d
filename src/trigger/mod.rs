//! Stateless computation of "when is this job next due".
//!
//! Nothing here reads the clock or touches storage — callers pass in `now`
//! and the job's recorded `last_due` explicitly, which is what makes
//! `next_due` reproducible across process restarts (§8, determinism
//! invariant).

pub mod cron;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::model::Schedule;

#[derive(Debug, Clone, Error)]
pub enum CronParseError {
    #[error("invalid cron expression `{0}`: {1}")]
    InvalidExpression(String, String),
    #[error("invalid timezone `{0}`")]
    InvalidTimezone(String),
    #[error("cron expression `{0}` has no upcoming occurrence")]
    NoUpcomingOccurrence(String),
}

/// Result of evaluating a schedule: either a concrete next instant, or
/// `Done` for a one-shot schedule that has already fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Due {
    At(DateTime<Utc>),
    Done,
}

/// Compute the next due instant for `schedule`.
///
/// `created_at` anchors `Every`'s first occurrence; `last_due` is the
/// instant most recently claimed for this job (`None` if it has never
/// fired); `now` is the current reference instant from the Clock.
pub fn next_due(
    schedule: &Schedule,
    created_at: DateTime<Utc>,
    last_due: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Due, CronParseError> {
    match schedule {
        Schedule::At { at_ms } => match last_due {
            None => Ok(Due::At(ms_to_dt(*at_ms))),
            Some(_) => Ok(Due::Done),
        },
        Schedule::Every { every_ms } => Ok(Due::At(next_every(*every_ms, created_at, last_due, now))),
        Schedule::Cron { expr, tz } => {
            let after = last_due.unwrap_or(created_at).max(now);
            let next = cron::next_after(expr, tz.as_deref(), after)?;
            Ok(Due::At(next))
        }
    }
}

fn ms_to_dt(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// `Every` recurrence with single-catch-up-then-resync semantics (§4.3).
fn next_every(
    every_ms: i64,
    created_at: DateTime<Utc>,
    last_due: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let every = Duration::milliseconds(every_ms);
    match last_due {
        None => created_at + every,
        Some(last) => {
            let naive_next = last + every;
            if naive_next <= now {
                let elapsed_ms = (now - created_at).num_milliseconds().max(0);
                let periods = elapsed_ms / every_ms;
                created_at + Duration::milliseconds(periods * every_ms) + every
            } else {
                naive_next
            }
        }
    }
}
