//! IANA timezone resolution shared by [`crate::clock`] and [`crate::trigger`].

use chrono_tz::Tz;

use crate::trigger::CronParseError;

/// Resolve an IANA timezone name, defaulting to host local time when `None`.
///
/// Falls back to UTC if the host's local zone can't be determined — callers
/// that care about exact local-zone behaviour should pass an explicit `tz`.
pub fn resolve_tz(tz: Option<&str>) -> Result<Tz, CronParseError> {
    match tz {
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| CronParseError::InvalidTimezone(name.to_string())),
        None => Ok(local_tz()),
    }
}

fn local_tz() -> Tz {
    iana_time_zone::get_timezone()
        .ok()
        .and_then(|name| name.parse::<Tz>().ok())
        .unwrap_or(chrono_tz::UTC)
}
