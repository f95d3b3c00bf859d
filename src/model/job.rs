use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::payload::Payload;
use super::schedule::Schedule;
use super::{new_job_id, JobId};
use crate::store::JobStoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionTarget {
    Main,
    Isolated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WakeMode {
    Now,
    NextHeartbeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostToMainMode {
    Summary,
    Full,
}

/// Options controlling how an isolated job's result is posted back to the
/// main session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Isolation {
    #[serde(default = "Isolation::default_prefix")]
    pub post_to_main_prefix: String,
    #[serde(default = "Isolation::default_mode")]
    pub post_to_main_mode: PostToMainMode,
    #[serde(default = "Isolation::default_max_chars")]
    pub post_to_main_max_chars: usize,
}

impl Isolation {
    fn default_prefix() -> String {
        "Cron".to_string()
    }
    fn default_mode() -> PostToMainMode {
        PostToMainMode::Summary
    }
    fn default_max_chars() -> usize {
        8000
    }
}

impl Default for Isolation {
    fn default() -> Self {
        Self {
            post_to_main_prefix: Self::default_prefix(),
            post_to_main_mode: Self::default_mode(),
            post_to_main_max_chars: Self::default_max_chars(),
        }
    }
}

/// A unit of scheduled work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Job {
    pub job_id: JobId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub schedule: Schedule,
    pub session_target: SessionTarget,
    #[serde(default = "Job::default_wake_mode")]
    pub wake_mode: WakeMode,
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation: Option<Isolation>,
    #[serde(default = "Job::default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub delete_after_run: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Scheduler-owned bookkeeping, persisted alongside the job so a
    /// restart resumes deterministically. Not part of the public patch
    /// surface — callers never set these directly.
    #[serde(default)]
    pub next_due_ms: Option<i64>,
    #[serde(default)]
    pub last_due_ms: Option<i64>,
    #[serde(default)]
    pub claimed_until_ms: Option<i64>,
}

impl Job {
    fn default_wake_mode() -> WakeMode {
        WakeMode::Now
    }
    fn default_enabled() -> bool {
        true
    }

    /// Construct and validate a new job, enforcing the `session_target ×
    /// payload` and `isolation` invariants from §3 at construction time
    /// rather than scattering the checks across call sites (§9).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_id: Option<JobId>,
        name: String,
        description: Option<String>,
        agent_id: Option<String>,
        schedule: Schedule,
        session_target: SessionTarget,
        wake_mode: WakeMode,
        payload: Payload,
        isolation: Option<Isolation>,
        enabled: bool,
        delete_after_run: bool,
        now: DateTime<Utc>,
    ) -> Result<Self, JobStoreError> {
        validate_target_payload(session_target, &payload)?;
        if isolation.is_some() && session_target != SessionTarget::Isolated {
            return Err(JobStoreError::ConflictingTargetAndPayload(
                "isolation options are only valid for session_target=isolated".to_string(),
            ));
        }

        Ok(Self {
            job_id: job_id.unwrap_or_else(new_job_id),
            name,
            description,
            agent_id,
            schedule,
            session_target,
            wake_mode,
            payload,
            isolation,
            enabled,
            delete_after_run,
            created_at: now,
            updated_at: now,
            next_due_ms: None,
            last_due_ms: None,
            claimed_until_ms: None,
        })
    }

    pub fn is_claimed(&self, at_ms: i64) -> bool {
        matches!(self.claimed_until_ms, Some(until) if until > at_ms)
    }
}

/// Validate that `session_target` and `payload.kind()` agree, per §3
/// invariant (1).
pub fn validate_target_payload(
    target: SessionTarget,
    payload: &Payload,
) -> Result<(), JobStoreError> {
    match (target, payload) {
        (SessionTarget::Main, Payload::SystemEvent { text }) => {
            if text.is_empty() {
                return Err(JobStoreError::InvalidPayload(
                    "payload.text must be non-empty for a systemEvent payload".to_string(),
                ));
            }
            Ok(())
        }
        (SessionTarget::Isolated, Payload::AgentTurn { .. }) => Ok(()),
        _ => Err(JobStoreError::ConflictingTargetAndPayload(format!(
            "session_target={target:?} is incompatible with payload.kind={}",
            payload.kind()
        ))),
    }
}

/// Partial update applied to an existing job. Every field is optional;
/// absent fields are left unchanged. `agent_id` uses a double-option so a
/// caller can distinguish "don't touch" from "clear to null" (§4.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct JobPatch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub agent_id: Option<Option<String>>,
    pub schedule: Option<Schedule>,
    pub session_target: Option<SessionTarget>,
    pub wake_mode: Option<WakeMode>,
    pub payload: Option<Payload>,
    #[serde(default, deserialize_with = "double_option")]
    pub isolation: Option<Option<Isolation>>,
    pub enabled: Option<bool>,
    pub delete_after_run: Option<bool>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

impl Job {
    /// Apply `patch`, re-validating invariants, then bump `updated_at`.
    pub fn apply_patch(
        &mut self,
        patch: JobPatch,
        now: DateTime<Utc>,
    ) -> Result<(), JobStoreError> {
        let mut next = self.clone();
        if let Some(v) = patch.name {
            next.name = v;
        }
        if let Some(v) = patch.description {
            next.description = v;
        }
        if let Some(v) = patch.agent_id {
            next.agent_id = v;
        }
        if let Some(v) = patch.schedule {
            next.schedule = v;
            // A schedule replacement restarts the due-date computation.
            next.next_due_ms = None;
            next.last_due_ms = None;
        }
        if let Some(v) = patch.session_target {
            next.session_target = v;
        }
        if let Some(v) = patch.wake_mode {
            next.wake_mode = v;
        }
        if let Some(v) = patch.payload {
            next.payload = v;
        }
        if let Some(v) = patch.isolation {
            next.isolation = v;
        }
        if let Some(v) = patch.enabled {
            next.enabled = v;
        }
        if let Some(v) = patch.delete_after_run {
            next.delete_after_run = v;
        }

        validate_target_payload(next.session_target, &next.payload)?;
        if next.isolation.is_some() && next.session_target != SessionTarget::Isolated {
            return Err(JobStoreError::ConflictingTargetAndPayload(
                "isolation options are only valid for session_target=isolated".to_string(),
            ));
        }

        next.updated_at = now;
        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn main_target_requires_system_event() {
        let err = Job::new(
            None,
            "x".into(),
            None,
            None,
            Schedule::At { at_ms: 0 },
            SessionTarget::Main,
            WakeMode::Now,
            Payload::AgentTurn {
                message: "m".into(),
                model: None,
                thinking: None,
                timeout_s: None,
                deliver: None,
                channel: None,
                to: None,
                best_effort_deliver: false,
            },
            None,
            true,
            false,
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, JobStoreError::ConflictingTargetAndPayload(_)));
    }

    #[test]
    fn system_event_rejects_empty_text() {
        let err = Job::new(
            None,
            "x".into(),
            None,
            None,
            Schedule::At { at_ms: 0 },
            SessionTarget::Main,
            WakeMode::Now,
            Payload::SystemEvent { text: String::new() },
            None,
            true,
            false,
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, JobStoreError::InvalidPayload(_)));
    }

    #[test]
    fn isolation_requires_isolated_target() {
        let err = Job::new(
            None,
            "x".into(),
            None,
            None,
            Schedule::At { at_ms: 0 },
            SessionTarget::Main,
            WakeMode::Now,
            Payload::SystemEvent { text: "t".into() },
            Some(Isolation::default()),
            true,
            false,
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, JobStoreError::ConflictingTargetAndPayload(_)));
    }

    #[test]
    fn patch_clears_agent_id_on_explicit_null() {
        let mut job = Job::new(
            None,
            "x".into(),
            None,
            Some("a1".into()),
            Schedule::At { at_ms: 0 },
            SessionTarget::Main,
            WakeMode::Now,
            Payload::SystemEvent { text: "t".into() },
            None,
            true,
            false,
            now(),
        )
        .unwrap();

        let patch = JobPatch {
            agent_id: Some(None),
            ..Default::default()
        };
        job.apply_patch(patch, now()).unwrap();
        assert_eq!(job.agent_id, None);
    }
}
