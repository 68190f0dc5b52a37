//! Rotation decision engine
//!
//! Pure functions over a profile's policy and observed state. Rules, in
//! order:
//!
//! 1. no active key or no recorded last rotation: rotate (initial generation)
//! 2. `interval == 0`: never rotate
//! 3. `now > last_rotation + interval`: rotate (overdue)
//! 4. otherwise: keep the current key

use chrono::{DateTime, Utc};
use keywarden_core::duration;
use keywarden_core::{RotationPolicy, RotationState};
use std::fmt;
use std::time::Duration;

/// Shortest requeue delay; an overdue rotation is retried after this.
pub const MIN_REQUEUE: Duration = Duration::from_secs(1);

/// Why a decision came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    /// No key has been generated for the profile yet
    InitialGeneration,
    /// Explicit rotation requested when the agent first sees the profile
    StartupTrigger,
    /// The rotation interval has elapsed
    Overdue { due: DateTime<Utc>, overdue_by: Duration },
    /// `interval == 0`
    Disabled,
    /// The current key is still within its interval
    NotDue { next: Option<DateTime<Utc>> },
}

impl fmt::Display for RotationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationReason::InitialGeneration => f.write_str("initial key generation"),
            RotationReason::StartupTrigger => f.write_str("startup trigger"),
            RotationReason::Overdue { due, overdue_by } => write!(
                f,
                "interval expired (due: {}, overdue by {})",
                due.to_rfc3339(),
                duration::format(*overdue_by)
            ),
            RotationReason::Disabled => f.write_str("rotation disabled (interval=0)"),
            RotationReason::NotDue { next: Some(next) } => {
                write!(f, "not due until {}", next.to_rfc3339())
            }
            RotationReason::NotDue { next: None } => f.write_str("not due"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub rotate: bool,
    pub reason: RotationReason,
}

impl Decision {
    fn rotate(reason: RotationReason) -> Self {
        Self { rotate: true, reason }
    }

    fn keep(reason: RotationReason) -> Self {
        Self { rotate: false, reason }
    }

    /// Forced rotation; an initial generation keeps its own reason.
    pub fn force(self) -> Self {
        if self.rotate {
            self
        } else {
            Self::rotate(RotationReason::StartupTrigger)
        }
    }
}

/// Decides whether the profile's key must be rotated at `now`.
pub fn decide(policy: &RotationPolicy, state: &RotationState, now: DateTime<Utc>) -> Decision {
    let last = match (state.active_key_id(), state.last_rotation) {
        (Some(_), Some(last)) => last,
        _ => return Decision::rotate(RotationReason::InitialGeneration),
    };

    if policy.interval.is_zero() {
        return Decision::keep(RotationReason::Disabled);
    }

    match next_rotation(last, policy.interval) {
        Some(due) if now > due => {
            let overdue_by = (now - due).to_std().unwrap_or_default();
            Decision::rotate(RotationReason::Overdue { due, overdue_by })
        }
        next => Decision::keep(RotationReason::NotDue { next }),
    }
}

/// `last + interval`, or `None` when rotation is disabled or the sum is
/// beyond the representable range (both mean "never").
pub fn next_rotation(last: DateTime<Utc>, interval: Duration) -> Option<DateTime<Utc>> {
    if interval.is_zero() {
        return None;
    }
    let interval = chrono::Duration::from_std(interval).ok()?;
    last.checked_add_signed(interval)
}

/// Delay until the next reconcile of a profile.
///
/// `None` when nothing is scheduled; a next rotation already in the past is
/// due immediately and yields [`MIN_REQUEUE`] rather than a negative wait.
pub fn requeue_after(next: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<Duration> {
    let next = next?;
    let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
    Some(wait.max(MIN_REQUEUE))
}
