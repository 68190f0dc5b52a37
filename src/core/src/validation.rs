//! Policy checks shared by the admission validator and the agent
//!
//! Key-spec rules live in `keywarden-crypto` next to the generator so that
//! admission and generation can never disagree; this module only covers the
//! profile-level invariants.

use crate::error::{CoreError, Result};
use std::time::Duration;

/// Minimum grace period (NIST SP 800-57 overlap window).
pub const MIN_GRACE_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Minimum ratio of rotation interval to grace period.
pub const MIN_INTERVAL_TO_GRACE_RATIO: u32 = 3;

/// The service account must live in the profile's own namespace, which
/// prevents a profile from requesting keys for another namespace.
pub fn validate_namespace_match(profile_namespace: &str, service_account_namespace: &str) -> Result<()> {
    if profile_namespace != service_account_namespace {
        return Err(CoreError::NamespaceMismatch {
            profile: profile_namespace.to_string(),
            service_account: service_account_namespace.to_string(),
        });
    }
    Ok(())
}

/// Rules:
///   - `grace_period >= MIN_GRACE_PERIOD`
///   - `interval >= MIN_INTERVAL_TO_GRACE_RATIO * grace_period`
pub fn validate_rotation_policy(interval: Duration, grace_period: Duration) -> Result<()> {
    if grace_period < MIN_GRACE_PERIOD {
        return Err(CoreError::GracePeriodTooShort {
            grace_period,
            minimum: MIN_GRACE_PERIOD,
        });
    }

    let minimum = grace_period
        .checked_mul(MIN_INTERVAL_TO_GRACE_RATIO)
        .ok_or_else(|| CoreError::invalid("gracePeriod overflows"))?;
    if interval < minimum {
        return Err(CoreError::IntervalTooShort {
            interval,
            grace_period,
            ratio: MIN_INTERVAL_TO_GRACE_RATIO,
            minimum,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);
    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_namespace_match() {
        assert!(validate_namespace_match("default", "default").is_ok());
        assert!(matches!(
            validate_namespace_match("default", "kube-system"),
            Err(CoreError::NamespaceMismatch { .. })
        ));
    }

    #[test]
    fn test_rotation_policy_valid() {
        assert!(validate_rotation_policy(24 * HOUR, HOUR).is_ok());
        assert!(validate_rotation_policy(15 * MINUTE, 5 * MINUTE).is_ok());
    }

    #[test]
    fn test_grace_period_too_short() {
        let err = validate_rotation_policy(24 * HOUR, 4 * MINUTE).unwrap_err();
        assert!(matches!(err, CoreError::GracePeriodTooShort { .. }));
    }

    #[test]
    fn test_interval_too_short() {
        let err = validate_rotation_policy(2 * HOUR, HOUR).unwrap_err();
        match err {
            CoreError::IntervalTooShort { minimum, ratio, .. } => {
                assert_eq!(minimum, 3 * HOUR);
                assert_eq!(ratio, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_zero_interval_rejected_at_admission() {
        // interval=0 disables rotation in the engine but never passes admission
        assert!(validate_rotation_policy(Duration::ZERO, 5 * MINUTE).is_err());
    }
}
