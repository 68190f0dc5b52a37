//! Error types shared by the profile model and admission helpers

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while parsing or validating profile data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A duration string could not be parsed
    #[error("invalid duration {input:?}: {reason}")]
    InvalidDuration { input: String, reason: String },

    /// The service account lives in a different namespace than the profile
    #[error("serviceAccountRef.namespace {service_account:?} must match KeyProfile namespace {profile:?}")]
    NamespaceMismatch {
        profile: String,
        service_account: String,
    },

    /// Grace period shorter than the allowed minimum
    #[error("gracePeriod {}s is below minimum {}s", .grace_period.as_secs(), .minimum.as_secs())]
    GracePeriodTooShort {
        grace_period: Duration,
        minimum: Duration,
    },

    /// Interval too short relative to the grace period
    #[error(
        "interval {}s must be at least {ratio}x gracePeriod ({}s), minimum: {}s",
        .interval.as_secs(), .grace_period.as_secs(), .minimum.as_secs()
    )]
    IntervalTooShort {
        interval: Duration,
        grace_period: Duration,
        ratio: u32,
        minimum: Duration,
    },

    /// Generic invalid input
    #[error("Invalid: {0}")]
    Invalid(String),
}

impl CoreError {
    /// Create an invalid error
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        CoreError::Invalid(msg.into())
    }

    pub(crate) fn duration<I: Into<String>, R: Into<String>>(input: I, reason: R) -> Self {
        CoreError::InvalidDuration {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::NamespaceMismatch {
            profile: "team-a".to_string(),
            service_account: "team-b".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "serviceAccountRef.namespace \"team-b\" must match KeyProfile namespace \"team-a\""
        );

        let err = CoreError::invalid("bad");
        assert_eq!(err.to_string(), "Invalid: bad");
    }
}
