//! Error and retry-policy types for the superhooks domain.
//!
//! Errors here are the *recoverable* half of the taxonomy: a
//! [`MalformedEvent`] drops a single event and a [`DeliveryError`] fails a
//! single flush, but neither ever stops the listener loop. The fatal kinds
//! (protocol desync, bad configuration) live next to the code that produces
//! them in the `listener` and `cli` crates.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether a delivery failure is safe to retry and, if so, after what delay.
///
/// The listener core never retries on its own; the policy is surfaced in
/// logs so an operator (or a retrying [`crate::Notifier`] wrapper) can act
/// on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means the caller
        /// applies its own schedule.
        after: Option<Duration>,
    },
    /// Retrying would fail the same way.
    NonRetryable,
}

impl RetryPolicy {
    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, RetryPolicy::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Event parsing
// ---------------------------------------------------------------------------

/// A single event payload could not be turned into an [`crate::EventRecord`].
///
/// Always recoverable: the event is logged, dropped and acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedEvent {
    /// A key the record needs is absent from the payload headers.
    #[error("payload is missing required key '{key}'")]
    MissingKey {
        /// The absent key (`processname`, `groupname`, `from_state`).
        key: &'static str,
    },

    /// A required key is present but its value is empty.
    #[error("payload key '{key}' has an empty value")]
    EmptyValue {
        /// The key whose value was empty.
        key: &'static str,
    },

    /// A payload token is not of the form `key:value`.
    #[error("payload token '{token}' is not a key:value pair")]
    InvalidToken {
        /// The offending token.
        token: String,
    },

    /// A state-valued key (such as `from_state`) holds a name outside the
    /// vocabulary.
    #[error("payload key '{key}' has unknown state '{value}'")]
    InvalidState {
        /// The key holding the state.
        key: &'static str,
        /// The unrecognised value.
        value: String,
    },

    /// The envelope's event name is outside the process-state vocabulary.
    #[error("event name '{name}' is not a known process state event")]
    UnknownEvent {
        /// The event name as received.
        name: String,
    },

    /// The payload bytes are not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    NotUtf8,
}

// ---------------------------------------------------------------------------
// Subscription configuration
// ---------------------------------------------------------------------------

/// The comma-separated event list given at startup could not be validated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// The list contained no event names at all.
    #[error("no events given; expected a comma separated list of process states")]
    Empty,

    /// A name in the list is outside the vocabulary.
    #[error("unknown event '{name}'; expected any of STARTING, RUNNING, BACKOFF, STOPPING, FATAL, EXITED, STOPPED, UNKNOWN")]
    UnknownEvent {
        /// The rejected name, as written by the operator.
        name: String,
    },
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// A flush could not be delivered to the downstream endpoint.
///
/// Produced by [`crate::Notifier`] implementations and by the listener when
/// a notifier does not return within the delivery timeout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The endpoint answered with a non-2xx status.
    #[error("endpoint returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The request never produced a response (DNS, connect, TLS, reset).
    #[error("transport failure: {message}")]
    Transport {
        /// Description of the underlying failure.
        message: String,
    },

    /// The notifier did not finish within the allotted time.
    #[error("delivery timed out after {after:?}")]
    Timeout {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The batch could not be rendered into a request body.
    #[error("could not encode notification body: {message}")]
    Encode {
        /// Description of the encoding failure.
        message: String,
    },
}

impl DeliveryError {
    /// Classifies this failure for retry decisions.
    ///
    /// Server errors, `429 Too Many Requests`, transport failures and
    /// timeouts are transient; client errors and encoding failures are not.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            DeliveryError::Status { status } if *status == 429 || *status >= 500 => {
                RetryPolicy::Retryable { after: None }
            }
            DeliveryError::Status { .. } | DeliveryError::Encode { .. } => {
                RetryPolicy::NonRetryable
            }
            DeliveryError::Transport { .. } | DeliveryError::Timeout { .. } => {
                RetryPolicy::Retryable { after: None }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_rate_limits_are_retryable() {
        assert!(DeliveryError::Status { status: 503 }.retry_policy().is_retryable());
        assert!(DeliveryError::Status { status: 429 }.retry_policy().is_retryable());
        assert!(DeliveryError::Timeout {
            after: Duration::from_secs(1)
        }
        .retry_policy()
        .is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        assert_eq!(
            DeliveryError::Status { status: 404 }.retry_policy(),
            RetryPolicy::NonRetryable
        );
        assert_eq!(
            DeliveryError::Encode {
                message: "bad".into()
            }
            .retry_policy(),
            RetryPolicy::NonRetryable
        );
    }
}
