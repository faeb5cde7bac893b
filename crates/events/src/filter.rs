//! Interest filter: which process-state events the listener forwards.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::{ProcessState, SubscriptionError};

/// The set of process states an operator subscribed to.
///
/// Built once at startup and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    states: BTreeSet<ProcessState>,
}

impl Subscription {
    /// Creates a subscription from an explicit set of states.
    ///
    /// Returns `None` if `states` is empty.
    pub fn new(states: impl IntoIterator<Item = ProcessState>) -> Option<Self> {
        let states: BTreeSet<_> = states.into_iter().collect();
        if states.is_empty() {
            None
        } else {
            Some(Self { states })
        }
    }

    /// Parses a comma-separated list such as `"EXITED, fatal"`.
    ///
    /// Names are trimmed and case-normalised; blank items (from doubled or
    /// trailing commas) are skipped. Every remaining name must belong to the
    /// vocabulary.
    pub fn parse(list: &str) -> Result<Self, SubscriptionError> {
        let mut states = BTreeSet::new();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let state = ProcessState::from_name(item).ok_or_else(|| {
                SubscriptionError::UnknownEvent {
                    name: item.to_string(),
                }
            })?;
            states.insert(state);
        }
        Self::new(states).ok_or(SubscriptionError::Empty)
    }

    /// Returns `true` if `state` is subscribed.
    pub fn contains(&self, state: ProcessState) -> bool {
        self.states.contains(&state)
    }

    /// Iterates over subscribed states in vocabulary order.
    pub fn states(&self) -> impl Iterator<Item = ProcessState> + '_ {
        self.states.iter().copied()
    }
}

impl std::fmt::Display for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.states().map(ProcessState::as_str).collect();
        f.write_str(&names.join(","))
    }
}

/// Returns `true` if `event_name` names a subscribed process state.
///
/// Matching is case-insensitive and ignores the `PROCESS_STATE_` prefix.
/// Names outside the vocabulary are never interesting.
pub fn is_interesting(event_name: &str, subscription: &Subscription) -> bool {
    ProcessState::from_name(event_name).is_some_and(|state| subscription.contains(state))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(list: &str) -> Subscription {
        Subscription::parse(list).unwrap()
    }

    #[test]
    fn parse_normalises_case_and_whitespace() {
        let s = sub(" exited ,Fatal,,");
        assert!(s.contains(ProcessState::Exited));
        assert!(s.contains(ProcessState::Fatal));
        assert_eq!(s.to_string(), "FATAL,EXITED");
    }

    #[test]
    fn parse_rejects_unknown_names() {
        assert_eq!(
            Subscription::parse("EXITED,CRASHED").unwrap_err(),
            SubscriptionError::UnknownEvent {
                name: "CRASHED".to_string()
            }
        );
    }

    #[test]
    fn parse_rejects_empty_list() {
        assert_eq!(Subscription::parse(" , ").unwrap_err(), SubscriptionError::Empty);
    }

    #[test]
    fn matching_strips_prefix_and_ignores_case() {
        let s = sub("EXITED,FATAL");
        assert!(is_interesting("PROCESS_STATE_EXITED", &s));
        assert!(is_interesting("process_state_fatal", &s));
        assert!(is_interesting("Exited", &s));
        assert!(!is_interesting("PROCESS_STATE_RUNNING", &s));
    }

    #[test]
    fn unknown_names_are_never_interesting() {
        let all = Subscription::new(ProcessState::ALL).unwrap();
        for name in ["TICK_60", "PROCESS_STATE_CRASHED", "PROCESS_STATE", "", "SUPERVISOR_STATE_CHANGE_RUNNING"] {
            assert!(!is_interesting(name, &all), "{name} should not match");
        }
    }
}
