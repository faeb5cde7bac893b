//! Core domain for superhooks.
//!
//! This crate contains every domain concept the listener works with: the
//! process-state vocabulary, the parsed [`EventRecord`], the subscription
//! filter, the batch buffer and the [`Notifier`] port. The `listener` crate
//! drives these from the supervisor protocol; the `webhook` crate implements
//! [`Notifier`].
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | `ProcessName`, `GroupName` newtypes |
//! | [`types`] | `ProcessState`, `HeaderMap`, `Timestamp`, `EventRecord` |
//! | [`filter`] | `Subscription` and the interest predicate |
//! | [`batch`] | `BatchBuffer` |
//! | [`notify`] | `Notifier` trait |
//! | [`errors`] | Recoverable error kinds and `RetryPolicy` |

pub mod batch;
pub mod errors;
pub mod filter;
pub mod identifiers;
pub mod notify;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use batch::{BatchBuffer, BufferFull, DEFAULT_BATCH_CAPACITY};
pub use errors::{DeliveryError, MalformedEvent, RetryPolicy, SubscriptionError};
pub use filter::{is_interesting, Subscription};
pub use identifiers::{GroupName, ProcessName};
pub use notify::Notifier;
pub use types::{
    parse_event_record, EventRecord, HeaderMap, ProcessState, Timestamp, PROCESS_STATE_PREFIX,
};
