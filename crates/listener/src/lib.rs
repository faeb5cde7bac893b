//! superhooks event-listener engine.
//!
//! Speaks the supervisor's event-listener protocol over a pair of byte
//! streams (stdin/stdout in production, in-memory buffers in tests):
//!
//! - [`codec`] frames the wire protocol: [`EventReader`] pulls
//!   [`EventEnvelope`]s, [`EventWriter`] emits `READY` and `RESULT` frames.
//! - [`machine`] drives the READY / event / RESULT cycle, feeds the
//!   interest filter and batch buffer from the `events` crate, and hands
//!   flushed batches to an [`events::Notifier`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Framing and the control loop live here. The domain
//! rules (what a record is, what is interesting) live in `events`; delivery
//! lives behind the `Notifier` trait.
//!
//! ## Error Boundary
//!
//! Only [`ProtocolError`] escapes [`Listener::run`]. Malformed payloads and
//! delivery failures are contained inside a cycle.

pub mod codec;
pub mod machine;

pub use codec::{
    encode_result, EventEnvelope, EventReader, EventWriter, ProtocolError, MAX_PAYLOAD_LEN,
    READY_FRAME, RESULT_OK,
};
pub use machine::{
    Disposition, FlushPolicy, Listener, ListenerOptions, ListenerState, ListenerStats, TickEvent,
    DEFAULT_DELIVERY_TIMEOUT,
};
