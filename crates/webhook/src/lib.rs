//! superhooks webhook notifier.
//!
//! Implements [`events::Notifier`] by rendering each flushed batch into a
//! JSON body and POSTing it to a single configured URL.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, body formatting and status mapping
//! live here. The listener core sees only [`events::Notifier`] and
//! [`events::DeliveryError`].
//!
//! ## Formats
//!
//! | Format | Body | Requests per flush |
//! |--------|------|--------------------|
//! | `discord` | `{"embeds":[{title, description, timestamp}, ...]}` | one per 10 records |
//! | `generic` | `{"title", "description", "events":[...]}` | one |

pub mod body;
pub mod client;

pub use body::{render, PayloadFormat, UnknownFormat, DISCORD_MAX_EMBEDS};
pub use client::{WebhookError, WebhookNotifier};
