//! The delivery port.
//!
//! The listener core hands every flushed batch to a [`Notifier`]. How the
//! batch is rendered and where it goes (Discord, a generic JSON webhook, a
//! test double) is the implementor's business.

use async_trait::async_trait;

use crate::{DeliveryError, EventRecord};

/// Formats and delivers one flushed batch.
///
/// Called at most once per flush with a non-empty batch in arrival order.
/// Implementations report failure through [`DeliveryError`] and must not
/// panic; the caller logs the error and carries on.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers `batch`.
    async fn notify(&self, batch: &[EventRecord]) -> Result<(), DeliveryError>;
}

#[async_trait]
impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    async fn notify(&self, batch: &[EventRecord]) -> Result<(), DeliveryError> {
        (**self).notify(batch).await
    }
}

#[async_trait]
impl<N: Notifier + ?Sized> Notifier for Box<N> {
    async fn notify(&self, batch: &[EventRecord]) -> Result<(), DeliveryError> {
        (**self).notify(batch).await
    }
}
