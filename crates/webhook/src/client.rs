//! `reqwest`-backed [`Notifier`].

use std::time::Duration;

use async_trait::async_trait;
use events::{DeliveryError, EventRecord, Notifier};
use reqwest::{Client, Url};
use thiserror::Error;
use serde_json::Value;
use tracing::{debug, info};

use crate::body::{render, PayloadFormat};

/// The notifier could not be constructed.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The configured target is not an absolute URL.
    #[error("invalid webhook URL: {reason}")]
    InvalidUrl {
        /// Parser diagnostic. The URL itself is omitted since webhook URLs
        /// embed their access token.
        reason: String,
    },

    /// The URL scheme is neither `http` nor `https`.
    #[error("webhook URL must use http or https, not '{scheme}'")]
    UnsupportedScheme {
        /// The rejected scheme.
        scheme: String,
    },

    /// The HTTP client could not be built (TLS backend initialisation).
    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Posts rendered batches to a single webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: Url,
    format: PayloadFormat,
    timeout: Duration,
}

impl WebhookNotifier {
    /// Builds a notifier for `url`. `timeout` bounds each individual POST.
    pub fn new(url: &str, format: PayloadFormat, timeout: Duration) -> Result<Self, WebhookError> {
        let url = Url::parse(url.trim()).map_err(|e| WebhookError::InvalidUrl {
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(WebhookError::UnsupportedScheme {
                scheme: url.scheme().to_string(),
            });
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("superhooks/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(WebhookError::Client)?;
        Ok(Self {
            client,
            url,
            format,
            timeout,
        })
    }

    /// Host part of the target URL; safe to log.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    async fn post(&self, body: &Value) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status {
                status: status.as_u16(),
            });
        }
        debug!(status = status.as_u16(), host = self.host(), "webhook accepted POST");
        Ok(())
    }

    fn transport_error(&self, err: reqwest::Error) -> DeliveryError {
        if err.is_timeout() {
            DeliveryError::Timeout {
                after: self.timeout,
            }
        } else {
            // Strip the URL: it carries the webhook token.
            DeliveryError::Transport {
                message: err.without_url().to_string(),
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    /// Posts every rendered body in order, stopping at the first failure.
    async fn notify(&self, batch: &[EventRecord]) -> Result<(), DeliveryError> {
        let bodies = render(self.format, batch).map_err(|e| DeliveryError::Encode {
            message: e.to_string(),
        })?;
        let requests = bodies.len();
        for body in &bodies {
            self.post(body).await?;
        }
        info!(
            host = self.host(),
            records = batch.len(),
            requests,
            "posted to webhook"
        );
        Ok(())
    }
}
