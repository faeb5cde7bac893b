//! Command-line options and the validated startup configuration.
//!
//! [`Args`] is what the operator typed; [`ListenerConfig`] is what the
//! listener runs with. The conversion happens once, before the first
//! `READY` is written, and every failure is a [`ConfigError`] that ends the
//! process with exit status 1.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use events::{Subscription, SubscriptionError, DEFAULT_BATCH_CAPACITY};
use listener::{FlushPolicy, ListenerOptions, TickEvent};
use thiserror::Error;
use webhook::{PayloadFormat, WebhookError};

/// Environment variable the supervisor sets for every child it spawns.
pub const SUPERVISOR_ENV_MARKER: &str = "SUPERVISOR_SERVER_URL";

/// Supervisor event listener that posts process state changes to a webhook.
///
/// Subscribe it to PROCESS_STATE events (and a TICK_* event when batching)
/// in an [eventlistener:x] section of the supervisor configuration.
#[derive(Debug, Parser)]
#[command(name = "superhooks", version)]
pub struct Args {
    /// File which contains the webhook URL.
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    pub file: PathBuf,

    /// Supervisor event(s): any of STARTING, RUNNING, BACKOFF, STOPPING,
    /// FATAL, EXITED, STOPPED, UNKNOWN as comma separated values.
    #[arg(short = 'e', long = "events", value_name = "EVENTS")]
    pub events: String,

    /// Webhook body format: discord or generic.
    #[arg(long, value_name = "FORMAT", default_value_t = PayloadFormat::Discord)]
    pub format: PayloadFormat,

    /// Batch notifications and flush on this tick event (TICK_5, TICK_60,
    /// TICK_3600) instead of after every event.
    #[arg(long, value_name = "TICK")]
    pub batch_tick: Option<String>,

    /// Minutes of ticks to accumulate before a batch is flushed.
    #[arg(long, value_name = "MINUTES", default_value_t = 1.0)]
    pub batch_interval: f64,

    /// Maximum number of events held between flushes.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_BATCH_CAPACITY)]
    pub max_batch: usize,

    /// Seconds a webhook delivery may take before it is abandoned.
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub timeout: u64,

    /// Log filter used when RUST_LOG is unset (e.g. info, debug).
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log line format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// How log lines are written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// A startup check failed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("must run as a supervisor event listener ({SUPERVISOR_ENV_MARKER} is not set)")]
    NotUnderSupervisor,

    #[error("webhook file at {} does not exist", path.display())]
    WebhookFileMissing { path: PathBuf },

    #[error("could not read webhook file at {}: {source}", path.display())]
    WebhookFileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("webhook file at {} is empty", path.display())]
    EmptyWebhookFile { path: PathBuf },

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error("invalid --batch-tick '{value}'; expected TICK_5, TICK_60 or TICK_3600")]
    InvalidTick { value: String },

    #[error("--batch-interval must be a positive number of minutes, got {value}")]
    InvalidInterval { value: f64 },

    #[error("--timeout must be at least one second")]
    InvalidTimeout,

    #[error(transparent)]
    Webhook(#[from] WebhookError),
}

/// Immutable configuration the listener runs with.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Webhook target, trimmed. Treat as a secret.
    pub webhook_url: String,
    pub subscription: Subscription,
    pub format: PayloadFormat,
    pub flush_policy: FlushPolicy,
    pub max_batch: usize,
    pub delivery_timeout: Duration,
}

impl ListenerConfig {
    /// Validates `args`.
    ///
    /// `supervisor_marker` is the value of [`SUPERVISOR_ENV_MARKER`]; it is
    /// passed in rather than read here so tests do not touch the process
    /// environment.
    pub fn from_args(args: &Args, supervisor_marker: Option<&str>) -> Result<Self, ConfigError> {
        if supervisor_marker.map_or(true, |v| v.trim().is_empty()) {
            return Err(ConfigError::NotUnderSupervisor);
        }

        let webhook_url = read_webhook_file(&args.file)?;
        let subscription = Subscription::parse(&args.events)?;
        let flush_policy = flush_policy(args.batch_tick.as_deref(), args.batch_interval)?;
        if args.timeout == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(Self {
            webhook_url,
            subscription,
            format: args.format,
            flush_policy,
            max_batch: args.max_batch.max(1),
            delivery_timeout: Duration::from_secs(args.timeout),
        })
    }

    /// Options for [`listener::Listener::new`].
    pub fn listener_options(&self) -> ListenerOptions {
        ListenerOptions {
            subscription: self.subscription.clone(),
            flush_policy: self.flush_policy,
            max_batch: self.max_batch,
            delivery_timeout: self.delivery_timeout,
        }
    }
}

/// Reads the webhook URL from `path`, trimming surrounding whitespace.
fn read_webhook_file(path: &Path) -> Result<String, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::WebhookFileMissing {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::WebhookFileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let url = content.trim();
    if url.is_empty() {
        return Err(ConfigError::EmptyWebhookFile {
            path: path.to_path_buf(),
        });
    }
    Ok(url.to_string())
}

fn flush_policy(batch_tick: Option<&str>, interval_minutes: f64) -> Result<FlushPolicy, ConfigError> {
    let Some(raw) = batch_tick else {
        return Ok(FlushPolicy::EveryEvent);
    };
    let tick = TickEvent::from_name(raw).ok_or_else(|| ConfigError::InvalidTick {
        value: raw.to_string(),
    })?;
    if !(interval_minutes.is_finite() && interval_minutes > 0.0) {
        return Err(ConfigError::InvalidInterval {
            value: interval_minutes,
        });
    }
    Ok(FlushPolicy::Tick {
        tick,
        interval_minutes,
    })
}
