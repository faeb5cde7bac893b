//! superhooks entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse options** with `clap` and validate them into a
//!    [`config::ListenerConfig`] before the first `READY` is written.
//! 2. **Wire observability**: `tracing-subscriber` on stderr, text or JSON.
//!    Every span and event emitted by the workspace crates flows through it.
//! 3. **Construct infrastructure**: a [`webhook::WebhookNotifier`] for the
//!    configured URL, injected into a [`listener::Listener`] bound to
//!    stdin/stdout.
//! 4. **Map the outcome to an exit status**: 0 when the supervisor closes
//!    stdin, 1 for a configuration or protocol error.

mod config;
mod telemetry;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::{Args, ConfigError, ListenerConfig, SUPERVISOR_ENV_MARKER};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(parse_failure_status(&err));
        }
    };

    if let Err(err) = telemetry::init(&args.log_level, args.log_format) {
        eprintln!("superhooks: {err:#}");
        return ExitCode::FAILURE;
    }

    let marker = std::env::var(SUPERVISOR_ENV_MARKER).ok();
    let config = match ListenerConfig::from_args(&args, marker.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let run_id = Uuid::new_v4();
    match run(config).instrument(info_span!("listener", %run_id)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let chain = format!("{err:#}");
            error!(error = %chain, "listener stopped");
            ExitCode::FAILURE
        }
    }
}

/// Exit status for a failed `clap` parse.
///
/// `--help` and `--version` are reported through clap's error path and exit
/// 0; every real usage error exits 1.
fn parse_failure_status(err: &clap::Error) -> u8 {
    if err.use_stderr() {
        1
    } else {
        0
    }
}

async fn run(config: ListenerConfig) -> anyhow::Result<()> {
    let notifier = webhook::WebhookNotifier::new(
        &config.webhook_url,
        config.format,
        config.delivery_timeout,
    )
    .map_err(ConfigError::from)?;

    info!(
        host = notifier.host(),
        format = %config.format,
        events = %config.subscription,
        "starting event listener"
    );

    let input = BufReader::new(tokio::io::stdin());
    let output = tokio::io::stdout();
    let mut listener = listener::Listener::new(input, output, notifier, config.listener_options());

    let stats = listener
        .run()
        .await
        .context("supervisor event protocol failed")?;

    info!(
        events_read = stats.events_read,
        buffered = stats.buffered,
        filtered = stats.filtered,
        dropped = stats.dropped,
        batches_delivered = stats.batches_delivered,
        batches_failed = stats.batches_failed,
        "stdin closed; exiting"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(argv: &[&str]) -> u8 {
        let err = Args::try_parse_from(argv).unwrap_err();
        parse_failure_status(&err)
    }

    #[test]
    fn usage_errors_exit_with_status_one() {
        assert_eq!(status(&["superhooks"]), 1);
        assert_eq!(status(&["superhooks", "-e", "EXITED"]), 1);
        assert_eq!(status(&["superhooks", "-f", "/tmp/hook"]), 1);
        assert_eq!(
            status(&["superhooks", "-f", "/tmp/hook", "-e", "EXITED", "--bogus"]),
            1
        );
        assert_eq!(
            status(&["superhooks", "-f", "/tmp/hook", "-e", "EXITED", "--timeout", "soon"]),
            1
        );
    }

    #[test]
    fn help_and_version_exit_with_status_zero() {
        assert_eq!(status(&["superhooks", "--help"]), 0);
        assert_eq!(status(&["superhooks", "--version"]), 0);
    }
}
