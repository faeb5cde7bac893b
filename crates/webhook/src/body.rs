//! Request bodies for the supported webhook flavours.

use std::str::FromStr;

use events::EventRecord;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Discord rejects messages with more than ten embeds.
pub const DISCORD_MAX_EMBEDS: usize = 10;

/// The JSON shape posted to the endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Discord webhook: one embed per record, chunked by
    /// [`DISCORD_MAX_EMBEDS`].
    #[default]
    Discord,
    /// Plain JSON object with a title, a description and the full records.
    Generic,
}

/// The name given for a payload format is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown payload format '{0}'; expected 'discord' or 'generic'")]
pub struct UnknownFormat(pub String);

impl FromStr for PayloadFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discord" => Ok(PayloadFormat::Discord),
            "generic" => Ok(PayloadFormat::Generic),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

impl std::fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PayloadFormat::Discord => "discord",
            PayloadFormat::Generic => "generic",
        })
    }
}

// ---------------------------------------------------------------------------
// Shapes
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct DiscordMessage {
    embeds: Vec<DiscordEmbed>,
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    timestamp: String,
}

#[derive(Serialize)]
struct GenericMessage<'a> {
    title: String,
    description: String,
    events: &'a [EventRecord],
}

/// Notification title for one record: the process name.
pub fn title(record: &EventRecord) -> String {
    record.process_name().to_string()
}

/// Notification description for one record: event type and prior state.
pub fn description(record: &EventRecord) -> String {
    format!(
        "Event Type: {}\nFrom: {}",
        record.event_name(),
        record.from_state()
    )
}

/// Renders `batch` into one or more JSON request bodies, in order.
///
/// An empty batch renders to no bodies.
pub fn render(format: PayloadFormat, batch: &[EventRecord]) -> serde_json::Result<Vec<Value>> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }
    match format {
        PayloadFormat::Discord => batch
            .chunks(DISCORD_MAX_EMBEDS)
            .map(|chunk| {
                let embeds = chunk
                    .iter()
                    .map(|record| DiscordEmbed {
                        title: title(record),
                        description: description(record),
                        timestamp: record.received_at().to_string(),
                    })
                    .collect();
                serde_json::to_value(DiscordMessage { embeds })
            })
            .collect(),
        PayloadFormat::Generic => {
            let (heading, summary) = match batch {
                [record] => (title(record), description(record)),
                _ => (
                    format!("{} process state events", batch.len()),
                    batch
                        .iter()
                        .map(|r| format!("{}: {}", r.process_name(), description(r)))
                        .collect::<Vec<_>>()
                        .join("\n"),
                ),
            };
            let body = serde_json::to_value(GenericMessage {
                title: heading,
                description: summary,
                events: batch,
            })?;
            Ok(vec![body])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::{parse_event_record, Timestamp};

    fn record(process: &str, event: &str) -> EventRecord {
        let payload = format!("processname:{process} groupname:grp from_state:RUNNING pid:7");
        parse_event_record(event, payload.as_bytes(), Timestamp::now()).unwrap()
    }

    #[test]
    fn format_names_parse_case_insensitively() {
        assert_eq!("Discord".parse::<PayloadFormat>(), Ok(PayloadFormat::Discord));
        assert_eq!("generic".parse::<PayloadFormat>(), Ok(PayloadFormat::Generic));
        assert!("slack".parse::<PayloadFormat>().is_err());
    }

    #[test]
    fn discord_body_has_one_embed_per_record() {
        let batch = [record("worker1", "PROCESS_STATE_EXITED")];
        let bodies = render(PayloadFormat::Discord, &batch).unwrap();
        assert_eq!(bodies.len(), 1);

        let embed = &bodies[0]["embeds"][0];
        assert_eq!(embed["title"], "worker1");
        assert_eq!(
            embed["description"],
            "Event Type: PROCESS_STATE_EXITED\nFrom: RUNNING"
        );
        assert!(embed["timestamp"].as_str().is_some());
    }

    #[test]
    fn discord_bodies_are_chunked_at_ten_embeds() {
        let batch: Vec<_> = (0..23)
            .map(|i| record(&format!("w{i}"), "PROCESS_STATE_FATAL"))
            .collect();
        let bodies = render(PayloadFormat::Discord, &batch).unwrap();
        let sizes: Vec<_> = bodies
            .iter()
            .map(|b| b["embeds"].as_array().unwrap().len())
            .collect();
        assert_eq!(sizes, [10, 10, 3]);

        assert_eq!(bodies[2]["embeds"][2]["title"], "w22");
    }

    #[test]
    fn generic_body_carries_full_records() {
        let batch = [
            record("a", "PROCESS_STATE_EXITED"),
            record("b", "PROCESS_STATE_BACKOFF"),
        ];
        let bodies = render(PayloadFormat::Generic, &batch).unwrap();
        assert_eq!(bodies.len(), 1);

        let json = &bodies[0];
        assert_eq!(json["title"], "2 process state events");
        assert_eq!(json["events"].as_array().unwrap().len(), 2);
        assert_eq!(json["events"][1]["event"], "BACKOFF");
        assert!(json["description"]
            .as_str()
            .unwrap()
            .contains("a: Event Type: PROCESS_STATE_EXITED"));
    }

    #[test]
    fn generic_single_record_uses_process_name_as_title() {
        let batch = [record("solo", "PROCESS_STATE_STOPPED")];
        let json = render(PayloadFormat::Generic, &batch).unwrap().remove(0);
        assert_eq!(json["title"], "solo");
        assert_eq!(json["description"], "Event Type: PROCESS_STATE_STOPPED\nFrom: RUNNING");
    }

    #[test]
    fn empty_batch_renders_nothing() {
        assert!(render(PayloadFormat::Discord, &[]).unwrap().is_empty());
        assert!(render(PayloadFormat::Generic, &[]).unwrap().is_empty());
    }
}
