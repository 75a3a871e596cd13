use serde::{Deserialize, Serialize};

/// One frame from the real-time feed. Most frame types carry neither field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
}

impl InboundEvent {
    pub fn message(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), channel: Some(channel.into()) }
    }
}

/// Text addressed to the bot, with the mention stripped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutedMessage {
    pub text: String,
    pub channel: String,
}

/// Returns the first event in `events` that mentions `marker` and names a
/// non-empty channel. Later matches in the same batch are dropped.
pub fn parse_events(events: &[InboundEvent], marker: &str) -> Option<RoutedMessage> {
    if marker.is_empty() {
        return None;
    }

    events.iter().find_map(|event| match (&event.text, &event.channel) {
        (Some(text), Some(channel)) if !channel.is_empty() && text.contains(marker) => {
            Some(RoutedMessage {
                text: text_after_marker(text, marker).to_owned(),
                channel: channel.clone(),
            })
        }
        _ => None,
    })
}

/// The segment between the first mention and the next one (or the end).
fn text_after_marker<'a>(text: &'a str, marker: &str) -> &'a str {
    let segment = text.split(marker).nth(1).unwrap_or_default();
    segment.trim()
}
