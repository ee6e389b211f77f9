use serde::{Deserialize, Serialize};

/// The events in a preset reply.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    /// A text fragment.
    #[serde(rename = "fragment")]
    Fragment(String),
    /// The transport breaks.
    #[serde(rename = "network_error")]
    NetworkError,
    /// A corrupted frame arrives.
    #[serde(rename = "malformed_frame")]
    MalformedFrame,
}

/// The preset reply for one chat turn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetReply {
    /// Events in this reply.
    pub events: Vec<PresetEvent>,
    /// If set, the handshake of this turn fails and no event is played.
    #[serde(default)]
    pub rejected: bool,
}

impl PresetReply {
    /// Creates a `PresetReply` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            rejected: false,
        }
    }

    /// Creates a `PresetReply` that streams the given fragments.
    #[inline]
    pub fn with_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_events(
            fragments
                .into_iter()
                .map(|f| PresetEvent::Fragment(f.into()))
                .collect::<Vec<_>>(),
        )
    }

    /// Creates a `PresetReply` whose handshake fails.
    #[inline]
    pub fn rejected() -> Self {
        Self {
            events: vec![],
            rejected: true,
        }
    }
}
