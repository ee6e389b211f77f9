use serde::{Deserialize, Serialize};

/// The value that terminates a reply stream.
pub const DONE_SENTINEL: &str = "[DONE]";

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ChatTurnRequest<'a> {
    pub message: &'a str,
}

// ------------------------------
// Types received from the server
// ------------------------------

/// Payload of a single frame in the reply stream.
///
/// The sentinel may arrive either bare (`data: [DONE]`) or as a JSON
/// string (`data: "[DONE]"`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
enum FramePayload {
    Text(String),
    Delta { content: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Frame {
    Content(String),
    Done,
}

#[derive(Debug, PartialEq, Eq)]
pub enum FrameError {
    InvalidJson(String),
    UnexpectedShape(String),
}

pub fn parse_frame(data: &str) -> Result<Frame, FrameError> {
    if data.trim() == DONE_SENTINEL {
        return Ok(Frame::Done);
    }

    let payload = serde_json::from_str::<FramePayload>(data).map_err(|err| {
        if err.is_data() {
            FrameError::UnexpectedShape(data.to_owned())
        } else {
            FrameError::InvalidJson(format!("{err}"))
        }
    })?;
    match payload {
        FramePayload::Delta { content } => Ok(Frame::Content(content)),
        FramePayload::Text(text) if text == DONE_SENTINEL => Ok(Frame::Done),
        FramePayload::Text(_) => {
            Err(FrameError::UnexpectedShape(data.to_owned()))
        }
    }
}
