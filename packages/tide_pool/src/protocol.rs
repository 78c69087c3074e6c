use serde::{Deserialize, Serialize};

/// Control messages carried on text frames, distinguished from raw terminal
/// input by the `type` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Viewport size change from the client's terminal emulator
    Resize { cols: u16, rows: u16 },
}

/// Classification of an inbound text frame
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound<'a> {
    /// A recognized control message
    Control(ControlMessage),
    /// Raw terminal input, to be written to the session verbatim
    Data(&'a str),
}

/// Classify a text frame as either a control message or raw input.
///
/// Anything that fails to parse as a known control message - malformed JSON,
/// an unknown `type`, missing fields - is raw terminal input. A terminal
/// stream legitimately contains bytes that look like arbitrary text, so
/// nothing is ever rejected here.
pub fn classify(text: &str) -> Inbound<'_> {
    match serde_json::from_str::<ControlMessage>(text) {
        Ok(msg) => Inbound::Control(msg),
        Err(_) => Inbound::Data(text),
    }
}
