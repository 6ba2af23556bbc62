//! Socket Mode envelopes.
//!
//! Every frame Slack sends over the Socket Mode WebSocket is an envelope
//! that must be acknowledged by id. Slash command envelopes carry the
//! command payload directly in `payload`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::commands::SlashCommandPayload;
use crate::error::{SlackError, SlackResult};

/// Socket Mode envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketModeEnvelope {
    /// Envelope ID for acknowledgment (absent on `hello`).
    #[serde(default)]
    pub envelope_id: Option<String>,
    /// Type of payload.
    #[serde(rename = "type")]
    pub envelope_type: String,
    /// Actual payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Disconnect reason, on `disconnect` envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Socket Mode acknowledgment response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketModeAck {
    /// Envelope ID being acknowledged.
    pub envelope_id: String,
}

impl SocketModeAck {
    /// Create a simple acknowledgment.
    pub fn new(envelope_id: impl Into<String>) -> Self {
        Self {
            envelope_id: envelope_id.into(),
        }
    }
}

/// What an envelope asks the bot to do.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// Connection established.
    Hello,
    /// Slack will close this connection; reconnect.
    Disconnect {
        /// Reason given by Slack (e.g. `refresh_requested`).
        reason: Option<String>,
    },
    /// A slash command invocation.
    SlashCommand(Box<SlashCommandPayload>),
    /// Anything else (events API, interactivity), acknowledged and ignored.
    Ignored(String),
}

impl SocketModeEnvelope {
    /// Parse a WebSocket text frame.
    pub fn parse(text: &str) -> SlackResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// The acknowledgment owed for this envelope, if any.
    pub fn ack(&self) -> Option<SocketModeAck> {
        self.envelope_id.as_deref().map(SocketModeAck::new)
    }

    /// Classify the envelope.
    pub fn into_event(self) -> SlackResult<SocketEvent> {
        match self.envelope_type.as_str() {
            "hello" => Ok(SocketEvent::Hello),
            "disconnect" => Ok(SocketEvent::Disconnect {
                reason: self.reason,
            }),
            "slash_commands" => {
                let payload = self.payload.ok_or_else(|| {
                    SlackError::InvalidPayload("slash command envelope without payload".to_string())
                })?;
                let command: SlashCommandPayload = serde_json::from_value(payload)
                    .map_err(|e| SlackError::InvalidPayload(format!("slash command: {}", e)))?;
                Ok(SocketEvent::SlashCommand(Box::new(command)))
            }
            other => {
                debug!("Ignoring {} envelope", other);
                Ok(SocketEvent::Ignored(other.to_string()))
            }
        }
    }
}
