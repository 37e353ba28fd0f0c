//! Wire protocol for the debugger agent.
//!
//! Messages are JSON objects tagged with a `type`: front ends send `request`s and receive
//! `response`s and `event`s. Recorded sessions may also contain `engine` messages, which
//! the server replays on a [`ScriptedEngine`](crate::bridge::ScriptedEngine). Every
//! message carries a sequence number; responses point back to their request.

pub mod messages;
pub mod server;
pub mod transport;

pub use messages::EngineAction;
pub use server::{InspectorServer, ProtocolFrontend};
pub use transport::{Framing, StdioTransport, StreamTransport, Transport, split_frames};

use serde::{Deserialize, Serialize};

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProtocolMessage {
    /// Front-end command.
    Request(Request),
    /// Answer to a command.
    Response(Response),
    /// Agent notification.
    Event(Event),
    /// Scripted engine activity.
    Engine(EngineMessage),
}

/// A command sent by the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Sequence number.
    pub seq: i64,
    /// Command name, e.g. `setBreakpointByUrl`.
    pub command: String,
    /// Command arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

/// The answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Sequence number.
    pub seq: i64,
    /// Sequence number of the request.
    pub request_seq: i64,
    /// Whether the command succeeded.
    pub success: bool,
    /// Command name of the request.
    pub command: String,
    /// Error message when the command failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Command result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// A notification sent by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Sequence number.
    pub seq: i64,
    /// Event name, e.g. `paused`.
    pub event: String,
    /// Event payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// Scripted engine activity in a recorded session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineMessage {
    /// Sequence number.
    #[serde(default)]
    pub seq: i64,
    /// What the engine does.
    pub action: EngineAction,
}

impl ProtocolMessage {
    /// Sequence number of any message.
    #[must_use]
    pub fn seq(&self) -> i64 {
        match self {
            Self::Request(r) => r.seq,
            Self::Response(r) => r.seq,
            Self::Event(e) => e.seq,
            Self::Engine(e) => e.seq,
        }
    }
}
