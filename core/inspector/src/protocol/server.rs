//! Protocol server.
//!
//! [`ProtocolFrontend`] is the [`Frontend`] that speaks the wire protocol over a
//! [`Transport`]. [`InspectorServer`] owns an agent over a scripted engine and replays an
//! incoming message stream: requests are executed, engine messages drive the engine.
//! When the engine pauses, the agent itself keeps reading requests through the front end
//! until one of them resumes.

use std::io;

use log::{debug, trace, warn};
use serde_json::Value;

use super::{
    EngineAction, EngineMessage, Event, ProtocolMessage, Request, Response, transport::Transport,
};
use crate::{
    agent::{Command, CommandOutput, DebuggerAgent},
    bridge::ScriptedEngine,
    config::InspectorConfig,
    error::InspectorResult,
    frontend::{Frontend, InspectorEvent},
};

/// An incoming message the server has to act on.
#[derive(Debug)]
pub enum Incoming {
    /// A front-end command.
    Request {
        /// Sequence number of the request.
        seq: i64,
        /// Command name, echoed in the response.
        command: String,
        /// The command, or why it could not be parsed.
        parsed: InspectorResult<Command>,
    },
    /// Scripted engine activity.
    Engine(EngineAction),
}

/// A front end reached through a transport.
#[derive(Debug)]
pub struct ProtocolFrontend<T> {
    transport: T,
    seq: i64,
    closed: bool,
    failure: Option<io::Error>,
}

impl<T: Transport> ProtocolFrontend<T> {
    /// Wraps a transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            seq: 1,
            closed: false,
            failure: None,
        }
    }

    /// Hands back the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Gets the next sequence number
    fn next_seq(&mut self) -> i64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    /// Reads until a message the server acts on, `None` once the input is exhausted.
    pub fn read_incoming(&mut self) -> io::Result<Option<Incoming>> {
        while !self.closed {
            let Some(text) = self.transport.read_message()? else {
                self.closed = true;
                break;
            };
            trace!("<- {text}");
            let message: ProtocolMessage = serde_json::from_str(&text)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            match message {
                ProtocolMessage::Request(Request {
                    seq,
                    command,
                    arguments,
                }) => {
                    let parsed = Command::parse(&command, arguments);
                    return Ok(Some(Incoming::Request {
                        seq,
                        command,
                        parsed,
                    }));
                }
                ProtocolMessage::Engine(EngineMessage { action, .. }) => {
                    return Ok(Some(Incoming::Engine(action)));
                }
                ProtocolMessage::Response(_) | ProtocolMessage::Event(_) => {
                    warn!("ignoring {} message sent to the agent", message.seq());
                }
            }
        }
        Ok(None)
    }

    /// Takes the I/O error that closed the front end, if any.
    pub fn take_failure(&mut self) -> Option<io::Error> {
        self.failure.take()
    }

    fn fail(&mut self, err: io::Error) {
        warn!("front end connection failed: {err}");
        self.closed = true;
        self.failure.get_or_insert(err);
    }

    /// Creates a response message
    fn create_response(
        &mut self,
        request_seq: i64,
        command: String,
        result: InspectorResult<CommandOutput>,
    ) -> ProtocolMessage {
        let (success, message, body) = match result {
            Ok(output) => match serde_json::to_value(&output) {
                Ok(Value::Null) => (true, None, None),
                Ok(body) => (true, None, Some(body)),
                Err(err) => (false, Some(format!("Failed to serialize: {err}")), None),
            },
            Err(err) => (false, Some(err.to_string()), None),
        };
        ProtocolMessage::Response(Response {
            seq: self.next_seq(),
            request_seq,
            success,
            command,
            message,
            body,
        })
    }

    /// Creates an event message
    fn create_event(&mut self, event: &InspectorEvent) -> ProtocolMessage {
        let body = match serde_json::to_value(event) {
            Ok(Value::Object(mut map)) => map.remove("body"),
            Ok(_) => None,
            Err(err) => {
                warn!("could not serialize {} event: {err}", event.name());
                None
            }
        };
        ProtocolMessage::Event(Event {
            seq: self.next_seq(),
            event: event.name().to_owned(),
            body,
        })
    }

    /// Sends a protocol message
    fn send_message(&mut self, message: &ProtocolMessage) {
        if self.closed && self.failure.is_some() {
            return;
        }
        let result = serde_json::to_string(message)
            .map_err(io::Error::from)
            .and_then(|json| {
                trace!("-> {json}");
                self.transport.write_message(&json)
            });
        if let Err(err) = result {
            self.fail(err);
        }
    }
}

impl<T: Transport> Frontend for ProtocolFrontend<T> {
    type Token = (i64, String);

    fn notify(&mut self, event: InspectorEvent) {
        let message = self.create_event(&event);
        self.send_message(&message);
    }

    fn wait_for_command(&mut self) -> Option<(Self::Token, Command)> {
        loop {
            match self.read_incoming() {
                Ok(Some(Incoming::Request {
                    seq,
                    command,
                    parsed: Ok(parsed),
                })) => return Some(((seq, command), parsed)),
                Ok(Some(Incoming::Request {
                    seq,
                    command,
                    parsed: Err(err),
                })) => self.respond((seq, command), Err(err)),
                Ok(Some(Incoming::Engine(action))) => {
                    warn!("engine activity while paused ignored: {action:?}");
                }
                Ok(None) => return None,
                Err(err) => {
                    self.fail(err);
                    return None;
                }
            }
        }
    }

    fn respond(&mut self, (request_seq, command): Self::Token, result: InspectorResult<CommandOutput>) {
        let message = self.create_response(request_seq, command, result);
        self.send_message(&message);
    }
}

/// Replays a message stream against an agent over a scripted engine.
#[derive(Debug)]
pub struct InspectorServer<T: Transport> {
    agent: DebuggerAgent<ScriptedEngine, ProtocolFrontend<T>>,
}

impl<T: Transport> InspectorServer<T> {
    /// Creates a server with a fresh engine and a disabled agent.
    pub fn new(transport: T, config: InspectorConfig) -> InspectorResult<Self> {
        let agent = DebuggerAgent::new(ScriptedEngine::new(), ProtocolFrontend::new(transport), config)?;
        Ok(Self { agent })
    }

    /// The agent serving the session.
    #[must_use]
    pub fn agent(&self) -> &DebuggerAgent<ScriptedEngine, ProtocolFrontend<T>> {
        &self.agent
    }

    /// Mutable access to the agent.
    pub fn agent_mut(&mut self) -> &mut DebuggerAgent<ScriptedEngine, ProtocolFrontend<T>> {
        &mut self.agent
    }

    /// Shuts the server down and returns its transport.
    pub fn into_transport(self) -> T {
        self.agent.into_frontend().into_transport()
    }

    /// Processes messages until the input is exhausted.
    pub fn run(&mut self) -> io::Result<()> {
        while let Some(incoming) = self.agent.frontend_mut().read_incoming()? {
            self.handle_incoming(incoming);
        }
        debug!("input exhausted");
        self.agent.frontend_mut().take_failure().map_or(Ok(()), Err)
    }

    /// Handles one request or engine message.
    pub fn handle_incoming(&mut self, incoming: Incoming) {
        match incoming {
            Incoming::Request {
                seq,
                command,
                parsed,
            } => {
                let result = parsed.and_then(|parsed| self.agent.execute(parsed));
                self.agent.frontend_mut().respond((seq, command), result);
            }
            Incoming::Engine(action) => action.apply(&mut self.agent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Framing, StreamTransport, split_frames};
    use indoc::indoc;
    use serde_json::json;
    use std::io::Cursor;

    fn replay(session: &str) -> Vec<Value> {
        let transport = StreamTransport::new(Cursor::new(session.to_owned()), Vec::new(), Framing::Lines);
        let mut server = InspectorServer::new(transport, InspectorConfig::default()).unwrap();
        server.run().unwrap();
        let output = String::from_utf8(server.into_transport().into_writer()).unwrap();
        split_frames(&output)
            .unwrap()
            .iter()
            .map(|frame| serde_json::from_str(frame).unwrap())
            .collect()
    }

    #[test]
    fn unknown_commands_get_failed_responses() {
        let transport = StreamTransport::new(
            Cursor::new(r#"{"type":"request","seq":1,"command":"explode"}"#.to_owned()),
            Vec::new(),
            Framing::Lines,
        );
        let mut frontend = ProtocolFrontend::new(transport);
        let Some(Incoming::Request { seq, command, parsed }) = frontend.read_incoming().unwrap() else {
            panic!("expected a request");
        };
        frontend.respond((seq, command), parsed.map(|_| CommandOutput::Empty));
        let output = String::from_utf8(frontend.into_transport().into_writer()).unwrap();
        let frames = split_frames(&output).unwrap();
        let response: Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(
            response,
            json!({
                "type": "response",
                "seq": 1,
                "request_seq": 1,
                "success": false,
                "command": "explode",
                "message": "Unknown command: explode",
            })
        );
    }

    #[test]
    fn pause_is_serviced_from_the_same_stream() {
        let session = indoc! {r#"
            {"type":"request","seq":1,"command":"enable"}
            {"type":"engine","action":{"op":"parseScript","script":{"scriptId":"1","url":"app.js","endLine":9}}}
            {"type":"request","seq":2,"command":"setBreakpointByUrl","arguments":{"url":"app.js","lineNumber":3}}
            {"type":"engine","action":{"op":"call","frame":{"functionName":"main","scriptId":"1","lineNumber":0}}}
            {"type":"engine","action":{"op":"execute","line":3}}
            {"type":"request","seq":3,"command":"resume"}
            {"type":"engine","action":{"op":"return"}}
        "#};
        let messages = replay(session);
        let names: Vec<&str> = messages
            .iter()
            .map(|message| {
                message["event"]
                    .as_str()
                    .or_else(|| message["command"].as_str())
                    .unwrap()
            })
            .collect();
        assert_eq!(
            names,
            ["enable", "scriptParsed", "setBreakpointByUrl", "paused", "resume", "resumed"]
        );
        assert_eq!(messages[2]["body"]["breakpointId"], "app.js:3:0");
        assert_eq!(messages[3]["body"]["hitBreakpointIds"], json!(["app.js:3:0"]));
        assert_eq!(messages[3]["body"]["reason"], "other");
    }
}
