//! The front-end side of the agent: notifications out, commands in.

use std::collections::VecDeque;

use serde::Serialize;

use crate::{
    agent::{BreakReason, CallFrame, Command, CommandOutput},
    async_chain::{AsyncOperationInfo, AsyncStackTrace},
    breakpoint::{BreakpointId, Location},
    error::InspectorResult,
    script::{ParsedScript, ScriptId},
};

/// Payload of the `paused` notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedEvent {
    /// The paused stack, top first.
    pub call_frames: Vec<CallFrame>,
    /// Why execution paused.
    #[serde(flatten)]
    pub reason: BreakReason,
    /// Protocol breakpoints that caused the pause.
    pub hit_breakpoint_ids: Vec<BreakpointId>,
    /// Async chain of the running callback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub async_stack_trace: Option<AsyncStackTrace>,
}

/// Payload of `scriptParsed` and `scriptFailedToParse`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParsedEvent {
    /// Id of the script.
    pub script_id: ScriptId,
    /// URL, or the `sourceURL` the script names.
    pub url: String,
    /// First line of the script in its resource.
    pub start_line: u32,
    /// First column of the script in its resource.
    pub start_column: u32,
    /// Last line of the script.
    pub end_line: u32,
    /// Last column of the script.
    pub end_column: u32,
    /// Whether an extension injected the script.
    pub is_content_script: bool,
    /// Whether the script belongs to the embedder.
    pub is_internal_script: bool,
    /// Source map the script names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_map_url: Option<String>,
    /// Whether `url` comes from a `sourceURL` comment.
    pub has_source_url: bool,
}

impl From<&ParsedScript> for ScriptParsedEvent {
    fn from(script: &ParsedScript) -> Self {
        Self {
            script_id: script.script_id.clone(),
            url: script.url.clone(),
            start_line: script.start_line,
            start_column: script.start_column,
            end_line: script.end_line,
            end_column: script.end_column,
            is_content_script: script.is_content_script,
            is_internal_script: script.is_internal_script,
            source_map_url: script.source_map_url.clone(),
            has_source_url: script.has_source_url,
        }
    }
}

/// Notifications sent by the agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "body", rename_all = "camelCase")]
pub enum InspectorEvent {
    /// Execution paused.
    Paused(PausedEvent),
    /// Execution resumed.
    Resumed,
    /// A script compiled.
    ScriptParsed(ScriptParsedEvent),
    /// A script failed to compile.
    ScriptFailedToParse(ScriptParsedEvent),
    /// A URL breakpoint resolved in a newly parsed script.
    #[serde(rename_all = "camelCase")]
    BreakpointResolved {
        /// The breakpoint that resolved.
        breakpoint_id: BreakpointId,
        /// Where it was placed.
        location: Location,
    },
    /// An async operation was scheduled.
    AsyncOperationStarted {
        /// The operation and its chain.
        operation: AsyncOperationInfo,
    },
    /// An async operation will not run its callback again.
    AsyncOperationCompleted {
        /// Id of the operation.
        id: u32,
    },
    /// The page navigated; object ids and frames are gone.
    GlobalObjectCleared,
}

impl InspectorEvent {
    /// Protocol name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Paused(_) => "paused",
            Self::Resumed => "resumed",
            Self::ScriptParsed(_) => "scriptParsed",
            Self::ScriptFailedToParse(_) => "scriptFailedToParse",
            Self::BreakpointResolved { .. } => "breakpointResolved",
            Self::AsyncOperationStarted { .. } => "asyncOperationStarted",
            Self::AsyncOperationCompleted { .. } => "asyncOperationCompleted",
            Self::GlobalObjectCleared => "globalObjectCleared",
        }
    }
}

/// A connected debugging front end.
///
/// [`wait_for_command`](Frontend::wait_for_command) is only called while the engine is
/// paused; it blocks until the front end sends something. Returning `None` means the
/// front end went away, and the agent resumes execution.
pub trait Frontend {
    /// Correlates a command with its response.
    type Token;

    /// Sends a notification.
    fn notify(&mut self, event: InspectorEvent);

    /// Blocks for the next command while paused.
    fn wait_for_command(&mut self) -> Option<(Self::Token, Command)>;

    /// Answers the command identified by `token`.
    fn respond(&mut self, token: Self::Token, result: InspectorResult<CommandOutput>);
}

/// A front end that records notifications and replays queued commands during pauses.
#[derive(Debug, Default)]
pub struct RecordingFrontend {
    events: Vec<InspectorEvent>,
    queued: VecDeque<Command>,
    responses: Vec<InspectorResult<CommandOutput>>,
}

impl RecordingFrontend {
    /// A front end with nothing queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a command to be answered at the next pause.
    pub fn queue(&mut self, command: Command) {
        self.queued.push_back(command);
    }

    /// Every notification received so far.
    #[must_use]
    pub fn events(&self) -> &[InspectorEvent] {
        &self.events
    }

    /// Responses to queued commands, in order.
    #[must_use]
    pub fn responses(&self) -> &[InspectorResult<CommandOutput>] {
        &self.responses
    }

    /// The `paused` notifications received so far.
    pub fn paused_events(&self) -> impl Iterator<Item = &PausedEvent> {
        self.events.iter().filter_map(|event| match event {
            InspectorEvent::Paused(paused) => Some(paused),
            _ => None,
        })
    }

    /// Drops everything recorded so far.
    pub fn clear(&mut self) {
        self.events.clear();
        self.responses.clear();
    }
}

impl Frontend for RecordingFrontend {
    type Token = usize;

    fn notify(&mut self, event: InspectorEvent) {
        self.events.push(event);
    }

    fn wait_for_command(&mut self) -> Option<(usize, Command)> {
        let command = self.queued.pop_front()?;
        Some((self.responses.len(), command))
    }

    fn respond(&mut self, _token: usize, result: InspectorResult<CommandOutput>) {
        self.responses.push(result);
    }
}
