//! Errors returned by debugger commands.
//!
//! Every variant is local and recoverable: a command that fails leaves the agent in the
//! state it was in before the command was issued.

use thiserror::Error;

use crate::{breakpoint::BreakpointId, script::ScriptId};

/// Result type for debugger operations.
pub type InspectorResult<T> = Result<T, InspectorError>;

/// The error taxonomy of the debugger agent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InspectorError {
    /// The agent has not been enabled.
    #[error("Debugger agent is not enabled")]
    NotEnabled,

    /// The command needs the engine to be suspended.
    #[error("Can only perform operation while paused.")]
    NotPaused,

    /// A breakpoint with the same computed id already exists.
    #[error("Breakpoint at specified location already exists: {0}")]
    DuplicateBreakpoint(BreakpointId),

    /// A breakpoint id was not found.
    ///
    /// Removal is idempotent so this is never returned by `removeBreakpoint`.
    #[error("Unknown breakpoint: {0}")]
    UnknownBreakpoint(BreakpointId),

    /// The call frame id does not name a frame of the current pause.
    #[error("Could not find call frame with given id: {0}")]
    UnknownFrame(String),

    /// The call frame id was captured during an earlier pause.
    #[error("Inspected frame has gone: {0}")]
    StaleFrame(String),

    /// Neither a call frame nor a function object could be resolved.
    #[error("{0}")]
    UnresolvedTarget(String),

    /// The blackbox pattern or URL regex failed to compile.
    #[error("Invalid regular expression: {0}")]
    InvalidPattern(String),

    /// A negative column number was supplied.
    #[error("Incorrect column number: {0}")]
    InvalidColumn(i64),

    /// Async call stacks are disabled (`maxAsyncCallStackDepth == 0`).
    #[error("Can only perform operation while tracking async call stacks.")]
    AsyncTrackingDisabled,

    /// The async operation id is zero or not present in the operation table.
    #[error("Unknown async operation id: {0}")]
    UnknownAsyncOperation(u32),

    /// The engine refused to compile a script.
    #[error("Script compilation failed: {0}")]
    ScriptCompileFailure(String),

    /// The engine refused to run a script.
    #[error("Script execution failed: {0}")]
    ScriptExecutionFailure(String),

    /// `setPauseOnExceptions` received a mode other than `none`, `all` or `uncaught`.
    #[error("Unknown pause on exceptions mode: {0}")]
    UnknownMode(String),

    /// The script id was never registered.
    #[error("No script for id: {0}")]
    UnknownScript(ScriptId),

    /// The request payload does not fit the command.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The command name is not part of the protocol.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}
