//! The seam between the debugger core and the embedded script engine.
//!
//! [`EngineDebugBridge`] is the minimal capability set the agent needs from an engine:
//! native breakpoints, stepping, pause control, frame inspection and evaluation. The
//! engine reports what happens through [`DebugEvent`]s which the host forwards to
//! [`DebuggerAgent::handle_debug_event`](crate::agent::DebuggerAgent::handle_debug_event).
//!
//! # Nested pause
//!
//! When the agent decides to pause, it services front-end commands before returning
//! from `handle_debug_event`. An engine implementation must keep execution suspended and
//! every frame reachable for that whole time; the stepping methods only *arm* a mode,
//! execution actually resumes once the event handler returns.

mod scripted;

pub use scripted::{ScriptedEngine, ScriptedFrame, StepMode};

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    breakpoint::{NativeBreakpointId, ScriptBreakpoint},
    error::InspectorError,
    script::{ParsedScript, ScriptId},
};

/// A native breakpoint as placed by the engine, possibly moved to a breakable position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeBreakpoint {
    /// Engine handle.
    pub id: NativeBreakpointId,
    /// Line the engine placed the breakpoint on.
    pub line_number: u32,
    /// Column the engine placed the breakpoint on.
    pub column_number: u32,
}

/// When exceptions pause execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseOnExceptionsState {
    /// Never pause on exceptions.
    #[default]
    None,
    /// Pause on every exception.
    All,
    /// Pause on exceptions nothing catches.
    Uncaught,
}

impl FromStr for PauseOnExceptionsState {
    type Err = InspectorError;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode {
            "none" => Ok(Self::None),
            "all" => Ok(Self::All),
            "uncaught" => Ok(Self::Uncaught),
            _ => Err(InspectorError::UnknownMode(mode.to_owned())),
        }
    }
}

/// A cheap view of one frame, without scope materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSummary {
    /// Script of the frame.
    pub script_id: ScriptId,
    /// Function name, empty for top-level code.
    pub function_name: String,
    /// Current line.
    pub line_number: u32,
    /// Current column.
    pub column_number: u32,
    /// Whether the frame stopped at its return.
    pub is_at_return: bool,
}

/// A plain-data stack frame, safe to keep after the engine moved on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrameInfo {
    /// Function name, empty for top-level code.
    pub function_name: String,
    /// Script of the frame.
    pub script_id: ScriptId,
    /// URL of the script, filled in by the agent.
    #[serde(default)]
    pub url: String,
    /// Current line.
    pub line_number: u32,
    /// Current column.
    #[serde(default)]
    pub column_number: u32,
}

/// Kind of a scope in a frame's scope chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScopeKind {
    /// Global object.
    Global,
    /// Function locals.
    Local,
    /// `with` statement object.
    With,
    /// Captured variables of a closure.
    Closure,
    /// `catch` binding.
    Catch,
    /// Block-scoped bindings.
    Block,
    /// Top-level lexical bindings of a script.
    Script,
}

/// A scope of a captured frame, holding an engine value.
#[derive(Debug, Clone)]
pub struct RawScope<V> {
    /// Kind of the scope.
    pub kind: ScopeKind,
    /// Object holding the scope's variables.
    pub object: V,
}

/// A fully captured frame, only valid during the pause it was captured in.
#[derive(Debug, Clone)]
pub struct RawCallFrame<V> {
    /// Function name, empty for top-level code.
    pub function_name: String,
    /// Script of the frame.
    pub script_id: ScriptId,
    /// Current line.
    pub line_number: u32,
    /// Current column.
    pub column_number: u32,
    /// The frame's `this` value.
    pub this: V,
    /// Scopes, innermost first.
    pub scope_chain: Vec<RawScope<V>>,
    /// Value about to be returned, when stopped at a return.
    pub return_value: Option<V>,
    /// Whether the frame stopped at its return.
    pub is_at_return: bool,
}

/// How deep the engine currently is in script execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionDepth {
    /// Number of nested script entries on the native stack.
    pub recursion_level: usize,
    /// Whether the host is running a microtask checkpoint.
    pub performing_microtask_checkpoint: bool,
}

/// A front-end displayable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    /// Value type, e.g. `object` or `number`.
    #[serde(rename = "type")]
    pub type_: String,
    /// Refinement of `object`, e.g. `array` or `null`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Constructor name of objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// The value itself, for primitives and by-value results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Display string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Handle for objects kept in an object group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

/// Where and why a user expression threw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    /// Exception message.
    pub text: String,
    /// URL of the throwing script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Script that threw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_id: Option<ScriptId>,
    /// Line of the throw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    /// Column of the throw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u32>,
}

impl ExceptionDetails {
    /// Details with only a message.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: None,
            script_id: None,
            line_number: None,
            column_number: None,
        }
    }
}

/// Outcome of running user code.
#[derive(Debug, Clone)]
pub enum Completion<V> {
    /// The code completed with a value.
    Value(V),
    /// The code threw `exception`.
    Threw {
        /// The thrown value.
        exception: V,
        /// Where the exception was thrown.
        details: ExceptionDetails,
    },
}

/// Outcome of compiling user code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    /// Compiled; carries the id when the script was persisted.
    Compiled(Option<ScriptId>),
    /// The source did not compile.
    SyntaxError(ExceptionDetails),
}

/// What `setVariableValue` acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableTarget {
    /// A paused call frame, by ordinal.
    CallFrame(usize),
    /// A function object, by object id.
    Function(String),
}

/// Lifecycle events of engine-native async tasks (promise reactions and the like).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AsyncTaskKind {
    /// A task was scheduled to run once.
    Enqueue,
    /// A task was scheduled to run repeatedly.
    EnqueueRecurring,
    /// A task is about to run.
    WillHandle,
    /// A task finished running.
    DidHandle,
    /// A task will never run again.
    Cancel,
}

/// An engine-native async task event, keyed by `(name, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncTaskEvent {
    /// What happened.
    pub kind: AsyncTaskKind,
    /// Task name, e.g. `Promise.then`.
    pub name: String,
    /// Engine id, unique per name.
    pub id: u64,
}

/// Everything the engine reports through its single debug callback.
#[derive(Debug, Clone)]
pub enum DebugEvent<V> {
    /// Execution stopped on native breakpoints.
    BreakpointHit(Vec<NativeBreakpointId>),
    /// Execution stopped because a step completed, a scheduled pause was reached or a
    /// `debugger` statement ran.
    Break,
    /// An exception is being thrown and the pause-on-exceptions mode wants it.
    Exception {
        /// The thrown value.
        value: V,
        /// Whether the exception is an unhandled promise rejection.
        is_promise_rejection: bool,
    },
    /// An engine-native async task changed state.
    AsyncTask(AsyncTaskEvent),
    /// A script compiled.
    ScriptParsed(ParsedScript),
    /// A script failed to compile.
    ScriptFailedToParse(ParsedScript),
}

/// Native debug primitives of the embedded engine.
///
/// Methods documented as "paused only" may only be called while the agent is servicing a
/// pause; implementations are free to return empty results otherwise.
pub trait EngineDebugBridge {
    /// Engine value handle.
    type Value: Clone + std::fmt::Debug;

    /// Places a native breakpoint; `None` means the engine refused the location.
    fn set_breakpoint(
        &mut self,
        script_id: &ScriptId,
        breakpoint: &ScriptBreakpoint,
        interstatement: bool,
    ) -> Option<NativeBreakpoint>;

    /// Removes a native breakpoint; unknown ids are ignored.
    fn remove_breakpoint(&mut self, id: &NativeBreakpointId);

    /// Scripts compiled before the agent was enabled, in compilation order.
    fn compiled_scripts(&self) -> Vec<ParsedScript>;

    /// Removes every native breakpoint.
    fn clear_breakpoints(&mut self);

    /// Enables or disables every native breakpoint at once.
    fn set_breakpoints_active(&mut self, active: bool);

    /// Asks the engine to break at the next statement it runs.
    fn set_pause_on_next_statement(&mut self, pause: bool);

    /// Sets when exceptions break.
    fn set_pause_on_exceptions(&mut self, state: PauseOnExceptionsState);

    /// The mode last set.
    fn pause_on_exceptions(&self) -> PauseOnExceptionsState;

    /// Asks the engine to break as soon as possible.
    fn break_program(&mut self);

    /// Paused only: resumes without stepping.
    fn continue_program(&mut self);

    /// Paused only: arms a step into the next statement.
    fn step_into(&mut self);

    /// Paused only: arms a step over the current statement.
    fn step_over(&mut self);

    /// Paused only: arms a step out of the current function.
    fn step_out(&mut self);

    /// Paused only: arms a step to the next frame change.
    fn step_frame(&mut self);

    /// Cancels any armed stepping mode.
    fn clear_stepping(&mut self);

    /// Paused only: captures up to `limit` frames (`0` for all), top first.
    fn current_call_frames(&mut self, limit: usize) -> Vec<RawCallFrame<Self::Value>>;

    /// Returns one frame without capturing scopes.
    fn call_frame_at(&self, index: usize) -> Option<FrameSummary>;

    /// Captures the synchronous stack for an async snapshot; empty outside script.
    fn capture_async_stack(&self, limit: usize) -> Vec<StackFrameInfo>;

    /// Current script nesting of the engine.
    fn execution_depth(&self) -> ExecutionDepth;

    /// Paused only: evaluates `expression` in the frame at `ordinal`.
    fn evaluate_on_frame(&mut self, ordinal: usize, expression: &str) -> Completion<Self::Value>;

    /// Paused only: restarts the frame at `ordinal`.
    fn restart_frame(&mut self, ordinal: usize) -> Result<(), String>;

    /// Assigns `value` to variable `name` of a scope of `target`. `Err` carries the
    /// engine's message.
    fn set_variable_value(
        &mut self,
        target: &VariableTarget,
        scope_number: usize,
        name: &str,
        value: &serde_json::Value,
    ) -> Result<(), String>;

    /// Replaces a script's source. `Err` carries the compile error.
    fn set_script_source(
        &mut self,
        script_id: &ScriptId,
        source: &str,
        preview: bool,
    ) -> Result<(), ExceptionDetails>;

    /// Compiles user code. `Err` means the engine could not attempt compilation.
    fn compile_script(
        &mut self,
        expression: &str,
        source_url: &str,
        persist: bool,
    ) -> Result<CompileOutcome, String>;

    /// Runs a script previously compiled with `persist`.
    fn run_script(&mut self, script_id: &ScriptId) -> Result<Completion<Self::Value>, String>;

    /// Turns an engine value into a displayable object owned by `group`.
    fn wrap(&mut self, value: &Self::Value, group: &str, by_value: bool) -> RemoteObject;

    /// Releases every handle wrapped into `group`.
    fn release_object_group(&mut self, group: &str);
}

#[cfg(test)]
mod tests {
    use super::PauseOnExceptionsState;
    use crate::error::InspectorError;
    use test_case::test_case;

    #[test_case("none", PauseOnExceptionsState::None)]
    #[test_case("all", PauseOnExceptionsState::All)]
    #[test_case("uncaught", PauseOnExceptionsState::Uncaught)]
    fn parses_pause_on_exceptions_modes(mode: &str, expected: PauseOnExceptionsState) {
        assert_eq!(mode.parse::<PauseOnExceptionsState>(), Ok(expected));
    }

    #[test]
    fn rejects_unknown_mode() {
        assert_eq!(
            "sometimes".parse::<PauseOnExceptionsState>(),
            Err(InspectorError::UnknownMode("sometimes".to_owned()))
        );
    }
}
