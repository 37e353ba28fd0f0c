//! Engine activity messages.
//!
//! A recorded session interleaves front-end requests with `engine` messages describing
//! what the scripted engine does: scripts being parsed, frames being entered, statements
//! executing. Replaying them drives the agent exactly like a live engine would.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    agent::DebuggerAgent,
    bridge::{AsyncTaskEvent, ExecutionDepth, ScriptedEngine, ScriptedFrame},
    frontend::Frontend,
    script::ParsedScript,
};

/// One step of scripted engine activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum EngineAction {
    /// Compiles a script.
    #[serde(rename_all = "camelCase")]
    ParseScript {
        /// The compiled script.
        script: ParsedScript,
        /// Lines a breakpoint can be placed on; all lines when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        breakable_lines: Option<Vec<u32>>,
    },
    /// Fails to compile a script.
    FailParse {
        /// The script that failed.
        script: ParsedScript,
    },
    /// Defines a global variable.
    SetGlobal {
        /// Variable name.
        name: String,
        /// Initial value.
        value: Value,
    },
    /// Changes the reported script nesting.
    #[serde(rename_all = "camelCase")]
    SetExecutionDepth {
        /// Nested script entries on the native stack.
        recursion_level: usize,
        /// Whether a microtask checkpoint runs.
        #[serde(default)]
        performing_microtask_checkpoint: bool,
    },
    /// Enters a function called from native code.
    Call {
        /// The entered frame.
        frame: ScriptedFrame,
    },
    /// Leaves the function entered by the matching `call`.
    Return,
    /// Moves the top frame to its return statement, about to return `value`.
    AtReturn {
        /// The return value.
        #[serde(default)]
        value: Value,
    },
    /// Enters a function called from script.
    PushFrame {
        /// The entered frame.
        frame: ScriptedFrame,
    },
    /// Leaves the top frame.
    PopFrame,
    /// Runs a statement of the top frame.
    Execute {
        /// Line of the statement.
        line: u32,
        /// Column of the statement.
        #[serde(default)]
        column: u32,
    },
    /// Throws from the top frame.
    #[serde(rename_all = "camelCase")]
    Throw {
        /// The thrown value.
        value: Value,
        /// Whether nothing catches it.
        #[serde(default)]
        uncaught: bool,
        /// Whether it rejects a promise.
        #[serde(default)]
        promise_rejection: bool,
    },
    /// An engine-native async task changed state.
    AsyncTask(AsyncTaskEvent),
    /// Schedules deferred work; the operation gets the next id.
    StartAsync {
        /// What scheduled the operation.
        description: String,
    },
    /// Starts a callback of an operation.
    #[serde(rename_all = "camelCase")]
    RunAsync {
        /// The operation.
        operation_id: u32,
    },
    /// Ends the running callback.
    FinishAsync,
    /// Marks an operation as done.
    #[serde(rename_all = "camelCase")]
    CompleteAsync {
        /// The operation.
        operation_id: u32,
    },
    /// The page navigated; everything tied to the old global goes.
    Navigate,
}

impl EngineAction {
    /// Performs the action on the agent's engine and feeds the resulting debug events to
    /// the agent.
    pub fn apply<F: Frontend>(self, agent: &mut DebuggerAgent<ScriptedEngine, F>) {
        match self {
            Self::ParseScript {
                script,
                breakable_lines,
            } => {
                let event = agent.bridge_mut().parse_script(script, breakable_lines);
                agent.handle_debug_event(event);
            }
            Self::FailParse { script } => {
                let event = agent.bridge().fail_parse(script);
                agent.handle_debug_event(event);
            }
            Self::SetGlobal { name, value } => agent.bridge_mut().set_global(name, value),
            Self::SetExecutionDepth {
                recursion_level,
                performing_microtask_checkpoint,
            } => agent.bridge_mut().set_execution_depth(ExecutionDepth {
                recursion_level,
                performing_microtask_checkpoint,
            }),
            Self::Call { frame } => {
                agent.will_call_function();
                agent.bridge_mut().push_frame(frame);
            }
            Self::Return => {
                agent.bridge_mut().pop_frame();
                agent.did_call_function();
            }
            Self::AtReturn { value } => agent.bridge_mut().mark_at_return(value),
            Self::PushFrame { frame } => agent.bridge_mut().push_frame(frame),
            Self::PopFrame => {
                agent.bridge_mut().pop_frame();
            }
            Self::Execute { line, column } => {
                if let Some(event) = agent.bridge_mut().execute_statement(line, column) {
                    agent.handle_debug_event(event);
                }
            }
            Self::Throw {
                value,
                uncaught,
                promise_rejection,
            } => {
                if let Some(event) = agent.bridge_mut().throw(value, uncaught, promise_rejection) {
                    agent.handle_debug_event(event);
                }
            }
            Self::AsyncTask(task) => {
                let event = agent.bridge().async_task(task.kind, task.name, task.id);
                agent.handle_debug_event(event);
            }
            Self::StartAsync { description } => {
                agent.trace_async_operation_starting(&description);
            }
            Self::RunAsync { operation_id } => agent.trace_async_callback_starting(operation_id),
            Self::FinishAsync => agent.trace_async_callback_completed(),
            Self::CompleteAsync { operation_id } => {
                agent.trace_async_operation_completed(operation_id);
            }
            Self::Navigate => agent.reset(),
        }
    }
}
