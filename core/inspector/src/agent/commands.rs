//! The command surface of the debugger agent.

use log::debug;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use super::{
    DebuggerAgent,
    frames::{BACKTRACE_OBJECT_GROUP, CallFrame, CallFrameId, wrap_call_frames},
    state::{BreakReason, ScheduledStep},
};
use crate::{
    async_chain::AsyncStackTrace,
    breakpoint::{BreakpointCookie, BreakpointId, BreakpointSource, Location, ScriptBreakpoint},
    bridge::{
        CompileOutcome, Completion, EngineDebugBridge, ExceptionDetails, PauseOnExceptionsState,
        RemoteObject, VariableTarget,
    },
    error::{InspectorError, InspectorResult},
    frontend::Frontend,
    script::ScriptId,
};

/// Arguments of `setBreakpointsActive`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsActiveArguments {
    /// Whether breakpoints should fire.
    pub active: bool,
}

/// Arguments of `setSkipAllPauses`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSkipAllPausesArguments {
    /// Whether every pause is skipped.
    pub skipped: bool,
}

/// Arguments of `setBreakpointByUrl`. Exactly one of `url` and `url_regex` must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointByUrlArguments {
    /// Zero-based line.
    pub line_number: u32,
    /// Exact script URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Regular expression matched against script URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_regex: Option<String>,
    /// Zero-based column; negative values are rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_number: Option<i64>,
    /// Condition expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Arguments of `setBreakpoint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointArguments {
    /// Where to break.
    pub location: Location,
    /// Condition expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Arguments of `removeBreakpoint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveBreakpointArguments {
    /// The breakpoint to remove.
    pub breakpoint_id: BreakpointId,
}

/// Arguments of `continueToLocation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueToLocationArguments {
    /// Where to stop.
    pub location: Location,
    /// Whether the engine may stop between statements.
    #[serde(default)]
    pub interstatement_location: bool,
}

/// Arguments of `setPauseOnExceptions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPauseOnExceptionsArguments {
    /// `none`, `all` or `uncaught`.
    pub state: String,
}

/// Arguments of `evaluateOnCallFrame`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateOnCallFrameArguments {
    /// Frame to evaluate in.
    pub call_frame_id: String,
    /// Source of the expression.
    pub expression: String,
    /// Object group the result is kept in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_group: Option<String>,
    /// Whether exceptions thrown by the expression are ignored.
    #[serde(default)]
    pub do_not_pause_on_exceptions_and_mute_console: bool,
    /// Whether the result is returned as JSON instead of a handle.
    #[serde(default)]
    pub return_by_value: bool,
}

/// Arguments of `setVariableValue`; the target is a call frame or a function object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariableValueArguments {
    /// Index in the scope chain.
    pub scope_number: usize,
    /// Variable to assign.
    pub variable_name: String,
    /// New value.
    pub new_value: Value,
    /// Frame whose scope is changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_frame_id: Option<String>,
    /// Function whose scope is changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_object_id: Option<String>,
}

/// Arguments of commands addressing a call frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrameArguments {
    /// The addressed frame.
    pub call_frame_id: String,
}

/// Arguments of commands addressing a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptArguments {
    /// The addressed script.
    pub script_id: ScriptId,
}

/// Arguments of `setScriptSource`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetScriptSourceArguments {
    /// Script to edit.
    pub script_id: ScriptId,
    /// New source text.
    pub script_source: String,
    /// Whether to only check that the source compiles.
    #[serde(default)]
    pub preview: bool,
}

/// Arguments of `compileScript`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileScriptArguments {
    /// Source to compile.
    pub expression: String,
    /// URL the compiled script reports.
    #[serde(default, rename = "sourceURL")]
    pub source_url: String,
    /// Whether to keep the script for `runScript`.
    #[serde(default)]
    pub persist_script: bool,
}

/// Arguments of `runScript`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunScriptArguments {
    /// A script kept by `compileScript`.
    pub script_id: ScriptId,
    /// Object group the result is kept in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_group: Option<String>,
    /// Whether exceptions thrown by the script are ignored.
    #[serde(default)]
    pub do_not_pause_on_exceptions_and_mute_console: bool,
    /// Whether the result is returned as JSON instead of a handle.
    #[serde(default)]
    pub return_by_value: bool,
}

/// Arguments of `setAsyncCallStackDepth`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAsyncCallStackDepthArguments {
    /// Maximum chain depth; `0` disables tracking.
    pub max_depth: i64,
}

/// Arguments of the async operation breakpoint commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncOperationArguments {
    /// The operation.
    pub operation_id: u32,
}

/// Arguments of `skipStackFrames`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipStackFramesArguments {
    /// Blackbox pattern; empty clears it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    /// Whether content scripts are blackboxed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_content_scripts: Option<bool>,
}

/// A front-end command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `enable`
    Enable,
    /// `disable`
    Disable,
    /// `setBreakpointsActive`
    SetBreakpointsActive(SetBreakpointsActiveArguments),
    /// `setSkipAllPauses`
    SetSkipAllPauses(SetSkipAllPausesArguments),
    /// `setBreakpointByUrl`
    SetBreakpointByUrl(SetBreakpointByUrlArguments),
    /// `setBreakpoint`
    SetBreakpoint(SetBreakpointArguments),
    /// `removeBreakpoint`
    RemoveBreakpoint(RemoveBreakpointArguments),
    /// `continueToLocation`
    ContinueToLocation(ContinueToLocationArguments),
    /// `pause`
    Pause,
    /// `resume`
    Resume,
    /// `stepOver`
    StepOver,
    /// `stepInto`
    StepInto,
    /// `stepOut`
    StepOut,
    /// `stepIntoAsync`
    StepIntoAsync,
    /// `setPauseOnExceptions`
    SetPauseOnExceptions(SetPauseOnExceptionsArguments),
    /// `getBacktrace`
    GetBacktrace,
    /// `evaluateOnCallFrame`
    EvaluateOnCallFrame(EvaluateOnCallFrameArguments),
    /// `setVariableValue`
    SetVariableValue(SetVariableValueArguments),
    /// `restartFrame`
    RestartFrame(CallFrameArguments),
    /// `getScriptSource`
    GetScriptSource(ScriptArguments),
    /// `setScriptSource`
    SetScriptSource(SetScriptSourceArguments),
    /// `compileScript`
    CompileScript(CompileScriptArguments),
    /// `runScript`
    RunScript(RunScriptArguments),
    /// `setAsyncCallStackDepth`
    SetAsyncCallStackDepth(SetAsyncCallStackDepthArguments),
    /// `setAsyncOperationBreakpoint`
    SetAsyncOperationBreakpoint(AsyncOperationArguments),
    /// `removeAsyncOperationBreakpoint`
    RemoveAsyncOperationBreakpoint(AsyncOperationArguments),
    /// `flushAsyncOperationEvents`
    FlushAsyncOperationEvents,
    /// `skipStackFrames`
    SkipStackFrames(SkipStackFramesArguments),
}

fn arguments<T: DeserializeOwned>(arguments: Option<Value>) -> InspectorResult<T> {
    serde_json::from_value(arguments.unwrap_or_else(|| Value::Object(Map::new())))
        .map_err(|err| InspectorError::InvalidArguments(err.to_string()))
}

impl Command {
    /// Builds a command from its protocol name and JSON arguments.
    pub fn parse(name: &str, args: Option<Value>) -> InspectorResult<Self> {
        Ok(match name {
            "enable" => Self::Enable,
            "disable" => Self::Disable,
            "setBreakpointsActive" => Self::SetBreakpointsActive(arguments(args)?),
            "setSkipAllPauses" => Self::SetSkipAllPauses(arguments(args)?),
            "setBreakpointByUrl" => Self::SetBreakpointByUrl(arguments(args)?),
            "setBreakpoint" => Self::SetBreakpoint(arguments(args)?),
            "removeBreakpoint" => Self::RemoveBreakpoint(arguments(args)?),
            "continueToLocation" => Self::ContinueToLocation(arguments(args)?),
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "stepOver" => Self::StepOver,
            "stepInto" => Self::StepInto,
            "stepOut" => Self::StepOut,
            "stepIntoAsync" => Self::StepIntoAsync,
            "setPauseOnExceptions" => Self::SetPauseOnExceptions(arguments(args)?),
            "getBacktrace" => Self::GetBacktrace,
            "evaluateOnCallFrame" => Self::EvaluateOnCallFrame(arguments(args)?),
            "setVariableValue" => Self::SetVariableValue(arguments(args)?),
            "restartFrame" => Self::RestartFrame(arguments(args)?),
            "getScriptSource" => Self::GetScriptSource(arguments(args)?),
            "setScriptSource" => Self::SetScriptSource(arguments(args)?),
            "compileScript" => Self::CompileScript(arguments(args)?),
            "runScript" => Self::RunScript(arguments(args)?),
            "setAsyncCallStackDepth" => Self::SetAsyncCallStackDepth(arguments(args)?),
            "setAsyncOperationBreakpoint" => Self::SetAsyncOperationBreakpoint(arguments(args)?),
            "removeAsyncOperationBreakpoint" => {
                Self::RemoveAsyncOperationBreakpoint(arguments(args)?)
            }
            "flushAsyncOperationEvents" => Self::FlushAsyncOperationEvents,
            "skipStackFrames" => Self::SkipStackFrames(arguments(args)?),
            _ => return Err(InspectorError::UnknownCommand(name.to_owned())),
        })
    }
}

/// Result of running user code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    /// The value, or the thrown exception.
    pub result: RemoteObject,
    /// Whether the code threw.
    pub was_thrown: bool,
    /// Where the code threw.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_details: Option<ExceptionDetails>,
}

/// The successful result of a command, serialized as the response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandOutput {
    /// No result body.
    Empty,
    /// Result of `setBreakpointByUrl`.
    #[serde(rename_all = "camelCase")]
    BreakpointByUrl {
        /// Id of the new breakpoint.
        breakpoint_id: BreakpointId,
        /// Locations in already parsed scripts.
        locations: Vec<Location>,
    },
    /// Result of `setBreakpoint`.
    #[serde(rename_all = "camelCase")]
    Breakpoint {
        /// Id of the new breakpoint.
        breakpoint_id: BreakpointId,
        /// Where the engine placed it.
        actual_location: Location,
    },
    /// Result of `getBacktrace` and `restartFrame`.
    #[serde(rename_all = "camelCase")]
    Backtrace {
        /// The paused stack, top first.
        call_frames: Vec<CallFrame>,
        /// Async chain of the running callback.
        #[serde(skip_serializing_if = "Option::is_none")]
        async_stack_trace: Option<AsyncStackTrace>,
    },
    /// Result of `evaluateOnCallFrame` and `runScript`.
    Evaluation(EvaluationResult),
    /// Result of `getScriptSource`.
    #[serde(rename_all = "camelCase")]
    ScriptSource {
        /// Current source text of the script.
        script_source: String,
    },
    /// Result of `compileScript`.
    #[serde(rename_all = "camelCase")]
    CompiledScript {
        /// Id of the persisted script.
        #[serde(skip_serializing_if = "Option::is_none")]
        script_id: Option<ScriptId>,
        /// Syntax error, if compilation failed.
        #[serde(skip_serializing_if = "Option::is_none")]
        exception_details: Option<ExceptionDetails>,
    },
}

impl<B, F> DebuggerAgent<B, F>
where
    B: EngineDebugBridge,
    F: Frontend,
{
    /// Runs one command.
    pub fn execute(&mut self, command: Command) -> InspectorResult<CommandOutput> {
        let empty = |()| CommandOutput::Empty;
        match command {
            Command::Enable => {
                self.enable();
                Ok(CommandOutput::Empty)
            }
            Command::Disable => {
                self.disable();
                Ok(CommandOutput::Empty)
            }
            Command::SetBreakpointsActive(args) => self.set_breakpoints_active(args.active).map(empty),
            Command::SetSkipAllPauses(args) => {
                self.set_skip_all_pauses(args.skipped);
                Ok(CommandOutput::Empty)
            }
            Command::SetBreakpointByUrl(args) => self.set_breakpoint_by_url(args).map(
                |(breakpoint_id, locations)| CommandOutput::BreakpointByUrl {
                    breakpoint_id,
                    locations,
                },
            ),
            Command::SetBreakpoint(args) => self
                .set_breakpoint(&args.location, args.condition.unwrap_or_default())
                .map(|(breakpoint_id, actual_location)| CommandOutput::Breakpoint {
                    breakpoint_id,
                    actual_location,
                }),
            Command::RemoveBreakpoint(args) => {
                self.remove_breakpoint(&args.breakpoint_id);
                Ok(CommandOutput::Empty)
            }
            Command::ContinueToLocation(args) => self
                .continue_to_location(&args.location, args.interstatement_location)
                .map(empty),
            Command::Pause => self.pause().map(empty),
            Command::Resume => self.resume().map(empty),
            Command::StepOver => self.step_over().map(empty),
            Command::StepInto => self.step_into().map(empty),
            Command::StepOut => self.step_out().map(empty),
            Command::StepIntoAsync => self.step_into_async().map(empty),
            Command::SetPauseOnExceptions(args) => self.set_pause_on_exceptions(&args.state).map(empty),
            Command::GetBacktrace => self.get_backtrace(),
            Command::EvaluateOnCallFrame(args) => {
                self.evaluate_on_call_frame(&args).map(CommandOutput::Evaluation)
            }
            Command::SetVariableValue(args) => self.set_variable_value(&args).map(empty),
            Command::RestartFrame(args) => self.restart_frame(&args.call_frame_id),
            Command::GetScriptSource(args) => self
                .get_script_source(&args.script_id)
                .map(|script_source| CommandOutput::ScriptSource { script_source }),
            Command::SetScriptSource(args) => self.set_script_source(args),
            Command::CompileScript(args) => self.compile_script(&args),
            Command::RunScript(args) => self.run_script(&args).map(CommandOutput::Evaluation),
            Command::SetAsyncCallStackDepth(args) => {
                self.set_async_call_stack_depth(args.max_depth);
                Ok(CommandOutput::Empty)
            }
            Command::SetAsyncOperationBreakpoint(args) => self
                .set_async_operation_breakpoint(args.operation_id)
                .map(empty),
            Command::RemoveAsyncOperationBreakpoint(args) => self
                .remove_async_operation_breakpoint(args.operation_id)
                .map(empty),
            Command::FlushAsyncOperationEvents => {
                self.flush_async_operation_events();
                Ok(CommandOutput::Empty)
            }
            Command::SkipStackFrames(args) => self
                .skip_stack_frames(args.script.as_deref(), args.skip_content_scripts.unwrap_or(false))
                .map(empty),
        }
    }

    fn check_enabled(&self) -> InspectorResult<()> {
        if self.enabled {
            Ok(())
        } else {
            Err(InspectorError::NotEnabled)
        }
    }

    fn assert_paused(&self) -> InspectorResult<()> {
        if self.state.is_paused() {
            Ok(())
        } else {
            Err(InspectorError::NotPaused)
        }
    }

    /// Enables or disables every breakpoint at once.
    pub fn set_breakpoints_active(&mut self, active: bool) -> InspectorResult<()> {
        self.check_enabled()?;
        self.breakpoints_active = active;
        self.bridge.set_breakpoints_active(active);
        Ok(())
    }

    /// While set, no debug event ever pauses.
    pub fn set_skip_all_pauses(&mut self, skipped: bool) {
        self.state.skip_all_pauses = skipped;
    }

    /// Sets a breakpoint on every current and future script matching a URL or URL regex.
    pub fn set_breakpoint_by_url(
        &mut self,
        args: SetBreakpointByUrlArguments,
    ) -> InspectorResult<(BreakpointId, Vec<Location>)> {
        let (url, is_regex) = match (args.url, args.url_regex) {
            (Some(url), None) => (url, false),
            (None, Some(pattern)) => (pattern, true),
            _ => {
                return Err(InspectorError::InvalidArguments(
                    "Either url or urlRegex must be specified.".to_owned(),
                ));
            }
        };
        let column_number = match args.column_number {
            Some(column) => {
                u32::try_from(column).map_err(|_| InspectorError::InvalidColumn(column))?
            }
            None => 0,
        };
        let cookie = BreakpointCookie {
            url,
            line_number: args.line_number,
            column_number,
            condition: args.condition.unwrap_or_default(),
            is_regex,
        };
        self.breakpoints
            .set_breakpoint_by_url(&mut self.bridge, &self.scripts, cookie)
    }

    /// Sets a user breakpoint on a script location.
    pub fn set_breakpoint(
        &mut self,
        location: &Location,
        condition: String,
    ) -> InspectorResult<(BreakpointId, Location)> {
        self.set_breakpoint_at(location, condition, BreakpointSource::User)
    }

    /// Sets a breakpoint on behalf of `source`, e.g. the `debug(fn)` console helper.
    pub fn set_breakpoint_at(
        &mut self,
        location: &Location,
        condition: String,
        source: BreakpointSource,
    ) -> InspectorResult<(BreakpointId, Location)> {
        self.breakpoints
            .set_breakpoint(&mut self.bridge, &self.scripts, location, condition, source)
    }

    /// Removes a breakpoint; unknown ids are ignored.
    pub fn remove_breakpoint(&mut self, breakpoint_id: &BreakpointId) {
        self.breakpoints.remove_breakpoint(&mut self.bridge, breakpoint_id);
    }

    /// Removes a breakpoint previously set with [`set_breakpoint_at`](Self::set_breakpoint_at).
    pub fn remove_breakpoint_at(&mut self, location: &Location, source: BreakpointSource) {
        let id = BreakpointId::for_location(
            &location.script_id,
            location.line_number,
            location.column_number,
            source,
        );
        self.remove_breakpoint(&id);
    }

    /// Resumes until `location` is reached, using a one-shot native breakpoint.
    pub fn continue_to_location(
        &mut self,
        location: &Location,
        interstatement: bool,
    ) -> InspectorResult<()> {
        self.assert_paused()?;
        if let Some(previous) = self.continue_to_location.take() {
            self.bridge.remove_breakpoint(&previous);
        }
        let breakpoint = ScriptBreakpoint {
            line_number: location.line_number,
            column_number: location.column_number,
            condition: String::new(),
        };
        self.continue_to_location = self
            .bridge
            .set_breakpoint(&location.script_id, &breakpoint, interstatement)
            .map(|native| native.id);
        self.resume()
    }

    /// Requests a pause at the next statement. Idempotent.
    pub fn pause(&mut self) -> InspectorResult<()> {
        self.check_enabled()?;
        if self.state.javascript_pause_scheduled || self.state.is_paused() {
            return Ok(());
        }
        debug!("pause scheduled by the front end");
        self.state.break_reason = BreakReason::Other;
        self.state.javascript_pause_scheduled = true;
        self.state.scheduled_step = ScheduledStep::NoStep;
        self.state.skipped_step_frame_count = 0;
        self.state.stepping_from_framework = false;
        self.bridge.set_pause_on_next_statement(true);
        Ok(())
    }

    /// Resumes execution without stepping.
    pub fn resume(&mut self) -> InspectorResult<()> {
        self.assert_paused()?;
        self.state.scheduled_step = ScheduledStep::NoStep;
        self.state.stepping_from_framework = false;
        self.tracker.disarm_step_into_async();
        self.bridge.release_object_group(BACKTRACE_OBJECT_GROUP);
        self.bridge.continue_program();
        self.leave_pause();
        Ok(())
    }

    /// Steps over the current statement. At a return position this is a step into.
    pub fn step_over(&mut self) -> InspectorResult<()> {
        self.assert_paused()?;
        if self.top_paused_frame_is_at_return() {
            return self.step_into();
        }
        self.state.scheduled_step = ScheduledStep::StepOver;
        self.state.stepping_from_framework = self.is_top_paused_frame_blackboxed();
        self.tracker.disarm_step_into_async();
        self.bridge.release_object_group(BACKTRACE_OBJECT_GROUP);
        self.bridge.step_over();
        self.leave_pause();
        Ok(())
    }

    /// Resumes, stopping at the next statement.
    pub fn step_into(&mut self) -> InspectorResult<()> {
        self.assert_paused()?;
        self.tracker.disarm_step_into_async();
        self.schedule_step_into();
        Ok(())
    }

    /// Resumes, stopping once the current function returned.
    pub fn step_out(&mut self) -> InspectorResult<()> {
        self.assert_paused()?;
        self.state.scheduled_step = ScheduledStep::StepOut;
        self.state.skip_next_step_out = false;
        self.state.recursion_level_for_step_out = 1;
        self.state.stepping_from_framework = self.is_top_paused_frame_blackboxed();
        self.tracker.disarm_step_into_async();
        self.bridge.release_object_group(BACKTRACE_OBJECT_GROUP);
        self.bridge.step_out();
        self.leave_pause();
        Ok(())
    }

    /// Steps into the callback of the next async operation scheduled from here.
    pub fn step_into_async(&mut self) -> InspectorResult<()> {
        self.assert_paused()?;
        if !self.tracker.is_enabled() {
            return Err(InspectorError::AsyncTrackingDisabled);
        }
        self.tracker.clear_step_into_async();
        self.tracker.arm_step_into_async();
        self.schedule_step_into();
        Ok(())
    }

    fn schedule_step_into(&mut self) {
        self.state.scheduled_step = ScheduledStep::StepInto;
        self.state.stepping_from_framework = self.is_top_paused_frame_blackboxed();
        self.bridge.release_object_group(BACKTRACE_OBJECT_GROUP);
        self.bridge.step_into();
        self.leave_pause();
    }

    /// Sets the pause-on-exceptions mode: `none`, `all` or `uncaught`.
    pub fn set_pause_on_exceptions(&mut self, mode: &str) -> InspectorResult<()> {
        let mode: PauseOnExceptionsState = mode.parse()?;
        self.set_pause_on_exceptions_mode(mode);
        Ok(())
    }

    pub(crate) fn set_pause_on_exceptions_mode(&mut self, mode: PauseOnExceptionsState) {
        debug!("pause on exceptions: {mode:?}");
        self.pause_on_exceptions = mode;
        self.bridge.set_pause_on_exceptions(mode);
    }

    /// The paused call frames and async stack trace.
    pub fn get_backtrace(&mut self) -> InspectorResult<CommandOutput> {
        let session = self.state.paused.as_ref().ok_or(InspectorError::NotPaused)?;
        let call_frames = wrap_call_frames(&mut self.bridge, &session.frames, session.epoch);
        Ok(CommandOutput::Backtrace {
            call_frames,
            async_stack_trace: self.tracker.current_async_stack_trace(),
        })
    }

    /// Evaluates an expression in a paused frame. Exceptions thrown by the expression are
    /// reported in the result, not as an error.
    pub fn evaluate_on_call_frame(
        &mut self,
        args: &EvaluateOnCallFrameArguments,
    ) -> InspectorResult<EvaluationResult> {
        let ordinal = self.resolve_call_frame(&args.call_frame_id)?;
        let completion = self.with_exceptions_muted(args.do_not_pause_on_exceptions_and_mute_console, |bridge| {
            bridge.evaluate_on_frame(ordinal, &args.expression)
        });
        Ok(self.wrap_completion(
            completion,
            args.object_group.as_deref().unwrap_or_default(),
            args.return_by_value,
        ))
    }

    /// Changes a variable in a paused frame's scope or a function's closure.
    pub fn set_variable_value(&mut self, args: &SetVariableValueArguments) -> InspectorResult<()> {
        let target = match (&args.call_frame_id, &args.function_object_id) {
            (Some(call_frame_id), _) => VariableTarget::CallFrame(self.resolve_call_frame(call_frame_id)?),
            (None, Some(object_id)) => VariableTarget::Function(object_id.clone()),
            (None, None) => {
                return Err(InspectorError::UnresolvedTarget(
                    "Either call frame or function object must be specified".to_owned(),
                ));
            }
        };
        self.bridge
            .set_variable_value(&target, args.scope_number, &args.variable_name, &args.new_value)
            .map_err(InspectorError::UnresolvedTarget)
    }

    /// Restarts a paused frame and returns the refreshed stack.
    pub fn restart_frame(&mut self, call_frame_id: &str) -> InspectorResult<CommandOutput> {
        let ordinal = self.resolve_call_frame(call_frame_id)?;
        self.bridge
            .restart_frame(ordinal)
            .map_err(InspectorError::ScriptExecutionFailure)?;
        self.refresh_paused_frames();
        self.get_backtrace()
    }

    /// The current, possibly edited, source of a script.
    pub fn get_script_source(&self, script_id: &ScriptId) -> InspectorResult<String> {
        self.scripts
            .find(script_id)
            .map(|script| script.source().to_owned())
            .ok_or_else(|| InspectorError::UnknownScript(script_id.clone()))
    }

    /// Replaces a script's source. When paused, returns the refreshed stack.
    pub fn set_script_source(&mut self, args: SetScriptSourceArguments) -> InspectorResult<CommandOutput> {
        if self.scripts.find(&args.script_id).is_none() {
            return Err(InspectorError::UnknownScript(args.script_id));
        }
        self.bridge
            .set_script_source(&args.script_id, &args.script_source, args.preview)
            .map_err(|details| InspectorError::ScriptCompileFailure(details.text))?;
        if !args.preview
            && let Some(script) = self.scripts.find_mut(&args.script_id)
        {
            script.set_edited_source(args.script_source);
        }
        if self.state.is_paused() {
            self.refresh_paused_frames();
            return self.get_backtrace();
        }
        Ok(CommandOutput::Empty)
    }

    /// Compiles an expression, optionally keeping it for [`run_script`](Self::run_script).
    pub fn compile_script(&mut self, args: &CompileScriptArguments) -> InspectorResult<CommandOutput> {
        self.check_enabled()?;
        let outcome = self
            .bridge
            .compile_script(&args.expression, &args.source_url, args.persist_script)
            .map_err(InspectorError::ScriptCompileFailure)?;
        Ok(match outcome {
            CompileOutcome::Compiled(script_id) => {
                if let Some(script_id) = &script_id {
                    self.compiled_scripts.insert(script_id.clone());
                }
                CommandOutput::CompiledScript {
                    script_id,
                    exception_details: None,
                }
            }
            CompileOutcome::SyntaxError(details) => CommandOutput::CompiledScript {
                script_id: None,
                exception_details: Some(details),
            },
        })
    }

    /// Runs a script kept by `compile_script`. Each compiled script runs at most once.
    pub fn run_script(&mut self, args: &RunScriptArguments) -> InspectorResult<EvaluationResult> {
        self.check_enabled()?;
        if !self.compiled_scripts.remove(&args.script_id) {
            return Err(InspectorError::ScriptExecutionFailure(format!(
                "No compiled script with id {}",
                args.script_id
            )));
        }
        let completion = self
            .with_exceptions_muted(args.do_not_pause_on_exceptions_and_mute_console, |bridge| {
                bridge.run_script(&args.script_id)
            })
            .map_err(InspectorError::ScriptExecutionFailure)?;
        Ok(self.wrap_completion(
            completion,
            args.object_group.as_deref().unwrap_or_default(),
            args.return_by_value,
        ))
    }

    /// Sets the async chain cap; non-positive depths disable tracking.
    pub fn set_async_call_stack_depth(&mut self, depth: i64) {
        self.tracker.set_max_depth(usize::try_from(depth).unwrap_or(0));
    }

    /// Pauses when a callback of `operation_id` starts.
    pub fn set_async_operation_breakpoint(&mut self, operation_id: u32) -> InspectorResult<()> {
        self.tracker.set_operation_breakpoint(operation_id)
    }

    /// Removes the breakpoint set on `operation_id`.
    pub fn remove_async_operation_breakpoint(&mut self, operation_id: u32) -> InspectorResult<()> {
        self.tracker.remove_operation_breakpoint(operation_id)
    }

    /// Sets the blackbox rules used by stepping and exception pauses.
    pub fn skip_stack_frames(
        &mut self,
        pattern: Option<&str>,
        skip_content_scripts: bool,
    ) -> InspectorResult<()> {
        let blackbox = self.scripts.blackbox_mut();
        blackbox.set_pattern(pattern)?;
        blackbox.set_skip_content_scripts(skip_content_scripts);
        Ok(())
    }

    fn resolve_call_frame(&self, call_frame_id: &str) -> InspectorResult<usize> {
        let session = self.state.paused.as_ref().ok_or(InspectorError::NotPaused)?;
        CallFrameId::resolve(call_frame_id, session.epoch, session.frames.len())
    }

    fn refresh_paused_frames(&mut self) {
        let frames = self.bridge.current_call_frames(self.config.backtrace_frame_limit);
        if let Some(session) = self.state.paused.as_mut() {
            session.frames = frames;
        }
    }

    fn with_exceptions_muted<T>(&mut self, mute: bool, run: impl FnOnce(&mut B) -> T) -> T {
        if !mute {
            return run(&mut self.bridge);
        }
        let previous = self.bridge.pause_on_exceptions();
        self.bridge.set_pause_on_exceptions(PauseOnExceptionsState::None);
        let result = run(&mut self.bridge);
        self.bridge.set_pause_on_exceptions(previous);
        result
    }

    fn wrap_completion(
        &mut self,
        completion: Completion<B::Value>,
        object_group: &str,
        return_by_value: bool,
    ) -> EvaluationResult {
        match completion {
            Completion::Value(value) => EvaluationResult {
                result: self.bridge.wrap(&value, object_group, return_by_value),
                was_thrown: false,
                exception_details: None,
            },
            Completion::Threw { exception, details } => EvaluationResult {
                result: self.bridge.wrap(&exception, object_group, return_by_value),
                was_thrown: true,
                exception_details: Some(details),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("pause", None, Command::Pause ; "unit command")]
    #[test_case(
        "setBreakpointsActive",
        Some(json!({ "active": false })),
        Command::SetBreakpointsActive(SetBreakpointsActiveArguments { active: false })
        ; "with arguments"
    )]
    #[test_case(
        "setBreakpointByUrl",
        Some(json!({ "lineNumber": 10, "url": "s1.js" })),
        Command::SetBreakpointByUrl(SetBreakpointByUrlArguments {
            line_number: 10,
            url: Some("s1.js".to_owned()),
            ..SetBreakpointByUrlArguments::default()
        })
        ; "optional arguments"
    )]
    fn parses_commands(name: &str, args: Option<Value>, expected: Command) {
        assert_eq!(Command::parse(name, args), Ok(expected));
    }

    #[test]
    fn rejects_unknown_commands_and_bad_arguments() {
        assert_eq!(
            Command::parse("explode", None),
            Err(InspectorError::UnknownCommand("explode".to_owned()))
        );
        assert!(matches!(
            Command::parse("setBreakpointsActive", Some(json!({ "active": "yes" }))),
            Err(InspectorError::InvalidArguments(_))
        ));
    }

    #[test]
    fn empty_output_serializes_to_null() {
        assert_eq!(serde_json::to_value(CommandOutput::Empty).unwrap(), Value::Null);
        assert_eq!(
            serde_json::to_value(CommandOutput::ScriptSource {
                script_source: "x".to_owned()
            })
            .unwrap(),
            json!({ "scriptSource": "x" })
        );
    }
}
