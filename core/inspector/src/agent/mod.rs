//! The debugger agent.
//!
//! [`DebuggerAgent`] sits between a front end and an engine. It turns front-end commands
//! into engine calls, turns engine debug events into pauses and notifications, and
//! keeps breakpoints, scripts and async call chains consistent across both.
//!
//! The agent is single-threaded. The host forwards engine events through
//! [`DebuggerAgent::handle_debug_event`]; a pause blocks inside that call while commands
//! are answered, and the engine resumes once it returns.

mod commands;
mod frames;
mod pause;
mod state;

pub use self::{
    commands::{
        AsyncOperationArguments, CallFrameArguments, Command, CommandOutput,
        CompileScriptArguments, ContinueToLocationArguments, EvaluateOnCallFrameArguments,
        EvaluationResult, RemoveBreakpointArguments, RunScriptArguments, ScriptArguments,
        SetAsyncCallStackDepthArguments, SetBreakpointArguments, SetBreakpointByUrlArguments,
        SetBreakpointsActiveArguments, SetPauseOnExceptionsArguments, SetScriptSourceArguments,
        SetSkipAllPausesArguments, SetVariableValueArguments, SkipStackFramesArguments,
    },
    frames::{BACKTRACE_OBJECT_GROUP, CallFrame, CallFrameId, Scope},
    state::{BreakReason, ExecutionState, ScheduledStep, SkipPauseRequest},
};

use indexmap::IndexMap;
use log::{debug, info, trace, warn};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use self::state::PauseState;
use crate::{
    async_chain::{AsyncCallChainTracker, ReentryPredicate},
    breakpoint::{BreakpointCookie, BreakpointId, BreakpointStore, NativeBreakpointId},
    bridge::{DebugEvent, EngineDebugBridge, PauseOnExceptionsState},
    config::InspectorConfig,
    error::InspectorResult,
    frontend::{Frontend, InspectorEvent, ScriptParsedEvent},
    script::{ParsedScript, ScriptId, ScriptRegistry, find_source_map_url, find_source_url},
};

/// Everything needed to bring a fresh agent back to where a previous one was, e.g. after
/// the front end reconnects or the page navigates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentStateCookie {
    /// Whether the agent was enabled.
    pub enabled: bool,
    /// URL breakpoints, in the order they were set.
    pub breakpoints: IndexMap<BreakpointId, BreakpointCookie>,
    /// Pause-on-exceptions mode.
    pub pause_on_exceptions: PauseOnExceptionsState,
    /// Whether every pause is skipped.
    pub skip_all_pauses: bool,
    /// Maximum async chain depth; `0` disables tracking.
    pub async_call_stack_depth: usize,
    /// Blackbox pattern, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blackbox_pattern: Option<String>,
    /// Whether content scripts are blackboxed.
    pub skip_content_scripts: bool,
}

/// The script debugger core.
#[derive(Debug)]
pub struct DebuggerAgent<B: EngineDebugBridge, F: Frontend> {
    bridge: B,
    frontend: F,
    config: InspectorConfig,
    enabled: bool,
    breakpoints_active: bool,
    scripts: ScriptRegistry,
    breakpoints: BreakpointStore,
    tracker: AsyncCallChainTracker,
    state: PauseState<B::Value>,
    pause_on_exceptions: PauseOnExceptionsState,
    continue_to_location: Option<NativeBreakpointId>,
    compiled_scripts: FxHashSet<ScriptId>,
}

impl<B, F> DebuggerAgent<B, F>
where
    B: EngineDebugBridge,
    F: Frontend,
{
    /// Creates a disabled agent.
    ///
    /// # Errors
    ///
    /// Fails with [`InvalidPattern`](crate::InspectorError::InvalidPattern) when the
    /// configured skip pattern is not a valid regex.
    pub fn new(bridge: B, frontend: F, config: InspectorConfig) -> InspectorResult<Self> {
        let mut scripts = ScriptRegistry::new();
        scripts
            .blackbox_mut()
            .set_pattern(config.skip_stack_pattern.as_deref())?;
        scripts
            .blackbox_mut()
            .set_skip_content_scripts(config.skip_content_scripts);
        Ok(Self {
            tracker: AsyncCallChainTracker::new(&config),
            bridge,
            frontend,
            config,
            enabled: false,
            breakpoints_active: true,
            scripts,
            breakpoints: BreakpointStore::new(),
            state: PauseState::default(),
            pause_on_exceptions: PauseOnExceptionsState::None,
            continue_to_location: None,
            compiled_scripts: FxHashSet::default(),
        })
    }

    /// The engine the agent debugs.
    #[must_use]
    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    /// Direct engine access for the host, e.g. to drive execution.
    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }

    /// The connected front end.
    #[must_use]
    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    /// Mutable access to the front end.
    pub fn frontend_mut(&mut self) -> &mut F {
        &mut self.frontend
    }

    /// Settings the agent was created with.
    #[must_use]
    pub fn config(&self) -> &InspectorConfig {
        &self.config
    }

    /// Scripts known to the agent.
    #[must_use]
    pub fn scripts(&self) -> &ScriptRegistry {
        &self.scripts
    }

    /// Protocol breakpoints and their native counterparts.
    #[must_use]
    pub fn breakpoints(&self) -> &BreakpointStore {
        &self.breakpoints
    }

    /// The async call chain tracker.
    #[must_use]
    pub fn tracker(&self) -> &AsyncCallChainTracker {
        &self.tracker
    }

    /// Drops the agent, handing back its front end.
    pub fn into_frontend(self) -> F {
        self.frontend
    }

    /// Whether [`enable`](Self::enable) was called since the last disable.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the engine is suspended in a pause.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    /// Coarse state for hosts and logging.
    #[must_use]
    pub fn execution_state(&self) -> ExecutionState {
        self.state.execution_state(self.enabled)
    }

    /// The pause-on-exceptions mode last requested.
    #[must_use]
    pub fn pause_on_exceptions(&self) -> PauseOnExceptionsState {
        self.pause_on_exceptions
    }

    /// Starts debugging: replays already compiled scripts and activates breakpoints.
    pub fn enable(&mut self) {
        if self.enabled {
            return;
        }
        info!("debugger agent enabled");
        self.enabled = true;
        self.breakpoints_active = true;
        self.bridge.set_breakpoints_active(true);
        for script in self.bridge.compiled_scripts() {
            self.did_parse_source(script, true);
        }
    }

    /// Stops debugging and forgets every breakpoint, mode and async chain.
    pub fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        info!("debugger agent disabled");
        if self.state.is_paused() {
            self.bridge.release_object_group(BACKTRACE_OBJECT_GROUP);
            self.bridge.continue_program();
            self.leave_pause();
        }
        self.enabled = false;
        self.bridge.clear_breakpoints();
        self.bridge.clear_stepping();
        self.bridge.set_pause_on_next_statement(false);
        self.set_pause_on_exceptions_mode(PauseOnExceptionsState::None);
        self.breakpoints.clear();
        self.scripts.clear();
        self.scripts.blackbox_mut().set_skip_content_scripts(false);
        if let Err(err) = self.scripts.blackbox_mut().set_pattern(None) {
            warn!("could not clear the skip pattern: {err}");
        }
        self.tracker.set_max_depth(0);
        self.state.reset();
        self.continue_to_location = None;
        self.compiled_scripts.clear();
    }

    /// Forgets everything tied to the current global object. URL breakpoints survive and
    /// re-resolve as scripts of the new global are parsed.
    pub fn reset(&mut self) {
        if !self.enabled {
            return;
        }
        debug!("global object cleared");
        self.state.scheduled_step = ScheduledStep::NoStep;
        self.scripts.clear();
        self.breakpoints.clear_resolved();
        self.bridge.clear_breakpoints();
        self.continue_to_location = None;
        self.compiled_scripts.clear();
        self.tracker.reset();
        self.frontend.notify(InspectorEvent::GlobalObjectCleared);
    }

    /// Snapshot of the settings that survive a reconnect.
    #[must_use]
    pub fn state_cookie(&self) -> AgentStateCookie {
        AgentStateCookie {
            enabled: self.enabled,
            breakpoints: self.breakpoints.cookies().clone(),
            pause_on_exceptions: self.pause_on_exceptions,
            skip_all_pauses: self.state.skip_all_pauses,
            async_call_stack_depth: self.tracker.max_depth(),
            blackbox_pattern: self.scripts.blackbox().pattern().map(str::to_owned),
            skip_content_scripts: self.scripts.blackbox().skip_content_scripts(),
        }
    }

    /// Re-applies a snapshot taken by [`state_cookie`](Self::state_cookie). Only applies to
    /// a disabled agent and only when the snapshot was taken while enabled.
    ///
    /// # Errors
    ///
    /// Fails with [`InvalidPattern`](crate::InspectorError::InvalidPattern) on a bad
    /// blackbox pattern, leaving the agent untouched.
    pub fn restore(&mut self, cookie: AgentStateCookie) -> InspectorResult<()> {
        if self.enabled || !cookie.enabled {
            return Ok(());
        }
        self.scripts
            .blackbox_mut()
            .set_pattern(cookie.blackbox_pattern.as_deref())?;
        self.scripts
            .blackbox_mut()
            .set_skip_content_scripts(cookie.skip_content_scripts);
        self.breakpoints.restore_cookies(cookie.breakpoints);
        self.enable();
        self.set_pause_on_exceptions_mode(cookie.pause_on_exceptions);
        self.state.skip_all_pauses = cookie.skip_all_pauses;
        self.tracker.set_max_depth(cookie.async_call_stack_depth);
        Ok(())
    }

    /// Entry point for everything the engine reports.
    pub fn handle_debug_event(&mut self, event: DebugEvent<B::Value>) {
        if !self.enabled {
            trace!("ignoring {event:?} while disabled");
            return;
        }
        match event {
            DebugEvent::ScriptParsed(script) => self.did_parse_source(script, true),
            DebugEvent::ScriptFailedToParse(script) => self.did_parse_source(script, false),
            DebugEvent::AsyncTask(task) => {
                for signal in self.tracker.handle_task_event(&self.bridge, &task) {
                    self.apply_tracker_signal(signal);
                }
            }
            DebugEvent::BreakpointHit(hit) => self.handle_program_break(&hit, None),
            DebugEvent::Break => self.handle_program_break(&[], None),
            DebugEvent::Exception {
                value,
                is_promise_rejection,
            } => self.handle_program_break(&[], Some((value, is_promise_rejection))),
        }
    }

    fn did_parse_source(&mut self, mut parsed: ParsedScript, success: bool) {
        if parsed.source_map_url.is_none() {
            parsed.source_map_url = find_source_map_url(&parsed.source).map(str::to_owned);
        }
        if let Some(source_url) = find_source_url(&parsed.source) {
            parsed.url = source_url.to_owned();
            parsed.has_source_url = true;
        }
        let event = ScriptParsedEvent::from(&parsed);
        if !success {
            self.frontend
                .notify(InspectorEvent::ScriptFailedToParse(event));
            return;
        }
        self.scripts.register(&parsed);
        self.frontend.notify(InspectorEvent::ScriptParsed(event));
        if parsed.url.is_empty() {
            return;
        }
        let resolved = self.breakpoints.resolve_cookies_for_script(
            &mut self.bridge,
            &self.scripts,
            &parsed.script_id,
        );
        for (breakpoint_id, location) in resolved {
            self.frontend.notify(InspectorEvent::BreakpointResolved {
                breakpoint_id,
                location,
            });
        }
    }

    /// Host hook: a script is about to be evaluated.
    pub fn will_execute_script(&mut self) {
        self.will_enter_script();
    }

    /// Host hook: a script evaluation returned.
    pub fn did_execute_script(&mut self) {
        self.did_leave_script();
    }

    /// Host hook: a function is about to be called from native code.
    pub fn will_call_function(&mut self) {
        self.will_enter_script();
    }

    /// Host hook: a function called from native code returned.
    pub fn did_call_function(&mut self) {
        self.did_leave_script();
    }

    fn will_enter_script(&mut self) {
        if !self.enabled {
            return;
        }
        trace!("entering script");
        self.change_recursion_level(1);
        self.schedule_pause_on_next_statement_if_stepping_into();
    }

    fn did_leave_script(&mut self) {
        if !self.enabled {
            return;
        }
        trace!("leaving script");
        self.change_recursion_level(-1);
    }

    /// Host hook: deferred work is being scheduled. Returns its operation id, `0` when
    /// async call stacks are not tracked.
    pub fn trace_async_operation_starting(&mut self, description: &str) -> u32 {
        if !self.enabled {
            return 0;
        }
        let (operation_id, signal) = self.tracker.start_operation(&self.bridge, description);
        if let Some(signal) = signal {
            self.apply_tracker_signal(signal);
        }
        operation_id
    }

    /// Replaces the rule deciding whether entering a callback starts a new logical task
    /// and so installs the operation's chain. Hosts whose job loop re-enters at other
    /// recursion levels than a browser's microtask checkpoint plug their own rule here.
    pub fn set_async_reentry_predicate(&mut self, predicate: ReentryPredicate) {
        self.tracker.set_reentry_predicate(predicate);
    }

    /// Host hook: the callback of `operation_id` is about to run.
    pub fn trace_async_callback_starting(&mut self, operation_id: u32) {
        if !self.enabled {
            return;
        }
        let depth = self.bridge.execution_depth();
        for signal in self.tracker.will_run_callback(depth, operation_id) {
            self.apply_tracker_signal(signal);
        }
    }

    /// Host hook: the running callback returned.
    pub fn trace_async_callback_completed(&mut self) {
        if !self.enabled {
            return;
        }
        if let Some(signal) = self.tracker.did_run_callback() {
            self.apply_tracker_signal(signal);
        }
    }

    /// Host hook: `operation_id` will never run again.
    pub fn trace_async_operation_completed(&mut self, operation_id: u32) {
        if !self.enabled {
            return;
        }
        if let Some(signal) = self.tracker.complete_operation(operation_id) {
            self.apply_tracker_signal(signal);
        }
    }
}
