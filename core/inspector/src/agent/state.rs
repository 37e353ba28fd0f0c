//! Pause/step state of the debugger agent.

use serde::{Deserialize, Serialize};

use crate::bridge::{RawCallFrame, RemoteObject};

/// Coarse state of the agent, derived from [`PauseState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// The agent is not enabled; engine events are ignored.
    Disabled,
    /// Scripts run freely.
    Running,
    /// A pause was requested but no pause point has been reached yet.
    PauseScheduled,
    /// Suspended in a pause, servicing commands.
    Paused,
}

/// The step the front end asked for, kept until the next pause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScheduledStep {
    /// Plain resume.
    #[default]
    NoStep,
    /// Stop at the next statement, entering calls.
    StepInto,
    /// Stop at the next statement of the current frame or its callers.
    StepOver,
    /// Stop once the current frame returned.
    StepOut,
}

/// What to do with a debug event instead of (or before) pausing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipPauseRequest {
    /// Pause normally.
    NoSkip,
    /// Resume without pausing.
    Continue,
    /// Resume, stepping into the next statement.
    StepInto,
    /// Resume, stepping out of the current frame.
    StepOut,
    /// Resume until the frame changes.
    StepFrame,
}

/// Why execution paused. Serialized as `{"reason": ..., "data": ...}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "data", rename_all = "camelCase")]
pub enum BreakReason {
    /// No specific reason, e.g. a breakpoint or a requested pause.
    #[default]
    Other,
    /// An exception is being thrown.
    Exception(RemoteObject),
    /// A promise was rejected without a handler.
    PromiseRejection(RemoteObject),
    /// A callback of an async operation with a breakpoint started.
    #[serde(rename_all = "camelCase")]
    AsyncOperation {
        /// The operation whose callback runs.
        operation_id: u32,
    },
    /// A content security policy was violated.
    CspViolation {
        /// The violated directive.
        directive: String,
    },
    /// A function passed to `debug()` was called.
    DebugCommand,
    /// An XHR breakpoint matched.
    #[serde(rename = "XHR")]
    Xhr {
        /// The request URL.
        url: String,
    },
    /// An event listener breakpoint matched.
    #[serde(rename_all = "camelCase")]
    EventListener {
        /// Name of the dispatched event.
        event_name: String,
    },
    /// A `console.assert` failed.
    Assert,
}

/// Everything captured while the engine is suspended.
#[derive(Debug)]
pub(crate) struct PausedSession<V> {
    /// Bumped on every pause; frame ids carry it so stale ids are detected.
    pub(crate) epoch: u32,
    pub(crate) frames: Vec<RawCallFrame<V>>,
}

/// The mutable pause bookkeeping owned by the agent.
#[derive(Debug)]
pub(crate) struct PauseState<V> {
    pub(crate) paused: Option<PausedSession<V>>,
    pub(crate) epoch: u32,
    pub(crate) break_reason: BreakReason,
    pub(crate) scheduled_step: ScheduledStep,
    pub(crate) javascript_pause_scheduled: bool,
    pub(crate) pausing_on_native_event: bool,
    pub(crate) stepping_from_framework: bool,
    pub(crate) skip_next_step_out: bool,
    pub(crate) recursion_level_for_step_out: usize,
    pub(crate) recursion_level_for_step_frame: usize,
    pub(crate) skipped_step_frame_count: usize,
    pub(crate) skip_all_pauses: bool,
    pub(crate) pausing_async_operation: Option<u32>,
}

impl<V> Default for PauseState<V> {
    fn default() -> Self {
        Self {
            paused: None,
            epoch: 0,
            break_reason: BreakReason::Other,
            scheduled_step: ScheduledStep::NoStep,
            javascript_pause_scheduled: false,
            pausing_on_native_event: false,
            stepping_from_framework: false,
            skip_next_step_out: false,
            recursion_level_for_step_out: 0,
            recursion_level_for_step_frame: 0,
            skipped_step_frame_count: 0,
            skip_all_pauses: false,
            pausing_async_operation: None,
        }
    }
}

impl<V> PauseState<V> {
    pub(crate) fn is_paused(&self) -> bool {
        self.paused.is_some()
    }

    pub(crate) fn execution_state(&self, enabled: bool) -> ExecutionState {
        if !enabled {
            ExecutionState::Disabled
        } else if self.is_paused() {
            ExecutionState::Paused
        } else if self.javascript_pause_scheduled || self.pausing_on_native_event {
            ExecutionState::PauseScheduled
        } else {
            ExecutionState::Running
        }
    }

    /// Forgets every stepping intent, as done once a pause materialized.
    pub(crate) fn clear_stepping_intent(&mut self) {
        self.scheduled_step = ScheduledStep::NoStep;
        self.javascript_pause_scheduled = false;
        self.stepping_from_framework = false;
        self.pausing_on_native_event = false;
        self.skipped_step_frame_count = 0;
        self.recursion_level_for_step_frame = 0;
        self.pausing_async_operation = None;
        self.break_reason = BreakReason::Other;
    }

    /// Back to a freshly enabled agent, keeping nothing.
    pub(crate) fn reset(&mut self) {
        let epoch = self.epoch;
        *self = Self::default();
        self.epoch = epoch;
    }
}
