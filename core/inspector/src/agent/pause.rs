//! Deciding whether a debug event pauses, and servicing the pause when it does.
//!
//! A debug event first goes through the skip policy. Skip-all wins over everything, a
//! breakpoint hit always pauses, exceptions are skipped in blackboxed code, and pending
//! steps that land in blackboxed code are turned into a frame step (bounded by
//! `max_skipped_step_frames`, after which the agent steps out instead). Only when the
//! policy says [`SkipPauseRequest::NoSkip`] are frames captured and the front end told.
//!
//! Once paused, the agent runs a nested loop answering front-end commands until one of
//! them resumes execution.

use log::{debug, trace, warn};

use super::{
    DebuggerAgent,
    frames::{BACKTRACE_OBJECT_GROUP, wrap_call_frames},
    state::{BreakReason, PausedSession, ScheduledStep, SkipPauseRequest},
};
use crate::{
    async_chain::TrackerSignal,
    breakpoint::{BreakpointId, BreakpointSource, NativeBreakpointId},
    bridge::EngineDebugBridge,
    frontend::{Frontend, InspectorEvent, PausedEvent},
};

impl<B, F> DebuggerAgent<B, F>
where
    B: EngineDebugBridge,
    F: Frontend,
{
    /// Handles a break, breakpoint hit or exception reported by the engine.
    pub(crate) fn handle_program_break(
        &mut self,
        hit: &[NativeBreakpointId],
        exception: Option<(B::Value, bool)>,
    ) {
        if self.state.is_paused() {
            warn!("engine reported a break while already paused, ignoring it");
            return;
        }
        match self.did_pause(hit, exception) {
            SkipPauseRequest::NoSkip => self.run_nested_loop(),
            SkipPauseRequest::Continue => self.bridge.continue_program(),
            SkipPauseRequest::StepInto => self.bridge.step_into(),
            SkipPauseRequest::StepOut => self.bridge.step_out(),
            SkipPauseRequest::StepFrame => self.bridge.step_frame(),
        }
    }

    fn did_pause(
        &mut self,
        hit: &[NativeBreakpointId],
        exception: Option<(B::Value, bool)>,
    ) -> SkipPauseRequest {
        let mut hit_breakpoint_ids: Vec<BreakpointId> = Vec::new();
        let mut from_debug_command = false;
        for native in hit {
            if let Some((id, source)) = self.breakpoints.lookup_hit(native) {
                hit_breakpoint_ids.push(id.clone());
                from_debug_command |= *source == BreakpointSource::DebugCommand;
            }
        }
        trace!("break with hit breakpoints {hit_breakpoint_ids:?}");

        let request = if self.state.skip_all_pauses {
            SkipPauseRequest::Continue
        } else if !hit.is_empty() {
            SkipPauseRequest::NoSkip
        } else if exception.is_some() {
            self.should_skip_exception_pause()
        } else if self.state.scheduled_step != ScheduledStep::NoStep
            || self.state.javascript_pause_scheduled
            || self.state.pausing_on_native_event
        {
            self.should_skip_step_pause()
        } else {
            SkipPauseRequest::NoSkip
        };
        self.state.skip_next_step_out = false;
        if request != SkipPauseRequest::NoSkip {
            debug!("not pausing: {request:?}");
            return request;
        }

        let frames = self
            .bridge
            .current_call_frames(self.config.backtrace_frame_limit);
        if frames.is_empty() {
            debug!("not pausing outside of script");
            return SkipPauseRequest::Continue;
        }
        self.state.epoch = self.state.epoch.wrapping_add(1);
        let epoch = self.state.epoch;

        if let Some((value, is_promise_rejection)) = exception {
            let object = self.bridge.wrap(&value, BACKTRACE_OBJECT_GROUP, false);
            self.state.break_reason = if is_promise_rejection {
                BreakReason::PromiseRejection(object)
            } else {
                BreakReason::Exception(object)
            };
        } else if let Some(operation_id) = self.state.pausing_async_operation {
            self.state.break_reason = BreakReason::AsyncOperation { operation_id };
        }
        if from_debug_command && self.state.break_reason == BreakReason::Other {
            self.state.break_reason = BreakReason::DebugCommand;
        }

        self.flush_async_operation_events();
        let call_frames = wrap_call_frames(&mut self.bridge, &frames, epoch);
        let reason = std::mem::take(&mut self.state.break_reason);
        self.state.paused = Some(PausedSession { epoch, frames });
        debug!("paused ({reason:?}) with {} frames", call_frames.len());
        self.frontend.notify(InspectorEvent::Paused(PausedEvent {
            call_frames,
            reason,
            hit_breakpoint_ids,
            async_stack_trace: self.tracker.current_async_stack_trace(),
        }));

        self.state.clear_stepping_intent();
        self.tracker.clear_step_into_async();
        if let Some(native) = self.continue_to_location.take() {
            self.bridge.remove_breakpoint(&native);
        }
        SkipPauseRequest::NoSkip
    }

    fn should_skip_exception_pause(&mut self) -> SkipPauseRequest {
        if self.state.stepping_from_framework {
            return SkipPauseRequest::NoSkip;
        }
        if self.is_top_frame_blackboxed() {
            return SkipPauseRequest::Continue;
        }
        SkipPauseRequest::NoSkip
    }

    fn should_skip_step_pause(&mut self) -> SkipPauseRequest {
        if self.state.stepping_from_framework {
            return SkipPauseRequest::NoSkip;
        }
        if self.state.skip_next_step_out {
            self.state.skip_next_step_out = false;
            if self.state.scheduled_step == ScheduledStep::StepOut {
                return SkipPauseRequest::StepOut;
            }
        }
        if !self.is_top_frame_blackboxed() {
            return SkipPauseRequest::NoSkip;
        }
        if self.state.skipped_step_frame_count >= self.config.max_skipped_step_frames {
            return SkipPauseRequest::StepOut;
        }
        if self.state.skipped_step_frame_count == 0 {
            self.state.recursion_level_for_step_frame = 1;
        }
        self.state.skipped_step_frame_count += 1;
        SkipPauseRequest::StepFrame
    }

    /// The live top frame, as seen by the engine right now.
    fn is_top_frame_blackboxed(&mut self) -> bool {
        match self.bridge.call_frame_at(0) {
            Some(frame) => self.scripts.is_script_blackboxed(&frame.script_id),
            None => true,
        }
    }

    /// The top frame of the current pause.
    pub(crate) fn is_top_paused_frame_blackboxed(&mut self) -> bool {
        let Some(script_id) = self
            .state
            .paused
            .as_ref()
            .and_then(|session| session.frames.first())
            .map(|frame| frame.script_id.clone())
        else {
            return true;
        };
        self.scripts.is_script_blackboxed(&script_id)
    }

    pub(crate) fn top_paused_frame_is_at_return(&self) -> bool {
        self.state
            .paused
            .as_ref()
            .and_then(|session| session.frames.first())
            .is_some_and(|frame| frame.is_at_return)
    }

    fn is_current_call_stack_empty_or_blackboxed(&mut self) -> bool {
        let mut index = 0;
        while let Some(frame) = self.bridge.call_frame_at(index) {
            if !self.scripts.is_script_blackboxed(&frame.script_id) {
                return false;
            }
            index += 1;
        }
        true
    }

    fn run_nested_loop(&mut self) {
        while self.state.is_paused() {
            let Some((token, command)) = self.frontend.wait_for_command() else {
                debug!("front end went away while paused, resuming");
                self.state.scheduled_step = ScheduledStep::NoStep;
                self.bridge.release_object_group(BACKTRACE_OBJECT_GROUP);
                self.bridge.continue_program();
                self.leave_pause();
                break;
            };
            trace!("command while paused: {command:?}");
            let result = self.execute(command);
            self.frontend.respond(token, result);
        }
        self.did_continue();
    }

    pub(crate) fn leave_pause(&mut self) {
        self.state.paused = None;
    }

    fn did_continue(&mut self) {
        self.state.break_reason = BreakReason::Other;
        if self.enabled {
            self.frontend.notify(InspectorEvent::Resumed);
        }
    }

    /// Asks for a pause at the next statement on behalf of the host, e.g. when a DOM or
    /// XHR breakpoint fires. Ignored while stepping into, already pausing or paused.
    pub fn schedule_pause_on_next_statement(&mut self, reason: BreakReason) {
        if !self.enabled
            || self.state.scheduled_step == ScheduledStep::StepInto
            || self.state.javascript_pause_scheduled
            || self.state.is_paused()
            || !self.breakpoints_active
        {
            return;
        }
        debug!("pause on next statement requested: {reason:?}");
        self.state.break_reason = reason;
        self.state.pausing_on_native_event = true;
        self.state.skip_next_step_out = false;
        self.bridge.set_pause_on_next_statement(true);
    }

    /// Withdraws a host pause request that has not been reached yet.
    pub fn cancel_pause_on_next_statement(&mut self) {
        if self.state.javascript_pause_scheduled || self.state.is_paused() {
            return;
        }
        self.state.break_reason = BreakReason::Other;
        self.state.pausing_on_native_event = false;
        self.bridge.set_pause_on_next_statement(false);
    }

    /// Breaks right away on behalf of the host, unless only blackboxed code is running.
    pub fn break_program(&mut self, reason: BreakReason) {
        if !self.enabled
            || self.state.skip_all_pauses
            || self.state.is_paused()
            || !self.breakpoints_active
            || self.is_current_call_stack_empty_or_blackboxed()
        {
            return;
        }
        debug!("breaking program: {reason:?}");
        self.state.break_reason = reason;
        self.state.scheduled_step = ScheduledStep::NoStep;
        self.state.stepping_from_framework = false;
        self.state.pausing_on_native_event = false;
        self.bridge.clear_stepping();
        self.bridge.break_program();
    }

    /// Tracks entry into and exit from script so step-out and frame steps know when the
    /// stepped function returned.
    pub(crate) fn change_recursion_level(&mut self, step: isize) {
        if self.state.javascript_pause_scheduled
            && !self.state.skip_all_pauses
            && !self.state.is_paused()
        {
            self.bridge.set_pause_on_next_statement(true);
        }
        if self.state.scheduled_step == ScheduledStep::StepOut {
            self.state.recursion_level_for_step_out = self
                .state
                .recursion_level_for_step_out
                .saturating_add_signed(step);
            if self.state.recursion_level_for_step_out == 0 {
                self.state.scheduled_step = ScheduledStep::StepInto;
                self.state.skip_next_step_out = false;
            }
        }
        if self.state.recursion_level_for_step_frame != 0 {
            self.state.recursion_level_for_step_frame = self
                .state
                .recursion_level_for_step_frame
                .saturating_add_signed(step);
            if self.state.recursion_level_for_step_frame == 0 {
                self.state.skipped_step_frame_count = 0;
                match self.state.scheduled_step {
                    ScheduledStep::NoStep => self.bridge.clear_stepping(),
                    ScheduledStep::StepOut => self.state.skip_next_step_out = true,
                    ScheduledStep::StepInto | ScheduledStep::StepOver => {}
                }
            }
        }
    }

    pub(crate) fn schedule_pause_on_next_statement_if_stepping_into(&mut self) {
        if self.state.scheduled_step != ScheduledStep::StepInto
            || self.state.javascript_pause_scheduled
            || self.state.is_paused()
        {
            return;
        }
        self.state.break_reason = BreakReason::Other;
        self.state.pausing_on_native_event = false;
        self.state.skipped_step_frame_count = 0;
        self.state.recursion_level_for_step_frame = 0;
        self.bridge.set_pause_on_next_statement(true);
    }

    pub(crate) fn apply_tracker_signal(&mut self, signal: TrackerSignal) {
        match signal {
            TrackerSignal::StepIntoAsyncCaptured(operation_id) => {
                debug!("step into async latched onto operation {operation_id}");
                self.state.scheduled_step = ScheduledStep::NoStep;
                self.bridge.clear_stepping();
            }
            TrackerSignal::PauseOnCallback(operation_id) => {
                debug!("pausing in callback of async operation {operation_id}");
                self.state.pausing_async_operation = Some(operation_id);
                self.state.scheduled_step = ScheduledStep::StepInto;
                self.state.skipped_step_frame_count = 0;
                self.state.recursion_level_for_step_frame = 0;
                self.bridge.set_pause_on_next_statement(true);
            }
            TrackerSignal::Completed(id) => {
                self.frontend
                    .notify(InspectorEvent::AsyncOperationCompleted { id });
            }
        }
    }

    /// Announces async operations started since the last flush.
    pub fn flush_async_operation_events(&mut self) {
        for operation in self.tracker.take_pending_notifications() {
            self.frontend
                .notify(InspectorEvent::AsyncOperationStarted { operation });
        }
    }
}
