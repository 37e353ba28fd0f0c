//! Causal call chains across asynchronous task boundaries.
//!
//! Every time script schedules deferred work (a timer, a promise reaction, a callback) the
//! tracker snapshots the synchronous stack and prepends it to the chain that was active
//! at that moment. When the deferred work later runs, its chain becomes the "current"
//! one, so a pause inside the callback can show the stacks that led to it.
//!
//! Chains are immutable and capped at `max_depth` entries when built. Operations share
//! stack entries through reference counting.

use std::rc::Rc;

use indexmap::IndexSet;
use log::{debug, trace, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::{
    bridge::{AsyncTaskEvent, AsyncTaskKind, EngineDebugBridge, ExecutionDepth, StackFrameInfo},
    config::InspectorConfig,
    error::{InspectorError, InspectorResult},
};

/// Id reserved for "no operation".
pub const UNKNOWN_ASYNC_OPERATION_ID: u32 = 0;

/// Decides whether entering a callback at `depth` starts a new logical task.
pub type ReentryPredicate = fn(ExecutionDepth) -> bool;

/// The default reentry rule: the callback runs from the top of the native stack, or from
/// a microtask checkpoint entered right after a script returned.
#[must_use]
pub fn top_level_or_microtask_checkpoint(depth: ExecutionDepth) -> bool {
    depth.recursion_level == 0
        || (depth.recursion_level == 1 && depth.performing_microtask_checkpoint)
}

/// A synchronous stack captured when an async operation was scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncCallStack {
    description: String,
    frames: Vec<StackFrameInfo>,
}

impl AsyncCallStack {
    /// What scheduled the operation, e.g. `setTimeout`.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The stack captured when the operation was scheduled, top first.
    #[must_use]
    pub fn frames(&self) -> &[StackFrameInfo] {
        &self.frames
    }
}

/// An immutable causal chain, newest stack first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncCallChain {
    stacks: Vec<Rc<AsyncCallStack>>,
}

impl AsyncCallChain {
    /// The stacks of this chain, newest first.
    #[must_use]
    pub fn stacks(&self) -> &[Rc<AsyncCallStack>] {
        &self.stacks
    }

    /// Number of stacks in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    /// Whether the chain holds no stack.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Builds the nested display form: newest stack on top, older ones as parents.
    #[must_use]
    pub fn to_stack_trace(&self) -> Option<AsyncStackTrace> {
        self.stacks.iter().rev().fold(None, |parent, stack| {
            Some(AsyncStackTrace {
                description: stack.description.clone(),
                call_frames: stack.frames.clone(),
                parent: parent.map(Box::new),
            })
        })
    }

    /// This chain cut down to its `depth` newest stacks, sharing them with `self`.
    #[must_use]
    pub fn truncated(self: &Rc<Self>, depth: usize) -> Rc<Self> {
        if self.stacks.len() <= depth {
            return Rc::clone(self);
        }
        Rc::new(Self {
            stacks: self.stacks[..depth].to_vec(),
        })
    }
}

/// Display form of a causal chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncStackTrace {
    /// What scheduled this part of the chain.
    pub description: String,
    /// The stack captured when it was scheduled.
    pub call_frames: Vec<StackFrameInfo>,
    /// The chain that was current when it was scheduled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<AsyncStackTrace>>,
}

impl AsyncStackTrace {
    /// Number of stacks from this one down to the oldest parent.
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.parent.as_ref().map_or(0, |parent| parent.depth())
    }
}

/// Payload of the `asyncOperationStarted` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncOperationInfo {
    /// Operation id.
    pub id: u32,
    /// Chain recorded for the operation.
    pub stack_trace: AsyncStackTrace,
}

/// What the agent has to act upon after a tracker call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerSignal {
    /// A pending step-into-async latched onto this newly started operation.
    StepIntoAsyncCaptured(u32),
    /// The callback about to run should pause on its first statement.
    PauseOnCallback(u32),
    /// An already announced operation finished.
    Completed(u32),
}

#[derive(Debug, Clone)]
struct EngineTask {
    operation_id: u32,
    recurring: bool,
}

/// Correlates schedule / run / complete events of deferred work into causal chains.
#[derive(Debug)]
pub struct AsyncCallChainTracker {
    max_depth: usize,
    frame_limit: usize,
    reentry: ReentryPredicate,
    operations: FxHashMap<u32, Rc<AsyncCallChain>>,
    last_operation_id: u32,
    pending_notifications: IndexSet<u32>,
    current_operation_id: u32,
    current_chain: Option<Rc<AsyncCallChain>>,
    nested_callbacks: usize,
    completion_deferred: bool,
    breakpoints: FxHashSet<u32>,
    pausing_operations: FxHashSet<u32>,
    starting_step_into_async: bool,
    engine_tasks: FxHashMap<(String, u64), EngineTask>,
}

impl AsyncCallChainTracker {
    /// Creates a tracker using the depth and snapshot size of `config`.
    #[must_use]
    pub fn new(config: &InspectorConfig) -> Self {
        Self {
            max_depth: config.max_async_call_stack_depth,
            frame_limit: config.async_stack_frame_limit,
            reentry: top_level_or_microtask_checkpoint,
            operations: FxHashMap::default(),
            last_operation_id: UNKNOWN_ASYNC_OPERATION_ID,
            pending_notifications: IndexSet::new(),
            current_operation_id: UNKNOWN_ASYNC_OPERATION_ID,
            current_chain: None,
            nested_callbacks: 0,
            completion_deferred: false,
            breakpoints: FxHashSet::default(),
            pausing_operations: FxHashSet::default(),
            starting_step_into_async: false,
            engine_tasks: FxHashMap::default(),
        }
    }

    /// Maximum number of stacks kept per chain.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Returns `true` when async call stacks are being collected.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.max_depth > 0
    }

    /// Changes the chain cap. Disabling tracking forgets every operation, lowering the
    /// cap truncates every chain already recorded.
    pub fn set_max_depth(&mut self, depth: usize) {
        debug!("async call stack depth {} -> {depth}", self.max_depth);
        let lowered = depth < self.max_depth;
        self.max_depth = depth;
        if depth == 0 {
            self.reset();
        } else if lowered {
            for chain in self.operations.values_mut() {
                *chain = chain.truncated(depth);
            }
            if let Some(chain) = self.current_chain.as_mut() {
                *chain = chain.truncated(depth);
            }
        }
    }

    /// Replaces the rule deciding whether a callback entry starts a new logical task.
    pub fn set_reentry_predicate(&mut self, predicate: ReentryPredicate) {
        self.reentry = predicate;
    }

    /// Forgets every operation, the current chain and all async breakpoints.
    pub fn reset(&mut self) {
        self.operations.clear();
        self.pending_notifications.clear();
        self.current_operation_id = UNKNOWN_ASYNC_OPERATION_ID;
        self.current_chain = None;
        self.nested_callbacks = 0;
        self.completion_deferred = false;
        self.breakpoints.clear();
        self.pausing_operations.clear();
        self.starting_step_into_async = false;
        self.engine_tasks.clear();
    }

    /// Records that deferred work is being scheduled from the current stack.
    ///
    /// Returns the new operation id, or `0` when tracking is disabled.
    pub fn start_operation<B: EngineDebugBridge>(
        &mut self,
        bridge: &B,
        description: &str,
    ) -> (u32, Option<TrackerSignal>) {
        if !self.is_enabled() {
            return (UNKNOWN_ASYNC_OPERATION_ID, None);
        }
        let frames = bridge.capture_async_stack(self.frame_limit);
        let chain = self.build_chain(description, frames);
        let id = self.allocate_id();
        trace!(
            "async operation {id} '{description}' started, chain length {}",
            chain.as_ref().map_or(0, |chain| chain.len())
        );

        if chain.is_some() {
            self.pending_notifications.insert(id);
        }
        if let Some(chain) = chain {
            self.operations.insert(id, chain);
        }

        let signal = if self.starting_step_into_async {
            self.starting_step_into_async = false;
            self.pausing_operations.insert(id);
            Some(TrackerSignal::StepIntoAsyncCaptured(id))
        } else {
            None
        };
        (id, signal)
    }

    /// Records that the callback of `operation_id` is about to run.
    ///
    /// A chain still current from an unbalanced callback is finished first, so the
    /// signals may include its deferred completion.
    pub fn will_run_callback(&mut self, depth: ExecutionDepth, operation_id: u32) -> Vec<TrackerSignal> {
        let chain = if operation_id == UNKNOWN_ASYNC_OPERATION_ID {
            None
        } else {
            self.operations.get(&operation_id).cloned()
        };

        match chain {
            Some(chain) if (self.reentry)(depth) => {
                let mut signals = Vec::new();
                if self.current_chain.is_some() {
                    debug!(
                        "async operation {} still current when {operation_id} starts",
                        self.current_operation_id
                    );
                    signals.extend(self.finish_current());
                }
                self.current_operation_id = operation_id;
                self.current_chain = Some(chain);
                self.nested_callbacks = 1;
                if self.pausing_operations.contains(&operation_id)
                    || self.breakpoints.contains(&operation_id)
                {
                    signals.push(TrackerSignal::PauseOnCallback(operation_id));
                }
                signals
            }
            _ => {
                if self.current_chain.is_some() {
                    self.nested_callbacks += 1;
                }
                Vec::new()
            }
        }
    }

    /// Records that a callback returned. Yields a deferred completion, if any.
    pub fn did_run_callback(&mut self) -> Option<TrackerSignal> {
        if self.nested_callbacks == 0 {
            return None;
        }
        self.nested_callbacks -= 1;
        if self.nested_callbacks == 0 {
            return self.finish_current();
        }
        None
    }

    /// Records that an operation will never run again.
    pub fn complete_operation(&mut self, operation_id: u32) -> Option<TrackerSignal> {
        if !self.is_enabled() {
            return None;
        }
        if operation_id == self.current_operation_id && self.nested_callbacks > 0 {
            trace!("completion of running async operation {operation_id} deferred");
            self.completion_deferred = true;
            return None;
        }
        let known = self.operations.remove(&operation_id).is_some();
        self.breakpoints.remove(&operation_id);
        self.pausing_operations.remove(&operation_id);
        let never_flushed = self.pending_notifications.shift_remove(&operation_id);
        (known && !never_flushed).then_some(TrackerSignal::Completed(operation_id))
    }

    /// Maps an engine-native task event onto operation ids.
    pub fn handle_task_event<B: EngineDebugBridge>(
        &mut self,
        bridge: &B,
        event: &AsyncTaskEvent,
    ) -> Vec<TrackerSignal> {
        if !self.is_enabled() {
            return Vec::new();
        }
        let key = (event.name.clone(), event.id);
        match event.kind {
            AsyncTaskKind::Enqueue | AsyncTaskKind::EnqueueRecurring => {
                let (operation_id, signal) = self.start_operation(bridge, &event.name);
                self.engine_tasks.insert(
                    key,
                    EngineTask {
                        operation_id,
                        recurring: event.kind == AsyncTaskKind::EnqueueRecurring,
                    },
                );
                signal.into_iter().collect()
            }
            AsyncTaskKind::WillHandle => {
                let operation_id = self.engine_tasks.get(&key).map_or_else(
                    || {
                        warn!("task {}#{} runs without being enqueued", event.name, event.id);
                        UNKNOWN_ASYNC_OPERATION_ID
                    },
                    |task| task.operation_id,
                );
                self.will_run_callback(bridge.execution_depth(), operation_id)
            }
            AsyncTaskKind::DidHandle => {
                let deferred = self.did_run_callback();
                let one_shot = self.engine_tasks.get(&key).is_some_and(|task| !task.recurring);
                let finished = if one_shot {
                    self.engine_tasks.remove(&key)
                } else {
                    None
                };
                let completed = finished.and_then(|task| self.complete_operation(task.operation_id));
                deferred.into_iter().chain(completed).collect()
            }
            AsyncTaskKind::Cancel => self
                .engine_tasks
                .remove(&key)
                .and_then(|task| self.complete_operation(task.operation_id))
                .into_iter()
                .collect(),
        }
    }

    /// Arms step-into-async: the next started operation pauses when its callback runs.
    pub fn arm_step_into_async(&mut self) {
        self.starting_step_into_async = true;
    }

    /// Drops a pending step-into-async that never latched onto an operation.
    pub fn disarm_step_into_async(&mut self) {
        self.starting_step_into_async = false;
    }

    /// Cancels step-into-async entirely, including operations it already latched onto.
    pub fn clear_step_into_async(&mut self) {
        self.starting_step_into_async = false;
        self.pausing_operations.clear();
    }

    /// Breaks when the callback of `operation_id` starts.
    pub fn set_operation_breakpoint(&mut self, operation_id: u32) -> InspectorResult<()> {
        if !self.is_enabled() {
            return Err(InspectorError::AsyncTrackingDisabled);
        }
        if operation_id == UNKNOWN_ASYNC_OPERATION_ID || !self.operations.contains_key(&operation_id) {
            return Err(InspectorError::UnknownAsyncOperation(operation_id));
        }
        self.breakpoints.insert(operation_id);
        Ok(())
    }

    /// Removes an async-operation breakpoint. Ids without a breakpoint are ignored.
    pub fn remove_operation_breakpoint(&mut self, operation_id: u32) -> InspectorResult<()> {
        if !self.is_enabled() {
            return Err(InspectorError::AsyncTrackingDisabled);
        }
        if operation_id == UNKNOWN_ASYNC_OPERATION_ID {
            return Err(InspectorError::UnknownAsyncOperation(operation_id));
        }
        self.breakpoints.remove(&operation_id);
        Ok(())
    }

    /// Chain of the callback currently running, if any.
    #[must_use]
    pub fn current_chain(&self) -> Option<&Rc<AsyncCallChain>> {
        self.current_chain.as_ref()
    }

    /// Id of the operation whose callback is running, `0` outside callbacks.
    #[must_use]
    pub fn current_operation_id(&self) -> u32 {
        self.current_operation_id
    }

    /// The current chain in display order, or `None` outside tracked callbacks.
    #[must_use]
    pub fn current_async_stack_trace(&self) -> Option<AsyncStackTrace> {
        if !self.is_enabled() {
            return None;
        }
        self.current_chain.as_ref().and_then(|chain| chain.to_stack_trace())
    }

    /// The chain recorded for an operation.
    #[must_use]
    pub fn operation(&self, operation_id: u32) -> Option<&Rc<AsyncCallChain>> {
        self.operations.get(&operation_id)
    }

    /// Number of operations with a recorded chain.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// Drains the operations not yet announced to the front end, oldest first.
    pub fn take_pending_notifications(&mut self) -> Vec<AsyncOperationInfo> {
        let pending = std::mem::take(&mut self.pending_notifications);
        pending
            .into_iter()
            .filter_map(|id| {
                let stack_trace = self.operations.get(&id)?.to_stack_trace()?;
                Some(AsyncOperationInfo { id, stack_trace })
            })
            .collect()
    }

    fn build_chain(&self, description: &str, frames: Vec<StackFrameInfo>) -> Option<Rc<AsyncCallChain>> {
        let parent = self.current_chain.as_ref();
        if frames.is_empty() {
            return parent.map(|parent| parent.truncated(self.max_depth));
        }

        let mut stacks = Vec::with_capacity(self.max_depth);
        stacks.push(Rc::new(AsyncCallStack {
            description: description.to_owned(),
            frames,
        }));
        if let Some(parent) = parent {
            stacks.extend(
                parent
                    .stacks
                    .iter()
                    .take(self.max_depth.saturating_sub(1))
                    .cloned(),
            );
        }
        Some(Rc::new(AsyncCallChain { stacks }))
    }

    fn allocate_id(&mut self) -> u32 {
        loop {
            self.last_operation_id = self.last_operation_id.wrapping_add(1);
            if self.last_operation_id != UNKNOWN_ASYNC_OPERATION_ID
                && !self.operations.contains_key(&self.last_operation_id)
            {
                return self.last_operation_id;
            }
        }
    }

    fn finish_current(&mut self) -> Option<TrackerSignal> {
        let operation_id = std::mem::replace(&mut self.current_operation_id, UNKNOWN_ASYNC_OPERATION_ID);
        let deferred = std::mem::take(&mut self.completion_deferred);
        self.nested_callbacks = 0;
        self.current_chain = None;
        if deferred && operation_id != UNKNOWN_ASYNC_OPERATION_ID {
            return self.complete_operation(operation_id);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{ScriptedEngine, ScriptedFrame};
    use rstest::{fixture, rstest};

    fn tracker(depth: usize) -> AsyncCallChainTracker {
        AsyncCallChainTracker::new(&InspectorConfig::default().with_async_call_stack_depth(depth))
    }

    #[fixture]
    fn engine() -> ScriptedEngine {
        let mut engine = ScriptedEngine::new();
        engine.push_frame(ScriptedFrame::new("main", "1", 3));
        engine
    }

    fn descriptions(chain: &AsyncCallChain) -> Vec<&str> {
        chain.stacks().iter().map(|stack| stack.description()).collect()
    }

    #[rstest]
    fn chains_are_capped_when_built(engine: ScriptedEngine) {
        let mut tracker = tracker(2);
        let (timer, _) = tracker.start_operation(&engine, "timer");
        assert_eq!(timer, 1);

        let _ = tracker.will_run_callback(ExecutionDepth::default(), timer);
        let (fetch, _) = tracker.start_operation(&engine, "fetch");
        assert_eq!(fetch, 2);
        assert_eq!(descriptions(tracker.operation(fetch).unwrap()), ["fetch", "timer"]);
        let _ = tracker.did_run_callback();

        let _ = tracker.will_run_callback(ExecutionDepth::default(), fetch);
        let (xhr, _) = tracker.start_operation(&engine, "xhr");
        assert_eq!(xhr, 3);
        assert_eq!(descriptions(tracker.operation(xhr).unwrap()), ["xhr", "fetch"]);
    }

    #[rstest]
    fn disabled_tracker_hands_out_no_ids(engine: ScriptedEngine) {
        let mut tracker = tracker(0);
        assert_eq!(tracker.start_operation(&engine, "timer"), (0, None));
        assert_eq!(tracker.operation_count(), 0);
        assert_eq!(
            tracker.set_operation_breakpoint(1),
            Err(InspectorError::AsyncTrackingDisabled)
        );
    }

    #[rstest]
    fn ids_wrap_and_skip_live_operations(engine: ScriptedEngine) {
        let mut tracker = tracker(4);
        let (first, _) = tracker.start_operation(&engine, "first");
        assert_eq!(first, 1);

        tracker.last_operation_id = u32::MAX - 1;
        let (last, _) = tracker.start_operation(&engine, "last");
        assert_eq!(last, u32::MAX);
        let (wrapped, _) = tracker.start_operation(&engine, "wrapped");
        assert_eq!(wrapped, 2);
    }

    #[test]
    fn empty_snapshot_reuses_current_chain() {
        let mut tracker = tracker(4);
        let mut engine = ScriptedEngine::new();
        let (outside, _) = tracker.start_operation(&engine, "outside");
        assert!(tracker.operation(outside).is_none());

        engine.push_frame(ScriptedFrame::new("main", "1", 3));
        let (timer, _) = tracker.start_operation(&engine, "timer");
        let _ = engine.pop_frame();
        let _ = tracker.will_run_callback(ExecutionDepth::default(), timer);
        let (native, _) = tracker.start_operation(&engine, "native");
        assert_eq!(descriptions(tracker.operation(native).unwrap()), ["timer"]);
    }

    #[rstest]
    fn completion_of_running_operation_is_deferred(engine: ScriptedEngine) {
        let mut tracker = tracker(4);
        let (timer, _) = tracker.start_operation(&engine, "timer");
        assert_eq!(tracker.take_pending_notifications().len(), 1);

        let _ = tracker.will_run_callback(ExecutionDepth::default(), timer);
        assert_eq!(tracker.complete_operation(timer), None);
        assert!(tracker.operation(timer).is_some());

        assert_eq!(tracker.did_run_callback(), Some(TrackerSignal::Completed(timer)));
        assert!(tracker.operation(timer).is_none());
        assert!(tracker.current_chain().is_none());
    }

    #[rstest]
    fn unflushed_operations_complete_silently(engine: ScriptedEngine) {
        let mut tracker = tracker(4);
        let (timer, _) = tracker.start_operation(&engine, "timer");
        assert_eq!(tracker.complete_operation(timer), None);
        assert!(tracker.take_pending_notifications().is_empty());
    }

    #[rstest]
    #[case(ExecutionDepth { recursion_level: 0, performing_microtask_checkpoint: false }, true)]
    #[case(ExecutionDepth { recursion_level: 1, performing_microtask_checkpoint: true }, true)]
    #[case(ExecutionDepth { recursion_level: 1, performing_microtask_checkpoint: false }, false)]
    #[case(ExecutionDepth { recursion_level: 2, performing_microtask_checkpoint: true }, false)]
    fn default_reentry_rule(#[case] depth: ExecutionDepth, #[case] expected: bool) {
        assert_eq!(top_level_or_microtask_checkpoint(depth), expected);
    }

    #[rstest]
    fn nested_entries_keep_the_outer_chain(engine: ScriptedEngine) {
        let mut tracker = tracker(4);
        let (outer, _) = tracker.start_operation(&engine, "outer");
        let (inner, _) = tracker.start_operation(&engine, "inner");

        let _ = tracker.will_run_callback(ExecutionDepth::default(), outer);
        let nested = ExecutionDepth {
            recursion_level: 3,
            performing_microtask_checkpoint: false,
        };
        let _ = tracker.will_run_callback(nested, inner);
        assert_eq!(tracker.current_operation_id(), outer);

        let _ = tracker.did_run_callback();
        assert_eq!(tracker.current_operation_id(), outer);
        let _ = tracker.did_run_callback();
        assert!(tracker.current_chain().is_none());
    }

    #[rstest]
    fn breakpointed_operation_requests_pause(engine: ScriptedEngine) {
        let mut tracker = tracker(4);
        let (timer, _) = tracker.start_operation(&engine, "timer");
        tracker.set_operation_breakpoint(timer).unwrap();
        assert_eq!(
            tracker.will_run_callback(ExecutionDepth::default(), timer),
            [TrackerSignal::PauseOnCallback(timer)]
        );
        assert_eq!(
            tracker.set_operation_breakpoint(99),
            Err(InspectorError::UnknownAsyncOperation(99))
        );
    }

    #[rstest]
    fn engine_tasks_map_to_operations(engine: ScriptedEngine) {
        let mut tracker = tracker(4);
        let enqueue = engine.async_task(AsyncTaskKind::Enqueue, "Promise.then", 7);
        let crate::bridge::DebugEvent::AsyncTask(enqueue) = enqueue else {
            unreachable!()
        };
        let _ = tracker.handle_task_event(&engine, &enqueue);
        let _ = tracker.take_pending_notifications();

        let will = AsyncTaskEvent {
            kind: AsyncTaskKind::WillHandle,
            ..enqueue.clone()
        };
        let _ = tracker.handle_task_event(&engine, &will);
        assert_eq!(tracker.current_operation_id(), 1);

        let did = AsyncTaskEvent {
            kind: AsyncTaskKind::DidHandle,
            ..enqueue
        };
        assert_eq!(
            tracker.handle_task_event(&engine, &did),
            [TrackerSignal::Completed(1)]
        );
        assert_eq!(tracker.operation_count(), 0);
    }

    #[rstest]
    fn display_order_puts_newest_on_top(engine: ScriptedEngine) {
        let mut tracker = tracker(4);
        let (timer, _) = tracker.start_operation(&engine, "timer");
        let _ = tracker.will_run_callback(ExecutionDepth::default(), timer);
        let (fetch, _) = tracker.start_operation(&engine, "fetch");
        let _ = tracker.did_run_callback();
        let _ = tracker.will_run_callback(ExecutionDepth::default(), fetch);

        let trace = tracker.current_async_stack_trace().unwrap();
        assert_eq!(trace.description, "fetch");
        assert_eq!(trace.parent.as_ref().unwrap().description, "timer");
        assert_eq!(trace.depth(), 2);
    }

    #[rstest]
    fn disabling_forgets_everything(engine: ScriptedEngine) {
        let mut tracker = tracker(4);
        let _ = tracker.start_operation(&engine, "timer");
        tracker.set_max_depth(0);
        assert_eq!(tracker.operation_count(), 0);
        assert!(tracker.take_pending_notifications().is_empty());
    }

    #[rstest]
    fn replacing_an_unfinished_callback_completes_it(engine: ScriptedEngine) {
        let mut tracker = tracker(4);
        let (first, _) = tracker.start_operation(&engine, "first");
        let (second, _) = tracker.start_operation(&engine, "second");
        let _ = tracker.take_pending_notifications();

        let _ = tracker.will_run_callback(ExecutionDepth::default(), first);
        assert_eq!(tracker.complete_operation(first), None);

        assert_eq!(
            tracker.will_run_callback(ExecutionDepth::default(), second),
            [TrackerSignal::Completed(first)]
        );
        assert!(tracker.operation(first).is_none());
        assert_eq!(tracker.current_operation_id(), second);
        assert_eq!(tracker.did_run_callback(), None);
    }

    #[rstest]
    fn lowering_the_depth_truncates_recorded_chains(engine: ScriptedEngine) {
        let mut tracker = tracker(3);
        let (timer, _) = tracker.start_operation(&engine, "timer");
        let _ = tracker.will_run_callback(ExecutionDepth::default(), timer);
        let (fetch, _) = tracker.start_operation(&engine, "fetch");
        let _ = tracker.did_run_callback();
        let _ = tracker.will_run_callback(ExecutionDepth::default(), fetch);
        let (xhr, _) = tracker.start_operation(&engine, "xhr");
        let _ = tracker.did_run_callback();
        let _ = tracker.will_run_callback(ExecutionDepth::default(), xhr);
        assert_eq!(tracker.current_async_stack_trace().map(|trace| trace.depth()), Some(3));

        tracker.set_max_depth(1);
        assert_eq!(tracker.current_async_stack_trace().map(|trace| trace.depth()), Some(1));
        assert_eq!(descriptions(tracker.current_chain().unwrap()), ["xhr"]);
        assert_eq!(descriptions(tracker.operation(fetch).unwrap()), ["fetch"]);

        tracker.set_max_depth(4);
        let (next, _) = tracker.start_operation(&engine, "next");
        assert_eq!(descriptions(tracker.operation(next).unwrap()), ["next", "xhr"]);
    }
}
