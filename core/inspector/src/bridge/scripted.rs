//! A deterministic engine driven by the host, for tests and the command line replayer.
//!
//! Scripts are sets of breakable lines, frames are pushed and popped by the driver, and
//! values are JSON. The engine decides when to break exactly like a real one would from
//! the debugger's point of view: on native breakpoints, scheduled pauses, armed stepping
//! modes and thrown exceptions.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use log::trace;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    AsyncTaskEvent, AsyncTaskKind, CompileOutcome, Completion, DebugEvent, EngineDebugBridge,
    ExceptionDetails, ExecutionDepth, FrameSummary, NativeBreakpoint, PauseOnExceptionsState,
    RawCallFrame, RawScope, RemoteObject, ScopeKind, StackFrameInfo, VariableTarget,
};
use crate::{
    breakpoint::{NativeBreakpointId, ScriptBreakpoint},
    script::{ParsedScript, ScriptId},
};

/// Stepping mode armed in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    /// Any statement.
    Into,
    /// A statement at the armed depth or shallower.
    Over,
    /// A statement shallower than the armed depth.
    Out,
    /// A statement at a different depth.
    Frame,
}

#[derive(Debug, Clone, Copy)]
struct ArmedStep {
    mode: StepMode,
    depth: usize,
}

/// A frame on the scripted engine's stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptedFrame {
    /// Function name, empty for top-level code.
    pub function_name: String,
    /// Script the frame runs.
    pub script_id: ScriptId,
    /// Current line.
    pub line_number: u32,
    /// Current column.
    #[serde(default)]
    pub column_number: u32,
    /// Local variables, the frame's only non-global scope.
    #[serde(default)]
    pub locals: Map<String, Value>,
    /// The frame's `this` value.
    #[serde(default)]
    pub this: Value,
    /// Whether the frame stopped at its return.
    #[serde(default)]
    pub is_at_return: bool,
    /// Value about to be returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<Value>,
}

impl ScriptedFrame {
    /// A frame with no locals positioned at `line_number`.
    pub fn new(function_name: impl Into<String>, script_id: impl Into<ScriptId>, line_number: u32) -> Self {
        Self {
            function_name: function_name.into(),
            script_id: script_id.into(),
            line_number,
            column_number: 0,
            locals: Map::new(),
            this: Value::Null,
            is_at_return: false,
            return_value: None,
        }
    }

    /// Adds a local variable.
    #[must_use]
    pub fn with_local(mut self, name: impl Into<String>, value: Value) -> Self {
        self.locals.insert(name.into(), value);
        self
    }
}

#[derive(Debug, Clone)]
struct ScriptedScript {
    parsed: ParsedScript,
    breakable_lines: BTreeSet<u32>,
}

#[derive(Debug, Clone)]
struct NativeEntry {
    script_id: ScriptId,
    line_number: u32,
    column_number: u32,
    condition: String,
}

/// An [`EngineDebugBridge`] whose execution is driven step by step by its owner.
#[derive(Debug)]
pub struct ScriptedEngine {
    scripts: IndexMap<ScriptId, ScriptedScript>,
    breakpoints: IndexMap<NativeBreakpointId, NativeEntry>,
    next_breakpoint: u32,
    breakpoints_active: bool,
    pause_on_next_statement: bool,
    pause_on_exceptions: PauseOnExceptionsState,
    break_requested: bool,
    stepping: Option<ArmedStep>,
    frames: Vec<ScriptedFrame>,
    globals: Map<String, Value>,
    depth: ExecutionDepth,
    objects: FxHashMap<String, (String, Value)>,
    next_object: u32,
    compiled: FxHashMap<ScriptId, String>,
    next_compiled: u32,
    released_groups: Vec<String>,
    continue_count: usize,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEngine {
    /// Creates an engine with no scripts and an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scripts: IndexMap::new(),
            breakpoints: IndexMap::new(),
            next_breakpoint: 1,
            breakpoints_active: true,
            pause_on_next_statement: false,
            pause_on_exceptions: PauseOnExceptionsState::None,
            break_requested: false,
            stepping: None,
            frames: Vec::new(),
            globals: Map::new(),
            depth: ExecutionDepth::default(),
            objects: FxHashMap::default(),
            next_object: 1,
            compiled: FxHashMap::default(),
            next_compiled: 1,
            released_groups: Vec::new(),
            continue_count: 0,
        }
    }

    // ---- driver side ----------------------------------------------------------------

    /// Loads a script. Every line in its bounds is breakable unless `breakable_lines` says
    /// otherwise.
    pub fn parse_script(
        &mut self,
        parsed: ParsedScript,
        breakable_lines: Option<Vec<u32>>,
    ) -> DebugEvent<Value> {
        let breakable_lines = breakable_lines.map_or_else(
            || (parsed.start_line..=parsed.end_line).collect(),
            |lines| lines.into_iter().collect(),
        );
        self.scripts.insert(
            parsed.script_id.clone(),
            ScriptedScript {
                parsed: parsed.clone(),
                breakable_lines,
            },
        );
        DebugEvent::ScriptParsed(parsed)
    }

    /// Reports a script that failed to compile.
    #[must_use]
    pub fn fail_parse(&self, parsed: ParsedScript) -> DebugEvent<Value> {
        DebugEvent::ScriptFailedToParse(parsed)
    }

    /// Defines a global variable.
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    /// Sets what [`execution_depth`](EngineDebugBridge::execution_depth) reports.
    pub fn set_execution_depth(&mut self, depth: ExecutionDepth) {
        self.depth = depth;
    }

    /// Enters a frame.
    pub fn push_frame(&mut self, frame: ScriptedFrame) {
        trace!("enter {} in {}", frame.function_name, frame.script_id);
        self.frames.push(frame);
    }

    /// Leaves the top frame.
    pub fn pop_frame(&mut self) -> Option<ScriptedFrame> {
        self.frames.pop()
    }

    /// Number of frames on the stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Moves the top frame to its return position.
    pub fn mark_at_return(&mut self, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.is_at_return = true;
            frame.return_value = Some(value);
        }
    }

    /// Executes a statement of the top frame and reports whether the engine stops there.
    pub fn execute_statement(&mut self, line_number: u32, column_number: u32) -> Option<DebugEvent<Value>> {
        let depth = self.frames.len();
        let frame = self.frames.last_mut()?;
        frame.line_number = line_number;
        frame.column_number = column_number;
        let script_id = frame.script_id.clone();

        let hits: Vec<NativeBreakpointId> = if self.breakpoints_active {
            self.breakpoints
                .iter()
                .filter(|(_, entry)| {
                    entry.script_id == script_id
                        && entry.line_number == line_number
                        && (entry.column_number == 0 || entry.column_number == column_number)
                })
                .map(|(id, entry)| (id.clone(), entry.condition.clone()))
                .collect::<Vec<_>>()
                .into_iter()
                .filter(|(_, condition)| self.condition_holds(condition))
                .map(|(id, _)| id)
                .collect()
        } else {
            Vec::new()
        };

        let stepping_stops = self.stepping.is_some_and(|step| match step.mode {
            StepMode::Into => true,
            StepMode::Over => depth <= step.depth,
            StepMode::Out => depth < step.depth,
            StepMode::Frame => depth != step.depth,
        });

        let event = if !hits.is_empty() {
            DebugEvent::BreakpointHit(hits)
        } else if self.break_requested || self.pause_on_next_statement || stepping_stops {
            DebugEvent::Break
        } else {
            return None;
        };
        self.break_requested = false;
        self.pause_on_next_statement = false;
        self.stepping = None;
        Some(event)
    }

    /// Throws `value` from the top frame.
    pub fn throw(&mut self, value: Value, uncaught: bool, is_promise_rejection: bool) -> Option<DebugEvent<Value>> {
        let stops = match self.pause_on_exceptions {
            PauseOnExceptionsState::None => false,
            PauseOnExceptionsState::All => true,
            PauseOnExceptionsState::Uncaught => uncaught,
        };
        if !stops {
            return None;
        }
        self.stepping = None;
        self.pause_on_next_statement = false;
        Some(DebugEvent::Exception {
            value,
            is_promise_rejection,
        })
    }

    /// Reports an engine-native async task event.
    #[must_use]
    pub fn async_task(&self, kind: AsyncTaskKind, name: impl Into<String>, id: u64) -> DebugEvent<Value> {
        DebugEvent::AsyncTask(AsyncTaskEvent {
            kind,
            name: name.into(),
            id,
        })
    }

    // ---- inspection for tests -------------------------------------------------------

    /// Number of native breakpoints currently placed.
    #[must_use]
    pub fn native_breakpoint_count(&self) -> usize {
        self.breakpoints.len()
    }

    /// The stepping mode currently armed.
    #[must_use]
    pub fn armed_step(&self) -> Option<StepMode> {
        self.stepping.map(|step| step.mode)
    }

    /// Whether a break at the next statement is requested.
    #[must_use]
    pub fn is_pause_on_next_statement(&self) -> bool {
        self.pause_on_next_statement
    }

    /// Whether native breakpoints are active.
    #[must_use]
    pub fn breakpoints_active(&self) -> bool {
        self.breakpoints_active
    }

    /// Object groups released so far, oldest first.
    #[must_use]
    pub fn released_groups(&self) -> &[String] {
        &self.released_groups
    }

    /// How many times `continue_program` was called.
    #[must_use]
    pub fn continue_count(&self) -> usize {
        self.continue_count
    }

    /// The frame at `ordinal`, top first.
    #[must_use]
    pub fn frame(&self, ordinal: usize) -> Option<&ScriptedFrame> {
        self.frames.iter().rev().nth(ordinal)
    }

    // ---- evaluation -----------------------------------------------------------------

    fn arm(&mut self, mode: StepMode) {
        self.stepping = Some(ArmedStep {
            mode,
            depth: self.frames.len(),
        });
    }

    fn condition_holds(&self, condition: &str) -> bool {
        if condition.trim().is_empty() {
            return true;
        }
        match self.evaluate_in(self.frames.len().checked_sub(1), condition) {
            Completion::Value(value) => is_truthy(&value),
            Completion::Threw { .. } => false,
        }
    }

    fn evaluate_in(&self, index: Option<usize>, expression: &str) -> Completion<Value> {
        let expression = expression.trim();
        if let Some(thrown) = expression.strip_prefix("throw ") {
            return match self.evaluate_in(index, thrown) {
                Completion::Value(value) => {
                    let details = ExceptionDetails::new(format!("Uncaught {}", display_value(&value)));
                    Completion::Threw {
                        exception: value,
                        details,
                    }
                }
                threw @ Completion::Threw { .. } => threw,
            };
        }
        for (operator, expected) in [("!=", false), ("==", true)] {
            if let Some((lhs, rhs)) = expression.split_once(operator) {
                let lhs = match self.evaluate_in(index, lhs) {
                    Completion::Value(value) => value,
                    threw @ Completion::Threw { .. } => return threw,
                };
                let rhs = match self.evaluate_in(index, rhs) {
                    Completion::Value(value) => value,
                    threw @ Completion::Threw { .. } => return threw,
                };
                return Completion::Value(Value::Bool((lhs == rhs) == expected));
            }
        }
        if let Ok(literal) = serde_json::from_str::<Value>(expression) {
            return Completion::Value(literal);
        }
        if is_identifier(expression) {
            let frame = index.and_then(|index| self.frames.get(index));
            if expression == "this" {
                return Completion::Value(frame.map_or(Value::Null, |frame| frame.this.clone()));
            }
            let found = frame
                .and_then(|frame| frame.locals.get(expression))
                .or_else(|| self.globals.get(expression));
            return match found {
                Some(value) => Completion::Value(value.clone()),
                None => throw_error(format!("ReferenceError: {expression} is not defined")),
            };
        }
        throw_error(format!("SyntaxError: Unexpected token in '{expression}'"))
    }

    fn frame_index(&self, ordinal: usize) -> Option<usize> {
        self.frames.len().checked_sub(ordinal + 1)
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn throw_error(message: String) -> Completion<Value> {
    Completion::Threw {
        exception: Value::String(message.clone()),
        details: ExceptionDetails::new(message),
    }
}

/// Brackets must balance for source to count as syntactically valid.
fn check_syntax(source: &str) -> Result<(), ExceptionDetails> {
    let mut open = Vec::new();
    for (line_number, line) in source.lines().enumerate() {
        for (column_number, c) in line.chars().enumerate() {
            let expected = match c {
                '(' | '[' | '{' => {
                    open.push(c);
                    continue;
                }
                ')' => '(',
                ']' => '[',
                '}' => '{',
                _ => continue,
            };
            if open.pop() != Some(expected) {
                let mut details = ExceptionDetails::new(format!("SyntaxError: Unexpected token {c}"));
                details.line_number = u32::try_from(line_number).ok();
                details.column_number = u32::try_from(column_number).ok();
                return Err(details);
            }
        }
    }
    if open.is_empty() {
        Ok(())
    } else {
        Err(ExceptionDetails::new("SyntaxError: Unexpected end of input"))
    }
}

impl EngineDebugBridge for ScriptedEngine {
    type Value = Value;

    fn set_breakpoint(
        &mut self,
        script_id: &ScriptId,
        breakpoint: &ScriptBreakpoint,
        _interstatement: bool,
    ) -> Option<NativeBreakpoint> {
        let script = self.scripts.get(script_id)?;
        let line_number = *script.breakable_lines.range(breakpoint.line_number..).next()?;
        let column_number = if line_number == breakpoint.line_number {
            breakpoint.column_number
        } else {
            0
        };
        let id = NativeBreakpointId::new(self.next_breakpoint.to_string());
        self.next_breakpoint += 1;
        self.breakpoints.insert(
            id.clone(),
            NativeEntry {
                script_id: script_id.clone(),
                line_number,
                column_number,
                condition: breakpoint.condition.clone(),
            },
        );
        Some(NativeBreakpoint {
            id,
            line_number,
            column_number,
        })
    }

    fn remove_breakpoint(&mut self, id: &NativeBreakpointId) {
        self.breakpoints.shift_remove(id);
    }

    fn compiled_scripts(&self) -> Vec<ParsedScript> {
        self.scripts.values().map(|script| script.parsed.clone()).collect()
    }

    fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    fn set_breakpoints_active(&mut self, active: bool) {
        self.breakpoints_active = active;
    }

    fn set_pause_on_next_statement(&mut self, pause: bool) {
        self.pause_on_next_statement = pause;
    }

    fn set_pause_on_exceptions(&mut self, state: PauseOnExceptionsState) {
        self.pause_on_exceptions = state;
    }

    fn pause_on_exceptions(&self) -> PauseOnExceptionsState {
        self.pause_on_exceptions
    }

    fn break_program(&mut self) {
        self.break_requested = true;
    }

    fn continue_program(&mut self) {
        self.continue_count += 1;
        self.stepping = None;
    }

    fn step_into(&mut self) {
        self.arm(StepMode::Into);
    }

    fn step_over(&mut self) {
        self.arm(StepMode::Over);
    }

    fn step_out(&mut self) {
        self.arm(StepMode::Out);
    }

    fn step_frame(&mut self) {
        self.arm(StepMode::Frame);
    }

    fn clear_stepping(&mut self) {
        self.stepping = None;
    }

    fn current_call_frames(&mut self, limit: usize) -> Vec<RawCallFrame<Value>> {
        let limit = if limit == 0 { usize::MAX } else { limit };
        self.frames
            .iter()
            .rev()
            .take(limit)
            .map(|frame| RawCallFrame {
                function_name: frame.function_name.clone(),
                script_id: frame.script_id.clone(),
                line_number: frame.line_number,
                column_number: frame.column_number,
                this: frame.this.clone(),
                scope_chain: vec![
                    RawScope {
                        kind: ScopeKind::Local,
                        object: Value::Object(frame.locals.clone()),
                    },
                    RawScope {
                        kind: ScopeKind::Global,
                        object: Value::Object(self.globals.clone()),
                    },
                ],
                return_value: frame.return_value.clone(),
                is_at_return: frame.is_at_return,
            })
            .collect()
    }

    fn call_frame_at(&self, index: usize) -> Option<FrameSummary> {
        self.frame(index).map(|frame| FrameSummary {
            script_id: frame.script_id.clone(),
            function_name: frame.function_name.clone(),
            line_number: frame.line_number,
            column_number: frame.column_number,
            is_at_return: frame.is_at_return,
        })
    }

    fn capture_async_stack(&self, limit: usize) -> Vec<StackFrameInfo> {
        self.frames
            .iter()
            .rev()
            .take(limit)
            .map(|frame| StackFrameInfo {
                function_name: frame.function_name.clone(),
                url: self
                    .scripts
                    .get(&frame.script_id)
                    .map(|script| script.parsed.url.clone())
                    .unwrap_or_default(),
                script_id: frame.script_id.clone(),
                line_number: frame.line_number,
                column_number: frame.column_number,
            })
            .collect()
    }

    fn execution_depth(&self) -> ExecutionDepth {
        self.depth
    }

    fn evaluate_on_frame(&mut self, ordinal: usize, expression: &str) -> Completion<Value> {
        let index = self.frame_index(ordinal);
        self.evaluate_in(index, expression)
    }

    fn restart_frame(&mut self, ordinal: usize) -> Result<(), String> {
        let index = self
            .frame_index(ordinal)
            .ok_or_else(|| "Could not find call frame with given id".to_owned())?;
        self.frames.truncate(index + 1);
        if let Some(frame) = self.frames.last_mut() {
            frame.is_at_return = false;
            frame.return_value = None;
        }
        self.arm(StepMode::Into);
        Ok(())
    }

    fn set_variable_value(
        &mut self,
        target: &VariableTarget,
        scope_number: usize,
        name: &str,
        value: &Value,
    ) -> Result<(), String> {
        match target {
            VariableTarget::CallFrame(ordinal) => {
                let index = self
                    .frame_index(*ordinal)
                    .ok_or_else(|| "Could not find call frame with given id".to_owned())?;
                match scope_number {
                    0 => {
                        self.frames[index].locals.insert(name.to_owned(), value.clone());
                    }
                    1 => {
                        self.globals.insert(name.to_owned(), value.clone());
                    }
                    _ => return Err(format!("Scope {scope_number} does not exist")),
                }
                Ok(())
            }
            VariableTarget::Function(object_id) => match self.objects.get_mut(object_id) {
                Some((_, Value::Object(properties))) => {
                    properties.insert(name.to_owned(), value.clone());
                    Ok(())
                }
                _ => Err("Function object id cannot be resolved".to_owned()),
            },
        }
    }

    fn set_script_source(
        &mut self,
        script_id: &ScriptId,
        source: &str,
        preview: bool,
    ) -> Result<(), ExceptionDetails> {
        if !self.scripts.contains_key(script_id) {
            return Err(ExceptionDetails::new(format!("No script with id {script_id}")));
        }
        check_syntax(source)?;
        if !preview {
            let line_count = u32::try_from(source.lines().count()).unwrap_or(u32::MAX);
            if let Some(script) = self.scripts.get_mut(script_id) {
                script.breakable_lines = (0..line_count).collect();
            }
        }
        Ok(())
    }

    fn compile_script(
        &mut self,
        expression: &str,
        _source_url: &str,
        persist: bool,
    ) -> Result<CompileOutcome, String> {
        if let Err(details) = check_syntax(expression) {
            return Ok(CompileOutcome::SyntaxError(details));
        }
        if !persist {
            return Ok(CompileOutcome::Compiled(None));
        }
        let id = ScriptId::new(format!("compiled-{}", self.next_compiled));
        self.next_compiled += 1;
        self.compiled.insert(id.clone(), expression.to_owned());
        Ok(CompileOutcome::Compiled(Some(id)))
    }

    fn run_script(&mut self, script_id: &ScriptId) -> Result<Completion<Value>, String> {
        let expression = self
            .compiled
            .get(script_id)
            .cloned()
            .ok_or_else(|| format!("No script with given id {script_id}"))?;
        Ok(self.evaluate_in(self.frames.len().checked_sub(1), &expression))
    }

    fn wrap(&mut self, value: &Value, group: &str, by_value: bool) -> RemoteObject {
        let (type_, subtype, class_name) = match value {
            Value::Null => ("object", Some("null"), None),
            Value::Bool(_) => ("boolean", None, None),
            Value::Number(_) => ("number", None, None),
            Value::String(_) => ("string", None, None),
            Value::Array(_) => ("object", Some("array"), Some("Array")),
            Value::Object(_) => ("object", None, Some("Object")),
        };
        let is_object = matches!(value, Value::Array(_) | Value::Object(_));
        let object_id = (is_object && !by_value).then(|| {
            let id = format!("{{\"injectedScriptId\":1,\"id\":{}}}", self.next_object);
            self.next_object += 1;
            self.objects.insert(id.clone(), (group.to_owned(), value.clone()));
            id
        });
        RemoteObject {
            type_: type_.to_owned(),
            subtype: subtype.map(str::to_owned),
            class_name: class_name.map(str::to_owned),
            value: (!is_object || by_value).then(|| value.clone()),
            description: Some(display_value(value)),
            object_id,
        }
    }

    fn release_object_group(&mut self, group: &str) {
        self.objects.retain(|_, (owner, _)| owner != group);
        self.released_groups.push(group.to_owned());
    }
}
