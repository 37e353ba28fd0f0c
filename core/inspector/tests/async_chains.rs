mod common;

use boa_inspector::{
    BreakReason, Command, CommandOutput, InspectorConfig, InspectorError,
    agent::SetBreakpointByUrlArguments,
    bridge::{AsyncTaskKind, ExecutionDepth},
    frontend::InspectorEvent,
};
use common::{Agent, agent, enter, execute, load, paused_events, queue, script};
use rstest::{fixture, rstest};
use serde_json::json;

#[fixture]
fn tracking() -> Agent {
    let mut agent = agent(InspectorConfig::default().with_async_call_stack_depth(8));
    load(&mut agent, script("1", "app.js", 50));
    agent
}

fn descriptions(agent: &Agent, operation_id: u32) -> Vec<String> {
    agent
        .tracker()
        .operation(operation_id)
        .expect("known operation")
        .stacks()
        .iter()
        .map(|stack| stack.description().to_owned())
        .collect()
}

/// Runs the callback of `operation_id` in a fresh frame, leaving it on the stack.
fn run_callback(agent: &mut Agent, operation_id: u32, function_name: &str) {
    agent.trace_async_callback_starting(operation_id);
    enter(agent, function_name, "1");
}

fn app_breakpoint(line_number: u32) -> SetBreakpointByUrlArguments {
    SetBreakpointByUrlArguments {
        line_number,
        url: Some("app.js".to_owned()),
        ..SetBreakpointByUrlArguments::default()
    }
}

fn finish_callback(agent: &mut Agent) {
    agent.bridge_mut().pop_frame();
    agent.trace_async_callback_completed();
}

#[rstest]
fn chains_are_capped_at_the_configured_depth(mut tracking: Agent) {
    tracking.set_async_call_stack_depth(2);
    enter(&mut tracking, "main", "1");
    let timer = tracking.trace_async_operation_starting("timer");
    tracking.bridge_mut().pop_frame();
    assert_eq!(timer, 1);

    run_callback(&mut tracking, timer, "onTimer");
    let fetch = tracking.trace_async_operation_starting("fetch");
    finish_callback(&mut tracking);
    assert_eq!(fetch, 2);
    assert_eq!(descriptions(&tracking, fetch), ["fetch", "timer"]);

    run_callback(&mut tracking, fetch, "onFetch");
    let xhr = tracking.trace_async_operation_starting("xhr");
    finish_callback(&mut tracking);
    assert_eq!(xhr, 3);
    assert_eq!(descriptions(&tracking, xhr), ["xhr", "fetch"]);
}

#[rstest]
fn pauses_inside_callbacks_show_the_async_stack(mut tracking: Agent) {
    tracking.set_breakpoint_by_url(app_breakpoint(20)).unwrap();
    enter(&mut tracking, "main", "1");
    execute(&mut tracking, 3);
    let timer = tracking.trace_async_operation_starting("setTimeout");
    tracking.bridge_mut().pop_frame();

    run_callback(&mut tracking, timer, "onTimer");
    execute(&mut tracking, 20);

    let paused = paused_events(&tracking);
    assert_eq!(paused.len(), 1);
    let trace = paused[0].async_stack_trace.as_ref().expect("async stack trace");
    assert_eq!(trace.description, "setTimeout");
    assert_eq!(trace.call_frames[0].function_name, "main");
    assert_eq!(trace.call_frames[0].line_number, 3);
    assert_eq!(trace.call_frames[0].url, "app.js");

    let names: Vec<&str> = tracking
        .frontend()
        .events()
        .iter()
        .map(InspectorEvent::name)
        .collect();
    assert_eq!(
        names,
        ["scriptParsed", "asyncOperationStarted", "paused", "resumed"]
    );
}

#[rstest]
fn completions_are_announced_only_after_the_start(mut tracking: Agent) {
    enter(&mut tracking, "main", "1");
    let announced = tracking.trace_async_operation_starting("interval");
    tracking.flush_async_operation_events();
    tracking.trace_async_operation_completed(announced);

    let silent = tracking.trace_async_operation_starting("timeout");
    tracking.trace_async_operation_completed(silent);
    tracking.flush_async_operation_events();

    let events = &tracking.frontend().events()[1..];
    assert_eq!(events.len(), 2);
    let InspectorEvent::AsyncOperationStarted { operation } = &events[0] else {
        panic!("expected asyncOperationStarted, got {:?}", events[0]);
    };
    assert_eq!(operation.id, announced);
    assert_eq!(operation.stack_trace.description, "interval");
    assert_eq!(
        events[1],
        InspectorEvent::AsyncOperationCompleted { id: announced }
    );
    assert_eq!(tracking.tracker().operation_count(), 0);
}

#[rstest]
fn step_into_async_pauses_in_the_scheduled_callback(mut tracking: Agent) {
    tracking.set_breakpoint_by_url(app_breakpoint(2)).unwrap();
    enter(&mut tracking, "main", "1");
    queue(&mut tracking, "stepIntoAsync", None);
    execute(&mut tracking, 2);

    let timer = tracking.trace_async_operation_starting("setTimeout");
    assert_eq!(tracking.bridge().armed_step(), None);
    execute(&mut tracking, 3);
    tracking.bridge_mut().pop_frame();
    assert_eq!(paused_events(&tracking).len(), 1);

    run_callback(&mut tracking, timer, "onTimer");
    execute(&mut tracking, 30);

    let paused = paused_events(&tracking);
    assert_eq!(paused.len(), 2);
    assert_eq!(
        paused[1].reason,
        BreakReason::AsyncOperation {
            operation_id: timer
        }
    );
    assert_eq!(paused[1].call_frames[0].function_name, "onTimer");
}

#[test]
fn step_into_async_needs_tracking() {
    let mut agent = agent(InspectorConfig::default());
    load(&mut agent, script("1", "app.js", 50));
    agent.set_breakpoint_by_url(app_breakpoint(2)).unwrap();
    enter(&mut agent, "main", "1");
    queue(&mut agent, "stepIntoAsync", None);
    execute(&mut agent, 2);

    assert_eq!(
        agent.frontend().responses(),
        [Err(InspectorError::AsyncTrackingDisabled)]
    );
    assert_eq!(agent.trace_async_operation_starting("timer"), 0);
}

#[rstest]
fn async_operation_breakpoints(mut tracking: Agent) {
    enter(&mut tracking, "main", "1");
    let first = tracking.trace_async_operation_starting("first");
    let second = tracking.trace_async_operation_starting("second");
    tracking.bridge_mut().pop_frame();

    tracking.set_async_operation_breakpoint(second).unwrap();
    assert_eq!(
        tracking.set_async_operation_breakpoint(99),
        Err(InspectorError::UnknownAsyncOperation(99))
    );

    run_callback(&mut tracking, first, "onFirst");
    execute(&mut tracking, 10);
    finish_callback(&mut tracking);
    assert_eq!(paused_events(&tracking).len(), 0);

    run_callback(&mut tracking, second, "onSecond");
    execute(&mut tracking, 11);
    finish_callback(&mut tracking);
    let paused = paused_events(&tracking);
    assert_eq!(paused.len(), 1);
    assert_eq!(
        paused[0].reason,
        BreakReason::AsyncOperation {
            operation_id: second
        }
    );

    tracking.remove_async_operation_breakpoint(second).unwrap();
    tracking.set_async_call_stack_depth(0);
    assert_eq!(
        tracking.remove_async_operation_breakpoint(second),
        Err(InspectorError::AsyncTrackingDisabled)
    );
}

#[rstest]
fn negative_depths_disable_tracking(mut tracking: Agent) {
    enter(&mut tracking, "main", "1");
    tracking.trace_async_operation_starting("timer");
    assert_eq!(tracking.tracker().operation_count(), 1);

    let depth = Command::parse("setAsyncCallStackDepth", Some(json!({ "maxDepth": -5 }))).unwrap();
    assert_eq!(tracking.execute(depth), Ok(CommandOutput::Empty));
    assert!(!tracking.tracker().is_enabled());
    assert_eq!(tracking.tracker().operation_count(), 0);
}

#[rstest]
fn nested_callbacks_keep_the_outer_chain(mut tracking: Agent) {
    enter(&mut tracking, "main", "1");
    let outer = tracking.trace_async_operation_starting("outer");
    let inner = tracking.trace_async_operation_starting("inner");
    tracking.bridge_mut().pop_frame();

    run_callback(&mut tracking, outer, "onOuter");
    tracking.bridge_mut().set_execution_depth(ExecutionDepth {
        recursion_level: 2,
        performing_microtask_checkpoint: false,
    });
    tracking.trace_async_callback_starting(inner);
    assert_eq!(tracking.tracker().current_operation_id(), outer);

    tracking.trace_async_callback_completed();
    assert_eq!(tracking.tracker().current_operation_id(), outer);
    finish_callback(&mut tracking);
    assert_eq!(tracking.tracker().current_operation_id(), 0);
}

#[rstest]
fn custom_reentry_rules_adopt_nested_callbacks(mut tracking: Agent) {
    tracking.set_async_reentry_predicate(|_| true);
    enter(&mut tracking, "main", "1");
    let outer = tracking.trace_async_operation_starting("outer");
    let inner = tracking.trace_async_operation_starting("inner");
    tracking.bridge_mut().pop_frame();

    run_callback(&mut tracking, outer, "onOuter");
    tracking.bridge_mut().set_execution_depth(ExecutionDepth {
        recursion_level: 2,
        performing_microtask_checkpoint: false,
    });
    tracking.trace_async_callback_starting(inner);
    assert_eq!(tracking.tracker().current_operation_id(), inner);

    tracking.trace_async_callback_completed();
    assert_eq!(tracking.tracker().current_operation_id(), 0);
}

#[rstest]
fn engine_tasks_map_onto_operations(mut tracking: Agent) {
    enter(&mut tracking, "main", "1");
    let enqueue = tracking
        .bridge()
        .async_task(AsyncTaskKind::Enqueue, "Promise.then", 7);
    tracking.handle_debug_event(enqueue);
    tracking.bridge_mut().pop_frame();
    assert_eq!(tracking.tracker().operation_count(), 1);

    let will_handle = tracking
        .bridge()
        .async_task(AsyncTaskKind::WillHandle, "Promise.then", 7);
    tracking.handle_debug_event(will_handle);
    assert_eq!(tracking.tracker().current_operation_id(), 1);

    let did_handle = tracking
        .bridge()
        .async_task(AsyncTaskKind::DidHandle, "Promise.then", 7);
    tracking.handle_debug_event(did_handle);
    assert_eq!(tracking.tracker().current_operation_id(), 0);
    assert_eq!(tracking.tracker().operation_count(), 0);
}

#[rstest]
fn reset_forgets_operations(mut tracking: Agent) {
    enter(&mut tracking, "main", "1");
    tracking.trace_async_operation_starting("timer");
    tracking.reset();
    assert_eq!(tracking.tracker().operation_count(), 0);
    assert!(tracking.tracker().is_enabled());
}
