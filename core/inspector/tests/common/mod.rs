#![allow(dead_code)]

use boa_inspector::{
    Command, DebuggerAgent, InspectorConfig,
    bridge::{ScriptedEngine, ScriptedFrame},
    frontend::{PausedEvent, RecordingFrontend},
    script::ParsedScript,
};
use serde_json::Value;

pub type Agent = DebuggerAgent<ScriptedEngine, RecordingFrontend>;

/// An enabled agent over a fresh scripted engine.
pub fn agent(config: InspectorConfig) -> Agent {
    let mut agent = DebuggerAgent::new(ScriptedEngine::new(), RecordingFrontend::new(), config)
        .expect("valid config");
    agent.enable();
    agent
}

pub fn script(script_id: &str, url: &str, end_line: u32) -> ParsedScript {
    ParsedScript {
        script_id: script_id.into(),
        url: url.to_owned(),
        source: String::new(),
        start_line: 0,
        start_column: 0,
        end_line,
        end_column: 0,
        is_content_script: false,
        is_internal_script: false,
        source_map_url: None,
        has_source_url: false,
    }
}

/// Parses `script` in the engine and forwards the notification.
pub fn load(agent: &mut Agent, script: ParsedScript) {
    let event = agent.bridge_mut().parse_script(script, None);
    agent.handle_debug_event(event);
}

pub fn enter(agent: &mut Agent, function_name: &str, script_id: &str) {
    agent
        .bridge_mut()
        .push_frame(ScriptedFrame::new(function_name, script_id, 0));
}

/// Runs a statement of the top frame, pausing if the engine stops there.
pub fn execute(agent: &mut Agent, line_number: u32) {
    if let Some(event) = agent.bridge_mut().execute_statement(line_number, 0) {
        agent.handle_debug_event(event);
    }
}

/// Queues a command for the next pause.
pub fn queue(agent: &mut Agent, name: &str, args: Option<Value>) {
    let command = Command::parse(name, args).expect("valid command");
    agent.frontend_mut().queue(command);
}

pub fn paused_events(agent: &Agent) -> Vec<PausedEvent> {
    agent.frontend().paused_events().cloned().collect()
}

pub fn event_names(agent: &Agent) -> Vec<&'static str> {
    agent
        .frontend()
        .events()
        .iter()
        .map(|event| event.name())
        .collect()
}
