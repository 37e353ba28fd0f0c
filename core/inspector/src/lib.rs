//! Boa's **`boa_inspector`** crate is a script debugger core for embedded JavaScript
//! engines.
//!
//! The crate is split along the seams of a debugger:
//!
//! - [`bridge`]: the [`EngineDebugBridge`] trait an engine implements, plus a
//!   deterministic [`ScriptedEngine`](bridge::ScriptedEngine) used for testing and replay.
//! - [`script`] and [`breakpoint`]: parsed scripts, blackbox rules, and breakpoints that
//!   persist by URL and resolve into native engine breakpoints as scripts appear.
//! - [`async_chain`]: causal call chains across timers, promise reactions and other
//!   deferred work.
//! - [`agent`]: the [`DebuggerAgent`] pause/step state machine and its command surface.
//! - [`frontend`] and [`protocol`]: how notifications leave the agent and commands reach
//!   it, including a `Content-Length` framed JSON protocol.
//!
//! # Example
//!
//! ```
//! use boa_inspector::{
//!     DebuggerAgent, InspectorConfig,
//!     breakpoint::Location,
//!     bridge::{ScriptedEngine, ScriptedFrame},
//!     frontend::{InspectorEvent, RecordingFrontend},
//!     script::ParsedScript,
//! };
//!
//! let mut agent =
//!     DebuggerAgent::new(ScriptedEngine::new(), RecordingFrontend::new(), InspectorConfig::default())
//!         .unwrap();
//! agent.enable();
//!
//! let script = ParsedScript {
//!     script_id: "1".into(),
//!     url: "app.js".to_owned(),
//!     source: String::new(),
//!     start_line: 0,
//!     start_column: 0,
//!     end_line: 20,
//!     end_column: 0,
//!     is_content_script: false,
//!     is_internal_script: false,
//!     source_map_url: None,
//!     has_source_url: false,
//! };
//! let parsed = agent.bridge_mut().parse_script(script, None);
//! agent.handle_debug_event(parsed);
//!
//! let location = Location::new("1".into(), 4, 0);
//! agent.set_breakpoint(&location, String::new()).unwrap();
//!
//! agent.bridge_mut().push_frame(ScriptedFrame::new("main", "1", 0));
//! let event = agent.bridge_mut().execute_statement(4, 0).unwrap();
//! agent.handle_debug_event(event);
//!
//! assert_eq!(agent.frontend().paused_events().count(), 1);
//! assert!(matches!(agent.frontend().events().last(), Some(InspectorEvent::Resumed)));
//! ```
#![cfg_attr(test, allow(clippy::needless_raw_string_hashes))]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::too_many_lines
)]

pub mod agent;
pub mod async_chain;
pub mod breakpoint;
pub mod bridge;
pub mod config;
pub mod error;
pub mod frontend;
pub mod protocol;
pub mod script;

pub use crate::{
    agent::{AgentStateCookie, BreakReason, Command, CommandOutput, DebuggerAgent, ExecutionState},
    async_chain::AsyncCallChainTracker,
    breakpoint::BreakpointStore,
    bridge::EngineDebugBridge,
    config::InspectorConfig,
    error::{InspectorError, InspectorResult},
    frontend::{Frontend, InspectorEvent},
    script::ScriptRegistry,
};
