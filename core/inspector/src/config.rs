//! Agent configuration.

use serde::{Deserialize, Serialize};

/// Tunables of the debugger agent.
///
/// Every field has a default so a partial TOML table deserializes cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct InspectorConfig {
    /// Maximum number of async stacks kept in a causal chain. `0` disables tracking.
    pub max_async_call_stack_depth: usize,

    /// How many blackboxed frames a single step may skip before falling back to step-out.
    pub max_skipped_step_frames: usize,

    /// Synchronous frames captured per async snapshot.
    pub async_stack_frame_limit: usize,

    /// Frames captured when pausing. `0` captures the whole stack.
    pub backtrace_frame_limit: usize,

    /// Initial blackbox pattern, matched against script URLs.
    pub skip_stack_pattern: Option<String>,

    /// Whether content scripts are blackboxed from the start.
    pub skip_content_scripts: bool,
}

impl InspectorConfig {
    /// Default cap on skipped blackboxed frames per step.
    pub const DEFAULT_MAX_SKIPPED_STEP_FRAMES: usize = 128;

    /// Default number of frames captured for an async snapshot.
    pub const DEFAULT_ASYNC_STACK_FRAME_LIMIT: usize = 32;

    /// Sets the async call stack depth.
    #[must_use]
    pub fn with_async_call_stack_depth(mut self, depth: usize) -> Self {
        self.max_async_call_stack_depth = depth;
        self
    }
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            max_async_call_stack_depth: 0,
            max_skipped_step_frames: Self::DEFAULT_MAX_SKIPPED_STEP_FRAMES,
            async_stack_frame_limit: Self::DEFAULT_ASYNC_STACK_FRAME_LIMIT,
            backtrace_frame_limit: 0,
            skip_stack_pattern: None,
            skip_content_scripts: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::InspectorConfig;

    #[test]
    fn partial_table_keeps_defaults() {
        let config: InspectorConfig =
            serde_json::from_str(r#"{ "max-async-call-stack-depth": 4 }"#).unwrap();

        assert_eq!(config.max_async_call_stack_depth, 4);
        assert_eq!(
            config.max_skipped_step_frames,
            InspectorConfig::DEFAULT_MAX_SKIPPED_STEP_FRAMES
        );
        assert!(config.skip_stack_pattern.is_none());
    }
}
