//! Call frames as shown to the front end.
//!
//! Frames only live for the pause they were captured in. Their ids encode the pause epoch
//! next to the frame ordinal, so an id kept across a resume is recognized as stale
//! instead of silently naming whatever frame now sits at that ordinal.

use serde::{Deserialize, Serialize};

use crate::{
    breakpoint::Location,
    bridge::{EngineDebugBridge, RawCallFrame, RemoteObject, ScopeKind},
    error::{InspectorError, InspectorResult},
};

/// Object group every value wrapped for a pause belongs to.
pub const BACKTRACE_OBJECT_GROUP: &str = "backtrace";

/// Parsed form of a call frame id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFrameId {
    /// Position of the frame in the paused stack, top first.
    pub ordinal: usize,
    /// Pause the id was issued in.
    pub epoch: u32,
}

impl CallFrameId {
    /// Parses an id received from the front end.
    pub fn parse(id: &str) -> InspectorResult<Self> {
        serde_json::from_str(id).map_err(|_| InspectorError::UnknownFrame(id.to_owned()))
    }

    /// Checks the id against the current pause and returns the frame ordinal.
    pub fn resolve(id: &str, epoch: u32, frame_count: usize) -> InspectorResult<usize> {
        let parsed = Self::parse(id)?;
        if parsed.epoch != epoch {
            return Err(InspectorError::StaleFrame(id.to_owned()));
        }
        if parsed.ordinal >= frame_count {
            return Err(InspectorError::UnknownFrame(id.to_owned()));
        }
        Ok(parsed.ordinal)
    }
}

impl std::fmt::Display for CallFrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{\"ordinal\":{},\"epoch\":{}}}", self.ordinal, self.epoch)
    }
}

/// A scope of a call frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    /// Kind of the scope.
    #[serde(rename = "type")]
    pub kind: ScopeKind,
    /// Object holding the scope's variables.
    pub object: RemoteObject,
}

/// A call frame of the paused stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    /// Id to address the frame in later commands during the same pause.
    pub call_frame_id: String,
    /// Name of the function, empty for top-level code.
    pub function_name: String,
    /// Current position in the frame.
    pub location: Location,
    /// Scopes, innermost first.
    pub scope_chain: Vec<Scope>,
    /// The frame's `this` value.
    pub this: RemoteObject,
    /// Value about to be returned, when stopped at a return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<RemoteObject>,
}

/// Wraps captured frames for display; values go into the backtrace object group.
pub(crate) fn wrap_call_frames<B: EngineDebugBridge>(
    bridge: &mut B,
    frames: &[RawCallFrame<B::Value>],
    epoch: u32,
) -> Vec<CallFrame> {
    frames
        .iter()
        .enumerate()
        .map(|(ordinal, frame)| CallFrame {
            call_frame_id: CallFrameId { ordinal, epoch }.to_string(),
            function_name: frame.function_name.clone(),
            location: Location::new(
                frame.script_id.clone(),
                frame.line_number,
                frame.column_number,
            ),
            scope_chain: frame
                .scope_chain
                .iter()
                .map(|scope| Scope {
                    kind: scope.kind,
                    object: bridge.wrap(&scope.object, BACKTRACE_OBJECT_GROUP, false),
                })
                .collect(),
            this: bridge.wrap(&frame.this, BACKTRACE_OBJECT_GROUP, false),
            return_value: frame
                .return_value
                .as_ref()
                .map(|value| bridge.wrap(value, BACKTRACE_OBJECT_GROUP, false)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn ids_round_trip_through_display() {
        let id = CallFrameId { ordinal: 2, epoch: 7 };
        assert_eq!(CallFrameId::parse(&id.to_string()), Ok(id));
    }

    #[test_case(r#"{"ordinal":0,"epoch":3}"#, Ok(0) ; "current pause")]
    #[test_case(r#"{"ordinal":0,"epoch":2}"#, Err("stale") ; "earlier pause")]
    #[test_case(r#"{"ordinal":5,"epoch":3}"#, Err("unknown") ; "out of range")]
    #[test_case("garbage", Err("unknown") ; "unparseable")]
    fn resolves_against_current_pause(id: &str, expected: Result<usize, &str>) {
        let result = CallFrameId::resolve(id, 3, 2);
        match expected {
            Ok(ordinal) => assert_eq!(result, Ok(ordinal)),
            Err("stale") => assert!(matches!(result, Err(InspectorError::StaleFrame(_)))),
            Err(_) => assert!(matches!(result, Err(InspectorError::UnknownFrame(_)))),
        }
    }
}
