//! Breakpoint bookkeeping.
//!
//! A protocol-level breakpoint (identified by a deterministic [`BreakpointId`]) may resolve
//! to any number of engine-native breakpoints, one per matching script. The store keeps
//! both directions of that mapping plus the persisted "cookies" used to re-resolve URL
//! breakpoints against scripts parsed later.

use std::fmt;

use indexmap::IndexMap;
use log::{debug, trace, warn};
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    bridge::EngineDebugBridge,
    error::{InspectorError, InspectorResult},
    script::{ScriptId, ScriptRegistry, UrlMatcher},
};

/// Identifier of a protocol-level breakpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BreakpointId(String);

impl BreakpointId {
    /// Id of a URL (or URL regex) breakpoint: `url:line:column` or `/regex/:line:column`.
    #[must_use]
    pub fn for_url(url: &str, is_regex: bool, line_number: u32, column_number: u32) -> Self {
        if is_regex {
            Self(format!("/{url}/:{line_number}:{column_number}"))
        } else {
            Self(format!("{url}:{line_number}:{column_number}"))
        }
    }

    /// Id of a breakpoint set directly on a script location.
    #[must_use]
    pub fn for_location(
        script_id: &ScriptId,
        line_number: u32,
        column_number: u32,
        source: BreakpointSource,
    ) -> Self {
        Self(format!(
            "{script_id}:{line_number}:{column_number}{}",
            source.id_suffix()
        ))
    }

    /// Wraps an id received from the front end.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as sent over the protocol.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle of a breakpoint inside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeBreakpointId(String);

impl NativeBreakpointId {
    /// Wraps an engine-issued handle.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The handle as issued by the engine.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NativeBreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who asked for a breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BreakpointSource {
    /// Set through the protocol.
    User,
    /// Set by the `debug(fn)` console helper.
    DebugCommand,
    /// Set by the `monitor(fn)` console helper.
    Monitor,
}

impl BreakpointSource {
    fn id_suffix(self) -> &'static str {
        match self {
            Self::User => "",
            Self::DebugCommand => ":debug",
            Self::Monitor => ":monitor",
        }
    }
}

/// A script position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Script the position is in.
    pub script_id: ScriptId,
    /// Zero-based line.
    pub line_number: u32,
    /// Zero-based column.
    #[serde(default)]
    pub column_number: u32,
}

impl Location {
    /// Builds a location from its parts.
    pub fn new(script_id: ScriptId, line_number: u32, column_number: u32) -> Self {
        Self {
            script_id,
            line_number,
            column_number,
        }
    }
}

/// What the engine is asked to break on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBreakpoint {
    /// Requested line.
    pub line_number: u32,
    /// Requested column.
    pub column_number: u32,
    /// Condition expression; empty means unconditional.
    pub condition: String,
}

/// Persisted description of a URL breakpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointCookie {
    /// URL, or a regex source when `is_regex` is set.
    pub url: String,
    /// Requested line.
    pub line_number: u32,
    /// Requested column.
    pub column_number: u32,
    /// Condition expression; empty means unconditional.
    #[serde(default)]
    pub condition: String,
    /// Whether `url` is a regular expression.
    #[serde(default)]
    pub is_regex: bool,
}

impl BreakpointCookie {
    fn script_breakpoint(&self) -> ScriptBreakpoint {
        ScriptBreakpoint {
            line_number: self.line_number,
            column_number: self.column_number,
            condition: self.condition.clone(),
        }
    }
}

/// One engine breakpoint produced by a protocol breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBreakpoint {
    /// Engine handle.
    pub native_id: NativeBreakpointId,
    /// Where the engine actually placed it.
    pub location: Location,
}

/// Breakpoint registry: forward map, reverse map and cookies.
#[derive(Debug, Default)]
pub struct BreakpointStore {
    cookies: IndexMap<BreakpointId, BreakpointCookie>,
    resolved: FxHashMap<BreakpointId, Vec<ResolvedBreakpoint>>,
    native: FxHashMap<NativeBreakpointId, (BreakpointId, BreakpointSource)>,
    url_patterns: FxHashMap<BreakpointId, Regex>,
}

impl BreakpointStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a breakpoint on every current and future script whose URL matches.
    ///
    /// Returns the breakpoint id and the locations it resolved to right away; an empty
    /// list is not an error since matching scripts may be parsed later.
    pub fn set_breakpoint_by_url<B: EngineDebugBridge>(
        &mut self,
        bridge: &mut B,
        scripts: &ScriptRegistry,
        cookie: BreakpointCookie,
    ) -> InspectorResult<(BreakpointId, Vec<Location>)> {
        let matcher = UrlMatcher::new(&cookie.url, cookie.is_regex)?;
        let id = BreakpointId::for_url(
            &cookie.url,
            cookie.is_regex,
            cookie.line_number,
            cookie.column_number,
        );
        if self.cookies.contains_key(&id) {
            return Err(InspectorError::DuplicateBreakpoint(id));
        }

        let breakpoint = cookie.script_breakpoint();
        let targets: Vec<ScriptId> = scripts
            .iter()
            .filter(|script| matcher.matches(script.url()))
            .map(|script| script.id().clone())
            .collect();
        if let UrlMatcher::Pattern(regex) = &matcher {
            self.url_patterns.insert(id.clone(), regex.clone());
        }
        self.cookies.insert(id.clone(), cookie);

        let locations = targets
            .iter()
            .filter_map(|script_id| {
                self.resolve_breakpoint(
                    bridge,
                    scripts,
                    &id,
                    script_id,
                    &breakpoint,
                    BreakpointSource::User,
                )
            })
            .collect();
        Ok((id, locations))
    }

    /// Sets a breakpoint on one script location.
    pub fn set_breakpoint<B: EngineDebugBridge>(
        &mut self,
        bridge: &mut B,
        scripts: &ScriptRegistry,
        location: &Location,
        condition: String,
        source: BreakpointSource,
    ) -> InspectorResult<(BreakpointId, Location)> {
        let id = BreakpointId::for_location(
            &location.script_id,
            location.line_number,
            location.column_number,
            source,
        );
        if self.resolved.contains_key(&id) {
            return Err(InspectorError::DuplicateBreakpoint(id));
        }
        let breakpoint = ScriptBreakpoint {
            line_number: location.line_number,
            column_number: location.column_number,
            condition,
        };
        self.resolve_breakpoint(
            bridge,
            scripts,
            &id,
            &location.script_id,
            &breakpoint,
            source,
        )
        .map(|actual| (id, actual))
        .ok_or_else(|| {
            InspectorError::UnresolvedTarget(format!(
                "Could not resolve breakpoint at {}:{}",
                location.script_id, location.line_number
            ))
        })
    }

    /// Asks the engine for a native breakpoint and records it in both directions.
    ///
    /// Returns `None` when the script is unknown, the requested or the adjusted line is
    /// outside the script, or the engine refuses the location.
    pub fn resolve_breakpoint<B: EngineDebugBridge>(
        &mut self,
        bridge: &mut B,
        scripts: &ScriptRegistry,
        breakpoint_id: &BreakpointId,
        script_id: &ScriptId,
        breakpoint: &ScriptBreakpoint,
        source: BreakpointSource,
    ) -> Option<Location> {
        let Some(script) = scripts.find(script_id) else {
            warn!("cannot resolve {breakpoint_id}: script {script_id} is not registered");
            return None;
        };
        if !script.contains_line(breakpoint.line_number) {
            debug!(
                "{breakpoint_id}: line {} is outside {script_id} ({}..={})",
                breakpoint.line_number,
                script.start_line(),
                script.end_line()
            );
            return None;
        }

        let native = bridge.set_breakpoint(script_id, breakpoint, false)?;
        if !script.contains_line(native.line_number) {
            debug!(
                "{breakpoint_id}: engine moved line {} to {}, outside {script_id}",
                breakpoint.line_number, native.line_number
            );
            bridge.remove_breakpoint(&native.id);
            return None;
        }
        trace!(
            "{breakpoint_id} resolved to native {} at {}:{}",
            native.id, native.line_number, native.column_number
        );
        let location = Location::new(script_id.clone(), native.line_number, native.column_number);
        self.native
            .insert(native.id.clone(), (breakpoint_id.clone(), source));
        self.resolved
            .entry(breakpoint_id.clone())
            .or_default()
            .push(ResolvedBreakpoint {
                native_id: native.id,
                location: location.clone(),
            });
        Some(location)
    }

    /// Re-resolves persisted URL breakpoints against a freshly parsed script.
    ///
    /// Returns the `(breakpoint id, location)` pairs that resolved.
    pub fn resolve_cookies_for_script<B: EngineDebugBridge>(
        &mut self,
        bridge: &mut B,
        scripts: &ScriptRegistry,
        script_id: &ScriptId,
    ) -> Vec<(BreakpointId, Location)> {
        let Some(url) = scripts.find(script_id).map(|script| script.url().to_owned()) else {
            return Vec::new();
        };
        if url.is_empty() {
            return Vec::new();
        }

        let candidates: Vec<(BreakpointId, ScriptBreakpoint)> = self
            .cookies
            .iter()
            .filter(|(id, cookie)| {
                if cookie.is_regex {
                    self.url_patterns
                        .get(*id)
                        .is_some_and(|regex| regex.is_match(&url))
                } else {
                    cookie.url == url
                }
            })
            .map(|(id, cookie)| (id.clone(), cookie.script_breakpoint()))
            .collect();

        candidates
            .into_iter()
            .filter_map(|(id, breakpoint)| {
                self.resolve_breakpoint(
                    bridge,
                    scripts,
                    &id,
                    script_id,
                    &breakpoint,
                    BreakpointSource::User,
                )
                .map(|location| (id, location))
            })
            .collect()
    }

    /// Removes a breakpoint, its cookie and every native breakpoint it produced.
    ///
    /// Unknown ids are ignored.
    pub fn remove_breakpoint<B: EngineDebugBridge>(&mut self, bridge: &mut B, id: &BreakpointId) {
        self.cookies.shift_remove(id);
        self.url_patterns.remove(id);
        let Some(resolved) = self.resolved.remove(id) else {
            return;
        };
        for breakpoint in resolved {
            bridge.remove_breakpoint(&breakpoint.native_id);
            self.native.remove(&breakpoint.native_id);
        }
        debug!("removed breakpoint {id}");
    }

    /// Maps a native breakpoint hit back to the protocol breakpoint.
    #[must_use]
    pub fn lookup_hit(&self, native: &NativeBreakpointId) -> Option<&(BreakpointId, BreakpointSource)> {
        self.native.get(native)
    }

    /// The resolved handles of one breakpoint.
    #[must_use]
    pub fn resolved(&self, id: &BreakpointId) -> &[ResolvedBreakpoint] {
        self.resolved.get(id).map_or(&[], Vec::as_slice)
    }

    /// The cookie of a URL breakpoint.
    #[must_use]
    pub fn cookie(&self, id: &BreakpointId) -> Option<&BreakpointCookie> {
        self.cookies.get(id)
    }

    /// Persisted cookies in insertion order.
    #[must_use]
    pub fn cookies(&self) -> &IndexMap<BreakpointId, BreakpointCookie> {
        &self.cookies
    }

    /// Replaces the cookies, e.g. when restoring a saved agent state.
    ///
    /// Regex cookies whose pattern no longer compiles are dropped.
    pub fn restore_cookies(&mut self, cookies: IndexMap<BreakpointId, BreakpointCookie>) {
        self.url_patterns.clear();
        self.cookies = cookies;
        self.cookies.retain(|id, cookie| {
            if !cookie.is_regex {
                return true;
            }
            match Regex::new(&cookie.url) {
                Ok(regex) => {
                    self.url_patterns.insert(id.clone(), regex);
                    true
                }
                Err(err) => {
                    warn!("dropping breakpoint {id}: {err}");
                    false
                }
            }
        });
    }

    /// Number of native breakpoints currently registered with the engine.
    #[must_use]
    pub fn native_count(&self) -> usize {
        self.native.len()
    }

    /// Returns `true` when there are neither cookies nor resolved breakpoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.resolved.is_empty() && self.native.is_empty()
    }

    /// Forgets resolved breakpoints but keeps cookies, for a script-registry reset.
    pub fn clear_resolved(&mut self) {
        self.resolved.clear();
        self.native.clear();
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.cookies.clear();
        self.url_patterns.clear();
        self.clear_resolved();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("app.js", false, 10, 0, "app.js:10:0" ; "plain url")]
    #[test_case(r"app\.js", true, 3, 4, r"/app\.js/:3:4" ; "regex url")]
    fn url_breakpoint_ids(url: &str, is_regex: bool, line: u32, column: u32, expected: &str) {
        assert_eq!(
            BreakpointId::for_url(url, is_regex, line, column).as_str(),
            expected
        );
    }

    #[test_case(BreakpointSource::User, "7:1:2" ; "user")]
    #[test_case(BreakpointSource::DebugCommand, "7:1:2:debug" ; "debug command")]
    #[test_case(BreakpointSource::Monitor, "7:1:2:monitor" ; "monitor")]
    fn location_breakpoint_ids(source: BreakpointSource, expected: &str) {
        let id = BreakpointId::for_location(&ScriptId::new("7"), 1, 2, source);
        assert_eq!(id.as_str(), expected);
    }

    #[test]
    fn cookie_round_trips_through_json() {
        let cookie = BreakpointCookie {
            url: "app.js".to_owned(),
            line_number: 3,
            column_number: 0,
            condition: "x > 1".to_owned(),
            is_regex: false,
        };
        let json = serde_json::to_value(&cookie).unwrap();
        assert_eq!(json["lineNumber"], 3);
        assert_eq!(json["isRegex"], false);
    }
}
