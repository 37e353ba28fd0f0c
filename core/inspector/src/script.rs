//! Script registry and blackbox rules.
//!
//! The registry maps opaque script ids reported by the engine to their metadata. It also
//! owns the blackbox (skip) rules: a URL pattern plus a generation counter. Each script
//! memoizes its blackbox verdict tagged with the generation it was computed for, so
//! changing the pattern invalidates every cached verdict by bumping one integer.

use std::{fmt, sync::LazyLock};

use indexmap::IndexMap;
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{InspectorError, InspectorResult};

/// Opaque identifier of a parsed script, as assigned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptId(String);

impl ScriptId {
    /// Creates a script id from its engine representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScriptId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ScriptId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A compilation unit as reported by the engine's parse callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedScript {
    /// Engine id of the script.
    pub script_id: ScriptId,
    /// URL the script was loaded from.
    #[serde(default)]
    pub url: String,
    /// Source text.
    #[serde(default)]
    pub source: String,
    /// First line of the script in its resource.
    #[serde(default)]
    pub start_line: u32,
    /// First column of the script in its resource.
    #[serde(default)]
    pub start_column: u32,
    /// Last line of the script.
    pub end_line: u32,
    /// Last column of the script.
    #[serde(default)]
    pub end_column: u32,
    /// Whether an extension injected the script.
    #[serde(default)]
    pub is_content_script: bool,
    /// Whether the script belongs to the embedder.
    #[serde(default)]
    pub is_internal_script: bool,
    /// Source map the engine reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_map_url: Option<String>,
    /// Whether `url` comes from a `sourceURL` comment.
    #[serde(default)]
    pub has_source_url: bool,
}

/// Metadata the agent keeps for every parsed script.
#[derive(Debug, Clone)]
pub struct Script {
    id: ScriptId,
    url: String,
    source: String,
    edited_source: Option<String>,
    start_line: u32,
    start_column: u32,
    end_line: u32,
    end_column: u32,
    is_content_script: bool,
    is_internal_script: bool,
    source_map_url: Option<String>,
    blackbox_cache: Option<BlackboxVerdict>,
}

#[derive(Debug, Clone, Copy)]
struct BlackboxVerdict {
    generation: u32,
    blackboxed: bool,
}

impl Script {
    fn from_parsed(parsed: &ParsedScript) -> Self {
        Self {
            id: parsed.script_id.clone(),
            url: parsed.url.clone(),
            source: parsed.source.clone(),
            edited_source: None,
            start_line: parsed.start_line,
            start_column: parsed.start_column,
            end_line: parsed.end_line,
            end_column: parsed.end_column,
            is_content_script: parsed.is_content_script,
            is_internal_script: parsed.is_internal_script,
            source_map_url: parsed.source_map_url.clone(),
            blackbox_cache: None,
        }
    }

    /// The engine id of this script.
    #[must_use]
    pub fn id(&self) -> &ScriptId {
        &self.id
    }

    /// The source URL; empty for anonymous scripts.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The current source, taking live edits into account.
    #[must_use]
    pub fn source(&self) -> &str {
        self.edited_source.as_deref().unwrap_or(&self.source)
    }

    /// Replaces the source after a successful live edit.
    pub fn set_edited_source(&mut self, source: String) {
        self.edited_source = Some(source);
    }

    /// First line of the script in its resource.
    #[must_use]
    pub fn start_line(&self) -> u32 {
        self.start_line
    }

    /// First column of the script in its resource.
    #[must_use]
    pub fn start_column(&self) -> u32 {
        self.start_column
    }

    /// Last line of the script.
    #[must_use]
    pub fn end_line(&self) -> u32 {
        self.end_line
    }

    /// Last column of the script.
    #[must_use]
    pub fn end_column(&self) -> u32 {
        self.end_column
    }

    /// Whether an extension injected the script.
    #[must_use]
    pub fn is_content_script(&self) -> bool {
        self.is_content_script
    }

    /// Whether the script belongs to the embedder.
    #[must_use]
    pub fn is_internal_script(&self) -> bool {
        self.is_internal_script
    }

    /// Source map named by the source, or else by the engine.
    #[must_use]
    pub fn source_map_url(&self) -> Option<&str> {
        self.source_map_url.as_deref()
    }

    /// Returns `true` if `line` lies within the script's line bounds.
    #[must_use]
    pub fn contains_line(&self, line: u32) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    fn cached_verdict(&self, generation: u32) -> Option<bool> {
        self.blackbox_cache
            .filter(|verdict| verdict.generation == generation)
            .map(|verdict| verdict.blackboxed)
    }
}

/// Blackbox (skip) rules for stepping and exception pauses.
#[derive(Debug, Clone)]
pub struct BlackboxRules {
    pattern: Option<Regex>,
    generation: u32,
    skip_content_scripts: bool,
}

impl Default for BlackboxRules {
    fn default() -> Self {
        Self {
            pattern: None,
            generation: 1,
            skip_content_scripts: false,
        }
    }
}

impl BlackboxRules {
    /// Replaces the skip pattern. An empty pattern clears it.
    ///
    /// The generation is bumped even when the pattern text is unchanged so every cached
    /// verdict gets recomputed.
    pub fn set_pattern(&mut self, pattern: Option<&str>) -> InspectorResult<()> {
        let compiled = match pattern.filter(|p| !p.is_empty()) {
            Some(pattern) => Some(
                Regex::new(pattern).map_err(|_| InspectorError::InvalidPattern(pattern.to_owned()))?,
            ),
            None => None,
        };
        self.pattern = compiled;
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            self.generation = 1;
        }
        Ok(())
    }

    /// The current pattern source, if any.
    #[must_use]
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_ref().map(Regex::as_str)
    }

    /// Bumped whenever the pattern is replaced; cached verdicts of older generations are stale.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Whether content scripts are blackboxed.
    #[must_use]
    pub fn skip_content_scripts(&self) -> bool {
        self.skip_content_scripts
    }

    /// Blackboxes or unblackboxes content scripts.
    pub fn set_skip_content_scripts(&mut self, skip: bool) {
        self.skip_content_scripts = skip;
    }
}

/// Maps script ids to parsed-script metadata, in parse order.
#[derive(Debug, Default)]
pub struct ScriptRegistry {
    scripts: IndexMap<ScriptId, Script>,
    blackbox: BlackboxRules,
}

impl ScriptRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly parsed script, replacing any previous entry with the same id.
    pub fn register(&mut self, parsed: &ParsedScript) -> &Script {
        debug!("registering script {} ({})", parsed.script_id, parsed.url);
        let script = Script::from_parsed(parsed);
        let (index, previous) = self.scripts.insert_full(parsed.script_id.clone(), script);
        if previous.is_some() {
            warn!("script {} was reported twice", parsed.script_id);
        }
        &self.scripts[index]
    }

    /// Looks a script up by id.
    #[must_use]
    pub fn find(&self, id: &ScriptId) -> Option<&Script> {
        self.scripts.get(id)
    }

    /// Looks a script up by id for mutation.
    pub fn find_mut(&mut self, id: &ScriptId) -> Option<&mut Script> {
        self.scripts.get_mut(id)
    }

    /// Returns the ids of every script whose URL matches `url_or_pattern`.
    ///
    /// Plain URLs match by string equality, patterns as an unanchored regex search.
    pub fn matching_scripts(
        &self,
        url_or_pattern: &str,
        is_regex: bool,
    ) -> InspectorResult<Vec<ScriptId>> {
        let matcher = UrlMatcher::new(url_or_pattern, is_regex)?;
        Ok(self
            .scripts
            .values()
            .filter(|script| matcher.matches(&script.url))
            .map(|script| script.id.clone())
            .collect())
    }

    /// Iterates over scripts in parse order.
    pub fn iter(&self) -> impl Iterator<Item = &Script> {
        self.scripts.values()
    }

    /// Number of registered scripts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// Whether no script is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Forgets every script. Blackbox rules survive.
    pub fn clear(&mut self) {
        self.scripts.clear();
    }

    /// Blackbox rules.
    #[must_use]
    pub fn blackbox(&self) -> &BlackboxRules {
        &self.blackbox
    }

    /// Mutable access to the blackbox rules.
    pub fn blackbox_mut(&mut self) -> &mut BlackboxRules {
        &mut self.blackbox
    }

    /// Returns `true` if frames of this script are stepped through without pausing.
    ///
    /// Unknown scripts count as blackboxed.
    pub fn is_script_blackboxed(&mut self, id: &ScriptId) -> bool {
        let Some(script) = self.scripts.get_mut(id) else {
            return true;
        };
        if self.blackbox.skip_content_scripts && script.is_content_script {
            return true;
        }
        let Some(pattern) = &self.blackbox.pattern else {
            return false;
        };
        if script.url.is_empty() {
            return false;
        }
        let generation = self.blackbox.generation;
        if let Some(blackboxed) = script.cached_verdict(generation) {
            return blackboxed;
        }
        let blackboxed = pattern.is_match(&script.url);
        script.blackbox_cache = Some(BlackboxVerdict {
            generation,
            blackboxed,
        });
        blackboxed
    }
}

static SOURCE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*//[#@][ \t]*sourceURL=[ \t]*(\S+)[ \t]*$").expect("valid regex")
});

static SOURCE_MAP_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*//[#@][ \t]*sourceMappingURL=[ \t]*(\S+)[ \t]*$").expect("valid regex")
});

/// Extracts the last `//# sourceURL=` magic comment of a script.
#[must_use]
pub fn find_source_url(source: &str) -> Option<&str> {
    SOURCE_URL
        .captures_iter(source)
        .last()
        .and_then(|captures| captures.get(1))
        .map(|url| url.as_str())
}

/// Extracts the last `//# sourceMappingURL=` magic comment of a script.
#[must_use]
pub fn find_source_map_url(source: &str) -> Option<&str> {
    SOURCE_MAP_URL
        .captures_iter(source)
        .last()
        .and_then(|captures| captures.get(1))
        .map(|url| url.as_str())
}

/// Matches script URLs either literally or by regex.
#[derive(Debug, Clone)]
pub(crate) enum UrlMatcher<'a> {
    Exact(&'a str),
    Pattern(Regex),
}

impl<'a> UrlMatcher<'a> {
    pub(crate) fn new(url_or_pattern: &'a str, is_regex: bool) -> InspectorResult<Self> {
        if is_regex {
            Regex::new(url_or_pattern)
                .map(Self::Pattern)
                .map_err(|_| InspectorError::InvalidPattern(url_or_pattern.to_owned()))
        } else {
            Ok(Self::Exact(url_or_pattern))
        }
    }

    pub(crate) fn matches(&self, url: &str) -> bool {
        match self {
            Self::Exact(expected) => *expected == url,
            Self::Pattern(regex) => regex.is_match(url),
        }
    }
}
