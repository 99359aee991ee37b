use std::num::NonZeroUsize;

#[cfg(feature = "json_schema")]
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// Per-call traversal settings.
///
/// Aggregation into a [`crate::Completion`] only happens when a completion
/// handler is registered; these flags control what that aggregate carries.
#[cfg_attr(feature = "json_schema", derive(JsonSchema))]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalkOptions {
    /// Keep each entry's [`crate::FileStat`] in the completion aggregate.
    #[serde(default)]
    pub with_stats: bool,

    /// Keep file bytes in the completion aggregate of
    /// [`crate::read_matching`].
    #[serde(default)]
    pub with_content: bool,

    /// Upper bound on filesystem operations running at once. Operations past
    /// the bound wait in issue order. `None` means unbounded.
    #[serde(default)]
    pub max_in_flight: Option<NonZeroUsize>,
}

impl WalkOptions {
    /// Default options: no stats, no contents, unbounded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets [`WalkOptions::with_stats`].
    pub fn with_stats(mut self, yes: bool) -> Self {
        self.with_stats = yes;
        self
    }

    /// Sets [`WalkOptions::with_content`].
    pub fn with_content(mut self, yes: bool) -> Self {
        self.with_content = yes;
        self
    }

    /// Sets [`WalkOptions::max_in_flight`].
    pub fn max_in_flight(mut self, limit: NonZeroUsize) -> Self {
        self.max_in_flight = Some(limit);
        self
    }
}
