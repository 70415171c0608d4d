//! Demo-video registry.
//!
//! Some survey clips ship with pre-computed detections. A video whose file
//! name matches a registry entry is routed to that canned dataset instead
//! of live AI processing. Entries are matched in order, case-insensitively,
//! and the first match wins.

use regex::{Regex, RegexBuilder};

use crate::error::CoreError;

/// Built-in demo clips: `(dataset key, file-name pattern)`.
const BUILTIN_ENTRIES: &[(&str, &str)] = &[
    ("route-5-nh48", r"^route[_-]?5[_-].*nh[_-]?48.*\.(mp4|mov|mkv)$"),
    ("route-2-city-ring", r"^route[_-]?2[_-].*ring.*\.(mp4|mov|mkv)$"),
    ("sample-survey", r"^demo[_-].*\.(mp4|mov|mkv)$"),
];

/// A single compiled registry entry.
#[derive(Debug, Clone)]
struct DemoEntry {
    key: String,
    pattern: Regex,
}

/// Ordered set of demo-video patterns.
#[derive(Debug, Clone)]
pub struct DemoRegistry {
    entries: Vec<DemoEntry>,
}

impl DemoRegistry {
    /// Compile a registry from `(key, pattern)` pairs.
    pub fn new<K, P>(entries: impl IntoIterator<Item = (K, P)>) -> Result<Self, CoreError>
    where
        K: Into<String>,
        P: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .map(|(key, pattern)| {
                let key = key.into();
                let pattern = RegexBuilder::new(pattern.as_ref())
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        CoreError::Validation(format!("Invalid demo pattern for '{key}': {e}"))
                    })?;
                Ok(DemoEntry { key, pattern })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;

        Ok(Self { entries })
    }

    /// The registry of shipped demo clips.
    pub fn builtin() -> Self {
        Self::new(BUILTIN_ENTRIES.iter().copied()).expect("built-in demo patterns are valid")
    }

    /// A registry that matches nothing.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Return the dataset key for a video file name, if it is a demo clip.
    pub fn match_name(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        self.entries
            .iter()
            .find(|entry| entry.pattern.is_match(name))
            .map(|entry| entry.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DemoRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
