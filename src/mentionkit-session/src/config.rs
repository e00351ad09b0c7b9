//! Mention settings.
//!
//! Settings are loaded from TOML and are consumed through the [`SettingsStore`]
//! trait, so hosts that keep their own settings UI can plug that in instead.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MentionError, MentionResult};

fn default_result_length() -> usize {
    5
}

fn default_add_name() -> bool {
    true
}

fn default_trigger() -> char {
    '@'
}

/// When a filter change re-queries the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefetchPolicy {
    /// Every filter change issues a new query.
    #[default]
    Always,
    /// A filter that extends the last fetched filter in the same scope is
    /// narrowed locally, unless the last fetch reported more rows than it
    /// returned.
    ReusePrefix,
}

/// User-facing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionSettings {
    /// Maximum number of search results shown.
    #[serde(default = "default_result_length")]
    pub result_length: usize,

    /// Comma-separated list of additional sources (compendia) to search.
    #[serde(default)]
    pub included_compendia: String,

    /// Whether inserted references carry the entity's name as a label.
    #[serde(default = "default_add_name")]
    pub add_name: bool,

    /// Character that opens a session.
    #[serde(default = "default_trigger")]
    pub trigger: char,

    #[serde(default)]
    pub refetch_policy: RefetchPolicy,

    /// Enable debug-level logs for this crate.
    #[serde(default)]
    pub debug_logging: bool,
}

impl Default for MentionSettings {
    fn default() -> Self {
        Self {
            result_length: default_result_length(),
            included_compendia: String::new(),
            add_name: default_add_name(),
            trigger: default_trigger(),
            refetch_policy: RefetchPolicy::default(),
            debug_logging: false,
        }
    }
}

impl MentionSettings {
    /// Parses and validates settings from TOML text.
    pub fn from_toml_str(content: &str) -> MentionResult<Self> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> MentionResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| MentionError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> MentionResult<()> {
        if self.result_length == 0 {
            return Err(MentionError::config("result_length must be at least 1"));
        }
        if self.trigger.is_whitespace() || self.trigger.is_control() {
            return Err(MentionError::config(format!(
                "trigger must be a printable character, got {:?}",
                self.trigger
            )));
        }
        Ok(())
    }

    /// The additional source identifiers, trimmed, with empty entries dropped.
    pub fn extra_source_list(&self) -> Vec<String> {
        self.included_compendia
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    /// Builder method to set the result length.
    pub fn with_result_length(mut self, result_length: usize) -> Self {
        self.result_length = result_length;
        self
    }

    /// Builder method to set the additional sources.
    pub fn with_included_compendia(mut self, compendia: impl Into<String>) -> Self {
        self.included_compendia = compendia.into();
        self
    }

    /// Builder method to toggle name labels.
    pub fn with_add_name(mut self, add_name: bool) -> Self {
        self.add_name = add_name;
        self
    }

    /// Builder method to set the refetch policy.
    pub fn with_refetch_policy(mut self, policy: RefetchPolicy) -> Self {
        self.refetch_policy = policy;
        self
    }
}

/// Source of the settings a session reads while running.
pub trait SettingsStore: Send + Sync {
    /// Maximum number of visible results.
    fn max_results(&self) -> usize;

    /// Additional sources passed through to collection searches.
    fn extra_sources(&self) -> Vec<String>;

    /// Character that opens a session.
    fn trigger(&self) -> char {
        default_trigger()
    }

    fn refetch_policy(&self) -> RefetchPolicy {
        RefetchPolicy::Always
    }

    /// Whether references carry the entity's name as a label.
    fn add_name(&self) -> bool {
        default_add_name()
    }
}

impl SettingsStore for MentionSettings {
    fn max_results(&self) -> usize {
        self.result_length.max(1)
    }

    fn extra_sources(&self) -> Vec<String> {
        self.extra_source_list()
    }

    fn trigger(&self) -> char {
        self.trigger
    }

    fn refetch_policy(&self) -> RefetchPolicy {
        self.refetch_policy
    }

    fn add_name(&self) -> bool {
        self.add_name
    }
}
