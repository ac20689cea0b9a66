//! The flow document
//!
//! Pages keyed by id (always starting with `/`), each holding an ordered list
//! of steps. Documents are built by the loader and immutable afterwards.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::location::Location;
use super::step::Step;
use crate::errors::LoadError;

/// Settings authored inside the document itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSettings {
    /// Compare triggers with case sensitivity
    #[serde(default, alias = "caseSensitiveTriggers", skip_serializing_if = "Option::is_none")]
    pub case_sensitive_trigger: Option<bool>,

    /// Seconds of waiting for input before the engine goes idle
    #[serde(default, alias = "timeThresholdForIdle", skip_serializing_if = "Option::is_none")]
    pub idle_after_seconds: Option<f64>,
}

/// A validated page -> steps map plus optional triggers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowDocument {
    pages: BTreeMap<String, Vec<Step>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    triggers: BTreeMap<String, String>,
    settings: DocumentSettings,
}

impl FlowDocument {
    pub fn new(pages: BTreeMap<String, Vec<Step>>) -> Self {
        Self {
            pages,
            ..Default::default()
        }
    }

    pub fn with_triggers(mut self, triggers: BTreeMap<String, String>) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn with_settings(mut self, settings: DocumentSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Steps of a page, if the page exists.
    pub fn page(&self, id: &str) -> Option<&[Step]> {
        self.pages.get(id).map(Vec::as_slice)
    }

    pub fn contains_page(&self, id: &str) -> bool {
        self.pages.contains_key(id)
    }

    /// The step at `location`, if both page and index exist.
    pub fn step(&self, location: &Location) -> Option<&Step> {
        self.page(&location.page)?.get(location.index)
    }

    pub fn pages(&self) -> impl Iterator<Item = (&str, &[Step])> {
        self.pages
            .iter()
            .map(|(id, steps)| (id.as_str(), steps.as_slice()))
    }

    pub fn triggers(&self) -> &BTreeMap<String, String> {
        &self.triggers
    }

    pub fn has_triggers(&self) -> bool {
        !self.triggers.is_empty()
    }

    pub fn settings(&self) -> &DocumentSettings {
        &self.settings
    }

    /// Find the target of the trigger matching `input`.
    pub fn match_trigger(&self, input: &str, case_sensitive: bool) -> Option<&str> {
        self.triggers
            .iter()
            .find(|(trigger, _)| {
                if case_sensitive {
                    trigger.as_str() == input
                } else {
                    trigger.to_lowercase() == input.to_lowercase()
                }
            })
            .map(|(_, target)| target.as_str())
    }
}

impl FromStr for FlowDocument {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        super::loader::load_str(s)
    }
}
