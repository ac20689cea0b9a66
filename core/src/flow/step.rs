//! Step directives
//!
//! A step is a bag of optional directives. Every field is optional and a step
//! with none of them is a pass-through. Field names follow the authored JSON
//! format (camelCase), with aliases for the older spellings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::network::HttpMethod;

/// One unit of flow behaviour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Text printed when the step runs
    #[serde(default, alias = "msg", skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,

    /// Input token -> location string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<BTreeMap<String, String>>,

    /// Unconditional target once the step completes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute: Option<ExecuteSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch: Option<SwitchSpec>,

    /// Seconds to wait before the step finishes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<f64>,

    /// Wipe the per-conversation variables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clear_variables: Option<bool>,
}

impl Step {
    /// Step with only a message, mostly useful in tests.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            message: Some(Message::Text(text.into())),
            ..Default::default()
        }
    }

    /// Shallow merge of `case` over `self`, without the `switch` directive.
    ///
    /// Fields set on `case` win; anything `case` leaves unset is kept from
    /// `self`. Neither input is modified.
    pub fn merged_with(&self, case: &Step) -> Step {
        Step {
            message: case.message.clone().or_else(|| self.message.clone()),
            links: case.links.clone().or_else(|| self.links.clone()),
            next: case.next.clone().or_else(|| self.next.clone()),
            input: case.input.clone().or_else(|| self.input.clone()),
            execute: case.execute.clone().or_else(|| self.execute.clone()),
            request: case.request.clone().or_else(|| self.request.clone()),
            switch: None,
            delay: case.delay.or(self.delay),
            clear_variables: case.clear_variables.or(self.clear_variables),
        }
    }

    /// True when running the step may suspend for user input: it has links,
    /// a choice or text input, or a switch branch that does.
    pub fn awaits_input(&self) -> bool {
        let own = self.links.is_some()
            || self
                .input
                .as_ref()
                .is_some_and(|input| input.kind != InputKind::Set);

        own || self.switch.as_ref().is_some_and(|switch| {
            switch
                .cases
                .values()
                .chain(switch.default.as_deref())
                .any(Step::awaits_input)
        })
    }
}

/// A message, either a single string or fragments that are concatenated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Text(String),
    Fragments(Vec<String>),
}

impl Message {
    pub fn to_text(&self) -> String {
        match self {
            Message::Text(text) => text.clone(),
            Message::Fragments(parts) => parts.concat(),
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

/// Kind of input a step asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// Free text, optionally validated by a pattern
    Text,
    /// One of a fixed set of keys, each mapped to a value
    Choice,
    /// No user interaction; stores a fixed value
    Set,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSpec {
    #[serde(rename = "type", alias = "kind")]
    pub kind: InputKind,

    /// Storage path receiving the value
    #[serde(default, alias = "var", alias = "name", skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,

    /// Regex the text must match (`text` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Accepted keys and the value each one stores (`choice` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<BTreeMap<String, JsonValue>>,

    /// Value stored by `set`
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub value: JsonValue,

    #[serde(default, alias = "rejectMsg", skip_serializing_if = "Option::is_none")]
    pub reject_message: Option<String>,

    /// Expand placeholders inside `value` before storing it
    #[serde(default)]
    pub expand_value: bool,
}

/// A call into the function dictionary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteSpec {
    #[serde(default, alias = "var", skip_serializing_if = "Option::is_none")]
    pub output_variable: Option<String>,

    #[serde(alias = "fn", alias = "functionName")]
    pub function: String,

    #[serde(default)]
    pub args: Vec<JsonValue>,

    /// Resolve lone `{{path}}` arguments to their stored values
    #[serde(default = "default_true", alias = "expandArgsFromStorage")]
    pub expand_args: bool,
}

/// An HTTP call through the network collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSpec {
    #[serde(default, alias = "var", skip_serializing_if = "Option::is_none")]
    pub output_variable: Option<String>,

    pub url: String,

    #[serde(default)]
    pub method: HttpMethod,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<JsonValue>,

    #[serde(default = "default_true")]
    pub expand_url: bool,

    #[serde(default = "default_true")]
    pub expand_body: bool,

    /// Where to go when the request fails
    #[serde(default, alias = "apiFailLink", skip_serializing_if = "Option::is_none")]
    pub fail_next: Option<String>,
}

/// Branch on a stored value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchSpec {
    #[serde(alias = "var", alias = "name")]
    pub variable: String,

    /// Stored value (as text) -> partial step
    #[serde(default)]
    pub cases: BTreeMap<String, Step>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Box<Step>>,
}

fn default_true() -> bool {
    true
}
