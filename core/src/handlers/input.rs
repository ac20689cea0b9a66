use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::{Flow, StepHandler};
use crate::errors::FlowError;
use crate::flow::pattern::compile as compile_pattern;
use crate::flow::InputKind;
use crate::handle::Handle;

pub const CHOICE_REJECTION: &str = "Invalid choice. Please input a valid choice.";
pub const PATTERN_REJECTION: &str =
    "Invalid input. The input doesn't match the required pattern.";

/// Stores user input (or a fixed value) into a variable.
///
/// - `set` stores `value` without waiting
/// - `choice` waits and stores the value mapped to the chosen key
/// - `text` waits and stores the raw text when it matches `pattern`
pub struct InputHandler;

#[async_trait]
impl StepHandler for InputHandler {
    fn name(&self) -> &'static str {
        "input"
    }

    async fn process(&self, handle: &mut Handle<'_>) -> Result<Flow, FlowError> {
        let Some(input) = handle.step().input.clone() else {
            return Ok(Flow::Continue);
        };

        let missing = |property: &str| FlowError::MissingProperty {
            property: property.to_string(),
            location: handle.location().clone(),
        };

        let variable = match input.variable.as_deref() {
            Some(variable) if !variable.is_empty() => variable.to_string(),
            _ => return Err(missing("variable")),
        };

        let storage = handle.storage().clone();
        let expand = |value: JsonValue| {
            if input.expand_value {
                storage.expand_object(&value)
            } else {
                value
            }
        };

        match input.kind {
            InputKind::Set => {
                storage.set_value(&variable, expand(input.value.clone()));
            }

            InputKind::Choice => {
                let Some(choices) = &input.choices else {
                    return Err(missing("choices"));
                };

                let Ok(text) = handle.get_input().await else {
                    return Ok(Flow::Halt);
                };

                match choices.get(&text) {
                    Some(value) => {
                        handle.accept_input();
                        storage.set_value(&variable, expand(value.clone()));
                    }
                    None => handle.reject_input(
                        input.reject_message.as_deref().unwrap_or(CHOICE_REJECTION),
                    ),
                }
            }

            InputKind::Text => {
                // compiled before waiting so a bad pattern never blocks on input
                let pattern = match &input.pattern {
                    Some(pattern) => Some(compile_pattern(pattern).map_err(|source| {
                        FlowError::InvalidPattern {
                            pattern: pattern.clone(),
                            location: handle.location().clone(),
                            source,
                        }
                    })?),
                    None => None,
                };

                let Ok(text) = handle.get_input().await else {
                    return Ok(Flow::Halt);
                };

                if pattern.as_ref().is_some_and(|p| !p.is_match(&text)) {
                    handle.reject_input(
                        input.reject_message.as_deref().unwrap_or(PATTERN_REJECTION),
                    );
                } else {
                    handle.accept_input();
                    storage.set_value(&variable, JsonValue::String(text));
                }
            }
        }

        Ok(Flow::Continue)
    }
}
