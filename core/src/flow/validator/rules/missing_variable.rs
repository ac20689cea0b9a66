//! Rule: Missing Variable
//!
//! An `input` directive must name the storage path it writes to. The engine
//! skips such a step at runtime with a `MissingProperty` error.

use crate::flow::document::FlowDocument;

use super::super::{for_each_step, ValidationError, ValidationRule};

pub struct MissingVariableRule;

impl ValidationRule for MissingVariableRule {
    fn id(&self) -> &'static str {
        "missing-variable"
    }

    fn description(&self) -> &'static str {
        "Inputs must name a variable to store into"
    }

    fn validate(&self, document: &FlowDocument) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for_each_step(document, |location, step| {
            let Some(input) = &step.input else {
                return;
            };
            if input.variable.as_deref().map_or(true, str::is_empty) {
                errors.push(ValidationError::error(
                    Some(location.clone()),
                    "input has no 'variable'",
                    self.id(),
                ));
            }
        });

        errors
    }
}
