//! Rule: Invalid Pattern
//!
//! Text input patterns are compiled at runtime; a pattern that does not
//! compile turns the step into an authoring error. Patterns on non-text
//! inputs are ignored by the engine and get a warning.

use crate::flow::document::FlowDocument;
use crate::flow::pattern::compile as compile_pattern;
use crate::flow::step::InputKind;

use super::super::{for_each_step, ValidationError, ValidationRule};

pub struct InvalidPatternRule;

impl ValidationRule for InvalidPatternRule {
    fn id(&self) -> &'static str {
        "invalid-pattern"
    }

    fn description(&self) -> &'static str {
        "Text input patterns must be valid regular expressions"
    }

    fn validate(&self, document: &FlowDocument) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for_each_step(document, |location, step| {
            let Some(input) = &step.input else {
                return;
            };
            let Some(pattern) = &input.pattern else {
                return;
            };

            if input.kind != InputKind::Text {
                errors.push(ValidationError::warning(
                    Some(location.clone()),
                    format!("pattern is ignored on a {:?} input", input.kind),
                    self.id(),
                ));
                return;
            }

            if let Err(err) = compile_pattern(pattern) {
                errors.push(ValidationError::error(
                    Some(location.clone()),
                    format!("pattern '{}' does not compile: {}", pattern, err),
                    self.id(),
                ));
            }
        });

        errors
    }
}
