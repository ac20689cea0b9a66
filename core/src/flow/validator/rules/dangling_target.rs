//! Rule: Dangling Target
//!
//! Reports an error when a navigation target does not point at an existing
//! step. Targets containing a `{{placeholder}}` are only known at runtime and
//! are skipped.
//!
//! ```json
//! { "/start": { "msg": "hi", "next": "/missing" } }
//! ```

use crate::flow::document::FlowDocument;
use crate::flow::location::Location;

use super::super::{for_each_step, ValidationError, ValidationRule};

pub struct DanglingTargetRule;

impl ValidationRule for DanglingTargetRule {
    fn id(&self) -> &'static str {
        "dangling-target"
    }

    fn description(&self) -> &'static str {
        "Navigation targets must resolve to an existing step"
    }

    fn validate(&self, document: &FlowDocument) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for_each_step(document, |location, step| {
            let targets = step
                .next
                .iter()
                .map(|target| ("next", target))
                .chain(
                    step.links
                        .iter()
                        .flat_map(|links| links.values())
                        .map(|target| ("link", target)),
                )
                .chain(
                    step.request
                        .iter()
                        .filter_map(|request| request.fail_next.as_ref())
                        .map(|target| ("failNext", target)),
                );

            for (kind, target) in targets {
                if let Some(problem) = check_target(document, target) {
                    errors.push(ValidationError::error(
                        Some(location.clone()),
                        format!("{} target '{}' {}", kind, target, problem),
                        self.id(),
                    ));
                }
            }
        });

        for (trigger, target) in document.triggers() {
            if let Some(problem) = check_target(document, target) {
                errors.push(ValidationError::error(
                    None,
                    format!("trigger '{}' target '{}' {}", trigger, target, problem),
                    self.id(),
                ));
            }
        }

        errors
    }
}

/// Describe why `target` does not resolve, if it doesn't.
fn check_target(document: &FlowDocument, target: &str) -> Option<String> {
    if target.contains("{{") {
        return None;
    }

    let location = match Location::parse(target) {
        Ok(location) => location,
        Err(_) => return Some("is not a valid location".to_string()),
    };

    match document.page(&location.page) {
        None => Some(format!("names unknown page '{}'", location.page)),
        Some(steps) if location.index >= steps.len() => Some(format!(
            "is out of range (page has {} steps)",
            steps.len()
        )),
        Some(_) => None,
    }
}
