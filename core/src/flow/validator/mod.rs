//! Static checks for flow documents
//!
//! Runs after loading to catch authoring mistakes the engine would otherwise
//! only discover when a conversation reaches them. The engine never requires
//! a document to pass validation.
//!
//! # Usage
//!
//! ```ignore
//! use chatflow_core::flow::{load_path, validator::validate_document};
//!
//! let document = load_path("flow.json")?;
//! for issue in validate_document(&document) {
//!     eprintln!("{}", issue);
//! }
//! ```
//!
//! # Adding a New Rule
//!
//! 1. Create a new file in `validator/rules/`
//! 2. Implement `ValidationRule` for your struct
//! 3. Add it to `Validator::new()`

pub mod rules;

use super::document::FlowDocument;
use super::location::Location;
use super::step::Step;

/* ===================== Validation Error Types ===================== */

/// An issue found in a flow document.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// The step the issue belongs to; `None` for document-level issues
    pub location: Option<Location>,
    pub message: String,
    pub severity: Severity,
    /// Which rule produced this error
    pub rule_id: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The flow misbehaves when it reaches this step
    Error,
    /// Probably a mistake
    Warning,
}

impl ValidationError {
    pub fn error(location: Option<Location>, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            location,
            message: message.into(),
            severity: Severity::Error,
            rule_id,
        }
    }

    pub fn warning(location: Option<Location>, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            location,
            message: message.into(),
            severity: Severity::Warning,
            rule_id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match &self.location {
            Some(location) => write!(
                f,
                "{} at {}: {} [{}]",
                severity, location, self.message, self.rule_id
            ),
            None => write!(f, "{}: {} [{}]", severity, self.message, self.rule_id),
        }
    }
}

impl std::error::Error for ValidationError {}

/* ===================== ValidationRule Trait ===================== */

/// One independent check over a whole document.
pub trait ValidationRule: Send + Sync {
    /// Unique identifier, e.g. `"dangling-target"`
    fn id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn validate(&self, document: &FlowDocument) -> Vec<ValidationError>;
}

/* ===================== Validator ===================== */

pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    /// A validator with all built-in rules.
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(rules::DanglingTargetRule),
                Box::new(rules::MissingVariableRule),
                Box::new(rules::InvalidPatternRule),
            ],
        }
    }

    pub fn validate(&self, document: &FlowDocument) -> Vec<ValidationError> {
        self.rules
            .iter()
            .flat_map(|rule| rule.validate(document))
            .collect()
    }

    /// `(id, description)` of every registered rule
    pub fn rules(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.rules.iter().map(|r| (r.id(), r.description()))
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// Run every built-in rule over `document`.
pub fn validate_document(document: &FlowDocument) -> Vec<ValidationError> {
    Validator::new().validate(document)
}

/// Visit every authored step, including switch cases and defaults, with the
/// location of the step that owns it.
pub(crate) fn for_each_step(document: &FlowDocument, mut visit: impl FnMut(&Location, &Step)) {
    fn walk(location: &Location, step: &Step, visit: &mut impl FnMut(&Location, &Step)) {
        visit(location, step);
        if let Some(switch) = &step.switch {
            for case in switch.cases.values() {
                walk(location, case, visit);
            }
            if let Some(default) = &switch.default {
                walk(location, default, visit);
            }
        }
    }

    for (page, steps) in document.pages() {
        for (index, step) in steps.iter().enumerate() {
            walk(&Location::new(page, index), step, &mut visit);
        }
    }
}
