//! Validation Rules
//!
//! One rule per file:
//!
//! - `dangling_target.rs` - `next`, `links`, `failNext` and trigger targets that resolve nowhere
//! - `missing_variable.rs` - inputs without a variable to store into
//! - `invalid_pattern.rs` - text input patterns that are not valid regexes

mod dangling_target;
mod invalid_pattern;
mod missing_variable;

pub use dangling_target::DanglingTargetRule;
pub use invalid_pattern::InvalidPatternRule;
pub use missing_variable::MissingVariableRule;
