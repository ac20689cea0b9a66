//! Flow document model
//!
//! Pages of steps, the locations that point into them, and the loader that
//! builds documents from authored JSON.

pub mod document;
pub mod loader;
pub mod location;
pub mod pattern;
pub mod step;
pub mod validator;

pub use document::{DocumentSettings, FlowDocument};
pub use loader::{load_path, load_str, load_value};
pub use location::Location;
pub use step::{ExecuteSpec, InputKind, InputSpec, Message, RequestSpec, Step, SwitchSpec};
