pub mod cli;
pub mod config;
pub mod debug;
pub mod engine;
pub mod errors;
pub mod flow;
pub mod functions;
pub mod handle;
pub mod handlers;
pub mod head;
pub mod network;
pub mod storage;

#[cfg(test)]
pub mod test_helpers;

// Re-export main types
pub use config::{Config, EngineConfig};
pub use engine::{Engine, EngineBuilder, EngineEvent, Status};
pub use errors::{CallerError, FlowError, LoadError};
pub use flow::{FlowDocument, Location, Step};
pub use functions::{FlowFunction, FunctionDictionary};
pub use network::{HttpClient, ReqwestClient};
pub use storage::{SharedStorage, Storage};
