//! Test helpers for engine tests
//!
//! Engines are built with input and output recording on so tests can assert
//! on the transcript after each call.

use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::config::EngineConfig;
use crate::engine::{Engine, EngineEvent};
use crate::flow::FlowDocument;

pub fn recording() -> EngineConfig {
    EngineConfig {
        record_inputs: true,
        record_outputs: true,
        ..Default::default()
    }
}

/// Parse a flow document, panicking on load errors.
pub fn flow(json: &str) -> FlowDocument {
    json.parse().expect("flow document should load")
}

pub fn engine(json: &str) -> Engine {
    engine_with(json, recording())
}

pub fn engine_with(json: &str, config: EngineConfig) -> Engine {
    Engine::builder(flow(json)).config(config).build()
}

/// Every event received so far.
pub fn drain(events: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut drained = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => drained.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    drained
}

/// Messages of the error events received so far.
pub fn drain_errors(events: &mut broadcast::Receiver<EngineEvent>) -> Vec<String> {
    drain(events)
        .into_iter()
        .filter_map(|event| match event {
            EngineEvent::Error(error) => Some(error.to_string()),
            _ => None,
        })
        .collect()
}
