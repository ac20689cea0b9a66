//! Function dictionary
//!
//! Named functions callable from `execute` steps. A function receives its
//! resolved arguments and returns `Some(value)` to store or `None` for
//! "undefined". Errors are reported by the engine; the flow keeps going.

pub mod stdlib;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

#[async_trait]
pub trait FlowFunction: Send + Sync {
    async fn call(&self, args: Vec<JsonValue>) -> Result<Option<JsonValue>>;
}

/// Adapts a plain closure into a [`FlowFunction`].
struct SyncFunction<F>(F);

#[async_trait]
impl<F> FlowFunction for SyncFunction<F>
where
    F: Fn(Vec<JsonValue>) -> Result<Option<JsonValue>> + Send + Sync,
{
    async fn call(&self, args: Vec<JsonValue>) -> Result<Option<JsonValue>> {
        (self.0)(args)
    }
}

#[derive(Clone, Default)]
pub struct FunctionDictionary {
    functions: HashMap<String, Arc<dyn FlowFunction>>,
}

impl FunctionDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dictionary holding the built-in functions (`forEach`).
    pub fn with_stdlib() -> Self {
        let mut functions = Self::new();
        stdlib::register(&mut functions);
        functions
    }

    pub fn register(&mut self, name: impl Into<String>, function: impl FlowFunction + 'static) {
        self.functions.insert(name.into(), Arc::new(function));
    }

    /// Register a synchronous closure.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(Vec<JsonValue>) -> Result<Option<JsonValue>> + Send + Sync + 'static,
    {
        self.register(name, SyncFunction(function));
    }

    /// Builder-style [`register_fn`](Self::register_fn).
    pub fn with_fn<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(Vec<JsonValue>) -> Result<Option<JsonValue>> + Send + Sync + 'static,
    {
        self.register_fn(name, function);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn FlowFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl fmt::Debug for FunctionDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("FunctionDictionary")
            .field("functions", &names)
            .finish()
    }
}
