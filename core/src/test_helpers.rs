//! Test helpers for handler and handle tests
//!
//! Fakes for every collaborator a [`Handle`] needs, bundled in a [`TestBed`].

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;

use crate::errors::FlowError;
use crate::flow::{Location, Step};
use crate::functions::FunctionDictionary;
use crate::handle::{Collaborators, Handle, InputPrompt, Interrupted, OutputSink, StepOutcome};
use crate::handlers::{default_handlers, run_pipeline};
use crate::network::{HttpClient, HttpRequest};
use crate::storage::{SharedStorage, Storage};

/// Prompt that hands out a fixed list of inputs, then reports an abort.
pub struct ScriptedPrompt {
    inputs: VecDeque<String>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            inputs: VecDeque::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.inputs.len()
    }
}

#[async_trait]
impl InputPrompt for ScriptedPrompt {
    async fn next_input(&mut self) -> Result<String, Interrupted> {
        self.inputs.pop_front().ok_or(Interrupted::Aborted)
    }
}

/// Sink that keeps everything it is given.
#[derive(Default)]
pub struct RecordingSink {
    outputs: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl OutputSink for RecordingSink {
    fn print(&self, message: String) {
        self.outputs.lock().unwrap().push(message);
    }

    fn report(&self, error: FlowError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

/// HTTP client answering from a queue of canned responses.
#[derive(Default)]
pub struct FakeHttp {
    responses: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeHttp {
    pub fn respond(self, body: impl Into<String>) -> Self {
        self.responses.lock().unwrap().push_back(Ok(body.into()));
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(anyhow!(message.to_string())));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn send(&self, request: HttpRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no canned response")))
    }
}

/// Everything a handle borrows, owned in one place.
pub struct TestBed {
    pub storage: SharedStorage,
    pub functions: FunctionDictionary,
    pub http: FakeHttp,
    pub sink: RecordingSink,
    pub cancel: CancellationToken,
    pub location: Location,
}

impl TestBed {
    pub fn new() -> Self {
        Self {
            storage: SharedStorage::default(),
            functions: FunctionDictionary::new(),
            http: FakeHttp::default(),
            sink: RecordingSink::default(),
            cancel: CancellationToken::new(),
            location: Location::page("/start"),
        }
    }

    pub fn with_storage(mut self, initial: JsonValue) -> Self {
        self.storage = SharedStorage::new(Storage::from_value(initial));
        self
    }

    pub fn with_functions(mut self, functions: FunctionDictionary) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_http(mut self, http: FakeHttp) -> Self {
        self.http = http;
        self
    }

    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            storage: &self.storage,
            functions: &self.functions,
            http: &self.http,
            output: &self.sink,
            cancel: &self.cancel,
        }
    }

    pub fn handle<'a>(&'a self, step: &'a Step, prompt: &'a mut dyn InputPrompt) -> Handle<'a> {
        Handle::new(
            step,
            self.location.clone(),
            Some(self.location.successor()),
            self.collaborators(),
            prompt,
        )
    }

    /// Run the default pipeline over `step` with the given inputs.
    pub async fn run(&self, step: &Step, inputs: &[&str]) -> (Result<(), FlowError>, StepOutcome) {
        let mut prompt = ScriptedPrompt::new(inputs.iter().copied());
        let mut handle = self.handle(step, &mut prompt);
        let result = run_pipeline(&default_handlers(), &mut handle).await;
        (result, handle.into_outcome())
    }

    pub fn outputs(&self) -> Vec<String> {
        self.sink.outputs.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.sink.errors.lock().unwrap().clone()
    }

    pub fn get(&self, path: &str) -> Option<JsonValue> {
        self.storage.get_value(path)
    }
}
