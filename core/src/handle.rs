//! Per-step execution context
//!
//! A [`Handle`] is built fresh for every step and passed through the handler
//! pipeline. Handlers read the step, talk to storage and collaborators, branch
//! by overwriting `next_link`, and accept or reject user input. The engine
//! reads the result back with [`Handle::into_outcome`].

use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::FlowError;
use crate::flow::{Location, Step};
use crate::functions::FunctionDictionary;
use crate::network::HttpClient;
use crate::storage::SharedStorage;

/// Why a pending input was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Interrupted {
    /// The engine was paused or stopped
    #[error("input aborted")]
    Aborted,
    /// The idle timer fired first
    #[error("input superseded by idle timeout")]
    Idle,
}

/// Whether the input received during a step was taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputStatus {
    #[default]
    None,
    Accepted,
    Rejected,
}

/// Source of user input for a step.
#[async_trait]
pub trait InputPrompt: Send + Sync {
    async fn next_input(&mut self) -> Result<String, Interrupted>;
}

/// Receiver of everything a step says.
pub trait OutputSink: Send + Sync {
    fn print(&self, message: String);

    /// A recoverable flow error; the conversation keeps going.
    fn report(&self, error: FlowError);
}

/// Shared collaborators a handle borrows from the engine.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub storage: &'a SharedStorage,
    pub functions: &'a FunctionDictionary,
    pub http: &'a dyn HttpClient,
    pub output: &'a dyn OutputSink,
    pub cancel: &'a CancellationToken,
}

/// What the pipeline left behind for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// The step as it ran, after any `switch` merge
    pub step: Step,
    pub next_link: Option<Location>,
    pub input: Option<String>,
    pub input_status: InputStatus,
    pub rejection: Option<String>,
    pub interrupted: Option<Interrupted>,
    pub input_requested: bool,
}

pub struct Handle<'a> {
    step: Cow<'a, Step>,
    location: Location,
    /// Where the engine goes after this step; handlers overwrite it to branch
    pub next_link: Option<Location>,
    collaborators: Collaborators<'a>,
    prompt: &'a mut dyn InputPrompt,
    input: Option<String>,
    input_status: InputStatus,
    rejection: Option<String>,
    interrupted: Option<Interrupted>,
    input_requested: bool,
}

impl<'a> Handle<'a> {
    pub fn new(
        step: &'a Step,
        location: Location,
        next_link: Option<Location>,
        collaborators: Collaborators<'a>,
        prompt: &'a mut dyn InputPrompt,
    ) -> Self {
        Self {
            step: Cow::Borrowed(step),
            location,
            next_link,
            collaborators,
            prompt,
            input: None,
            input_status: InputStatus::None,
            rejection: None,
            interrupted: None,
            input_requested: false,
        }
    }

    /// The effective step, possibly derived by `switch`.
    pub fn step(&self) -> &Step {
        &self.step
    }

    pub fn replace_step(&mut self, step: Step) {
        self.step = Cow::Owned(step);
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn storage(&self) -> &SharedStorage {
        self.collaborators.storage
    }

    pub fn functions(&self) -> &FunctionDictionary {
        self.collaborators.functions
    }

    pub fn http(&self) -> &dyn HttpClient {
        self.collaborators.http
    }

    /// The user's input for this step.
    ///
    /// The first call waits on the prompt; later calls return the same text.
    /// Once interrupted, every call returns the same interruption.
    pub async fn get_input(&mut self) -> Result<String, Interrupted> {
        if let Some(input) = &self.input {
            return Ok(input.clone());
        }
        if let Some(interrupted) = self.interrupted {
            return Err(interrupted);
        }

        self.input_requested = true;
        match self.prompt.next_input().await {
            Ok(input) => {
                self.input = Some(input.clone());
                Ok(input)
            }
            Err(interrupted) => {
                self.interrupted = Some(interrupted);
                Err(interrupted)
            }
        }
    }

    pub fn accept_input(&mut self) {
        self.input_status = InputStatus::Accepted;
    }

    /// Reject the input with a message. An accepted input stays accepted.
    pub fn reject_input(&mut self, message: impl Into<String>) {
        self.rejection = Some(message.into());
        if self.input_status != InputStatus::Accepted {
            self.input_status = InputStatus::Rejected;
        }
    }

    pub fn input_status(&self) -> InputStatus {
        self.input_status
    }

    pub fn input_requested(&self) -> bool {
        self.input_requested
    }

    pub fn print(&self, message: impl Into<String>) {
        self.collaborators.output.print(message.into());
    }

    pub fn report(&self, error: FlowError) {
        self.collaborators.output.report(error);
    }

    /// Sleep unless the engine aborts first. The returned future does not
    /// borrow the handle.
    pub fn sleep(
        &self,
        duration: Duration,
    ) -> impl Future<Output = Result<(), Interrupted>> + Send + 'static {
        let cancel = self.collaborators.cancel.clone();
        async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => Ok(()),
                _ = cancel.cancelled() => Err(Interrupted::Aborted),
            }
        }
    }

    /// Mark the step as abandoned without waiting on the prompt.
    pub fn interrupt(&mut self, interrupted: Interrupted) {
        self.interrupted.get_or_insert(interrupted);
    }

    pub fn into_outcome(self) -> StepOutcome {
        StepOutcome {
            step: self.step.into_owned(),
            next_link: self.next_link,
            input: self.input,
            input_status: self.input_status,
            rejection: self.rejection,
            interrupted: self.interrupted,
            input_requested: self.input_requested,
        }
    }
}
