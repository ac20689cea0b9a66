//! The conversation engine
//!
//! An [`Engine`] owns one conversation over a [`FlowDocument`]. `start` spawns
//! the run loop, which executes steps until the flow needs input, then hands
//! control back. Hosts feed input with `input`/`input_async` and observe
//! everything through the event broadcast and the status watch.
//!
//! ```text
//!   Paused --start--> Busy --needs input--> WaitingInput
//!     ^                ^                        |
//!     |                +---------input----------+
//!     +------pause/stop (from any state)--------+
//! ```

mod events;
mod runner;

#[cfg(test)]
mod tests;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::errors::{CallerError, FlowError};
use crate::flow::{FlowDocument, Location};
use crate::functions::FunctionDictionary;
use crate::handle::OutputSink;
use crate::handlers::{default_handlers, StepHandler};
use crate::head::Head;
use crate::network::{HttpClient, ReqwestClient};
use crate::storage::SharedStorage;

pub use events::{EngineEvent, Status};
pub(crate) use events::RunState;
use runner::Runner;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A running loop's cancellation token and task.
struct Control {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// State shared between the engine handle and its run loop.
pub(crate) struct Inner {
    id: Uuid,
    flow: Arc<FlowDocument>,
    config: EngineConfig,
    handlers: Vec<Box<dyn StepHandler>>,
    functions: FunctionDictionary,
    http: Arc<dyn HttpClient>,
    storage: SharedStorage,
    events: broadcast::Sender<EngineEvent>,
    state: watch::Sender<RunState>,
    status: watch::Sender<Status>,
    location: watch::Sender<Option<Location>>,
    input_tx: mpsc::UnboundedSender<String>,
    runner: Arc<tokio::sync::Mutex<Runner>>,
    control: Mutex<Option<Control>>,
    inputs: Mutex<Vec<String>>,
    outputs: Mutex<Vec<String>>,
}

impl Inner {
    pub(crate) fn emit(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish_status(&self, status: Status) {
        self.status.send_replace(status);
        self.emit(EngineEvent::StatusChanged(status));
    }

    pub(crate) fn set_status(&self, status: Status) {
        let changed = self.state.send_if_modified(|state| {
            if state.status == status {
                return false;
            }
            state.status = status;
            true
        });
        if changed {
            self.publish_status(status);
        }
    }

    /// Hand control back to whoever is waiting on the loop.
    pub(crate) fn suspend(&self, status: Status) {
        let mut changed = false;
        self.state.send_modify(|state| {
            changed = state.status != status;
            state.status = status;
            state.yields += 1;
        });
        if changed {
            self.publish_status(status);
        }
    }

    /// Flip `WaitingInput` to `Busy`. Only one caller wins.
    fn claim_input(&self) -> bool {
        let claimed = self.state.send_if_modified(|state| {
            if state.status != Status::WaitingInput {
                return false;
            }
            state.status = Status::Busy;
            true
        });
        if claimed {
            self.publish_status(Status::Busy);
        }
        claimed
    }

    /// Called by the loop when it picks up an input.
    pub(crate) fn received_input(&self, input: &str) {
        self.set_status(Status::Busy);
        debug!(input, "input received");
        if self.config.record_inputs {
            lock(&self.inputs).push(input.to_string());
        }
        self.emit(EngineEvent::Input(input.to_string()));
    }

    pub(crate) fn set_location(&self, location: Option<Location>) {
        self.location.send_replace(location);
    }
}

impl OutputSink for Inner {
    fn print(&self, message: String) {
        debug!(message = %message, "output");
        if self.config.record_outputs {
            lock(&self.outputs).push(message.clone());
        }
        self.emit(EngineEvent::Output(message));
    }

    fn report(&self, error: FlowError) {
        warn!(error = %error, "flow error");
        self.emit(EngineEvent::Error(Arc::new(error)));
    }
}

/// One conversation over a flow document.
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    pub fn builder(flow: impl Into<Arc<FlowDocument>>) -> EngineBuilder {
        EngineBuilder::new(flow.into())
    }

    /// An engine with default configuration and collaborators.
    pub fn new(flow: impl Into<Arc<FlowDocument>>) -> Self {
        Self::builder(flow).build()
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn flow(&self) -> &Arc<FlowDocument> {
        &self.inner.flow
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.inner.storage
    }

    pub fn status(&self) -> Status {
        *self.inner.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<Status> {
        self.inner.status.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    /// Current location; `None` while waiting for a trigger.
    pub fn location(&self) -> Option<Location> {
        self.inner.location.borrow().clone()
    }

    /// Inputs received so far, when `record_inputs` is on.
    pub fn recorded_inputs(&self) -> Vec<String> {
        lock(&self.inner.inputs).clone()
    }

    /// Outputs printed so far, when `record_outputs` is on.
    pub fn recorded_outputs(&self) -> Vec<String> {
        lock(&self.inner.outputs).clone()
    }

    /// Start the run loop.
    ///
    /// Resolves once the loop first hands control back: the flow needs input,
    /// or the engine was paused. A step abandoned by an earlier pause runs
    /// again from the top.
    pub async fn start(&self) -> Result<(), CallerError> {
        let mut state = self.inner.state.subscribe();
        let seen = state.borrow_and_update().yields;

        {
            let mut control = lock(&self.inner.control);
            if control.is_some() || self.status() != Status::Paused {
                return Err(CallerError::AlreadyRunning);
            }

            self.inner.set_status(Status::Busy);
            let cancel = CancellationToken::new();
            let span = info_span!("engine", id = %self.inner.id);
            let task = tokio::spawn(
                runner::run(Arc::clone(&self.inner), cancel.clone()).instrument(span),
            );
            *control = Some(Control { cancel, task });
        }

        info!(engine = %self.inner.id, location = ?self.location(), "engine started");
        let _ = state.wait_for(|state| state.yields > seen).await;
        Ok(())
    }

    /// Deliver input without waiting. Ignored unless the engine is waiting
    /// for input.
    pub fn input(&self, text: impl Into<String>) {
        let text = text.into();
        if !self.inner.claim_input() {
            warn!(status = %self.status(), input = %text, "input ignored: engine is not waiting for input");
            return;
        }
        self.send_input(text);
    }

    /// Deliver input and wait until the loop hands control back.
    pub async fn input_async(&self, text: impl Into<String>) -> Result<(), CallerError> {
        let mut state = self.inner.state.subscribe();
        let seen = state.borrow_and_update().yields;

        if !self.inner.claim_input() {
            return Err(CallerError::NotWaitingInput);
        }
        self.send_input(text.into());

        let _ = state.wait_for(|state| state.yields > seen).await;
        Ok(())
    }

    fn send_input(&self, text: String) {
        if self.inner.input_tx.send(text).is_err() {
            warn!("input dropped: run loop is gone");
        }
    }

    /// Stop the run loop. The current step is abandoned and runs again on
    /// the next `start`.
    pub async fn pause(&self) {
        let control = lock(&self.inner.control).take();
        if let Some(Control { cancel, task }) = control {
            cancel.cancel();
            if let Err(e) = task.await {
                warn!(error = %e, "run loop ended abnormally");
            }
        }
        self.inner.set_status(Status::Paused);
    }

    /// Pause and announce that the conversation is over.
    pub async fn stop(&self) {
        self.pause().await;
        info!(engine = %self.inner.id, "engine stopped");
        self.inner.emit(EngineEvent::Exit);
    }

    /// Move the head while the engine is paused.
    pub fn navigate(&self, target: Option<Location>) -> Result<(), CallerError> {
        if lock(&self.inner.control).is_some() {
            return Err(CallerError::Busy);
        }
        let mut runner = self
            .inner
            .runner
            .try_lock()
            .map_err(|_| CallerError::Busy)?;

        if let Err(e) = runner.head.navigate(target.clone()) {
            debug!(error = %e, "host navigation failed");
            let target = target.map(|t| t.to_string()).unwrap_or_default();
            return Err(CallerError::InvalidTarget(target));
        }
        runner.reset_counter();
        self.inner.set_location(target);
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(control) = lock(&self.inner.control).take() {
            control.cancel.cancel();
        }
    }
}

pub struct EngineBuilder {
    flow: Arc<FlowDocument>,
    config: EngineConfig,
    handlers: Option<Vec<Box<dyn StepHandler>>>,
    functions: Option<FunctionDictionary>,
    http: Option<Arc<dyn HttpClient>>,
    storage: Option<SharedStorage>,
}

impl EngineBuilder {
    fn new(flow: Arc<FlowDocument>) -> Self {
        Self {
            flow,
            config: EngineConfig::default(),
            handlers: None,
            functions: None,
            http: None,
            storage: None,
        }
    }

    /// Settings in the flow document still take precedence.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default handler pipeline.
    pub fn handlers(mut self, handlers: Vec<Box<dyn StepHandler>>) -> Self {
        self.handlers = Some(handlers);
        self
    }

    pub fn functions(mut self, functions: FunctionDictionary) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn http(mut self, http: impl HttpClient + 'static) -> Self {
        self.http = Some(Arc::new(http));
        self
    }

    /// Start from existing storage, e.g. to share a global scope.
    pub fn storage(mut self, storage: impl Into<SharedStorage>) -> Self {
        self.storage = Some(storage.into());
        self
    }

    pub fn build(self) -> Engine {
        let config = self.config.with_document_settings(self.flow.settings());

        let initial = if self.flow.has_triggers() {
            None
        } else {
            Some(Location::page(config.entry_page.as_str()))
        };

        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let runner = Runner::new(Head::new(Arc::clone(&self.flow), initial.clone()), input_rx);

        let inner = Inner {
            id: Uuid::new_v4(),
            flow: self.flow,
            config,
            handlers: self.handlers.unwrap_or_else(default_handlers),
            functions: self.functions.unwrap_or_else(FunctionDictionary::with_stdlib),
            http: self.http.unwrap_or_else(|| Arc::new(ReqwestClient::new())),
            storage: self.storage.unwrap_or_default(),
            events,
            state: watch::Sender::new(RunState::default()),
            status: watch::Sender::new(Status::Paused),
            location: watch::Sender::new(initial),
            input_tx,
            runner: Arc::new(tokio::sync::Mutex::new(runner)),
            control: Mutex::new(None),
            inputs: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
        };

        debug!(engine = %inner.id, pages = inner.flow.pages().count(), "engine built");
        Engine {
            inner: Arc::new(inner),
        }
    }
}
