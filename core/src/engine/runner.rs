//! The run loop

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{EngineEvent, Inner, Status};
use crate::debug::diff;
use crate::errors::FlowError;
use crate::flow::{Location, Step};
use crate::handle::{Collaborators, Handle, InputPrompt, InputStatus, Interrupted, OutputSink};
use crate::handlers::run_pipeline;
use crate::head::Head;

/// Storage variable holding the location an idle detour returns to
pub(crate) const CONTINUE_VARIABLE: &str = "_continue";

/// Loop state that survives pauses.
pub(crate) struct Runner {
    pub(crate) head: Head,
    input_rx: mpsc::UnboundedReceiver<String>,
    steps_without_input: usize,
}

impl Runner {
    pub(crate) fn new(head: Head, input_rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            head,
            input_rx,
            steps_without_input: 0,
        }
    }

    pub(crate) fn reset_counter(&mut self) {
        self.steps_without_input = 0;
    }
}

pub(crate) async fn run(inner: Arc<Inner>, cancel: CancellationToken) {
    let mut runner = Arc::clone(&inner.runner).lock_owned().await;
    debug!(location = ?runner.head.location(), "run loop started");

    while !cancel.is_cancelled() {
        if runner.head.location().is_none() {
            if !enter(&inner, &mut runner, &cancel).await {
                break;
            }
            continue;
        }

        run_step(&inner, &mut runner, &cancel).await;
    }

    // Inputs claimed but never picked up belong to the abandoned step
    while runner.input_rx.try_recv().is_ok() {}

    inner.suspend(Status::Paused);
    debug!(location = ?runner.head.location(), "run loop stopped");
}

/// Wait for input while no step is current.
///
/// With triggers, only a matching input moves the head. Without, any input
/// restarts at the entry page. Returns `false` when aborted.
async fn enter(inner: &Inner, runner: &mut Runner, cancel: &CancellationToken) -> bool {
    let mut prompt = Prompt {
        inner,
        input_rx: &mut runner.input_rx,
        cancel,
        idle: None,
    };
    let Ok(input) = prompt.next_input().await else {
        return false;
    };

    let target = if inner.flow.has_triggers() {
        match inner
            .flow
            .match_trigger(&input, inner.config.case_sensitive_triggers)
        {
            Some(target) => target.to_string(),
            None => {
                debug!(input, "no trigger matched");
                return true;
            }
        }
    } else {
        inner.config.entry_page.clone()
    };

    match Location::parse(&target).and_then(|location| runner.head.navigate(Some(location))) {
        Ok(()) => {
            runner.reset_counter();
            inner.set_location(runner.head.location().cloned());
        }
        Err(e) => inner.report(e),
    }
    true
}

async fn run_step(inner: &Inner, runner: &mut Runner, cancel: &CancellationToken) {
    let Some(location) = runner.head.location().cloned() else {
        return;
    };
    let step = match runner.head.step() {
        Ok(Some(step)) => step,
        Ok(None) => return,
        Err(e) => {
            inner.report(e);
            runner.head.reset();
            inner.set_location(None);
            return;
        }
    };

    // A step that may wait for input always gets to run
    if runner.steps_without_input >= inner.config.freefall_limit && !step.awaits_input() {
        inner.report(FlowError::Freefall {
            limit: inner.config.freefall_limit,
            location: Some(location),
        });
        runner.head.reset();
        runner.reset_counter();
        inner.set_location(None);
        return;
    }

    trace!(%location, "running step");
    let before = inner.config.record_patches.then(|| inner.storage.snapshot());
    let next_link = runner.head.next_link();

    let collaborators = Collaborators {
        storage: &inner.storage,
        functions: &inner.functions,
        http: inner.http.as_ref(),
        output: inner,
        cancel,
    };
    let mut prompt = Prompt {
        inner,
        input_rx: &mut runner.input_rx,
        cancel,
        idle: Some((&location, step)),
    };

    let mut handle = Handle::new(step, location.clone(), next_link, collaborators, &mut prompt);
    let failed = match run_pipeline(&inner.handlers, &mut handle).await {
        Ok(()) => false,
        Err(e) => {
            inner.report(e);
            true
        }
    };
    let outcome = handle.into_outcome();

    if let Some(reason) = outcome.interrupted {
        match reason {
            Interrupted::Aborted => debug!(%location, "step abandoned"),
            Interrupted::Idle => detour_to_idle(inner, runner, &location),
        }
        // Partial writes stay, so replays need them too
        inner.emit(EngineEvent::StepInterrupted {
            location,
            reason,
            next: runner.head.location().cloned(),
            storage_patch: before.map(|before| diff(&before, &inner.storage.snapshot())),
        });
        return;
    }

    if outcome.input_requested {
        runner.reset_counter();
    } else {
        runner.steps_without_input += 1;
    }

    let rejected = !failed && outcome.input_status == InputStatus::Rejected;
    let next = if rejected {
        if let Some(message) = outcome.rejection.clone() {
            inner.print(message);
        }
        // Same step again, prompt included
        Some(location.clone())
    } else {
        outcome.next_link.clone()
    };

    let storage_patch = before.map(|before| diff(&before, &inner.storage.snapshot()));
    inner.emit(EngineEvent::StepComplete {
        location: location.clone(),
        step: outcome.step,
        next: next.clone(),
        storage_patch,
    });

    match next {
        Some(target) => {
            if let Err(e) = runner.head.navigate(Some(target)) {
                inner.report(e);
                runner.head.reset();
            }
        }
        None => {
            inner.emit(EngineEvent::PageComplete {
                page: location.page.clone(),
            });
            if inner.flow.has_triggers() {
                runner.head.reset();
            } else {
                let entry = Location::page(inner.config.entry_page.as_str());
                if let Err(e) = runner.head.navigate(Some(entry)) {
                    inner.report(e);
                    runner.head.reset();
                }
            }
        }
    }
    inner.set_location(runner.head.location().cloned());
}

/// Remember where to come back to and jump to the idle page.
fn detour_to_idle(inner: &Inner, runner: &mut Runner, location: &Location) {
    debug!(%location, page = %inner.config.idle_page, "user went idle");
    inner
        .storage
        .set_value(CONTINUE_VARIABLE, JsonValue::String(location.to_string()));

    let idle = Location::page(inner.config.idle_page.as_str());
    if let Err(e) = runner.head.navigate(Some(idle)) {
        inner.report(e);
    }
    runner.reset_counter();
    inner.set_location(runner.head.location().cloned());
}

/// Input source backed by the engine's input channel.
struct Prompt<'a> {
    inner: &'a Inner,
    input_rx: &'a mut mpsc::UnboundedReceiver<String>,
    cancel: &'a CancellationToken,
    /// The step waiting, when idle detection applies
    idle: Option<(&'a Location, &'a Step)>,
}

impl Prompt<'_> {
    fn idle_deadline(&self) -> Option<Instant> {
        self.idle?;
        self.inner
            .config
            .idle_after()
            .map(|after| Instant::now() + after)
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[async_trait]
impl InputPrompt for Prompt<'_> {
    async fn next_input(&mut self) -> Result<String, Interrupted> {
        self.inner.suspend(Status::WaitingInput);
        let mut deadline = self.idle_deadline();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(Interrupted::Aborted),
                input = self.input_rx.recv() => {
                    let Some(input) = input else {
                        return Err(Interrupted::Aborted);
                    };
                    self.inner.received_input(&input);
                    return Ok(input);
                }
                _ = sleep_until(deadline) => {
                    deadline = None;
                    let Some((location, step)) = self.idle else {
                        continue;
                    };
                    self.inner.emit(EngineEvent::Idle {
                        location: location.clone(),
                        step: step.clone(),
                    });
                    if self.inner.flow.contains_page(&self.inner.config.idle_page) {
                        self.inner.set_status(Status::Busy);
                        return Err(Interrupted::Idle);
                    }
                }
            }
        }
    }
}
