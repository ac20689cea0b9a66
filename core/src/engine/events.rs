//! Engine status and the events hosts subscribe to

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::debug::PatchOp;
use crate::errors::FlowError;
use crate::flow::{Location, Step};
use crate::handle::Interrupted;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// No run loop is active
    #[default]
    Paused,
    /// Steps are executing
    Busy,
    /// Suspended until the host supplies input
    WaitingInput,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Paused => "PAUSED",
            Status::Busy => "BUSY",
            Status::WaitingInput => "WAITING_INPUT",
        };
        f.write_str(name)
    }
}

/// Status plus a counter bumped every time the loop hands control back.
///
/// Both change in one update so a caller that saw `WaitingInput` can wait
/// for the *next* suspension without racing the current one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RunState {
    pub status: Status,
    pub yields: u64,
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    StatusChanged(Status),
    Input(String),
    Output(String),
    StepComplete {
        location: Location,
        /// The step as it ran, after any `switch` merge
        step: Step,
        next: Option<Location>,
        /// Storage changes made by the step, when patch recording is on
        storage_patch: Option<Vec<PatchOp>>,
    },
    /// A step was cut short by a pause or an idle detour. It will run
    /// again from the top; what it stored so far stays.
    StepInterrupted {
        location: Location,
        reason: Interrupted,
        /// Where the head is now
        next: Option<Location>,
        storage_patch: Option<Vec<PatchOp>>,
    },
    PageComplete {
        page: String,
    },
    Error(Arc<FlowError>),
    Idle {
        location: Location,
        step: Step,
    },
    Exit,
}
