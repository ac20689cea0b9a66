//! Step handlers
//!
//! Each directive of a step is implemented by one handler. The engine runs
//! them in order over a fresh [`Handle`]; a handler returns
//! [`Flow::Continue`] to pass the handle on or [`Flow::Halt`] to stop the
//! pipeline (used when waiting for input was interrupted).
//!
//! An `Err` is an authoring error in the step. The engine reports it and
//! moves on.
//!
//! Default order:
//!
//! 1. `switch` - pick a case and merge it over the step
//! 2. `clear` - wipe per-conversation variables
//! 3. `message` - print the message
//! 4. `next` - set the unconditional target
//! 5. `input` - set, choice or text input
//! 6. `links` - branch on the user's input
//! 7. `execute` - call a registered function
//! 8. `request` - call the network collaborator
//! 9. `delay` - wait before finishing

mod clear;
mod delay;
mod execute;
mod input;
mod links;
mod message;
mod next;
mod request;
mod switch;

pub use clear::ClearHandler;
pub use delay::DelayHandler;
pub use execute::ExecuteHandler;
pub use input::{InputHandler, CHOICE_REJECTION, PATTERN_REJECTION};
pub use links::{LinksHandler, LINK_REJECTION};
pub use message::MessageHandler;
pub use next::NextHandler;
pub use request::RequestHandler;
pub use switch::SwitchHandler;

use async_trait::async_trait;
use tracing::trace;

use crate::errors::FlowError;
use crate::flow::Location;
use crate::handle::Handle;

/// Whether the pipeline keeps going after a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Halt,
}

#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn process(&self, handle: &mut Handle<'_>) -> Result<Flow, FlowError>;
}

/// The canonical handler list.
pub fn default_handlers() -> Vec<Box<dyn StepHandler>> {
    vec![
        Box::new(SwitchHandler),
        Box::new(ClearHandler),
        Box::new(MessageHandler),
        Box::new(NextHandler),
        Box::new(InputHandler),
        Box::new(LinksHandler),
        Box::new(ExecuteHandler),
        Box::new(RequestHandler),
        Box::new(DelayHandler),
    ]
}

/// Pass `handle` through `handlers` until one halts or fails.
pub async fn run_pipeline(
    handlers: &[Box<dyn StepHandler>],
    handle: &mut Handle<'_>,
) -> Result<(), FlowError> {
    for handler in handlers {
        trace!(handler = handler.name(), location = %handle.location(), "processing step");
        if handler.process(handle).await? == Flow::Halt {
            trace!(handler = handler.name(), "pipeline halted");
            break;
        }
    }
    Ok(())
}

/// Expand a target string and parse it as a location.
pub(crate) fn resolve_target(handle: &Handle<'_>, target: &str) -> Result<Location, FlowError> {
    Location::parse(&handle.storage().expand_string(target))
}

#[cfg(test)]
mod tests;
