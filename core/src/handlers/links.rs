use async_trait::async_trait;

use super::{resolve_target, Flow, StepHandler};
use crate::errors::FlowError;
use crate::handle::Handle;

pub const LINK_REJECTION: &str = "Input a valid link choice.";

/// Waits for input and follows the link it names.
pub struct LinksHandler;

#[async_trait]
impl StepHandler for LinksHandler {
    fn name(&self) -> &'static str {
        "links"
    }

    async fn process(&self, handle: &mut Handle<'_>) -> Result<Flow, FlowError> {
        if handle.step().links.is_none() {
            return Ok(Flow::Continue);
        }

        let Ok(input) = handle.get_input().await else {
            return Ok(Flow::Halt);
        };

        let target = handle
            .step()
            .links
            .as_ref()
            .and_then(|links| links.get(&input))
            .cloned();

        match target {
            Some(target) => {
                let location = resolve_target(handle, &target)?;
                handle.next_link = Some(location);
            }
            None => handle.reject_input(LINK_REJECTION),
        }

        Ok(Flow::Continue)
    }
}
