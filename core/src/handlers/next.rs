use async_trait::async_trait;

use super::{resolve_target, Flow, StepHandler};
use crate::errors::FlowError;
use crate::handle::Handle;

pub struct NextHandler;

#[async_trait]
impl StepHandler for NextHandler {
    fn name(&self) -> &'static str {
        "next"
    }

    async fn process(&self, handle: &mut Handle<'_>) -> Result<Flow, FlowError> {
        let target = match &handle.step().next {
            Some(next) => resolve_target(handle, next)?,
            None => return Ok(Flow::Continue),
        };

        handle.next_link = Some(target);
        Ok(Flow::Continue)
    }
}
