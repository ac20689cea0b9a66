use async_trait::async_trait;
use tracing::debug;

use super::{Flow, StepHandler};
use crate::errors::FlowError;
use crate::handle::Handle;

/// `clearVariables: true` resets the per-conversation storage.
pub struct ClearHandler;

#[async_trait]
impl StepHandler for ClearHandler {
    fn name(&self) -> &'static str {
        "clear"
    }

    async fn process(&self, handle: &mut Handle<'_>) -> Result<Flow, FlowError> {
        if handle.step().clear_variables == Some(true) {
            debug!(location = %handle.location(), "clearing variables");
            handle.storage().clear();
        }
        Ok(Flow::Continue)
    }
}
