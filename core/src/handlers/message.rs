use async_trait::async_trait;

use super::{Flow, StepHandler};
use crate::errors::FlowError;
use crate::handle::Handle;

pub struct MessageHandler;

#[async_trait]
impl StepHandler for MessageHandler {
    fn name(&self) -> &'static str {
        "message"
    }

    async fn process(&self, handle: &mut Handle<'_>) -> Result<Flow, FlowError> {
        if let Some(message) = &handle.step().message {
            let text = handle.storage().expand_string(&message.to_text());
            handle.print(text);
        }
        Ok(Flow::Continue)
    }
}
