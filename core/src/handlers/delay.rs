use std::time::Duration;

use async_trait::async_trait;

use super::{Flow, StepHandler};
use crate::errors::FlowError;
use crate::handle::Handle;

/// Waits `delay` seconds. Only an engine abort cuts the wait short.
pub struct DelayHandler;

#[async_trait]
impl StepHandler for DelayHandler {
    fn name(&self) -> &'static str {
        "delay"
    }

    async fn process(&self, handle: &mut Handle<'_>) -> Result<Flow, FlowError> {
        let Some(seconds) = handle.step().delay else {
            return Ok(Flow::Continue);
        };
        if !seconds.is_finite() || seconds <= 0.0 {
            return Ok(Flow::Continue);
        }

        let duration =
            Duration::try_from_secs_f64(seconds).map_err(|_| FlowError::InvalidDelay {
                seconds,
                location: handle.location().clone(),
            })?;

        match handle.sleep(duration).await {
            Ok(()) => Ok(Flow::Continue),
            Err(interrupted) => {
                handle.interrupt(interrupted);
                Ok(Flow::Halt)
            }
        }
    }
}
