use async_trait::async_trait;

use super::{Flow, StepHandler};
use crate::errors::FlowError;
use crate::flow::Step;
use crate::handle::Handle;
use crate::storage::to_text;

/// Branches on a stored value.
///
/// The stored value (as text, `"undefined"` when missing) selects a case, or
/// the default. The case is merged over the step; the authored step itself is
/// never modified.
pub struct SwitchHandler;

#[async_trait]
impl StepHandler for SwitchHandler {
    fn name(&self) -> &'static str {
        "switch"
    }

    async fn process(&self, handle: &mut Handle<'_>) -> Result<Flow, FlowError> {
        let derived = {
            let step = handle.step();
            let Some(switch) = &step.switch else {
                return Ok(Flow::Continue);
            };

            let key = handle
                .storage()
                .get_value(&switch.variable)
                .map(|value| to_text(&value))
                .unwrap_or_else(|| "undefined".to_string());

            match switch.cases.get(&key).or(switch.default.as_deref()) {
                Some(case) => step.merged_with(case),
                None => Step {
                    switch: None,
                    ..step.clone()
                },
            }
        };

        handle.replace_step(derived);
        Ok(Flow::Continue)
    }
}
