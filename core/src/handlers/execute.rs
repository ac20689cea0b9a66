use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::debug;

use super::{Flow, StepHandler};
use crate::errors::FlowError;
use crate::handle::Handle;
use crate::storage::is_lone_placeholder;

/// Calls a function from the dictionary and stores what it returns.
///
/// With `expandArgs` (the default), an argument that is a lone `{{path}}`
/// is replaced by the stored value, or `null` when undefined. Other
/// arguments are passed as written. Failures are reported and the pipeline
/// continues.
pub struct ExecuteHandler;

#[async_trait]
impl StepHandler for ExecuteHandler {
    fn name(&self) -> &'static str {
        "execute"
    }

    async fn process(&self, handle: &mut Handle<'_>) -> Result<Flow, FlowError> {
        let Some(execute) = handle.step().execute.clone() else {
            return Ok(Flow::Continue);
        };
        let location = handle.location().clone();

        let args: Vec<JsonValue> = handle.storage().read(|storage| {
            execute
                .args
                .iter()
                .map(|arg| match arg {
                    JsonValue::String(s) if execute.expand_args && is_lone_placeholder(s) => storage
                        .lone_placeholder_value(s)
                        .cloned()
                        .unwrap_or(JsonValue::Null),
                    other => other.clone(),
                })
                .collect()
        });

        let Some(function) = handle.functions().get(&execute.function) else {
            handle.report(FlowError::FunctionNotFound {
                name: execute.function,
                location,
            });
            return Ok(Flow::Continue);
        };

        debug!(function = %execute.function, %location, "executing function");
        match function.call(args).await {
            Ok(Some(value)) => {
                if let Some(variable) = &execute.output_variable {
                    handle.storage().set_value(variable, value);
                }
            }
            Ok(None) => {}
            Err(source) => handle.report(FlowError::FunctionFailed {
                name: execute.function,
                location,
                source,
            }),
        }

        Ok(Flow::Continue)
    }
}
