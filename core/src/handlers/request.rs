use async_trait::async_trait;
use tracing::debug;

use super::{resolve_target, Flow, StepHandler};
use crate::errors::FlowError;
use crate::handle::Handle;
use crate::network::{parse_response, HttpMethod, HttpRequest};

/// Sends an HTTP request and stores the response.
///
/// The body is parsed as JSON when possible, otherwise stored as text. A
/// failed request is reported and, when `failNext` is set, redirects the
/// flow there.
pub struct RequestHandler;

#[async_trait]
impl StepHandler for RequestHandler {
    fn name(&self) -> &'static str {
        "request"
    }

    async fn process(&self, handle: &mut Handle<'_>) -> Result<Flow, FlowError> {
        let Some(spec) = handle.step().request.clone() else {
            return Ok(Flow::Continue);
        };
        let location = handle.location().clone();

        let storage = handle.storage();
        let url = if spec.expand_url {
            storage.expand_string(&spec.url)
        } else {
            spec.url.clone()
        };
        let body = match &spec.body {
            Some(body) if spec.expand_body => Some(storage.expand_object(body)),
            other => other.clone(),
        };
        let headers = spec
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), storage.expand_string(value)))
            .collect();

        if spec.method == HttpMethod::Get && body.is_some() {
            handle.report(FlowError::GetWithBody { location });
            return Ok(Flow::Continue);
        }

        let request = HttpRequest {
            url: url.clone(),
            method: spec.method,
            headers,
            body,
        };

        debug!(method = %spec.method, %url, %location, "sending request");
        match handle.http().send(request).await {
            Ok(text) => {
                if let Some(variable) = &spec.output_variable {
                    handle.storage().set_value(variable, parse_response(text));
                }
            }
            Err(source) => {
                handle.report(FlowError::RequestFailed {
                    url,
                    location,
                    source,
                });
                if let Some(fail_next) = &spec.fail_next {
                    let target = resolve_target(handle, fail_next)?;
                    handle.next_link = Some(target);
                }
            }
        }

        Ok(Flow::Continue)
    }
}
