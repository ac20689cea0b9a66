//! Error types for the flow engine
//!
//! Three families, grouped by who has to act on them:
//! - [`FlowError`]: raised while a flow runs. Reported on the engine's error
//!   channel; the conversation keeps going.
//! - [`CallerError`]: the host used the engine API incorrectly.
//! - [`LoadError`]: an authored document could not be turned into a flow.

use std::path::PathBuf;

use crate::flow::Location;

/// Errors produced while executing a flow.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// A navigation target does not resolve to an existing step
    #[error("cannot navigate from '{}' to '{target}'", display_location(.from))]
    Navigation {
        from: Option<Location>,
        target: String,
    },

    /// A directive is missing a field it cannot work without
    #[error("missing property '{property}' at {location}")]
    MissingProperty { property: String, location: Location },

    /// A location string could not be parsed
    #[error("invalid location '{0}'")]
    InvalidLocation(String),

    /// A text input carries a pattern that is not a valid regex
    #[error("invalid input pattern '{pattern}' at {location}: {source}")]
    InvalidPattern {
        pattern: String,
        location: Location,
        #[source]
        source: regex::Error,
    },

    /// `execute` named a function the dictionary does not have
    #[error("function '{name}' not found (at {location})")]
    FunctionNotFound { name: String, location: Location },

    /// A registered function returned an error
    #[error("function '{name}' failed at {location}: {source}")]
    FunctionFailed {
        name: String,
        location: Location,
        #[source]
        source: anyhow::Error,
    },

    /// A `request` step declared a body on a GET
    #[error(
        "GET request with a body at {location}; use POST to send a body"
    )]
    GetWithBody { location: Location },

    /// The network collaborator failed
    #[error("request to '{url}' failed at {location}: {source}")]
    RequestFailed {
        url: String,
        location: Location,
        #[source]
        source: anyhow::Error,
    },

    /// A `delay` too long to represent as a duration
    #[error("delay of {seconds} seconds at {location} is out of range")]
    InvalidDelay { seconds: f64, location: Location },

    /// Too many consecutive steps ran without waiting for input
    #[error("freefall: {limit} consecutive steps without input (last at {})", display_location(.location))]
    Freefall {
        limit: usize,
        location: Option<Location>,
    },
}

impl FlowError {
    /// The location the error refers to, when it has one.
    pub fn location(&self) -> Option<&Location> {
        match self {
            FlowError::Navigation { from, .. } => from.as_ref(),
            FlowError::Freefall { location, .. } => location.as_ref(),
            FlowError::InvalidLocation(_) => None,
            FlowError::MissingProperty { location, .. }
            | FlowError::InvalidPattern { location, .. }
            | FlowError::FunctionNotFound { location, .. }
            | FlowError::FunctionFailed { location, .. }
            | FlowError::GetWithBody { location }
            | FlowError::InvalidDelay { location, .. }
            | FlowError::RequestFailed { location, .. } => Some(location),
        }
    }
}

fn display_location(location: &Option<Location>) -> String {
    location
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "<none>".to_string())
}

/// Misuse of the engine API by its host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallerError {
    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not waiting for input")]
    NotWaitingInput,

    #[error("engine must be paused to navigate")]
    Busy,

    #[error("cannot navigate to '{0}'")]
    InvalidTarget(String),
}

/// Errors raised while loading an authored flow document.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read flow {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid flow JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("flow document must be an object with a 'pages' object")]
    MissingPages,

    #[error("page id '{0}' must start with '/'")]
    InvalidPageId(String),

    #[error("page '{page}' is invalid: {source}")]
    InvalidPage {
        page: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_error_names_both_ends() {
        let err = FlowError::Navigation {
            from: Some(Location::new("/start", 1)),
            target: "/missing".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot navigate from '/start[1]' to '/missing'"
        );
        assert_eq!(err.location(), Some(&Location::new("/start", 1)));
    }

    #[test]
    fn test_freefall_without_location() {
        let err = FlowError::Freefall {
            limit: 3,
            location: None,
        };
        assert!(err.to_string().contains("<none>"));
        assert!(err.location().is_none());
    }
}
