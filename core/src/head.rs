//! The cursor into a flow document

use std::sync::Arc;

use crate::errors::FlowError;
use crate::flow::{FlowDocument, Location, Step};

/// Current position of a conversation. `None` means no current step: the
/// engine is idle or waiting for a trigger.
#[derive(Debug, Clone)]
pub struct Head {
    flow: Arc<FlowDocument>,
    location: Option<Location>,
}

impl Head {
    pub fn new(flow: Arc<FlowDocument>, location: Option<Location>) -> Self {
        Self { flow, location }
    }

    pub fn flow(&self) -> &Arc<FlowDocument> {
        &self.flow
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// The step under the cursor.
    ///
    /// `Ok(None)` when there is no current location; an error when the
    /// location no longer resolves.
    pub fn step(&self) -> Result<Option<&Step>, FlowError> {
        let Some(location) = &self.location else {
            return Ok(None);
        };

        self.flow
            .step(location)
            .map(Some)
            .ok_or_else(|| FlowError::Navigation {
                from: None,
                target: location.to_string(),
            })
    }

    /// The following step on the same page, if there is one.
    pub fn next_link(&self) -> Option<Location> {
        let location = self.location.as_ref()?;
        let steps = self.flow.page(&location.page)?;
        let next = location.successor();
        (next.index < steps.len()).then_some(next)
    }

    /// Move to `target` (or to no step at all).
    ///
    /// Fails without moving when the page does not exist or the index is out
    /// of range.
    pub fn navigate(&mut self, target: Option<Location>) -> Result<(), FlowError> {
        if let Some(location) = &target {
            if self.flow.step(location).is_none() {
                return Err(FlowError::Navigation {
                    from: self.location.clone(),
                    target: location.to_string(),
                });
            }
        }

        self.location = target;
        Ok(())
    }

    /// Drop the current location.
    pub fn reset(&mut self) {
        self.location = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    fn head(location: Option<Location>) -> Head {
        let flow = FlowDocument::new(btreemap! {
            "/start".to_string() => vec![Step::message("A"), Step::message("B")],
            "/end".to_string() => vec![Step::message("C")],
        });
        Head::new(Arc::new(flow), location)
    }

    #[test]
    fn test_step_resolves_current_location() {
        let at_b = head(Some(Location::new("/start", 1)));
        assert_eq!(at_b.step().unwrap(), Some(&Step::message("B")));
        assert!(matches!(head(None).step(), Ok(None)));
    }

    #[test]
    fn test_next_link_stays_on_page() {
        assert_eq!(
            head(Some(Location::page("/start"))).next_link(),
            Some(Location::new("/start", 1))
        );
        assert_eq!(head(Some(Location::new("/start", 1))).next_link(), None);
        assert_eq!(head(None).next_link(), None);
    }

    #[test]
    fn test_navigate_validates_target() {
        let mut head = head(Some(Location::page("/start")));

        head.navigate(Some(Location::page("/end"))).unwrap();
        assert_eq!(head.location(), Some(&Location::page("/end")));

        let err = head.navigate(Some(Location::new("/end", 3))).unwrap_err();
        assert_eq!(err.to_string(), "cannot navigate from '/end[0]' to '/end[3]'");
        assert!(head.navigate(Some(Location::page("/nowhere"))).is_err());
        assert_eq!(head.location(), Some(&Location::page("/end")));

        head.navigate(None).unwrap();
        assert!(head.location().is_none());
    }
}
