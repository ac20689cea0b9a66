//! Step locations
//!
//! A location points at one step: a page id plus the index of the step inside
//! the page. Its textual form is `"/page[index]"`; a bare `"/page"` means
//! index 0.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::FlowError;

/// A `(page, index)` pointer into a flow document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub page: String,
    pub index: usize,
}

impl Location {
    pub fn new(page: impl Into<String>, index: usize) -> Self {
        Self {
            page: page.into(),
            index,
        }
    }

    /// Location of the first step of a page.
    pub fn page(page: impl Into<String>) -> Self {
        Self::new(page, 0)
    }

    /// Parse the `"page[index]"` form.
    pub fn parse(s: &str) -> Result<Self, FlowError> {
        let invalid = || FlowError::InvalidLocation(s.to_string());

        let Some(body) = s.strip_suffix(']') else {
            if s.is_empty() || s.contains('[') {
                return Err(invalid());
            }
            return Ok(Self::page(s));
        };

        let (page, index) = body.rsplit_once('[').ok_or_else(invalid)?;
        if page.is_empty() {
            return Err(invalid());
        }
        let index = index.trim().parse::<usize>().map_err(|_| invalid())?;

        Ok(Self::new(page, index))
    }

    /// The location of the following step on the same page.
    pub fn successor(&self) -> Self {
        Self::new(self.page.clone(), self.index + 1)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.page, self.index)
    }
}

impl FromStr for Location {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
