//! Flow document loader
//!
//! Turns authored JSON into a [`FlowDocument`]:
//! 1. Pages may nest: a key starting with `/` inside a page object is a child
//!    page, flattened to `parent + key` (`"/shop"` + `"/sword"` -> `"/shop/sword"`).
//! 2. A page holding a single step object becomes a one-step page.
//! 3. Page ids must start with `/`.
//!
//! The document is either `{"pages": {...}, "triggers": {...}, "settings": {...}}`
//! or a bare page map.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value as JsonValue};

use super::document::{DocumentSettings, FlowDocument};
use super::step::Step;
use crate::errors::LoadError;

/// Load a flow from a JSON string.
pub fn load_str(source: &str) -> Result<FlowDocument, LoadError> {
    let value: JsonValue = serde_json::from_str(source)?;
    load_value(value)
}

/// Load a flow from a JSON file.
pub fn load_path(path: impl AsRef<Path>) -> Result<FlowDocument, LoadError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_str(&source)
}

/// Load a flow from an already parsed JSON value.
pub fn load_value(value: JsonValue) -> Result<FlowDocument, LoadError> {
    let JsonValue::Object(mut root) = value else {
        return Err(LoadError::MissingPages);
    };

    let raw_pages = match root.remove("pages") {
        Some(JsonValue::Object(pages)) => pages,
        Some(_) => return Err(LoadError::MissingPages),
        // A bare page map: every key is a page id
        None if !root.is_empty() && root.keys().all(|k| k.starts_with('/')) => {
            std::mem::take(&mut root)
        }
        None => return Err(LoadError::MissingPages),
    };

    let mut pages = BTreeMap::new();
    for (id, page) in flatten_pages(raw_pages)? {
        let steps = parse_page(&id, page)?;
        pages.insert(id, steps);
    }

    let triggers: BTreeMap<String, String> = match root.remove("triggers") {
        Some(triggers) => serde_json::from_value(triggers)?,
        None => BTreeMap::new(),
    };

    let settings: DocumentSettings = match root.remove("settings") {
        Some(settings) => serde_json::from_value(settings)?,
        None => DocumentSettings::default(),
    };

    Ok(FlowDocument::new(pages)
        .with_triggers(triggers)
        .with_settings(settings))
}

/* ===================== Flattening ===================== */

fn flatten_pages(raw: Map<String, JsonValue>) -> Result<Vec<(String, JsonValue)>, LoadError> {
    let mut flat = Vec::new();

    for (id, mut page) in raw {
        if !id.starts_with('/') {
            return Err(LoadError::InvalidPageId(id));
        }
        extract_children(&id, &mut page, &mut flat);
        flat.push((id, page));
    }

    Ok(flat)
}

/// Move every `/child` key of a page object out into `flat`, recursively.
fn extract_children(path: &str, page: &mut JsonValue, flat: &mut Vec<(String, JsonValue)>) {
    let JsonValue::Object(map) = page else {
        return;
    };

    let children: Vec<String> = map.keys().filter(|k| k.starts_with('/')).cloned().collect();

    for key in children {
        if let Some(mut child) = map.remove(&key) {
            let child_path = format!("{}{}", path, key);
            extract_children(&child_path, &mut child, flat);
            flat.push((child_path, child));
        }
    }
}

fn parse_page(id: &str, page: JsonValue) -> Result<Vec<Step>, LoadError> {
    let invalid = |source| LoadError::InvalidPage {
        page: id.to_string(),
        source,
    };

    match page {
        JsonValue::Array(_) => serde_json::from_value(page).map_err(invalid),
        JsonValue::Object(_) => serde_json::from_value(page)
            .map(|step: Step| vec![step])
            .map_err(invalid),
        other => Err(invalid(serde::de::Error::custom(format!(
            "expected a step or a list of steps, got {}",
            other
        )))),
    }
}
