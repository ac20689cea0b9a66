//! Variable storage
//!
//! A JSON tree addressed by paths such as `user.pets[0].name`, plus the
//! `{{path}}` template expansion used by messages, targets and arguments.
//!
//! Two layers:
//! - the per-conversation tree, which every write goes to and `clear()` resets
//! - an optional global tree, read when a path is absent locally
//!
//! A missing path reads as `None` ("undefined"), which is distinct from a
//! stored JSON `null`.

use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::warn;

/* ===================== Paths ===================== */

/// One step of a storage path. Serialized as a bare string or number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathComponent {
    Key(String),
    Index(usize),
}

impl PathComponent {
    pub(crate) fn key(&self) -> Cow<'_, str> {
        match self {
            PathComponent::Key(key) => Cow::Borrowed(key),
            PathComponent::Index(index) => Cow::Owned(index.to_string()),
        }
    }

    /// Index into an array; numeric keys count too (`items.0`).
    pub(crate) fn array_index(&self) -> Option<usize> {
        match self {
            PathComponent::Index(index) => Some(*index),
            PathComponent::Key(key) => key.parse().ok(),
        }
    }
}

impl fmt::Display for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathComponent::Key(key) => write!(f, "{}", key),
            PathComponent::Index(index) => write!(f, "[{}]", index),
        }
    }
}

/// Split a path on `.`, then each segment into its name and `[n]` indices.
///
/// A segment whose brackets are malformed is kept whole as a key.
pub fn parse_path(path: &str) -> Vec<PathComponent> {
    let mut components = Vec::new();

    for segment in path.split('.') {
        match split_indices(segment) {
            Some((name, indices)) => {
                if !name.is_empty() {
                    components.push(PathComponent::Key(name.to_string()));
                }
                components.extend(indices.into_iter().map(PathComponent::Index));
            }
            None => components.push(PathComponent::Key(segment.to_string())),
        }
    }

    components
}

fn split_indices(segment: &str) -> Option<(&str, Vec<usize>)> {
    let Some(open) = segment.find('[') else {
        return Some((segment, Vec::new()));
    };

    let (name, mut rest) = segment.split_at(open);
    let mut indices = Vec::new();

    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let close = inner.find(']')?;
        indices.push(inner[..close].parse().ok()?);
        rest = &inner[close + 1..];
    }

    Some((name, indices))
}

fn lookup<'a>(root: &'a JsonValue, components: &[PathComponent]) -> Option<&'a JsonValue> {
    components.iter().try_fold(root, |head, component| match head {
        JsonValue::Object(map) => map.get(component.key().as_ref()),
        JsonValue::Array(items) => component.array_index().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// How far past the end of an array a write may reach. Gaps are filled
/// with `null`.
pub const MAX_ARRAY_GAP: usize = 1024;

/// The first array index along `components` that a write from `root` may
/// not create, if any.
fn unreachable_index(root: &JsonValue, components: &[PathComponent]) -> Option<usize> {
    let mut node = Some(root);

    for component in components {
        let index = match (node, component) {
            (Some(JsonValue::Object(_)), _) => None,
            (Some(JsonValue::Array(_)), key) => key.array_index(),
            (_, PathComponent::Index(index)) => Some(*index),
            (_, PathComponent::Key(_)) => None,
        };

        node = match (node, index) {
            (Some(JsonValue::Array(items)), Some(index)) => {
                if index > items.len().saturating_add(MAX_ARRAY_GAP) {
                    return Some(index);
                }
                items.get(index)
            }
            (_, Some(index)) => {
                if index > MAX_ARRAY_GAP {
                    return Some(index);
                }
                None
            }
            (Some(JsonValue::Object(map)), None) => map.get(component.key().as_ref()),
            (_, None) => None,
        };
    }

    None
}

/// The slot `component` names inside `head`, creating it when missing.
///
/// A `head` that cannot hold the component (a primitive, `null`, or an array
/// addressed by a name) is replaced by a container that can.
fn slot_mut<'a>(head: &'a mut JsonValue, component: &PathComponent) -> &'a mut JsonValue {
    let array_index = match (&*head, component) {
        (JsonValue::Object(_), _) => None,
        (JsonValue::Array(_), key) => key.array_index(),
        (_, PathComponent::Index(index)) => Some(*index),
        (_, PathComponent::Key(_)) => None,
    };

    match array_index {
        Some(index) => {
            if !head.is_array() {
                *head = JsonValue::Array(Vec::new());
            }
            let JsonValue::Array(items) = head else {
                unreachable!("head was just made an array")
            };
            if items.len() <= index {
                items.resize(index.saturating_add(1), JsonValue::Null);
            }
            &mut items[index]
        }
        None => {
            if !head.is_object() {
                *head = JsonValue::Object(Map::new());
            }
            let JsonValue::Object(map) = head else {
                unreachable!("head was just made an object")
            };
            map.entry(component.key().into_owned())
                .or_insert(JsonValue::Null)
        }
    }
}

/* ===================== Templates ===================== */

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{[\w\[\].]+\}\}").expect("placeholder pattern is valid"))
}

/// True when `s` is exactly one `{{path}}` placeholder.
pub fn is_lone_placeholder(s: &str) -> bool {
    placeholder_pattern()
        .find(s)
        .is_some_and(|m| m.start() == 0 && m.end() == s.len())
}

fn placeholder_path(placeholder: &str) -> &str {
    &placeholder[2..placeholder.len() - 2]
}

/// Render a stored value the way it appears inside a message.
///
/// Integral floats print without a fractional part, arrays are joined with
/// `,` and objects print as compact JSON.
pub fn to_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => "null".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            // f64's Display already drops a zero fraction
            (_, _, Some(f)) => f.to_string(),
            _ => n.to_string(),
        },
        JsonValue::Array(items) => items.iter().map(to_text).collect::<Vec<_>>().join(","),
        JsonValue::Object(_) => value.to_string(),
    }
}

/* ===================== Storage ===================== */

#[derive(Debug, Clone, PartialEq)]
pub struct Storage {
    local: JsonValue,
    global: Option<JsonValue>,
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage {
    pub fn new() -> Self {
        Self {
            local: JsonValue::Object(Map::new()),
            global: None,
        }
    }

    /// Storage seeded with an initial per-conversation tree.
    pub fn from_value(initial: JsonValue) -> Self {
        Self {
            local: initial,
            global: None,
        }
    }

    /// Attach a global layer that survives `clear()`.
    pub fn with_global(mut self, global: JsonValue) -> Self {
        self.global = Some(global);
        self
    }

    pub fn global(&self) -> Option<&JsonValue> {
        self.global.as_ref()
    }

    /// The per-conversation tree.
    pub fn local(&self) -> &JsonValue {
        &self.local
    }

    pub fn snapshot(&self) -> JsonValue {
        self.local.clone()
    }

    /// Read a path, falling back to the global layer.
    pub fn get_value(&self, path: &str) -> Option<&JsonValue> {
        let components = parse_path(path);
        lookup(&self.local, &components)
            .or_else(|| self.global.as_ref().and_then(|g| lookup(g, &components)))
    }

    /// Write a path in the per-conversation layer, creating intermediates.
    ///
    /// A write that would grow an array more than [`MAX_ARRAY_GAP`] slots past
    /// its end is dropped and leaves storage untouched. Returns whether the
    /// value was stored.
    pub fn set_value(&mut self, path: &str, value: JsonValue) -> bool {
        let components = parse_path(path);
        if let Some(index) = unreachable_index(&self.local, &components) {
            warn!(path, index, "array index out of reach, write ignored");
            return false;
        }

        let head = components
            .iter()
            .fold(&mut self.local, |head, component| slot_mut(head, component));
        *head = value;
        true
    }

    /// Reset the per-conversation layer.
    pub fn clear(&mut self) {
        self.local = JsonValue::Object(Map::new());
    }

    /// Replace every defined `{{path}}` with its text form.
    pub fn expand_string(&self, s: &str) -> String {
        placeholder_pattern()
            .replace_all(s, |caps: &regex::Captures<'_>| {
                let placeholder = &caps[0];
                match self.get_value(placeholder_path(placeholder)) {
                    Some(value) => to_text(value),
                    None => placeholder.to_string(),
                }
            })
            .into_owned()
    }

    /// Deep copy of `value` with every string leaf expanded.
    ///
    /// A leaf that is a lone placeholder of a defined path becomes the stored
    /// value itself, keeping its type.
    pub fn expand_object(&self, value: &JsonValue) -> JsonValue {
        match value {
            JsonValue::String(s) => match self.lone_placeholder_value(s) {
                Some(stored) => stored.clone(),
                None => JsonValue::String(self.expand_string(s)),
            },
            JsonValue::Array(items) => {
                JsonValue::Array(items.iter().map(|v| self.expand_object(v)).collect())
            }
            JsonValue::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.expand_object(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// The stored value behind a lone placeholder, when `s` is one and the
    /// path is defined.
    pub fn lone_placeholder_value(&self, s: &str) -> Option<&JsonValue> {
        if !is_lone_placeholder(s) {
            return None;
        }
        self.get_value(placeholder_path(s))
    }
}

/* ===================== Shared handle ===================== */

/// Clonable handle to one storage, shared by the engine, handlers and host.
///
/// Every method takes the lock for a single operation; none of them can be
/// held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct SharedStorage(Arc<Mutex<Storage>>);

impl SharedStorage {
    pub fn new(storage: Storage) -> Self {
        Self(Arc::new(Mutex::new(storage)))
    }

    fn lock(&self) -> MutexGuard<'_, Storage> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read<R>(&self, f: impl FnOnce(&Storage) -> R) -> R {
        f(&self.lock())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut Storage) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn get_value(&self, path: &str) -> Option<JsonValue> {
        self.lock().get_value(path).cloned()
    }

    pub fn set_value(&self, path: &str, value: JsonValue) -> bool {
        self.lock().set_value(path, value)
    }

    pub fn expand_string(&self, s: &str) -> String {
        self.lock().expand_string(s)
    }

    pub fn expand_object(&self, value: &JsonValue) -> JsonValue {
        self.lock().expand_object(value)
    }

    pub fn clear(&self) {
        self.lock().clear()
    }

    pub fn snapshot(&self) -> JsonValue {
        self.lock().snapshot()
    }
}

impl From<Storage> for SharedStorage {
    fn from(storage: Storage) -> Self {
        Self::new(storage)
    }
}
