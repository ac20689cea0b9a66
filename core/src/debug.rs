//! Conversation history for stepping back and forth
//!
//! Every completed step becomes a [`StatePatch`]: the inputs and outputs it
//! saw, the storage changes it made, and where the head went next. Folding
//! the first `n` patches over the initial storage rebuilds the state after
//! step `n`.
//!
//! Storage changes are only attached to step events when the engine runs
//! with `record_patches` on.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::warn;

use crate::engine::{Engine, EngineEvent};
use crate::flow::Location;
use crate::storage::PathComponent;

/* ===================== Storage patches ===================== */

/// One change to a JSON tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Add {
        path: Vec<PathComponent>,
        value: JsonValue,
    },
    Remove {
        path: Vec<PathComponent>,
    },
    Replace {
        path: Vec<PathComponent>,
        value: JsonValue,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("no value at '{0}'")]
    PathNotFound(String),

    #[error("cannot add at '{0}': parent is not a container")]
    NotAContainer(String),
}

fn display_path(path: &[PathComponent]) -> String {
    let mut out = String::new();
    for component in path {
        match component {
            PathComponent::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
            PathComponent::Index(index) => {
                let _ = write!(out, "[{}]", index);
            }
        }
    }
    out
}

/// The changes turning `before` into `after`.
///
/// Objects are compared key by key, arrays index by index; anything else
/// that differs is replaced whole.
pub fn diff(before: &JsonValue, after: &JsonValue) -> Vec<PatchOp> {
    let mut ops = Vec::new();
    diff_into(&mut Vec::new(), before, after, &mut ops);
    ops
}

fn diff_into(
    path: &mut Vec<PathComponent>,
    before: &JsonValue,
    after: &JsonValue,
    ops: &mut Vec<PatchOp>,
) {
    match (before, after) {
        (JsonValue::Object(old), JsonValue::Object(new)) => {
            for (key, old_value) in old {
                path.push(PathComponent::Key(key.clone()));
                match new.get(key) {
                    Some(new_value) => diff_into(path, old_value, new_value, ops),
                    None => ops.push(PatchOp::Remove { path: path.clone() }),
                }
                path.pop();
            }
            for (key, new_value) in new {
                if !old.contains_key(key) {
                    let mut added = path.clone();
                    added.push(PathComponent::Key(key.clone()));
                    ops.push(PatchOp::Add {
                        path: added,
                        value: new_value.clone(),
                    });
                }
            }
        }

        (JsonValue::Array(old), JsonValue::Array(new)) => {
            let common = old.len().min(new.len());
            for index in 0..common {
                path.push(PathComponent::Index(index));
                diff_into(path, &old[index], &new[index], ops);
                path.pop();
            }
            for (index, value) in new.iter().enumerate().skip(common) {
                let mut added = path.clone();
                added.push(PathComponent::Index(index));
                ops.push(PatchOp::Add {
                    path: added,
                    value: value.clone(),
                });
            }
            // From the end so earlier indices stay valid
            for index in (common..old.len()).rev() {
                let mut removed = path.clone();
                removed.push(PathComponent::Index(index));
                ops.push(PatchOp::Remove { path: removed });
            }
        }

        _ if before == after => {}

        _ => ops.push(PatchOp::Replace {
            path: path.clone(),
            value: after.clone(),
        }),
    }
}

fn resolve_mut<'a>(root: &'a mut JsonValue, path: &[PathComponent]) -> Option<&'a mut JsonValue> {
    path.iter().try_fold(root, |head, component| match head {
        JsonValue::Object(map) => map.get_mut(component.key().as_ref()),
        JsonValue::Array(items) => component.array_index().and_then(|i| items.get_mut(i)),
        _ => None,
    })
}

/// Apply `ops` in order. Stops at the first op that does not fit.
pub fn apply(root: &mut JsonValue, ops: &[PatchOp]) -> Result<(), PatchError> {
    ops.iter().try_for_each(|op| apply_one(root, op))
}

fn apply_one(root: &mut JsonValue, op: &PatchOp) -> Result<(), PatchError> {
    let path = match op {
        PatchOp::Add { path, .. } | PatchOp::Remove { path } | PatchOp::Replace { path, .. } => {
            path
        }
    };
    let not_found = || PatchError::PathNotFound(display_path(path));

    let Some((last, parent_path)) = path.split_last() else {
        *root = match op {
            PatchOp::Add { value, .. } | PatchOp::Replace { value, .. } => value.clone(),
            PatchOp::Remove { .. } => JsonValue::Null,
        };
        return Ok(());
    };
    let parent = resolve_mut(root, parent_path).ok_or_else(not_found)?;

    match op {
        PatchOp::Add { value, .. } => match parent {
            JsonValue::Object(map) => {
                map.insert(last.key().into_owned(), value.clone());
                Ok(())
            }
            JsonValue::Array(items) => match last.array_index() {
                Some(index) if index <= items.len() => {
                    items.insert(index, value.clone());
                    Ok(())
                }
                _ => Err(not_found()),
            },
            _ => Err(PatchError::NotAContainer(display_path(path))),
        },

        PatchOp::Remove { .. } => {
            let removed = match parent {
                JsonValue::Object(map) => map.remove(last.key().as_ref()),
                JsonValue::Array(items) => match last.array_index() {
                    Some(index) if index < items.len() => Some(items.remove(index)),
                    _ => None,
                },
                _ => None,
            };
            removed.map(|_| ()).ok_or_else(not_found)
        }

        PatchOp::Replace { value, .. } => {
            let slot = resolve_mut(parent, std::slice::from_ref(last)).ok_or_else(not_found)?;
            *slot = value.clone();
            Ok(())
        }
    }
}

/* ===================== Step history ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoKind {
    Input,
    Output,
}

/// A line of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Io {
    pub kind: IoKind,
    pub message: String,
}

/// Everything one step changed. Interrupted steps get a patch of their own.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatePatch {
    pub ios: Vec<Io>,
    pub storage_patches: Vec<PatchOp>,
    /// Where the head went after the step
    pub location: Option<Location>,
}

/// The conversation as of some step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DebugState {
    pub ios: Vec<Io>,
    pub storage: JsonValue,
    pub location: Option<Location>,
}

impl DebugState {
    /// Replay `patches` over `storage`.
    pub fn from_patches(storage: JsonValue, patches: &[StatePatch]) -> Result<Self, PatchError> {
        let mut state = DebugState {
            storage,
            ..Default::default()
        };
        for patch in patches {
            state.ios.extend(patch.ios.iter().cloned());
            apply(&mut state.storage, &patch.storage_patches)?;
            state.location = patch.location.clone();
        }
        Ok(state)
    }
}

/// Collects [`StatePatch`]es from an engine's events.
pub struct Debugger {
    events: broadcast::Receiver<EngineEvent>,
    initial_storage: JsonValue,
    patches: Vec<StatePatch>,
    pending: Vec<Io>,
}

impl Debugger {
    /// Start recording from the engine's current state.
    pub fn attach(engine: &Engine) -> Self {
        let initial_storage = match engine.storage().snapshot() {
            JsonValue::Null => JsonValue::Object(Map::new()),
            storage => storage,
        };
        Self {
            events: engine.subscribe(),
            initial_storage,
            patches: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Drain events received so far.
    fn sync(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(EngineEvent::Input(message)) => self.pending.push(Io {
                    kind: IoKind::Input,
                    message,
                }),
                Ok(EngineEvent::Output(message)) => self.pending.push(Io {
                    kind: IoKind::Output,
                    message,
                }),
                Ok(EngineEvent::StepComplete {
                    next,
                    storage_patch,
                    ..
                })
                | Ok(EngineEvent::StepInterrupted {
                    next,
                    storage_patch,
                    ..
                }) => self.patches.push(StatePatch {
                    ios: std::mem::take(&mut self.pending),
                    storage_patches: storage_patch.unwrap_or_default(),
                    location: next,
                }),
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "debugger fell behind; history is incomplete");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    pub fn patches(&mut self) -> &[StatePatch] {
        self.sync();
        &self.patches
    }

    /// State after the first `steps` steps.
    pub fn state_at(&mut self, steps: usize) -> Result<DebugState, PatchError> {
        self.sync();
        let steps = steps.min(self.patches.len());
        DebugState::from_patches(self.initial_storage.clone(), &self.patches[..steps])
    }

    pub fn current_state(&mut self) -> Result<DebugState, PatchError> {
        self.state_at(usize::MAX)
    }
}
