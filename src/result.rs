//! Projection of raw query results into usable values

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::RelayError;

/// Custom projection applied to a present result
pub type PickFn = dyn Fn(&Value) -> crate::Result<Value> + Send + Sync;

/// Resolves a raw `data` object into the value a view works with
#[derive(Clone)]
pub struct ResultProjector {
    default_value: Value,
    pick: Option<Arc<PickFn>>,
}

impl ResultProjector {
    /// Projector that auto-unwraps single-field envelopes
    pub fn new(default_value: Value) -> Self {
        Self {
            default_value,
            pick: None,
        }
    }

    /// Projector with a custom pick function
    pub fn with_pick<F>(default_value: Value, pick: F) -> Self
    where
        F: Fn(&Value) -> crate::Result<Value> + Send + Sync + 'static,
    {
        Self {
            default_value,
            pick: Some(Arc::new(pick)),
        }
    }

    /// Projector that picks the value at a JSON pointer (e.g. `/viewer/friends`)
    pub fn pointer(default_value: Value, pointer: impl Into<String>) -> Self {
        let pointer = pointer.into();
        Self::with_pick(default_value, move |data| {
            data.pointer(&pointer)
                .cloned()
                .ok_or_else(|| RelayError::ProjectionError(format!("no value at {pointer}")))
        })
    }

    pub fn default_value(&self) -> &Value {
        &self.default_value
    }

    /// Project a raw result; `None` and `null` both mean "not arrived yet"
    pub fn project(&self, raw: Option<&Value>) -> Value {
        project(raw, &self.default_value, self.pick.as_deref())
    }
}

impl fmt::Debug for ResultProjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultProjector")
            .field("default_value", &self.default_value)
            .field("pick", &self.pick.is_some())
            .finish()
    }
}

impl Default for ResultProjector {
    fn default() -> Self {
        Self::new(Value::Null)
    }
}

/// Resolve a raw result.
///
/// A failing `pick` does not propagate: the failure is logged and the default
/// value is returned for this evaluation. Callers that need the error should
/// run their pick function directly.
pub fn project(raw: Option<&Value>, default_value: &Value, pick: Option<&PickFn>) -> Value {
    let value = match raw {
        Some(value) if !value.is_null() => value,
        _ => return default_value.clone(),
    };

    if let Some(pick) = pick {
        return match pick(value) {
            Ok(picked) => picked,
            Err(error) => {
                warn!(%error, "result projection failed, using default value");
                default_value.clone()
            }
        };
    }

    match value.as_object() {
        Some(object) if object.len() == 1 => object.values().next().cloned().unwrap_or(Value::Null),
        _ => value.clone(),
    }
}
