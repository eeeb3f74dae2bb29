use serde::{Deserialize, Serialize};

use crate::accumulator::SessionState;
use crate::errors::RunFailure;
use crate::model::{ProductCard, TodoItem, ToolStatus};

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Partial mutation of one tool call.
///
/// `args` and `result` overwrite the accumulated value unless the matching
/// `*_append` flag is set, in which case they are concatenated onto it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolStatus>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub args_append: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub result_append: bool,
}

/// Normalized partial update produced from one payload.
///
/// Every field is optional; an update with no fields set is dropped by the
/// accumulator. When delivered to consumers, `text` and `thinking_text` hold
/// the full running values rather than the delta.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub replace: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_text: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub thinking_replace: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_done: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todos: Option<Vec<TodoItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallPatch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub products: Option<Vec<ProductCard>>,
}

impl StreamUpdate {
    pub(crate) fn text_delta(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub(crate) fn text_replace(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            replace: true,
            ..Self::default()
        }
    }

    pub(crate) fn text_with_mode(text: impl Into<String>, replace: bool) -> Self {
        Self {
            text: Some(text.into()),
            replace,
            ..Self::default()
        }
    }

    pub(crate) fn thinking_delta(text: impl Into<String>) -> Self {
        Self {
            thinking_text: Some(text.into()),
            ..Self::default()
        }
    }

    pub(crate) fn thinking_reset() -> Self {
        Self {
            thinking_text: Some(String::new()),
            thinking_replace: true,
            ..Self::default()
        }
    }

    pub(crate) fn active(mut self) -> Self {
        self.thinking_active = Some(true);
        self
    }

    pub(crate) fn done() -> Self {
        Self {
            thinking_done: Some(true),
            ..Self::default()
        }
    }

    pub(crate) fn status(mut self, status: Option<impl Into<String>>) -> Self {
        if let Some(status) = status {
            self.thinking_status = Some(status.into());
        }
        self
    }

    pub(crate) fn with_todos(mut self, todos: Option<&Vec<TodoItem>>) -> Self {
        if let Some(todos) = todos {
            self.todos = Some(todos.clone());
        }
        self
    }

    pub(crate) fn with_tool_calls(mut self, patches: Vec<ToolCallPatch>) -> Self {
        if !patches.is_empty() {
            self.tool_calls = Some(patches);
        }
        self
    }

    /// Returns `true` when no field is set.
    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.thinking_text.is_none()
            && self.thinking_active.is_none()
            && self.thinking_done.is_none()
            && self.thinking_status.is_none()
            && self.todos.is_none()
            && self.tool_calls.is_none()
            && self.products.is_none()
    }

    /// Returns `true` when the update changes something a consumer renders.
    ///
    /// `thinking_active: false` on its own is not worth a delivery.
    pub fn is_meaningful(&self) -> bool {
        self.text.is_some()
            || self.thinking_text.is_some()
            || self.thinking_active == Some(true)
            || self.thinking_done.is_some()
            || self.thinking_status.is_some()
            || self.todos.is_some()
            || self.tool_calls.is_some()
            || self.products.is_some()
    }
}

/// Events exposed by `RunStream`, in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// First event for every run.
    RunStarted {
        run_id: uuid::Uuid,
        thread_id: String,
    },
    /// Decoded payload, before interpretation. Only emitted when the run was
    /// started with raw payload events enabled.
    Payload {
        run_id: uuid::Uuid,
        payload: serde_json::Value,
    },
    /// A meaningful update was applied to the session state.
    Update {
        run_id: uuid::Uuid,
        seq: u64,
        update: StreamUpdate,
        state: SessionState,
    },
    /// Terminal success event with the final session state.
    Completed {
        run_id: uuid::Uuid,
        state: SessionState,
    },
    /// Terminal failure event.
    Error {
        run_id: uuid::Uuid,
        error: RunFailure,
    },
}

impl StreamEvent {
    /// Returns `true` for `Completed` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }
}
