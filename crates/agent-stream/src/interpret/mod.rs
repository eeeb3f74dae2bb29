//! Payload interpretation: one decoded JSON payload becomes one
//! [`StreamUpdate`].
//!
//! Known event types dispatch to one handler each. A handler returning `None`
//! hands the payload to the structural fallback chain in [`fallback`].
mod envelope;
mod fallback;
mod status;

use serde_json::Value;

use crate::content::{normalize_content, scalar_label, stringify_payload};
use crate::model::ToolStatus;
use crate::run_error::{GENERIC_FAILURE, map_run_error};
use crate::stream::{StreamUpdate, ToolCallPatch};

use envelope::{Envelope, EventKind};

pub use status::status_from_tool_name;

/// Interprets one payload. Non-object payloads yield an empty update.
pub fn extract_update(payload: &Value) -> StreamUpdate {
    let Some(root) = payload.as_object() else {
        return StreamUpdate::default();
    };
    let envelope = Envelope::new(root);
    dispatch(&envelope).unwrap_or_else(|| fallback::resolve(&envelope))
}

fn dispatch(env: &Envelope<'_>) -> Option<StreamUpdate> {
    let todos = env.todos.as_ref();
    match env.kind {
        EventKind::ThinkingTextMessageContent => {
            let delta = env.delta.map(normalize_content).unwrap_or_default();
            (!delta.is_empty()).then(|| StreamUpdate::thinking_delta(delta).active())
        }
        EventKind::ThinkingTextMessageStart => {
            Some(StreamUpdate::thinking_reset().active().with_todos(todos))
        }
        EventKind::ThinkingTextMessageEnd | EventKind::ThinkingEnd => {
            Some(StreamUpdate::done().with_todos(todos))
        }
        EventKind::ThinkingStart => Some(StreamUpdate::default().active().with_todos(todos)),
        EventKind::MessagesSnapshot => Some(StreamUpdate::default().with_todos(todos)),
        EventKind::TextMessageStart => {
            Some(StreamUpdate::text_replace("").active().with_todos(todos))
        }
        EventKind::TextMessageContent | EventKind::TextMessageChunk => {
            let delta = env.delta.map(normalize_content).unwrap_or_default();
            (!delta.is_empty()).then(|| StreamUpdate::text_delta(delta).active().with_todos(todos))
        }
        EventKind::TextMessageEnd | EventKind::RunFinished => {
            Some(StreamUpdate::done().with_todos(todos))
        }
        EventKind::RunError => Some(run_error(env)),
        EventKind::Custom => custom_status(env),
        EventKind::ToolCallArgs | EventKind::ToolCallChunk => Some(tool_call_args(env)),
        EventKind::ToolCallResult => Some(tool_call_result(env)),
        EventKind::ToolCallEnd => Some(tool_call_end(env)),
        EventKind::ToolCallStart => Some(tool_call_start(env)),
        EventKind::ActivitySnapshot | EventKind::ActivityDelta => Some(StreamUpdate::default()),
        EventKind::Other => None,
    }
}

fn run_error(env: &Envelope<'_>) -> StreamUpdate {
    match env.root_field("message").and_then(scalar_label) {
        Some(message) => {
            let mapped = map_run_error(&message);
            let mut update = StreamUpdate::text_replace(mapped.text).status(Some(mapped.status));
            update.thinking_done = Some(true);
            update
        }
        None => {
            let mut update = StreamUpdate::text_replace(GENERIC_FAILURE);
            update.thinking_done = Some(true);
            update
        }
    }
}

/// `CUSTOM` events named like `*status*` carry a progress label in `value`
/// (or `data`), either as an object or as a JSON-encoded string.
fn custom_status(env: &Envelope<'_>) -> Option<StreamUpdate> {
    let name = env.root_field("name").and_then(scalar_label).unwrap_or_default();
    if !name.to_lowercase().contains("status") {
        return None;
    }
    let raw = env.first_root_field(&["value", "data"])?;
    let parsed;
    let value = match raw {
        Value::String(text) => {
            parsed = serde_json::from_str::<Value>(text).ok()?;
            &parsed
        }
        other => other,
    };
    let fields = value.as_object()?;
    let label = ["label", "status", "name"]
        .iter()
        .find_map(|key| fields.get(*key).filter(|v| !v.is_null()))
        .and_then(scalar_label)?;
    Some(
        StreamUpdate::default()
            .status(Some(label))
            .active()
            .with_todos(env.todos.as_ref()),
    )
}

fn tool_status(env: &Envelope<'_>) -> Option<&'static str> {
    env.tool_call_name.as_deref().and_then(status_from_tool_name)
}

fn tool_call_args(env: &Envelope<'_>) -> StreamUpdate {
    let Some(id) = env.tool_call_id.clone() else {
        return StreamUpdate::default();
    };
    let args = env.delta.map(normalize_content).unwrap_or_default();
    if args.is_empty() {
        return StreamUpdate::default();
    }
    StreamUpdate::default()
        .with_tool_calls(vec![ToolCallPatch {
            id: Some(id),
            name: env.tool_call_name.clone(),
            args: Some(args),
            args_append: true,
            status: Some(ToolStatus::Active),
            ..ToolCallPatch::default()
        }])
        .active()
        .status(tool_status(env))
}

fn tool_call_result(env: &Envelope<'_>) -> StreamUpdate {
    let Some(id) = env.tool_call_id.clone() else {
        return StreamUpdate::default();
    };
    let result = env
        .content
        .map(|content| {
            let text = normalize_content(content);
            if text.is_empty() {
                stringify_payload(content).unwrap_or_default()
            } else {
                text
            }
        })
        .unwrap_or_default();
    StreamUpdate::default()
        .with_tool_calls(vec![ToolCallPatch {
            id: Some(id),
            name: env.tool_call_name.clone(),
            result: Some(result),
            status: Some(ToolStatus::Done),
            ..ToolCallPatch::default()
        }])
        .active()
        .status(tool_status(env))
        .with_todos(env.todos.as_ref())
}

fn tool_call_end(env: &Envelope<'_>) -> StreamUpdate {
    let Some(id) = env.tool_call_id.clone() else {
        return StreamUpdate::default();
    };
    StreamUpdate::default()
        .with_tool_calls(vec![ToolCallPatch {
            id: Some(id),
            name: env.tool_call_name.clone(),
            status: Some(ToolStatus::Done),
            ..ToolCallPatch::default()
        }])
        .with_todos(env.todos.as_ref())
}

/// Registers a tool call. The id falls back to the tool name; without a name
/// nothing is registered, but the thinking phase still starts.
fn tool_call_start(env: &Envelope<'_>) -> StreamUpdate {
    let name = env
        .tool_call_name
        .clone()
        .or_else(|| env.root_field("name").and_then(scalar_label));
    let Some(id) = env.tool_call_id.clone().or_else(|| name.clone()) else {
        return StreamUpdate::default();
    };
    let status = name.as_deref().and_then(status_from_tool_name);
    let patches = match name {
        Some(name) => vec![ToolCallPatch {
            id: Some(id),
            name: Some(name),
            status: Some(ToolStatus::Active),
            ..ToolCallPatch::default()
        }],
        None => Vec::new(),
    };
    StreamUpdate::default()
        .with_tool_calls(patches)
        .active()
        .status(status)
        .with_todos(env.todos.as_ref())
}
