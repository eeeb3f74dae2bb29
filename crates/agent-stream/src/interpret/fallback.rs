use serde_json::Value;

use crate::content::{normalize_content, scalar_label, stringify_payload};
use crate::model::ToolStatus;
use crate::stream::{StreamUpdate, ToolCallPatch};

use super::envelope::Envelope;

type Step = fn(&Envelope<'_>) -> Option<StreamUpdate>;

/// Structural heuristics for payloads without a recognised type, tried in
/// order. The first step producing content wins.
const CHAIN: &[Step] = &[
    tool_call_list,
    latest_message,
    message_object,
    top_level_content,
    top_level_delta,
    todos_only,
];

pub(super) fn resolve(env: &Envelope<'_>) -> StreamUpdate {
    CHAIN
        .iter()
        .find_map(|step| step(env))
        .unwrap_or_default()
}

/// Type strings that mark `message`/`content` text as a streamed delta.
const DELTA_MARKERS: &[&str] = &["delta", "token", "text_message_content", "text_message_chunk"];

fn text_update(env: &Envelope<'_>, text: String) -> StreamUpdate {
    let replace = !env.type_mentions(DELTA_MARKERS);
    StreamUpdate::text_with_mode(text, replace).with_todos(env.todos.as_ref())
}

/// `toolCalls` / `tool_calls` arrays on events whose type mentions tools or
/// actions.
fn tool_call_list(env: &Envelope<'_>) -> Option<StreamUpdate> {
    if !env.type_mentions(&["tool", "action"]) {
        return None;
    }
    let calls = env
        .lookup("toolCalls")
        .or_else(|| env.lookup("tool_calls"))?
        .as_array()?;
    let patches: Vec<ToolCallPatch> = calls.iter().filter_map(tool_call_patch).collect();
    if patches.is_empty() {
        return None;
    }
    Some(StreamUpdate::default().with_tool_calls(patches).active())
}

fn tool_call_patch(call: &Value) -> Option<ToolCallPatch> {
    let call = call.as_object()?;
    let present = |key: &str| call.get(key).filter(|v| !v.is_null());
    let name = present("name")
        .or_else(|| present("tool"))
        .or_else(|| present("function"))
        .and_then(scalar_label)?;
    let args = present("args")
        .or_else(|| present("arguments"))
        .or_else(|| present("input"))
        .and_then(stringify_payload);
    Some(ToolCallPatch {
        id: present("id").and_then(scalar_label),
        name: Some(name),
        args,
        status: Some(ToolStatus::Active),
        ..ToolCallPatch::default()
    })
}

/// Chat transcripts: the latest assistant message, or the latest message of
/// any role when no assistant message exists.
fn latest_message(env: &Envelope<'_>) -> Option<StreamUpdate> {
    let messages = env.root_field("messages")?.as_array()?;
    let is_assistant = |msg: &&Value| {
        msg.get("role")
            .filter(|v| !v.is_null())
            .or_else(|| msg.get("type").filter(|v| !v.is_null()))
            .and_then(scalar_label)
            .is_some_and(|role| role.eq_ignore_ascii_case("assistant"))
    };
    let latest = messages
        .iter()
        .rev()
        .find(is_assistant)
        .or_else(|| messages.last())?;
    let content = latest
        .get("content")
        .filter(|v| !v.is_null())
        .or_else(|| latest.get("text"))
        .map(normalize_content)
        .unwrap_or_default();
    if content.is_empty() {
        return None;
    }
    Some(StreamUpdate::text_replace(content).with_todos(env.todos.as_ref()))
}

fn message_object(env: &Envelope<'_>) -> Option<StreamUpdate> {
    let message = env.message?.as_object()?;
    let content = message
        .get("content")
        .filter(|v| !v.is_null())
        .or_else(|| message.get("text"))
        .map(normalize_content)
        .unwrap_or_default();
    (!content.is_empty()).then(|| text_update(env, content))
}

fn top_level_content(env: &Envelope<'_>) -> Option<StreamUpdate> {
    let content = env.content.map(normalize_content).unwrap_or_default();
    (!content.is_empty()).then(|| text_update(env, content))
}

fn top_level_delta(env: &Envelope<'_>) -> Option<StreamUpdate> {
    let delta = env.delta.map(normalize_content).unwrap_or_default();
    (!delta.is_empty()).then(|| StreamUpdate::text_delta(delta).with_todos(env.todos.as_ref()))
}

fn todos_only(env: &Envelope<'_>) -> Option<StreamUpdate> {
    env.todos
        .as_ref()
        .map(|todos| StreamUpdate::default().with_todos(Some(todos)))
}
