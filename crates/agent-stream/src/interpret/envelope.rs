use serde_json::{Map, Value};

use crate::content::scalar_label;
use crate::model::TodoItem;

/// Closed set of event kinds with a fixed transformation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EventKind {
    ThinkingTextMessageContent,
    ThinkingTextMessageStart,
    ThinkingTextMessageEnd,
    ThinkingStart,
    ThinkingEnd,
    MessagesSnapshot,
    TextMessageStart,
    TextMessageContent,
    TextMessageChunk,
    TextMessageEnd,
    RunError,
    RunFinished,
    Custom,
    ToolCallArgs,
    ToolCallChunk,
    ToolCallResult,
    ToolCallEnd,
    ToolCallStart,
    ActivitySnapshot,
    ActivityDelta,
    /// Unknown or missing type; handled by the fallback chain.
    Other,
}

impl EventKind {
    pub(crate) fn parse(label: &str) -> Self {
        match label.to_ascii_uppercase().as_str() {
            "THINKING_TEXT_MESSAGE_CONTENT" => Self::ThinkingTextMessageContent,
            "THINKING_TEXT_MESSAGE_START" => Self::ThinkingTextMessageStart,
            "THINKING_TEXT_MESSAGE_END" => Self::ThinkingTextMessageEnd,
            "THINKING_START" => Self::ThinkingStart,
            "THINKING_END" => Self::ThinkingEnd,
            "MESSAGES_SNAPSHOT" => Self::MessagesSnapshot,
            "TEXT_MESSAGE_START" => Self::TextMessageStart,
            "TEXT_MESSAGE_CONTENT" => Self::TextMessageContent,
            "TEXT_MESSAGE_CHUNK" => Self::TextMessageChunk,
            "TEXT_MESSAGE_END" => Self::TextMessageEnd,
            "RUN_ERROR" => Self::RunError,
            "RUN_FINISHED" => Self::RunFinished,
            "CUSTOM" => Self::Custom,
            "TOOL_CALL_ARGS" => Self::ToolCallArgs,
            "TOOL_CALL_CHUNK" => Self::ToolCallChunk,
            "TOOL_CALL_RESULT" => Self::ToolCallResult,
            "TOOL_CALL_END" => Self::ToolCallEnd,
            "TOOL_CALL_START" => Self::ToolCallStart,
            "ACTIVITY_SNAPSHOT" => Self::ActivitySnapshot,
            "ACTIVITY_DELTA" => Self::ActivityDelta,
            _ => Self::Other,
        }
    }
}

/// Looks up a field, treating JSON `null` as absent.
fn field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

/// One payload with its alternate field spellings resolved.
///
/// Fields that may sit either at the root or under a nested `data` object
/// are looked up at the root first.
pub(crate) struct Envelope<'a> {
    root: &'a Map<String, Value>,
    nested: Option<&'a Map<String, Value>>,
    /// The declared `type` (or `event`) string, lowercased.
    pub type_lower: String,
    pub kind: EventKind,
    pub tool_call_id: Option<String>,
    pub tool_call_name: Option<String>,
    pub delta: Option<&'a Value>,
    pub content: Option<&'a Value>,
    pub message: Option<&'a Value>,
    pub todos: Option<Vec<TodoItem>>,
}

impl<'a> Envelope<'a> {
    pub(crate) fn new(root: &'a Map<String, Value>) -> Self {
        let nested = field(root, "data").and_then(Value::as_object);
        let type_label = field(root, "type")
            .or_else(|| field(root, "event"))
            .and_then(scalar_label)
            .unwrap_or_default();
        let kind = EventKind::parse(&type_label);

        let mut envelope = Self {
            root,
            nested,
            type_lower: type_label.to_lowercase(),
            kind,
            tool_call_id: first_label(root, &["toolCallId", "tool_call_id"]),
            tool_call_name: first_label(root, &["toolCallName", "tool_call_name"]),
            delta: None,
            content: None,
            message: None,
            todos: None,
        };
        envelope.delta = envelope.lookup("delta");
        envelope.content = envelope.lookup("content");
        envelope.message = envelope.lookup("message");

        let snapshot = field(root, "snapshot")
            .or_else(|| field(root, "state"))
            .or_else(|| nested.and_then(|d| field(d, "snapshot")))
            .or_else(|| nested.and_then(|d| field(d, "state")));
        let todo_source = match (snapshot, envelope.delta) {
            (Some(snapshot), _) => Some(snapshot),
            (None, Some(delta)) => Some(delta),
            (None, None) => None,
        };
        envelope.todos = match todo_source {
            Some(source) => extract_todos(source),
            None => extract_todos_from(root),
        };
        envelope
    }

    /// Looks up `key` at the root, then under the nested `data` object.
    pub(crate) fn lookup(&self, key: &str) -> Option<&'a Value> {
        field(self.root, key).or_else(|| self.nested.and_then(|d| field(d, key)))
    }

    /// Looks up `key` at the root only.
    pub(crate) fn root_field(&self, key: &str) -> Option<&'a Value> {
        field(self.root, key)
    }

    /// Returns the first present root field among `keys`.
    pub(crate) fn first_root_field(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter().find_map(|key| field(self.root, key))
    }

    /// Returns `true` when the type string mentions any of `needles`.
    pub(crate) fn type_mentions(&self, needles: &[&str]) -> bool {
        needles.iter().any(|needle| self.type_lower.contains(needle))
    }
}

fn first_label(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| field(obj, key))
        .and_then(scalar_label)
}

fn extract_todos(source: &Value) -> Option<Vec<TodoItem>> {
    source.as_object().and_then(extract_todos_from)
}

/// Reads a non-empty todo list from `todos`, `todo` or `todo_list`.
fn extract_todos_from(obj: &Map<String, Value>) -> Option<Vec<TodoItem>> {
    let raw = field(obj, "todos")
        .or_else(|| field(obj, "todo"))
        .or_else(|| field(obj, "todo_list"))?;
    let items: Vec<TodoItem> = raw.as_array()?.iter().filter_map(normalize_todo).collect();
    (!items.is_empty()).then_some(items)
}

fn normalize_todo(item: &Value) -> Option<TodoItem> {
    match item {
        Value::String(text) if !text.is_empty() => Some(TodoItem::pending(text.clone())),
        Value::Object(obj) => {
            let content = [obj.get("content"), obj.get("text")]
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .find(|text| !text.is_empty())?;
            let status = obj
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or(TodoItem::DEFAULT_STATUS);
            Some(TodoItem {
                content: content.to_string(),
                status: status.to_string(),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope_of(value: &Value) -> Envelope<'_> {
        Envelope::new(value.as_object().expect("object payload"))
    }

    #[test]
    fn kind_is_case_insensitive_and_falls_back_to_event_field() {
        let payload = json!({"event": "text_message_content"});
        assert_eq!(envelope_of(&payload).kind, EventKind::TextMessageContent);
        let payload = json!({"type": "something_else"});
        assert_eq!(envelope_of(&payload).kind, EventKind::Other);
        assert_eq!(envelope_of(&json!({})).kind, EventKind::Other);
    }

    #[test]
    fn alternate_tool_field_names_resolve_once() {
        let payload = json!({"tool_call_id": "t1", "tool_call_name": "search"});
        let envelope = envelope_of(&payload);
        assert_eq!(envelope.tool_call_id.as_deref(), Some("t1"));
        assert_eq!(envelope.tool_call_name.as_deref(), Some("search"));

        let payload = json!({"toolCallId": "t2", "tool_call_id": "ignored"});
        assert_eq!(envelope_of(&payload).tool_call_id.as_deref(), Some("t2"));
    }

    #[test]
    fn nested_data_fields_are_used_when_root_is_missing() {
        let payload = json!({"type": "x", "data": {"delta": "hi", "content": "c"}});
        let envelope = envelope_of(&payload);
        assert_eq!(envelope.delta, Some(&json!("hi")));
        assert_eq!(envelope.content, Some(&json!("c")));
    }

    #[test]
    fn todos_come_from_snapshot_then_delta_then_root() {
        let payload = json!({
            "snapshot": {"todos": ["a"]},
            "todos": ["root"],
        });
        assert_eq!(envelope_of(&payload).todos, Some(vec![TodoItem::pending("a")]));

        let payload = json!({"state": {"todo_list": [{"text": "b", "status": "completed"}]}});
        assert_eq!(
            envelope_of(&payload).todos,
            Some(vec![TodoItem {
                content: "b".into(),
                status: "completed".into()
            }])
        );

        let payload = json!({"todo": ["c", "", {"content": ""}, 5]});
        assert_eq!(envelope_of(&payload).todos, Some(vec![TodoItem::pending("c")]));
    }

    #[test]
    fn snapshot_without_todos_hides_root_todos() {
        let payload = json!({"snapshot": {"other": 1}, "todos": ["root"]});
        assert_eq!(envelope_of(&payload).todos, None);
    }

    #[test]
    fn all_empty_todo_list_counts_as_absent() {
        let payload = json!({"todos": ["", {"status": "pending"}]});
        assert_eq!(envelope_of(&payload).todos, None);
    }
}
