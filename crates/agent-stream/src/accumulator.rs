//! Session state and the accumulator that folds partial updates into it.

use serde::Serialize;

use crate::model::{ProductCard, TodoItem, ToolCall, ToolStatus};
use crate::products::extract_products;
use crate::stream::{StreamUpdate, ToolCallPatch};

/// Coarse view of the thinking panel lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingPhase {
    /// No thinking-related update has been seen.
    Idle,
    /// Thinking started and has not been marked done.
    Active,
    /// Thinking was marked done; this is final for the stream.
    Done,
}

/// Consumer-facing state of one streamed agent turn.
///
/// Only [`StreamAccumulator`] mutates it. Snapshots are cheap to clone and
/// are attached to every delivered `StreamEvent::Update`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    running_text: String,
    display_text: String,
    running_thinking_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_status: Option<String>,
    thinking_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_done: Option<bool>,
    tool_calls: Vec<ToolCall>,
    todos: Vec<TodoItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    products: Option<Vec<ProductCard>>,
    #[serde(skip)]
    thinking_seen: bool,
}

impl SessionState {
    /// Full answer text received so far, product block included.
    pub fn running_text(&self) -> &str {
        &self.running_text
    }

    /// Answer text with any `<products>` block removed.
    pub fn display_text(&self) -> &str {
        &self.display_text
    }

    pub fn running_thinking_text(&self) -> &str {
        &self.running_thinking_text
    }

    pub fn thinking_status(&self) -> Option<&str> {
        self.thinking_status.as_deref()
    }

    pub fn thinking_active(&self) -> bool {
        self.thinking_active
    }

    /// `None` until a thinking phase starts; `Some(true)` is final.
    pub fn thinking_done(&self) -> Option<bool> {
        self.thinking_done
    }

    pub fn thinking_phase(&self) -> ThinkingPhase {
        match self.thinking_done {
            Some(true) => ThinkingPhase::Done,
            _ if self.thinking_seen => ThinkingPhase::Active,
            _ => ThinkingPhase::Idle,
        }
    }

    /// Tool calls in first-seen order.
    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.tool_calls
    }

    pub fn todos(&self) -> &[TodoItem] {
        &self.todos
    }

    pub fn products(&self) -> Option<&[ProductCard]> {
        self.products.as_deref()
    }

    /// Name of the most recent tool call that is not done.
    pub fn active_tool_name(&self) -> Option<&str> {
        self.tool_calls
            .iter()
            .rev()
            .find(|call| call.status != Some(ToolStatus::Done))
            .map(|call| call.name.as_str())
    }
}

/// Applies partial updates to a [`SessionState`] in arrival order.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    state: SessionState,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn into_state(self) -> SessionState {
        self.state
    }

    /// Folds one update into the state.
    ///
    /// Returns the update to deliver to the consumer, or `None` when the
    /// update carries nothing worth rendering. The delivered update holds the
    /// full running text and thinking text with the replace flags set.
    pub fn apply(&mut self, update: StreamUpdate) -> Option<StreamUpdate> {
        if !update.is_meaningful() {
            // `thinking_active: false` alone still lands in the state.
            if let Some(active) = update.thinking_active {
                self.state.thinking_active = active;
            }
            return None;
        }
        let mut delivered = update;
        let state = &mut self.state;

        if let Some(text) = delivered.text.take() {
            if delivered.replace {
                state.running_text = text;
            } else {
                state.running_text.push_str(&text);
            }
            let extraction = extract_products(&state.running_text);
            state.display_text = extraction.display_text;
            if extraction.products.is_some() {
                state.products = extraction.products;
            }
            delivered.text = Some(state.running_text.clone());
            delivered.replace = true;
        }
        if let Some(products) = &delivered.products {
            state.products = Some(products.clone());
        }

        if let Some(thinking) = delivered.thinking_text.take() {
            if delivered.thinking_replace {
                state.running_thinking_text = thinking;
            } else {
                state.running_thinking_text.push_str(&thinking);
            }
            state.thinking_seen = true;
            delivered.thinking_text = Some(state.running_thinking_text.clone());
            delivered.thinking_replace = true;
        }
        if let Some(status) = &delivered.thinking_status {
            state.thinking_status = Some(status.clone());
            state.thinking_seen = true;
            state.thinking_done.get_or_insert(false);
        }
        if let Some(done) = delivered.thinking_done {
            if state.thinking_done != Some(true) {
                state.thinking_done = Some(done);
            }
            state.thinking_seen = true;
        }
        if let Some(active) = delivered.thinking_active {
            state.thinking_active = active;
            if active {
                state.thinking_seen = true;
                state.thinking_done.get_or_insert(false);
            }
        }
        if let Some(patches) = &delivered.tool_calls {
            merge_tool_calls(&mut state.tool_calls, patches);
            state.thinking_seen = true;
        }
        if let Some(todos) = &delivered.todos {
            state.todos = todos.clone();
            state.thinking_seen = true;
        }

        Some(delivered)
    }

    /// Closes the stream: a started thinking phase is marked done.
    ///
    /// Returns the closing update when it changed the state.
    pub fn finish(&mut self) -> Option<StreamUpdate> {
        if self.state.thinking_seen && self.state.thinking_done != Some(true) {
            self.state.thinking_done = Some(true);
            return Some(StreamUpdate::done());
        }
        None
    }
}

/// Merges tool-call patches into `calls`, preserving first-seen order.
///
/// A patch with an `id` matches the entry with that id. A patch without one
/// matches by name, and only against entries that have no id either.
pub fn merge_tool_calls(calls: &mut Vec<ToolCall>, patches: &[ToolCallPatch]) {
    for patch in patches {
        let id = patch.id.as_deref().filter(|id| !id.is_empty());
        let name = patch.name.as_deref().filter(|name| !name.is_empty());
        if id.is_none() && name.is_none() {
            continue;
        }
        let position = calls.iter().position(|call| match id {
            Some(id) => call.id.as_deref() == Some(id),
            None => call.id.is_none() && Some(call.name.as_str()) == name,
        });
        let call = match position {
            Some(index) => &mut calls[index],
            None => {
                calls.push(ToolCall {
                    id: id.map(str::to_string),
                    name: name.or(id).unwrap_or("tool").to_string(),
                    args: None,
                    result: None,
                    status: None,
                });
                let last = calls.len() - 1;
                &mut calls[last]
            }
        };
        if let Some(name) = name {
            call.name = name.to_string();
        }
        if let Some(id) = id {
            call.id = Some(id.to_string());
        }
        merge_text(&mut call.args, patch.args.as_deref(), patch.args_append);
        merge_text(&mut call.result, patch.result.as_deref(), patch.result_append);
        if let Some(status) = patch.status {
            call.status = Some(status);
        }
    }
}

fn merge_text(slot: &mut Option<String>, incoming: Option<&str>, append: bool) {
    let Some(incoming) = incoming.filter(|text| !text.is_empty()) else {
        return;
    };
    match slot {
        Some(existing) if append => existing.push_str(incoming),
        _ => *slot = Some(incoming.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(id: Option<&str>, name: Option<&str>) -> ToolCallPatch {
        ToolCallPatch {
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            ..ToolCallPatch::default()
        }
    }

    #[test]
    fn text_deltas_concatenate_and_replace_resets() {
        let mut acc = StreamAccumulator::new();
        for piece in ["a", "b", "c"] {
            acc.apply(StreamUpdate::text_delta(piece));
        }
        assert_eq!(acc.state().running_text(), "abc");

        let delivered = acc.apply(StreamUpdate::text_replace("fresh")).expect("delivered");
        assert_eq!(delivered.text.as_deref(), Some("fresh"));
        acc.apply(StreamUpdate::text_delta("!"));
        assert_eq!(acc.state().running_text(), "fresh!");
    }

    #[test]
    fn delivered_updates_carry_running_values() {
        let mut acc = StreamAccumulator::new();
        acc.apply(StreamUpdate::text_delta("Hel"));
        let delivered = acc.apply(StreamUpdate::text_delta("lo")).expect("delivered");
        assert_eq!(delivered.text.as_deref(), Some("Hello"));
        assert!(delivered.replace);

        acc.apply(StreamUpdate::thinking_delta("let me ").active());
        let delivered = acc.apply(StreamUpdate::thinking_delta("think")).expect("delivered");
        assert_eq!(delivered.thinking_text.as_deref(), Some("let me think"));
        assert!(delivered.thinking_replace);
    }

    #[test]
    fn empty_and_inactive_updates_are_not_delivered() {
        let mut acc = StreamAccumulator::new();
        assert_eq!(acc.apply(StreamUpdate::default()), None);
        let inactive = StreamUpdate {
            thinking_active: Some(false),
            ..StreamUpdate::default()
        };
        assert_eq!(acc.apply(inactive), None);
        assert_eq!(acc.state().thinking_phase(), ThinkingPhase::Idle);
    }

    #[test]
    fn tool_args_append_onto_started_call() {
        let mut acc = StreamAccumulator::new();
        let start = ToolCallPatch {
            status: Some(ToolStatus::Active),
            ..patch(Some("t1"), Some("search"))
        };
        acc.apply(StreamUpdate::default().with_tool_calls(vec![start]));
        for piece in ["q=", "shoes"] {
            let args = ToolCallPatch {
                args: Some(piece.into()),
                args_append: true,
                ..patch(Some("t1"), None)
            };
            acc.apply(StreamUpdate::default().with_tool_calls(vec![args]));
        }

        let calls = acc.state().tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[0].args.as_deref(), Some("q=shoes"));
        assert_eq!(calls[0].status, Some(ToolStatus::Active));
    }

    #[test]
    fn name_only_patches_never_match_id_bearing_entries() {
        let mut calls = Vec::new();
        merge_tool_calls(&mut calls, &[patch(None, Some("lookup"))]);
        merge_tool_calls(
            &mut calls,
            &[ToolCallPatch {
                result: Some("found".into()),
                ..patch(None, Some("lookup"))
            }],
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].result.as_deref(), Some("found"));

        merge_tool_calls(&mut calls, &[patch(Some("x9"), Some("lookup"))]);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].id.as_deref(), Some("x9"));
        assert_eq!(calls[0].id, None);
    }

    #[test]
    fn merge_keeps_previous_values_and_order() {
        let mut calls = Vec::new();
        merge_tool_calls(
            &mut calls,
            &[
                ToolCallPatch {
                    args: Some("{}".into()),
                    ..patch(Some("a"), Some("first"))
                },
                patch(Some("b"), None),
            ],
        );
        assert_eq!(calls[1].name, "b");

        merge_tool_calls(
            &mut calls,
            &[ToolCallPatch {
                args: Some(String::new()),
                status: Some(ToolStatus::Done),
                ..patch(Some("a"), None)
            }],
        );
        assert_eq!(calls[0].name, "first");
        assert_eq!(calls[0].args.as_deref(), Some("{}"));
        assert_eq!(calls[0].status, Some(ToolStatus::Done));

        merge_tool_calls(&mut calls, &[patch(None, None), patch(Some(""), Some(""))]);
        assert_eq!(calls.len(), 2);
        let ids: Vec<_> = calls.iter().map(|c| c.id.as_deref()).collect();
        assert_eq!(ids, vec![Some("a"), Some("b")]);
    }

    #[test]
    fn result_overwrites_unless_appending() {
        let mut calls = Vec::new();
        let result = |text: &str, append: bool| ToolCallPatch {
            result: Some(text.into()),
            result_append: append,
            ..patch(Some("r"), Some("fetch"))
        };
        merge_tool_calls(&mut calls, &[result("one", false)]);
        merge_tool_calls(&mut calls, &[result("two", false)]);
        assert_eq!(calls[0].result.as_deref(), Some("two"));
        merge_tool_calls(&mut calls, &[result("+three", true)]);
        assert_eq!(calls[0].result.as_deref(), Some("two+three"));
    }

    #[test]
    fn products_are_extracted_from_running_text() {
        let mut acc = StreamAccumulator::new();
        acc.apply(StreamUpdate::text_delta("hello <products>{\"products\":"));
        assert_eq!(acc.state().display_text(), "hello");
        assert_eq!(acc.state().products(), None);

        acc.apply(StreamUpdate::text_delta("[{\"title\":\"X\"}]}</products> world"));
        assert_eq!(acc.state().display_text(), "hello  world");
        let products = acc.state().products().expect("products");
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].title, "X");
        assert!(acc.state().running_text().contains("<products>"));
    }

    #[test]
    fn thinking_done_is_final() {
        let mut acc = StreamAccumulator::new();
        acc.apply(StreamUpdate::thinking_reset().active());
        assert_eq!(acc.state().thinking_done(), Some(false));
        assert_eq!(acc.state().thinking_phase(), ThinkingPhase::Active);

        acc.apply(StreamUpdate::done());
        acc.apply(StreamUpdate::thinking_delta("late").active());
        let reopen = StreamUpdate {
            thinking_done: Some(false),
            ..StreamUpdate::default()
        };
        acc.apply(reopen);
        assert_eq!(acc.state().thinking_done(), Some(true));
        assert_eq!(acc.state().thinking_phase(), ThinkingPhase::Done);
    }

    #[test]
    fn status_opens_thinking_phase() {
        let mut acc = StreamAccumulator::new();
        acc.apply(StreamUpdate::default().status(Some("Searching")));
        assert_eq!(acc.state().thinking_status(), Some("Searching"));
        assert_eq!(acc.state().thinking_done(), Some(false));
    }

    #[test]
    fn finish_closes_started_thinking_only() {
        let mut idle = StreamAccumulator::new();
        idle.apply(StreamUpdate::text_delta("plain answer"));
        assert_eq!(idle.finish(), None);
        assert_eq!(idle.state().thinking_done(), None);

        let mut acc = StreamAccumulator::new();
        acc.apply(StreamUpdate::thinking_delta("hmm").active());
        assert_eq!(acc.finish(), Some(StreamUpdate::done()));
        assert_eq!(acc.state().thinking_phase(), ThinkingPhase::Done);
        assert_eq!(acc.finish(), None);
    }

    #[test]
    fn todos_replace_wholesale() {
        let mut acc = StreamAccumulator::new();
        let first = vec![TodoItem::pending("a"), TodoItem::pending("b")];
        acc.apply(StreamUpdate::default().with_todos(Some(&first)));
        let second = vec![TodoItem::pending("c")];
        acc.apply(StreamUpdate::default().with_todos(Some(&second)));
        assert_eq!(acc.state().todos(), second.as_slice());
    }

    #[test]
    fn active_tool_name_skips_done_calls() {
        let mut acc = StreamAccumulator::new();
        let patches = vec![
            ToolCallPatch {
                status: Some(ToolStatus::Active),
                ..patch(Some("1"), Some("search"))
            },
            ToolCallPatch {
                status: Some(ToolStatus::Done),
                ..patch(Some("2"), Some("compare"))
            },
        ];
        acc.apply(StreamUpdate::default().with_tool_calls(patches));
        assert_eq!(acc.state().active_tool_name(), Some("search"));

        let finished = ToolCallPatch {
            status: Some(ToolStatus::Done),
            ..patch(Some("1"), None)
        };
        acc.apply(StreamUpdate::default().with_tool_calls(vec![finished]));
        assert_eq!(acc.state().active_tool_name(), None);
    }
}
