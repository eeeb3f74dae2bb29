use std::io::Write as _;

use agent_stream::content::pretty_payload;
use agent_stream::{SessionState, StreamUpdate, ToolCallPatch, ToolStatus};
use tracing::warn;

/// Prints delivered updates to the terminal.
///
/// Answer text goes to stdout as it grows; thinking progress goes to stderr.
/// In JSON mode every update is one line on stdout.
pub struct Renderer {
    json: bool,
    printed: String,
}

impl Renderer {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            printed: String::new(),
        }
    }

    pub fn update(&mut self, update: &StreamUpdate, state: &SessionState) {
        if self.json {
            match serde_json::to_string(update) {
                Ok(line) => println!("{line}"),
                Err(err) => warn!(error = %err, "failed to serialize update"),
            }
            return;
        }

        if let Some(status) = &update.thinking_status {
            eprintln!("[status] {status}");
        }
        if let Some(patches) = &update.tool_calls {
            for line in patches.iter().filter_map(|patch| tool_line(patch, state)) {
                eprintln!("{line}");
            }
        }
        if let Some(todos) = &update.todos {
            for todo in todos {
                eprintln!("[todo] {} ({})", todo.content, todo.status);
            }
        }
        if update.thinking_done == Some(true) && !state.running_thinking_text().is_empty() {
            eprintln!("[thinking] {}", state.running_thinking_text());
        }
        if update.text.is_some() {
            self.text(state.display_text());
        }
    }

    pub fn finish(&mut self, state: &SessionState) {
        if self.json {
            match serde_json::to_string(state) {
                Ok(line) => println!("{line}"),
                Err(err) => warn!(error = %err, "failed to serialize final state"),
            }
            return;
        }
        if !self.printed.is_empty() {
            println!();
        }
        for product in state.products().unwrap_or_default() {
            let price = product
                .price
                .as_ref()
                .map(|p| format!(" ({p})"))
                .unwrap_or_default();
            let link = product.url.as_deref().unwrap_or("");
            println!("- {}{price} {link}", product.title);
        }
    }

    fn text(&mut self, display: &str) {
        let mut stdout = std::io::stdout().lock();
        let written = match display.strip_prefix(self.printed.as_str()) {
            Some(suffix) => write!(stdout, "{suffix}"),
            // text was replaced; start a fresh line
            None => write!(stdout, "\n{display}"),
        };
        if let Err(err) = written.and_then(|_| stdout.flush()) {
            warn!(error = %err, "failed to write answer text");
        }
        self.printed = display.to_string();
    }
}

/// Status line for the tool call a patch touched.
///
/// Arguments are shown once, pretty-printed, on the patch that completes the
/// call; before that they are usually partial JSON.
fn tool_line(patch: &ToolCallPatch, state: &SessionState) -> Option<String> {
    let call = state.tool_calls().iter().find(|call| match &patch.id {
        Some(id) => call.id.as_deref() == Some(id.as_str()),
        None => call.id.is_none() && Some(&call.name) == patch.name.as_ref(),
    })?;
    let status = call.status.map(|s| s.as_str()).unwrap_or("pending");
    let mut line = format!("[tool] {} {status}", call.name);
    let args = call.args.as_deref().filter(|args| !args.trim().is_empty());
    if let (Some(ToolStatus::Done), Some(args)) = (patch.status, args) {
        for args_line in pretty_payload(args).lines() {
            line.push_str("\n  ");
            line.push_str(args_line);
        }
    }
    Some(line)
}
