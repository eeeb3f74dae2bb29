/// Keyword table for deriving a progress label from a tool name. Order
/// matters: the first row with a matching keyword wins.
const TOOL_STATUS_RULES: &[(&[&str], &str)] = &[
    (&["search"], "Searching"),
    (&["check", "stock"], "Checking"),
    (&["browse", "visit", "open", "navigate"], "Visiting"),
    (&["write", "edit", "save", "update"], "Editing"),
    (&["extract", "parse"], "Extracting"),
    (&["compare"], "Comparing"),
    (&["summarize", "summary"], "Summarizing"),
    (&["rate", "fx", "currency", "convert"], "Calculating"),
];

/// Derives a human status label from a tool name, if any keyword matches.
pub fn status_from_tool_name(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        return None;
    }
    let lower = name.to_lowercase();
    TOOL_STATUS_RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(_, label)| *label)
}
