use anyhow::Result;
use chrono::{LocalResult, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

use crate::db::TodoItem;

// Shared with the model on both sides of the contract.
pub const PROMPT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

pub const WHATS_NEXT_SYSTEM_PROMPT: &str = r#"You are a personal task-prioritization assistant.

## Inputs
1. Current local time ("yyyy-MM-dd HH:mm").
2. A JSON array of todo items.
3. User instructions in natural language (optional).

Each todo item contains:
- id (string)
- title (string)
- detail (string)
- dueDate (string, "yyyy-MM-dd HH:mm" or null)
- importance (integer, 0-10 or null)

## Your job
Evaluate the tasks holistically: urgency, long-term value, estimated effort,
personal motivation, and any hints from title/detail.
Missing fields (null) mean you need to infer their relevance.

## Output FORMAT
Return ONLY a JSON array, each element:
{ "id": "<item id>", "reason": "<reason, 25 words or fewer>" }

List up to THREE items in the order you recommend tackling them.
"#;

pub const CHAT_SYSTEM_PROMPT: &str = r#"You are TaskMate, a helpful AI assistant embedded in a todo-list app.

## Inputs
1. Current local time ("yyyy-MM-dd HH:mm").
2. A JSON array of the user's current todo items.
3. Optional user instruction text (may be empty).

Each todo item has:
- id         (string, unique)
- title      (string)
- detail     (string)
- dueDate    ("yyyy-MM-dd HH:mm" string or null)
- importance (integer 0-10 or null)

## Your job
* Read the existing todos and the user's instruction.
* Reply conversationally to the user (same language they used).
* If the user implicitly or explicitly asks to add a new task, or if adding
  a task would clearly help (e.g. they say "remind me next week"), include
  the new task(s) in your output.

## Output FORMAT (MUST be valid JSON, nothing else)
{
  "reply": "<your natural-language response to the user>",
  "newItems": [
    {
      "title": "<task title>",
      "detail": "<task description>",
      "dueDate": "<"yyyy-MM-dd HH:mm" or null>",
      "importance": <0-10 or null>
    }
  ]
}
"#;

#[derive(Debug, Serialize)]
struct PromptItem<'a> {
    id: &'a str,
    title: &'a str,
    detail: &'a str,
    #[serde(rename = "dueDate")]
    due_date: Option<String>,
    importance: Option<i64>,
}

pub fn format_prompt_time(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms) {
        LocalResult::Single(dt) => dt.format(PROMPT_TIME_FORMAT).to_string(),
        _ => String::new(),
    }
}

pub fn parse_prompt_time(text: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(text.trim(), PROMPT_TIME_FORMAT)
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

// The user-turn payload: current time, the item set as a JSON array, and
// whatever the user typed.
pub fn build_task_prompt(
    now_ms: i64,
    items: &[TodoItem],
    user_text: Option<&str>,
) -> Result<String> {
    let mut body = String::from("[\n");
    for (idx, item) in items.iter().enumerate() {
        let line = serde_json::to_string(&PromptItem {
            id: &item.id,
            title: &item.title,
            detail: &item.detail,
            due_date: item.due_at_ms.map(format_prompt_time),
            importance: item.importance,
        })?;
        body.push_str("  ");
        body.push_str(&line);
        if idx + 1 < items.len() {
            body.push(',');
        }
        body.push('\n');
    }
    body.push(']');

    let mut prompt = String::new();
    prompt.push_str(&format!("Current time: {}\n", format_prompt_time(now_ms)));
    prompt.push_str("Todo list:\n");
    prompt.push_str(&body);
    if let Some(text) = user_text {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            prompt.push('\n');
            prompt.push_str(trimmed);
        }
    }
    Ok(prompt.trim_end().to_string())
}
