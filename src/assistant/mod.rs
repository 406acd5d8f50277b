use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;
use rusqlite::Connection;
use serde::Deserialize;

use crate::db::{self, TodoItem};

pub mod openai;
pub mod prompt;
pub mod timeouts;

pub use openai::OpenAiCompatibleProvider;

const MAX_HISTORY_TURNS: usize = 10;

#[derive(Clone, Debug)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

// Timeouts are a normal outcome here, not an error: the caller treats
// "no answer" the same as an empty recommendation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatOutcome {
    Reply(String),
    TimedOut,
}

pub trait ChatProvider: Send + Sync {
    fn complete(
        &self,
        messages: &[ChatMessage],
        as_json: bool,
        timeout: Duration,
    ) -> Result<ChatOutcome>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recommendation {
    pub item: TodoItem,
    pub reason: String,
}

// A task the model proposes in chat mode; lives only in the conversation
// until the user accepts it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ItemDraft {
    pub title: String,
    #[serde(default)]
    pub detail: String,
    #[serde(rename = "dueDate", default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub importance: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatTurn {
    pub reply: String,
    pub new_items: Vec<ItemDraft>,
}

struct History {
    turns: VecDeque<(String, String)>,
}

impl History {
    fn new() -> Self {
        Self {
            turns: VecDeque::new(),
        }
    }

    fn add(&mut self, user: String, assistant: String) {
        self.turns.push_back((user, assistant));
        while self.turns.len() > MAX_HISTORY_TURNS {
            self.turns.pop_front();
        }
    }

    fn clear(&mut self) {
        self.turns.clear();
    }
}

fn build_messages(system_prompt: &str, history: &History, user_prompt: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2 + history.turns.len() * 2);
    messages.push(ChatMessage::new("system", system_prompt));
    for (user, assistant) in &history.turns {
        messages.push(ChatMessage::new("user", user));
        messages.push(ChatMessage::new("assistant", assistant));
    }
    messages.push(ChatMessage::new("user", user_prompt));
    messages
}

pub fn parse_ranking(response: &str, items: &[TodoItem]) -> Vec<Recommendation> {
    #[derive(Deserialize)]
    struct Choice {
        id: String,
        reason: String,
    }

    // Malformed output degrades to "nothing to recommend"; ids the model
    // invented are dropped.
    let Ok(choices) = serde_json::from_str::<Vec<Choice>>(response) else {
        return Vec::new();
    };
    choices
        .into_iter()
        .filter_map(|choice| {
            items.iter().find(|item| item.id == choice.id).map(|item| {
                Recommendation {
                    item: item.clone(),
                    reason: choice.reason,
                }
            })
        })
        .collect()
}

pub fn parse_chat_turn(response: &str) -> ChatTurn {
    #[derive(Deserialize)]
    struct Wire {
        reply: String,
        #[serde(rename = "newItems", default)]
        new_items: Vec<ItemDraft>,
    }

    match serde_json::from_str::<Wire>(response) {
        Ok(wire) => ChatTurn {
            reply: wire.reply,
            new_items: wire.new_items,
        },
        Err(e) => ChatTurn {
            reply: format!("Error parsing response: {e}"),
            new_items: Vec::new(),
        },
    }
}

// Accepted drafts go through the normal local-insert path; the next sync
// pushes them like any other local edit. The id comes from the remote
// store's generator.
pub fn accept_draft(
    conn: &Connection,
    id: &str,
    owner_id: &str,
    draft: &ItemDraft,
) -> Result<TodoItem> {
    let due_at_ms = draft.due_date.as_deref().and_then(prompt::parse_prompt_time);
    let importance = draft.importance.map(|v| v.clamp(0, 10));
    db::insert_item(
        conn,
        id,
        owner_id,
        &draft.title,
        &draft.detail,
        due_at_ms,
        importance,
    )
}

// Formats the item set plus user text into completion requests and maps the
// structured responses back onto item operations. Reads items, never sync
// state; each mode keeps its own rolling history.
pub struct AssistantBridge {
    provider: Box<dyn ChatProvider>,
    whats_next_history: History,
    chat_history: History,
}

impl AssistantBridge {
    pub fn new(provider: Box<dyn ChatProvider>) -> Self {
        Self {
            provider,
            whats_next_history: History::new(),
            chat_history: History::new(),
        }
    }

    pub fn clear_whats_next_history(&mut self) {
        self.whats_next_history.clear();
    }

    pub fn clear_chat_history(&mut self) {
        self.chat_history.clear();
    }

    // `Ok(None)` means the request timed out and the caller should carry on
    // without a recommendation.
    pub fn whats_next(
        &mut self,
        conn: &Connection,
        owner_id: &str,
        user_prompt: Option<&str>,
    ) -> Result<Option<Vec<Recommendation>>> {
        let items: Vec<TodoItem> = db::list_items(conn, owner_id)?
            .into_iter()
            .filter(|item| !item.is_completed)
            .collect();

        let user_turn = prompt::build_task_prompt(db::now_ms(), &items, user_prompt)?;
        let timeout = timeouts::assistant_timeout_for_prompt_chars(user_turn.chars().count());
        let messages = build_messages(
            prompt::WHATS_NEXT_SYSTEM_PROMPT,
            &self.whats_next_history,
            &user_turn,
        );

        match self.provider.complete(&messages, true, timeout)? {
            ChatOutcome::TimedOut => Ok(None),
            ChatOutcome::Reply(response) => {
                let ranking = parse_ranking(&response, &items);
                self.whats_next_history.add(user_turn, response);
                Ok(Some(ranking))
            }
        }
    }

    // A conversational reply plus zero or more new-item drafts for the user
    // to accept or dismiss. `Ok(None)` means timeout.
    pub fn chat(
        &mut self,
        conn: &Connection,
        owner_id: &str,
        user_prompt: &str,
    ) -> Result<Option<ChatTurn>> {
        let items: Vec<TodoItem> = db::list_items(conn, owner_id)?
            .into_iter()
            .filter(|item| !item.is_completed)
            .collect();

        let user_turn = prompt::build_task_prompt(db::now_ms(), &items, Some(user_prompt))?;
        let timeout = timeouts::assistant_timeout_for_prompt_chars(user_turn.chars().count());
        let messages = build_messages(prompt::CHAT_SYSTEM_PROMPT, &self.chat_history, &user_turn);

        match self.provider.complete(&messages, true, timeout)? {
            ChatOutcome::TimedOut => Ok(None),
            ChatOutcome::Reply(response) => {
                let turn = parse_chat_turn(&response);
                self.chat_history.add(user_turn, response);
                Ok(Some(turn))
            }
        }
    }
}
