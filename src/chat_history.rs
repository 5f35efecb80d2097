//! Per-collection chat history persisted as Markdown.
//!
//! Each turn is written as one paragraph, `**User:** text` or
//! `**Assistant:** text`, followed by a blank line. Loading classifies
//! lines by those markers and drops everything else, so the format does
//! not survive multi-line turns or turns that quote a marker.
//!
//! There is no locking: [`ChatHistoryStore::append`] is load-modify-save
//! and concurrent writers race, last writer wins.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::layout::DataLayout;

const USER_MARKER: &str = "**User:**";
const ASSISTANT_MARKER: &str = "**Assistant:**";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Capitalized label used in the history file.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => anyhow::bail!("invalid role: '{}' (expected user or assistant)", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

impl ChatTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

/// Serializes turns into the history file format.
pub fn render(turns: &[ChatTurn]) -> String {
    let mut out = String::new();
    for turn in turns {
        out.push_str("**");
        out.push_str(turn.role.label());
        out.push_str(":** ");
        out.push_str(&turn.text);
        out.push_str("\n\n");
    }
    out
}

/// Parses the history file format. Unrecognized lines are dropped.
pub fn parse(content: &str) -> Vec<ChatTurn> {
    content
        .lines()
        .filter_map(|line| {
            if line.contains(USER_MARKER) {
                Some(ChatTurn::user(line.replace(USER_MARKER, "").trim()))
            } else if line.contains(ASSISTANT_MARKER) {
                Some(ChatTurn::assistant(
                    line.replace(ASSISTANT_MARKER, "").trim(),
                ))
            } else {
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ChatHistoryStore {
    layout: DataLayout,
}

impl ChatHistoryStore {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    /// Overwrites the history of `saved_name` with `turns`.
    pub fn save(&self, saved_name: &str, turns: &[ChatTurn]) -> Result<()> {
        let path = self.layout.chat_file_for(saved_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, render(turns))
            .with_context(|| format!("Failed to write chat history: {}", path.display()))
    }

    /// Loads the history of `saved_name`; a missing file is an empty history.
    pub fn load(&self, saved_name: &str) -> Result<Vec<ChatTurn>> {
        let path = self.layout.chat_file_for(saved_name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read chat history: {}", path.display()))?;
        Ok(parse(&content))
    }

    pub fn append(&self, saved_name: &str, role: Role, text: &str) -> Result<()> {
        self.append_turns(saved_name, &[ChatTurn::new(role, text)])
    }

    /// Appends several turns with a single write, so a question and its
    /// answer land together or not at all.
    pub fn append_turns(&self, saved_name: &str, new_turns: &[ChatTurn]) -> Result<()> {
        let mut turns = self.load(saved_name)?;
        turns.extend_from_slice(new_turns);
        self.save(saved_name, &turns)
    }

    /// Empties the history. The file is kept (zero bytes).
    pub fn clear(&self, saved_name: &str) -> Result<()> {
        self.save(saved_name, &[])
    }
}
