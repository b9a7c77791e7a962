//! Per-session conversation state: the transcript, the question log and the
//! last reply's cost estimate.
//!
//! The transcript is append-only. The only way to drop turns is [`ConversationStore::reset`],
//! which replaces it with a single greeting and leaves the question log alone.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::llm_interaction::CompletionFailure;
use crate::persona;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Only ever injected at request time, never stored.
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// Plain role/content pair, the shape sent to the completion service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Local>,
    /// Set when this assistant turn stands in for a failed completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<CompletionFailure>,
}

impl Turn {
    fn new(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            timestamp: Local::now(),
            failure: None,
        }
    }

    pub fn time_label(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }

    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("message must not be empty")]
    EmptyMessage,
}

#[derive(Debug, Clone)]
pub struct ConversationStore {
    transcript: Vec<Turn>,
    questions: VecDeque<String>,
    question_capacity: usize,
    last_cost: f64,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::with_question_capacity(constants::QUESTION_LOG_CAPACITY)
    }

    pub fn with_question_capacity(question_capacity: usize) -> Self {
        Self {
            transcript: vec![Self::greeting()],
            questions: VecDeque::new(),
            question_capacity: question_capacity.max(1),
            last_cost: 0.0,
        }
    }

    fn greeting() -> Turn {
        Turn::new(Role::Assistant, persona::GREETING.to_string())
    }

    /// Records a user turn and logs the raw question. Content is kept verbatim.
    pub fn append_user(&mut self, text: &str) -> Result<(), ConversationError> {
        if text.is_empty() {
            return Err(ConversationError::EmptyMessage);
        }
        self.transcript.push(Turn::new(Role::User, text.to_string()));
        if self.questions.len() == self.question_capacity {
            self.questions.pop_front();
        }
        self.questions.push_back(text.to_string());
        Ok(())
    }

    pub fn append_assistant(&mut self, text: impl Into<String>) {
        self.transcript.push(Turn::new(Role::Assistant, text.into()));
    }

    pub fn append_failure(&mut self, failure: CompletionFailure, text: impl Into<String>) {
        let mut turn = Turn::new(Role::Assistant, text.into());
        turn.failure = Some(failure);
        self.transcript.push(turn);
    }

    /// Last `n` turns in transcript order.
    pub fn recent_window(&self, n: usize) -> Vec<ChatMessage> {
        let start = self.transcript.len().saturating_sub(n);
        self.transcript[start..].iter().map(Turn::to_message).collect()
    }

    /// Up to `k` logged questions, most recent first.
    pub fn recent_questions(&self, k: usize) -> Vec<String> {
        self.questions.iter().rev().take(k).cloned().collect()
    }

    /// Fresh greeting-only transcript and zero cost. The question log survives.
    pub fn reset(&mut self) {
        self.transcript = vec![Self::greeting()];
        self.last_cost = 0.0;
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn last_cost(&self) -> f64 {
        self.last_cost
    }

    pub fn set_last_cost(&mut self, cost: f64) {
        self.last_cost = cost;
    }
}
