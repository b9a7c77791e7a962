// Turn processing for one session, plus the interactive terminal chat.

use anyhow::Result;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::constants;
use crate::conversation::{ConversationError, ConversationStore, Turn};
use crate::llm_interaction::{CompletionFailure, CompletionGateway, TokenUsage, TurnOutcome};
use crate::persona;
use crate::pricing::format_cost;

/// What one accepted submission produced. `reply` is the assistant turn's text
/// either way; `failure` is set when that text is a diagnostic.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TurnReport {
    pub reply: String,
    pub usage: TokenUsage,
    pub cost: f64,
    pub cost_display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<CompletionFailure>,
}

/// Serializable view of a session for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub transcript: Vec<Turn>,
    pub recent_questions: Vec<String>,
    pub last_cost: f64,
    pub last_cost_display: String,
}

pub struct ChatSession {
    store: ConversationStore,
    gateway: CompletionGateway,
}

impl ChatSession {
    pub fn new(gateway: CompletionGateway) -> Self {
        Self::with_store(ConversationStore::new(), gateway)
    }

    pub fn with_store(store: ConversationStore, gateway: CompletionGateway) -> Self {
        Self { store, gateway }
    }

    /// Runs one user turn to completion. Completion failures are recorded in the
    /// transcript, never returned; the only error is an empty message, which
    /// leaves the session untouched.
    pub async fn submit(&mut self, text: &str) -> Result<TurnReport, ConversationError> {
        self.store.append_user(text)?;

        let window = self.store.recent_window(constants::WINDOW_SIZE);
        debug!(window = window.len(), "Awaiting reply");
        let outcome = self.gateway.send(&window).await;
        self.store.set_last_cost(outcome.cost());

        let report = match outcome {
            TurnOutcome::Reply { text, usage, cost } => {
                self.store.append_assistant(text.clone());
                TurnReport {
                    reply: text,
                    usage,
                    cost,
                    cost_display: format_cost(cost),
                    failure: None,
                }
            }
            TurnOutcome::Failed(failure) => {
                let text = persona::apology_for(&failure);
                self.store.append_failure(failure.clone(), text.clone());
                TurnReport {
                    reply: text,
                    usage: TokenUsage::default(),
                    cost: 0.0,
                    cost_display: format_cost(0.0),
                    failure: Some(failure),
                }
            }
        };
        Ok(report)
    }

    pub fn reset(&mut self) {
        info!("Starting a new chat");
        self.store.reset();
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            transcript: self.store.transcript().to_vec(),
            recent_questions: self.store.recent_questions(constants::RECENT_QUESTIONS),
            last_cost: self.store.last_cost(),
            last_cost_display: format_cost(self.store.last_cost()),
        }
    }
}

enum Command<'a> {
    Quit,
    NewChat,
    History,
    Cost,
    Help,
    Prompt(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    match line {
        "/quit" | "/exit" => Command::Quit,
        "/new" | "/clear" => Command::NewChat,
        "/history" => Command::History,
        "/cost" => Command::Cost,
        "/help" => Command::Help,
        _ => {
            let example = line
                .strip_prefix('/')
                .and_then(|n| n.parse::<usize>().ok())
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| persona::EXAMPLE_PROMPTS.get(i).copied());
            Command::Prompt(example.unwrap_or(line))
        }
    }
}

fn help_text() -> String {
    let mut text = String::from("Commands: /new, /history, /cost, /help, /quit\nExample prompts:\n");
    for (i, prompt) in persona::EXAMPLE_PROMPTS.iter().enumerate() {
        text.push_str(&format!("  /{}  {}\n", i + 1, prompt));
    }
    text
}

/// Line-oriented chat over any reader/writer pair; stdin/stdout in the binary.
pub async fn run_terminal_chat<R, W>(session: &mut ChatSession, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("Starting terminal chat...");
    output
        .write_all(format!("{}\n\n{}\n{}\n", persona::NAME, persona::GREETING, help_text()).as_bytes())
        .await?;

    let mut lines = input.lines();
    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match parse_command(line) {
            Command::Quit => break,
            Command::NewChat => {
                session.reset();
                format!("{}\n", persona::GREETING)
            }
            Command::History => {
                let questions = session.store().recent_questions(constants::RECENT_QUESTIONS);
                if questions.is_empty() {
                    format!("{}\n", persona::EMPTY_HISTORY)
                } else {
                    questions
                        .iter()
                        .enumerate()
                        .map(|(i, q)| format!("{}. {}\n", i + 1, q))
                        .collect()
                }
            }
            Command::Cost => format!(
                "Last reply approx cost: {}\n",
                format_cost(session.store().last_cost())
            ),
            Command::Help => help_text(),
            Command::Prompt(prompt) => match session.submit(prompt).await {
                Ok(report) => format!("\n{}\n\n[{}]\n", report.reply, report.cost_display),
                Err(e) => format!("{}\n", e),
            },
        };
        output.write_all(response.as_bytes()).await?;
    }

    output.flush().await?;
    info!("Terminal chat finished.");
    Ok(())
}
