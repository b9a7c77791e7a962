pub mod chat;
pub mod config;
pub mod constants;
pub mod conversation;
pub mod llm_interaction;
pub mod persona;
pub mod pricing;
pub mod render;
pub mod session;
pub mod web_server;

pub use chat::{ChatSession, SessionSnapshot, TurnReport};
pub use conversation::{ChatMessage, ConversationError, ConversationStore, Role, Turn};
pub use llm_interaction::{
    CompletionError, CompletionFailure, CompletionGateway, CompletionRequest, CompletionResponse,
    CompletionService, FailureKind, OpenAiCompletionService, TokenUsage, TurnOutcome,
};
pub use pricing::PricingModel;
