// Tunables loaded from the environment once, with defaults for local use.

use std::env;

/// Turns sent to the completion service per request.
pub const WINDOW_SIZE: usize = 8;
/// Questions listed in the sidebar.
pub const RECENT_QUESTIONS: usize = 12;
/// Oldest questions are evicted past this many entries.
pub const QUESTION_LOG_CAPACITY: usize = 200;
/// Output token cap passed with every request.
pub const MAX_OUTPUT_TOKENS: u32 = 600;

pub const DEFAULT_INPUT_PER_MILLION: f64 = 0.40;
pub const DEFAULT_OUTPUT_PER_MILLION: f64 = 1.60;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const SESSION_COOKIE: &str = "mentor_session";

// Use lazy_static to initialize static variables safely.
lazy_static::lazy_static! {
    pub static ref OPENAI_BASE_URL: String = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
    pub static ref MENTOR_CHAT_MODEL: String = env::var("MENTOR_CHAT_MODEL").unwrap_or_else(|_| "gpt-4.1-mini".to_string());
    pub static ref REQUEST_TIMEOUT_SECS: u64 = parse_var("MENTOR_REQUEST_TIMEOUT_SECS", 60);
    pub static ref SESSION_IDLE_SECS: u64 = parse_var("MENTOR_SESSION_IDLE_SECS", 3600);
    pub static ref INPUT_PER_MILLION: f64 = parse_price("MENTOR_INPUT_PER_MILLION", DEFAULT_INPUT_PER_MILLION);
    pub static ref OUTPUT_PER_MILLION: f64 = parse_price("MENTOR_OUTPUT_PER_MILLION", DEFAULT_OUTPUT_PER_MILLION);
    pub static ref SECRETS_FILE: String = env::var("MENTOR_SECRETS_FILE").unwrap_or_else(|_| ".mentor-chat/secrets.toml".to_string());
    pub static ref TEMPLATES_DIR: String = env::var("MENTOR_TEMPLATES_DIR").unwrap_or_else(|_| concat!(env!("CARGO_MANIFEST_DIR"), "/templates").to_string());
    pub static ref STATIC_DIR: String = env::var("MENTOR_STATIC_DIR").unwrap_or_else(|_| concat!(env!("CARGO_MANIFEST_DIR"), "/static").to_string());
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

/// A per-million price; NaN, infinite and negative values fall back to `default`.
fn parse_price(name: &str, default: f64) -> f64 {
    valid_price(env::var(name).ok().as_deref(), default)
}

fn valid_price(raw: Option<&str>, default: f64) -> f64 {
    raw.and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|price| price.is_finite() && *price >= 0.0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_price_accepts_plain_numbers() {
        assert_eq!(valid_price(Some("0.15"), 0.40), 0.15);
        assert_eq!(valid_price(Some(" 2 "), 0.40), 2.0);
        assert_eq!(valid_price(Some("0"), 0.40), 0.0);
    }

    #[test]
    fn test_valid_price_rejects_nonsense() {
        for raw in ["NaN", "inf", "-inf", "-0.5", "cheap", ""] {
            assert_eq!(valid_price(Some(raw), 0.40), 0.40, "{raw:?}");
        }
        assert_eq!(valid_price(None, 1.60), 1.60);
    }
}
