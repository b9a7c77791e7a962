use anyhow::{Context, Result};
use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    serve, Form, Json, Router,
};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::chat::{SessionSnapshot, TurnReport};
use crate::constants;
use crate::conversation::{ConversationError, Role};
use crate::persona;
use crate::pricing::format_cost;
use crate::render::markdown_to_html;
use crate::session::{SessionId, SessionRegistry};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    sessions: SessionRegistry,
    static_dir: String,
}

impl AppState {
    pub fn new(sessions: SessionRegistry, templates_dir: &str, static_dir: &str) -> Self {
        Self {
            templates: Arc::new(create_minijinja_env(templates_dir)),
            sessions,
            static_dir: static_dir.to_string(),
        }
    }

    pub fn from_env(sessions: SessionRegistry) -> Self {
        Self::new(sessions, &constants::TEMPLATES_DIR, &constants::STATIC_DIR)
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("session not found")]
    SessionNotFound,
    #[error(transparent)]
    Conversation(#[from] ConversationError),
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::SessionNotFound => StatusCode::NOT_FOUND,
            ApiError::Conversation(ConversationError::EmptyMessage) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Template(e) => {
                error!("Failed to get or render template: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

// Minijinja Environment setup
fn create_minijinja_env(templates_dir: &str) -> AutoReloader {
    let dir = templates_dir.to_string();
    // Use AutoReloader for development convenience
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&dir));
        // Watch the templates directory for changes
        notifier.watch_path(&dir, true);
        Ok(env)
    })
}

#[derive(Serialize)]
struct TurnView {
    role: Role,
    html: String,
    time: String,
    is_failure: bool,
}

fn render_index(state: &AppState, snapshot: &SessionSnapshot) -> Result<String, minijinja::Error> {
    let turns: Vec<TurnView> = snapshot
        .transcript
        .iter()
        .map(|turn| TurnView {
            role: turn.role,
            html: markdown_to_html(&turn.content),
            time: turn.time_label(),
            is_failure: turn.is_failure(),
        })
        .collect();

    let env = state.templates.acquire_env()?;
    let tmpl = env.get_template("index.html")?;
    tmpl.render(minijinja::context! {
        title => persona::NAME,
        name => persona::NAME,
        tagline => persona::TAGLINE,
        header_text => persona::HEADER_TEXT,
        chips => persona::TOPIC_CHIPS,
        example_prompts => persona::EXAMPLE_PROMPTS,
        placeholder => persona::INPUT_PLACEHOLDER,
        empty_history => persona::EMPTY_HISTORY,
        turns => turns,
        questions => snapshot.recent_questions,
        last_cost => snapshot.last_cost_display,
    })
}

fn session_from_cookie(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == constants::SESSION_COOKIE)
        .and_then(|(_, value)| value.parse().ok())
}

/// Attaches the session cookie when the browser doesn't already carry this id.
fn with_session_cookie(mut response: Response, known: Option<SessionId>, id: SessionId) -> Response {
    if known == Some(id) {
        return response;
    }
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        constants::SESSION_COOKIE,
        id
    );
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => warn!("Failed to build session cookie: {}", e),
    }
    response
}

async fn index_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let known = session_from_cookie(&headers);
    let (id, session) = state.sessions.get_or_create(known).await;
    let snapshot = session.lock().await.snapshot();

    let response = match render_index(&state, &snapshot) {
        Ok(body) => Html(body).into_response(),
        Err(e) => ApiError::Template(e).into_response(),
    };
    with_session_cookie(response, known, id)
}

#[derive(Debug, Default, Deserialize)]
pub struct PromptForm {
    #[serde(default)]
    pub prompt: String,
}

async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<PromptForm>,
) -> Response {
    let known = session_from_cookie(&headers);
    let (id, session) = state.sessions.get_or_create(known).await;

    if !form.prompt.is_empty() {
        // The lock is held for the whole turn: one request in flight per session.
        let mut session = session.lock().await;
        if let Err(e) = session.submit(&form.prompt).await {
            warn!(session = %id, "Rejected prompt: {}", e);
        }
    }
    with_session_cookie(Redirect::to("/").into_response(), known, id)
}

async fn reset_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let known = session_from_cookie(&headers);
    let (id, session) = state.sessions.get_or_create(known).await;
    session.lock().await.reset();
    with_session_cookie(Redirect::to("/").into_response(), known, id)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedSession {
    pub session_id: SessionId,
}

async fn create_session_handler(State(state): State<AppState>) -> (StatusCode, Json<CreatedSession>) {
    let session_id = state.sessions.create().await;
    (StatusCode::CREATED, Json(CreatedSession { session_id }))
}

async fn get_session_handler(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.sessions.get(id).await.ok_or(ApiError::SessionNotFound)?;
    let snapshot = session.lock().await.snapshot();
    Ok(Json(snapshot))
}

async fn message_handler(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
    Json(body): Json<PromptForm>,
) -> Result<Json<TurnReport>, ApiError> {
    let session = state.sessions.get(id).await.ok_or(ApiError::SessionNotFound)?;
    let report = session.lock().await.submit(&body.prompt).await?;
    info!(session = %id, cost = %format_cost(report.cost), "Turn complete");
    Ok(Json(report))
}

async fn reset_session_handler(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.sessions.get(id).await.ok_or(ApiError::SessionNotFound)?;
    let mut session = session.lock().await;
    session.reset();
    Ok(Json(session.snapshot()))
}

pub fn build_router(state: AppState) -> Router {
    // Serve static files from the static directory
    let static_files_service = ServeDir::new(&state.static_dir).not_found_service(tower::service_fn(
        |_: Request| async { Ok::<_, Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response()) },
    ));

    Router::new()
        .route("/", get(index_handler))
        .route("/chat", post(chat_handler))
        .route("/reset", post(reset_handler))
        .route("/api/sessions", post(create_session_handler))
        .route("/api/sessions/:id", get(get_session_handler))
        .route("/api/sessions/:id/messages", post(message_handler))
        .route("/api/sessions/:id/reset", post(reset_session_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub async fn start_web_server(addr: SocketAddr, state: AppState) -> Result<()> {
    let app = build_router(state);
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_cookie() {
        let id = uuid::Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; mentor_session={}; other=1", id)).unwrap(),
        );
        assert_eq!(session_from_cookie(&headers), Some(id));

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("mentor_session=not-a-uuid"));
        assert_eq!(session_from_cookie(&headers), None);
        assert_eq!(session_from_cookie(&HeaderMap::new()), None);
    }

    #[test]
    fn test_cookie_only_set_for_new_ids() {
        let id = uuid::Uuid::new_v4();
        let response = with_session_cookie(StatusCode::OK.into_response(), Some(id), id);
        assert!(response.headers().get(header::SET_COOKIE).is_none());

        let response = with_session_cookie(StatusCode::OK.into_response(), None, id);
        let cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with(&format!("mentor_session={}", id)));
        assert!(cookie.contains("HttpOnly"));
    }
}
