use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post, put},
    serve, Json, Router,
};
use chrono::Local;
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    collections::HashMap,
    net::SocketAddr,
    path::{Path as FsPath, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chat::{self, ChatSession};
use crate::constants;
use crate::conversation::{Conversation, Message as ChatMessage, SessionStats};
use crate::export;
use crate::llm_interaction::LlmClient;
use crate::quick_prompts::{self, QuickPromptError};
use crate::settings::{self, Settings, SettingsError};
use crate::weather::{self, WeatherClient};

/// Filesystem locations the server reads from and writes to.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
    pub export_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("templates"),
            static_dir: PathBuf::from("static"),
            export_dir: PathBuf::from(constants::EXPORT_DIR.as_str()),
        }
    }
}

/// Sessions untouched for this long are dropped when a new one is created.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

struct SessionSlot {
    session: ChatSession,
    last_used: Instant,
}

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    sessions: Arc<RwLock<HashMap<Uuid, SessionSlot>>>,
    session_ttl: Duration,
    llm: LlmClient,
    weather: WeatherClient,
    export_dir: PathBuf,
}

impl AppState {
    pub fn new(config: &ServerConfig, llm: LlmClient, weather: WeatherClient) -> Self {
        Self {
            templates: Arc::new(create_minijinja_env(&config.templates_dir)),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            session_ttl: SESSION_IDLE_TIMEOUT,
            llm,
            weather,
            export_dir: config.export_dir.clone(),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Registers `session` under a fresh id, evicting idle sessions first.
    pub async fn insert_session(&self, session: ChatSession) -> Uuid {
        let id = Uuid::new_v4();
        let mut sessions = self.sessions.write().await;

        let before = sessions.len();
        let ttl = self.session_ttl;
        sessions.retain(|_, slot| slot.last_used.elapsed() < ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, "Dropped idle chat sessions");
        }

        sessions.insert(
            id,
            SessionSlot {
                session,
                last_used: Instant::now(),
            },
        );
        info!(%id, "Created chat session");
        id
    }

    /// Runs `f` against the session and marks it as used.
    async fn with_session<T>(&self, id: Uuid, f: impl FnOnce(&mut ChatSession) -> T) -> Result<T, ApiError> {
        let mut sessions = self.sessions.write().await;
        let slot = sessions.get_mut(&id).ok_or(ApiError::SessionNotFound)?;
        slot.last_used = Instant::now();
        Ok(f(&mut slot.session))
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("session not found")]
    SessionNotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<SettingsError> for ApiError {
    fn from(err: SettingsError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<QuickPromptError> for ApiError {
    fn from(err: QuickPromptError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::SessionNotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(e) => {
                error!("Request failed: {:?}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// Minijinja Environment setup
fn create_minijinja_env(templates_dir: &FsPath) -> AutoReloader {
    let dir = templates_dir.to_path_buf();
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&dir));
        // Watch the templates directory for changes
        notifier.watch_path(&dir, true);
        Ok(env)
    })
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, Html<String>> {
    let now = Local::now().naive_local();
    let hours: Vec<String> = (1..=12).map(|h| format!("{}시", h)).collect();

    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                let context = minijinja::context! {
                    title => constants::APP_TITLE,
                    popular_destinations => constants::POPULAR_DESTINATIONS,
                    quick_questions => constants::QUICK_QUESTIONS,
                    quick_cities => constants::WEATHER_QUICK_CITIES,
                    models => settings::AVAILABLE_MODELS,
                    defaults => Settings::default(),
                    temperature_range => settings::TEMPERATURE_RANGE,
                    temperature_step => settings::TEMPERATURE_STEP,
                    max_tokens_range => settings::MAX_TOKENS_RANGE,
                    max_tokens_step => settings::MAX_TOKENS_STEP,
                    hours => hours,
                    today => now.date().format("%Y-%m-%d").to_string(),
                    max_date => weather::max_date(now).format("%Y-%m-%d").to_string(),
                };
                tmpl.render(context)
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            Html(format!("Internal Server Error: {}", e))
        })
}

#[derive(Serialize)]
struct SessionCreated {
    id: Uuid,
    settings: Settings,
}

async fn create_session(State(state): State<AppState>) -> Json<SessionCreated> {
    let session = ChatSession::default();
    let settings = session.settings.clone();
    let id = state.insert_session(session).await;
    Json(SessionCreated { id, settings })
}

#[derive(Serialize)]
struct SessionView {
    messages: Vec<ChatMessage>,
    settings: Settings,
}

async fn get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<SessionView>, ApiError> {
    let view = state
        .with_session(id, |session| SessionView {
            messages: session.conversation.messages().to_vec(),
            settings: session.settings.clone(),
        })
        .await?;
    Ok(Json(view))
}

async fn session_stats(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<SessionStats>, ApiError> {
    let stats = state.with_session(id, |session| session.conversation.stats()).await?;
    Ok(Json(stats))
}

#[derive(Serialize)]
struct Cleared {
    status: &'static str,
    stats: SessionStats,
}

async fn clear_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Cleared>, ApiError> {
    let stats = state
        .with_session(id, |session| {
            session.conversation.clear();
            session.conversation.stats()
        })
        .await?;
    info!(%id, "Cleared chat session");
    Ok(Json(Cleared {
        status: "✅ 대화가 초기화되었습니다.",
        stats,
    }))
}

#[derive(Serialize)]
struct ExportResponse {
    filename: String,
    url: String,
    format: export::ExportFormat,
}

async fn export_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ExportResponse>, ApiError> {
    let messages = state
        .with_session(id, |session| session.conversation.messages().to_vec())
        .await?;

    let dir = state.export_dir.clone();
    let now = Local::now().naive_local();
    let exported = tokio::task::spawn_blocking(move || export::export_conversation(&messages, &dir, now))
        .await
        .context("Export task panicked")??
        .ok_or_else(|| ApiError::BadRequest("저장할 대화가 없습니다.".to_string()))?;

    let filename = exported.file_name();
    Ok(Json(ExportResponse {
        url: format!("/exports/{}", urlencoding::encode(&filename)),
        filename,
        format: exported.format,
    }))
}

async fn update_settings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(requested): Json<Settings>,
) -> Result<Json<Settings>, ApiError> {
    let normalized = requested.normalized()?;
    state
        .with_session(id, |session| session.settings = normalized.clone())
        .await?;
    Ok(Json(normalized))
}

async fn reset_settings(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Settings>, ApiError> {
    let settings = state
        .with_session(id, |session| {
            session.settings.reset();
            session.settings.clone()
        })
        .await?;
    Ok(Json(settings))
}

#[derive(Debug, Deserialize)]
struct WeatherQuery {
    city: Option<String>,
    date: Option<String>,
    hour: Option<String>,
    ampm: Option<String>,
}

async fn weather_handler(State(state): State<AppState>, Query(query): Query<WeatherQuery>) -> Json<serde_json::Value> {
    let date = query
        .date
        .as_deref()
        .and_then(|d| chrono::NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok());
    let report = state
        .weather
        .check_weather(
            query.city.as_deref().unwrap_or_default(),
            date,
            query.hour.as_deref().unwrap_or("12시"),
            query.ampm.as_deref().unwrap_or("오후"),
        )
        .await;
    Json(json!({ "report": report }))
}

#[derive(Debug, Deserialize)]
struct QuickPromptRequest {
    destination: Option<String>,
    question: Option<String>,
}

async fn quick_prompt(Json(request): Json<QuickPromptRequest>) -> Result<Json<serde_json::Value>, ApiError> {
    let destination = request.destination.as_deref();
    let has_question = request.question.as_deref().is_some_and(|q| !q.trim().is_empty());
    let has_destination = destination.is_some_and(|d| !d.trim().is_empty());

    let prompt = if !has_question && has_destination {
        quick_prompts::destination_prompt(destination)
    } else {
        quick_prompts::apply_quick_question(destination, request.question.as_deref())?
    };
    Ok(Json(json!({ "prompt": prompt })))
}

#[derive(Debug, Deserialize)]
struct QuickDateQuery {
    #[serde(default)]
    offset: i64,
}

async fn quick_date_handler(Query(query): Query<QuickDateQuery>) -> Result<Json<serde_json::Value>, ApiError> {
    if !(0..=weather::MAX_FORECAST_DAYS).contains(&query.offset) {
        return Err(ApiError::BadRequest(format!(
            "offset must be between 0 and {}",
            weather::MAX_FORECAST_DAYS
        )));
    }
    let date = weather::quick_date(query.offset, Local::now().naive_local());
    Ok(Json(json!({
        "date": date.format("%Y-%m-%d").to_string(),
        "hour": "12시",
        "ampm": "오후",
    })))
}

// Frames exchanged over the chat WebSocket
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Chat { message: String },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    Info { message: String },
    UserMessage { content: String },
    Partial { content: String },
    Complete { content: String, stats: SessionStats },
    Error { message: String },
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> Result<()> {
    let json_msg = serde_json::to_string(frame).context("Failed to serialize WebSocket frame")?;
    socket
        .send(Message::Text(json_msg))
        .await
        .context("WebSocket client disconnected or send error")
}

// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    state.with_session(id, |_| ()).await?;
    info!(%id, "WebSocket connection upgrade requested");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, id)))
}

// Handle individual WebSocket connections
async fn handle_socket(mut socket: WebSocket, state: AppState, id: Uuid) {
    info!(%id, "New WebSocket connection established");

    let welcome = ServerFrame::Info {
        message: "Connected to travel planner".to_string(),
    };
    if send_frame(&mut socket, &welcome).await.is_err() {
        warn!("Failed to send welcome message to new WebSocket client");
        return;
    }

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(ClientFrame::Chat { message }) => {
                    if let Err(e) = run_chat_turn(&state, id, message, &mut socket).await {
                        warn!("Chat turn aborted: {:?}", e);
                        break;
                    }
                }
                Err(e) => {
                    warn!("Received malformed frame from client: {}", e);
                    let frame = ServerFrame::Error {
                        message: format!("잘못된 요청입니다: {}", e),
                    };
                    if send_frame(&mut socket, &frame).await.is_err() {
                        break;
                    }
                }
            },
            Message::Binary(_) => {
                warn!("Received unexpected binary message from client");
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => {
                info!("Client requested WebSocket close");
                break;
            }
        }
    }
    info!(%id, "WebSocket connection closed");
}

/// Appends the user message, streams the answer as `partial` frames and
/// stores the finished answer. Returns an error only when the socket is gone.
async fn run_chat_turn(state: &AppState, id: Uuid, message: String, socket: &mut WebSocket) -> Result<()> {
    let message = message.trim().to_string();
    if message.is_empty() {
        return Ok(());
    }

    let snapshot = state
        .with_session(id, |session| {
            let history = session.conversation.messages().to_vec();
            session.conversation.push(ChatMessage::user(message.clone()));
            (history, session.settings.clone())
        })
        .await;
    let Ok((history, settings)) = snapshot else {
        let frame = ServerFrame::Error {
            message: "세션을 찾을 수 없습니다.".to_string(),
        };
        return send_frame(socket, &frame).await;
    };

    send_frame(socket, &ServerFrame::UserMessage { content: message.clone() }).await?;

    let (tx, rx) = mpsc::channel::<String>(64);
    let answer = chat::answer_stream(&state.llm, &settings, &history, &message, tx);
    // `forward` owns the receiver: once a send fails it is dropped, further
    // partials are discarded and the answer still completes and is stored.
    let forward = async {
        let mut rx = rx;
        while let Some(content) = rx.recv().await {
            send_frame(socket, &ServerFrame::Partial { content }).await?;
        }
        Ok::<(), anyhow::Error>(())
    };
    let (answer, forwarded) = tokio::join!(answer, forward);

    let frame = match answer {
        Ok(content) => {
            let stats = state
                .with_session(id, |session| {
                    session.conversation.push(ChatMessage::assistant(content.clone()));
                    session.conversation.stats()
                })
                .await
                .unwrap_or_else(|_| Conversation::new().stats());
            ServerFrame::Complete { content, stats }
        }
        Err(e) => {
            error!("Failed to generate answer: {:?}", e);
            ServerFrame::Error {
                message: format!("⚠️ 응답 생성 중 오류 발생: {:#}", e),
            }
        }
    };

    if let Err(e) = forwarded {
        info!(%id, "Client went away mid-answer; answer stored without delivery");
        return Err(e);
    }
    send_frame(socket, &frame).await
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/ws/:id", get(ws_handler))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/stats", get(session_stats))
        .route("/api/sessions/:id/messages", delete(clear_session))
        .route("/api/sessions/:id/export", post(export_session))
        .route("/api/sessions/:id/settings", put(update_settings))
        .route("/api/sessions/:id/settings/reset", post(reset_settings))
        .route("/api/weather", get(weather_handler))
        .route("/api/quick-prompt", post(quick_prompt))
        .route("/api/quick-date", get(quick_date_handler))
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .nest_service("/exports", ServeDir::new(&config.export_dir))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http())) // Add request logging
}

pub async fn start_web_server(host: &str, port: u16, config: ServerConfig, llm: LlmClient, weather: WeatherClient) -> Result<()> {
    std::fs::create_dir_all(&config.export_dir)
        .context(format!("Failed to create export directory {}", config.export_dir.display()))?;

    let state = AppState::new(&config, llm, weather);
    let app = build_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context(format!("Invalid bind address {}:{}", host, port))?;
    info!("Web server listening on http://{}", addr);

    // Bind using tokio::net::TcpListener
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
