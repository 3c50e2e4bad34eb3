//! HTTP routes for the chat backend

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{header::AUTHORIZATION, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::auth::{AuthService, UserId};
use crate::error::{Error, Result};
use crate::message::{
    ChatRequest, ChatResponse, Credentials, ErrorResponse, InfoResponse, TokenResponse,
};
use crate::pipeline::ChatPipeline;

/// Application state shared across handlers
pub struct AppState {
    pub pipeline: ChatPipeline,
    pub auth: AuthService,
}

pub type SharedState = Arc<AppState>;

/// Build the router. `/chat` requires a bearer token; everything else is public.
pub fn router(state: SharedState, cors_origin: &str) -> Result<Router> {
    let origin = cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| Error::config(format!("invalid CORS origin {cors_origin:?}: {e}")))?;

    let protected = Router::new()
        .route("/chat", post(chat))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Ok(Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/signup", post(signup))
        .route("/login", post(login))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state))
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = match &self {
            Error::InvalidInput(msg) => msg.clone(),
            Error::GenerationTimeout(_) | Error::GenerationLaunch(_) => self.to_string(),
            _ if self.is_client_error() => self.to_string(),
            _ => {
                tracing::error!(error = %self, "request failed");
                "Server error".to_string()
            }
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

async fn require_auth(State(state): State<SharedState>, mut request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    match blocking(move || state.auth.authenticate(header.as_deref())).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "request rejected by auth gate");
            e.into_response()
        }
    }
}

/// Run account-store and password-hashing work on the blocking pool
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

/// Unwrap a JSON body, turning axum's rejection into a JSON error response
fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| Error::invalid_input(rejection.body_text()))
}

// === Handlers ===

async fn home() -> Json<InfoResponse> {
    Json(InfoResponse::new("Chatbot API is running!"))
}

async fn health() -> &'static str {
    "ok"
}

async fn signup(
    State(state): State<SharedState>,
    payload: std::result::Result<Json<Credentials>, JsonRejection>,
) -> Result<(StatusCode, Json<InfoResponse>)> {
    let req = json_body(payload)?;
    blocking(move || state.auth.signup(&req.username, &req.password)).await?;
    Ok((
        StatusCode::CREATED,
        Json(InfoResponse::new("User registered successfully")),
    ))
}

async fn login(
    State(state): State<SharedState>,
    payload: std::result::Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<TokenResponse>> {
    let req = json_body(payload)?;
    let token = blocking(move || state.auth.login(&req.username, &req.password)).await?;
    Ok(Json(TokenResponse { token }))
}

async fn chat(
    State(state): State<SharedState>,
    Extension(user): Extension<UserId>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>> {
    let req = json_body(payload)?;

    // Detached from the connection: a client that hangs up does not cancel the
    // model run or the transcript commit
    let response = tokio::spawn(
        async move { state.pipeline.handle(user.as_str(), &req.message).await }.in_current_span(),
    )
    .await??;

    Ok(Json(ChatResponse { response }))
}
