use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use server_api::{
    create_lobby, get_lobby, health, join_lobby, lobby_results, start_voting, store_error,
    submit_rating, subscribe_lobby, ApiContext,
};
use shared::{
    domain::{Chocolate, Lobby},
    error::{ApiError, ErrorCode},
    protocol::{LobbyResults, ServerEvent, SubmitRatingRequest, UsernameRequest},
};
use storage::{LobbySubscription, Storage};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url};

const MAX_BODY_BYTES: usize = 16 * 1024;

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

type HttpError = (StatusCode, Json<ApiError>);
type HttpResult<T> = Result<Json<T>, HttpError>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::with_event_capacity(&database_url, settings.event_capacity)
        .await
        .map_err(|error| {
            error!(
                %database_url,
                %error,
                "failed to open SQLite database; verify parent directory exists and permissions are correct"
            );
            error
        })?;
    info!(
        chocolates = settings.chocolates.len(),
        "loaded chocolate catalog"
    );
    let api = ApiContext::new(Arc::new(storage), settings.chocolates);

    let app = build_router(Arc::new(AppState { api }));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/catalog", get(http_catalog))
        .route("/lobbies", post(http_create_lobby))
        .route("/lobbies/:lobby_id", get(http_get_lobby))
        .route("/lobbies/:lobby_id/join", post(http_join_lobby))
        .route("/lobbies/:lobby_id/start", post(http_start_voting))
        .route("/lobbies/:lobby_id/ratings", post(http_submit_rating))
        .route("/lobbies/:lobby_id/results", get(http_lobby_results))
        .route("/lobbies/:lobby_id/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> HttpError {
    (status_for(err.code), Json(err))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    health(&state.api).await.map_err(reject)?;
    Ok("ok")
}

async fn http_catalog(State(state): State<Arc<AppState>>) -> Json<Vec<Chocolate>> {
    Json(state.api.catalog.as_ref().clone())
}

async fn http_create_lobby(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UsernameRequest>,
) -> HttpResult<Lobby> {
    create_lobby(&state.api, &req.username)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_get_lobby(
    State(state): State<Arc<AppState>>,
    Path(lobby_id): Path<String>,
) -> HttpResult<Lobby> {
    get_lobby(&state.api, &lobby_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_join_lobby(
    State(state): State<Arc<AppState>>,
    Path(lobby_id): Path<String>,
    Json(req): Json<UsernameRequest>,
) -> HttpResult<Lobby> {
    join_lobby(&state.api, &lobby_id, &req.username)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_start_voting(
    State(state): State<Arc<AppState>>,
    Path(lobby_id): Path<String>,
    Json(req): Json<UsernameRequest>,
) -> HttpResult<Lobby> {
    start_voting(&state.api, &lobby_id, &req.username)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_submit_rating(
    State(state): State<Arc<AppState>>,
    Path(lobby_id): Path<String>,
    Json(req): Json<SubmitRatingRequest>,
) -> HttpResult<Lobby> {
    submit_rating(&state.api, &lobby_id, &req.username, req.score)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_lobby_results(
    State(state): State<Arc<AppState>>,
    Path(lobby_id): Path<String>,
) -> HttpResult<LobbyResults> {
    lobby_results(&state.api, &lobby_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(lobby_id): Path<String>,
) -> Response {
    match subscribe_lobby(&state.api, &lobby_id).await {
        Ok(subscription) => ws.on_upgrade(move |socket| ws_connection(socket, subscription)),
        Err(err) => reject(err).into_response(),
    }
}

async fn ws_connection(socket: WebSocket, mut subscription: LobbySubscription) {
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let lobby_id = subscription.lobby_id().clone();
    debug!(%lobby_id, "lobby subscriber connected");

    let send_task = tokio::spawn(async move {
        loop {
            let (event, terminal) = match subscription.recv().await {
                Ok(lobby) => (ServerEvent::LobbySnapshot { lobby }, false),
                Err(err) => (ServerEvent::Error(store_error(err)), true),
            };
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(error) => {
                    warn!(%error, "failed to encode lobby event");
                    break;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
            if terminal {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }

    send_task.abort();
    debug!(%lobby_id, "lobby subscriber disconnected");
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
