use super::*;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade},
        Path,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use shared::{
    domain::{default_catalog, Chocolate},
    error::ErrorCode,
    lobby,
};
use tokio::net::TcpListener;

fn sample_lobby(host: &str) -> Lobby {
    lobby::create_with_id(LobbyId::from("ABC123"), host, &default_catalog()).expect("lobby")
}

async fn handle_create(Json(req): Json<UsernameRequest>) -> Response {
    match lobby::create_with_id(LobbyId::from("ABC123"), &req.username, &default_catalog()) {
        Ok(lobby) => Json(lobby).into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, Json(ApiError::from(err))).into_response(),
    }
}

async fn handle_get(Path(lobby_id): Path<String>) -> Response {
    if lobby_id == "ABC123" {
        Json(sample_lobby("alice")).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ApiError::new(ErrorCode::NotFound, "lobby not found")),
        )
            .into_response()
    }
}

async fn handle_rate(
    Path(_lobby_id): Path<String>,
    Json(req): Json<SubmitRatingRequest>,
) -> Response {
    let started = lobby::start_voting(&sample_lobby("alice"), "alice").expect("start");
    match lobby::submit_rating(&started, &req.username, req.score) {
        Ok(lobby) => Json(lobby).into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, Json(ApiError::from(err))).into_response(),
    }
}

async fn handle_start() -> Response {
    (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response()
}

async fn handle_ws(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(push_two_events)
}

async fn push_two_events(mut socket: WebSocket) {
    let snapshot = ServerEvent::LobbySnapshot {
        lobby: Some(sample_lobby("alice")),
    };
    let error = ServerEvent::Error(ApiError::new(
        ErrorCode::StoreUnavailable,
        "subscription fell behind by 3 updates",
    ));
    for event in [snapshot, error] {
        let text = serde_json::to_string(&event).expect("json");
        if socket.send(AxumMessage::Text(text)).await.is_err() {
            return;
        }
    }
    let _ = socket.send(AxumMessage::Close(None)).await;
}

async fn spawn_lobby_server() -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/catalog", get(|| async { Json(default_catalog()) }))
        .route("/lobbies", post(handle_create))
        .route("/lobbies/:lobby_id", get(handle_get))
        .route("/lobbies/:lobby_id/start", post(handle_start))
        .route("/lobbies/:lobby_id/ratings", post(handle_rate))
        .route("/lobbies/:lobby_id/ws", get(handle_ws));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

#[test]
fn rejects_non_http_server_urls() {
    assert!(matches!(
        LobbyClient::new("ftp://example.com"),
        Err(ClientError::InvalidServerUrl(_))
    ));
    assert!(LobbyClient::new("not a url").is_err());
    assert!(LobbyClient::new("http://localhost:8080/").is_ok());
}

#[tokio::test]
async fn health_and_catalog_round_trip() {
    let client = LobbyClient::new(&spawn_lobby_server().await).expect("client");
    client.health().await.expect("health");
    let catalog: Vec<Chocolate> = client.catalog().await.expect("catalog");
    assert_eq!(catalog, default_catalog());
}

#[tokio::test]
async fn create_and_get_decode_lobbies() {
    let client = LobbyClient::new(&spawn_lobby_server().await).expect("client");
    let created = client.create_lobby("alice").await.expect("create");
    assert_eq!(created.host, "alice");
    assert_eq!(created.participants, vec!["alice".to_string()]);

    let fetched = client.get_lobby(" abc123 ").await.expect("get");
    assert_eq!(fetched.id.as_str(), "ABC123");
}

#[tokio::test]
async fn api_errors_are_decoded() {
    let client = LobbyClient::new(&spawn_lobby_server().await).expect("client");

    let err = client.get_lobby("NOPE00").await.expect_err("absent");
    assert_eq!(err.api_error().map(|e| e.code), Some(ErrorCode::NotFound));

    let err = client.create_lobby("  ").await.expect_err("empty username");
    let api = err.api_error().expect("structured error");
    assert_eq!(api.code, ErrorCode::Validation);
    assert_eq!(err.to_string(), "username must not be empty");

    let err = client
        .submit_rating("ABC123", "alice", 12)
        .await
        .expect_err("out of range");
    assert_eq!(err.api_error().map(|e| e.code), Some(ErrorCode::Validation));
}

#[tokio::test]
async fn non_json_error_bodies_keep_status() {
    let client = LobbyClient::new(&spawn_lobby_server().await).expect("client");
    let err = client
        .start_voting("ABC123", "alice")
        .await
        .expect_err("bad gateway");
    match err {
        ClientError::Status { status, body } => {
            assert_eq!(status, 502);
            assert_eq!(body, "upstream unavailable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn empty_lobby_id_fails_before_request() {
    let client = LobbyClient::new("http://127.0.0.1:9").expect("client");
    assert!(matches!(
        client.join_lobby("   ", "bob").await,
        Err(ClientError::EmptyLobbyId)
    ));
}

#[tokio::test]
async fn subscription_forwards_snapshot_then_terminal_error() {
    let client = LobbyClient::new(&spawn_lobby_server().await).expect("client");
    let (mut events, task) = client.subscribe_lobby("abc123").await.expect("subscribe");

    match events.recv().await.expect("snapshot") {
        ClientEvent::Snapshot(Some(lobby)) => assert_eq!(lobby.host, "alice"),
        other => panic!("unexpected event: {other:?}"),
    }
    match events.recv().await.expect("error") {
        ClientEvent::Error(message) => assert!(message.contains("fell behind")),
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(events.recv().await.is_none(), "channel closes after an error");
    task.await.expect("reader task");
}
