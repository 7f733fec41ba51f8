use futures::StreamExt;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{Chocolate, Lobby, LobbyId},
    error::ApiError,
    protocol::{LobbyResults, ServerEvent, SubmitRatingRequest, UsernameRequest},
};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

pub mod messages;
pub mod session;

pub use messages::{LobbyAction, Locale};
pub use session::{render_results, LobbySession, SessionView};

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{}", .0.message)]
    Api(ApiError),
    #[error("server responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("websocket failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("invalid server url: {0}")]
    InvalidServerUrl(String),
    #[error("lobby id must not be empty")]
    EmptyLobbyId,
}

impl ClientError {
    /// The structured server error, when the server produced one.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            ClientError::Api(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Something pushed by a lobby subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Latest snapshot; `None` while no lobby exists under the watched id.
    Snapshot(Option<Lobby>),
    /// The subscription failed and has ended.
    Error(String),
    Closed,
}

#[derive(Debug, Clone)]
pub struct LobbyClient {
    http: Client,
    server_url: Url,
}

impl LobbyClient {
    pub fn new(server_url: &str) -> Result<Self> {
        let server_url = Url::parse(server_url.trim_end_matches('/'))
            .map_err(|err| ClientError::InvalidServerUrl(format!("{server_url}: {err}")))?;
        if !matches!(server_url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidServerUrl(
                "server_url must start with http:// or https://".into(),
            ));
        }
        Ok(Self {
            http: Client::new(),
            server_url,
        })
    }

    pub async fn health(&self) -> Result<()> {
        let res = self.http.get(self.endpoint(&["healthz"])?).send().await?;
        check_status(res).await.map(|_| ())
    }

    pub async fn catalog(&self) -> Result<Vec<Chocolate>> {
        self.get_json(&["catalog"]).await
    }

    pub async fn create_lobby(&self, username: &str) -> Result<Lobby> {
        self.post_json(&["lobbies"], &username_body(username)).await
    }

    pub async fn get_lobby(&self, lobby_id: &str) -> Result<Lobby> {
        let lobby_id = lobby_segment(lobby_id)?;
        self.get_json(&["lobbies", lobby_id.as_str()]).await
    }

    pub async fn join_lobby(&self, lobby_id: &str, username: &str) -> Result<Lobby> {
        let lobby_id = lobby_segment(lobby_id)?;
        self.post_json(&["lobbies", lobby_id.as_str(), "join"], &username_body(username))
            .await
    }

    pub async fn start_voting(&self, lobby_id: &str, username: &str) -> Result<Lobby> {
        let lobby_id = lobby_segment(lobby_id)?;
        self.post_json(&["lobbies", lobby_id.as_str(), "start"], &username_body(username))
            .await
    }

    pub async fn submit_rating(&self, lobby_id: &str, username: &str, score: i64) -> Result<Lobby> {
        let lobby_id = lobby_segment(lobby_id)?;
        let body = SubmitRatingRequest {
            username: username.to_string(),
            score,
        };
        self.post_json(&["lobbies", lobby_id.as_str(), "ratings"], &body)
            .await
    }

    pub async fn lobby_results(&self, lobby_id: &str) -> Result<LobbyResults> {
        let lobby_id = lobby_segment(lobby_id)?;
        self.get_json(&["lobbies", lobby_id.as_str(), "results"])
            .await
    }

    /// Opens the lobby's WebSocket feed. The first event is the current
    /// snapshot. The channel closes after an `Error` or `Closed` event.
    pub async fn subscribe_lobby(
        &self,
        lobby_id: &str,
    ) -> Result<(mpsc::Receiver<ClientEvent>, JoinHandle<()>)> {
        let lobby_id = lobby_segment(lobby_id)?;
        let mut ws_url = self.endpoint(&["lobbies", lobby_id.as_str(), "ws"])?;
        let scheme = if ws_url.scheme() == "https" { "wss" } else { "ws" };
        ws_url
            .set_scheme(scheme)
            .map_err(|_| ClientError::InvalidServerUrl(ws_url.to_string()))?;

        let (ws_stream, _) = connect_async(ws_url.as_str()).await?;
        let (_, mut ws_reader) = ws_stream.split();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let task = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                let event = match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(ServerEvent::LobbySnapshot { lobby }) => ClientEvent::Snapshot(lobby),
                        Ok(ServerEvent::Error(err)) => {
                            let _ = tx.send(ClientEvent::Error(err.message)).await;
                            return;
                        }
                        Err(err) => {
                            warn!(%err, "dropping undecodable lobby event");
                            let _ = tx
                                .send(ClientEvent::Error(format!("invalid server event: {err}")))
                                .await;
                            return;
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        let _ = tx
                            .send(ClientEvent::Error(format!("websocket failed: {err}")))
                            .await;
                        return;
                    }
                };
                if tx.send(event).await.is_err() {
                    debug!("lobby event receiver dropped");
                    return;
                }
            }
            let _ = tx.send(ClientEvent::Closed).await;
        });

        Ok((rx, task))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.server_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidServerUrl(self.server_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let res = self.http.get(self.endpoint(segments)?).send().await?;
        Ok(check_status(res).await?.json().await?)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T> {
        let res = self
            .http
            .post(self.endpoint(segments)?)
            .json(body)
            .send()
            .await?;
        Ok(check_status(res).await?.json().await?)
    }
}

fn username_body(username: &str) -> UsernameRequest {
    UsernameRequest {
        username: username.to_string(),
    }
}

fn lobby_segment(raw: &str) -> Result<LobbyId> {
    LobbyId::parse(raw).ok_or(ClientError::EmptyLobbyId)
}

async fn check_status(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await?;
    match serde_json::from_str::<ApiError>(&body) {
        Ok(err) => Err(ClientError::Api(err)),
        Err(_) => Err(ClientError::Status {
            status: status.as_u16(),
            body,
        }),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
