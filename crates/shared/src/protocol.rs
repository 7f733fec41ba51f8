use serde::{Deserialize, Serialize};

use crate::{
    domain::{Lobby, LobbyId},
    error::ApiError,
    lobby::{calculate_results, ChocolateResult},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsernameRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRatingRequest {
    pub username: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyResults {
    pub lobby_id: LobbyId,
    pub is_voting_complete: bool,
    pub results: Vec<ChocolateResult>,
}

impl LobbyResults {
    pub fn for_lobby(lobby: &Lobby) -> Self {
        Self {
            lobby_id: lobby.id.clone(),
            is_voting_complete: lobby.is_voting_complete(),
            results: calculate_results(lobby),
        }
    }
}

/// Frames pushed over a lobby subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    LobbySnapshot { lobby: Option<Lobby> },
    Error(ApiError),
}
