use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(LobbyId);
id_newtype!(ChocolateId);

pub const LOBBY_ID_LEN: usize = 6;
const LOBBY_ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

impl LobbyId {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..LOBBY_ID_LEN)
            .map(|_| LOBBY_ID_ALPHABET[rng.gen_range(0..LOBBY_ID_ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    /// Normalizes a lobby code typed by a person: trims and upper-cases it.
    /// Returns `None` when nothing is left.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_uppercase()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chocolate {
    pub id: ChocolateId,
    pub name: String,
}

impl Chocolate {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ChocolateId(id.into()),
            name: name.into(),
        }
    }
}

/// Catalog handed to new lobbies when the server is not configured with one.
pub fn default_catalog() -> Vec<Chocolate> {
    vec![
        Chocolate::new("1", "Bitter Çikolata"),
        Chocolate::new("2", "Sütlü Çikolata"),
        Chocolate::new("3", "Fındıklı Çikolata"),
        Chocolate::new("4", "Beyaz Çikolata"),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub user_id: String,
    pub chocolate_id: ChocolateId,
    pub score: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LobbyPhase {
    Lobby,
    Voting,
    Results,
}

/// The shared lobby document. Always replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lobby {
    pub id: LobbyId,
    pub host: String,
    pub participants: Vec<String>,
    pub is_voting_started: bool,
    pub current_chocolate_index: usize,
    pub chocolates: Vec<Chocolate>,
    #[serde(default)]
    pub ratings: Vec<Rating>,
    pub version: u64,
}

impl Lobby {
    pub fn current_chocolate(&self) -> Option<&Chocolate> {
        self.chocolates.get(self.current_chocolate_index)
    }

    pub fn is_host(&self, username: &str) -> bool {
        self.host == username
    }

    pub fn is_participant(&self, username: &str) -> bool {
        self.participants.iter().any(|p| p == username)
    }

    pub fn has_rated(&self, username: &str, chocolate_id: &ChocolateId) -> bool {
        self.ratings
            .iter()
            .any(|r| r.user_id == username && &r.chocolate_id == chocolate_id)
    }

    /// Whether `username` already rated the chocolate currently open for voting.
    pub fn has_voted_current(&self, username: &str) -> bool {
        self.current_chocolate()
            .is_some_and(|c| self.has_rated(username, &c.id))
    }

    /// Participants who still owe a rating for the current chocolate, in join order.
    pub fn pending_voters(&self) -> Vec<&str> {
        let Some(current) = self.current_chocolate() else {
            return Vec::new();
        };
        self.participants
            .iter()
            .filter(|p| !self.has_rated(p, &current.id))
            .map(String::as_str)
            .collect()
    }

    pub fn is_last_chocolate(&self) -> bool {
        !self.chocolates.is_empty() && self.current_chocolate_index == self.chocolates.len() - 1
    }

    /// True once the index sits on the last chocolate and every participant has rated it.
    pub fn is_voting_complete(&self) -> bool {
        self.is_last_chocolate() && self.pending_voters().is_empty()
    }

    pub fn phase(&self) -> LobbyPhase {
        if !self.is_voting_started {
            LobbyPhase::Lobby
        } else if self.is_voting_complete() {
            LobbyPhase::Results
        } else {
            LobbyPhase::Voting
        }
    }

    pub fn ratings_for(&self, chocolate_id: &ChocolateId) -> Vec<Rating> {
        self.ratings
            .iter()
            .filter(|r| &r.chocolate_id == chocolate_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_lobby_ids_use_uppercase_alphanumerics() {
        let id = LobbyId::generate();
        assert_eq!(id.as_str().len(), LOBBY_ID_LEN);
        assert!(id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn parses_typed_lobby_codes() {
        assert_eq!(LobbyId::parse("  ab12cd "), Some(LobbyId::from("AB12CD")));
        assert_eq!(LobbyId::parse("   "), None);
    }

    #[test]
    fn missing_ratings_field_reads_as_empty_list() {
        let raw = serde_json::json!({
            "id": "MIKASA",
            "host": "alice",
            "participants": ["alice"],
            "isVotingStarted": false,
            "currentChocolateIndex": 0,
            "chocolates": [{ "id": "1", "name": "Bitter" }],
            "version": 1
        });
        let lobby: Lobby = serde_json::from_value(raw).expect("lobby");
        assert!(lobby.ratings.is_empty());
    }

    #[test]
    fn lobby_serializes_with_camel_case_fields() {
        let lobby = Lobby {
            id: LobbyId::from("ABC123"),
            host: "alice".into(),
            participants: vec!["alice".into()],
            is_voting_started: true,
            current_chocolate_index: 0,
            chocolates: vec![Chocolate::new("1", "Bitter")],
            ratings: vec![Rating {
                user_id: "alice".into(),
                chocolate_id: ChocolateId::from("1"),
                score: 7,
            }],
            version: 3,
        };
        let value = serde_json::to_value(&lobby).expect("json");
        assert_eq!(value["isVotingStarted"], true);
        assert_eq!(value["currentChocolateIndex"], 0);
        assert_eq!(value["ratings"][0]["userId"], "alice");
        assert_eq!(value["ratings"][0]["chocolateId"], "1");
    }
}
