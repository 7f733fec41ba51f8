use std::str::FromStr;

use shared::error::ErrorCode;

use crate::ClientError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Locale {
    En,
    #[default]
    Tr,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "tr" => Ok(Locale::Tr),
            other => Err(format!("unsupported locale '{other}' (expected en or tr)")),
        }
    }
}

/// What the user was trying to do when an error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyAction {
    Create,
    Join,
    StartVoting,
    SubmitRating,
    Load,
    Watch,
}

impl LobbyAction {
    fn context(self, locale: Locale) -> &'static str {
        match (locale, self) {
            (Locale::Tr, LobbyAction::Create) => "Lobi oluşturulurken hata",
            (Locale::Tr, LobbyAction::Join) => "Lobiye katılırken hata",
            (Locale::Tr, LobbyAction::StartVoting) => "Oylama başlatılırken hata",
            (Locale::Tr, LobbyAction::SubmitRating) => "Puan gönderilirken hata",
            (Locale::Tr, LobbyAction::Load) => "Lobi yüklenirken hata",
            (Locale::Tr, LobbyAction::Watch) => "Lobi takibinde hata",
            (Locale::En, LobbyAction::Create) => "Error creating lobby",
            (Locale::En, LobbyAction::Join) => "Error joining lobby",
            (Locale::En, LobbyAction::StartVoting) => "Error starting voting",
            (Locale::En, LobbyAction::SubmitRating) => "Error submitting rating",
            (Locale::En, LobbyAction::Load) => "Error loading lobby",
            (Locale::En, LobbyAction::Watch) => "Error watching lobby",
        }
    }
}

pub fn enter_username(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "Please enter a username",
        Locale::Tr => "Lütfen bir kullanıcı adı girin",
    }
}

pub fn enter_lobby_id(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "Please enter a lobby ID",
        Locale::Tr => "Lütfen bir lobi ID girin",
    }
}

pub fn lobby_not_found(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "Lobby not found",
        Locale::Tr => "Lobi bulunamadı",
    }
}

/// Composes the message shown for a failed action.
///
/// Not-found lobbies get the short catalog message instead of the server text.
pub fn action_error(locale: Locale, action: LobbyAction, err: &ClientError) -> String {
    match err {
        ClientError::Api(api) if api.code == ErrorCode::NotFound => {
            lobby_not_found(locale).to_string()
        }
        ClientError::EmptyLobbyId => enter_lobby_id(locale).to_string(),
        _ => format!("{}: {err}", action.context(locale)),
    }
}

/// Same as [`action_error`] for failures that arrive as plain text, such as
/// subscription errors.
pub fn action_error_text(locale: Locale, action: LobbyAction, detail: &str) -> String {
    format!("{}: {detail}", action.context(locale))
}

pub struct Labels {
    pub lobby: &'static str,
    pub host: &'static str,
    pub participants: &'static str,
    pub waiting_for_host: &'static str,
    pub now_rating: &'static str,
    pub waiting_for: &'static str,
    pub already_voted: &'static str,
    pub results: &'static str,
    pub voting_in_progress: &'static str,
    pub votes: &'static str,
}

pub fn labels(locale: Locale) -> Labels {
    match locale {
        Locale::En => Labels {
            lobby: "Lobby",
            host: "Host",
            participants: "Participants",
            waiting_for_host: "Waiting for the host to start voting",
            now_rating: "Now rating",
            waiting_for: "Waiting for",
            already_voted: "You have rated this chocolate",
            results: "Results",
            voting_in_progress: "Voting is still in progress",
            votes: "Votes",
        },
        Locale::Tr => Labels {
            lobby: "Lobi",
            host: "Host",
            participants: "Katılımcılar",
            waiting_for_host: "Hostun oylamayı başlatması bekleniyor",
            now_rating: "Şu an oylanan",
            waiting_for: "Beklenenler",
            already_voted: "Bu çikolatayı puanladınız",
            results: "Sonuçlar",
            voting_in_progress: "Oylama devam ediyor",
            votes: "Oylar",
        },
    }
}
