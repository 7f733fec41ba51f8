use std::fmt::Write as _;

use shared::{
    domain::{Chocolate, Lobby, LobbyId, LobbyPhase},
    lobby::{calculate_results, ChocolateResult},
    protocol::LobbyResults,
};

use crate::{
    messages::{self, action_error, action_error_text, Labels, LobbyAction, Locale},
    ClientError, ClientEvent,
};

/// Client-side state for one user: the last good snapshot and the latest error.
#[derive(Debug, Clone)]
pub struct LobbySession {
    username: String,
    locale: Locale,
    lobby: Option<Lobby>,
    last_error: Option<String>,
}

/// Everything a front end needs to draw the current screen.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub phase: Option<LobbyPhase>,
    pub lobby_id: Option<LobbyId>,
    pub host: Option<String>,
    pub participants: Vec<String>,
    pub is_host: bool,
    pub current_chocolate: Option<Chocolate>,
    /// 1-based position of the current chocolate and the catalog length.
    pub progress: Option<(usize, usize)>,
    pub pending_voters: Vec<String>,
    pub has_voted: bool,
    pub results: Vec<ChocolateResult>,
    pub error: Option<String>,
}

impl LobbySession {
    pub fn new(username: impl Into<String>, locale: Locale) -> Self {
        Self {
            username: username.into().trim().to_string(),
            locale,
            lobby: None,
            last_error: None,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn lobby(&self) -> Option<&Lobby> {
        self.lobby.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Replaces the cached snapshot. Absent snapshots and versions older than
    /// the cached one for the same lobby are ignored. Returns whether the cache
    /// changed.
    pub fn apply_snapshot(&mut self, snapshot: Option<Lobby>) -> bool {
        let Some(next) = snapshot else {
            return false;
        };
        if let Some(current) = &self.lobby {
            if current.id == next.id && current.version > next.version {
                return false;
            }
        }
        self.lobby = Some(next);
        true
    }

    pub fn apply_event(&mut self, event: ClientEvent) -> bool {
        match event {
            ClientEvent::Snapshot(snapshot) => self.apply_snapshot(snapshot),
            ClientEvent::Error(detail) => {
                self.last_error = Some(action_error_text(self.locale, LobbyAction::Watch, &detail));
                true
            }
            ClientEvent::Closed => false,
        }
    }

    pub fn record_error(&mut self, action: LobbyAction, err: &ClientError) {
        self.last_error = Some(action_error(self.locale, action, err));
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Folds the outcome of a lobby-changing request into the session.
    pub fn record_outcome(
        &mut self,
        action: LobbyAction,
        outcome: Result<Lobby, ClientError>,
    ) -> Result<(), ClientError> {
        match outcome {
            Ok(lobby) => {
                self.clear_error();
                self.apply_snapshot(Some(lobby));
                Ok(())
            }
            Err(err) => {
                self.record_error(action, &err);
                Err(err)
            }
        }
    }

    /// Checks the username before any request is sent.
    pub fn require_username(&mut self) -> bool {
        if self.username.is_empty() {
            self.last_error = Some(messages::enter_username(self.locale).to_string());
            return false;
        }
        true
    }

    pub fn view(&self) -> SessionView {
        let Some(lobby) = &self.lobby else {
            return SessionView {
                phase: None,
                lobby_id: None,
                host: None,
                participants: Vec::new(),
                is_host: false,
                current_chocolate: None,
                progress: None,
                pending_voters: Vec::new(),
                has_voted: false,
                results: Vec::new(),
                error: self.last_error.clone(),
            };
        };

        let phase = lobby.phase();
        let voting = phase == LobbyPhase::Voting;
        SessionView {
            phase: Some(phase),
            lobby_id: Some(lobby.id.clone()),
            host: Some(lobby.host.clone()),
            participants: lobby.participants.clone(),
            is_host: lobby.is_host(&self.username),
            current_chocolate: voting.then(|| lobby.current_chocolate().cloned()).flatten(),
            progress: voting
                .then_some((lobby.current_chocolate_index + 1, lobby.chocolates.len())),
            pending_voters: if voting {
                lobby.pending_voters().into_iter().map(str::to_string).collect()
            } else {
                Vec::new()
            },
            has_voted: voting && lobby.has_voted_current(&self.username),
            results: if phase == LobbyPhase::Results {
                calculate_results(lobby)
            } else {
                Vec::new()
            },
            error: self.last_error.clone(),
        }
    }
}

impl SessionView {
    pub fn render(&self, locale: Locale) -> String {
        let labels = messages::labels(locale);
        let mut out = String::new();

        if let Some(lobby_id) = &self.lobby_id {
            let _ = writeln!(out, "{}: {lobby_id}", labels.lobby);
        }
        if let Some(host) = &self.host {
            let _ = writeln!(out, "{}: {host}", labels.host);
            let _ = writeln!(out, "{}: {}", labels.participants, self.participants.join(", "));
        }

        match self.phase {
            Some(LobbyPhase::Lobby) => {
                let _ = writeln!(out, "{}", labels.waiting_for_host);
            }
            Some(LobbyPhase::Voting) => {
                if let (Some(chocolate), Some((position, total))) =
                    (&self.current_chocolate, self.progress)
                {
                    let _ = writeln!(
                        out,
                        "{} ({position}/{total}): {}",
                        labels.now_rating, chocolate.name
                    );
                }
                if self.has_voted {
                    let _ = writeln!(out, "{}", labels.already_voted);
                }
                if !self.pending_voters.is_empty() {
                    let _ = writeln!(
                        out,
                        "{}: {}",
                        labels.waiting_for,
                        self.pending_voters.join(", ")
                    );
                }
            }
            Some(LobbyPhase::Results) => {
                let _ = writeln!(out, "{}", labels.results);
                write_results(&mut out, &self.results, &labels);
            }
            None => {}
        }

        if let Some(error) = &self.error {
            let _ = writeln!(out, "! {error}");
        }
        out
    }
}

/// Text form of a results response; partial results are flagged as such.
pub fn render_results(results: &LobbyResults, locale: Locale) -> String {
    let labels = messages::labels(locale);
    let mut out = String::new();
    if !results.is_voting_complete {
        let _ = writeln!(out, "{}", labels.voting_in_progress);
    }
    let _ = writeln!(out, "{}", labels.results);
    write_results(&mut out, &results.results, &labels);
    out
}

fn write_results(out: &mut String, results: &[ChocolateResult], labels: &Labels) {
    for (rank, result) in results.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {}: {}/10",
            rank + 1,
            result.name,
            result.average_score
        );
        if result.ratings.is_empty() {
            continue;
        }
        let _ = writeln!(out, "   {}:", labels.votes);
        for rating in &result.ratings {
            let _ = writeln!(out, "   - {}: {}/10", rating.user_id, rating.score);
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
