//! Lobby voting state machine.
//!
//! Every transition takes the last known snapshot and returns the next one to
//! persist. Nothing here touches storage; a rejected action returns a
//! [`LobbyError`] and the snapshot it was given stays valid.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Chocolate, ChocolateId, Lobby, LobbyId, Rating};

pub const MIN_SCORE: i64 = 0;
pub const MAX_SCORE: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyErrorKind {
    Validation,
    NotFound,
    Authorization,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("chocolate catalog must not be empty")]
    EmptyCatalog,
    #[error("lobby not found")]
    LobbyNotFound,
    #[error("voting has not started")]
    VotingNotStarted,
    #[error("score {0} is outside 0..=10")]
    ScoreOutOfRange(i64),
    #[error("{username} already rated chocolate {chocolate_id}")]
    DuplicateVote {
        username: String,
        chocolate_id: ChocolateId,
    },
    #[error("no chocolate at index {0}")]
    NoCurrentChocolate(usize),
    #[error("only the host can start voting (requested by {0})")]
    NotHost(String),
    #[error("{0} is not a participant of this lobby")]
    NotParticipant(String),
}

impl LobbyError {
    pub fn kind(&self) -> LobbyErrorKind {
        match self {
            LobbyError::LobbyNotFound => LobbyErrorKind::NotFound,
            LobbyError::NotHost(_) | LobbyError::NotParticipant(_) => {
                LobbyErrorKind::Authorization
            }
            _ => LobbyErrorKind::Validation,
        }
    }
}

pub fn normalize_username(raw: &str) -> Result<String, LobbyError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(LobbyError::EmptyUsername);
    }
    Ok(trimmed.to_string())
}

pub fn create(username: &str, catalog: &[Chocolate]) -> Result<Lobby, LobbyError> {
    create_with_id(LobbyId::generate(), username, catalog)
}

pub fn create_with_id(
    id: LobbyId,
    username: &str,
    catalog: &[Chocolate],
) -> Result<Lobby, LobbyError> {
    let host = normalize_username(username)?;
    if catalog.is_empty() {
        return Err(LobbyError::EmptyCatalog);
    }
    Ok(Lobby {
        id,
        participants: vec![host.clone()],
        host,
        is_voting_started: false,
        current_chocolate_index: 0,
        chocolates: catalog.to_vec(),
        ratings: Vec::new(),
        version: 1,
    })
}

/// Adds `username` to the participant list. Joining twice returns the lobby untouched.
pub fn join(lobby: Option<&Lobby>, username: &str) -> Result<Lobby, LobbyError> {
    let lobby = lobby.ok_or(LobbyError::LobbyNotFound)?;
    let username = normalize_username(username)?;
    if lobby.is_participant(&username) {
        return Ok(lobby.clone());
    }
    let mut next = lobby.clone();
    next.participants.push(username);
    next.version += 1;
    Ok(next)
}

pub fn start_voting(lobby: &Lobby, requesting_user: &str) -> Result<Lobby, LobbyError> {
    let requesting_user = normalize_username(requesting_user)?;
    if !lobby.is_host(&requesting_user) {
        return Err(LobbyError::NotHost(requesting_user));
    }
    if lobby.is_voting_started {
        return Ok(lobby.clone());
    }
    let mut next = lobby.clone();
    next.is_voting_started = true;
    next.version += 1;
    Ok(next)
}

/// Records `username`'s score for the current chocolate and moves the index
/// forward once nobody else owes a vote. The index saturates at the last chocolate.
pub fn submit_rating(lobby: &Lobby, username: &str, score: i64) -> Result<Lobby, LobbyError> {
    let username = normalize_username(username)?;
    if !lobby.is_voting_started {
        return Err(LobbyError::VotingNotStarted);
    }
    if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(LobbyError::ScoreOutOfRange(score));
    }
    let score = u8::try_from(score).map_err(|_| LobbyError::ScoreOutOfRange(score))?;
    let current = lobby
        .current_chocolate()
        .ok_or(LobbyError::NoCurrentChocolate(lobby.current_chocolate_index))?;
    if lobby.has_rated(&username, &current.id) {
        return Err(LobbyError::DuplicateVote {
            username,
            chocolate_id: current.id.clone(),
        });
    }
    if !lobby.is_participant(&username) {
        return Err(LobbyError::NotParticipant(username));
    }

    let others_pending = lobby
        .pending_voters()
        .into_iter()
        .any(|voter| voter != username);

    let mut next = lobby.clone();
    next.ratings.push(Rating {
        user_id: username,
        chocolate_id: current.id.clone(),
        score,
    });
    if !others_pending {
        let last = next.chocolates.len() - 1;
        next.current_chocolate_index = (next.current_chocolate_index + 1).min(last);
    }
    next.version += 1;
    Ok(next)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChocolateResult {
    pub chocolate_id: ChocolateId,
    pub name: String,
    /// Mean score with one decimal, e.g. `"8.0"`.
    pub average_score: String,
    pub ratings: Vec<Rating>,
}

/// Per-chocolate averages, best first. Equal averages keep catalog order.
pub fn calculate_results(lobby: &Lobby) -> Vec<ChocolateResult> {
    let mut scored: Vec<(u64, ChocolateResult)> = lobby
        .chocolates
        .iter()
        .map(|chocolate| {
            let ratings = lobby.ratings_for(&chocolate.id);
            let tenths = average_tenths(&ratings);
            (
                tenths,
                ChocolateResult {
                    chocolate_id: chocolate.id.clone(),
                    name: chocolate.name.clone(),
                    average_score: format!("{}.{}", tenths / 10, tenths % 10),
                    ratings,
                },
            )
        })
        .collect();
    // sort_by is stable
    scored.sort_by(|(a, _), (b, _)| b.cmp(a));
    scored.into_iter().map(|(_, result)| result).collect()
}

/// Mean in tenths, rounded like `Number.prototype.toFixed(1)` applied to the
/// `f64` mean. Zero ratings count as 0.
fn average_tenths(ratings: &[Rating]) -> u64 {
    if ratings.is_empty() {
        return 0;
    }
    let count = ratings.len() as u64;
    let sum: u64 = ratings.iter().map(|r| u64::from(r.score)).sum();
    let tenths = sum * 10 / count;
    let remainder = sum * 10 % count;
    match (remainder * 2).cmp(&count) {
        Ordering::Less => tenths,
        Ordering::Greater => tenths + 1,
        // Exactly halfway: the f64 mean decides which side it lands on.
        Ordering::Equal if f64_at_least(sum as f64 / count as f64, sum, count) => tenths + 1,
        Ordering::Equal => tenths,
    }
}

/// Exact `value >= num / den` for a finite, non-negative `value`.
fn f64_at_least(value: f64, num: u64, den: u64) -> bool {
    let bits = value.to_bits();
    let biased_exp = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & ((1u64 << 52) - 1);
    let (mantissa, exp) = if biased_exp == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u64 << 52), biased_exp - 1075)
    };
    // value = mantissa * 2^exp
    let lhs = u128::from(mantissa) * u128::from(den);
    let rhs = u128::from(num);
    if exp >= 0 {
        lhs.checked_shl(exp as u32).map_or(true, |l| l >= rhs)
    } else {
        rhs.checked_shl(exp.unsigned_abs())
            .map_or(false, |r| lhs >= r)
    }
}

#[cfg(test)]
#[path = "tests/lobby_tests.rs"]
mod tests;
