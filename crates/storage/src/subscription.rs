use shared::domain::{Lobby, LobbyId};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::StoreError;

/// Live view of one lobby document, fed by that lobby's own channel.
/// Dropping it unsubscribes.
///
/// The first `recv` yields the snapshot read at subscription time (`None` if
/// the lobby did not exist yet); later calls yield each committed version in
/// order. Errors are terminal: once `recv` fails, subscribe again.
pub struct LobbySubscription {
    lobby_id: LobbyId,
    initial: Option<Option<Lobby>>,
    last_version: Option<u64>,
    receiver: broadcast::Receiver<Lobby>,
}

impl LobbySubscription {
    pub(crate) fn new(
        lobby_id: LobbyId,
        initial: Option<Lobby>,
        receiver: broadcast::Receiver<Lobby>,
    ) -> Self {
        Self {
            lobby_id,
            initial: Some(initial),
            last_version: None,
            receiver,
        }
    }

    pub fn lobby_id(&self) -> &LobbyId {
        &self.lobby_id
    }

    pub async fn recv(&mut self) -> Result<Option<Lobby>, StoreError> {
        if let Some(initial) = self.initial.take() {
            self.last_version = initial.as_ref().map(|lobby| lobby.version);
            return Ok(initial);
        }

        loop {
            match self.receiver.recv().await {
                Ok(lobby) => {
                    // The initial read may already include a write that is still queued here.
                    if self.last_version.is_some_and(|seen| lobby.version <= seen) {
                        continue;
                    }
                    self.last_version = Some(lobby.version);
                    return Ok(Some(lobby));
                }
                Err(RecvError::Lagged(skipped)) => return Err(StoreError::Lagged(skipped)),
                Err(RecvError::Closed) => return Err(StoreError::Closed),
            }
        }
    }
}
