use std::sync::Arc;

use shared::{
    domain::{Chocolate, Lobby, LobbyId},
    error::{ApiError, ErrorCode},
    lobby::{self, normalize_username, LobbyError},
    protocol::LobbyResults,
};
use storage::{LobbyStore, LobbySubscription, StoreError};
use tracing::{error, info, warn};

/// Fresh ids are random; a collision with an existing lobby just draws again.
const CREATE_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct ApiContext {
    pub store: Arc<dyn LobbyStore>,
    pub catalog: Arc<Vec<Chocolate>>,
}

impl ApiContext {
    pub fn new(store: Arc<dyn LobbyStore>, catalog: Vec<Chocolate>) -> Self {
        Self {
            store,
            catalog: Arc::new(catalog),
        }
    }
}

pub fn parse_lobby_id(raw: &str) -> Result<LobbyId, ApiError> {
    LobbyId::parse(raw)
        .ok_or_else(|| ApiError::new(ErrorCode::Validation, "lobby id must not be empty"))
}

pub async fn create_lobby(ctx: &ApiContext, username: &str) -> Result<Lobby, ApiError> {
    for _ in 0..CREATE_ATTEMPTS {
        let lobby = lobby::create(username, &ctx.catalog)?;
        match ctx.store.write_lobby(&lobby, None).await {
            Ok(()) => {
                info!(lobby_id = %lobby.id, host = %lobby.host, "lobby created");
                return Ok(lobby);
            }
            Err(StoreError::Conflict { lobby_id, .. }) => {
                warn!(%lobby_id, "generated lobby id already taken; drawing another");
            }
            Err(err) => return Err(store_error(err)),
        }
    }
    Err(ApiError::new(
        ErrorCode::Internal,
        "could not allocate a free lobby id",
    ))
}

pub async fn get_lobby(ctx: &ApiContext, raw_lobby_id: &str) -> Result<Lobby, ApiError> {
    let lobby_id = parse_lobby_id(raw_lobby_id)?;
    load(ctx, &lobby_id).await
}

pub async fn join_lobby(
    ctx: &ApiContext,
    raw_lobby_id: &str,
    username: &str,
) -> Result<Lobby, ApiError> {
    let username = normalize_username(username)?;
    let lobby_id = parse_lobby_id(raw_lobby_id)?;
    let snapshot = ctx
        .store
        .read_lobby(&lobby_id)
        .await
        .map_err(store_error)?;
    let next = lobby::join(snapshot.as_ref(), &username)?;
    if let Some(base) = snapshot {
        commit(ctx, &base, &next).await?;
    }
    info!(%lobby_id, %username, version = next.version, "participant joined");
    Ok(next)
}

pub async fn start_voting(
    ctx: &ApiContext,
    raw_lobby_id: &str,
    username: &str,
) -> Result<Lobby, ApiError> {
    let lobby_id = parse_lobby_id(raw_lobby_id)?;
    let base = load(ctx, &lobby_id).await?;
    let next = lobby::start_voting(&base, username)?;
    commit(ctx, &base, &next).await?;
    info!(%lobby_id, version = next.version, "voting started");
    Ok(next)
}

pub async fn submit_rating(
    ctx: &ApiContext,
    raw_lobby_id: &str,
    username: &str,
    score: i64,
) -> Result<Lobby, ApiError> {
    let lobby_id = parse_lobby_id(raw_lobby_id)?;
    let base = load(ctx, &lobby_id).await?;
    let next = lobby::submit_rating(&base, username, score)?;
    commit(ctx, &base, &next).await?;
    info!(
        %lobby_id,
        username = username.trim(),
        score,
        index = next.current_chocolate_index,
        version = next.version,
        "rating submitted"
    );
    Ok(next)
}

pub async fn lobby_results(
    ctx: &ApiContext,
    raw_lobby_id: &str,
) -> Result<LobbyResults, ApiError> {
    let lobby = get_lobby(ctx, raw_lobby_id).await?;
    Ok(LobbyResults::for_lobby(&lobby))
}

pub async fn subscribe_lobby(
    ctx: &ApiContext,
    raw_lobby_id: &str,
) -> Result<LobbySubscription, ApiError> {
    let lobby_id = parse_lobby_id(raw_lobby_id)?;
    ctx.store.subscribe(&lobby_id).await.map_err(store_error)
}

pub async fn health(ctx: &ApiContext) -> Result<(), ApiError> {
    ctx.store.health_check().await.map_err(store_error)
}

pub fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::Conflict { .. } => {
            warn!(error = %err, "rejected stale lobby write");
            ApiError::new(
                ErrorCode::Conflict,
                format!("{err}; reload the lobby and try again"),
            )
        }
        StoreError::Missing(_) => ApiError::from(LobbyError::LobbyNotFound),
        StoreError::Serialization(_) => {
            error!(error = %err, "lobby document could not be encoded");
            ApiError::new(ErrorCode::Internal, err.to_string())
        }
        StoreError::Database(_) | StoreError::Lagged(_) | StoreError::Closed => {
            error!(error = %err, "lobby store failure");
            ApiError::new(ErrorCode::StoreUnavailable, err.to_string())
        }
    }
}

async fn load(ctx: &ApiContext, lobby_id: &LobbyId) -> Result<Lobby, ApiError> {
    ctx.store
        .read_lobby(lobby_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| LobbyError::LobbyNotFound.into())
}

/// Persists `next` on top of `base`. Unchanged documents are not rewritten.
async fn commit(ctx: &ApiContext, base: &Lobby, next: &Lobby) -> Result<(), ApiError> {
    if next.version == base.version {
        return Ok(());
    }
    ctx.store
        .write_lobby(next, Some(base.version))
        .await
        .map_err(store_error)
}
