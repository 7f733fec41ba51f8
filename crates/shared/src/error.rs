use serde::{Deserialize, Serialize};

use crate::lobby::{LobbyError, LobbyErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    NotFound,
    Forbidden,
    Conflict,
    StoreUnavailable,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<LobbyError> for ApiError {
    fn from(value: LobbyError) -> Self {
        let code = match value.kind() {
            LobbyErrorKind::Validation => ErrorCode::Validation,
            LobbyErrorKind::NotFound => ErrorCode::NotFound,
            LobbyErrorKind::Authorization => ErrorCode::Forbidden,
        };
        Self::new(code, value.to_string())
    }
}
