use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::OwnerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    InvalidIndex,
    PersistenceFailure,
    StaleResolution,
    Resolution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub retryable: bool,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("no collection owner {}", owner_id.0)]
    NotFound { owner_id: OwnerId },
    #[error("reorder index out of range: from {from}, to {to}, len {len}")]
    InvalidIndex { from: usize, to: usize, len: usize },
    #[error("failed to persist order for owner {}: {message}", owner_id.0)]
    PersistenceFailure { owner_id: OwnerId, message: String },
    #[error("resolution arrived after its view was torn down")]
    StaleResolution,
    #[error("item resolution failed: {0}")]
    Resolution(String),
}

impl CollectionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::InvalidIndex { .. } => ErrorCode::InvalidIndex,
            Self::PersistenceFailure { .. } => ErrorCode::PersistenceFailure,
            Self::StaleResolution => ErrorCode::StaleResolution,
            Self::Resolution(_) => ErrorCode::Resolution,
        }
    }

    /// Failed writes keep the optimistic order and may be re-issued.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PersistenceFailure { .. } | Self::Resolution(_))
    }
}

impl From<&CollectionError> for ApiError {
    fn from(value: &CollectionError) -> Self {
        Self {
            code: value.code(),
            message: value.to_string(),
            retryable: value.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_failure_maps_to_retryable_api_error() {
        let err = CollectionError::PersistenceFailure {
            owner_id: OwnerId(7),
            message: "disk full".into(),
        };
        let api: ApiError = (&err).into();
        assert_eq!(api.code, ErrorCode::PersistenceFailure);
        assert!(api.retryable);
        assert!(api.message.contains("owner 7"));
    }

    #[test]
    fn not_found_is_not_retryable() {
        let err = CollectionError::NotFound {
            owner_id: OwnerId(3),
        };
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(!err.is_retryable());
    }
}
