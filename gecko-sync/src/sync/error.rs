use std::time::Duration;

use thiserror::Error;

use gecko_common::error::{ErrorCategory, ErrorClassification};

use super::SyncEntity;
use crate::provider::ProviderError;
use crate::storage::RepositoryError;

/// Sync errors
///
/// Single-request resources report page 1.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to fetch {entity} page {page}: {source}")]
    Fetch {
        entity: SyncEntity,
        page: u32,
        #[source]
        source: ProviderError,
    },

    #[error("Failed to store {entity} page {page}: {source}")]
    Store {
        entity: SyncEntity,
        page: u32,
        #[source]
        source: RepositoryError,
    },

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("{entity} sync exceeded its {limit:?} deadline before page {page}")]
    DeadlineExceeded {
        entity: SyncEntity,
        page: u32,
        limit: Duration,
    },

    #[error("Empty response for {0}")]
    EmptyResponse(SyncEntity),

    #[error("Coin not found: {0}")]
    CoinNotFound(String),
}

impl SyncError {
    pub fn entity(&self) -> Option<SyncEntity> {
        match self {
            SyncError::Fetch { entity, .. }
            | SyncError::Store { entity, .. }
            | SyncError::DeadlineExceeded { entity, .. }
            | SyncError::EmptyResponse(entity) => Some(*entity),
            SyncError::Repository(_) => None,
            SyncError::CoinNotFound(_) => Some(SyncEntity::MarketData),
        }
    }
}

impl ErrorClassification for SyncError {
    fn category(&self) -> ErrorCategory {
        match self {
            SyncError::Fetch { source, .. } => source.category(),
            SyncError::Store { source, .. } => source.category(),
            SyncError::Repository(source) => source.category(),
            SyncError::DeadlineExceeded { .. } => ErrorCategory::Transient,
            SyncError::EmptyResponse(_) => ErrorCategory::Transient,
            SyncError::CoinNotFound(_) => ErrorCategory::Permanent,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
