use character_db::{OwnerId, Severity, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no character loaded for owner {0}")]
    NotLoaded(OwnerId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CacheError {
    pub fn severity(&self) -> Severity {
        match self {
            CacheError::NotLoaded(_) => Severity::Warning,
            CacheError::Store(e) => e.severity(),
        }
    }
}
