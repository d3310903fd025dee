use std::fmt;
use std::io;

use thiserror::Error;

/// How loudly a swallowed failure is reported.
///
/// Callers that convert errors into boolean results keep this tag so the
/// classification survives without parsing log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Severe,
}

impl Severity {
    /// Emit `err` at the tracing level matching this severity.
    pub fn report(self, context: &str, err: &dyn fmt::Display) {
        match self {
            Severity::Info => tracing::info!(error = %err, "{}", context),
            Severity::Warning => tracing::warn!(error = %err, "{}", context),
            Severity::Severe => tracing::error!(error = %err, "{}", context),
        }
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration ledger error: {0}")]
    Ledger(#[from] rusqlite::Error),

    #[error("migration {name} failed: {source}")]
    Failed {
        name: String,
        #[source]
        source: rusqlite::Error,
    },
}

impl MigrationError {
    pub fn severity(&self) -> Severity {
        Severity::Severe
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database is not connected")]
    NotConnected,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("character not found: {0}")]
    CharacterNotFound(i64),

    #[error("character {name} already exists for owner {owner}")]
    DuplicateCharacter { owner: String, name: String },

    #[error("constraint violated: {0}")]
    Constraint(String),
}

impl StoreError {
    /// Connectivity and schema problems are severe; single-row misses and
    /// constraint violations are recoverable warnings.
    pub fn severity(&self) -> Severity {
        match self {
            StoreError::NotConnected | StoreError::Io(_) => Severity::Severe,
            StoreError::Migration(e) => e.severity(),
            StoreError::Database(_) => Severity::Severe,
            StoreError::CharacterNotFound(_)
            | StoreError::DuplicateCharacter { .. }
            | StoreError::Constraint(_) => Severity::Warning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_classification() {
        assert_eq!(StoreError::NotConnected.severity(), Severity::Severe);
        assert_eq!(StoreError::CharacterNotFound(7).severity(), Severity::Warning);
        let dup = StoreError::DuplicateCharacter {
            owner: "o".into(),
            name: "n".into(),
        };
        assert_eq!(dup.severity(), Severity::Warning);
        assert_eq!(
            StoreError::Constraint("CHECK constraint failed: level >= 1".into()).severity(),
            Severity::Warning
        );
        let mig = StoreError::from(MigrationError::Ledger(
            rusqlite::Error::QueryReturnedNoRows,
        ));
        assert_eq!(mig.severity(), Severity::Severe);
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Severe);
    }
}
