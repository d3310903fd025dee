use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::Connection;

use crate::character::{Character, CharacterRepo, OwnerId};
use crate::error::StoreError;
use crate::migration::{AppliedMigration, MigrationReport, MigrationRunner, RollbackOutcome};
use crate::store::CharacterStore;

/// Where and how to open the character database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub path: String,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/characters.db".to_string(),
            busy_timeout_ms: 5000,
        }
    }
}

/// Shared handle over a single SQLite connection.
///
/// Statements are serialized through one lock; the handle can be closed
/// once and every later call fails with [`StoreError::NotConnected`].
pub struct CharacterDb {
    conn: Mutex<Option<Connection>>,
    fully_migrated: AtomicBool,
}

impl CharacterDb {
    /// Open (or create) the database file and bring its schema up to date.
    ///
    /// Only a failure to open or configure the file is an error. A failed
    /// migration is logged and the handle is returned partially migrated;
    /// check [`CharacterDb::is_fully_migrated`].
    pub fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %config.path, "Connecting to character database");
        let conn = Connection::open(&config.path).map_err(|e| {
            tracing::error!(path = %config.path, error = %e, "Failed to open character database");
            e
        })?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let db = Self::from_connection(conn);
        if db.migrate_on_connect() {
            tracing::info!(path = %config.path, "Character database ready");
        }
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Self::from_connection(conn);
        db.migrate_on_connect();
        Ok(db)
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
            fully_migrated: AtomicBool::new(false),
        }
    }

    fn migrate_on_connect(&self) -> bool {
        match self.run_migrations() {
            Ok(_) => true,
            Err(e) => {
                e.severity()
                    .report("Schema migration failed; store left partially migrated", &e);
                false
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the live connection.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::NotConnected)?;
        f(conn)
    }

    pub fn run_migrations(&self) -> Result<MigrationReport, StoreError> {
        let result =
            self.with_conn(|conn| Ok(MigrationRunner::with_defaults(conn).run_migrations()?));
        self.fully_migrated.store(result.is_ok(), Ordering::SeqCst);
        result
    }

    pub fn rollback_last_migration(&self) -> Result<RollbackOutcome, StoreError> {
        let outcome =
            self.with_conn(|conn| Ok(MigrationRunner::with_defaults(conn).rollback_last()?))?;
        if matches!(outcome, RollbackOutcome::RolledBack(_)) {
            self.fully_migrated.store(false, Ordering::SeqCst);
        }
        Ok(outcome)
    }

    /// Whether the last migration run applied every registered unit.
    pub fn is_fully_migrated(&self) -> bool {
        self.fully_migrated.load(Ordering::SeqCst)
    }

    pub fn applied_migrations(&self) -> Result<Vec<AppliedMigration>, StoreError> {
        self.with_conn(|conn| Ok(MigrationRunner::with_defaults(conn).applied()?))
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    /// Close the connection. Safe to call more than once.
    pub fn disconnect(&self) {
        let Some(conn) = self.lock().take() else {
            return;
        };
        match conn.close() {
            Ok(()) => tracing::info!("Disconnected from character database"),
            Err((_, e)) => {
                tracing::error!(error = %e, "Error closing character database connection")
            }
        }
    }

    /// Load a character by ID.
    pub fn load(&self, id: i64) -> Result<Character, StoreError> {
        self.with_conn(|conn| CharacterRepo::new(conn).load(id))
    }

    pub fn count_for_owner(&self, owner_id: OwnerId) -> Result<usize, StoreError> {
        self.with_conn(|conn| CharacterRepo::new(conn).count_for_owner(owner_id))
    }

    fn logged<T>(&self, op: &str, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if let Err(e) = &result {
            e.severity().report(&format!("character store {op} failed"), e);
        }
        result
    }
}

impl CharacterStore for CharacterDb {
    fn insert(&self, character: &mut Character) -> Result<i64, StoreError> {
        let result = self.with_conn(|conn| CharacterRepo::new(conn).insert(character));
        if let Ok(id) = result {
            tracing::info!(id, owner = %character.owner_id, name = %character.name, "Character saved");
        }
        self.logged("insert", result)
    }

    fn update_by_id(&self, character: &Character) -> Result<(), StoreError> {
        let result = self.with_conn(|conn| CharacterRepo::new(conn).update_by_id(character));
        if result.is_ok() {
            tracing::debug!(id = character.id, name = %character.name, "Character updated");
        }
        self.logged("update", result)
    }

    fn find_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Character>, StoreError> {
        let result = self.with_conn(|conn| CharacterRepo::new(conn).find_by_owner(owner_id));
        self.logged("find_by_owner", result)
    }

    fn find_by_owner_and_name(
        &self,
        owner_id: OwnerId,
        name: &str,
    ) -> Result<Option<Character>, StoreError> {
        let result = self
            .with_conn(|conn| CharacterRepo::new(conn).find_by_owner_and_name(owner_id, name));
        self.logged("find_by_owner_and_name", result)
    }

    fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = self.with_conn(|conn| CharacterRepo::new(conn).delete(id));
        if result.is_ok() {
            tracing::info!(id, "Character deleted");
        }
        self.logged("delete", result)
    }
}
