pub mod character;
pub mod db;
pub mod error;
pub mod migration;
pub mod schema;
pub mod store;

pub use character::{now_millis, Character, CharacterRepo, Location, OwnerId};
pub use db::{CharacterDb, DatabaseConfig};
pub use error::{MigrationError, Severity, StoreError};
pub use migration::{AppliedMigration, Migration, MigrationReport, MigrationRunner, RollbackOutcome};
pub use store::CharacterStore;
