use rusqlite::Connection;

use crate::character::now_millis;
use crate::error::MigrationError;
use crate::schema;

/// A reversible schema-change unit, identified in the ledger by its name.
pub trait Migration: Send + Sync {
    fn name(&self) -> &'static str;
    fn up(&self, conn: &Connection) -> rusqlite::Result<()>;
    fn down(&self, conn: &Connection) -> rusqlite::Result<()>;
}

/// A ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub name: String,
    pub executed_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<&'static str>,
    pub skipped: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    RolledBack(&'static str),
    NotApplied(&'static str),
    NothingRegistered,
}

/// Applies registered migrations in order, at most once each.
pub struct MigrationRunner<'a> {
    conn: &'a Connection,
    migrations: Vec<Box<dyn Migration>>,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            migrations: Vec::new(),
        }
    }

    /// Runner with the built-in character schema registered.
    pub fn with_defaults(conn: &'a Connection) -> Self {
        let mut runner = Self::new(conn);
        for migration in schema::default_migrations() {
            runner.register(migration);
        }
        runner
    }

    pub fn register(&mut self, migration: Box<dyn Migration>) {
        self.migrations.push(migration);
    }

    pub fn registered(&self) -> Vec<&'static str> {
        self.migrations.iter().map(|m| m.name()).collect()
    }

    fn create_ledger(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS migrations (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL UNIQUE,
                executed_at INTEGER NOT NULL
            );
            ",
        )
    }

    pub fn is_applied(&self, name: &str) -> Result<bool, MigrationError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM migrations WHERE name = ?1",
            rusqlite::params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Run every pending migration. The first failure stops the run; units
    /// applied before it stay applied.
    pub fn run_migrations(&self) -> Result<MigrationReport, MigrationError> {
        self.create_ledger()?;

        let mut report = MigrationReport::default();
        for migration in &self.migrations {
            let name = migration.name();
            if self.is_applied(name)? {
                tracing::info!(migration = name, "Migration already executed");
                report.skipped.push(name);
                continue;
            }

            tracing::info!(migration = name, "Running migration");
            if let Err(source) = self.apply(migration.as_ref()) {
                tracing::error!(migration = name, error = %source, "Error running migration");
                return Err(MigrationError::Failed {
                    name: name.to_string(),
                    source,
                });
            }
            tracing::info!(migration = name, "Migration completed");
            report.applied.push(name);
        }

        tracing::info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "All migrations completed successfully"
        );
        Ok(report)
    }

    // Schema change and ledger row commit together.
    fn apply(&self, migration: &dyn Migration) -> rusqlite::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        migration.up(&tx)?;
        tx.execute(
            "INSERT INTO migrations (name, executed_at) VALUES (?1, ?2)",
            rusqlite::params![migration.name(), now_millis()],
        )?;
        tx.commit()
    }

    /// Revert the most recently registered migration if the ledger has it.
    pub fn rollback_last(&self) -> Result<RollbackOutcome, MigrationError> {
        let Some(last) = self.migrations.last() else {
            tracing::warn!("No migrations to rollback");
            return Ok(RollbackOutcome::NothingRegistered);
        };
        let name = last.name();

        self.create_ledger()?;
        if !self.is_applied(name)? {
            tracing::warn!(migration = name, "Migration not executed, nothing to roll back");
            return Ok(RollbackOutcome::NotApplied(name));
        }

        tracing::info!(migration = name, "Rolling back migration");
        let revert = || -> rusqlite::Result<()> {
            let tx = self.conn.unchecked_transaction()?;
            last.down(&tx)?;
            tx.execute(
                "DELETE FROM migrations WHERE name = ?1",
                rusqlite::params![name],
            )?;
            tx.commit()
        };
        if let Err(source) = revert() {
            tracing::error!(migration = name, error = %source, "Error rolling back migration");
            return Err(MigrationError::Failed {
                name: name.to_string(),
                source,
            });
        }

        tracing::info!(migration = name, "Rollback completed");
        Ok(RollbackOutcome::RolledBack(name))
    }

    /// Ledger contents in execution order.
    pub fn applied(&self) -> Result<Vec<AppliedMigration>, MigrationError> {
        self.create_ledger()?;
        let mut stmt = self
            .conn
            .prepare("SELECT name, executed_at FROM migrations ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AppliedMigration {
                    name: row.get(0)?,
                    executed_at: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CreateWidgets;
    impl Migration for CreateWidgets {
        fn name(&self) -> &'static str {
            "CreateWidgets"
        }
        fn up(&self, conn: &Connection) -> rusqlite::Result<()> {
            conn.execute_batch("CREATE TABLE widgets (id INTEGER PRIMARY KEY);")
        }
        fn down(&self, conn: &Connection) -> rusqlite::Result<()> {
            conn.execute_batch("DROP TABLE IF EXISTS widgets;")
        }
    }

    struct Broken;
    impl Migration for Broken {
        fn name(&self) -> &'static str {
            "Broken"
        }
        fn up(&self, conn: &Connection) -> rusqlite::Result<()> {
            conn.execute_batch("CREATE TABLE oops (")
        }
        fn down(&self, _conn: &Connection) -> rusqlite::Result<()> {
            Ok(())
        }
    }

    struct AddGadgets;
    impl Migration for AddGadgets {
        fn name(&self) -> &'static str {
            "AddGadgets"
        }
        fn up(&self, conn: &Connection) -> rusqlite::Result<()> {
            conn.execute_batch("CREATE TABLE gadgets (id INTEGER PRIMARY KEY);")
        }
        fn down(&self, conn: &Connection) -> rusqlite::Result<()> {
            conn.execute_batch("DROP TABLE IF EXISTS gadgets;")
        }
    }

    // Name containing a quote would break a concatenated query.
    struct QuotedName;
    impl Migration for QuotedName {
        fn name(&self) -> &'static str {
            "Robert'); DROP TABLE migrations;--"
        }
        fn up(&self, _conn: &Connection) -> rusqlite::Result<()> {
            Ok(())
        }
        fn down(&self, _conn: &Connection) -> rusqlite::Result<()> {
            Ok(())
        }
    }

    fn table_exists(conn: &Connection, table: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            rusqlite::params![table],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            > 0
    }

    #[test]
    fn runs_in_order_and_records_ledger() {
        let conn = Connection::open_in_memory().unwrap();
        let mut runner = MigrationRunner::new(&conn);
        runner.register(Box::new(CreateWidgets));
        runner.register(Box::new(AddGadgets));

        let report = runner.run_migrations().unwrap();
        assert_eq!(report.applied, vec!["CreateWidgets", "AddGadgets"]);
        assert!(report.skipped.is_empty());

        let ledger = runner.applied().unwrap();
        let names: Vec<_> = ledger.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["CreateWidgets", "AddGadgets"]);
        assert!(ledger.iter().all(|m| m.executed_at > 0));
        assert!(table_exists(&conn, "widgets"));
        assert!(table_exists(&conn, "gadgets"));
    }

    #[test]
    fn second_run_skips_everything() {
        let conn = Connection::open_in_memory().unwrap();
        let mut runner = MigrationRunner::new(&conn);
        runner.register(Box::new(CreateWidgets));

        runner.run_migrations().unwrap();
        let report = runner.run_migrations().unwrap();
        assert!(report.applied.is_empty());
        assert_eq!(report.skipped, vec!["CreateWidgets"]);
        assert_eq!(runner.applied().unwrap().len(), 1);
    }

    #[test]
    fn failure_stops_run_and_keeps_earlier_units() {
        let conn = Connection::open_in_memory().unwrap();
        let mut runner = MigrationRunner::new(&conn);
        runner.register(Box::new(CreateWidgets));
        runner.register(Box::new(Broken));
        runner.register(Box::new(AddGadgets));

        let err = runner.run_migrations().unwrap_err();
        assert!(matches!(err, MigrationError::Failed { ref name, .. } if name == "Broken"));

        assert!(table_exists(&conn, "widgets"));
        assert!(!table_exists(&conn, "gadgets"));
        let names: Vec<_> = runner.applied().unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["CreateWidgets".to_string()]);
    }

    #[test]
    fn rollback_last_reverts_and_forgets() {
        let conn = Connection::open_in_memory().unwrap();
        let mut runner = MigrationRunner::new(&conn);
        runner.register(Box::new(CreateWidgets));
        runner.register(Box::new(AddGadgets));
        runner.run_migrations().unwrap();

        assert_eq!(
            runner.rollback_last().unwrap(),
            RollbackOutcome::RolledBack("AddGadgets")
        );
        assert!(!table_exists(&conn, "gadgets"));
        assert!(table_exists(&conn, "widgets"));
        assert!(!runner.is_applied("AddGadgets").unwrap());

        // Second rollback targets the same (now unapplied) unit.
        assert_eq!(
            runner.rollback_last().unwrap(),
            RollbackOutcome::NotApplied("AddGadgets")
        );

        // Re-running re-applies only the rolled back unit.
        let report = runner.run_migrations().unwrap();
        assert_eq!(report.applied, vec!["AddGadgets"]);
        assert_eq!(report.skipped, vec!["CreateWidgets"]);
    }

    #[test]
    fn rollback_with_nothing_registered() {
        let conn = Connection::open_in_memory().unwrap();
        let runner = MigrationRunner::new(&conn);
        assert_eq!(
            runner.rollback_last().unwrap(),
            RollbackOutcome::NothingRegistered
        );
    }

    #[test]
    fn ledger_names_are_bound_not_spliced() {
        let conn = Connection::open_in_memory().unwrap();
        let mut runner = MigrationRunner::new(&conn);
        runner.register(Box::new(QuotedName));

        runner.run_migrations().unwrap();
        assert!(table_exists(&conn, "migrations"));
        assert!(runner.is_applied("Robert'); DROP TABLE migrations;--").unwrap());

        let report = runner.run_migrations().unwrap();
        assert_eq!(report.skipped.len(), 1);
    }

    #[test]
    fn default_runner_registers_character_schema() {
        let conn = Connection::open_in_memory().unwrap();
        let runner = MigrationRunner::with_defaults(&conn);
        assert_eq!(
            runner.registered(),
            vec!["CreateCharacterTable", "CreateCharacterOwnerIndex"]
        );
        runner.run_migrations().unwrap();
        assert!(table_exists(&conn, "characters"));
    }
}
