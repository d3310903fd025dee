use rusqlite::Connection;

use crate::migration::Migration;

/// Built-in migrations in application order.
pub fn default_migrations() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(CreateCharacterTable),
        Box::new(CreateCharacterOwnerIndex),
    ]
}

pub struct CreateCharacterTable;

impl Migration for CreateCharacterTable {
    fn name(&self) -> &'static str {
        "CreateCharacterTable"
    }

    fn up(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS characters (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id    TEXT NOT NULL,
                name        TEXT NOT NULL,
                level       INTEGER NOT NULL DEFAULT 1 CHECK (level >= 1),
                class       TEXT NOT NULL DEFAULT 'Adventurer',
                experience  INTEGER NOT NULL DEFAULT 0 CHECK (experience >= 0),
                health      INTEGER NOT NULL DEFAULT 100,
                max_health  INTEGER NOT NULL DEFAULT 100,
                mana        INTEGER NOT NULL DEFAULT 100,
                max_mana    INTEGER NOT NULL DEFAULT 100,
                pos_x       REAL NOT NULL DEFAULT 0.0,
                pos_y       REAL NOT NULL DEFAULT 0.0,
                pos_z       REAL NOT NULL DEFAULT 0.0,
                world       TEXT NOT NULL DEFAULT '',
                created_at  INTEGER NOT NULL,
                last_played INTEGER NOT NULL,
                UNIQUE (owner_id, name)
            );
            ",
        )
    }

    fn down(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch("DROP TABLE IF EXISTS characters;")
    }
}

pub struct CreateCharacterOwnerIndex;

impl Migration for CreateCharacterOwnerIndex {
    fn name(&self) -> &'static str {
        "CreateCharacterOwnerIndex"
    }

    fn up(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_characters_owner_id ON characters(owner_id);",
        )
    }

    fn down(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch("DROP INDEX IF EXISTS idx_characters_owner_id;")
    }
}
