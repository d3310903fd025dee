use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, Row};
use uuid::Uuid;

use crate::error::StoreError;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Stable identity of a player across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(pub Uuid);

impl OwnerId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OwnerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for OwnerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// A point in a named world.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub world: String,
}

impl Location {
    pub fn new(x: f64, y: f64, z: f64, world: impl Into<String>) -> Self {
        Self {
            x,
            y,
            z,
            world: world.into(),
        }
    }
}

/// A player character, one row per (owner, name).
#[derive(Debug, Clone, PartialEq)]
pub struct Character {
    /// Store-assigned key; 0 until first persisted.
    pub id: i64,
    pub owner_id: OwnerId,
    pub name: String,
    pub level: i32,
    pub class: String,
    pub experience: i64,
    pub health: i32,
    pub max_health: i32,
    pub mana: i32,
    pub max_mana: i32,
    pub pos_x: f64,
    pub pos_y: f64,
    pub pos_z: f64,
    pub world: String,
    pub created_at: i64,
    pub last_played: i64,
}

impl Character {
    pub const DEFAULT_CLASS: &'static str = "Adventurer";
    pub const DEFAULT_VITAL: i32 = 100;

    /// A fresh, unpersisted character with default progression and vitals.
    pub fn new(owner_id: OwnerId, name: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: 0,
            owner_id,
            name: name.into(),
            level: 1,
            class: Self::DEFAULT_CLASS.to_string(),
            experience: 0,
            health: Self::DEFAULT_VITAL,
            max_health: Self::DEFAULT_VITAL,
            mana: Self::DEFAULT_VITAL,
            max_mana: Self::DEFAULT_VITAL,
            pos_x: 0.0,
            pos_y: 0.0,
            pos_z: 0.0,
            world: String::new(),
            created_at: now,
            last_played: now,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id > 0
    }

    pub fn location(&self) -> Location {
        Location::new(self.pos_x, self.pos_y, self.pos_z, self.world.clone())
    }

    pub fn set_location(&mut self, location: &Location) {
        self.pos_x = location.x;
        self.pos_y = location.y;
        self.pos_z = location.z;
        self.world.clone_from(&location.world);
    }

    /// Set health, clamped to `0..=max_health`.
    pub fn set_health(&mut self, health: i32) {
        self.health = health.clamp(0, self.max_health.max(0));
    }

    /// Refresh `last_played`. Never moves the timestamp backwards.
    pub fn touch(&mut self) {
        self.last_played = now_millis().max(self.last_played);
    }
}

const SELECT_COLUMNS: &str = "SELECT id, owner_id, name, level, class, experience, health, max_health, \
     mana, max_mana, pos_x, pos_y, pos_z, world, created_at, last_played FROM characters";

fn character_from_row(row: &Row<'_>) -> rusqlite::Result<Character> {
    let owner: String = row.get(1)?;
    let owner_id = owner
        .parse::<OwnerId>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    Ok(Character {
        id: row.get(0)?,
        owner_id,
        name: row.get(2)?,
        level: row.get(3)?,
        class: row.get(4)?,
        experience: row.get(5)?,
        health: row.get(6)?,
        max_health: row.get(7)?,
        mana: row.get(8)?,
        max_mana: row.get(9)?,
        pos_x: row.get(10)?,
        pos_y: row.get(11)?,
        pos_z: row.get(12)?,
        world: row.get(13)?,
        created_at: row.get(14)?,
        last_played: row.get(15)?,
    })
}

/// Row-level constraint failures (CHECK, NOT NULL, ...) are recoverable, unlike
/// the rest of what the driver can raise.
fn write_error(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::SqliteFailure(err, msg) if err.code == ErrorCode::ConstraintViolation => {
            StoreError::Constraint(msg.unwrap_or_else(|| err.to_string()))
        }
        other => other.into(),
    }
}

/// Repository for character rows over a borrowed connection.
pub struct CharacterRepo<'a> {
    conn: &'a Connection,
}

impl<'a> CharacterRepo<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a new row and write the generated id back onto `character`.
    pub fn insert(&self, character: &mut Character) -> Result<i64, StoreError> {
        let result = self.conn.execute(
            "INSERT INTO characters (owner_id, name, level, class, experience, health, max_health,
                                     mana, max_mana, pos_x, pos_y, pos_z, world, created_at, last_played)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            rusqlite::params![
                character.owner_id.to_string(),
                character.name,
                character.level,
                character.class,
                character.experience,
                character.health,
                character.max_health,
                character.mana,
                character.max_mana,
                character.pos_x,
                character.pos_y,
                character.pos_z,
                character.world,
                character.created_at,
                character.last_played,
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                return Err(StoreError::DuplicateCharacter {
                    owner: character.owner_id.to_string(),
                    name: character.name.clone(),
                });
            }
            Err(e) => return Err(write_error(e)),
        }

        let id = self.conn.last_insert_rowid();
        character.id = id;
        Ok(id)
    }

    /// Full-row update keyed by id. Identity columns and `created_at` are left alone.
    pub fn update_by_id(&self, character: &Character) -> Result<(), StoreError> {
        let rows = self.conn.execute(
            "UPDATE characters SET level = ?1, class = ?2, experience = ?3, health = ?4,
                    max_health = ?5, mana = ?6, max_mana = ?7, pos_x = ?8, pos_y = ?9,
                    pos_z = ?10, world = ?11, last_played = ?12
             WHERE id = ?13",
            rusqlite::params![
                character.level,
                character.class,
                character.experience,
                character.health,
                character.max_health,
                character.mana,
                character.max_mana,
                character.pos_x,
                character.pos_y,
                character.pos_z,
                character.world,
                character.last_played,
                character.id,
            ],
        )
        .map_err(write_error)?;

        if rows == 0 {
            return Err(StoreError::CharacterNotFound(character.id));
        }
        Ok(())
    }

    /// All characters for an owner, most recently played first.
    pub fn find_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Character>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE owner_id = ?1 ORDER BY last_played DESC, id ASC"
        ))?;

        let records = stmt
            .query_map(rusqlite::params![owner_id.to_string()], character_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    pub fn find_by_owner_and_name(
        &self,
        owner_id: OwnerId,
        name: &str,
    ) -> Result<Option<Character>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_COLUMNS} WHERE owner_id = ?1 AND name = ?2"))?;

        match stmt.query_row(
            rusqlite::params![owner_id.to_string(), name],
            character_from_row,
        ) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load a character by ID.
    pub fn load(&self, id: i64) -> Result<Character, StoreError> {
        let mut stmt = self.conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;

        stmt.query_row(rusqlite::params![id], character_from_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::CharacterNotFound(id),
                other => other.into(),
            })
    }

    /// Delete a character by ID.
    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        let rows = self.conn.execute(
            "DELETE FROM characters WHERE id = ?1",
            rusqlite::params![id],
        )?;
        if rows == 0 {
            return Err(StoreError::CharacterNotFound(id));
        }
        Ok(())
    }

    pub fn count_for_owner(&self, owner_id: OwnerId) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM characters WHERE owner_id = ?1",
            rusqlite::params![owner_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
