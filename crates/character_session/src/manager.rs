use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use character_db::{Character, CharacterStore, Location, OwnerId};

use crate::error::CacheError;

/// Which store write a successful save performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    Updated,
    /// The cached character had never been persisted and got a new row.
    Inserted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveAllReport {
    pub resident: usize,
    pub saved: usize,
}

/// Session cache: at most one resident character per owner.
///
/// All map access goes through one lock, and store writes for an owner happen
/// while that lock is held, so saves for the same owner are serialized and a
/// bulk save sees a consistent snapshot of the map. Store failures never
/// escape; they are logged and reported as `bool`/`Option`.
pub struct CharacterManager {
    store: Arc<dyn CharacterStore>,
    loaded: Mutex<HashMap<OwnerId, Character>>,
}

impl CharacterManager {
    pub fn new(store: Arc<dyn CharacterStore>) -> Self {
        Self {
            store,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    // A panic inside a store call must not wedge every later session event.
    fn lock(&self) -> MutexGuard<'_, HashMap<OwnerId, Character>> {
        self.loaded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resume the owner's character, or create and persist a new one.
    ///
    /// An existing character gets `last_played` and (if given) its location
    /// refreshed in memory only; the store sees those on the next save.
    /// Always returns a character, even when the store is unreachable.
    pub fn load_or_create(
        &self,
        owner_id: OwnerId,
        default_name: &str,
        spawn: Option<&Location>,
    ) -> Character {
        let mut loaded = self.lock();

        let character = match self.store.find_by_owner(owner_id) {
            Ok(found) => match found.into_iter().next() {
                Some(existing) => Self::resume(existing, spawn),
                None => self.create_persisted(owner_id, default_name, spawn),
            },
            Err(e) => {
                e.severity().report(
                    &format!("Failed to look up characters for {owner_id}, continuing unpersisted"),
                    &e,
                );
                Self::create(owner_id, default_name, spawn)
            }
        };

        loaded.insert(owner_id, character.clone());
        character
    }

    fn resume(mut character: Character, spawn: Option<&Location>) -> Character {
        tracing::info!(
            owner = %character.owner_id,
            name = %character.name,
            id = character.id,
            "Loaded existing character"
        );
        character.touch();
        if let Some(spawn) = spawn {
            character.set_location(spawn);
        }
        character
    }

    fn create_persisted(
        &self,
        owner_id: OwnerId,
        name: &str,
        spawn: Option<&Location>,
    ) -> Character {
        tracing::info!(owner = %owner_id, name, "Creating new character");
        let mut character = Self::create(owner_id, name, spawn);
        match self.store.insert(&mut character) {
            Ok(id) => tracing::info!(owner = %owner_id, name, id, "New character created and saved"),
            Err(e) => e
                .severity()
                .report(&format!("Failed to save new character for {owner_id}"), &e),
        }
        character
    }

    fn create(owner_id: OwnerId, name: &str, spawn: Option<&Location>) -> Character {
        let mut character = Character::new(owner_id, name);
        if let Some(spawn) = spawn {
            character.set_location(spawn);
        }
        character
    }

    fn persist(store: &dyn CharacterStore, character: &mut Character) -> Result<SaveKind, CacheError> {
        character.touch();
        if character.is_persisted() {
            store.update_by_id(character)?;
            Ok(SaveKind::Updated)
        } else {
            store.insert(character)?;
            Ok(SaveKind::Inserted)
        }
    }

    /// Persist the owner's resident character, reporting why it failed.
    pub fn try_save(&self, owner_id: OwnerId) -> Result<SaveKind, CacheError> {
        let mut loaded = self.lock();
        let character = loaded
            .get_mut(&owner_id)
            .ok_or(CacheError::NotLoaded(owner_id))?;
        Self::persist(self.store.as_ref(), character)
    }

    pub fn save(&self, owner_id: OwnerId) -> bool {
        match self.try_save(owner_id) {
            Ok(_) => true,
            Err(e) => {
                e.severity()
                    .report(&format!("Failed to save character for {owner_id}"), &e);
                false
            }
        }
    }

    /// Save every resident character under a single lock acquisition.
    pub fn save_all_report(&self) -> SaveAllReport {
        let mut loaded = self.lock();
        let mut report = SaveAllReport {
            resident: loaded.len(),
            saved: 0,
        };

        for (owner_id, character) in loaded.iter_mut() {
            match Self::persist(self.store.as_ref(), character) {
                Ok(_) => report.saved += 1,
                Err(e) => e
                    .severity()
                    .report(&format!("Failed to save character for {owner_id}"), &e),
            }
        }

        if report.saved > 0 {
            tracing::info!(count = report.saved, "Saved {} character(s)", report.saved);
        }
        report
    }

    pub fn save_all(&self) -> usize {
        self.save_all_report().saved
    }

    /// No-op when the owner has no resident character.
    pub fn set_position(&self, owner_id: OwnerId, location: &Location) {
        if let Some(character) = self.lock().get_mut(&owner_id) {
            character.set_location(location);
        }
    }

    /// No-op when the owner has no resident character. Clamped to `0..=max_health`.
    pub fn set_health(&self, owner_id: OwnerId, health: i32) {
        if let Some(character) = self.lock().get_mut(&owner_id) {
            character.set_health(health);
        }
    }

    /// Drop the resident character without saving it.
    pub fn unload(&self, owner_id: OwnerId) -> Option<Character> {
        let removed = self.lock().remove(&owner_id);
        if removed.is_some() {
            tracing::info!(owner = %owner_id, "Unloaded character");
        }
        removed
    }

    pub fn get(&self, owner_id: OwnerId) -> Option<Character> {
        self.lock().get(&owner_id).cloned()
    }

    pub fn is_loaded(&self, owner_id: OwnerId) -> bool {
        self.lock().contains_key(&owner_id)
    }

    pub fn loaded_count(&self) -> usize {
        self.lock().len()
    }
}
