use std::sync::Arc;

use character_db::{Character, Location, OwnerId};

use crate::manager::CharacterManager;

/// Maps host lifecycle signals onto the session cache.
///
/// Host-specific callback glue lives outside this crate; it only has to call
/// these methods.
pub struct PlayerEventListener {
    manager: Arc<CharacterManager>,
    default_world: String,
}

impl PlayerEventListener {
    pub fn new(manager: Arc<CharacterManager>, default_world: impl Into<String>) -> Self {
        Self {
            manager,
            default_world: default_world.into(),
        }
    }

    pub fn manager(&self) -> &Arc<CharacterManager> {
        &self.manager
    }

    fn resolve_world(&self, mut location: Location) -> Location {
        if location.world.is_empty() {
            location.world.clone_from(&self.default_world);
        }
        location
    }

    pub fn on_join(&self, owner_id: OwnerId, name: &str, spawn: Location) -> Character {
        tracing::info!(owner = %owner_id, name, "Player joining");
        let spawn = self.resolve_world(spawn);
        let character = self.manager.load_or_create(owner_id, name, Some(&spawn));
        tracing::info!(
            owner = %owner_id,
            name,
            level = character.level,
            class = %character.class,
            "Character loaded for player"
        );
        character
    }

    /// Save then unload. Returns whether the save succeeded; `false` also
    /// when nothing was loaded.
    pub fn on_disconnect(&self, owner_id: OwnerId, name: &str) -> bool {
        tracing::info!(owner = %owner_id, name, "Player disconnecting");
        if !self.manager.is_loaded(owner_id) {
            return false;
        }

        let saved = self.manager.save(owner_id);
        if saved {
            tracing::info!(owner = %owner_id, name, "Character saved for disconnecting player");
        } else {
            tracing::warn!(owner = %owner_id, name, "Failed to save character for disconnecting player");
        }
        self.manager.unload(owner_id);
        saved
    }

    /// Move to the death location, restore full health, save. The character
    /// stays loaded.
    pub fn on_death(&self, owner_id: OwnerId, name: &str, location: Location) -> bool {
        tracing::info!(owner = %owner_id, name, "Player died");
        let location = self.resolve_world(location);
        self.manager.set_position(owner_id, &location);
        if let Some(character) = self.manager.get(owner_id) {
            self.manager.set_health(owner_id, character.max_health);
        }

        let saved = self.manager.save(owner_id);
        if saved {
            tracing::info!(owner = %owner_id, name, "Character saved after death");
        } else {
            tracing::warn!(owner = %owner_id, name, "Failed to save character after death");
        }
        saved
    }

    pub fn on_position_update(&self, owner_id: OwnerId, location: Location) {
        let location = self.resolve_world(location);
        self.manager.set_position(owner_id, &location);
    }

    pub fn on_health_update(&self, owner_id: OwnerId, health: i32) {
        self.manager.set_health(owner_id, health);
    }

    /// Flush everything; called once at server shutdown.
    pub fn on_shutdown(&self) -> usize {
        let saved = self.manager.save_all();
        tracing::info!(count = saved, "Shutdown save completed");
        saved
    }
}
