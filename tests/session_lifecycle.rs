/// Integration test: join -> mutate -> autosave -> disconnect -> rejoin against an on-disk database.
use std::sync::Arc;
use std::time::Duration;

use character_db::{CharacterDb, CharacterStore, DatabaseConfig, Location, OwnerId};
use character_session::{CharacterAutoSave, CharacterManager, PlayerEventListener};

fn temp_config(dir: &tempfile::TempDir) -> DatabaseConfig {
    DatabaseConfig {
        path: dir.path().join("characters.db").to_string_lossy().into_owned(),
        ..DatabaseConfig::default()
    }
}

#[tokio::test]
async fn full_session_cycle_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = temp_config(&dir);
    let p1 = OwnerId::new_v4();

    let first_id = {
        let db = Arc::new(CharacterDb::connect(&config).unwrap());
        let manager = Arc::new(CharacterManager::new(db.clone()));
        let listener = PlayerEventListener::new(manager.clone(), "default");

        let c = listener.on_join(p1, "Aria", Location::new(10.0, 20.0, 30.0, "overworld"));
        assert_eq!(c.level, 1);
        assert_eq!(c.class, "Adventurer");
        assert_eq!(db.count_for_owner(p1).unwrap(), 1);

        let mut autosave = CharacterAutoSave::new(manager.clone());
        autosave.start(Duration::from_millis(50));

        listener.on_position_update(p1, Location::new(11.0, 21.0, 31.0, "overworld"));
        listener.on_health_update(p1, 64);
        tokio::time::sleep(Duration::from_millis(250)).await;

        let row = db.load(c.id).unwrap();
        assert_eq!(row.health, 64);
        assert_eq!(row.location(), Location::new(11.0, 21.0, 31.0, "overworld"));

        autosave.stop_and_wait().await;
        assert!(listener.on_disconnect(p1, "Aria"));
        assert!(!manager.is_loaded(p1));
        db.disconnect();
        c.id
    };

    // Second process lifetime over the same file.
    let db = Arc::new(CharacterDb::connect(&config).unwrap());
    assert_eq!(db.applied_migrations().unwrap().len(), 2);
    let manager = Arc::new(CharacterManager::new(db.clone()));
    let listener = PlayerEventListener::new(manager.clone(), "default");

    let resumed = listener.on_join(p1, "Aria", Location::new(0.0, 0.0, 0.0, "lobby"));
    assert_eq!(resumed.id, first_id);
    assert_eq!(resumed.health, 64);
    assert_eq!(resumed.world, "lobby");
    assert_eq!(db.find_by_owner(p1).unwrap().len(), 1);

    assert!(listener.on_death(p1, "Aria", Location::new(5.0, 6.0, 7.0, "nether")));
    let row = db.load(first_id).unwrap();
    assert_eq!(row.health, row.max_health);
    assert_eq!(row.world, "nether");
    assert!(manager.is_loaded(p1));

    assert_eq!(listener.on_shutdown(), 1);
    db.disconnect();
    db.disconnect();
}

#[test]
fn many_players_flush_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(CharacterDb::connect(&temp_config(&dir)).unwrap());
    let manager = Arc::new(CharacterManager::new(db.clone()));
    let listener = PlayerEventListener::new(manager.clone(), "default");

    let owners: Vec<_> = (0..10).map(|_| OwnerId::new_v4()).collect();
    for (i, owner) in owners.iter().enumerate() {
        listener.on_join(*owner, &format!("Player{i}"), Location::new(i as f64, 0.0, 0.0, ""));
        listener.on_health_update(*owner, i as i32);
    }
    assert_eq!(manager.loaded_count(), 10);
    assert_eq!(listener.on_shutdown(), 10);

    for (i, owner) in owners.iter().enumerate() {
        let rows = db.find_by_owner(*owner).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].health, i as i32);
        assert_eq!(rows[0].world, "default");
    }
}

#[test]
fn administrative_delete_leaves_cache_to_reinsert() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(CharacterDb::connect(&temp_config(&dir)).unwrap());
    let manager = CharacterManager::new(db.clone());
    let p1 = OwnerId::new_v4();

    let c = manager.load_or_create(p1, "Aria", None);
    db.delete(c.id).unwrap();

    // Update of a vanished row fails; the cache does not silently re-create it.
    assert!(!manager.save(p1));
    assert_eq!(db.count_for_owner(p1).unwrap(), 0);

    // A fresh join creates a new row.
    manager.unload(p1);
    let again = manager.load_or_create(p1, "Aria", None);
    assert_ne!(again.id, c.id);
    assert_eq!(db.count_for_owner(p1).unwrap(), 1);
}
