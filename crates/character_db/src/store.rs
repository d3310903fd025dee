use crate::character::{Character, OwnerId};
use crate::error::StoreError;

/// Row-level persistence for characters.
///
/// Every call is its own unit of work; nothing spans calls.
pub trait CharacterStore: Send + Sync {
    /// Insert a new row, assigning the generated id onto `character`.
    fn insert(&self, character: &mut Character) -> Result<i64, StoreError>;

    /// Update the row keyed by `character.id`. Fails with
    /// [`StoreError::CharacterNotFound`] when no row matches.
    fn update_by_id(&self, character: &Character) -> Result<(), StoreError>;

    fn find_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Character>, StoreError>;

    fn find_by_owner_and_name(
        &self,
        owner_id: OwnerId,
        name: &str,
    ) -> Result<Option<Character>, StoreError>;

    fn delete(&self, id: i64) -> Result<(), StoreError>;
}
