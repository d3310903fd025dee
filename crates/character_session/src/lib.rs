pub mod autosave;
pub mod error;
pub mod listener;
pub mod manager;

pub use autosave::CharacterAutoSave;
pub use error::CacheError;
pub use listener::PlayerEventListener;
pub use manager::{CharacterManager, SaveAllReport, SaveKind};
