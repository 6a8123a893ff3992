pub mod catalog;
pub mod tracker;

pub use catalog::{Catalog, Phrase, Song};
pub use tracker::{Advance, Attempt, PhraseSession, SessionState, SongCompleted};
