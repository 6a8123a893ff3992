pub mod store;

pub use store::{ProgressionState, ProgressionStore, SongStatus, UnlockError};
