use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::session::{Catalog, Song};

/// Persisted player progress: the star total and the songs opened so far.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProgressionState {
    pub total_stars: u32,
    pub unlocked_song_ids: BTreeSet<String>,
}

impl ProgressionState {
    /// Zero stars and only the starter song.
    pub fn initial(catalog: &Catalog) -> Self {
        let mut state = Self::default();
        if let Some(starter) = catalog.starter_song_id() {
            state.unlocked_song_ids.insert(starter.to_string());
        }
        state
    }

    /// Merge a persisted payload with the defaults for `catalog`.
    ///
    /// Wrong-typed fields fall back to their defaults, ids the catalog no
    /// longer has are dropped, and the starter song is always included.
    pub fn from_persisted(value: &serde_json::Value, catalog: &Catalog) -> Self {
        let mut state = Self::initial(catalog);
        let Some(obj) = value.as_object() else {
            log::warn!("Progress data is not an object, using defaults");
            return state;
        };

        match obj.get("total_stars") {
            Some(v) => match v.as_u64().and_then(|n| u32::try_from(n).ok()) {
                Some(n) => state.total_stars = n,
                None => log::warn!("Ignoring invalid total_stars value: {}", v),
            },
            None => log::warn!("Progress data has no total_stars, starting from 0"),
        }

        match obj.get("unlocked_song_ids").and_then(|v| v.as_array()) {
            Some(ids) => {
                for id in ids.iter().filter_map(|v| v.as_str()) {
                    if catalog.contains(id) {
                        state.unlocked_song_ids.insert(id.to_string());
                    } else {
                        log::warn!("Dropping unlocked song '{}': not in the catalog", id);
                    }
                }
            }
            None => log::warn!("Progress data has no valid unlocked_song_ids, using defaults"),
        }

        state
    }
}

/// Why an explicit unlock request was refused. Nothing is changed when
/// this is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnlockError {
    #[error("unknown song '{0}'")]
    UnknownSong(String),
    #[error("song '{0}' is already unlocked")]
    AlreadyUnlocked(String),
    #[error("song '{0}' cannot be unlocked with stars")]
    NoRequirement(String),
    #[error("song '{song_id}' needs {required} stars, {shortfall} more than the {total} collected")]
    NotEnoughStars {
        song_id: String,
        required: u32,
        total: u32,
        shortfall: u32,
    },
}

impl UnlockError {
    pub fn shortfall(&self) -> Option<u32> {
        match self {
            UnlockError::NotEnoughStars { shortfall, .. } => Some(*shortfall),
            _ => None,
        }
    }
}

/// How a song should be presented in a song list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SongStatus {
    Unlocked,
    /// Enough stars collected, waiting for the player to unlock it.
    Unlockable { required: u32 },
    Locked { required: u32, shortfall: u32 },
    /// No star requirement: only an explicit grant opens it.
    Unavailable,
}

/// Owner of the process-wide [`ProgressionState`].
///
/// Every mutation is written through to disk before returning when the
/// store has a backing file.
pub struct ProgressionStore {
    catalog: Catalog,
    state: ProgressionState,
    path: Option<PathBuf>,
}

impl ProgressionStore {
    /// Open the store backed by `path`. A missing or corrupt file yields the
    /// initial state.
    pub fn open(catalog: Catalog, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = load_state(&path, &catalog);
        log::info!(
            "Progress: {} stars, {} unlocked songs ({})",
            state.total_stars,
            state.unlocked_song_ids.len(),
            path.display()
        );
        Self {
            catalog,
            state,
            path: Some(path),
        }
    }

    /// A store that never touches the filesystem.
    pub fn in_memory(catalog: Catalog) -> Self {
        let state = ProgressionState::initial(&catalog);
        Self {
            catalog,
            state,
            path: None,
        }
    }

    /// Re-read the backing file, replacing the in-memory state.
    pub fn load(&mut self) {
        if let Some(ref path) = self.path {
            self.state = load_state(path, &self.catalog);
        }
    }

    pub fn save(&self) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create progress dir: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.state)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write progress: {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace progress file: {}", path.display()))?;
        log::debug!("Saved progress to {}", path.display());
        Ok(())
    }

    pub fn state(&self) -> &ProgressionState {
        &self.state
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn total_stars(&self) -> u32 {
        self.state.total_stars
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn award_stars(&mut self, stars: u32) {
        self.state.total_stars = self.state.total_stars.saturating_add(stars);
        if stars > 0 {
            log::info!("Awarded {} stars, total {}", stars, self.state.total_stars);
        }
        self.persist();
    }

    pub fn is_unlocked(&self, song_id: &str) -> bool {
        self.state.unlocked_song_ids.contains(song_id)
    }

    pub fn song_status(&self, song: &Song) -> SongStatus {
        if self.is_unlocked(&song.id) {
            return SongStatus::Unlocked;
        }
        match song.unlock_stars_required {
            None => SongStatus::Unavailable,
            Some(required) if self.state.total_stars >= required => {
                SongStatus::Unlockable { required }
            }
            Some(required) => SongStatus::Locked {
                required,
                shortfall: required - self.state.total_stars,
            },
        }
    }

    /// Unlock every song the current star total qualifies for, in catalog
    /// order. Returns the ids that were newly unlocked.
    pub fn on_song_completed(&mut self, song_id: &str) -> Vec<String> {
        if !self.catalog.contains(song_id) {
            log::warn!("Completed song '{}' is not in the catalog", song_id);
        }

        let newly: Vec<String> = self
            .catalog
            .songs()
            .iter()
            .filter(|song| self.is_eligible(song))
            .map(|song| song.id.clone())
            .collect();

        for id in &newly {
            log::info!("Unlocked '{}' after completing '{}'", id, song_id);
            self.state.unlocked_song_ids.insert(id.clone());
        }
        if !newly.is_empty() {
            self.persist();
        }
        newly
    }

    /// Explicit unlock of one song. Stars are a threshold, not a price: the
    /// total is left unchanged.
    pub fn try_unlock(&mut self, song_id: &str) -> Result<(), UnlockError> {
        let song = self
            .catalog
            .get(song_id)
            .ok_or_else(|| UnlockError::UnknownSong(song_id.to_string()))?;

        match self.song_status(song) {
            SongStatus::Unlocked => Err(UnlockError::AlreadyUnlocked(song_id.to_string())),
            SongStatus::Unavailable => Err(UnlockError::NoRequirement(song_id.to_string())),
            SongStatus::Locked { required, shortfall } => Err(UnlockError::NotEnoughStars {
                song_id: song_id.to_string(),
                required,
                total: self.state.total_stars,
                shortfall,
            }),
            SongStatus::Unlockable { .. } => {
                self.state.unlocked_song_ids.insert(song_id.to_string());
                log::info!("Unlocked '{}'", song_id);
                self.persist();
                Ok(())
            }
        }
    }

    fn is_eligible(&self, song: &Song) -> bool {
        matches!(self.song_status(song), SongStatus::Unlockable { .. })
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            log::error!("Failed to save progress: {:#}", e);
        }
    }
}

fn load_state(path: &Path, catalog: &Catalog) -> ProgressionState {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("No progress file at {}, starting fresh", path.display());
            return ProgressionState::initial(catalog);
        }
        Err(e) => {
            log::warn!("Failed to read progress {}: {}, using defaults", path.display(), e);
            return ProgressionState::initial(catalog);
        }
    };

    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(value) => ProgressionState::from_persisted(&value, catalog),
        Err(e) => {
            log::warn!("Corrupt progress file {}: {}, using defaults", path.display(), e);
            ProgressionState::initial(catalog)
        }
    }
}
