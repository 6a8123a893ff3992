use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

const EMBEDDED_CATALOG: &str = include_str!("../../assets/catalog.json");

/// One lyric line practiced on its own.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Phrase {
    pub text: String,
    pub start_time: f32,
    pub end_time: f32,
    pub index: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Song {
    pub id: String,
    pub title: String,
    pub phrases: Vec<Phrase>,
    /// `None` means the song never unlocks through stars alone.
    pub unlock_stars_required: Option<u32>,
}

/// The usable songs, in catalog order, plus the designated starter song.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    songs: Vec<Song>,
    starter_song_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Full {
        #[serde(default)]
        starter_song_id: Option<String>,
        songs: Vec<serde_json::Value>,
    },
    Bare(Vec<serde_json::Value>),
}

#[derive(Deserialize)]
struct RawSong {
    id: String,
    title: String,
    #[serde(default)]
    unlock_stars_required: Option<u32>,
    phrases: Vec<RawPhrase>,
}

#[derive(Deserialize)]
struct RawPhrase {
    text: String,
    start_time: f32,
    end_time: f32,
}

impl Catalog {
    /// Build a catalog from already-validated songs. The starter falls back
    /// to the first song when `starter_song_id` is absent or unknown.
    pub fn new(songs: Vec<Song>, starter_song_id: Option<String>) -> Self {
        let starter = match starter_song_id {
            Some(id) if songs.iter().any(|s| s.id == id) => Some(id),
            Some(id) => {
                log::warn!("Starter song '{}' is not in the catalog, using the first song", id);
                songs.first().map(|s| s.id.clone())
            }
            None => songs.first().map(|s| s.id.clone()),
        };
        Self {
            songs,
            starter_song_id: starter,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog: {}", path.display()))?;
        let catalog = Self::from_json_str(&content)
            .with_context(|| format!("Failed to parse catalog: {}", path.display()))?;
        log::info!(
            "Loaded catalog {}: {} songs, starter={:?}",
            path.display(),
            catalog.len(),
            catalog.starter_song_id()
        );
        Ok(catalog)
    }

    /// The demo catalog compiled into the binary.
    pub fn embedded() -> Result<Self> {
        Self::from_json_str(EMBEDDED_CATALOG).context("Failed to parse embedded catalog")
    }

    /// Parse a catalog document, dropping records that are not usable songs.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let (starter, records) = match serde_json::from_str::<CatalogFile>(json)? {
            CatalogFile::Full {
                starter_song_id,
                songs,
            } => (starter_song_id, songs),
            CatalogFile::Bare(songs) => (None, songs),
        };

        let mut seen = HashSet::new();
        let mut songs = Vec::with_capacity(records.len());
        for (position, record) in records.into_iter().enumerate() {
            match validate_record(record) {
                Ok(song) => {
                    if seen.insert(song.id.clone()) {
                        songs.push(song);
                    } else {
                        log::warn!("Skipping catalog entry {}: duplicate id '{}'", position, song.id);
                    }
                }
                Err(reason) => log::warn!("Skipping catalog entry {}: {}", position, reason),
            }
        }

        Ok(Self::new(songs, starter))
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn get(&self, song_id: &str) -> Option<&Song> {
        self.songs.iter().find(|s| s.id == song_id)
    }

    pub fn contains(&self, song_id: &str) -> bool {
        self.get(song_id).is_some()
    }

    pub fn starter_song_id(&self) -> Option<&str> {
        self.starter_song_id.as_deref()
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }
}

fn validate_record(record: serde_json::Value) -> Result<Song, String> {
    let raw: RawSong = serde_json::from_value(record).map_err(|e| e.to_string())?;

    let id = raw.id.trim().to_string();
    if id.is_empty() {
        return Err("empty song id".into());
    }
    if raw.phrases.is_empty() {
        return Err(format!("song '{}' has no phrases", id));
    }

    let mut phrases = Vec::with_capacity(raw.phrases.len());
    for (index, p) in raw.phrases.into_iter().enumerate() {
        if !(p.start_time >= 0.0 && p.end_time >= p.start_time) {
            return Err(format!(
                "song '{}' phrase {} has invalid timing {}..{}",
                id, index, p.start_time, p.end_time
            ));
        }
        phrases.push(Phrase {
            text: p.text,
            start_time: p.start_time,
            end_time: p.end_time,
            index,
        });
    }

    Ok(Song {
        id,
        title: raw.title,
        phrases,
        unlock_stars_required: raw.unlock_stars_required,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Songs with the given ids and requirements, two phrases each.
    pub(crate) fn catalog_of(songs: &[(&str, Option<u32>)]) -> Catalog {
        let songs = songs
            .iter()
            .map(|&(id, required)| Song {
                id: id.to_string(),
                title: id.to_uppercase(),
                phrases: (0..2)
                    .map(|i| Phrase {
                        text: format!("{} line {}", id, i),
                        start_time: i as f32 * 2.0,
                        end_time: i as f32 * 2.0 + 2.0,
                        index: i,
                    })
                    .collect(),
                unlock_stars_required: required,
            })
            .collect();
        Catalog::new(songs, None)
    }

    #[test]
    fn embedded_catalog_is_usable() {
        let catalog = Catalog::embedded().unwrap();
        assert_eq!(catalog.len(), 5);
        assert_eq!(catalog.starter_song_id(), Some("littlestar"));
        assert_eq!(catalog.get("bingo").unwrap().unlock_stars_required, None);
        let abc = catalog.get("abc").unwrap();
        assert_eq!(abc.unlock_stars_required, Some(5));
        assert_eq!(abc.phrases[3].index, 3);
    }

    #[test]
    fn malformed_records_are_skipped() {
        let json = r#"{
            "starter_song_id": "b",
            "songs": [
                { "id": "a", "title": "A", "phrases": [] },
                { "id": "b", "title": "B", "phrases": [{ "text": "x", "start_time": 0, "end_time": 1 }] },
                { "title": "no id", "phrases": [{ "text": "x", "start_time": 0, "end_time": 1 }] },
                { "id": "c", "phrases": [{ "text": "x", "start_time": 0, "end_time": 1 }] },
                { "id": "d", "title": "D", "phrases": [{ "text": "x", "start_time": 2, "end_time": 1 }] },
                { "id": "b", "title": "B again", "phrases": [{ "text": "y", "start_time": 0, "end_time": 1 }] },
                "not a song",
                { "id": "e", "title": "E", "unlock_stars_required": 3, "background_image": "e.png",
                  "phrases": [{ "text": "x", "start_time": 0, "end_time": 1 }] }
            ]
        }"#;
        let catalog = Catalog::from_json_str(json).unwrap();
        let ids: Vec<&str> = catalog.songs().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "e"]);
        assert_eq!(catalog.get("b").unwrap().title, "B");
        assert_eq!(catalog.starter_song_id(), Some("b"));
    }

    #[test]
    fn bare_array_uses_first_song_as_starter() {
        let json = r#"[
            { "id": "x", "title": "X", "phrases": [{ "text": "t", "start_time": 0, "end_time": 1 }] },
            { "id": "y", "title": "Y", "phrases": [{ "text": "t", "start_time": 0, "end_time": 1 }] }
        ]"#;
        let catalog = Catalog::from_json_str(json).unwrap();
        assert_eq!(catalog.starter_song_id(), Some("x"));
    }

    #[test]
    fn unknown_starter_falls_back_to_first_song() {
        let json = r#"{ "starter_song_id": "gone", "songs": [
            { "id": "x", "title": "X", "phrases": [{ "text": "t", "start_time": 0, "end_time": 1 }] }
        ] }"#;
        assert_eq!(Catalog::from_json_str(json).unwrap().starter_song_id(), Some("x"));
    }

    #[test]
    fn empty_catalog_has_no_starter() {
        let catalog = Catalog::from_json_str(r#"{ "songs": [] }"#).unwrap();
        assert!(catalog.is_empty());
        assert_eq!(catalog.starter_song_id(), None);
    }

    #[test]
    fn non_catalog_document_is_an_error() {
        assert!(Catalog::from_json_str("42").is_err());
        assert!(Catalog::from_json_str("{ not json").is_err());
    }
}
