use serde::Serialize;

use super::catalog::Song;
use crate::audio::{AudioBuffer, FeatureExtractor, FeatureSet};
use crate::scoring::{Classification, Classifier};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Waiting for takes of the phrase at this index.
    Ready(usize),
    Completed,
}

/// Emitted once, when the last phrase is left behind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SongCompleted {
    pub song_id: String,
    pub total_stars: u32,
}

/// Result of scoring one take of one phrase.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Attempt {
    pub phrase_index: usize,
    pub features: FeatureSet,
    pub classification: Classification,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Advance {
    pub state: SessionState,
    pub completed: Option<SongCompleted>,
}

/// Progress through one song's phrases during a single visit.
///
/// Only the latest take of each phrase counts: re-attempting a phrase
/// overwrites its stars.
pub struct PhraseSession {
    song_id: String,
    phrase_count: usize,
    state: SessionState,
    per_phrase_stars: Vec<u32>,
    extractor: FeatureExtractor,
    classifier: Classifier,
}

impl PhraseSession {
    pub fn new(song: &Song, extractor: FeatureExtractor, classifier: Classifier) -> Self {
        let phrase_count = song.phrases.len();
        let state = if phrase_count == 0 {
            log::warn!("Song '{}' has no phrases, session starts completed", song.id);
            SessionState::Completed
        } else {
            SessionState::Ready(0)
        };
        log::info!("Opened session for '{}' ({} phrases)", song.id, phrase_count);
        Self {
            song_id: song.id.clone(),
            phrase_count,
            state,
            per_phrase_stars: vec![0; phrase_count],
            extractor,
            classifier,
        }
    }

    pub fn song_id(&self) -> &str {
        &self.song_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_phrase_index(&self) -> Option<usize> {
        match self.state {
            SessionState::Ready(i) => Some(i),
            SessionState::Completed => None,
        }
    }

    pub fn phrase_count(&self) -> usize {
        self.phrase_count
    }

    pub fn per_phrase_stars(&self) -> &[u32] {
        &self.per_phrase_stars
    }

    pub fn total_stars(&self) -> u32 {
        self.per_phrase_stars.iter().sum()
    }

    /// Score a take of `phrase_index` and store its stars.
    ///
    /// Returns `None` without touching any state when the session is
    /// completed or the index is out of range. An empty buffer is scored
    /// like any other take (it classifies as silent).
    pub fn attempt(&mut self, phrase_index: usize, buffer: &AudioBuffer) -> Option<Attempt> {
        if self.state == SessionState::Completed {
            log::warn!("Ignoring take for '{}': session already completed", self.song_id);
            return None;
        }
        if phrase_index >= self.phrase_count {
            log::warn!(
                "Ignoring take for '{}': phrase {} out of range (0..{})",
                self.song_id,
                phrase_index,
                self.phrase_count
            );
            return None;
        }

        let previous = self.per_phrase_stars[phrase_index];
        if previous > 0 {
            log::info!(
                "Phrase {} already earned {} stars, the new take replaces them",
                phrase_index + 1,
                previous
            );
        }

        let features = self.extractor.extract(buffer);
        let classification = self.classifier.classify(&features);
        self.per_phrase_stars[phrase_index] = classification.reward;

        log::info!(
            "'{}' phrase {}: {:?}, {} stars",
            self.song_id,
            phrase_index + 1,
            classification.tier,
            classification.reward
        );

        Some(Attempt {
            phrase_index,
            features,
            classification,
        })
    }

    /// Score a take of the phrase the session is currently on.
    pub fn attempt_current(&mut self, buffer: &AudioBuffer) -> Option<Attempt> {
        let index = self.current_phrase_index()?;
        self.attempt(index, buffer)
    }

    /// Move to the next phrase, completing the song after the last one.
    pub fn advance(&mut self) -> Advance {
        let completed = match self.state {
            SessionState::Ready(i) if i + 1 < self.phrase_count => {
                self.state = SessionState::Ready(i + 1);
                None
            }
            SessionState::Ready(_) => {
                self.state = SessionState::Completed;
                let event = SongCompleted {
                    song_id: self.song_id.clone(),
                    total_stars: self.total_stars(),
                };
                log::info!(
                    "Song '{}' completed with {} stars this round",
                    event.song_id,
                    event.total_stars
                );
                Some(event)
            }
            SessionState::Completed => None,
        };

        Advance {
            state: self.state,
            completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::scoring::PerformanceTier;
    use crate::session::catalog::tests::catalog_of;

    const RATE: u32 = 16000;

    fn session(phrases: usize) -> PhraseSession {
        let catalog = catalog_of(&[("song", Some(0))]);
        let mut song = catalog.songs()[0].clone();
        while song.phrases.len() < phrases {
            let mut extra = song.phrases[0].clone();
            extra.index = song.phrases.len();
            song.phrases.push(extra);
        }
        song.phrases.truncate(phrases);
        let config = Config::default();
        PhraseSession::new(
            &song,
            FeatureExtractor::from_config(&config),
            Classifier::new(config.thresholds.clone()),
        )
    }

    fn sung_take() -> AudioBuffer {
        let samples: Vec<f32> = (0..RATE as usize)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / RATE as f32).sin())
            .collect();
        AudioBuffer::from_f32(&samples, RATE)
    }

    #[test]
    fn starts_ready_at_first_phrase_with_no_stars() {
        let s = session(3);
        assert_eq!(s.state(), SessionState::Ready(0));
        assert_eq!(s.per_phrase_stars(), &[0, 0, 0]);
    }

    #[test]
    fn attempt_stores_reward_without_moving() {
        let mut s = session(2);
        let attempt = s.attempt(0, &sung_take()).unwrap();
        assert_eq!(attempt.classification.tier, PerformanceTier::Excellent);
        assert_eq!(s.per_phrase_stars()[0], 3);
        assert_eq!(s.state(), SessionState::Ready(0));
    }

    #[test]
    fn second_attempt_overwrites_first() {
        let mut s = session(2);
        s.attempt(0, &sung_take()).unwrap();
        let second = s.attempt(0, &AudioBuffer::new(vec![0; 8000], RATE)).unwrap();
        assert_eq!(second.classification.tier, PerformanceTier::Silent);
        assert_eq!(s.per_phrase_stars()[0], second.classification.reward);
        assert_eq!(s.per_phrase_stars()[0], 0);

        s.attempt(0, &sung_take()).unwrap();
        assert_eq!(s.per_phrase_stars()[0], 3);
    }

    #[test]
    fn empty_take_is_scored_as_silent() {
        let mut s = session(1);
        let attempt = s.attempt_current(&AudioBuffer::empty(RATE)).unwrap();
        assert_eq!(attempt.classification.tier, PerformanceTier::Silent);
        assert_eq!(attempt.classification.reward, 0);
    }

    #[test]
    fn advancing_through_all_phrases_completes_once() {
        let mut s = session(3);
        s.attempt(0, &sung_take());
        s.attempt(2, &sung_take());

        let mut events = Vec::new();
        for _ in 0..3 {
            if let Some(event) = s.advance().completed {
                events.push(event);
            }
        }
        assert_eq!(s.state(), SessionState::Completed);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].song_id, "song");
        assert_eq!(events[0].total_stars, s.per_phrase_stars().iter().sum::<u32>());
        assert_eq!(events[0].total_stars, 6);

        let again = s.advance();
        assert_eq!(again.state, SessionState::Completed);
        assert!(again.completed.is_none());
    }

    #[test]
    fn completed_session_ignores_attempts() {
        let mut s = session(1);
        s.advance();
        assert!(s.attempt(0, &sung_take()).is_none());
        assert!(s.attempt_current(&sung_take()).is_none());
        assert_eq!(s.per_phrase_stars(), &[0]);
    }

    #[test]
    fn out_of_range_phrase_is_ignored() {
        let mut s = session(2);
        assert!(s.attempt(5, &sung_take()).is_none());
        assert_eq!(s.total_stars(), 0);
    }
}
