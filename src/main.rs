mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};

use cli::{Cli, Retry};
use happysing::audio::{decode, AudioBuffer, FeatureExtractor, FeatureSet};
use happysing::config::{self, Config};
use happysing::progress::{ProgressionStore, SongStatus};
use happysing::scoring::{feedback, Classification, Classifier, Feedback};
use happysing::session::{PhraseSession, Song};

/// Rate assumed for a phrase with no take at all.
const CAPTURE_SAMPLE_RATE: u32 = 16000;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref())?;

    let catalog = match cli.catalog.clone().or_else(|| config.paths.catalog.clone()) {
        Some(path) => happysing::session::Catalog::load(&path)?,
        None => {
            log::info!("Using the built-in song catalog");
            happysing::session::Catalog::embedded()?
        }
    };
    if catalog.is_empty() {
        anyhow::bail!("The song catalog has no usable songs");
    }

    let progress_path = match cli.progress.clone().or_else(|| config.paths.progress.clone()) {
        Some(path) => path,
        None => default_progress_path()?,
    };
    let mut store = ProgressionStore::open(catalog, progress_path);

    let mut did_something = false;

    if cli.list_songs {
        list_songs(&store);
        did_something = true;
    }

    if let Some(ref song_id) = cli.unlock {
        unlock(&mut store, song_id);
        did_something = true;
    }

    if let Some(ref take) = cli.analyze {
        analyze(take, &config)?;
        did_something = true;
    }

    if let Some(ref song_id) = cli.song {
        practice(&mut store, &config, song_id, &cli.takes, &cli.retry)?;
        did_something = true;
    } else if !cli.takes.is_empty() || !cli.retry.is_empty() {
        anyhow::bail!("Takes were given without --song");
    }

    if !did_something {
        println!("Nothing to do. Try --list-songs, --analyze TAKE or --song SONG_ID TAKE...");
    }

    store.save()?;
    Ok(())
}

/// Explicit `--config` path, else ./happysing.toml, else the user config dir.
fn resolve_config(explicit: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = explicit {
        let cfg = config::load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?;
        log::info!("Loaded config from {}", path.display());
        cfg
    } else {
        match discover_config_path() {
            Some(path) => match config::load_config(&path) {
                Some(cfg) => {
                    log::info!("Loaded config from {}", path.display());
                    cfg
                }
                None => {
                    log::warn!("Failed to load config from {}, using defaults", path.display());
                    Config::default()
                }
            },
            None => Config::default(),
        }
    };
    config.validate()?;
    Ok(config)
}

fn discover_config_path() -> Option<PathBuf> {
    let local = PathBuf::from("happysing.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("happysing").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("happysing").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

fn default_progress_path() -> Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(dirs::home_dir)
        .context("Cannot determine a data directory for the progress file")?;
    Ok(base.join("happysing").join("progress.json"))
}

fn list_songs(store: &ProgressionStore) {
    println!("You have {} stars.", store.total_stars());
    for song in store.catalog().songs() {
        println!("  {:<12} {:<32} {}", song.id, song.title, describe_status(store.song_status(song)));
    }
}

fn describe_status(status: SongStatus) -> String {
    match status {
        SongStatus::Unlocked => "unlocked".into(),
        SongStatus::Unlockable { required } => format!("ready to unlock ({} stars)", required),
        SongStatus::Locked { required, shortfall } => {
            format!("needs {} stars ({} to go)", required, shortfall)
        }
        SongStatus::Unavailable => "locked".into(),
    }
}

fn unlock(store: &mut ProgressionStore, song_id: &str) {
    match store.try_unlock(song_id) {
        Ok(()) => println!("Unlocked '{}'. Have fun singing!", song_id),
        Err(err) => match err.shortfall() {
            Some(shortfall) => println!("Not yet: {} more stars needed for '{}'.", shortfall, song_id),
            None => println!("Cannot unlock: {}", err),
        },
    }
}

#[derive(Serialize)]
struct TakeReport {
    features: FeatureSet,
    classification: Classification,
    feedback: Feedback,
}

fn analyze(take: &Path, config: &Config) -> Result<()> {
    let buffer = decode::decode_take(take, config.capture.max_record_seconds)?;
    let features = FeatureExtractor::from_config(config).extract(&buffer);
    let classification = Classifier::new(config.thresholds.clone()).classify(&features);
    let report = TakeReport {
        features,
        classification,
        feedback: feedback::select(&classification),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn practice(
    store: &mut ProgressionStore,
    config: &Config,
    song_id: &str,
    takes: &[PathBuf],
    retries: &[Retry],
) -> Result<()> {
    let song: Song = store
        .catalog()
        .get(song_id)
        .cloned()
        .with_context(|| format!("Unknown song '{}'", song_id))?;

    if !store.is_unlocked(song_id) {
        anyhow::bail!(
            "'{}' is locked: {}",
            song.title,
            describe_status(store.song_status(&song))
        );
    }
    if takes.len() > song.phrases.len() {
        log::warn!(
            "{} takes for {} phrases, ignoring the extra takes",
            takes.len(),
            song.phrases.len()
        );
    }

    for retry in cli::out_of_range(retries, song.phrases.len()) {
        log::warn!(
            "Ignoring retry for phrase {}: '{}' has {} phrases",
            retry.phrase + 1,
            song.title,
            song.phrases.len()
        );
    }

    let mut session = PhraseSession::new(
        &song,
        FeatureExtractor::from_config(config),
        Classifier::new(config.thresholds.clone()),
    );

    println!("Song: {}", song.title);
    let pb = ProgressBar::new(song.phrases.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} phrases")?
            .progress_chars("=>-"),
    );

    while let Some(index) = session.current_phrase_index() {
        let phrase = &song.phrases[index];
        pb.println(format!("Phrase {}/{}: \"{}\"", index + 1, song.phrases.len(), phrase.text));

        let first = takes.get(index).map(PathBuf::as_path);
        let extra = retries.iter().filter(|r| r.phrase == index).map(|r| Some(r.take.as_path()));
        for take in std::iter::once(first).chain(extra) {
            let buffer = capture(take, config);
            if let Some(attempt) = session.attempt(index, &buffer) {
                store.award_stars(attempt.classification.reward);
                report_attempt(&pb, &attempt.classification);
            }
        }

        let advance = session.advance();
        pb.inc(1);

        if let Some(done) = advance.completed {
            pb.finish_and_clear();
            println!(
                "'{}' complete! You earned {} stars this round ({} in total).",
                song.title,
                done.total_stars,
                store.total_stars()
            );
            for id in store.on_song_completed(&done.song_id) {
                let title = store.catalog().get(&id).map_or(id.as_str(), |s| s.title.as_str());
                println!("New song unlocked: {}", title);
            }
        }
    }

    Ok(())
}

/// Decode a take, treating a missing or unreadable one as silence.
fn capture(take: Option<&Path>, config: &Config) -> AudioBuffer {
    let Some(path) = take else {
        log::warn!("No take recorded for this phrase, scoring it as silence");
        return AudioBuffer::empty(CAPTURE_SAMPLE_RATE);
    };
    match decode::decode_take(path, config.capture.max_record_seconds) {
        Ok(buffer) => buffer,
        Err(e) => {
            log::warn!("Could not read take {}: {:#}, scoring it as silence", path.display(), e);
            AudioBuffer::empty(CAPTURE_SAMPLE_RATE)
        }
    }
}

fn report_attempt(pb: &ProgressBar, classification: &Classification) {
    let fb = feedback::select(classification);
    let flags = &classification.flags;
    let mark = |on: bool| if on { "yes" } else { "no" };
    pb.println(format!(
        "  {:<9} +{} stars  [loud: {}, pitch: {}, rhythm: {}]",
        classification.tier.label(),
        classification.reward,
        mark(flags.loud),
        mark(flags.has_pitch),
        mark(flags.has_rhythm)
    ));
    pb.println(format!("  {:?}: {}", fb.avatar, fb.text));
}
