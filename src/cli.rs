use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "happysing", about = "Score sung takes, collect stars and unlock songs")]
pub struct Cli {
    /// Config file (TOML). Defaults to ./happysing.toml or the user config dir
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Song catalog (JSON). Defaults to the built-in demo catalog
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Progress file (JSON). Defaults to the user data dir
    #[arg(long)]
    pub progress: Option<PathBuf>,

    /// List songs with their lock status and exit
    #[arg(long)]
    pub list_songs: bool,

    /// Unlock a song with the stars collected so far
    #[arg(long, value_name = "SONG_ID")]
    pub unlock: Option<String>,

    /// Analyze a single take and print its features and score
    #[arg(long, value_name = "TAKE")]
    pub analyze: Option<PathBuf>,

    /// Practice a song; takes are matched to its phrases in order
    #[arg(short, long, value_name = "SONG_ID")]
    pub song: Option<String>,

    /// Recorded takes (WAV, FLAC, OGG, MP3), one per phrase
    pub takes: Vec<PathBuf>,

    /// Extra take for a phrase before moving on, as PHRASE=TAKE (1-based)
    #[arg(long, value_name = "PHRASE=TAKE", value_parser = parse_retry)]
    pub retry: Vec<Retry>,
}

/// Another take of one phrase; the last take of a phrase is the one scored.
#[derive(Clone, Debug, PartialEq)]
pub struct Retry {
    /// Zero-based phrase index
    pub phrase: usize,
    pub take: PathBuf,
}

/// Retries naming a phrase the song does not have.
pub fn out_of_range(retries: &[Retry], phrase_count: usize) -> impl Iterator<Item = &Retry> {
    retries.iter().filter(move |r| r.phrase >= phrase_count)
}

fn parse_retry(s: &str) -> Result<Retry, String> {
    let (phrase, take) = s
        .split_once('=')
        .ok_or_else(|| format!("expected PHRASE=TAKE, got '{}'", s))?;
    let phrase: usize = phrase
        .trim()
        .parse()
        .map_err(|_| format!("invalid phrase number '{}'", phrase))?;
    if phrase == 0 {
        return Err("phrase numbers start at 1".into());
    }
    if take.is_empty() {
        return Err(format!("missing take path in '{}'", s));
    }
    Ok(Retry {
        phrase: phrase - 1,
        take: PathBuf::from(take),
    })
}
