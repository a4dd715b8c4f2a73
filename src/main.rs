use log::{debug, info, warn};
use std::error::Error;
use std::path::{Path, PathBuf};

use wgibeat::config::{self, Config};
use wgibeat::core::audio::{AudioEngine, SilentAudio};
use wgibeat::game::clock::SongClock;
use wgibeat::game::parsing::simfile;
use wgibeat::game::player::{Difficulty, Player};
use wgibeat::game::session::{GameMode, Session};

// Autoplay runs the silent clock at a fixed 60 Hz tick.
const FRAME_MS: f64 = 1000.0 / 60.0;

const USAGE: &str = "usage: wgibeat [SONGS_DIR] [--offset-adjust SECONDS]\n       \
                     wgibeat --autoplay SONG_FILE [--mode normal|team|coop|sync] [--seed N]";

#[derive(Debug, Default)]
struct Args {
    songs_dir: Option<PathBuf>,
    offset_adjust: Option<f64>,
    autoplay: Option<PathBuf>,
    mode: Option<GameMode>,
    seed: Option<u64>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |name: &str| it.next().ok_or_else(|| format!("{name} needs a value"));
        match arg.as_str() {
            "--autoplay" => args.autoplay = Some(PathBuf::from(value("--autoplay")?)),
            "--mode" => {
                let raw = value("--mode")?;
                args.mode = Some(GameMode::parse(&raw).ok_or_else(|| format!("unknown mode '{raw}'"))?);
            }
            "--seed" => {
                let raw = value("--seed")?;
                args.seed = Some(raw.parse().map_err(|_| format!("invalid seed '{raw}'"))?);
            }
            "--offset-adjust" => {
                let raw = value("--offset-adjust")?;
                args.offset_adjust = Some(raw.parse().map_err(|_| format!("invalid offset '{raw}'"))?);
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            other if other.starts_with('-') => return Err(format!("unknown option '{other}'\n{USAGE}")),
            other => args.songs_dir = Some(PathBuf::from(other)),
        }
    }
    Ok(args)
}

fn main() -> Result<(), Box<dyn Error>> {
    // Install logger immediately, then set runtime max level from config after loading it.
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .try_init();
    // Startup default when config is missing or malformed.
    log::set_max_level(log::LevelFilter::Warn);

    config::load();
    log::set_max_level(config::get().log_level.as_level_filter());

    let args = parse_args()?;
    if let Some(offset) = args.offset_adjust {
        config::update_offset_adjust(offset);
    }
    if let Some(dir) = args.songs_dir.clone() {
        config::update_songs_dir(dir);
    }
    let cfg = config::get();

    match args.autoplay.as_deref() {
        Some(song_path) => autoplay(song_path, &cfg, &args),
        None => scan(&cfg),
    }
}

fn scan(cfg: &Config) -> Result<(), Box<dyn Error>> {
    let library = simfile::scan_and_load_songs(&cfg.songs_dir, &cfg.load_options());
    for pack in &library.packs {
        println!("{} ({} songs)", pack.name, pack.songs.len());
        for song in &pack.songs {
            let (lo, hi) = song.min_max_bpm();
            let bpm = if (hi - lo).abs() < f64::EPSILON { format!("{lo:.0}") } else { format!("{lo:.0}-{hi:.0}") };
            println!("  {} / {} [{bpm} BPM, {:.1}s]", song.display_full_title(), song.artist, song.length);
        }
    }
    let summary = library.summary;
    println!(
        "{} songs loaded, {} failed, {} duplicates skipped.",
        summary.loaded, summary.failed, summary.duplicates
    );
    Ok(())
}

/// Plays one song with CPU players against the silent clock and prints the
/// stage summary as JSON.
fn autoplay(path: &Path, cfg: &Config, args: &Args) -> Result<(), Box<dyn Error>> {
    let song = simfile::load_song(path, &cfg.load_options())?;
    let audio_path = song.validate()?.to_path_buf();
    song.verify_audio()?;

    let mode = args.mode.unwrap_or(GameMode::Normal);
    let seed = args.seed.unwrap_or_else(rand::random::<u64>);
    info!("Autoplay '{}' in {mode:?} mode (seed {seed}).", song.display_full_title());

    let players = vec![
        Player::cpu("CPU 1", Difficulty::Medium).with_team(1),
        Player::cpu("CPU 2", Difficulty::Hard).with_team(2),
    ];
    let mut session = Session::for_song(&song, mode, players, cfg.timing_profile(), seed)?;

    let clock = SongClock::new(&song);
    let mut audio = SilentAudio::new();
    let channel = audio.play(&audio_path, false, true)?;
    audio.set_position(channel, clock.start_position_ms())?;

    loop {
        audio.advance(FRAME_MS);
        let reading = clock.poll(&audio, channel)?;
        for outcome in session.update(reading.song_ms) {
            debug!(
                "phrase {:.2}: player {} {} ({:+} score, {:+.1} life)",
                reading.phrase,
                outcome.player,
                outcome.judgement.label(),
                outcome.score_delta,
                outcome.life_delta
            );
        }
        if clock.is_finished(reading.audio_ms) || session.is_finished(reading.song_ms) {
            break;
        }
    }
    if let Err(e) = audio.stop(channel) {
        warn!("Failed to stop playback: {e}");
    }

    println!("{}", session.summary(&song.display_full_title()).to_json()?);
    Ok(())
}
