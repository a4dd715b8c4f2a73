use crate::game::parsing::LoadOptions;
use crate::game::timing_windows::TimingProfile;
use ini::Ini;
use log::{LevelFilter, info, warn};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

const CONFIG_PATH: &str = "wgibeat.ini";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
            Self::Trace => LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" | "note" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub songs_dir: PathBuf,
    pub cache_dir: PathBuf,
    /// Write a normalized SNG copy of every DWI/SM song that parses cleanly.
    pub convert_to_sng: bool,
    /// Prefer an up-to-date SNG cache over re-parsing the source file.
    pub fastload: bool,
    pub allow_problematic_songs: bool,
    // Calibration added to every song's Offset and Length (seconds).
    pub offset_adjust_seconds: f64,
    // When parsing songs at startup:
    // 0 = Auto (use all logical cores)
    // 1 = Single-threaded
    // N >= 2 = cap at N threads (clamped to available cores).
    pub song_parsing_threads: u8,
    pub log_level: LogLevel,
    pub hit_window_ideal_ms: f64,
    pub hit_window_cool_ms: f64,
    pub hit_window_ok_ms: f64,
    pub hit_window_bad_ms: f64,
}

impl Default for Config {
    fn default() -> Self {
        let windows = TimingProfile::default();
        Self {
            songs_dir: PathBuf::from("songs"),
            cache_dir: PathBuf::from("cache/songs"),
            convert_to_sng: true,
            fastload: true,
            allow_problematic_songs: false,
            offset_adjust_seconds: 0.0,
            song_parsing_threads: 0,
            log_level: LogLevel::Warn,
            hit_window_ideal_ms: windows.ideal_ms,
            hit_window_cool_ms: windows.cool_ms,
            hit_window_ok_ms: windows.ok_ms,
            hit_window_bad_ms: windows.bad_ms,
        }
    }
}

impl Config {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            offset_adjust: self.offset_adjust_seconds,
            allow_problematic: self.allow_problematic_songs,
            convert_to_sng: self.convert_to_sng,
            fastload: self.fastload,
            cache_dir: Some(self.cache_dir.clone()),
            parsing_threads: self.song_parsing_threads,
        }
    }

    pub fn timing_profile(&self) -> TimingProfile {
        TimingProfile {
            ideal_ms: self.hit_window_ideal_ms,
            cool_ms: self.hit_window_cool_ms,
            ok_ms: self.hit_window_ok_ms,
            bad_ms: self.hit_window_bad_ms,
        }
        .sanitized()
    }
}

// Global, mutable configuration instance.
static CONFIG: std::sync::LazyLock<Mutex<Config>> =
    std::sync::LazyLock::new(|| Mutex::new(Config::default()));

// --- File I/O ---

fn bool_str(v: bool) -> &'static str {
    if v { "1" } else { "0" }
}

fn to_ini(cfg: &Config) -> Ini {
    let mut conf = Ini::new();
    conf.with_section(Some("Options"))
        .set("SongsDir", cfg.songs_dir.to_string_lossy())
        .set("CacheDir", cfg.cache_dir.to_string_lossy())
        .set("ConvertToSng", bool_str(cfg.convert_to_sng))
        .set("FastLoad", bool_str(cfg.fastload))
        .set("AllowProblematicSongs", bool_str(cfg.allow_problematic_songs))
        .set("OffsetAdjust", format!("{:.3}", cfg.offset_adjust_seconds))
        .set("SongParsingThreads", cfg.song_parsing_threads.to_string())
        .set("LogLevel", cfg.log_level.as_str());
    conf.with_section(Some("Gameplay"))
        .set("HitWindowIdealMs", format!("{:.1}", cfg.hit_window_ideal_ms))
        .set("HitWindowCoolMs", format!("{:.1}", cfg.hit_window_cool_ms))
        .set("HitWindowOkMs", format!("{:.1}", cfg.hit_window_ok_ms))
        .set("HitWindowBadMs", format!("{:.1}", cfg.hit_window_bad_ms));
    conf
}

fn parse_flag(v: &str) -> Option<bool> {
    let v = v.trim();
    if v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes") || v.eq_ignore_ascii_case("on") {
        Some(true)
    } else if v.eq_ignore_ascii_case("false")
        || v.eq_ignore_ascii_case("no")
        || v.eq_ignore_ascii_case("off")
    {
        Some(false)
    } else {
        v.parse::<u8>().ok().map(|n| n != 0)
    }
}

/// Builds a `Config` from a parsed INI document, falling back to defaults
/// for any missing or malformed key.
pub fn from_ini(conf: &Ini) -> Config {
    let default = Config::default();
    let get = |section: &str, key: &str| conf.get_from(Some(section), key).map(str::trim);
    let get_f64 = |section: &str, key: &str, fallback: f64| {
        get(section, key)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(fallback)
    };

    Config {
        songs_dir: get("Options", "SongsDir")
            .filter(|v| !v.is_empty())
            .map_or(default.songs_dir, PathBuf::from),
        cache_dir: get("Options", "CacheDir")
            .filter(|v| !v.is_empty())
            .map_or(default.cache_dir, PathBuf::from),
        convert_to_sng: get("Options", "ConvertToSng")
            .and_then(parse_flag)
            .unwrap_or(default.convert_to_sng),
        fastload: get("Options", "FastLoad")
            .and_then(parse_flag)
            .unwrap_or(default.fastload),
        allow_problematic_songs: get("Options", "AllowProblematicSongs")
            .and_then(parse_flag)
            .unwrap_or(default.allow_problematic_songs),
        offset_adjust_seconds: get_f64("Options", "OffsetAdjust", default.offset_adjust_seconds),
        song_parsing_threads: get("Options", "SongParsingThreads")
            .and_then(|v| v.parse::<u8>().ok())
            .unwrap_or(default.song_parsing_threads),
        log_level: get("Options", "LogLevel")
            .and_then(|v| LogLevel::from_str(v).ok())
            .unwrap_or(default.log_level),
        hit_window_ideal_ms: get_f64("Gameplay", "HitWindowIdealMs", default.hit_window_ideal_ms),
        hit_window_cool_ms: get_f64("Gameplay", "HitWindowCoolMs", default.hit_window_cool_ms),
        hit_window_ok_ms: get_f64("Gameplay", "HitWindowOkMs", default.hit_window_ok_ms),
        hit_window_bad_ms: get_f64("Gameplay", "HitWindowBadMs", default.hit_window_bad_ms),
    }
}

fn create_default_config_file(path: &Path) -> Result<(), std::io::Error> {
    info!("'{}' not found, creating with default values.", path.display());
    to_ini(&Config::default()).write_to_file(path)
}

pub fn load() {
    load_from(Path::new(CONFIG_PATH));
}

pub fn load_from(path: &Path) {
    if !path.exists()
        && let Err(e) = create_default_config_file(path)
    {
        warn!("Failed to create default config file: {e}");
    }

    match Ini::load_from_file(path) {
        Ok(conf) => {
            *CONFIG.lock().unwrap() = from_ini(&conf);
            info!("Configuration loaded from '{}'.", path.display());
        }
        Err(e) => {
            warn!("Failed to load '{}': {e}. Using default values.", path.display());
        }
    }
}

pub fn save() {
    let cfg = get();
    if let Err(e) = to_ini(&cfg).write_to_file(CONFIG_PATH) {
        warn!("Failed to save config file: {e}");
    }
}

pub fn get() -> Config {
    CONFIG.lock().unwrap().clone()
}

pub fn update_songs_dir(dir: PathBuf) {
    let mut dirty = false;
    {
        let mut cfg = CONFIG.lock().unwrap();
        if cfg.songs_dir != dir {
            cfg.songs_dir = dir;
            dirty = true;
        }
    }
    if dirty {
        save();
    }
}

pub fn update_offset_adjust(offset: f64) {
    let mut dirty = false;
    {
        let mut cfg = CONFIG.lock().unwrap();
        if (cfg.offset_adjust_seconds - offset).abs() > f64::EPSILON {
            cfg.offset_adjust_seconds = offset;
            dirty = true;
        }
    }
    if dirty {
        save();
    }
}
