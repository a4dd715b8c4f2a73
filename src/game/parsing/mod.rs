pub mod dwi;
pub mod phrase_scan;
pub mod records;
pub mod simfile;
pub mod sm;
pub mod sng;

use crate::game::song::{SongData, SourceFormat};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    /// Seconds added to every song's Offset and Length.
    pub offset_adjust: f64,
    /// Keep songs with non-positive BPMs or tempo changes instead of rejecting them.
    pub allow_problematic: bool,
    pub convert_to_sng: bool,
    pub fastload: bool,
    pub cache_dir: Option<PathBuf>,
    /// 0 = all cores, 1 = single-threaded, N = at most N threads.
    pub parsing_threads: u8,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            offset_adjust: 0.0,
            allow_problematic: false,
            convert_to_sng: false,
            fastload: false,
            cache_dir: None,
            parsing_threads: 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("invalid number '{value}' in field '{field}'")]
    InvalidNumber { field: String, value: String },
    #[error("missing '{delimiter}' in field '{field}'")]
    MissingDelimiter { field: String, delimiter: char },
    #[error("invalid BPM {bpm} at phrase {phrase}")]
    InvalidBpm { phrase: f64, bpm: f64 },
    #[error("{0} BPM values present; tempo changes are not supported for this format")]
    MultipleBpms(usize),
    #[error("{0} stops present; stops are not supported for this format")]
    StopsPresent(usize),
    #[error("no playable single chart")]
    NoChart,
    #[error("unknown song format '{}'", .0.display())]
    UnknownFormat(PathBuf),
    #[error("no audio file found for '{}'", .0.display())]
    AudioMissing(PathBuf),
    #[error("audio '{}' does not match its recorded hash (expected {expected}, found {actual})", .path.display())]
    AudioHashMismatch { path: PathBuf, expected: String, actual: String },
    #[error("song '{}' is read-only", .0.display())]
    ReadOnly(PathBuf),
    #[error("parser panicked on '{}'", .0.display())]
    Panicked(PathBuf),
}

impl LoadError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }
}

/// Parses already-decoded song text in the given format. Audio resolution,
/// hashing and caching are left to [`simfile::load_song`].
pub fn parse(
    text: &str,
    path: &Path,
    format: SourceFormat,
    options: &LoadOptions,
) -> Result<SongData, LoadError> {
    match format {
        SourceFormat::Dwi => dwi::parse(text, path, options),
        SourceFormat::Sm => sm::parse(text, path, options),
        SourceFormat::Sng => sng::parse(text, path, options),
    }
}
