use crate::game::parsing::LoadError;
use crate::game::timing::TimingMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Dwi,
    Sm,
    Sng,
}

impl SourceFormat {
    /// Preferred first when a song folder carries more than one definition.
    pub const PREFERENCE: [Self; 3] = [Self::Sng, Self::Sm, Self::Dwi];

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "dwi" => Some(Self::Dwi),
            "sm" => Some(Self::Sm),
            "sng" => Some(Self::Sng),
            _ => None,
        }
    }

    pub const fn extension(self) -> &'static str {
        match self {
            Self::Dwi => "dwi",
            Self::Sm => "sm",
            Self::Sng => "sng",
        }
    }
}

/// Chart difficulty labels, best first. The loader keeps the first one a
/// file provides, in this order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChartDifficulty {
    Maniac,
    SManiac,
    Another,
    Basic,
    Beginner,
    Edit,
}

impl ChartDifficulty {
    pub const PREFERENCE: [Self; 6] =
        [Self::Maniac, Self::SManiac, Self::Another, Self::Basic, Self::Beginner, Self::Edit];

    pub fn from_dwi_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "MANIAC" => Some(Self::Maniac),
            "SMANIAC" => Some(Self::SManiac),
            "ANOTHER" => Some(Self::Another),
            "BASIC" => Some(Self::Basic),
            "BEGINNER" => Some(Self::Beginner),
            "EDIT" => Some(Self::Edit),
            _ => None,
        }
    }

    pub fn from_sm_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "hard" | "heavy" => Some(Self::Maniac),
            "challenge" | "expert" | "smaniac" => Some(Self::SManiac),
            "medium" | "standard" | "another" => Some(Self::Another),
            "easy" | "light" | "basic" => Some(Self::Basic),
            "beginner" => Some(Self::Beginner),
            "edit" => Some(Self::Edit),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Maniac => "MANIAC",
            Self::SManiac => "SMANIAC",
            Self::Another => "ANOTHER",
            Self::Basic => "BASIC",
            Self::Beginner => "BEGINNER",
            Self::Edit => "EDIT",
        }
    }
}

/// A raw note string kept for the chart the loader selected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceChart {
    pub difficulty: ChartDifficulty,
    pub notes: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SongData {
    pub title: String,
    pub subtitle: String,
    pub artist: String,
    /// File the descriptor was read from (the source file for cache hits).
    pub definition_path: PathBuf,
    pub format: SourceFormat,
    /// Audio file name as declared or discovered, relative to the song folder.
    pub audio_file: String,
    pub audio_path: Option<PathBuf>,
    /// Lowercase hex MD5 of the audio file contents.
    pub audio_md5: String,
    pub start_bpm: f64,
    /// `(phrase, bpm)` pairs, sorted, with an entry at phrase 0.
    pub bpms: Vec<(f64, f64)>,
    /// `(phrase, beats)` pairs, sorted.
    pub stops: Vec<(f64, f64)>,
    /// Seconds from audio start to phrase 0.
    pub offset: f64,
    /// Seconds from audio start to the end of the playable song.
    pub length: f64,
    /// Seconds into the audio file where playback begins.
    pub audio_start: f64,
    pub chart: Option<SourceChart>,
    pub required_level: Option<u32>,
    pub background: Option<String>,
    pub add_notes: Vec<f64>,
    pub remove_notes: Vec<f64>,
    pub super_notes: Vec<f64>,
    pub read_only: bool,
}

impl SongData {
    pub fn new(definition_path: PathBuf, format: SourceFormat) -> Self {
        Self {
            title: String::new(),
            subtitle: String::new(),
            artist: String::new(),
            definition_path,
            format,
            audio_file: String::new(),
            audio_path: None,
            audio_md5: String::new(),
            start_bpm: 0.0,
            bpms: Vec::new(),
            stops: Vec::new(),
            offset: 0.0,
            length: 0.0,
            audio_start: 0.0,
            chart: None,
            required_level: None,
            background: None,
            add_notes: Vec::new(),
            remove_notes: Vec::new(),
            super_notes: Vec::new(),
            read_only: true,
        }
    }

    pub fn song_dir(&self) -> &Path {
        self.definition_path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn display_full_title(&self) -> String {
        if self.subtitle.trim().is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.subtitle)
        }
    }

    /// Replaces the BPM table, keeping it sorted and anchored at phrase 0
    /// with `start_bpm`.
    pub fn set_bpms(&mut self, start_bpm: f64, mut bpms: Vec<(f64, f64)>) {
        bpms.retain(|(p, _)| *p > 0.0);
        bpms.push((0.0, start_bpm));
        bpms.sort_by(|a, b| a.0.total_cmp(&b.0));
        bpms.dedup_by(|later, earlier| {
            if later.0 == earlier.0 {
                earlier.1 = later.1;
                true
            } else {
                false
            }
        });
        // The explicit start BPM wins over a positional entry at 0.
        if let Some(first) = bpms.first_mut() {
            first.1 = start_bpm;
        }
        self.start_bpm = start_bpm;
        self.bpms = bpms;
    }

    /// Stops at the same phrase are merged into one of their summed length.
    pub fn set_stops(&mut self, mut stops: Vec<(f64, f64)>) {
        stops.retain(|(p, beats)| *p >= 0.0 && *beats > 0.0);
        stops.sort_by(|a, b| a.0.total_cmp(&b.0));
        stops.dedup_by(|later, earlier| {
            if later.0 == earlier.0 {
                earlier.1 += later.1;
                true
            } else {
                false
            }
        });
        self.stops = stops;
    }

    pub fn timing_map(&self) -> TimingMap {
        TimingMap::new(&self.bpms, &self.stops)
    }

    pub fn has_tempo_changes(&self) -> bool {
        self.bpms.len() > 1 || !self.stops.is_empty()
    }

    /// Phrase at which play ends.
    pub fn end_phrase(&self) -> f64 {
        let map = self.timing_map();
        map.ms_to_phrase((self.length - self.offset) * 1000.0)
    }

    /// Fails when the audio file cannot be found.
    pub fn validate(&self) -> Result<&Path, LoadError> {
        self.audio_path
            .as_deref()
            .filter(|p| p.is_file())
            .ok_or_else(|| LoadError::AudioMissing(self.definition_path.clone()))
    }

    /// Re-hashes the audio file and compares it with the hash recorded at load.
    pub fn verify_audio(&self) -> Result<(), LoadError> {
        let path = self.validate()?;
        if self.audio_md5.is_empty() {
            return Ok(());
        }
        let actual = crate::game::parsing::simfile::audio_md5(path)?;
        if actual != self.audio_md5 {
            return Err(LoadError::AudioHashMismatch {
                path: path.to_path_buf(),
                expected: self.audio_md5.clone(),
                actual,
            });
        }
        Ok(())
    }

    pub fn min_max_bpm(&self) -> (f64, f64) {
        self.bpms.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, b)| {
            (lo.min(b), hi.max(b))
        })
    }
}

#[derive(Clone, Debug)]
pub struct SongPack {
    pub name: String,
    pub directory: PathBuf,
    pub songs: Vec<Arc<SongData>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub parsed: usize,
    pub cache_hits: usize,
    pub failed: usize,
    pub duplicates: usize,
}

#[derive(Clone, Debug, Default)]
pub struct SongLibrary {
    pub packs: Vec<SongPack>,
    pub summary: LoadSummary,
}

impl SongLibrary {
    pub fn songs(&self) -> impl Iterator<Item = &Arc<SongData>> {
        self.packs.iter().flat_map(|p| p.songs.iter())
    }

    pub fn find_by_title(&self, title: &str) -> Option<&Arc<SongData>> {
        self.songs().find(|s| s.title.eq_ignore_ascii_case(title))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bpm_table_is_anchored_at_zero() {
        let mut song = SongData::new(PathBuf::from("a/b.dwi"), SourceFormat::Dwi);
        song.set_bpms(150.0, vec![(8.0, 200.0), (2.0, 90.0), (8.0, 210.0), (0.0, 1.0)]);
        assert_eq!(song.bpms, vec![(0.0, 150.0), (2.0, 90.0), (8.0, 210.0)]);
        assert_eq!(song.min_max_bpm(), (90.0, 210.0));
        assert!(song.has_tempo_changes());
    }

    #[test]
    fn stops_drop_empty_and_negative_entries() {
        let mut song = SongData::new(PathBuf::from("x.sm"), SourceFormat::Sm);
        song.set_stops(vec![(3.0, 1.0), (-1.0, 2.0), (1.0, 0.0), (0.5, 2.0)]);
        assert_eq!(song.stops, vec![(0.5, 2.0), (3.0, 1.0)]);
    }

    #[test]
    fn stops_on_one_phrase_are_merged() {
        let mut song = SongData::new(PathBuf::from("x.sm"), SourceFormat::Sm);
        song.set_stops(vec![(2.0, 1.0), (1.0, 0.5), (2.0, 0.25)]);
        assert_eq!(song.stops, vec![(1.0, 0.5), (2.0, 1.25)]);
    }

    #[test]
    fn end_phrase_follows_length() {
        let mut song = SongData::new(PathBuf::from("x.sng"), SourceFormat::Sng);
        song.set_bpms(120.0, Vec::new());
        song.offset = 1.0;
        song.length = 21.0;
        // 20 s at 0.5 phrases per second
        assert!((song.end_phrase() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn labels_map_to_preference_order() {
        assert_eq!(ChartDifficulty::from_sm_label("Challenge"), Some(ChartDifficulty::SManiac));
        assert_eq!(ChartDifficulty::from_dwi_label("maniac"), Some(ChartDifficulty::Maniac));
        assert_eq!(ChartDifficulty::from_dwi_label("ONI"), None);
        assert!(ChartDifficulty::Maniac < ChartDifficulty::Edit);
        assert_eq!(SourceFormat::from_path(Path::new("s/Song.DWI")), Some(SourceFormat::Dwi));
    }

    #[test]
    fn missing_audio_fails_validation() {
        let song = SongData::new(PathBuf::from("nowhere/x.sm"), SourceFormat::Sm);
        assert!(matches!(song.validate(), Err(LoadError::AudioMissing(_))));
        assert!(matches!(song.verify_audio(), Err(LoadError::AudioMissing(_))));
    }
}
