use super::dwi::select_chart;
use super::phrase_scan::{self, PhraseSpan};
use super::records::{normalize_notes, parse_number, parse_pairs, strip_comments, tagged_records};
use super::{LoadError, LoadOptions};
use crate::game::song::{ChartDifficulty, SongData, SourceChart, SourceFormat};
use crate::game::timing::{self, BEATS_PER_PHRASE, TimingMap};
use log::{debug, warn};
use std::path::Path;

const SINGLE_STYLE: &str = "dance-single";
const SINGLE_LANES: usize = 4;
const TAIL_PHRASES: f64 = 1.0 / 8.0;

/// SM files keep their own beat 0 as phrase 0; nothing is rebased.
pub fn parse(raw: &str, path: &Path, options: &LoadOptions) -> Result<SongData, LoadError> {
    let text = strip_comments(raw);
    let mut song = SongData::new(path.to_path_buf(), SourceFormat::Sm);

    let mut sm_offset = 0.0;
    let mut bpms: Vec<(f64, f64)> = Vec::new();
    let mut stop_seconds: Vec<(f64, f64)> = Vec::new();
    let mut charts: Vec<SourceChart> = Vec::new();

    for (key, value) in tagged_records(&text)? {
        match key.as_str() {
            "TITLE" => song.title = value,
            "SUBTITLE" => song.subtitle = value,
            "ARTIST" => song.artist = value,
            "MUSIC" => song.audio_file = value,
            "BACKGROUND" if !value.is_empty() => song.background = Some(value),
            "OFFSET" => sm_offset = parse_number("OFFSET", &value)?,
            "BPMS" => {
                bpms = parse_pairs("BPMS", &value, '=')?
                    .into_iter()
                    .map(|(beat, bpm)| (beat / BEATS_PER_PHRASE, bpm))
                    .collect();
            }
            "STOPS" | "FREEZES" => {
                stop_seconds = parse_pairs(&key, &value, '=')?
                    .into_iter()
                    .map(|(beat, secs)| (beat / BEATS_PER_PHRASE, secs))
                    .collect();
            }
            "NOTES" => {
                if let Some(chart) = parse_notes_field(&value)? {
                    charts.retain(|c| c.difficulty != chart.difficulty);
                    charts.push(chart);
                }
            }
            _ => {}
        }
    }

    bpms.sort_by(|a, b| a.0.total_cmp(&b.0));
    let start_bpm = bpms.first().map(|&(_, b)| b).ok_or(LoadError::MissingField("BPMS"))?;
    for &(phrase, bpm) in &bpms {
        if bpm <= 0.0 {
            if !options.allow_problematic {
                return Err(LoadError::InvalidBpm { phrase, bpm });
            }
            warn!("Keeping non-positive BPM {bpm} at phrase {phrase} in {path:?}.");
        }
    }

    if bpms.len() > 1 {
        warn!("SM {path:?} has {} BPM values.", bpms.len());
        if !options.allow_problematic {
            return Err(LoadError::MultipleBpms(bpms.len()));
        }
    }
    if !stop_seconds.is_empty() {
        warn!("SM {path:?} has {} stops.", stop_seconds.len());
        if !options.allow_problematic {
            return Err(LoadError::StopsPresent(stop_seconds.len()));
        }
    }

    let chart = select_chart(charts).ok_or(LoadError::NoChart)?;
    let PhraseSpan { last, .. } =
        phrase_scan::scan_sm(&chart.notes, SINGLE_LANES).ok_or(LoadError::NoChart)?;
    song.chart = Some(chart);

    let bpm_only = TimingMap::new(&bpms, &[]);
    let stops: Vec<(f64, f64)> = stop_seconds
        .iter()
        .map(|&(phrase, secs)| {
            (phrase, timing::ms_to_beats(secs * 1000.0, bpm_only.bpm_at_phrase(phrase)))
        })
        .collect();
    let map = TimingMap::new(&bpms, &stops);

    let beat0 = -sm_offset;
    song.length = beat0 + map.phrase_to_ms(last + TAIL_PHRASES) / 1000.0 + options.offset_adjust;
    song.offset = beat0 + options.offset_adjust;
    song.set_bpms(start_bpm, bpms);
    song.set_stops(stops);
    Ok(song)
}

/// `style:author:difficulty:meter:radar:notes`. Returns `None` for other
/// styles and unknown difficulties.
fn parse_notes_field(value: &str) -> Result<Option<SourceChart>, LoadError> {
    let parts: Vec<&str> = value.splitn(6, ':').map(str::trim).collect();
    let [style, _author, difficulty, _meter, _radar, notes] = parts.as_slice() else {
        return Err(LoadError::MissingDelimiter { field: "NOTES".to_string(), delimiter: ':' });
    };
    if !style.eq_ignore_ascii_case(SINGLE_STYLE) {
        debug!("Skipping {style} chart.");
        return Ok(None);
    }
    Ok(ChartDifficulty::from_sm_label(difficulty)
        .map(|difficulty| SourceChart { difficulty, notes: normalize_notes(notes) }))
}
