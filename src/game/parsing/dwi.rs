use super::phrase_scan::{self, PhraseSpan};
use super::records::{normalize_notes, parse_number, parse_pairs, strip_comments, tagged_records};
use super::{LoadError, LoadOptions};
use crate::game::song::{ChartDifficulty, SongData, SourceChart, SourceFormat};
use crate::game::timing::{self, TimingMap};
use log::{debug, warn};
use std::path::Path;

/// DWI positions count sixteenth notes: 16 per phrase.
const POSITIONS_PER_PHRASE: f64 = 16.0;
/// Length runs half a beat past the last step.
const TAIL_PHRASES: f64 = 1.0 / 8.0;

pub fn parse(raw: &str, path: &Path, options: &LoadOptions) -> Result<SongData, LoadError> {
    let text = strip_comments(raw);
    let mut song = SongData::new(path.to_path_buf(), SourceFormat::Dwi);

    let mut start_bpm: Option<f64> = None;
    let mut gap_ms = 0.0;
    let mut changes: Vec<(f64, f64)> = Vec::new();
    let mut freezes: Vec<(f64, f64)> = Vec::new();
    let mut charts: Vec<SourceChart> = Vec::new();

    for (key, value) in tagged_records(&text)? {
        match key.as_str() {
            "TITLE" => song.title = value,
            "ARTIST" => song.artist = value,
            "FILE" => song.audio_file = value,
            "BPM" => start_bpm = Some(parse_number("BPM", &value)?),
            "GAP" => gap_ms = parse_number("GAP", &value)?,
            "CHANGEBPM" => {
                changes = parse_pairs("CHANGEBPM", &value, '=')?
                    .into_iter()
                    .map(|(pos, bpm)| (pos / POSITIONS_PER_PHRASE, bpm))
                    .collect();
            }
            "FREEZE" => {
                freezes = parse_pairs("FREEZE", &value, '=')?
                    .into_iter()
                    .map(|(pos, ms)| (pos / POSITIONS_PER_PHRASE, ms))
                    .collect();
            }
            "SINGLE" => {
                let mut parts = value.splitn(3, ':');
                let label = parts.next().unwrap_or_default();
                let _level = parts.next();
                let Some(notes) = parts.next() else {
                    return Err(LoadError::MissingDelimiter { field: "SINGLE".to_string(), delimiter: ':' });
                };
                match ChartDifficulty::from_dwi_label(label) {
                    Some(difficulty) => {
                        // Doubles-style second panel is not played.
                        let notes = notes.split(':').next().unwrap_or_default();
                        charts.retain(|c| c.difficulty != difficulty);
                        charts.push(SourceChart { difficulty, notes: normalize_notes(notes) });
                    }
                    None => debug!("Skipping unknown DWI difficulty '{label}' in {path:?}"),
                }
            }
            _ => {}
        }
    }

    let start_bpm = start_bpm.ok_or(LoadError::MissingField("BPM"))?;
    check_bpm(0.0, start_bpm, options)?;
    for &(phrase, bpm) in &changes {
        check_bpm(phrase, bpm, options)?;
    }

    let chart = select_chart(charts).ok_or(LoadError::NoChart)?;
    let PhraseSpan { first, last } = phrase_scan::scan_dwi(&chart.notes).ok_or(LoadError::NoChart)?;
    song.chart = Some(chart);

    // Freeze lengths are milliseconds at the tempo where they sit.
    let bpm_only = TimingMap::new(&with_origin(start_bpm, &changes), &[]);
    let stops: Vec<(f64, f64)> = freezes
        .iter()
        .map(|&(phrase, ms)| (phrase, timing::ms_to_beats(ms, bpm_only.bpm_at_phrase(phrase))))
        .collect();

    let bpms = with_origin(start_bpm, &changes);
    let map = TimingMap::new(&bpms, &stops);
    let first_ms = map.phrase_to_ms(first);
    let last_ms = map.phrase_to_ms(last + TAIL_PHRASES);

    let offset = gap_ms / 1000.0 + first_ms / 1000.0;
    song.length = offset + (last_ms - first_ms) / 1000.0 + options.offset_adjust;
    song.offset = offset + options.offset_adjust;

    // Phrase 0 becomes the first stepped phrase.
    let origin_bpm = map.bpm_at_phrase(first);
    song.set_bpms(origin_bpm, rebase(&bpms, first));
    song.set_stops(rebase(&stops, first));

    if song.artist.trim().is_empty() {
        warn!("DWI {path:?} has no artist.");
    }
    Ok(song)
}

fn check_bpm(phrase: f64, bpm: f64, options: &LoadOptions) -> Result<(), LoadError> {
    if bpm > 0.0 {
        return Ok(());
    }
    if options.allow_problematic {
        warn!("Keeping non-positive BPM {bpm} at phrase {phrase}.");
        Ok(())
    } else {
        Err(LoadError::InvalidBpm { phrase, bpm })
    }
}

fn with_origin(start_bpm: f64, changes: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut table = Vec::with_capacity(changes.len() + 1);
    table.push((0.0, start_bpm));
    table.extend(changes.iter().copied().filter(|(p, _)| *p > 0.0));
    table.sort_by(|a, b| a.0.total_cmp(&b.0));
    table
}

/// Shifts keys back by `origin`, dropping anything that lands before 0.
fn rebase(table: &[(f64, f64)], origin: f64) -> Vec<(f64, f64)> {
    table
        .iter()
        .map(|&(p, v)| (p - origin, v))
        .filter(|(p, _)| *p >= 0.0)
        .collect()
}

/// First available chart in preference order.
pub(super) fn select_chart(mut charts: Vec<SourceChart>) -> Option<SourceChart> {
    charts.retain(|c| !c.notes.is_empty());
    ChartDifficulty::PREFERENCE
        .iter()
        .find_map(|d| charts.iter().position(|c| c.difficulty == *d))
        .map(|idx| charts.swap_remove(idx))
}
