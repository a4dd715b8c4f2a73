//! The normalized song format: a `#SONG-1.0;` header then `Key=value;`
//! records. Tables are `phrase:value` pairs joined by commas and every
//! number is written with three decimals.

use super::records::{keyed_records, parse_list, parse_number, parse_pairs, strip_comments};
use super::{LoadError, LoadOptions};
use crate::game::song::{SongData, SourceFormat};
use log::warn;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

pub const HEADER: &str = "#SONG-1.0;";

/// Reads a normalized song. Offset and Length are taken as written: the
/// calibration was applied when the file was produced.
pub fn parse(raw: &str, path: &Path, options: &LoadOptions) -> Result<SongData, LoadError> {
    let text = strip_comments(raw);
    let mut song = SongData::new(path.to_path_buf(), SourceFormat::Sng);

    let mut bpms: Option<Vec<(f64, f64)>> = None;
    let mut offset = None;
    let mut length = None;
    let mut audio_file = None;

    for (key, value) in keyed_records(&text)? {
        match key.as_str() {
            "TITLE" => song.title = value,
            "SUBTITLE" => song.subtitle = value,
            "ARTIST" => song.artist = value,
            "BPM" => bpms = Some(parse_bpm_table(&value)?),
            "STOPS" => song.stops = parse_pairs("Stops", &value, ':')?,
            "OFFSET" => offset = Some(parse_number("Offset", &value)?),
            "LENGTH" => length = Some(parse_number("Length", &value)?),
            "AUDIOSTART" => song.audio_start = parse_number("AudioStart", &value)?,
            "AUDIOFILE" => audio_file = Some(value),
            "AUDIOFILEMD5" => song.audio_md5 = value.to_ascii_lowercase(),
            "REQUIREDLEVEL" => {
                song.required_level = Some(parse_number("RequiredLevel", &value)?.max(0.0) as u32);
            }
            "BACKGROUND" if !value.is_empty() => song.background = Some(value),
            "ADDNOTES" => song.add_notes = parse_list("AddNotes", &value)?,
            "REMOVENOTES" => song.remove_notes = parse_list("RemoveNotes", &value)?,
            "SUPERNOTES" => song.super_notes = parse_list("SuperNotes", &value)?,
            _ => {}
        }
    }

    let bpms = bpms.ok_or(LoadError::MissingField("Bpm"))?;
    song.offset = offset.ok_or(LoadError::MissingField("Offset"))?;
    song.length = length.ok_or(LoadError::MissingField("Length"))?;
    song.audio_file = audio_file.ok_or(LoadError::MissingField("AudioFile"))?;

    let start_bpm = bpms
        .iter()
        .find(|(p, _)| *p == 0.0)
        .or_else(|| bpms.first())
        .map(|&(_, b)| b)
        .ok_or(LoadError::MissingField("Bpm"))?;
    for &(phrase, bpm) in &bpms {
        if bpm <= 0.0 {
            if !options.allow_problematic {
                return Err(LoadError::InvalidBpm { phrase, bpm });
            }
            warn!("Keeping non-positive BPM {bpm} at phrase {phrase} in {path:?}.");
        }
    }
    song.set_bpms(start_bpm, bpms);
    let stops = std::mem::take(&mut song.stops);
    song.set_stops(stops);
    Ok(song)
}

/// A bare number is a constant tempo; otherwise a pair table.
fn parse_bpm_table(value: &str) -> Result<Vec<(f64, f64)>, LoadError> {
    if value.contains(':') {
        parse_pairs("Bpm", value, ':')
    } else {
        Ok(vec![(0.0, parse_number("Bpm", value)?)])
    }
}

fn fmt_num(v: f64) -> String {
    format!("{v:.3}")
}

fn fmt_pairs(pairs: &[(f64, f64)]) -> String {
    pairs
        .iter()
        .map(|&(p, v)| format!("{}:{}", fmt_num(p), fmt_num(v)))
        .collect::<Vec<_>>()
        .join(",")
}

fn fmt_list(values: &[f64]) -> String {
    values.iter().map(|&v| fmt_num(v)).collect::<Vec<_>>().join(",")
}

/// Renders a song in the normalized format.
pub fn to_sng_string(song: &SongData) -> String {
    let mut out = String::with_capacity(512);
    out.push_str(HEADER);
    out.push('\n');
    let mut record = |key: &str, value: &str| {
        let _ = writeln!(out, "{key}={value};");
    };
    record("Title", &song.title);
    record("Subtitle", &song.subtitle);
    record("Artist", &song.artist);
    record("Bpm", &fmt_pairs(&song.bpms));
    if !song.stops.is_empty() {
        record("Stops", &fmt_pairs(&song.stops));
    }
    record("Offset", &fmt_num(song.offset));
    record("AudioStart", &fmt_num(song.audio_start));
    record("Length", &fmt_num(song.length));
    record("AudioFile", &song.audio_file);
    record("AudioFileMD5", &song.audio_md5);
    if let Some(level) = song.required_level {
        record("RequiredLevel", &level.to_string());
    }
    if let Some(background) = song.background.as_deref() {
        record("Background", background);
    }
    if !song.add_notes.is_empty() {
        record("AddNotes", &fmt_list(&song.add_notes));
    }
    if !song.remove_notes.is_empty() {
        record("RemoveNotes", &fmt_list(&song.remove_notes));
    }
    if !song.super_notes.is_empty() {
        record("SuperNotes", &fmt_list(&song.super_notes));
    }
    out
}

/// Reads the `SourceHash` record a cache file carries, if any.
pub fn source_hash(raw: &str) -> Option<u64> {
    let text = strip_comments(raw);
    keyed_records(&text)
        .ok()?
        .into_iter()
        .find(|(k, _)| k == "SOURCEHASH")
        .and_then(|(_, v)| u64::from_str_radix(&v, 16).ok())
}

/// Writes `song` to `path`, tagged with the hash of the file it came from.
/// The descriptor must have been unlocked for this one write; it is locked
/// again whatever the outcome.
pub fn write(song: &mut SongData, path: &Path, source_hash: Option<u64>) -> Result<(), LoadError> {
    if song.read_only {
        return Err(LoadError::ReadOnly(song.definition_path.clone()));
    }
    let mut text = to_sng_string(song);
    if let Some(hash) = source_hash {
        let _ = writeln!(text, "SourceHash={hash:x};");
    }
    let result = fs::write(path, text).map_err(|e| LoadError::io(path, e));
    song.read_only = true;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn sample() -> SongData {
        let mut song = SongData::new(PathBuf::from("songs/p/s/s.dwi"), SourceFormat::Dwi);
        song.title = "Normal Song".to_string();
        song.artist = "Artist".to_string();
        song.set_bpms(140.0, vec![(8.0, 70.0)]);
        song.set_stops(vec![(2.5, 1.0)]);
        song.offset = 1.23456;
        song.length = 95.0;
        song.audio_file = "song.ogg".to_string();
        song.audio_md5 = "0123456789abcdef0123456789abcdef".to_string();
        song.required_level = Some(3);
        song
    }

    #[test]
    fn writer_output() {
        let text = to_sng_string(&sample());
        assert_eq!(
            text,
            "#SONG-1.0;\n\
             Title=Normal Song;\n\
             Subtitle=;\n\
             Artist=Artist;\n\
             Bpm=0.000:140.000,8.000:70.000;\n\
             Stops=2.500:1.000;\n\
             Offset=1.235;\n\
             AudioStart=0.000;\n\
             Length=95.000;\n\
             AudioFile=song.ogg;\n\
             AudioFileMD5=0123456789abcdef0123456789abcdef;\n\
             RequiredLevel=3;\n"
        );
    }

    #[test]
    fn written_songs_read_back() {
        let original = sample();
        let text = to_sng_string(&original);
        let song = parse(&text, Path::new("cache/x.sng"), &LoadOptions::default()).expect("parses");
        assert_eq!(song.title, original.title);
        assert_eq!(song.bpms, original.bpms);
        assert_eq!(song.stops, original.stops);
        assert!((song.offset - 1.235).abs() < 1e-9);
        assert_eq!(song.audio_md5, original.audio_md5);
        assert_eq!(song.required_level, Some(3));
        assert_eq!(song.format, SourceFormat::Sng);
        assert!(song.read_only);
    }

    #[test]
    fn constant_bpm_shorthand_and_required_keys() {
        let raw = "#SONG-1.0;Title=A;Bpm=150;Offset=0.5;Length=60;AudioFile=a.mp3;";
        let song = parse(raw, Path::new("a.sng"), &LoadOptions::default()).expect("parses");
        assert_eq!(song.bpms, vec![(0.0, 150.0)]);

        let raw = "#SONG-1.0;Title=A;Bpm=150;Length=60;AudioFile=a.mp3;";
        assert!(matches!(
            parse(raw, Path::new("a.sng"), &LoadOptions::default()),
            Err(LoadError::MissingField("Offset"))
        ));
    }

    #[test]
    fn read_only_songs_are_not_written() {
        let mut song = sample();
        let path = std::env::temp_dir().join("wgibeat-sng-readonly-test.sng");
        assert!(matches!(write(&mut song, &path, None), Err(LoadError::ReadOnly(_))));

        song.read_only = false;
        write(&mut song, &path, Some(0xbeef)).expect("writable");
        assert!(song.read_only);
        let back = fs::read_to_string(&path).expect("written");
        assert!(back.starts_with(HEADER));
        assert_eq!(source_hash(&back), Some(0xbeef));
        assert!(parse(&back, &path, &LoadOptions::default()).is_ok());
        let _ = fs::remove_file(&path);
    }
}
