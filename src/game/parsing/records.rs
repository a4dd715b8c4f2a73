//! Field-record splitting shared by the DWI, SM and SNG readers.

use super::LoadError;

/// Drops `//` comments and joins the remaining lines without separators.
pub fn strip_comments(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for line in raw.lines() {
        let line = line.split_once("//").map_or(line, |(head, _)| head);
        out.push_str(line.trim());
    }
    out
}

/// Splits `#KEY:value;` records. Keys are uppercased; chunks that do not
/// start with `#` are skipped.
pub fn tagged_records(text: &str) -> Result<Vec<(String, String)>, LoadError> {
    let mut out = Vec::new();
    for chunk in text.split(';') {
        let chunk = chunk.trim();
        let Some(body) = chunk.strip_prefix('#') else {
            continue;
        };
        let (key, value) = body.split_once(':').ok_or_else(|| LoadError::MissingDelimiter {
            field: body.to_string(),
            delimiter: ':',
        })?;
        out.push((key.trim().to_ascii_uppercase(), value.trim().to_string()));
    }
    Ok(out)
}

/// Splits `Key=value;` records, skipping the `#SONG-x.y` header.
pub fn keyed_records(text: &str) -> Result<Vec<(String, String)>, LoadError> {
    let mut out = Vec::new();
    for chunk in text.split(';') {
        let chunk = chunk.trim();
        if chunk.is_empty() || chunk.starts_with('#') {
            continue;
        }
        let (key, value) = chunk.split_once('=').ok_or_else(|| LoadError::MissingDelimiter {
            field: chunk.to_string(),
            delimiter: '=',
        })?;
        out.push((key.trim().to_ascii_uppercase(), value.trim().to_string()));
    }
    Ok(out)
}

pub fn parse_number(field: &str, value: &str) -> Result<f64, LoadError> {
    let value = value.trim();
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| LoadError::InvalidNumber { field: field.to_string(), value: value.to_string() })
}

/// Parses `a<sep>b,c<sep>d` into number pairs; empty entries are skipped.
pub fn parse_pairs(field: &str, value: &str, sep: char) -> Result<Vec<(f64, f64)>, LoadError> {
    let mut out = Vec::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (a, b) = entry.split_once(sep).ok_or_else(|| LoadError::MissingDelimiter {
            field: field.to_string(),
            delimiter: sep,
        })?;
        out.push((parse_number(field, a)?, parse_number(field, b)?));
    }
    Ok(out)
}

pub fn parse_list(field: &str, value: &str) -> Result<Vec<f64>, LoadError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(|e| parse_number(field, e))
        .collect()
}

/// Removes every whitespace character from a note string.
pub fn normalize_notes(notes: &str) -> String {
    notes.chars().filter(|c| !c.is_whitespace()).collect()
}
