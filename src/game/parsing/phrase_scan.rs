//! Finds the first and last stepped phrase of a raw note string.

// DWI subdivisions, in phrases per token.
const STEP_EIGHTH: f64 = 1.0 / 8.0;
const STEP_SIXTEENTH: f64 = 1.0 / 16.0;
const STEP_TWENTY_FOURTH: f64 = 1.0 / 24.0;
const STEP_SIXTY_FOURTH: f64 = 1.0 / 64.0;
const STEP_192ND: f64 = 1.0 / 192.0;

/// Phrase positions of the first and last non-empty step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhraseSpan {
    pub first: f64,
    pub last: f64,
}

impl PhraseSpan {
    fn record(span: &mut Option<Self>, pos: f64) {
        match span {
            Some(s) => s.last = pos,
            None => *span = Some(Self { first: pos, last: pos }),
        }
    }
}

/// Walks a DWI step string. Each token advances by the current subdivision,
/// which `(`, `[`, `{` and `` ` `` switch and `)`, `]`, `}` and `'` reset to
/// eighths. `!` consumes the following hold character without advancing,
/// and a `<...>` group counts as a single token.
pub fn scan_dwi(notes: &str) -> Option<PhraseSpan> {
    let mut span = None;
    let mut pos = 0.0;
    let mut step = STEP_EIGHTH;
    let mut group: Option<bool> = None;
    let mut chars = notes.chars();

    while let Some(c) = chars.next() {
        match c {
            '(' => step = STEP_SIXTEENTH,
            '[' => step = STEP_TWENTY_FOURTH,
            '{' => step = STEP_SIXTY_FOURTH,
            '`' => step = STEP_192ND,
            ')' | ']' | '}' | '\'' => step = STEP_EIGHTH,
            '!' => {
                chars.next();
            }
            '<' => group = Some(false),
            '>' => {
                if group.take() == Some(true) {
                    PhraseSpan::record(&mut span, pos);
                }
                pos += step;
            }
            c if c.is_whitespace() => {}
            c => {
                let stepped = c != '0';
                match group.as_mut() {
                    Some(any) => *any |= stepped,
                    None => {
                        if stepped {
                            PhraseSpan::record(&mut span, pos);
                        }
                        pos += step;
                    }
                }
            }
        }
    }
    span
}

/// Walks SM measures (`,`-separated, `lanes` characters per row). Tap,
/// hold and roll heads count as steps.
pub fn scan_sm(notes: &str, lanes: usize) -> Option<PhraseSpan> {
    let lanes = lanes.max(1);
    let mut span = None;
    for (measure_idx, measure) in notes.split(',').enumerate() {
        let row_chars: Vec<char> = measure.chars().filter(|c| !c.is_whitespace()).collect();
        let rows = row_chars.len() / lanes;
        if rows == 0 {
            continue;
        }
        for (row_idx, row) in row_chars.chunks_exact(lanes).enumerate() {
            if row.iter().any(|c| matches!(c, '1' | '2' | '4')) {
                let pos = measure_idx as f64 + row_idx as f64 / rows as f64;
                PhraseSpan::record(&mut span, pos);
            }
        }
    }
    span
}
