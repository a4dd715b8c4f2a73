use log::{debug, warn};
use std::cmp::Ordering;

// Phrase unit: one bar of 4 beats. Phrases advance at `bpm / 240` per second.
pub const BEATS_PER_PHRASE: f64 = 4.0;
pub const PHRASE_BPM_DIVISOR: f64 = 240.0;
pub const FALLBACK_BPM: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimingKind {
    // Declared first so a BPM change sorts ahead of a stop sharing its phrase.
    BpmChange,
    Stop,
}

#[derive(Debug, Clone, Copy)]
pub struct TimingPoint {
    pub kind: TimingKind,
    pub phrase: f64,
    /// BPM value for a change, stop length in beats for a stop.
    pub amount: f64,
    /// Cached position in milliseconds, resolved from the points before this one.
    ms: f64,
    /// BPM in effect once this point has been passed.
    bpm: f64,
}

impl TimingPoint {
    #[inline(always)]
    pub const fn ms(&self) -> f64 {
        self.ms
    }

    #[inline(always)]
    pub const fn bpm(&self) -> f64 {
        self.bpm
    }

    #[inline(always)]
    fn stop_ms(&self) -> f64 {
        match self.kind {
            TimingKind::Stop => beats_to_ms(self.amount, self.bpm),
            TimingKind::BpmChange => 0.0,
        }
    }
}

#[inline(always)]
pub fn beats_to_ms(beats: f64, bpm: f64) -> f64 {
    if bpm == 0.0 { 0.0 } else { beats * 60_000.0 / bpm }
}

#[inline(always)]
pub fn ms_to_beats(ms: f64, bpm: f64) -> f64 {
    ms * bpm / 60_000.0
}

#[inline(always)]
fn phrases_to_ms(phrases: f64, bpm: f64) -> f64 {
    if bpm == 0.0 { 0.0 } else { phrases * 1000.0 * PHRASE_BPM_DIVISOR / bpm }
}

#[inline(always)]
fn ms_to_phrases(ms: f64, bpm: f64) -> f64 {
    (ms / 1000.0) * (bpm / PHRASE_BPM_DIVISOR)
}

/// Resolves a phrase to milliseconds against points that already carry their
/// own cached position. Uses the last point strictly before `phrase`.
fn resolve_ms(resolved: &[TimingPoint], phrase: f64) -> f64 {
    let idx = resolved.partition_point(|p| p.phrase < phrase);
    let Some(base) = resolved.get(idx.saturating_sub(1)) else {
        return 0.0;
    };
    let mut ms = base.ms;
    if idx > 0 {
        ms += base.stop_ms();
    }
    ms + phrases_to_ms(phrase - base.phrase, base.bpm)
}

/// Piecewise-constant BPM timeline with stops, converting between elapsed
/// playback milliseconds and phrase position.
///
/// Built once per song; every lookup afterwards is a binary search over the
/// sorted breakpoints. A BPM change at phrase 0 is always present.
#[derive(Debug, Clone)]
pub struct TimingMap {
    points: Vec<TimingPoint>,
}

impl TimingMap {
    /// Builds the map from `phrase -> bpm` and `phrase -> stop beats` tables.
    ///
    /// Points at negative phrases and non-finite values are dropped. When the
    /// BPM table has no entry at phrase 0, its earliest value is used there
    /// (or 120 if the table is empty).
    pub fn new(bpms: &[(f64, f64)], stops: &[(f64, f64)]) -> Self {
        let mut points: Vec<TimingPoint> = Vec::with_capacity(bpms.len() + stops.len() + 1);

        for &(phrase, bpm) in bpms {
            if !phrase.is_finite() || !bpm.is_finite() || phrase < 0.0 {
                debug!("Dropping BPM point {phrase}={bpm}");
                continue;
            }
            points.push(TimingPoint { kind: TimingKind::BpmChange, phrase, amount: bpm, ms: 0.0, bpm });
        }

        if !points.iter().any(|p| p.phrase == 0.0) {
            let start_bpm = points
                .iter()
                .min_by(|a, b| a.phrase.total_cmp(&b.phrase))
                .map_or(FALLBACK_BPM, |p| p.amount);
            if points.is_empty() {
                warn!("Timing map built without any BPM; assuming {FALLBACK_BPM}.");
            }
            points.push(TimingPoint {
                kind: TimingKind::BpmChange,
                phrase: 0.0,
                amount: start_bpm,
                ms: 0.0,
                bpm: start_bpm,
            });
        }

        for &(phrase, beats) in stops {
            if !phrase.is_finite() || !beats.is_finite() || phrase < 0.0 || beats <= 0.0 {
                debug!("Dropping stop point {phrase}={beats}");
                continue;
            }
            points.push(TimingPoint { kind: TimingKind::Stop, phrase, amount: beats, ms: 0.0, bpm: 0.0 });
        }

        points.sort_by(|a, b| match a.phrase.total_cmp(&b.phrase) {
            Ordering::Equal => a.kind.cmp(&b.kind),
            ord => ord,
        });
        // Stops sharing a phrase act as one longer stop.
        points.dedup_by(|later, earlier| {
            let same_stop = later.kind == TimingKind::Stop
                && earlier.kind == TimingKind::Stop
                && later.phrase == earlier.phrase;
            if same_stop {
                earlier.amount += later.amount;
            }
            same_stop
        });

        // Forward pass: each point only ever looks at points already resolved.
        for i in 0..points.len() {
            let (resolved, rest) = points.split_at_mut(i);
            let point = &mut rest[0];
            point.bpm = match point.kind {
                TimingKind::BpmChange => point.amount,
                TimingKind::Stop => resolved.last().map_or(FALLBACK_BPM, |p| p.bpm),
            };
            point.ms = resolve_ms(resolved, point.phrase);
        }

        Self { points }
    }

    /// A map with a single tempo and no stops.
    pub fn constant(bpm: f64) -> Self {
        Self::new(&[(0.0, bpm)], &[])
    }

    pub fn points(&self) -> &[TimingPoint] {
        &self.points
    }

    #[inline(always)]
    fn origin(&self) -> TimingPoint {
        self.points.first().copied().unwrap_or(TimingPoint {
            kind: TimingKind::BpmChange,
            phrase: 0.0,
            amount: 0.0,
            ms: 0.0,
            bpm: 0.0,
        })
    }

    /// Index of the last point whose cached position is at or before `ms`.
    #[inline(always)]
    fn point_index_for_ms(&self, ms: f64) -> Option<usize> {
        self.points.partition_point(|p| p.ms <= ms).checked_sub(1)
    }

    pub fn ms_to_phrase(&self, ms: f64) -> f64 {
        let Some(idx) = self.point_index_for_ms(ms) else {
            let origin = self.origin();
            return origin.phrase + ms_to_phrases(ms - origin.ms, origin.bpm);
        };
        let base = self.points[idx];
        let mut remaining = ms - base.ms;
        if base.kind == TimingKind::Stop {
            let stop_ms = base.stop_ms();
            if remaining < stop_ms {
                // Inside the stop: phrase holds still.
                remaining = 0.0;
            } else {
                remaining -= stop_ms;
            }
        }
        base.phrase + ms_to_phrases(remaining, base.bpm)
    }

    pub fn phrase_to_ms(&self, phrase: f64) -> f64 {
        resolve_ms(&self.points, phrase)
    }

    /// BPM in effect at `ms`. Zero only for a map without points, which the
    /// constructor never produces.
    pub fn bpm_at_ms(&self, ms: f64) -> f64 {
        match self.point_index_for_ms(ms) {
            Some(idx) => self.points[idx].bpm,
            None => self.origin().bpm,
        }
    }

    pub fn bpm_at_phrase(&self, phrase: f64) -> f64 {
        let idx = self.points.partition_point(|p| p.phrase <= phrase);
        match idx.checked_sub(1) {
            Some(i) => self.points[i].bpm,
            None => self.origin().bpm,
        }
    }

    pub fn is_stopped_at_ms(&self, ms: f64) -> bool {
        self.point_index_for_ms(ms).is_some_and(|idx| {
            let base = self.points[idx];
            base.kind == TimingKind::Stop && ms - base.ms < base.stop_ms()
        })
    }

    /// Smallest and largest BPM values in the map.
    pub fn bpm_range(&self) -> (f64, f64) {
        self.points
            .iter()
            .filter(|p| p.kind == TimingKind::BpmChange)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.amount), hi.max(p.amount)))
    }

    pub fn has_stops(&self) -> bool {
        self.points.iter().any(|p| p.kind == TimingKind::Stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn phrase_zero_is_time_zero() {
        for bpm in [60.0, 120.0, 173.5] {
            assert!(TimingMap::constant(bpm).phrase_to_ms(0.0).abs() < EPS);
        }
    }

    #[test]
    fn one_phrase_at_120_bpm_is_two_seconds() {
        let map = TimingMap::constant(120.0);
        assert!((map.phrase_to_ms(1.0) - 2000.0).abs() < EPS);
        assert!((map.ms_to_phrase(2000.0) - 1.0).abs() < EPS);
    }

    #[test]
    fn constant_bpm_round_trips() {
        let map = TimingMap::constant(147.0);
        for i in 0..200 {
            let p = f64::from(i) * 0.37;
            assert!((map.ms_to_phrase(map.phrase_to_ms(p)) - p).abs() < 1e-6, "p={p}");
        }
    }

    #[test]
    fn stop_freezes_phrase_for_its_duration() {
        let map = TimingMap::new(&[(0.0, 120.0)], &[(1.0, 2.0)]);
        let start = map.phrase_to_ms(1.0);
        assert!((start - 2000.0).abs() < EPS);
        let stop_len = 2.0 * (60_000.0 / 120.0);

        for t in [start, start + 1.0, start + stop_len * 0.5, start + stop_len - 1.0] {
            assert!((map.ms_to_phrase(t) - 1.0).abs() < EPS, "t={t}");
            assert!(map.is_stopped_at_ms(t));
        }
        // Half a phrase after the stop ends.
        let after = start + stop_len + 1000.0;
        assert!((map.ms_to_phrase(after) - 1.5).abs() < EPS);
        assert!(!map.is_stopped_at_ms(after));
    }

    #[test]
    fn phrase_after_stop_includes_stop_time() {
        let map = TimingMap::new(&[(0.0, 120.0)], &[(1.0, 2.0)]);
        // 2 s for the first phrase, 1 s of stop, 1 s for half a phrase.
        assert!((map.phrase_to_ms(1.5) - 4000.0).abs() < EPS);
        // The stop phrase itself resolves to the start of the stop.
        assert!((map.phrase_to_ms(1.0) - 2000.0).abs() < EPS);
    }

    #[test]
    fn bpm_changes_are_piecewise() {
        let map = TimingMap::new(&[(0.0, 120.0), (2.0, 240.0)], &[]);
        assert!((map.phrase_to_ms(2.0) - 4000.0).abs() < EPS);
        assert!((map.phrase_to_ms(3.0) - 5000.0).abs() < EPS);
        assert!((map.ms_to_phrase(4500.0) - 2.5).abs() < EPS);
        assert!((map.bpm_at_ms(3999.0) - 120.0).abs() < EPS);
        assert!((map.bpm_at_ms(4000.0) - 240.0).abs() < EPS);
        assert!((map.bpm_at_phrase(2.0) - 240.0).abs() < EPS);
    }

    #[test]
    fn stop_and_bpm_change_on_same_phrase() {
        let map = TimingMap::new(&[(0.0, 120.0), (1.0, 60.0)], &[(1.0, 1.0)]);
        // The stop uses the new tempo: 1 beat at 60 BPM = 1 s.
        assert!((map.ms_to_phrase(2500.0) - 1.0).abs() < EPS);
        assert!((map.ms_to_phrase(3000.0) - 1.0).abs() < EPS);
        assert!((map.phrase_to_ms(1.25) - 4000.0).abs() < EPS);
        assert_eq!(map.points()[1].kind, TimingKind::BpmChange);
        assert_eq!(map.points()[2].kind, TimingKind::Stop);
    }

    #[test]
    fn stops_on_one_phrase_add_up() {
        let map = TimingMap::new(&[(0.0, 120.0)], &[(1.0, 1.0), (1.0, 1.0), (2.0, 1.0)]);
        assert_eq!(map.points().len(), 3);
        // 2 beats of stop at phrase 1: held from 2000 to 3000 ms.
        assert!((map.ms_to_phrase(2900.0) - 1.0).abs() < EPS);
        assert!((map.phrase_to_ms(1.5) - 4000.0).abs() < EPS);
        assert!((map.phrase_to_ms(2.0) - 5000.0).abs() < EPS);
    }

    #[test]
    fn missing_origin_bpm_is_seeded() {
        let map = TimingMap::new(&[(4.0, 150.0)], &[]);
        assert_eq!(map.points().len(), 2);
        assert!((map.bpm_at_phrase(0.0) - 150.0).abs() < EPS);

        let empty = TimingMap::new(&[], &[]);
        assert!((empty.bpm_at_ms(10_000.0) - FALLBACK_BPM).abs() < EPS);
    }

    #[test]
    fn cached_positions_never_decrease() {
        let map = TimingMap::new(
            &[(0.0, 140.0), (3.25, 70.0), (8.0, 200.0)],
            &[(1.0, 0.5), (3.25, 4.0), (9.5, 1.0)],
        );
        for pair in map.points().windows(2) {
            assert!(pair[0].ms() <= pair[1].ms());
        }
        assert!(map.has_stops());
        assert_eq!(map.bpm_range(), (70.0, 200.0));
    }

    #[test]
    fn time_before_origin_extrapolates() {
        let map = TimingMap::constant(120.0);
        assert!((map.ms_to_phrase(-1000.0) + 0.5).abs() < EPS);
        assert!((map.phrase_to_ms(-0.5) + 1000.0).abs() < EPS);
    }
}
