// Shared hit window definitions so gameplay and any results display agree.

use crate::game::judgment::Judgement;

// All base windows are in milliseconds, measured either side of a beatline.
pub const BASE_IDEAL_MS: f64 = 20.0;
pub const BASE_COOL_MS: f64 = 50.0;
pub const BASE_OK_MS: f64 = 100.0;
pub const BASE_BAD_MS: f64 = 135.0;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimingProfile {
    pub ideal_ms: f64,
    pub cool_ms: f64,
    pub ok_ms: f64,
    pub bad_ms: f64,
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self {
            ideal_ms: BASE_IDEAL_MS,
            cool_ms: BASE_COOL_MS,
            ok_ms: BASE_OK_MS,
            bad_ms: BASE_BAD_MS,
        }
    }
}

impl TimingProfile {
    /// Forces the windows to be positive and nested, widest last.
    #[must_use]
    pub fn sanitized(self) -> Self {
        let ideal_ms = self.ideal_ms.abs().max(1.0);
        let cool_ms = self.cool_ms.abs().max(ideal_ms);
        let ok_ms = self.ok_ms.abs().max(cool_ms);
        let bad_ms = self.bad_ms.abs().max(ok_ms);
        Self { ideal_ms, cool_ms, ok_ms, bad_ms }
    }

    /// Outer edge of the last window; a beatline further away than this is
    /// either not yet reachable or already missed.
    #[inline(always)]
    pub const fn outer_ms(&self) -> f64 {
        self.bad_ms
    }

    /// Classify a signed offset from a beatline. `None` means the press is
    /// outside every window and should be ignored.
    #[inline(always)]
    pub fn classify_offset_ms(&self, offset_ms: f64) -> Option<Judgement> {
        let abs = offset_ms.abs();
        if abs <= self.ideal_ms {
            Some(Judgement::Ideal)
        } else if abs <= self.cool_ms {
            Some(Judgement::Cool)
        } else if abs <= self.ok_ms {
            Some(Judgement::Ok)
        } else if abs <= self.bad_ms {
            Some(Judgement::Bad)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_fall_into_nested_windows() {
        let p = TimingProfile::default();
        assert_eq!(p.classify_offset_ms(-12.0), Some(Judgement::Ideal));
        assert_eq!(p.classify_offset_ms(45.0), Some(Judgement::Cool));
        assert_eq!(p.classify_offset_ms(-100.0), Some(Judgement::Ok));
        assert_eq!(p.classify_offset_ms(130.0), Some(Judgement::Bad));
        assert_eq!(p.classify_offset_ms(300.0), None);
    }

    #[test]
    fn sanitizing_restores_window_order() {
        let p = TimingProfile { ideal_ms: 40.0, cool_ms: 10.0, ok_ms: -80.0, bad_ms: 60.0 }.sanitized();
        assert!(p.ideal_ms <= p.cool_ms && p.cool_ms <= p.ok_ms && p.ok_ms <= p.bad_ms);
        assert!((p.ok_ms - 80.0).abs() < 1e-9);
    }
}
