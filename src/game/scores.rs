use serde::Serialize;

use crate::game::judgment::{Judgement, JudgementCounts};
use crate::game::player::Difficulty;

// --- Percentage weights ---

const WEIGHT_IDEAL: f64 = 8.0;
const WEIGHT_COOL: f64 = 6.0;
const WEIGHT_OK: f64 = 3.0;
const WEIGHT_BAD: f64 = 1.0;
const WEIGHT_FAIL: f64 = -4.0;
const WEIGHT_FAULT: f64 = -1.0;

// --- Experience ---

const XP_IDEAL: i64 = 3;
const XP_COOL: i64 = 2;
const XP_OK: i64 = 1;

// --- Grade Definitions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Grade {
    SPlus,
    S,
    A,
    B,
    C,
    D,
    E,
    Failed,
}

impl Grade {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SPlus => "S+",
            Self::S => "S",
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::Failed => "F",
        }
    }
}

/// Minimum percentage, grade and XP bonus; checked from the top down.
const GRADE_TABLE: [(f64, Grade, f64); 7] = [
    (97.0, Grade::SPlus, 2.0),
    (93.0, Grade::S, 1.75),
    (85.0, Grade::A, 1.5),
    (75.0, Grade::B, 1.25),
    (65.0, Grade::C, 1.1),
    (50.0, Grade::D, 1.0),
    (f64::NEG_INFINITY, Grade::E, 1.0),
];

/// Weighted accuracy over every judged beatline, as a percentage. Fails and
/// faults count against it, so it can drop below zero.
pub fn percentage(counts: &JudgementCounts, faults: u32) -> f64 {
    let total = counts.total();
    if total == 0 {
        return 0.0;
    }
    let weighted = f64::from(counts.get(Judgement::Ideal)) * WEIGHT_IDEAL
        + f64::from(counts.get(Judgement::Cool)) * WEIGHT_COOL
        + f64::from(counts.get(Judgement::Ok)) * WEIGHT_OK
        + f64::from(counts.get(Judgement::Bad)) * WEIGHT_BAD
        + f64::from(counts.get(Judgement::Fail)) * WEIGHT_FAIL
        + f64::from(faults) * WEIGHT_FAULT;
    weighted / (f64::from(total) * WEIGHT_IDEAL) * 100.0
}

fn grade_row(percent: f64) -> (Grade, f64) {
    GRADE_TABLE
        .iter()
        .find(|(cutoff, _, _)| percent >= *cutoff)
        .map_or((Grade::E, 1.0), |&(_, grade, bonus)| (grade, bonus))
}

pub fn grade_for(percent: f64, ko: bool) -> Grade {
    if ko { Grade::Failed } else { grade_row(percent).0 }
}

pub fn grade_bonus(percent: f64) -> f64 {
    grade_row(percent).1
}

/// Experience for a finished stage: hit points scaled by the grade bonus
/// and the difficulty multiplier.
pub fn experience(counts: &JudgementCounts, faults: u32, difficulty: Difficulty) -> i64 {
    let hits = i64::from(counts.get(Judgement::Ideal)) * XP_IDEAL
        + i64::from(counts.get(Judgement::Cool)) * XP_COOL
        + i64::from(counts.get(Judgement::Ok)) * XP_OK;
    let bonus = grade_bonus(percentage(counts, faults));
    (hits as f64 * bonus * difficulty.xp_multiplier()).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(entries: &[(Judgement, u32)]) -> JudgementCounts {
        let mut counts = JudgementCounts::default();
        for &(j, n) in entries {
            for _ in 0..n {
                counts.record(j);
            }
        }
        counts
    }

    #[test]
    fn percentage_weights() {
        assert_eq!(percentage(&JudgementCounts::default(), 3), 0.0);
        let perfect = tally(&[(Judgement::Ideal, 10)]);
        assert!((percentage(&perfect, 0) - 100.0).abs() < 1e-9);
        // (8 + 6 + 3 + 1 + 0 - 4) / 48 = 14 / 48
        let mixed = tally(&[
            (Judgement::Ideal, 1),
            (Judgement::Cool, 1),
            (Judgement::Ok, 1),
            (Judgement::Bad, 1),
            (Judgement::Miss, 1),
            (Judgement::Fail, 1),
        ]);
        assert!((percentage(&mixed, 0) - 14.0 / 48.0 * 100.0).abs() < 1e-9);
        assert!((percentage(&mixed, 2) - 12.0 / 48.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn grades_check_highest_cutoff_first() {
        assert_eq!(grade_for(100.0, false), Grade::SPlus);
        assert_eq!(grade_for(93.0, false), Grade::S);
        assert_eq!(grade_for(70.0, false), Grade::C);
        assert_eq!(grade_for(-20.0, false), Grade::E);
        assert_eq!(grade_for(100.0, true), Grade::Failed);
        assert_eq!(Grade::SPlus.label(), "S+");
    }

    #[test]
    fn experience_scales_by_grade_and_difficulty() {
        let perfect = tally(&[(Judgement::Ideal, 10)]);
        // 30 hit points, S+ bonus 2.0, Medium multiplier 1.0
        assert_eq!(experience(&perfect, 0, Difficulty::Medium), 60);
        assert_eq!(experience(&perfect, 0, Difficulty::Ruthless), 120);
        let sloppy = tally(&[(Judgement::Ok, 4), (Judgement::Miss, 4)]);
        // 4 hit points, 37.5% -> E bonus 1.0, Beginner 0.5
        assert_eq!(experience(&sloppy, 0, Difficulty::Beginner), 2);
    }
}
