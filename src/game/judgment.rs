use serde::Serialize;
use thiserror::Error;

use crate::game::player::Difficulty;

pub const JUDGEMENT_COUNT: usize = 6;

// Tier scores before streak and multipliers, per completed note.
pub const SCORE_IDEAL: f64 = 1000.0;
pub const SCORE_COOL: i64 = 750;
pub const SCORE_OK: i64 = 500;
pub const SCORE_BAD: i64 = 250;

// Life per completed note.
pub const LIFE_IDEAL: f64 = 1.0;
pub const LIFE_COOL: f64 = 0.5;
pub const LIFE_BAD: f64 = -1.0;

// Momentum per completed note for good hits, or the divisor of the current
// momentum that is taken away for bad ones.
pub const MOMENTUM_IDEAL: i64 = 40;
pub const MOMENTUM_COOL: i64 = 20;
pub const MOMENTUM_BAD_DIVISOR: i64 = 8;
pub const MOMENTUM_MISS_DIVISOR: i64 = 4;
pub const MOMENTUM_FAULT_DIVISOR: i64 = 16;

/// Score multiplier in cooperative play, indexed by how many players are blazing.
pub const COOP_BLAZING_MULTIPLIER: [i64; 5] = [1, 1, 2, 4, 8];
pub const SOLO_BLAZING_MULTIPLIER: i64 = 2;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Judgement {
    Ideal,
    Cool,
    Ok,
    Bad,
    Miss,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JudgementError {
    #[error("judgement tier {0} is out of range")]
    OutOfRange(u8),
}

impl Judgement {
    pub const ALL: [Self; JUDGEMENT_COUNT] =
        [Self::Ideal, Self::Cool, Self::Ok, Self::Bad, Self::Miss, Self::Fail];

    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Decodes a raw tier index. The count sentinel itself decodes to
    /// `Ok(None)` and applies nothing.
    pub fn from_index(raw: u8) -> Result<Option<Self>, JudgementError> {
        let idx = usize::from(raw);
        if idx == JUDGEMENT_COUNT {
            return Ok(None);
        }
        Self::ALL.get(idx).copied().map(Some).ok_or(JudgementError::OutOfRange(raw))
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Ideal => "IDEAL",
            Self::Cool => "COOL",
            Self::Ok => "OK",
            Self::Bad => "BAD",
            Self::Miss => "MISS",
            Self::Fail => "FAIL",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize)]
pub struct JudgementCounts {
    counts: [u32; JUDGEMENT_COUNT],
}

impl JudgementCounts {
    #[inline(always)]
    pub const fn get(&self, judgement: Judgement) -> u32 {
        self.counts[judgement.index()]
    }

    #[inline(always)]
    pub fn record(&mut self, judgement: Judgement) {
        self.counts[judgement.index()] += 1;
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    pub fn clear(&mut self) {
        self.counts = [0; JUDGEMENT_COUNT];
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreakChange {
    Increment,
    Reset,
    Keep,
}

/// Unscaled effects of one judgement on one player.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BaseAdjustment {
    pub score: i64,
    pub life: f64,
    pub streak: StreakChange,
}

/// What actually changed after a judgement was applied.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct JudgementOutcome {
    pub player: usize,
    pub judgement: Judgement,
    pub score_delta: i64,
    pub life_delta: f64,
    pub momentum_delta: i64,
    pub streak: i32,
}

/// Score, life and streak effects before multipliers.
///
/// `streak` is the player's streak before this judgement. `completed` counts
/// the notes the player cleared this beatline, `incomplete` the ones left over.
pub fn base_adjustment(
    judgement: Judgement,
    streak: i32,
    completed: u32,
    incomplete: u32,
    difficulty: Difficulty,
) -> BaseAdjustment {
    let n = f64::from(completed);
    match judgement {
        Judgement::Ideal => {
            let streak = streak.saturating_add(1).max(1);
            // Multiply before dividing so whole streak steps stay exact.
            let score = SCORE_IDEAL * n * f64::from(9 + streak) / 10.0;
            BaseAdjustment {
                score: score as i64,
                life: LIFE_IDEAL * n,
                streak: StreakChange::Increment,
            }
        }
        Judgement::Cool => BaseAdjustment {
            score: SCORE_COOL * i64::from(completed),
            life: LIFE_COOL * n,
            streak: StreakChange::Reset,
        },
        Judgement::Ok => BaseAdjustment {
            score: SCORE_OK * i64::from(completed),
            life: 0.0,
            streak: StreakChange::Reset,
        },
        Judgement::Bad => BaseAdjustment {
            score: SCORE_BAD * i64::from(completed),
            life: LIFE_BAD * n,
            streak: StreakChange::Reset,
        },
        Judgement::Miss => BaseAdjustment {
            score: 0,
            life: difficulty.miss_life_adjust(),
            streak: StreakChange::Keep,
        },
        Judgement::Fail => BaseAdjustment {
            score: 0,
            life: -((1 + difficulty.index()) as f64) * (f64::from(incomplete) + 1.0),
            streak: StreakChange::Reset,
        },
    }
}

/// Change in momentum for a judgement, given the momentum it applies to.
pub fn momentum_adjustment(judgement: Judgement, momentum: i64, completed: u32) -> i64 {
    let n = i64::from(completed);
    match judgement {
        Judgement::Ideal => MOMENTUM_IDEAL * n,
        Judgement::Cool => MOMENTUM_COOL * n,
        Judgement::Ok => 0,
        Judgement::Bad => -(momentum / MOMENTUM_BAD_DIVISOR),
        Judgement::Miss | Judgement::Fail => -(momentum / MOMENTUM_MISS_DIVISOR),
    }
}

pub fn fault_momentum_adjustment(momentum: i64) -> i64 {
    -(momentum / MOMENTUM_FAULT_DIVISOR)
}

/// Inputs to the score multiplier chain, gathered from the session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MultiplierContext {
    pub is_cpu: bool,
    pub human_players: usize,
    pub cooperative: bool,
    pub blazing_players: usize,
    pub player_blazing: bool,
}

/// CPU scores scale with the number of humans in the session. Everyone else
/// scales with blazing: the shared table in cooperative play, a flat bonus
/// for a blazing player otherwise.
pub fn score_multiplier(ctx: MultiplierContext) -> i64 {
    if ctx.is_cpu {
        return ctx.human_players.max(1) as i64;
    }
    if ctx.cooperative {
        let idx = ctx.blazing_players.min(COOP_BLAZING_MULTIPLIER.len() - 1);
        return COOP_BLAZING_MULTIPLIER[idx];
    }
    if ctx.player_blazing { SOLO_BLAZING_MULTIPLIER } else { 1 }
}
