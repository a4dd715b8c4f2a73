use bitflags::bitflags;
use serde::Serialize;

use crate::game::judgment::JudgementCounts;
use crate::game::life;
use crate::game::scores;

pub const DIFFICULTY_COUNT: usize = 6;

// Per-difficulty tables, indexed by `Difficulty::index`.
const MISS_LIFE_ADJUST: [f64; DIFFICULTY_COUNT] = [-2.0, -4.0, -6.0, -8.0, -10.0, -12.0];
const MAX_LEVEL: [i32; DIFFICULTY_COUNT] = [3, 5, 7, 9, 11, 13];
const START_MOMENTUM: [i64; DIFFICULTY_COUNT] = [0, 25, 50, 100, 200, 300];
const XP_MULTIPLIER: [f64; DIFFICULTY_COUNT] = [0.5, 0.75, 1.0, 1.25, 1.5, 2.0];

// Level curve: log base 1.5 of (momentum + 150) / 100.
const LEVEL_LOG_BASE: f64 = 1.5;
const LEVEL_MOMENTUM_OFFSET: f64 = 150.0;
const LEVEL_MOMENTUM_SCALE: f64 = 100.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Difficulty {
    Beginner,
    Easy,
    Medium,
    Hard,
    Insane,
    Ruthless,
}

impl Difficulty {
    pub const ALL: [Self; DIFFICULTY_COUNT] =
        [Self::Beginner, Self::Easy, Self::Medium, Self::Hard, Self::Insane, Self::Ruthless];

    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline(always)]
    pub const fn miss_life_adjust(self) -> f64 {
        MISS_LIFE_ADJUST[self.index()]
    }

    #[inline(always)]
    pub const fn max_level(self) -> i32 {
        MAX_LEVEL[self.index()]
    }

    #[inline(always)]
    pub const fn start_momentum(self) -> i64 {
        START_MOMENTUM[self.index()]
    }

    #[inline(always)]
    pub const fn xp_multiplier(self) -> f64 {
        XP_MULTIPLIER[self.index()]
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Some(Self::Beginner),
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            "insane" => Some(Self::Insane),
            "ruthless" => Some(Self::Ruthless),
            _ => None,
        }
    }
}

/// Note-density level for a momentum value: 1 at zero momentum, otherwise
/// the log curve clamped to `[1, difficulty.max_level()]`.
pub fn level_for_momentum(momentum: i64, difficulty: Difficulty) -> i32 {
    if momentum <= 0 {
        return 1;
    }
    let raw = ((momentum as f64 + LEVEL_MOMENTUM_OFFSET) / LEVEL_MOMENTUM_SCALE).log(LEVEL_LOG_BASE);
    (raw.floor() as i32).clamp(1, difficulty.max_level())
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PlayerFlags: u8 {
        const PLAYING = 1 << 0;
        const CPU = 1 << 1;
        const REMOTE = 1 << 2;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub name: String,
    pub flags: PlayerFlags,
    pub team: u8,
    pub difficulty: Difficulty,
    pub life: f64,
    pub score: i64,
    pub momentum: i64,
    pub streak: i32,
    pub max_streak: i32,
    /// Most notes cleared for a single beatline.
    pub max_hits: u32,
    pub hits: u64,
    pub judgements: JudgementCounts,
    pub faults: u32,
    pub ko: bool,
    pub ko_disabled: bool,
    pub is_blazing: bool,
    max_life: f64,
}

impl Player {
    pub fn new(name: impl Into<String>, difficulty: Difficulty) -> Self {
        let mut player = Self {
            name: name.into(),
            flags: PlayerFlags::PLAYING,
            team: 0,
            difficulty,
            life: 0.0,
            score: 0,
            momentum: 0,
            streak: 0,
            max_streak: 0,
            max_hits: 0,
            hits: 0,
            judgements: JudgementCounts::default(),
            faults: 0,
            ko: false,
            ko_disabled: false,
            is_blazing: false,
            max_life: life::NORMAL_MAX_LIFE,
        };
        player.reset_stats();
        player
    }

    pub fn cpu(name: impl Into<String>, difficulty: Difficulty) -> Self {
        let mut player = Self::new(name, difficulty);
        player.flags |= PlayerFlags::CPU;
        player
    }

    #[must_use]
    pub fn with_team(mut self, team: u8) -> Self {
        self.team = team;
        self
    }

    #[inline(always)]
    pub fn is_playing(&self) -> bool {
        self.flags.contains(PlayerFlags::PLAYING)
    }

    #[inline(always)]
    pub fn is_cpu(&self) -> bool {
        self.flags.contains(PlayerFlags::CPU)
    }

    #[inline(always)]
    pub fn is_human(&self) -> bool {
        self.is_playing() && !self.is_cpu()
    }

    #[inline(always)]
    pub fn is_remote(&self) -> bool {
        self.flags.contains(PlayerFlags::REMOTE)
    }

    /// Playing and not knocked out.
    #[inline(always)]
    pub fn is_active(&self) -> bool {
        self.is_playing() && !self.ko
    }

    #[inline(always)]
    pub const fn max_life(&self) -> f64 {
        self.max_life
    }

    /// Life capacity depends on the game mode, so the session sets it.
    pub fn set_max_life(&mut self, max_life: f64) {
        self.max_life = max_life.max(life::BASE_LIFE);
        self.life = self.life.min(self.max_life);
    }

    /// Life above the blazing threshold.
    #[inline(always)]
    pub fn overcharge(&self) -> f64 {
        (self.life - life::BASE_LIFE).max(0.0)
    }

    pub fn reset_stats(&mut self) {
        self.life = self.max_life / 2.0;
        self.score = 0;
        self.momentum = self.difficulty.start_momentum();
        self.streak = 0;
        self.max_streak = 0;
        self.max_hits = 0;
        self.hits = 0;
        self.judgements.clear();
        self.faults = 0;
        self.ko = false;
        self.is_blazing = false;
    }

    pub fn level(&self) -> i32 {
        level_for_momentum(self.momentum, self.difficulty)
    }

    pub fn percentage(&self) -> f64 {
        scores::percentage(&self.judgements, self.faults)
    }

    pub fn xp(&self) -> i64 {
        scores::experience(&self.judgements, self.faults, self.difficulty)
    }
}
