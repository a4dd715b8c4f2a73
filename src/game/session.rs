//! One play of one song: charts, beatlines, judgements and the life and
//! momentum rules of each game mode.
//!
//! All state is mutated from a single update tick. The caller converts the
//! audio position to song milliseconds (see [`crate::game::clock`]) and feeds
//! it in together with the players' inputs.

use log::{debug, info, warn};
use rand::SeedableRng;
use rand::distr::{Distribution, Uniform};
use rand::rngs::StdRng;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::game::chart::{ChartProvider, Direction, NoteChart, RandomCharts};
use crate::game::judgment::{
    self, Judgement, JudgementError, JudgementOutcome, MultiplierContext, StreakChange,
};
use crate::game::life::{self, LifePolicy};
use crate::game::player::{Difficulty, Player};
use crate::game::song::SongData;
use crate::game::stage_stats::StageSummary;
use crate::game::timing::TimingMap;
use crate::game::timing_windows::TimingProfile;

pub const MAX_PLAYERS: usize = 4;

// CPU outcome weights in percent, per difficulty: IDEAL, COOL, OK, BAD, MISS.
const CPU_SKILL: [[u32; 5]; 6] = [
    [10, 25, 35, 20, 10],
    [20, 30, 30, 15, 5],
    [35, 30, 20, 10, 5],
    [50, 30, 12, 6, 2],
    [65, 25, 7, 2, 1],
    [80, 15, 4, 1, 0],
];
const CPU_SEED_SALT: u64 = 0x5eed_c0de;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum GameMode {
    Normal,
    /// Momentum is pooled per team.
    Team,
    /// Linked life bars and one momentum pool.
    Cooperative,
    /// One chart and one judgement history mirrored to everyone.
    Sync,
}

impl GameMode {
    pub const fn life_policy(self) -> LifePolicy {
        match self {
            Self::Cooperative => LifePolicy::Cooperative,
            _ => LifePolicy::Individual,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "team" => Some(Self::Team),
            "coop" | "cooperative" => Some(Self::Cooperative),
            "sync" => Some(Self::Sync),
            _ => None,
        }
    }
}

/// Momentum shared between players, owned by the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SharedMomentum {
    None,
    Teams(FxHashMap<u8, i64>),
    Pooled(i64),
}

impl SharedMomentum {
    /// Pools start from the highest starting momentum among their members.
    pub fn for_players(mode: GameMode, players: &[Player]) -> Self {
        match mode {
            GameMode::Team => {
                let mut teams: FxHashMap<u8, i64> = FxHashMap::default();
                for p in players.iter().filter(|p| p.is_playing()) {
                    let entry = teams.entry(p.team).or_insert(p.momentum);
                    *entry = (*entry).max(p.momentum);
                }
                Self::Teams(teams)
            }
            GameMode::Cooperative => Self::Pooled(
                players.iter().filter(|p| p.is_playing()).map(|p| p.momentum).max().unwrap_or(0),
            ),
            GameMode::Normal | GameMode::Sync => Self::None,
        }
    }

    pub fn get(&self, team: u8) -> Option<i64> {
        match self {
            Self::None => None,
            Self::Teams(teams) => teams.get(&team).copied(),
            Self::Pooled(m) => Some(*m),
        }
    }

    fn set(&mut self, team: u8, value: i64) {
        match self {
            Self::None => {}
            Self::Teams(teams) => {
                teams.insert(team, value);
            }
            Self::Pooled(m) => *m = value,
        }
    }

    /// Whether `a` and `b` draw from the same pool.
    fn shares(&self, a: &Player, b: &Player) -> bool {
        match self {
            Self::None => false,
            Self::Teams(_) => a.team == b.team,
            Self::Pooled(_) => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("a session needs at least one playing player")]
    NoPlayers,
    #[error("{0} players requested; at most {max} can play", max = MAX_PLAYERS)]
    TooManyPlayers(usize),
    #[error("player {0} is not in this session")]
    UnknownPlayer(usize),
    #[error(transparent)]
    Judgement(#[from] JudgementError),
}

/// Result of pressing an arrow key.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArrowPress {
    Hit,
    Fault,
    /// Nothing to press: chart done, player out, or unknown slot.
    Ignored,
}

/// Per-frame view of one player.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub name: String,
    pub life: f64,
    pub max_life: f64,
    pub score: i64,
    pub momentum: i64,
    pub streak: i32,
    pub level: i32,
    pub ko: bool,
    pub is_blazing: bool,
    pub notes_remaining: usize,
}

#[derive(Clone, Debug)]
struct Lane {
    chart: NoteChart,
    /// Whole phrase of the beatline this player is working towards.
    next_beatline: i64,
}

pub struct Session {
    mode: GameMode,
    players: Vec<Player>,
    lanes: Vec<Lane>,
    momentum: SharedMomentum,
    timing: Arc<TimingMap>,
    windows: TimingProfile,
    charts: Box<dyn ChartProvider>,
    cpu_rng: StdRng,
    last_phrase: Option<f64>,
    end_phrase: f64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.mode)
            .field("players", &self.players)
            .field("momentum", &self.momentum)
            .field("end_phrase", &self.end_phrase)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Starts a session. Players are reset to their song-start state and
    /// given the life capacity of the mode.
    pub fn new(
        mode: GameMode,
        mut players: Vec<Player>,
        timing: Arc<TimingMap>,
        end_phrase: f64,
        windows: TimingProfile,
        charts: Box<dyn ChartProvider>,
        seed: u64,
    ) -> Result<Self, SessionError> {
        if players.len() > MAX_PLAYERS {
            return Err(SessionError::TooManyPlayers(players.len()));
        }
        let playing = players.iter().filter(|p| p.is_playing()).count();
        if playing == 0 {
            return Err(SessionError::NoPlayers);
        }

        let max_life = match mode {
            GameMode::Cooperative => life::cooperative_max_life(playing),
            _ => life::NORMAL_MAX_LIFE,
        };
        for p in &mut players {
            p.set_max_life(max_life);
            p.reset_stats();
        }
        let momentum = SharedMomentum::for_players(mode, &players);

        let mut session = Self {
            mode,
            lanes: Vec::with_capacity(players.len()),
            players,
            momentum,
            timing,
            windows: windows.sanitized(),
            charts,
            cpu_rng: StdRng::seed_from_u64(seed ^ CPU_SEED_SALT),
            last_phrase: None,
            end_phrase,
        };
        session.sync_pooled_momentum();
        for _ in 0..session.players.len() {
            session.lanes.push(Lane { chart: NoteChart::default(), next_beatline: 0 });
        }
        for i in 0..session.players.len() {
            session.regenerate_chart(i);
        }
        info!(
            "Session started: {:?}, {} player(s), ends at phrase {:.2}.",
            mode, playing, session.end_phrase
        );
        Ok(session)
    }

    /// Session over the song's timing with randomly generated charts.
    pub fn for_song(
        song: &SongData,
        mode: GameMode,
        players: Vec<Player>,
        windows: TimingProfile,
        seed: u64,
    ) -> Result<Self, SessionError> {
        Self::new(
            mode,
            players,
            Arc::new(song.timing_map()),
            song.end_phrase(),
            windows,
            Box::new(RandomCharts::new(seed)),
            seed,
        )
    }

    pub const fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, idx: usize) -> Option<&Player> {
        self.players.get(idx)
    }

    /// Ko-disable is the only player setting that may change mid-song.
    pub fn set_ko_disabled(&mut self, idx: usize, disabled: bool) {
        if let Some(p) = self.players.get_mut(idx) {
            p.ko_disabled = disabled;
        }
    }

    pub fn chart(&self, idx: usize) -> Option<&NoteChart> {
        self.lanes.get(idx).map(|l| &l.chart)
    }

    pub fn next_beatline(&self, idx: usize) -> Option<i64> {
        self.lanes.get(idx).map(|l| l.next_beatline)
    }

    pub const fn shared_momentum(&self) -> &SharedMomentum {
        &self.momentum
    }

    pub fn timing(&self) -> &TimingMap {
        &self.timing
    }

    /// Momentum that drives this player's level: the pool they belong to, or
    /// their own.
    pub fn effective_momentum(&self, idx: usize) -> i64 {
        let Some(p) = self.players.get(idx) else {
            return 0;
        };
        self.momentum.get(p.team).unwrap_or(p.momentum)
    }

    /// Note count of this player's next chart.
    pub fn level(&self, idx: usize) -> i32 {
        self.players
            .get(idx)
            .map_or(1, |p| crate::game::player::level_for_momentum(self.effective_momentum(idx), p.difficulty))
    }

    pub fn team_score(&self, team: u8) -> i64 {
        self.players.iter().filter(|p| p.is_playing() && p.team == team).map(|p| p.score).sum()
    }

    pub fn total_score(&self) -> i64 {
        self.players.iter().filter(|p| p.is_playing()).map(|p| p.score).sum()
    }

    pub fn snapshot(&self) -> Vec<PlayerSnapshot> {
        self.players
            .iter()
            .enumerate()
            .map(|(i, p)| PlayerSnapshot {
                name: p.name.clone(),
                life: p.life,
                max_life: p.max_life(),
                score: p.score,
                momentum: self.effective_momentum(i),
                streak: p.streak,
                level: self.level(i),
                ko: p.ko,
                is_blazing: p.is_blazing,
                notes_remaining: self.lanes.get(i).map_or(0, |l| l.chart.number_remaining()),
            })
            .collect()
    }

    /// Everyone is out, or play has passed the last beatline.
    pub fn is_finished(&self, song_ms: f64) -> bool {
        !self.players.iter().any(Player::is_active) || self.timing.ms_to_phrase(song_ms) >= self.end_phrase
    }

    pub fn summary(&self, song_title: &str) -> StageSummary {
        StageSummary::new(song_title, self.mode, &self.players)
    }

    // --- Input ---

    /// Applies an arrow press against the player's current note. A wrong
    /// arrow is a fault.
    pub fn arrow_pressed(&mut self, idx: usize, direction: Direction) -> ArrowPress {
        let Some(player) = self.players.get(idx) else {
            return ArrowPress::Ignored;
        };
        if !player.is_active() {
            return ArrowPress::Ignored;
        }
        let Some(note) = self.lanes[idx].chart.current_note().copied() else {
            return ArrowPress::Ignored;
        };

        if note.required_direction() == direction {
            if let Err(e) = self.lanes[idx].chart.mark_current_completed() {
                warn!("Arrow press on player {idx}: {e}");
                return ArrowPress::Ignored;
            }
            if self.mode == GameMode::Sync {
                self.mirror_lane(idx);
            }
            return ArrowPress::Hit;
        }

        self.apply_fault(idx);
        ArrowPress::Fault
    }

    fn apply_fault(&mut self, idx: usize) {
        let momentum = self.effective_momentum(idx);
        let player = &mut self.players[idx];
        player.faults += 1;
        player.streak = 0;
        debug!("Fault for {}.", player.name);
        self.adjust_momentum(idx, judgment::fault_momentum_adjustment(momentum));

        // A lower level shrinks every chart that reads from this momentum.
        for i in 0..self.players.len() {
            let shares = i == idx || self.momentum.shares(&self.players[idx], &self.players[i]);
            if shares {
                let level = self.level(i).max(1) as usize;
                if self.lanes[i].chart.len() > level {
                    self.lanes[i].chart.truncate_notes(level);
                }
            }
        }
        if self.mode == GameMode::Sync {
            self.mirror_player(idx);
        }
    }

    /// Judges a beat press against the player's pending beatline. Presses
    /// outside every window are ignored and return `None`.
    pub fn beat_pressed(&mut self, idx: usize, song_ms: f64) -> Option<JudgementOutcome> {
        let player = self.players.get(idx)?;
        if !player.is_active() || player.is_cpu() {
            return None;
        }
        let lane = &self.lanes[idx];
        let beatline = lane.next_beatline as f64;
        if beatline > self.end_phrase {
            return None;
        }
        let offset_ms = song_ms - self.timing.phrase_to_ms(beatline);
        let Some(tier) = self.windows.classify_offset_ms(offset_ms) else {
            debug!("Ignoring press {offset_ms:.1} ms from beatline {beatline} for player {idx}.");
            return None;
        };

        let completed = lane.chart.number_completed() as u32;
        let remaining = lane.chart.number_remaining() as u32;
        let judgement = if remaining > 0 { Judgement::Fail } else { tier };
        debug!("Player {idx}: {} at {offset_ms:+.1} ms.", judgement.label());
        Some(self.judge_beatline(idx, judgement, completed, remaining, 1.0))
    }

    /// Enters blazing when the player has overcharge to spend.
    pub fn request_blazing(&mut self, idx: usize) -> bool {
        let Some(player) = self.players.get_mut(idx) else {
            return false;
        };
        if !life::can_blaze(player) {
            return false;
        }
        player.is_blazing = true;
        info!("{} is blazing with {:.1} overcharge.", player.name, player.overcharge());
        true
    }

    // --- Tick ---

    /// Advances the session to `song_ms`: drains blazing, lets CPU players
    /// act and turns beatlines that passed without a press into misses.
    pub fn update(&mut self, song_ms: f64) -> Vec<JudgementOutcome> {
        let phrase = self.timing.ms_to_phrase(song_ms);
        let elapsed = self.last_phrase.map_or(0.0, |last| phrase - last);
        self.last_phrase = Some(phrase);
        self.update_blazing(elapsed);

        let mut outcomes = Vec::new();
        let outer_ms = self.windows.outer_ms();
        for idx in 0..self.players.len() {
            loop {
                let player = &self.players[idx];
                if !player.is_active() {
                    break;
                }
                let (is_cpu, difficulty) = (player.is_cpu(), player.difficulty);
                let beatline = self.lanes[idx].next_beatline as f64;
                if beatline > self.end_phrase {
                    break;
                }
                let beatline_ms = self.timing.phrase_to_ms(beatline);
                if is_cpu {
                    if song_ms < beatline_ms {
                        break;
                    }
                    let judgement = self.draw_cpu_judgement(difficulty);
                    outcomes.push(self.play_cpu_beatline(idx, judgement));
                } else {
                    if song_ms - beatline_ms <= outer_ms {
                        break;
                    }
                    let remaining = self.lanes[idx].chart.number_remaining() as u32;
                    outcomes.push(self.judge_beatline(idx, Judgement::Miss, 0, remaining, 1.0));
                }
            }
        }
        outcomes
    }

    fn update_blazing(&mut self, elapsed_phrases: f64) {
        if elapsed_phrases > 0.0 {
            for p in self.players.iter_mut().filter(|p| p.is_active() && p.is_blazing) {
                life::drain_blazing(p, elapsed_phrases);
            }
        }
        let ended = life::end_spent_blazing(self.mode.life_policy(), &mut self.players);
        for i in ended {
            info!("{} stopped blazing.", self.players[i].name);
        }
        if self.mode == GameMode::Sync {
            self.mirror_from_first_active();
        }
    }

    fn draw_cpu_judgement(&mut self, difficulty: Difficulty) -> Judgement {
        let weights = CPU_SKILL[difficulty.index()];
        let total: u32 = weights.iter().sum();
        let roll = Uniform::new(0, total.max(1)).map_or(0, |d| d.sample(&mut self.cpu_rng));
        let mut acc = 0;
        for (tier, weight) in Judgement::ALL.iter().zip(weights) {
            acc += weight;
            if roll < acc {
                return *tier;
            }
        }
        Judgement::Miss
    }

    fn play_cpu_beatline(&mut self, idx: usize, judgement: Judgement) -> JudgementOutcome {
        let chart = &mut self.lanes[idx].chart;
        if judgement == Judgement::Miss {
            let remaining = chart.number_remaining() as u32;
            return self.judge_beatline(idx, judgement, 0, remaining, 1.0);
        }
        chart.mark_all_completed();
        let completed = chart.len() as u32;
        self.judge_beatline(idx, judgement, completed, 0, 1.0)
    }

    // --- Judgement ---

    /// Applies a judgement for the player's pending beatline, then moves them
    /// on to the next one with a fresh chart.
    fn judge_beatline(
        &mut self,
        idx: usize,
        judgement: Judgement,
        completed: u32,
        incomplete: u32,
        multiplier: f64,
    ) -> JudgementOutcome {
        let outcome = self.award_judgement(idx, judgement, completed, incomplete, multiplier);
        self.lanes[idx].next_beatline += 1;
        self.regenerate_chart(idx);
        if self.mode == GameMode::Sync {
            self.mirror_lane(idx);
        }
        outcome
    }

    /// Applies score, life, momentum and streak for one judgement. In sync
    /// mode the result is mirrored to every other player afterwards.
    pub fn award_judgement(
        &mut self,
        idx: usize,
        judgement: Judgement,
        completed: u32,
        incomplete: u32,
        multiplier: f64,
    ) -> JudgementOutcome {
        if self.players[idx].ko {
            debug!("Ignoring {} for knocked-out player {idx}.", judgement.label());
            let streak = self.players[idx].streak;
            return JudgementOutcome {
                player: idx,
                judgement,
                score_delta: 0,
                life_delta: 0.0,
                momentum_delta: 0,
                streak,
            };
        }
        let momentum = self.effective_momentum(idx);
        let ctx = self.multiplier_context(idx);
        let player = &mut self.players[idx];

        let adj = judgment::base_adjustment(judgement, player.streak, completed, incomplete, player.difficulty);
        match adj.streak {
            StreakChange::Increment => player.streak = player.streak.saturating_add(1).max(1),
            StreakChange::Reset => player.streak = 0,
            StreakChange::Keep => {}
        }
        player.max_streak = player.max_streak.max(player.streak);

        let scale = judgment::score_multiplier(ctx) as f64 * multiplier;
        let score_delta = (adj.score as f64 * scale) as i64;
        player.score += score_delta;
        player.judgements.record(judgement);
        player.hits += u64::from(completed);
        player.max_hits = player.max_hits.max(completed);
        let streak = player.streak;

        let life_delta = life::apply_life_change(self.mode.life_policy(), &mut self.players, idx, adj.life);
        let momentum_delta = self.adjust_momentum(idx, judgment::momentum_adjustment(judgement, momentum, completed));

        if self.mode == GameMode::Sync {
            self.mirror_player(idx);
        }
        if self.players[idx].ko {
            info!("{} is knocked out.", self.players[idx].name);
        }

        JudgementOutcome { player: idx, judgement, score_delta, life_delta, momentum_delta, streak }
    }

    /// Applies a judgement given as a raw tier index. The count sentinel is
    /// a no-op; anything past it is rejected.
    pub fn apply_raw_judgement(
        &mut self,
        idx: usize,
        raw: u8,
        completed: u32,
        incomplete: u32,
        multiplier: f64,
    ) -> Result<Option<JudgementOutcome>, SessionError> {
        if idx >= self.players.len() {
            return Err(SessionError::UnknownPlayer(idx));
        }
        let Some(judgement) = Judgement::from_index(raw)? else {
            return Ok(None);
        };
        Ok(Some(self.award_judgement(idx, judgement, completed, incomplete, multiplier)))
    }

    fn multiplier_context(&self, idx: usize) -> MultiplierContext {
        let player = &self.players[idx];
        MultiplierContext {
            is_cpu: player.is_cpu(),
            human_players: self.players.iter().filter(|p| p.is_human()).count(),
            cooperative: self.mode == GameMode::Cooperative,
            blazing_players: self.players.iter().filter(|p| p.is_active() && p.is_blazing).count(),
            player_blazing: player.is_blazing,
        }
    }

    /// Moves the momentum that `idx` reads by `delta`, floored at zero, and
    /// returns the change that was applied.
    fn adjust_momentum(&mut self, idx: usize, delta: i64) -> i64 {
        let before = self.effective_momentum(idx);
        let after = (before + delta).max(0);
        let team = self.players[idx].team;
        if self.momentum.get(team).is_some() {
            self.momentum.set(team, after);
            self.sync_pooled_momentum();
        } else {
            self.players[idx].momentum = after;
        }
        after - before
    }

    /// Copies pool values into each member's own momentum field.
    fn sync_pooled_momentum(&mut self) {
        for p in &mut self.players {
            if let Some(m) = self.momentum.get(p.team) {
                p.momentum = m;
            }
        }
    }

    fn regenerate_chart(&mut self, idx: usize) {
        let level = self.level(idx).max(1) as usize;
        let reverse = life::reverse_quota(&self.players[idx], level);
        self.lanes[idx].chart = self.charts.next_chart(level, reverse);
    }

    // --- Sync mode ---

    fn mirror_lane(&mut self, from: usize) {
        let source = self.lanes[from].clone();
        for (i, lane) in self.lanes.iter_mut().enumerate() {
            if i != from && self.players[i].is_active() {
                *lane = source.clone();
            }
        }
    }

    fn mirror_player(&mut self, from: usize) {
        let source = self.players[from].clone();
        for (i, p) in self.players.iter_mut().enumerate() {
            if i == from || !p.is_playing() {
                continue;
            }
            p.judgements = source.judgements;
            p.score = source.score;
            p.life = source.life.min(p.max_life());
            p.momentum = source.momentum;
            p.streak = source.streak;
            p.max_streak = source.max_streak;
            p.hits = source.hits;
            p.max_hits = source.max_hits;
            p.faults = source.faults;
            p.ko = source.ko;
            p.is_blazing = source.is_blazing;
        }
    }

    fn mirror_from_first_active(&mut self) {
        if let Some(first) = self.players.iter().position(Player::is_playing) {
            self.mirror_player(first);
        }
    }
}
