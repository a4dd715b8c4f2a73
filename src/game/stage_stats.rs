use chrono::Local;
use serde::Serialize;

use crate::game::judgment::{Judgement, JudgementCounts};
use crate::game::player::{Difficulty, Player};
use crate::game::scores::{self, Grade};
use crate::game::session::GameMode;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JudgementTally {
    pub ideal: u32,
    pub cool: u32,
    pub ok: u32,
    pub bad: u32,
    pub miss: u32,
    pub fail: u32,
}

impl From<&JudgementCounts> for JudgementTally {
    fn from(counts: &JudgementCounts) -> Self {
        Self {
            ideal: counts.get(Judgement::Ideal),
            cool: counts.get(Judgement::Cool),
            ok: counts.get(Judgement::Ok),
            bad: counts.get(Judgement::Bad),
            miss: counts.get(Judgement::Miss),
            fail: counts.get(Judgement::Fail),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlayerStageSummary {
    pub name: String,
    pub cpu: bool,
    pub team: u8,
    pub difficulty: Difficulty,
    pub score: i64,
    pub percentage: f64,
    pub grade: Grade,
    pub judgements: JudgementTally,
    pub faults: u32,
    pub max_streak: i32,
    pub max_hits: u32,
    pub xp: i64,
    pub ko: bool,
}

impl PlayerStageSummary {
    pub fn from_player(player: &Player) -> Self {
        let percentage = player.percentage();
        Self {
            name: player.name.clone(),
            cpu: player.is_cpu(),
            team: player.team,
            difficulty: player.difficulty,
            score: player.score,
            percentage,
            grade: scores::grade_for(percentage, player.ko),
            judgements: JudgementTally::from(&player.judgements),
            faults: player.faults,
            max_streak: player.max_streak,
            max_hits: player.max_hits,
            xp: player.xp(),
            ko: player.ko,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StageSummary {
    pub song_title: String,
    pub mode: GameMode,
    pub played_at: String,
    pub players: Vec<PlayerStageSummary>,
}

impl StageSummary {
    pub fn new(song_title: impl Into<String>, mode: GameMode, players: &[Player]) -> Self {
        Self {
            song_title: song_title.into(),
            mode,
            played_at: Local::now().format("%Y/%m/%d %H:%M:%S").to_string(),
            players: players
                .iter()
                .filter(|p| p.is_playing())
                .map(PlayerStageSummary::from_player)
                .collect(),
        }
    }

    /// Highest score among players who were not knocked out.
    pub fn best(&self) -> Option<&PlayerStageSummary> {
        self.players.iter().filter(|p| !p.ko).max_by_key(|p| p.score)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_grades_players_and_serializes() {
        let mut winner = Player::new("P1", Difficulty::Medium);
        for _ in 0..4 {
            winner.judgements.record(Judgement::Ideal);
        }
        winner.score = 4000;
        winner.max_streak = 4;

        let mut loser = Player::cpu("CPU", Difficulty::Easy);
        loser.judgements.record(Judgement::Miss);
        loser.score = 9000;
        loser.ko = true;

        let mut idle = Player::new("P3", Difficulty::Easy);
        idle.flags.remove(crate::game::player::PlayerFlags::PLAYING);

        let summary = StageSummary::new("Song", GameMode::Normal, &[winner, loser, idle]);
        assert_eq!(summary.players.len(), 2);
        assert_eq!(summary.players[0].grade, Grade::SPlus);
        assert_eq!(summary.players[0].xp, 24);
        assert_eq!(summary.players[1].grade, Grade::Failed);
        assert_eq!(summary.best().map(|p| p.name.as_str()), Some("P1"));

        let json = summary.to_json().expect("serializes");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["mode"], "Normal");
        assert_eq!(value["players"][0]["judgements"]["ideal"], 4);
        assert_eq!(value["players"][1]["cpu"], true);
    }
}
