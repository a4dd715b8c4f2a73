use crate::game::player::Player;

/// Life above this value is overcharge, which is what blazing spends.
pub const BASE_LIFE: f64 = 100.0;
pub const NORMAL_MAX_LIFE: f64 = 200.0;
pub const COOP_LIFE_PER_SLOT: f64 = 100.0;

// Gains landing in overcharge only count half.
pub const OVERCHARGE_GAIN_SCALE: f64 = 0.5;

pub const BLAZING_DRAIN_PER_PHRASE: f64 = 4.0;
pub const BLAZING_END_PENALTY: f64 = 10.0;
/// Overcharge per reverse note while blazing.
pub const REVERSE_LIFE_STEP: f64 = 25.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LifePolicy {
    /// Each player has their own bar and is knocked out on their own.
    Individual,
    /// Bars are linked: the team is knocked out together.
    Cooperative,
}

pub const fn cooperative_max_life(players: usize) -> f64 {
    COOP_LIFE_PER_SLOT * (players as f64 + 1.0)
}

/// Scales a positive change so that the share above `BASE_LIFE` counts half.
pub fn scale_gain(life: f64, delta: f64) -> f64 {
    if delta <= 0.0 {
        return delta;
    }
    let below = (BASE_LIFE - life).clamp(0.0, delta);
    below + (delta - below) * OVERCHARGE_GAIN_SCALE
}

/// Applies a life change to `players[idx]` and returns what actually changed.
pub fn apply_life_change(policy: LifePolicy, players: &mut [Player], idx: usize, delta: f64) -> f64 {
    let Some(player) = players.get_mut(idx) else {
        return 0.0;
    };
    if player.ko {
        return 0.0;
    }

    let before = player.life;
    let target = before + scale_gain(before, delta);
    match policy {
        LifePolicy::Individual => {
            if target <= 0.0 && !player.ko_disabled {
                player.ko = true;
                player.is_blazing = false;
            }
            player.life = target.clamp(0.0, player.max_life());
        }
        LifePolicy::Cooperative => {
            player.life = target.clamp(0.0, player.max_life());
            check_cooperative_ko(players);
        }
    }
    players[idx].life - before
}

/// The whole team goes down once their combined life is gone, unless a
/// human on it has KO disabled.
pub fn check_cooperative_ko(players: &mut [Player]) -> bool {
    let total: f64 = players.iter().filter(|p| p.is_playing()).map(|p| p.life).sum();
    let protected = players.iter().any(|p| p.is_human() && p.ko_disabled);
    if total > 0.0 || protected {
        return false;
    }
    for p in players.iter_mut().filter(|p| p.is_playing()) {
        p.ko = true;
        p.is_blazing = false;
    }
    true
}

pub fn total_overcharge(players: &[Player]) -> f64 {
    players.iter().filter(|p| p.is_active()).map(Player::overcharge).sum()
}

/// Blazing is only available while the player has overcharge to spend.
pub fn can_blaze(player: &Player) -> bool {
    player.is_active() && !player.is_blazing && player.life > BASE_LIFE
}

/// Drains a blazing player's overcharge for `phrases` of play; the drain
/// stops at `BASE_LIFE`.
pub fn drain_blazing(player: &mut Player, phrases: f64) {
    if !player.is_blazing || phrases <= 0.0 || player.life <= BASE_LIFE {
        return;
    }
    player.life = (player.life - BLAZING_DRAIN_PER_PHRASE * phrases).max(BASE_LIFE);
}

/// Ends blazing for players whose overcharge is spent, returning their
/// indices. In cooperative play overcharge is pooled: nobody stops until it
/// is all gone, then everyone does. Each player is charged the end penalty
/// exactly once.
pub fn end_spent_blazing(policy: LifePolicy, players: &mut [Player]) -> Vec<usize> {
    let ended: Vec<usize> = match policy {
        LifePolicy::Individual => players
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_blazing && p.life <= BASE_LIFE)
            .map(|(i, _)| i)
            .collect(),
        LifePolicy::Cooperative => {
            if total_overcharge(players) > 0.0 {
                Vec::new()
            } else {
                players
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.is_blazing)
                    .map(|(i, _)| i)
                    .collect()
            }
        }
    };
    for &i in &ended {
        players[i].is_blazing = false;
    }
    for &i in &ended {
        apply_life_change(policy, players, i, -BLAZING_END_PENALTY);
    }
    ended
}

/// Reverse notes per chart while blazing, capped at the chart length.
pub fn reverse_quota(player: &Player, chart_len: usize) -> usize {
    if !player.is_blazing {
        return 0;
    }
    let quota = (player.overcharge() / REVERSE_LIFE_STEP).floor() as usize;
    quota.min(chart_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::player::Difficulty;

    fn squad(n: usize, max_life: f64) -> Vec<Player> {
        (0..n)
            .map(|i| {
                let mut p = Player::new(format!("P{}", i + 1), Difficulty::Medium);
                p.set_max_life(max_life);
                p
            })
            .collect()
    }

    #[test]
    fn gains_in_overcharge_are_halved() {
        assert!((scale_gain(90.0, 20.0) - 15.0).abs() < 1e-9);
        assert!((scale_gain(120.0, 10.0) - 5.0).abs() < 1e-9);
        assert!((scale_gain(120.0, -10.0) + 10.0).abs() < 1e-9);
    }

    #[test]
    fn individual_ko_and_clamping() {
        let mut players = squad(1, NORMAL_MAX_LIFE);
        players[0].life = 5.0;
        let applied = apply_life_change(LifePolicy::Individual, &mut players, 0, -12.0);
        assert!((applied + 5.0).abs() < 1e-9);
        assert!(players[0].ko);
        assert_eq!(apply_life_change(LifePolicy::Individual, &mut players, 0, 50.0), 0.0);

        let mut players = squad(1, NORMAL_MAX_LIFE);
        players[0].life = 199.0;
        let applied = apply_life_change(LifePolicy::Individual, &mut players, 0, 10.0);
        assert!((applied - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ko_disabled_player_survives_at_zero() {
        let mut players = squad(1, NORMAL_MAX_LIFE);
        players[0].ko_disabled = true;
        apply_life_change(LifePolicy::Individual, &mut players, 0, -500.0);
        assert!(!players[0].ko);
        assert_eq!(players[0].life, 0.0);
    }

    #[test]
    fn cooperative_ko_takes_everyone() {
        let mut players = squad(2, cooperative_max_life(2));
        players[0].life = 3.0;
        players[1].life = 0.0;
        apply_life_change(LifePolicy::Cooperative, &mut players, 1, -4.0);
        assert!(!players[0].ko, "team still has life left");
        apply_life_change(LifePolicy::Cooperative, &mut players, 0, -4.0);
        assert!(players.iter().all(|p| p.ko));
    }

    #[test]
    fn cooperative_ko_respects_protected_human() {
        let mut players = squad(2, cooperative_max_life(2));
        players[1].ko_disabled = true;
        players[0].life = 0.0;
        players[1].life = 1.0;
        apply_life_change(LifePolicy::Cooperative, &mut players, 1, -10.0);
        assert!(players.iter().all(|p| !p.ko));
    }

    #[test]
    fn individual_blazing_ends_with_one_penalty() {
        let mut players = squad(1, NORMAL_MAX_LIFE);
        players[0].life = 106.0;
        players[0].is_blazing = true;
        drain_blazing(&mut players[0], 1.0);
        assert!((players[0].life - 102.0).abs() < 1e-9);
        assert!(end_spent_blazing(LifePolicy::Individual, &mut players).is_empty());
        drain_blazing(&mut players[0], 1.0);
        assert!((players[0].life - BASE_LIFE).abs() < 1e-9);
        assert_eq!(end_spent_blazing(LifePolicy::Individual, &mut players), vec![0]);
        assert!((players[0].life - 90.0).abs() < 1e-9);
        assert!(end_spent_blazing(LifePolicy::Individual, &mut players).is_empty());
    }

    #[test]
    fn cooperative_blazing_ends_together() {
        let mut players = squad(2, cooperative_max_life(2));
        players[0].life = 104.0;
        players[0].is_blazing = true;
        players[1].life = 110.0;
        players[1].is_blazing = true;
        drain_blazing(&mut players[0], 5.0);
        assert!(end_spent_blazing(LifePolicy::Cooperative, &mut players).is_empty());
        drain_blazing(&mut players[1], 5.0);
        assert_eq!(end_spent_blazing(LifePolicy::Cooperative, &mut players), vec![0, 1]);
        assert!(players.iter().all(|p| !p.is_blazing && (p.life - 90.0).abs() < 1e-9));
    }

    #[test]
    fn reverse_quota_follows_overcharge() {
        let mut players = squad(1, NORMAL_MAX_LIFE);
        players[0].life = 180.0;
        assert_eq!(reverse_quota(&players[0], 8), 0);
        assert!(can_blaze(&players[0]));
        players[0].is_blazing = true;
        assert_eq!(reverse_quota(&players[0], 8), 3);
        assert_eq!(reverse_quota(&players[0], 2), 2);
    }
}
