//! Composite leaderboard metrics derived from aggregate counters.

use crate::config::ScorePolicy;
use crate::domain::PlayerAggregate;

/// Derived score fields for one player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scores {
    pub roi: f64,
    pub steal_win_rate: f64,
    pub defense_rating: f64,
    pub leaderboard_score: i64,
}

pub fn roi(total_earned: i64, total_spent: i64) -> f64 {
    if total_spent <= 0 {
        return 0.0;
    }
    total_earned as f64 / total_spent as f64
}

pub fn steal_win_rate(successful: i64, failed: i64) -> f64 {
    let attempts = successful + failed;
    if attempts <= 0 {
        return 0.0;
    }
    successful as f64 / attempts as f64
}

pub fn defense_rating(times_stolen: i64, total_slots_owned: i64) -> f64 {
    let slots = total_slots_owned.max(1) as f64;
    (1.0 - times_stolen as f64 / slots).clamp(0.0, 1.0)
}

/// Compute all score fields from the aggregate's counters.
///
/// Every component is non-decreasing in its inputs (the ROI term is capped),
/// so more earnings never lower the score.
pub fn compute_scores(agg: &PlayerAggregate, policy: &ScorePolicy) -> Scores {
    let roi = roi(agg.total_earned, agg.total_spent);
    let steal_win_rate = steal_win_rate(agg.successful_steals, agg.failed_steals);
    let defense_rating = defense_rating(agg.times_stolen, agg.total_slots_owned);

    let earned_tokens = agg.total_earned.max(0) as f64 / policy.base_units_per_token;

    let wealth = earned_tokens * policy.points_per_token_earned;
    let activity = agg.properties_bought as f64 * policy.points_per_property
        + agg.complete_sets as f64 * policy.points_per_complete_set;
    let combat = agg.successful_steals as f64 * policy.points_per_steal
        + steal_win_rate * policy.win_rate_bonus;
    let efficiency = (roi * policy.roi_multiplier).min(policy.roi_cap);
    let defense = agg.shields_activated as f64 * policy.points_per_shield
        + defense_rating * policy.defense_bonus;

    let total = wealth + activity + combat + efficiency + defense;
    Scores {
        roi,
        steal_win_rate,
        defense_rating,
        leaderboard_score: total.floor() as i64,
    }
}

/// Write freshly computed scores into the aggregate.
pub fn apply_scores(agg: &mut PlayerAggregate, policy: &ScorePolicy) {
    let scores = compute_scores(agg, policy);
    agg.roi = scores.roi;
    agg.steal_win_rate = scores.steal_win_rate;
    agg.defense_rating = scores.defense_rating;
    agg.leaderboard_score = scores.leaderboard_score;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Wallet;

    const TOKEN: i64 = 1_000_000_000;

    fn player() -> PlayerAggregate {
        PlayerAggregate::new(Wallet::new("p"))
    }

    #[test]
    fn zero_denominators_yield_zero() {
        assert_eq!(roi(100, 0), 0.0);
        assert_eq!(steal_win_rate(0, 0), 0.0);
    }

    #[test]
    fn defense_rating_is_clamped() {
        assert_eq!(defense_rating(0, 0), 1.0);
        assert_eq!(defense_rating(5, 2), 0.0);
        assert_eq!(defense_rating(1, 4), 0.75);
    }

    #[test]
    fn documented_formula() {
        let mut agg = player();
        agg.total_earned = 1000 * TOKEN;
        agg.total_spent = 1000 * TOKEN;
        agg.properties_bought = 3;
        agg.complete_sets = 1;
        agg.successful_steals = 1;
        agg.failed_steals = 1;
        agg.shields_activated = 2;
        agg.total_slots_owned = 4;
        agg.times_stolen = 1;

        let scores = compute_scores(&agg, &ScorePolicy::default());
        // 300 + (300 + 5000) + (500 + 2500) + 25000 + (200 + 7500)
        assert_eq!(scores.leaderboard_score, 41_300);
        assert_eq!(scores.roi, 1.0);
        assert_eq!(scores.steal_win_rate, 0.5);
        assert_eq!(scores.defense_rating, 0.75);
    }

    #[test]
    fn roi_contribution_is_capped() {
        let mut agg = player();
        agg.total_spent = TOKEN;
        agg.total_earned = 100 * TOKEN;
        let policy = ScorePolicy::default();
        let capped = compute_scores(&agg, &policy).leaderboard_score;
        let expected = (100.0 * policy.points_per_token_earned
            + policy.roi_cap
            + policy.defense_bonus) as i64;
        assert_eq!(capped, expected);
    }

    #[test]
    fn score_is_monotonic_in_earnings() {
        let policy = ScorePolicy::default();
        let mut agg = player();
        agg.total_spent = 50 * TOKEN;
        agg.properties_bought = 4;
        agg.successful_steals = 2;

        let mut previous = i64::MIN;
        for earned in (0..400).map(|i| i * TOKEN / 2) {
            agg.total_earned = earned;
            let score = compute_scores(&agg, &policy).leaderboard_score;
            assert!(score >= previous, "score dropped at earned={}", earned);
            previous = score;
        }
    }

    #[test]
    fn apply_scores_updates_fields() {
        let mut agg = player();
        agg.total_earned = 2 * TOKEN;
        agg.total_spent = TOKEN;
        apply_scores(&mut agg, &ScorePolicy::default());
        assert_eq!(agg.roi, 2.0);
        assert!(agg.leaderboard_score > 0);
    }
}
