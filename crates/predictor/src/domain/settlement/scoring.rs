//! Score calculation for settled rounds

use predictor_core::Extremes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::domain::Bet;

/// Ranks that earn leaderboard points
pub const POINT_PLACES: usize = 10;

/// Share of the pot for ranks 1-3 as (numerator, denominator)
pub const PRIZE_SHARES: [(i64, i64); 3] = [(1, 1), (1, 2), (1, 4)];

/// A bet after settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredBet {
    pub user_id: String,
    pub display_name: String,
    pub deviation: f64,
    /// 1-based position after sorting by deviation
    pub rank: i64,
    pub points: Option<i64>,
    pub prize: Option<i64>,
}

/// Weighted distance between a prediction and the observed outcome.
///
/// The max temperature miss counts in full, the min miss a tenth.
pub fn deviation(predicted: &Extremes, actual: &Extremes) -> f64 {
    (predicted.max - actual.max).abs() + (predicted.min - actual.min).abs() / 10.0
}

/// rank 1 -> 10 points down to rank 10 -> 1 point
pub fn points_for_rank(rank: usize) -> Option<i64> {
    if (1..=POINT_PLACES).contains(&rank) {
        Some((POINT_PLACES + 1 - rank) as i64)
    } else {
        None
    }
}

/// Prize credits for the top three, each share rounded up to a whole credit
pub fn prize_for_rank(rank: usize, pot: i64) -> Option<i64> {
    if rank == 0 || pot <= 0 {
        return None;
    }
    let (numerator, denominator) = PRIZE_SHARES.get(rank - 1)?;
    Some((pot * numerator + denominator - 1) / denominator)
}

/// Rank every bet by deviation, lowest first.
///
/// `bets` must be in submission order. The sort is stable so equal deviations
/// keep that order. The pot is one credit per bet.
pub fn score_bets(bets: &[Bet], actual: &Extremes) -> Vec<ScoredBet> {
    let pot = bets.len() as i64;

    let mut with_deviation: Vec<(&Bet, f64)> = bets
        .iter()
        .map(|bet| (bet, deviation(&bet.prediction(), actual)))
        .collect();

    with_deviation.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    with_deviation
        .into_iter()
        .enumerate()
        .map(|(index, (bet, deviation))| {
            let rank = index + 1;
            ScoredBet {
                user_id: bet.user_id.clone(),
                display_name: bet.display_name.clone(),
                deviation,
                rank: rank as i64,
                points: points_for_rank(rank),
                prize: prize_for_rank(rank, pot),
            }
        })
        .collect()
}
