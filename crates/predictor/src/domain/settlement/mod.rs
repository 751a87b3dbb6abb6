mod engine;
pub mod scoring;

pub use engine::*;
pub use scoring::{deviation, points_for_rank, prize_for_rank, score_bets, ScoredBet};
