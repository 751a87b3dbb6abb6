use log::{error, info, warn};
use predictor_core::{Extremes, WeatherMode};
use std::sync::Arc;
use time::OffsetDateTime;

use super::scoring::score_bets;
use crate::{
    domain::{
        bets::{bets_by_submission, record_score},
        leaderboard::add_points,
        players::credit_finish,
        rounds::{mark_settled, HasRoundInfo, Locked, Outcome, Settled},
        Error,
    },
    infra::{
        db::{encode_datetime, DBConnection},
        weather::WeatherOracle,
    },
};

#[derive(Debug, Clone, PartialEq)]
pub enum SettlementResult {
    Settled(Settled),
    /// Observed outcome not available yet, the round stays locked
    Deferred,
    /// Someone else settled the round first, nothing was written
    AlreadySettled,
}

/// Turns locked, past due rounds into scored, settled ones
#[derive(Clone)]
pub struct SettlementEngine {
    db_connection: DBConnection,
    weather: Arc<dyn WeatherOracle>,
}

impl SettlementEngine {
    pub fn new(db_connection: DBConnection, weather: Arc<dyn WeatherOracle>) -> Self {
        Self {
            db_connection,
            weather,
        }
    }

    pub async fn settle_round(&self, round: Locked) -> Result<SettlementResult, Error> {
        let info = round.info();
        let actual = self
            .weather
            .fetch_extremes(
                info.location.latitude,
                info.location.longitude,
                info.target_date,
                WeatherMode::Archive,
            )
            .await;

        match actual {
            Some(actual) => {
                self.apply_outcome(round, actual, OffsetDateTime::now_utc())
                    .await
            }
            None => {
                warn!(
                    "no observed outcome for round {} yet, leaving it locked",
                    info.id
                );
                Ok(SettlementResult::Deferred)
            }
        }
    }

    /// Score every bet and pay out in a single transaction. The round only flips
    /// to settled if it is still locked, otherwise everything is rolled back.
    pub async fn apply_outcome(
        &self,
        round: Locked,
        actual: Extremes,
        now: OffsetDateTime,
    ) -> Result<SettlementResult, Error> {
        let round_id = round.info().id.clone();

        let result = self
            .db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;
                let updated_at = encode_datetime(now)?;
                let target_date = round.info().target_date;

                let bets = bets_by_submission(&mut tx, &round.info().id).await?;
                let scored = score_bets(&bets, &actual);

                for bet in &scored {
                    record_score(
                        &mut tx,
                        &round.info().id,
                        &bet.user_id,
                        bet.deviation,
                        bet.rank,
                        bet.points,
                        bet.prize,
                    )
                    .await?;

                    if let Some(points) = bet.points {
                        credit_finish(
                            &mut tx,
                            &bet.user_id,
                            bet.prize.unwrap_or(0),
                            bet.rank == 1,
                            &updated_at,
                        )
                        .await?;
                        add_points(
                            &mut tx,
                            &bet.user_id,
                            &bet.display_name,
                            points,
                            target_date,
                            &updated_at,
                        )
                        .await?;
                    }
                }

                let bet_count = bets.len() as i64;
                let outcome = Outcome {
                    actual_max: actual.max,
                    actual_min: actual.min,
                    pot: bet_count,
                    bet_count,
                    winner_count: scored.iter().filter(|b| b.prize.is_some()).count() as i64,
                    settled_at: now,
                };
                let settled = round.settle(outcome);

                if mark_settled(&mut tx, &settled).await? != 1 {
                    tx.rollback().await?;
                    return Ok(SettlementResult::AlreadySettled);
                }

                tx.commit().await?;
                Ok(SettlementResult::Settled(settled))
            })
            .await
            .map_err(|e| {
                error!("settlement of round {} failed: {}", round_id, e);
                Error::from(e)
            })?;

        match &result {
            SettlementResult::Settled(settled) => info!(
                "settled round {}: actual {}/{}, {} bets, {} winners",
                round_id,
                settled.outcome.actual_max,
                settled.outcome.actual_min,
                settled.outcome.bet_count,
                settled.outcome.winner_count
            ),
            SettlementResult::AlreadySettled => {
                warn!("round {} was no longer locked, settlement skipped", round_id)
            }
            SettlementResult::Deferred => {}
        }

        Ok(result)
    }
}
