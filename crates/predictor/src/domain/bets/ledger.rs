use log::{debug, info};
use predictor_core::{matches_baseline, validate_submission, Extremes, SubmitBet};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};
use time::OffsetDateTime;

use crate::{
    domain::{Error, Round, RoundStore},
    infra::db::{encode_datetime, parse_required_datetime, DBConnection},
};

const BET_COLUMNS: &str = "round_id,
    user_id,
    display_name,
    predicted_max,
    predicted_min,
    submitted_at,
    deviation,
    rank,
    points,
    prize";

/// One player's prediction for one round. Scoring fields stay empty until the
/// round settles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub round_id: String,
    pub user_id: String,
    pub display_name: String,
    pub predicted_max: f64,
    pub predicted_min: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
    pub deviation: Option<f64>,
    pub rank: Option<i64>,
    pub points: Option<i64>,
    pub prize: Option<i64>,
}

impl Bet {
    pub fn prediction(&self) -> Extremes {
        Extremes::new(self.predicted_max, self.predicted_min)
    }
}

impl FromRow<'_, SqliteRow> for Bet {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Bet {
            round_id: row.try_get("round_id")?,
            user_id: row.try_get("user_id")?,
            display_name: row.try_get("display_name")?,
            predicted_max: row.try_get("predicted_max")?,
            predicted_min: row.try_get("predicted_min")?,
            submitted_at: parse_required_datetime(row, "submitted_at")?,
            deviation: row.try_get("deviation")?,
            rank: row.try_get("rank")?,
            points: row.try_get("points")?,
            prize: row.try_get("prize")?,
        })
    }
}

/// Accepts and stores predictions, one live bet per (round, user)
#[derive(Debug, Clone)]
pub struct BetLedger {
    db_connection: DBConnection,
    round_store: RoundStore,
}

impl BetLedger {
    pub fn new(db_connection: DBConnection, round_store: RoundStore) -> Self {
        Self {
            db_connection,
            round_store,
        }
    }

    /// Place or replace a bet.
    ///
    /// The round must be active with a usable baseline and the predicted max must
    /// differ from the baseline max. A second submission by the same user replaces
    /// the first entirely, submission time included.
    pub async fn submit_bet(&self, submission: SubmitBet) -> Result<Bet, Error> {
        validate_submission(&submission)?;

        let user_exists: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM players WHERE user_id = ?")
                .bind(&submission.user_id)
                .fetch_optional(self.db_connection.read())
                .await?;
        if user_exists.is_none() {
            return Err(Error::UserNotFound(submission.user_id));
        }

        let round = self
            .round_store
            .get_round(&submission.round_id)
            .await?
            .ok_or_else(|| Error::RoundNotFound(submission.round_id.clone()))?;

        let baseline = match &round {
            Round::Active(active) => active.open_baseline().copied(),
            _ => None,
        };
        let Some(baseline) = baseline else {
            debug!(
                "refusing bet from {} on {}: round is {} without an open baseline",
                submission.user_id,
                round.id(),
                round.state_name()
            );
            return Err(Error::RoundNotOpen(submission.round_id));
        };

        if matches_baseline(submission.predicted_max, &baseline.extremes()) {
            return Err(Error::PredictionMatchesBaseline(baseline.max));
        }

        let submitted_at = encode_datetime(OffsetDateTime::now_utc())?;
        let round_id = submission.round_id.clone();
        let bet = self
            .db_connection
            .execute_write(move |pool| async move {
                // The status check rides in the same statement, a round locked between
                // the read above and this write refuses the bet
                let query = format!(
                    "INSERT INTO bets (
                        round_id,
                        user_id,
                        display_name,
                        predicted_max,
                        predicted_min,
                        submitted_at
                    )
                    SELECT ?, ?, ?, ?, ?, ?
                    WHERE EXISTS (
                        SELECT 1 FROM rounds
                        WHERE id = ? AND status = 'active' AND baseline_max IS NOT NULL
                    )
                    ON CONFLICT(round_id, user_id) DO UPDATE SET
                        display_name = excluded.display_name,
                        predicted_max = excluded.predicted_max,
                        predicted_min = excluded.predicted_min,
                        submitted_at = excluded.submitted_at,
                        deviation = NULL,
                        rank = NULL,
                        points = NULL,
                        prize = NULL
                    RETURNING {}",
                    BET_COLUMNS
                );
                let bet = sqlx::query_as::<_, Bet>(&query)
                    .bind(&submission.round_id)
                    .bind(&submission.user_id)
                    .bind(submission.display_name.trim())
                    .bind(submission.predicted_max)
                    .bind(submission.predicted_min)
                    .bind(&submitted_at)
                    .bind(&submission.round_id)
                    .fetch_optional(&pool)
                    .await?;
                Ok(bet)
            })
            .await?;

        match bet {
            Some(bet) => {
                info!(
                    "bet stored for {} on {}: max {} min {}",
                    bet.user_id, bet.round_id, bet.predicted_max, bet.predicted_min
                );
                Ok(bet)
            }
            None => Err(Error::RoundNotOpen(round_id)),
        }
    }

    /// Bets of a round, in rank order once settled, else in submission order
    pub async fn bets_for_round(&self, round_id: &str) -> Result<Vec<Bet>, Error> {
        let bets = sqlx::query_as::<_, Bet>(&format!(
            "SELECT {} FROM bets
            WHERE round_id = ?
            ORDER BY rank IS NULL, rank ASC, submitted_at ASC, user_id ASC",
            BET_COLUMNS
        ))
        .bind(round_id)
        .fetch_all(self.db_connection.read())
        .await?;

        Ok(bets)
    }
}

/// Bets in submission order, read inside the settlement transaction
pub(crate) async fn bets_by_submission(
    conn: &mut SqliteConnection,
    round_id: &str,
) -> Result<Vec<Bet>, sqlx::Error> {
    sqlx::query_as::<_, Bet>(&format!(
        "SELECT {} FROM bets WHERE round_id = ? ORDER BY submitted_at ASC, user_id ASC",
        BET_COLUMNS
    ))
    .bind(round_id)
    .fetch_all(&mut *conn)
    .await
}

pub(crate) async fn record_score(
    conn: &mut SqliteConnection,
    round_id: &str,
    user_id: &str,
    deviation: f64,
    rank: i64,
    points: Option<i64>,
    prize: Option<i64>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE bets SET deviation = ?, rank = ?, points = ?, prize = ?
        WHERE round_id = ? AND user_id = ?",
    )
    .bind(deviation)
    .bind(rank)
    .bind(points)
    .bind(prize)
    .bind(round_id)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
