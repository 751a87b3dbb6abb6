use log::{debug, error, warn};
use predictor_core::{Location, RoundStatusKind};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};
use std::collections::HashSet;
use time::{Date, OffsetDateTime};

use super::{Round, Settled};
use crate::{
    domain::Error,
    infra::db::{encode_date, encode_datetime, parse_required_date, DBConnection},
};

pub(crate) const ROUND_COLUMNS: &str = "id,
    target_date,
    location_name,
    location_country,
    latitude,
    longitude,
    status,
    baseline_max,
    baseline_min,
    baseline_captured_at,
    actual_max,
    actual_min,
    pot,
    winner_count,
    bet_count,
    settled_at,
    created_at,
    updated_at";

/// A state change computed by the scheduler, applied only if the round is still
/// in the state it was read in.
#[derive(Debug, Clone)]
pub struct RoundTransition {
    pub from: RoundStatusKind,
    pub round: Round,
}

impl RoundTransition {
    pub fn new(from: RoundStatusKind, round: impl Into<Round>) -> Self {
        Self {
            from,
            round: round.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoundStore {
    db_connection: DBConnection,
}

impl RoundStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        self.db_connection.ping().await
    }

    pub async fn get_round(&self, round_id: &str) -> Result<Option<Round>, Error> {
        let round = sqlx::query_as::<_, Round>(&format!(
            "SELECT {} FROM rounds WHERE id = ?",
            ROUND_COLUMNS
        ))
        .bind(round_id)
        .fetch_optional(self.db_connection.read())
        .await?;

        Ok(round)
    }

    /// Rounds ordered by target date, optionally filtered by status. Rows that
    /// fail to decode are logged and left out so the rest stay usable.
    pub async fn list_rounds(&self, status: Option<RoundStatusKind>) -> Result<Vec<Round>, Error> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {} FROM rounds WHERE status = ? ORDER BY target_date ASC",
                    ROUND_COLUMNS
                ))
                .bind(status.as_str())
                .fetch_all(self.db_connection.read())
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM rounds ORDER BY target_date ASC",
                    ROUND_COLUMNS
                ))
                .fetch_all(self.db_connection.read())
                .await?
            }
        };

        Ok(rows.iter().filter_map(decode_round).collect())
    }

    /// Target dates that already have a round, whatever its state or location
    pub async fn existing_target_dates(&self, from: Date) -> Result<HashSet<Date>, Error> {
        let rows = sqlx::query("SELECT target_date FROM rounds WHERE target_date >= ?")
            .bind(encode_date(from)?)
            .fetch_all(self.db_connection.read())
            .await?;

        let mut dates = HashSet::with_capacity(rows.len());
        for row in rows {
            dates.insert(parse_required_date(&row, "target_date")?);
        }
        Ok(dates)
    }

    /// Location keys of the most recently created rounds, newest first
    pub async fn recent_location_keys(&self, window: usize) -> Result<Vec<String>, Error> {
        let rows = sqlx::query(
            "SELECT location_name, location_country, latitude, longitude
            FROM rounds
            ORDER BY created_at DESC, target_date DESC
            LIMIT ?",
        )
        .bind(window as i64)
        .fetch_all(self.db_connection.read())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Location {
                    name: row.try_get("location_name")?,
                    country: row.try_get("location_country")?,
                    latitude: row.try_get("latitude")?,
                    longitude: row.try_get("longitude")?,
                }
                .key())
            })
            .collect::<Result<Vec<String>, sqlx::Error>>()
            .map_err(Error::from)
    }

    /// Insert new rounds in one transaction, dates that already have a round are
    /// left alone. Returns how many rows were created.
    pub async fn insert_rounds(&self, rounds: Vec<Round>) -> Result<u64, Error> {
        if rounds.is_empty() {
            return Ok(0);
        }

        let inserted = self
            .db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;
                let mut inserted = 0;
                for round in &rounds {
                    let affected = insert_round(&mut tx, round).await?;
                    if affected == 0 {
                        warn!(
                            "round for {} already exists, skipped {}",
                            round.target_date(),
                            round.id()
                        );
                    }
                    inserted += affected;
                }
                tx.commit().await?;
                Ok(inserted)
            })
            .await?;

        Ok(inserted)
    }

    /// Apply a batch of transitions atomically. A transition whose round moved on
    /// since it was read is skipped. Returns the ids actually updated.
    pub async fn apply_transitions(
        &self,
        transitions: Vec<RoundTransition>,
    ) -> Result<Vec<String>, Error> {
        if transitions.is_empty() {
            return Ok(vec![]);
        }

        let applied = self
            .db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;
                let mut applied = Vec::with_capacity(transitions.len());
                for transition in &transitions {
                    let affected = update_round_state(&mut tx, transition).await?;
                    if affected == 1 {
                        applied.push(transition.round.id().to_string());
                    } else {
                        warn!(
                            "round {} is no longer {}, skipped move to {}",
                            transition.round.id(),
                            transition.from,
                            transition.round.state_name()
                        );
                    }
                }
                tx.commit().await?;
                Ok(applied)
            })
            .await?;

        debug!("applied {} round transitions", applied.len());
        Ok(applied)
    }
}

fn decode_round(row: &SqliteRow) -> Option<Round> {
    match Round::from_row(row) {
        Ok(round) => Some(round),
        Err(e) => {
            let id: String = row.try_get("id").unwrap_or_default();
            error!("skipping unreadable round {}: {}", id, e);
            None
        }
    }
}

async fn insert_round(conn: &mut SqliteConnection, round: &Round) -> Result<u64, sqlx::Error> {
    let info = round.info();
    let baseline = round.baseline();
    let captured_at = baseline.map(|b| encode_datetime(b.captured_at)).transpose()?;

    let result = sqlx::query(
        "INSERT INTO rounds (
            id,
            target_date,
            location_name,
            location_country,
            latitude,
            longitude,
            status,
            baseline_max,
            baseline_min,
            baseline_captured_at,
            created_at,
            updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT DO NOTHING",
    )
    .bind(&info.id)
    .bind(encode_date(info.target_date)?)
    .bind(&info.location.name)
    .bind(&info.location.country)
    .bind(info.location.latitude)
    .bind(info.location.longitude)
    .bind(round.status().as_str())
    .bind(baseline.map(|b| b.max))
    .bind(baseline.map(|b| b.min))
    .bind(captured_at)
    .bind(encode_datetime(info.created_at)?)
    .bind(encode_datetime(info.updated_at)?)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

async fn update_round_state(
    conn: &mut SqliteConnection,
    transition: &RoundTransition,
) -> Result<u64, sqlx::Error> {
    let round = &transition.round;
    let baseline = round.baseline();
    let captured_at = baseline.map(|b| encode_datetime(b.captured_at)).transpose()?;

    let result = sqlx::query(
        "UPDATE rounds SET
            status = ?,
            baseline_max = ?,
            baseline_min = ?,
            baseline_captured_at = ?,
            updated_at = ?
        WHERE id = ? AND status = ?",
    )
    .bind(round.status().as_str())
    .bind(baseline.map(|b| b.max))
    .bind(baseline.map(|b| b.min))
    .bind(captured_at)
    .bind(encode_datetime(round.info().updated_at)?)
    .bind(round.id())
    .bind(transition.from.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Close out a locked round inside the settlement transaction. Zero rows means the
/// round was already settled (or is not locked) and the caller must roll back.
pub(crate) async fn mark_settled(
    conn: &mut SqliteConnection,
    settled: &Settled,
) -> Result<u64, sqlx::Error> {
    let outcome = &settled.outcome;
    let updated_at: OffsetDateTime = settled.info.updated_at;

    let result = sqlx::query(
        "UPDATE rounds SET
            status = 'settled',
            actual_max = ?,
            actual_min = ?,
            pot = ?,
            winner_count = ?,
            bet_count = ?,
            settled_at = ?,
            updated_at = ?
        WHERE id = ? AND status = 'locked'",
    )
    .bind(outcome.actual_max)
    .bind(outcome.actual_min)
    .bind(outcome.pot)
    .bind(outcome.winner_count)
    .bind(outcome.bet_count)
    .bind(encode_datetime(outcome.settled_at)?)
    .bind(encode_datetime(updated_at)?)
    .bind(&settled.info.id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}
