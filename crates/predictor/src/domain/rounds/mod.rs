pub mod calendar;
pub mod states;
mod store;

pub use calendar::*;
pub use states::*;
pub use store::*;

use predictor_core::{Extremes, Location, RoundStatusKind};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};
use std::str::FromStr;
use time::{Date, OffsetDateTime};

use crate::infra::db::{parse_optional_datetime, parse_required_date, parse_required_datetime};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Deterministic round id, the same date and location always give the same id
pub fn round_id(target_date: Date, location: &Location) -> String {
    format!("{}-{}", target_date, location.slug())
}

/// Data every round carries regardless of its lifecycle state
#[derive(Debug, Clone, PartialEq)]
pub struct RoundInfo {
    pub id: String,
    pub target_date: Date,
    pub location: Location,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl RoundInfo {
    pub fn new(target_date: Date, location: Location, now: OffsetDateTime) -> Self {
        Self {
            id: round_id(target_date, &location),
            target_date,
            location,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whole days from `today` until the target date, negative once it has passed
    pub fn days_until(&self, today: Date) -> i64 {
        (self.target_date - today).whole_days()
    }

    pub(crate) fn touch(mut self, now: OffsetDateTime) -> Self {
        self.updated_at = now;
        self
    }
}

/// Forecast captured by the game itself when a round opens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub max: f64,
    pub min: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
}

impl Baseline {
    pub fn new(extremes: Extremes, captured_at: OffsetDateTime) -> Self {
        Self {
            max: extremes.max,
            min: extremes.min,
            captured_at,
        }
    }

    pub fn extremes(&self) -> Extremes {
        Extremes::new(self.max, self.min)
    }

    /// A baseline bets can be checked against: present and not the zero pair
    pub fn is_usable(&self) -> bool {
        !self.extremes().is_zero_sentinel()
    }
}

/// Result of a settlement, stored on the round
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub actual_max: f64,
    pub actual_min: f64,
    /// Credits in play, one per bet
    pub pot: i64,
    pub bet_count: i64,
    /// Players that received a prize
    pub winner_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub settled_at: OffsetDateTime,
}

impl Outcome {
    pub fn actual(&self) -> Extremes {
        Extremes::new(self.actual_max, self.actual_min)
    }
}

/// Flat shape of a round for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundView {
    pub id: String,
    #[serde(with = "iso_date")]
    pub target_date: Date,
    pub location: Location,
    pub status: RoundStatusKind,
    pub baseline: Option<Baseline>,
    pub outcome: Option<Outcome>,
    /// Bets are only accepted while this is set
    pub accepting_bets: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&Round> for RoundView {
    fn from(round: &Round) -> Self {
        let info = round.info();
        RoundView {
            id: info.id.clone(),
            target_date: info.target_date,
            location: info.location.clone(),
            status: round.status(),
            baseline: round.baseline().copied(),
            outcome: round.outcome().copied(),
            accepting_bets: round.accepts_bets(),
            created_at: info.created_at,
            updated_at: info.updated_at,
        }
    }
}

impl From<Round> for RoundView {
    fn from(round: Round) -> Self {
        RoundView::from(&round)
    }
}

fn decode_error(column: &str, message: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.into(),
    }
}

impl FromRow<'_, SqliteRow> for Round {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = RoundStatusKind::from_str(&status)
            .map_err(|e| decode_error("status", e.to_string()))?;

        let info = RoundInfo {
            id: row.try_get("id")?,
            target_date: parse_required_date(row, "target_date")?,
            location: Location {
                name: row.try_get("location_name")?,
                country: row.try_get("location_country")?,
                latitude: row.try_get("latitude")?,
                longitude: row.try_get("longitude")?,
            },
            created_at: parse_required_datetime(row, "created_at")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
        };

        let baseline_max: Option<f64> = row.try_get("baseline_max")?;
        let baseline_min: Option<f64> = row.try_get("baseline_min")?;
        let captured_at = parse_optional_datetime(row, "baseline_captured_at")?;
        let baseline = match (baseline_max, baseline_min, captured_at) {
            (Some(max), Some(min), Some(captured_at)) => Some(Baseline {
                max,
                min,
                captured_at,
            }),
            _ => None,
        };

        let round = match status {
            RoundStatusKind::Dormant => Round::Dormant(Dormant::from_info(info)),
            RoundStatusKind::Active => Round::Active(Active::from_parts(info, baseline)),
            RoundStatusKind::Locked => Round::Locked(Locked::from_parts(info, baseline)),
            RoundStatusKind::Settled => {
                let actual_max: Option<f64> = row.try_get("actual_max")?;
                let actual_min: Option<f64> = row.try_get("actual_min")?;
                let pot: Option<i64> = row.try_get("pot")?;
                let bet_count: Option<i64> = row.try_get("bet_count")?;
                let winner_count: Option<i64> = row.try_get("winner_count")?;
                let settled_at = parse_optional_datetime(row, "settled_at")?;
                match (actual_max, actual_min, pot, bet_count, winner_count, settled_at) {
                    (
                        Some(actual_max),
                        Some(actual_min),
                        Some(pot),
                        Some(bet_count),
                        Some(winner_count),
                        Some(settled_at),
                    ) => Round::Settled(Settled::from_parts(
                        info,
                        baseline,
                        Outcome {
                            actual_max,
                            actual_min,
                            pot,
                            bet_count,
                            winner_count,
                            settled_at,
                        },
                    )),
                    _ => {
                        return Err(decode_error(
                            "actual_max",
                            format!("settled round {} is missing its outcome", info.id),
                        ))
                    }
                }
            }
        };

        Ok(round)
    }
}
