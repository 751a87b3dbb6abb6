use predictor_core::LeaderboardScope;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};
use time::{Date, OffsetDateTime};

use crate::{
    domain::Error,
    infra::db::{encode_datetime, parse_required_datetime, DBConnection},
};

/// Largest page a leaderboard read returns
pub const MAX_LEADERBOARD_LIMIT: i64 = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Position in the scope, ties share the better position
    pub position: i64,
    pub user_id: String,
    pub display_name: String,
    pub score: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for LeaderboardEntry {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(LeaderboardEntry {
            position: row.try_get("position")?,
            user_id: row.try_get("user_id")?,
            display_name: row.try_get("display_name")?,
            score: row.try_get("score")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaderboard {
    pub scope: String,
    pub entries: Vec<LeaderboardEntry>,
}

/// One line of a settled round's ranking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingEntry {
    pub rank: i64,
    pub user_id: String,
    pub display_name: String,
    pub predicted_max: f64,
    pub predicted_min: f64,
    pub deviation: f64,
    pub points: Option<i64>,
    pub prize: Option<i64>,
}

impl FromRow<'_, SqliteRow> for RankingEntry {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(RankingEntry {
            rank: row.try_get("rank")?,
            user_id: row.try_get("user_id")?,
            display_name: row.try_get("display_name")?,
            predicted_max: row.try_get("predicted_max")?,
            predicted_min: row.try_get("predicted_min")?,
            deviation: row.try_get("deviation")?,
            points: row.try_get("points")?,
            prize: row.try_get("prize")?,
        })
    }
}

/// Additive scoreboards across all time, year, quarter and month.
///
/// Scores only ever grow through `record_points`; ranking happens at read time.
#[derive(Debug, Clone)]
pub struct LeaderboardStore {
    db_connection: DBConnection,
}

impl LeaderboardStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    /// Add `points` to the user's entry in every scope `target_date` falls in
    pub async fn record_points(
        &self,
        user_id: &str,
        display_name: &str,
        points: i64,
        target_date: Date,
    ) -> Result<(), Error> {
        let user_id = user_id.to_string();
        let display_name = display_name.to_string();
        let updated_at = encode_datetime(OffsetDateTime::now_utc())?;

        self.db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;
                add_points(
                    &mut tx,
                    &user_id,
                    &display_name,
                    points,
                    target_date,
                    &updated_at,
                )
                .await?;
                tx.commit().await?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    /// Entries of a scope sorted by score, highest first
    pub async fn standings(&self, scope: LeaderboardScope, limit: i64) -> Result<Leaderboard, Error> {
        let limit = limit.clamp(1, MAX_LEADERBOARD_LIMIT);
        let scope_key = scope.key();

        let entries = sqlx::query_as::<_, LeaderboardEntry>(
            "SELECT
                RANK() OVER (ORDER BY score DESC) AS position,
                user_id,
                display_name,
                score,
                updated_at
            FROM leaderboard_entries
            WHERE scope_key = ?
            ORDER BY score DESC, updated_at ASC, user_id ASC
            LIMIT ?",
        )
        .bind(&scope_key)
        .bind(limit)
        .fetch_all(self.db_connection.read())
        .await?;

        Ok(Leaderboard {
            scope: scope_key,
            entries,
        })
    }

    /// Ranking of a settled round, empty while the round is unscored
    pub async fn round_ranking(&self, round_id: &str) -> Result<Vec<RankingEntry>, Error> {
        let ranking = sqlx::query_as::<_, RankingEntry>(
            "SELECT
                rank,
                user_id,
                display_name,
                predicted_max,
                predicted_min,
                deviation,
                points,
                prize
            FROM bets
            WHERE round_id = ? AND rank IS NOT NULL
            ORDER BY rank ASC",
        )
        .bind(round_id)
        .fetch_all(self.db_connection.read())
        .await?;

        Ok(ranking)
    }
}

/// Atomic per-scope increment, shared with the settlement transaction
pub(crate) async fn add_points(
    conn: &mut SqliteConnection,
    user_id: &str,
    display_name: &str,
    points: i64,
    target_date: Date,
    updated_at: &str,
) -> Result<(), sqlx::Error> {
    for scope in LeaderboardScope::for_date(target_date) {
        sqlx::query(
            "INSERT INTO leaderboard_entries (
                scope_key,
                user_id,
                display_name,
                score,
                updated_at
            ) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(scope_key, user_id) DO UPDATE SET
                score = score + excluded.score,
                display_name = excluded.display_name,
                updated_at = excluded.updated_at",
        )
        .bind(scope.key())
        .bind(user_id)
        .bind(display_name)
        .bind(points)
        .bind(updated_at)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use sqlx::SqlitePool;
    use time::macros::date;

    fn store(pool: SqlitePool) -> LeaderboardStore {
        LeaderboardStore::new(DBConnection::new_with_pools(
            "test",
            ":memory:",
            pool.clone(),
            pool,
        ))
    }

    async fn score(store: &LeaderboardStore, scope: &str, user_id: &str) -> Option<i64> {
        store
            .standings(scope.parse().unwrap(), 100)
            .await
            .unwrap()
            .entries
            .into_iter()
            .find(|e| e.user_id == user_id)
            .map(|e| e.score)
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn points_add_up_in_any_order(pool: SqlitePool) {
        let store = store(pool);
        store
            .record_points("user-1", "Misty Heron", 3, date!(2026 - 11 - 08))
            .await
            .unwrap();
        store
            .record_points("user-1", "Misty Heron", 7, date!(2026 - 02 - 01))
            .await
            .unwrap();

        assert_eq!(score(&store, "all_time", "user-1").await, Some(10));
        assert_eq!(score(&store, "2026", "user-1").await, Some(10));
        assert_eq!(score(&store, "2026_Q4", "user-1").await, Some(3));
        assert_eq!(score(&store, "2026_Q1", "user-1").await, Some(7));
        assert_eq!(score(&store, "2026_11", "user-1").await, Some(3));
        assert_eq!(score(&store, "2026_02", "user-1").await, Some(7));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn concurrent_increments_are_not_lost(pool: SqlitePool) {
        let store = store(pool);
        let writes = (0..20).map(|_| {
            let store = store.clone();
            async move {
                store
                    .record_points("user-1", "Misty Heron", 1, date!(2026 - 11 - 08))
                    .await
            }
        });
        for result in join_all(writes).await {
            result.unwrap();
        }

        assert_eq!(score(&store, "all_time", "user-1").await, Some(20));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn standings_sorted_by_score(pool: SqlitePool) {
        let store = store(pool);
        let day = date!(2026 - 11 - 08);
        store.record_points("user-1", "One", 4, day).await.unwrap();
        store.record_points("user-2", "Two", 9, day).await.unwrap();
        store.record_points("user-3", "Three", 4, day).await.unwrap();

        let board = store.standings(LeaderboardScope::AllTime, 10).await.unwrap();
        assert_eq!(board.scope, "all_time");
        let users: Vec<&str> = board.entries.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(users, vec!["user-2", "user-1", "user-3"]);
        let positions: Vec<i64> = board.entries.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![1, 2, 2]);
    }
}
