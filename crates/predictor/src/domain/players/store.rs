use predictor_core::validate_display_name;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};
use time::OffsetDateTime;

use crate::{
    domain::Error,
    infra::db::{encode_datetime, parse_required_datetime, DBConnection},
};

/// Player profile as far as the game needs it. Display names are generated by the
/// profile service and never contain a contact identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub user_id: String,
    pub display_name: String,
    /// Credit balance, grows with prizes
    pub credits: i64,
    pub wins: i64,
    pub top_ten_finishes: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for Player {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Player {
            user_id: row.try_get("user_id")?,
            display_name: row.try_get("display_name")?,
            credits: row.try_get("credits")?,
            wins: row.try_get("wins")?,
            top_ten_finishes: row.try_get("top_ten_finishes")?,
            created_at: parse_required_datetime(row, "created_at")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPlayer {
    pub user_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct PlayerStore {
    db_connection: DBConnection,
}

impl PlayerStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    /// Create the player or refresh the display name of an existing one
    pub async fn upsert_player(&self, player: RegisterPlayer) -> Result<Player, Error> {
        if player.user_id.trim().is_empty() {
            return Err(Error::BadRequest(String::from("user_id cannot be empty")));
        }
        validate_display_name(&player.display_name)?;

        let now = encode_datetime(OffsetDateTime::now_utc())?;
        let user_id = player.user_id.clone();
        let display_name = player.display_name.trim().to_string();

        let player = self
            .db_connection
            .execute_write(move |pool| async move {
                let player = sqlx::query_as::<_, Player>(
                    "INSERT INTO players (
                        user_id,
                        display_name,
                        created_at,
                        updated_at
                    ) VALUES (?, ?, ?, ?)
                    ON CONFLICT(user_id) DO UPDATE SET
                        display_name = excluded.display_name,
                        updated_at = excluded.updated_at
                    RETURNING user_id, display_name, credits, wins, top_ten_finishes, created_at, updated_at",
                )
                .bind(user_id)
                .bind(display_name)
                .bind(&now)
                .bind(&now)
                .fetch_one(&pool)
                .await?;
                Ok(player)
            })
            .await?;

        Ok(player)
    }

    pub async fn get_player(&self, user_id: &str) -> Result<Player, Error> {
        let player = sqlx::query_as::<_, Player>(
            "SELECT
                user_id,
                display_name,
                credits,
                wins,
                top_ten_finishes,
                created_at,
                updated_at
            FROM players
            WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.db_connection.read())
        .await?;

        player.ok_or_else(|| Error::UserNotFound(user_id.to_string()))
    }
}

/// Settlement side of the credit ledger, runs inside the settlement transaction
pub(crate) async fn credit_finish(
    conn: &mut SqliteConnection,
    user_id: &str,
    prize: i64,
    won: bool,
    updated_at: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE players SET
            credits = credits + ?,
            wins = wins + ?,
            top_ten_finishes = top_ten_finishes + 1,
            updated_at = ?
        WHERE user_id = ?",
    )
    .bind(prize)
    .bind(i64::from(won))
    .bind(updated_at)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    #[sqlx::test(migrations = "./migrations")]
    async fn upsert_refreshes_display_name(pool: SqlitePool) {
        let store = PlayerStore::new(DBConnection::new_with_pools(
            "test",
            ":memory:",
            pool.clone(),
            pool,
        ));

        let created = store
            .upsert_player(RegisterPlayer {
                user_id: String::from("user-1"),
                display_name: String::from("Misty Heron"),
            })
            .await
            .unwrap();
        assert_eq!(created.credits, 0);

        store
            .upsert_player(RegisterPlayer {
                user_id: String::from("user-1"),
                display_name: String::from("Gusty Heron"),
            })
            .await
            .unwrap();

        let player = store.get_player("user-1").await.unwrap();
        assert_eq!(player.display_name, "Gusty Heron");
        assert_eq!(player.created_at, created.created_at);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unknown_player_is_user_not_found(pool: SqlitePool) {
        let store = PlayerStore::new(DBConnection::new_with_pools(
            "test",
            ":memory:",
            pool.clone(),
            pool,
        ));
        let err = store.get_player("nobody").await.unwrap_err();
        assert!(matches!(err, Error::UserNotFound(_)));
    }
}
