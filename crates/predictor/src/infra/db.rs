use crate::SqliteConfigSerde;
use log::{debug, error};
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, Sqlite, SqlitePool,
};
use std::{
    future::Future,
    hash::{DefaultHasher, Hash, Hasher},
    time::Duration as StdDuration,
};
use thiserror::Error;
use time::{
    format_description::{well_known::Rfc3339, FormatItem},
    macros::format_description,
    Date, OffsetDateTime, UtcOffset,
};

/// Fixed width UTC timestamps so text ordering in SQL matches time ordering
const TIMESTAMP_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
);
const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(Debug, Clone)]
pub enum SqliteMode {
    ReadWriteCreate, // rwc - Read + Write + Create if missing
    ReadWrite,       // rw  - Read + Write (must exist)
    ReadOnly,        // ro  - Read only (must exist)
    Memory,          // memory - In-memory database
}

#[derive(Debug, Clone)]
pub enum SqliteCache {
    Shared,
    Private,
}

#[derive(Debug, Clone)]
pub enum JournalMode {
    WAL,
    DELETE,
    TRUNCATE,
    PERSIST,
    MEMORY,
    OFF,
}

#[derive(Debug, Clone)]
pub enum SynchronousMode {
    OFF,
    NORMAL,
    FULL,
    EXTRA,
}

#[derive(Debug, Clone)]
pub enum TempStore {
    Default,
    File,
    Memory,
}

#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub mode: SqliteMode,
    pub cache: SqliteCache,
    pub busy_timeout_ms: u32,
    pub journal_mode: JournalMode,
    pub synchronous: SynchronousMode,
    pub cache_size: i32,
    pub foreign_keys: bool,
    pub wal_autocheckpoint: Option<u32>,
    pub temp_store: TempStore,
    pub mmap_size: Option<u64>,
    pub page_size: Option<u32>,
}

impl SqliteConfig {
    pub fn read_only() -> Self {
        Self {
            mode: SqliteMode::ReadOnly,
            cache: SqliteCache::Shared,
            journal_mode: JournalMode::WAL,
            synchronous: SynchronousMode::OFF,
            foreign_keys: false,
            ..Default::default()
        }
    }

    pub fn build_connect_options(&self, database_path: &str) -> SqliteConnectOptions {
        let mut options = SqliteConnectOptions::new();

        match self.mode {
            SqliteMode::Memory => {
                // Read and write pools must land on the same in-memory database,
                // so the name is derived from the requested path
                let mut hasher = DefaultHasher::new();
                database_path.hash(&mut hasher);
                let unique_id = hasher.finish();

                let memory_uri = format!("file:predictor_{}?mode=memory&cache=shared", unique_id);
                options = options.filename(&memory_uri).shared_cache(true);
            }
            SqliteMode::ReadOnly => {
                return options
                    .filename(database_path)
                    .read_only(true)
                    .shared_cache(matches!(self.cache, SqliteCache::Shared))
                    .busy_timeout(StdDuration::from_millis(self.busy_timeout_ms as u64));
            }
            SqliteMode::ReadWrite => {
                options = options
                    .filename(database_path)
                    .read_only(false)
                    .shared_cache(matches!(self.cache, SqliteCache::Shared));
            }
            SqliteMode::ReadWriteCreate => {
                options = options
                    .filename(database_path)
                    .read_only(false)
                    .create_if_missing(true)
                    .shared_cache(matches!(self.cache, SqliteCache::Shared));
            }
        }

        options = options.busy_timeout(StdDuration::from_millis(self.busy_timeout_ms as u64));

        let journal_mode = match self.journal_mode {
            JournalMode::WAL => "WAL",
            JournalMode::DELETE => "DELETE",
            JournalMode::TRUNCATE => "TRUNCATE",
            JournalMode::PERSIST => "PERSIST",
            JournalMode::MEMORY => "MEMORY",
            JournalMode::OFF => "OFF",
        };
        options = options.pragma("journal_mode", journal_mode);

        let sync_mode = match self.synchronous {
            SynchronousMode::OFF => "OFF",
            SynchronousMode::NORMAL => "NORMAL",
            SynchronousMode::FULL => "FULL",
            SynchronousMode::EXTRA => "EXTRA",
        };
        options = options.pragma("synchronous", sync_mode);
        options = options.pragma("cache_size", self.cache_size.to_string());

        if self.foreign_keys {
            options = options.pragma("foreign_keys", "true");
        }

        if let Some(checkpoint) = self.wal_autocheckpoint {
            options = options.pragma("wal_autocheckpoint", checkpoint.to_string());
        }

        let temp_store = match self.temp_store {
            TempStore::Default => "default",
            TempStore::File => "file",
            TempStore::Memory => "memory",
        };
        options = options.pragma("temp_store", temp_store);

        if let Some(mmap_size) = self.mmap_size {
            options = options.pragma("mmap_size", mmap_size.to_string());
        }

        if let Some(page_size) = self.page_size {
            options = options.pragma("page_size", page_size.to_string());
        }

        options
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            mode: SqliteMode::ReadWriteCreate,
            cache: SqliteCache::Shared,
            busy_timeout_ms: 5000,
            journal_mode: JournalMode::WAL,
            synchronous: SynchronousMode::NORMAL,
            cache_size: 100000,
            foreign_keys: true,
            wal_autocheckpoint: Some(1000),
            temp_store: TempStore::Memory,
            mmap_size: Some(268435456), // 256MB
            page_size: Some(4096),
        }
    }
}

impl From<SqliteConfigSerde> for SqliteConfig {
    fn from(config: SqliteConfigSerde) -> Self {
        Self {
            mode: match config.mode.as_str() {
                "ReadWrite" => SqliteMode::ReadWrite,
                "ReadOnly" => SqliteMode::ReadOnly,
                "Memory" => SqliteMode::Memory,
                _ => SqliteMode::ReadWriteCreate,
            },
            cache: match config.cache.as_str() {
                "Private" => SqliteCache::Private,
                _ => SqliteCache::Shared,
            },
            busy_timeout_ms: config.busy_timeout_ms,
            journal_mode: match config.journal_mode.as_str() {
                "DELETE" => JournalMode::DELETE,
                "TRUNCATE" => JournalMode::TRUNCATE,
                "PERSIST" => JournalMode::PERSIST,
                "MEMORY" => JournalMode::MEMORY,
                "OFF" => JournalMode::OFF,
                _ => JournalMode::WAL,
            },
            synchronous: match config.synchronous.as_str() {
                "OFF" => SynchronousMode::OFF,
                "FULL" => SynchronousMode::FULL,
                "EXTRA" => SynchronousMode::EXTRA,
                _ => SynchronousMode::NORMAL,
            },
            cache_size: config.cache_size,
            foreign_keys: config.foreign_keys,
            wal_autocheckpoint: config.wal_autocheckpoint,
            temp_store: match config.temp_store.as_str() {
                "Default" => TempStore::Default,
                "File" => TempStore::File,
                _ => TempStore::Memory,
            },
            mmap_size: config.mmap_size,
            page_size: config.page_size,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabasePoolConfig {
    pub read_max_connections: u32,
    pub read_min_connections: u32,
    pub write_max_connections: u32,
    pub write_min_connections: u32,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub sqlite_config: SqliteConfig,
}

impl Default for DatabasePoolConfig {
    fn default() -> Self {
        Self {
            read_max_connections: 12,
            read_min_connections: 2,
            write_max_connections: 1,
            write_min_connections: 1,
            idle_timeout_secs: 600,
            acquire_timeout_secs: 15,
            write_timeout_secs: 30,
            sqlite_config: SqliteConfig::default(),
        }
    }
}

impl From<crate::config::DBSettings> for DatabasePoolConfig {
    fn from(config: crate::config::DBSettings) -> Self {
        Self {
            read_max_connections: config.read_max_connections,
            read_min_connections: config.read_min_connections,
            write_max_connections: config.write_max_connections,
            write_min_connections: config.write_min_connections,
            idle_timeout_secs: config.idle_timeout_secs,
            acquire_timeout_secs: config.acquire_timeout_secs,
            write_timeout_secs: config.write_timeout_secs,
            sqlite_config: config.sqlite_config.into(),
        }
    }
}

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Error, Debug)]
pub enum DatabaseWriteError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("write did not finish within {0:?}")]
    Timeout(StdDuration),
}

#[derive(Clone, Debug)]
pub struct DBConnection {
    pub database_name: String,
    pub database_path: String,
    read_pool: SqlitePool,
    write_pool: SqlitePool,
    write_timeout: StdDuration,
}

impl DBConnection {
    pub async fn new(
        path: &str,
        db_name: &str,
        database_pool_config: DatabasePoolConfig,
    ) -> Result<Self, sqlx::Error> {
        let database_path = format!("{}/{}.db", path, db_name);

        if !matches!(database_pool_config.sqlite_config.mode, SqliteMode::Memory) {
            let database_url = format!("sqlite:{}", database_path);
            if !Sqlite::database_exists(&database_url).await? {
                Sqlite::create_database(&database_url).await?;
            }
        }

        let (read_pool, write_pool) =
            Self::create_pools(&database_path, &database_pool_config).await?;

        MIGRATOR
            .run(&write_pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;

        Ok(Self {
            database_name: db_name.to_string(),
            database_path,
            read_pool,
            write_pool,
            write_timeout: StdDuration::from_secs(database_pool_config.write_timeout_secs),
        })
    }

    /// Wrap already migrated pools, used by tests running on `sqlx::test` databases
    pub fn new_with_pools(
        database_name: &str,
        database_path: &str,
        read_pool: SqlitePool,
        write_pool: SqlitePool,
    ) -> Self {
        Self {
            database_name: database_name.to_string(),
            database_path: database_path.to_string(),
            read_pool,
            write_pool,
            write_timeout: StdDuration::from_secs(DatabasePoolConfig::default().write_timeout_secs),
        }
    }

    async fn create_pools(
        database_path: &str,
        database_pool_config: &DatabasePoolConfig,
    ) -> Result<(SqlitePool, SqlitePool), sqlx::Error> {
        let (read_config, write_config) =
            if matches!(database_pool_config.sqlite_config.mode, SqliteMode::Memory) {
                let read_config = SqliteConfig {
                    synchronous: SynchronousMode::OFF,
                    ..database_pool_config.sqlite_config.clone()
                };
                (read_config, database_pool_config.sqlite_config.clone())
            } else {
                let mut read_config = SqliteConfig::read_only();
                read_config.cache_size = database_pool_config.sqlite_config.cache_size * 2;
                read_config.busy_timeout_ms = database_pool_config.sqlite_config.busy_timeout_ms;

                let write_config = SqliteConfig {
                    mode: SqliteMode::ReadWrite,
                    ..database_pool_config.sqlite_config.clone()
                };

                (read_config, write_config)
            };

        let write_connection = write_config.build_connect_options(database_path);
        debug!("Write connection: {:?}", write_connection);

        let write_pool = SqlitePoolOptions::new()
            .max_connections(database_pool_config.write_max_connections)
            .min_connections(database_pool_config.write_min_connections)
            .acquire_timeout(StdDuration::from_secs(
                database_pool_config.acquire_timeout_secs,
            ))
            .idle_timeout(StdDuration::from_secs(
                database_pool_config.idle_timeout_secs,
            ))
            .connect_with(write_connection)
            .await?;

        let read_connection = read_config.build_connect_options(database_path);
        debug!("Read connection: {:?}", read_connection);

        let read_pool = SqlitePoolOptions::new()
            .max_connections(database_pool_config.read_max_connections)
            .min_connections(database_pool_config.read_min_connections)
            .acquire_timeout(StdDuration::from_secs(
                database_pool_config.acquire_timeout_secs,
            ))
            .idle_timeout(StdDuration::from_secs(
                database_pool_config.idle_timeout_secs,
            ))
            .connect_with(read_connection)
            .await?;

        Ok((read_pool, write_pool))
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        let _: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.read_pool)
            .await?;
        let _: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.write_pool)
            .await?;

        Ok(())
    }

    pub fn read(&self) -> &SqlitePool {
        &self.read_pool
    }

    /// Run a write against the write pool, bounded by the configured write timeout.
    /// The closure owns a pool handle so it can open its own transaction.
    pub async fn execute_write<T, F, Fut>(&self, operation: F) -> Result<T, DatabaseWriteError>
    where
        F: FnOnce(SqlitePool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let pool = self.write_pool.clone();
        match tokio::time::timeout(self.write_timeout, operation(pool)).await {
            Ok(result) => result.map_err(DatabaseWriteError::from),
            Err(_) => {
                error!(
                    "write to {} timed out after {:?}",
                    self.database_name, self.write_timeout
                );
                Err(DatabaseWriteError::Timeout(self.write_timeout))
            }
        }
    }
}

pub fn encode_datetime(value: OffsetDateTime) -> Result<String, sqlx::Error> {
    value
        .to_offset(UtcOffset::UTC)
        .format(TIMESTAMP_FORMAT)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

pub fn encode_date(value: Date) -> Result<String, sqlx::Error> {
    value
        .format(DATE_FORMAT)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

pub fn parse_required_datetime(
    row: &SqliteRow,
    column: &str,
) -> Result<OffsetDateTime, sqlx::Error> {
    let date_str: String = row.try_get(column)?;
    OffsetDateTime::parse(&date_str, &Rfc3339).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub fn parse_optional_datetime(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<OffsetDateTime>, sqlx::Error> {
    row.try_get::<Option<String>, _>(column)?
        .map(|s| OffsetDateTime::parse(&s, &Rfc3339))
        .transpose()
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
}

pub fn parse_required_date(row: &SqliteRow, column: &str) -> Result<Date, sqlx::Error> {
    let date_str: String = row.try_get(column)?;
    Date::parse(&date_str, DATE_FORMAT).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn timestamps_have_fixed_width() {
        let early = encode_datetime(datetime!(2026-11-01 09:00:00 UTC)).unwrap();
        let later = encode_datetime(datetime!(2026-11-01 09:00:00.5 UTC)).unwrap();
        assert_eq!(early, "2026-11-01T09:00:00.000000Z");
        assert_eq!(later.len(), early.len());
        assert!(early < later);
        assert_eq!(
            OffsetDateTime::parse(&later, &Rfc3339).unwrap(),
            datetime!(2026-11-01 09:00:00.5 UTC)
        );
    }

    #[test]
    fn offsets_are_normalized_to_utc() {
        let encoded = encode_datetime(datetime!(2026-11-01 10:00:00 +01:00)).unwrap();
        assert_eq!(encoded, "2026-11-01T09:00:00.000000Z");
    }

    #[test]
    fn dates_are_iso() {
        assert_eq!(encode_date(date!(2026 - 03 - 08)).unwrap(), "2026-03-08");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn write_helper_runs_on_write_pool(pool: SqlitePool) {
        let db = DBConnection::new_with_pools("test", ":memory:", pool.clone(), pool);
        db.ping().await.unwrap();
        let value: i64 = db
            .execute_write(|pool| async move {
                sqlx::query_scalar("SELECT 41 + 1").fetch_one(&pool).await
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }
}
