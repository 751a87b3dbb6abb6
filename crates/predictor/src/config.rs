use anyhow::anyhow;
use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use predictor_core::Location;
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::{self, File},
    io::{Read, Write},
    path::PathBuf,
};
use time::{format_description::well_known::Iso8601, OffsetDateTime, Weekday};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to Settings.toml file holding configuration options
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level to run with the service (default: info)
    #[arg(short, long)]
    pub level: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Settings {
    pub config: Option<String>,
    pub level: Option<String>,
    pub db_settings: DBSettings,
    pub api_settings: APISettings,
    pub weather_settings: WeatherSettings,
    pub game_settings: GameSettings,
}

impl ConfigurableSettings for Settings {
    fn apply_cli_overrides(&mut self, cli_settings: &CliSettings) {
        if let Some(level) = &cli_settings.level {
            self.level = Some(level.clone());
        }
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("./config/local.toml")
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        self.game_settings.validate()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DBSettings {
    pub data_folder: String,
    pub read_max_connections: u32,
    pub read_min_connections: u32,
    pub write_max_connections: u32,
    pub write_min_connections: u32,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    /// Upper bound for a single write (including a full round settlement)
    pub write_timeout_secs: u64,
    pub sqlite_config: SqliteConfigSerde,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SqliteConfigSerde {
    pub mode: String,
    pub cache: String,
    pub busy_timeout_ms: u32,
    pub journal_mode: String,
    pub synchronous: String,
    pub cache_size: i32,
    pub foreign_keys: bool,
    pub wal_autocheckpoint: Option<u32>,
    pub temp_store: String,
    pub mmap_size: Option<u64>,
    pub page_size: Option<u32>,
}

impl Default for DBSettings {
    fn default() -> Self {
        DBSettings {
            data_folder: String::from("./data"),
            read_max_connections: 12,
            read_min_connections: 2,
            write_max_connections: 1,
            write_min_connections: 1,
            idle_timeout_secs: 600,   // 10 minutes
            acquire_timeout_secs: 15, // 15 seconds
            write_timeout_secs: 30,
            sqlite_config: SqliteConfigSerde::default(),
        }
    }
}

impl Default for SqliteConfigSerde {
    fn default() -> Self {
        Self {
            mode: "ReadWriteCreate".to_string(),
            cache: "Private".to_string(),
            busy_timeout_ms: 5000,
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
            cache_size: 100000,
            foreign_keys: true,
            wal_autocheckpoint: Some(1000),
            temp_store: "Memory".to_string(),
            mmap_size: Some(268435456), // 256MB
            page_size: Some(4096),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct APISettings {
    pub domain: String,
    pub port: String,
    pub origins: Vec<String>,
}

impl Default for APISettings {
    fn default() -> Self {
        APISettings {
            domain: String::from("127.0.0.1"),
            port: String::from("9990"),
            origins: vec![String::from("http://localhost:9990")],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WeatherSettings {
    /// Daily forecast endpoint, used for the baseline captured when a round opens
    pub forecast_url: String,
    /// Historical endpoint, used to resolve the observed outcome
    pub archive_url: String,
    /// Per request timeout, a slow provider must not eat the whole tick
    pub request_timeout_secs: u64,
    /// Retries for transient (5xx/429/connect) failures
    pub max_retries: u32,
    /// Serve synthetic data instead of calling the provider (debug builds only)
    #[serde(default)]
    pub mock_enabled: bool,
}

impl Default for WeatherSettings {
    fn default() -> Self {
        WeatherSettings {
            forecast_url: String::from("https://api.open-meteo.com/v1/forecast"),
            archive_url: String::from("https://archive-api.open-meteo.com/v1/archive"),
            request_timeout_secs: 10,
            max_retries: 3,
            mock_enabled: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameSettings {
    /// Day of the week every round targets, lowercase english name
    pub weekday: String,
    /// How many future target dates always have a round
    pub rounds_ahead: usize,
    /// Dormant rounds open for betting this many days before their target date
    pub lead_window_days: i64,
    /// How long betting stays open once a round is promoted
    pub betting_window_days: i64,
    /// Locations used by this many most recently created rounds are not picked again
    pub recent_location_window: usize,
    /// How often the scheduler runs
    pub tick_interval_secs: u64,
    /// Budget for a single scheduler run, anything left over is retried next tick
    pub tick_timeout_secs: u64,
    /// Concurrent baseline fetches during promotion and self-heal
    pub fetch_concurrency: usize,
    /// Fixed seed for location selection, random when unset
    #[serde(default)]
    pub rng_seed: Option<u64>,
    pub locations: Vec<Location>,
}

impl GameSettings {
    pub fn cycle_weekday(&self) -> Result<Weekday, anyhow::Error> {
        parse_weekday(&self.weekday)
    }

    /// Rounds lock once they are this close to their target date
    pub fn lock_threshold_days(&self) -> i64 {
        self.lead_window_days - self.betting_window_days
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.cycle_weekday()?;
        if self.rounds_ahead == 0 {
            return Err(anyhow!("rounds_ahead must be at least 1"));
        }
        if self.betting_window_days <= 0 {
            return Err(anyhow!("betting_window_days must be positive"));
        }
        if self.lead_window_days <= self.betting_window_days {
            return Err(anyhow!(
                "lead_window_days ({}) must be larger than betting_window_days ({})",
                self.lead_window_days,
                self.betting_window_days
            ));
        }
        if self.locations.is_empty() {
            return Err(anyhow!("at least one location is required"));
        }
        if self.fetch_concurrency == 0 {
            return Err(anyhow!("fetch_concurrency must be at least 1"));
        }
        Ok(())
    }
}

impl Default for GameSettings {
    fn default() -> Self {
        GameSettings {
            weekday: String::from("sunday"),
            rounds_ahead: 13,
            lead_window_days: 14,
            betting_window_days: 8,
            recent_location_window: 20,
            tick_interval_secs: 86400,
            tick_timeout_secs: 600,
            fetch_concurrency: 4,
            rng_seed: None,
            locations: default_locations(),
        }
    }
}

pub fn parse_weekday(value: &str) -> Result<Weekday, anyhow::Error> {
    match value.trim().to_lowercase().as_str() {
        "monday" => Ok(Weekday::Monday),
        "tuesday" => Ok(Weekday::Tuesday),
        "wednesday" => Ok(Weekday::Wednesday),
        "thursday" => Ok(Weekday::Thursday),
        "friday" => Ok(Weekday::Friday),
        "saturday" => Ok(Weekday::Saturday),
        "sunday" => Ok(Weekday::Sunday),
        other => Err(anyhow!("invalid weekday: {}", other)),
    }
}

fn location(name: &str, country: &str, latitude: f64, longitude: f64) -> Location {
    Location {
        name: name.to_string(),
        country: country.to_string(),
        latitude,
        longitude,
    }
}

pub fn default_locations() -> Vec<Location> {
    vec![
        location("Amsterdam", "NL", 52.3676, 4.9041),
        location("Rotterdam", "NL", 51.9244, 4.4777),
        location("Utrecht", "NL", 52.0907, 5.1214),
        location("Groningen", "NL", 53.2194, 6.5665),
        location("Maastricht", "NL", 50.8514, 5.6910),
        location("Eindhoven", "NL", 51.4416, 5.4697),
        location("Den Helder", "NL", 52.9563, 4.7601),
        location("Vlissingen", "NL", 51.4425, 3.5736),
        location("Brussels", "BE", 50.8503, 4.3517),
        location("Antwerp", "BE", 51.2194, 4.4025),
        location("Luxembourg", "LU", 49.6116, 6.1319),
        location("Paris", "FR", 48.8566, 2.3522),
        location("Marseille", "FR", 43.2965, 5.3698),
        location("Berlin", "DE", 52.5200, 13.4050),
        location("Hamburg", "DE", 53.5511, 9.9937),
        location("Munich", "DE", 48.1351, 11.5820),
        location("Copenhagen", "DK", 55.6761, 12.5683),
        location("Oslo", "NO", 59.9139, 10.7522),
        location("Stockholm", "SE", 59.3293, 18.0686),
        location("Helsinki", "FI", 60.1699, 24.9384),
        location("Reykjavik", "IS", 64.1466, -21.9426),
        location("Dublin", "IE", 53.3498, -6.2603),
        location("London", "GB", 51.5072, -0.1276),
        location("Edinburgh", "GB", 55.9533, -3.1883),
        location("Lisbon", "PT", 38.7223, -9.1393),
        location("Madrid", "ES", 40.4168, -3.7038),
        location("Barcelona", "ES", 41.3874, 2.1686),
        location("Rome", "IT", 41.9028, 12.4964),
        location("Vienna", "AT", 48.2082, 16.3738),
        location("Prague", "CZ", 50.0755, 14.4378),
        location("Warsaw", "PL", 52.2297, 21.0122),
        location("Athens", "GR", 37.9838, 23.7275),
    ]
}

pub fn get_settings() -> Result<Settings, anyhow::Error> {
    get_settings_with_cli(Cli::parse().into())
}

pub struct CliSettings {
    pub config: Option<String>,
    pub level: Option<String>,
}

impl From<Cli> for CliSettings {
    fn from(cli: Cli) -> Self {
        Self {
            config: cli.config,
            level: cli.level,
        }
    }
}

pub trait ConfigurableSettings: Serialize + for<'de> Deserialize<'de> + Default {
    /// Apply CLI settings after loading from file
    fn apply_cli_overrides(&mut self, cli_settings: &CliSettings);

    /// Get the default config file path
    fn default_config_path() -> PathBuf {
        PathBuf::from("./config/settings.toml")
    }

    /// Get the config directory path
    fn config_directory() -> PathBuf {
        PathBuf::from("./config")
    }

    /// Reject settings the service cannot run with
    fn validate(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

pub fn get_settings_with_cli<T: ConfigurableSettings>(
    cli_settings: CliSettings,
) -> Result<T, anyhow::Error> {
    let mut settings = if let Some(config_path) = cli_settings.config.clone() {
        let path = PathBuf::from(config_path);

        let absolute_path = if path.is_absolute() {
            path
        } else {
            env::current_dir()?.join(path)
        };

        match File::open(absolute_path) {
            Ok(mut file) => {
                let mut content = String::new();
                file.read_to_string(&mut content)
                    .map_err(|e| anyhow!("Failed to read config: {}", e))?;
                toml::from_str(&content)
                    .map_err(|e| anyhow!("Failed to map config to settings: {}", e))?
            }
            Err(err) => return Err(anyhow!("Failed to find file: {}", err)),
        }
    } else {
        let default_path = T::default_config_path();
        match File::open(&default_path) {
            Ok(mut file) => {
                let mut content = String::new();
                file.read_to_string(&mut content)
                    .map_err(|e| anyhow!("Failed to read default config: {}", e))?;
                toml::from_str(&content)
                    .map_err(|e| anyhow!("Failed to parse default config: {}", e))?
            }
            Err(_) => {
                let default_settings = T::default();

                fs::create_dir_all(T::config_directory())
                    .map_err(|e| anyhow!("Failed to create config directory: {}", e))?;

                let toml_content = toml::to_string(&default_settings)
                    .map_err(|e| anyhow!("Failed to serialize default settings: {}", e))?;

                let mut file = fs::File::create(&default_path)
                    .map_err(|e| anyhow!("Failed to create config file: {}", e))?;
                file.write_all(toml_content.as_bytes())
                    .map_err(|e| anyhow!("Failed to write default config: {}", e))?;

                default_settings
            }
        }
    };

    settings.apply_cli_overrides(&cli_settings);
    settings.validate()?;

    Ok(settings)
}

pub fn setup_logger(
    level: Option<String>,
    filter_targets: Vec<String>,
) -> Result<(), fern::InitError> {
    let rust_log = get_log_level(level);
    let colors = ColoredLevelConfig::new()
        .trace(Color::White)
        .debug(Color::Cyan)
        .info(Color::Blue)
        .warn(Color::Yellow)
        .error(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let now = OffsetDateTime::now_utc()
                .format(&Iso8601::DEFAULT)
                .unwrap_or_default();
            out.finish(format_args!(
                "[{} {}] {}: {}",
                now,
                colors.color(record.level()),
                record.target(),
                message
            ));
        })
        .level(rust_log)
        .filter(move |metadata| {
            !filter_targets
                .iter()
                .any(|filter| metadata.target().starts_with(filter))
        })
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}

pub fn get_log_level(level: Option<String>) -> LevelFilter {
    let level = level.unwrap_or_else(|| env::var("RUST_LOG").unwrap_or_default());
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_game_settings_are_valid() {
        let settings = GameSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.cycle_weekday().unwrap(), Weekday::Sunday);
        assert_eq!(settings.lock_threshold_days(), 6);
        assert!(settings.locations.len() > settings.recent_location_window);
    }

    #[test]
    fn lead_window_must_exceed_betting_window() {
        let settings = GameSettings {
            lead_window_days: 8,
            betting_window_days: 8,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn default_settings_round_trip_through_toml() {
        let settings = Settings::default();
        let content = toml::to_string(&settings).unwrap();
        let parsed: Settings = toml::from_str(&content).unwrap();
        assert_eq!(parsed.game_settings.rounds_ahead, 13);
        assert_eq!(parsed.game_settings.locations.len(), default_locations().len());
    }

    #[test]
    fn log_level_falls_back_to_info() {
        assert_eq!(get_log_level(Some("debug".into())), LevelFilter::Debug);
        assert_eq!(get_log_level(Some("loud".into())), LevelFilter::Info);
    }
}
