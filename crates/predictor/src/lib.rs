pub mod api;
pub mod config;
pub mod domain;
pub mod infra;
pub mod startup;

pub use api::routes::*;
pub use config::*;
pub use domain::{
    BetLedger, Error as GameError, LeaderboardStore, PlayerStore, Round, RoundScheduler,
    RoundStore, RoundWatcher, SettlementEngine, TickSummary,
};
pub use infra::db::*;
#[cfg(any(feature = "e2e-testing", debug_assertions))]
pub use infra::weather_mock::MockWeatherOracle;
pub use infra::weather::{Error as WeatherError, OpenMeteoClient, WeatherOracle};
pub use startup::*;
