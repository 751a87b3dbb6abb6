use std::{
    collections::HashMap,
    f64::consts::PI,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        RwLock,
    },
};

use async_trait::async_trait;
use log::debug;
use predictor_core::{Extremes, WeatherMode};
use time::Date;

use super::weather::WeatherOracle;

/// Synthetic weather for local runs and end to end tests.
///
/// Values follow a smooth seasonal curve per latitude so they look plausible and
/// are stable across calls. The archive reading is slightly off the forecast so a
/// settled round never matches its baseline exactly.
#[derive(Default)]
pub struct MockWeatherOracle {
    overrides: RwLock<HashMap<(WeatherMode, Date), Option<Extremes>>>,
    outage: AtomicBool,
    calls: AtomicUsize,
}

impl MockWeatherOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the answer for one date, `None` makes that date unavailable
    pub fn set_extremes(&self, mode: WeatherMode, date: Date, extremes: Option<Extremes>) {
        if let Ok(mut overrides) = self.overrides.write() {
            overrides.insert((mode, date), extremes);
        }
    }

    pub fn clear_overrides(&self) {
        if let Ok(mut overrides) = self.overrides.write() {
            overrides.clear();
        }
    }

    /// While set every lookup fails
    pub fn set_outage(&self, down: bool) {
        self.outage.store(down, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seasonal_extremes(latitude: f64, date: Date, mode: WeatherMode) -> Extremes {
        let day = f64::from(date.ordinal());
        // Warmest around late July in the north, late January in the south
        let hemisphere = if latitude >= 0.0 { 1.0 } else { -1.0 };
        let season = hemisphere * (2.0 * PI * (day - 200.0) / 365.25).cos();
        let mean = 27.0 - 0.4 * latitude.abs() + 9.0 * season;
        let spread = 7.0 + 2.0 * season.abs();

        let (max, min) = match mode {
            WeatherMode::Forecast => (mean + spread / 2.0, mean - spread / 2.0),
            WeatherMode::Archive => (mean + spread / 2.0 + 0.7, mean - spread / 2.0 - 0.4),
        };
        Extremes::new(round_tenth(max), round_tenth(min))
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[async_trait]
impl WeatherOracle for MockWeatherOracle {
    async fn fetch_extremes(
        &self,
        latitude: f64,
        _longitude: f64,
        date: Date,
        mode: WeatherMode,
    ) -> Option<Extremes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.outage.load(Ordering::SeqCst) {
            debug!("mock weather outage, no {} data for {}", mode, date);
            return None;
        }

        if let Ok(overrides) = self.overrides.read() {
            if let Some(pinned) = overrides.get(&(mode, date)) {
                return *pinned;
            }
        }

        Some(Self::seasonal_extremes(latitude, date, mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[tokio::test]
    async fn values_are_stable_and_seasonal() {
        let oracle = MockWeatherOracle::new();
        let summer = oracle
            .fetch_extremes(52.0, 5.0, date!(2026 - 07 - 19), WeatherMode::Forecast)
            .await
            .unwrap();
        let again = oracle
            .fetch_extremes(52.0, 5.0, date!(2026 - 07 - 19), WeatherMode::Forecast)
            .await
            .unwrap();
        let winter = oracle
            .fetch_extremes(52.0, 5.0, date!(2026 - 01 - 18), WeatherMode::Forecast)
            .await
            .unwrap();

        assert_eq!(summer, again);
        assert!(summer.max > winter.max);
        assert!(summer.max > summer.min);
        assert_eq!(oracle.call_count(), 3);
    }

    #[tokio::test]
    async fn archive_differs_from_forecast() {
        let forecast = MockWeatherOracle::seasonal_extremes(48.0, date!(2026 - 11 - 01), WeatherMode::Forecast);
        let archive = MockWeatherOracle::seasonal_extremes(48.0, date!(2026 - 11 - 01), WeatherMode::Archive);
        assert_ne!(forecast.max, archive.max);
    }

    #[tokio::test]
    async fn overrides_and_outage() {
        let oracle = MockWeatherOracle::new();
        let day = date!(2026 - 11 - 01);
        oracle.set_extremes(WeatherMode::Archive, day, Some(Extremes::new(24.0, 10.0)));
        assert_eq!(
            oracle.fetch_extremes(1.0, 1.0, day, WeatherMode::Archive).await,
            Some(Extremes::new(24.0, 10.0))
        );

        oracle.set_extremes(WeatherMode::Archive, day, None);
        assert_eq!(oracle.fetch_extremes(1.0, 1.0, day, WeatherMode::Archive).await, None);

        oracle.clear_overrides();
        oracle.set_outage(true);
        assert_eq!(oracle.fetch_extremes(1.0, 1.0, day, WeatherMode::Forecast).await, None);
        oracle.set_outage(false);
        assert!(oracle.fetch_extremes(1.0, 1.0, day, WeatherMode::Forecast).await.is_some());
    }
}
