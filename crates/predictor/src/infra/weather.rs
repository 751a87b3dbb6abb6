use log::{debug, error, warn};
use predictor_core::{Extremes, WeatherMode};
use reqwest_middleware::{
    reqwest::{StatusCode, Url},
    ClientWithMiddleware,
};
use serde::Deserialize;
use thiserror::Error;
use time::Date;

use crate::WeatherSettings;

#[derive(Error, Debug)]
pub enum Error {
    #[error("problem sending request to weather provider: {0}")]
    Send(#[from] reqwest_middleware::reqwest::Error),
    #[error("problem sending request to weather provider: {0}")]
    SendRetry(#[from] reqwest_middleware::Error),
    #[error("invalid weather provider url: {0}")]
    Url(String),
    #[error("weather provider rejected request: {0}")]
    BadRequest(String),
    #[error("weather provider temporarily unavailable: {0}")]
    Transient(String),
    #[error("weather provider returned no data for {0}")]
    MissingData(String),
}

/// Source of daily temperature extremes.
///
/// `None` always means "not available right now", never zero. Callers retry on a
/// later tick.
#[async_trait::async_trait]
pub trait WeatherOracle: Send + Sync {
    async fn fetch_extremes(
        &self,
        latitude: f64,
        longitude: f64,
        date: Date,
        mode: WeatherMode,
    ) -> Option<Extremes>;
}

#[derive(Debug, Deserialize)]
struct DailyResponse {
    daily: Option<Daily>,
}

#[derive(Debug, Deserialize)]
struct Daily {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
}

impl Daily {
    fn extremes_for(&self, day: &str) -> Option<Extremes> {
        let index = self.time.iter().position(|t| t == day)?;
        let max = self.temperature_2m_max.get(index).copied().flatten()?;
        let min = self.temperature_2m_min.get(index).copied().flatten()?;
        if !max.is_finite() || !min.is_finite() {
            return None;
        }
        Some(Extremes::new(max, min))
    }
}

/// Open-Meteo client, forecast and archive live on different hosts
#[derive(Clone)]
pub struct OpenMeteoClient {
    pub forecast_url: Url,
    pub archive_url: Url,
    pub client: ClientWithMiddleware,
}

impl OpenMeteoClient {
    pub fn new(client: ClientWithMiddleware, settings: &WeatherSettings) -> Result<Self, Error> {
        Ok(Self {
            forecast_url: Url::parse(&settings.forecast_url)
                .map_err(|e| Error::Url(format!("{}: {}", settings.forecast_url, e)))?,
            archive_url: Url::parse(&settings.archive_url)
                .map_err(|e| Error::Url(format!("{}: {}", settings.archive_url, e)))?,
            client,
        })
    }

    fn endpoint(&self, mode: WeatherMode) -> &Url {
        match mode {
            WeatherMode::Forecast => &self.forecast_url,
            WeatherMode::Archive => &self.archive_url,
        }
    }

    pub async fn request_extremes(
        &self,
        latitude: f64,
        longitude: f64,
        date: Date,
        mode: WeatherMode,
    ) -> Result<Extremes, Error> {
        let day = date.to_string();
        let query = [
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            (
                "daily",
                String::from("temperature_2m_max,temperature_2m_min"),
            ),
            ("start_date", day.clone()),
            ("end_date", day.clone()),
            ("timezone", String::from("auto")),
        ];

        let response = self
            .client
            .get(self.endpoint(mode).clone())
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                error!("error sending to weather provider: {}", e);
                Error::SendRetry(e)
            })?;

        let status = response.status();
        if status.is_success() {
            let body: DailyResponse = response.json().await?;
            debug!("{} response for {}: {:?}", mode, day, body);
            body.daily
                .and_then(|daily| daily.extremes_for(&day))
                .ok_or(Error::MissingData(day))
        } else if status == StatusCode::BAD_REQUEST {
            Err(Error::BadRequest(response.text().await.unwrap_or_default()))
        } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Transient(format!(
                "status {}: {:?}",
                status, body
            )))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Error::BadRequest(format!("status {}: {:?}", status, body)))
        }
    }
}

#[async_trait::async_trait]
impl WeatherOracle for OpenMeteoClient {
    async fn fetch_extremes(
        &self,
        latitude: f64,
        longitude: f64,
        date: Date,
        mode: WeatherMode,
    ) -> Option<Extremes> {
        match self.request_extremes(latitude, longitude, date, mode).await {
            Ok(extremes) => Some(extremes),
            Err(e) => {
                warn!(
                    "{} lookup for ({}, {}) on {} unavailable: {}",
                    mode, latitude, longitude, date, e
                );
                None
            }
        }
    }
}
