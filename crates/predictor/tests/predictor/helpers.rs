use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use mockall::mock;
use predictor::{app, AppState, DBConnection, GameSettings, WeatherOracle};
use predictor_core::{Extremes, WeatherMode};
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use time::Date;
use tower::ServiceExt;

mock! {
    pub Weather {}

    #[async_trait]
    impl WeatherOracle for Weather {
        async fn fetch_extremes(
            &self,
            latitude: f64,
            longitude: f64,
            date: Date,
            mode: WeatherMode,
        ) -> Option<Extremes>;
    }
}

/// Forecast baseline every mocked round opens with
pub const BASELINE: Extremes = Extremes {
    max: 15.0,
    min: 6.0,
};

/// Weather that always answers with `BASELINE`, in both modes
pub fn steady_weather() -> MockWeather {
    let mut weather = MockWeather::new();
    weather
        .expect_fetch_extremes()
        .returning(|_, _, _, _| Some(BASELINE));
    weather
}

pub fn test_settings() -> GameSettings {
    GameSettings {
        rng_seed: Some(42),
        ..Default::default()
    }
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
}

pub fn spawn_app(pool: SqlitePool, weather: MockWeather) -> TestApp {
    let db = DBConnection::new_with_pools("test", ":memory:", pool.clone(), pool);
    let state = AppState::new(db, Arc::new(weather), test_settings()).unwrap();
    TestApp {
        app: app(state.clone(), vec![String::from("http://localhost:9990")]),
        state,
    }
}

impl TestApp {
    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}
