use predictor::Round;
use predictor_core::{Extremes, RoundStatusKind, WeatherMode};
use sqlx::SqlitePool;
use time::macros::date;

use crate::helpers::{spawn_app, MockWeather, BASELINE};

#[sqlx::test(migrations = "./migrations")]
async fn baselines_fetched_once_per_opening(pool: SqlitePool) {
    let mut weather = MockWeather::new();
    // Only the two rounds inside the lead window need a forecast
    weather
        .expect_fetch_extremes()
        .withf(|_, _, _, mode| *mode == WeatherMode::Forecast)
        .times(2)
        .returning(|_, _, _, _| Some(BASELINE));
    let test_app = spawn_app(pool, weather);

    let first = test_app.state.scheduler.tick_at(date!(2026 - 10 - 18)).await;
    let second = test_app.state.scheduler.tick_at(date!(2026 - 10 - 18)).await;

    assert_eq!(first.created, 13);
    assert!(second.is_noop());
}

#[sqlx::test(migrations = "./migrations")]
async fn zero_baseline_is_healed(pool: SqlitePool) {
    let mut weather = MockWeather::new();
    let mut fetches = 0;
    weather
        .expect_fetch_extremes()
        .returning(move |_, _, _, _| {
            fetches += 1;
            // The first two answers are the zero pair a broken response decodes to
            if fetches <= 2 {
                Some(Extremes::new(0.0, 0.0))
            } else {
                Some(BASELINE)
            }
        });
    let test_app = spawn_app(pool, weather);

    test_app.state.scheduler.tick_at(date!(2026 - 10 - 18)).await;
    let open = test_app
        .state
        .round_store
        .list_rounds(Some(RoundStatusKind::Active))
        .await
        .unwrap();
    assert_eq!(open.len(), 2);
    assert!(open.iter().all(|r| !r.accepts_bets()));

    let summary = test_app.state.scheduler.tick_at(date!(2026 - 10 - 18)).await;
    assert_eq!(summary.baselines_refreshed, 2);
    let open = test_app
        .state
        .round_store
        .list_rounds(Some(RoundStatusKind::Active))
        .await
        .unwrap();
    assert!(open.iter().all(Round::accepts_bets));
}

#[sqlx::test(migrations = "./migrations")]
async fn missing_archive_defers_settlement(pool: SqlitePool) {
    let mut weather = MockWeather::new();
    weather
        .expect_fetch_extremes()
        .withf(|_, _, _, mode| *mode == WeatherMode::Forecast)
        .returning(|_, _, _, _| Some(BASELINE));
    weather
        .expect_fetch_extremes()
        .withf(|_, _, _, mode| *mode == WeatherMode::Archive)
        .returning(|_, _, _, _| None);
    let test_app = spawn_app(pool, weather);

    test_app.state.scheduler.tick_at(date!(2026 - 10 - 19)).await;
    let summary = test_app.state.scheduler.tick_at(date!(2026 - 10 - 27)).await;

    assert_eq!(summary.settled, 0);
    assert_eq!(summary.settlement_deferred, 1);
    assert!(summary.failed_steps.is_empty());
    let locked = test_app
        .state
        .round_store
        .list_rounds(Some(RoundStatusKind::Locked))
        .await
        .unwrap();
    assert_eq!(locked[0].target_date(), date!(2026 - 10 - 25));
}
