use crate::{
    api::routes::{
        get_leaderboard, get_player, get_round, get_round_bets, get_round_ranking, get_rounds,
        health, register_player, run_scheduler_tick, submit_bet,
    },
    config::{GameSettings, Settings, WeatherSettings},
    domain::{
        BetLedger, LeaderboardStore, PlayerStore, RoundScheduler, RoundStore, RoundWatcher,
        SettlementEngine,
    },
    infra::{
        db::{DBConnection, DatabasePoolConfig},
        weather::{OpenMeteoClient, WeatherOracle},
    },
};

#[cfg(any(feature = "e2e-testing", debug_assertions))]
use crate::infra::weather_mock::MockWeatherOracle;
use anyhow::anyhow;
use axum::{
    body::Body,
    extract::{connect_info::IntoMakeServiceWithConnectInfo, ConnectInfo, Request},
    http::{Extensions, HeaderValue},
    middleware::{self, AddExtension, Next},
    response::IntoResponse,
    routing::{get, post},
    serve::Serve,
    Router,
};
use hyper::{
    header::{ACCEPT, CONTENT_TYPE},
    Method,
};
use log::{error, info, warn};
use reqwest_middleware::{
    reqwest::{self, Client},
    ClientBuilder, ClientWithMiddleware, Middleware,
};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::{collections::HashMap, net::SocketAddr, str::FromStr};
use std::{sync::Arc, time::Duration};
use tokio::signal::unix::{signal, SignalKind};
use tokio::{net::TcpListener, select, task::JoinHandle};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower_http::cors::{AllowOrigin, CorsLayer};

pub struct Application {
    server: Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    cancellation_token: CancellationToken,
    background_tasks: TaskTracker,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let address = format!(
            "{}:{}",
            config.api_settings.domain, config.api_settings.port
        );
        let listener = SocketAddr::from_str(&address)?;
        let (app_state, background_tasks, cancellation_token) = build_app(config.clone()).await?;
        let server = build_server(listener, app_state, config.api_settings.origins).await?;
        Ok(Self {
            server,
            cancellation_token,
            background_tasks,
        })
    }

    pub async fn run_until_stopped(self) -> Result<(), anyhow::Error> {
        info!("Starting server...");
        match self.server.with_graceful_shutdown(shutdown_signal()).await {
            Ok(_) => {
                info!("Server shutdown initiated");
                self.cancellation_token.cancel();

                let timeout = tokio::time::sleep(Duration::from_secs(10));
                select! {
                    _ = self.background_tasks.wait() => {
                        info!("Background tasks completed gracefully");
                    }
                    _ = timeout => {
                        warn!("Background tasks timed out during shutdown");
                    }
                }

                info!("Shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!("Server shutdown error: {}", e);
                self.cancellation_token.cancel();

                let _ = tokio::time::timeout(Duration::from_secs(5), self.background_tasks.wait())
                    .await;

                Err(anyhow!("Error during server shutdown: {}", e))
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub round_store: RoundStore,
    pub ledger: BetLedger,
    pub players: PlayerStore,
    pub leaderboard: LeaderboardStore,
    pub scheduler: Arc<RoundScheduler>,
    pub background_threads: Arc<HashMap<String, JoinHandle<()>>>,
}

impl AppState {
    /// Wire the game services on top of one database and weather source, without
    /// any background tasks
    pub fn new(
        db_connection: DBConnection,
        weather: Arc<dyn WeatherOracle>,
        game_settings: GameSettings,
    ) -> Result<Self, anyhow::Error> {
        let round_store = RoundStore::new(db_connection.clone());
        let settlement = SettlementEngine::new(db_connection.clone(), weather.clone());
        let scheduler = RoundScheduler::new(round_store.clone(), settlement, weather, game_settings)
            .map(Arc::new)?;

        Ok(Self {
            ledger: BetLedger::new(db_connection.clone(), round_store.clone()),
            players: PlayerStore::new(db_connection.clone()),
            leaderboard: LeaderboardStore::new(db_connection),
            round_store,
            scheduler,
            background_threads: Arc::new(HashMap::new()),
        })
    }
}

pub async fn build_app(
    config: Settings,
) -> Result<(AppState, TaskTracker, CancellationToken), anyhow::Error> {
    let weather = build_weather_oracle(&config.weather_settings)?;

    std::fs::create_dir_all(&config.db_settings.data_folder).map_err(|e| {
        anyhow!(
            "Error creating data folder {}: {}",
            config.db_settings.data_folder,
            e
        )
    })?;
    let pool_config: DatabasePoolConfig = config.db_settings.clone().into();
    let game_db = DBConnection::new(&config.db_settings.data_folder, "predictor", pool_config)
        .await
        .map_err(|e| anyhow!("Error setting up game db: {}", e))?;
    info!("Game database ready at {}", game_db.database_path);

    let mut app_state = AppState::new(game_db, weather, config.game_settings.clone())?;
    info!(
        "Round scheduler configured: {} rounds ahead on {}s, tick every {}s",
        config.game_settings.rounds_ahead,
        config.game_settings.weekday,
        config.game_settings.tick_interval_secs
    );

    let tracker = TaskTracker::new();
    let mut threads = HashMap::new();
    let cancel_token = CancellationToken::new();
    let round_watcher = RoundWatcher::new(
        app_state.scheduler.clone(),
        cancel_token.clone(),
        Duration::from_secs(config.game_settings.tick_interval_secs),
    );
    let round_watcher_task = tracker.spawn(async move {
        match round_watcher.watch().await {
            Ok(_) => {
                info!("Successfully shutdown round watcher")
            }
            Err(e) => {
                error!("Error in round watcher: {}", e)
            }
        }
    });
    tracker.close();
    threads.insert(String::from("round_watcher"), round_watcher_task);

    app_state.background_threads = Arc::new(threads);
    Ok((app_state, tracker, cancel_token))
}

#[cfg(any(feature = "e2e-testing", debug_assertions))]
fn build_weather_oracle(settings: &WeatherSettings) -> Result<Arc<dyn WeatherOracle>, anyhow::Error> {
    if settings.mock_enabled {
        info!("Mock weather oracle configured");
        return Ok(Arc::new(MockWeatherOracle::new()));
    }
    open_meteo_oracle(settings)
}

#[cfg(not(any(feature = "e2e-testing", debug_assertions)))]
fn build_weather_oracle(settings: &WeatherSettings) -> Result<Arc<dyn WeatherOracle>, anyhow::Error> {
    if settings.mock_enabled {
        return Err(anyhow!(
            "Mock weather oracle requires e2e-testing feature or debug build"
        ));
    }
    open_meteo_oracle(settings)
}

fn open_meteo_oracle(settings: &WeatherSettings) -> Result<Arc<dyn WeatherOracle>, anyhow::Error> {
    let reqwest_client = build_reqwest_client(settings)?;
    let client = OpenMeteoClient::new(reqwest_client, settings)?;
    info!(
        "Weather oracle configured: forecast {}, archive {}",
        client.forecast_url, client.archive_url
    );
    Ok(Arc::new(client))
}

pub async fn build_server(
    socket_addr: SocketAddr,
    app_state: AppState,
    origins: Vec<String>,
) -> Result<
    Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    anyhow::Error,
> {
    let listener = TcpListener::bind(socket_addr).await?;

    info!("Setting up service");
    let app = app(app_state, origins);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    info!(
        "Service running @: http://{}:{}",
        socket_addr.ip(),
        socket_addr.port()
    );
    Ok(server)
}

pub fn app(app_state: AppState, origins: Vec<String>) -> Router {
    let origins: Vec<HeaderValue> = origins
        .into_iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .allow_origin(AllowOrigin::list(origins));

    Router::new()
        .route("/api/v1/health_check", get(health))
        .route("/api/v1/players", post(register_player))
        .route("/api/v1/players/{user_id}", get(get_player))
        .route("/api/v1/rounds", get(get_rounds))
        .route("/api/v1/rounds/{round_id}", get(get_round))
        .route("/api/v1/rounds/{round_id}/bets", get(get_round_bets))
        .route("/api/v1/rounds/{round_id}/ranking", get(get_round_ranking))
        .route("/api/v1/bets", post(submit_bet))
        .route("/api/v1/leaderboard/{scope}", get(get_leaderboard))
        .route("/api/v1/scheduler/tick", post(run_scheduler_tick))
        .layer(middleware::from_fn(log_request))
        .with_state(Arc::new(app_state))
        .layer(cors)
}

async fn log_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    let now = time::OffsetDateTime::now_utc();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_default();
    info!(target: "http_request","new request, {} {}", request.method().as_str(), path);

    let response = next.run(request).await;
    let response_time = time::OffsetDateTime::now_utc() - now;
    info!(target: "http_response", "response, code: {}, time: {}", response.status().as_str(), response_time);

    response
}

pub fn build_reqwest_client(
    settings: &WeatherSettings,
) -> Result<ClientWithMiddleware, anyhow::Error> {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(settings.max_retries);
    let client = Client::builder()
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .build()?;
    Ok(ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .with(LoggingMiddleware)
        .build())
}

struct LoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut Extensions,
        next: reqwest_middleware::Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let method = req.method().clone();
        let url = req.url().clone();

        info!("Making {} request to: {}", method, url);

        let result = next.run(req, extensions).await;

        match &result {
            Ok(response) => {
                info!("{} {} -> Status: {}", method, url, response.status());
            }
            Err(error) => {
                warn!("{} {} -> Error: {:?}", method, url, error);
            }
        }

        result
    }
}

async fn shutdown_signal() {
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(sigint) => sigint,
        Err(e) => {
            error!("Failed to install SIGINT handler: {}", e);
            return std::future::pending().await;
        }
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            return std::future::pending().await;
        }
    };

    select! {
        _ = sigint.recv() => info!("Received SIGINT signal"),
        _ = sigterm.recv() => info!("Received SIGTERM signal"),
    }
}
