use futures::{stream, StreamExt};
use itertools::Itertools;
use log::{debug, error, info, warn};
use predictor_core::{Location, RoundStatusKind, WeatherMode};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, sync::Arc, sync::Mutex, time::Duration};
use time::{Date, OffsetDateTime, Weekday};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::{
    rounds::{
        upcoming_target_dates, Baseline, Dormant, HasRoundInfo, Round, RoundStore,
        RoundTransition,
    },
    Error, SettlementEngine, SettlementResult,
};
use crate::{config::GameSettings, infra::weather::WeatherOracle};

/// What a single scheduler pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary {
    pub settled: usize,
    /// Overdue rounds left locked because the outcome is not available yet
    pub settlement_deferred: usize,
    pub locked: usize,
    pub promoted: usize,
    pub baselines_refreshed: usize,
    pub created: usize,
    /// Steps that failed as a whole, retried next tick
    pub failed_steps: Vec<String>,
}

impl TickSummary {
    pub fn is_noop(&self) -> bool {
        self.settled == 0
            && self.locked == 0
            && self.promoted == 0
            && self.baselines_refreshed == 0
            && self.created == 0
    }
}

/// Keeps the rolling window of weekly rounds moving: settles, locks, promotes,
/// heals baselines and creates rounds for upcoming target dates.
pub struct RoundScheduler {
    round_store: RoundStore,
    settlement: SettlementEngine,
    weather: Arc<dyn WeatherOracle>,
    settings: GameSettings,
    weekday: Weekday,
    rng: Mutex<ChaCha20Rng>,
    tick_lock: tokio::sync::Mutex<()>,
}

impl RoundScheduler {
    pub fn new(
        round_store: RoundStore,
        settlement: SettlementEngine,
        weather: Arc<dyn WeatherOracle>,
        settings: GameSettings,
    ) -> Result<Self, anyhow::Error> {
        settings.validate()?;
        let weekday = settings.cycle_weekday()?;
        let rng = match settings.rng_seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_rng(&mut rand::rng()),
        };

        Ok(Self {
            round_store,
            settlement,
            weather,
            settings,
            weekday,
            rng: Mutex::new(rng),
            tick_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    /// One pass bounded by the configured tick timeout. Work cut off by the
    /// timeout is rolled back per step and picked up next tick.
    pub async fn run_tick(&self) -> Result<TickSummary, Error> {
        let budget = Duration::from_secs(self.settings.tick_timeout_secs);
        tokio::time::timeout(budget, self.tick())
            .await
            .map_err(|_| Error::Internal(format!("scheduler tick exceeded {:?}", budget)))
    }

    pub async fn tick(&self) -> TickSummary {
        self.tick_at(OffsetDateTime::now_utc().date()).await
    }

    /// Run every step as if the calendar date were `today`. Each step stands on its
    /// own: a failing step is logged and the next one still runs.
    pub async fn tick_at(&self, today: Date) -> TickSummary {
        let _guard = self.tick_lock.lock().await;
        let mut summary = TickSummary::default();
        info!("scheduler tick for {}", today);

        match self.settle_overdue(today).await {
            Ok((settled, deferred)) => {
                summary.settled = settled;
                summary.settlement_deferred = deferred;
            }
            Err(e) => {
                error!("settle step failed: {}", e);
                summary.failed_steps.push(String::from("settle"));
            }
        }

        match self.lock_due(today).await {
            Ok(locked) => summary.locked = locked,
            Err(e) => {
                error!("lock step failed: {}", e);
                summary.failed_steps.push(String::from("lock"));
            }
        }

        match self.promote_due(today).await {
            Ok(promoted) => summary.promoted = promoted,
            Err(e) => {
                error!("promote step failed: {}", e);
                summary.failed_steps.push(String::from("promote"));
            }
        }

        match self.heal_baselines().await {
            Ok(refreshed) => summary.baselines_refreshed = refreshed,
            Err(e) => {
                error!("baseline heal step failed: {}", e);
                summary.failed_steps.push(String::from("heal"));
            }
        }

        let mut recent_locations = HashSet::new();
        match self.backfill(today, &mut recent_locations).await {
            Ok(created) => summary.created = created,
            Err(e) => {
                error!("backfill step failed: {}", e);
                summary.failed_steps.push(String::from("backfill"));
            }
        }

        info!(
            "tick {} done: settled {}, deferred {}, locked {}, promoted {}, healed {}, created {}",
            today,
            summary.settled,
            summary.settlement_deferred,
            summary.locked,
            summary.promoted,
            summary.baselines_refreshed,
            summary.created
        );
        summary
    }

    async fn rounds_in(&self, status: RoundStatusKind) -> Result<Vec<Round>, Error> {
        self.round_store.list_rounds(Some(status)).await
    }

    /// Locked rounds whose target date has passed, one settlement transaction each
    async fn settle_overdue(&self, today: Date) -> Result<(usize, usize), Error> {
        let overdue: Vec<_> = self
            .rounds_in(RoundStatusKind::Locked)
            .await?
            .into_iter()
            .filter_map(|round| match round {
                Round::Locked(locked) if locked.is_overdue(today) => Some(locked),
                _ => None,
            })
            .collect();

        let mut settled = 0;
        let mut deferred = 0;
        for round in overdue {
            let round_id = round.info().id.clone();
            match self.settlement.settle_round(round).await {
                Ok(SettlementResult::Settled(_)) => settled += 1,
                Ok(SettlementResult::Deferred) => deferred += 1,
                Ok(SettlementResult::AlreadySettled) => {}
                Err(e) => {
                    error!("failed to settle round {}: {}", round_id, e);
                    deferred += 1;
                }
            }
        }

        Ok((settled, deferred))
    }

    async fn lock_due(&self, today: Date) -> Result<usize, Error> {
        let threshold = self.settings.lock_threshold_days();
        let now = OffsetDateTime::now_utc();
        let transitions: Vec<RoundTransition> = self
            .rounds_in(RoundStatusKind::Active)
            .await?
            .into_iter()
            .filter_map(|round| match round {
                Round::Active(active) if active.is_due_to_lock(today, threshold) => Some(
                    RoundTransition::new(RoundStatusKind::Active, active.lock(now)),
                ),
                _ => None,
            })
            .collect();

        let applied = self.round_store.apply_transitions(transitions).await?;
        if !applied.is_empty() {
            info!("locked rounds: {}", applied.iter().join(", "));
        }
        Ok(applied.len())
    }

    /// Dormant rounds inside the lead window open with a fresh baseline. A failed
    /// fetch still opens the round; the heal step fills the baseline in later.
    async fn promote_due(&self, today: Date) -> Result<usize, Error> {
        let lead = self.settings.lead_window_days;
        let due: Vec<Dormant> = self
            .rounds_in(RoundStatusKind::Dormant)
            .await?
            .into_iter()
            .filter_map(|round| match round {
                Round::Dormant(dormant) if dormant.is_due(today, lead) => Some(dormant),
                _ => None,
            })
            .collect();
        if due.is_empty() {
            return Ok(0);
        }

        let threshold = self.settings.lock_threshold_days();
        let now = OffsetDateTime::now_utc();
        let transitions: Vec<RoundTransition> = self
            .fetch_baselines(due)
            .await
            .into_iter()
            .map(|(dormant, baseline)| {
                if baseline.is_none() {
                    warn!(
                        "promoting {} without a baseline, forecast unavailable",
                        dormant.info().id
                    );
                }
                RoundTransition {
                    from: RoundStatusKind::Dormant,
                    round: dormant.open(baseline, today, threshold, now),
                }
            })
            .collect();

        let applied = self.round_store.apply_transitions(transitions).await?;
        if !applied.is_empty() {
            info!("promoted rounds: {}", applied.iter().join(", "));
        }
        Ok(applied.len())
    }

    /// Active rounds whose baseline is missing or zeroed get another fetch
    async fn heal_baselines(&self) -> Result<usize, Error> {
        let needs_baseline: Vec<_> = self
            .rounds_in(RoundStatusKind::Active)
            .await?
            .into_iter()
            .filter_map(|round| match round {
                Round::Active(active) if active.needs_baseline() => Some(active),
                _ => None,
            })
            .collect();
        if needs_baseline.is_empty() {
            return Ok(0);
        }

        let now = OffsetDateTime::now_utc();
        let transitions: Vec<RoundTransition> = self
            .fetch_baselines(needs_baseline)
            .await
            .into_iter()
            .filter_map(|(active, baseline)| match baseline {
                Some(baseline) => Some(RoundTransition::new(
                    RoundStatusKind::Active,
                    active.refresh_baseline(baseline, now),
                )),
                None => {
                    warn!("baseline for {} still unavailable", active.info().id);
                    None
                }
            })
            .collect();

        let applied = self.round_store.apply_transitions(transitions).await?;
        if !applied.is_empty() {
            info!("refreshed baselines: {}", applied.iter().join(", "));
        }
        Ok(applied.len())
    }

    /// Create rounds for upcoming target dates that have none. `recent_locations`
    /// holds the location keys to avoid and grows with every pick in this pass.
    async fn backfill(
        &self,
        today: Date,
        recent_locations: &mut HashSet<String>,
    ) -> Result<usize, Error> {
        let wanted = upcoming_target_dates(today, self.weekday, self.settings.rounds_ahead);
        let existing = self.round_store.existing_target_dates(today).await?;
        let missing: Vec<Date> = wanted
            .into_iter()
            .filter(|date| !existing.contains(date))
            .collect();
        if missing.is_empty() {
            debug!("schedule already covers {} rounds", self.settings.rounds_ahead);
            return Ok(0);
        }

        recent_locations.extend(
            self.round_store
                .recent_location_keys(self.settings.recent_location_window)
                .await?,
        );

        let now = OffsetDateTime::now_utc();
        let lead = self.settings.lead_window_days;
        let mut dormant = Vec::new();
        let mut opening = Vec::new();
        for date in missing {
            let location = self.pick_location(recent_locations)?;
            recent_locations.insert(location.key());
            let round = Dormant::new(date, location, now);
            if round.is_due(today, lead) {
                opening.push(round);
            } else {
                dormant.push(Round::Dormant(round));
            }
        }

        let threshold = self.settings.lock_threshold_days();
        let mut rounds: Vec<Round> = self
            .fetch_baselines(opening)
            .await
            .into_iter()
            .map(|(round, baseline)| round.open(baseline, today, threshold, now))
            .collect();
        rounds.extend(dormant);
        rounds.sort_by_key(|round| round.target_date());

        let created = self.round_store.insert_rounds(rounds).await?;
        Ok(created as usize)
    }

    /// Uniform pick from the pool minus `excluded`, the whole pool if nothing is left
    fn pick_location(&self, excluded: &HashSet<String>) -> Result<Location, Error> {
        let pool = &self.settings.locations;
        let mut candidates: Vec<&Location> = pool
            .iter()
            .filter(|location| !excluded.contains(&location.key()))
            .collect();
        if candidates.is_empty() {
            debug!("every location used recently, picking from the full pool");
            candidates = pool.iter().collect();
        }
        if candidates.is_empty() {
            return Err(Error::Internal(String::from("location pool is empty")));
        }

        let index = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            rng.random_range(0..candidates.len())
        };
        Ok(candidates[index].clone())
    }

    /// Forecast baselines for a batch of rounds, a bounded number in flight
    async fn fetch_baselines<T>(&self, rounds: Vec<T>) -> Vec<(T, Option<Baseline>)>
    where
        T: HasRoundInfo + Send,
    {
        stream::iter(rounds)
            .map(|round| async move {
                let info = round.info();
                let (latitude, longitude, date) = (
                    info.location.latitude,
                    info.location.longitude,
                    info.target_date,
                );
                let extremes = self
                    .weather
                    .fetch_extremes(latitude, longitude, date, WeatherMode::Forecast)
                    .await;
                let baseline = extremes.map(|e| Baseline::new(e, OffsetDateTime::now_utc()));
                (round, baseline)
            })
            .buffer_unordered(self.settings.fetch_concurrency.max(1))
            .collect()
            .await
    }
}

/// Runs the scheduler on an interval until cancelled
pub struct RoundWatcher {
    scheduler: Arc<RoundScheduler>,
    tick_interval: Duration,
    cancel_token: CancellationToken,
}

impl RoundWatcher {
    pub fn new(
        scheduler: Arc<RoundScheduler>,
        cancel_token: CancellationToken,
        tick_interval: Duration,
    ) -> Self {
        Self {
            scheduler,
            tick_interval,
            cancel_token,
        }
    }

    pub async fn watch(&self) -> Result<(), anyhow::Error> {
        info!("Starting round scheduler watcher");

        loop {
            if self.cancel_token.is_cancelled() {
                info!("Round scheduler watcher received cancellation");
                break;
            }

            tokio::select! {
                result = self.scheduler.run_tick() => match result {
                    Ok(summary) => {
                        if summary.failed_steps.is_empty() {
                            info!("Scheduler tick completed successfully");
                        } else {
                            warn!("Scheduler tick failed steps: {:?}", summary.failed_steps);
                        }
                    }
                    Err(e) => {
                        error!("Scheduler tick error: {}", e);
                    }
                },
                _ = self.cancel_token.cancelled() => {
                    info!("Round scheduler watcher cancelled during tick");
                    break;
                }
            }

            tokio::select! {
                _ = sleep(self.tick_interval) => continue,
                _ = self.cancel_token.cancelled() => {
                    info!("Round scheduler watcher cancelled during sleep");
                    break;
                }
            }
        }

        Ok(())
    }
}
