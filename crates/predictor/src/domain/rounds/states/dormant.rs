//! Dormant state - rounds scheduled ahead of the lead window.

use predictor_core::Location;
use time::{Date, OffsetDateTime};

use super::{Active, HasRoundInfo, Round};
use crate::domain::rounds::{Baseline, RoundInfo};

/// A scheduled round that does not take bets yet and carries no baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct Dormant {
    pub(crate) info: RoundInfo,
}

impl Dormant {
    pub fn new(target_date: Date, location: Location, now: OffsetDateTime) -> Self {
        Self {
            info: RoundInfo::new(target_date, location, now),
        }
    }

    pub fn from_info(info: RoundInfo) -> Self {
        Self { info }
    }

    /// Whether the target date has come inside the lead window
    pub fn is_due(&self, today: Date, lead_window_days: i64) -> bool {
        self.info.days_until(today) <= lead_window_days
    }

    /// Open the round for betting with a freshly fetched baseline, which may be
    /// missing when the forecast was unavailable.
    pub fn promote(self, baseline: Option<Baseline>, now: OffsetDateTime) -> Active {
        Active::from_parts(self.info.touch(now), baseline)
    }

    /// Promote and immediately apply the lock check, for rounds that were picked up
    /// late (created or promoted already inside the lock threshold).
    pub fn open(
        self,
        baseline: Option<Baseline>,
        today: Date,
        lock_threshold_days: i64,
        now: OffsetDateTime,
    ) -> Round {
        let active = self.promote(baseline, now);
        if active.is_due_to_lock(today, lock_threshold_days) {
            Round::Locked(active.lock(now))
        } else {
            Round::Active(active)
        }
    }
}

impl HasRoundInfo for Dormant {
    fn info(&self) -> &RoundInfo {
        &self.info
    }

    fn into_info(self) -> RoundInfo {
        self.info
    }
}
