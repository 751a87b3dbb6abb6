//! Active state - the betting window.

use time::{Date, OffsetDateTime};

use super::{HasRoundInfo, Locked};
use crate::domain::rounds::{Baseline, RoundInfo};

/// Round open for betting. The baseline may still be missing when the forecast
/// could not be fetched on promotion, bets are refused until it is healed.
#[derive(Debug, Clone, PartialEq)]
pub struct Active {
    pub(crate) info: RoundInfo,
    pub baseline: Option<Baseline>,
}

impl Active {
    pub fn from_parts(info: RoundInfo, baseline: Option<Baseline>) -> Self {
        Self { info, baseline }
    }

    /// Baseline absent or stored as the zero pair
    pub fn needs_baseline(&self) -> bool {
        self.open_baseline().is_none()
    }

    /// The baseline bets are checked against, if it is usable
    pub fn open_baseline(&self) -> Option<&Baseline> {
        self.baseline.as_ref().filter(|b| b.is_usable())
    }

    pub fn refresh_baseline(mut self, baseline: Baseline, now: OffsetDateTime) -> Active {
        self.baseline = Some(baseline);
        self.info = self.info.touch(now);
        self
    }

    pub fn is_due_to_lock(&self, today: Date, lock_threshold_days: i64) -> bool {
        self.info.days_until(today) <= lock_threshold_days
    }

    /// Close betting, the baseline is carried along for display
    pub fn lock(self, now: OffsetDateTime) -> Locked {
        Locked::from_parts(self.info.touch(now), self.baseline)
    }
}

impl HasRoundInfo for Active {
    fn info(&self) -> &RoundInfo {
        &self.info
    }

    fn into_info(self) -> RoundInfo {
        self.info
    }
}
