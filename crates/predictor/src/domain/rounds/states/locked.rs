//! Locked state - betting closed, waiting for the observed outcome.

use time::Date;

use super::{HasRoundInfo, Settled};
use crate::domain::rounds::{Baseline, Outcome, RoundInfo};

#[derive(Debug, Clone, PartialEq)]
pub struct Locked {
    pub(crate) info: RoundInfo,
    pub baseline: Option<Baseline>,
}

impl Locked {
    pub fn from_parts(info: RoundInfo, baseline: Option<Baseline>) -> Self {
        Self { info, baseline }
    }

    /// Target date strictly before today, so a full day of observations exists
    pub fn is_overdue(&self, today: Date) -> bool {
        self.info.target_date < today
    }

    pub fn settle(self, outcome: Outcome) -> Settled {
        let info = self.info.touch(outcome.settled_at);
        Settled::from_parts(info, self.baseline, outcome)
    }
}

impl HasRoundInfo for Locked {
    fn info(&self) -> &RoundInfo {
        &self.info
    }

    fn into_info(self) -> RoundInfo {
        self.info
    }
}
