//! Settled state - terminal, no further transitions.

use super::HasRoundInfo;
use crate::domain::rounds::{Baseline, Outcome, RoundInfo};

#[derive(Debug, Clone, PartialEq)]
pub struct Settled {
    pub(crate) info: RoundInfo,
    pub baseline: Option<Baseline>,
    pub outcome: Outcome,
}

impl Settled {
    pub fn from_parts(info: RoundInfo, baseline: Option<Baseline>, outcome: Outcome) -> Self {
        Self {
            info,
            baseline,
            outcome,
        }
    }
}

impl HasRoundInfo for Settled {
    fn info(&self) -> &RoundInfo {
        &self.info
    }

    fn into_info(self) -> RoundInfo {
        self.info
    }
}
