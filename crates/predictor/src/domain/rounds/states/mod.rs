//! Typestate machine for the round lifecycle.
//!
//! Each state is its own struct and transitions consume `self`, so a dormant
//! round can never be settled and a settled round can never be reopened.
//!
//! # State Flow
//!
//! ```text
//! Dormant   created far ahead, no baseline
//!     ↓     target date inside the lead window, baseline fetched
//! Active    accepting bets once a usable baseline is captured
//!     ↓     target date inside the lock threshold
//! Locked    bets are read only
//!     ↓     target date passed and the observed outcome is known
//! Settled   bets ranked, prizes and points paid
//! ```

mod active;
mod dormant;
mod locked;
mod settled;

pub use active::*;
pub use dormant::*;
pub use locked::*;
pub use settled::*;

use predictor_core::RoundStatusKind;
use std::fmt;
use time::Date;

use super::{Baseline, Outcome, RoundInfo};

/// Wrapper for rounds whose state is only known at runtime.
///
/// Used for persistence, scheduler passes over mixed rounds and API responses.
#[derive(Debug, Clone, PartialEq)]
pub enum Round {
    Dormant(Dormant),
    Active(Active),
    Locked(Locked),
    Settled(Settled),
}

impl Round {
    pub fn info(&self) -> &RoundInfo {
        match self {
            Self::Dormant(s) => s.info(),
            Self::Active(s) => s.info(),
            Self::Locked(s) => s.info(),
            Self::Settled(s) => s.info(),
        }
    }

    pub fn id(&self) -> &str {
        &self.info().id
    }

    pub fn target_date(&self) -> Date {
        self.info().target_date
    }

    pub fn status(&self) -> RoundStatusKind {
        match self {
            Self::Dormant(_) => RoundStatusKind::Dormant,
            Self::Active(_) => RoundStatusKind::Active,
            Self::Locked(_) => RoundStatusKind::Locked,
            Self::Settled(_) => RoundStatusKind::Settled,
        }
    }

    pub fn state_name(&self) -> &'static str {
        self.status().as_str()
    }

    pub fn baseline(&self) -> Option<&Baseline> {
        match self {
            Self::Dormant(_) => None,
            Self::Active(s) => s.baseline.as_ref(),
            Self::Locked(s) => s.baseline.as_ref(),
            Self::Settled(s) => s.baseline.as_ref(),
        }
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            Self::Settled(s) => Some(&s.outcome),
            _ => None,
        }
    }

    pub fn accepts_bets(&self) -> bool {
        match self {
            Self::Active(s) => s.open_baseline().is_some(),
            _ => false,
        }
    }

    pub fn into_info(self) -> RoundInfo {
        match self {
            Self::Dormant(s) => s.into_info(),
            Self::Active(s) => s.into_info(),
            Self::Locked(s) => s.into_info(),
            Self::Settled(s) => s.into_info(),
        }
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id(), self.state_name())
    }
}

impl From<Dormant> for Round {
    fn from(state: Dormant) -> Self {
        Round::Dormant(state)
    }
}

impl From<Active> for Round {
    fn from(state: Active) -> Self {
        Round::Active(state)
    }
}

impl From<Locked> for Round {
    fn from(state: Locked) -> Self {
        Round::Locked(state)
    }
}

impl From<Settled> for Round {
    fn from(state: Settled) -> Self {
        Round::Settled(state)
    }
}

/// States that hold the shared round data
pub trait HasRoundInfo {
    fn info(&self) -> &RoundInfo;

    fn into_info(self) -> RoundInfo;
}
