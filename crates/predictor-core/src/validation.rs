//! Bet and player input checks that need no database

use crate::{CoreError, Extremes, SubmitBet};

/// Longest display name accepted from the profile service
pub const MAX_DISPLAY_NAME_LEN: usize = 64;

/// Temperatures outside this band are treated as typos, not predictions
pub const PLAUSIBLE_TEMPERATURE_C: std::ops::RangeInclusive<f64> = -90.0..=60.0;

/// Validate the shape of a bet submission. Round state and baseline checks
/// need the stored round and happen in the bet ledger.
pub fn validate_submission(bet: &SubmitBet) -> Result<(), CoreError> {
    if bet.round_id.trim().is_empty() {
        return Err(CoreError::Validation("round_id cannot be empty".into()));
    }
    if bet.user_id.trim().is_empty() {
        return Err(CoreError::Validation("user_id cannot be empty".into()));
    }
    validate_display_name(&bet.display_name)?;
    validate_prediction(&bet.prediction())
}

pub fn validate_display_name(display_name: &str) -> Result<(), CoreError> {
    let trimmed = display_name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("display_name cannot be empty".into()));
    }
    if trimmed.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "display_name longer than {} characters",
            MAX_DISPLAY_NAME_LEN
        )));
    }
    Ok(())
}

pub fn validate_prediction(prediction: &Extremes) -> Result<(), CoreError> {
    for (label, value) in [("max", prediction.max), ("min", prediction.min)] {
        if !value.is_finite() {
            return Err(CoreError::InvalidPrediction(format!(
                "predicted {} must be a number",
                label
            )));
        }
        if !PLAUSIBLE_TEMPERATURE_C.contains(&value) {
            return Err(CoreError::InvalidPrediction(format!(
                "predicted {} of {} is outside {:?}",
                label, value, PLAUSIBLE_TEMPERATURE_C
            )));
        }
    }
    Ok(())
}

/// A prediction copying the baseline max is not a prediction.
pub fn matches_baseline(predicted_max: f64, baseline: &Extremes) -> bool {
    predicted_max == baseline.max
}
