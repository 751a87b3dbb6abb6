//! Wire and domain types for the prediction game

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use time::Date;

use crate::CoreError;

/// A daily maximum/minimum temperature pair in degrees Celsius.
///
/// Used for the baseline forecast, user predictions and the observed outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extremes {
    pub max: f64,
    pub min: f64,
}

impl Extremes {
    pub fn new(max: f64, min: f64) -> Self {
        Self { max, min }
    }

    /// The `{0, 0}` pair older writers stored when a forecast fetch came back empty.
    /// It is treated the same as a missing value.
    pub fn is_zero_sentinel(&self) -> bool {
        self.max == 0.0 && self.min == 0.0
    }
}

/// Where a round is played
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// Identity used for repeat avoidance: two rounds with the same name and
    /// country are the same place even if the coordinates were rounded differently.
    pub fn key(&self) -> String {
        format!(
            "{}|{}",
            self.name.to_lowercase(),
            self.country.to_lowercase()
        )
    }

    /// Lowercase ascii slug used inside round ids
    pub fn slug(&self) -> String {
        let mut slug = String::with_capacity(self.name.len());
        let mut last_dash = true;
        for c in self.name.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
                last_dash = false;
            } else if !last_dash {
                slug.push('-');
                last_dash = true;
            }
        }
        while slug.ends_with('-') {
            slug.pop();
        }
        if slug.is_empty() {
            String::from("location")
        } else {
            slug
        }
    }
}

/// Which weather data set to ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherMode {
    Forecast,
    Archive,
}

impl fmt::Display for WeatherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forecast => write!(f, "forecast"),
            Self::Archive => write!(f, "archive"),
        }
    }
}

/// Round lifecycle status for API responses and storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatusKind {
    Dormant,
    Active,
    Locked,
    Settled,
}

impl RoundStatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dormant => "dormant",
            Self::Active => "active",
            Self::Locked => "locked",
            Self::Settled => "settled",
        }
    }
}

impl fmt::Display for RoundStatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoundStatusKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dormant" => Ok(Self::Dormant),
            "active" => Ok(Self::Active),
            "locked" => Ok(Self::Locked),
            "settled" => Ok(Self::Settled),
            other => Err(CoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// Time window a leaderboard accumulates points over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaderboardScope {
    AllTime,
    Year(i32),
    /// Year and quarter (1-4)
    Quarter(i32, u8),
    /// Year and month (1-12)
    Month(i32, u8),
}

impl LeaderboardScope {
    pub const ALL_TIME_KEY: &'static str = "all_time";

    /// The four scopes a round played on `date` contributes to, widest first.
    pub fn for_date(date: Date) -> [LeaderboardScope; 4] {
        let year = date.year();
        let month = u8::from(date.month());
        [
            LeaderboardScope::AllTime,
            LeaderboardScope::Year(year),
            LeaderboardScope::Quarter(year, quarter_of_month(month)),
            LeaderboardScope::Month(year, month),
        ]
    }

    /// Storage key: `all_time`, `2026`, `2026_Q4`, `2026_10`
    pub fn key(&self) -> String {
        match self {
            Self::AllTime => Self::ALL_TIME_KEY.to_string(),
            Self::Year(year) => format!("{:04}", year),
            Self::Quarter(year, quarter) => format!("{:04}_Q{}", year, quarter),
            Self::Month(year, month) => format!("{:04}_{:02}", year, month),
        }
    }
}

/// Calendar quarter for a 1-based month
pub fn quarter_of_month(month: u8) -> u8 {
    (month + 2) / 3
}

impl fmt::Display for LeaderboardScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for LeaderboardScope {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Self::ALL_TIME_KEY {
            return Ok(Self::AllTime);
        }

        let invalid = || CoreError::InvalidScope(s.to_string());
        let (year_part, rest) = match s.split_once('_') {
            Some((year, rest)) => (year, Some(rest)),
            None => (s, None),
        };
        if year_part.len() != 4 {
            return Err(invalid());
        }
        let year: i32 = year_part.parse().map_err(|_| invalid())?;

        match rest {
            None => Ok(Self::Year(year)),
            Some(quarter) if quarter.starts_with('Q') => {
                let quarter: u8 = quarter[1..].parse().map_err(|_| invalid())?;
                if (1..=4).contains(&quarter) {
                    Ok(Self::Quarter(year, quarter))
                } else {
                    Err(invalid())
                }
            }
            Some(month) => {
                if month.len() != 2 {
                    return Err(invalid());
                }
                let month: u8 = month.parse().map_err(|_| invalid())?;
                if (1..=12).contains(&month) {
                    Ok(Self::Month(year, month))
                } else {
                    Err(invalid())
                }
            }
        }
    }
}

/// Body of the bet submission endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitBet {
    pub round_id: String,
    pub user_id: String,
    /// Opaque public name, generated by the profile service
    pub display_name: String,
    pub predicted_max: f64,
    pub predicted_min: f64,
}

impl SubmitBet {
    pub fn prediction(&self) -> Extremes {
        Extremes::new(self.predicted_max, self.predicted_min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn scopes_for_date_cover_all_four_windows() {
        let scopes = LeaderboardScope::for_date(date!(2026 - 11 - 01));
        let keys: Vec<String> = scopes.iter().map(|s| s.key()).collect();
        assert_eq!(keys, vec!["all_time", "2026", "2026_Q4", "2026_11"]);
    }

    #[test]
    fn quarters_follow_calendar() {
        assert_eq!(quarter_of_month(1), 1);
        assert_eq!(quarter_of_month(3), 1);
        assert_eq!(quarter_of_month(4), 2);
        assert_eq!(quarter_of_month(9), 3);
        assert_eq!(quarter_of_month(10), 4);
        assert_eq!(quarter_of_month(12), 4);
    }

    #[test]
    fn scope_keys_parse_back() {
        for key in ["all_time", "2025", "2025_Q1", "2025_07"] {
            let scope: LeaderboardScope = key.parse().unwrap();
            assert_eq!(scope.key(), key);
        }
        assert!("2025_Q5".parse::<LeaderboardScope>().is_err());
        assert!("2025_13".parse::<LeaderboardScope>().is_err());
        assert!("25".parse::<LeaderboardScope>().is_err());
        assert!("weekly".parse::<LeaderboardScope>().is_err());
    }

    #[test]
    fn location_slug_is_url_safe() {
        let location = Location {
            name: String::from("Den Haag (Scheveningen)"),
            country: String::from("NL"),
            latitude: 52.1,
            longitude: 4.27,
        };
        assert_eq!(location.slug(), "den-haag-scheveningen");
        assert_eq!(location.key(), "den haag (scheveningen)|nl");
    }

    #[test]
    fn zero_pair_is_sentinel() {
        assert!(Extremes::new(0.0, 0.0).is_zero_sentinel());
        assert!(!Extremes::new(0.0, -1.5).is_zero_sentinel());
    }
}
