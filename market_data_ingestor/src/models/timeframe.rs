//! Sampling interval for bar requests.
//!
//! A [`TimeFrame`] pairs an amount with a [`TimeFrameUnit`]. Construction goes
//! through [`TimeFrame::new`], which enforces the combinations every supported
//! provider accepts (e.g. only `1` for days and weeks).
//!
//! The compact text form (`"5m"`, `"1h"`, `"1D"`, `"1W"`, `"3M"`) is used in
//! config files and on the CLI:
//!
//! ```
//! use market_data_ingestor::models::timeframe::{TimeFrame, TimeFrameUnit};
//!
//! let tf: TimeFrame = "1D".parse().unwrap();
//! assert_eq!(tf, TimeFrame::day());
//! assert_eq!(tf.to_string(), "1D");
//! assert!(TimeFrame::new(2, TimeFrameUnit::Day).is_err());
//! ```

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimeFrameError {
    #[error("Invalid amount for {:?}: {}", unit, message)]
    InvalidAmount {
        unit: TimeFrameUnit,
        message: String,
    },

    #[error("Invalid input: {}", message)]
    InvalidInput { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFrameUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeFrame {
    pub amount: u32,
    pub unit: TimeFrameUnit,
}

impl TimeFrame {
    pub fn new(amount: u32, unit: TimeFrameUnit) -> Result<Self, TimeFrameError> {
        Self::validate(amount, unit)?;
        Ok(Self { amount, unit })
    }

    /// One bar per trading day; the default sampling interval.
    pub const fn day() -> Self {
        Self {
            amount: 1,
            unit: TimeFrameUnit::Day,
        }
    }

    pub fn minutes(amount: u32) -> Result<Self, TimeFrameError> {
        Self::new(amount, TimeFrameUnit::Minute)
    }

    pub fn hours(amount: u32) -> Result<Self, TimeFrameError> {
        Self::new(amount, TimeFrameUnit::Hour)
    }

    fn validate(amount: u32, unit: TimeFrameUnit) -> Result<(), TimeFrameError> {
        match unit {
            TimeFrameUnit::Minute if !(1..=59).contains(&amount) => {
                Err(TimeFrameError::InvalidAmount {
                    unit,
                    message: "Minute units can only be used with amounts between 1-59.".into(),
                })
            }
            TimeFrameUnit::Hour if !(1..=23).contains(&amount) => {
                Err(TimeFrameError::InvalidAmount {
                    unit,
                    message: "Hour units can only be used with amounts 1-23".into(),
                })
            }
            TimeFrameUnit::Day | TimeFrameUnit::Week if amount != 1 => {
                Err(TimeFrameError::InvalidAmount {
                    unit,
                    message: "Day and Week units can only be used with amount 1".into(),
                })
            }
            TimeFrameUnit::Month if ![1, 2, 3, 6, 12].contains(&amount) => {
                Err(TimeFrameError::InvalidAmount {
                    unit,
                    message: "Month units can only be used with amount 1, 2, 3, 6 and 12".into(),
                })
            }
            _ => Ok(()),
        }
    }

    /// True for daily or coarser bars.
    pub fn is_daily_or_coarser(&self) -> bool {
        matches!(
            self.unit,
            TimeFrameUnit::Day | TimeFrameUnit::Week | TimeFrameUnit::Month
        )
    }
}

impl Default for TimeFrame {
    fn default() -> Self {
        Self::day()
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let u = match self.unit {
            TimeFrameUnit::Minute => "m",
            TimeFrameUnit::Hour => "h",
            TimeFrameUnit::Day => "D",
            TimeFrameUnit::Week => "W",
            TimeFrameUnit::Month => "M",
        };
        write!(f, "{}{u}", self.amount)
    }
}

impl FromStr for TimeFrame {
    type Err = TimeFrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some(unit_char) = s.chars().last() else {
            return Err(TimeFrameError::InvalidInput {
                message: "empty timeframe".into(),
            });
        };
        let digits = &s[..s.len() - unit_char.len_utf8()];
        let amount: u32 = digits.parse().map_err(|_| TimeFrameError::InvalidInput {
            message: format!("bad amount in timeframe '{s}'"),
        })?;
        // `m` is minutes and `M` is months; day/week accept either case.
        let unit = match unit_char {
            'm' => TimeFrameUnit::Minute,
            'h' | 'H' => TimeFrameUnit::Hour,
            'd' | 'D' => TimeFrameUnit::Day,
            'w' | 'W' => TimeFrameUnit::Week,
            'M' => TimeFrameUnit::Month,
            other => {
                return Err(TimeFrameError::InvalidInput {
                    message: format!("unknown timeframe unit '{other}'"),
                });
            }
        };
        Self::new(amount, unit)
    }
}

impl TryFrom<String> for TimeFrame {
    type Error = TimeFrameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeFrame> for String {
    fn from(value: TimeFrame) -> Self {
        value.to_string()
    }
}
