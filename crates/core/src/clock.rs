use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Same-day wall-clock time with minute precision, serialized as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime(u16);

impl ClockTime {
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self((hour * 60 + minute) as u16))
        } else {
            None
        }
    }

    pub fn from_minutes(minutes: u32) -> Self {
        Self((minutes % MINUTES_PER_DAY) as u16)
    }

    pub fn minutes(self) -> u32 {
        self.0 as u32
    }

    pub fn hour(self) -> u32 {
        self.minutes() / 60
    }

    pub fn minute(self) -> u32 {
        self.minutes() % 60
    }

    /// Wraps past midnight.
    pub fn add_minutes(self, minutes: u32) -> Self {
        Self::from_minutes(self.minutes() + minutes % MINUTES_PER_DAY)
    }

    /// Minutes from `self` forward to `later`, wrapping at 24h.
    pub fn minutes_until(self, later: Self) -> u32 {
        (later.minutes() + MINUTES_PER_DAY - self.minutes()) % MINUTES_PER_DAY
    }

    /// Signed same-day difference `later - self`, no wrapping.
    pub fn signed_gap(self, later: Self) -> i32 {
        later.minutes() as i32 - self.minutes() as i32
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for ClockTime {
    type Err = PlanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || PlanError::InvalidInput(format!("invalid HH:MM time '{value}'"));
        let mut parts = value.trim().split(':');

        let hour = parts
            .next()
            .filter(|part| (1..=2).contains(&part.len()))
            .and_then(|part| part.parse::<u32>().ok())
            .ok_or_else(invalid)?;
        let minute = parts
            .next()
            .filter(|part| part.len() == 2)
            .and_then(|part| part.parse::<u32>().ok())
            .ok_or_else(invalid)?;

        // seconds are accepted and dropped
        if let Some(seconds) = parts.next() {
            if seconds.len() != 2 || seconds.parse::<u32>().is_err() {
                return Err(invalid());
            }
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        Self::from_hm(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for ClockTime {
    type Error = PlanError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}
