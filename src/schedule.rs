//! Working-window predicate for a tenant.
//!
//! A ticket entered while [`Schedule::is_open`] is false is flagged off-hours.
//! Entry is never blocked.

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};

const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// IANA zone name, e.g. "America/Sao_Paulo".
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Weekdays the window opens on, 0 = Sunday.
    #[serde(default = "all_days")]
    pub days: Vec<u8>,
    /// "HH:MM", inclusive.
    pub start: String,
    /// "HH:MM", exclusive. At or before `start` the window wraps past midnight.
    pub end: String,
}

fn default_enabled() -> bool {
    true
}

fn default_timezone() -> String {
    "America/Sao_Paulo".to_string()
}

fn all_days() -> Vec<u8> {
    (0..7).collect()
}

impl Schedule {
    /// Rejects unknown zones, weekday numbers above 6 and malformed times.
    pub fn validate(&self) -> Result<()> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| QueueError::InvalidArgument(format!("unknown timezone {}", self.timezone)))?;
        if let Some(day) = self.days.iter().find(|d| **d > 6) {
            return Err(QueueError::InvalidArgument(format!("weekday {day} out of range 0-6")));
        }
        parse_time(&self.start)?;
        parse_time(&self.end)?;
        Ok(())
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return true;
        }
        let (Ok(tz), Ok(start), Ok(end)) = (
            self.timezone.parse::<Tz>(),
            parse_time(&self.start),
            parse_time(&self.end),
        ) else {
            tracing::warn!(timezone = %self.timezone, "malformed schedule, treating as open");
            return true;
        };

        let local = now.with_timezone(&tz);
        let today = local.weekday().num_days_from_sunday() as u8;
        let yesterday = (today + 6) % 7;
        let time = local.time();

        if start < end {
            self.days.contains(&today) && time >= start && time < end
        } else {
            (self.days.contains(&today) && time >= start)
                || (self.days.contains(&yesterday) && time < end)
        }
    }
}

fn parse_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .map_err(|_| QueueError::InvalidArgument(format!("time {value:?} is not HH:MM")))
}
