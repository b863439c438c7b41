//! Maintenance windows.
//!
//! A window is a daily UTC time-of-day range, optionally restricted to some
//! weekdays. `start` is inclusive and `end` exclusive; `end < start` wraps
//! past midnight, and `start == end` covers the whole day. For a wrapping
//! window the weekday filter applies to the day the window opened, so a
//! Saturday 22:00–04:00 window includes Sunday 03:00.
//!
//! In configuration files a window reads:
//!
//! ```toml
//! [execution.safety.maintenance_window]
//! start = "22:00"
//! end = "04:00"
//! days = ["sat", "sun"]
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{OffsetDateTime, Time, UtcOffset, Weekday};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawWindow", into = "RawWindow")]
pub struct MaintenanceWindow {
    start: Time,
    end: Time,
    /// Empty means every day.
    days: Vec<Weekday>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawWindow {
    start: String,
    end: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    days: Vec<String>,
}

impl MaintenanceWindow {
    pub fn new(start: Time, end: Time) -> Self {
        MaintenanceWindow {
            start,
            end,
            days: Vec::new(),
        }
    }

    pub fn on_days(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.days = days.into_iter().collect();
        self
    }

    /// Parse `HH:MM` bounds, e.g. `MaintenanceWindow::parse("22:00", "04:00")`.
    pub fn parse(start: &str, end: &str) -> Result<Self, String> {
        Ok(MaintenanceWindow::new(parse_time(start)?, parse_time(end)?))
    }

    pub fn contains(&self, at: OffsetDateTime) -> bool {
        let at = at.to_offset(UtcOffset::UTC);
        let t = at.time();
        let wraps = self.end < self.start;

        let in_range = if self.start == self.end {
            true
        } else if wraps {
            t >= self.start || t < self.end
        } else {
            t >= self.start && t < self.end
        };
        if !in_range {
            return false;
        }
        if self.days.is_empty() {
            return true;
        }

        let opened_on = if wraps && t < self.end {
            at.weekday().previous()
        } else {
            at.weekday()
        };
        self.days.contains(&opened_on)
    }
}

impl fmt::Display for MaintenanceWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02} UTC",
            self.start.hour(),
            self.start.minute(),
            self.end.hour(),
            self.end.minute()
        )?;
        if !self.days.is_empty() {
            let days: Vec<String> = self.days.iter().map(|d| d.to_string()).collect();
            write!(f, " ({})", days.join(", "))?;
        }
        Ok(())
    }
}

impl TryFrom<RawWindow> for MaintenanceWindow {
    type Error = String;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        let days = raw
            .days
            .iter()
            .map(|d| parse_weekday(d))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MaintenanceWindow::parse(&raw.start, &raw.end)?.on_days(days))
    }
}

impl From<MaintenanceWindow> for RawWindow {
    fn from(w: MaintenanceWindow) -> Self {
        RawWindow {
            start: format!("{:02}:{:02}", w.start.hour(), w.start.minute()),
            end: format!("{:02}:{:02}", w.end.hour(), w.end.minute()),
            days: w.days.iter().map(|d| d.to_string()).collect(),
        }
    }
}

fn parse_time(s: &str) -> Result<Time, String> {
    Time::parse(s.trim(), format_description!("[hour]:[minute]"))
        .map_err(|e| format!("invalid time '{}' (expected HH:MM): {}", s, e))
}

fn parse_weekday(s: &str) -> Result<Weekday, String> {
    let lower = s.trim().to_ascii_lowercase();
    let day = match lower.get(..3).unwrap_or(&lower) {
        "mon" => Weekday::Monday,
        "tue" => Weekday::Tuesday,
        "wed" => Weekday::Wednesday,
        "thu" => Weekday::Thursday,
        "fri" => Weekday::Friday,
        "sat" => Weekday::Saturday,
        "sun" => Weekday::Sunday,
        _ => return Err(format!("invalid weekday '{}'", s)),
    };
    Ok(day)
}
