use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Weekday};

/// Holiday lookup. `None` means an ordinary day.
pub trait HolidayCalendar: Send + Sync {
    fn holiday(&self, date: NaiveDate) -> Option<String>;
}

/// Holidays from `holidays.toml`:
///
/// ```toml
/// "12-25" = "Christmas"          # every year
/// "2026-10-01" = "National Day"  # this date only
/// ```
///
/// Dated entries win over yearly ones.
#[derive(Debug, Default)]
pub struct TomlHolidays {
    entries: HashMap<String, String>,
}

impl TomlHolidays {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read holidays: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let entries: HashMap<String, String> = toml::from_str(content)?;
        Ok(Self { entries })
    }
}

impl HolidayCalendar for TomlHolidays {
    fn holiday(&self, date: NaiveDate) -> Option<String> {
        self.entries
            .get(&date.format("%Y-%m-%d").to_string())
            .or_else(|| self.entries.get(&date.format("%m-%d").to_string()))
            .filter(|name| !name.trim().is_empty())
            .cloned()
    }
}

pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

pub fn period_of_day(hour: u32) -> &'static str {
    match hour % 24 {
        0..=5 => "late night",
        6..=8 => "early morning",
        9..=11 => "morning",
        12..=13 => "noon",
        14..=17 => "afternoon",
        18..=21 => "evening",
        _ => "late night",
    }
}
