//! Date dimension derivation
//!
//! Pure computation of every `dim_date` attribute from a calendar
//! date. The 8-digit `YYYYMMDD` key is the join key used by the book
//! and fact tables.

use chrono::{Datelike, NaiveDate, Weekday};

/// One fully-derived date dimension row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateDimension {
    pub date_key: i32,
    pub full_date: NaiveDate,
    pub year: i32,
    pub month: i32,
    pub day: i32,
    /// "Q1" through "Q4"
    pub quarter: String,
    /// English weekday name, "Monday" through "Sunday"
    pub day_of_week: String,
    pub is_weekend: bool,
}

impl DateDimension {
    pub fn derive(date: NaiveDate) -> Self {
        let month = date.month() as i32;
        let quarter = format!("Q{}", (month - 1) / 3 + 1);

        let weekday = date.weekday();
        let day_of_week = match weekday {
            Weekday::Mon => "Monday",
            Weekday::Tue => "Tuesday",
            Weekday::Wed => "Wednesday",
            Weekday::Thu => "Thursday",
            Weekday::Fri => "Friday",
            Weekday::Sat => "Saturday",
            Weekday::Sun => "Sunday",
        }
        .to_string();

        Self {
            date_key: date.year() * 10_000 + month * 100 + date.day() as i32,
            full_date: date,
            year: date.year(),
            month,
            day: date.day() as i32,
            quarter,
            day_of_week,
            is_weekend: matches!(weekday, Weekday::Sat | Weekday::Sun),
        }
    }
}
