//! Date and time rendering for lists and reminders.

use chrono::{NaiveDate, NaiveTime, Timelike};

use crate::i18n::{Language, t};

/// `DD/MM/YYYY`.
pub fn format_date_hk(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Parse a stored `YYYY-MM-DD` value. Blank or malformed values yield `None`.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// Parse `HH:MM` or `HH:MM:SS`.
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

/// Render a stored time as `9:05 AM` or `上午 9:05`.
///
/// Blank or malformed values render as the all-day label.
pub fn format_time(lang: Language, value: &str) -> String {
    let Some(time) = parse_time(value) else {
        return t(lang, "all_day");
    };
    let (is_pm, hour) = time.hour12();
    let clock = format!("{}:{:02}", hour, time.minute());
    let period = t(lang, if is_pm { "time_pm" } else { "time_am" });
    match lang {
        Language::En => format!("{clock} {period}"),
        Language::Zh => format!("{period} {clock}"),
    }
}
