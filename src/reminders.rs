//! The "today / next 7 days" view merged from events and dated cases.

use std::cmp::Ordering;

use chrono::{Days, NaiveDate, NaiveTime};

use crate::config::CaseTypeRegistry;
use crate::config::case_types::{is_date_field, time_field_key};
use crate::db::{CaseData, CaseRecord, EventRecord};
use crate::directory::Directory;
use crate::format::{format_time, parse_date, parse_time};
use crate::i18n::{t, t_with};

/// Upcoming covers `today + 1 ..= today + UPCOMING_DAYS`.
pub const UPCOMING_DAYS: u64 = 7;

/// The field a case is filed under, with its parsed date.
///
/// Configured types use their anchor field. Other types fall back to the
/// first field (in key order) whose name contains "date" and whose value
/// parses as a date.
pub fn anchor(case: &CaseData, registry: &CaseTypeRegistry) -> Option<(String, NaiveDate)> {
    let configured = registry
        .get(&case.case_type)
        .and_then(|config| config.anchor_field.as_deref());
    if let Some(field) = configured {
        let date = case.fields.get(field).and_then(|v| parse_date(v))?;
        return Some((field.to_string(), date));
    }
    case.fields
        .iter()
        .filter(|(key, _)| is_date_field(key))
        .find_map(|(key, value)| parse_date(value).map(|date| (key.clone(), date)))
}

pub fn anchor_date(case: &CaseData, registry: &CaseTypeRegistry) -> Option<NaiveDate> {
    anchor(case, registry).map(|(_, date)| date)
}

/// One row of the reminders view.
#[derive(Debug, Clone, PartialEq)]
pub enum ReminderItem {
    Event(EventRecord),
    Case {
        case: CaseRecord,
        /// The anchor field the date came from.
        field: String,
        date: NaiveDate,
        /// `HH:MM` when the anchor is a date-time field with a time set.
        time: Option<String>,
    },
}

impl ReminderItem {
    fn for_case(case: &CaseRecord, registry: &CaseTypeRegistry) -> Option<Self> {
        let (field, date) = anchor(&case.data, registry)?;
        let timed = registry
            .get(&case.data.case_type)
            .is_some_and(|config| config.is_date_time_field(&field));
        let time = if timed {
            case.data
                .fields
                .get(&time_field_key(&field))
                .filter(|v| !v.trim().is_empty())
                .cloned()
        } else {
            None
        };
        Some(Self::Case {
            case: case.clone(),
            field,
            date,
            time,
        })
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            Self::Event(event) => event.data.date,
            Self::Case { date, .. } => *date,
        }
    }

    /// Stored time, empty for all-day items.
    pub fn time(&self) -> &str {
        match self {
            Self::Event(event) => &event.data.time,
            Self::Case { time, .. } => time.as_deref().unwrap_or(""),
        }
    }

    /// Items without a usable time sort as midnight.
    fn sort_time(&self) -> NaiveTime {
        parse_time(self.time()).unwrap_or(NaiveTime::MIN)
    }

    pub fn title(&self, dir: &Directory<'_>) -> String {
        match self {
            Self::Event(event) => match event.data.title.as_deref().map(str::trim) {
                Some(title) if !title.is_empty() => title.to_string(),
                _ => t_with(
                    dir.language,
                    "event_with",
                    &[("names", &dir.participant_names(&event.data.participants))],
                ),
            },
            Self::Case { case, .. } => format!(
                "[{}] - {}",
                t(dir.language, &case.data.case_type),
                case.data.reference_id
            ),
        }
    }

    pub fn display_time(&self, dir: &Directory<'_>) -> String {
        format_time(dir.language, self.time())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reminders {
    pub today: Vec<ReminderItem>,
    pub upcoming: Vec<ReminderItem>,
}

impl Reminders {
    /// Bucket events and cases relative to `today`.
    ///
    /// Today is ordered by time; upcoming by date, then time. Events stay
    /// ahead of cases on ties.
    pub fn build(
        events: &[EventRecord],
        cases: &[CaseRecord],
        registry: &CaseTypeRegistry,
        today: NaiveDate,
    ) -> Self {
        let Some(first_upcoming) = today.checked_add_days(Days::new(1)) else {
            return Self::default();
        };
        let Some(horizon) = today.checked_add_days(Days::new(UPCOMING_DAYS + 1)) else {
            return Self::default();
        };

        let items = events
            .iter()
            .cloned()
            .map(ReminderItem::Event)
            .chain(cases.iter().filter_map(|c| ReminderItem::for_case(c, registry)));

        let mut reminders = Self::default();
        for item in items {
            let date = item.date();
            if date == today {
                reminders.today.push(item);
            } else if date >= first_upcoming && date < horizon {
                reminders.upcoming.push(item);
            }
        }

        reminders
            .today
            .sort_by(|a, b| a.sort_time().cmp(&b.sort_time()));
        reminders.upcoming.sort_by(|a, b| {
            match a.date().cmp(&b.date()) {
                Ordering::Equal => a.sort_time().cmp(&b.sort_time()),
                other => other,
            }
        });
        reminders
    }

    pub fn is_empty(&self) -> bool {
        self.today.is_empty() && self.upcoming.is_empty()
    }
}
