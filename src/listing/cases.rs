use chrono::Datelike;

use crate::config::CaseTypeRegistry;
use crate::db::{CaseRecord, CaseStatus};
use crate::directory::Directory;
use crate::reminders::anchor_date;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaseSearchField {
    #[default]
    ReferenceId,
    /// Reference id, role names, notes, field and custom field values.
    Keyword,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeFilter {
    pub case_type: String,
    pub subtype: Option<String>,
}

/// Filters of the case list. `None` means "all".
///
/// Date filters apply to the anchor date; cases without one are never
/// excluded by them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseFilter {
    pub search: String,
    pub search_field: CaseSearchField,
    pub status: Option<CaseStatus>,
    pub case_type: Option<TypeFilter>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl CaseFilter {
    pub fn matches(
        &self,
        case: &CaseRecord,
        registry: &CaseTypeRegistry,
        dir: &Directory<'_>,
    ) -> bool {
        let data = &case.data;
        let needle = self.search.trim().to_lowercase();
        if !needle.is_empty() {
            let haystack = match self.search_field {
                CaseSearchField::ReferenceId => data.reference_id.to_lowercase(),
                CaseSearchField::Keyword => keyword_text(case, dir),
            };
            if !haystack.contains(&needle) {
                return false;
            }
        }

        if let Some(status) = self.status
            && data.status != status
        {
            return false;
        }
        if let Some(filter) = &self.case_type {
            if data.case_type != filter.case_type {
                return false;
            }
            if let Some(subtype) = filter.subtype.as_deref().filter(|s| !s.is_empty())
                && data.case_subtype != subtype
            {
                return false;
            }
        }

        if let Some(date) = anchor_date(data, registry)
            && (self.year.is_some_and(|y| date.year() != y)
                || self.month.is_some_and(|m| date.month() != m)
                || self.day.is_some_and(|d| date.day() != d))
        {
            return false;
        }
        true
    }
}

fn keyword_text(case: &CaseRecord, dir: &Directory<'_>) -> String {
    let data = &case.data;
    let role_names = data
        .roles
        .values()
        .flatten()
        .filter_map(|&id| dir.person(id))
        .map(|p| p.data.display_name());
    let field_values = data.fields.values().map(String::as_str);
    let custom_values = data.custom_fields.iter().map(|f| f.value.as_str());

    std::iter::once(data.reference_id.as_str())
        .chain(role_names)
        .chain(std::iter::once(data.notes.as_str()))
        .chain(field_values)
        .chain(custom_values)
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Cases passing `filter`, in list order.
pub fn filter_cases<'a>(
    cases: &'a [CaseRecord],
    filter: &CaseFilter,
    registry: &CaseTypeRegistry,
    dir: &Directory<'_>,
) -> Vec<&'a CaseRecord> {
    cases
        .iter()
        .filter(|c| filter.matches(c, registry, dir))
        .collect()
}

/// Distinct anchor years, newest first.
pub fn available_years(cases: &[CaseRecord], registry: &CaseTypeRegistry) -> Vec<i32> {
    let mut years: Vec<i32> = cases
        .iter()
        .filter_map(|c| anchor_date(&c.data, registry))
        .map(|d| d.year())
        .collect();
    years.sort_unstable_by(|a, b| b.cmp(a));
    years.dedup();
    years
}
