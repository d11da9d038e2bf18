use std::cmp::Reverse;

use crate::db::{IdentityType, PersonData, PersonRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PersonSearchField {
    #[default]
    NameEn,
    NameZh,
    Hkid,
    /// Every text field, identity, attachment names, custom fields and contacts.
    Keyword,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PersonSort {
    #[default]
    NewestFirst,
    NameAsc,
    NameDesc,
}

impl PersonSort {
    pub fn label_key(self) -> &'static str {
        match self {
            Self::NewestFirst => "newest_first",
            Self::NameAsc => "name_asc",
            Self::NameDesc => "name_desc",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeopleFilter {
    pub search: String,
    pub search_field: PersonSearchField,
    pub identity: Option<IdentityType>,
    pub favorites_only: bool,
    pub sort: PersonSort,
}

impl PeopleFilter {
    pub fn matches(&self, person: &PersonRecord) -> bool {
        let data = &person.data;
        if self.identity.is_some_and(|kind| data.identity.kind != kind) {
            return false;
        }
        if self.favorites_only && !data.is_favorite {
            return false;
        }
        let needle = self.search.to_lowercase();
        if needle.is_empty() {
            return true;
        }
        match self.search_field {
            PersonSearchField::NameEn => contains_ci(&data.name_en, &needle),
            PersonSearchField::NameZh => contains_ci(&data.name_zh, &needle),
            PersonSearchField::Hkid => contains_ci(&data.hkid, &needle),
            PersonSearchField::Keyword => keyword_match(data, &needle),
        }
    }
}

fn contains_ci(value: &str, needle: &str) -> bool {
    value.to_lowercase().contains(needle)
}

fn keyword_match(data: &PersonData, needle: &str) -> bool {
    let text_fields = [
        &data.name_en,
        &data.name_zh,
        &data.hkid,
        &data.nationality,
        &data.personality_notes,
        &data.notes,
    ];
    text_fields.iter().any(|v| contains_ci(v, needle))
        || (data.identity.kind == IdentityType::Other
            && contains_ci(&data.identity.custom_value, needle))
        || data.attachments.iter().any(|a| contains_ci(&a.name, needle))
        || data
            .custom_fields
            .iter()
            .any(|f| contains_ci(&f.key, needle) || contains_ci(&f.value, needle))
        // Phone numbers are matched as typed.
        || data.phones.iter().any(|p| p.contains(needle))
        || data.emails.iter().any(|e| contains_ci(e, needle))
}

fn sort_name(person: &PersonRecord) -> String {
    person.data.display_name().to_lowercase()
}

/// Filter then sort.
pub fn filter_people<'a>(
    people: &'a [PersonRecord],
    filter: &PeopleFilter,
) -> Vec<&'a PersonRecord> {
    let mut out: Vec<&PersonRecord> = people.iter().filter(|p| filter.matches(p)).collect();
    match filter.sort {
        PersonSort::NewestFirst => out.sort_by_key(|p| Reverse(p.created_at)),
        PersonSort::NameAsc => out.sort_by_cached_key(|p| sort_name(p)),
        PersonSort::NameDesc => out.sort_by_cached_key(|p| Reverse(sort_name(p))),
    }
    out
}
