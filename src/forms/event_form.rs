use chrono::NaiveDate;
use uuid::Uuid;

use crate::db::{CaseRecord, EventData, EventRecord, Participant, PersonRecord, Visibility};
use crate::error::ValidationError;
use crate::forms::Draft;

pub const DEFAULT_EVENT_TIME: &str = "09:00";

pub struct EventForm {
    draft: Draft<EventData>,
    original: Option<EventRecord>,
}

impl EventForm {
    /// A new event on `today` at the default time.
    pub fn new(today: NaiveDate) -> Self {
        let data = EventData {
            title: None,
            participants: Vec::new(),
            date: today,
            time: DEFAULT_EVENT_TIME.to_string(),
            location: String::new(),
            notes: String::new(),
            attendees: Vec::new(),
            case_id: None,
            visibility: Visibility::default(),
            shared_with: Vec::new(),
        };
        Self {
            draft: Draft::new(data),
            original: None,
        }
    }

    pub fn edit(record: &EventRecord) -> Self {
        Self {
            draft: Draft::new(record.data.clone()),
            original: Some(record.clone()),
        }
    }

    pub fn data(&self) -> &EventData {
        self.draft.current()
    }

    pub fn data_mut(&mut self) -> &mut EventData {
        self.draft.current_mut()
    }

    pub fn original(&self) -> Option<&EventRecord> {
        self.original.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.draft.is_dirty()
    }

    pub fn add_person(&mut self, person: &PersonRecord) -> Result<(), ValidationError> {
        self.add_participant(Participant {
            person_id: Some(person.id),
            person_name: person.data.display_name().to_string(),
        })
    }

    /// Add someone who is not in the people list.
    pub fn add_name(&mut self, name: &str) -> Result<(), ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::Required {
                field: "participant",
            });
        }
        self.add_participant(Participant {
            person_id: None,
            person_name: name.to_string(),
        })
    }

    pub fn add_participant(&mut self, participant: Participant) -> Result<(), ValidationError> {
        let participants = &mut self.draft.current_mut().participants;
        if participants.contains(&participant) {
            return Err(ValidationError::DuplicateParticipant(participant.person_name));
        }
        participants.push(participant);
        Ok(())
    }

    pub fn remove_participant(&mut self, index: usize) {
        let participants = &mut self.draft.current_mut().participants;
        if index < participants.len() {
            participants.remove(index);
        }
    }

    /// Link the event to a case. An empty or unparsable id unlinks it.
    pub fn select_case(&mut self, value: &str) {
        self.draft.current_mut().case_id = Uuid::parse_str(value.trim()).ok();
    }

    /// People whose name contains `input`, excluding those already added.
    pub fn suggestions<'p>(&self, people: &'p [PersonRecord], input: &str) -> Vec<&'p PersonRecord> {
        let needle = input.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let added: Vec<Uuid> = self.person_ids().collect();
        people
            .iter()
            .filter(|p| !added.contains(&p.id))
            .filter(|p| {
                p.data.name_en.to_lowercase().contains(&needle)
                    || p.data.name_zh.to_lowercase().contains(&needle)
            })
            .collect()
    }

    /// Cases with any participant in a role; every case when no participant
    /// is a known person.
    pub fn relevant_cases<'c>(&self, cases: &'c [CaseRecord]) -> Vec<&'c CaseRecord> {
        let ids: Vec<Uuid> = self.person_ids().collect();
        if ids.is_empty() {
            return cases.iter().collect();
        }
        cases
            .iter()
            .filter(|c| ids.iter().any(|&id| c.data.involves(id)))
            .collect()
    }

    fn person_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.data().participants.iter().filter_map(|p| p.person_id)
    }

    /// The data to save. The draft stays dirty until `mark_saved`.
    pub fn submit(&self) -> Result<EventData, ValidationError> {
        let mut data = self.data().clone();
        if data.participants.is_empty() {
            return Err(ValidationError::NoParticipants);
        }
        if data.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            data.title = None;
        }
        Ok(data)
    }

    /// Call once the service has stored the submitted data.
    pub fn mark_saved(&mut self) {
        self.draft.mark_saved();
    }
}
