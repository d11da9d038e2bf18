use crate::attachments::AttachmentEdit;
use crate::db::{Attachment, IdentityType, PersonData, PersonRecord};
use crate::forms::Draft;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    Phone,
    Email,
}

fn blank_person() -> PersonData {
    PersonData {
        phones: vec![String::new()],
        emails: vec![String::new()],
        ..Default::default()
    }
}

/// Person form state.
///
/// Phone and email lists always hold at least one entry so there is an input
/// to type into. Attachments are uploaded as soon as they are chosen, so the
/// draft only ever holds URL-bearing entries.
pub struct PersonForm {
    draft: Draft<PersonData>,
    original: Option<PersonRecord>,
    edit: AttachmentEdit,
}

impl Default for PersonForm {
    fn default() -> Self {
        Self::new()
    }
}

impl PersonForm {
    pub fn new() -> Self {
        Self {
            draft: Draft::new(blank_person()),
            original: None,
            edit: AttachmentEdit::default(),
        }
    }

    pub fn edit(record: &PersonRecord) -> Self {
        let mut data = record.data.clone();
        if data.phones.is_empty() {
            data.phones.push(String::new());
        }
        if data.emails.is_empty() {
            data.emails.push(String::new());
        }
        Self {
            edit: AttachmentEdit::new(&data.attachments),
            draft: Draft::new(data),
            original: Some(record.clone()),
        }
    }

    pub fn data(&self) -> &PersonData {
        self.draft.current()
    }

    /// Direct access for plain text fields.
    pub fn data_mut(&mut self) -> &mut PersonData {
        self.draft.current_mut()
    }

    pub fn original(&self) -> Option<&PersonRecord> {
        self.original.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.draft.is_dirty()
    }

    fn contacts_mut(&mut self, kind: ContactKind) -> &mut Vec<String> {
        let data = self.draft.current_mut();
        match kind {
            ContactKind::Phone => &mut data.phones,
            ContactKind::Email => &mut data.emails,
        }
    }

    pub fn add_contact(&mut self, kind: ContactKind) {
        self.contacts_mut(kind).push(String::new());
    }

    pub fn set_contact(&mut self, kind: ContactKind, index: usize, value: &str) {
        if let Some(entry) = self.contacts_mut(kind).get_mut(index) {
            *entry = value.to_string();
        }
    }

    /// Remove an entry; the last one is blanked instead.
    pub fn remove_contact(&mut self, kind: ContactKind, index: usize) {
        let list = self.contacts_mut(kind);
        if index >= list.len() {
            return;
        }
        if list.len() == 1 {
            list[0].clear();
        } else {
            list.remove(index);
        }
    }

    pub fn set_identity(&mut self, kind: IdentityType, custom_value: &str) {
        let identity = &mut self.draft.current_mut().identity;
        identity.kind = kind;
        identity.custom_value = custom_value.to_string();
    }

    /// Append files that finished uploading.
    pub fn add_attachments(&mut self, uploaded: Vec<Attachment>) {
        self.draft.current_mut().attachments.extend(uploaded);
    }

    /// Drop attachments from the draft. Returns URLs uploaded during this
    /// edit that should be discarded from storage now.
    pub fn remove_attachments(&mut self, ids: &[String]) -> Vec<String> {
        self.edit.remove(&mut self.draft.current_mut().attachments, ids)
    }

    /// The data to save, with blank contacts dropped. The draft stays dirty
    /// until `mark_saved`.
    pub fn submit(&self) -> PersonData {
        let mut data = self.data().clone();
        data.phones.retain(|p| !p.trim().is_empty());
        data.emails.retain(|e| !e.trim().is_empty());
        if data.identity.kind != IdentityType::Other {
            data.identity.custom_value.clear();
        }
        data
    }

    /// Call once the service has stored the submitted data.
    pub fn mark_saved(&mut self) {
        self.draft.mark_saved();
        self.edit = AttachmentEdit::new(&self.data().attachments);
    }
}
