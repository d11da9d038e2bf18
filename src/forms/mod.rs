//! Form state for people, cases and events.
//!
//! Each form edits a `Draft`: the last-saved snapshot plus the working copy.
//! Closing a form only needs confirmation when the two differ.

pub mod case_form;
pub mod event_form;
pub mod person_form;
pub mod sharing;

pub use case_form::{CaseAction, CaseForm, FieldInput, FieldKind};
pub use event_form::EventForm;
pub use person_form::{ContactKind, PersonForm};
pub use sharing::SharingSelection;

use crate::i18n::{Language, t};
use crate::prompt::Confirm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseRequest {
    /// Nothing changed; close right away.
    Close,
    /// Unsaved changes; ask first.
    Confirm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft<T> {
    saved: T,
    current: T,
}

impl<T: Clone + PartialEq> Draft<T> {
    pub fn new(value: T) -> Self {
        Self {
            saved: value.clone(),
            current: value,
        }
    }

    pub fn current(&self) -> &T {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut T {
        &mut self.current
    }

    pub fn saved(&self) -> &T {
        &self.saved
    }

    /// Replace the working copy, keeping the snapshot.
    pub fn set(&mut self, value: T) {
        self.current = value;
    }

    pub fn is_dirty(&self) -> bool {
        self.current != self.saved
    }

    pub fn close_request(&self) -> CloseRequest {
        if self.is_dirty() {
            CloseRequest::Confirm
        } else {
            CloseRequest::Close
        }
    }

    pub fn mark_saved(&mut self) {
        self.saved = self.current.clone();
    }

    pub fn revert(&mut self) {
        self.current = self.saved.clone();
    }
}

/// Whether a form may close. Asks through `confirm` only when `dirty`.
pub async fn may_close(dirty: bool, confirm: &dyn Confirm, lang: Language) -> bool {
    if !dirty {
        return true;
    }
    confirm.confirm(&t(lang, "confirm_close_message")).await
}

#[cfg(test)]
mod tests {
    use super::{CloseRequest, Draft, may_close};
    use crate::i18n::Language;
    use crate::testing::StaticConfirm;

    #[test]
    fn dirty_tracks_structural_difference() {
        let mut draft = Draft::new(vec!["a".to_string()]);
        assert_eq!(draft.close_request(), CloseRequest::Close);

        draft.current_mut().push("b".to_string());
        assert!(draft.is_dirty());

        draft.current_mut().pop();
        assert!(!draft.is_dirty(), "undoing an edit is not a change");

        draft.current_mut().clear();
        draft.mark_saved();
        assert_eq!(draft.close_request(), CloseRequest::Close);
        assert!(draft.saved().is_empty());
    }

    #[tokio::test]
    async fn clean_forms_close_without_asking() {
        let confirm = StaticConfirm::new(false);
        assert!(may_close(false, &confirm, Language::En).await);
        assert!(confirm.asked().is_empty());

        assert!(!may_close(true, &confirm, Language::En).await);
        assert_eq!(
            confirm.asked(),
            vec!["Are you sure you want to close? All unsaved changes will be lost."]
        );
    }
}
