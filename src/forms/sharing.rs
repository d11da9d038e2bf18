use uuid::Uuid;

use crate::db::SharingGroup;
use crate::i18n::{Language, t};

/// The users a record is shared with, in the order they were picked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharingSelection {
    users: Vec<Uuid>,
}

impl SharingSelection {
    pub fn new(users: Vec<Uuid>) -> Self {
        let mut selection = Self::default();
        for user in users {
            selection.add(user);
        }
        selection
    }

    fn add(&mut self, user: Uuid) {
        if !self.users.contains(&user) {
            self.users.push(user);
        }
    }

    pub fn toggle_user(&mut self, user: Uuid) {
        if self.users.contains(&user) {
            self.remove_user(user);
        } else {
            self.users.push(user);
        }
    }

    /// Add every member of `group` not already selected.
    pub fn add_group(&mut self, group: &SharingGroup) {
        for &member in &group.members {
            self.add(member);
        }
    }

    pub fn remove_user(&mut self, user: Uuid) {
        self.users.retain(|u| *u != user);
    }

    pub fn contains(&self, user: Uuid) -> bool {
        self.users.contains(&user)
    }

    pub fn users(&self) -> &[Uuid] {
        &self.users
    }

    pub fn into_users(self) -> Vec<Uuid> {
        self.users
    }

    pub fn button_label(&self, lang: Language) -> String {
        match self.users.len() {
            0 => t(lang, "select_users_or_groups"),
            1 => format!("1 {}", t(lang, "member_selected")),
            n => format!("{n} {}", t(lang, "members_selected")),
        }
    }
}
