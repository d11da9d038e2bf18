//! Id to display-name lookups and the read-only record views built on them.
//!
//! Roles and participants reference people weakly. A dangling id never
//! fails a lookup; it renders as the `not_available` placeholder.

use uuid::Uuid;

use crate::config::CaseTypeRegistry;
use crate::db::{CaseRecord, CaseStatus, IdentityType, Participant, PersonRecord, UserSummary};
use crate::i18n::{Language, t};

/// Borrowed view over the loaded lists.
#[derive(Debug, Clone, Copy)]
pub struct Directory<'a> {
    pub people: &'a [PersonRecord],
    pub cases: &'a [CaseRecord],
    pub users: &'a [UserSummary],
    pub language: Language,
}

impl<'a> Directory<'a> {
    pub fn person(&self, id: Uuid) -> Option<&'a PersonRecord> {
        self.people.iter().find(|p| p.id == id)
    }

    pub fn case(&self, id: Uuid) -> Option<&'a CaseRecord> {
        self.cases.iter().find(|c| c.id == id)
    }

    fn placeholder(&self) -> String {
        t(self.language, "not_available")
    }

    pub fn person_name(&self, id: Uuid) -> String {
        self.person(id)
            .map(|p| p.data.display_name())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.placeholder())
    }

    /// Username, then email, then the placeholder.
    pub fn user_name(&self, id: Uuid) -> String {
        let Some(user) = self.users.iter().find(|u| u.id == id) else {
            return self.placeholder();
        };
        if !user.username.is_empty() {
            return user.username.clone();
        }
        user.email
            .clone()
            .filter(|email| !email.is_empty())
            .unwrap_or_else(|| self.placeholder())
    }

    pub fn case_ref(&self, id: Uuid) -> String {
        self.case(id)
            .map(|c| c.data.reference_id.clone())
            .filter(|reference| !reference.is_empty())
            .unwrap_or_else(|| self.placeholder())
    }

    /// A known person's current name, else the free-text name.
    pub fn participant_name(&self, participant: &Participant) -> String {
        if let Some(person) = participant.person_id.and_then(|id| self.person(id)) {
            return person.data.display_name().to_string();
        }
        if participant.person_name.trim().is_empty() {
            t(self.language, "unknown_participant")
        } else {
            participant.person_name.clone()
        }
    }

    pub fn participant_names(&self, participants: &[Participant]) -> String {
        participants
            .iter()
            .map(|p| self.participant_name(p))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A person assigned to a case role. `resolved` is false for dangling ids,
/// which cannot be navigated to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMember {
    pub person_id: Uuid,
    pub name: String,
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleView {
    pub role: String,
    pub label: String,
    pub members: Vec<RoleMember>,
}

/// A case with its roles resolved to names, in configured role order.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseView {
    pub case: CaseRecord,
    pub type_label: String,
    pub subtype_label: String,
    pub status_label: String,
    pub roles: Vec<RoleView>,
}

impl CaseView {
    pub fn build(case: &CaseRecord, registry: &CaseTypeRegistry, dir: &Directory<'_>) -> Self {
        let lang = dir.language;
        let mut order: Vec<String> = registry
            .get(&case.data.case_type)
            .map(|config| config.roles.clone())
            .unwrap_or_default();
        for role in case.data.roles.keys() {
            if !order.contains(role) {
                order.push(role.clone());
            }
        }

        let roles = order
            .into_iter()
            .map(|role| {
                let members = case
                    .data
                    .roles
                    .get(&role)
                    .map(Vec::as_slice)
                    .unwrap_or(&[])
                    .iter()
                    .map(|&person_id| RoleMember {
                        person_id,
                        name: dir.person_name(person_id),
                        resolved: dir.person(person_id).is_some(),
                    })
                    .collect();
                RoleView {
                    label: t(lang, &role),
                    role,
                    members,
                }
            })
            .collect();

        Self {
            type_label: t(lang, &case.data.case_type),
            subtype_label: if case.data.case_subtype.is_empty() {
                String::new()
            } else {
                t(lang, &case.data.case_subtype)
            },
            status_label: t(lang, case.data.status.as_str()),
            case: case.clone(),
            roles,
        }
    }

    pub fn role(&self, role: &str) -> Option<&RoleView> {
        self.roles.iter().find(|r| r.role == role)
    }
}

/// Cases a person fills any role in, split by status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelatedCases {
    /// Everything not completed, including on-hold cases.
    pub ongoing: Vec<CaseRecord>,
    pub completed: Vec<CaseRecord>,
}

impl RelatedCases {
    pub fn for_person(person_id: Uuid, cases: &[CaseRecord]) -> Self {
        let (completed, ongoing): (Vec<_>, Vec<_>) = cases
            .iter()
            .filter(|c| c.data.involves(person_id))
            .cloned()
            .partition(|c| c.data.status == CaseStatus::Completed);
        Self { ongoing, completed }
    }

    pub fn is_empty(&self) -> bool {
        self.ongoing.is_empty() && self.completed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonView {
    pub person: PersonRecord,
    pub identity_label: String,
    pub related: RelatedCases,
}

impl PersonView {
    pub fn build(person: &PersonRecord, dir: &Directory<'_>) -> Self {
        let identity = &person.data.identity;
        let identity_label = if identity.custom_value.trim().is_empty()
            || identity.kind != IdentityType::Other
        {
            t(dir.language, identity.kind.as_str())
        } else {
            identity.custom_value.clone()
        };
        Self {
            person: person.clone(),
            identity_label,
            related: RelatedCases::for_person(person.id, dir.cases),
        }
    }
}
