//! Case form: a reducer over `CaseData` driven by the case-type table.

use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::attachments::{AttachmentEdit, AttachmentManager, StagedFile};
use crate::config::case_types::{is_date_field, time_field_key};
use crate::config::{CaseTypeConfig, CaseTypeRegistry};
use crate::db::{Attachment, CaseData, CaseRecord, CaseStatus, CustomField, PersonRecord, Visibility};
use crate::error::ValidationError;
use crate::forms::Draft;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseAction {
    /// Resets roles and fields; clears notes and attachments.
    ChangeType(String),
    SetSubtype(String),
    SetReference(String),
    SetStatus(CaseStatus),
    SetField { field: String, value: String },
    AddRoleMember { role: String, person_id: Uuid },
    RemoveRoleMember { role: String, person_id: Uuid },
    SetNotes(String),
    SetVisibility(Visibility),
    SetSharedWith(Vec<Uuid>),
    SetCustomFields(Vec<CustomField>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Date,
    /// A date with a paired time stored under `time_key`.
    DateTime { time_key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInput {
    pub key: String,
    pub kind: FieldKind,
}

fn lookup<'r>(
    registry: &'r CaseTypeRegistry,
    case_type: &str,
) -> Result<&'r CaseTypeConfig, ValidationError> {
    registry
        .get(case_type)
        .ok_or_else(|| ValidationError::UnknownCaseType(case_type.to_string()))
}

fn empty_roles(config: &CaseTypeConfig) -> BTreeMap<String, Vec<Uuid>> {
    config
        .roles
        .iter()
        .map(|role| (role.clone(), Vec::new()))
        .collect()
}

fn empty_fields(config: &CaseTypeConfig, subtype: &str) -> BTreeMap<String, String> {
    config
        .fields_for_subtype(subtype)
        .into_iter()
        .map(|field| (field, String::new()))
        .collect()
}

/// A blank case of the first configured type.
pub fn new_case(registry: &CaseTypeRegistry) -> CaseData {
    let config = registry.first();
    let subtype = config.default_subtype().unwrap_or_default().to_string();
    CaseData {
        case_type: config.name.clone(),
        roles: empty_roles(config),
        fields: empty_fields(config, &subtype),
        case_subtype: subtype,
        ..Default::default()
    }
}

/// Apply `action` to `state`, returning the next state.
pub fn reduce(
    registry: &CaseTypeRegistry,
    state: &CaseData,
    action: CaseAction,
) -> Result<CaseData, ValidationError> {
    let mut next = state.clone();
    match action {
        CaseAction::ChangeType(case_type) => {
            let config = lookup(registry, &case_type)?;
            let subtype = config.default_subtype().unwrap_or_default().to_string();
            next.case_type = config.name.clone();
            next.roles = empty_roles(config);
            next.fields = empty_fields(config, &subtype);
            next.case_subtype = subtype;
            next.notes.clear();
            next.attachments.clear();
        }
        CaseAction::SetSubtype(subtype) => {
            let config = lookup(registry, &state.case_type)?;
            if !config.subtypes.contains(&subtype) {
                return Err(ValidationError::UnknownSubtype {
                    case_type: state.case_type.clone(),
                    subtype,
                });
            }
            for old in config.subtype_extra_fields(&state.case_subtype) {
                if !config.fields.contains(old) {
                    next.fields.remove(old);
                    next.fields.remove(&time_field_key(old));
                }
            }
            for extra in config.subtype_extra_fields(&subtype) {
                next.fields.entry(extra.clone()).or_default();
            }
            next.case_subtype = subtype;
        }
        CaseAction::SetReference(reference) => next.reference_id = reference,
        CaseAction::SetStatus(status) => next.status = status,
        CaseAction::SetField { field, value } => {
            next.fields.insert(field, value);
        }
        CaseAction::AddRoleMember { role, person_id } => {
            let config = lookup(registry, &state.case_type)?;
            if !config.has_role(&role) {
                return Err(ValidationError::UnknownRole {
                    case_type: state.case_type.clone(),
                    role,
                });
            }
            let members = next.roles.entry(role).or_default();
            if !members.contains(&person_id) {
                members.push(person_id);
            }
        }
        CaseAction::RemoveRoleMember { role, person_id } => {
            if let Some(members) = next.roles.get_mut(&role) {
                members.retain(|id| *id != person_id);
            }
        }
        CaseAction::SetNotes(notes) => next.notes = notes,
        CaseAction::SetVisibility(visibility) => next.visibility = visibility,
        CaseAction::SetSharedWith(ids) => next.shared_with = ids,
        CaseAction::SetCustomFields(fields) => next.custom_fields = fields,
    }
    Ok(next)
}

/// Inputs to render for the case's type and subtype, in display order.
pub fn field_layout(registry: &CaseTypeRegistry, data: &CaseData) -> Vec<FieldInput> {
    let Some(config) = registry.get(&data.case_type) else {
        return Vec::new();
    };
    config
        .fields_for_subtype(&data.case_subtype)
        .into_iter()
        .map(|key| {
            let kind = if config.is_date_time_field(&key) {
                FieldKind::DateTime {
                    time_key: time_field_key(&key),
                }
            } else if is_date_field(&key) {
                FieldKind::Date
            } else {
                FieldKind::Text
            };
            FieldInput { key, kind }
        })
        .collect()
}

/// People matching `query` who are not already in `role`.
pub fn role_candidates<'p>(
    data: &CaseData,
    role: &str,
    people: &'p [PersonRecord],
    query: &str,
) -> Vec<&'p PersonRecord> {
    let assigned = data.roles.get(role).map(Vec::as_slice).unwrap_or(&[]);
    let query = query.trim().to_lowercase();
    people
        .iter()
        .filter(|p| !assigned.contains(&p.id))
        .filter(|p| {
            query.is_empty()
                || p.data.name_en.to_lowercase().contains(&query)
                || p.data.name_zh.to_lowercase().contains(&query)
        })
        .collect()
}

/// Reject data that does not fit the case-type table.
pub fn validate(registry: &CaseTypeRegistry, data: &CaseData) -> Result<(), ValidationError> {
    let config = lookup(registry, &data.case_type)?;
    if let Some(role) = data.roles.keys().find(|role| !config.has_role(role)) {
        return Err(ValidationError::UnknownRole {
            case_type: data.case_type.clone(),
            role: role.clone(),
        });
    }
    Ok(())
}

const PENDING_PREFIX: &str = "pending-";

/// Case form state. New files are held locally and uploaded on submit.
pub struct CaseForm {
    registry: Arc<CaseTypeRegistry>,
    draft: Draft<CaseData>,
    original: Option<CaseRecord>,
    pending: Vec<(String, StagedFile)>,
    edit: AttachmentEdit,
    next_pending: usize,
}

impl CaseForm {
    pub fn new(registry: Arc<CaseTypeRegistry>) -> Self {
        let draft = Draft::new(new_case(&registry));
        Self {
            registry,
            draft,
            original: None,
            pending: Vec::new(),
            edit: AttachmentEdit::default(),
            next_pending: 0,
        }
    }

    pub fn edit(registry: Arc<CaseTypeRegistry>, record: &CaseRecord) -> Self {
        Self {
            registry,
            draft: Draft::new(record.data.clone()),
            edit: AttachmentEdit::new(&record.data.attachments),
            original: Some(record.clone()),
            pending: Vec::new(),
            next_pending: 0,
        }
    }

    pub fn data(&self) -> &CaseData {
        self.draft.current()
    }

    pub fn original(&self) -> Option<&CaseRecord> {
        self.original.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.draft.is_dirty()
    }

    pub fn dispatch(&mut self, action: CaseAction) -> Result<(), ValidationError> {
        let next = reduce(&self.registry, self.draft.current(), action)?;
        if next.attachments.is_empty() {
            self.pending.clear();
        }
        self.draft.set(next);
        Ok(())
    }

    pub fn field_layout(&self) -> Vec<FieldInput> {
        field_layout(&self.registry, self.data())
    }

    pub fn role_candidates<'p>(
        &self,
        role: &str,
        people: &'p [PersonRecord],
        query: &str,
    ) -> Vec<&'p PersonRecord> {
        role_candidates(self.data(), role, people, query)
    }

    /// Hold a local file until submit. It shows in the list without a URL.
    pub fn stage(&mut self, file: StagedFile) -> String {
        let id = format!("{PENDING_PREFIX}{}-{}", self.next_pending, file.name);
        self.next_pending += 1;
        self.draft.current_mut().attachments.push(Attachment {
            id: id.clone(),
            name: file.name.clone(),
            url: None,
            uploaded_at: None,
        });
        self.pending.push((id.clone(), file));
        id
    }

    /// Drop attachments from the draft. Returns URLs uploaded during this
    /// edit that should be discarded from storage now.
    pub fn remove_attachments(&mut self, ids: &[String]) -> Vec<String> {
        self.pending.retain(|(id, _)| !ids.contains(id));
        self.edit.remove(&mut self.draft.current_mut().attachments, ids)
    }

    /// Validate, upload held files, and return the data to save.
    ///
    /// Files that fail to upload are left out. Kept attachments are those
    /// that already have a URL. The draft keeps the uploaded files but stays
    /// dirty until `mark_saved`.
    pub async fn submit(
        &mut self,
        attachments: &AttachmentManager,
        owner: Uuid,
    ) -> Result<CaseData, ValidationError> {
        validate(&self.registry, self.data())?;

        let files: Vec<StagedFile> = self.pending.drain(..).map(|(_, file)| file).collect();
        let outcome = attachments.upload_files(owner, files).await;
        for name in &outcome.failed {
            tracing::warn!(file = %name, "Dropping attachment that failed to upload");
        }

        let mut data = self.data().clone();
        data.attachments.retain(|a| a.url.is_some());
        data.attachments.extend(outcome.uploaded);
        self.draft.set(data.clone());
        Ok(data)
    }

    /// Call once the service has stored the submitted data.
    pub fn mark_saved(&mut self) {
        self.draft.mark_saved();
        self.edit = AttachmentEdit::new(&self.data().attachments);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use bytes::Bytes;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use super::{CaseAction, CaseForm, FieldKind, new_case, reduce};
    use crate::attachments::{AttachmentManager, StagedFile};
    use crate::config::CaseTypeRegistry;
    use crate::db::{PersonData, PersonRecord};
    use crate::error::ValidationError;
    use crate::i18n::Language;
    use crate::testing::{MemoryStorage, RecordingNotifier, TestHarness};

    fn registry() -> &'static CaseTypeRegistry {
        CaseTypeRegistry::bundled().expect("bundled")
    }

    fn keys<V>(map: &std::collections::BTreeMap<String, V>) -> BTreeSet<&str> {
        map.keys().map(String::as_str).collect()
    }

    #[test]
    fn new_case_starts_on_first_type() {
        let data = new_case(registry());
        assert_eq!(data.case_type, "Commercial");
        assert_eq!(data.case_subtype, "Will");
        assert_eq!(keys(&data.roles), BTreeSet::from(["Executor", "Beneficiary"]));
        assert!(data.fields.values().all(String::is_empty));
    }

    #[test]
    fn type_change_resets_roles_fields_notes_and_attachments() {
        let mut state = new_case(registry());
        state.notes = "draft notes".to_string();
        let state = reduce(
            registry(),
            &state,
            CaseAction::ChangeType("Litigation".to_string()),
        )
        .expect("known type");

        let config = registry().get("Litigation").expect("litigation");
        assert_eq!(
            keys(&state.roles),
            config.roles.iter().map(String::as_str).collect::<BTreeSet<_>>()
        );
        assert!(state.roles.values().all(Vec::is_empty));
        assert_eq!(
            keys(&state.fields),
            config
                .fields_for_subtype("Civil")
                .iter()
                .map(String::as_str)
                .collect::<BTreeSet<_>>()
        );
        assert!(state.notes.is_empty());
        assert_eq!(state.case_subtype, "Civil");
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = reduce(
            registry(),
            &new_case(registry()),
            CaseAction::ChangeType("Tax".to_string()),
        )
        .expect_err("unknown");
        assert_eq!(err, ValidationError::UnknownCaseType("Tax".to_string()));
    }

    #[test]
    fn subtype_switch_swaps_extra_fields() {
        let state = new_case(registry());
        let contract = reduce(registry(), &state, CaseAction::SetSubtype("Contract".to_string()))
            .expect("contract");
        assert!(contract.fields.contains_key("Signing Date"));

        let will = reduce(registry(), &contract, CaseAction::SetSubtype("Will".to_string()))
            .expect("will");
        assert!(!will.fields.contains_key("Signing Date"));
        assert_eq!(keys(&will.fields), keys(&state.fields));
    }

    #[test]
    fn role_add_is_duplicate_guarded() {
        let state = reduce(
            registry(),
            &new_case(registry()),
            CaseAction::ChangeType("Litigation".to_string()),
        )
        .expect("litigation");
        let person = Uuid::new_v4();
        let add = CaseAction::AddRoleMember {
            role: "Plaintiff".to_string(),
            person_id: person,
        };
        let once = reduce(registry(), &state, add.clone()).expect("add");
        let twice = reduce(registry(), &once, add).expect("add again");
        assert_eq!(twice.roles["Plaintiff"], vec![person]);

        let removed = reduce(
            registry(),
            &twice,
            CaseAction::RemoveRoleMember {
                role: "Plaintiff".to_string(),
                person_id: person,
            },
        )
        .expect("remove");
        assert!(removed.roles["Plaintiff"].is_empty());

        let err = reduce(
            registry(),
            &state,
            CaseAction::AddRoleMember {
                role: "Landlord".to_string(),
                person_id: person,
            },
        )
        .expect_err("not a litigation role");
        assert!(matches!(err, ValidationError::UnknownRole { .. }));
    }

    #[test]
    fn layout_marks_date_and_date_time_fields() {
        let mut form = CaseForm::new(Arc::new(registry().clone()));
        form.dispatch(CaseAction::ChangeType("Litigation".to_string()))
            .expect("litigation");
        let layout = form.field_layout();
        let hearing = layout.iter().find(|f| f.key == "Hearing Date").expect("hearing");
        assert_eq!(
            hearing.kind,
            FieldKind::DateTime {
                time_key: "HearingDateTime".to_string()
            }
        );
        let limitation = layout.iter().find(|f| f.key == "Limitation Date").expect("limitation");
        assert_eq!(limitation.kind, FieldKind::Date);
        let court = layout.iter().find(|f| f.key == "Court Name").expect("court");
        assert_eq!(court.kind, FieldKind::Text);
    }

    #[test]
    fn candidates_exclude_people_already_in_role() {
        let people: Vec<PersonRecord> = ["John Doe", "Jane Doe"]
            .into_iter()
            .map(|name| PersonRecord {
                id: Uuid::new_v4(),
                created_at: Utc::now(),
                user_id: Uuid::new_v4(),
                data: PersonData {
                    name_en: name.to_string(),
                    ..Default::default()
                },
            })
            .collect();
        let mut form = CaseForm::new(Arc::new(registry().clone()));
        form.dispatch(CaseAction::ChangeType("Litigation".to_string()))
            .expect("litigation");
        form.dispatch(CaseAction::AddRoleMember {
            role: "Plaintiff".to_string(),
            person_id: people[0].id,
        })
        .expect("add");

        let names: Vec<_> = form
            .role_candidates("Plaintiff", &people, "doe")
            .iter()
            .map(|p| p.data.name_en.as_str())
            .collect();
        assert_eq!(names, vec!["Jane Doe"]);
        assert_eq!(form.role_candidates("Defendant", &people, "").len(), 2);
    }

    #[tokio::test]
    async fn submit_uploads_held_files_and_drops_failures() {
        let storage = Arc::new(MemoryStorage::new());
        storage.fail_uploads_of("bad.pdf");
        let notifier = Arc::new(RecordingNotifier::default());
        let manager = AttachmentManager::new(storage.clone(), notifier.clone(), Language::En);

        let mut form = CaseForm::new(Arc::new(registry().clone()));
        form.stage(StagedFile::new("good.pdf", Bytes::from_static(b"ok")));
        form.stage(StagedFile::new("bad.pdf", Bytes::from_static(b"no")));
        let dropped = form.stage(StagedFile::new("gone.pdf", Bytes::from_static(b"x")));
        assert!(form.remove_attachments(&[dropped]).is_empty());
        assert!(form.is_dirty());

        let data = form.submit(&manager, Uuid::new_v4()).await.expect("valid");
        let names: Vec<_> = data.attachments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["good.pdf"]);
        assert!(data.attachments[0].url.is_some());
        assert!(notifier.messages().is_empty(), "save-time failures are only logged");
        assert!(form.is_dirty());
        form.mark_saved();
        assert!(!form.is_dirty());
    }

    #[tokio::test]
    async fn failed_add_leaves_the_form_dirty() {
        let harness = TestHarness::signed_in();
        let mut form = CaseForm::new(Arc::new(registry().clone()));
        form.dispatch(CaseAction::SetReference("HCA 7/2025".to_string()))
            .expect("reference");
        form.stage(StagedFile::new("writ.pdf", Bytes::from_static(b"writ")));

        let data = form
            .submit(&harness.ctx.attachments, harness.user_id)
            .await
            .expect("valid");
        harness.db.fail_writes(true);
        assert!(harness.cases.add(data.clone()).await.is_err());
        assert!(form.is_dirty(), "unsaved changes must still prompt on close");

        // Retrying keeps the upload from the first attempt.
        harness.db.fail_writes(false);
        let retry = form
            .submit(&harness.ctx.attachments, harness.user_id)
            .await
            .expect("valid");
        assert_eq!(retry, data);
        harness.cases.add(retry).await.expect("added");
        form.mark_saved();
        assert!(!form.is_dirty());
    }
}
