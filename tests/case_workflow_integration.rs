//! End-to-end flows through forms, record services and views, backed by the
//! in-memory collaborators in `casefile::testing`.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{Days, NaiveDate};
use pretty_assertions::assert_eq;

use casefile::attachments::StagedFile;
use casefile::config::CaseTypeRegistry;
use casefile::db::{CaseData, CaseStatus, EventData, Participant, PersonData, Visibility};
use casefile::directory::{CaseView, Directory, PersonView};
use casefile::forms::{CaseAction, CaseForm};
use casefile::listing::{CaseFilter, filter_cases};
use casefile::reminders::{ReminderItem, Reminders};
use casefile::storage::storage_path_from_url;
use casefile::testing::{TEST_BUCKET, TestHarness};

fn registry() -> Arc<CaseTypeRegistry> {
    Arc::new(CaseTypeRegistry::bundled().expect("bundled case types").clone())
}

#[tokio::test]
async fn plaintiff_is_listed_in_case_view_and_links_to_person() {
    let harness = TestHarness::signed_in();
    let john = harness.db.seed_person(
        harness.user_id,
        PersonData {
            name_en: "John Doe".to_string(),
            ..Default::default()
        },
    );
    harness.people.refresh().await.expect("people");

    let mut form = CaseForm::new(registry());
    form.dispatch(CaseAction::ChangeType("Litigation".to_string()))
        .expect("litigation");
    form.dispatch(CaseAction::SetReference("HCA 123/2025".to_string()))
        .expect("reference");
    form.dispatch(CaseAction::AddRoleMember {
        role: "Plaintiff".to_string(),
        person_id: john,
    })
    .expect("plaintiff");
    let data = form
        .submit(&harness.ctx.attachments, harness.user_id)
        .await
        .expect("valid case");
    harness.cases.add(data).await.expect("added");

    let people = harness.people.list().await;
    let cases = harness.cases.list().await;
    let dir = Directory {
        people: &people,
        cases: &cases,
        users: &[],
        language: harness.ctx.language,
    };

    let view = CaseView::build(&cases[0], &registry(), &dir);
    let plaintiffs = view.role("Plaintiff").expect("plaintiff role");
    assert_eq!(plaintiffs.members.len(), 1);
    let member = &plaintiffs.members[0];
    assert_eq!(member.name, "John Doe");
    assert!(member.resolved);
    assert!(view.role("Defendant").expect("defendant role").members.is_empty());

    let person = dir.person(member.person_id).expect("navigable");
    let person_view = PersonView::build(person, &dir);
    assert_eq!(person_view.person.id, john);
    assert_eq!(person_view.related.ongoing.len(), 1);
    assert_eq!(person_view.related.ongoing[0].data.reference_id, "HCA 123/2025");
}

#[tokio::test]
async fn removing_a_saved_attachment_deletes_exactly_its_object() {
    let harness = TestHarness::signed_in();

    let mut form = CaseForm::new(registry());
    form.stage(StagedFile::new("lease.pdf", Bytes::from_static(b"lease")));
    form.stage(StagedFile::new("deed.pdf", Bytes::from_static(b"deed")));
    let data = form
        .submit(&harness.ctx.attachments, harness.user_id)
        .await
        .expect("valid case");
    assert_eq!(data.attachments.len(), 2);
    harness.cases.add(data).await.expect("added");
    assert!(harness.storage.delete_batches().is_empty());

    let saved = harness.cases.list().await.remove(0);
    let removed = saved
        .data
        .attachments
        .iter()
        .find(|a| a.name == "lease.pdf")
        .cloned()
        .expect("lease attachment");
    let removed_path = storage_path_from_url(removed.url.as_deref().expect("url"), TEST_BUCKET)
        .expect("resolvable url");

    let mut edit = CaseForm::edit(registry(), &saved);
    let discard_now = edit.remove_attachments(std::slice::from_ref(&removed.id));
    assert!(discard_now.is_empty(), "saved files are cleaned up on save");
    let updated = edit
        .submit(&harness.ctx.attachments, harness.user_id)
        .await
        .expect("valid case");

    let outcome = harness.cases.update(&saved, &updated).await.expect("update");
    assert!(outcome.is_ok());
    assert_eq!(harness.storage.delete_batches(), vec![vec![removed_path.clone()]]);
    assert!(!harness.storage.contains(&removed_path));

    let persisted = harness.cases.get(saved.id).await.expect("still listed");
    assert_eq!(persisted.data.attachments.len(), 1);
    assert_eq!(persisted.data.attachments[0].name, "deed.pdf");
}

#[tokio::test]
async fn completed_filter_over_ten_cases() {
    let harness = TestHarness::signed_in();
    for i in 0..10 {
        let status = if i < 3 {
            CaseStatus::Completed
        } else {
            CaseStatus::Ongoing
        };
        harness.db.seed_case(
            harness.user_id,
            CaseData {
                reference_id: format!("CASE-{i}"),
                case_type: "Conveyancing".to_string(),
                case_subtype: "Residential".to_string(),
                status,
                ..Default::default()
            },
        );
    }
    harness.cases.refresh().await.expect("cases");
    let cases = harness.cases.list().await;
    let dir = Directory {
        people: &[],
        cases: &cases,
        users: &[],
        language: harness.ctx.language,
    };
    let filter = CaseFilter {
        status: Some(CaseStatus::Completed),
        ..Default::default()
    };

    let completed = filter_cases(&cases, &filter, &registry(), &dir);
    assert_eq!(completed.len(), 3);
    assert!(completed.iter().all(|c| c.data.status == CaseStatus::Completed));
}

#[tokio::test]
async fn reminders_split_today_and_the_next_seven_days() {
    let harness = TestHarness::signed_in();
    let today = NaiveDate::from_ymd_opt(2025, 9, 1).expect("date");
    let day = |n: u64| today.checked_add_days(Days::new(n)).expect("date");

    for (offset, time) in [(0, "15:00"), (7, "10:00"), (8, "10:00")] {
        harness.db.seed_event(
            harness.user_id,
            EventData {
                title: Some(format!("day {offset}")),
                participants: vec![Participant {
                    person_id: None,
                    person_name: "Ms Lee".to_string(),
                }],
                date: day(offset),
                time: time.to_string(),
                location: String::new(),
                notes: String::new(),
                attendees: Vec::new(),
                case_id: None,
                visibility: Visibility::Private,
                shared_with: Vec::new(),
            },
        );
    }
    harness.db.seed_case(
        harness.user_id,
        CaseData {
            reference_id: "HCA 9/2025".to_string(),
            case_type: "Litigation".to_string(),
            case_subtype: "Civil".to_string(),
            fields: BTreeMap::from([
                ("Hearing Date".to_string(), day(0).format("%Y-%m-%d").to_string()),
                ("HearingDateTime".to_string(), "09:30".to_string()),
            ]),
            ..Default::default()
        },
    );
    harness.events.refresh_from(today).await.expect("events");
    harness.cases.refresh().await.expect("cases");

    let events = harness.events.list().await;
    let cases = harness.cases.list().await;
    let reminders = Reminders::build(&events, &cases, &registry(), today);

    assert_eq!(reminders.today.len(), 2);
    assert!(matches!(&reminders.today[0], ReminderItem::Case { time: Some(t), .. } if t == "09:30"));
    assert!(matches!(&reminders.today[1], ReminderItem::Event(e) if e.data.time == "15:00"));

    let dir = Directory {
        people: &[],
        cases: &cases,
        users: &[],
        language: harness.ctx.language,
    };
    let upcoming: Vec<_> = reminders.upcoming.iter().map(|i| i.title(&dir)).collect();
    assert_eq!(upcoming, vec!["day 7"]);
    assert_eq!(reminders.today[0].title(&dir), "[Litigation] - HCA 9/2025");
}
