use rusqlite::Connection;
use sectionvault_core::db::open_db_in_memory;
use sectionvault_core::{
    AccessGate, ActorId, ChangeAction, ChangeEvent, ChangeNotifier, FixedClock, MemoryNotifier,
    NoopNotifier, NotifyError, OwnerId, RepoError, RestoreRequest, SaveRequest, SectionKind,
    SectionService, SectionServiceError, SqliteSectionRepository,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[test]
fn first_save_creates_section_with_baseline_version() {
    let conn = open_db_in_memory().unwrap();
    let notifier = Arc::new(MemoryNotifier::new());
    let service = service_with(&conn, notifier.clone());
    let owner = Uuid::new_v4();
    let actor = Uuid::new_v4();

    let saved = service
        .save(&save_request(owner, SectionKind::Context, "A", actor))
        .unwrap();

    assert!(saved.changed());
    assert_eq!(saved.section.content, "A");
    assert_eq!(saved.section.title, "Context");
    let baseline = saved.archived.unwrap();
    assert_eq!(baseline.version_number, 1);
    assert_eq!(baseline.content, "A");
    assert_eq!(baseline.author_id, actor);

    let events = notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, ChangeAction::SectionUpdated);
    assert_eq!(events[0].version_number, 1);
    assert_eq!(events[0].actor_id, actor);
    assert_eq!(events[0].section_id, saved.section.id);
}

#[test]
fn scenario_a_archives_superseded_content() {
    let conn = open_db_in_memory().unwrap();
    let service = service_with(&conn, Arc::new(MemoryNotifier::new()));
    let owner = Uuid::new_v4();
    let actor = Uuid::new_v4();

    service
        .save(&save_request(owner, SectionKind::Scope, "A", actor))
        .unwrap();
    assert_eq!(history(&service, owner, SectionKind::Scope), vec![(1, "A".to_string())]);

    service
        .save(&save_request(owner, SectionKind::Scope, "B", actor))
        .unwrap();
    assert_eq!(
        history(&service, owner, SectionKind::Scope),
        vec![(1, "A".to_string()), (2, "A".to_string())]
    );

    service
        .save(&save_request(owner, SectionKind::Scope, "C", actor))
        .unwrap();
    assert_eq!(
        history(&service, owner, SectionKind::Scope),
        vec![
            (1, "A".to_string()),
            (2, "A".to_string()),
            (3, "B".to_string())
        ]
    );

    let listed = service.list_versions(owner, SectionKind::Scope).unwrap();
    assert_eq!(listed.current_content, "C");
    assert_eq!(listed.section.content, "C");
}

#[test]
fn list_versions_is_newest_first() {
    let conn = open_db_in_memory().unwrap();
    let service = service_with(&conn, Arc::new(MemoryNotifier::new()));
    let owner = Uuid::new_v4();
    let actor = Uuid::new_v4();

    for content in ["one", "two", "three", "four"] {
        service
            .save(&save_request(owner, SectionKind::Risks, content, actor))
            .unwrap();
    }

    let numbers: Vec<u32> = service
        .list_versions(owner, SectionKind::Risks)
        .unwrap()
        .versions
        .iter()
        .map(|version| version.version_number)
        .collect();
    assert_eq!(numbers, vec![4, 3, 2, 1]);
}

#[test]
fn scenario_c_saving_identical_content_is_a_no_op() {
    let conn = open_db_in_memory().unwrap();
    let notifier = Arc::new(MemoryNotifier::new());
    let service = service_with(&conn, notifier.clone());
    let owner = Uuid::new_v4();
    let actor = Uuid::new_v4();

    for content in ["A", "B", "C"] {
        service
            .save(&save_request(owner, SectionKind::Context, content, actor))
            .unwrap();
    }
    let before = service.list_versions(owner, SectionKind::Context).unwrap();
    let events_before = notifier.len();

    let again = service
        .save(&save_request(owner, SectionKind::Context, "C", actor))
        .unwrap();

    assert!(!again.changed());
    assert!(again.archived.is_none());
    assert_eq!(notifier.len(), events_before);
    let after = service.list_versions(owner, SectionKind::Context).unwrap();
    assert_eq!(after.versions, before.versions);
    assert_eq!(after.current_content, "C");
}

#[test]
fn repeated_identical_first_saves_archive_only_once() {
    let conn = open_db_in_memory().unwrap();
    let notifier = Arc::new(MemoryNotifier::new());
    let service = service_with(&conn, notifier.clone());
    let owner = Uuid::new_v4();
    let actor = Uuid::new_v4();

    service
        .save(&save_request(owner, SectionKind::Milestones, "same", actor))
        .unwrap();
    service
        .save(&save_request(owner, SectionKind::Milestones, "same", actor))
        .unwrap();

    assert_eq!(
        history(&service, owner, SectionKind::Milestones),
        vec![(1, "same".to_string())]
    );
    assert_eq!(notifier.len(), 1);
}

#[test]
fn unchanged_save_still_touches_metadata_and_updated_at() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteSectionRepository::try_new(&conn).unwrap();
    let owner = Uuid::new_v4();
    let actor = Uuid::new_v4();

    let first = SectionService::new(repo)
        .with_notifier(Arc::new(NoopNotifier))
        .with_clock(Arc::new(FixedClock(1_000)))
        .save(&SaveRequest {
            metadata: Some(json!({"links": ["https://a.test"]})),
            ..save_request(owner, SectionKind::Architecture, "body", actor)
        })
        .unwrap();
    assert_eq!(first.section.updated_at, 1_000);

    let repo = SqliteSectionRepository::try_new(&conn).unwrap();
    let second = SectionService::new(repo)
        .with_notifier(Arc::new(NoopNotifier))
        .with_clock(Arc::new(FixedClock(2_000)))
        .save(&SaveRequest {
            metadata: Some(json!({"links": ["https://b.test"]})),
            ..save_request(owner, SectionKind::Architecture, "body", actor)
        })
        .unwrap();

    assert!(!second.changed());
    assert_eq!(second.section.updated_at, 2_000);
    assert_eq!(second.section.created_at, 1_000);

    let repo = SqliteSectionRepository::try_new(&conn).unwrap();
    let stored = SectionService::new(repo)
        .get_section(owner, SectionKind::Architecture)
        .unwrap()
        .unwrap();
    assert_eq!(stored.metadata, Some(json!({"links": ["https://b.test"]})));
    assert_eq!(stored.updated_at, 2_000);
}

#[test]
fn save_without_metadata_keeps_stored_metadata() {
    let conn = open_db_in_memory().unwrap();
    let service = service_with(&conn, Arc::new(MemoryNotifier::new()));
    let owner = Uuid::new_v4();
    let actor = Uuid::new_v4();

    service
        .save(&SaveRequest {
            metadata: Some(json!({"figma": "https://f.test/1"})),
            ..save_request(owner, SectionKind::Context, "v1", actor)
        })
        .unwrap();
    let updated = service
        .save(&save_request(owner, SectionKind::Context, "v2", actor))
        .unwrap();

    assert_eq!(updated.section.metadata, Some(json!({"figma": "https://f.test/1"})));
    let stored = service
        .get_section(owner, SectionKind::Context)
        .unwrap()
        .unwrap();
    assert_eq!(stored.metadata, Some(json!({"figma": "https://f.test/1"})));
}

#[test]
fn changed_save_archives_previous_content_not_new_content() {
    let conn = open_db_in_memory().unwrap();
    let notifier = Arc::new(MemoryNotifier::new());
    let service = service_with(&conn, notifier.clone());
    let owner = Uuid::new_v4();
    let first_actor = Uuid::new_v4();
    let second_actor = Uuid::new_v4();

    service
        .save(&save_request(owner, SectionKind::Requirements, "draft", first_actor))
        .unwrap();
    let saved = service
        .save(&save_request(owner, SectionKind::Requirements, "final", second_actor))
        .unwrap();

    let archived = saved.archived.unwrap();
    assert_eq!(archived.content, "draft");
    assert_eq!(archived.version_number, 2);
    assert_eq!(archived.author_id, second_actor);
    assert_eq!(saved.section.content, "final");

    let event = saved.event.unwrap();
    assert_eq!(event.version_number, 2);
    assert_eq!(event.actor_id, second_actor);
    assert!(event.summary.contains("Requirements"));
    assert_eq!(notifier.events().last(), Some(&event));
}

#[test]
fn sections_are_isolated_per_owner_and_kind() {
    let conn = open_db_in_memory().unwrap();
    let service = service_with(&conn, Arc::new(MemoryNotifier::new()));
    let owner_a = Uuid::new_v4();
    let owner_b = Uuid::new_v4();
    let actor = Uuid::new_v4();

    service
        .save(&save_request(owner_a, SectionKind::Scope, "a-scope", actor))
        .unwrap();
    service
        .save(&save_request(owner_a, SectionKind::Scope, "a-scope-2", actor))
        .unwrap();
    service
        .save(&save_request(owner_a, SectionKind::Context, "a-context", actor))
        .unwrap();
    service
        .save(&save_request(owner_b, SectionKind::Scope, "b-scope", actor))
        .unwrap();

    assert_eq!(history(&service, owner_a, SectionKind::Scope).len(), 2);
    assert_eq!(history(&service, owner_a, SectionKind::Context).len(), 1);
    assert_eq!(
        history(&service, owner_b, SectionKind::Scope),
        vec![(1, "b-scope".to_string())]
    );

    let kinds: Vec<SectionKind> = service
        .list_sections(owner_a)
        .unwrap()
        .into_iter()
        .map(|section| section.kind)
        .collect();
    assert_eq!(kinds, vec![SectionKind::Context, SectionKind::Scope]);
}

#[test]
fn version_numbers_stay_contiguous_over_many_edits() {
    let conn = open_db_in_memory().unwrap();
    let service = service_with(&conn, Arc::new(MemoryNotifier::new()));
    let owner = Uuid::new_v4();
    let actor = Uuid::new_v4();

    for idx in 0..25 {
        // Every third save repeats the previous content.
        let content = format!("edit {}", idx - idx % 3);
        service
            .save(&save_request(owner, SectionKind::Scope, &content, actor))
            .unwrap();
        let mut numbers: Vec<u32> = history(&service, owner, SectionKind::Scope)
            .into_iter()
            .map(|(number, _)| number)
            .collect();
        numbers.sort_unstable();
        let expected: Vec<u32> = (1..=numbers.len() as u32).collect();
        assert_eq!(numbers, expected);
    }
}

#[test]
fn list_versions_for_unknown_section_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let service = service_with(&conn, Arc::new(MemoryNotifier::new()));
    let owner = Uuid::new_v4();

    let err = service
        .list_versions(owner, SectionKind::Context)
        .unwrap_err();
    assert!(matches!(
        err,
        SectionServiceError::SectionNotFound { owner_id, kind }
            if owner_id == owner && kind == SectionKind::Context
    ));
}

#[test]
fn gate_refusal_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let notifier = Arc::new(MemoryNotifier::new());
    let repo = SqliteSectionRepository::try_new(&conn).unwrap();
    let allowed_owner = Uuid::new_v4();
    let service = SectionService::new(repo)
        .with_notifier(notifier.clone())
        .with_gate(Arc::new(OnlyOwner(allowed_owner)));
    let other_owner = Uuid::new_v4();
    let actor = Uuid::new_v4();

    let err = service
        .save(&save_request(other_owner, SectionKind::Scope, "nope", actor))
        .unwrap_err();

    assert!(matches!(err, SectionServiceError::NotAuthorized { .. }));
    assert_eq!(err.code(), "not_authorized");
    assert!(service
        .get_section(other_owner, SectionKind::Scope)
        .unwrap()
        .is_none());
    assert!(notifier.is_empty());

    service
        .save(&save_request(allowed_owner, SectionKind::Scope, "ok", actor))
        .unwrap();
}

#[test]
fn notifier_failure_does_not_roll_back_the_save() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteSectionRepository::try_new(&conn).unwrap();
    let service = SectionService::new(repo).with_notifier(Arc::new(FailingNotifier));
    let owner = Uuid::new_v4();
    let actor = Uuid::new_v4();

    service
        .save(&save_request(owner, SectionKind::Context, "A", actor))
        .unwrap();
    let saved = service
        .save(&save_request(owner, SectionKind::Context, "B", actor))
        .unwrap();

    assert!(saved.changed());
    assert_eq!(
        history(&service, owner, SectionKind::Context),
        vec![(1, "A".to_string()), (2, "A".to_string())]
    );
    let current = service
        .get_section(owner, SectionKind::Context)
        .unwrap()
        .unwrap();
    assert_eq!(current.content, "B");
}

#[test]
fn storage_failure_mid_transaction_leaves_no_partial_write() {
    let conn = open_db_in_memory().unwrap();
    let notifier = Arc::new(MemoryNotifier::new());
    let service = service_with(&conn, notifier.clone());
    let owner = Uuid::new_v4();
    let actor = Uuid::new_v4();

    service
        .save(&save_request(owner, SectionKind::Scope, "A", actor))
        .unwrap();
    service
        .save(&save_request(owner, SectionKind::Scope, "B", actor))
        .unwrap();
    let baseline_id = service
        .list_versions(owner, SectionKind::Scope)
        .unwrap()
        .versions
        .into_iter()
        .find(|version| version.version_number == 1)
        .unwrap()
        .id;
    let events_before = notifier.len();

    // The archive insert succeeds, then the content update aborts.
    conn.execute_batch(
        "CREATE TRIGGER fail_content_update
         BEFORE UPDATE OF content ON sections
         BEGIN
             SELECT RAISE(ABORT, 'content column locked');
         END;",
    )
    .unwrap();

    let err = service
        .save(&save_request(owner, SectionKind::Scope, "C", actor))
        .unwrap_err();
    assert!(
        matches!(err, SectionServiceError::Storage(RepoError::Db(_))),
        "{err:?}"
    );
    assert_eq!(err.code(), "storage_error");
    assert!(!err.is_retryable());

    let err = service
        .restore(&RestoreRequest {
            owner_id: owner,
            kind: SectionKind::Scope,
            version_id: baseline_id,
            actor_id: actor,
        })
        .unwrap_err();
    assert!(
        matches!(err, SectionServiceError::Storage(RepoError::Db(_))),
        "{err:?}"
    );

    assert_eq!(
        history(&service, owner, SectionKind::Scope),
        vec![(1, "A".to_string()), (2, "A".to_string())]
    );
    let listed = service.list_versions(owner, SectionKind::Scope).unwrap();
    assert_eq!(listed.current_content, "B");
    assert_eq!(notifier.len(), events_before);
}

#[test]
fn repository_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    let err = SqliteSectionRepository::try_new(&conn).err().unwrap();
    assert!(err.to_string().contains("schema version"));
}

struct OnlyOwner(OwnerId);

impl AccessGate for OnlyOwner {
    fn is_authorized(&self, _actor_id: ActorId, owner_id: OwnerId) -> bool {
        owner_id == self.0
    }
}

struct FailingNotifier;

impl ChangeNotifier for FailingNotifier {
    fn notify(&self, _event: &ChangeEvent) -> Result<(), NotifyError> {
        Err(NotifyError("activity feed offline".to_string()))
    }
}

fn service_with(
    conn: &Connection,
    notifier: Arc<MemoryNotifier>,
) -> SectionService<SqliteSectionRepository<'_>> {
    let repo = SqliteSectionRepository::try_new(conn).unwrap();
    SectionService::new(repo).with_notifier(notifier)
}

fn save_request(owner: OwnerId, kind: SectionKind, content: &str, actor: ActorId) -> SaveRequest {
    SaveRequest {
        owner_id: owner,
        kind,
        content: content.to_string(),
        metadata: None,
        actor_id: actor,
    }
}

/// Returns `(version_number, content)` pairs in ascending number order.
fn history(
    service: &SectionService<SqliteSectionRepository<'_>>,
    owner: OwnerId,
    kind: SectionKind,
) -> Vec<(u32, String)> {
    let mut versions: Vec<(u32, String)> = service
        .list_versions(owner, kind)
        .unwrap()
        .versions
        .into_iter()
        .map(|version| (version.version_number, version.content))
        .collect();
    versions.sort_by_key(|(number, _)| *number);
    versions
}
