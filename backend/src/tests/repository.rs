// Repository tests against a real Postgres, exercising the
// (workspace_id, email) dedup invariant and the append-only event log.

use serde_json::{json, Map, Value};

use leadflow_shared::LeadSourceType;

use super::{seed_workspace, test_pool};
use crate::leads::{extract, FindOrCreateOutcome, LeadRepository, ManualLead, SourceMeta};

fn submission(pairs: &[(&str, &str)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

fn form_source() -> SourceMeta {
    SourceMeta {
        source_type: LeadSourceType::Form,
        source_id: Some(uuid::Uuid::new_v4()),
        utm: None,
    }
}

#[tokio::test]
async fn duplicate_submission_reuses_the_lead() {
    let Some(pool) = test_pool().await else { return };
    let workspace_id = seed_workspace(&pool).await;
    let repo = LeadRepository::new(pool);

    let first = submission(&[("email", "carlos@acme.io"), ("name", "Carlos")]);
    let extracted = extract(&first, None);
    let outcome = repo
        .find_or_create(workspace_id, &extracted, &first, &form_source())
        .await
        .unwrap();
    let lead = match outcome {
        FindOrCreateOutcome::Created(lead) => lead,
        other => panic!("expected Created, got {:?}", other),
    };
    assert_eq!(lead.email, "carlos@acme.io");
    assert_eq!(lead.name.as_deref(), Some("Carlos"));

    // Same email, different casing and different name. The existing
    // record keeps its fields and score; only a form_submit event is
    // appended.
    let second = submission(&[("email", "CARLOS@acme.io"), ("name", "Carlos Silva")]);
    let extracted = extract(&second, None);
    let outcome = repo
        .find_or_create(workspace_id, &extracted, &second, &form_source())
        .await
        .unwrap();
    let existing = match outcome {
        FindOrCreateOutcome::Existing(existing) => existing,
        other => panic!("expected Existing, got {:?}", other),
    };
    assert_eq!(existing.id, lead.id);
    assert_eq!(existing.name.as_deref(), Some("Carlos"));
    assert_eq!(existing.score, lead.score);

    let events = repo.events(lead.id).await.unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    // Newest first. Both submissions logged a form_submit, the creating
    // one included.
    assert_eq!(
        types,
        vec!["form_submit", "form_submit", "score_calculated", "created"]
    );
}

#[tokio::test]
async fn lost_creation_race_recovers_as_existing() {
    let Some(pool) = test_pool().await else { return };
    let workspace_id = seed_workspace(&pool).await;
    let repo = LeadRepository::new(pool);

    let data = submission(&[("email", "race@acme.io"), ("name", "Rita")]);
    let extracted = extract(&data, None);
    let created = repo
        .find_or_create(workspace_id, &extracted, &data, &form_source())
        .await
        .unwrap();
    let lead = match created {
        FindOrCreateOutcome::Created(lead) => lead,
        other => panic!("expected Created, got {:?}", other),
    };

    // A second writer that missed the find sees the unique violation on
    // insert and must fall back to the update path.
    let outcome = repo
        .insert_or_recover(workspace_id, "race@acme.io", &extracted, &data, &form_source())
        .await
        .unwrap();
    let recovered = match outcome {
        FindOrCreateOutcome::Existing(existing) => existing,
        other => panic!("expected Existing, got {:?}", other),
    };
    assert_eq!(recovered.id, lead.id);

    let events = repo.events(lead.id).await.unwrap();
    let submits = events
        .iter()
        .filter(|e| e.event_type.as_str() == "form_submit")
        .count();
    assert_eq!(submits, 2);
}

#[tokio::test]
async fn same_email_in_another_workspace_creates_a_second_lead() {
    let Some(pool) = test_pool().await else { return };
    let ws_a = seed_workspace(&pool).await;
    let ws_b = seed_workspace(&pool).await;
    let repo = LeadRepository::new(pool);

    let data = submission(&[("email", "dup@acme.io")]);
    let extracted = extract(&data, None);

    let a = repo
        .find_or_create(ws_a, &extracted, &data, &form_source())
        .await
        .unwrap();
    let b = repo
        .find_or_create(ws_b, &extracted, &data, &form_source())
        .await
        .unwrap();

    match (a, b) {
        (FindOrCreateOutcome::Created(a), FindOrCreateOutcome::Created(b)) => {
            assert_ne!(a.id, b.id);
        }
        other => panic!("expected two creations, got {:?}", other),
    }
}

#[tokio::test]
async fn submission_without_email_is_skipped() {
    let Some(pool) = test_pool().await else { return };
    let workspace_id = seed_workspace(&pool).await;
    let repo = LeadRepository::new(pool);

    let data = submission(&[("message", "call me maybe")]);
    let extracted = extract(&data, None);
    let outcome = repo
        .find_or_create(workspace_id, &extracted, &data, &form_source())
        .await
        .unwrap();
    assert!(matches!(outcome, FindOrCreateOutcome::SkippedNoIdentity));
}

#[tokio::test]
async fn manual_creation_respects_the_email_uniqueness_guard() {
    let Some(pool) = test_pool().await else { return };
    let workspace_id = seed_workspace(&pool).await;
    let repo = LeadRepository::new(pool);

    let entry = ManualLead {
        email: "Manual@Acme.io".to_string(),
        name: Some("Manual Entry".to_string()),
        phone: None,
        company: Some("Acme".to_string()),
        job_title: Some("Founder".to_string()),
    };

    let lead = repo
        .create_manual(workspace_id, &entry)
        .await
        .unwrap()
        .expect("first creation succeeds");
    assert_eq!(lead.email, "manual@acme.io");
    assert_eq!(lead.source_type, "manual");
    // Corporate email, company, title and decision-maker keyword.
    assert_eq!(lead.score, 50);

    let duplicate = repo.create_manual(workspace_id, &entry).await.unwrap();
    assert!(duplicate.is_none());
}

#[tokio::test]
async fn tag_union_status_and_score_mutations_are_logged() {
    let Some(pool) = test_pool().await else { return };
    let workspace_id = seed_workspace(&pool).await;
    let repo = LeadRepository::new(pool);

    let data = submission(&[("email", "mut@acme.io")]);
    let extracted = extract(&data, None);
    let lead = match repo
        .find_or_create(workspace_id, &extracted, &data, &form_source())
        .await
        .unwrap()
    {
        FindOrCreateOutcome::Created(lead) => lead,
        other => panic!("expected Created, got {:?}", other),
    };

    let tagged = repo
        .add_tags(lead.id, &["vip".to_string(), "vip".to_string(), "br".to_string()])
        .await
        .unwrap();
    let mut tags = tagged.tags.clone();
    tags.sort();
    assert_eq!(tags, vec!["br", "vip"]);

    let untagged = repo.remove_tag(lead.id, "br").await.unwrap();
    assert_eq!(untagged.tags, vec!["vip"]);

    let moved = repo.set_status(lead.id, "Contacted").await.unwrap();
    assert_eq!(moved.status, "Contacted");

    let rescored = repo
        .override_score(lead.id, 150, "manual review")
        .await
        .unwrap();
    // Clamped into range.
    assert_eq!(rescored.score, 100);

    let events = repo.events(lead.id).await.unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(
        types,
        vec![
            "score_manual_update",
            "status_changed",
            "tag_removed",
            "tags_added",
            "score_calculated",
            "created",
        ]
    );

    let status_event = events
        .iter()
        .find(|e| e.event_type == "status_changed")
        .unwrap();
    assert_eq!(status_event.payload["from"], json!("New"));
    assert_eq!(status_event.payload["to"], json!("Contacted"));
}
