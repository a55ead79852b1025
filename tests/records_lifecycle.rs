use gradebookd::calc::{CurriculumType, GradeInput, IgcseInput, ScoreUpdate, StandardInput};
use gradebookd::config::GradingConfig;
use gradebookd::db;
use gradebookd::records::{
    apply_batch, apply_to_record, apply_transition, create_record, get_record, list_records,
    NewGradeRecord, RecordFilter,
};
use gradebookd::workflow::{Actor, GradeStatus, Role, WorkflowError, WorkflowEvent};
use rusqlite::Connection;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn teacher() -> Actor {
    Actor::new("teacher-1", Role::Teacher)
}

fn principal() -> Actor {
    Actor::new("principal-1", Role::Principal)
}

fn standard(score: Option<f64>) -> GradeInput {
    GradeInput::Standard(StandardInput {
        score,
        max_score: 50.0,
    })
}

fn new_record(exam: &str, input: GradeInput) -> NewGradeRecord {
    NewGradeRecord {
        student_id: Some("student-1".to_string()),
        subject_id: Some("math".to_string()),
        exam_id: Some(exam.to_string()),
        input,
    }
}

fn open(prefix: &str) -> (PathBuf, Connection) {
    gradebookd::logging::init_test();
    let workspace = temp_dir(prefix);
    let conn = db::open_db(&workspace).expect("open db");
    (workspace, conn)
}

fn pending_record(conn: &Connection, cfg: &GradingConfig) -> String {
    let rec = create_record(conn, &new_record("term1", standard(Some(42.0))), &teacher(), cfg)
        .expect("create");
    let outcome = apply_batch(conn, &[rec.id.clone()], &WorkflowEvent::Submit, &teacher(), cfg);
    assert!(outcome.success, "{:?}", outcome.errors);
    rec.id
}

#[test]
fn create_stores_draft_with_calculated_result() {
    let (workspace, conn) = open("gradebook-records-create");
    let cfg = GradingConfig::default();

    let rec = create_record(&conn, &new_record("term1", standard(Some(42.0))), &teacher(), &cfg)
        .expect("create");
    assert_eq!(rec.status, GradeStatus::Draft);
    assert_eq!(rec.curriculum_type, CurriculumType::Standard);
    assert_eq!(rec.created_by, "teacher-1");
    assert!(rec.result.is_valid);
    assert_eq!(rec.result.percentage, Some(84.0));
    assert_eq!(rec.result.letter_grade.as_deref(), Some("A"));

    let loaded = get_record(&conn, &rec.id).expect("get");
    assert_eq!(loaded, rec);

    let parent = Actor::new("parent-1", Role::Parent);
    let err = create_record(&conn, &new_record("term1", standard(Some(1.0))), &parent, &cfg)
        .unwrap_err();
    assert_eq!(err.code(), "forbidden");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn full_lifecycle_with_override() {
    let (workspace, conn) = open("gradebook-records-lifecycle");
    let cfg = GradingConfig::default();
    let id = pending_record(&conn, &cfg);

    let submitted = get_record(&conn, &id).expect("get");
    assert_eq!(submitted.status, GradeStatus::PendingApproval);
    assert_eq!(submitted.submitted_by.as_deref(), Some("teacher-1"));
    assert!(submitted.submitted_at.is_some());

    let outcome = apply_batch(
        &conn,
        &[id.clone()],
        &WorkflowEvent::Approve {
            notes: Some("checked".to_string()),
        },
        &principal(),
        &cfg,
    );
    assert_eq!(outcome.affected_count, 1);

    let approved = apply_to_record(
        &conn,
        &id,
        &WorkflowEvent::Override {
            scores: ScoreUpdate {
                score: Some(46.0),
                ..ScoreUpdate::default()
            },
            note: Some("re-marked question 4".to_string()),
        },
        &principal(),
        &cfg,
    )
    .expect("override");
    assert_eq!(approved.status, GradeStatus::Approved);
    // Only the score was sent; the stored maximum of 50 still applies.
    assert_eq!(
        approved.input,
        GradeInput::Standard(StandardInput {
            score: Some(46.0),
            max_score: 50.0
        })
    );
    assert_eq!(approved.result.max_score, 50.0);
    assert_eq!(approved.result.percentage, Some(92.0));
    assert_eq!(approved.result.letter_grade.as_deref(), Some("A+"));
    assert_eq!(approved.approved_by.as_deref(), Some("principal-1"));
    assert_eq!(approved.principal_notes.as_deref(), Some("checked"));
    assert_eq!(approved.overridden_by.as_deref(), Some("principal-1"));
    assert_eq!(approved.override_note.as_deref(), Some("re-marked question 4"));

    let outcome = apply_batch(&conn, &[id.clone()], &WorkflowEvent::Release, &principal(), &cfg);
    assert!(outcome.success);
    let released = get_record(&conn, &id).expect("get");
    assert_eq!(released.status, GradeStatus::Released);
    assert!(released.released_at.is_some());

    let err = apply_to_record(
        &conn,
        &id,
        &WorkflowEvent::Override {
            scores: ScoreUpdate {
                score: Some(10.0),
                ..ScoreUpdate::default()
            },
            note: None,
        },
        &principal(),
        &cfg,
    )
    .unwrap_err();
    assert_eq!(err.code(), "illegal_transition");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn reject_without_reason_leaves_record_untouched() {
    let (workspace, conn) = open("gradebook-records-reject");
    let cfg = GradingConfig::default();
    let id = pending_record(&conn, &cfg);
    let before = get_record(&conn, &id).expect("get");

    let outcome = apply_batch(
        &conn,
        &[id.clone()],
        &WorkflowEvent::Reject {
            reason: "  ".to_string(),
        },
        &principal(),
        &cfg,
    );
    assert!(!outcome.success);
    assert_eq!(outcome.affected_count, 0);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].code, "missing_reason");
    assert_eq!(get_record(&conn, &id).expect("get"), before);

    let outcome = apply_batch(
        &conn,
        &[id.clone()],
        &WorkflowEvent::Reject {
            reason: "wrong paper".to_string(),
        },
        &principal(),
        &cfg,
    );
    assert!(outcome.success);
    let rejected = get_record(&conn, &id).expect("get");
    assert_eq!(rejected.status, GradeStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("wrong paper"));

    // Re-entry path: revise then resubmit.
    let revised = apply_to_record(
        &conn,
        &id,
        &WorkflowEvent::Revise {
            input: standard(Some(30.0)),
        },
        &teacher(),
        &cfg,
    )
    .expect("revise");
    assert_eq!(revised.status, GradeStatus::Draft);
    assert_eq!(revised.result.percentage, Some(60.0));
    let outcome = apply_batch(&conn, &[id.clone()], &WorkflowEvent::Submit, &teacher(), &cfg);
    assert!(outcome.success);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn concurrent_approvals_have_one_winner() {
    let (workspace, conn) = open("gradebook-records-race");
    let cfg = GradingConfig::default();
    let id = pending_record(&conn, &cfg);

    // Both callers read the record while it is still pending.
    let snapshot_a = get_record(&conn, &id).expect("snapshot a");
    let snapshot_b = get_record(&conn, &id).expect("snapshot b");
    let event = WorkflowEvent::Approve { notes: None };

    let first = apply_transition(&conn, &snapshot_a, &event, &principal(), &cfg);
    let second = apply_transition(&conn, &snapshot_b, &event, &principal(), &cfg);

    assert!(first.is_ok());
    assert_eq!(
        second.unwrap_err(),
        WorkflowError::StaleState {
            id: id.clone(),
            expected: GradeStatus::PendingApproval
        }
    );
    assert_eq!(get_record(&conn, &id).expect("get").status, GradeStatus::Approved);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn batch_reports_partial_success() {
    let (workspace, conn) = open("gradebook-records-batch");
    let cfg = GradingConfig::default();

    let ok_id = pending_record(&conn, &cfg);
    let draft = create_record(&conn, &new_record("term1", standard(Some(20.0))), &teacher(), &cfg)
        .expect("draft");
    let ids = vec![ok_id.clone(), draft.id.clone(), "missing-id".to_string()];

    let outcome = apply_batch(
        &conn,
        &ids,
        &WorkflowEvent::Approve { notes: None },
        &principal(),
        &cfg,
    );
    assert!(!outcome.success);
    assert_eq!(outcome.affected_count, 1);
    assert_eq!(outcome.errors.len(), 2);
    assert!(outcome
        .errors
        .iter()
        .any(|e| e.record_id == draft.id && e.code == "illegal_transition"));
    assert!(outcome
        .errors
        .iter()
        .any(|e| e.record_id == "missing-id" && e.code == "not_found"));

    assert_eq!(get_record(&conn, &ok_id).expect("get").status, GradeStatus::Approved);
    assert_eq!(get_record(&conn, &draft.id).expect("get").status, GradeStatus::Draft);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn ungraded_draft_cannot_be_submitted() {
    let (workspace, conn) = open("gradebook-records-ungraded");
    let cfg = GradingConfig::default();

    let rec = create_record(&conn, &new_record("term1", standard(None)), &teacher(), &cfg)
        .expect("create");
    assert!(!rec.result.is_valid);
    assert_eq!(rec.result.error.as_deref(), Some("Score is required"));

    let outcome = apply_batch(&conn, &[rec.id.clone()], &WorkflowEvent::Submit, &teacher(), &cfg);
    assert_eq!(outcome.errors[0].code, "invalid_grade");
    assert_eq!(get_record(&conn, &rec.id).expect("get").status, GradeStatus::Draft);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn list_filters_by_status_and_exam() {
    let (workspace, conn) = open("gradebook-records-list");
    let cfg = GradingConfig::default();

    let _pending = pending_record(&conn, &cfg);
    create_record(&conn, &new_record("term2", standard(Some(10.0))), &teacher(), &cfg)
        .expect("term2 draft");
    create_record(
        &conn,
        &new_record(
            "term2",
            GradeInput::Igcse(IgcseInput {
                coursework_score: Some(80.0),
                exam_score: Some(60.0),
                coursework_weight: None,
                exam_weight: None,
            }),
        ),
        &teacher(),
        &cfg,
    )
    .expect("igcse draft");

    let all = list_records(&conn, &RecordFilter::default()).expect("list");
    assert_eq!(all.len(), 3);

    let drafts = list_records(
        &conn,
        &RecordFilter {
            status: Some(GradeStatus::Draft),
            ..RecordFilter::default()
        },
    )
    .expect("list drafts");
    assert_eq!(drafts.len(), 2);

    let term2 = list_records(
        &conn,
        &RecordFilter {
            exam_id: Some("term2".to_string()),
            ..RecordFilter::default()
        },
    )
    .expect("list term2");
    assert_eq!(term2.len(), 2);
    let igcse = term2
        .iter()
        .find(|r| r.curriculum_type == CurriculumType::Igcse)
        .expect("igcse record");
    assert_eq!(igcse.result.letter_grade.as_deref(), Some("C"));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn cbc_entry_in_common_shape_is_stored_valid() {
    let (workspace, conn) = open("gradebook-records-cbc");
    let cfg = GradingConfig::default();

    let new: NewGradeRecord = serde_json::from_value(serde_json::json!({
        "studentId": "student-2",
        "input": { "curriculumType": "cbc", "score": 85, "maxScore": 100 }
    }))
    .expect("parse new record");
    let rec = create_record(&conn, &new, &teacher(), &cfg).expect("create");
    assert!(rec.result.is_valid, "{:?}", rec.result.error);
    assert_eq!(rec.result.percentage, Some(85.0));
    assert_eq!(
        rec.result.cbc_performance_level,
        Some(gradebookd::calc::PerformanceLevel::EE)
    );

    let _ = std::fs::remove_dir_all(workspace);
}
