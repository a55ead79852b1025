use chrono::Utc;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::calc::{self, CurriculumType, GradeInput, GradeResult, PerformanceLevel};
use crate::config::GradingConfig;
use crate::stats::GradeSample;
use crate::workflow::{self, Actor, GradeStatus, RecordState, Transition, WorkflowError, WorkflowEvent};

const RECORD_COLUMNS: &str = "id, student_id, subject_id, exam_id, curriculum_type, input_json,
     score, max_score, percentage, letter_grade, cbc_performance_level, is_valid, error,
     status, created_by, created_at, submitted_by, submitted_at, approved_by, approved_at,
     principal_notes, rejected_by, rejected_at, rejection_reason, overridden_by, overridden_at,
     override_note, released_by, released_at, updated_at";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    pub id: String,
    pub student_id: Option<String>,
    pub subject_id: Option<String>,
    pub exam_id: Option<String>,
    pub curriculum_type: CurriculumType,
    pub input: GradeInput,
    pub result: GradeResult,
    pub status: GradeStatus,
    pub created_by: String,
    pub created_at: String,
    pub submitted_by: Option<String>,
    pub submitted_at: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<String>,
    pub principal_notes: Option<String>,
    pub rejected_by: Option<String>,
    pub rejected_at: Option<String>,
    pub rejection_reason: Option<String>,
    pub overridden_by: Option<String>,
    pub overridden_at: Option<String>,
    pub override_note: Option<String>,
    pub released_by: Option<String>,
    pub released_at: Option<String>,
    pub updated_at: String,
}

impl GradeRecord {
    pub fn state(&self) -> RecordState<'_> {
        RecordState {
            status: self.status,
            input: &self.input,
            created_by: &self.created_by,
            is_valid: self.result.is_valid,
        }
    }
}

impl From<&GradeRecord> for GradeSample {
    fn from(r: &GradeRecord) -> Self {
        GradeSample::from(&r.result)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGradeRecord {
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub exam_id: Option<String>,
    pub input: GradeInput,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFilter {
    #[serde(default)]
    pub status: Option<GradeStatus>,
    #[serde(default)]
    pub exam_id: Option<String>,
    #[serde(default)]
    pub subject_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemError {
    pub record_id: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub success: bool,
    pub affected_count: usize,
    pub errors: Vec<BatchItemError>,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

fn parse_column<T: FromStr<Err = String>>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn map_record(r: &Row<'_>) -> rusqlite::Result<GradeRecord> {
    let curriculum_raw: String = r.get(4)?;
    let input_raw: String = r.get(5)?;
    let input: GradeInput = serde_json::from_str(&input_raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    let level_raw: Option<String> = r.get(10)?;
    let cbc_performance_level = match level_raw {
        Some(code) => Some(PerformanceLevel::from_code(&code).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                10,
                Type::Text,
                format!("unknown performance level: {}", code).into(),
            )
        })?),
        None => None,
    };
    let status_raw: String = r.get(13)?;

    Ok(GradeRecord {
        id: r.get(0)?,
        student_id: r.get(1)?,
        subject_id: r.get(2)?,
        exam_id: r.get(3)?,
        curriculum_type: parse_column(4, &curriculum_raw)?,
        input,
        result: GradeResult {
            score: r.get(6)?,
            max_score: r.get(7)?,
            percentage: r.get(8)?,
            letter_grade: r.get(9)?,
            cbc_performance_level,
            is_valid: r.get::<_, i64>(11)? != 0,
            error: r.get(12)?,
        },
        status: parse_column(13, &status_raw)?,
        created_by: r.get(14)?,
        created_at: r.get(15)?,
        submitted_by: r.get(16)?,
        submitted_at: r.get(17)?,
        approved_by: r.get(18)?,
        approved_at: r.get(19)?,
        principal_notes: r.get(20)?,
        rejected_by: r.get(21)?,
        rejected_at: r.get(22)?,
        rejection_reason: r.get(23)?,
        overridden_by: r.get(24)?,
        overridden_at: r.get(25)?,
        override_note: r.get(26)?,
        released_by: r.get(27)?,
        released_at: r.get(28)?,
        updated_at: r.get(29)?,
    })
}

fn input_json(input: &GradeInput) -> Result<String, WorkflowError> {
    serde_json::to_string(input).map_err(|e| WorkflowError::Storage(e.to_string()))
}

/// Stores a new draft. The result is kept even when invalid (e.g. a score
/// not yet entered); submission is what requires a valid grade.
pub fn create_record(
    conn: &Connection,
    new: &NewGradeRecord,
    actor: &Actor,
    config: &GradingConfig,
) -> Result<GradeRecord, WorkflowError> {
    if !actor.role.can_enter_grades() {
        return Err(WorkflowError::Forbidden {
            role: actor.role.as_str(),
            event: "create",
        });
    }

    let id = Uuid::new_v4().to_string();
    let result = calc::calculate_grade_with(&new.input, config);
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO grade_records(
            id, student_id, subject_id, exam_id, curriculum_type, input_json,
            score, max_score, percentage, letter_grade, cbc_performance_level, is_valid, error,
            status, created_by, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            id,
            new.student_id,
            new.subject_id,
            new.exam_id,
            new.input.curriculum().as_str(),
            input_json(&new.input)?,
            result.score,
            result.max_score,
            result.percentage,
            result.letter_grade,
            result.cbc_performance_level.map(PerformanceLevel::as_str),
            result.is_valid as i64,
            result.error,
            GradeStatus::Draft.as_str(),
            actor.id,
            now,
            now,
        ],
    )?;
    tracing::info!(record_id = %id, actor = %actor.id, valid = result.is_valid, "grade record created");

    get_record(conn, &id)
}

pub fn find_record(conn: &Connection, id: &str) -> Result<Option<GradeRecord>, WorkflowError> {
    let sql = format!("SELECT {} FROM grade_records WHERE id = ?", RECORD_COLUMNS);
    Ok(conn.query_row(&sql, [id], map_record).optional()?)
}

pub fn get_record(conn: &Connection, id: &str) -> Result<GradeRecord, WorkflowError> {
    find_record(conn, id)?.ok_or_else(|| WorkflowError::NotFound(id.to_string()))
}

pub fn list_records(
    conn: &Connection,
    filter: &RecordFilter,
) -> Result<Vec<GradeRecord>, WorkflowError> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();
    if let Some(status) = filter.status {
        clauses.push("status = ?");
        bind_values.push(Value::Text(status.as_str().to_string()));
    }
    if let Some(exam_id) = &filter.exam_id {
        clauses.push("exam_id = ?");
        bind_values.push(Value::Text(exam_id.clone()));
    }
    if let Some(subject_id) = &filter.subject_id {
        clauses.push("subject_id = ?");
        bind_values.push(Value::Text(subject_id.clone()));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {} FROM grade_records {} ORDER BY created_at, id",
        RECORD_COLUMNS, where_sql
    );

    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params_from_iter(bind_values), map_record)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(records)
}

fn persist(
    conn: &Connection,
    snapshot: &GradeRecord,
    transition: &Transition,
    event: &WorkflowEvent,
    actor: &Actor,
) -> Result<usize, WorkflowError> {
    let now = now_rfc3339();
    let id = snapshot.id.as_str();
    let from = transition.from.as_str();
    let to = transition.to.as_str();
    let input = transition.input.as_ref().unwrap_or(&snapshot.input);
    let result = transition.result.as_ref().unwrap_or(&snapshot.result);
    let level = result.cbc_performance_level.map(PerformanceLevel::as_str);

    let changed = match event {
        WorkflowEvent::Revise { .. } => conn.execute(
            "UPDATE grade_records SET
               status = ?, input_json = ?, score = ?, max_score = ?, percentage = ?,
               letter_grade = ?, cbc_performance_level = ?, is_valid = ?, error = ?, updated_at = ?
             WHERE id = ? AND status = ?",
            params![
                to,
                input_json(input)?,
                result.score,
                result.max_score,
                result.percentage,
                result.letter_grade,
                level,
                result.is_valid as i64,
                result.error,
                now,
                id,
                from,
            ],
        )?,
        WorkflowEvent::Submit => conn.execute(
            "UPDATE grade_records SET status = ?, submitted_by = ?, submitted_at = ?, updated_at = ?
             WHERE id = ? AND status = ?",
            params![to, actor.id, now, now, id, from],
        )?,
        WorkflowEvent::Approve { notes } => conn.execute(
            "UPDATE grade_records SET
               status = ?, approved_by = ?, approved_at = ?, principal_notes = ?, updated_at = ?
             WHERE id = ? AND status = ?",
            params![to, actor.id, now, notes, now, id, from],
        )?,
        WorkflowEvent::Reject { reason } => conn.execute(
            "UPDATE grade_records SET
               status = ?, rejected_by = ?, rejected_at = ?, rejection_reason = ?, updated_at = ?
             WHERE id = ? AND status = ?",
            params![to, actor.id, now, reason.trim(), now, id, from],
        )?,
        WorkflowEvent::Override { note, .. } => conn.execute(
            "UPDATE grade_records SET
               status = ?, input_json = ?, score = ?, max_score = ?, percentage = ?,
               letter_grade = ?, cbc_performance_level = ?, is_valid = ?, error = ?,
               overridden_by = ?, overridden_at = ?, override_note = ?, updated_at = ?
             WHERE id = ? AND status = ?",
            params![
                to,
                input_json(input)?,
                result.score,
                result.max_score,
                result.percentage,
                result.letter_grade,
                level,
                result.is_valid as i64,
                result.error,
                actor.id,
                now,
                note,
                now,
                id,
                from,
            ],
        )?,
        WorkflowEvent::Release => conn.execute(
            "UPDATE grade_records SET status = ?, released_by = ?, released_at = ?, updated_at = ?
             WHERE id = ? AND status = ?",
            params![to, actor.id, now, now, id, from],
        )?,
    };
    Ok(changed)
}

/// Transitions `snapshot` and writes the outcome only if the stored status
/// still equals the snapshot's. A concurrent writer that got there first
/// turns this call into `StaleState`.
pub fn apply_transition(
    conn: &Connection,
    snapshot: &GradeRecord,
    event: &WorkflowEvent,
    actor: &Actor,
    config: &GradingConfig,
) -> Result<GradeRecord, WorkflowError> {
    let transition = workflow::transition(&snapshot.state(), event, actor, config)?;
    let changed = persist(conn, snapshot, &transition, event, actor)?;
    if changed == 0 {
        if find_record(conn, &snapshot.id)?.is_none() {
            return Err(WorkflowError::NotFound(snapshot.id.clone()));
        }
        return Err(WorkflowError::StaleState {
            id: snapshot.id.clone(),
            expected: transition.from,
        });
    }

    tracing::info!(
        record_id = %snapshot.id,
        event = event.name(),
        from = %transition.from,
        to = %transition.to,
        actor = %actor.id,
        "grade record transitioned"
    );
    get_record(conn, &snapshot.id)
}

pub fn apply_to_record(
    conn: &Connection,
    id: &str,
    event: &WorkflowEvent,
    actor: &Actor,
    config: &GradingConfig,
) -> Result<GradeRecord, WorkflowError> {
    let snapshot = get_record(conn, id)?;
    apply_transition(conn, &snapshot, event, actor, config)
}

/// Applies `event` to each record independently. One record's refusal is
/// reported in `errors` and never blocks the rest of the batch.
pub fn apply_batch(
    conn: &Connection,
    ids: &[String],
    event: &WorkflowEvent,
    actor: &Actor,
    config: &GradingConfig,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for id in ids {
        match apply_to_record(conn, id, event, actor, config) {
            Ok(_) => outcome.affected_count += 1,
            Err(e) => {
                tracing::warn!(record_id = %id, event = event.name(), code = e.code(), "transition refused: {}", e);
                outcome.errors.push(BatchItemError {
                    record_id: id.clone(),
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }
    outcome.success = outcome.errors.is_empty();
    outcome
}
