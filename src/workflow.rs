//! Approval lifecycle of a grade record.
//!
//! `transition` is pure: it decides the next status (and, for revise and
//! override, the recomputed result) from a snapshot of the record. The
//! record store persists that decision with a conditional update on the
//! snapshot's status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::calc::{self, CurriculumType, GradeInput, GradeResult, ScoreUpdate};
use crate::config::GradingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeStatus {
    Draft,
    PendingApproval,
    Approved,
    Rejected,
    Released,
}

impl GradeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GradeStatus::Draft => "draft",
            GradeStatus::PendingApproval => "pending_approval",
            GradeStatus::Approved => "approved",
            GradeStatus::Rejected => "rejected",
            GradeStatus::Released => "released",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, GradeStatus::Released)
    }
}

impl fmt::Display for GradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GradeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(GradeStatus::Draft),
            "pending_approval" => Ok(GradeStatus::PendingApproval),
            "approved" => Ok(GradeStatus::Approved),
            "rejected" => Ok(GradeStatus::Rejected),
            "released" => Ok(GradeStatus::Released),
            other => Err(format!("unknown grade status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    SchoolOwner,
    Principal,
    Teacher,
    FinanceOfficer,
    Parent,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::SchoolOwner => "school_owner",
            Role::Principal => "principal",
            Role::Teacher => "teacher",
            Role::FinanceOfficer => "finance_officer",
            Role::Parent => "parent",
        }
    }

    /// Roles that may enter scores and so create draft records.
    pub fn can_enter_grades(self) -> bool {
        matches!(self, Role::Teacher | Role::Principal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    /// Re-entry of a draft or rejected score by its author.
    Revise { input: GradeInput },
    Submit,
    Approve { notes: Option<String> },
    Reject { reason: String },
    /// New scores for an approved record, applied to its stored entry.
    Override { scores: ScoreUpdate, note: Option<String> },
    Release,
}

impl WorkflowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::Revise { .. } => "revise",
            WorkflowEvent::Submit => "submit",
            WorkflowEvent::Approve { .. } => "approve",
            WorkflowEvent::Reject { .. } => "reject",
            WorkflowEvent::Override { .. } => "override",
            WorkflowEvent::Release => "release",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("cannot {event} a record in status {from}")]
    IllegalTransition {
        from: GradeStatus,
        event: &'static str,
    },

    #[error("role {role} may not {event} grades")]
    Forbidden { role: &'static str, event: &'static str },

    #[error("only the original submitter may {event} this record")]
    NotSubmitter { event: &'static str },

    #[error("a rejection reason is required")]
    MissingRejectionReason,

    #[error("grade is invalid: {0}")]
    InvalidGrade(String),

    #[error("record uses the {expected} curriculum, got {got}")]
    CurriculumMismatch {
        expected: CurriculumType,
        got: CurriculumType,
    },

    #[error("grade record not found: {0}")]
    NotFound(String),

    #[error("record {id} is no longer {expected}")]
    StaleState { id: String, expected: GradeStatus },

    #[error("storage error: {0}")]
    Storage(String),
}

impl WorkflowError {
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::IllegalTransition { .. } => "illegal_transition",
            WorkflowError::Forbidden { .. } => "forbidden",
            WorkflowError::NotSubmitter { .. } => "not_submitter",
            WorkflowError::MissingRejectionReason => "missing_reason",
            WorkflowError::InvalidGrade(_) => "invalid_grade",
            WorkflowError::CurriculumMismatch { .. } => "curriculum_mismatch",
            WorkflowError::NotFound(_) => "not_found",
            WorkflowError::StaleState { .. } => "stale_state",
            WorkflowError::Storage(_) => "db_update_failed",
        }
    }
}

impl From<rusqlite::Error> for WorkflowError {
    fn from(e: rusqlite::Error) -> Self {
        WorkflowError::Storage(e.to_string())
    }
}

/// The parts of a record the transition guards look at.
#[derive(Debug, Clone, Copy)]
pub struct RecordState<'a> {
    pub status: GradeStatus,
    pub input: &'a GradeInput,
    pub created_by: &'a str,
    pub is_valid: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: GradeStatus,
    pub to: GradeStatus,
    /// Replacement entry and its recomputed result for revise and override;
    /// `None` keeps the stored ones.
    pub input: Option<GradeInput>,
    pub result: Option<GradeResult>,
}

fn legal_target(from: GradeStatus, event: &WorkflowEvent) -> Option<GradeStatus> {
    use GradeStatus::*;
    match (from, event) {
        (Draft | Rejected, WorkflowEvent::Revise { .. }) => Some(Draft),
        (Draft | Rejected, WorkflowEvent::Submit) => Some(PendingApproval),
        (PendingApproval, WorkflowEvent::Approve { .. }) => Some(Approved),
        (PendingApproval, WorkflowEvent::Reject { .. }) => Some(Rejected),
        (Approved, WorkflowEvent::Override { .. }) => Some(Approved),
        (Approved, WorkflowEvent::Release) => Some(Released),
        _ => None,
    }
}

fn require_principal(actor: &Actor, event: &WorkflowEvent) -> Result<(), WorkflowError> {
    if actor.role == Role::Principal {
        Ok(())
    } else {
        Err(WorkflowError::Forbidden {
            role: actor.role.as_str(),
            event: event.name(),
        })
    }
}

fn require_submitter(
    record: &RecordState<'_>,
    actor: &Actor,
    event: &WorkflowEvent,
) -> Result<(), WorkflowError> {
    if actor.id == record.created_by {
        Ok(())
    } else {
        Err(WorkflowError::NotSubmitter {
            event: event.name(),
        })
    }
}

fn recompute(
    record: &RecordState<'_>,
    input: &GradeInput,
    config: &GradingConfig,
) -> Result<GradeResult, WorkflowError> {
    let expected: CurriculumType = record.input.curriculum();
    if input.curriculum() != expected {
        return Err(WorkflowError::CurriculumMismatch {
            expected,
            got: input.curriculum(),
        });
    }
    Ok(calc::calculate_grade_with(input, config))
}

/// Guards run in order: source state, actor, payload. Nothing here touches
/// storage, so a refusal never leaves a partial write behind.
pub fn transition(
    record: &RecordState<'_>,
    event: &WorkflowEvent,
    actor: &Actor,
    config: &GradingConfig,
) -> Result<Transition, WorkflowError> {
    let from = record.status;
    let to = legal_target(from, event).ok_or(WorkflowError::IllegalTransition {
        from,
        event: event.name(),
    })?;

    let (input, result) = match event {
        WorkflowEvent::Revise { input } => {
            require_submitter(record, actor, event)?;
            let result = recompute(record, input, config)?;
            (Some(input.clone()), Some(result))
        }
        WorkflowEvent::Submit => {
            require_submitter(record, actor, event)?;
            if !record.is_valid {
                return Err(WorkflowError::InvalidGrade(
                    "record has no valid grade to submit".to_string(),
                ));
            }
            (None, None)
        }
        WorkflowEvent::Approve { .. } | WorkflowEvent::Release => {
            require_principal(actor, event)?;
            (None, None)
        }
        WorkflowEvent::Reject { reason } => {
            require_principal(actor, event)?;
            if reason.trim().is_empty() {
                return Err(WorkflowError::MissingRejectionReason);
            }
            (None, None)
        }
        WorkflowEvent::Override { scores, .. } => {
            require_principal(actor, event)?;
            if scores.is_empty() {
                return Err(WorkflowError::InvalidGrade(
                    "an override needs a new score".to_string(),
                ));
            }
            // Scale and weights come from the stored entry, never from defaults.
            let input = record.input.with_scores(scores);
            let result = recompute(record, &input, config)?;
            if !result.is_valid {
                return Err(WorkflowError::InvalidGrade(
                    result.error.unwrap_or_else(|| "invalid score".to_string()),
                ));
            }
            (Some(input), Some(result))
        }
    };

    Ok(Transition {
        from,
        to,
        input,
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::StandardInput;

    fn entry() -> GradeInput {
        GradeInput::Standard(StandardInput {
            score: Some(70.0),
            max_score: 100.0,
        })
    }

    fn state(status: GradeStatus, input: &GradeInput) -> RecordState<'_> {
        RecordState {
            status,
            input,
            created_by: "t1",
            is_valid: true,
        }
    }

    fn principal() -> Actor {
        Actor::new("p1", Role::Principal)
    }

    #[test]
    fn status_strings_roundtrip() {
        for s in [
            GradeStatus::Draft,
            GradeStatus::PendingApproval,
            GradeStatus::Approved,
            GradeStatus::Rejected,
            GradeStatus::Released,
        ] {
            assert_eq!(s.as_str().parse::<GradeStatus>(), Ok(s));
        }
    }

    #[test]
    fn illegal_state_is_reported_before_role() {
        let teacher = Actor::new("t1", Role::Teacher);
        let input = entry();
        let err = transition(
            &state(GradeStatus::Released, &input),
            &WorkflowEvent::Release,
            &teacher,
            &GradingConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "illegal_transition");
    }

    #[test]
    fn override_with_out_of_range_score_is_refused() {
        let input = entry();
        let err = transition(
            &state(GradeStatus::Approved, &input),
            &WorkflowEvent::Override {
                scores: ScoreUpdate {
                    score: Some(120.0),
                    ..ScoreUpdate::default()
                },
                note: None,
            },
            &principal(),
            &GradingConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_grade");
    }

    #[test]
    fn override_without_scores_is_refused() {
        let input = entry();
        let err = transition(
            &state(GradeStatus::Approved, &input),
            &WorkflowEvent::Override {
                scores: ScoreUpdate::default(),
                note: None,
            },
            &principal(),
            &GradingConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_grade");
    }
}
