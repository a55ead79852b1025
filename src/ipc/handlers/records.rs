use super::{opt_param, param, params_as};
use crate::calc::{GradeInput, ScoreUpdate};
use crate::ipc::error::{err, ok, workflow_err};
use crate::ipc::types::{AppState, Request};
use crate::records::{self, NewGradeRecord, RecordFilter};
use crate::stats::{self, GradeSample};
use crate::workflow::{Actor, WorkflowEvent};
use rusqlite::Connection;
use serde_json::json;

const BATCH_MAX_IDS: usize = 5000;

fn conn_or_err<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn ids_param(req: &Request) -> Result<Vec<String>, serde_json::Value> {
    let ids: Vec<String> = param(req, "ids")?;
    if ids.len() > BATCH_MAX_IDS {
        return Err(err(
            &req.id,
            "bad_params",
            "too many ids in one batch",
            Some(json!({ "count": ids.len(), "max": BATCH_MAX_IDS })),
        ));
    }
    Ok(ids)
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match conn_or_err(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let actor: Actor = match param(req, "actor") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let new: NewGradeRecord = match params_as(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match records::create_record(conn, &new, &actor, &state.config) {
        Ok(record) => ok(&req.id, json!(record)),
        Err(e) => workflow_err(&req.id, &e),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match conn_or_err(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id: String = match param(req, "id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match records::get_record(conn, &id) {
        Ok(record) => ok(&req.id, json!(record)),
        Err(e) => workflow_err(&req.id, &e),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match conn_or_err(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let filter: RecordFilter = if req.params.is_null() {
        RecordFilter::default()
    } else {
        match params_as(req) {
            Ok(v) => v,
            Err(resp) => return resp,
        }
    };
    match records::list_records(conn, &filter) {
        Ok(list) => ok(&req.id, json!({ "records": list })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_statistics(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match conn_or_err(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let filter: RecordFilter = if req.params.is_null() {
        RecordFilter::default()
    } else {
        match params_as(req) {
            Ok(v) => v,
            Err(resp) => return resp,
        }
    };
    match records::list_records(conn, &filter) {
        Ok(list) => {
            let samples: Vec<GradeSample> = list.iter().map(GradeSample::from).collect();
            ok(&req.id, json!(stats::calculate_grade_statistics(&samples)))
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_single(state: &mut AppState, req: &Request, event: WorkflowEvent) -> serde_json::Value {
    let conn = match conn_or_err(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id: String = match param(req, "id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let actor: Actor = match param(req, "actor") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match records::apply_to_record(conn, &id, &event, &actor, &state.config) {
        Ok(record) => ok(&req.id, json!(record)),
        Err(e) => workflow_err(&req.id, &e),
    }
}

fn handle_batch(state: &mut AppState, req: &Request, event: WorkflowEvent) -> serde_json::Value {
    let conn = match conn_or_err(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let ids = match ids_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let actor: Actor = match param(req, "actor") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let outcome = records::apply_batch(conn, &ids, &event, &actor, &state.config);
    ok(&req.id, json!(outcome))
}

fn handle_revise(state: &mut AppState, req: &Request) -> serde_json::Value {
    let input: GradeInput = match param(req, "input") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    handle_single(state, req, WorkflowEvent::Revise { input })
}

/// Params carry only the new scores (`score`/`newScore`, or the IGCSE
/// `courseworkScore` and `examScore`); the record keeps its scale and weights.
fn handle_override(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scores: ScoreUpdate = match params_as(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let note: Option<String> = match opt_param(req, "note") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    handle_single(state, req, WorkflowEvent::Override { scores, note })
}

fn handle_approve(state: &mut AppState, req: &Request) -> serde_json::Value {
    let notes: Option<String> = match opt_param(req, "notes") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    handle_batch(state, req, WorkflowEvent::Approve { notes })
}

fn handle_reject(state: &mut AppState, req: &Request) -> serde_json::Value {
    // Blank and missing reasons both reach the workflow so the refusal code
    // is the same either way.
    let reason: String = match opt_param(req, "reason") {
        Ok(v) => v.unwrap_or_default(),
        Err(resp) => return resp,
    };
    handle_batch(state, req, WorkflowEvent::Reject { reason })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "records.create" => Some(handle_create(state, req)),
        "records.get" => Some(handle_get(state, req)),
        "records.list" => Some(handle_list(state, req)),
        "records.statistics" => Some(handle_statistics(state, req)),
        "records.revise" => Some(handle_revise(state, req)),
        "records.submit" => Some(handle_batch(state, req, WorkflowEvent::Submit)),
        "records.approve" => Some(handle_approve(state, req)),
        "records.reject" => Some(handle_reject(state, req)),
        "records.override" => Some(handle_override(state, req)),
        "records.release" => Some(handle_batch(state, req, WorkflowEvent::Release)),
        _ => None,
    }
}
