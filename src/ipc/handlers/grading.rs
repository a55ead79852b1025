use super::{opt_param, param, params_as};
use crate::calc::{self, GradeParams};
use crate::config::{self, GradingConfig};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::stats::{self, GradeData, GradeSample};
use serde_json::json;

fn handle_calculate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params: GradeParams = match params_as(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = calc::calculate_grade_params_with(&params, &state.config);
    ok(&req.id, json!(result))
}

fn handle_validate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let grade: GradeData = match param(req, "grade") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    ok(
        &req.id,
        json!(stats::validate_grade_data_with(&grade, &state.config)),
    )
}

fn grades_param(req: &Request) -> Result<Vec<GradeSample>, serde_json::Value> {
    param(req, "grades")
}

fn handle_class_average(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let grades = match grades_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    ok(
        &req.id,
        json!({ "average": stats::calculate_class_average(&grades) }),
    )
}

fn handle_pass_rate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let grades = match grades_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let threshold: f64 = match opt_param(req, "passingThreshold") {
        Ok(v) => v.unwrap_or(state.config.passing_threshold),
        Err(resp) => return resp,
    };
    let passing_grades: Vec<String> = match opt_param(req, "passingGrades") {
        Ok(v) => v.unwrap_or_else(|| state.config.passing_grades.clone()),
        Err(resp) => return resp,
    };
    ok(
        &req.id,
        json!({
            "passRate": stats::calculate_pass_rate_with(&grades, threshold, &passing_grades)
        }),
    )
}

fn handle_statistics(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let grades = match grades_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    ok(&req.id, json!(stats::calculate_grade_statistics(&grades)))
}

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!(state.config))
}

fn handle_config_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let cfg: GradingConfig = match param(req, "config") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(e) = cfg.validate() {
        return err(&req.id, "config_invalid", e.to_string(), None);
    }
    if let Err(e) = config::save(conn, &cfg) {
        return err(&req.id, "db_update_failed", format!("{e:#}"), None);
    }
    tracing::info!("grading config updated");
    state.config = cfg;
    ok(&req.id, json!(state.config))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.calculate" => Some(handle_calculate(state, req)),
        "grades.validate" => Some(handle_validate(state, req)),
        "grades.classAverage" => Some(handle_class_average(state, req)),
        "grades.passRate" => Some(handle_pass_rate(state, req)),
        "grades.statistics" => Some(handle_statistics(state, req)),
        "config.get" => Some(handle_config_get(state, req)),
        "config.update" => Some(handle_config_update(state, req)),
        _ => None,
    }
}
