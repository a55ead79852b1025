use serde_json::json;

use crate::workflow::WorkflowError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Workflow refusals keep their own codes; state conflicts also say which
/// status the caller should refresh against.
pub fn workflow_err(id: &str, e: &WorkflowError) -> serde_json::Value {
    let details = match e {
        WorkflowError::IllegalTransition { from, event } => {
            Some(json!({ "status": from.as_str(), "event": event }))
        }
        WorkflowError::StaleState { id: record_id, expected } => {
            Some(json!({ "recordId": record_id, "expectedStatus": expected.as_str() }))
        }
        WorkflowError::NotFound(record_id) => Some(json!({ "recordId": record_id })),
        _ => None,
    };
    err(id, e.code(), e.to_string(), details)
}
