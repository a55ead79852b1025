pub mod backup_exchange;
pub mod core;
pub mod grading;
pub mod records;

use serde::de::DeserializeOwned;

use crate::ipc::error::err;
use crate::ipc::types::Request;

/// Required param; the `Err` side is a ready-made error response.
fn param<T: DeserializeOwned>(req: &Request, key: &str) -> Result<T, serde_json::Value> {
    match req.params.get(key) {
        None => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
        Some(v) if v.is_null() => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
            err(
                &req.id,
                "bad_params",
                format!("invalid {}: {}", key, e),
                None,
            )
        }),
    }
}

fn opt_param<T: DeserializeOwned>(req: &Request, key: &str) -> Result<Option<T>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(_) => param(req, key).map(Some),
    }
}

/// Whole params object as one typed value.
fn params_as<T: DeserializeOwned>(req: &Request) -> Result<T, serde_json::Value> {
    serde_json::from_value(req.params.clone())
        .map_err(|e| err(&req.id, "bad_params", format!("invalid params: {}", e), None))
}
