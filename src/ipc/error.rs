use serde_json::json;

use crate::error::ApiError;

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

pub fn fail(id: &str, e: &ApiError) -> serde_json::Value {
    match e {
        ApiError::Db(_) | ApiError::Io(_) | ApiError::Internal(_) | ApiError::Json(_) => {
            tracing::error!(request_id = id, code = e.code(), "{e}");
        }
        _ => tracing::debug!(request_id = id, code = e.code(), "{e}"),
    }
    err(id, e.code(), e.to_string(), e.details())
}

/// Collapses a handler result into a reply line.
pub fn reply(id: &str, result: Result<serde_json::Value, ApiError>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => fail(id, &e),
    }
}
