use std::path::Path;

use rusqlite::Connection;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, ApiResult};
use crate::ipc::types::{AppState, Request};

pub fn db_conn(state: &AppState) -> ApiResult<&Connection> {
    state.db.as_ref().ok_or(ApiError::NoWorkspace)
}

/// The open database together with the directory its blobs live under.
pub fn workspace(state: &AppState) -> ApiResult<(&Connection, &Path)> {
    match (state.db.as_ref(), state.workspace.as_deref()) {
        (Some(conn), Some(path)) => Ok((conn, path)),
        _ => Err(ApiError::NoWorkspace),
    }
}

/// Ids are opaque: whitespace only decides emptiness and is never stripped.
pub fn caller(req: &Request) -> Option<&str> {
    req.caller_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
}

pub fn required_str<'a>(req: &'a Request, key: &str) -> ApiResult<&'a str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::bad_params(format!("missing {}", key)))
}

pub fn optional_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

pub fn required_bool(req: &Request, key: &str) -> ApiResult<bool> {
    req.params
        .get(key)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| ApiError::bad_params(format!("missing {}", key)))
}

/// Deserializes the whole params object. Missing params read as `{}`.
pub fn params<T: DeserializeOwned>(req: &Request) -> ApiResult<T> {
    let raw = if req.params.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        req.params.clone()
    };
    serde_json::from_value(raw).map_err(|e| ApiError::bad_params(format!("invalid params: {}", e)))
}

/// Deserializes one field, treating absent and `null` alike.
pub fn optional_field<T: DeserializeOwned>(req: &Request, key: &str) -> ApiResult<Option<T>> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| ApiError::bad_params(format!("invalid {}: {}", key, e))),
    }
}
