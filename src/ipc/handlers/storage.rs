use crate::error::ApiResult;
use crate::ipc::error::reply;
use crate::ipc::helpers::{required_str, workspace};
use crate::ipc::types::{AppState, Request};
use crate::storage::{self, UrlResolver};
use serde_json::json;

fn handle_storage_generate_upload_url(
    state: &mut AppState,
    _req: &Request,
) -> ApiResult<serde_json::Value> {
    let (conn, ws) = workspace(state)?;
    let ticket = storage::generate_upload(conn, ws)?;
    Ok(serde_json::to_value(ticket)?)
}

fn handle_storage_commit_upload(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let (conn, ws) = workspace(state)?;
    let upload_id = required_str(req, "uploadId")?;
    let content_type = required_str(req, "contentType")?;
    let meta = storage::commit_upload(conn, ws, upload_id, content_type)?;
    Ok(json!({
        "storageId": meta.storage_id,
        "size": meta.size,
        "sha256": meta.sha256,
    }))
}

fn handle_storage_get_url(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let (conn, ws) = workspace(state)?;
    let storage_id = required_str(req, "storageId")?;
    let url = UrlResolver::new(conn, ws).resolve(Some(storage_id))?;
    Ok(json!(url))
}

fn handle_storage_get_metadata(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let (conn, _) = workspace(state)?;
    let storage_id = required_str(req, "storageId")?;
    Ok(json!(storage::metadata(conn, storage_id)?))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "storage.generateUploadUrl" => handle_storage_generate_upload_url(state, req),
        "storage.commitUpload" => handle_storage_commit_upload(state, req),
        "storage.getUrl" => handle_storage_get_url(state, req),
        "storage.getMetadata" => handle_storage_get_metadata(state, req),
        _ => return None,
    };
    Some(reply(&req.id, result))
}
