use std::path::{Path, PathBuf};

use crate::backup;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::ipc::error::reply;
use crate::ipc::helpers::{optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn bundle_error(action: &str, e: anyhow::Error) -> ApiError {
    tracing::error!("workspace {action} failed: {e:#}");
    ApiError::Io(std::io::Error::other(format!("{e:#}")))
}

/// Explicit `workspacePath`, else the workspace currently selected.
fn target_workspace(state: &AppState, req: &Request) -> ApiResult<PathBuf> {
    optional_str(req, "workspacePath")
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or(ApiError::NoWorkspace)
}

fn handle_export_workspace_bundle(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let out_path = required_str(req, "outPath")?;
    let workspace_path = target_workspace(state, req)?;

    let export = backup::export_workspace_bundle(&workspace_path, Path::new(out_path))
        .map_err(|e| bundle_error("export", e))?;

    Ok(json!({
        "ok": true,
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "blobCount": export.blob_count,
    }))
}

fn handle_import_workspace_bundle(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let src = PathBuf::from(required_str(req, "inPath")?);
    let workspace_path = target_workspace(state, req)?;
    if !src.is_file() {
        return Err(ApiError::NotFound("bundle"));
    }

    // The database file may be replaced underneath the open handle.
    state.db = None;

    let import = match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            if let Some(ws) = state.workspace.as_deref() {
                state.db = db::open_db(ws).ok();
            }
            return Err(bundle_error("import", e));
        }
    };

    let conn = db::open_db(&workspace_path)
        .map_err(|e| ApiError::Internal(format!("failed to open restored workspace: {e:#}")))?;
    tracing::info!(workspace = %workspace_path.display(), "opened restored workspace");
    state.workspace = Some(workspace_path.clone());
    state.db = Some(conn);

    Ok(json!({
        "ok": true,
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
        "blobCount": import.blob_count,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => handle_export_workspace_bundle(state, req),
        "backup.importWorkspaceBundle" => handle_import_workspace_bundle(state, req),
        _ => return None,
    };
    Some(reply(&req.id, result))
}
