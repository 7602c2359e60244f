use crate::error::{ApiError, ApiResult};
use crate::ipc::error::reply;
use crate::ipc::helpers::{caller, db_conn, optional_str, params, required_bool, required_str, workspace};
use crate::ipc::types::{AppState, Request};
use crate::results;
use crate::storage::UrlResolver;
use crate::store::sessions::{self, SessionSettings};
use serde_json::json;

fn fresh_code(conn: &rusqlite::Connection) -> ApiResult<String> {
    let mut rng = rand::thread_rng();
    sessions::unique_code(conn, || sessions::generate_code(&mut rng))
}

fn handle_sessions_create(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let teacher_id = caller(req).ok_or(ApiError::Unauthenticated)?;
    let mut settings: SessionSettings = params(req)?;
    let title = settings
        .title
        .take()
        .ok_or_else(|| ApiError::bad_params("missing title"))?;

    let tx = conn.unchecked_transaction()?;
    let code = fresh_code(&tx)?;
    let session = sessions::create(&tx, teacher_id, title, settings, code)?;
    tx.commit()?;

    tracing::info!(session_id = %session.id, code = %session.session_code, "created session");
    Ok(json!({
        "sessionId": session.id,
        "sessionCode": session.session_code,
    }))
}

fn handle_sessions_update(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let session_id = required_str(req, "sessionId")?;
    sessions::owned(conn, caller(req), session_id)?;
    let settings: SessionSettings = params(req)?;
    let touched = sessions::update(conn, session_id, &settings)?;
    Ok(json!({ "ok": true, "fieldsUpdated": touched }))
}

fn handle_sessions_list(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let Some(teacher_id) = caller(req) else {
        return Ok(json!([]));
    };
    let rows = sessions::list_for_teacher(conn, teacher_id)?;
    Ok(serde_json::to_value(rows)?)
}

fn handle_sessions_set_active(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let session_id = required_str(req, "sessionId")?;
    let active = required_bool(req, "active")?;
    sessions::owned(conn, caller(req), session_id)?;
    sessions::set_active(conn, session_id, active)?;
    tracing::info!(session_id, active, "session activity changed");
    Ok(json!({ "ok": true }))
}

fn handle_sessions_delete(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let session_id = required_str(req, "sessionId")?;
    sessions::owned(conn, caller(req), session_id)?;

    let tx = conn.unchecked_transaction()?;
    let counts = sessions::delete_cascade(&tx, session_id)?;
    tx.commit()?;

    tracing::info!(
        session_id,
        sessions = counts.sessions,
        responses = counts.responses,
        elements = counts.elements,
        "deleted session"
    );
    Ok(json!({
        "ok": true,
        "responsesDeleted": counts.responses,
        "elementsDeleted": counts.elements,
    }))
}

fn handle_sessions_clone(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let session_id = required_str(req, "sessionId")?;
    let source = sessions::owned(conn, caller(req), session_id)?;

    let tx = conn.unchecked_transaction()?;
    let code = fresh_code(&tx)?;
    let copy = sessions::clone_session(&tx, &source, &source.teacher_id, code)?;
    tx.commit()?;

    tracing::info!(source_id = %source.id, session_id = %copy.id, "cloned session");
    Ok(json!({
        "sessionId": copy.id,
        "sessionCode": copy.session_code,
    }))
}

fn handle_sessions_by_code(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let (conn, ws) = workspace(state)?;
    let code = required_str(req, "sessionCode")?;
    let Some(session) = sessions::by_code(conn, code)? else {
        return Ok(serde_json::Value::Null);
    };
    let image_url = UrlResolver::new(conn, ws).resolve(session.completion_image_id.as_deref())?;
    let mut out = serde_json::to_value(&session)?;
    out["completionImageUrl"] = json!(image_url);
    Ok(out)
}

fn handle_sessions_verify_results_access(
    state: &mut AppState,
    req: &Request,
) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let code = required_str(req, "sessionCode")?;
    let session = sessions::by_code(conn, code)?;
    let access = results::check_access(session.as_ref(), optional_str(req, "pinCode"));
    Ok(match access.message() {
        None => json!({ "success": true }),
        Some(error) => json!({ "success": false, "error": error }),
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "sessions.create" => handle_sessions_create(state, req),
        "sessions.update" => handle_sessions_update(state, req),
        "sessions.list" => handle_sessions_list(state, req),
        "sessions.setActive" => handle_sessions_set_active(state, req),
        "sessions.delete" => handle_sessions_delete(state, req),
        "sessions.clone" => handle_sessions_clone(state, req),
        "sessions.byCode" => handle_sessions_by_code(state, req),
        "sessions.verifyResultsAccess" => handle_sessions_verify_results_access(state, req),
        _ => return None,
    };
    Some(reply(&req.id, result))
}

