use crate::error::{ApiError, ApiResult};
use crate::ipc::error::reply;
use crate::ipc::helpers::{optional_str, required_str, workspace};
use crate::ipc::types::{AppState, Request};
use crate::results::{self, Access};
use crate::storage::UrlResolver;
use crate::store::{elements, responses, sessions};
use serde_json::json;

fn handle_results_summary(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let (conn, ws) = workspace(state)?;
    let code = required_str(req, "sessionCode")?;
    let session = sessions::by_code(conn, code)?;

    let access = results::check_access(session.as_ref(), optional_str(req, "pinCode"));
    let session = match (access, session) {
        (Access::Granted, Some(s)) => s,
        (Access::SessionNotFound, _) | (_, None) => return Err(ApiError::NotFound("session")),
        (denied, Some(_)) => {
            return Err(ApiError::Unauthorized(
                denied.message().unwrap_or("unauthorized"),
            ))
        }
    };

    let rows = elements::list_for_session(conn, &session.id)?;
    let recorded = responses::for_session(conn, &session.id)?;
    let mut summary = results::summarize(&rows, &recorded);

    let resolver = UrlResolver::new(conn, ws);
    for element in &mut summary.elements {
        for file in &mut element.files {
            file.file_url = resolver.resolve(Some(&file.file_id))?;
        }
    }

    Ok(json!({
        "sessionId": session.id,
        "title": session.title,
        "totalParticipants": summary.total_participants,
        "elements": summary.elements,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "results.summary" => handle_results_summary(state, req),
        _ => return None,
    };
    Some(reply(&req.id, result))
}
