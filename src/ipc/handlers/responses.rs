use std::collections::HashMap;

use crate::claims;
use crate::error::{ApiError, ApiResult};
use crate::ipc::error::reply;
use crate::ipc::helpers::{caller, db_conn, params, required_str, workspace};
use crate::ipc::types::{AppState, Request};
use crate::model::{ElementKind, Response, ResponseSlots};
use crate::storage::UrlResolver;
use crate::store::{elements, responses, sessions};
use serde_json::json;

/// Teacher view of a response: the stored slots plus `fileUrl`, the typed
/// `value`, and `valueMismatch` when the slots disagree with the element type.
fn response_view(
    resolver: &UrlResolver<'_>,
    response: &Response,
    kind: Option<ElementKind>,
) -> ApiResult<serde_json::Value> {
    let mut out = serde_json::to_value(response)?;
    out["fileUrl"] = json!(resolver.resolve(response.slots.file_id.as_deref())?);
    let typed = kind.and_then(|k| response.slots.typed(k));
    out["valueMismatch"] = json!(typed.is_none());
    out["value"] = json!(typed);
    Ok(out)
}

fn handle_responses_submit(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let session_id = required_str(req, "sessionId")?;
    let element_id = required_str(req, "elementId")?;
    let participant_id = required_str(req, "participantId")?;
    let slots: ResponseSlots = params(req)?;

    let element = elements::get(conn, element_id)?.ok_or(ApiError::NotFound("element"))?;
    if element.session_id != session_id {
        return Err(ApiError::bad_params("element does not belong to session"));
    }

    let tx = conn.unchecked_transaction()?;
    let submitted = match responses::submit(&tx, &element, participant_id, &slots) {
        Ok(v) => v,
        Err(e @ ApiError::ChoiceTaken { .. }) => {
            tracing::info!(element_id, participant_id, "exclusive choice already taken");
            return Err(e);
        }
        Err(e) => return Err(e),
    };
    tx.commit()?;

    tracing::debug!(
        element_id,
        participant_id,
        created = submitted.created,
        "recorded response"
    );
    Ok(json!({ "responseId": submitted.response_id }))
}

fn handle_responses_for_participant(
    state: &mut AppState,
    req: &Request,
) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let session_id = required_str(req, "sessionId")?;
    let participant_id = required_str(req, "participantId")?;
    let rows = responses::for_participant(conn, session_id, participant_id)?;
    Ok(serde_json::to_value(rows)?)
}

fn handle_responses_taken_choices(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let element_id = required_str(req, "elementId")?;
    let participant_id = required_str(req, "participantId")?;
    let rows = responses::for_element(conn, element_id)?;
    Ok(json!(claims::taken_by_others(&rows, participant_id)))
}

fn handle_responses_for_session(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let (conn, ws) = workspace(state)?;
    let session_id = required_str(req, "sessionId")?;
    sessions::owned(conn, caller(req), session_id)?;

    let kinds: HashMap<String, ElementKind> = elements::list_for_session(conn, session_id)?
        .into_iter()
        .map(|e| (e.id, e.kind))
        .collect();
    let resolver = UrlResolver::new(conn, ws);
    let mut out = Vec::new();
    for r in responses::for_session(conn, session_id)? {
        out.push(response_view(&resolver, &r, kinds.get(&r.element_id).copied())?);
    }
    Ok(serde_json::Value::Array(out))
}

fn handle_responses_for_element(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let (conn, ws) = workspace(state)?;
    let (element, _) = elements::owned(conn, caller(req), required_str(req, "elementId")?)?;

    let resolver = UrlResolver::new(conn, ws);
    let mut out = Vec::new();
    for r in responses::for_element(conn, &element.id)? {
        out.push(response_view(&resolver, &r, Some(element.kind))?);
    }
    Ok(serde_json::Value::Array(out))
}

fn handle_responses_delete(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let response_id = required_str(req, "responseId")?;
    let response = responses::get(conn, response_id)?.ok_or(ApiError::NotFound("response"))?;
    sessions::owned(conn, caller(req), &response.session_id)?;
    responses::delete(conn, response_id)?;
    Ok(json!({ "ok": true }))
}

fn handle_responses_delete_participant(
    state: &mut AppState,
    req: &Request,
) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let session_id = required_str(req, "sessionId")?;
    let participant_id = required_str(req, "participantId")?;
    sessions::owned(conn, caller(req), session_id)?;
    let deleted = responses::delete_participant(conn, session_id, participant_id)?;
    tracing::info!(session_id, participant_id, deleted, "removed participant responses");
    Ok(json!({ "deleted": deleted }))
}

fn handle_responses_audit_unique_choices(
    state: &mut AppState,
    req: &Request,
) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let session_id = required_str(req, "sessionId")?;
    sessions::owned(conn, caller(req), session_id)?;

    let rows = elements::list_for_session(conn, session_id)?;
    let recorded = responses::for_session(conn, session_id)?;
    let doubles = claims::double_claims(&rows, &recorded);
    for d in &doubles {
        tracing::warn!(
            element_id = %d.element_id,
            choice_id = %d.choice_id,
            holders = d.participant_ids.len(),
            "exclusive choice held by more than one participant"
        );
    }
    Ok(json!({ "doubleClaims": doubles }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "responses.submit" => handle_responses_submit(state, req),
        "responses.forParticipant" => handle_responses_for_participant(state, req),
        "responses.takenChoices" => handle_responses_taken_choices(state, req),
        "responses.forSession" => handle_responses_for_session(state, req),
        "responses.forElement" => handle_responses_for_element(state, req),
        "responses.delete" => handle_responses_delete(state, req),
        "responses.deleteParticipant" => handle_responses_delete_participant(state, req),
        "responses.auditUniqueChoices" => handle_responses_audit_unique_choices(state, req),
        _ => return None,
    };
    Some(reply(&req.id, result))
}
