use std::collections::HashMap;

use crate::error::{ApiError, ApiResult};
use crate::ipc::error::reply;
use crate::ipc::helpers::{
    caller, db_conn, optional_field, params, required_bool, required_str, workspace,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Condition, ConditionalLogic, Element, ResponseSlots};
use crate::ordering::{self, Direction, OrderPatch};
use crate::storage::UrlResolver;
use crate::store::elements::{self, ElementPatch, NewElement};
use crate::store::{responses, sessions};
use crate::visibility;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportParams {
    elements: Vec<NewElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ElementOrder {
    element_id: String,
    order: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReorderParams {
    element_orders: Vec<ElementOrder>,
}

/// Element JSON with `imageUrl` on the element and on each choice.
pub fn element_view(resolver: &UrlResolver<'_>, element: &Element) -> ApiResult<serde_json::Value> {
    let mut out = serde_json::to_value(element)?;
    out["imageUrl"] = json!(resolver.resolve(element.image_id.as_deref())?);
    if let Some(choices) = element.choices.as_ref() {
        let mut views = Vec::with_capacity(choices.len());
        for choice in choices {
            let mut c = serde_json::to_value(choice)?;
            c["imageUrl"] = json!(resolver.resolve(choice.image_id.as_deref())?);
            views.push(c);
        }
        out["choices"] = serde_json::Value::Array(views);
    }
    Ok(out)
}

fn element_views<'a, I>(resolver: &UrlResolver<'_>, elements: I) -> ApiResult<serde_json::Value>
where
    I: IntoIterator<Item = &'a Element>,
{
    let mut out = Vec::new();
    for e in elements {
        out.push(element_view(resolver, e)?);
    }
    Ok(serde_json::Value::Array(out))
}

/// An enabled rule must name an element listed earlier in the same session
/// and a condition this build understands. "Earlier" is the position in the
/// `sort_order, rowid` listing, not the raw order value.
fn validate_logic(conn: &Connection, element: &Element, logic: &ConditionalLogic) -> ApiResult<()> {
    if !logic.enabled {
        return Ok(());
    }
    if logic.condition == Condition::Unknown {
        return Err(ApiError::bad_params("unsupported condition"));
    }
    if logic.depends_on_element_id == element.id {
        return Err(ApiError::bad_params("an element cannot depend on itself"));
    }
    let slots = elements::order_slots(conn, &element.session_id)?;
    let position = |id: &str| slots.iter().position(|s| s.id == id);
    match (position(&logic.depends_on_element_id), position(&element.id)) {
        (Some(dep), Some(own)) if dep < own => Ok(()),
        (Some(_), Some(_)) => Err(ApiError::bad_params(
            "dependency must come before the element",
        )),
        _ => Err(ApiError::bad_params(
            "dependency must be an element of the same session",
        )),
    }
}

fn handle_elements_create(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let session_id = required_str(req, "sessionId")?;
    sessions::owned(conn, caller(req), session_id)?;
    let input: NewElement = params(req)?;

    let tx = conn.unchecked_transaction()?;
    let (element_id, order) = elements::append(&tx, session_id, &input)?;
    tx.commit()?;

    tracing::info!(session_id, element_id = %element_id, order, "created element");
    Ok(json!({ "elementId": element_id, "order": order }))
}

fn handle_elements_import(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let session_id = required_str(req, "sessionId")?;
    sessions::owned(conn, caller(req), session_id)?;
    let input: ImportParams = params(req)?;

    let tx = conn.unchecked_transaction()?;
    let mut ids = Vec::with_capacity(input.elements.len());
    for element in &input.elements {
        let (element_id, _) = elements::append(&tx, session_id, element)?;
        ids.push(element_id);
    }
    tx.commit()?;

    tracing::info!(session_id, imported = ids.len(), "imported elements");
    Ok(json!({ "elementIds": ids }))
}

fn handle_elements_duplicate(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let (element, _) = elements::owned(conn, caller(req), required_str(req, "elementId")?)?;

    let tx = conn.unchecked_transaction()?;
    let (element_id, order) = elements::duplicate(&tx, &element)?;
    tx.commit()?;

    Ok(json!({ "elementId": element_id, "order": order }))
}

fn handle_elements_update(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let (element, _) = elements::owned(conn, caller(req), required_str(req, "elementId")?)?;
    let patch: ElementPatch = params(req)?;
    let touched = elements::update(conn, &element.id, &patch)?;
    Ok(json!({ "ok": true, "fieldsUpdated": touched }))
}

fn handle_elements_set_active(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let (element, _) = elements::owned(conn, caller(req), required_str(req, "elementId")?)?;
    let active = required_bool(req, "active")?;
    elements::set_active(conn, &element.id, active)?;
    Ok(json!({ "ok": true }))
}

fn handle_elements_set_conditional_logic(
    state: &mut AppState,
    req: &Request,
) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let (element, _) = elements::owned(conn, caller(req), required_str(req, "elementId")?)?;
    let logic: Option<ConditionalLogic> = optional_field(req, "conditionalLogic")?;
    if let Some(logic) = logic.as_ref() {
        validate_logic(conn, &element, logic)?;
    }
    elements::set_conditional_logic(conn, &element.id, logic.as_ref())?;
    Ok(json!({ "ok": true }))
}

fn handle_elements_delete(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let (element, _) = elements::owned(conn, caller(req), required_str(req, "elementId")?)?;

    let tx = conn.unchecked_transaction()?;
    let removed = elements::delete(&tx, &element)?;
    tx.commit()?;

    tracing::info!(element_id = %element.id, responses = removed, "deleted element");
    Ok(json!({ "ok": true, "responsesDeleted": removed }))
}

fn handle_elements_reorder(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let session_id = required_str(req, "sessionId")?;
    sessions::owned(conn, caller(req), session_id)?;
    let input: ReorderParams = params(req)?;
    let patches: Vec<OrderPatch> = input
        .element_orders
        .into_iter()
        .map(|o| OrderPatch {
            id: o.element_id,
            order: o.order,
        })
        .collect();

    let tx = conn.unchecked_transaction()?;
    let applied = elements::bulk_reorder(&tx, session_id, &patches)?;
    let orders: Vec<i64> = elements::order_slots(&tx, session_id)?
        .into_iter()
        .map(|s| s.order)
        .collect();
    tx.commit()?;

    if applied < patches.len() {
        tracing::debug!(
            session_id,
            skipped = patches.len() - applied,
            "reorder named elements outside the session"
        );
    }
    // Left as written; the next delete or move renumbers.
    let dense = ordering::is_dense(&orders);
    if !dense {
        tracing::debug!(session_id, "reorder left gaps or duplicate orders");
    }
    Ok(json!({ "ok": true, "applied": applied, "dense": dense }))
}

fn handle_elements_move(
    state: &mut AppState,
    req: &Request,
    direction: Direction,
) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let (element, _) = elements::owned(conn, caller(req), required_str(req, "elementId")?)?;

    let tx = conn.unchecked_transaction()?;
    let moved = elements::step_move(&tx, &element, direction)?;
    tx.commit()?;

    Ok(json!({ "moved": moved }))
}

fn handle_elements_normalize(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let session_id = required_str(req, "sessionId")?;
    sessions::owned(conn, caller(req), session_id)?;

    let tx = conn.unchecked_transaction()?;
    let patched = elements::normalize(&tx, session_id)?;
    tx.commit()?;

    Ok(json!({ "patched": patched }))
}

fn handle_elements_normalize_all(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let conn = db_conn(state)?;
    let teacher_id = caller(req).ok_or(ApiError::Unauthenticated)?;

    let tx = conn.unchecked_transaction()?;
    let mut sessions_fixed = 0;
    let mut elements_fixed = 0;
    for session in sessions::list_for_teacher(&tx, teacher_id)? {
        let patched = elements::normalize(&tx, &session.id)?;
        if patched > 0 {
            sessions_fixed += 1;
            elements_fixed += patched;
        }
    }
    tx.commit()?;

    Ok(json!({
        "sessionsFixed": sessions_fixed,
        "elementsFixed": elements_fixed,
    }))
}

fn handle_elements_list(state: &mut AppState, req: &Request) -> ApiResult<serde_json::Value> {
    let (conn, ws) = workspace(state)?;
    let session_id = required_str(req, "sessionId")?;
    let rows = elements::list_for_session(conn, session_id)?;
    element_views(&UrlResolver::new(conn, ws), &rows)
}

fn handle_elements_visible_for_participant(
    state: &mut AppState,
    req: &Request,
) -> ApiResult<serde_json::Value> {
    let (conn, ws) = workspace(state)?;
    let session_id = required_str(req, "sessionId")?;
    let participant_id = required_str(req, "participantId")?;

    let rows = elements::list_for_session(conn, session_id)?;
    let answers: HashMap<String, ResponseSlots> =
        responses::for_participant(conn, session_id, participant_id)?
            .into_iter()
            .map(|r| (r.element_id, r.slots))
            .collect();
    let visible = visibility::visible_elements(&rows, &answers);
    element_views(&UrlResolver::new(conn, ws), visible)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "elements.create" => handle_elements_create(state, req),
        "elements.import" => handle_elements_import(state, req),
        "elements.duplicate" => handle_elements_duplicate(state, req),
        "elements.update" => handle_elements_update(state, req),
        "elements.setActive" => handle_elements_set_active(state, req),
        "elements.setConditionalLogic" => handle_elements_set_conditional_logic(state, req),
        "elements.delete" => handle_elements_delete(state, req),
        "elements.reorder" => handle_elements_reorder(state, req),
        "elements.moveUp" => handle_elements_move(state, req, Direction::Up),
        "elements.moveDown" => handle_elements_move(state, req, Direction::Down),
        "elements.normalize" => handle_elements_normalize(state, req),
        "elements.normalizeAll" => handle_elements_normalize_all(state, req),
        "elements.list" => handle_elements_list(state, req),
        "elements.visibleForParticipant" => handle_elements_visible_for_participant(state, req),
        _ => return None,
    };
    Some(reply(&req.id, result))
}
