use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Deserialize;
use uuid::Uuid;

use super::{bool_to_int, from_json_text, now_ts, sessions, to_json_text};
use crate::error::{ApiError, ApiResult};
use crate::model::{Choice, ConditionalLogic, Element, ElementKind, Session};
use crate::ordering::{self, Direction, OrderPatch, OrderSlot};

const ELEMENT_COLUMNS: &str = "id, session_id, kind, title, subtitle, description, image_id,
    sort_order, active, choices_json, min_value, max_value, step, conditional_logic_json";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewElement {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub choices: Option<Vec<Choice>>,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
    #[serde(default)]
    pub step: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementPatch {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub image_id: Option<String>,
    pub choices: Option<Vec<Choice>>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub step: Option<f64>,
}

fn element_from_row(r: &Row<'_>) -> rusqlite::Result<Element> {
    let kind_raw: String = r.get(2)?;
    let kind = ElementKind::parse(&kind_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown element kind: {}", kind_raw).into(),
        )
    })?;
    Ok(Element {
        id: r.get(0)?,
        session_id: r.get(1)?,
        kind,
        title: r.get(3)?,
        subtitle: r.get(4)?,
        description: r.get(5)?,
        image_id: r.get(6)?,
        order: r.get(7)?,
        active: r.get::<_, i64>(8)? != 0,
        choices: from_json_text(9, r.get(9)?)?,
        min_value: r.get(10)?,
        max_value: r.get(11)?,
        step: r.get(12)?,
        conditional_logic: from_json_text(13, r.get(13)?)?,
    })
}

pub fn get(conn: &Connection, element_id: &str) -> rusqlite::Result<Option<Element>> {
    conn.query_row(
        &format!("SELECT {} FROM elements WHERE id = ?", ELEMENT_COLUMNS),
        [element_id],
        element_from_row,
    )
    .optional()
}

/// All elements of a session, ascending by stored order, ties by insertion.
pub fn list_for_session(conn: &Connection, session_id: &str) -> rusqlite::Result<Vec<Element>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM elements WHERE session_id = ? ORDER BY sort_order, rowid",
        ELEMENT_COLUMNS
    ))?;
    let rows = stmt.query_map([session_id], element_from_row)?;
    rows.collect()
}

pub fn order_slots(conn: &Connection, session_id: &str) -> rusqlite::Result<Vec<OrderSlot>> {
    let mut stmt = conn.prepare(
        "SELECT id, sort_order FROM elements WHERE session_id = ? ORDER BY sort_order, rowid",
    )?;
    let rows = stmt.query_map([session_id], |r| {
        Ok(OrderSlot {
            id: r.get(0)?,
            order: r.get(1)?,
        })
    })?;
    rows.collect()
}

pub fn apply_patches(conn: &Connection, patches: &[OrderPatch]) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare("UPDATE elements SET sort_order = ? WHERE id = ?")?;
    let mut changed = 0;
    for p in patches {
        changed += stmt.execute(params![p.order, p.id])?;
    }
    Ok(changed)
}

/// Resolves an element whose session the caller owns.
pub fn owned(conn: &Connection, caller: Option<&str>, element_id: &str) -> ApiResult<(Element, Session)> {
    let caller = caller.ok_or(ApiError::Unauthenticated)?;
    let element = get(conn, element_id)?.ok_or(ApiError::NotFound("element"))?;
    match sessions::get(conn, &element.session_id)? {
        Some(session) if session.teacher_id == caller => Ok((element, session)),
        _ => Err(ApiError::Unauthorized("unauthorized")),
    }
}

pub fn insert(conn: &Connection, session_id: &str, input: &NewElement, order: i64) -> rusqlite::Result<String> {
    let element_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO elements(
            id, session_id, kind, title, subtitle, description, image_id, sort_order, active,
            choices_json, min_value, max_value, step, conditional_logic_json, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?, ?, NULL, ?)",
        params![
            element_id,
            session_id,
            input.kind.as_str(),
            input.title,
            input.subtitle,
            input.description,
            input.image_id,
            order,
            to_json_text(input.choices.as_ref())?,
            input.min_value,
            input.max_value,
            input.step,
            now_ts(),
        ],
    )?;
    Ok(element_id)
}

/// Inserts a copy of `source` into `session_id` without its conditional logic.
pub fn insert_copy(
    conn: &Connection,
    source: &Element,
    session_id: &str,
    order: i64,
    title: Option<String>,
) -> rusqlite::Result<String> {
    let element_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO elements(
            id, session_id, kind, title, subtitle, description, image_id, sort_order, active,
            choices_json, min_value, max_value, step, conditional_logic_json, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?)",
        params![
            element_id,
            session_id,
            source.kind.as_str(),
            title.unwrap_or_else(|| source.title.clone()),
            source.subtitle,
            source.description,
            source.image_id,
            order,
            bool_to_int(source.active),
            to_json_text(source.choices.as_ref())?,
            source.min_value,
            source.max_value,
            source.step,
            now_ts(),
        ],
    )?;
    Ok(element_id)
}

/// Appends after the current maximum order. Density is left to the
/// normalizing paths.
pub fn append(conn: &Connection, session_id: &str, input: &NewElement) -> rusqlite::Result<(String, i64)> {
    let slots = order_slots(conn, session_id)?;
    let order = ordering::next_order(slots.iter().map(|s| s.order));
    let element_id = insert(conn, session_id, input, order)?;
    Ok((element_id, order))
}

pub fn duplicate(conn: &Connection, source: &Element) -> rusqlite::Result<(String, i64)> {
    let slots = order_slots(conn, &source.session_id)?;
    let order = ordering::next_order(slots.iter().map(|s| s.order));
    let element_id = insert_copy(
        conn,
        source,
        &source.session_id,
        order,
        Some(format!("{} (Copy)", source.title)),
    )?;
    Ok((element_id, order))
}

/// Writes only the supplied fields. Returns the number of columns touched.
pub fn update(conn: &Connection, element_id: &str, patch: &ElementPatch) -> rusqlite::Result<usize> {
    let mut fields: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    let texts = [
        ("title = ?", &patch.title),
        ("subtitle = ?", &patch.subtitle),
        ("description = ?", &patch.description),
        ("image_id = ?", &patch.image_id),
    ];
    for (field, value) in texts {
        if let Some(v) = value {
            fields.push(field);
            values.push(Value::Text(v.clone()));
        }
    }
    let reals = [
        ("min_value = ?", patch.min_value),
        ("max_value = ?", patch.max_value),
        ("step = ?", patch.step),
    ];
    for (field, value) in reals {
        if let Some(v) = value {
            fields.push(field);
            values.push(Value::Real(v));
        }
    }
    if let Some(choices) = to_json_text(patch.choices.as_ref())? {
        fields.push("choices_json = ?");
        values.push(Value::Text(choices));
    }

    if fields.is_empty() {
        return Ok(0);
    }
    let touched = fields.len();
    values.push(Value::Text(element_id.to_string()));
    let sql = format!("UPDATE elements SET {} WHERE id = ?", fields.join(", "));
    conn.execute(&sql, params_from_iter(values))?;
    Ok(touched)
}

pub fn set_active(conn: &Connection, element_id: &str, active: bool) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE elements SET active = ? WHERE id = ?",
        params![bool_to_int(active), element_id],
    )
}

pub fn set_conditional_logic(
    conn: &Connection,
    element_id: &str,
    logic: Option<&ConditionalLogic>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE elements SET conditional_logic_json = ? WHERE id = ?",
        params![to_json_text(logic)?, element_id],
    )
}

/// Renumbers the session to `0..count`. Returns how many rows were patched.
pub fn normalize(conn: &Connection, session_id: &str) -> rusqlite::Result<usize> {
    let slots = order_slots(conn, session_id)?;
    let patches = ordering::normalize_plan(&slots);
    if patches.is_empty() {
        return Ok(0);
    }
    tracing::warn!(
        session_id,
        repaired = patches.len(),
        "element orders were not dense; renumbering"
    );
    apply_patches(conn, &patches)
}

/// Removes the element and its responses, then renumbers what is left.
/// Returns the number of responses removed.
pub fn delete(conn: &Connection, element: &Element) -> rusqlite::Result<usize> {
    let responses = conn.execute("DELETE FROM responses WHERE element_id = ?", [&element.id])?;
    conn.execute("DELETE FROM elements WHERE id = ?", [&element.id])?;
    normalize(conn, &element.session_id)?;
    Ok(responses)
}

/// Applies caller-supplied orders verbatim to elements of `session_id`.
/// Pairs naming other sessions' or unknown elements are skipped; the
/// resulting sequence is not checked for density.
pub fn bulk_reorder(conn: &Connection, session_id: &str, orders: &[OrderPatch]) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare("UPDATE elements SET sort_order = ? WHERE id = ? AND session_id = ?")?;
    let mut applied = 0;
    for p in orders {
        applied += stmt.execute(params![p.order, p.id, session_id])?;
    }
    Ok(applied)
}

/// Swaps the element with its neighbour after repairing the session's
/// orders. `false` at either boundary.
pub fn step_move(conn: &Connection, element: &Element, direction: Direction) -> ApiResult<bool> {
    let slots = order_slots(conn, &element.session_id)?;
    let plan = ordering::step_plan(&slots, &element.id, direction).ok_or(ApiError::NotFound("element"))?;
    if !plan.repairs.is_empty() {
        tracing::warn!(
            session_id = %element.session_id,
            repaired = plan.repairs.len(),
            "element orders were not dense; renumbering before move"
        );
        apply_patches(conn, &plan.repairs)?;
    }
    match plan.swap {
        Some(swap) => {
            apply_patches(conn, &swap)?;
            Ok(true)
        }
        None => Ok(false),
    }
}
