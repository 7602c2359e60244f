use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{from_json_text, now_ts, to_json_text};
use crate::claims;
use crate::error::{ApiError, ApiResult};
use crate::model::{Element, ElementKind, Response, ResponseSlots};

const RESPONSE_COLUMNS: &str = "id, session_id, element_id, participant_id, text_value,
    number_value, choice_ids_json, file_id, created_at, updated_at";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub response_id: String,
    pub created: bool,
}

fn response_from_row(r: &Row<'_>) -> rusqlite::Result<Response> {
    Ok(Response {
        id: r.get(0)?,
        session_id: r.get(1)?,
        element_id: r.get(2)?,
        participant_id: r.get(3)?,
        slots: ResponseSlots {
            text_value: r.get(4)?,
            number_value: r.get(5)?,
            choice_ids: from_json_text(6, r.get(6)?)?,
            file_id: r.get(7)?,
        },
        created_at: r.get(8)?,
        updated_at: r.get(9)?,
    })
}

fn query_responses(
    conn: &Connection,
    filter: &str,
    args: &[&dyn rusqlite::ToSql],
) -> rusqlite::Result<Vec<Response>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM responses WHERE {} ORDER BY rowid",
        RESPONSE_COLUMNS, filter
    ))?;
    let rows = stmt.query_map(args, response_from_row)?;
    rows.collect()
}

pub fn get(conn: &Connection, response_id: &str) -> rusqlite::Result<Option<Response>> {
    conn.query_row(
        &format!("SELECT {} FROM responses WHERE id = ?", RESPONSE_COLUMNS),
        [response_id],
        response_from_row,
    )
    .optional()
}

pub fn find(conn: &Connection, participant_id: &str, element_id: &str) -> rusqlite::Result<Option<Response>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM responses WHERE participant_id = ? AND element_id = ? LIMIT 1",
            RESPONSE_COLUMNS
        ),
        params![participant_id, element_id],
        response_from_row,
    )
    .optional()
}

pub fn for_participant(
    conn: &Connection,
    session_id: &str,
    participant_id: &str,
) -> rusqlite::Result<Vec<Response>> {
    query_responses(
        conn,
        "session_id = ? AND participant_id = ?",
        &[&session_id, &participant_id],
    )
}

pub fn for_session(conn: &Connection, session_id: &str) -> rusqlite::Result<Vec<Response>> {
    query_responses(conn, "session_id = ?", &[&session_id])
}

pub fn for_element(conn: &Connection, element_id: &str) -> rusqlite::Result<Vec<Response>> {
    query_responses(conn, "element_id = ?", &[&element_id])
}

/// Records `slots` as the participant's single answer to `element`.
///
/// For `single_choice_unique` the first submitted choice must not already be
/// held by another participant. Run inside a transaction so the check and
/// the write cannot interleave with another submission.
pub fn submit(
    conn: &Connection,
    element: &Element,
    participant_id: &str,
    slots: &ResponseSlots,
) -> ApiResult<Submitted> {
    let existing = find(conn, participant_id, &element.id)?;

    if element.kind == ElementKind::SingleChoiceUnique {
        if let Some(choice) = slots.first_choice() {
            let all = for_element(conn, &element.id)?;
            if claims::claimed_by_other(&all, participant_id, choice) {
                return Err(ApiError::ChoiceTaken {
                    element_id: element.id.clone(),
                    choice_id: choice.to_string(),
                });
            }
        }
    }

    let choice_ids = to_json_text(slots.choice_ids.as_ref())?;
    let ts = now_ts();
    match existing {
        Some(previous) => {
            // Every slot is overwritten, including ones this element type never uses.
            conn.execute(
                "UPDATE responses
                 SET text_value = ?, number_value = ?, choice_ids_json = ?, file_id = ?, updated_at = ?
                 WHERE id = ?",
                params![
                    slots.text_value,
                    slots.number_value,
                    choice_ids,
                    slots.file_id,
                    ts,
                    previous.id
                ],
            )?;
            Ok(Submitted {
                response_id: previous.id,
                created: false,
            })
        }
        None => {
            let response_id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO responses(
                    id, session_id, element_id, participant_id, text_value, number_value,
                    choice_ids_json, file_id, created_at, updated_at
                 ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    response_id,
                    element.session_id,
                    element.id,
                    participant_id,
                    slots.text_value,
                    slots.number_value,
                    choice_ids,
                    slots.file_id,
                    ts,
                    ts
                ],
            )?;
            Ok(Submitted {
                response_id,
                created: true,
            })
        }
    }
}

pub fn delete(conn: &Connection, response_id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM responses WHERE id = ?", [response_id])
}

pub fn delete_participant(
    conn: &Connection,
    session_id: &str,
    participant_id: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM responses WHERE session_id = ? AND participant_id = ?",
        params![session_id, participant_id],
    )
}
