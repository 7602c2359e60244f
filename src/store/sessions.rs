use std::collections::HashMap;

use rand::Rng;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Deserialize;
use uuid::Uuid;

use super::{bool_to_int, elements, now_ts};
use crate::error::{ApiError, ApiResult};
use crate::model::{ConditionalLogic, Session};

const SESSION_COLUMNS: &str = "id, title, description, teacher_id, active, session_code,
    results_public, results_pin_code, completion_title, completion_subtitle,
    completion_description, completion_image_id, bg_color, accent_color, created_at";

const CODE_ATTEMPTS: usize = 10_000;

/// Optional session fields, shared by create and update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    pub title: Option<String>,
    pub description: Option<String>,
    pub results_public: Option<bool>,
    pub results_pin_code: Option<String>,
    pub completion_title: Option<String>,
    pub completion_subtitle: Option<String>,
    pub completion_description: Option<String>,
    pub completion_image_id: Option<String>,
    pub bg_color: Option<String>,
    pub accent_color: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeCounts {
    pub responses: usize,
    pub elements: usize,
    pub sessions: usize,
}

fn session_from_row(r: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: r.get(0)?,
        title: r.get(1)?,
        description: r.get(2)?,
        teacher_id: r.get(3)?,
        active: r.get::<_, i64>(4)? != 0,
        session_code: r.get(5)?,
        results_public: r.get::<_, Option<i64>>(6)?.map(|v| v != 0),
        results_pin_code: r.get(7)?,
        completion_title: r.get(8)?,
        completion_subtitle: r.get(9)?,
        completion_description: r.get(10)?,
        completion_image_id: r.get(11)?,
        bg_color: r.get(12)?,
        accent_color: r.get(13)?,
        created_at: r.get(14)?,
    })
}

pub fn get(conn: &Connection, session_id: &str) -> rusqlite::Result<Option<Session>> {
    conn.query_row(
        &format!("SELECT {} FROM sessions WHERE id = ?", SESSION_COLUMNS),
        [session_id],
        session_from_row,
    )
    .optional()
}

pub fn by_code(conn: &Connection, code: &str) -> rusqlite::Result<Option<Session>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM sessions WHERE session_code = ? LIMIT 1",
            SESSION_COLUMNS
        ),
        [code],
        session_from_row,
    )
    .optional()
}

/// Newest first.
pub fn list_for_teacher(conn: &Connection, teacher_id: &str) -> rusqlite::Result<Vec<Session>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM sessions WHERE teacher_id = ? ORDER BY created_at DESC, rowid DESC",
        SESSION_COLUMNS
    ))?;
    let rows = stmt.query_map([teacher_id], session_from_row)?;
    rows.collect()
}

/// Resolves a session the caller owns. Missing and foreign sessions are
/// reported the same way.
pub fn owned(conn: &Connection, caller: Option<&str>, session_id: &str) -> ApiResult<Session> {
    let caller = caller.ok_or(ApiError::Unauthenticated)?;
    match get(conn, session_id)? {
        Some(session) if session.teacher_id == caller => Ok(session),
        _ => Err(ApiError::Unauthorized("session not found or unauthorized")),
    }
}

pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    rng.gen_range(100_000..1_000_000).to_string()
}

/// Draws codes from `next` until one is not used by any session.
pub fn unique_code<F>(conn: &Connection, mut next: F) -> ApiResult<String>
where
    F: FnMut() -> String,
{
    for _ in 0..CODE_ATTEMPTS {
        let code = next();
        let taken: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sessions WHERE session_code = ? LIMIT 1",
                [&code],
                |r| r.get(0),
            )
            .optional()?;
        if taken.is_none() {
            return Ok(code);
        }
        tracing::debug!(code = %code, "session code collision, drawing again");
    }
    Err(ApiError::Internal(
        "could not allocate a free session code".to_string(),
    ))
}

pub fn insert(conn: &Connection, session: &Session) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO sessions(
            id, title, description, teacher_id, active, session_code,
            results_public, results_pin_code, completion_title, completion_subtitle,
            completion_description, completion_image_id, bg_color, accent_color, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            session.id,
            session.title,
            session.description,
            session.teacher_id,
            bool_to_int(session.active),
            session.session_code,
            session.results_public.map(bool_to_int),
            session.results_pin_code,
            session.completion_title,
            session.completion_subtitle,
            session.completion_description,
            session.completion_image_id,
            session.bg_color,
            session.accent_color,
            session.created_at,
        ],
    )?;
    Ok(())
}

pub fn create(
    conn: &Connection,
    teacher_id: &str,
    title: String,
    settings: SessionSettings,
    session_code: String,
) -> rusqlite::Result<Session> {
    let session = Session {
        id: Uuid::new_v4().to_string(),
        title,
        description: settings.description,
        teacher_id: teacher_id.to_string(),
        active: true,
        session_code,
        results_public: Some(settings.results_public.unwrap_or(true)),
        results_pin_code: settings.results_pin_code,
        completion_title: settings.completion_title,
        completion_subtitle: settings.completion_subtitle,
        completion_description: settings.completion_description,
        completion_image_id: settings.completion_image_id,
        bg_color: settings.bg_color,
        accent_color: settings.accent_color,
        created_at: now_ts(),
    };
    insert(conn, &session)?;
    Ok(session)
}

/// Writes only the supplied fields. Returns the number of columns touched.
pub fn update(conn: &Connection, session_id: &str, settings: &SessionSettings) -> rusqlite::Result<usize> {
    let mut fields: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    let texts = [
        ("title = ?", &settings.title),
        ("description = ?", &settings.description),
        ("results_pin_code = ?", &settings.results_pin_code),
        ("completion_title = ?", &settings.completion_title),
        ("completion_subtitle = ?", &settings.completion_subtitle),
        ("completion_description = ?", &settings.completion_description),
        ("completion_image_id = ?", &settings.completion_image_id),
        ("bg_color = ?", &settings.bg_color),
        ("accent_color = ?", &settings.accent_color),
    ];
    for (field, value) in texts {
        if let Some(v) = value {
            fields.push(field);
            values.push(Value::Text(v.clone()));
        }
    }
    if let Some(public) = settings.results_public {
        fields.push("results_public = ?");
        values.push(Value::Integer(bool_to_int(public)));
    }

    if fields.is_empty() {
        return Ok(0);
    }
    let touched = fields.len();
    values.push(Value::Text(session_id.to_string()));
    let sql = format!("UPDATE sessions SET {} WHERE id = ?", fields.join(", "));
    conn.execute(&sql, params_from_iter(values))?;
    Ok(touched)
}

pub fn set_active(conn: &Connection, session_id: &str, active: bool) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE sessions SET active = ? WHERE id = ?",
        params![bool_to_int(active), session_id],
    )
}

/// Deletes responses, then elements, then the session row. Rows already gone
/// are simply not counted, so repeating a half-finished cascade is safe.
pub fn delete_cascade(conn: &Connection, session_id: &str) -> rusqlite::Result<CascadeCounts> {
    let responses = conn.execute(
        "DELETE FROM responses
         WHERE session_id = ?1
            OR element_id IN (SELECT id FROM elements WHERE session_id = ?1)",
        [session_id],
    )?;
    let elements = conn.execute("DELETE FROM elements WHERE session_id = ?", [session_id])?;
    let sessions = conn.execute("DELETE FROM sessions WHERE id = ?", [session_id])?;
    Ok(CascadeCounts {
        responses,
        elements,
        sessions,
    })
}

/// Copies a session and its elements for `teacher_id`. The copy starts
/// inactive under a fresh code; enabled rules are remapped onto the copied
/// elements and dropped when their dependency is not part of the copy.
pub fn clone_session(
    conn: &Connection,
    source: &Session,
    teacher_id: &str,
    session_code: String,
) -> rusqlite::Result<Session> {
    let copy = Session {
        id: Uuid::new_v4().to_string(),
        title: format!("{} (Copy)", source.title),
        teacher_id: teacher_id.to_string(),
        active: false,
        session_code,
        created_at: now_ts(),
        ..source.clone()
    };
    insert(conn, &copy)?;

    let originals = elements::list_for_session(conn, &source.id)?;
    let mut id_map: HashMap<String, String> = HashMap::with_capacity(originals.len());
    for element in &originals {
        let new_id = elements::insert_copy(conn, element, &copy.id, element.order, None)?;
        id_map.insert(element.id.clone(), new_id);
    }

    for element in &originals {
        let Some(logic) = element.conditional_logic.as_ref().filter(|l| l.enabled) else {
            continue;
        };
        let (Some(new_id), Some(new_dep)) = (
            id_map.get(&element.id),
            id_map.get(&logic.depends_on_element_id),
        ) else {
            continue;
        };
        let remapped = ConditionalLogic {
            depends_on_element_id: new_dep.clone(),
            ..logic.clone()
        };
        elements::set_conditional_logic(conn, new_id, Some(&remapped))?;
    }

    Ok(copy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_conn(prefix: &str) -> Connection {
        let dir = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        db::open_db(&dir).expect("open db")
    }

    #[test]
    fn generated_codes_have_six_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let code = generate_code(&mut rng);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert!(!code.starts_with('0'));
        }
    }

    #[test]
    fn unique_code_retries_past_codes_in_use() {
        let conn = temp_conn("pollupd-code-retry");
        create(&conn, "t1", "First".into(), SessionSettings::default(), "111111".into())
            .expect("create");

        let mut draws = vec!["222222", "111111", "111111"];
        let code = unique_code(&conn, || draws.pop().expect("draw").to_string()).expect("code");
        assert_eq!(code, "222222");
        assert!(draws.is_empty());
    }

    #[test]
    fn update_touches_only_supplied_fields() {
        let conn = temp_conn("pollupd-session-update");
        let settings = SessionSettings {
            description: Some("before".into()),
            bg_color: Some("#fff".into()),
            ..Default::default()
        };
        let s = create(&conn, "t1", "Quiz".into(), settings, "333333".into()).expect("create");
        assert_eq!(s.results_public, Some(true));

        let patch = SessionSettings {
            description: Some("after".into()),
            results_public: Some(false),
            ..Default::default()
        };
        assert_eq!(update(&conn, &s.id, &patch).expect("update"), 2);
        let reloaded = get(&conn, &s.id).expect("get").expect("row");
        assert_eq!(reloaded.description.as_deref(), Some("after"));
        assert_eq!(reloaded.bg_color.as_deref(), Some("#fff"));
        assert_eq!(reloaded.results_public, Some(false));
        assert_eq!(reloaded.title, "Quiz");
    }

    #[test]
    fn owned_hides_foreign_and_missing_sessions_alike() {
        let conn = temp_conn("pollupd-session-owned");
        let s = create(&conn, "t1", "Quiz".into(), SessionSettings::default(), "444444".into())
            .expect("create");
        assert!(owned(&conn, Some("t1"), &s.id).is_ok());
        assert!(matches!(owned(&conn, None, &s.id), Err(ApiError::Unauthenticated)));
        let foreign = owned(&conn, Some("t2"), &s.id).unwrap_err();
        let missing = owned(&conn, Some("t2"), "nope").unwrap_err();
        assert_eq!(foreign.code(), missing.code());
        assert_eq!(foreign.to_string(), missing.to_string());
    }
}
