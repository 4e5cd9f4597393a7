use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::ok;
use crate::ipc::helpers::{get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::policy::{authorize, Action, AuthSubject, Resource};

fn create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let message = get_required_str(params, "message")?;
    if message.trim().is_empty() {
        return Err(HandlerErr::bad_params("message must not be empty"));
    }

    let id = Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO announcements(id, message, created_at) VALUES(?, ?, ?)",
        (&id, &message, &created_at),
    )
    .map_err(|e| HandlerErr::db_insert(e, "announcements"))?;
    Ok(json!({
        "announcement": { "id": id, "message": message, "createdAt": created_at }
    }))
}

fn list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let mut stmt = conn
        .prepare("SELECT id, message, created_at FROM announcements ORDER BY created_at DESC")
        .map_err(HandlerErr::db_query)?;
    let announcements = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "message": r.get::<_, String>(1)?,
                "createdAt": r.get::<_, String>(2)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(json!({ "announcements": announcements }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let id = get_required_str(params, "id")?;
    let changed = conn
        .execute("DELETE FROM announcements WHERE id = ?", [&id])
        .map_err(|e| HandlerErr::db_update(e, "announcements"))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("announcement not found"));
    }
    Ok(json!({ "id": id, "deleted": true }))
}

fn gate(subject: &AuthSubject, action: Action) -> Result<(), HandlerErr> {
    authorize(subject, Resource::Announcements, action)?;
    Ok(())
}

pub fn try_handle(
    state: &mut AppState,
    req: &Request,
    subject: &AuthSubject,
) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "announcements.create" => {
            gate(subject, Action::Write).and_then(|()| create(state, &req.params))
        }
        "announcements.list" => gate(subject, Action::Read).and_then(|()| list(state)),
        "announcements.delete" => {
            gate(subject, Action::Write).and_then(|()| delete(state, &req.params))
        }
        _ => return None,
    };
    Some(match result {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
