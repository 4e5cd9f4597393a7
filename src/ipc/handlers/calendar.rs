use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::ok;
use crate::ipc::helpers::{
    decode_base64_limited, encode_base64, get_required_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::policy::{authorize, Action, AuthSubject, Resource};

const MAX_CALENDAR_BYTES: usize = 10 * 1024 * 1024;

/// Single-slot semantics: uploading a new calendar replaces the previous one.
fn upload(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let title = get_required_str(params, "title")?;
    let file_name = get_required_str(params, "fileName")?;
    let data = get_required_str(params, "dataBase64")?;
    let bytes = decode_base64_limited(&data, MAX_CALENDAR_BYTES, "calendar file")?;

    let id = Uuid::new_v4().to_string();
    let last_updated = chrono::Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction().map_err(HandlerErr::db_tx)?;
    tx.execute("DELETE FROM calendar_files", [])
        .map_err(|e| HandlerErr::db_update(e, "calendar_files"))?;
    tx.execute(
        "INSERT INTO calendar_files(id, title, file_name, file_data, last_updated)
         VALUES(?, ?, ?, ?, ?)",
        (&id, &title, &file_name, &bytes, &last_updated),
    )
    .map_err(|e| HandlerErr::db_insert(e, "calendar_files"))?;
    tx.commit().map_err(HandlerErr::db_commit)?;

    tracing::info!(file = %file_name, bytes = bytes.len(), "calendar uploaded");
    Ok(json!({
        "calendar": {
            "id": id,
            "title": title,
            "fileName": file_name,
            "fileBytes": bytes.len(),
            "lastUpdated": last_updated
        }
    }))
}

fn get(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let row = conn
        .query_row(
            "SELECT id, title, file_name, file_data, last_updated
             FROM calendar_files ORDER BY last_updated DESC LIMIT 1",
            [],
            |r| {
                let data: Vec<u8> = r.get(3)?;
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "title": r.get::<_, String>(1)?,
                    "fileName": r.get::<_, String>(2)?,
                    "dataBase64": encode_base64(&data),
                    "lastUpdated": r.get::<_, String>(4)?
                }))
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => HandlerErr::not_found("no calendar uploaded"),
            other => HandlerErr::db_query(other),
        })?;
    Ok(json!({ "calendar": row }))
}

fn delete(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let changed = conn
        .execute("DELETE FROM calendar_files", [])
        .map_err(|e| HandlerErr::db_update(e, "calendar_files"))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("no calendar uploaded"));
    }
    Ok(json!({ "deleted": true }))
}

fn gate(subject: &AuthSubject, action: Action) -> Result<(), HandlerErr> {
    authorize(subject, Resource::Calendar, action)?;
    Ok(())
}

pub fn try_handle(
    state: &mut AppState,
    req: &Request,
    subject: &AuthSubject,
) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "calendar.upload" => gate(subject, Action::Write).and_then(|()| upload(state, &req.params)),
        "calendar.get" => gate(subject, Action::Read).and_then(|()| get(state)),
        "calendar.delete" => gate(subject, Action::Write).and_then(|()| delete(state)),
        _ => return None,
    };
    Some(match result {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
