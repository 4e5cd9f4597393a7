use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

use crate::auth::IdentityVerifier;
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};

/// Sign-in exchange: verify the caller's opaque idToken, map the subject to
/// the local user, and return role + profile + the role's landing path.
fn login(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let identity = state
        .identity
        .as_ref()
        .ok_or_else(HandlerErr::no_workspace)?;

    let id_token = get_required_str(params, "idToken")?;
    let claims = identity.verify(&id_token).map_err(HandlerErr::identity)?;

    let row = conn
        .query_row(
            "SELECT email, name, role, university_id FROM users WHERE identity_uid = ?",
            [&claims.uid],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            },
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some((email, name, role, university_id)) = row else {
        return Err(HandlerErr::unauthorized("no user for token subject"));
    };

    let redirect_url = match role.as_str() {
        "admin" => "/admin",
        "faculty" => "/faculty",
        _ => "/student",
    };
    let profile = profile_for_role(conn, &role, &email)?;

    Ok(json!({
        "role": role,
        "redirectUrl": redirect_url,
        "email": email,
        "name": name,
        "universityId": university_id,
        "profile": profile
    }))
}

fn profile_for_role(
    conn: &Connection,
    role: &str,
    email: &str,
) -> Result<serde_json::Value, HandlerErr> {
    match role {
        "student" => conn
            .query_row(
                "SELECT course, branch, semester, year, roll_no FROM students WHERE email = ?",
                [email],
                |r| {
                    Ok(json!({
                        "course": r.get::<_, String>(0)?,
                        "branch": r.get::<_, String>(1)?,
                        "semester": r.get::<_, i64>(2)?,
                        "year": r.get::<_, i64>(3)?,
                        "rollNo": r.get::<_, String>(4)?
                    }))
                },
            )
            .optional()
            .map(|v| v.unwrap_or(serde_json::Value::Null))
            .map_err(HandlerErr::db_query),
        "faculty" => conn
            .query_row(
                "SELECT department FROM faculty WHERE email = ?",
                [email],
                |r| Ok(json!({ "department": r.get::<_, String>(0)? })),
            )
            .optional()
            .map(|v| v.unwrap_or(serde_json::Value::Null))
            .map_err(HandlerErr::db_query),
        _ => Ok(serde_json::Value::Null),
    }
}

/// Local stand-in for the identity provider's password sign-in: returns a
/// fresh opaque bearer token for subsequent requests.
fn issue_token(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let identity = state
        .identity
        .as_mut()
        .ok_or_else(HandlerErr::no_workspace)?;
    let email = get_required_str(params, "email")?;
    let password = get_required_str(params, "password")?;
    let token = identity
        .authenticate(&email, &password)
        .map_err(HandlerErr::identity)?;
    Ok(json!({ "token": token }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(match login(state, &req.params) {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        "auth.issueToken" => Some(match issue_token(state, &req.params) {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        _ => None,
    }
}
