use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

use crate::auth::{FileIdentityStore, IdentityVerifier};
use crate::db;
use crate::idgen;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let conn = match db::open_db(&path) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    };
    let identity = match FileIdentityStore::open(&path) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "identity_open_failed", format!("{e:?}"), None),
    };

    tracing::info!(path = %path.display(), "workspace opened");
    state.workspace = Some(path.clone());
    state.db = Some(conn);
    state.identity = Some(identity);
    ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
}

/// Creates the first admin of an empty workspace. Refused once any user
/// exists; from then on provisioning goes through admin.* with a token.
fn workspace_bootstrap(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let AppState { db, identity, .. } = state;
    let conn = db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let identity = identity.as_mut().ok_or_else(HandlerErr::no_workspace)?;

    let email = get_required_str(&req.params, "email")?;
    let name = get_required_str(&req.params, "name")?;
    let contact_number = get_required_str(&req.params, "contactNumber")?;
    let password = get_optional_str(&req.params, "password");

    let user_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
        .map_err(HandlerErr::db_query)?;
    if user_count > 0 {
        return Err(HandlerErr::access_denied(
            "workspace already has users; use admin.createAdmin",
        ));
    }

    let mut rng = rand::thread_rng();
    let university_id = idgen::university_id(&name, &contact_number, &mut rng);
    let generated = password.is_none();
    let password = password.unwrap_or_else(|| idgen::generate_password(&mut rng));

    let tx = conn.unchecked_transaction().map_err(HandlerErr::db_tx)?;
    tx.execute(
        "INSERT INTO admins(id, email, name, university_id, contact_number)
         VALUES(?, ?, ?, ?, ?)",
        (
            &Uuid::new_v4().to_string(),
            &email,
            &name,
            &university_id,
            &contact_number,
        ),
    )
    .map_err(|e| HandlerErr::db_insert(e, "admins"))?;

    let uid = identity
        .create_account(&email, &password)
        .map_err(HandlerErr::identity)?;
    if let Err(e) = tx.execute(
        "INSERT INTO users(id, identity_uid, email, name, role, university_id)
         VALUES(?, ?, ?, ?, 'admin', ?)",
        (
            &Uuid::new_v4().to_string(),
            &uid,
            &email,
            &name,
            &university_id,
        ),
    ) {
        let _ = identity.delete_account(&uid);
        return Err(HandlerErr::db_insert(e, "users"));
    }
    if let Err(e) = tx.commit() {
        let _ = identity.delete_account(&uid);
        return Err(HandlerErr::db_commit(e));
    }

    let mut result = json!({
        "email": email,
        "name": name,
        "role": "admin",
        "universityId": university_id
    });
    if generated {
        result["initialPassword"] = json!(password);
    }
    Ok(result)
}

fn handle_workspace_bootstrap(state: &mut AppState, req: &Request) -> serde_json::Value {
    match workspace_bootstrap(state, req) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "workspace.bootstrap" => Some(handle_workspace_bootstrap(state, req)),
        _ => None,
    }
}
