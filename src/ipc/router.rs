use super::error::err;
use super::handlers;
use super::helpers;
use super::types::{AppState, Request};

/// Method families that require an authenticated subject. Everything else is
/// either core/sign-in (handled first) or unknown.
const AUTHENTICATED_FAMILIES: &[&str] = &[
    "admin.",
    "students.",
    "faculty.",
    "enrollment.",
    "attendance.",
    "announcements.",
    "calendar.",
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::auth::try_handle(state, &req) {
        return resp;
    }

    if !AUTHENTICATED_FAMILIES
        .iter()
        .any(|p| req.method.starts_with(p))
    {
        return err(
            &req.id,
            "not_implemented",
            format!("unknown method: {}", req.method),
            None,
        );
    }

    let subject = match helpers::authenticate(state, &req) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };

    if let Some(resp) = handlers::admin::try_handle(state, &req, &subject) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, &req, &subject) {
        return resp;
    }
    if let Some(resp) = handlers::faculty::try_handle(state, &req, &subject) {
        return resp;
    }
    if let Some(resp) = handlers::enrollment::try_handle(state, &req, &subject) {
        return resp;
    }
    if let Some(resp) = handlers::attendance::try_handle(state, &req, &subject) {
        return resp;
    }
    if let Some(resp) = handlers::announcements::try_handle(state, &req, &subject) {
        return resp;
    }
    if let Some(resp) = handlers::calendar::try_handle(state, &req, &subject) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
