use rusqlite::OptionalExtension;
use serde_json::json;

use crate::ipc::error::ok;
use crate::ipc::helpers::{
    decode_base64_limited, encode_base64, get_required_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::policy::{authorize, Action, AuthSubject, Resource};

const MAX_PROFILE_IMAGE_BYTES: usize = 2 * 1024 * 1024;

fn get_profile(
    state: &AppState,
    params: &serde_json::Value,
    subject: &AuthSubject,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let email = get_required_str(params, "email")?;
    authorize(subject, Resource::StudentRecord { email: &email }, Action::Read)?;

    let row = conn
        .query_row(
            "SELECT email, name, course, branch, semester, year, roll_no,
                university_id, enrollment_date, contact_number, dob, gender,
                address, profile_image
             FROM students WHERE email = ?",
            [&email],
            |r| {
                let image: Option<Vec<u8>> = r.get(13)?;
                Ok(json!({
                    "email": r.get::<_, String>(0)?,
                    "name": r.get::<_, String>(1)?,
                    "course": r.get::<_, String>(2)?,
                    "branch": r.get::<_, String>(3)?,
                    "semester": r.get::<_, i64>(4)?,
                    "year": r.get::<_, i64>(5)?,
                    "rollNo": r.get::<_, String>(6)?,
                    "universityId": r.get::<_, String>(7)?,
                    "enrollmentDate": r.get::<_, String>(8)?,
                    "contactNumber": r.get::<_, String>(9)?,
                    "dob": r.get::<_, String>(10)?,
                    "gender": r.get::<_, Option<String>>(11)?,
                    "address": r.get::<_, Option<String>>(12)?,
                    "profileImageBase64": image.map(|b| encode_base64(&b))
                }))
            },
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    row.map(|student| json!({ "student": student }))
        .ok_or_else(|| HandlerErr::not_found("student not found"))
}

fn set_profile_image(
    state: &AppState,
    params: &serde_json::Value,
    subject: &AuthSubject,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let email = get_required_str(params, "email")?;
    authorize(subject, Resource::StudentRecord { email: &email }, Action::Write)?;

    let data = get_required_str(params, "imageBase64")?;
    let bytes = decode_base64_limited(&data, MAX_PROFILE_IMAGE_BYTES, "profile image")?;

    let changed = conn
        .execute(
            "UPDATE students SET profile_image = ?, updated_at = ? WHERE email = ?",
            (&bytes, &chrono::Utc::now().to_rfc3339(), &email),
        )
        .map_err(|e| HandlerErr::db_update(e, "students"))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("student not found"));
    }
    Ok(json!({ "email": email, "imageBytes": bytes.len() }))
}

pub fn try_handle(
    state: &mut AppState,
    req: &Request,
    subject: &AuthSubject,
) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.getProfile" => get_profile(state, &req.params, subject),
        "students.setProfileImage" => set_profile_image(state, &req.params, subject),
        _ => return None,
    };
    Some(match result {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
