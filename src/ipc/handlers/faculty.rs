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
    authorize(subject, Resource::FacultyRecord { email: &email }, Action::Read)?;

    let row = conn
        .query_row(
            "SELECT email, name, department, university_id, contact_number,
                dob, gender, address, profile_image
             FROM faculty WHERE email = ?",
            [&email],
            |r| {
                let image: Option<Vec<u8>> = r.get(8)?;
                Ok(json!({
                    "email": r.get::<_, String>(0)?,
                    "name": r.get::<_, String>(1)?,
                    "department": r.get::<_, String>(2)?,
                    "universityId": r.get::<_, String>(3)?,
                    "contactNumber": r.get::<_, String>(4)?,
                    "dob": r.get::<_, String>(5)?,
                    "gender": r.get::<_, Option<String>>(6)?,
                    "address": r.get::<_, Option<String>>(7)?,
                    "profileImageBase64": image.map(|b| encode_base64(&b))
                }))
            },
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    row.map(|fac| json!({ "faculty": fac }))
        .ok_or_else(|| HandlerErr::not_found("faculty not found"))
}

fn set_profile_image(
    state: &AppState,
    params: &serde_json::Value,
    subject: &AuthSubject,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let email = get_required_str(params, "email")?;
    authorize(subject, Resource::FacultyRecord { email: &email }, Action::Write)?;

    let data = get_required_str(params, "imageBase64")?;
    let bytes = decode_base64_limited(&data, MAX_PROFILE_IMAGE_BYTES, "profile image")?;

    let changed = conn
        .execute(
            "UPDATE faculty SET profile_image = ?, updated_at = ? WHERE email = ?",
            (&bytes, &chrono::Utc::now().to_rfc3339(), &email),
        )
        .map_err(|e| HandlerErr::db_update(e, "faculty"))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("faculty not found"));
    }
    Ok(json!({ "email": email, "imageBytes": bytes.len() }))
}

/// Subjects this faculty member teaches, with roster sizes.
fn subjects(
    state: &AppState,
    params: &serde_json::Value,
    subject: &AuthSubject,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let email = get_required_str(params, "email")?;
    authorize(subject, Resource::FacultyRecord { email: &email }, Action::Read)?;

    let mut stmt = conn
        .prepare(
            "SELECT se.id, se.subject_name, se.subject_code, se.credits,
                (SELECT COUNT(*) FROM enrollment_members em WHERE em.subject_id = se.id)
             FROM subject_enrollments se
             WHERE se.faculty_email = ?
             ORDER BY se.subject_code",
        )
        .map_err(HandlerErr::db_query)?;
    let subjects = stmt
        .query_map([&email], |r| {
            Ok(json!({
                "subjectId": r.get::<_, String>(0)?,
                "subjectName": r.get::<_, String>(1)?,
                "subjectCode": r.get::<_, String>(2)?,
                "credits": r.get::<_, i64>(3)?,
                "rosterSize": r.get::<_, i64>(4)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(json!({ "subjects": subjects }))
}

pub fn try_handle(
    state: &mut AppState,
    req: &Request,
    subject: &AuthSubject,
) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "faculty.getProfile" => get_profile(state, &req.params, subject),
        "faculty.setProfileImage" => set_profile_image(state, &req.params, subject),
        "faculty.subjects" => subjects(state, &req.params, subject),
        _ => return None,
    };
    Some(match result {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
