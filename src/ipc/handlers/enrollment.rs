use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::ok;
use crate::ipc::helpers::{
    faculty_exists, find_subject, get_required_i64, get_required_str, student_exists, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::policy::{authorize, Action, AuthSubject, Resource, Role};

fn subject_descriptor(
    params: &serde_json::Value,
) -> Result<(String, String, String, i64), HandlerErr> {
    Ok((
        get_required_str(params, "facultyEmail")?,
        get_required_str(params, "subjectName")?,
        get_required_str(params, "subjectCode")?,
        get_required_i64(params, "credits")?,
    ))
}

/// Creates the subject and enrolls every current student as a roster member.
fn create_for_all(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let (faculty_email, subject_name, subject_code, credits) = subject_descriptor(params)?;

    if !faculty_exists(conn, &faculty_email)? {
        return Err(HandlerErr::not_found(format!(
            "faculty not found: {}",
            faculty_email
        )));
    }
    let mut stmt = conn
        .prepare("SELECT email FROM students ORDER BY roll_no")
        .map_err(HandlerErr::db_query)?;
    let emails: Vec<String> = stmt
        .query_map([], |r| r.get(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    if emails.is_empty() {
        return Err(HandlerErr::bad_params("no students to enroll"));
    }

    insert_enrollment(
        conn,
        &faculty_email,
        &subject_name,
        &subject_code,
        credits,
        &emails,
    )
}

/// Same as create_for_all but with an explicit member list. All-or-nothing:
/// any unresolvable email aborts before anything is persisted.
fn create_for_specific(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let (faculty_email, subject_name, subject_code, credits) = subject_descriptor(params)?;
    let raw = params
        .get("studentEmails")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("missing studentEmails"))?;
    let mut emails = Vec::with_capacity(raw.len());
    for entry in raw {
        let Some(email) = entry.as_str() else {
            return Err(HandlerErr::bad_params(
                "studentEmails entries must be strings",
            ));
        };
        emails.push(email.to_string());
    }
    if emails.is_empty() {
        return Err(HandlerErr::bad_params("studentEmails must not be empty"));
    }

    if !faculty_exists(conn, &faculty_email)? {
        return Err(HandlerErr::not_found(format!(
            "faculty not found: {}",
            faculty_email
        )));
    }
    for email in &emails {
        if !student_exists(conn, email)? {
            return Err(HandlerErr::bad_params(format!(
                "unknown student: {}",
                email
            )));
        }
    }

    insert_enrollment(
        conn,
        &faculty_email,
        &subject_name,
        &subject_code,
        credits,
        &emails,
    )
}

fn insert_enrollment(
    conn: &rusqlite::Connection,
    faculty_email: &str,
    subject_name: &str,
    subject_code: &str,
    credits: i64,
    member_emails: &[String],
) -> Result<serde_json::Value, HandlerErr> {
    let subject_id = Uuid::new_v4().to_string();
    let tx = conn.unchecked_transaction().map_err(HandlerErr::db_tx)?;
    tx.execute(
        "INSERT INTO subject_enrollments(id, subject_name, subject_code, credits, faculty_email)
         VALUES(?, ?, ?, ?, ?)",
        (&subject_id, subject_name, subject_code, &credits, faculty_email),
    )
    .map_err(|e| HandlerErr::db_insert(e, "subject_enrollments"))?;
    for email in member_emails {
        tx.execute(
            "INSERT INTO enrollment_members(subject_id, student_email) VALUES(?, ?)",
            (&subject_id, email),
        )
        .map_err(|e| HandlerErr::db_insert(e, "enrollment_members"))?;
    }
    tx.commit().map_err(HandlerErr::db_commit)?;

    tracing::info!(subject = subject_code, members = member_emails.len(), "enrollment created");
    Ok(json!({
        "enrollment": {
            "subjectId": subject_id,
            "subjectName": subject_name,
            "subjectCode": subject_code,
            "credits": credits,
            "facultyEmail": faculty_email,
            "roster": member_emails
        }
    }))
}

/// Idempotent membership add: re-adding an existing member is a no-op, not
/// an error. Errors only when the enrollment or student is missing.
fn add_student(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let subject_id = get_required_str(params, "subjectId")?;
    let student_email = get_required_str(params, "studentEmail")?;

    if find_subject(conn, &subject_id)?.is_none() {
        return Err(HandlerErr::not_found("subject enrollment not found"));
    }
    if !student_exists(conn, &student_email)? {
        return Err(HandlerErr::not_found("student not found"));
    }

    conn.execute(
        "INSERT OR IGNORE INTO enrollment_members(subject_id, student_email) VALUES(?, ?)",
        (&subject_id, &student_email),
    )
    .map_err(|e| HandlerErr::db_insert(e, "enrollment_members"))?;
    Ok(json!({ "subjectId": subject_id, "studentEmail": student_email, "member": true }))
}

fn remove_student(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let subject_id = get_required_str(params, "subjectId")?;
    let student_email = get_required_str(params, "studentEmail")?;

    if find_subject(conn, &subject_id)?.is_none() {
        return Err(HandlerErr::not_found("subject enrollment not found"));
    }
    if !student_exists(conn, &student_email)? {
        return Err(HandlerErr::not_found("student not found"));
    }

    conn.execute(
        "DELETE FROM enrollment_members WHERE subject_id = ? AND student_email = ?",
        (&subject_id, &student_email),
    )
    .map_err(|e| HandlerErr::db_update(e, "enrollment_members"))?;
    Ok(json!({ "subjectId": subject_id, "studentEmail": student_email, "member": false }))
}

fn list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let mut stmt = conn
        .prepare(
            "SELECT se.id, se.subject_name, se.subject_code, se.credits, se.faculty_email,
                (SELECT COUNT(*) FROM enrollment_members em WHERE em.subject_id = se.id)
             FROM subject_enrollments se
             ORDER BY se.subject_code",
        )
        .map_err(HandlerErr::db_query)?;
    let enrollments = stmt
        .query_map([], |r| {
            Ok(json!({
                "subjectId": r.get::<_, String>(0)?,
                "subjectName": r.get::<_, String>(1)?,
                "subjectCode": r.get::<_, String>(2)?,
                "credits": r.get::<_, i64>(3)?,
                "facultyEmail": r.get::<_, String>(4)?,
                "rosterSize": r.get::<_, i64>(5)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(json!({ "enrollments": enrollments }))
}

fn roster(
    state: &AppState,
    params: &serde_json::Value,
    subject: &AuthSubject,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let subject_id = get_required_str(params, "subjectId")?;
    let Some(row) = find_subject(conn, &subject_id)? else {
        return Err(HandlerErr::not_found("subject enrollment not found"));
    };
    // The teacher of record reads their own roster; everyone else needs the
    // admin gate.
    if !(subject.role == Role::Faculty && subject.email == row.faculty_email) {
        authorize(subject, Resource::Enrollment, Action::Read)?;
    }

    let mut stmt = conn
        .prepare(
            "SELECT s.email, s.name, s.roll_no
             FROM enrollment_members em
             JOIN students s ON s.email = em.student_email
             WHERE em.subject_id = ?
             ORDER BY s.roll_no",
        )
        .map_err(HandlerErr::db_query)?;
    let members = stmt
        .query_map([&subject_id], |r| {
            Ok(json!({
                "email": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "rollNo": r.get::<_, String>(2)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(json!({
        "subjectId": subject_id,
        "subjectName": row.subject_name,
        "facultyEmail": row.faculty_email,
        "roster": members
    }))
}

fn delete(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let subject_id = get_required_str(params, "subjectId")?;
    if find_subject(conn, &subject_id)?.is_none() {
        return Err(HandlerErr::not_found("subject enrollment not found"));
    }

    let tx = conn.unchecked_transaction().map_err(HandlerErr::db_tx)?;
    tx.execute("DELETE FROM attendance WHERE subject_id = ?", [&subject_id])
        .map_err(|e| HandlerErr::db_update(e, "attendance"))?;
    tx.execute(
        "DELETE FROM enrollment_members WHERE subject_id = ?",
        [&subject_id],
    )
    .map_err(|e| HandlerErr::db_update(e, "enrollment_members"))?;
    tx.execute(
        "DELETE FROM subject_enrollments WHERE id = ?",
        [&subject_id],
    )
    .map_err(|e| HandlerErr::db_update(e, "subject_enrollments"))?;
    tx.commit().map_err(HandlerErr::db_commit)?;
    Ok(json!({ "subjectId": subject_id, "deleted": true }))
}

fn gate(subject: &AuthSubject, action: Action) -> Result<(), HandlerErr> {
    authorize(subject, Resource::Enrollment, action)?;
    Ok(())
}

pub fn try_handle(
    state: &mut AppState,
    req: &Request,
    subject: &AuthSubject,
) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        // Roster reads have their own teacher-of-record carve-out.
        "enrollment.roster" => roster(state, &req.params, subject),
        "enrollment.createForAll" => {
            gate(subject, Action::Write).and_then(|()| create_for_all(state, &req.params))
        }
        "enrollment.createForSpecific" => {
            gate(subject, Action::Write).and_then(|()| create_for_specific(state, &req.params))
        }
        "enrollment.addStudent" => {
            gate(subject, Action::Write).and_then(|()| add_student(state, &req.params))
        }
        "enrollment.removeStudent" => {
            gate(subject, Action::Write).and_then(|()| remove_student(state, &req.params))
        }
        "enrollment.list" => gate(subject, Action::Read).and_then(|()| list(state)),
        "enrollment.delete" => {
            gate(subject, Action::Write).and_then(|()| delete(state, &req.params))
        }
        _ => return None,
    };
    Some(match result {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
