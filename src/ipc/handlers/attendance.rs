use chrono::Local;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::ok;
use crate::ipc::helpers::{
    find_subject, get_optional_str, get_required_bool, get_required_str, parse_date,
    roster_contains, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::policy::{authorize, Action, AuthSubject, Resource};
use crate::stats;

struct MarkTuple {
    student_email: String,
    present: bool,
    remarks: Option<String>,
}

/// All-or-nothing bulk upsert keyed on (student_email, subject_id, date).
/// Re-marking the same date overwrites in place, so one calendar date never
/// yields more than one row per student.
fn bulk_mark(
    state: &AppState,
    params: &serde_json::Value,
    subject: &AuthSubject,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let faculty_email = get_required_str(params, "facultyEmail")?;
    authorize(
        subject,
        Resource::Attendance { faculty_email: &faculty_email },
        Action::Write,
    )?;

    let subject_id = get_required_str(params, "subjectId")?;
    let date = match get_optional_str(params, "date") {
        Some(d) => parse_date(&d)?,
        None => Local::now().date_naive().format("%Y-%m-%d").to_string(),
    };

    let Some(subject_row) = find_subject(conn, &subject_id)? else {
        return Err(HandlerErr::not_found("subject enrollment not found"));
    };
    if subject_row.faculty_email != faculty_email {
        return Err(HandlerErr::access_denied(
            "faculty is not the teacher of record for this subject",
        ));
    }

    let raw = params
        .get("studentAttendances")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("missing studentAttendances"))?;
    if raw.is_empty() {
        return Err(HandlerErr::bad_params("studentAttendances must not be empty"));
    }
    let mut tuples = Vec::with_capacity(raw.len());
    for entry in raw {
        tuples.push(MarkTuple {
            student_email: get_required_str(entry, "studentEmail")?,
            present: get_required_bool(entry, "present")?,
            remarks: get_optional_str(entry, "remarks"),
        });
    }

    // Batch-level all-or-nothing: one bad student aborts everything and the
    // error names the failing identifier.
    let tx = conn.unchecked_transaction().map_err(HandlerErr::db_tx)?;
    let mut records = Vec::with_capacity(tuples.len());
    for t in &tuples {
        if !roster_contains(&tx, &subject_id, &t.student_email)? {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("student not on roster: {}", t.student_email),
                details: Some(json!({ "studentEmail": t.student_email })),
            });
        }
        tx.execute(
            "INSERT INTO attendance(id, student_email, faculty_email, subject_id, date, present, remarks)
             VALUES(?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_email, subject_id, date) DO UPDATE SET
               present = excluded.present,
               remarks = excluded.remarks,
               faculty_email = excluded.faculty_email",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                t.student_email,
                faculty_email,
                subject_id,
                date,
                t.present as i64,
                t.remarks,
            ],
        )
        .map_err(|e| HandlerErr::db_insert(e, "attendance"))?;
        records.push(json!({
            "studentEmail": t.student_email,
            "subjectId": subject_id,
            "date": date,
            "present": t.present,
            "remarks": t.remarks
        }));
    }
    tx.commit().map_err(HandlerErr::db_commit)?;

    tracing::info!(subject = %subject_id, date = %date, marks = records.len(), "attendance marked");
    Ok(json!({ "date": date, "attendance": records }))
}

fn list_by_date(
    state: &AppState,
    params: &serde_json::Value,
    subject: &AuthSubject,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let subject_id = get_required_str(params, "subjectId")?;
    let date = parse_date(&get_required_str(params, "date")?)?;

    let Some(subject_row) = find_subject(conn, &subject_id)? else {
        return Err(HandlerErr::not_found("subject enrollment not found"));
    };
    authorize(
        subject,
        Resource::Attendance { faculty_email: &subject_row.faculty_email },
        Action::Read,
    )?;

    let mut stmt = conn
        .prepare(
            "SELECT student_email, present, remarks
             FROM attendance
             WHERE subject_id = ? AND date = ?
             ORDER BY student_email",
        )
        .map_err(HandlerErr::db_query)?;
    let entries = stmt
        .query_map((&subject_id, &date), |r| {
            Ok(json!({
                "studentEmail": r.get::<_, String>(0)?,
                "present": r.get::<_, i64>(1)? != 0,
                "remarks": r.get::<_, Option<String>>(2)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(json!({ "subjectId": subject_id, "date": date, "attendance": entries }))
}

/// Subject-level statistics. The denominator here is distinct class dates
/// multiplied by roster size; this intentionally differs from the per-student
/// summary below, which never multiplies by roster size.
fn subject_stats(
    state: &AppState,
    params: &serde_json::Value,
    subject: &AuthSubject,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let subject_id = get_required_str(params, "subjectId")?;

    let Some(subject_row) = find_subject(conn, &subject_id)? else {
        return Err(HandlerErr::not_found("subject enrollment not found"));
    };
    authorize(
        subject,
        Resource::Attendance { faculty_email: &subject_row.faculty_email },
        Action::Read,
    )?;

    let total_classes: i64 = conn
        .query_row(
            "SELECT COUNT(DISTINCT date) FROM attendance WHERE subject_id = ?",
            [&subject_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    let total_present: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM attendance WHERE subject_id = ? AND present = 1",
            [&subject_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    let roster_size: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM enrollment_members WHERE subject_id = ?",
            [&subject_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;

    Ok(json!({
        "subjectId": subject_id,
        "subjectName": subject_row.subject_name,
        "totalClasses": total_classes,
        "rosterSize": roster_size,
        "totalPresent": total_present,
        "attendancePercentage": stats::subject_percentage(total_classes, roster_size, total_present)
    }))
}

/// Per-student summary over an optional date range. totalLectures counts
/// distinct dates, not rows; the overall figure is the unweighted mean of
/// per-subject percentages.
fn student_summary(
    state: &AppState,
    params: &serde_json::Value,
    subject: &AuthSubject,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let email = get_required_str(params, "email")?;
    authorize(subject, Resource::StudentRecord { email: &email }, Action::Read)?;

    if !crate::ipc::helpers::student_exists(conn, &email)? {
        return Err(HandlerErr::not_found("student not found"));
    }
    let start = match get_optional_str(params, "startDate") {
        Some(d) => Some(parse_date(&d)?),
        None => None,
    };
    let end = match get_optional_str(params, "endDate") {
        Some(d) => Some(parse_date(&d)?),
        None => None,
    };

    let mut stmt = conn
        .prepare(
            "SELECT se.id, se.subject_name, se.subject_code
             FROM enrollment_members em
             JOIN subject_enrollments se ON se.id = em.subject_id
             WHERE em.student_email = ?
             ORDER BY se.subject_code",
        )
        .map_err(HandlerErr::db_query)?;
    let enrolled: Vec<(String, String, String)> = stmt
        .query_map([&email], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    let mut subjects = Vec::with_capacity(enrolled.len());
    let mut percentages = Vec::with_capacity(enrolled.len());
    for (sid, name, code) in &enrolled {
        let (lectures, present) = student_subject_counts(conn, &email, sid, &start, &end)?;
        let pct = stats::student_subject_percentage(lectures, present);
        percentages.push(pct);
        subjects.push(json!({
            "subjectId": sid,
            "subjectName": name,
            "subjectCode": code,
            "totalLectures": lectures,
            "totalPresent": present,
            "percentage": pct
        }));
    }

    Ok(json!({
        "email": email,
        "overallPercentage": stats::overall_percentage(&percentages),
        "subjects": subjects
    }))
}

fn student_subject_counts(
    conn: &Connection,
    email: &str,
    subject_id: &str,
    start: &Option<String>,
    end: &Option<String>,
) -> Result<(i64, i64), HandlerErr> {
    // ISO dates compare correctly as strings; open bounds fall back to
    // sentinels outside any real date.
    let lo = start.as_deref().unwrap_or("0000-00-00");
    let hi = end.as_deref().unwrap_or("9999-99-99");
    let lectures: i64 = conn
        .query_row(
            "SELECT COUNT(DISTINCT date) FROM attendance
             WHERE student_email = ? AND subject_id = ? AND date >= ? AND date <= ?",
            (email, subject_id, lo, hi),
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    let present: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM attendance
             WHERE student_email = ? AND subject_id = ? AND present = 1
               AND date >= ? AND date <= ?",
            (email, subject_id, lo, hi),
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    Ok((lectures, present))
}

pub fn try_handle(
    state: &mut AppState,
    req: &Request,
    subject: &AuthSubject,
) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.bulkMark" => bulk_mark(state, &req.params, subject),
        "attendance.listByDate" => list_by_date(state, &req.params, subject),
        "attendance.subjectStats" => subject_stats(state, &req.params, subject),
        "attendance.studentSummary" => student_summary(state, &req.params, subject),
        _ => return None,
    };
    Some(match result {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
