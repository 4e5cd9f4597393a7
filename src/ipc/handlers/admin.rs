use chrono::Local;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{FileIdentityStore, IdentityVerifier};
use crate::idgen;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_optional_str, get_required_i64, get_required_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::policy::{authorize, Action, AuthSubject, Resource};

/// Bulk CSV payloads are capped before any parsing happens.
const MAX_CSV_BYTES: usize = 5 * 1024 * 1024;

struct NewStudent {
    email: String,
    name: String,
    course: String,
    branch: String,
    semester: i64,
    year: i64,
    dob: String,
    contact_number: String,
    gender: Option<String>,
    address: Option<String>,
    password: Option<String>,
}

fn parse_new_student(params: &serde_json::Value) -> Result<NewStudent, HandlerErr> {
    Ok(NewStudent {
        email: get_required_str(params, "email")?,
        name: get_required_str(params, "name")?,
        course: get_required_str(params, "course")?,
        branch: get_required_str(params, "branch")?,
        semester: get_required_i64(params, "semester")?,
        year: get_required_i64(params, "year")?,
        dob: get_required_str(params, "dob")?,
        contact_number: get_required_str(params, "contactNumber")?,
        gender: get_optional_str(params, "gender"),
        address: get_optional_str(params, "address"),
        password: get_optional_str(params, "password"),
    })
}

fn user_email_taken(conn: &Connection, email: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM users WHERE email = ?", [email], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db_query)
}

/// Inserts the student row, the identity account, and the users row.
/// The caller owns the surrounding transaction; a failure after the identity
/// account exists deletes that account before returning, so local rollback
/// never strands a provider-side account (and vice versa).
fn provision_student(
    conn: &Connection,
    identity: &mut FileIdentityStore,
    ns: &NewStudent,
) -> Result<(String, serde_json::Value), HandlerErr> {
    if user_email_taken(conn, &ns.email)? {
        return Err(HandlerErr::conflict(format!(
            "email already registered: {}",
            ns.email
        )));
    }

    // Roll numbers come from a per-cohort sequence, never from a row count:
    // deleting a student must not free their number for reuse.
    let cohort_branch = ns.branch.to_ascii_uppercase();
    let seq: i64 = conn
        .query_row(
            "SELECT next_seq FROM roll_sequences WHERE year = ? AND branch = ?",
            (&ns.year, &cohort_branch),
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db_query)?
        .unwrap_or(1);
    conn.execute(
        "INSERT INTO roll_sequences(year, branch, next_seq) VALUES(?, ?, ?)
         ON CONFLICT(year, branch) DO UPDATE SET next_seq = excluded.next_seq",
        (&ns.year, &cohort_branch, seq + 1),
    )
    .map_err(|e| HandlerErr::db_insert(e, "roll_sequences"))?;
    let roll_no = idgen::roll_no(ns.year, &ns.branch, seq);

    let mut rng = rand::thread_rng();
    let university_id = idgen::university_id(&ns.name, &ns.contact_number, &mut rng);
    let generated = ns.password.is_none();
    let password = ns
        .password
        .clone()
        .unwrap_or_else(|| idgen::generate_password(&mut rng));
    let enrollment_date = Local::now().date_naive().format("%Y-%m-%d").to_string();

    conn.execute(
        "INSERT INTO students(id, email, name, course, branch, semester, year,
            roll_no, university_id, enrollment_date, contact_number, dob,
            gender, address)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            ns.email,
            ns.name,
            ns.course,
            ns.branch,
            ns.semester,
            ns.year,
            roll_no,
            university_id,
            enrollment_date,
            ns.contact_number,
            ns.dob,
            ns.gender,
            ns.address,
        ],
    )
    .map_err(|e| HandlerErr::db_insert(e, "students"))?;

    let uid = identity
        .create_account(&ns.email, &password)
        .map_err(HandlerErr::identity)?;
    if let Err(e) = conn.execute(
        "INSERT INTO users(id, identity_uid, email, name, role, university_id)
         VALUES(?, ?, ?, ?, 'student', ?)",
        (
            &Uuid::new_v4().to_string(),
            &uid,
            &ns.email,
            &ns.name,
            &university_id,
        ),
    ) {
        let _ = identity.delete_account(&uid);
        return Err(HandlerErr::db_insert(e, "users"));
    }

    let mut student = json!({
        "email": ns.email,
        "name": ns.name,
        "course": ns.course,
        "branch": ns.branch,
        "semester": ns.semester,
        "year": ns.year,
        "rollNo": roll_no,
        "universityId": university_id,
        "enrollmentDate": enrollment_date,
        "contactNumber": ns.contact_number,
        "dob": ns.dob,
        "gender": ns.gender,
        "address": ns.address
    });
    if generated {
        student["initialPassword"] = json!(password);
    }
    Ok((uid, student))
}

fn create_student(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let AppState { db, identity, .. } = state;
    let conn = db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let identity = identity.as_mut().ok_or_else(HandlerErr::no_workspace)?;
    let ns = parse_new_student(params)?;

    let tx = conn.unchecked_transaction().map_err(HandlerErr::db_tx)?;
    let (uid, student) = provision_student(&tx, identity, &ns)?;
    if let Err(e) = tx.commit() {
        let _ = identity.delete_account(&uid);
        return Err(HandlerErr::db_commit(e));
    }
    tracing::info!(email = %ns.email, "student provisioned");
    Ok(json!({ "student": student }))
}

fn bulk_create_students(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let AppState { db, identity, .. } = state;
    let conn = db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let identity = identity.as_mut().ok_or_else(HandlerErr::no_workspace)?;

    let csv = get_required_str(params, "csv")?;
    if csv.len() > MAX_CSV_BYTES {
        return Err(HandlerErr::payload_too_large(format!(
            "csv exceeds {} bytes",
            MAX_CSV_BYTES
        )));
    }
    let rows = parse_students_csv(&csv)?;
    if rows.is_empty() {
        return Err(HandlerErr::bad_params("csv has no data rows"));
    }

    // All-or-nothing: the transaction covers every row, and identity accounts
    // created before a failing row are removed again.
    let tx = conn.unchecked_transaction().map_err(HandlerErr::db_tx)?;
    let mut created_uids: Vec<String> = Vec::new();
    let mut students = Vec::new();
    for (i, ns) in rows.iter().enumerate() {
        match provision_student(&tx, identity, ns) {
            Ok((uid, student)) => {
                created_uids.push(uid);
                students.push(student);
            }
            Err(mut e) => {
                drop(tx);
                for uid in created_uids {
                    let _ = identity.delete_account(&uid);
                }
                e.message = format!("row {}: {}", i + 2, e.message);
                return Err(e);
            }
        }
    }
    if let Err(e) = tx.commit() {
        for uid in created_uids {
            let _ = identity.delete_account(&uid);
        }
        return Err(HandlerErr::db_commit(e));
    }
    tracing::info!(count = students.len(), "bulk student import");
    Ok(json!({ "created": students.len(), "students": students }))
}

/// Minimal CSV: a header line naming the columns, comma-separated values,
/// no quoting. Header columns: email,name,course,branch,semester,year,dob,
/// contactNumber with optional gender,address.
fn parse_students_csv(csv: &str) -> Result<Vec<NewStudent>, HandlerErr> {
    let mut lines = csv.lines().filter(|l| !l.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| HandlerErr::bad_params("csv is empty"))?;
    let cols: Vec<String> = header.split(',').map(|c| c.trim().to_string()).collect();
    let idx = |name: &str| cols.iter().position(|c| c == name);
    let required = |name: &str| {
        idx(name).ok_or_else(|| HandlerErr::bad_params(format!("csv missing column {}", name)))
    };

    let i_email = required("email")?;
    let i_name = required("name")?;
    let i_course = required("course")?;
    let i_branch = required("branch")?;
    let i_semester = required("semester")?;
    let i_year = required("year")?;
    let i_dob = required("dob")?;
    let i_contact = required("contactNumber")?;
    let i_gender = idx("gender");
    let i_address = idx("address");

    let mut out = Vec::new();
    for (n, line) in lines.enumerate() {
        let fields: Vec<&str> = line.split(',').map(|f| f.trim()).collect();
        let get = |i: usize| -> Result<String, HandlerErr> {
            fields
                .get(i)
                .filter(|v| !v.is_empty())
                .map(|v| v.to_string())
                .ok_or_else(|| HandlerErr::bad_params(format!("row {}: missing field", n + 2)))
        };
        let get_opt =
            |i: Option<usize>| i.and_then(|i| fields.get(i)).filter(|v| !v.is_empty()).map(|v| v.to_string());
        let semester: i64 = get(i_semester)?
            .parse()
            .map_err(|_| HandlerErr::bad_params(format!("row {}: bad semester", n + 2)))?;
        let year: i64 = get(i_year)?
            .parse()
            .map_err(|_| HandlerErr::bad_params(format!("row {}: bad year", n + 2)))?;
        out.push(NewStudent {
            email: get(i_email)?,
            name: get(i_name)?,
            course: get(i_course)?,
            branch: get(i_branch)?,
            semester,
            year,
            dob: get(i_dob)?,
            contact_number: get(i_contact)?,
            gender: get_opt(i_gender),
            address: get_opt(i_address),
            password: None,
        });
    }
    Ok(out)
}

fn create_faculty(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let AppState { db, identity, .. } = state;
    let conn = db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let identity = identity.as_mut().ok_or_else(HandlerErr::no_workspace)?;

    let email = get_required_str(params, "email")?;
    let name = get_required_str(params, "name")?;
    let department = get_required_str(params, "department")?;
    let dob = get_required_str(params, "dob")?;
    let contact_number = get_required_str(params, "contactNumber")?;
    let gender = get_optional_str(params, "gender");
    let address = get_optional_str(params, "address");
    let password = get_optional_str(params, "password");

    if user_email_taken(conn, &email)? {
        return Err(HandlerErr::conflict(format!(
            "email already registered: {}",
            email
        )));
    }

    let mut rng = rand::thread_rng();
    let university_id = idgen::university_id(&name, &contact_number, &mut rng);
    let generated = password.is_none();
    let password = password.unwrap_or_else(|| idgen::generate_password(&mut rng));

    let tx = conn.unchecked_transaction().map_err(HandlerErr::db_tx)?;
    tx.execute(
        "INSERT INTO faculty(id, email, name, department, university_id,
            contact_number, dob, gender, address)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            email,
            name,
            department,
            university_id,
            contact_number,
            dob,
            gender,
            address,
        ],
    )
    .map_err(|e| HandlerErr::db_insert(e, "faculty"))?;

    let uid = identity
        .create_account(&email, &password)
        .map_err(HandlerErr::identity)?;
    if let Err(e) = tx.execute(
        "INSERT INTO users(id, identity_uid, email, name, role, university_id)
         VALUES(?, ?, ?, ?, 'faculty', ?)",
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

    let mut fac = json!({
        "email": email,
        "name": name,
        "department": department,
        "universityId": university_id,
        "contactNumber": contact_number,
        "dob": dob,
        "gender": gender,
        "address": address
    });
    if generated {
        fac["initialPassword"] = json!(password);
    }
    tracing::info!(email = %email, "faculty provisioned");
    Ok(json!({ "faculty": fac }))
}

fn create_admin(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let AppState { db, identity, .. } = state;
    let conn = db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let identity = identity.as_mut().ok_or_else(HandlerErr::no_workspace)?;

    let email = get_required_str(params, "email")?;
    let name = get_required_str(params, "name")?;
    let contact_number = get_required_str(params, "contactNumber")?;
    let password = get_optional_str(params, "password");

    if user_email_taken(conn, &email)? {
        return Err(HandlerErr::conflict(format!(
            "email already registered: {}",
            email
        )));
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

    let mut admin = json!({
        "email": email,
        "name": name,
        "universityId": university_id,
        "contactNumber": contact_number
    });
    if generated {
        admin["initialPassword"] = json!(password);
    }
    Ok(json!({ "admin": admin }))
}

const STUDENT_PATCH_FIELDS: &[(&str, &str)] = &[
    ("name", "name"),
    ("course", "course"),
    ("branch", "branch"),
    ("semester", "semester"),
    ("year", "year"),
    ("contactNumber", "contact_number"),
    ("dob", "dob"),
    ("gender", "gender"),
    ("address", "address"),
];

fn update_student(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let email = get_required_str(params, "email")?;
    let patch = params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("missing patch"))?;

    if !crate::ipc::helpers::student_exists(conn, &email)? {
        return Err(HandlerErr::not_found("student not found"));
    }

    let tx = conn.unchecked_transaction().map_err(HandlerErr::db_tx)?;
    for (key, column) in STUDENT_PATCH_FIELDS {
        let Some(value) = patch.get(*key) else {
            continue;
        };
        let sql = format!("UPDATE students SET {} = ?, updated_at = ? WHERE email = ?", column);
        let now = chrono::Utc::now().to_rfc3339();
        let res = match value {
            serde_json::Value::String(s) => tx.execute(&sql, (s, &now, &email)),
            serde_json::Value::Number(n) if n.is_i64() => {
                tx.execute(&sql, (n.as_i64(), &now, &email))
            }
            serde_json::Value::Null => tx.execute(&sql, (None::<String>, &now, &email)),
            _ => return Err(HandlerErr::bad_params(format!("bad value for {}", key))),
        };
        res.map_err(|e| HandlerErr::db_update(e, "students"))?;
    }
    if let Some(serde_json::Value::String(name)) = patch.get("name") {
        tx.execute("UPDATE users SET name = ? WHERE email = ?", (name, &email))
            .map_err(|e| HandlerErr::db_update(e, "users"))?;
    }
    tx.commit().map_err(HandlerErr::db_commit)?;
    Ok(json!({ "email": email, "updated": true }))
}

const FACULTY_PATCH_FIELDS: &[(&str, &str)] = &[
    ("name", "name"),
    ("department", "department"),
    ("contactNumber", "contact_number"),
    ("dob", "dob"),
    ("gender", "gender"),
    ("address", "address"),
];

fn update_faculty(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let email = get_required_str(params, "email")?;
    let patch = params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("missing patch"))?;

    if !crate::ipc::helpers::faculty_exists(conn, &email)? {
        return Err(HandlerErr::not_found("faculty not found"));
    }

    let tx = conn.unchecked_transaction().map_err(HandlerErr::db_tx)?;
    for (key, column) in FACULTY_PATCH_FIELDS {
        let Some(value) = patch.get(*key) else {
            continue;
        };
        let sql = format!("UPDATE faculty SET {} = ?, updated_at = ? WHERE email = ?", column);
        let now = chrono::Utc::now().to_rfc3339();
        let res = match value {
            serde_json::Value::String(s) => tx.execute(&sql, (s, &now, &email)),
            serde_json::Value::Null => tx.execute(&sql, (None::<String>, &now, &email)),
            _ => return Err(HandlerErr::bad_params(format!("bad value for {}", key))),
        };
        res.map_err(|e| HandlerErr::db_update(e, "faculty"))?;
    }
    if let Some(serde_json::Value::String(name)) = patch.get("name") {
        tx.execute("UPDATE users SET name = ? WHERE email = ?", (name, &email))
            .map_err(|e| HandlerErr::db_update(e, "users"))?;
    }
    tx.commit().map_err(HandlerErr::db_commit)?;
    Ok(json!({ "email": email, "updated": true }))
}

fn delete_student(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let AppState { db, identity, .. } = state;
    let conn = db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let identity = identity.as_mut().ok_or_else(HandlerErr::no_workspace)?;
    let email = get_required_str(params, "email")?;

    if !crate::ipc::helpers::student_exists(conn, &email)? {
        return Err(HandlerErr::not_found("student not found"));
    }
    let uid: Option<String> = conn
        .query_row(
            "SELECT identity_uid FROM users WHERE email = ?",
            [&email],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;

    // Explicit delete order; no cascades beyond the join table.
    let tx = conn.unchecked_transaction().map_err(HandlerErr::db_tx)?;
    tx.execute("DELETE FROM attendance WHERE student_email = ?", [&email])
        .map_err(|e| HandlerErr::db_update(e, "attendance"))?;
    tx.execute(
        "DELETE FROM enrollment_members WHERE student_email = ?",
        [&email],
    )
    .map_err(|e| HandlerErr::db_update(e, "enrollment_members"))?;
    tx.execute("DELETE FROM users WHERE email = ?", [&email])
        .map_err(|e| HandlerErr::db_update(e, "users"))?;
    tx.execute("DELETE FROM students WHERE email = ?", [&email])
        .map_err(|e| HandlerErr::db_update(e, "students"))?;
    tx.commit().map_err(HandlerErr::db_commit)?;

    if let Some(uid) = uid {
        let _ = identity.delete_account(&uid);
    }
    Ok(json!({ "email": email, "deleted": true }))
}

fn delete_faculty(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let AppState { db, identity, .. } = state;
    let conn = db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let identity = identity.as_mut().ok_or_else(HandlerErr::no_workspace)?;
    let email = get_required_str(params, "email")?;

    if !crate::ipc::helpers::faculty_exists(conn, &email)? {
        return Err(HandlerErr::not_found("faculty not found"));
    }
    let teaching: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM subject_enrollments WHERE faculty_email = ?",
            [&email],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    if teaching > 0 {
        return Err(HandlerErr::conflict(
            "faculty still teaches subjects; delete those enrollments first",
        ));
    }
    let uid: Option<String> = conn
        .query_row(
            "SELECT identity_uid FROM users WHERE email = ?",
            [&email],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;

    let tx = conn.unchecked_transaction().map_err(HandlerErr::db_tx)?;
    tx.execute("DELETE FROM attendance WHERE faculty_email = ?", [&email])
        .map_err(|e| HandlerErr::db_update(e, "attendance"))?;
    tx.execute("DELETE FROM users WHERE email = ?", [&email])
        .map_err(|e| HandlerErr::db_update(e, "users"))?;
    tx.execute("DELETE FROM faculty WHERE email = ?", [&email])
        .map_err(|e| HandlerErr::db_update(e, "faculty"))?;
    tx.commit().map_err(HandlerErr::db_commit)?;

    if let Some(uid) = uid {
        let _ = identity.delete_account(&uid);
    }
    Ok(json!({ "email": email, "deleted": true }))
}

fn list_students(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let mut stmt = conn
        .prepare(
            "SELECT email, name, course, branch, semester, year, roll_no,
                university_id, enrollment_date, contact_number
             FROM students ORDER BY roll_no",
        )
        .map_err(HandlerErr::db_query)?;
    let students = stmt
        .query_map([], |r| {
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
                "contactNumber": r.get::<_, String>(9)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(json!({ "students": students }))
}

fn list_faculty(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let mut stmt = conn
        .prepare(
            "SELECT f.email, f.name, f.department, f.university_id, f.contact_number,
                (SELECT COUNT(*) FROM subject_enrollments se WHERE se.faculty_email = f.email)
             FROM faculty f ORDER BY f.name",
        )
        .map_err(HandlerErr::db_query)?;
    let faculty = stmt
        .query_map([], |r| {
            Ok(json!({
                "email": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "department": r.get::<_, String>(2)?,
                "universityId": r.get::<_, String>(3)?,
                "contactNumber": r.get::<_, String>(4)?,
                "subjectCount": r.get::<_, i64>(5)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(json!({ "faculty": faculty }))
}

fn gate(subject: &AuthSubject) -> Result<(), HandlerErr> {
    authorize(subject, Resource::Administration, Action::Write)?;
    Ok(())
}

pub fn try_handle(
    state: &mut AppState,
    req: &Request,
    subject: &AuthSubject,
) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "admin.createStudent" => gate(subject).and_then(|()| create_student(state, &req.params)),
        "admin.bulkCreateStudents" => {
            gate(subject).and_then(|()| bulk_create_students(state, &req.params))
        }
        "admin.createFaculty" => gate(subject).and_then(|()| create_faculty(state, &req.params)),
        "admin.createAdmin" => gate(subject).and_then(|()| create_admin(state, &req.params)),
        "admin.updateStudent" => gate(subject).and_then(|()| update_student(state, &req.params)),
        "admin.updateFaculty" => gate(subject).and_then(|()| update_faculty(state, &req.params)),
        "admin.deleteStudent" => gate(subject).and_then(|()| delete_student(state, &req.params)),
        "admin.deleteFaculty" => gate(subject).and_then(|()| delete_faculty(state, &req.params)),
        "admin.listStudents" => gate(subject).and_then(|()| list_students(state)),
        "admin.listFaculty" => gate(subject).and_then(|()| list_faculty(state)),
        _ => return None,
    };
    Some(match result {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
