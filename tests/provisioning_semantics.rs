use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_daemon() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_campusd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn campusd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    token: Option<&str>,
    params: serde_json::Value,
) -> serde_json::Value {
    let mut payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    if let Some(t) = token {
        payload["token"] = json!(t);
    }
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    token: Option<&str>,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, token, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    value
        .pointer("/error/code")
        .and_then(|v| v.as_str())
        .expect("error code")
}

fn admin_token(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> String {
    let workspace = temp_dir("campusd-provision");
    let _ = request_ok(
        stdin,
        reader,
        "setup-1",
        "workspace.select",
        None,
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "setup-2",
        "workspace.bootstrap",
        None,
        json!({
            "email": "root@campus.test",
            "name": "Root Admin",
            "contactNumber": "5550000",
            "password": "rootpw"
        }),
    );
    request_ok(
        stdin,
        reader,
        "setup-3",
        "auth.issueToken",
        None,
        json!({ "email": "root@campus.test", "password": "rootpw" }),
    )["token"]
        .as_str()
        .expect("token")
        .to_string()
}

fn student_params(email: &str, name: &str, contact: &str) -> serde_json::Value {
    json!({
        "email": email,
        "name": name,
        "course": "BTech",
        "branch": "CSE",
        "semester": 3,
        "year": 2024,
        "dob": "2005-05-01",
        "contactNumber": contact
    })
}

fn student_count(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    token: &str,
) -> usize {
    request_ok(stdin, reader, id, "admin.listStudents", Some(token), json!({}))
        .get("students")
        .and_then(|v| v.as_array())
        .map(|a| a.len())
        .expect("students array")
}

#[test]
fn roll_numbers_follow_the_branch_sequence() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let token = admin_token(&mut stdin, &mut reader);

    let mut params = student_params("alice@campus.test", "Alice Johnson", "9876543210");
    params["password"] = json!("stupw");
    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "admin.createStudent",
        Some(&token),
        params,
    );
    assert_eq!(
        first.pointer("/student/rollNo").and_then(|v| v.as_str()),
        Some("2024CSE001")
    );
    let uid = first
        .pointer("/student/universityId")
        .and_then(|v| v.as_str())
        .expect("universityId");
    assert!(uid.starts_with("ecila210"), "unexpected id {}", uid);
    assert!(uid.ends_with("@university.edu"));

    let mut params = student_params("bob@campus.test", "Bob Lee", "9876543211");
    params["password"] = json!("stupw");
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "admin.createStudent",
        Some(&token),
        params,
    );
    assert_eq!(
        second.pointer("/student/rollNo").and_then(|v| v.as_str()),
        Some("2024CSE002")
    );

    // A different branch starts its own sequence.
    let mut params = student_params("carol@campus.test", "Carol Diaz", "9876543212");
    params["branch"] = json!("ECE");
    params["password"] = json!("stupw");
    let third = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "admin.createStudent",
        Some(&token),
        params,
    );
    assert_eq!(
        third.pointer("/student/rollNo").and_then(|v| v.as_str()),
        Some("2024ECE001")
    );
}

#[test]
fn deleting_a_student_never_frees_their_roll_number() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let token = admin_token(&mut stdin, &mut reader);

    for (id, email, name, contact) in [
        ("1", "alice@campus.test", "Alice Johnson", "9876543210"),
        ("2", "bob@campus.test", "Bob Lee", "9876543211"),
    ] {
        let mut params = student_params(email, name, contact);
        params["password"] = json!("stupw");
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "admin.createStudent",
            Some(&token),
            params,
        );
    }

    // Remove the first of the cohort; the next number must still advance.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "admin.deleteStudent",
        Some(&token),
        json!({ "email": "alice@campus.test" }),
    );
    let mut params = student_params("carol@campus.test", "Carol Diaz", "9876543212");
    params["password"] = json!("stupw");
    let third = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "admin.createStudent",
        Some(&token),
        params,
    );
    assert_eq!(
        third.pointer("/student/rollNo").and_then(|v| v.as_str()),
        Some("2024CSE003")
    );

    // Removing the highest-numbered student must not roll the sequence back.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "admin.deleteStudent",
        Some(&token),
        json!({ "email": "carol@campus.test" }),
    );
    let mut params = student_params("dave@campus.test", "Dave Kim", "9876543213");
    params["password"] = json!("stupw");
    let fourth = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "admin.createStudent",
        Some(&token),
        params,
    );
    assert_eq!(
        fourth.pointer("/student/rollNo").and_then(|v| v.as_str()),
        Some("2024CSE004")
    );
}

#[test]
fn generated_initial_password_signs_in() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let token = admin_token(&mut stdin, &mut reader);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "admin.createStudent",
        Some(&token),
        student_params("dave@campus.test", "Dave Kim", "9876543213"),
    );
    let initial = created
        .pointer("/student/initialPassword")
        .and_then(|v| v.as_str())
        .expect("initialPassword when none supplied");
    assert_eq!(initial.len(), 12);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "auth.issueToken",
        None,
        json!({ "email": "dave@campus.test", "password": initial }),
    );
}

#[test]
fn duplicate_email_is_a_conflict() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let token = admin_token(&mut stdin, &mut reader);

    let mut params = student_params("dup@campus.test", "Dup One", "9876543214");
    params["password"] = json!("stupw");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "admin.createStudent",
        Some(&token),
        params.clone(),
    );
    let again = request(
        &mut stdin,
        &mut reader,
        "2",
        "admin.createStudent",
        Some(&token),
        params,
    );
    assert_eq!(error_code(&again), "conflict");
    assert_eq!(student_count(&mut stdin, &mut reader, "3", &token), 1);

    // The bootstrap admin's email is taken across roles too.
    let taken = request(
        &mut stdin,
        &mut reader,
        "4",
        "admin.createStudent",
        Some(&token),
        student_params("root@campus.test", "Root Admin", "5550000"),
    );
    assert_eq!(error_code(&taken), "conflict");
}

#[test]
fn bulk_csv_rolls_back_on_a_bad_row() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let token = admin_token(&mut stdin, &mut reader);

    // Row 2 provisions, then row 3 hits the duplicate check; the whole batch
    // unwinds, identity account included.
    let bad_csv = "email,name,course,branch,semester,year,dob,contactNumber\n\
        x@campus.test,X One,BTech,CSE,3,2024,2005-05-01,9876500001\n\
        x@campus.test,X Again,BTech,CSE,3,2024,2005-05-01,9876500001\n";
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "admin.bulkCreateStudents",
        Some(&token),
        json!({ "csv": bad_csv }),
    );
    assert_eq!(error_code(&resp), "conflict");
    assert!(
        resp.pointer("/error/message")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .starts_with("row 3:")
    );
    assert_eq!(student_count(&mut stdin, &mut reader, "2", &token), 0);

    // A malformed field is rejected during parsing, before anything runs.
    let unparsable = "email,name,course,branch,semester,year,dob,contactNumber\n\
        z@campus.test,Z One,BTech,CSE,not-a-number,2024,2005-05-01,9876500003\n";
    let parse_err = request(
        &mut stdin,
        &mut reader,
        "2b",
        "admin.bulkCreateStudents",
        Some(&token),
        json!({ "csv": unparsable }),
    );
    assert_eq!(error_code(&parse_err), "bad_params");

    // The first row's account was unwound too, so a corrected file reuses it.
    let good_csv = "email,name,course,branch,semester,year,dob,contactNumber\n\
        x@campus.test,X One,BTech,CSE,3,2024,2005-05-01,9876500001\n\
        y@campus.test,Y Two,BTech,CSE,3,2024,2005-05-01,9876500002\n";
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "admin.bulkCreateStudents",
        Some(&token),
        json!({ "csv": good_csv }),
    );
    assert_eq!(created.get("created").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(student_count(&mut stdin, &mut reader, "4", &token), 2);

    let students = created
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students array");
    let password = students[0]
        .get("initialPassword")
        .and_then(|v| v.as_str())
        .expect("bulk rows get generated passwords");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "auth.issueToken",
        None,
        json!({ "email": "x@campus.test", "password": password }),
    );
}
