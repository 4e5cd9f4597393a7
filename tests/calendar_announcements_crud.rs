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

struct Campus {
    admin_token: String,
    student_token: String,
}

fn setup_campus(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> Campus {
    let workspace = temp_dir("campusd-calendar");
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
    let admin_token = request_ok(
        stdin,
        reader,
        "setup-3",
        "auth.issueToken",
        None,
        json!({ "email": "root@campus.test", "password": "rootpw" }),
    )["token"]
        .as_str()
        .expect("token")
        .to_string();

    let _ = request_ok(
        stdin,
        reader,
        "setup-4",
        "admin.createStudent",
        Some(&admin_token),
        json!({
            "email": "a@campus.test",
            "name": "Some Student",
            "course": "BTech",
            "branch": "CSE",
            "semester": 3,
            "year": 2024,
            "dob": "2005-05-01",
            "contactNumber": "5559876",
            "password": "stupw"
        }),
    );
    let student_token = request_ok(
        stdin,
        reader,
        "setup-5",
        "auth.issueToken",
        None,
        json!({ "email": "a@campus.test", "password": "stupw" }),
    )["token"]
        .as_str()
        .expect("token")
        .to_string();
    Campus {
        admin_token,
        student_token,
    }
}

#[test]
fn calendar_holds_a_single_replaceable_file() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let campus = setup_campus(&mut stdin, &mut reader);

    let empty = request(
        &mut stdin,
        &mut reader,
        "1",
        "calendar.get",
        Some(&campus.student_token),
        json!({}),
    );
    assert_eq!(error_code(&empty), "not_found");

    // "academic calendar v1" / "academic calendar v2"
    let first = "YWNhZGVtaWMgY2FsZW5kYXIgdjE=";
    let second = "YWNhZGVtaWMgY2FsZW5kYXIgdjI=";
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "calendar.upload",
        Some(&campus.admin_token),
        json!({ "title": "Academic Calendar", "fileName": "calendar-2024.pdf", "dataBase64": first }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "calendar.upload",
        Some(&campus.admin_token),
        json!({ "title": "Academic Calendar rev2", "fileName": "calendar-2024-rev2.pdf", "dataBase64": second }),
    );

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "calendar.get",
        Some(&campus.student_token),
        json!({}),
    );
    assert_eq!(
        fetched.pointer("/calendar/fileName").and_then(|v| v.as_str()),
        Some("calendar-2024-rev2.pdf")
    );
    assert_eq!(
        fetched.pointer("/calendar/dataBase64").and_then(|v| v.as_str()),
        Some(second)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "calendar.delete",
        Some(&campus.admin_token),
        json!({}),
    );
    let gone = request(
        &mut stdin,
        &mut reader,
        "6",
        "calendar.get",
        Some(&campus.student_token),
        json!({}),
    );
    assert_eq!(error_code(&gone), "not_found");
    let delete_again = request(
        &mut stdin,
        &mut reader,
        "7",
        "calendar.delete",
        Some(&campus.admin_token),
        json!({}),
    );
    assert_eq!(error_code(&delete_again), "not_found");
}

#[test]
fn uploads_enforce_size_and_encoding() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let campus = setup_campus(&mut stdin, &mut reader);

    let garbage = request(
        &mut stdin,
        &mut reader,
        "1",
        "calendar.upload",
        Some(&campus.admin_token),
        json!({ "title": "Bad", "fileName": "bad.pdf", "dataBase64": "%%%not base64%%%" }),
    );
    assert_eq!(error_code(&garbage), "bad_params");

    // 3 MiB of image payload decodes past the 2 MiB profile cap.
    let oversized = "A".repeat(4 * 1024 * 1024);
    let too_big = request(
        &mut stdin,
        &mut reader,
        "2",
        "students.setProfileImage",
        Some(&campus.student_token),
        json!({ "email": "a@campus.test", "imageBase64": oversized }),
    );
    assert_eq!(error_code(&too_big), "payload_too_large");
}

#[test]
fn announcements_are_admin_written_and_newest_first() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let campus = setup_campus(&mut stdin, &mut reader);

    let denied = request(
        &mut stdin,
        &mut reader,
        "1",
        "announcements.create",
        Some(&campus.student_token),
        json!({ "message": "midterms moved" }),
    );
    assert_eq!(error_code(&denied), "access_denied");

    let empty = request(
        &mut stdin,
        &mut reader,
        "2",
        "announcements.create",
        Some(&campus.admin_token),
        json!({ "message": "   " }),
    );
    assert_eq!(error_code(&empty), "bad_params");

    let first_id = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "announcements.create",
        Some(&campus.admin_token),
        json!({ "message": "welcome week starts Monday" }),
    )
    .pointer("/announcement/id")
    .and_then(|v| v.as_str())
    .expect("announcement id")
    .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "announcements.create",
        Some(&campus.admin_token),
        json!({ "message": "library hours extended" }),
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "announcements.list",
        Some(&campus.student_token),
        json!({}),
    );
    let items = listed
        .get("announcements")
        .and_then(|v| v.as_array())
        .expect("announcements array");
    assert_eq!(items.len(), 2);
    assert_eq!(
        items[1].get("message").and_then(|v| v.as_str()),
        Some("welcome week starts Monday")
    );

    let student_delete = request(
        &mut stdin,
        &mut reader,
        "6",
        "announcements.delete",
        Some(&campus.student_token),
        json!({ "id": first_id }),
    );
    assert_eq!(error_code(&student_delete), "access_denied");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "announcements.delete",
        Some(&campus.admin_token),
        json!({ "id": first_id }),
    );
    let missing = request(
        &mut stdin,
        &mut reader,
        "8",
        "announcements.delete",
        Some(&campus.admin_token),
        json!({ "id": first_id }),
    );
    assert_eq!(error_code(&missing), "not_found");
}
