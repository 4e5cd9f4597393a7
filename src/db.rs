use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("campus.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            identity_uid TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            university_id TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_identity_uid ON users(identity_uid)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            course TEXT NOT NULL,
            branch TEXT NOT NULL,
            semester INTEGER NOT NULL,
            year INTEGER NOT NULL,
            roll_no TEXT NOT NULL,
            university_id TEXT NOT NULL,
            enrollment_date TEXT NOT NULL,
            contact_number TEXT NOT NULL,
            dob TEXT NOT NULL,
            gender TEXT,
            address TEXT,
            profile_image BLOB,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS roll_sequences(
            year INTEGER NOT NULL,
            branch TEXT NOT NULL,
            next_seq INTEGER NOT NULL,
            PRIMARY KEY(year, branch)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS faculty(
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            department TEXT NOT NULL,
            university_id TEXT NOT NULL,
            contact_number TEXT NOT NULL,
            dob TEXT NOT NULL,
            gender TEXT,
            address TEXT,
            profile_image BLOB,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS admins(
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            university_id TEXT NOT NULL,
            contact_number TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_enrollments(
            id TEXT PRIMARY KEY,
            subject_name TEXT NOT NULL,
            subject_code TEXT NOT NULL,
            credits INTEGER NOT NULL,
            faculty_email TEXT NOT NULL,
            FOREIGN KEY(faculty_email) REFERENCES faculty(email)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subject_enrollments_faculty ON subject_enrollments(faculty_email)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollment_members(
            subject_id TEXT NOT NULL,
            student_email TEXT NOT NULL,
            PRIMARY KEY(subject_id, student_email),
            FOREIGN KEY(subject_id) REFERENCES subject_enrollments(id),
            FOREIGN KEY(student_email) REFERENCES students(email)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollment_members_student ON enrollment_members(student_email)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_email TEXT NOT NULL,
            faculty_email TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            date TEXT NOT NULL,
            present INTEGER NOT NULL,
            remarks TEXT,
            UNIQUE(student_email, subject_id, date),
            FOREIGN KEY(student_email) REFERENCES students(email),
            FOREIGN KEY(faculty_email) REFERENCES faculty(email),
            FOREIGN KEY(subject_id) REFERENCES subject_enrollments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_subject_date ON attendance(subject_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_email)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS announcements(
            id TEXT PRIMARY KEY,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS calendar_files(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            file_name TEXT NOT NULL,
            file_data BLOB NOT NULL,
            last_updated TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}
