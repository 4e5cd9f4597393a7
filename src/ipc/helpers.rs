use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

use super::error::err;
use super::types::{AppState, Request};
use crate::auth::{IdentityError, IdentityVerifier};
use crate::policy::{AuthSubject, Deny, Role};

/// Error carried through a handler; maps onto the wire taxonomy.
/// Codes shadow HTTP statuses: bad_params (400), unauthorized (401),
/// access_denied (403), not_found (404), conflict / payload_too_large
/// (400-class), db_* / identity_* (500-class).
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            code: "unauthorized",
            message: message.into(),
            details: None,
        }
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self {
            code: "access_denied",
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: "not_found",
            message: message.into(),
            details: None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            code: "conflict",
            message: message.into(),
            details: None,
        }
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self {
            code: "payload_too_large",
            message: message.into(),
            details: None,
        }
    }

    pub fn no_workspace() -> Self {
        Self {
            code: "no_workspace",
            message: "select a workspace first".to_string(),
            details: None,
        }
    }

    pub fn db_query(e: rusqlite::Error) -> Self {
        Self {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        }
    }

    pub fn db_insert(e: rusqlite::Error, table: &str) -> Self {
        Self {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": table })),
        }
    }

    pub fn db_update(e: rusqlite::Error, table: &str) -> Self {
        Self {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": table })),
        }
    }

    pub fn db_tx(e: rusqlite::Error) -> Self {
        Self {
            code: "db_tx_failed",
            message: e.to_string(),
            details: None,
        }
    }

    pub fn db_commit(e: rusqlite::Error) -> Self {
        Self {
            code: "db_commit_failed",
            message: e.to_string(),
            details: None,
        }
    }

    pub fn identity(e: IdentityError) -> Self {
        match e {
            IdentityError::DuplicateAccount(email) => {
                Self::conflict(format!("identity account already exists for {}", email))
            }
            IdentityError::InvalidToken | IdentityError::BadCredentials => {
                Self::unauthorized(e.to_string())
            }
            other => Self {
                code: "identity_failed",
                message: other.to_string(),
                details: None,
            },
        }
    }
}

impl From<Deny> for HandlerErr {
    fn from(d: Deny) -> Self {
        HandlerErr::access_denied(d.message())
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_required_bool(params: &serde_json::Value, key: &str) -> Result<bool, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Dates travel as `YYYY-MM-DD` strings and are stored as such; string
/// ordering matches date ordering, which the range queries rely on.
pub fn parse_date(s: &str) -> Result<String, HandlerErr> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| HandlerErr::bad_params(format!("invalid date: {} (want YYYY-MM-DD)", s)))
}

pub fn decode_base64_limited(
    data: &str,
    max_bytes: usize,
    what: &str,
) -> Result<Vec<u8>, HandlerErr> {
    let bytes = BASE64
        .decode(data)
        .map_err(|_| HandlerErr::bad_params(format!("{} is not valid base64", what)))?;
    if bytes.len() > max_bytes {
        return Err(HandlerErr::payload_too_large(format!(
            "{} exceeds {} bytes",
            what, max_bytes
        )));
    }
    Ok(bytes)
}

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Resolves the request's bearer token to the authenticated subject:
/// verifier claims first, then the users row keyed by identity uid.
pub fn authenticate(state: &AppState, req: &Request) -> Result<AuthSubject, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let identity = state
        .identity
        .as_ref()
        .ok_or_else(HandlerErr::no_workspace)?;
    let token = req
        .token
        .as_deref()
        .ok_or_else(|| HandlerErr::unauthorized("missing bearer token"))?;

    let claims = identity.verify(token).map_err(HandlerErr::identity)?;

    let row = conn
        .query_row(
            "SELECT email, name, role, university_id FROM users WHERE identity_uid = ?",
            [&claims.uid],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            },
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some((email, name, role_raw, university_id)) = row else {
        return Err(HandlerErr::unauthorized("no user for token subject"));
    };
    let role = Role::parse(&role_raw)
        .ok_or_else(|| HandlerErr::unauthorized(format!("unknown role: {}", role_raw)))?;

    Ok(AuthSubject {
        uid: claims.uid,
        email,
        name,
        role,
        university_id,
    })
}

pub fn student_exists(conn: &Connection, email: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM students WHERE email = ?", [email], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db_query)
}

pub fn faculty_exists(conn: &Connection, email: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM faculty WHERE email = ?", [email], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db_query)
}

#[derive(Debug, Clone)]
pub struct SubjectRow {
    pub id: String,
    pub subject_name: String,
    pub subject_code: String,
    pub credits: i64,
    pub faculty_email: String,
}

pub fn find_subject(conn: &Connection, subject_id: &str) -> Result<Option<SubjectRow>, HandlerErr> {
    conn.query_row(
        "SELECT id, subject_name, subject_code, credits, faculty_email
         FROM subject_enrollments WHERE id = ?",
        [subject_id],
        |r| {
            Ok(SubjectRow {
                id: r.get(0)?,
                subject_name: r.get(1)?,
                subject_code: r.get(2)?,
                credits: r.get(3)?,
                faculty_email: r.get(4)?,
            })
        },
    )
    .optional()
    .map_err(HandlerErr::db_query)
}

pub fn roster_contains(
    conn: &Connection,
    subject_id: &str,
    student_email: &str,
) -> Result<bool, HandlerErr> {
    conn.query_row(
        "SELECT 1 FROM enrollment_members WHERE subject_id = ? AND student_email = ?",
        (subject_id, student_email),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db_query)
}
