use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Faculty,
    Student,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "faculty" => Some(Role::Faculty),
            "student" => Some(Role::Student),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Faculty => "faculty",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated principal for one request, resolved from the bearer
/// token via the identity verifier and the users table.
#[derive(Debug, Clone)]
pub struct AuthSubject {
    pub uid: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub university_id: String,
}

/// What a request wants to touch.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    /// Provisioning and entity administration.
    Administration,
    /// Roster/enrollment management.
    Enrollment,
    /// Attendance for a subject taught by the given faculty email.
    Attendance { faculty_email: &'a str },
    /// A student's own record (profile, summary), keyed by email.
    StudentRecord { email: &'a str },
    /// A faculty member's own record, keyed by email.
    FacultyRecord { email: &'a str },
    Announcements,
    Calendar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
}

/// Explicit allow/deny decision per request. Admins administer everything;
/// faculty write attendance only as themselves; students and faculty read
/// only their own records.
pub fn authorize(subject: &AuthSubject, resource: Resource, action: Action) -> Result<(), Deny> {
    let allowed = match resource {
        Resource::Administration | Resource::Enrollment => subject.role == Role::Admin,
        Resource::Attendance { faculty_email } => match action {
            Action::Write => subject.role == Role::Faculty && subject.email == faculty_email,
            Action::Read => subject.role == Role::Faculty || subject.role == Role::Admin,
        },
        Resource::StudentRecord { email } => match action {
            Action::Read => {
                subject.role == Role::Admin
                    || (subject.role == Role::Student && subject.email == email)
            }
            Action::Write => {
                subject.role == Role::Admin
                    || (subject.role == Role::Student && subject.email == email)
            }
        },
        Resource::FacultyRecord { email } => {
            subject.role == Role::Admin
                || (subject.role == Role::Faculty && subject.email == email)
        }
        Resource::Announcements | Resource::Calendar => match action {
            Action::Read => true,
            Action::Write => subject.role == Role::Admin,
        },
    };
    if allowed {
        Ok(())
    } else {
        Err(Deny {
            role: subject.role,
        })
    }
}

#[derive(Debug)]
pub struct Deny {
    pub role: Role,
}

impl Deny {
    pub fn message(&self) -> String {
        format!("role {} may not perform this operation", self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(role: Role, email: &str) -> AuthSubject {
        AuthSubject {
            uid: "u1".to_string(),
            email: email.to_string(),
            name: "Test".to_string(),
            role,
            university_id: "t@university.edu".to_string(),
        }
    }

    #[test]
    fn admin_administers_everything() {
        let s = subject(Role::Admin, "root@example.com");
        assert!(authorize(&s, Resource::Administration, Action::Write).is_ok());
        assert!(authorize(&s, Resource::Enrollment, Action::Write).is_ok());
        assert!(authorize(
            &s,
            Resource::StudentRecord { email: "x@example.com" },
            Action::Read
        )
        .is_ok());
        assert!(authorize(&s, Resource::Calendar, Action::Write).is_ok());
    }

    #[test]
    fn student_reads_only_own_record() {
        let s = subject(Role::Student, "alice@example.com");
        assert!(authorize(
            &s,
            Resource::StudentRecord { email: "alice@example.com" },
            Action::Read
        )
        .is_ok());
        assert!(authorize(
            &s,
            Resource::StudentRecord { email: "bob@example.com" },
            Action::Read
        )
        .is_err());
        assert!(authorize(&s, Resource::Administration, Action::Write).is_err());
        assert!(authorize(&s, Resource::Announcements, Action::Read).is_ok());
        assert!(authorize(&s, Resource::Announcements, Action::Write).is_err());
    }

    #[test]
    fn faculty_marks_attendance_only_as_self() {
        let s = subject(Role::Faculty, "prof@example.com");
        assert!(authorize(
            &s,
            Resource::Attendance { faculty_email: "prof@example.com" },
            Action::Write
        )
        .is_ok());
        assert!(authorize(
            &s,
            Resource::Attendance { faculty_email: "other@example.com" },
            Action::Write
        )
        .is_err());
        // Admins read attendance stats but never mark.
        let a = subject(Role::Admin, "root@example.com");
        assert!(authorize(
            &a,
            Resource::Attendance { faculty_email: "prof@example.com" },
            Action::Write
        )
        .is_err());
        assert!(authorize(
            &a,
            Resource::Attendance { faculty_email: "prof@example.com" },
            Action::Read
        )
        .is_ok());
    }
}
