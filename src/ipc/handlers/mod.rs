pub mod admin;
pub mod announcements;
pub mod attendance;
pub mod auth;
pub mod calendar;
pub mod core;
pub mod enrollment;
pub mod faculty;
pub mod students;
