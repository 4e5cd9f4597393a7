use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::auth::FileIdentityStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    /// Opaque bearer token; absent for core and sign-in methods.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub identity: Option<FileIdentityStore>,
}
