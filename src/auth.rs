use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Claims returned by the identity provider for a valid bearer token.
#[derive(Debug, Clone)]
pub struct IdentityClaims {
    pub uid: String,
    pub email: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("invalid email or password")]
    BadCredentials,
    #[error("account already exists for {0}")]
    DuplicateAccount(String),
    #[error("no account for uid {0}")]
    UnknownUid(String),
    #[error("identity store io: {0}")]
    Store(String),
}

/// The external identity collaborator. The daemon only ever needs token
/// verification plus the provisioning hooks; everything else the provider
/// does is opaque to us.
pub trait IdentityVerifier {
    fn verify(&self, token: &str) -> Result<IdentityClaims, IdentityError>;
    fn create_account(&mut self, email: &str, password: &str) -> Result<String, IdentityError>;
    fn delete_account(&mut self, uid: &str) -> Result<(), IdentityError>;
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Account {
    uid: String,
    email: String,
    password_sha256: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct IdentityFile {
    accounts: Vec<Account>,
    /// token -> uid. Tokens are opaque and unexpiring in the local store.
    tokens: HashMap<String, String>,
}

/// Workspace-local identity store standing in for the external provider.
/// Accounts and issued tokens live in `identity.json` next to the database,
/// so a workspace is fully self-contained.
pub struct FileIdentityStore {
    path: PathBuf,
    file: IdentityFile,
}

impl FileIdentityStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        let path = workspace.join("identity.json");
        let file = if path.is_file() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            IdentityFile::default()
        };
        Ok(Self { path, file })
    }

    fn save(&self) -> Result<(), IdentityError> {
        let raw = serde_json::to_string_pretty(&self.file)
            .map_err(|e| IdentityError::Store(e.to_string()))?;
        std::fs::write(&self.path, raw).map_err(|e| IdentityError::Store(e.to_string()))
    }

    /// Password sign-in; issues a fresh opaque bearer token. This is the
    /// local stand-in for the provider's client-side sign-in endpoint.
    pub fn authenticate(&mut self, email: &str, password: &str) -> Result<String, IdentityError> {
        let digest = hash_password(password);
        let uid = self
            .file
            .accounts
            .iter()
            .find(|a| a.email == email && a.password_sha256 == digest)
            .map(|a| a.uid.clone())
            .ok_or(IdentityError::BadCredentials)?;
        let token = Uuid::new_v4().simple().to_string();
        self.file.tokens.insert(token.clone(), uid);
        self.save()?;
        Ok(token)
    }
}

impl IdentityVerifier for FileIdentityStore {
    fn verify(&self, token: &str) -> Result<IdentityClaims, IdentityError> {
        let uid = self
            .file
            .tokens
            .get(token)
            .ok_or(IdentityError::InvalidToken)?;
        let account = self
            .file
            .accounts
            .iter()
            .find(|a| a.uid == *uid)
            .ok_or(IdentityError::InvalidToken)?;
        Ok(IdentityClaims {
            uid: account.uid.clone(),
            email: account.email.clone(),
        })
    }

    fn create_account(&mut self, email: &str, password: &str) -> Result<String, IdentityError> {
        if self.file.accounts.iter().any(|a| a.email == email) {
            return Err(IdentityError::DuplicateAccount(email.to_string()));
        }
        let uid = Uuid::new_v4().to_string();
        self.file.accounts.push(Account {
            uid: uid.clone(),
            email: email.to_string(),
            password_sha256: hash_password(password),
        });
        self.save()?;
        Ok(uid)
    }

    fn delete_account(&mut self, uid: &str) -> Result<(), IdentityError> {
        let before = self.file.accounts.len();
        self.file.accounts.retain(|a| a.uid != uid);
        if self.file.accounts.len() == before {
            return Err(IdentityError::UnknownUid(uid.to_string()));
        }
        self.file.tokens.retain(|_, v| v != uid);
        self.save()
    }
}

fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}
