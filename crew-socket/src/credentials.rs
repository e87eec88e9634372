//! Credential resolution for the socket handshake.
//!
//! The connection manager asks a [`CredentialStore`] for the current auth
//! token and the cached profile of the signed-in user. Stores are plain
//! lookups: no retries, no refresh.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crew_core::error::{CrewError, CrewResult};

/// Profile of the signed-in user, attached as the sender of outbound messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, rename = "avatar", alias = "avatarUrl", skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl UserProfile {
    /// Display name as "First Last", trimmed.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// Token and user id resolved for one `connect()` call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub auth_token: String,
    pub user_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("auth_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Source of the auth token and cached user profile.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Current auth token, or `None` before login.
    async fn token(&self) -> CrewResult<Option<String>>;

    /// Profile cached at login, if any.
    async fn cached_user(&self) -> CrewResult<Option<UserProfile>>;
}

/// In-memory credentials, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialStore {
    token: Option<String>,
    user: Option<UserProfile>,
}

impl StaticCredentialStore {
    pub fn new(token: Option<String>, user: Option<UserProfile>) -> Self {
        Self { token, user }
    }

    /// A store with nothing in it, as before login.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn token(&self) -> CrewResult<Option<String>> {
        Ok(self.token.clone())
    }

    async fn cached_user(&self) -> CrewResult<Option<UserProfile>> {
        Ok(self.user.clone())
    }
}

/// On-disk login session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredSession {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// Credential store backed by a JSON session file.
///
/// A missing file means "not logged in" and is not an error.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the session file.
    pub async fn load(&self) -> CrewResult<StoredSession> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                CrewError::Credentials(format!("{}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no session file at {}", self.path.display());
                Ok(StoredSession::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the session file, creating parent directories as needed.
    pub async fn save(&self, session: &StoredSession) -> CrewResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(session)?;
        tokio::fs::write(&self.path, contents).await?;
        Ok(())
    }

    /// Remove the session file. Returns whether one existed.
    pub async fn clear(&self) -> CrewResult<bool> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn token(&self) -> CrewResult<Option<String>> {
        Ok(self.load().await?.token.filter(|t| !t.trim().is_empty()))
    }

    async fn cached_user(&self) -> CrewResult<Option<UserProfile>> {
        Ok(self.load().await?.user)
    }
}
