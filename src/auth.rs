//! Anonymous kiosk sessions.
//!
//! Screens only need two contracts: "make sure someone is signed in and tell
//! me who" and "sign out". [`LocalAnonymousAuth`] fulfils them by issuing a
//! random identifier and keeping it in `session.json` under the data
//! directory so a restarted kiosk resumes the same visitor.

use crate::{KioskError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const SESSION_FILE: &str = "session.json";
const SHORT_ID_LEN: usize = 8;

/// Identity of the visitor currently using the kiosk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub uid: String,
    pub short_id: String,
    pub signed_in_at: DateTime<Utc>,
}

impl SessionIdentity {
    pub fn new(uid: impl Into<String>) -> Self {
        let uid = uid.into();
        Self {
            short_id: short_id(&uid),
            uid,
            signed_in_at: Utc::now(),
        }
    }
}

/// First eight characters of a session id, used as a human-friendly handle.
pub fn short_id(uid: &str) -> String {
    uid.chars().take(SHORT_ID_LEN).collect()
}

/// Authentication collaborator.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Return the current identity, signing in anonymously when there is none.
    async fn ensure_signed_in(&self) -> Result<SessionIdentity>;

    /// The current identity, if any, without signing in.
    async fn current(&self) -> Option<SessionIdentity>;

    async fn sign_out(&self) -> Result<()>;
}

/// File-backed anonymous sign-in.
pub struct LocalAnonymousAuth {
    session_file: PathBuf,
    current: RwLock<Option<SessionIdentity>>,
}

impl LocalAnonymousAuth {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            session_file: data_dir.join(SESSION_FILE),
            current: RwLock::new(None),
        }
    }

    async fn load_persisted(&self) -> Option<SessionIdentity> {
        let content = fs::read_to_string(&self.session_file).await.ok()?;
        match serde_json::from_str::<SessionIdentity>(&content) {
            Ok(identity) if !identity.uid.trim().is_empty() => Some(identity),
            Ok(_) => None,
            Err(e) => {
                warn!("Ignoring unreadable session file: {}", e);
                None
            }
        }
    }

    async fn persist(&self, identity: &SessionIdentity) -> Result<()> {
        if let Some(parent) = self.session_file.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(identity)?;
        fs::write(&self.session_file, content)
            .await
            .map_err(|e| KioskError::Auth(format!("cannot persist session: {e}")))
    }
}

#[async_trait]
impl AuthProvider for LocalAnonymousAuth {
    async fn ensure_signed_in(&self) -> Result<SessionIdentity> {
        if let Some(identity) = self.current.read().await.clone() {
            return Ok(identity);
        }

        let mut current = self.current.write().await;
        if let Some(identity) = current.clone() {
            return Ok(identity);
        }

        let identity = match self.load_persisted().await {
            Some(identity) => {
                debug!("Resumed session {}", identity.short_id);
                identity
            }
            None => {
                let identity = SessionIdentity::new(uuid::Uuid::new_v4().simple().to_string());
                self.persist(&identity).await?;
                info!("Signed in anonymously as {}", identity.short_id);
                identity
            }
        };

        *current = Some(identity.clone());
        Ok(identity)
    }

    async fn current(&self) -> Option<SessionIdentity> {
        self.current.read().await.clone()
    }

    async fn sign_out(&self) -> Result<()> {
        let previous = self.current.write().await.take();
        match fs::remove_file(&self.session_file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(KioskError::Auth(format!("cannot clear session: {e}"))),
        }
        if let Some(identity) = previous {
            info!("Signed out {}", identity.short_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("abcdefghijkl"), "abcdefgh");
        assert_eq!(short_id("abc"), "abc");
    }

    #[tokio::test]
    async fn test_sign_in_is_stable() {
        let dir = TempDir::new().unwrap();
        let auth = LocalAnonymousAuth::new(dir.path());
        assert!(auth.current().await.is_none());

        let first = auth.ensure_signed_in().await.unwrap();
        let second = auth.ensure_signed_in().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.short_id.len(), 8);
        assert!(first.uid.starts_with(&first.short_id));
    }

    #[tokio::test]
    async fn test_session_survives_restart() {
        let dir = TempDir::new().unwrap();
        let uid = LocalAnonymousAuth::new(dir.path())
            .ensure_signed_in()
            .await
            .unwrap()
            .uid;

        let restarted = LocalAnonymousAuth::new(dir.path());
        assert_eq!(restarted.ensure_signed_in().await.unwrap().uid, uid);
    }

    #[tokio::test]
    async fn test_sign_out_issues_new_identity() {
        let dir = TempDir::new().unwrap();
        let auth = LocalAnonymousAuth::new(dir.path());
        let before = auth.ensure_signed_in().await.unwrap();

        auth.sign_out().await.unwrap();
        assert!(auth.current().await.is_none());
        assert!(!dir.path().join(SESSION_FILE).exists());

        let after = auth.ensure_signed_in().await.unwrap();
        assert_ne!(before.uid, after.uid);
    }

    #[tokio::test]
    async fn test_sign_out_without_session_is_ok() {
        let dir = TempDir::new().unwrap();
        let auth = LocalAnonymousAuth::new(dir.path());
        auth.sign_out().await.unwrap();
    }
}
