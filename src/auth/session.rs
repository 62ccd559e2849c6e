use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// A persisted session.
///
/// The platform gives no expiry contract for its tokens, so none is checked
/// here: a stored token is trusted until the platform rejects it, and every
/// authenticated call must be prepared to fail with `Unauthorized`.
/// `created_at` is informational only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    pub open_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(token: String, open_id: Option<String>) -> Self {
        Self {
            token,
            open_id,
            created_at: Utc::now(),
        }
    }
}

/// Disk-backed session token store.
pub struct Session {
    cache_dir: PathBuf,
    pub data: Option<SessionData>,
}

impl Session {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            data: None,
        }
    }

    /// Load session from disk. Returns true if a stored session was found.
    pub fn load(&mut self) -> Result<bool> {
        let path = self.session_path();
        if path.exists() {
            let contents =
                std::fs::read_to_string(&path).context("Failed to read session file")?;
            let data: SessionData =
                serde_json::from_str(&contents).context("Failed to parse session file")?;
            self.data = Some(data);
            return Ok(true);
        }
        Ok(false)
    }

    /// Save session to disk
    pub fn save(&self) -> Result<()> {
        if let Some(ref data) = self.data {
            let path = self.session_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(data)?;
            std::fs::write(path, contents)?;
        }
        Ok(())
    }

    /// Clear session data
    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Update session with new data
    pub fn update(&mut self, data: SessionData) {
        self.data = Some(data);
    }

    /// Get the bearer token if a session is stored
    pub fn token(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.token.as_str())
    }

    /// Get the OpenID the session was created with, if any
    pub fn open_id(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.open_id.as_deref())
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(dir.path().to_path_buf());
        session.update(SessionData::new(
            "tok-123".to_string(),
            Some("open-9".to_string()),
        ));
        session.save().unwrap();

        let mut restored = Session::new(dir.path().to_path_buf());
        assert!(restored.load().unwrap());
        assert_eq!(restored.token(), Some("tok-123"));
        assert_eq!(restored.open_id(), Some("open-9"));
    }

    #[test]
    fn test_load_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(dir.path().to_path_buf());
        assert!(!session.load().unwrap());
        assert!(session.token().is_none());
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(dir.path().to_path_buf());
        session.update(SessionData::new("tok-123".to_string(), None));
        session.save().unwrap();

        session.clear().unwrap();
        assert!(session.token().is_none());

        let mut reloaded = Session::new(dir.path().to_path_buf());
        assert!(!reloaded.load().unwrap());
    }
}
