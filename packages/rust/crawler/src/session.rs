//! Durable storage for the authenticated browsing session.
//!
//! The session is written once by a manual login flow and read at the start
//! of every run. Nothing here refreshes or re-validates it: an expired
//! session shows up later as [`LeadHarvestError::SessionInvalid`] navigations.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use leadharvest_shared::{LeadHarvestError, Result, Session, SessionCookie};

/// File-backed session persistence.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted session.
    pub fn restore(&self) -> Result<Session> {
        if !self.path.exists() {
            return Err(LeadHarvestError::SessionAbsent {
                path: self.path.clone(),
            });
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| LeadHarvestError::io(&self.path, e))?;
        let session = parse_session_export(&content)?;

        debug!(
            path = %self.path.display(),
            cookies = session.cookies.len(),
            captured_at = %session.captured_at,
            "session restored"
        );
        Ok(session)
    }

    /// Write `session` to disk, replacing any previous one.
    pub fn persist(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| LeadHarvestError::io(parent, e))?;
            }
        }

        let content = serde_json::to_string_pretty(session)
            .map_err(|e| LeadHarvestError::parse(format!("failed to encode session: {e}")))?;

        // Write-then-rename so a crash never leaves a truncated session behind.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| LeadHarvestError::io(&tmp, e))?;
        restrict_permissions(&tmp)?;
        std::fs::rename(&tmp, &self.path).map_err(|e| LeadHarvestError::io(&self.path, e))?;

        info!(
            path = %self.path.display(),
            cookies = session.cookies.len(),
            "session persisted"
        );
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| LeadHarvestError::io(path, e))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Parse a session file or a browser cookie export.
///
/// Accepts a persisted [`Session`], a browser storage-state document
/// (`{"cookies": [...], "origins": [...]}`), or a bare JSON array of cookies.
pub fn parse_session_export(content: &str) -> Result<Session> {
    if let Ok(session) = serde_json::from_str::<Session>(content) {
        if !session.cookies.is_empty() {
            return Ok(session);
        }
    }

    let cookies: Vec<SessionCookie> = serde_json::from_str(content)
        .map_err(|e| LeadHarvestError::parse(format!("unrecognized session format: {e}")))?;
    if cookies.is_empty() {
        return Err(LeadHarvestError::parse("session contains no cookies"));
    }

    Ok(Session {
        captured_at: chrono::Utc::now(),
        cookies,
    })
}
