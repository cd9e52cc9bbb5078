//! Persisted sign-in state for the desk agent.
//!
//! The session file holds the bearer token from a successful login. It is
//! written with owner-only permissions because the token grants access to
//! candidate rosters.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Role discriminant from the login response. Zero is a student; anything
/// else gets the admin surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(pub i64);

impl Role {
    pub const STUDENT: Role = Role(0);

    pub fn is_student(self) -> bool {
        self.0 == 0
    }

    pub fn is_admin(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_student() {
            write!(f, "student")
        } else {
            write!(f, "admin")
        }
    }
}

/// A signed-in session, as returned by `login` and persisted on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub role: Role,
}

/// Reads and writes the session file.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the saved session, or `None` if nobody is signed in.
    pub fn load(&self) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session file at {}", self.path.display()))?;
        let session = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse session file at {}", self.path.display()))?;
        Ok(Some(session))
    }

    /// Persist `session`, creating the state directory if needed.
    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).with_context(
                    || format!("Failed to set permissions on {}", parent.display()),
                )?;
            }
        }

        let raw = serde_json::to_string_pretty(session).context("Failed to encode session")?;
        fs::write(&self.path, raw)
            .with_context(|| format!("Failed to write session file at {}", self.path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600)).with_context(
                || format!("Failed to set permissions on {}", self.path.display()),
            )?;
        }

        Ok(())
    }

    /// Delete the saved session. Succeeds if none exists.
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).with_context(|| {
                format!("Failed to remove session file at {}", self.path.display())
            })?;
        }
        Ok(())
    }
}
