use crate::auth::error::AuthError;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Identity material captured from the chat server's `Set-Cookie` headers.
///
/// The server names the current user through the `username` cookie and keeps
/// the short-lived `accessToken` / long-lived `refreshToken` pair alongside
/// it. Fields are `None` when the response did not carry that cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityCookies {
    pub username: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Locally persisted identity, the terminal-side equivalent of the browser
/// cookie jar. Lives at `~/.cove/credentials` as TOML, mode 0600 on unix.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CredentialsStore {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl CredentialsStore {
    pub fn path() -> Result<PathBuf, AuthError> {
        let base = BaseDirs::new()
            .ok_or_else(|| AuthError::Config("unable to determine home directory".into()))?;
        let dir = base.home_dir().join(".cove");
        Ok(dir.join("credentials"))
    }

    pub fn load() -> Result<Self, AuthError> {
        Self::load_from(&Self::path()?)
    }

    /// Loads from an explicit path. A missing file is an empty store; a file
    /// that does not parse is an error (callers that only probe for an
    /// identity treat that the same as absence).
    pub fn load_from(path: &Path) -> Result<Self, AuthError> {
        if !path.exists() {
            return Ok(CredentialsStore::default());
        }
        let raw = fs::read_to_string(path)?;
        let store: CredentialsStore = toml::from_str(&raw)?;
        Ok(store)
    }

    pub fn save(&self) -> Result<(), AuthError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), AuthError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let serialized = toml::to_string_pretty(self)?;
        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        file.write_all(serialized.as_bytes())?;
        Ok(())
    }

    pub fn clear() -> Result<(), AuthError> {
        Self::clear_at(&Self::path()?)
    }

    pub fn clear_at(path: &Path) -> Result<(), AuthError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// The identity marker, if one is stored and non-empty.
    pub fn identity(&self) -> Option<&str> {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Folds freshly captured cookies into the store; absent cookies leave
    /// the existing values untouched.
    pub fn apply(&mut self, cookies: &IdentityCookies) {
        if let Some(username) = &cookies.username {
            self.username = Some(username.clone());
        }
        if let Some(token) = &cookies.access_token {
            self.access_token = Some(token.clone());
        }
        if let Some(token) = &cookies.refresh_token {
            self.refresh_token = Some(token.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn store_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials");

        let store = CredentialsStore {
            username: Some("alice".into()),
            access_token: Some("access".into()),
            refresh_token: Some("refresh".into()),
        };
        store.save_to(&path).unwrap();

        let loaded = CredentialsStore::load_from(&path).unwrap();
        assert_eq!(loaded, store);
        assert_eq!(loaded.identity(), Some("alice"));
    }

    #[test]
    fn missing_store_is_empty() {
        let dir = tempdir().unwrap();
        let loaded = CredentialsStore::load_from(&dir.path().join("credentials")).unwrap();
        assert_eq!(loaded, CredentialsStore::default());
        assert_eq!(loaded.identity(), None);
    }

    #[test]
    fn malformed_store_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials");
        std::fs::write(&path, "not = [valid").unwrap();
        assert!(CredentialsStore::load_from(&path).is_err());
    }

    #[test]
    fn blank_username_is_not_an_identity() {
        let store = CredentialsStore {
            username: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(store.identity(), None);
    }

    #[test]
    fn apply_keeps_fields_the_response_did_not_set() {
        let mut store = CredentialsStore {
            username: Some("alice".into()),
            access_token: Some("old-access".into()),
            refresh_token: Some("old-refresh".into()),
        };
        store.apply(&IdentityCookies {
            access_token: Some("new-access".into()),
            ..Default::default()
        });
        assert_eq!(store.username.as_deref(), Some("alice"));
        assert_eq!(store.access_token.as_deref(), Some("new-access"));
        assert_eq!(store.refresh_token.as_deref(), Some("old-refresh"));
    }

    #[test]
    fn clear_tolerates_a_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials");
        CredentialsStore::clear_at(&path).unwrap();

        CredentialsStore::default().save_to(&path).unwrap();
        CredentialsStore::clear_at(&path).unwrap();
        assert!(!path.exists());
    }
}
