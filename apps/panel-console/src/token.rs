use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use panel_stream::{Credential, CredentialSource};
use tracing::{debug, warn};

use crate::error::CliError;

/// Token saved by the panel login flow, one line in a plain file.
///
/// The file is read on every call so a rotated token is picked up by the
/// next session start without restarting the console.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/panel/token`.
    pub fn default_path() -> Result<PathBuf, CliError> {
        let base = BaseDirs::new()
            .ok_or_else(|| CliError::Config("unable to determine config directory".into()))?;
        Ok(base.config_dir().join("panel").join("token"))
    }

    pub fn discover() -> Result<Self, CliError> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> io::Result<Option<Credential>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(raw.lines().next().map(str::trim).and_then(Credential::new)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl CredentialSource for TokenStore {
    fn current(&self) -> Option<Credential> {
        match self.read() {
            Ok(Some(credential)) => Some(credential),
            Ok(None) => {
                debug!(target: "panel::console", path = %self.path.display(), "no stored token");
                None
            }
            Err(err) => {
                warn!(target: "panel::console", path = %self.path.display(), error = %err, "failed to read token file");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("panel-console-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir.join("token")
    }

    #[test]
    fn missing_file_yields_no_credential() {
        let store = TokenStore::new(scratch("missing"));
        assert!(store.current().is_none());
    }

    #[test]
    fn file_padding_is_not_part_of_the_token() {
        let path = scratch("trimmed");
        fs::write(&path, "  abc123  \n").unwrap();
        let store = TokenStore::new(&path);
        assert_eq!(store.current().unwrap().expose(), "abc123");
    }

    #[test]
    fn rotation_is_seen_on_next_read() {
        let path = scratch("rotation");
        fs::write(&path, "first\n").unwrap();
        let store = TokenStore::new(&path);
        assert_eq!(store.current().unwrap().expose(), "first");
        fs::write(&path, "second\n").unwrap();
        assert_eq!(store.current().unwrap().expose(), "second");
    }

    #[test]
    fn blank_file_is_treated_as_absent() {
        let path = scratch("blank");
        fs::write(&path, "\n").unwrap();
        assert!(TokenStore::new(&path).current().is_none());
    }

    #[test]
    fn default_path_ends_in_panel_token() {
        if let Ok(path) = TokenStore::default_path() {
            assert!(path.ends_with("panel/token"));
        }
    }
}
