//! Per-user artifact storage.
//!
//! Each user owns one directory under the storage root; artifacts are whole
//! workbook files inside it. There is no locking, so requests for the same
//! user must be serialized by the caller.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use crate::config::{Config, FileConfig};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid user namespace: {0:?}")]
    InvalidUser(String),
    #[error("Unknown artifact: {0}")]
    UnknownArtifact(String),
    #[error("Artifact {artifact} not found at {path}")]
    NotFound { artifact: Artifact, path: PathBuf },
    #[error("Cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Named artifacts a caller can retrieve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    /// Cleaned upload plus validation status
    Input,
    /// Feasibility diagnostics
    Error,
    Output,
    Plot,
    /// Header-only upload workbook, generated on demand
    InputTemplate,
}

impl Artifact {
    pub const ALL: [Artifact; 5] = [
        Artifact::Input,
        Artifact::Error,
        Artifact::Output,
        Artifact::Plot,
        Artifact::InputTemplate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Artifact::Input => "input",
            Artifact::Error => "error",
            Artifact::Output => "output",
            Artifact::Plot => "plot",
            Artifact::InputTemplate => "input-template",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Artifact {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Artifact::ALL
            .into_iter()
            .find(|a| a.name() == s.trim())
            .ok_or_else(|| StorageError::UnknownArtifact(s.to_string()))
    }
}

/// One user's storage namespace
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
    files: FileConfig,
}

impl Storage {
    pub fn new(config: &Config, user: &str) -> Result<Self, StorageError> {
        let valid = !user.is_empty()
            && user != "."
            && user != ".."
            && !user.contains(['/', '\\'])
            && !user.contains('\0');
        if !valid {
            return Err(StorageError::InvalidUser(user.to_string()));
        }
        Ok(Self {
            dir: config.storage.root.join(user),
            files: config.files.clone(),
        })
    }

    /// File backing a stored artifact; the template is never stored
    pub fn path(&self, artifact: Artifact) -> Option<PathBuf> {
        let file = match artifact {
            Artifact::Input => &self.files.input,
            Artifact::Error => &self.files.error,
            Artifact::Output => &self.files.output,
            Artifact::Plot => &self.files.plot,
            Artifact::InputTemplate => return None,
        };
        Some(self.dir.join(file))
    }

    fn stored_path(&self, artifact: Artifact) -> Result<PathBuf, StorageError> {
        self.path(artifact)
            .ok_or_else(|| StorageError::UnknownArtifact(artifact.to_string()))
    }

    pub fn exists(&self, artifact: Artifact) -> bool {
        self.path(artifact).is_some_and(|p| p.is_file())
    }

    pub fn load(&self, artifact: Artifact) -> Result<Vec<u8>, StorageError> {
        let path = self.stored_path(artifact)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound { artifact, path })
            }
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    pub fn save(&self, artifact: Artifact, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.stored_path(artifact)?;
        fs::create_dir_all(&self.dir).map_err(|source| StorageError::Io {
            path: self.dir.clone(),
            source,
        })?;
        fs::write(&path, bytes).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(artifact = %artifact, path = %path.display(), bytes = bytes.len(), "saved artifact");
        Ok(())
    }

    /// Delete a stored artifact; a missing one is not an error
    pub fn remove(&self, artifact: Artifact) -> Result<(), StorageError> {
        let path = self.stored_path(artifact)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(artifact = %artifact, "removed stale artifact");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(root: &std::path::Path, user: &str) -> Result<Storage, StorageError> {
        let mut config = Config::default();
        config.storage.root = root.to_path_buf();
        Storage::new(&config, user)
    }

    #[test]
    fn test_save_load_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage(tmp.path(), "alice").unwrap();

        assert!(!storage.exists(Artifact::Input));
        assert!(matches!(
            storage.load(Artifact::Input),
            Err(StorageError::NotFound { artifact: Artifact::Input, .. })
        ));

        storage.save(Artifact::Input, b"bytes").unwrap();
        assert!(storage.exists(Artifact::Input));
        assert_eq!(storage.load(Artifact::Input).unwrap(), b"bytes");
        assert!(tmp.path().join("alice").join("input.zip").is_file());

        storage.remove(Artifact::Input).unwrap();
        storage.remove(Artifact::Input).unwrap();
        assert!(!storage.exists(Artifact::Input));
    }

    #[test]
    fn test_users_are_isolated() {
        let tmp = tempfile::tempdir().unwrap();
        let alice = storage(tmp.path(), "alice").unwrap();
        let bob = storage(tmp.path(), "bob").unwrap();

        alice.save(Artifact::Output, b"alice").unwrap();
        assert!(!bob.exists(Artifact::Output));
    }

    #[test]
    fn test_rejects_escaping_user_names() {
        let tmp = tempfile::tempdir().unwrap();
        for user in ["", "..", "a/b", "..\\x"] {
            assert!(
                matches!(storage(tmp.path(), user), Err(StorageError::InvalidUser(_))),
                "user {:?} should be rejected",
                user
            );
        }
    }

    #[test]
    fn test_artifact_names() {
        for artifact in Artifact::ALL {
            assert_eq!(artifact.name().parse::<Artifact>().unwrap(), artifact);
        }
        assert!("report".parse::<Artifact>().is_err());
    }
}
