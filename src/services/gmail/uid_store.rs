use crate::config::app_data_dir;
use crate::errors::{BguError, BguResult};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const UID_FILE_NAME: &str = "gmail_last_uid.txt";

/// Last-seen IMAP UID persisted across runs.
#[derive(Debug, Clone)]
pub struct UidStore {
    path: PathBuf,
}

impl UidStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_data_dir() -> Self {
        Self::new(app_data_dir().join(UID_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when no marker exists or it cannot be read.
    pub fn load(&self) -> Option<u32> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No cached UID found at {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!("Failed to load last UID: {}", e);
                return None;
            }
        };

        match content.trim().parse() {
            Ok(uid) => {
                debug!("Loaded last UID {} from {}", uid, self.path.display());
                Some(uid)
            }
            Err(e) => {
                warn!("Ignoring corrupt UID marker {}: {}", self.path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, uid: u32) -> BguResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, uid.to_string()).map_err(|e| {
            BguError::Mail(format!(
                "Failed to save last UID to {}: {e}",
                self.path.display()
            ))
        })?;
        debug!("Saved last UID {} to {}", uid, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_marker_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = UidStore::new(dir.path().join(UID_FILE_NAME));
        assert_eq!(store.load(), None);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = UidStore::new(dir.path().join("nested").join(UID_FILE_NAME));
        store.save(1234).unwrap();
        assert_eq!(store.load(), Some(1234));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "1234");
    }

    #[test]
    fn corrupt_marker_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(UID_FILE_NAME);
        std::fs::write(&path, "not-a-number").unwrap();
        assert_eq!(UidStore::new(path).load(), None);
    }
}
