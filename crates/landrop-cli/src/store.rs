//! On-disk persistence for the contact book and the registered user.
//!
//! Two JSON files under the data directory: `contacts.json` (a plain array
//! of contacts) and `user.json` (the credentials record with its salted
//! password digest). Absent files read back as empty/none so first runs
//! need no setup.

use std::path::{Path, PathBuf};

use landrop_core::{ContactBook, Credentials};
use thiserror::Error;

const CONTACTS_FILE: &str = "contacts.json";
const USER_FILE: &str = "user.json";

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error accessing {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt store file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Whether a user has completed registration on this data directory.
pub fn user_registered(dir: &Path) -> bool {
    dir.join(USER_FILE).exists()
}

/// Loads the contact book; an absent file is an empty book.
pub fn load_contacts(dir: &Path) -> Result<ContactBook, StoreError> {
    read_json(&dir.join(CONTACTS_FILE)).map(|maybe| maybe.unwrap_or_default())
}

/// Persists the contact book, creating the data directory if needed.
pub fn save_contacts(dir: &Path, contacts: &ContactBook) -> Result<(), StoreError> {
    write_json(dir, &dir.join(CONTACTS_FILE), contacts)
}

/// Loads the registered user's credentials, if any.
pub fn load_credentials(dir: &Path) -> Result<Option<Credentials>, StoreError> {
    read_json(&dir.join(USER_FILE))
}

/// Persists the registered user's credentials.
pub fn save_credentials(dir: &Path, credentials: &Credentials) -> Result<(), StoreError> {
    write_json(dir, &dir.join(USER_FILE), credentials)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn write_json<T: serde::Serialize>(dir: &Path, path: &Path, value: &T) -> Result<(), StoreError> {
    std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let json = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, json).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use landrop_core::Contact;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("landrop_store_{}", Uuid::new_v4()))
    }

    #[test]
    fn test_fresh_directory_reads_back_empty() {
        let dir = temp_dir();
        assert!(!user_registered(&dir));
        assert!(load_contacts(&dir).unwrap().is_empty());
        assert!(load_credentials(&dir).unwrap().is_none());
    }

    #[test]
    fn test_contacts_round_trip() {
        let dir = temp_dir();
        let mut book = ContactBook::new();
        book.add(Contact::new("Alice", "alice@example.com")).unwrap();
        book.add(Contact::new("Bob", "bob@example.com")).unwrap();

        save_contacts(&dir, &book).expect("save");
        let loaded = load_contacts(&dir).expect("load");

        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains_email("ALICE@example.com"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_credentials_round_trip_marks_registration() {
        let dir = temp_dir();
        let creds = Credentials::new("Alice", "alice@example.com", "hunter2!");

        save_credentials(&dir, &creds).expect("save");
        assert!(user_registered(&dir));

        let loaded = load_credentials(&dir).expect("load").expect("present");
        assert_eq!(loaded, creds);
        assert!(loaded.verify("hunter2!"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_corrupt_contacts_file_is_an_error_not_a_panic() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(CONTACTS_FILE), b"{{{{ not json").unwrap();

        assert!(matches!(load_contacts(&dir), Err(StoreError::Json(_))));
        std::fs::remove_dir_all(&dir).ok();
    }
}
