//! Login state and the live contact book.
//!
//! One `Session` exists per process. It tracks failed login attempts (five
//! strikes, then a permanent lockout for the process lifetime), holds the
//! logged-in credentials, and keeps the contact book in memory with
//! write-through persistence. It is also the [`NodeContext`] the networking
//! subsystem queries on every peer request.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use landrop_core::{Contact, ContactBook, ContactError, Credentials};
use landrop_net::NodeContext;
use thiserror::Error;
use tracing::info;

use crate::store::{self, StoreError};

/// Failed logins tolerated before the process refuses further attempts.
pub const MAX_LOGIN_ATTEMPTS: u32 = 5;

/// Error type for session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Contact(#[from] ContactError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one login attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    /// Wrong email/password combination; `attempts_left` may be zero, in
    /// which case the next attempt is refused outright.
    Invalid { attempts_left: u32 },
    /// Too many failures; no further attempts are accepted.
    LockedOut,
}

/// Per-process application state shared between the REPL and the network.
pub struct Session {
    data_dir: PathBuf,
    logged_in: Mutex<Option<Credentials>>,
    failed_attempts: Mutex<u32>,
    contacts: Mutex<ContactBook>,
}

impl Session {
    /// Loads the persisted contact book and starts logged out.
    pub fn load(data_dir: PathBuf) -> Result<Self, SessionError> {
        let contacts = store::load_contacts(&data_dir)?;
        Ok(Self {
            data_dir,
            logged_in: Mutex::new(None),
            failed_attempts: Mutex::new(0),
            contacts: Mutex::new(contacts),
        })
    }

    /// Attempts to log in against the registered credentials.
    pub fn login(&self, registered: &Credentials, email: &str, password: &str) -> LoginOutcome {
        let mut attempts = self.lock_attempts();
        if *attempts >= MAX_LOGIN_ATTEMPTS {
            return LoginOutcome::LockedOut;
        }

        let valid = registered.email.eq_ignore_ascii_case(email) && registered.verify(password);
        if valid {
            *attempts = 0;
            *self.lock_logged_in() = Some(registered.clone());
            info!("logged in as {}", registered.email);
            LoginOutcome::Success
        } else {
            *attempts += 1;
            if *attempts >= MAX_LOGIN_ATTEMPTS {
                LoginOutcome::LockedOut
            } else {
                LoginOutcome::Invalid {
                    attempts_left: MAX_LOGIN_ATTEMPTS - *attempts,
                }
            }
        }
    }

    pub fn logged_in_email(&self) -> Option<String> {
        self.lock_logged_in().as_ref().map(|c| c.email.clone())
    }

    /// Adds a contact to the book and persists the book.
    ///
    /// # Errors
    ///
    /// [`ContactError::AlreadyAdded`] for duplicates, [`StoreError`] if the
    /// write fails (the in-memory book is updated either way only on
    /// success).
    pub fn add_contact(&self, contact: Contact) -> Result<(), SessionError> {
        let mut contacts = self.lock_contacts();
        let mut updated = contacts.clone();
        updated.add(contact)?;
        store::save_contacts(&self.data_dir, &updated)?;
        *contacts = updated;
        Ok(())
    }

    /// A point-in-time copy of the contact book for iteration.
    pub fn contacts_snapshot(&self) -> ContactBook {
        self.lock_contacts().clone()
    }

    fn lock_logged_in(&self) -> std::sync::MutexGuard<'_, Option<Credentials>> {
        self.logged_in.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_attempts(&self) -> std::sync::MutexGuard<'_, u32> {
        self.failed_attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_contacts(&self) -> std::sync::MutexGuard<'_, ContactBook> {
        self.contacts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NodeContext for Session {
    fn current_email(&self) -> Option<String> {
        self.logged_in_email()
    }

    fn is_contact(&self, email: &str) -> bool {
        self.lock_contacts().contains_email(email)
    }

    fn contact_by_email(&self, email: &str) -> Option<Contact> {
        self.lock_contacts().find_by_email(email).cloned()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
