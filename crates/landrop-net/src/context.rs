//! The seam between the networking subsystem and the application layer.
//!
//! Contact and login state belong to the application layer. The subsystem
//! receives one explicit context object at construction and never looks
//! anywhere else, so there are no hidden globals to reason about.

use landrop_core::{Contact, ContactBook};

/// Read-only view of application state the network layer needs: who is
/// logged in, and who is trusted.
///
/// Implementations must be cheap to call; the control server queries them
/// on the request path of every peer connection.
pub trait NodeContext: Send + Sync + 'static {
    /// Email of the currently logged-in user, if any.
    fn current_email(&self) -> Option<String>;

    /// Whether `email` (case-insensitive) is in the contact book.
    fn is_contact(&self, email: &str) -> bool;

    /// The contact entry for `email` (case-insensitive), if any.
    fn contact_by_email(&self, email: &str) -> Option<Contact>;
}

/// A context with a fixed identity and contact book.
///
/// Used by tests and headless tooling; the CLI supplies a live
/// implementation backed by its session state.
#[derive(Debug, Clone, Default)]
pub struct FixedContext {
    email: Option<String>,
    contacts: ContactBook,
}

impl FixedContext {
    /// A context with a logged-in user and the given contacts.
    pub fn new(email: impl Into<String>, contacts: ContactBook) -> Self {
        Self {
            email: Some(email.into()),
            contacts,
        }
    }

    /// A context with no logged-in user and no contacts.
    pub fn logged_out() -> Self {
        Self::default()
    }
}

impl NodeContext for FixedContext {
    fn current_email(&self) -> Option<String> {
        self.email.clone()
    }

    fn is_contact(&self, email: &str) -> bool {
        self.contacts.contains_email(email)
    }

    fn contact_by_email(&self, email: &str) -> Option<Contact> {
        self.contacts.find_by_email(email).cloned()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
