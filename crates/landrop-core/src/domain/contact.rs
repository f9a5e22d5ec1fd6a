//! Contacts and the contact book.
//!
//! A contact's identity is solely its email address, compared
//! case-insensitively; the display name is presentation only. The contact
//! book preserves insertion order and rejects duplicates.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for contact-book operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContactError {
    /// A contact with the same (case-insensitive) email already exists.
    #[error("contact with email {0} has already been added")]
    AlreadyAdded(String),
}

/// A peer the operator has chosen to trust.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub display_name: String,
    pub email: String,
}

impl Contact {
    pub fn new(display_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            email: email.into(),
        }
    }

    /// Case-insensitive email comparison; the sole notion of identity.
    pub fn matches_email(&self, email: &str) -> bool {
        self.email.eq_ignore_ascii_case(email)
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.matches_email(&other.email)
    }
}

impl Eq for Contact {}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.display_name, self.email)
    }
}

/// Insertion-ordered collection of contacts with unique emails.
///
/// Serialized as a bare JSON array so the on-disk contacts file is just a
/// list of entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactBook {
    contacts: Vec<Contact>,
}

impl ContactBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a contact.
    ///
    /// # Errors
    ///
    /// Returns [`ContactError::AlreadyAdded`] if a contact with the same
    /// email (any case) is already present.
    pub fn add(&mut self, contact: Contact) -> Result<(), ContactError> {
        if self.contains_email(&contact.email) {
            return Err(ContactError::AlreadyAdded(contact.email));
        }
        self.contacts.push(contact);
        Ok(())
    }

    pub fn contains_email(&self, email: &str) -> bool {
        self.contacts.iter().any(|c| c.matches_email(email))
    }

    pub fn find_by_email(&self, email: &str) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.matches_email(email))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.iter()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_equality_ignores_email_case() {
        let a = Contact::new("Alice", "alice@example.com");
        let b = Contact::new("Someone Else", "ALICE@EXAMPLE.COM");
        assert_eq!(a, b, "identity is the email alone, case-insensitively");
    }

    #[test]
    fn test_contact_equality_distinguishes_different_emails() {
        let a = Contact::new("Alice", "alice@example.com");
        let b = Contact::new("Alice", "alice@example.org");
        assert_ne!(a, b);
    }

    #[test]
    fn test_contact_display_includes_name_and_email() {
        let c = Contact::new("Bob", "bob@example.com");
        assert_eq!(c.to_string(), "Bob <bob@example.com>");
    }

    #[test]
    fn test_book_add_then_lookup_by_any_case() {
        let mut book = ContactBook::new();
        book.add(Contact::new("Alice", "Alice@Example.com")).unwrap();

        assert!(book.contains_email("alice@example.com"));
        assert!(book.contains_email("ALICE@EXAMPLE.COM"));
        assert!(book.find_by_email("aLiCe@eXaMpLe.CoM").is_some());
        assert!(!book.contains_email("bob@example.com"));
    }

    #[test]
    fn test_book_rejects_duplicate_email_regardless_of_case() {
        let mut book = ContactBook::new();
        book.add(Contact::new("Alice", "alice@example.com")).unwrap();

        let result = book.add(Contact::new("Alice Again", "ALICE@example.com"));
        assert_eq!(
            result,
            Err(ContactError::AlreadyAdded("ALICE@example.com".to_string()))
        );
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_book_serializes_as_plain_array() {
        let mut book = ContactBook::new();
        book.add(Contact::new("Alice", "alice@example.com")).unwrap();

        let json = serde_json::to_string(&book).unwrap();
        assert!(json.starts_with('['), "book must serialize transparently: {json}");

        let restored: ContactBook = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.len(), 1);
        assert!(restored.contains_email("alice@example.com"));
    }
}
