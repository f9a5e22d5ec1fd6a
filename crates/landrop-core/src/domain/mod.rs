//! Pure domain entities: contact identity and user credentials.

pub mod contact;
pub mod credentials;

pub use contact::{Contact, ContactBook, ContactError};
pub use credentials::Credentials;
