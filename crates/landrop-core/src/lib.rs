//! # landrop-core
//!
//! Shared library for LanDrop containing the wire protocol codec and the
//! pure domain entities (contacts and credentials).
//!
//! This crate is used by both the networking subsystem (`landrop-net`) and
//! the command-line application (`landrop-cli`). It has zero dependencies on
//! sockets or the filesystem.
//!
//! - **`protocol`** – How bytes travel over the network. Every message is a
//!   single UTF-8 JSON object; one encoded message corresponds to exactly
//!   one socket read on the receiving side.
//!
//! - **`domain`** – Contact identity (case-insensitive email), the contact
//!   book, and the registered user's credentials.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `landrop_core::Contact` instead of `landrop_core::domain::contact::Contact`.
pub use domain::contact::{Contact, ContactBook, ContactError};
pub use domain::credentials::Credentials;
pub use protocol::codec::{decode, decode_prefix, encode, CodecError};
pub use protocol::messages::{
    ControlRequest, ControlResponse, InstanceId, PeerAnnouncement, RequestKind, WireMessage,
};
