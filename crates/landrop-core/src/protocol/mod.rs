//! Protocol module containing the wire message types and the JSON codec.

pub mod codec;
pub mod messages;

pub use codec::{decode, decode_prefix, encode, CodecError};
pub use messages::*;
