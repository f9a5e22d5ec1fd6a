//! Wire message types for the LanDrop discovery and control protocols.
//!
//! Three shapes travel on the wire, all as single UTF-8 JSON objects with
//! legacy-stable field names:
//!
//! | Shape              | Fields                                  | Carried over |
//! |--------------------|-----------------------------------------|--------------|
//! | [`PeerAnnouncement`] | `uuid`, `server_ip`, `server_port`    | UDP broadcast |
//! | [`ControlRequest`]   | `type` (int 0..4), `args` ([string])  | TCP, client → server |
//! | [`ControlResponse`]  | `str_res`, `bool_res`                 | TCP, server → client |
//!
//! There is no length prefix or framing header: each message is written in
//! one `send` and consumed by one bounded `recv`. That keeps the protocol
//! trivially simple at the cost of a hard upper bound on message size
//! ([`CONTROL_BUFFER_SIZE`]); payloads that would exceed one read are not
//! representable.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Read buffer size for control-channel and discovery traffic. One message
/// must fit in a single read of this size.
pub const CONTROL_BUFFER_SIZE: usize = 1024;

/// Nominal size of one raw file chunk on the wire.
pub const FILE_CHUNK_SIZE: usize = 4096;

/// Token the sender emits after the last chunk to signal end of transfer.
///
/// A file chunk that happens to be byte-identical to this token at a read
/// boundary would terminate the transfer early; inherited wire-format
/// limitation.
pub const TRANSFER_END_SENTINEL: &[u8] = b"done sending";

/// `str_res` payload acknowledging one received file chunk.
pub const CHUNK_ACK_TEXT: &str = "acknowledgement";

/// `str_res` payload answering a [`RequestKind::Ping`].
pub const PING_ACK_TEXT: &str = "ping";

/// Process-lifetime-unique identifier for one running LanDrop instance.
///
/// Freshly generated on startup; identifies a *process*, not a user.
pub type InstanceId = Uuid;

// ── Request kinds ─────────────────────────────────────────────────────────────

/// Control-request discriminant, serialized as its bare integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum RequestKind {
    /// Liveness probe; answered with [`PING_ACK_TEXT`].
    Ping = 0,
    /// Ask the peer for the email of its logged-in user.
    GetIdentity = 1,
    /// Ask whether the peer's contact book holds `args[0]`.
    HasContact = 2,
    /// Ask the peer's operator for permission to send a file; `args[0]` is
    /// the sender's email.
    RequestSendConsent = 3,
    /// Announce an inbound file stream; `args[0]` is the sender-side path
    /// whose base name the receiver uses.
    SendFile = 4,
}

impl TryFrom<u8> for RequestKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RequestKind::Ping),
            1 => Ok(RequestKind::GetIdentity),
            2 => Ok(RequestKind::HasContact),
            3 => Ok(RequestKind::RequestSendConsent),
            4 => Ok(RequestKind::SendFile),
            other => Err(format!("unknown request kind: {other}")),
        }
    }
}

impl From<RequestKind> for u8 {
    fn from(kind: RequestKind) -> u8 {
        kind as u8
    }
}

// ── Message shapes ────────────────────────────────────────────────────────────

/// Discovery datagram advertising where this instance's control server can
/// be reached. Ephemeral: re-sent every broadcast cycle, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAnnouncement {
    #[serde(rename = "uuid")]
    pub instance_id: InstanceId,
    #[serde(rename = "server_ip")]
    pub announced_ip: String,
    #[serde(rename = "server_port")]
    pub announced_port: u16,
}

/// One request on the TCP control channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    #[serde(rename = "type")]
    pub kind: RequestKind,
    pub args: Vec<String>,
}

impl ControlRequest {
    /// A request with no arguments.
    pub fn new(kind: RequestKind) -> Self {
        Self { kind, args: Vec::new() }
    }

    pub fn with_args(kind: RequestKind, args: Vec<String>) -> Self {
        Self { kind, args }
    }
}

/// One response on the TCP control channel.
///
/// Legacy union-as-struct: both fields are always present on the wire, but
/// only one is meaningful for any given request kind (`str_res` for
/// Ping/GetIdentity, `bool_res` for the rest).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    #[serde(rename = "str_res")]
    pub text: String,
    #[serde(rename = "bool_res")]
    pub flag: bool,
}

impl ControlResponse {
    /// A response whose meaningful payload is the text field.
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), flag: false }
    }

    /// A response whose meaningful payload is the boolean field.
    pub fn flag(flag: bool) -> Self {
        Self { text: String::new(), flag }
    }
}

// ── Tagged union over the three shapes ────────────────────────────────────────

/// Any message that can appear on the wire.
///
/// The wire carries no explicit tag; on decode the variant is resolved by
/// which required-field set the JSON object satisfies. The three field sets
/// are disjoint, so resolution is unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireMessage {
    Announcement(PeerAnnouncement),
    Request(ControlRequest),
    Response(ControlResponse),
}

impl From<PeerAnnouncement> for WireMessage {
    fn from(msg: PeerAnnouncement) -> Self {
        WireMessage::Announcement(msg)
    }
}

impl From<ControlRequest> for WireMessage {
    fn from(msg: ControlRequest) -> Self {
        WireMessage::Request(msg)
    }
}

impl From<ControlResponse> for WireMessage {
    fn from(msg: ControlResponse) -> Self {
        WireMessage::Response(msg)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
