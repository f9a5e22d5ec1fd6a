//! Client-side request/response helpers for the TCP control channel.
//!
//! Each helper performs one strict request/response exchange on a stream the
//! caller owns exclusively (no pipelining). Transport failures never
//! propagate as errors: per the protocol's failure model they collapse to
//! `None`/`false` and the caller decides whether to drop the connection.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;

use landrop_core::{
    decode, encode, ControlRequest, ControlResponse, RequestKind, WireMessage,
    protocol::messages::{CONTROL_BUFFER_SIZE, FILE_CHUNK_SIZE, TRANSFER_END_SENTINEL},
};
use tracing::debug;

/// Sends one request and reads one response.
///
/// Returns `None` on any socket error, on EOF, or if the reply does not
/// decode as a [`ControlResponse`].
fn exchange(stream: &mut TcpStream, req: ControlRequest) -> Option<ControlResponse> {
    let bytes = encode(&WireMessage::Request(req)).ok()?;
    stream.write_all(&bytes).ok()?;

    let mut buf = [0u8; CONTROL_BUFFER_SIZE];
    let n = stream.read(&mut buf).ok()?;
    if n == 0 {
        return None;
    }
    match decode(&buf[..n]) {
        Ok(WireMessage::Response(res)) => Some(res),
        Ok(other) => {
            debug!("expected a response, peer sent {other:?}");
            None
        }
        Err(e) => {
            debug!("undecodable response: {e}");
            None
        }
    }
}

/// Liveness probe: any well-formed reply counts as alive.
pub fn ping(stream: &mut TcpStream) -> bool {
    exchange(stream, ControlRequest::new(RequestKind::Ping)).is_some()
}

/// Asks the peer for its logged-in user's email.
pub fn fetch_identity(stream: &mut TcpStream) -> Option<String> {
    exchange(stream, ControlRequest::new(RequestKind::GetIdentity))
        .map(|res| res.text)
        .filter(|email| !email.is_empty())
}

/// Asks whether the peer's contact book contains `email`.
///
/// `None` means the question could not be asked (dead connection), which is
/// different from a definite `Some(false)`.
pub fn has_added(stream: &mut TcpStream, email: &str) -> Option<bool> {
    exchange(
        stream,
        ControlRequest::with_args(RequestKind::HasContact, vec![email.to_string()]),
    )
    .map(|res| res.flag)
}

/// Asks the peer's operator for permission to receive a file from
/// `own_email`.
///
/// Blocks until the remote operator answers; there is deliberately no
/// timeout here. Denial and transport failure both collapse to `false`.
pub fn request_send_consent(stream: &mut TcpStream, own_email: &str) -> bool {
    exchange(
        stream,
        ControlRequest::with_args(
            RequestKind::RequestSendConsent,
            vec![own_email.to_string()],
        ),
    )
    .map(|res| res.flag)
    .unwrap_or(false)
}

/// Streams `path` to a peer that has already granted consent.
///
/// Protocol: one `SendFile` request carrying the sender-side path (the
/// receiver keeps only its base name), then raw 4096-byte chunks, each
/// acknowledged by the receiver, then the end-of-transfer sentinel. A
/// zero-length file is just the request followed by the sentinel.
pub fn stream_file(stream: &mut TcpStream, path: &Path) -> bool {
    let req = ControlRequest::with_args(
        RequestKind::SendFile,
        vec![path.display().to_string()],
    );
    let Ok(header) = encode(&WireMessage::Request(req)) else {
        return false;
    };
    if stream.write_all(&header).is_err() {
        return false;
    }

    let Ok(mut file) = std::fs::File::open(path) else {
        debug!("source file vanished before streaming: {}", path.display());
        return false;
    };

    let mut chunk = vec![0u8; FILE_CHUNK_SIZE];
    let mut ack = [0u8; CONTROL_BUFFER_SIZE];
    loop {
        let n = match file.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("read error while streaming {}: {e}", path.display());
                return false;
            }
        };
        if stream.write_all(&chunk[..n]).is_err() {
            return false;
        }
        // One acknowledgement per chunk keeps the two sides in lockstep.
        match stream.read(&mut ack) {
            Ok(0) | Err(_) => return false,
            Ok(_) => {}
        }
    }

    stream.write_all(TRANSFER_END_SENTINEL).is_ok()
}
