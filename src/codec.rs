//! Message framing and the pluggable payload codec.
//!
//! Everything on a pipemux pipe travels as a *frame*: a 4-byte little-endian unsigned length
//! followed by exactly that many payload bytes. Frame boundaries are authoritative: a clean
//! end-of-stream can only occur on a boundary, and anything else (a partial header, a stream that
//! ends mid-payload, a zero or absurd length) is a protocol violation.
//!
//! What the payload bytes *mean* is the business of a [`Codec`]. The default, [`Bincode`], handles
//! any `serde`-serializable type; applications with their own wire format implement the trait
//! themselves and hand it to the server/client options. Handshake strings are deliberately *not*
//! run through the codec. They are framed raw UTF-8, so the rendezvous works identically no
//! matter what codec the application plugs in.

use crate::error::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::io::{self, prelude::*};

/// Upper bound on the payload length of a single frame.
///
/// A peer announcing a longer frame is treated as protocol corruption rather than an allocation
/// request.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = 4;

/// Translates between typed messages and frame payloads.
///
/// `R` is the type read off the pipe, `W` the type written to it. The two are independent so that
/// a server and its clients can speak different types in each direction.
pub trait Codec<R, W>: Send + Sync + 'static {
    /// Serializes an outbound message into a frame payload. Failures surface as
    /// [`Error::Serialization`] and do not close the connection.
    fn encode(&self, message: &W) -> Result<Vec<u8>>;
    /// Deserializes a received frame payload. The payload is always a complete frame; trailing
    /// garbage within it is an encoding error.
    fn decode(&self, payload: &[u8]) -> Result<R>;
}

/// The default codec: Bincode's self-describing binary encoding of any Serde-compatible type.
#[derive(Copy, Clone, Debug, Default)]
pub struct Bincode;

impl<R: DeserializeOwned + 'static, W: Serialize + 'static> Codec<R, W> for Bincode {
    fn encode(&self, message: &W) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(message, bincode::config::standard())
            .map_err(|e| Error::Serialization(Box::new(e)))
    }

    fn decode(&self, payload: &[u8]) -> Result<R> {
        let (message, consumed) =
            bincode::serde::decode_from_slice(payload, bincode::config::standard())
                .map_err(|e| Error::Serialization(Box::new(e)))?;
        if consumed != payload.len() {
            return Err(Error::protocol(format!(
                "frame carries {} byte(s) of trailing garbage",
                payload.len() - consumed,
            )));
        }
        Ok(message)
    }
}

/// Writes one frame and flushes it.
///
/// The flush is the drain step: on Windows named pipes it blocks until the peer has consumed the
/// bytes, so a close immediately afterwards cannot truncate the frame. Unix sockets deliver
/// buffered bytes after close on their own.
pub(crate) fn write_frame(mut writer: impl Write, payload: &[u8]) -> Result<()> {
    if payload.is_empty() {
        return Err(Error::protocol("refusing to send a zero-length frame"));
    }
    if payload.len() > MAX_FRAME_LEN {
        return Err(Error::protocol(format!(
            "{}-byte frame exceeds the {MAX_FRAME_LEN}-byte ceiling",
            payload.len(),
        )));
    }
    let header = (payload.len() as u32).to_le_bytes();
    writer.write_all(&header)?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Reads one frame. `Ok(None)` is clean end-of-stream, zero bytes available at a frame boundary.
pub(crate) fn read_frame(mut reader: impl Read) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(Error::protocol(format!(
                    "stream ended after {filled} byte(s) of a frame header",
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    let len = u32::from_le_bytes(header) as usize;
    if len == 0 {
        return Err(Error::protocol("peer sent a zero-length frame"));
    }
    if len > MAX_FRAME_LEN {
        return Err(Error::protocol(format!(
            "peer announced a {len}-byte frame, over the {MAX_FRAME_LEN}-byte ceiling",
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            Error::protocol(format!("stream ended inside a {len}-byte frame"))
        }
        _ => Error::from(e),
    })?;
    Ok(Some(payload))
}

/// Encodes a message with the codec and writes it as one frame.
pub(crate) fn write_message<R: 'static, W: 'static>(
    writer: impl Write,
    codec: &dyn Codec<R, W>,
    message: &W,
) -> Result<()> {
    let payload = codec.encode(message)?;
    write_frame(writer, &payload)
}

/// Reads one frame and decodes it. `Ok(None)` is clean end-of-stream.
pub(crate) fn read_message<R: 'static, W: 'static>(
    reader: impl Read,
    codec: &dyn Codec<R, W>,
) -> Result<Option<R>> {
    match read_frame(reader)? {
        Some(payload) => codec.decode(&payload).map(Some),
        None => Ok(None),
    }
}

/// Frames a handshake string as raw UTF-8, bypassing the application codec.
pub(crate) fn write_handshake(writer: impl Write, name: &str) -> Result<()> {
    write_frame(writer, name.as_bytes())
}

/// Reads a handshake string. End-of-stream before the name arrives surfaces as a transport
/// error, not a clean EOF: it means the rendezvous never happened. On Unix sockets this is what
/// losing the accept race to another client looks like, and callers retry on it.
pub(crate) fn read_handshake(reader: impl Read) -> Result<String> {
    let payload = read_frame(reader)?.ok_or_else(|| {
        Error::Transport(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream closed before the handshake name arrived",
        ))
    })?;
    String::from_utf8(payload)
        .map_err(|_| Error::protocol("handshake name is not valid UTF-8"))
}
