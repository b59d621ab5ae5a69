//! Module `codec`
//!
//! Length-prefixed framing for envelopes:
//!
//! ```text
//! [4 bytes, big-endian u32: payload length N][N bytes: JSON envelope]
//! ```
//!
//! Framing is `LengthDelimitedCodec`; this module adds the JSON layer and maps
//! codec failures into `ProtocolError`. No compression and no checksum. A
//! frame whose declared length cannot be fully read is an I/O failure, never
//! something to resynchronize from.

use std::io;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec, LengthDelimitedCodecError};

use crate::error::ProtocolError;
use crate::protocol::Message;

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

/// Largest payload accepted when no explicit limit is configured.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub type FrameReader<R> = FramedRead<R, LengthDelimitedCodec>;
pub type FrameWriter<W> = FramedWrite<W, LengthDelimitedCodec>;

fn frame_codec(max_len: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(HEADER_LEN)
        .big_endian()
        .max_frame_length(max_len)
        .new_codec()
}

/// Wraps the read side of a transport. Declared lengths above `max_len` are
/// rejected before the payload is buffered.
pub fn frame_reader<R: AsyncRead>(io: R, max_len: usize) -> FrameReader<R> {
    FramedRead::new(io, frame_codec(max_len))
}

/// Wraps the write side of a transport. Payloads above `max_len` are refused.
pub fn frame_writer<W: AsyncWrite>(io: W, max_len: usize) -> FrameWriter<W> {
    FramedWrite::new(io, frame_codec(max_len))
}

/// Serializes an envelope into a frame payload (without the length prefix).
pub fn encode_message(message: &Message) -> Result<Bytes, ProtocolError> {
    serde_json::to_vec(message)
        .map(Bytes::from)
        .map_err(ProtocolError::Encoding)
}

/// Parses a frame payload (without its length prefix) into an envelope.
pub fn decode_message(payload: &[u8]) -> Result<Message, ProtocolError> {
    serde_json::from_slice(payload).map_err(ProtocolError::Decoding)
}

fn frame_error(error: io::Error, limit: usize) -> ProtocolError {
    let over_length = error
        .get_ref()
        .is_some_and(|inner| inner.is::<LengthDelimitedCodecError>());
    if over_length {
        ProtocolError::FrameTooLarge { limit }
    } else {
        ProtocolError::Frame(error)
    }
}

/// Reads and decodes the next envelope from the stream.
pub async fn read_message<R>(frames: &mut FrameReader<R>) -> Result<Message, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let limit = frames.decoder().max_frame_length();
    match frames.next().await {
        Some(Ok(payload)) => decode_message(&payload),
        Some(Err(e)) => Err(frame_error(e, limit)),
        None => Err(ProtocolError::Frame(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream closed",
        ))),
    }
}

/// Encodes and writes one envelope, flushing the writer.
pub async fn write_message<W>(frames: &mut FrameWriter<W>, message: &Message) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let limit = frames.encoder().max_frame_length();
    let payload = encode_message(message)?;
    frames.send(payload).await.map_err(|e| frame_error(e, limit))
}
