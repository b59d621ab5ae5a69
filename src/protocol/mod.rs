//! Chat wire protocol
//!
//! The envelope shape and the length-prefixed frame codec shared by the
//! relay and its clients.

pub mod codec;
pub mod message;

pub use codec::{
    DEFAULT_MAX_FRAME_LEN, FrameReader, FrameWriter, decode_message, encode_message,
    frame_reader, frame_writer, read_message, write_message,
};
pub use message::{FilePayload, Message, MessageKind, PresencePayload};
