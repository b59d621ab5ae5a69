//! Error types
//!
//! Defines domain-specific error types for each layer of the relay: the wire
//! protocol, the hub's routing, and the per-connection session.

use std::fmt;
use std::io;
use std::time::Duration;

use crate::session::SessionId;

/// Wire protocol errors (framing, envelope decoding and encoding)
#[derive(Debug)]
pub enum ProtocolError {
    /// Short or failed read/write of a frame
    Frame(io::Error),
    /// Declared frame length exceeds the configured limit
    FrameTooLarge { limit: usize },
    /// Payload bytes are not a valid envelope
    Decoding(serde_json::Error),
    /// An outgoing envelope could not be serialized
    Encoding(serde_json::Error),
    /// Envelope kind and populated fields disagree
    InconsistentEnvelope(String),
}

impl ProtocolError {
    /// True when the peer closed the stream, possibly mid-frame.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProtocolError::Frame(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Frame(e) => write!(f, "Frame error: {}", e),
            ProtocolError::FrameTooLarge { limit } => {
                write!(f, "Frame exceeds limit of {} bytes", limit)
            }
            ProtocolError::Decoding(e) => write!(f, "Decoding error: {}", e),
            ProtocolError::Encoding(e) => write!(f, "Encoding error: {}", e),
            ProtocolError::InconsistentEnvelope(s) => write!(f, "Inconsistent envelope: {}", s),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Frame(e) => Some(e),
            ProtocolError::Decoding(e) | ProtocolError::Encoding(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(error: io::Error) -> Self {
        ProtocolError::Frame(error)
    }
}

/// Routing misses. Always logged and dropped, never reported to the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    UnknownGroup(String),
    UnknownRecipient(String),
    MailboxFull { name: String, id: SessionId },
    MailboxClosed { name: String, id: SessionId },
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingError::UnknownGroup(g) => write!(f, "Group not found: {}", g),
            RoutingError::UnknownRecipient(u) => write!(f, "Recipient not found: {}", u),
            RoutingError::MailboxFull { name, id } => {
                write!(f, "Mailbox full for {} ({}), message dropped", name, id)
            }
            RoutingError::MailboxClosed { name, id } => {
                write!(f, "Mailbox closed for {} ({}), message dropped", name, id)
            }
        }
    }
}

impl std::error::Error for RoutingError {}

/// Per-connection session errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Login on an already registered session
    RegistrationConflict { current: String, claimed: String },
    /// Another live session already holds the display name
    NameTaken(String),
    EmptyName,
    /// Claimed name is too long or contains control characters
    InvalidName(String),
    /// Chat or membership event before login
    NotRegistered(String),
    /// Kind the server does not accept from clients
    UnsupportedKind(String),
    IdleTimeout(Duration),
    WriteTimeout(Duration),
    /// The hub's event queue is gone
    HubUnavailable,
    /// The connection to the relay is closed
    Disconnected,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::RegistrationConflict { current, claimed } => write!(
                f,
                "Already registered as {}, ignoring login as {}",
                current, claimed
            ),
            SessionError::NameTaken(n) => write!(f, "Display name already in use: {}", n),
            SessionError::EmptyName => write!(f, "Login with empty display name"),
            SessionError::InvalidName(n) => write!(f, "Invalid display name: {:?}", n),
            SessionError::NotRegistered(kind) => {
                write!(f, "Session not registered, dropping {}", kind)
            }
            SessionError::UnsupportedKind(kind) => write!(f, "Unsupported message kind: {}", kind),
            SessionError::IdleTimeout(d) => write!(f, "No frame received within {:?}", d),
            SessionError::WriteTimeout(d) => write!(f, "Frame write exceeded {:?}", d),
            SessionError::HubUnavailable => write!(f, "Hub event queue closed"),
            SessionError::Disconnected => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for SessionError {}

/// General relay error that encompasses all error types
#[derive(Debug)]
pub enum RelayError {
    Protocol(ProtocolError),
    Routing(RoutingError),
    Session(SessionError),
    Io(io::Error),
    Config(config::ConfigError),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Protocol(e) => write!(f, "Protocol error: {}", e),
            RelayError::Routing(e) => write!(f, "Routing miss: {}", e),
            RelayError::Session(e) => write!(f, "Session error: {}", e),
            RelayError::Io(e) => write!(f, "I/O error: {}", e),
            RelayError::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<ProtocolError> for RelayError {
    fn from(error: ProtocolError) -> Self {
        RelayError::Protocol(error)
    }
}

impl From<RoutingError> for RelayError {
    fn from(error: RoutingError) -> Self {
        RelayError::Routing(error)
    }
}

impl From<SessionError> for RelayError {
    fn from(error: SessionError) -> Self {
        RelayError::Session(error)
    }
}

impl From<io::Error> for RelayError {
    fn from(error: io::Error) -> Self {
        RelayError::Io(error)
    }
}

impl From<config::ConfigError> for RelayError {
    fn from(error: config::ConfigError) -> Self {
        RelayError::Config(error)
    }
}
