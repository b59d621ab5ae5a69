//! Session handle
//!
//! The hub-side view of a connection: a stable identifier, the display name
//! claimed at login, and the sending side of the bounded outbound mailbox.

use std::fmt;

use log::debug;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::error::RoutingError;
use crate::protocol::Message;

/// Opaque per-connection identifier, assigned at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered session as held by the hub's registry and groups.
///
/// Holds the only sender of the session's mailbox once registered, so the
/// mailbox closes when the hub drops its last reference.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    name: String,
    mailbox: mpsc::Sender<Message>,
}

impl Session {
    pub fn new(id: SessionId, name: impl Into<String>, mailbox: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            name: name.into(),
            mailbox,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Non-blocking delivery into the mailbox. A full mailbox drops the message.
    pub fn deliver(&self, message: Message) -> Result<(), RoutingError> {
        match self.mailbox.try_send(message) {
            Ok(()) => {
                debug!("Queued message for {} ({})", self.name, self.id);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(RoutingError::MailboxFull {
                name: self.name.clone(),
                id: self.id,
            }),
            Err(TrySendError::Closed(_)) => Err(RoutingError::MailboxClosed {
                name: self.name.clone(),
                id: self.id,
            }),
        }
    }

    /// Gives the mailbox back, e.g. when the hub refuses registration.
    pub fn into_mailbox(self) -> mpsc::Sender<Message> {
        self.mailbox
    }
}
