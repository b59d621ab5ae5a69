//! Module `state`
//!
//! Defines `SessionState`, the inbound loop's private view of its connection:
//! identifier, peer address, registration status, and the mailbox sender it
//! holds until the hub takes it over at login.

use std::net::SocketAddr;

use tokio::sync::mpsc;

use crate::protocol::Message;
use crate::session::SessionId;

/// Represents the state of one connected client.
///
/// Exactly one of `username` and `mailbox` is set outside of a registration
/// in flight: before login the session owns its mailbox sender, after login
/// the hub does.
pub struct SessionState {
    id: SessionId,
    peer_addr: Option<SocketAddr>,
    username: Option<String>,
    mailbox: Option<mpsc::Sender<Message>>,
}

impl SessionState {
    pub fn new(
        id: SessionId,
        peer_addr: Option<SocketAddr>,
        mailbox: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            id,
            peer_addr,
            username: None,
            mailbox: Some(mailbox),
        }
    }

    // --------------------
    // Getter methods
    // --------------------

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns whether the hub accepted this session's login.
    pub fn is_logged_in(&self) -> bool {
        self.username.is_some()
    }

    /// Returns the registered display name, if any.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Human-readable tag for log lines.
    pub fn label(&self) -> String {
        match (&self.username, &self.peer_addr) {
            (Some(name), Some(addr)) => format!("{}@{}", name, addr),
            (Some(name), None) => name.clone(),
            (None, Some(addr)) => format!("{} ({})", addr, self.id),
            (None, None) => self.id.to_string(),
        }
    }

    // --------------------
    // Registration transitions
    // --------------------

    /// Hands the mailbox sender over for a registration attempt.
    pub fn take_mailbox(&mut self) -> Option<mpsc::Sender<Message>> {
        self.mailbox.take()
    }

    /// Takes the mailbox back after a refused registration.
    pub fn restore_mailbox(&mut self, mailbox: mpsc::Sender<Message>) {
        self.mailbox = Some(mailbox);
    }

    /// Records the accepted display name. The name never changes afterwards.
    pub fn set_username(&mut self, name: String) {
        if self.username.is_none() {
            self.username = Some(name);
        }
    }
}
