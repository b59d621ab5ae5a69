//! Hub events
//!
//! Everything the hub does is triggered by one of these, submitted through a
//! single ordered queue.

use tokio::sync::oneshot;

use crate::error::SessionError;
use crate::protocol::Message;
use crate::session::{Session, SessionId};

/// A registration the hub did not accept.
///
/// When the hub answered, the session comes back so the connection keeps its
/// mailbox and may retry under another name.
#[derive(Debug)]
pub struct Refused {
    pub session: Option<Session>,
    pub reason: SessionError,
}

pub type RegisterReply = Result<(), Refused>;

pub enum HubEvent {
    Register {
        session: Session,
        reply: oneshot::Sender<RegisterReply>,
    },
    Deregister(SessionId),
    Join { session: SessionId, group: String },
    Leave { session: SessionId, group: String },
    Route(Message),
}

impl HubEvent {
    pub fn label(&self) -> &'static str {
        match self {
            HubEvent::Register { .. } => "register",
            HubEvent::Deregister(_) => "deregister",
            HubEvent::Join { .. } => "join",
            HubEvent::Leave { .. } => "leave",
            HubEvent::Route(_) => "route",
        }
    }
}
