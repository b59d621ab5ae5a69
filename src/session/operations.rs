//! Inbound operations
//!
//! Classifies decoded envelopes into the hub request they stand for, applying
//! the session's policy: one login per session, membership and chat only
//! after login, the sender stamped from the session's identity.

use chrono::Utc;

use crate::error::{RelayError, SessionError};
use crate::protocol::{Message, MessageKind};
use crate::session::SessionState;

/// Longest display name accepted at login, in bytes.
pub const MAX_NAME_LEN: usize = 64;

/// What an inbound envelope asks the hub to do.
#[derive(Debug, PartialEq)]
pub enum InboundAction {
    Register(String),
    Join(String),
    Leave(String),
    Route(Message),
}

/// Maps one inbound envelope to a hub request, or to the reason it is dropped.
pub fn classify(state: &SessionState, mut message: Message) -> Result<InboundAction, RelayError> {
    let kind = message.kind.clone();
    match &kind {
        MessageKind::Login => {
            let claimed = message.sender.trim().to_string();
            if let Some(current) = state.username() {
                return Err(SessionError::RegistrationConflict {
                    current: current.to_string(),
                    claimed,
                }
                .into());
            }
            message.validate()?;
            validate_name(&claimed)?;
            Ok(InboundAction::Register(claimed))
        }
        membership if membership.is_membership() => {
            if !state.is_logged_in() {
                return Err(SessionError::NotRegistered(membership.to_string()).into());
            }
            message.validate()?;
            let group = message.group.take().unwrap_or_default();
            if kind == MessageKind::LeaveGroup {
                Ok(InboundAction::Leave(group))
            } else {
                Ok(InboundAction::Join(group))
            }
        }
        chat if chat.is_chat() => {
            let Some(name) = state.username() else {
                return Err(SessionError::NotRegistered(chat.to_string()).into());
            };
            message.sender = name.to_string();
            message.timestamp = Utc::now();
            message.validate()?;
            Ok(InboundAction::Route(message))
        }
        other => Err(SessionError::UnsupportedKind(other.to_string()).into()),
    }
}

fn validate_name(name: &str) -> Result<(), SessionError> {
    if name.is_empty() {
        return Err(SessionError::EmptyName);
    }
    if name.len() > MAX_NAME_LEN || name.chars().any(char::is_control) {
        return Err(SessionError::InvalidName(name.to_string()));
    }
    Ok(())
}
