//! Module `message`
//!
//! Defines the envelope exchanged between clients and the relay, the message
//! kinds it can carry, and the consistency rules tying a kind to the optional
//! fields it populates.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Discriminant of an envelope.
///
/// Serialized as its kebab-case wire name. Names the relay does not know are
/// kept as `Unknown` so a newer client cannot break decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    Login,
    CreateGroup,
    JoinGroup,
    LeaveGroup,
    PresenceUpdate,
    Broadcast,
    GroupMessage,
    PrivateMessage,
    GroupFile,
    PrivateFile,
    Unknown(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Login => "login",
            MessageKind::CreateGroup => "create-group",
            MessageKind::JoinGroup => "join-group",
            MessageKind::LeaveGroup => "leave-group",
            MessageKind::PresenceUpdate => "presence-update",
            MessageKind::Broadcast => "broadcast",
            MessageKind::GroupMessage => "group-message",
            MessageKind::PrivateMessage => "private-message",
            MessageKind::GroupFile => "group-file",
            MessageKind::PrivateFile => "private-file",
            MessageKind::Unknown(raw) => raw,
        }
    }

    /// Kinds a client may send that the hub routes to other sessions.
    pub fn is_chat(&self) -> bool {
        matches!(
            self,
            MessageKind::Broadcast
                | MessageKind::GroupMessage
                | MessageKind::PrivateMessage
                | MessageKind::GroupFile
                | MessageKind::PrivateFile
        )
    }

    pub fn is_membership(&self) -> bool {
        matches!(
            self,
            MessageKind::CreateGroup | MessageKind::JoinGroup | MessageKind::LeaveGroup
        )
    }
}

impl From<String> for MessageKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "login" => MessageKind::Login,
            "create-group" => MessageKind::CreateGroup,
            "join-group" => MessageKind::JoinGroup,
            "leave-group" => MessageKind::LeaveGroup,
            "presence-update" => MessageKind::PresenceUpdate,
            "broadcast" => MessageKind::Broadcast,
            "group-message" => MessageKind::GroupMessage,
            "private-message" => MessageKind::PrivateMessage,
            "group-file" => MessageKind::GroupFile,
            "private-file" => MessageKind::PrivateFile,
            _ => MessageKind::Unknown(raw),
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file carried inline in an envelope. Content is base64 on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    pub name: String,
    pub size: u64,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl FilePayload {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size: data.len() as u64,
            data,
        }
    }
}

/// Snapshot of who is online and who is in which group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresencePayload {
    pub users: Vec<String>,
    pub groups: BTreeMap<String, Vec<String>>,
}

/// The envelope. `sender` and `timestamp` are always present on the wire;
/// the optional fields are omitted when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    #[serde(default)]
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FilePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<PresencePayload>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Bare envelope of the given kind with every optional field unset.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            sender: String::new(),
            recipient: None,
            group: None,
            text: None,
            file: None,
            presence: None,
            timestamp: Utc::now(),
        }
    }

    /// Login request; the claimed display name travels in `sender`.
    pub fn login(name: impl Into<String>) -> Self {
        Self {
            sender: name.into(),
            ..Self::new(MessageKind::Login)
        }
    }

    pub fn create_group(group: impl Into<String>) -> Self {
        Self::new(MessageKind::CreateGroup).with_group(group)
    }

    pub fn join_group(group: impl Into<String>) -> Self {
        Self::new(MessageKind::JoinGroup).with_group(group)
    }

    pub fn leave_group(group: impl Into<String>) -> Self {
        Self::new(MessageKind::LeaveGroup).with_group(group)
    }

    pub fn broadcast(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Broadcast).with_text(text)
    }

    pub fn group_text(group: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(MessageKind::GroupMessage)
            .with_group(group)
            .with_text(text)
    }

    pub fn private_text(recipient: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(MessageKind::PrivateMessage)
            .with_recipient(recipient)
            .with_text(text)
    }

    pub fn group_file(group: impl Into<String>, file: FilePayload) -> Self {
        Self {
            file: Some(file),
            ..Self::new(MessageKind::GroupFile).with_group(group)
        }
    }

    pub fn private_file(recipient: impl Into<String>, file: FilePayload) -> Self {
        Self {
            file: Some(file),
            ..Self::new(MessageKind::PrivateFile).with_recipient(recipient)
        }
    }

    pub fn presence_update(presence: PresencePayload) -> Self {
        Self {
            presence: Some(presence),
            ..Self::new(MessageKind::PresenceUpdate)
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Checks that the populated optional fields match `kind`.
    ///
    /// Login carries only the claimed name in `sender`. Membership kinds carry
    /// only `group`. Presence updates carry only `presence`. Chat kinds carry
    /// exactly one routing target (none for broadcast) plus text or a file;
    /// file kinds may add a text caption.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let has_recipient = has_value(&self.recipient);
        let has_group = has_value(&self.group);
        let has_text = self.text.is_some();
        let has_file = self.file.is_some();
        let has_presence = self.presence.is_some();

        let ok = match &self.kind {
            MessageKind::Login => {
                !(self.recipient.is_some()
                    || self.group.is_some()
                    || has_text
                    || has_file
                    || has_presence)
            }
            MessageKind::CreateGroup | MessageKind::JoinGroup | MessageKind::LeaveGroup => {
                has_group && self.recipient.is_none() && !has_text && !has_file && !has_presence
            }
            MessageKind::PresenceUpdate => {
                has_presence
                    && self.recipient.is_none()
                    && self.group.is_none()
                    && !has_text
                    && !has_file
            }
            MessageKind::Broadcast => {
                has_text
                    && self.recipient.is_none()
                    && self.group.is_none()
                    && !has_file
                    && !has_presence
            }
            MessageKind::GroupMessage => {
                has_group && has_text && self.recipient.is_none() && !has_file && !has_presence
            }
            MessageKind::PrivateMessage => {
                has_recipient && has_text && self.group.is_none() && !has_file && !has_presence
            }
            MessageKind::GroupFile => {
                has_group && has_file && self.recipient.is_none() && !has_presence
            }
            MessageKind::PrivateFile => {
                has_recipient && has_file && self.group.is_none() && !has_presence
            }
            MessageKind::Unknown(raw) => {
                return Err(ProtocolError::InconsistentEnvelope(format!(
                    "unknown kind {}",
                    raw
                )));
            }
        };

        if !ok {
            return Err(ProtocolError::InconsistentEnvelope(format!(
                "fields do not match kind {}",
                self.kind
            )));
        }

        if let Some(file) = &self.file {
            if file.size != file.data.len() as u64 {
                return Err(ProtocolError::InconsistentEnvelope(format!(
                    "file {} declares {} bytes but carries {}",
                    file.name,
                    file.size,
                    file.data.len()
                )));
            }
        }

        Ok(())
    }
}

fn has_value(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|v| !v.is_empty())
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
