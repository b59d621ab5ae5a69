//! Hub result types
//!
//! Defines result structures returned by hub routing operations.

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Mailboxes the message was queued into
    pub delivered: usize,
    /// Recipients whose mailbox was full or closed
    pub dropped: usize,
}
