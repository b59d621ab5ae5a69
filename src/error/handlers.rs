//! Error handlers
//!
//! Maps relay errors to log levels and connection outcomes.

use log::{error, info, warn};

use crate::error::types::{ProtocolError, RelayError, SessionError};

/// Log a relay error at the level its category calls for.
pub fn handle_error(err: &RelayError) {
    match err {
        RelayError::Protocol(e) if e.is_disconnect() => info!("{}", err),
        RelayError::Protocol(ProtocolError::Encoding(_)) => error!("{}", err),
        RelayError::Protocol(_) | RelayError::Routing(_) | RelayError::Session(_) => {
            warn!("{}", err)
        }
        RelayError::Io(_) | RelayError::Config(_) => error!("{}", err),
    }
}

/// Whether the error ends the connection it occurred on.
///
/// Routing misses and policy rejections leave the connection open; malformed
/// wire data and transport failures never attempt resynchronization.
pub fn is_terminal(err: &RelayError) -> bool {
    match err {
        RelayError::Protocol(ProtocolError::Encoding(_))
        | RelayError::Protocol(ProtocolError::InconsistentEnvelope(_)) => false,
        RelayError::Protocol(_) => true,
        RelayError::Routing(_) => false,
        RelayError::Session(e) => matches!(
            e,
            SessionError::IdleTimeout(_)
                | SessionError::WriteTimeout(_)
                | SessionError::HubUnavailable
                | SessionError::Disconnected
        ),
        RelayError::Io(_) | RelayError::Config(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RoutingError;
    use std::io;
    use std::time::Duration;

    #[test]
    fn test_codec_failures_are_terminal() {
        let truncated = RelayError::from(ProtocolError::Frame(io::Error::from(
            io::ErrorKind::UnexpectedEof,
        )));
        assert!(is_terminal(&truncated));

        let too_large = RelayError::from(ProtocolError::FrameTooLarge { limit: 5 });
        assert!(is_terminal(&too_large));
    }

    #[test]
    fn test_policy_rejections_keep_connection() {
        let miss = RelayError::from(RoutingError::UnknownRecipient("ghost".into()));
        assert!(!is_terminal(&miss));

        let conflict = RelayError::from(SessionError::RegistrationConflict {
            current: "a".into(),
            claimed: "b".into(),
        });
        assert!(!is_terminal(&conflict));
        assert!(!is_terminal(&RelayError::from(SessionError::EmptyName)));

        let mismatched = RelayError::from(ProtocolError::InconsistentEnvelope("x".into()));
        assert!(!is_terminal(&mismatched));
    }

    #[test]
    fn test_timeouts_are_terminal() {
        let idle = RelayError::from(SessionError::IdleTimeout(Duration::from_secs(1)));
        assert!(is_terminal(&idle));
        assert!(is_terminal(&RelayError::from(SessionError::HubUnavailable)));
    }
}
