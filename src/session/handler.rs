use futures::SinkExt;
use log::{debug, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::ServerConfig;
use crate::error::{ProtocolError, RelayError, SessionError, handle_error, is_terminal};
use crate::hub::{HubHandle, Refused};
use crate::protocol::{
    FrameReader, Message, frame_reader, frame_writer, read_message, write_message,
};
use crate::session::operations::{InboundAction, classify};
use crate::session::{Session, SessionId, SessionState};

/// Why a connection's inbound loop stopped.
enum Closed {
    Inbound(RelayError),
    Outbound,
}

/// Runs one client connection until it fails or the peer goes away.
///
/// - Spawns the outbound loop, which drains the session's mailbox into the
///   transport.
/// - Runs the inbound loop on the current task, classifying each frame and
///   submitting it to the hub.
/// - On exit, deregisters from the hub exactly once, which closes the mailbox
///   and lets the outbound loop finish.
pub async fn handle_client<S>(
    stream: S,
    peer_addr: Option<SocketAddr>,
    hub: HubHandle,
    config: Arc<ServerConfig>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let (mailbox_tx, mailbox_rx) = mpsc::channel(config.mailbox_capacity.max(1));
    let mut state = SessionState::new(SessionId::new(), peer_addr, mailbox_tx);
    info!("Connection opened: {}", state.label());

    let mut writer = tokio::spawn(outbound_loop(
        write_half,
        mailbox_rx,
        Arc::clone(&config),
        state.label(),
    ));

    let mut reader = frame_reader(read_half, config.max_frame_bytes);
    let closed = inbound_loop(&mut reader, &mut state, &hub, &config, &mut writer).await;

    match &closed {
        Closed::Inbound(e) => handle_error(e),
        Closed::Outbound => info!("Outbound side of {} closed", state.label()),
    }

    if state.is_logged_in() {
        if let Err(e) = hub.deregister(state.id()).await {
            handle_error(&e.into());
        }
    }

    let label = state.label();
    // Drops the mailbox sender if the session never registered.
    drop(state);

    if let Closed::Inbound(_) = closed {
        if let Err(e) = writer.await {
            debug!("Outbound task for {} ended abnormally: {}", label, e);
        }
    }
    info!("Connection closed: {}", label);
}

async fn inbound_loop<S>(
    reader: &mut FrameReader<ReadHalf<S>>,
    state: &mut SessionState,
    hub: &HubHandle,
    config: &ServerConfig,
    writer: &mut JoinHandle<()>,
) -> Closed
where
    S: AsyncRead + AsyncWrite,
{
    let idle = config.idle_timeout();

    loop {
        let next = tokio::select! {
            read = timeout(idle, read_message(reader)) => read,
            _ = &mut *writer => return Closed::Outbound,
        };

        let message = match next {
            Ok(Ok(message)) => message,
            Ok(Err(e)) => return Closed::Inbound(e.into()),
            Err(_) => return Closed::Inbound(SessionError::IdleTimeout(idle).into()),
        };

        debug!("Received {} from {}", message.kind, state.label());
        if let Err(e) = process(state, message, hub).await {
            if is_terminal(&e) {
                return Closed::Inbound(e);
            }
            handle_error(&e);
        }
    }
}

/// Applies one inbound envelope. Non-terminal errors mean the envelope was
/// dropped and the connection stays open.
async fn process(
    state: &mut SessionState,
    message: Message,
    hub: &HubHandle,
) -> Result<(), RelayError> {
    match classify(state, message)? {
        InboundAction::Register(name) => register(state, name, hub).await,
        InboundAction::Join(group) => Ok(hub.join(state.id(), group).await?),
        InboundAction::Leave(group) => Ok(hub.leave(state.id(), group).await?),
        InboundAction::Route(message) => Ok(hub.route(message).await?),
    }
}

/// Hands the mailbox to the hub under `name`. On refusal the mailbox comes
/// back and the session stays unregistered.
async fn register(state: &mut SessionState, name: String, hub: &HubHandle) -> Result<(), RelayError> {
    let Some(mailbox) = state.take_mailbox() else {
        return Err(SessionError::HubUnavailable.into());
    };

    match hub.register(Session::new(state.id(), name.clone(), mailbox)).await {
        Ok(()) => {
            state.set_username(name);
            info!("Logged in: {}", state.label());
            Ok(())
        }
        Err(Refused { session, reason }) => {
            if let Some(session) = session {
                state.restore_mailbox(session.into_mailbox());
            }
            Err(reason.into())
        }
    }
}

/// Writes mailbox envelopes to the transport until the mailbox closes or a
/// write fails.
async fn outbound_loop<S>(
    write_half: WriteHalf<S>,
    mut mailbox: mpsc::Receiver<Message>,
    config: Arc<ServerConfig>,
    label: String,
) where
    S: AsyncRead + AsyncWrite,
{
    let write_timeout = config.write_timeout();
    let mut writer = frame_writer(write_half, config.max_frame_bytes);

    while let Some(message) = mailbox.recv().await {
        let err: RelayError = match timeout(write_timeout, write_message(&mut writer, &message)).await {
            Ok(Ok(())) => continue,
            // Refused before any byte was written; the stream is still in sync.
            Ok(Err(e @ ProtocolError::FrameTooLarge { .. })) => {
                handle_error(&e.into());
                continue;
            }
            Ok(Err(e)) => e.into(),
            Err(_) => SessionError::WriteTimeout(write_timeout).into(),
        };

        handle_error(&err);
        if is_terminal(&err) {
            info!("Stopping writes to {}", label);
            return;
        }
    }

    if let Err(e) = SinkExt::<bytes::Bytes>::close(&mut writer).await {
        debug!("Shutdown of {} failed: {}", label, e);
    }
    debug!("Mailbox for {} closed", label);
}
