//! Module `connection`
//!
//! Client side of the relay protocol for presentation layers: a receive task
//! decoding frames into an incoming queue, and a send task draining an
//! outgoing queue into the stream.

use futures::SinkExt;
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{RelayError, SessionError, handle_error, is_terminal};
use crate::protocol::{
    DEFAULT_MAX_FRAME_LEN, FilePayload, Message, frame_reader, frame_writer, read_message,
    write_message,
};

/// Capacity of the incoming and outgoing queues.
pub const CLIENT_QUEUE_CAPACITY: usize = 256;

pub struct ChatClient {
    outgoing: mpsc::Sender<Message>,
    incoming: mpsc::Receiver<Message>,
    receiver: JoinHandle<()>,
    sender: JoinHandle<()>,
}

impl ChatClient {
    /// Connects to a relay over TCP and starts both loops.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, RelayError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        if let Ok(peer) = stream.peer_addr() {
            info!("Connected to relay at {}", peer);
        }
        Ok(Self::from_stream(stream))
    }

    /// Starts both loops over an already-established stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (outgoing_tx, outgoing_rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        let (incoming_tx, incoming_rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);

        Self {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
            receiver: tokio::spawn(receive_loop(read_half, incoming_tx)),
            sender: tokio::spawn(send_loop(write_half, outgoing_rx)),
        }
    }

    /// Queues an envelope for sending. Waits while the outgoing queue is full.
    pub async fn send(&self, message: Message) -> Result<(), SessionError> {
        self.outgoing
            .send(message)
            .await
            .map_err(|_| SessionError::Disconnected)
    }

    /// Next envelope from the relay, or `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        self.incoming.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        self.incoming.try_recv().ok()
    }

    pub async fn login(&self, name: impl Into<String>) -> Result<(), SessionError> {
        self.send(Message::login(name)).await
    }

    pub async fn create_group(&self, group: impl Into<String>) -> Result<(), SessionError> {
        self.send(Message::create_group(group)).await
    }

    pub async fn join_group(&self, group: impl Into<String>) -> Result<(), SessionError> {
        self.send(Message::join_group(group)).await
    }

    pub async fn leave_group(&self, group: impl Into<String>) -> Result<(), SessionError> {
        self.send(Message::leave_group(group)).await
    }

    pub async fn broadcast(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(Message::broadcast(text)).await
    }

    pub async fn group_message(
        &self,
        group: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.send(Message::group_text(group, text)).await
    }

    pub async fn private_message(
        &self,
        recipient: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.send(Message::private_text(recipient, text)).await
    }

    pub async fn group_file(
        &self,
        group: impl Into<String>,
        name: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<(), SessionError> {
        self.send(Message::group_file(group, FilePayload::new(name, data)))
            .await
    }

    pub async fn private_file(
        &self,
        recipient: impl Into<String>,
        name: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<(), SessionError> {
        self.send(Message::private_file(recipient, FilePayload::new(name, data)))
            .await
    }

    /// Flushes queued envelopes, closes the write side, and stops receiving.
    pub async fn close(self) {
        let ChatClient {
            outgoing,
            incoming,
            receiver,
            sender,
        } = self;
        drop(outgoing);
        if let Err(e) = sender.await {
            debug!("Send task ended abnormally: {}", e);
        }
        drop(incoming);
        receiver.abort();
    }
}

async fn receive_loop<S>(read_half: ReadHalf<S>, incoming: mpsc::Sender<Message>)
where
    S: AsyncRead + AsyncWrite,
{
    let mut reader = frame_reader(read_half, DEFAULT_MAX_FRAME_LEN);
    loop {
        match read_message(&mut reader).await {
            Ok(message) => {
                if incoming.send(message).await.is_err() {
                    debug!("Incoming queue dropped, stopping receive loop");
                    return;
                }
            }
            Err(e) => {
                let err = RelayError::from(e);
                if is_terminal(&err) {
                    info!("Connection to relay closed: {}", err);
                    return;
                }
                handle_error(&err);
            }
        }
    }
}

async fn send_loop<S>(write_half: WriteHalf<S>, mut outgoing: mpsc::Receiver<Message>)
where
    S: AsyncRead + AsyncWrite,
{
    let mut writer = frame_writer(write_half, DEFAULT_MAX_FRAME_LEN);
    while let Some(message) = outgoing.recv().await {
        if let Err(e) = write_message(&mut writer, &message).await {
            let err = RelayError::from(e);
            handle_error(&err);
            if is_terminal(&err) {
                warn!("Stopping send loop");
                return;
            }
        }
    }
    if let Err(e) = SinkExt::<bytes::Bytes>::close(&mut writer).await {
        debug!("Shutdown of relay connection failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageKind;
    use std::time::Duration;
    use tokio::time::timeout;

    const LIMIT: usize = DEFAULT_MAX_FRAME_LEN;

    #[tokio::test]
    async fn test_send_writes_frames_and_recv_reads_them() {
        let (local, remote) = tokio::io::duplex(4096);
        let (remote_read, remote_write) = tokio::io::split(remote);
        let mut relay_in = frame_reader(remote_read, LIMIT);
        let mut relay_out = frame_writer(remote_write, LIMIT);
        let mut client = ChatClient::from_stream(local);

        client.login("alice").await.unwrap();
        client.group_message("g1", "hi").await.unwrap();

        let login = read_message(&mut relay_in).await.unwrap();
        assert_eq!(login.kind, MessageKind::Login);
        assert_eq!(login.sender, "alice");
        let chat = read_message(&mut relay_in).await.unwrap();
        assert_eq!(chat.group.as_deref(), Some("g1"));

        write_message(&mut relay_out, &Message::broadcast("from relay"))
            .await
            .unwrap();
        let received = timeout(Duration::from_secs(5), client.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.text.as_deref(), Some("from relay"));
    }

    #[tokio::test]
    async fn test_recv_ends_when_relay_disconnects() {
        let (local, remote) = tokio::io::duplex(1024);
        let mut client = ChatClient::from_stream(local);
        drop(remote);
        let end = timeout(Duration::from_secs(5), client.recv()).await.unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_close_flushes_pending_sends() {
        let (local, remote) = tokio::io::duplex(4096);
        let mut relay_in = frame_reader(remote, LIMIT);
        let client = ChatClient::from_stream(local);
        client.broadcast("last words").await.unwrap();
        client.close().await;

        let message = read_message(&mut relay_in).await.unwrap();
        assert_eq!(message.text.as_deref(), Some("last words"));
        assert!(read_message(&mut relay_in).await.unwrap_err().is_disconnect());
    }
}
