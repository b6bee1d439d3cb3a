//! `ConnectionActor` - per-connection actor bridging a room to a client.
//!
//! Each `ConnectionActor` owns the outbound half of one WebSocket: room
//! actors hand it `ServerMessage` values, it serializes them and pushes
//! the text frames to the socket writer task. Keeping serialization and
//! ordering here means room actors never block on a slow client.

use super::messages::ConnectionMessage;
use crate::protocol::ServerMessage;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the connection mailbox.
const CONNECTION_CHANNEL_BUFFER: usize = 100;

/// Handle to a `ConnectionActor`.
#[derive(Debug, Clone)]
pub struct ConnectionActorHandle {
    sender: mpsc::Sender<ConnectionMessage>,
    cancel_token: CancellationToken,
    connection_id: String,
}

impl ConnectionActorHandle {
    /// Get the connection ID.
    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Deliver a server event to this client.
    ///
    /// Best-effort: a closed or backlogged connection drops the event.
    /// Clients re-render from the next full roster broadcast.
    pub async fn deliver(&self, message: ServerMessage) {
        if self
            .sender
            .send(ConnectionMessage::Deliver(message))
            .await
            .is_err()
        {
            debug!(
                target: "sc.actor.connection",
                connection_id = %self.connection_id,
                "Event dropped, connection actor gone"
            );
        }
    }

    /// Close the client connection.
    pub async fn close(&self, reason: String) {
        let _ = self.sender.send(ConnectionMessage::Close { reason }).await;
    }

    /// Cancel the connection actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Token cancelled once the actor stops, for any reason. The socket
    /// owner watches it to drop the underlying connection.
    #[must_use]
    pub fn close_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `ConnectionActor` implementation.
pub struct ConnectionActor {
    /// Connection ID.
    connection_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<ConnectionMessage>,
    /// Cancellation token (child of the room's token).
    cancel_token: CancellationToken,
    /// Serialized frames destined for the socket writer task.
    outbound: mpsc::Sender<String>,
}

impl ConnectionActor {
    /// Spawn a new connection actor.
    ///
    /// `outbound` is the channel the socket writer task drains; dropping
    /// its receiver ends this actor on the next delivery attempt.
    pub fn spawn(
        connection_id: String,
        cancel_token: CancellationToken,
        outbound: mpsc::Sender<String>,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(CONNECTION_CHANNEL_BUFFER);

        let actor = Self {
            connection_id: connection_id.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            outbound,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ConnectionActorHandle {
            sender,
            cancel_token,
            connection_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "sc.actor.connection", fields(connection_id = %self.connection_id))]
    async fn run(mut self) {
        debug!(
            target: "sc.actor.connection",
            connection_id = %self.connection_id,
            "ConnectionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "sc.actor.connection",
                        connection_id = %self.connection_id,
                        "ConnectionActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(ConnectionMessage::Deliver(message)) => {
                            if !self.forward(&message).await {
                                break;
                            }
                        }
                        Some(ConnectionMessage::Close { reason }) => {
                            info!(
                                target: "sc.actor.connection",
                                connection_id = %self.connection_id,
                                reason = %reason,
                                "Closing connection"
                            );
                            // Queued notices were already forwarded;
                            // exit and signal the close below.
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        // The token is a child of the room's, so cancelling here stays
        // local. The gateway watches it and drops the socket.
        self.cancel_token.cancel();

        debug!(
            target: "sc.actor.connection",
            connection_id = %self.connection_id,
            "ConnectionActor stopped"
        );
    }

    /// Serialize and push one event. Returns `false` when the socket
    /// writer is gone.
    async fn forward(&self, message: &ServerMessage) -> bool {
        let frame = match serde_json::to_string(message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    target: "sc.actor.connection",
                    connection_id = %self.connection_id,
                    error = %e,
                    "Failed to serialize server event"
                );
                return true;
            }
        };

        self.outbound.send(frame).await.is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delivers_serialized_frames_in_order() {
        let (outbound_tx, mut outbound_rx) = mpsc::channel(10);
        let (handle, _task) = ConnectionActor::spawn(
            "conn-1".to_string(),
            CancellationToken::new(),
            outbound_tx,
        );

        handle.deliver(ServerMessage::ForceMute).await;
        handle
            .deliver(ServerMessage::ScreenShareGlobalUpdate { enabled: true })
            .await;

        let first = outbound_rx.recv().await.unwrap();
        assert!(first.contains("\"event\":\"forceMute\""));
        let second = outbound_rx.recv().await.unwrap();
        assert!(second.contains("\"event\":\"screenShareGlobalUpdate\""));
    }

    #[tokio::test]
    async fn test_close_drops_outbound_channel() {
        let (outbound_tx, mut outbound_rx) = mpsc::channel(10);
        let (handle, task) = ConnectionActor::spawn(
            "conn-1".to_string(),
            CancellationToken::new(),
            outbound_tx,
        );

        handle.close("kicked".to_string()).await;
        task.await.unwrap();

        assert!(outbound_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_signals_socket_owner() {
        let room_token = CancellationToken::new();
        let (outbound_tx, _outbound_rx) = mpsc::channel(10);
        let (handle, task) = ConnectionActor::spawn(
            "conn-1".to_string(),
            room_token.child_token(),
            outbound_tx,
        );

        let close_token = handle.close_token();
        assert!(!close_token.is_cancelled());

        handle.close("kicked".to_string()).await;
        task.await.unwrap();

        close_token.cancelled().await;
        // The close stays local to this connection.
        assert!(!room_token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancellation_stops_actor() {
        let (outbound_tx, _outbound_rx) = mpsc::channel(10);
        let token = CancellationToken::new();
        let (handle, task) =
            ConnectionActor::spawn("conn-1".to_string(), token, outbound_tx);

        handle.cancel();
        task.await.unwrap();
        assert!(handle.is_cancelled());
    }
}
