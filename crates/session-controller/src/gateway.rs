//! Signaling gateway: the WebSocket protocol handler.
//!
//! One task per connection reads frames, decodes them into
//! [`ClientRequest`] values and dispatches them sequentially, so
//! messages from the same connection are always processed in arrival
//! order. Cross-connection effects go through the room actor's mailbox.
//!
//! Per-connection state machine: `disconnected → joining → active →
//! disconnected`. Every request except `join` requires the connection
//! to have joined a room first.

use crate::actors::{ConnectionActor, ConnectionActorHandle, RoomActorHandle, RoomRegistryActorHandle};
use crate::errors::ScError;
use crate::protocol::{ClientFrame, ClientRequest, ServerMessage};

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Buffer for frames queued toward one socket writer.
const OUTBOUND_CHANNEL_BUFFER: usize = 100;

/// Shared state for the signaling router.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: RoomRegistryActorHandle,
}

/// Create the signaling router exposing the WebSocket endpoint.
pub fn signaling_router(state: GatewayState) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection session state.
struct Session {
    connection_id: String,
    registry: RoomRegistryActorHandle,
    /// Set once the join handshake completes.
    room: Option<RoomActorHandle>,
    /// The connection actor bridging room events to this socket.
    events: Option<ConnectionActorHandle>,
    /// Cancelled when the connection actor stops (e.g. a kick); the
    /// read loop watches it to drop the socket.
    close_token: Option<CancellationToken>,
    /// Serialized frames toward the socket writer task.
    outbound: mpsc::Sender<String>,
}

#[instrument(skip_all, name = "sc.gateway", fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let connection_id = format!("conn-{}", Uuid::new_v4());
    tracing::Span::current().record("connection_id", connection_id.as_str());
    info!(
        target: "sc.gateway",
        connection_id = %connection_id,
        "Connection established"
    );

    let (mut socket_tx, mut socket_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_CHANNEL_BUFFER);

    // Writer task: drains the outbound channel onto the socket. Closing
    // the channel closes the socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if socket_tx.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = socket_tx.close().await;
    });

    let mut session = Session {
        connection_id: connection_id.clone(),
        registry: state.registry,
        room: None,
        events: None,
        close_token: None,
        outbound: outbound_tx,
    };

    loop {
        let close_signal = session.close_token.clone();
        tokio::select! {
            () = async {
                match close_signal {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending().await,
                }
            } => {
                // Server-side close (kick, room shutdown): stop reading
                // and drop the socket once queued frames are flushed.
                info!(
                    target: "sc.gateway",
                    connection_id = %connection_id,
                    "Connection closed by server"
                );
                break;
            }

            message = socket_rx.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        session.handle_frame(&text).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Ping/pong is handled by the protocol layer; binary
                    // frames are not part of the signaling protocol.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    info!(
        target: "sc.gateway",
        connection_id = %connection_id,
        "Connection closed"
    );
    if let Some(room) = session.room.take() {
        room.disconnect(connection_id).await;
    }
    drop(session);
    let _ = writer.await;
}

impl Session {
    /// Decode and dispatch one inbound frame.
    async fn handle_frame(&mut self, text: &str) {
        let frame: ClientFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(
                    target: "sc.gateway",
                    connection_id = %self.connection_id,
                    error = %e,
                    "Malformed frame"
                );
                self.send_error(None, &ScError::BadRequest("Malformed request".to_string()))
                    .await;
                return;
            }
        };

        let request_id = frame.request_id;
        match self.dispatch(frame.request).await {
            Ok(data) => {
                self.send(ServerMessage::Response { request_id, data }).await;
            }
            Err(e) => {
                self.send_error(request_id, &e).await;
            }
        }
    }

    /// Route one request. Fault isolation is inherent: any error is
    /// answered on this connection only.
    async fn dispatch(&mut self, request: ClientRequest) -> Result<serde_json::Value, ScError> {
        // Privileged control actions share one pipeline.
        if let Some((action, target_id)) = request.control_action() {
            let target_id = target_id.map(str::to_string);
            let room = self.room()?;
            room.control(self.connection_id.clone(), action, target_id)
                .await?;
            return Ok(json!({}));
        }

        match request {
            ClientRequest::Join {
                room_id,
                user_id,
                name,
                image_url,
            } => self.handle_join(room_id, user_id, name, image_url).await,

            ClientRequest::Leave => {
                // The socket survives a leave; a later join spawns a
                // fresh connection actor.
                self.close_token = None;
                self.events = None;
                if let Some(room) = self.room.take() {
                    room.disconnect(self.connection_id.clone()).await;
                }
                Ok(json!({}))
            }

            ClientRequest::GetRouterCapabilities => {
                let room = self.room()?;
                let capabilities = room
                    .get_capabilities(self.connection_id.clone())
                    .await?;
                Ok(json!({ "routerRtpCapabilities": capabilities }))
            }

            ClientRequest::CreateTransport { direction } => {
                let room = self.room()?;
                let params = room
                    .create_transport(self.connection_id.clone(), direction)
                    .await?;
                Ok(json!({
                    "id": params.transport_id,
                    "iceParameters": params.ice_parameters,
                    "iceCandidates": params.ice_candidates,
                    "dtlsParameters": params.dtls_parameters,
                }))
            }

            ClientRequest::ConnectTransport {
                transport_id,
                dtls_parameters,
            } => {
                let room = self.room()?;
                room.connect_transport(self.connection_id.clone(), transport_id, dtls_parameters)
                    .await?;
                Ok(json!({}))
            }

            ClientRequest::Produce {
                transport_id,
                kind,
                rtp_parameters,
                screen_share,
            } => {
                let room = self.room()?;
                let producer_id = room
                    .produce(
                        self.connection_id.clone(),
                        transport_id,
                        kind,
                        rtp_parameters,
                        screen_share,
                    )
                    .await?;
                Ok(json!({ "producerId": producer_id }))
            }

            ClientRequest::Consume {
                transport_id,
                producer_id,
                rtp_capabilities,
            } => {
                let room = self.room()?;
                let outcome = room
                    .consume(
                        self.connection_id.clone(),
                        transport_id,
                        producer_id,
                        rtp_capabilities,
                    )
                    .await?;
                Ok(json!({
                    "consumerId": outcome.params.consumer_id,
                    "producerId": outcome.params.producer_id,
                    "kind": outcome.params.kind,
                    "rtpParameters": outcome.params.rtp_parameters,
                    "peerId": outcome.peer_id,
                    "userId": outcome.user_id,
                    "screenShare": outcome.screen_share,
                }))
            }

            ClientRequest::ResumeConsumer { consumer_id } => {
                let room = self.room()?;
                room.resume_consumer(self.connection_id.clone(), consumer_id)
                    .await?;
                Ok(json!({}))
            }

            ClientRequest::CloseProducer { producer_id } => {
                let room = self.room()?;
                room.close_producer(self.connection_id.clone(), producer_id)
                    .await?;
                Ok(json!({}))
            }

            // Control actions were handled above.
            _ => Err(ScError::BadRequest("Unsupported request".to_string())),
        }
    }

    async fn handle_join(
        &mut self,
        room_id: String,
        user_id: String,
        name: String,
        image_url: Option<String>,
    ) -> Result<serde_json::Value, ScError> {
        // A connection belongs to at most one room.
        if let Some(room) = &self.room {
            if room.room_id() != room_id {
                return Err(ScError::Conflict(
                    "Connection already joined another room".to_string(),
                ));
            }
        }

        let room = match &self.room {
            Some(room) => room.clone(),
            None => self.registry.get_or_create_room(room_id).await?,
        };

        // A rejoin reuses the live connection actor; the room keeps the
        // handle it already has for this peer.
        let events = match &self.events {
            Some(events) => events.clone(),
            None => {
                let (events, _task) = ConnectionActor::spawn(
                    self.connection_id.clone(),
                    room.child_token(),
                    self.outbound.clone(),
                );
                events
            }
        };

        let outcome = room
            .join(
                self.connection_id.clone(),
                user_id,
                name,
                image_url,
                events.clone(),
            )
            .await?;
        self.room = Some(room);
        self.close_token = Some(events.close_token());
        self.events = Some(events);

        Ok(json!({
            "peerId": outcome.peer_id,
            "role": outcome.role,
            "rejoin": outcome.rejoin,
            "participants": outcome.participants,
            "producers": outcome.producers,
        }))
    }

    fn room(&self) -> Result<RoomActorHandle, ScError> {
        self.room
            .clone()
            .ok_or_else(|| ScError::BadRequest("Join a room first".to_string()))
    }

    async fn send(&self, message: ServerMessage) {
        match serde_json::to_string(&message) {
            Ok(frame) => {
                if self.outbound.send(frame).await.is_err() {
                    debug!(
                        target: "sc.gateway",
                        connection_id = %self.connection_id,
                        "Reply dropped, socket writer gone"
                    );
                }
            }
            Err(e) => {
                warn!(
                    target: "sc.gateway",
                    connection_id = %self.connection_id,
                    error = %e,
                    "Failed to serialize reply"
                );
            }
        }
    }

    async fn send_error(&self, request_id: Option<u64>, error: &ScError) {
        self.send(ServerMessage::Error {
            request_id,
            code: error.error_code(),
            reason: error.reason_code().map(str::to_string),
            message: error.client_message(),
        })
        .await;
    }
}
