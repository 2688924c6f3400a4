//! The room actor.
//!
//! One task owns the member map; every mutation arrives through one of
//! five mailboxes (register, unregister, inbound, broadcast, role
//! update). Handlers never await on member queues: delivery uses
//! non-blocking enqueue, and a member whose queue is full or closed is
//! evicted on the spot so one slow consumer cannot stall fan-out.
//!
//! Room-originated notices are posted back through the broadcast
//! mailbox rather than fanned out inline, so every delivery goes
//! through the same path.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::errors::ChatError;
use crate::participant::Participant;
use crate::protocol::{self, Envelope};

use super::client::Client;
use super::handle::RoomHandle;

/// Mailbox depth for the control channels.
pub(crate) const ROOM_CHANNEL_BUFFER: usize = 64;

/// The inbound mailbox holds at most one frame in flight per room, so
/// readers see backpressure instead of the room buffering unboundedly.
pub(crate) const INBOUND_CHANNEL_BUFFER: usize = 1;

/// Who an unregister request targets.
pub(crate) enum UnregisterTarget {
    /// A specific connection, identified by its connection id.
    Connection(Uuid),
    /// Whichever connection carries this user id.
    Identity(String),
}

pub(crate) struct UnregisterRequest {
    pub target: UnregisterTarget,
    pub respond_to: Option<oneshot::Sender<Result<(), ChatError>>>,
}

pub(crate) struct InboundFrame {
    pub client_id: Uuid,
    pub raw: Bytes,
}

pub(crate) struct Broadcast {
    pub raw: Bytes,
    /// User identity to skip during fan-out, normally the stamped
    /// sender. Matched against each member's participant id.
    pub exclude: Option<String>,
}

pub(crate) struct RoleUpdate {
    pub old: Participant,
    pub new: Participant,
}

pub struct RoomActor {
    room_id: String,
    members: HashMap<Uuid, Client>,
    register_rx: mpsc::Receiver<Client>,
    unregister_rx: mpsc::Receiver<UnregisterRequest>,
    inbound_rx: mpsc::Receiver<InboundFrame>,
    broadcast_rx: mpsc::Receiver<Broadcast>,
    role_update_rx: mpsc::Receiver<RoleUpdate>,
    broadcast_tx: mpsc::Sender<Broadcast>,
    cancel_token: CancellationToken,
}

impl RoomActor {
    /// Spawn the room task and return a handle to its mailboxes.
    pub fn spawn(
        room_id: impl Into<String>,
        cancel_token: CancellationToken,
    ) -> (RoomHandle, JoinHandle<()>) {
        let (register_tx, register_rx) = mpsc::channel(ROOM_CHANNEL_BUFFER);
        let (unregister_tx, unregister_rx) = mpsc::channel(ROOM_CHANNEL_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_BUFFER);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(ROOM_CHANNEL_BUFFER);
        let (role_update_tx, role_update_rx) = mpsc::channel(ROOM_CHANNEL_BUFFER);

        let actor = Self {
            room_id: room_id.into(),
            members: HashMap::new(),
            register_rx,
            unregister_rx,
            inbound_rx,
            broadcast_rx,
            role_update_rx,
            broadcast_tx,
            cancel_token,
        };

        let handle = RoomHandle::new(register_tx, unregister_tx, inbound_tx, role_update_tx);

        let join_handle = tokio::spawn(actor.run());
        (handle, join_handle)
    }

    #[instrument(skip_all, fields(room_id = %self.room_id))]
    async fn run(mut self) {
        info!(target: "chat.room", "room started");

        loop {
            tokio::select! {
                Some(client) = self.register_rx.recv() => self.handle_register(client),
                Some(request) = self.unregister_rx.recv() => self.handle_unregister(request),
                Some(frame) = self.inbound_rx.recv() => self.handle_inbound(frame),
                Some(broadcast) = self.broadcast_rx.recv() => self.handle_broadcast(&broadcast),
                Some(update) = self.role_update_rx.recv() => self.handle_role_update(update),
                () = self.cancel_token.cancelled() => {
                    info!(target: "chat.room", members = self.members.len(), "room shutting down");
                    break;
                }
                else => break,
            }
        }
        // Dropping the member map closes every outbound queue, which
        // lets each outbound pump send its close frame and stop.
    }

    fn handle_register(&mut self, client: Client) {
        let client_id = client.id();
        let participant = client.participant().clone();
        debug!(
            target: "chat.room",
            client_id = %client_id,
            user_id = %participant.id(),
            nickname = %participant.nickname(),
            "member joined"
        );
        self.members.insert(client_id, client);

        let notice = Envelope::notice(
            "user_join",
            format!("'{}' has joined the room.", participant.nickname()),
        )
        .with_sender(participant);
        self.post_envelope(&notice);
    }

    fn handle_unregister(&mut self, request: UnregisterRequest) {
        let found = match &request.target {
            UnregisterTarget::Connection(client_id) => {
                self.members.contains_key(client_id).then_some(*client_id)
            }
            UnregisterTarget::Identity(user_id) => self
                .members
                .iter()
                .find(|(_, client)| client.participant().id() == user_id)
                .map(|(client_id, _)| *client_id),
        };

        let result = match found {
            Some(client_id) => {
                self.remove_member(client_id);
                Ok(())
            }
            None => Err(ChatError::NotFound(
                "participant is not in the room".to_string(),
            )),
        };

        if let Some(respond_to) = request.respond_to {
            let _ = respond_to.send(result);
        }
    }

    fn handle_inbound(&mut self, frame: InboundFrame) {
        // The sender may have been evicted while the frame was in flight.
        let Some(client) = self.members.get(&frame.client_id) else {
            return;
        };
        let participant = client.participant().clone();

        // Phase one runs before any reply, so a malformed frame is
        // dropped silently regardless of the sender's role.
        let kind = match protocol::peek_kind(&frame.raw) {
            Ok(kind) => kind,
            Err(e) => {
                warn!(
                    target: "chat.room",
                    client_id = %frame.client_id,
                    user_id = %participant.id(),
                    error = %e,
                    "dropping malformed frame"
                );
                return;
            }
        };

        if participant.is_muted() {
            let notice = Envelope::notice("muted", "You are muted and cannot send messages.");
            match notice.to_bytes() {
                Ok(raw) => self.deliver(frame.client_id, raw),
                Err(e) => warn!(target: "chat.room", error = %e, "failed to encode notice"),
            }
            return;
        }

        let envelope = match protocol::decode(kind, &frame.raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    target: "chat.room",
                    client_id = %frame.client_id,
                    user_id = %participant.id(),
                    kind = %kind,
                    error = %e,
                    "dropping malformed frame"
                );
                return;
            }
        };

        self.post_envelope(&envelope.with_sender(participant));
    }

    fn handle_broadcast(&mut self, broadcast: &Broadcast) {
        let mut evicted = Vec::new();
        for (client_id, client) in &self.members {
            if broadcast.exclude.as_deref() == Some(client.participant().id()) {
                continue;
            }
            if let Err(e) = client.enqueue(broadcast.raw.clone()) {
                warn!(
                    target: "chat.room",
                    client_id = %client_id,
                    user_id = %client.participant().id(),
                    error = %e,
                    "evicting unresponsive member"
                );
                evicted.push(*client_id);
            }
        }
        for client_id in evicted {
            self.remove_member(client_id);
        }
    }

    fn handle_role_update(&mut self, update: RoleUpdate) {
        let found = self
            .members
            .values_mut()
            .find(|client| client.participant().same_identity(&update.old));
        match found {
            Some(client) => {
                debug!(
                    target: "chat.room",
                    user_id = %update.new.id(),
                    old_role = ?update.old.role(),
                    new_role = ?update.new.role(),
                    nickname = %update.new.nickname(),
                    "participant updated"
                );
                client.set_participant(update.new);
            }
            None => {
                debug!(
                    target: "chat.room",
                    user_id = %update.old.id(),
                    "role update target not in the room"
                );
            }
        }
    }

    /// Remove a member and tell the rest of the room.
    fn remove_member(&mut self, client_id: Uuid) {
        if let Some(client) = self.members.remove(&client_id) {
            let participant = client.participant().clone();
            debug!(
                target: "chat.room",
                client_id = %client_id,
                user_id = %participant.id(),
                "member left"
            );
            let notice = Envelope::notice(
                "user_left",
                format!("'{}' has left the room.", participant.nickname()),
            )
            .with_sender(participant);
            self.post_envelope(&notice);
        }
    }

    /// Enqueue one frame to one member, evicting it on failure.
    fn deliver(&mut self, client_id: Uuid, raw: Bytes) {
        let Some(client) = self.members.get(&client_id) else {
            return;
        };
        if let Err(e) = client.enqueue(raw) {
            warn!(
                target: "chat.room",
                client_id = %client_id,
                error = %e,
                "evicting unresponsive member"
            );
            self.remove_member(client_id);
        }
    }

    /// Serialize and hand an envelope to the broadcast mailbox without
    /// blocking the actor on its own mailbox. The stamped sender, if
    /// any, is excluded from the fan-out by identity.
    fn post_envelope(&self, envelope: &Envelope) {
        let raw = match envelope.to_bytes() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(target: "chat.room", error = %e, "failed to encode envelope");
                return;
            }
        };
        let exclude = envelope.sender_id().map(String::from);
        if self.broadcast_tx.try_send(Broadcast { raw, exclude }).is_err() {
            warn!(target: "chat.room", kind = %envelope.kind(), "broadcast mailbox full, frame dropped");
        }
    }
}
