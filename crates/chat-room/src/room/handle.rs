//! Cloneable handle to a running room.
//!
//! The handle is the only way into the room's state. Connection-level
//! operations (register, unregister, inbound frames) map one-to-one
//! onto mailboxes; the moderation surface validates its inputs first
//! and then routes the resulting replacement through the role update
//! mailbox, so the actor itself stays a plain state machine.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::errors::ChatError;
use crate::participant::Participant;

use super::actor::{InboundFrame, RoleUpdate, UnregisterRequest, UnregisterTarget};
use super::client::Client;

#[derive(Clone)]
pub struct RoomHandle {
    register_tx: mpsc::Sender<Client>,
    unregister_tx: mpsc::Sender<UnregisterRequest>,
    inbound_tx: mpsc::Sender<InboundFrame>,
    role_update_tx: mpsc::Sender<RoleUpdate>,
}

impl RoomHandle {
    pub(crate) fn new(
        register_tx: mpsc::Sender<Client>,
        unregister_tx: mpsc::Sender<UnregisterRequest>,
        inbound_tx: mpsc::Sender<InboundFrame>,
        role_update_tx: mpsc::Sender<RoleUpdate>,
    ) -> Self {
        Self {
            register_tx,
            unregister_tx,
            inbound_tx,
            role_update_tx,
        }
    }

    /// Add a connection to the room. The rest of the room is told with
    /// a join notice.
    pub async fn register(&self, client: Client) -> Result<(), ChatError> {
        self.register_tx
            .send(client)
            .await
            .map_err(|_| mailbox_closed("register"))
    }

    /// Remove a connection from the room and wait for the result.
    ///
    /// Returns [`ChatError::NotFound`] when the connection is already
    /// gone, which is routine when a kick races a disconnect.
    pub async fn unregister(&self, client_id: Uuid) -> Result<(), ChatError> {
        self.send_unregister(UnregisterTarget::Connection(client_id))
            .await
    }

    /// Hand a raw inbound frame to the room. The inbound mailbox is
    /// nearly unbuffered, so a busy room backpressures the reader here.
    pub async fn forward_inbound(&self, client_id: Uuid, raw: Bytes) -> Result<(), ChatError> {
        self.inbound_tx
            .send(InboundFrame { client_id, raw })
            .await
            .map_err(|_| mailbox_closed("inbound"))
    }

    /// Eject whichever connection carries the target's identity.
    pub async fn kick(&self, target: &Participant) -> Result<(), ChatError> {
        self.send_unregister(UnregisterTarget::Identity(target.id().to_string()))
            .await
    }

    /// Mute a participant. The moderator check and the current-state
    /// check run against the caller's snapshots; the room applies the
    /// replacement by identity.
    pub async fn mute(
        &self,
        moderator: &Participant,
        target: &Participant,
    ) -> Result<(), ChatError> {
        if !moderator.is_moderator() {
            return Err(ChatError::PermissionDenied(
                "only moderators can mute participants".to_string(),
            ));
        }
        if target.is_muted() {
            return Err(ChatError::StateConflict(
                "participant is already muted".to_string(),
            ));
        }
        let muted = Participant::muted(target.user().clone(), target.nickname());
        self.replace_participant(target.clone(), muted).await
    }

    /// Lift a mute, restoring the participant to the common role.
    pub async fn unmute(
        &self,
        moderator: &Participant,
        target: &Participant,
    ) -> Result<(), ChatError> {
        if !moderator.is_moderator() {
            return Err(ChatError::PermissionDenied(
                "only moderators can unmute participants".to_string(),
            ));
        }
        if !target.is_muted() {
            return Err(ChatError::StateConflict(
                "participant is not muted".to_string(),
            ));
        }
        let restored = Participant::common(target.user().clone(), target.nickname());
        self.replace_participant(target.clone(), restored).await
    }

    /// Remove a moderator from the room. Unlike a plain disconnect,
    /// the caller learns whether the moderator was actually present.
    pub async fn moderator_leave(&self, moderator: &Participant) -> Result<(), ChatError> {
        if !moderator.is_moderator() {
            return Err(ChatError::PermissionDenied(
                "participant is not a moderator".to_string(),
            ));
        }
        self.kick(moderator).await
    }

    /// Change a participant's display name. Muted participants keep
    /// their nickname until unmuted.
    pub async fn change_nickname(
        &self,
        target: &Participant,
        nickname: &str,
    ) -> Result<(), ChatError> {
        if target.is_muted() {
            return Err(ChatError::StateConflict(
                "muted participants cannot change nickname".to_string(),
            ));
        }
        let renamed = target.with_nickname(nickname);
        self.replace_participant(target.clone(), renamed).await
    }

    /// Swap a participant's record in place, matched by identity. The
    /// connection, its queue, and any in-flight frames are untouched.
    pub async fn replace_participant(
        &self,
        old: Participant,
        new: Participant,
    ) -> Result<(), ChatError> {
        self.role_update_tx
            .send(RoleUpdate { old, new })
            .await
            .map_err(|_| mailbox_closed("role update"))
    }

    async fn send_unregister(&self, target: UnregisterTarget) -> Result<(), ChatError> {
        let (respond_to, response) = oneshot::channel();
        self.unregister_tx
            .send(UnregisterRequest {
                target,
                respond_to: Some(respond_to),
            })
            .await
            .map_err(|_| mailbox_closed("unregister"))?;
        response.await.map_err(|_| mailbox_closed("unregister"))?
    }
}

fn mailbox_closed(name: &str) -> ChatError {
    ChatError::Mailbox(format!("{name} mailbox closed"))
}
