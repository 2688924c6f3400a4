//! Participants and the role state machine.
//!
//! A [`Participant`] wraps a [`User`] identity with a room-local nickname
//! and a [`Role`] tag. Role transitions never mutate a participant in
//! place: the room replaces the whole value via its role-update mailbox,
//! so `Common ⇄ Muted` swaps are serialized with every other membership
//! mutation. `Moderator` and `Bot` are assigned at admission and are not
//! reachable through mute/unmute.
//!
//! Identity comparison is always by the underlying user id, never by
//! nickname.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::identity::User;

/// Participant role tag. Serialized as the `type` field of the wire
/// `sender` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Common,
    Moderator,
    Muted,
    Bot,
}

/// A connected identity's role-bearing representation within a room.
#[derive(Debug, Clone)]
pub struct Participant {
    user: User,
    nickname: String,
    role: Role,
}

impl Participant {
    /// Create a participant. An empty nickname falls back to the
    /// identity name.
    pub fn new(user: User, nickname: impl Into<String>, role: Role) -> Self {
        let nickname = nickname.into();
        let nickname = if nickname.is_empty() {
            user.name().to_string()
        } else {
            nickname
        };
        Self {
            user,
            nickname,
            role,
        }
    }

    pub fn common(user: User, nickname: impl Into<String>) -> Self {
        Self::new(user, nickname, Role::Common)
    }

    pub fn moderator(user: User, nickname: impl Into<String>) -> Self {
        Self::new(user, nickname, Role::Moderator)
    }

    pub fn muted(user: User, nickname: impl Into<String>) -> Self {
        Self::new(user, nickname, Role::Muted)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.user.id()
    }

    #[must_use]
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.role == Role::Muted
    }

    #[must_use]
    pub fn is_moderator(&self) -> bool {
        self.role == Role::Moderator
    }

    /// Identity comparison by the underlying user id.
    #[must_use]
    pub fn same_identity(&self, other: &Participant) -> bool {
        self.user.id() == other.user.id()
    }

    /// A copy of this participant with a different nickname, same
    /// identity and role. An empty nickname resets to the identity name.
    #[must_use]
    pub fn with_nickname(&self, nickname: &str) -> Self {
        Self::new(self.user.clone(), nickname, self.role)
    }
}

impl Serialize for Participant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Participant", 4)?;
        s.serialize_field("id", self.user.id())?;
        s.serialize_field("name", self.user.name())?;
        s.serialize_field("nickname", self.nickname())?;
        s.serialize_field("type", &self.role)?;
        s.end()
    }
}
