//! Chat room types
//!
//! Two backends exist. A `Basic` room is plain SIP MESSAGE with no server
//! state and can be used as soon as it exists. A `FlexisipChat` room lives on
//! a conference server; it must reach `Created` before anything can be sent.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::MessageId;

entity_id! {
    /// Opaque engine handle for a chat room
    ChatRoomId
}

/// Chat room implementation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatRoomBackend {
    Basic,
    FlexisipChat,
}

/// Capability set of a chat room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatRoomCapabilities {
    #[serde(default)]
    pub one_to_one: bool,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub group: bool,
    #[serde(default)]
    pub conference: bool,
}

impl ChatRoomCapabilities {
    pub fn one_to_one() -> Self {
        Self {
            one_to_one: true,
            ..Default::default()
        }
    }

    pub fn group() -> Self {
        Self {
            group: true,
            conference: true,
            ..Default::default()
        }
    }

    pub fn with_encryption(mut self) -> Self {
        self.encrypted = true;
        self
    }
}

/// Chat room state reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatRoomState {
    None,
    Instantiated,
    CreationPending,
    Created,
    CreationFailed,
    TerminationPending,
    Terminated,
    TerminationFailed,
    Deleted,
    /// A state this crate does not know about
    #[serde(other)]
    Unknown,
}

impl ChatRoomState {
    /// Decode the engine's numeric state code
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ChatRoomState::None,
            1 => ChatRoomState::Instantiated,
            2 => ChatRoomState::CreationPending,
            3 => ChatRoomState::Created,
            4 => ChatRoomState::CreationFailed,
            5 => ChatRoomState::TerminationPending,
            6 => ChatRoomState::Terminated,
            7 => ChatRoomState::TerminationFailed,
            8 => ChatRoomState::Deleted,
            _ => ChatRoomState::Unknown,
        }
    }

    fn rank(&self) -> Option<u8> {
        match self {
            ChatRoomState::None => Some(0),
            ChatRoomState::Instantiated => Some(1),
            ChatRoomState::CreationPending => Some(2),
            ChatRoomState::Created | ChatRoomState::CreationFailed => Some(3),
            ChatRoomState::TerminationPending => Some(4),
            ChatRoomState::Terminated | ChatRoomState::TerminationFailed => Some(5),
            ChatRoomState::Deleted => Some(6),
            ChatRoomState::Unknown => None,
        }
    }

    /// Room states only move forward
    ///
    /// `Created` is entered at most once. A room whose termination failed
    /// stays usable and may be terminated again.
    pub fn can_transition_to(&self, next: ChatRoomState) -> bool {
        if *self == ChatRoomState::TerminationFailed {
            return matches!(
                next,
                ChatRoomState::TerminationPending
                    | ChatRoomState::Terminated
                    | ChatRoomState::Deleted
            );
        }
        if *self == ChatRoomState::CreationFailed && next != ChatRoomState::Deleted {
            return false;
        }
        match (self.rank(), next.rank()) {
            (Some(current), Some(next)) => next > current,
            _ => false,
        }
    }

    /// Created, and not being or having been torn down
    pub fn is_live(&self) -> bool {
        matches!(self, ChatRoomState::Created | ChatRoomState::TerminationFailed)
    }

    /// The room can never carry messages again
    pub fn is_unusable(&self) -> bool {
        matches!(
            self,
            ChatRoomState::CreationFailed | ChatRoomState::Terminated | ChatRoomState::Deleted
        )
    }
}

/// Ephemeral message policy of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemeralPolicy {
    pub enabled: bool,
    /// Lifetime in seconds, counted from when all recipients read the message
    pub lifetime_secs: u64,
}

impl EphemeralPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            lifetime_secs: 0,
        }
    }

    pub fn enabled(lifetime_secs: u64) -> Self {
        Self {
            enabled: true,
            lifetime_secs,
        }
    }

    /// Lifetime applied to new messages, if any
    pub fn lifetime(&self) -> Option<Duration> {
        (self.enabled && self.lifetime_secs > 0).then(|| Duration::from_secs(self.lifetime_secs))
    }
}

impl Default for EphemeralPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Participant of a room, keyed by address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub address: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// Parameters for a chat room creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRoomParams {
    pub backend: ChatRoomBackend,
    pub capabilities: ChatRoomCapabilities,
    pub subject: Option<String>,
    pub participants: Vec<String>,
    #[serde(default)]
    pub ephemeral: EphemeralPolicy,
}

impl ChatRoomParams {
    /// Basic one-to-one room with a single peer
    pub fn basic(peer: impl Into<String>) -> Self {
        Self {
            backend: ChatRoomBackend::Basic,
            capabilities: ChatRoomCapabilities::one_to_one(),
            subject: None,
            participants: vec![peer.into()],
            ephemeral: EphemeralPolicy::disabled(),
        }
    }

    /// Server-backed encrypted one-to-one room
    pub fn secure_one_to_one(peer: impl Into<String>) -> Self {
        Self {
            backend: ChatRoomBackend::FlexisipChat,
            capabilities: ChatRoomCapabilities::one_to_one().with_encryption(),
            subject: Some("Dummy subject".to_string()),
            participants: vec![peer.into()],
            ephemeral: EphemeralPolicy::disabled(),
        }
    }

    /// Server-backed group room
    pub fn group(subject: impl Into<String>, participants: Vec<String>) -> Self {
        Self {
            backend: ChatRoomBackend::FlexisipChat,
            capabilities: ChatRoomCapabilities::group(),
            subject: Some(subject.into()),
            participants,
            ephemeral: EphemeralPolicy::disabled(),
        }
    }

    pub fn with_ephemeral(mut self, policy: EphemeralPolicy) -> Self {
        self.ephemeral = policy;
        self
    }
}

/// Description of a room as carried by engine notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRoomDescriptor {
    pub room_id: ChatRoomId,
    pub backend: ChatRoomBackend,
    pub capabilities: ChatRoomCapabilities,
    #[serde(default)]
    pub peer_address: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub ephemeral: EphemeralPolicy,
}

/// Locally tracked chat room
#[derive(Debug, Clone)]
pub struct ChatRoomInfo {
    pub room_id: ChatRoomId,
    pub backend: ChatRoomBackend,
    pub capabilities: ChatRoomCapabilities,
    pub state: ChatRoomState,
    pub subject: Option<String>,
    pub participants: BTreeMap<String, Participant>,
    pub ephemeral: EphemeralPolicy,
    /// Rendered messages, in arrival order
    pub history: Vec<MessageId>,
    pub created_at: DateTime<Utc>,
}

impl ChatRoomInfo {
    pub fn from_params(room_id: ChatRoomId, params: &ChatRoomParams) -> Self {
        let participants = params
            .participants
            .iter()
            .map(|address| {
                (
                    address.clone(),
                    Participant {
                        address: address.clone(),
                        is_admin: false,
                    },
                )
            })
            .collect();
        Self {
            room_id,
            backend: params.backend,
            capabilities: params.capabilities,
            state: ChatRoomState::Instantiated,
            subject: params.subject.clone(),
            participants,
            ephemeral: params.ephemeral,
            history: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn from_descriptor(descriptor: &ChatRoomDescriptor) -> Self {
        let participants = descriptor
            .peer_address
            .iter()
            .map(|address| {
                (
                    address.clone(),
                    Participant {
                        address: address.clone(),
                        is_admin: false,
                    },
                )
            })
            .collect();
        // A room we only learn about from traffic is already live on the engine side.
        let state = match descriptor.backend {
            ChatRoomBackend::Basic => ChatRoomState::Instantiated,
            ChatRoomBackend::FlexisipChat => ChatRoomState::Created,
        };
        Self {
            room_id: descriptor.room_id,
            backend: descriptor.backend,
            capabilities: descriptor.capabilities,
            state,
            subject: descriptor.subject.clone(),
            participants,
            ephemeral: descriptor.ephemeral,
            history: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Sends go straight to the engine
    ///
    /// Basic rooms are usable immediately; server-backed rooms only once created.
    pub fn accepts_messages(&self) -> bool {
        match self.backend {
            ChatRoomBackend::Basic => !self.state.is_unusable(),
            ChatRoomBackend::FlexisipChat => self.state.is_live(),
        }
    }

    pub fn is_group(&self) -> bool {
        self.capabilities.group
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_room_is_immediately_usable() {
        let params = ChatRoomParams::basic("sip:bob@example.org");
        let room = ChatRoomInfo::from_params(ChatRoomId::new(), &params);
        assert_eq!(room.state, ChatRoomState::Instantiated);
        assert!(room.accepts_messages());
    }

    #[test]
    fn test_flexisip_room_waits_for_creation() {
        let mut room = ChatRoomInfo::from_params(
            ChatRoomId::new(),
            &ChatRoomParams::secure_one_to_one("sip:bob@example.org"),
        );
        assert!(!room.accepts_messages());
        room.state = ChatRoomState::CreationPending;
        assert!(!room.accepts_messages());
        room.state = ChatRoomState::Created;
        assert!(room.accepts_messages());
        room.state = ChatRoomState::TerminationPending;
        assert!(!room.accepts_messages());
        room.state = ChatRoomState::TerminationFailed;
        assert!(room.accepts_messages());
    }

    #[test]
    fn test_ephemeral_lifetime() {
        assert_eq!(EphemeralPolicy::enabled(15).lifetime(), Some(Duration::from_secs(15)));
        assert_eq!(EphemeralPolicy::enabled(0).lifetime(), None);
        assert_eq!(EphemeralPolicy::disabled().lifetime(), None);
    }

    #[test]
    fn test_room_state_codes() {
        assert_eq!(ChatRoomState::from_code(3), ChatRoomState::Created);
        assert_eq!(ChatRoomState::from_code(99), ChatRoomState::Unknown);
        assert!(ChatRoomState::CreationFailed.is_unusable());
    }

    #[test]
    fn test_room_states_move_forward() {
        use ChatRoomState::*;
        assert!(Instantiated.can_transition_to(CreationPending));
        assert!(CreationPending.can_transition_to(Created));
        assert!(!Created.can_transition_to(CreationPending));
        assert!(!Created.can_transition_to(Created));
        assert!(!CreationFailed.can_transition_to(Terminated));
        assert!(CreationFailed.can_transition_to(Deleted));
        assert!(!TerminationFailed.can_transition_to(Created));
        assert!(TerminationFailed.can_transition_to(TerminationPending));
        assert!(!Created.can_transition_to(Unknown));
    }
}
