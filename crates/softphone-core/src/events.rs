//! Inbound engine notifications
//!
//! Every notification the engine can deliver is one variant of
//! [`EngineEvent`]. Each carries the handle of the affected entity, an
//! enumerated state and, where the engine provides one, a human-readable
//! message. Native bridges that cannot hand over Rust values can send the
//! same events as JSON and decode them with [`EngineEvent::from_json`].
//!
//! # Examples
//!
//! ```rust
//! use softphone_core::events::{EngineEvent, EventKind};
//! use softphone_core::account::RegistrationState;
//!
//! let json = r#"{
//!     "kind": "registration",
//!     "account_id": "6f3c2b1e-8f1d-4c55-9d6b-1f2e3d4c5b6a",
//!     "state": "Ok",
//!     "message": "Registration successful"
//! }"#;
//!
//! let event = EngineEvent::from_json(json).unwrap();
//! assert_eq!(event.kind(), EventKind::Registration);
//! if let EngineEvent::Registration(reg) = event {
//!     assert_eq!(reg.state, RegistrationState::Ok);
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::{AccountId, RegistrationState};
use crate::call::{CallDirection, CallId, CallState, MediaParams};
use crate::chat::{ChatRoomDescriptor, ChatRoomId, ChatRoomState, EphemeralPolicy};
use crate::error::AdapterResult;
use crate::message::{MessageDescriptor, MessageId, MessageState};

/// Coarse classification of inbound notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Registration,
    Call,
    ChatRoom,
    Message,
    Permission,
}

/// Platform permission needed before some call actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    Microphone,
    Camera,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permission::Microphone => write!(f, "microphone"),
            Permission::Camera => write!(f, "camera"),
        }
    }
}

/// Any notification the engine can deliver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    Registration(RegistrationEvent),
    Call(CallEvent),
    ChatRoom(ChatRoomEvent),
    Message(MessageEvent),
    Permission(PermissionEvent),
}

impl EngineEvent {
    /// Decode an event serialized by a native bridge
    pub fn from_json(json: &str) -> AdapterResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encode for a bridge or a log
    pub fn to_json(&self) -> AdapterResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::Registration(_) => EventKind::Registration,
            EngineEvent::Call(_) => EventKind::Call,
            EngineEvent::ChatRoom(_) => EventKind::ChatRoom,
            EngineEvent::Message(_) => EventKind::Message,
            EngineEvent::Permission(_) => EventKind::Permission,
        }
    }
}

/// Registration state change of an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationEvent {
    pub account_id: AccountId,
    pub state: RegistrationState,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl RegistrationEvent {
    pub fn new(account_id: AccountId, state: RegistrationState) -> Self {
        Self {
            account_id,
            state,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl From<RegistrationEvent> for EngineEvent {
    fn from(event: RegistrationEvent) -> Self {
        EngineEvent::Registration(event)
    }
}

/// Call state change
///
/// `current_params` are the call's negotiated parameters at the time of the
/// notification, not the parameters that were requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEvent {
    pub call_id: CallId,
    pub state: CallState,
    pub direction: CallDirection,
    pub remote_uri: String,
    #[serde(default)]
    pub current_params: Option<MediaParams>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl CallEvent {
    pub fn new(
        call_id: CallId,
        state: CallState,
        direction: CallDirection,
        remote_uri: impl Into<String>,
    ) -> Self {
        Self {
            call_id,
            state,
            direction,
            remote_uri: remote_uri.into(),
            current_params: None,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_params(mut self, params: MediaParams) -> Self {
        self.current_params = Some(params);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl From<CallEvent> for EngineEvent {
    fn from(event: CallEvent) -> Self {
        EngineEvent::Call(event)
    }
}

/// Chat room notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChatRoomEvent {
    StateChanged {
        room: ChatRoomDescriptor,
        state: ChatRoomState,
    },
    SubjectChanged {
        room_id: ChatRoomId,
        subject: String,
    },
    ParticipantAdded {
        room_id: ChatRoomId,
        address: String,
    },
    ParticipantRemoved {
        room_id: ChatRoomId,
        address: String,
    },
    ParticipantAdminChanged {
        room_id: ChatRoomId,
        address: String,
        is_admin: bool,
    },
    EphemeralPolicyChanged {
        room_id: ChatRoomId,
        policy: EphemeralPolicy,
    },
}

impl ChatRoomEvent {
    pub fn room_id(&self) -> ChatRoomId {
        match self {
            ChatRoomEvent::StateChanged { room, .. } => room.room_id,
            ChatRoomEvent::SubjectChanged { room_id, .. }
            | ChatRoomEvent::ParticipantAdded { room_id, .. }
            | ChatRoomEvent::ParticipantRemoved { room_id, .. }
            | ChatRoomEvent::ParticipantAdminChanged { room_id, .. }
            | ChatRoomEvent::EphemeralPolicyChanged { room_id, .. } => *room_id,
        }
    }
}

impl From<ChatRoomEvent> for EngineEvent {
    fn from(event: ChatRoomEvent) -> Self {
        EngineEvent::ChatRoom(event)
    }
}

/// Chat message notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MessageEvent {
    Received {
        room: ChatRoomDescriptor,
        message: MessageDescriptor,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    StateChanged {
        message_id: MessageId,
        state: MessageState,
        /// Local path of the downloaded file, with `FileTransferDone`
        #[serde(default)]
        file_path: Option<String>,
    },
    EphemeralTimerStarted {
        message_id: MessageId,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    EphemeralDeleted {
        message_id: MessageId,
    },
}

impl MessageEvent {
    pub fn message_id(&self) -> MessageId {
        match self {
            MessageEvent::Received { message, .. } => message.message_id,
            MessageEvent::StateChanged { message_id, .. }
            | MessageEvent::EphemeralTimerStarted { message_id, .. }
            | MessageEvent::EphemeralDeleted { message_id } => *message_id,
        }
    }
}

impl From<MessageEvent> for EngineEvent {
    fn from(event: MessageEvent) -> Self {
        EngineEvent::Message(event)
    }
}

/// Outcome of a platform permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEvent {
    pub permission: Permission,
    pub granted: bool,
}

impl From<PermissionEvent> for EngineEvent {
    fn from(event: PermissionEvent) -> Self {
        EngineEvent::Permission(event)
    }
}
