//! Error types for the session adapter
//!
//! Failures the engine reports (registration `Failed`, call `Error`, message
//! `NotDelivered`) are *state*, not errors: they flow through the reducer and
//! end up in the snapshot as status text. The errors in this module cover the
//! remaining cases:
//!
//! - **Contract violations** - a request that makes no sense for the current
//!   session (no current call, unknown chat room). These are logged and
//!   returned to the caller, never shown to the user.
//! - **Teardown guards** - a request against an entity whose termination has
//!   already been requested.
//! - **Send rejections** - a chat send that cannot be queued.
//! - **Configuration errors** - invalid adapter or account settings.
//!
//! # Handling pattern
//!
//! ```rust
//! use softphone_core::{AdapterError, AdapterResult};
//!
//! fn report(result: AdapterResult<()>) {
//!     match result {
//!         Ok(()) => {}
//!         Err(e) if e.is_contract_violation() => {
//!             tracing::warn!(category = e.category(), "ignored request: {}", e);
//!         }
//!         Err(e) => eprintln!("request failed: {}", e),
//!     }
//! }
//!
//! report(Err(AdapterError::NoCurrentCall));
//! ```

use thiserror::Error;

use crate::call::{CallId, CallState};
use crate::chat::{ChatRoomId, ChatRoomState};
use crate::message::MessageId;

/// Result type alias for adapter operations
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Errors produced by adapter requests and configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    /// Account / registration errors
    #[error("No account configured")]
    NoAccount,

    #[error("Login already in progress for {identity}")]
    LoginInProgress { identity: String },

    #[error("Invalid identity {identity}: {reason}")]
    InvalidIdentity { identity: String, reason: String },

    /// Call errors
    #[error("No current call")]
    NoCurrentCall,

    #[error("A call is already tracked: {call_id}")]
    CallAlreadyTracked { call_id: CallId },

    #[error("Invalid call state for call {call_id}: current state is {current_state:?}")]
    InvalidCallState {
        call_id: CallId,
        current_state: CallState,
    },

    /// Chat errors
    #[error("Chat room not found: {room_id}")]
    ChatRoomNotFound { room_id: ChatRoomId },

    #[error("Chat room {room_id} is not ready: state is {state:?}")]
    ChatRoomNotReady {
        room_id: ChatRoomId,
        state: ChatRoomState,
    },

    #[error("Chat room {room_id} is no longer usable: state is {state:?}")]
    ChatRoomUnavailable {
        room_id: ChatRoomId,
        state: ChatRoomState,
    },

    #[error("Send queue full for chat room {room_id}: limit is {limit}")]
    SendQueueFull { room_id: ChatRoomId, limit: usize },

    #[error("Chat room {room_id} does not support {operation}")]
    UnsupportedOperation {
        room_id: ChatRoomId,
        operation: String,
    },

    #[error("{address} is not a participant of chat room {room_id}")]
    ParticipantNotFound { room_id: ChatRoomId, address: String },

    #[error("Empty message")]
    EmptyMessage,

    /// Message errors
    #[error("Message not found: {message_id}")]
    MessageNotFound { message_id: MessageId },

    #[error("Message {message_id} has no pending file transfer")]
    NoPendingTransfer { message_id: MessageId },

    /// Cancellation guard
    #[error("Teardown pending for {entity}")]
    TeardownPending { entity: String },

    /// Permission errors
    #[error("Permission request already pending: {permission}")]
    PermissionPending { permission: String },

    /// Configuration errors
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Invalid engine event: {reason}")]
    InvalidEvent { reason: String },

    /// Generic errors
    #[error("Session closed")]
    SessionClosed,
}

impl AdapterError {
    /// Create an invalid configuration error
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid identity error
    pub fn invalid_identity(identity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            identity: identity.into(),
            reason: reason.into(),
        }
    }

    /// Create a teardown pending error
    pub fn teardown_pending(entity: impl Into<String>) -> Self {
        Self::TeardownPending {
            entity: entity.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(room_id: ChatRoomId, operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            room_id,
            operation: operation.into(),
        }
    }

    /// Check if this error is a programming-contract violation
    ///
    /// Contract violations are guarded no-ops: callers log them and carry on,
    /// the user never sees them.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            AdapterError::NoAccount
                | AdapterError::NoCurrentCall
                | AdapterError::CallAlreadyTracked { .. }
                | AdapterError::InvalidCallState { .. }
                | AdapterError::ChatRoomNotFound { .. }
                | AdapterError::ParticipantNotFound { .. }
                | AdapterError::MessageNotFound { .. }
                | AdapterError::NoPendingTransfer { .. }
                | AdapterError::TeardownPending { .. }
                | AdapterError::LoginInProgress { .. }
                | AdapterError::PermissionPending { .. }
        )
    }

    /// Check if this error rejected an outgoing chat message
    pub fn is_send_rejection(&self) -> bool {
        matches!(
            self,
            AdapterError::ChatRoomNotReady { .. }
                | AdapterError::ChatRoomUnavailable { .. }
                | AdapterError::SendQueueFull { .. }
                | AdapterError::EmptyMessage
        )
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            AdapterError::NoAccount
            | AdapterError::LoginInProgress { .. }
            | AdapterError::InvalidIdentity { .. } => "registration",

            AdapterError::NoCurrentCall
            | AdapterError::CallAlreadyTracked { .. }
            | AdapterError::InvalidCallState { .. } => "call",

            AdapterError::ChatRoomNotFound { .. }
            | AdapterError::ChatRoomNotReady { .. }
            | AdapterError::ChatRoomUnavailable { .. }
            | AdapterError::SendQueueFull { .. }
            | AdapterError::ParticipantNotFound { .. }
            | AdapterError::UnsupportedOperation { .. } => "chat",

            AdapterError::EmptyMessage
            | AdapterError::MessageNotFound { .. }
            | AdapterError::NoPendingTransfer { .. } => "message",

            AdapterError::PermissionPending { .. } => "permission",

            AdapterError::InvalidConfiguration { .. } | AdapterError::InvalidEvent { .. } => {
                "configuration"
            }

            AdapterError::TeardownPending { .. } | AdapterError::SessionClosed => "system",
        }
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(e: serde_json::Error) -> Self {
        AdapterError::InvalidEvent {
            reason: e.to_string(),
        }
    }
}
