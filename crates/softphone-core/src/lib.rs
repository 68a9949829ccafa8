//! Softphone-core: session event adapter for a SIP client SDK
//!
//! A SIP SDK ("the engine") owns signalling, media and encryption, and reports
//! everything that happens through asynchronous notifications. This crate is
//! the layer between those notifications and a user interface:
//!
//! ```text
//! engine notifications -> SessionAdapter -> {SessionSnapshot, SessionEffect}
//! user requests        -> SessionAdapter -> SessionEngine (fire-and-forget)
//! ```
//!
//! The adapter reduces registration, call, chat room and chat message
//! notifications into local session state. Repeated, stale or out-of-order
//! notifications are no-ops, and every visible change is produced exactly
//! once as a [`SessionEffect`].
//!
//! [`SessionContext`] runs the adapter on a single task with a periodic
//! iterate tick and hands the UI a cloneable [`SessionHandle`].

/// Declare an opaque, copyable engine handle backed by a UUID
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            /// Generate a fresh handle
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(id: uuid::Uuid) -> Self {
                Self(id)
            }
        }
    };
}

pub mod error;
pub mod account;
pub mod call;
pub mod chat;
pub mod message;
pub mod events;
pub mod effects;
pub mod engine;
pub mod snapshot;
pub mod adapter;
pub mod context;

// Public API exports
pub use error::{AdapterError, AdapterResult};
pub use account::{AccountConfig, AccountId, AccountInfo, RegistrationState, TransportType};
pub use call::{CallDirection, CallId, CallInfo, CallState, MediaParams};
pub use chat::{
    ChatRoomBackend, ChatRoomCapabilities, ChatRoomDescriptor, ChatRoomId, ChatRoomInfo,
    ChatRoomParams, ChatRoomState, EphemeralPolicy,
};
pub use message::{
    ChatMessage, ContentPart, MessageDescriptor, MessageDirection, MessageId, MessageState,
};
pub use events::{
    CallEvent, ChatRoomEvent, EngineEvent, EventKind, MessageEvent, Permission, PermissionEvent,
    RegistrationEvent,
};
pub use effects::{
    EffectEmitter, EffectFilter, EffectKind, EffectSubscription, SessionEffect, SessionObserver,
};
pub use engine::{DeclineReason, EngineRequest, RecordingEngine, SessionEngine};
pub use snapshot::{CallControls, SessionSnapshot};
pub use adapter::{
    AdapterBuilder, AdapterConfig, AdapterStats, SecondCallPolicy, SendOutcome, SendPolicy,
    SessionAdapter, UserRequest,
};
pub use context::{SessionContext, SessionHandle};

/// Softphone-core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
