//! Side effects produced by the adapter and the observer registry
//!
//! Each applied notification yields zero or more [`SessionEffect`]s: the
//! deterministic triggers a presentation layer acts on (show a panel, start
//! video rendering, remove a message bubble). Effects are delivered through an
//! explicit subscription list, so every observer has a typed handler and an
//! optional filter instead of a set of nullable callbacks.
//!
//! # Usage Examples
//!
//! ## Observer
//!
//! ```rust
//! use softphone_core::effects::{
//!     EffectEmitter, EffectSubscription, SessionEffect, SessionObserver,
//! };
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct StatusBar;
//!
//! #[async_trait]
//! impl SessionObserver for StatusBar {
//!     async fn on_effect(&self, effect: SessionEffect) {
//!         if let SessionEffect::RegistrationStatus { text, .. } = effect {
//!             println!("status: {}", text);
//!         }
//!     }
//! }
//!
//! let emitter = EffectEmitter::new();
//! let id = emitter.subscribe(EffectSubscription::all_effects(Arc::new(StatusBar)));
//! assert_eq!(emitter.subscription_count(), 1);
//! assert!(emitter.unsubscribe(id));
//! ```
//!
//! ## Filtering
//!
//! ```rust
//! use softphone_core::effects::{EffectFilter, EffectKind};
//! use std::collections::HashSet;
//!
//! let mut kinds = HashSet::new();
//! kinds.insert(EffectKind::Call);
//!
//! let filter = EffectFilter {
//!     kinds: Some(kinds),
//!     ..Default::default()
//! };
//! ```

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;

use crate::account::RegistrationState;
use crate::call::{CallId, CallState};
use crate::chat::{ChatRoomId, ChatRoomState};
use crate::events::Permission;
use crate::message::{MessageId, MessageState};

/// Category of an effect, used for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EffectKind {
    Registration,
    Call,
    Permission,
    ChatRoom,
    Message,
}

/// A deterministic side-effect trigger for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum SessionEffect {
    /// Login action enabled or disabled
    LoginEnabled { enabled: bool },
    /// Authenticated panel (call/chat actions) revealed or hidden
    AuthenticatedPanel { visible: bool },
    /// Stored password dropped for an identity
    CredentialsCleared { identity: String },
    /// Registration status line
    RegistrationStatus {
        state: RegistrationState,
        text: String,
    },

    /// Ringing panel with accept/decline shown or hidden
    RingingUi { call_id: CallId, visible: bool },
    /// Call status line
    CallStatus {
        call_id: CallId,
        state: CallState,
        text: String,
    },
    /// Video rendering started or stopped, decided from negotiated parameters
    VideoRendering { call_id: CallId, started: bool },
    /// Call controls reset to idle after the call ended
    CallTornDown {
        call_id: CallId,
        final_state: CallState,
        reason: Option<String>,
    },
    /// A second incoming call was declined because one is already tracked
    SecondCallDeclined { call_id: CallId, remote_uri: String },

    /// Ask the user for a platform permission
    PermissionPrompt { permission: Permission },
    /// The user refused; the pending action is abandoned
    PermissionDenied { permission: Permission },
    /// Permission granted but the resumed action was refused
    PendingActionFailed { permission: Permission, reason: String },

    /// Room state changed
    ChatRoomStatus {
        room_id: ChatRoomId,
        state: ChatRoomState,
    },
    /// Subject, participants or ephemeral policy changed
    ChatRoomUpdated { room_id: ChatRoomId },
    /// Room bound as the active conversation
    ActiveConversationBound { room_id: ChatRoomId },
    /// Send held until the room is created
    SendQueued { room_id: ChatRoomId, position: usize },
    /// Send refused; never silently dropped
    SendRejected { room_id: ChatRoomId, reason: String },
    /// Room created, queued sends went out
    SendUnblocked { room_id: ChatRoomId, flushed: usize },

    /// Message bubble appended to a room
    MessageAppended {
        room_id: ChatRoomId,
        message_id: MessageId,
    },
    /// Room marked as read
    RoomMarkedAsRead { room_id: ChatRoomId },
    /// Rendered delivery state changed
    MessageStateRendered {
        message_id: MessageId,
        state: MessageState,
    },
    /// Download placeholder replaced by the downloaded file
    FileContentReplaced { message_id: MessageId, path: String },
    /// File transfer failed
    FileTransferFailed { message_id: MessageId },
    /// Ephemeral countdown display started
    EphemeralCountdownStarted {
        message_id: MessageId,
        lifetime_secs: u64,
    },
    /// Message bubble removed
    MessageRemoved {
        room_id: ChatRoomId,
        message_id: MessageId,
    },
}

impl SessionEffect {
    pub fn kind(&self) -> EffectKind {
        match self {
            SessionEffect::LoginEnabled { .. }
            | SessionEffect::AuthenticatedPanel { .. }
            | SessionEffect::CredentialsCleared { .. }
            | SessionEffect::RegistrationStatus { .. } => EffectKind::Registration,

            SessionEffect::RingingUi { .. }
            | SessionEffect::CallStatus { .. }
            | SessionEffect::VideoRendering { .. }
            | SessionEffect::CallTornDown { .. }
            | SessionEffect::SecondCallDeclined { .. } => EffectKind::Call,

            SessionEffect::PermissionPrompt { .. }
            | SessionEffect::PermissionDenied { .. }
            | SessionEffect::PendingActionFailed { .. } => EffectKind::Permission,

            SessionEffect::ChatRoomStatus { .. }
            | SessionEffect::ChatRoomUpdated { .. }
            | SessionEffect::ActiveConversationBound { .. }
            | SessionEffect::SendQueued { .. }
            | SessionEffect::SendRejected { .. }
            | SessionEffect::SendUnblocked { .. } => EffectKind::ChatRoom,

            SessionEffect::MessageAppended { .. }
            | SessionEffect::RoomMarkedAsRead { .. }
            | SessionEffect::MessageStateRendered { .. }
            | SessionEffect::FileContentReplaced { .. }
            | SessionEffect::FileTransferFailed { .. }
            | SessionEffect::EphemeralCountdownStarted { .. }
            | SessionEffect::MessageRemoved { .. } => EffectKind::Message,
        }
    }

    /// Call this effect relates to, if any
    pub fn call_id(&self) -> Option<CallId> {
        match self {
            SessionEffect::RingingUi { call_id, .. }
            | SessionEffect::CallStatus { call_id, .. }
            | SessionEffect::VideoRendering { call_id, .. }
            | SessionEffect::CallTornDown { call_id, .. }
            | SessionEffect::SecondCallDeclined { call_id, .. } => Some(*call_id),
            _ => None,
        }
    }

    /// Chat room this effect relates to, if known without a lookup
    pub fn room_id(&self) -> Option<ChatRoomId> {
        match self {
            SessionEffect::ChatRoomStatus { room_id, .. }
            | SessionEffect::ChatRoomUpdated { room_id }
            | SessionEffect::ActiveConversationBound { room_id }
            | SessionEffect::SendQueued { room_id, .. }
            | SessionEffect::SendRejected { room_id, .. }
            | SessionEffect::SendUnblocked { room_id, .. }
            | SessionEffect::MessageAppended { room_id, .. }
            | SessionEffect::RoomMarkedAsRead { room_id }
            | SessionEffect::MessageRemoved { room_id, .. } => Some(*room_id),
            _ => None,
        }
    }

    /// Check if this effect passes the given filter
    pub fn passes_filter(&self, filter: &EffectFilter) -> bool {
        if let Some(kinds) = &filter.kinds {
            if !kinds.contains(&self.kind()) {
                return false;
            }
        }

        if let Some(call_ids) = &filter.call_ids {
            match self.call_id() {
                Some(call_id) if call_ids.contains(&call_id) => {}
                _ => return false,
            }
        }

        if let Some(room_ids) = &filter.room_ids {
            match self.room_id() {
                Some(room_id) if room_ids.contains(&room_id) => {}
                _ => return false,
            }
        }

        true
    }
}

/// Effect filtering options for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EffectFilter {
    /// Only receive effects of these kinds
    pub kinds: Option<HashSet<EffectKind>>,
    /// Only receive effects for these calls
    pub call_ids: Option<HashSet<CallId>>,
    /// Only receive effects for these chat rooms
    pub room_ids: Option<HashSet<ChatRoomId>>,
}

/// Presentation-side consumer of adapter effects
#[async_trait]
pub trait SessionObserver: Send + Sync {
    /// Handle one effect, in the order the adapter produced it
    async fn on_effect(&self, effect: SessionEffect);
}

/// A registered observer plus its filter
#[derive(Clone)]
pub struct EffectSubscription {
    handler: Arc<dyn SessionObserver>,
    filter: EffectFilter,
    id: uuid::Uuid,
}

impl EffectSubscription {
    pub fn new(handler: Arc<dyn SessionObserver>, filter: EffectFilter) -> Self {
        Self {
            handler,
            filter,
            id: uuid::Uuid::new_v4(),
        }
    }

    /// Receive every effect
    pub fn all_effects(handler: Arc<dyn SessionObserver>) -> Self {
        Self::new(handler, EffectFilter::default())
    }

    /// Receive only effects of the given kinds
    pub fn kinds(
        handler: Arc<dyn SessionObserver>,
        kinds: impl IntoIterator<Item = EffectKind>,
    ) -> Self {
        Self::new(
            handler,
            EffectFilter {
                kinds: Some(kinds.into_iter().collect()),
                ..Default::default()
            },
        )
    }

    /// Receive only effects for one call
    pub fn call_effects(handler: Arc<dyn SessionObserver>, call_id: CallId) -> Self {
        let mut call_ids = HashSet::new();
        call_ids.insert(call_id);
        Self::new(
            handler,
            EffectFilter {
                call_ids: Some(call_ids),
                ..Default::default()
            },
        )
    }

    /// Receive only effects for one chat room
    pub fn room_effects(handler: Arc<dyn SessionObserver>, room_id: ChatRoomId) -> Self {
        let mut room_ids = HashSet::new();
        room_ids.insert(room_id);
        Self::new(
            handler,
            EffectFilter {
                room_ids: Some(room_ids),
                ..Default::default()
            },
        )
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn should_receive(&self, effect: &SessionEffect) -> bool {
        effect.passes_filter(&self.filter)
    }

    pub async fn deliver(&self, effect: SessionEffect) {
        if self.should_receive(&effect) {
            self.handler.on_effect(effect).await;
        }
    }
}

impl std::fmt::Debug for EffectSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectSubscription")
            .field("handler", &"<observer>")
            .field("filter", &self.filter)
            .field("id", &self.id)
            .finish()
    }
}

/// Subscription registry and fan-out
///
/// Delivery to the subscribers of one effect runs concurrently; `emit`
/// returns once all of them handled it, so effects stay ordered per observer.
#[derive(Debug, Default)]
pub struct EffectEmitter {
    subscriptions: RwLock<Vec<EffectSubscription>>,
}

impl EffectEmitter {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    /// Add a subscription, returning its id
    pub fn subscribe(&self, subscription: EffectSubscription) -> uuid::Uuid {
        let id = subscription.id();
        self.subscriptions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(subscription);
        id
    }

    /// Remove a subscription; `false` if it was not registered
    pub fn unsubscribe(&self, subscription_id: uuid::Uuid) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(pos) = subscriptions.iter().position(|s| s.id() == subscription_id) {
            subscriptions.remove(pos);
            true
        } else {
            false
        }
    }

    /// Deliver an effect to every matching subscription
    pub async fn emit(&self, effect: SessionEffect) {
        let subscriptions = self
            .subscriptions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        let deliveries = subscriptions.iter().map(|subscription| {
            let effect = effect.clone();
            async move { subscription.deliver(effect).await }
        });
        futures::future::join_all(deliveries).await;
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<SessionEffect>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<SessionEffect> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionObserver for Recorder {
        async fn on_effect(&self, effect: SessionEffect) {
            self.seen.lock().unwrap().push(effect);
        }
    }

    #[tokio::test]
    async fn test_filters_by_kind_and_call() {
        let emitter = EffectEmitter::new();
        let everything = Recorder::new();
        let calls_only = Recorder::new();
        let one_call = Recorder::new();

        let call_id = CallId::new();
        emitter.subscribe(EffectSubscription::all_effects(everything.clone()));
        emitter.subscribe(EffectSubscription::kinds(calls_only.clone(), [EffectKind::Call]));
        emitter.subscribe(EffectSubscription::call_effects(one_call.clone(), call_id));

        emitter.emit(SessionEffect::LoginEnabled { enabled: false }).await;
        emitter
            .emit(SessionEffect::RingingUi {
                call_id,
                visible: true,
            })
            .await;
        emitter
            .emit(SessionEffect::RingingUi {
                call_id: CallId::new(),
                visible: true,
            })
            .await;

        assert_eq!(everything.seen().len(), 3);
        assert_eq!(calls_only.seen().len(), 2);
        assert_eq!(one_call.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let emitter = EffectEmitter::new();
        let recorder = Recorder::new();
        let id = emitter.subscribe(EffectSubscription::all_effects(recorder.clone()));

        assert!(emitter.unsubscribe(id));
        assert!(!emitter.unsubscribe(id));
        emitter.emit(SessionEffect::LoginEnabled { enabled: true }).await;
        assert!(recorder.seen().is_empty());
    }

    #[test]
    fn test_room_filter_requires_room_effect() {
        let room_id = ChatRoomId::new();
        let mut room_ids = HashSet::new();
        room_ids.insert(room_id);
        let filter = EffectFilter {
            room_ids: Some(room_ids),
            ..Default::default()
        };

        assert!(SessionEffect::RoomMarkedAsRead { room_id }.passes_filter(&filter));
        assert!(!SessionEffect::LoginEnabled { enabled: true }.passes_filter(&filter));
        assert_eq!(SessionEffect::RoomMarkedAsRead { room_id }.kind(), EffectKind::Message);
    }
}
