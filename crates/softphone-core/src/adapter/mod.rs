//! Session event adapter
//!
//! [`SessionAdapter`] reduces engine notifications into local session state
//! and [`SessionEffect`]s. It is a plain `&mut self` reducer: it never blocks,
//! never retries, and must only ever be driven from one task (see
//! [`crate::context::SessionContext`]).
//!
//! # Module layout
//!
//! - **`registration`** - login/logout and registration notifications
//! - **`calls`** - call requests, call notifications, permission gating
//! - **`chat`** - chat room requests, room notifications, send queueing
//! - **`messages`** - message notifications, file transfer, ephemeral timers
//! - **`config`** - [`AdapterConfig`] and its policies
//! - **`builder`** - [`AdapterBuilder`]
//!
//! # Idempotence
//!
//! Every handler compares the notification against what is already tracked.
//! A duplicate, a stale notification or one that would move a state backwards
//! is logged and counted in [`AdapterStats::notifications_ignored`] without
//! producing effects.
//!
//! ```rust
//! use softphone_core::{
//!     AccountConfig, AdapterBuilder, RecordingEngine, RegistrationEvent, RegistrationState,
//!     SessionEffect,
//! };
//!
//! let engine = RecordingEngine::new();
//! let mut adapter = AdapterBuilder::new().build(engine.clone()).unwrap();
//!
//! adapter.login(AccountConfig::new("sip:alice@example.org")).unwrap();
//! let account = engine.last_registered_account().unwrap();
//!
//! adapter.apply(RegistrationEvent::new(account, RegistrationState::Ok).into());
//! adapter.apply(RegistrationEvent::new(account, RegistrationState::Ok).into());
//!
//! let panels = adapter
//!     .take_effects()
//!     .into_iter()
//!     .filter(|e| matches!(e, SessionEffect::AuthenticatedPanel { visible: true }))
//!     .count();
//! assert_eq!(panels, 1);
//! ```

mod builder;
mod calls;
mod chat;
mod config;
mod messages;
mod registration;

pub use builder::AdapterBuilder;
pub use calls::PendingAction;
pub use chat::SendOutcome;
pub use config::{AdapterConfig, SecondCallPolicy, SendPolicy};

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::account::{AccountConfig, AccountInfo, RegistrationState};
use crate::call::{CallId, CallInfo, CallState};
use crate::chat::{ChatRoomId, ChatRoomInfo, ChatRoomParams, EphemeralPolicy};
use crate::effects::SessionEffect;
use crate::engine::SessionEngine;
use crate::error::AdapterResult;
use crate::events::{EngineEvent, Permission};
use crate::message::{ChatMessage, ContentPart, MessageId};
use crate::snapshot::{
    CallControls, CallView, ChatEntry, RegistrationView, RoomView, SessionSnapshot,
};

/// A request from the user interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum UserRequest {
    Login(AccountConfig),
    Logout,
    Invite { remote_uri: String, video: bool },
    AcceptCall,
    DeclineCall,
    TerminateCall,
    PauseCall,
    ResumeCall,
    SetVideoEnabled { enabled: bool },
    CreateChatRoom(ChatRoomParams),
    SetActiveConversation { room_id: ChatRoomId },
    AddParticipant { room_id: ChatRoomId, address: String },
    RemoveParticipant { room_id: ChatRoomId, address: String },
    SetParticipantAdmin { room_id: ChatRoomId, address: String, is_admin: bool },
    SetEphemeral { room_id: ChatRoomId, policy: EphemeralPolicy },
    SendMessage { room_id: ChatRoomId, parts: Vec<ContentPart> },
    DownloadContent { message_id: MessageId },
}

/// Counters kept by the adapter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdapterStats {
    pub notifications_applied: u64,
    pub notifications_ignored: u64,
    pub requests_rejected: u64,
    /// Times the current call was torn down and its pointer cleared
    pub call_teardowns: u64,
    pub second_calls_declined: u64,
    pub messages_appended: u64,
    pub messages_removed: u64,
    pub sends_queued: u64,
    pub sends_rejected: u64,
}

/// Finished ids remembered for recognising late notifications
pub(crate) const RECENT_ID_CAPACITY: usize = 256;

/// Bounded set of recently finished ids; the oldest is forgotten first
#[derive(Debug)]
pub(crate) struct RecentIds<T> {
    order: VecDeque<T>,
    members: HashSet<T>,
    capacity: usize,
}

impl<T: Copy + Eq + Hash> RecentIds<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    pub fn insert(&mut self, id: T) {
        if !self.members.insert(id) {
            return;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.order.push_back(id);
    }

    pub fn contains(&self, id: &T) -> bool {
        self.members.contains(id)
    }
}

/// A send held until its room is created
#[derive(Debug, Clone)]
pub(crate) struct QueuedSend {
    pub parts: Vec<ContentPart>,
    pub queued_at: DateTime<Utc>,
}

/// The session reducer
pub struct SessionAdapter {
    pub(crate) config: AdapterConfig,
    pub(crate) engine: Box<dyn SessionEngine>,

    // Registration
    pub(crate) account: Option<AccountInfo>,
    pub(crate) authenticated: bool,
    pub(crate) login_enabled: bool,
    pub(crate) registration_text: String,

    // Calls
    pub(crate) current_call: Option<CallInfo>,
    /// Calls that are not (or no longer) the current call, with their last state
    pub(crate) untracked_calls: HashMap<CallId, CallState>,
    pub(crate) released_calls: RecentIds<CallId>,
    pub(crate) call_history: Vec<CallInfo>,

    // Permissions
    pub(crate) granted_permissions: HashSet<Permission>,
    pub(crate) pending_action: Option<(Permission, PendingAction)>,

    // Chat
    pub(crate) rooms: HashMap<ChatRoomId, ChatRoomInfo>,
    pub(crate) room_order: Vec<ChatRoomId>,
    pub(crate) outboxes: HashMap<ChatRoomId, VecDeque<QueuedSend>>,
    pub(crate) messages: HashMap<MessageId, ChatMessage>,
    pub(crate) removed_messages: RecentIds<MessageId>,
    pub(crate) active_conversation: Option<ChatRoomId>,
    /// Rooms that were ever the active conversation
    pub(crate) bound_rooms: HashSet<ChatRoomId>,

    pub(crate) effects: Vec<SessionEffect>,
    pub(crate) stats: AdapterStats,
}

impl std::fmt::Debug for SessionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAdapter")
            .field("config", &self.config)
            .field("account", &self.account)
            .field("current_call", &self.current_call)
            .field("rooms", &self.rooms.len())
            .field("messages", &self.messages.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl SessionAdapter {
    /// Create an adapter over an engine
    pub fn new(config: AdapterConfig, engine: Box<dyn SessionEngine>) -> AdapterResult<Self> {
        config.validate()?;
        let granted_permissions = config.granted_permissions.iter().copied().collect();
        Ok(Self {
            config,
            engine,
            account: None,
            authenticated: false,
            login_enabled: true,
            registration_text: RegistrationState::None.to_string(),
            current_call: None,
            untracked_calls: HashMap::new(),
            released_calls: RecentIds::new(RECENT_ID_CAPACITY),
            call_history: Vec::new(),
            granted_permissions,
            pending_action: None,
            rooms: HashMap::new(),
            room_order: Vec::new(),
            outboxes: HashMap::new(),
            messages: HashMap::new(),
            removed_messages: RecentIds::new(RECENT_ID_CAPACITY),
            active_conversation: None,
            bound_rooms: HashSet::new(),
            effects: Vec::new(),
            stats: AdapterStats::default(),
        })
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn stats(&self) -> AdapterStats {
        self.stats
    }

    /// Apply one engine notification
    pub fn apply(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Registration(event) => self.on_registration_state_changed(event),
            EngineEvent::Call(event) => self.on_call_state_changed(event),
            EngineEvent::ChatRoom(event) => self.on_chat_room_event(event),
            EngineEvent::Message(event) => self.on_message_event(event),
            EngineEvent::Permission(event) => self.on_permission_result(event),
        }
    }

    /// Dispatch a user request to the matching operation
    pub fn handle_request(&mut self, request: UserRequest) -> AdapterResult<()> {
        match request {
            UserRequest::Login(config) => self.login(config),
            UserRequest::Logout => self.logout(),
            UserRequest::Invite { remote_uri, video } => self.invite(&remote_uri, video),
            UserRequest::AcceptCall => self.accept_call(),
            UserRequest::DeclineCall => self.decline_call(),
            UserRequest::TerminateCall => self.terminate_call(),
            UserRequest::PauseCall => self.pause_call(),
            UserRequest::ResumeCall => self.resume_call(),
            UserRequest::SetVideoEnabled { enabled } => self.set_video_enabled(enabled),
            UserRequest::CreateChatRoom(params) => self.create_chat_room(params).map(|_| ()),
            UserRequest::SetActiveConversation { room_id } => self.set_active_conversation(room_id),
            UserRequest::AddParticipant { room_id, address } => {
                self.add_participant(room_id, &address)
            }
            UserRequest::RemoveParticipant { room_id, address } => {
                self.remove_participant(room_id, &address)
            }
            UserRequest::SetParticipantAdmin {
                room_id,
                address,
                is_admin,
            } => self.set_participant_admin(room_id, &address, is_admin),
            UserRequest::SetEphemeral { room_id, policy } => self.set_ephemeral(room_id, policy),
            UserRequest::SendMessage { room_id, parts } => {
                self.send_message(room_id, parts).map(|_| ())
            }
            UserRequest::DownloadContent { message_id } => self.download_content(message_id),
        }
    }

    /// Drain the effects produced since the last call, in order
    pub fn take_effects(&mut self) -> Vec<SessionEffect> {
        std::mem::take(&mut self.effects)
    }

    /// Effects produced since the last drain
    pub fn pending_effects(&self) -> &[SessionEffect] {
        &self.effects
    }

    pub fn current_call(&self) -> Option<&CallInfo> {
        self.current_call.as_ref()
    }

    /// Calls that have ended, oldest first
    pub fn call_history(&self) -> &[CallInfo] {
        &self.call_history
    }

    pub fn account(&self) -> Option<&AccountInfo> {
        self.account.as_ref()
    }

    pub fn chat_room(&self, room_id: ChatRoomId) -> Option<&ChatRoomInfo> {
        self.rooms.get(&room_id)
    }

    pub fn message(&self, message_id: MessageId) -> Option<&ChatMessage> {
        self.messages.get(&message_id)
    }

    pub fn active_conversation(&self) -> Option<ChatRoomId> {
        self.active_conversation
    }

    /// Number of sends waiting for a room to be created
    pub fn queued_sends(&self, room_id: ChatRoomId) -> usize {
        self.outboxes.get(&room_id).map_or(0, VecDeque::len)
    }

    /// Some ephemeral countdown is still ticking down
    pub fn has_running_countdown(&self) -> bool {
        let now = Utc::now();
        self.messages
            .values()
            .any(|m| m.ephemeral_remaining(now).is_some_and(|secs| secs > 0))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_at(Utc::now())
    }

    /// Presentation state with time-derived fields computed at `now`
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> SessionSnapshot {
        let registration = RegistrationView {
            identity: self.account.as_ref().map(|a| a.config.identity.clone()),
            state: self
                .account
                .as_ref()
                .map_or(RegistrationState::None, |a| a.state),
            text: self.registration_text.clone(),
            authenticated: self.authenticated,
            login_enabled: self.login_enabled,
        };

        let rooms = self
            .room_order
            .iter()
            .filter_map(|id| self.rooms.get(id))
            .map(|room| {
                RoomView::from_room(
                    room,
                    self.queued_sends(room.room_id),
                    self.active_conversation == Some(room.room_id),
                )
            })
            .collect();

        let entries = self
            .active_conversation
            .and_then(|id| self.rooms.get(&id))
            .map(|room| {
                room.history
                    .iter()
                    .filter_map(|id| self.messages.get(id))
                    .map(|m| ChatEntry::from_message(m, now))
                    .collect()
            })
            .unwrap_or_default();

        SessionSnapshot {
            registration,
            call: self.current_call.as_ref().map(|c| CallView::from_call(c, now)),
            controls: CallControls::derive(self.authenticated, self.current_call.as_ref()),
            is_call_active: self.current_call.is_some(),
            active_conversation: self.active_conversation,
            rooms,
            entries,
            pending_permission: self.pending_action.as_ref().map(|(p, _)| *p),
            taken_at: now,
        }
    }

    pub(crate) fn emit(&mut self, effect: SessionEffect) {
        debug!(?effect, "effect");
        self.effects.push(effect);
    }

    pub(crate) fn applied(&mut self) {
        self.stats.notifications_applied += 1;
    }

    pub(crate) fn ignored(&mut self) {
        self.stats.notifications_ignored += 1;
    }

    /// Run a request and log its rejection
    ///
    /// Contract violations are logged at warn and never produce an effect.
    pub(crate) fn guarded<T>(
        &mut self,
        operation: &'static str,
        request: impl FnOnce(&mut Self) -> AdapterResult<T>,
    ) -> AdapterResult<T> {
        let result = request(self);
        if let Err(e) = &result {
            self.stats.requests_rejected += 1;
            if e.is_contract_violation() {
                warn!(operation, category = e.category(), "request rejected: {}", e);
            } else if e.is_send_rejection() {
                info!(operation, category = e.category(), "send rejected: {}", e);
            } else {
                debug!(operation, category = e.category(), "request failed: {}", e);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RecordingEngine;

    #[test]
    fn test_fresh_adapter_snapshot() {
        let engine = Box::new(RecordingEngine::new());
        let adapter = SessionAdapter::new(AdapterConfig::default(), engine).unwrap();
        let snapshot = adapter.snapshot();
        assert!(snapshot.registration.login_enabled);
        assert!(!snapshot.registration.authenticated);
        assert_eq!(snapshot.registration_text(), "Not registered");
        assert!(!snapshot.is_call_active);
        assert_eq!(snapshot.controls, CallControls::default());
        assert!(snapshot.entries.is_empty());
    }

    #[test]
    fn test_recent_ids_forget_the_oldest() {
        let mut recent = RecentIds::new(2);
        recent.insert(1);
        recent.insert(2);
        recent.insert(2);
        assert!(recent.contains(&1));
        recent.insert(3);
        assert!(!recent.contains(&1));
        assert!(recent.contains(&2));
        assert!(recent.contains(&3));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = AdapterConfig::default().with_iterate_interval_ms(0);
        assert!(SessionAdapter::new(config, Box::new(RecordingEngine::new())).is_err());
    }

    #[test]
    fn test_requests_decode_from_json() {
        let json = r#"{"request":"invite","remote_uri":"sip:bob@example.org","video":true}"#;
        let request: UserRequest = serde_json::from_str(json).unwrap();
        assert_eq!(
            request,
            UserRequest::Invite {
                remote_uri: "sip:bob@example.org".to_string(),
                video: true
            }
        );
    }
}
