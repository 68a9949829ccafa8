//! Immutable presentation state
//!
//! A [`SessionSnapshot`] is everything a UI binding needs to render the
//! session: status strings, control enablement and the ordered chat entries
//! of the active conversation. It is plain data, serialisable to JSON, and
//! knows nothing about any UI toolkit.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::account::RegistrationState;
use crate::call::{CallDirection, CallId, CallInfo, CallState};
use crate::chat::{
    ChatRoomBackend, ChatRoomId, ChatRoomInfo, ChatRoomState, EphemeralPolicy, Participant,
};
use crate::error::AdapterResult;
use crate::events::Permission;
use crate::message::{ChatMessage, MessageDirection, MessageId, MessageState, TransferState};

/// Registration status as shown to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationView {
    pub identity: Option<String>,
    pub state: RegistrationState,
    /// Status line; the engine's message verbatim on failure
    pub text: String,
    /// Call and chat actions are available
    pub authenticated: bool,
    pub login_enabled: bool,
}

/// The current call as shown to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallView {
    pub call_id: CallId,
    pub state: CallState,
    pub direction: CallDirection,
    pub remote_uri: String,
    pub status_text: String,
    pub ringing_visible: bool,
    pub video_rendering: bool,
    pub teardown_pending: bool,
    pub duration_secs: Option<i64>,
}

impl CallView {
    pub fn from_call(call: &CallInfo, now: DateTime<Utc>) -> Self {
        Self {
            call_id: call.call_id,
            state: call.state,
            direction: call.direction,
            remote_uri: call.remote_uri.clone(),
            status_text: call
                .last_message
                .clone()
                .unwrap_or_else(|| call.state.to_string()),
            ringing_visible: call.ringing_visible,
            video_rendering: call.video_rendering,
            teardown_pending: call.teardown_pending,
            duration_secs: call.duration(now).map(|d| d.num_seconds()),
        }
    }
}

/// Which call actions are enabled
///
/// With no current call everything resets to the idle baseline: invite is
/// available (once authenticated), the rest is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CallControls {
    pub can_invite: bool,
    pub can_accept: bool,
    pub can_decline: bool,
    pub can_terminate: bool,
    pub can_pause: bool,
    pub can_resume: bool,
    pub can_toggle_video: bool,
}

impl CallControls {
    pub fn derive(authenticated: bool, call: Option<&CallInfo>) -> Self {
        let call = match call {
            None => {
                return Self {
                    can_invite: authenticated,
                    ..Default::default()
                }
            }
            Some(call) if call.teardown_pending => return Self::default(),
            Some(call) => call,
        };

        let incoming_ringing = call.direction == CallDirection::Incoming
            && matches!(
                call.state,
                CallState::IncomingReceived | CallState::IncomingEarlyMedia
            );

        Self {
            can_invite: false,
            can_accept: incoming_ringing,
            can_decline: incoming_ringing,
            can_terminate: !call.state.is_terminal(),
            can_pause: matches!(call.state, CallState::StreamsRunning | CallState::PausedByRemote),
            can_resume: call.state == CallState::Paused,
            can_toggle_video: call.state == CallState::StreamsRunning,
        }
    }
}

/// A chat room in the room list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomView {
    pub room_id: ChatRoomId,
    pub backend: ChatRoomBackend,
    pub state: ChatRoomState,
    pub subject: Option<String>,
    pub participants: Vec<Participant>,
    pub ephemeral: EphemeralPolicy,
    pub message_count: usize,
    pub queued_sends: usize,
    pub is_active: bool,
}

impl RoomView {
    pub fn from_room(room: &ChatRoomInfo, queued_sends: usize, is_active: bool) -> Self {
        Self {
            room_id: room.room_id,
            backend: room.backend,
            state: room.state,
            subject: room.subject.clone(),
            participants: room.participants.values().cloned().collect(),
            ephemeral: room.ephemeral,
            message_count: room.history.len(),
            queued_sends,
            is_active,
        }
    }
}

/// One renderable message of the active conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatEntry {
    pub message_id: MessageId,
    pub direction: MessageDirection,
    pub from: String,
    /// Rendered content parts, in order
    pub parts: Vec<String>,
    pub state: MessageState,
    pub transfer: TransferState,
    /// Countdown display; `None` when not ephemeral or not started
    pub ephemeral_remaining_secs: Option<u64>,
}

impl ChatEntry {
    pub fn from_message(message: &ChatMessage, now: DateTime<Utc>) -> Self {
        Self {
            message_id: message.message_id,
            direction: message.direction,
            from: message.from.clone(),
            parts: message.parts.iter().map(|p| p.summary()).collect(),
            state: message.state,
            transfer: message.transfer,
            ephemeral_remaining_secs: message.ephemeral_remaining(now),
        }
    }
}

/// Complete presentation state at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub registration: RegistrationView,
    pub call: Option<CallView>,
    pub controls: CallControls,
    pub is_call_active: bool,
    pub active_conversation: Option<ChatRoomId>,
    pub rooms: Vec<RoomView>,
    /// Entries of the active conversation, in arrival order
    pub entries: Vec<ChatEntry>,
    pub pending_permission: Option<Permission>,
    pub taken_at: DateTime<Utc>,
}

impl SessionSnapshot {
    /// Registration status line
    pub fn registration_text(&self) -> &str {
        &self.registration.text
    }

    pub fn entry(&self, message_id: MessageId) -> Option<&ChatEntry> {
        self.entries.iter().find(|e| e.message_id == message_id)
    }

    pub fn room(&self, room_id: ChatRoomId) -> Option<&RoomView> {
        self.rooms.iter().find(|r| r.room_id == room_id)
    }

    pub fn to_json(&self) -> AdapterResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_controls_depend_on_authentication() {
        assert!(CallControls::derive(true, None).can_invite);
        assert_eq!(CallControls::derive(false, None), CallControls::default());
    }

    #[test]
    fn test_incoming_ringing_controls() {
        let mut call = CallInfo::new(CallId::new(), CallDirection::Incoming, "sip:bob@example.org");
        call.state = CallState::IncomingReceived;
        let controls = CallControls::derive(true, Some(&call));
        assert!(controls.can_accept && controls.can_decline && controls.can_terminate);
        assert!(!controls.can_invite && !controls.can_pause);

        call.teardown_pending = true;
        assert_eq!(CallControls::derive(true, Some(&call)), CallControls::default());
    }

    #[test]
    fn test_call_view_prefers_engine_message() {
        let mut call = CallInfo::new(CallId::new(), CallDirection::Outgoing, "sip:bob@example.org");
        call.state = CallState::OutgoingRinging;
        assert_eq!(CallView::from_call(&call, Utc::now()).status_text, "OutgoingRinging");

        call.last_message = Some("Remote ringing".to_string());
        assert_eq!(CallView::from_call(&call, Utc::now()).status_text, "Remote ringing");
    }
}
