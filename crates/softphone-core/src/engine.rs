//! Outbound interface to the SIP engine
//!
//! Every method is fire-and-forget. Create-style calls hand back the new
//! entity's handle immediately; the outcome always arrives later as a
//! notification. The adapter never waits for the engine.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::account::{AccountConfig, AccountId};
use crate::call::{CallId, MediaParams};
use crate::chat::{ChatRoomId, ChatRoomParams, EphemeralPolicy};
use crate::events::Permission;
use crate::message::{ContentPart, MessageId};

/// Reason given to the engine when declining a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclineReason {
    /// User refused the call
    Declined,
    /// Another call is already tracked
    Busy,
}

/// Requests the adapter sends to the engine
pub trait SessionEngine: Send {
    // Registration
    fn register(&mut self, account: &AccountConfig) -> AccountId;
    fn unregister(&mut self, account_id: AccountId);

    // Calls
    fn invite(&mut self, remote_uri: &str, params: MediaParams) -> CallId;
    fn accept(&mut self, call_id: CallId, params: MediaParams);
    fn decline(&mut self, call_id: CallId, reason: DeclineReason);
    fn terminate(&mut self, call_id: CallId);
    fn pause(&mut self, call_id: CallId);
    fn resume(&mut self, call_id: CallId);
    /// Renegotiate media, e.g. to toggle video
    fn update(&mut self, call_id: CallId, params: MediaParams);

    // Chat rooms
    fn create_chat_room(&mut self, params: &ChatRoomParams) -> ChatRoomId;
    fn add_participant(&mut self, room_id: ChatRoomId, address: &str);
    fn remove_participant(&mut self, room_id: ChatRoomId, address: &str);
    fn set_participant_admin(&mut self, room_id: ChatRoomId, address: &str, is_admin: bool);
    fn set_ephemeral(&mut self, room_id: ChatRoomId, policy: EphemeralPolicy);

    // Messages
    fn create_message(&mut self, room_id: ChatRoomId, parts: &[ContentPart]) -> MessageId;
    fn send_message(&mut self, room_id: ChatRoomId, message_id: MessageId);
    fn mark_as_read(&mut self, room_id: ChatRoomId);
    fn download_content(&mut self, message_id: MessageId);

    // Platform
    fn request_permission(&mut self, permission: Permission);
}

/// One recorded engine request
#[derive(Debug, Clone, PartialEq)]
pub enum EngineRequest {
    Register { account_id: AccountId, identity: String },
    Unregister { account_id: AccountId },
    Invite { call_id: CallId, remote_uri: String, params: MediaParams },
    Accept { call_id: CallId, params: MediaParams },
    Decline { call_id: CallId, reason: DeclineReason },
    Terminate { call_id: CallId },
    Pause { call_id: CallId },
    Resume { call_id: CallId },
    Update { call_id: CallId, params: MediaParams },
    CreateChatRoom { room_id: ChatRoomId, params: ChatRoomParams },
    AddParticipant { room_id: ChatRoomId, address: String },
    RemoveParticipant { room_id: ChatRoomId, address: String },
    SetParticipantAdmin { room_id: ChatRoomId, address: String, is_admin: bool },
    SetEphemeral { room_id: ChatRoomId, policy: EphemeralPolicy },
    CreateMessage { room_id: ChatRoomId, message_id: MessageId, parts: Vec<ContentPart> },
    SendMessage { room_id: ChatRoomId, message_id: MessageId },
    MarkAsRead { room_id: ChatRoomId },
    DownloadContent { message_id: MessageId },
    RequestPermission { permission: Permission },
}

/// In-memory engine that records every request
///
/// Clones share the same log, so a test can keep one clone and hand the other
/// to the adapter.
#[derive(Debug, Clone, Default)]
pub struct RecordingEngine {
    requests: Arc<Mutex<Vec<EngineRequest>>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything requested so far, in order
    pub fn requests(&self) -> Vec<EngineRequest> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Handle of the most recently registered account
    pub fn last_registered_account(&self) -> Option<AccountId> {
        self.lock().iter().rev().find_map(|r| match r {
            EngineRequest::Register { account_id, .. } => Some(*account_id),
            _ => None,
        })
    }

    /// Handle of the most recently invited call
    pub fn last_invited_call(&self) -> Option<CallId> {
        self.lock().iter().rev().find_map(|r| match r {
            EngineRequest::Invite { call_id, .. } => Some(*call_id),
            _ => None,
        })
    }

    /// Handle of the most recently created chat room
    pub fn last_created_room(&self) -> Option<ChatRoomId> {
        self.lock().iter().rev().find_map(|r| match r {
            EngineRequest::CreateChatRoom { room_id, .. } => Some(*room_id),
            _ => None,
        })
    }

    /// Messages handed to `send_message`, in order
    pub fn sent_messages(&self) -> Vec<MessageId> {
        self.lock()
            .iter()
            .filter_map(|r| match r {
                EngineRequest::SendMessage { message_id, .. } => Some(*message_id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, request: EngineRequest) {
        tracing::trace!(?request, "engine request");
        self.lock().push(request);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<EngineRequest>> {
        self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionEngine for RecordingEngine {
    fn register(&mut self, account: &AccountConfig) -> AccountId {
        let account_id = AccountId::new();
        self.record(EngineRequest::Register {
            account_id,
            identity: account.identity.clone(),
        });
        account_id
    }

    fn unregister(&mut self, account_id: AccountId) {
        self.record(EngineRequest::Unregister { account_id });
    }

    fn invite(&mut self, remote_uri: &str, params: MediaParams) -> CallId {
        let call_id = CallId::new();
        self.record(EngineRequest::Invite {
            call_id,
            remote_uri: remote_uri.to_string(),
            params,
        });
        call_id
    }

    fn accept(&mut self, call_id: CallId, params: MediaParams) {
        self.record(EngineRequest::Accept { call_id, params });
    }

    fn decline(&mut self, call_id: CallId, reason: DeclineReason) {
        self.record(EngineRequest::Decline { call_id, reason });
    }

    fn terminate(&mut self, call_id: CallId) {
        self.record(EngineRequest::Terminate { call_id });
    }

    fn pause(&mut self, call_id: CallId) {
        self.record(EngineRequest::Pause { call_id });
    }

    fn resume(&mut self, call_id: CallId) {
        self.record(EngineRequest::Resume { call_id });
    }

    fn update(&mut self, call_id: CallId, params: MediaParams) {
        self.record(EngineRequest::Update { call_id, params });
    }

    fn create_chat_room(&mut self, params: &ChatRoomParams) -> ChatRoomId {
        let room_id = ChatRoomId::new();
        self.record(EngineRequest::CreateChatRoom {
            room_id,
            params: params.clone(),
        });
        room_id
    }

    fn add_participant(&mut self, room_id: ChatRoomId, address: &str) {
        self.record(EngineRequest::AddParticipant {
            room_id,
            address: address.to_string(),
        });
    }

    fn remove_participant(&mut self, room_id: ChatRoomId, address: &str) {
        self.record(EngineRequest::RemoveParticipant {
            room_id,
            address: address.to_string(),
        });
    }

    fn set_participant_admin(&mut self, room_id: ChatRoomId, address: &str, is_admin: bool) {
        self.record(EngineRequest::SetParticipantAdmin {
            room_id,
            address: address.to_string(),
            is_admin,
        });
    }

    fn set_ephemeral(&mut self, room_id: ChatRoomId, policy: EphemeralPolicy) {
        self.record(EngineRequest::SetEphemeral { room_id, policy });
    }

    fn create_message(&mut self, room_id: ChatRoomId, parts: &[ContentPart]) -> MessageId {
        let message_id = MessageId::new();
        self.record(EngineRequest::CreateMessage {
            room_id,
            message_id,
            parts: parts.to_vec(),
        });
        message_id
    }

    fn send_message(&mut self, room_id: ChatRoomId, message_id: MessageId) {
        self.record(EngineRequest::SendMessage { room_id, message_id });
    }

    fn mark_as_read(&mut self, room_id: ChatRoomId) {
        self.record(EngineRequest::MarkAsRead { room_id });
    }

    fn download_content(&mut self, message_id: MessageId) {
        self.record(EngineRequest::DownloadContent { message_id });
    }

    fn request_permission(&mut self, permission: Permission) {
        self.record(EngineRequest::RequestPermission { permission });
    }
}
