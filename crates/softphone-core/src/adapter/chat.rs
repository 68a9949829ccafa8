//! Chat room operations and room notifications
//!
//! Sends against a server-backed room that is not created yet follow the
//! configured [`SendPolicy`]: they are queued and flushed in order once the
//! room reaches `Created`, or rejected on the spot. A queued send is never
//! dropped silently; if the room fails instead, each one is rejected with a
//! `SendRejected` effect.

use std::collections::VecDeque;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::account::validate_sip_uri;
use crate::chat::{
    ChatRoomBackend, ChatRoomDescriptor, ChatRoomId, ChatRoomInfo, ChatRoomParams, ChatRoomState,
    EphemeralPolicy, Participant,
};
use crate::effects::SessionEffect;
use crate::error::{AdapterError, AdapterResult};
use crate::events::ChatRoomEvent;
use crate::message::{ChatMessage, ContentPart, MessageId};

use super::config::SendPolicy;
use super::QueuedSend;

/// What became of a send request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendOutcome {
    /// Handed to the engine
    Sent(MessageId),
    /// Held until the room is created; 1-based position in the room's queue
    Queued { position: usize },
}

/// Chat room operations implementation for SessionAdapter
impl super::SessionAdapter {
    /// Create a chat room and make it the active conversation
    ///
    /// Returns the engine handle right away. A `FlexisipChat` room only
    /// accepts messages once the engine reports it `Created`.
    pub fn create_chat_room(&mut self, params: ChatRoomParams) -> AdapterResult<ChatRoomId> {
        self.guarded("create_chat_room", |this| {
            if !this.authenticated {
                return Err(AdapterError::NoAccount);
            }
            if params.participants.is_empty() {
                return Err(AdapterError::invalid_configuration(
                    "participants",
                    "at least one participant is required",
                ));
            }
            for address in &params.participants {
                validate_sip_uri(address)?;
            }
            if params.backend == ChatRoomBackend::Basic
                && (params.capabilities.group
                    || params.capabilities.encrypted
                    || params.participants.len() > 1)
            {
                return Err(AdapterError::invalid_configuration(
                    "backend",
                    "basic rooms are unencrypted one-to-one rooms",
                ));
            }

            let room_id = this.engine.create_chat_room(&params);
            info!(
                room_id = %room_id,
                backend = ?params.backend,
                participants = params.participants.len(),
                "Creating chat room"
            );
            this.track_room(ChatRoomInfo::from_params(room_id, &params));
            this.bind_active_conversation(room_id);
            Ok(room_id)
        })
    }

    /// Make a known room the active conversation
    pub fn set_active_conversation(&mut self, room_id: ChatRoomId) -> AdapterResult<()> {
        self.guarded("set_active_conversation", |this| {
            if !this.rooms.contains_key(&room_id) {
                return Err(AdapterError::ChatRoomNotFound { room_id });
            }
            this.bind_active_conversation(room_id);
            Ok(())
        })
    }

    /// Send a message, or queue it until the room is created
    pub fn send_message(
        &mut self,
        room_id: ChatRoomId,
        parts: Vec<ContentPart>,
    ) -> AdapterResult<SendOutcome> {
        self.guarded("send_message", |this| {
            let room = this
                .rooms
                .get(&room_id)
                .ok_or(AdapterError::ChatRoomNotFound { room_id })?;
            let state = room.state;
            let ready = room.accepts_messages();

            let empty = parts.is_empty()
                || parts
                    .iter()
                    .all(|p| matches!(p, ContentPart::Text { body } if body.trim().is_empty()));
            if empty {
                return Err(this.reject_send(room_id, AdapterError::EmptyMessage));
            }

            if state.is_unusable() || state == ChatRoomState::TerminationPending {
                let error = AdapterError::ChatRoomUnavailable { room_id, state };
                return Err(this.reject_send(room_id, error));
            }

            if ready {
                let message_id = this.dispatch_message(room_id, parts);
                return Ok(SendOutcome::Sent(message_id));
            }

            match this.config.send_policy {
                SendPolicy::Reject => {
                    let error = AdapterError::ChatRoomNotReady { room_id, state };
                    Err(this.reject_send(room_id, error))
                }
                SendPolicy::Queue => {
                    let limit = this.config.max_queued_sends;
                    let outbox = this.outboxes.entry(room_id).or_default();
                    if outbox.len() >= limit {
                        let error = AdapterError::SendQueueFull { room_id, limit };
                        return Err(this.reject_send(room_id, error));
                    }
                    outbox.push_back(QueuedSend {
                        parts,
                        queued_at: Utc::now(),
                    });
                    let position = outbox.len();
                    info!(
                        room_id = %room_id,
                        ?state,
                        position,
                        "Queued send until the room is created"
                    );
                    this.stats.sends_queued += 1;
                    this.emit(SessionEffect::SendQueued { room_id, position });
                    Ok(SendOutcome::Queued { position })
                }
            }
        })
    }

    /// Invite a participant into a group room
    pub fn add_participant(&mut self, room_id: ChatRoomId, address: &str) -> AdapterResult<()> {
        self.guarded("add_participant", |this| {
            validate_sip_uri(address)?;
            this.group_room(room_id, "add_participant")?;
            info!(room_id = %room_id, address, "Adding participant");
            this.engine.add_participant(room_id, address);
            Ok(())
        })
    }

    /// Remove a participant from a group room
    pub fn remove_participant(&mut self, room_id: ChatRoomId, address: &str) -> AdapterResult<()> {
        self.guarded("remove_participant", |this| {
            let room = this.group_room(room_id, "remove_participant")?;
            if !room.participants.contains_key(address) {
                return Err(AdapterError::ParticipantNotFound {
                    room_id,
                    address: address.to_string(),
                });
            }
            info!(room_id = %room_id, address, "Removing participant");
            this.engine.remove_participant(room_id, address);
            Ok(())
        })
    }

    /// Grant or revoke admin status of a participant
    pub fn set_participant_admin(
        &mut self,
        room_id: ChatRoomId,
        address: &str,
        is_admin: bool,
    ) -> AdapterResult<()> {
        self.guarded("set_participant_admin", |this| {
            let room = this.group_room(room_id, "set_participant_admin")?;
            if !room.participants.contains_key(address) {
                return Err(AdapterError::ParticipantNotFound {
                    room_id,
                    address: address.to_string(),
                });
            }
            info!(room_id = %room_id, address, is_admin, "Setting participant admin status");
            this.engine.set_participant_admin(room_id, address, is_admin);
            Ok(())
        })
    }

    /// Change the ephemeral message policy of a server-backed room
    pub fn set_ephemeral(
        &mut self,
        room_id: ChatRoomId,
        policy: EphemeralPolicy,
    ) -> AdapterResult<()> {
        self.guarded("set_ephemeral", |this| {
            this.conference_room(room_id, "set_ephemeral")?;
            if policy.enabled && policy.lifetime_secs == 0 {
                return Err(AdapterError::invalid_configuration(
                    "lifetime_secs",
                    "an enabled ephemeral policy needs a lifetime",
                ));
            }
            info!(room_id = %room_id, ?policy, "Setting ephemeral policy");
            this.engine.set_ephemeral(room_id, policy);
            Ok(())
        })
    }

    /// Apply a chat room notification
    pub fn on_chat_room_event(&mut self, event: ChatRoomEvent) {
        match event {
            ChatRoomEvent::StateChanged { room, state } => {
                self.on_chat_room_state_changed(room, state)
            }
            ChatRoomEvent::SubjectChanged { room_id, subject } => {
                self.update_room(room_id, |room| {
                    if room.subject.as_deref() == Some(subject.as_str()) {
                        return false;
                    }
                    room.subject = Some(subject);
                    true
                })
            }
            ChatRoomEvent::ParticipantAdded { room_id, address } => {
                self.update_room(room_id, |room| {
                    if room.participants.contains_key(&address) {
                        return false;
                    }
                    room.participants.insert(
                        address.clone(),
                        Participant {
                            address,
                            is_admin: false,
                        },
                    );
                    true
                })
            }
            ChatRoomEvent::ParticipantRemoved { room_id, address } => {
                self.update_room(room_id, |room| room.participants.remove(&address).is_some())
            }
            ChatRoomEvent::ParticipantAdminChanged {
                room_id,
                address,
                is_admin,
            } => self.update_room(room_id, |room| match room.participants.get_mut(&address) {
                Some(participant) if participant.is_admin != is_admin => {
                    participant.is_admin = is_admin;
                    true
                }
                _ => false,
            }),
            ChatRoomEvent::EphemeralPolicyChanged { room_id, policy } => {
                self.update_room(room_id, |room| {
                    if room.ephemeral == policy {
                        return false;
                    }
                    room.ephemeral = policy;
                    true
                })
            }
        }
    }

    /// Apply a room state notification
    pub fn on_chat_room_state_changed(
        &mut self,
        descriptor: ChatRoomDescriptor,
        state: ChatRoomState,
    ) {
        let room_id = descriptor.room_id;
        if state == ChatRoomState::Unknown {
            warn!(room_id = %room_id, "Ignoring unknown chat room state");
            self.ignored();
            return;
        }

        if !self.rooms.contains_key(&room_id) {
            let mut room = ChatRoomInfo::from_descriptor(&descriptor);
            room.state = ChatRoomState::None;
            info!(
                room_id = %room_id,
                backend = ?descriptor.backend,
                "Tracking chat room from notification"
            );
            self.track_room(room);
        }
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };

        if room.state == state {
            debug!(room_id = %room_id, ?state, "Duplicate chat room notification");
            self.ignored();
            return;
        }
        if !room.state.can_transition_to(state) {
            warn!(
                room_id = %room_id,
                current = ?room.state,
                ?state,
                "Out-of-order chat room notification"
            );
            self.ignored();
            return;
        }

        info!(room_id = %room_id, previous = ?room.state, ?state, "Chat room state changed");
        room.state = state;
        self.applied();
        self.emit(SessionEffect::ChatRoomStatus { room_id, state });

        match state {
            ChatRoomState::Created => self.flush_outbox(room_id),
            ChatRoomState::CreationFailed | ChatRoomState::Terminated | ChatRoomState::Deleted => {
                self.reject_outbox(room_id, state)
            }
            _ => {}
        }
        if state == ChatRoomState::Deleted && self.active_conversation == Some(room_id) {
            self.active_conversation = None;
        }
    }

    /// Create and send a message through the engine and append it
    pub(crate) fn dispatch_message(
        &mut self,
        room_id: ChatRoomId,
        parts: Vec<ContentPart>,
    ) -> MessageId {
        let message_id = self.engine.create_message(room_id, &parts);
        let from = self
            .account
            .as_ref()
            .map(|a| a.config.identity.clone())
            .unwrap_or_default();
        let mut message = ChatMessage::outgoing(message_id, room_id, from, parts);

        if let Some(room) = self.rooms.get_mut(&room_id) {
            message.ephemeral_lifetime = room.ephemeral.lifetime();
            room.history.push(message_id);
        }
        self.engine.send_message(room_id, message_id);
        debug!(room_id = %room_id, message_id = %message_id, "Message sent");

        self.messages.insert(message_id, message);
        self.stats.messages_appended += 1;
        self.emit(SessionEffect::MessageAppended { room_id, message_id });
        message_id
    }

    pub(crate) fn track_room(&mut self, room: ChatRoomInfo) {
        let room_id = room.room_id;
        if self.rooms.insert(room_id, room).is_none() {
            self.room_order.push(room_id);
        }
    }

    pub(crate) fn bind_active_conversation(&mut self, room_id: ChatRoomId) {
        self.bound_rooms.insert(room_id);
        if self.active_conversation != Some(room_id) {
            info!(room_id = %room_id, "Active conversation changed");
            self.active_conversation = Some(room_id);
            self.emit(SessionEffect::ActiveConversationBound { room_id });
        }
    }

    fn flush_outbox(&mut self, room_id: ChatRoomId) {
        let queued = self.outboxes.remove(&room_id).unwrap_or_default();
        if queued.is_empty() {
            return;
        }
        let flushed = queued.len();
        for send in queued {
            let waited = Utc::now() - send.queued_at;
            debug!(
                room_id = %room_id,
                waited_ms = waited.num_milliseconds(),
                "Flushing queued send"
            );
            self.dispatch_message(room_id, send.parts);
        }
        info!(room_id = %room_id, flushed, "Chat room created, queued sends flushed");
        self.emit(SessionEffect::SendUnblocked { room_id, flushed });
    }

    fn reject_outbox(&mut self, room_id: ChatRoomId, state: ChatRoomState) {
        let queued: VecDeque<QueuedSend> = self.outboxes.remove(&room_id).unwrap_or_default();
        if queued.is_empty() {
            return;
        }
        warn!(room_id = %room_id, ?state, rejected = queued.len(), "Rejecting queued sends");
        for _ in queued {
            let reason = AdapterError::ChatRoomUnavailable { room_id, state }.to_string();
            self.stats.sends_rejected += 1;
            self.emit(SessionEffect::SendRejected { room_id, reason });
        }
    }

    fn reject_send(&mut self, room_id: ChatRoomId, error: AdapterError) -> AdapterError {
        self.stats.sends_rejected += 1;
        self.emit(SessionEffect::SendRejected {
            room_id,
            reason: error.to_string(),
        });
        error
    }

    fn update_room(&mut self, room_id: ChatRoomId, update: impl FnOnce(&mut ChatRoomInfo) -> bool) {
        let Some(room) = self.rooms.get_mut(&room_id) else {
            debug!(room_id = %room_id, "Notification for an unknown chat room");
            self.ignored();
            return;
        };
        if update(room) {
            info!(room_id = %room_id, "Chat room updated");
            self.applied();
            self.emit(SessionEffect::ChatRoomUpdated { room_id });
        } else {
            debug!(room_id = %room_id, "Chat room notification changed nothing");
            self.ignored();
        }
    }

    /// A created server-backed room
    fn conference_room(
        &self,
        room_id: ChatRoomId,
        operation: &str,
    ) -> AdapterResult<&ChatRoomInfo> {
        let room = self
            .rooms
            .get(&room_id)
            .ok_or(AdapterError::ChatRoomNotFound { room_id })?;
        if room.backend == ChatRoomBackend::Basic {
            return Err(AdapterError::unsupported(room_id, operation));
        }
        if !room.state.is_live() {
            return Err(AdapterError::ChatRoomNotReady {
                room_id,
                state: room.state,
            });
        }
        Ok(room)
    }

    /// A created server-backed group room
    fn group_room(&self, room_id: ChatRoomId, operation: &str) -> AdapterResult<&ChatRoomInfo> {
        let room = self.conference_room(room_id, operation)?;
        if !room.is_group() {
            return Err(AdapterError::unsupported(room_id, operation));
        }
        Ok(room)
    }
}
