//! Message notifications, file transfer and ephemeral timers

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::chat::{ChatRoomDescriptor, ChatRoomInfo};
use crate::effects::SessionEffect;
use crate::error::{AdapterError, AdapterResult};
use crate::events::MessageEvent;
use crate::message::{
    ChatMessage, MessageDescriptor, MessageDirection, MessageId, MessageState, TransferState,
};

/// Message operations implementation for SessionAdapter
impl super::SessionAdapter {
    /// Ask the engine to download the file attached to a message
    pub fn download_content(&mut self, message_id: MessageId) -> AdapterResult<()> {
        self.guarded("download_content", |this| {
            let message = this
                .messages
                .get(&message_id)
                .ok_or(AdapterError::MessageNotFound { message_id })?;
            if !message.has_pending_transfer() {
                return Err(AdapterError::NoPendingTransfer { message_id });
            }
            info!(message_id = %message_id, "Downloading message content");
            this.engine.download_content(message_id);
            Ok(())
        })
    }

    /// Apply a message notification
    pub fn on_message_event(&mut self, event: MessageEvent) {
        match event {
            MessageEvent::Received {
                room,
                message,
                timestamp,
            } => self.on_message_received(room, message, timestamp),
            MessageEvent::StateChanged {
                message_id,
                state,
                file_path,
            } => self.on_message_state_changed(message_id, state, file_path),
            MessageEvent::EphemeralTimerStarted {
                message_id,
                timestamp,
            } => self.on_ephemeral_timer_started(message_id, timestamp),
            MessageEvent::EphemeralDeleted { message_id } => self.on_ephemeral_deleted(message_id),
        }
    }

    /// Append an incoming message exactly once and mark its room read
    ///
    /// A one-to-one room seen for the first time becomes the active
    /// conversation.
    pub fn on_message_received(
        &mut self,
        descriptor: ChatRoomDescriptor,
        message: MessageDescriptor,
        received_at: DateTime<Utc>,
    ) {
        let room_id = descriptor.room_id;
        let message_id = message.message_id;

        if self.messages.contains_key(&message_id) || self.removed_messages.contains(&message_id) {
            debug!(message_id = %message_id, "Duplicate message notification");
            self.ignored();
            return;
        }

        if !self.rooms.contains_key(&room_id) {
            info!(
                room_id = %room_id,
                backend = ?descriptor.backend,
                "Tracking chat room from incoming message"
            );
            self.track_room(ChatRoomInfo::from_descriptor(&descriptor));
        }

        let mut chat = ChatMessage::incoming(room_id, &message, received_at);
        let mut one_to_one = false;
        if let Some(room) = self.rooms.get_mut(&room_id) {
            if chat.ephemeral_lifetime.is_none() {
                chat.ephemeral_lifetime = room.ephemeral.lifetime();
            }
            room.history.push(message_id);
            one_to_one = !room.is_group();
        }
        let download = self.config.auto_download_files && chat.has_pending_transfer();

        info!(room_id = %room_id, message_id = %message_id, from = %chat.from, "Message received");
        self.messages.insert(message_id, chat);
        self.stats.messages_appended += 1;
        self.applied();
        self.emit(SessionEffect::MessageAppended { room_id, message_id });

        self.engine.mark_as_read(room_id);
        self.emit(SessionEffect::RoomMarkedAsRead { room_id });

        // A one-to-one room opens as a conversation once, however it became known
        if one_to_one && !self.bound_rooms.contains(&room_id) {
            self.bind_active_conversation(room_id);
        }
        if download {
            debug!(message_id = %message_id, "Downloading incoming file");
            self.engine.download_content(message_id);
        }
    }

    /// Update the rendered state of a message
    ///
    /// Delivery states only move forward. File transfer states are tracked
    /// separately; `FileTransferDone` on an incoming message swaps the
    /// download placeholder for the file exactly once.
    pub fn on_message_state_changed(
        &mut self,
        message_id: MessageId,
        state: MessageState,
        file_path: Option<String>,
    ) {
        if state == MessageState::Unknown {
            warn!(message_id = %message_id, "Ignoring unknown message state");
            self.ignored();
            return;
        }
        let Some(message) = self.messages.get_mut(&message_id) else {
            debug!(message_id = %message_id, ?state, "State notification for an unknown message");
            self.ignored();
            return;
        };

        match state {
            MessageState::FileTransferInProgress => {
                if message.transfer != TransferState::None {
                    self.ignored();
                    return;
                }
                message.transfer = TransferState::InProgress;
                debug!(message_id = %message_id, "File transfer started");
                self.applied();
            }
            MessageState::FileTransferDone => {
                if message.transfer == TransferState::Done {
                    debug!(message_id = %message_id, "Duplicate file transfer completion");
                    self.ignored();
                    return;
                }
                if message.direction == MessageDirection::Outgoing {
                    message.transfer = TransferState::Done;
                    self.applied();
                    return;
                }
                let Some(path) = file_path else {
                    warn!(message_id = %message_id, "File transfer done without a file path");
                    self.ignored();
                    return;
                };
                message.transfer = TransferState::Done;
                let replaced = if message.content_replaced {
                    0
                } else {
                    message.replace_placeholders(&path)
                };
                message.content_replaced = true;
                self.applied();
                if replaced > 0 {
                    info!(
                        message_id = %message_id,
                        path = %path,
                        "Downloaded file replaced placeholder"
                    );
                    self.emit(SessionEffect::FileContentReplaced { message_id, path });
                }
            }
            MessageState::FileTransferError => {
                if matches!(message.transfer, TransferState::Failed | TransferState::Done) {
                    self.ignored();
                    return;
                }
                message.transfer = TransferState::Failed;
                warn!(message_id = %message_id, "File transfer failed");
                self.applied();
                self.emit(SessionEffect::FileTransferFailed { message_id });
            }
            _ => {
                if message.state == state {
                    debug!(message_id = %message_id, ?state, "Duplicate message state");
                    self.ignored();
                    return;
                }
                if !message.state.can_advance_to(state) {
                    debug!(
                        message_id = %message_id,
                        current = ?message.state,
                        ?state,
                        "Message state regression ignored"
                    );
                    self.ignored();
                    return;
                }
                message.state = state;
                debug!(message_id = %message_id, ?state, "Message state changed");
                self.applied();
                self.emit(SessionEffect::MessageStateRendered { message_id, state });
            }
        }
    }

    /// Start the countdown display of an ephemeral message
    pub fn on_ephemeral_timer_started(&mut self, message_id: MessageId, started_at: DateTime<Utc>) {
        let Some(message) = self.messages.get_mut(&message_id) else {
            debug!(message_id = %message_id, "Ephemeral timer for an unknown message");
            self.ignored();
            return;
        };
        if message.ephemeral_started_at.is_some() {
            debug!(message_id = %message_id, "Duplicate ephemeral timer notification");
            self.ignored();
            return;
        }
        let Some(lifetime) = message.ephemeral_lifetime else {
            warn!(message_id = %message_id, "Ephemeral timer for a message without a lifetime");
            self.ignored();
            return;
        };

        message.ephemeral_started_at = Some(started_at);
        let lifetime_secs = lifetime.as_secs();
        info!(message_id = %message_id, lifetime_secs, "Ephemeral countdown started");
        self.applied();
        self.emit(SessionEffect::EphemeralCountdownStarted {
            message_id,
            lifetime_secs,
        });
    }

    /// Remove an ephemeral message, whatever its countdown shows
    pub fn on_ephemeral_deleted(&mut self, message_id: MessageId) {
        let Some(message) = self.messages.remove(&message_id) else {
            debug!(message_id = %message_id, "Deletion of an unknown message");
            self.ignored();
            return;
        };
        let room_id = message.room_id;
        if let Some(room) = self.rooms.get_mut(&room_id) {
            room.history.retain(|id| *id != message_id);
        }
        self.removed_messages.insert(message_id);

        let remaining = message.ephemeral_remaining(Utc::now());
        info!(
            message_id = %message_id,
            room_id = %room_id,
            ?remaining,
            "Ephemeral message deleted"
        );
        self.stats.messages_removed += 1;
        self.applied();
        self.emit(SessionEffect::MessageRemoved { room_id, message_id });
    }
}
