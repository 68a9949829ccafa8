//! Chat message types
//!
//! Delivery state and file-transfer state are tracked separately: the engine
//! reports both through one enum, but only the delivery states are ordered.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::ChatRoomId;

entity_id! {
    /// Opaque engine handle for a chat message
    MessageId
}

/// Direction of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageDirection {
    Outgoing,
    Incoming,
}

/// One content part of a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        body: String,
    },
    File {
        name: String,
        path: String,
        size: u64,
    },
    /// Incoming file announced but not downloaded yet
    FileTransferPending {
        name: String,
        size: u64,
    },
}

impl ContentPart {
    pub fn text(body: impl Into<String>) -> Self {
        ContentPart::Text { body: body.into() }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ContentPart::FileTransferPending { .. })
    }

    /// Short text used by the presentation layer
    pub fn summary(&self) -> String {
        match self {
            ContentPart::Text { body } => body.clone(),
            ContentPart::File { name, .. } => format!("[file] {}", name),
            ContentPart::FileTransferPending { name, size } => {
                format!("[download] {} ({} bytes)", name, size)
            }
        }
    }
}

/// Message state reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageState {
    Idle,
    InProgress,
    Delivered,
    NotDelivered,
    FileTransferError,
    FileTransferDone,
    DeliveredToUser,
    Displayed,
    FileTransferInProgress,
    /// A state this crate does not know about
    #[serde(other)]
    Unknown,
}

impl MessageState {
    /// Decode the engine's numeric state code
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => MessageState::Idle,
            1 => MessageState::InProgress,
            2 => MessageState::Delivered,
            3 => MessageState::NotDelivered,
            4 => MessageState::FileTransferError,
            5 => MessageState::FileTransferDone,
            6 => MessageState::DeliveredToUser,
            7 => MessageState::Displayed,
            8 => MessageState::FileTransferInProgress,
            _ => MessageState::Unknown,
        }
    }

    /// Position in the delivery ordering, `None` for states outside it
    pub fn delivery_rank(&self) -> Option<u8> {
        match self {
            MessageState::Idle => Some(0),
            MessageState::InProgress => Some(1),
            MessageState::Delivered => Some(2),
            MessageState::DeliveredToUser => Some(3),
            MessageState::Displayed => Some(4),
            _ => None,
        }
    }

    pub fn is_file_transfer(&self) -> bool {
        matches!(
            self,
            MessageState::FileTransferInProgress
                | MessageState::FileTransferDone
                | MessageState::FileTransferError
        )
    }

    /// Whether the rendered delivery state may move from `self` to `next`
    ///
    /// Only forward along Idle → InProgress → Delivered → DeliveredToUser →
    /// Displayed. `NotDelivered` is reachable before the peer has the message
    /// and is final.
    pub fn can_advance_to(&self, next: MessageState) -> bool {
        if *self == MessageState::NotDelivered {
            return false;
        }
        if next == MessageState::NotDelivered {
            return matches!(
                self,
                MessageState::Idle | MessageState::InProgress | MessageState::Delivered
            );
        }
        match (self.delivery_rank(), next.delivery_rank()) {
            (Some(current), Some(next)) => next > current,
            _ => false,
        }
    }
}

impl std::fmt::Display for MessageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// File transfer progress of a message, orthogonal to delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferState {
    None,
    InProgress,
    Done,
    Failed,
}

/// Message as carried by engine notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDescriptor {
    pub message_id: MessageId,
    pub from: String,
    pub parts: Vec<ContentPart>,
    #[serde(default)]
    pub ephemeral_lifetime_secs: Option<u64>,
}

/// Locally tracked message with its rendered representation
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub message_id: MessageId,
    pub room_id: ChatRoomId,
    pub direction: MessageDirection,
    pub from: String,
    pub parts: Vec<ContentPart>,
    /// Rendered delivery state
    pub state: MessageState,
    pub transfer: TransferState,
    /// Placeholder already swapped for the downloaded file
    pub content_replaced: bool,
    pub ephemeral_lifetime: Option<Duration>,
    /// When the engine started the ephemeral countdown
    pub ephemeral_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn outgoing(
        message_id: MessageId,
        room_id: ChatRoomId,
        from: impl Into<String>,
        parts: Vec<ContentPart>,
    ) -> Self {
        Self {
            message_id,
            room_id,
            direction: MessageDirection::Outgoing,
            from: from.into(),
            parts,
            state: MessageState::InProgress,
            transfer: TransferState::None,
            content_replaced: false,
            ephemeral_lifetime: None,
            ephemeral_started_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn incoming(
        room_id: ChatRoomId,
        descriptor: &MessageDescriptor,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id: descriptor.message_id,
            room_id,
            direction: MessageDirection::Incoming,
            from: descriptor.from.clone(),
            parts: descriptor.parts.clone(),
            state: MessageState::Delivered,
            transfer: TransferState::None,
            content_replaced: false,
            ephemeral_lifetime: descriptor.ephemeral_lifetime_secs.map(Duration::from_secs),
            ephemeral_started_at: None,
            created_at: received_at,
        }
    }

    pub fn has_pending_transfer(&self) -> bool {
        self.parts.iter().any(ContentPart::is_placeholder)
    }

    /// Swap every placeholder part for the downloaded file
    pub fn replace_placeholders(&mut self, path: &str) -> usize {
        let mut replaced = 0;
        for part in self.parts.iter_mut() {
            if let ContentPart::FileTransferPending { name, size } = part {
                *part = ContentPart::File {
                    name: name.clone(),
                    path: path.to_string(),
                    size: *size,
                };
                replaced += 1;
            }
        }
        replaced
    }

    /// Seconds left on the ephemeral countdown display
    ///
    /// `None` until the engine starts the timer. Saturates at zero; reaching
    /// zero does not remove anything, only the engine's deletion does.
    pub fn ephemeral_remaining(&self, now: DateTime<Utc>) -> Option<u64> {
        let lifetime = self.ephemeral_lifetime?;
        let started = self.ephemeral_started_at?;
        let elapsed = (now - started).to_std().unwrap_or(Duration::ZERO);
        Some(lifetime.saturating_sub(elapsed).as_secs())
    }
}
