//! Call types and the call state graph
//!
//! The engine owns the call state machine. This module only knows which
//! transitions the engine may legally report, so the adapter can tell a fresh
//! notification from a stale or duplicated one.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

entity_id! {
    /// Opaque engine handle for a call
    CallId
}

/// Call state reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    Idle,
    IncomingReceived,
    OutgoingInit,
    OutgoingProgress,
    OutgoingRinging,
    OutgoingEarlyMedia,
    Connected,
    StreamsRunning,
    Pausing,
    Paused,
    Resuming,
    Referred,
    Error,
    End,
    PausedByRemote,
    UpdatedByRemote,
    IncomingEarlyMedia,
    Updating,
    Released,
    /// A state this crate does not know about
    #[serde(other)]
    Unknown,
}

impl CallState {
    /// Decode the engine's numeric state code
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => CallState::Idle,
            1 => CallState::IncomingReceived,
            3 => CallState::OutgoingInit,
            4 => CallState::OutgoingProgress,
            5 => CallState::OutgoingRinging,
            6 => CallState::OutgoingEarlyMedia,
            7 => CallState::Connected,
            8 => CallState::StreamsRunning,
            9 => CallState::Pausing,
            10 => CallState::Paused,
            11 => CallState::Resuming,
            12 => CallState::Referred,
            13 => CallState::Error,
            14 => CallState::End,
            15 => CallState::PausedByRemote,
            16 => CallState::UpdatedByRemote,
            17 => CallState::IncomingEarlyMedia,
            18 => CallState::Updating,
            19 => CallState::Released,
            _ => CallState::Unknown,
        }
    }

    /// `Error`, `End` or `Released`
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Error | CallState::End | CallState::Released)
    }

    /// Media is established (possibly paused or renegotiating)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            CallState::Connected
                | CallState::StreamsRunning
                | CallState::Pausing
                | CallState::Paused
                | CallState::PausedByRemote
                | CallState::Updating
                | CallState::UpdatedByRemote
                | CallState::Resuming
                | CallState::Referred
        )
    }

    /// Still waiting for the call to be answered
    pub fn is_ringing(&self) -> bool {
        matches!(
            self,
            CallState::IncomingReceived
                | CallState::IncomingEarlyMedia
                | CallState::OutgoingInit
                | CallState::OutgoingProgress
                | CallState::OutgoingRinging
                | CallState::OutgoingEarlyMedia
        )
    }

    /// Whether the engine may report `next` right after `self`
    ///
    /// `Error` and `End` may interrupt any live state; `Released` may follow
    /// anything but itself. Nothing leaves `Released`.
    pub fn can_transition_to(&self, next: CallState) -> bool {
        use CallState::*;

        if matches!(self, Released | Unknown) || next == Unknown {
            return false;
        }
        match next {
            Released => return true,
            Error | End => return !matches!(self, Error | End),
            _ => {}
        }

        match self {
            Idle => matches!(
                next,
                OutgoingInit | OutgoingProgress | OutgoingRinging | IncomingReceived
            ),
            OutgoingInit => matches!(
                next,
                OutgoingProgress | OutgoingRinging | OutgoingEarlyMedia | Connected
            ),
            OutgoingProgress => matches!(next, OutgoingRinging | OutgoingEarlyMedia | Connected),
            OutgoingRinging => matches!(next, OutgoingEarlyMedia | Connected),
            OutgoingEarlyMedia => matches!(next, Connected),
            IncomingReceived => matches!(next, IncomingEarlyMedia | Connected),
            IncomingEarlyMedia => matches!(next, Connected),
            Connected => matches!(
                next,
                StreamsRunning | Updating | UpdatedByRemote | Pausing | PausedByRemote
            ),
            StreamsRunning => matches!(
                next,
                Updating | UpdatedByRemote | Pausing | PausedByRemote | Referred
            ),
            Pausing => matches!(next, Paused),
            Paused => matches!(next, Resuming | UpdatedByRemote | PausedByRemote),
            PausedByRemote => matches!(next, StreamsRunning | UpdatedByRemote | Pausing | Paused),
            Updating | UpdatedByRemote => {
                matches!(next, StreamsRunning | Paused | PausedByRemote)
            }
            Resuming => matches!(next, StreamsRunning),
            Referred => matches!(next, StreamsRunning),
            Error | End => false,
            Released | Unknown => false,
        }
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Direction of a call (from the local user's perspective)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    Outgoing,
    Incoming,
}

/// Media parameters of a call
///
/// Notifications carry the call's *current* parameters, i.e. what the offer
/// and answer settled on. Requested parameters never reach the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaParams {
    pub audio_enabled: bool,
    pub video_enabled: bool,
    /// Media is end-to-end encrypted (SRTP/ZRTP/DTLS, decided by the engine)
    #[serde(default)]
    pub encrypted: bool,
}

impl MediaParams {
    pub fn audio_only() -> Self {
        Self {
            audio_enabled: true,
            video_enabled: false,
            encrypted: false,
        }
    }

    pub fn audio_video() -> Self {
        Self {
            audio_enabled: true,
            video_enabled: true,
            encrypted: false,
        }
    }
}

/// Locally tracked call
#[derive(Debug, Clone)]
pub struct CallInfo {
    pub call_id: CallId,
    pub state: CallState,
    pub direction: CallDirection,
    /// Remote party URI
    pub remote_uri: String,
    /// Last negotiated media parameters
    pub current_params: Option<MediaParams>,
    /// Last engine-provided message
    pub last_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Termination requested locally, waiting for `Released`
    pub teardown_pending: bool,
    /// Ringing panel with accept/decline is shown
    pub ringing_visible: bool,
    /// Video rendering currently started for this call
    pub video_rendering: bool,
    pub metadata: HashMap<String, String>,
}

impl CallInfo {
    pub fn new(call_id: CallId, direction: CallDirection, remote_uri: impl Into<String>) -> Self {
        Self {
            call_id,
            state: CallState::Idle,
            direction,
            remote_uri: remote_uri.into(),
            current_params: None,
            last_message: None,
            created_at: Utc::now(),
            connected_at: None,
            ended_at: None,
            teardown_pending: false,
            ringing_visible: false,
            video_rendering: false,
            metadata: HashMap::new(),
        }
    }

    /// Call duration so far, if it was ever connected
    pub fn duration(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let connected = self.connected_at?;
        Some(self.ended_at.unwrap_or(now) - connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CallState::*;

    #[test]
    fn test_outgoing_happy_path_is_legal() {
        let path = [
            Idle,
            OutgoingInit,
            OutgoingProgress,
            OutgoingRinging,
            Connected,
            StreamsRunning,
            Pausing,
            Paused,
            Resuming,
            StreamsRunning,
            End,
            Released,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_released_is_terminal() {
        for next in [Idle, IncomingReceived, StreamsRunning, End, Error, Released] {
            assert!(!Released.can_transition_to(next));
        }
    }

    #[test]
    fn test_no_regression_to_ringing() {
        assert!(!StreamsRunning.can_transition_to(OutgoingRinging));
        assert!(!Connected.can_transition_to(IncomingReceived));
        assert!(!End.can_transition_to(Error));
        assert!(Error.can_transition_to(Released));
    }

    #[test]
    fn test_codes_round_through_known_values() {
        assert_eq!(CallState::from_code(8), StreamsRunning);
        assert_eq!(CallState::from_code(19), Released);
        assert_eq!(CallState::from_code(2), Unknown);
        assert_eq!(CallState::from_code(-1), Unknown);
    }

    #[test]
    fn test_duration_requires_connection() {
        let mut info = CallInfo::new(CallId::new(), CallDirection::Outgoing, "sip:bob@example.org");
        let now = Utc::now();
        assert!(info.duration(now).is_none());
        info.connected_at = Some(now - chrono::Duration::seconds(30));
        assert_eq!(info.duration(now), Some(chrono::Duration::seconds(30)));
    }
}
