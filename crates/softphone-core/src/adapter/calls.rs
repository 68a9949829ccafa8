//! Call operations and call notifications
//!
//! At most one call is *current*. The current call is created by `invite()`
//! or by the first notification of a call the engine started, and is torn
//! down exactly once, by whichever of `Error`, `End` or `Released` arrives
//! first. Every other call the engine reports is kept in an untracked set so
//! its later notifications are recognised and absorbed.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::account::validate_sip_uri;
use crate::call::{CallDirection, CallId, CallInfo, CallState, MediaParams};
use crate::effects::SessionEffect;
use crate::engine::DeclineReason;
use crate::error::{AdapterError, AdapterResult};
use crate::events::{CallEvent, Permission, PermissionEvent};

use super::config::SecondCallPolicy;

/// A call action waiting for a platform permission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingAction {
    Invite { remote_uri: String, video: bool },
    Accept { call_id: CallId },
    EnableVideo { call_id: CallId },
}

impl PendingAction {
    fn call_id(&self) -> Option<CallId> {
        match self {
            PendingAction::Invite { .. } => None,
            PendingAction::Accept { call_id } | PendingAction::EnableVideo { call_id } => {
                Some(*call_id)
            }
        }
    }
}

/// Call operations implementation for SessionAdapter
impl super::SessionAdapter {
    /// Place an outgoing call
    ///
    /// Requires the microphone permission, and the camera permission when
    /// `video` is set. A missing permission is requested first and the call
    /// is placed once it is granted.
    pub fn invite(&mut self, remote_uri: &str, video: bool) -> AdapterResult<()> {
        self.guarded("invite", |this| {
            if !this.authenticated {
                return Err(AdapterError::NoAccount);
            }
            validate_sip_uri(remote_uri)?;
            if let Some(call) = &this.current_call {
                return Err(AdapterError::CallAlreadyTracked {
                    call_id: call.call_id,
                });
            }

            if let Some(permission) = this.missing_permission(video) {
                return this.defer_for_permission(
                    permission,
                    PendingAction::Invite {
                        remote_uri: remote_uri.to_string(),
                        video,
                    },
                );
            }

            let params = if video {
                MediaParams::audio_video()
            } else {
                MediaParams::audio_only()
            };
            let call_id = this.engine.invite(remote_uri, params);
            info!(call_id = %call_id, remote_uri, video, "Placing outgoing call");

            this.current_call = Some(CallInfo::new(call_id, CallDirection::Outgoing, remote_uri));
            Ok(())
        })
    }

    /// Answer the ringing incoming call
    pub fn accept_call(&mut self) -> AdapterResult<()> {
        self.guarded("accept_call", |this| {
            let call = this.ringing_incoming_call()?;
            let call_id = call.call_id;
            let video = call.current_params.is_some_and(|p| p.video_enabled);

            if let Some(permission) = this.missing_permission(video) {
                return this.defer_for_permission(permission, PendingAction::Accept { call_id });
            }

            let params = if video {
                MediaParams::audio_video()
            } else {
                MediaParams::audio_only()
            };
            info!(call_id = %call_id, video, "Accepting call");
            this.engine.accept(call_id, params);
            Ok(())
        })
    }

    /// Refuse the ringing incoming call
    pub fn decline_call(&mut self) -> AdapterResult<()> {
        self.guarded("decline_call", |this| {
            let call_id = this.ringing_incoming_call()?.call_id;
            info!(call_id = %call_id, "Declining call");
            this.engine.decline(call_id, DeclineReason::Declined);
            this.mark_teardown_pending();
            Ok(())
        })
    }

    /// Hang up the current call
    ///
    /// The call stays current until the engine reports its end; further
    /// requests against it fail with `TeardownPending`.
    pub fn terminate_call(&mut self) -> AdapterResult<()> {
        self.guarded("terminate_call", |this| {
            let call_id = this.mutable_call()?.call_id;
            info!(call_id = %call_id, "Terminating call");
            this.engine.terminate(call_id);
            this.mark_teardown_pending();
            Ok(())
        })
    }

    /// Put the current call on hold
    pub fn pause_call(&mut self) -> AdapterResult<()> {
        self.guarded("pause_call", |this| {
            let call = this.mutable_call()?;
            if !matches!(call.state, CallState::StreamsRunning | CallState::PausedByRemote) {
                return Err(AdapterError::InvalidCallState {
                    call_id: call.call_id,
                    current_state: call.state,
                });
            }
            let call_id = call.call_id;
            info!(call_id = %call_id, "Pausing call");
            this.engine.pause(call_id);
            Ok(())
        })
    }

    /// Resume the paused current call
    pub fn resume_call(&mut self) -> AdapterResult<()> {
        self.guarded("resume_call", |this| {
            let call = this.mutable_call()?;
            if call.state != CallState::Paused {
                return Err(AdapterError::InvalidCallState {
                    call_id: call.call_id,
                    current_state: call.state,
                });
            }
            let call_id = call.call_id;
            info!(call_id = %call_id, "Resuming call");
            this.engine.resume(call_id);
            Ok(())
        })
    }

    /// Ask the engine to renegotiate the current call with or without video
    ///
    /// Rendering follows the negotiated parameters once the engine reports
    /// them, not this request.
    pub fn set_video_enabled(&mut self, enabled: bool) -> AdapterResult<()> {
        self.guarded("set_video_enabled", |this| {
            let call = this.mutable_call()?;
            if call.state != CallState::StreamsRunning {
                return Err(AdapterError::InvalidCallState {
                    call_id: call.call_id,
                    current_state: call.state,
                });
            }
            let call_id = call.call_id;
            let mut params = call.current_params.unwrap_or_else(MediaParams::audio_only);

            if enabled && !this.granted_permissions.contains(&Permission::Camera) {
                return this.defer_for_permission(
                    Permission::Camera,
                    PendingAction::EnableVideo { call_id },
                );
            }

            params.video_enabled = enabled;
            info!(call_id = %call_id, enabled, "Updating call video");
            this.engine.update(call_id, params);
            Ok(())
        })
    }

    /// Apply a call state notification
    pub fn on_call_state_changed(&mut self, event: CallEvent) {
        let call_id = event.call_id;
        let state = event.state;

        if state == CallState::Unknown {
            warn!(call_id = %call_id, "Ignoring unknown call state");
            self.ignored();
            return;
        }

        if self.released_calls.contains(&call_id) {
            debug!(call_id = %call_id, ?state, "Notification for a released call");
            self.ignored();
            return;
        }
        if let Some(last) = self.untracked_calls.get_mut(&call_id) {
            if last.can_transition_to(state) {
                *last = state;
            }
            let released = *last == CallState::Released;
            debug!(call_id = %call_id, ?state, "Notification for an untracked call");
            self.ignored();
            if released {
                self.untracked_calls.remove(&call_id);
                self.released_calls.insert(call_id);
            }
            return;
        }

        match self.current_call.as_ref().map(|c| c.call_id) {
            Some(current) if current == call_id => self.advance_current_call(event),
            Some(_) => self.on_other_call(event),
            None => self.start_tracking(event),
        }
    }

    fn start_tracking(&mut self, event: CallEvent) {
        let starts_call = matches!(
            event.state,
            CallState::IncomingReceived
                | CallState::OutgoingInit
                | CallState::OutgoingProgress
                | CallState::OutgoingRinging
        );
        if !starts_call {
            debug!(
                call_id = %event.call_id,
                state = ?event.state,
                "Notification for an unknown call"
            );
            self.ignored();
            return;
        }

        let mut call = CallInfo::new(event.call_id, event.direction, event.remote_uri.clone());
        call.created_at = event.timestamp;
        info!(
            call_id = %event.call_id,
            direction = ?event.direction,
            remote_uri = %event.remote_uri,
            "Tracking call"
        );
        self.current_call = Some(call);
        self.advance_current_call(event);
    }

    fn on_other_call(&mut self, event: CallEvent) {
        let call_id = event.call_id;
        if event.state != CallState::IncomingReceived {
            debug!(
                call_id = %call_id,
                state = ?event.state,
                "Notification for a call that is not current"
            );
            self.ignored();
            return;
        }

        self.untracked_calls.insert(call_id, event.state);
        self.applied();
        match self.config.second_call_policy {
            SecondCallPolicy::Decline => {
                info!(
                    call_id = %call_id,
                    remote_uri = %event.remote_uri,
                    "Declining second incoming call"
                );
                self.engine.decline(call_id, DeclineReason::Busy);
                self.stats.second_calls_declined += 1;
                self.emit(SessionEffect::SecondCallDeclined {
                    call_id,
                    remote_uri: event.remote_uri,
                });
            }
            SecondCallPolicy::Ignore => {
                info!(
                    call_id = %call_id,
                    remote_uri = %event.remote_uri,
                    "Ignoring second incoming call"
                );
            }
        }
    }

    fn advance_current_call(&mut self, event: CallEvent) {
        let Some(call) = self.current_call.as_mut() else {
            return;
        };
        let state = event.state;
        if call.state == state {
            debug!(call_id = %call.call_id, ?state, "Duplicate call notification");
            self.ignored();
            return;
        }
        if !call.state.can_transition_to(state) {
            warn!(
                call_id = %call.call_id,
                current = ?call.state,
                ?state,
                "Out-of-order call notification"
            );
            self.ignored();
            return;
        }

        info!(call_id = %call.call_id, previous = ?call.state, ?state, "Call state changed");
        call.state = state;
        call.last_message = event.message.clone();
        if let Some(params) = event.current_params {
            call.current_params = Some(params);
        }
        if state == CallState::Connected {
            call.connected_at = Some(event.timestamp);
        }
        let call_id = call.call_id;
        let text = event.message.clone().unwrap_or_else(|| state.to_string());
        self.applied();
        self.emit(SessionEffect::CallStatus {
            call_id,
            state,
            text,
        });

        match state {
            CallState::IncomingReceived => self.set_ringing_visible(true),
            CallState::Connected => self.set_ringing_visible(false),
            CallState::StreamsRunning | CallState::UpdatedByRemote => self.reevaluate_media(),
            CallState::Error | CallState::End | CallState::Released => {
                self.tear_down_current_call(state, event.message, event.timestamp)
            }
            _ => {}
        }
    }

    /// Start or stop video rendering from the negotiated parameters
    fn reevaluate_media(&mut self) {
        let Some(call) = self.current_call.as_mut() else {
            return;
        };
        let video = call.current_params.is_some_and(|p| p.video_enabled);
        if call.video_rendering != video {
            call.video_rendering = video;
            let call_id = call.call_id;
            info!(call_id = %call_id, video, "Video rendering changed");
            self.emit(SessionEffect::VideoRendering {
                call_id,
                started: video,
            });
        }
    }

    fn set_ringing_visible(&mut self, visible: bool) {
        let Some(call) = self.current_call.as_mut() else {
            return;
        };
        if call.ringing_visible != visible {
            call.ringing_visible = visible;
            let call_id = call.call_id;
            self.emit(SessionEffect::RingingUi { call_id, visible });
        }
    }

    /// Reset every call control to idle and clear the current call
    fn tear_down_current_call(
        &mut self,
        final_state: CallState,
        reason: Option<String>,
        at: chrono::DateTime<chrono::Utc>,
    ) {
        self.set_ringing_visible(false);
        let Some(mut call) = self.current_call.take() else {
            return;
        };
        let call_id = call.call_id;

        if call.video_rendering {
            call.video_rendering = false;
            self.emit(SessionEffect::VideoRendering {
                call_id,
                started: false,
            });
        }
        call.ended_at = Some(at);

        if self
            .pending_action
            .as_ref()
            .is_some_and(|(_, action)| action.call_id() == Some(call_id))
        {
            info!(call_id = %call_id, "Abandoning action waiting for permission");
            self.pending_action = None;
        }

        info!(call_id = %call_id, ?final_state, "Call torn down");
        self.stats.call_teardowns += 1;
        if final_state == CallState::Released {
            self.released_calls.insert(call_id);
        } else {
            self.untracked_calls.insert(call_id, final_state);
        }
        self.call_history.push(call);
        self.emit(SessionEffect::CallTornDown {
            call_id,
            final_state,
            reason,
        });
    }

    /// Apply the outcome of a permission prompt
    pub fn on_permission_result(&mut self, event: PermissionEvent) {
        let PermissionEvent {
            permission,
            granted,
        } = event;

        if granted {
            self.granted_permissions.insert(permission);
        } else {
            self.granted_permissions.remove(&permission);
        }

        let action = match self.pending_action.take() {
            Some((pending, action)) if pending == permission => action,
            other => {
                debug!(%permission, granted, "Permission result with no matching pending action");
                self.pending_action = other;
                self.ignored();
                return;
            }
        };
        self.applied();

        if !granted {
            info!(%permission, ?action, "Permission denied, abandoning action");
            self.emit(SessionEffect::PermissionDenied { permission });
            return;
        }

        info!(%permission, ?action, "Permission granted, resuming action");
        let resumed = match action {
            PendingAction::Invite { remote_uri, video } => self.invite(&remote_uri, video),
            PendingAction::Accept { call_id } => {
                if self.current_call.as_ref().map(|c| c.call_id) == Some(call_id) {
                    self.accept_call()
                } else {
                    Err(AdapterError::NoCurrentCall)
                }
            }
            PendingAction::EnableVideo { call_id } => {
                if self.current_call.as_ref().map(|c| c.call_id) == Some(call_id) {
                    self.set_video_enabled(true)
                } else {
                    Err(AdapterError::NoCurrentCall)
                }
            }
        };
        if let Err(e) = resumed {
            warn!(%permission, "Resumed action failed: {}", e);
            self.emit(SessionEffect::PendingActionFailed {
                permission,
                reason: e.to_string(),
            });
        }
    }

    /// First permission the action still needs
    fn missing_permission(&self, video: bool) -> Option<Permission> {
        if !self.granted_permissions.contains(&Permission::Microphone) {
            Some(Permission::Microphone)
        } else if video && !self.granted_permissions.contains(&Permission::Camera) {
            Some(Permission::Camera)
        } else {
            None
        }
    }

    fn defer_for_permission(
        &mut self,
        permission: Permission,
        action: PendingAction,
    ) -> AdapterResult<()> {
        if let Some((pending, _)) = &self.pending_action {
            return Err(AdapterError::PermissionPending {
                permission: pending.to_string(),
            });
        }
        info!(%permission, ?action, "Waiting for permission");
        self.pending_action = Some((permission, action));
        self.engine.request_permission(permission);
        self.emit(SessionEffect::PermissionPrompt { permission });
        Ok(())
    }

    /// The current call, unless its teardown was already requested
    fn mutable_call(&self) -> AdapterResult<&CallInfo> {
        let call = self.current_call.as_ref().ok_or(AdapterError::NoCurrentCall)?;
        if call.teardown_pending {
            return Err(AdapterError::teardown_pending(format!("call {}", call.call_id)));
        }
        Ok(call)
    }

    fn ringing_incoming_call(&self) -> AdapterResult<&CallInfo> {
        let call = self.mutable_call()?;
        let ringing = call.direction == CallDirection::Incoming
            && matches!(
                call.state,
                CallState::IncomingReceived | CallState::IncomingEarlyMedia
            );
        if !ringing {
            return Err(AdapterError::InvalidCallState {
                call_id: call.call_id,
                current_state: call.state,
            });
        }
        Ok(call)
    }

    fn mark_teardown_pending(&mut self) {
        if let Some(call) = self.current_call.as_mut() {
            call.teardown_pending = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::adapter::{AdapterBuilder, SessionAdapter};
    use crate::call::{CallDirection, CallId, CallState, MediaParams};
    use crate::effects::SessionEffect;
    use crate::engine::{EngineRequest, RecordingEngine};
    use crate::error::AdapterError;
    use crate::account::{AccountConfig, RegistrationState};
    use crate::events::{CallEvent, Permission, PermissionEvent, RegistrationEvent};

    fn adapter_with(engine: &RecordingEngine) -> SessionAdapter {
        AdapterBuilder::new()
            .grant_permission(Permission::Microphone)
            .build(engine.clone())
            .unwrap()
    }

    fn incoming(call_id: CallId, state: CallState) -> CallEvent {
        CallEvent::new(call_id, state, CallDirection::Incoming, "sip:bob@example.org")
    }

    #[test]
    fn test_video_follows_negotiated_params() {
        let engine = RecordingEngine::new();
        let mut adapter = adapter_with(&engine);
        let call_id = CallId::new();

        adapter.apply(incoming(call_id, CallState::IncomingReceived).into());
        adapter.apply(incoming(call_id, CallState::Connected).into());
        adapter.apply(
            incoming(call_id, CallState::StreamsRunning)
                .with_params(MediaParams::audio_only())
                .into(),
        );
        adapter.take_effects();

        adapter.apply(
            incoming(call_id, CallState::UpdatedByRemote)
                .with_params(MediaParams::audio_video())
                .into(),
        );
        assert!(adapter.take_effects().contains(&SessionEffect::VideoRendering {
            call_id,
            started: true
        }));
        assert!(adapter.current_call().unwrap().video_rendering);
    }

    #[test]
    fn test_terminate_marks_teardown_pending() {
        let engine = RecordingEngine::new();
        let mut adapter = adapter_with(&engine);
        let call_id = CallId::new();
        adapter.apply(incoming(call_id, CallState::IncomingReceived).into());
        adapter.apply(incoming(call_id, CallState::Connected).into());
        adapter.apply(incoming(call_id, CallState::StreamsRunning).into());

        adapter.terminate_call().unwrap();
        assert!(matches!(adapter.pause_call(), Err(AdapterError::TeardownPending { .. })));
        assert!(matches!(adapter.terminate_call(), Err(AdapterError::TeardownPending { .. })));
        assert!(adapter.snapshot().call.unwrap().teardown_pending);

        adapter.apply(incoming(call_id, CallState::End).into());
        assert!(adapter.current_call().is_none());
        assert!(matches!(adapter.terminate_call(), Err(AdapterError::NoCurrentCall)));
        assert_eq!(
            engine
                .requests()
                .iter()
                .filter(|r| matches!(r, EngineRequest::Terminate { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_accept_without_microphone_prompts_then_resumes() {
        let engine = RecordingEngine::new();
        let mut adapter = AdapterBuilder::new().build(engine.clone()).unwrap();
        let call_id = CallId::new();
        adapter.apply(incoming(call_id, CallState::IncomingReceived).into());
        adapter.take_effects();

        adapter.accept_call().unwrap();
        assert_eq!(
            adapter.take_effects(),
            vec![SessionEffect::PermissionPrompt {
                permission: Permission::Microphone
            }]
        );
        assert_eq!(adapter.snapshot().pending_permission, Some(Permission::Microphone));
        assert!(matches!(
            adapter.accept_call(),
            Err(AdapterError::PermissionPending { .. })
        ));

        adapter.apply(
            PermissionEvent {
                permission: Permission::Microphone,
                granted: true,
            }
            .into(),
        );
        assert_eq!(
            engine.requests().last(),
            Some(&EngineRequest::Accept {
                call_id,
                params: MediaParams::audio_only()
            })
        );
        assert_eq!(adapter.snapshot().pending_permission, None);
    }

    #[test]
    fn test_denied_permission_abandons_action() {
        let engine = RecordingEngine::new();
        let mut adapter = AdapterBuilder::new().build(engine.clone()).unwrap();
        let call_id = CallId::new();
        adapter.apply(incoming(call_id, CallState::IncomingReceived).into());
        adapter.accept_call().unwrap();
        adapter.take_effects();

        adapter.apply(
            PermissionEvent {
                permission: Permission::Microphone,
                granted: false,
            }
            .into(),
        );
        assert_eq!(
            adapter.take_effects(),
            vec![SessionEffect::PermissionDenied {
                permission: Permission::Microphone
            }]
        );
        assert!(!engine
            .requests()
            .iter()
            .any(|r| matches!(r, EngineRequest::Accept { .. })));
        assert_eq!(adapter.current_call().unwrap().state, CallState::IncomingReceived);
    }

    #[test]
    fn test_failed_resume_after_grant_is_reported() {
        let engine = RecordingEngine::new();
        let mut adapter = adapter_with(&engine);
        adapter.login(AccountConfig::new("sip:alice@example.org")).unwrap();
        let account = engine.last_registered_account().unwrap();
        adapter.apply(RegistrationEvent::new(account, RegistrationState::Ok).into());

        adapter.invite("sip:carol@example.org", true).unwrap();
        let call_id = CallId::new();
        adapter.apply(incoming(call_id, CallState::IncomingReceived).into());
        adapter.take_effects();

        adapter.apply(
            PermissionEvent {
                permission: Permission::Camera,
                granted: true,
            }
            .into(),
        );

        let effects = adapter.take_effects();
        assert!(matches!(
            effects.as_slice(),
            [SessionEffect::PendingActionFailed {
                permission: Permission::Camera,
                ..
            }]
        ));
        assert!(!engine
            .requests()
            .iter()
            .any(|r| matches!(r, EngineRequest::Invite { .. })));
        assert_eq!(adapter.current_call().unwrap().call_id, call_id);
        assert_eq!(adapter.snapshot().pending_permission, None);
    }

    #[test]
    fn test_released_calls_leave_the_untracked_set() {
        let engine = RecordingEngine::new();
        let mut adapter = adapter_with(&engine);
        let first = CallId::new();
        let second = CallId::new();
        adapter.apply(incoming(first, CallState::IncomingReceived).into());
        adapter.apply(incoming(second, CallState::IncomingReceived).into());
        assert!(adapter.untracked_calls.contains_key(&second));

        adapter.apply(incoming(second, CallState::End).into());
        adapter.apply(incoming(second, CallState::Released).into());
        assert!(!adapter.untracked_calls.contains_key(&second));
        assert!(adapter.released_calls.contains(&second));

        adapter.apply(incoming(first, CallState::Connected).into());
        adapter.apply(incoming(first, CallState::Released).into());
        assert!(adapter.current_call().is_none());
        assert!(adapter.untracked_calls.is_empty());

        // A replayed start for a released call is not tracked again
        adapter.take_effects();
        adapter.apply(incoming(first, CallState::IncomingReceived).into());
        assert!(adapter.current_call().is_none());
        assert!(adapter.take_effects().is_empty());
    }

    #[test]
    fn test_pause_requires_running_streams() {
        let engine = RecordingEngine::new();
        let mut adapter = adapter_with(&engine);
        let call_id = CallId::new();
        adapter.apply(incoming(call_id, CallState::IncomingReceived).into());

        assert!(matches!(
            adapter.pause_call(),
            Err(AdapterError::InvalidCallState {
                current_state: CallState::IncomingReceived,
                ..
            })
        ));
        assert!(matches!(adapter.resume_call(), Err(AdapterError::InvalidCallState { .. })));
    }

    #[test]
    fn test_ignore_policy_leaves_second_call_alone() {
        let engine = RecordingEngine::new();
        let mut adapter = AdapterBuilder::new()
            .second_call_policy(crate::adapter::SecondCallPolicy::Ignore)
            .build(engine.clone())
            .unwrap();
        let first = CallId::new();
        let second = CallId::new();
        adapter.apply(incoming(first, CallState::IncomingReceived).into());
        adapter.take_effects();

        adapter.apply(incoming(second, CallState::IncomingReceived).into());
        assert!(adapter.take_effects().is_empty());
        assert!(engine.requests().is_empty());
        assert_eq!(adapter.current_call().unwrap().call_id, first);
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_unknown_call_state_is_logged_and_ignored() {
        let mut adapter = adapter_with(&RecordingEngine::new());
        let call_id = CallId::new();
        adapter.apply(incoming(call_id, CallState::IncomingReceived).into());
        adapter.take_effects();

        adapter.apply(incoming(call_id, CallState::Unknown).into());

        assert!(logs_contain("Ignoring unknown call state"));
        assert!(adapter.take_effects().is_empty());
        assert_eq!(adapter.current_call().unwrap().state, CallState::IncomingReceived);
    }
}
