//! Integration tests for call operations and call notifications

mod common;

use common::{incoming_call, outgoing_call};
use softphone_core::{
    AdapterBuilder, AdapterError, CallControls, CallId, CallState, DeclineReason, EngineRequest,
    MediaParams, Permission, PermissionEvent, RecordingEngine, SessionEffect,
};

/// Test that the first IncomingReceived becomes current and shows the ringing UI
#[test]
fn test_incoming_call_rings() {
    common::init_tracing();

    let engine = RecordingEngine::new();
    let mut adapter = common::registered_adapter(&engine, AdapterBuilder::new());
    let call_id = CallId::new();

    adapter.apply(incoming_call(call_id, CallState::IncomingReceived));

    assert_eq!(adapter.current_call().unwrap().call_id, call_id);
    assert!(adapter
        .take_effects()
        .contains(&SessionEffect::RingingUi { call_id, visible: true }));

    let snapshot = adapter.snapshot();
    let call = snapshot.call.as_ref().unwrap();
    assert!(call.ringing_visible);
    assert!(snapshot.is_call_active);
    assert!(snapshot.controls.can_accept);
    assert!(snapshot.controls.can_decline);
    assert!(!snapshot.controls.can_invite);
}

/// Test that a second incoming call never replaces the tracked one
#[test]
fn test_second_incoming_call_does_not_overwrite_current() {
    let engine = RecordingEngine::new();
    let mut adapter = common::registered_adapter(&engine, AdapterBuilder::new());
    let first = CallId::new();
    let second = CallId::new();

    adapter.apply(incoming_call(first, CallState::IncomingReceived));
    adapter.take_effects();
    adapter.apply(incoming_call(second, CallState::IncomingReceived));

    assert_eq!(adapter.current_call().unwrap().call_id, first);
    assert_eq!(
        adapter.take_effects(),
        vec![SessionEffect::SecondCallDeclined {
            call_id: second,
            remote_uri: "sip:bob@example.org".to_string()
        }]
    );
    assert_eq!(
        engine.requests().last(),
        Some(&EngineRequest::Decline {
            call_id: second,
            reason: DeclineReason::Busy
        })
    );

    // The declined call ending must not disturb the current one
    adapter.apply(incoming_call(second, CallState::Released));
    assert_eq!(adapter.current_call().unwrap().call_id, first);
    assert!(adapter.take_effects().is_empty());
    assert_eq!(adapter.stats().call_teardowns, 0);
}

/// Test that End, Error and Released clear the current call exactly once
#[test]
fn test_terminal_notifications_tear_down_once() {
    let engine = RecordingEngine::new();
    let mut adapter = common::registered_adapter(&engine, AdapterBuilder::new());
    let call_id = CallId::new();

    adapter.apply(incoming_call(call_id, CallState::IncomingReceived));
    adapter.apply(incoming_call(call_id, CallState::Connected));
    adapter.apply(
        common::incoming_event(call_id, CallState::StreamsRunning)
            .with_params(MediaParams::audio_video())
            .into(),
    );
    adapter.take_effects();

    adapter.apply(incoming_call(call_id, CallState::End));
    adapter.apply(incoming_call(call_id, CallState::Error));
    adapter.apply(incoming_call(call_id, CallState::Released));
    adapter.apply(incoming_call(call_id, CallState::Released));

    let effects = adapter.take_effects();
    let teardowns = effects
        .iter()
        .filter(|e| matches!(e, SessionEffect::CallTornDown { .. }))
        .count();
    assert_eq!(teardowns, 1);
    assert!(effects.contains(&SessionEffect::VideoRendering {
        call_id,
        started: false
    }));
    assert!(adapter.current_call().is_none());
    assert_eq!(adapter.call_history().len(), 1);
    assert_eq!(adapter.call_history()[0].state, CallState::End);

    let snapshot = adapter.snapshot();
    assert!(!snapshot.is_call_active);
    assert!(snapshot.controls.can_invite);
    assert!(!snapshot.controls.can_terminate);
}

/// Test an outgoing call from invite to release
#[test]
fn test_outgoing_call_flow() {
    let engine = RecordingEngine::new();
    let mut adapter = common::registered_adapter(&engine, AdapterBuilder::new());

    adapter.invite("sip:bob@example.org", false).unwrap();
    let call_id = engine.last_invited_call().unwrap();
    assert!(matches!(
        adapter.invite("sip:carol@example.org", false),
        Err(AdapterError::CallAlreadyTracked { .. })
    ));

    for state in [
        CallState::OutgoingInit,
        CallState::OutgoingProgress,
        CallState::OutgoingRinging,
        CallState::Connected,
        CallState::StreamsRunning,
    ] {
        adapter.apply(outgoing_call(call_id, state));
    }
    assert_eq!(adapter.current_call().unwrap().state, CallState::StreamsRunning);
    assert!(adapter.current_call().unwrap().connected_at.is_some());

    adapter.pause_call().unwrap();
    adapter.apply(outgoing_call(call_id, CallState::Pausing));
    adapter.apply(outgoing_call(call_id, CallState::Paused));
    assert!(adapter.snapshot().controls.can_resume);
    adapter.resume_call().unwrap();

    adapter.terminate_call().unwrap();
    assert_eq!(adapter.snapshot().controls, CallControls::default());
    adapter.apply(outgoing_call(call_id, CallState::End));
    adapter.apply(outgoing_call(call_id, CallState::Released));

    assert!(adapter.current_call().is_none());
    assert_eq!(adapter.stats().call_teardowns, 1);
    assert!(engine.requests().contains(&EngineRequest::Terminate { call_id }));
}

/// Test that a video invite waits for the camera and resumes once granted
#[test]
fn test_invite_waits_for_camera_permission() {
    let engine = RecordingEngine::new();
    let mut adapter = AdapterBuilder::new()
        .grant_permission(Permission::Microphone)
        .build(engine.clone())
        .unwrap();
    adapter
        .login(softphone_core::AccountConfig::new("sip:alice@example.org"))
        .unwrap();
    let account = engine.last_registered_account().unwrap();
    adapter.apply(
        softphone_core::RegistrationEvent::new(account, softphone_core::RegistrationState::Ok)
            .into(),
    );
    adapter.take_effects();

    adapter.invite("sip:bob@example.org", true).unwrap();
    assert!(engine.last_invited_call().is_none());
    assert_eq!(
        adapter.take_effects(),
        vec![SessionEffect::PermissionPrompt {
            permission: Permission::Camera
        }]
    );
    assert_eq!(adapter.snapshot().pending_permission, Some(Permission::Camera));

    adapter.apply(
        PermissionEvent {
            permission: Permission::Camera,
            granted: true,
        }
        .into(),
    );
    assert!(engine.last_invited_call().is_some());
    assert!(adapter.current_call().is_some());
    assert_eq!(adapter.snapshot().pending_permission, None);
}

/// Test that a denied microphone abandons the accept
#[test]
fn test_denied_permission_abandons_accept() {
    let engine = RecordingEngine::new();
    let mut adapter = AdapterBuilder::new().build(engine.clone()).unwrap();
    let call_id = CallId::new();
    adapter.apply(incoming_call(call_id, CallState::IncomingReceived));
    adapter.take_effects();

    adapter.accept_call().unwrap();
    adapter.apply(
        PermissionEvent {
            permission: Permission::Microphone,
            granted: false,
        }
        .into(),
    );

    assert_eq!(
        adapter.take_effects(),
        vec![
            SessionEffect::PermissionPrompt {
                permission: Permission::Microphone
            },
            SessionEffect::PermissionDenied {
                permission: Permission::Microphone
            },
        ]
    );
    assert!(!engine
        .requests()
        .iter()
        .any(|r| matches!(r, EngineRequest::Accept { .. })));
    assert_eq!(adapter.current_call().unwrap().state, CallState::IncomingReceived);
}
