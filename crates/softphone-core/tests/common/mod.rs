//! Shared helpers for integration tests

#![allow(dead_code)]

use chrono::Utc;
use softphone_core::{
    AccountConfig, AdapterBuilder, CallDirection, CallEvent, CallId, CallState, ChatRoomBackend,
    ChatRoomCapabilities, ChatRoomDescriptor, ChatRoomId, ContentPart, EngineEvent,
    EphemeralPolicy, MessageDescriptor, MessageEvent, MessageId, Permission, RecordingEngine,
    RegistrationEvent, RegistrationState, SessionAdapter,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("softphone_core=debug")
        .with_test_writer()
        .try_init();
}

/// Adapter with microphone and camera granted, registered as alice
pub fn registered_adapter(engine: &RecordingEngine, builder: AdapterBuilder) -> SessionAdapter {
    let mut adapter = builder
        .grant_permission(Permission::Microphone)
        .grant_permission(Permission::Camera)
        .build(engine.clone())
        .expect("valid adapter config");
    adapter
        .login(AccountConfig::new("sip:alice@example.org").with_credentials("alice", "secret"))
        .expect("login accepted");
    let account = engine.last_registered_account().expect("register request");
    adapter.apply(RegistrationEvent::new(account, RegistrationState::Progress).into());
    adapter.apply(RegistrationEvent::new(account, RegistrationState::Ok).into());
    adapter.take_effects();
    adapter
}

pub fn incoming_event(call_id: CallId, state: CallState) -> CallEvent {
    CallEvent::new(call_id, state, CallDirection::Incoming, "sip:bob@example.org")
}

pub fn incoming_call(call_id: CallId, state: CallState) -> EngineEvent {
    incoming_event(call_id, state).into()
}

pub fn outgoing_call(call_id: CallId, state: CallState) -> EngineEvent {
    CallEvent::new(call_id, state, CallDirection::Outgoing, "sip:bob@example.org").into()
}

pub fn basic_room(room_id: ChatRoomId) -> ChatRoomDescriptor {
    ChatRoomDescriptor {
        room_id,
        backend: ChatRoomBackend::Basic,
        capabilities: ChatRoomCapabilities::one_to_one(),
        peer_address: Some("sip:bob@example.org".to_string()),
        subject: None,
        ephemeral: EphemeralPolicy::disabled(),
    }
}

pub fn secure_room(room_id: ChatRoomId) -> ChatRoomDescriptor {
    ChatRoomDescriptor {
        room_id,
        backend: ChatRoomBackend::FlexisipChat,
        capabilities: ChatRoomCapabilities::one_to_one().with_encryption(),
        peer_address: Some("sip:bob@example.org".to_string()),
        subject: Some("Dummy subject".to_string()),
        ephemeral: EphemeralPolicy::disabled(),
    }
}

pub fn text_message(body: &str) -> MessageDescriptor {
    MessageDescriptor {
        message_id: MessageId::new(),
        from: "sip:bob@example.org".to_string(),
        parts: vec![ContentPart::text(body)],
        ephemeral_lifetime_secs: None,
    }
}

pub fn received(room: ChatRoomDescriptor, message: MessageDescriptor) -> EngineEvent {
    MessageEvent::Received {
        room,
        message,
        timestamp: Utc::now(),
    }
    .into()
}
