//! Integration tests for chat rooms and sends before creation

mod common;

use softphone_core::{
    AdapterBuilder, AdapterError, ChatRoomEvent, ChatRoomId, ChatRoomParams, ChatRoomState,
    ContentPart, EphemeralPolicy, RecordingEngine, SendOutcome, SendPolicy, SessionAdapter,
    SessionEffect,
};

fn set_state(adapter: &mut SessionAdapter, room_id: ChatRoomId, state: ChatRoomState) {
    adapter.apply(
        ChatRoomEvent::StateChanged {
            room: common::secure_room(room_id),
            state,
        }
        .into(),
    );
}

fn hello() -> Vec<ContentPart> {
    vec![ContentPart::text("Hello")]
}

/// Test that sends before creation are queued and flushed in order once created
#[test]
fn test_queued_sends_flush_after_created() {
    common::init_tracing();

    let engine = RecordingEngine::new();
    let mut adapter = common::registered_adapter(&engine, AdapterBuilder::new());
    let room_id = adapter
        .create_chat_room(ChatRoomParams::secure_one_to_one("sip:bob@example.org"))
        .unwrap();
    assert_eq!(adapter.active_conversation(), Some(room_id));

    assert_eq!(adapter.send_message(room_id, hello()), Ok(SendOutcome::Queued { position: 1 }));
    assert_eq!(
        adapter.send_message(room_id, vec![ContentPart::text("Are you there?")]),
        Ok(SendOutcome::Queued { position: 2 })
    );
    assert!(engine.sent_messages().is_empty());
    assert_eq!(adapter.snapshot().room(room_id).unwrap().queued_sends, 2);
    adapter.take_effects();

    set_state(&mut adapter, room_id, ChatRoomState::CreationPending);
    set_state(&mut adapter, room_id, ChatRoomState::Created);

    let sent = engine.sent_messages();
    assert_eq!(sent.len(), 2);
    let effects = adapter.take_effects();
    assert!(effects.contains(&SessionEffect::SendUnblocked { room_id, flushed: 2 }));
    assert_eq!(adapter.queued_sends(room_id), 0);

    let snapshot = adapter.snapshot();
    let bodies: Vec<_> = snapshot.entries.iter().map(|e| e.parts.clone()).collect();
    assert_eq!(bodies.len(), 2);
    assert_eq!(snapshot.entries[0].message_id, sent[0]);
    assert_eq!(snapshot.entries[1].message_id, sent[1]);

    // Once created, sends go straight out
    assert!(matches!(adapter.send_message(room_id, hello()), Ok(SendOutcome::Sent(_))));
}

/// Test that the Reject policy refuses sends before creation with an explicit effect
#[test]
fn test_reject_policy_refuses_early_sends() {
    let engine = RecordingEngine::new();
    let mut adapter =
        common::registered_adapter(&engine, AdapterBuilder::new().send_policy(SendPolicy::Reject));
    let room_id = adapter
        .create_chat_room(ChatRoomParams::secure_one_to_one("sip:bob@example.org"))
        .unwrap();
    adapter.take_effects();

    let result = adapter.send_message(room_id, hello());
    assert!(matches!(result, Err(AdapterError::ChatRoomNotReady { .. })));

    let effects = adapter.take_effects();
    assert_eq!(effects.len(), 1);
    assert!(matches!(
        &effects[0],
        SessionEffect::SendRejected { room_id: rejected, .. } if *rejected == room_id
    ));
    assert!(engine.sent_messages().is_empty());
    assert_eq!(adapter.stats().sends_rejected, 1);
}

/// Test that a failed creation rejects every queued send
#[test]
fn test_creation_failed_rejects_queued_sends() {
    let engine = RecordingEngine::new();
    let mut adapter = common::registered_adapter(&engine, AdapterBuilder::new());
    let room_id = adapter
        .create_chat_room(ChatRoomParams::secure_one_to_one("sip:bob@example.org"))
        .unwrap();
    adapter.send_message(room_id, hello()).unwrap();
    adapter.send_message(room_id, hello()).unwrap();
    adapter.take_effects();

    set_state(&mut adapter, room_id, ChatRoomState::CreationPending);
    set_state(&mut adapter, room_id, ChatRoomState::CreationFailed);

    let rejected = adapter
        .take_effects()
        .into_iter()
        .filter(|e| matches!(e, SessionEffect::SendRejected { .. }))
        .count();
    assert_eq!(rejected, 2);
    assert_eq!(adapter.queued_sends(room_id), 0);
    assert!(engine.sent_messages().is_empty());
    assert!(matches!(
        adapter.send_message(room_id, hello()),
        Err(AdapterError::ChatRoomUnavailable { .. })
    ));

    // A late Created cannot resurrect the room
    set_state(&mut adapter, room_id, ChatRoomState::Created);
    assert_eq!(adapter.chat_room(room_id).unwrap().state, ChatRoomState::CreationFailed);
}

/// Test that a failed termination keeps the room usable without re-entering Created
#[test]
fn test_termination_failed_keeps_room_created_once() {
    let engine = RecordingEngine::new();
    let mut adapter = common::registered_adapter(&engine, AdapterBuilder::new());
    let room_id = adapter
        .create_chat_room(ChatRoomParams::secure_one_to_one("sip:bob@example.org"))
        .unwrap();
    adapter.send_message(room_id, hello()).unwrap();

    for state in [
        ChatRoomState::CreationPending,
        ChatRoomState::Created,
        ChatRoomState::TerminationPending,
        ChatRoomState::TerminationFailed,
        ChatRoomState::Created,
    ] {
        set_state(&mut adapter, room_id, state);
    }

    let effects = adapter.take_effects();
    let created = effects
        .iter()
        .filter(|e| {
            matches!(e, SessionEffect::ChatRoomStatus { state: ChatRoomState::Created, .. })
        })
        .count();
    assert_eq!(created, 1);
    let flushes = effects
        .iter()
        .filter(|e| matches!(e, SessionEffect::SendUnblocked { .. }))
        .count();
    assert_eq!(flushes, 1);
    assert_eq!(adapter.chat_room(room_id).unwrap().state, ChatRoomState::TerminationFailed);

    // Still usable after the failed teardown
    assert!(matches!(adapter.send_message(room_id, hello()), Ok(SendOutcome::Sent(_))));
    assert_eq!(engine.sent_messages().len(), 2);

    // And may be torn down again
    set_state(&mut adapter, room_id, ChatRoomState::TerminationPending);
    assert_eq!(adapter.chat_room(room_id).unwrap().state, ChatRoomState::TerminationPending);
}

/// Test that the queue limit is enforced with an explicit rejection
#[test]
fn test_queue_limit() {
    let engine = RecordingEngine::new();
    let mut adapter =
        common::registered_adapter(&engine, AdapterBuilder::new().max_queued_sends(1));
    let room_id = adapter
        .create_chat_room(ChatRoomParams::secure_one_to_one("sip:bob@example.org"))
        .unwrap();

    adapter.send_message(room_id, hello()).unwrap();
    assert!(matches!(
        adapter.send_message(room_id, hello()),
        Err(AdapterError::SendQueueFull { limit: 1, .. })
    ));
    assert_eq!(adapter.queued_sends(room_id), 1);
}

/// Test that basic rooms accept sends immediately and refuse server-only operations
#[test]
fn test_basic_room() {
    let engine = RecordingEngine::new();
    let mut adapter = common::registered_adapter(&engine, AdapterBuilder::new());
    let room_id = adapter
        .create_chat_room(ChatRoomParams::basic("sip:bob@example.org"))
        .unwrap();

    let outcome = adapter.send_message(room_id, hello()).unwrap();
    assert!(matches!(outcome, SendOutcome::Sent(id) if engine.sent_messages() == vec![id]));
    assert!(matches!(
        adapter.send_message(room_id, vec![ContentPart::text("   ")]),
        Err(AdapterError::EmptyMessage)
    ));
    assert!(matches!(
        adapter.set_ephemeral(room_id, EphemeralPolicy::enabled(15)),
        Err(AdapterError::UnsupportedOperation { .. })
    ));
    assert!(matches!(
        adapter.create_chat_room(ChatRoomParams::basic("bob")),
        Err(AdapterError::InvalidIdentity { .. })
    ));
}

/// Test group participant management against a created room
#[test]
fn test_group_participants() {
    let engine = RecordingEngine::new();
    let mut adapter = common::registered_adapter(&engine, AdapterBuilder::new());
    let room_id = adapter
        .create_chat_room(ChatRoomParams::group(
            "Team",
            vec!["sip:bob@example.org".to_string(), "sip:carol@example.org".to_string()],
        ))
        .unwrap();

    assert!(matches!(
        adapter.add_participant(room_id, "sip:dave@example.org"),
        Err(AdapterError::ChatRoomNotReady { .. })
    ));
    set_state(&mut adapter, room_id, ChatRoomState::CreationPending);
    set_state(&mut adapter, room_id, ChatRoomState::Created);

    adapter.add_participant(room_id, "sip:dave@example.org").unwrap();
    adapter.apply(
        ChatRoomEvent::ParticipantAdded {
            room_id,
            address: "sip:dave@example.org".to_string(),
        }
        .into(),
    );
    adapter
        .set_participant_admin(room_id, "sip:dave@example.org", true)
        .unwrap();
    assert!(matches!(
        adapter.remove_participant(room_id, "sip:eve@example.org"),
        Err(AdapterError::ParticipantNotFound { .. })
    ));
    adapter.take_effects();

    adapter.apply(
        ChatRoomEvent::SubjectChanged {
            room_id,
            subject: "Team".to_string(),
        }
        .into(),
    );
    assert!(adapter.take_effects().is_empty());
    assert_eq!(adapter.snapshot().room(room_id).unwrap().participants.len(), 3);
}

/// Test that a deleted room stops being the active conversation
#[test]
fn test_deleted_room_unbinds_conversation() {
    let engine = RecordingEngine::new();
    let mut adapter = common::registered_adapter(&engine, AdapterBuilder::new());
    let room_id = adapter
        .create_chat_room(ChatRoomParams::secure_one_to_one("sip:bob@example.org"))
        .unwrap();

    set_state(&mut adapter, room_id, ChatRoomState::Created);
    set_state(&mut adapter, room_id, ChatRoomState::Deleted);
    set_state(&mut adapter, room_id, ChatRoomState::Created);

    assert_eq!(adapter.active_conversation(), None);
    assert_eq!(adapter.chat_room(room_id).unwrap().state, ChatRoomState::Deleted);
}
