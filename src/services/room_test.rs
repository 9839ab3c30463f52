use super::*;
use crate::state::test_helpers;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};

async fn recv_message(rx: &mut mpsc::Receiver<ServerMessage>) -> ServerMessage {
    timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("message receive timed out")
        .expect("channel closed")
}

async fn assert_no_message(rx: &mut mpsc::Receiver<ServerMessage>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected no message"
    );
}

fn object(value: serde_json::Value) -> JsonObject {
    value.as_object().cloned().expect("value must be an object")
}

async fn project_state(state: &AppState, room_id: &str) -> Option<JsonObject> {
    let rooms = state.rooms.read().await;
    rooms.get(room_id).and_then(|room| room.project_state.clone())
}

#[tokio::test]
async fn first_join_creates_room_and_lists_only_joiner() {
    let state = test_helpers::test_app_state();
    let (mut session, mut rx) = test_helpers::test_session();

    let replies = join_room(&state, &mut session, "r1", "u1", Some("Ada")).await;

    assert_eq!(replies.len(), 1, "no project-state for a fresh room");
    let ServerMessage::UsersInRoom { users } = &replies[0] else {
        panic!("expected users-in-room, got {:?}", replies[0]);
    };
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, "u1");
    assert_eq!(users[0].name, "Ada");
    assert_eq!(session.binding, Some(Binding { room_id: "r1".into(), user_id: "u1".into() }));
    assert!(state.rooms.read().await.contains_key("r1"));
    assert_no_message(&mut rx).await;
}

#[tokio::test]
async fn second_join_notifies_peer_but_not_joiner() {
    let state = test_helpers::test_app_state();
    let (mut alice, mut alice_rx) = test_helpers::test_session();
    let (mut bob, mut bob_rx) = test_helpers::test_session();

    join_room(&state, &mut alice, "r1", "alice", Some("Alice")).await;
    let replies = join_room(&state, &mut bob, "r1", "bob", None).await;

    let ServerMessage::UserJoined { user } = recv_message(&mut alice_rx).await else {
        panic!("expected user-joined");
    };
    assert_eq!(user.id, "bob");
    assert_eq!(user.name, "Anonymous");
    assert_no_message(&mut bob_rx).await;

    let ServerMessage::UsersInRoom { users } = replies.last().expect("users-in-room reply") else {
        panic!("expected users-in-room");
    };
    let mut ids: Vec<&str> = users.iter().map(|u| u.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, ["alice", "bob"]);
}

#[tokio::test]
async fn join_sends_project_state_before_users_when_state_exists() {
    let state = test_helpers::test_app_state();
    let (mut alice, _alice_rx) = test_helpers::test_session();
    let (mut bob, _bob_rx) = test_helpers::test_session();

    join_room(&state, &mut alice, "r1", "alice", None).await;
    update_content(&state, alice.conn_id, "r1", "alice", object(json!({"title": "Intro"}))).await;
    let replies = join_room(&state, &mut bob, "r1", "bob", None).await;

    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0], ServerMessage::ProjectState { state: object(json!({"title": "Intro"})) });
    assert!(matches!(replies[1], ServerMessage::UsersInRoom { .. }));
}

#[tokio::test]
async fn content_update_reaches_every_member_but_sender() {
    let state = test_helpers::test_app_state();
    let (mut a, mut a_rx) = test_helpers::test_session();
    let (mut b, mut b_rx) = test_helpers::test_session();
    let (mut c, mut c_rx) = test_helpers::test_session();

    join_room(&state, &mut a, "r1", "a", None).await;
    join_room(&state, &mut b, "r1", "b", None).await;
    join_room(&state, &mut c, "r1", "c", None).await;
    // Drain join notifications.
    while a_rx.try_recv().is_ok() {}
    while b_rx.try_recv().is_ok() {}

    let applied = update_content(&state, a.conn_id, "r1", "a", object(json!({"x": 1}))).await;
    assert!(applied);

    let expected = ServerMessage::ContentUpdate { content_update: object(json!({"x": 1})), user_id: "a".into() };
    assert_eq!(recv_message(&mut b_rx).await, expected);
    assert_eq!(recv_message(&mut c_rx).await, expected);
    assert_no_message(&mut a_rx).await;
}

#[tokio::test]
async fn content_updates_merge_shallowly_last_write_wins() {
    let state = test_helpers::test_app_state();
    let (mut a, _rx) = test_helpers::test_session();
    join_room(&state, &mut a, "r1", "a", None).await;

    update_content(&state, a.conn_id, "r1", "a", object(json!({"x": 1}))).await;
    update_content(&state, a.conn_id, "r1", "a", object(json!({"x": 2, "y": 1}))).await;
    assert_eq!(project_state(&state, "r1").await, Some(object(json!({"x": 2, "y": 1}))));

    update_content(&state, a.conn_id, "r1", "a", object(json!({"a": {"p": 1}}))).await;
    update_content(&state, a.conn_id, "r1", "a", object(json!({"a": {"q": 2}}))).await;
    assert_eq!(
        project_state(&state, "r1").await,
        Some(object(json!({"x": 2, "y": 1, "a": {"q": 2}})))
    );
}

#[test]
fn shallow_merge_replaces_nested_values() {
    let mut target = object(json!({"pages": [1, 2], "meta": {"title": "A", "lang": "en"}}));
    shallow_merge(&mut target, object(json!({"meta": {"title": "B"}})));
    assert_eq!(target, object(json!({"pages": [1, 2], "meta": {"title": "B"}})));
}

#[tokio::test]
async fn content_update_for_unknown_room_is_dropped() {
    let state = test_helpers::test_app_state();
    let applied = update_content(&state, Uuid::new_v4(), "ghost", "u1", object(json!({"x": 1}))).await;
    assert!(!applied);
    assert!(state.rooms.read().await.is_empty(), "update must not create a room");
}

#[tokio::test]
async fn empty_content_update_initialises_state() {
    let state = test_helpers::test_app_state();
    let (mut a, _rx) = test_helpers::test_session();
    join_room(&state, &mut a, "r1", "a", None).await;

    update_content(&state, a.conn_id, "r1", "a", JsonObject::new()).await;
    assert_eq!(project_state(&state, "r1").await, Some(JsonObject::new()));
}

#[tokio::test]
async fn explicit_leave_of_last_member_evicts_room_and_resets_state() {
    let state = test_helpers::test_app_state();
    let (mut a, _rx) = test_helpers::test_session();
    join_room(&state, &mut a, "r1", "a", None).await;
    update_content(&state, a.conn_id, "r1", "a", object(json!({"x": 1}))).await;

    assert!(leave_room(&state, &mut a).await);
    assert!(a.binding.is_none());
    assert!(!state.rooms.read().await.contains_key("r1"));

    let replies = join_room(&state, &mut a, "r1", "a", None).await;
    assert_eq!(replies.len(), 1, "fresh room has no project-state");
    assert!(project_state(&state, "r1").await.is_none());
}

#[tokio::test]
async fn explicit_leave_notifies_remaining_members() {
    let state = test_helpers::test_app_state();
    let (mut a, _a_rx) = test_helpers::test_session();
    let (mut b, mut b_rx) = test_helpers::test_session();
    join_room(&state, &mut a, "r1", "a", None).await;
    join_room(&state, &mut b, "r1", "b", None).await;

    leave_room(&state, &mut a).await;

    assert_eq!(recv_message(&mut b_rx).await, ServerMessage::UserLeft { user_id: "a".into() });
    let rooms = state.rooms.read().await;
    let room = rooms.get("r1").expect("room should remain with one member");
    assert!(!room.users.contains_key("a"));
    assert!(!room.clients.contains_key(&a.conn_id));
}

#[tokio::test]
async fn leave_without_binding_is_a_no_op() {
    let state = test_helpers::test_app_state();
    let (mut a, _rx) = test_helpers::test_session();
    assert!(!leave_room(&state, &mut a).await);
    assert!(!disconnect(&state, &mut a).await);
}

#[tokio::test]
async fn disconnect_notifies_remaining_members() {
    let state = test_helpers::test_app_state();
    let (mut a, mut a_rx) = test_helpers::test_session();
    let (mut b, mut b_rx) = test_helpers::test_session();
    join_room(&state, &mut a, "r1", "a", None).await;
    join_room(&state, &mut b, "r1", "b", None).await;

    assert!(disconnect(&state, &mut b).await);

    assert!(matches!(recv_message(&mut a_rx).await, ServerMessage::UserJoined { .. }));
    assert_eq!(recv_message(&mut a_rx).await, ServerMessage::UserLeft { user_id: "b".into() });
    assert_no_message(&mut b_rx).await;
    let rooms = state.rooms.read().await;
    assert_eq!(rooms.get("r1").map(|r| r.clients.len()), Some(1));
}

#[tokio::test]
async fn disconnect_of_last_member_evicts_room() {
    let state = test_helpers::test_app_state();
    let (mut a, mut a_rx) = test_helpers::test_session();
    join_room(&state, &mut a, "r1", "a", None).await;

    assert!(disconnect(&state, &mut a).await);
    assert!(!state.rooms.read().await.contains_key("r1"));
    assert_no_message(&mut a_rx).await;
}

#[tokio::test]
async fn rejoin_with_same_user_id_replaces_record() {
    let state = test_helpers::test_app_state();
    let (mut first, _first_rx) = test_helpers::test_session();
    let (mut second, _second_rx) = test_helpers::test_session();

    join_room(&state, &mut first, "r1", "u1", Some("Old")).await;
    update_user_info(&state, first.conn_id, "r1", "u1", &object(json!({"role": "editor"}))).await;
    join_room(&state, &mut second, "r1", "u1", Some("New")).await;

    let rooms = state.rooms.read().await;
    let room = rooms.get("r1").expect("room should exist");
    let user = room.users.get("u1").expect("user should exist");
    assert_eq!(user.name, "New");
    assert!(user.extra.is_empty(), "custom fields are dropped on rejoin");
    assert_eq!(room.clients.len(), 2, "both connections stay members");
}

#[tokio::test]
async fn joining_another_room_leaves_the_previous_one() {
    let state = test_helpers::test_app_state();
    let (mut a, _a_rx) = test_helpers::test_session();
    let (mut b, mut b_rx) = test_helpers::test_session();
    join_room(&state, &mut b, "r1", "b", None).await;
    join_room(&state, &mut a, "r1", "a", None).await;

    join_room(&state, &mut a, "r2", "a", None).await;

    let ServerMessage::UserJoined { .. } = recv_message(&mut b_rx).await else {
        panic!("expected user-joined first");
    };
    assert_eq!(recv_message(&mut b_rx).await, ServerMessage::UserLeft { user_id: "a".into() });

    let rooms = state.rooms.read().await;
    assert!(!rooms["r1"].clients.contains_key(&a.conn_id));
    assert!(rooms["r2"].clients.contains_key(&a.conn_id));
    assert_eq!(a.binding, Some(Binding { room_id: "r2".into(), user_id: "a".into() }));
}

#[tokio::test]
async fn switching_user_in_same_room_keeps_room_state() {
    let state = test_helpers::test_app_state();
    let (mut a, _rx) = test_helpers::test_session();
    join_room(&state, &mut a, "r1", "first", None).await;
    update_content(&state, a.conn_id, "r1", "first", object(json!({"x": 1}))).await;

    let replies = join_room(&state, &mut a, "r1", "second", None).await;

    assert_eq!(replies[0], ServerMessage::ProjectState { state: object(json!({"x": 1})) });
    let rooms = state.rooms.read().await;
    let room = rooms.get("r1").expect("room should survive the switch");
    assert!(!room.users.contains_key("first"));
    assert!(room.users.contains_key("second"));
    assert_eq!(room.clients.len(), 1);
}

#[tokio::test]
async fn cursor_position_carries_fresh_user_info() {
    let state = test_helpers::test_app_state();
    let (mut a, mut a_rx) = test_helpers::test_session();
    let (mut b, mut b_rx) = test_helpers::test_session();
    join_room(&state, &mut a, "r1", "a", Some("Ada")).await;
    join_room(&state, &mut b, "r1", "b", None).await;
    while a_rx.try_recv().is_ok() {}
    update_user_info(&state, a.conn_id, "r1", "a", &object(json!({"name": "Ada L."}))).await;
    while b_rx.try_recv().is_ok() {}

    let cursor = CursorPosition { page_id: Some(json!("p1")), block_id: None, position: Some(json!(12)) };
    assert!(broadcast_cursor(&state, a.conn_id, "r1", "a", cursor).await);

    let ServerMessage::CursorPosition { page_id, block_id, position, user_id, user } = recv_message(&mut b_rx).await
    else {
        panic!("expected cursor-position");
    };
    assert_eq!(page_id, Some(json!("p1")));
    assert!(block_id.is_none());
    assert_eq!(position, Some(json!(12)));
    assert_eq!(user_id, "a");
    assert_eq!(user.map(|u| u.name), Some("Ada L.".to_owned()));
    assert_no_message(&mut a_rx).await;
    assert!(project_state(&state, "r1").await.is_none(), "cursor is never stored");
}

#[tokio::test]
async fn cursor_for_unknown_room_is_dropped() {
    let state = test_helpers::test_app_state();
    assert!(!broadcast_cursor(&state, Uuid::new_v4(), "ghost", "u1", CursorPosition::default()).await);
}

#[tokio::test]
async fn user_info_update_merges_and_broadcasts() {
    let state = test_helpers::test_app_state();
    let (mut a, _a_rx) = test_helpers::test_session();
    let (mut b, mut b_rx) = test_helpers::test_session();
    join_room(&state, &mut b, "r1", "b", None).await;
    join_room(&state, &mut a, "r1", "a", Some("Ada")).await;
    let _ = recv_message(&mut b_rx).await;

    assert!(update_user_info(&state, a.conn_id, "r1", "a", &object(json!({"status": "away"}))).await);

    let ServerMessage::UserUpdated { user } = recv_message(&mut b_rx).await else {
        panic!("expected user-updated");
    };
    assert_eq!(user.id, "a");
    assert_eq!(user.name, "Ada");
    assert_eq!(user.extra.get("status"), Some(&json!("away")));
}

#[tokio::test]
async fn user_info_cannot_create_a_member() {
    let state = test_helpers::test_app_state();
    let (mut a, _rx) = test_helpers::test_session();
    join_room(&state, &mut a, "r1", "a", None).await;

    assert!(!update_user_info(&state, a.conn_id, "r1", "stranger", &object(json!({"name": "X"}))).await);
    assert!(!update_user_info(&state, a.conn_id, "ghost", "a", &object(json!({"name": "X"}))).await);
    assert!(!state.rooms.read().await["r1"].users.contains_key("stranger"));
}

#[tokio::test]
async fn list_rooms_reports_live_rooms_sorted() {
    let state = test_helpers::test_app_state();
    let (mut a, _a_rx) = test_helpers::test_session();
    let (mut b, _b_rx) = test_helpers::test_session();
    join_room(&state, &mut a, "zeta", "a", None).await;
    join_room(&state, &mut b, "alpha", "b", None).await;
    update_content(&state, b.conn_id, "alpha", "b", object(json!({"k": true}))).await;

    let rooms = list_rooms(&state).await;
    assert_eq!(
        rooms,
        vec![
            RoomSummary { room_id: "alpha".into(), clients: 1, users: 1, has_state: true },
            RoomSummary { room_id: "zeta".into(), clients: 1, users: 1, has_state: false },
        ]
    );
}
