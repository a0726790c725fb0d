//! Gateway Integration Tests
//!
//! Each test spawns its own gateway on an ephemeral port with the in-memory
//! user store. The Redis bridge test additionally requires `REDIS_URL`.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::sync::Arc;
use std::time::Duration;

use chat_cache::{Publisher, RedisPool};
use chat_common::RedisConfig;
use chat_core::{
    BanCreatedEvent, MessageCreatedEvent, Permissions, Presence, RoomEvent, UserUpdatedEvent,
};
use chat_gateway::broadcast::EventBridge;
use chat_gateway::connection::SessionState;
use chat_gateway::protocol::{EventType, Intents, OpCode};
use integration_tests::{
    ban_created, credentials_revoked, eventually, message_created, redis_url, room_created,
    seed_user, test_session_config, typing_started, unique_id, ConnectOptions, GatewayClient,
    TestGateway, ATTIC, LOBBY,
};
use reqwest::StatusCode;

const SILENCE: Duration = Duration::from_millis(300);
const SETTLE: Duration = Duration::from_secs(3);

async fn next_user_update(client: &mut GatewayClient) -> UserUpdatedEvent {
    loop {
        let payload = client.recv_dispatch().await.unwrap();
        if payload.event == Some(EventType::UserUpdated) {
            return payload.data_as().unwrap();
        }
    }
}

async fn session_state(gateway: &TestGateway, session_id: &str) -> Option<SessionState> {
    gateway
        .state
        .registry()
        .try_get_session(session_id)
        .map(|session| session.state())
}

// ============================================================================
// Handshake Tests
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let gateway = TestGateway::start().await.expect("Failed to start gateway");
    let response = gateway.get("/health").await.expect("Request failed");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_hello_advertises_session() {
    let gateway = TestGateway::start().await.unwrap();
    let user = seed_user(&gateway.store, Permissions::DEFAULT, None);

    let client = gateway.connect(user, Intents::ROOMS).await.unwrap();

    assert!(!client.session_id.is_empty());
    assert_eq!(client.heartbeat_interval, 500);
    let session = gateway.state.registry().try_get_session(&client.session_id).unwrap();
    assert_eq!(session.user_id(), user);
    assert_eq!(session.intents(), Intents::ROOMS);
    assert!(session.is_active());
}

#[tokio::test]
async fn test_rejected_upgrades() {
    let gateway = TestGateway::start().await.unwrap();
    let user = seed_user(&gateway.store, Permissions::DEFAULT, None);
    let token = gateway.token(user);
    let intents = vec![("intents", "1".to_string())];

    let (status, body) = gateway.upgrade(None, &intents).await.unwrap().rejection();
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "MISSING_AUTHORIZATION");

    let (status, body) = gateway.upgrade(Some("garbage"), &intents).await.unwrap().rejection();
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");

    let (status, body) = gateway.upgrade(Some(&token), &[]).await.unwrap().rejection();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_HEADER");

    let bad_presence = vec![("intents", "1".to_string()), ("presence", "9".to_string())];
    let (status, _) = gateway.upgrade(Some(&token), &bad_presence).await.unwrap().rejection();
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(gateway.state.registry().is_empty());
}

#[tokio::test]
async fn test_heartbeat_ack() {
    let gateway = TestGateway::start().await.unwrap();
    let user = seed_user(&gateway.store, Permissions::DEFAULT, None);
    let mut client = gateway.connect(user, Intents::ROOMS).await.unwrap();

    client.send_heartbeat().await.unwrap();
    let ack = client.recv().await.unwrap();
    assert_eq!(ack.operation, OpCode::HeartbeatAck);
    assert!(ack.event.is_none());
    assert!(ack.data.is_none());
}

// ============================================================================
// Dispatch Tests
// ============================================================================

#[tokio::test]
async fn test_dispatch_order_is_preserved() {
    let gateway = TestGateway::start().await.unwrap();
    let user = seed_user(&gateway.store, Permissions::DEFAULT, None);
    let mut client = gateway.connect(user, Intents::ROOMS).await.unwrap();

    for name in ["first", "second", "third"] {
        assert_eq!(gateway.publish(room_created(name)).await, 1);
    }

    for expected in ["first", "second", "third"] {
        let payload = client.recv_dispatch().await.unwrap();
        assert_eq!(payload.event, Some(EventType::RoomCreated));
        let body: RoomEvent = payload.data_as().unwrap();
        assert_eq!(body.room.name, expected);
    }
}

#[tokio::test]
async fn test_intent_filtering() {
    let gateway = TestGateway::start().await.unwrap();
    let rooms_user = seed_user(&gateway.store, Permissions::DEFAULT, Some(LOBBY));
    let messages_user = seed_user(&gateway.store, Permissions::DEFAULT, Some(LOBBY));

    let mut rooms = gateway.connect(rooms_user, Intents::ROOMS).await.unwrap();
    let mut messages = gateway.connect(messages_user, Intents::MESSAGES).await.unwrap();

    gateway.publish(room_created("general")).await;
    gateway.publish(message_created(LOBBY, "hi")).await;

    assert_eq!(rooms.recv_dispatch().await.unwrap().event, Some(EventType::RoomCreated));
    rooms.expect_silence(SILENCE).await.unwrap();

    assert_eq!(
        messages.recv_dispatch().await.unwrap().event,
        Some(EventType::MessageCreated)
    );
    messages.expect_silence(SILENCE).await.unwrap();
}

#[tokio::test]
async fn test_room_scoped_delivery() {
    let gateway = TestGateway::start().await.unwrap();
    let in_lobby = seed_user(&gateway.store, Permissions::DEFAULT, Some(LOBBY));
    let in_attic = seed_user(&gateway.store, Permissions::DEFAULT, Some(ATTIC));
    let admin = seed_user(&gateway.store, Permissions::ADMINISTRATOR, None);

    let mut lobby_client = gateway.connect(in_lobby, Intents::MESSAGES).await.unwrap();
    let mut attic_client = gateway.connect(in_attic, Intents::MESSAGES).await.unwrap();
    let mut admin_client = gateway.connect(admin, Intents::MESSAGES).await.unwrap();

    assert_eq!(gateway.publish(message_created(LOBBY, "lobby only")).await, 2);

    let payload = lobby_client.recv_dispatch().await.unwrap();
    let body: MessageCreatedEvent = payload.data_as().unwrap();
    assert_eq!(body.message.content, "lobby only");
    assert_eq!(admin_client.recv_dispatch().await.unwrap().event, Some(EventType::MessageCreated));
    attic_client.expect_silence(SILENCE).await.unwrap();

    // Moving rooms takes effect on the next dispatch.
    gateway.store.set_current_room(in_attic, Some(LOBBY));
    gateway.publish(typing_started(in_lobby, LOBBY)).await;
    assert_eq!(
        attic_client.recv_dispatch().await.unwrap().event,
        Some(EventType::UserStartedTyping)
    );
}

#[tokio::test]
async fn test_ban_visible_to_moderators_only() {
    let gateway = TestGateway::start().await.unwrap();
    let moderator = seed_user(&gateway.store, Permissions::BAN_MEMBERS, None);
    let member = seed_user(&gateway.store, Permissions::DEFAULT, None);
    let target = seed_user(&gateway.store, Permissions::DEFAULT, None);

    let mut moderator_client = gateway.connect(moderator, Intents::ROOMS | Intents::USERS).await.unwrap();
    let mut member_client = gateway.connect(member, Intents::ROOMS | Intents::USERS).await.unwrap();
    let mut tooling_client = gateway.connect(member, Intents::MODERATION).await.unwrap();

    gateway.publish(ban_created(target)).await;
    // Fence so the member has something to receive after the ban would have been.
    gateway.publish(room_created("fence")).await;

    let mut moderator_events = Vec::new();
    loop {
        let event = moderator_client.recv_dispatch().await.unwrap().event.unwrap();
        moderator_events.push(event);
        if event == EventType::RoomCreated {
            break;
        }
    }
    assert!(moderator_events.contains(&EventType::BanCreated));

    loop {
        let event = member_client.recv_dispatch().await.unwrap().event.unwrap();
        assert_ne!(event, EventType::BanCreated);
        if event == EventType::RoomCreated {
            break;
        }
    }

    let payload = tooling_client.recv_dispatch().await.unwrap();
    assert_eq!(payload.event, Some(EventType::BanCreated));
}

// ============================================================================
// Presence Tests
// ============================================================================

#[tokio::test]
async fn test_presence_follows_last_session() {
    let gateway = TestGateway::start().await.unwrap();
    let watcher = seed_user(&gateway.store, Permissions::DEFAULT, None);
    let alice = seed_user(&gateway.store, Permissions::DEFAULT, None);

    let mut watcher_client = gateway.connect(watcher, Intents::USERS).await.unwrap();
    assert_eq!(next_user_update(&mut watcher_client).await.user.id, watcher);

    let first = gateway.connect(alice, Intents::ROOMS).await.unwrap();
    let update = next_user_update(&mut watcher_client).await;
    assert_eq!(update.user.id, alice);
    assert_eq!(update.user.presence, Presence::Online);

    let second = gateway.connect(alice, Intents::ROOMS).await.unwrap();
    watcher_client.expect_silence(SILENCE).await.unwrap();

    first.close().await.unwrap();
    watcher_client.expect_silence(SILENCE).await.unwrap();
    assert_eq!(gateway.store.presence(alice), Some(Presence::Online));

    second.close().await.unwrap();
    let update = next_user_update(&mut watcher_client).await;
    assert_eq!(update.user.id, alice);
    assert_eq!(update.user.presence, Presence::Offline);
    assert_eq!(gateway.store.presence(alice), Some(Presence::Offline));
}

#[tokio::test]
async fn test_invisible_connect_appears_offline() {
    let gateway = TestGateway::start().await.unwrap();
    let watcher = seed_user(&gateway.store, Permissions::DEFAULT, None);
    let alice = seed_user(&gateway.store, Permissions::DEFAULT, None);

    let mut watcher_client = gateway.connect(watcher, Intents::USERS).await.unwrap();
    next_user_update(&mut watcher_client).await;

    let _alice_client = gateway
        .connect_with(ConnectOptions::new(alice, Intents::ROOMS).presence(0))
        .await
        .unwrap();

    let update = next_user_update(&mut watcher_client).await;
    assert_eq!(update.user.id, alice);
    assert_eq!(update.user.presence, Presence::Offline);
    assert_eq!(gateway.state.presence().online_users(), 2);
}

#[tokio::test]
async fn test_client_presence_update() {
    let gateway = TestGateway::start().await.unwrap();
    let alice = seed_user(&gateway.store, Permissions::DEFAULT, None);

    let mut client = gateway.connect(alice, Intents::USERS).await.unwrap();
    assert_eq!(next_user_update(&mut client).await.user.presence, Presence::Online);

    client.send_presence(0).await.unwrap();
    let update = next_user_update(&mut client).await;
    assert_eq!(update.user.id, alice);
    assert_eq!(update.user.presence, Presence::Offline);
    assert_eq!(gateway.store.presence(alice), Some(Presence::Offline));

    client.send_presence(1).await.unwrap();
    assert_eq!(next_user_update(&mut client).await.user.presence, Presence::Online);
}

// ============================================================================
// Resume Tests
// ============================================================================

#[tokio::test]
async fn test_resume_keeps_session_and_intents() {
    let gateway = TestGateway::start().await.unwrap();
    let alice = seed_user(&gateway.store, Permissions::DEFAULT, None);

    let first = gateway.connect(alice, Intents::ROOMS).await.unwrap();
    let session_id = first.session_id.clone();
    first.close().await.unwrap();

    assert!(
        eventually(SETTLE, || async {
            session_state(&gateway, &session_id).await == Some(SessionState::Closed)
        })
        .await
    );

    let mut resumed = gateway
        .connect_with(ConnectOptions::new(alice, Intents::MESSAGES).resume(session_id.clone()))
        .await
        .unwrap();
    assert_eq!(resumed.session_id, session_id);
    assert_eq!(gateway.state.registry().len(), 1);

    gateway.publish(room_created("after resume")).await;
    assert_eq!(resumed.recv_dispatch().await.unwrap().event, Some(EventType::RoomCreated));
}

#[tokio::test]
async fn test_resume_rejections() {
    let gateway = TestGateway::start().await.unwrap();
    let alice = seed_user(&gateway.store, Permissions::DEFAULT, None);
    let mallory = seed_user(&gateway.store, Permissions::DEFAULT, None);

    let client = gateway.connect(alice, Intents::ROOMS).await.unwrap();

    let attempt = |user, session_id: &str| ConnectOptions::new(user, Intents::ROOMS).resume(session_id);

    let unknown = attempt(alice, "no-such-session");
    let (status, body) = gateway
        .upgrade(Some(&gateway.token(alice)), &unknown.headers())
        .await
        .unwrap()
        .rejection();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "UNKNOWN_SESSION");

    let stolen = attempt(mallory, &client.session_id);
    let (status, body) = gateway
        .upgrade(Some(&gateway.token(mallory)), &stolen.headers())
        .await
        .unwrap()
        .rejection();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "SESSION_OWNER_MISMATCH");

    let duplicate = attempt(alice, &client.session_id);
    let (status, body) = gateway
        .upgrade(Some(&gateway.token(alice)), &duplicate.headers())
        .await
        .unwrap()
        .rejection();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "SESSION_ALREADY_ACTIVE");
}

#[tokio::test]
async fn test_resume_after_window_expires() {
    let mut config = test_session_config();
    config.resume_window = Duration::from_millis(200);
    config.sweep_interval = Duration::from_secs(60);
    let gateway = TestGateway::start_with_config(config).await.unwrap();
    let alice = seed_user(&gateway.store, Permissions::DEFAULT, None);

    let client = gateway.connect(alice, Intents::ROOMS).await.unwrap();
    let session_id = client.session_id.clone();
    client.close().await.unwrap();

    assert!(
        eventually(SETTLE, || async {
            session_state(&gateway, &session_id).await == Some(SessionState::Closed)
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(400)).await;

    let options = ConnectOptions::new(alice, Intents::ROOMS).resume(session_id);
    let (status, body) = gateway
        .upgrade(Some(&gateway.token(alice)), &options.headers())
        .await
        .unwrap()
        .rejection();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "SESSION_EXPIRED");
}

#[tokio::test]
async fn test_sweeper_evicts_expired_sessions() {
    let mut config = test_session_config();
    config.resume_window = Duration::from_millis(100);
    config.sweep_interval = Duration::from_millis(100);
    let gateway = TestGateway::start_with_config(config).await.unwrap();
    let alice = seed_user(&gateway.store, Permissions::DEFAULT, None);

    let client = gateway.connect(alice, Intents::ROOMS).await.unwrap();
    client.close().await.unwrap();

    assert!(eventually(SETTLE, || async { gateway.state.registry().is_empty() }).await);
}

// ============================================================================
// Close Code Tests
// ============================================================================

#[tokio::test]
async fn test_malformed_frame_closes_with_invalid_payload() {
    let gateway = TestGateway::start().await.unwrap();
    let user = seed_user(&gateway.store, Permissions::DEFAULT, None);
    let mut client = gateway.connect(user, Intents::ROOMS).await.unwrap();

    client.send_text("{not json").await.unwrap();
    assert_eq!(client.expect_close().await.unwrap(), 4002);
}

#[tokio::test]
async fn test_server_opcode_closes_with_unknown_operation() {
    let gateway = TestGateway::start().await.unwrap();
    let user = seed_user(&gateway.store, Permissions::DEFAULT, None);
    let mut client = gateway.connect(user, Intents::ROOMS).await.unwrap();

    client.send_text(r#"{"operation":10}"#).await.unwrap();
    assert_eq!(client.expect_close().await.unwrap(), 4001);
}

#[tokio::test]
async fn test_silent_client_times_out() {
    let gateway = TestGateway::start().await.unwrap();
    let user = seed_user(&gateway.store, Permissions::DEFAULT, None);
    let mut client = gateway.connect(user, Intents::ROOMS).await.unwrap();

    assert_eq!(client.expect_close().await.unwrap(), 4003);

    // Timed-out sessions stay resumable.
    let session_id = client.session_id.clone();
    assert!(
        eventually(SETTLE, || async {
            session_state(&gateway, &session_id).await == Some(SessionState::Closed)
        })
        .await
    );
    let resumed = gateway
        .connect_with(ConnectOptions::new(user, Intents::ROOMS).resume(session_id.clone()))
        .await
        .unwrap();
    assert_eq!(resumed.session_id, session_id);
}

#[tokio::test]
async fn test_heartbeats_keep_session_alive() {
    let gateway = TestGateway::start().await.unwrap();
    let user = seed_user(&gateway.store, Permissions::DEFAULT, None);
    let mut client = gateway.connect(user, Intents::ROOMS).await.unwrap();

    for _ in 0..6 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        client.send_heartbeat().await.unwrap();
        assert_eq!(client.recv().await.unwrap().operation, OpCode::HeartbeatAck);
    }

    let session = gateway.state.registry().try_get_session(&client.session_id).unwrap();
    assert!(session.is_active());
}

#[tokio::test]
async fn test_ban_disconnects_target() {
    let gateway = TestGateway::start().await.unwrap();
    let target = seed_user(&gateway.store, Permissions::DEFAULT, None);
    let bystander = seed_user(&gateway.store, Permissions::DEFAULT, None);

    let mut target_client = gateway
        .connect(target, Intents::USERS | Intents::MODERATION)
        .await
        .unwrap();
    let bystander_client = gateway.connect(bystander, Intents::ROOMS).await.unwrap();

    gateway.publish(ban_created(target)).await;

    loop {
        let payload = target_client.recv_dispatch().await.unwrap();
        if payload.event == Some(EventType::BanCreated) {
            let body: BanCreatedEvent = payload.data_as().unwrap();
            assert_eq!(body.ban.user_id, target);
            break;
        }
    }
    assert_eq!(target_client.expect_close().await.unwrap(), 4005);

    let session_id = target_client.session_id.clone();
    assert!(
        eventually(SETTLE, || async {
            session_state(&gateway, &session_id).await.is_none()
        })
        .await
    );
    assert!(
        eventually(SETTLE, || async {
            gateway.store.presence(target) == Some(Presence::Offline)
        })
        .await
    );

    let options = ConnectOptions::new(target, Intents::USERS).resume(session_id);
    let (status, _) = gateway
        .upgrade(Some(&gateway.token(target)), &options.headers())
        .await
        .unwrap()
        .rejection();
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let bystander_session = gateway
        .state
        .registry()
        .try_get_session(&bystander_client.session_id)
        .unwrap();
    assert!(bystander_session.is_active());
}

#[tokio::test]
async fn test_revoked_credentials_close_every_session() {
    let gateway = TestGateway::start().await.unwrap();
    let alice = seed_user(&gateway.store, Permissions::DEFAULT, None);

    let mut first = gateway.connect(alice, Intents::ROOMS).await.unwrap();
    let mut second = gateway.connect(alice, Intents::MESSAGES).await.unwrap();

    assert_eq!(gateway.publish(credentials_revoked(alice)).await, 0);

    assert_eq!(first.expect_close().await.unwrap(), 4006);
    assert_eq!(second.expect_close().await.unwrap(), 4006);
    assert!(eventually(SETTLE, || async { gateway.state.registry().is_empty() }).await);
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_graceful_shutdown_closes_sessions() {
    let gateway = TestGateway::start().await.unwrap();
    let alice = seed_user(&gateway.store, Permissions::DEFAULT, None);
    let bob = seed_user(&gateway.store, Permissions::DEFAULT, None);
    let store = gateway.store.clone();

    let mut alice_client = gateway.connect(alice, Intents::ROOMS).await.unwrap();
    let mut bob_client = gateway.connect(bob, Intents::ROOMS).await.unwrap();
    assert!(eventually(SETTLE, || async { store.presence(bob) == Some(Presence::Online) }).await);

    let shutdown = tokio::spawn(gateway.shutdown());

    assert_eq!(alice_client.expect_close().await.unwrap(), 4004);
    assert_eq!(bob_client.expect_close().await.unwrap(), 4004);

    shutdown.await.unwrap().unwrap();
    assert_eq!(store.presence(alice), Some(Presence::Offline));
    assert_eq!(store.presence(bob), Some(Presence::Offline));
}

// ============================================================================
// Redis Bridge Tests
// ============================================================================

#[tokio::test]
async fn test_redis_events_reach_sessions() {
    let Some(url) = redis_url() else {
        return;
    };

    let gateway = TestGateway::start().await.unwrap();
    let redis = RedisConfig {
        url,
        max_connections: 4,
        events_channel: format!("gateway:test:{}", unique_id()),
    };

    let bridge = Arc::new(
        EventBridge::new(&redis, gateway.state.dispatcher().clone())
            .await
            .expect("Failed to subscribe"),
    );
    bridge.clone().start();

    let user = seed_user(&gateway.store, Permissions::DEFAULT, None);
    let mut client = gateway.connect(user, Intents::ROOMS).await.unwrap();

    let publisher = Publisher::new(RedisPool::from_config(&redis).unwrap(), redis.events_channel.clone());
    tokio::time::sleep(Duration::from_millis(200)).await;
    publisher.publish(&room_created("from redis")).await.unwrap();

    let payload = client.recv_dispatch().await.unwrap();
    let body: RoomEvent = payload.data_as().unwrap();
    assert_eq!(body.room.name, "from redis");

    // Anything that is not a domain event is skipped.
    publisher.publish_raw("not an event").await.unwrap();
    publisher.publish(&room_created("still flowing")).await.unwrap();
    let body: RoomEvent = client.recv_dispatch().await.unwrap().data_as().unwrap();
    assert_eq!(body.room.name, "still flowing");

    bridge.stop().await;
    assert!(!bridge.is_running());
}
