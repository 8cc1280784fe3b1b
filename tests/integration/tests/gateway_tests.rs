//! Gateway Integration Tests
//!
//! Each test starts its own gateway on an ephemeral port over the fixture
//! world; no external services are needed.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::time::Duration;

use chat_gateway::Namespace;
use integration_tests::{fixtures::*, GatewayClient, TestServer};
use serde_json::{json, Value};

// ============================================================================
// HTTP Endpoints
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::start().await.expect("Failed to start server");
    let response = server.get("/health").await.expect("Request failed");
    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_gateway_url_endpoints() {
    let server = TestServer::start().await.expect("Failed to start server");

    for path in ["/api/v6/gateway", "/api/v7/gateway"] {
        let response = server.get(path).await.expect("Request failed");
        assert!(response.status().is_success());
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({ "url": "ws://gateway.test" }));
    }
}

// ============================================================================
// Negotiation and Hello
// ============================================================================

#[tokio::test]
async fn test_hello_is_first_frame() {
    let server = TestServer::start().await.unwrap();
    let mut client = GatewayClient::open(&server.ws_url("v=6&encoding=json"), false)
        .await
        .unwrap();

    let hello = client.recv().await.unwrap();
    assert_eq!(hello["op"], 10);
    assert_eq!(hello["d"]["heartbeat_interval"], 45_000);
    assert_eq!(hello["d"]["_trace"], json!(["gateway-prd-main"]));
}

#[tokio::test]
async fn test_defaults_when_query_is_empty() {
    let server = TestServer::start().await.unwrap();
    let mut client = server.connect_with("").await.unwrap();

    client.identify(&server.token(ALICE).unwrap()).await.unwrap();
    let ready = client.recv_dispatch("READY").await.unwrap();
    assert_eq!(ready["d"]["v"], 6);
}

#[tokio::test]
async fn test_invalid_version_closes_with_reason() {
    let server = TestServer::start().await.unwrap();
    let mut client = GatewayClient::open(&server.ws_url("v=5"), false).await.unwrap();

    let closed = client.recv_close().await.unwrap();
    assert_eq!(closed.code, Some(1000));
    assert_eq!(closed.reason, "Invalid gateway version");
}

#[tokio::test]
async fn test_invalid_encoding_closes_with_reason() {
    let server = TestServer::start().await.unwrap();
    let mut client = GatewayClient::open(&server.ws_url("v=6&encoding=etf"), false)
        .await
        .unwrap();

    let closed = client.recv_close().await.unwrap();
    assert_eq!(closed.code, Some(1000));
    assert_eq!(closed.reason, "Invalid gateway encoding");
}

#[tokio::test]
async fn test_invalid_compress_closes_with_reason() {
    let server = TestServer::start().await.unwrap();
    let mut client = GatewayClient::open(&server.ws_url("v=6&compress=zstd"), false)
        .await
        .unwrap();

    let closed = client.recv_close().await.unwrap();
    assert_eq!(closed.code, Some(1000));
    assert_eq!(closed.reason, "Invalid gateway compress");
}

#[tokio::test]
async fn test_zlib_stream_frames_share_one_stream() {
    let server = TestServer::start().await.unwrap();
    let mut client = server
        .connect_with("v=7&encoding=json&compress=zlib-stream")
        .await
        .unwrap();

    client.identify(&server.token(ALICE).unwrap()).await.unwrap();
    let ready = client.recv_dispatch("READY").await.unwrap();
    assert_eq!(ready["d"]["v"], 7);

    client.heartbeat(Some(1)).await.unwrap();
    let ack = client.recv_op(11).await.unwrap();
    assert_eq!(ack["op"], 11);
}

#[tokio::test]
async fn test_binary_encoding_handshake() {
    let server = TestServer::start().await.unwrap();
    let mut client = server.connect_with("v=6&encoding=binary").await.unwrap();

    client.identify(&server.token(ALICE).unwrap()).await.unwrap();
    let ready = client.recv_dispatch("READY").await.unwrap();
    assert_eq!(ready["s"], 1);
    assert_eq!(ready["d"]["user"]["id"], "1001");
    assert_eq!(ready["d"]["v"], 6);

    client.heartbeat(Some(1)).await.unwrap();
    let ack = client.recv_op(11).await.unwrap();
    assert_eq!(ack["op"], 11);
}

#[tokio::test]
async fn test_binary_encoding_with_zlib_stream() {
    let server = TestServer::start().await.unwrap();
    let mut client = server
        .connect_with("v=7&encoding=binary&compress=zlib-stream")
        .await
        .unwrap();

    client.identify(&server.token(BOB).unwrap()).await.unwrap();
    let ready = client.recv_dispatch("READY").await.unwrap();
    assert_eq!(ready["d"]["user"]["id"], "1002");

    server
        .state
        .dispatcher()
        .dispatch_user(BOB, "TEST_EVENT", &json!({ "nested": { "n": [1, 2] } }));
    let event = client.recv_dispatch("TEST_EVENT").await.unwrap();
    assert_eq!(event["d"]["nested"]["n"], json!([1, 2]));
}

#[tokio::test]
async fn test_undecodable_binary_frame_closes_4002() {
    let server = TestServer::start().await.unwrap();
    let mut client = server.connect_with("v=6&encoding=binary").await.unwrap();

    client.send_bytes(vec![0xff, 0x01]).await.unwrap();
    let closed = client.recv_close().await.unwrap();
    assert_eq!(closed.code, Some(4002));
}

// ============================================================================
// Identify
// ============================================================================

#[tokio::test]
async fn test_identify_ready_snapshot() {
    let server = TestServer::start().await.unwrap();
    let (_client, ready) = server.identify(ALICE).await.unwrap();

    assert_eq!(ready["op"], 0);
    assert_eq!(ready["s"], 1);

    let d = &ready["d"];
    assert_eq!(d["v"], 6);
    assert_eq!(d["user"]["id"], "1001");
    assert_eq!(d["user"]["username"], "alice");
    assert_eq!(d["_trace"], json!(["gateway-prd-main"]));

    let guilds = d["guilds"].as_array().unwrap();
    assert_eq!(guilds.len(), 1);
    assert_eq!(guilds[0]["id"], "2001");
    assert_eq!(guilds[0]["member_count"], 2);
    assert_eq!(guilds[0]["channels"][0]["id"], "3001");

    assert_eq!(d["private_channels"][0]["id"], "3002");
    assert_eq!(d["relationships"], json!([{ "id": "1003", "type": 1 }]));

    let session_id = d["session_id"].as_str().unwrap();
    assert!(server.state.registry().get(session_id).is_some());
    assert_eq!(server.state.registry().sessions_for_user(ALICE).len(), 1);
}

#[tokio::test]
async fn test_identify_accepts_bearer_prefix() {
    let server = TestServer::start().await.unwrap();
    let mut client = server.connect().await.unwrap();
    let token = format!("Bearer {}", server.token(BOB).unwrap());

    client.identify(&token).await.unwrap();
    let ready = client.recv_dispatch("READY").await.unwrap();
    assert_eq!(ready["d"]["user"]["id"], "1002");
}

#[tokio::test]
async fn test_identify_with_bad_token_closes_4004() {
    let server = TestServer::start().await.unwrap();
    let mut client = server.connect().await.unwrap();

    client.identify("not-a-token").await.unwrap();
    let closed = client.recv_close().await.unwrap();
    assert_eq!(closed.code, Some(4004));
}

#[tokio::test]
async fn test_identify_unknown_user_closes_4004() {
    let server = TestServer::start().await.unwrap();
    let mut client = server.connect().await.unwrap();

    let token = server.token(chat_core::Snowflake::new(9999)).unwrap();
    client.identify(&token).await.unwrap();
    let closed = client.recv_close().await.unwrap();
    assert_eq!(closed.code, Some(4004));
}

#[tokio::test]
async fn test_second_identify_closes_4005() {
    let server = TestServer::start().await.unwrap();
    let (mut client, _) = server.identify(ALICE).await.unwrap();

    client.identify(&server.token(ALICE).unwrap()).await.unwrap();
    let closed = client.recv_close().await.unwrap();
    assert_eq!(closed.code, Some(4005));
}

// ============================================================================
// Protocol errors
// ============================================================================

#[tokio::test]
async fn test_heartbeat_before_identify_closes_4003() {
    let server = TestServer::start().await.unwrap();
    let mut client = server.connect().await.unwrap();

    client.heartbeat(None).await.unwrap();
    let closed = client.recv_close().await.unwrap();
    assert_eq!(closed.code, Some(4003));
    assert!(server.state.registry().is_empty());
}

#[tokio::test]
async fn test_garbage_frame_closes_4002() {
    let server = TestServer::start().await.unwrap();
    let mut client = server.connect().await.unwrap();

    client.send_json(&json!("just a string")).await.unwrap();
    let closed = client.recv_close().await.unwrap();
    assert_eq!(closed.code, Some(4002));
}

#[tokio::test]
async fn test_malformed_identify_payload_closes_4002() {
    let server = TestServer::start().await.unwrap();
    let mut client = server.connect().await.unwrap();

    client.send_json(&json!({ "op": 2, "d": { "tok": 1 } })).await.unwrap();
    let closed = client.recv_close().await.unwrap();
    assert_eq!(closed.code, Some(4002));
}

// ============================================================================
// Heartbeat
// ============================================================================

#[tokio::test]
async fn test_heartbeat_is_acknowledged() {
    let server = TestServer::start().await.unwrap();
    let (mut client, ready) = server.identify(ALICE).await.unwrap();

    client.heartbeat(ready["s"].as_u64()).await.unwrap();
    let ack = client.recv_op(11).await.unwrap();
    assert_eq!(ack["op"], 11);
}

#[tokio::test]
async fn test_missed_heartbeat_closes_4009() {
    let server = TestServer::start_with(|config| {
        config.gateway.heartbeat_interval_ms = 200;
        config.gateway.heartbeat_grace_ms = 100;
    })
    .await
    .unwrap();
    let (mut client, _) = server.identify(ALICE).await.unwrap();

    let closed = client.recv_close().await.unwrap();
    assert_eq!(closed.code, Some(4009));

    server
        .wait_for(|state| state.registry().sessions_for_user(ALICE).is_empty())
        .await
        .unwrap();
    // Timed-out sessions stay resumable
    server
        .wait_for(|state| state.registry().retained_count() == 1)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_heartbeats_keep_connection_alive() {
    let server = TestServer::start_with(|config| {
        config.gateway.heartbeat_interval_ms = 200;
        config.gateway.heartbeat_grace_ms = 100;
    })
    .await
    .unwrap();
    let (mut client, _) = server.identify(ALICE).await.unwrap();

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(150)).await;
        client.heartbeat(None).await.unwrap();
        client.recv_op(11).await.unwrap();
    }
    assert_eq!(server.state.registry().sessions_for_user(ALICE).len(), 1);
}

// ============================================================================
// Fan-out
// ============================================================================

#[tokio::test]
async fn test_channel_dispatch_reaches_subscribers_only() {
    let server = TestServer::start().await.unwrap();
    let (mut alice, _) = server.identify(ALICE).await.unwrap();
    let (mut bob, _) = server.identify(BOB).await.unwrap();
    let (mut dave, _) = server.identify(DAVE).await.unwrap();

    let message = json!({ "id": "1", "channel_id": "3001", "content": "hi" });
    let reached = server
        .state
        .dispatcher()
        .dispatch(Namespace::Channel, GENERAL, "MESSAGE_CREATE", &message);
    assert_eq!(reached.len(), 2);

    let frame = alice.recv_dispatch("MESSAGE_CREATE").await.unwrap();
    assert_eq!(frame["d"], message);
    let frame = bob.recv_dispatch("MESSAGE_CREATE").await.unwrap();
    assert_eq!(frame["d"], message);
    assert!(dave.is_quiet(Duration::from_millis(200)).await);
}

#[tokio::test]
async fn test_dispatch_user_reaches_every_session() {
    let server = TestServer::start().await.unwrap();
    let (mut phone, _) = server.identify(BOB).await.unwrap();
    let (mut desktop, _) = server.identify(BOB).await.unwrap();

    let reached = server
        .state
        .dispatcher()
        .dispatch_user(BOB, "USER_NOTE_UPDATE", &json!({ "id": "1001", "note": "hi" }));
    assert_eq!(reached.len(), 2);
    assert_ne!(reached[0], reached[1]);

    phone.recv_dispatch("USER_NOTE_UPDATE").await.unwrap();
    desktop.recv_dispatch("USER_NOTE_UPDATE").await.unwrap();
}

#[tokio::test]
async fn test_dm_dispatch_reaches_both_recipients() {
    let server = TestServer::start().await.unwrap();
    let (mut alice, _) = server.identify(ALICE).await.unwrap();
    let (mut bob, _) = server.identify(BOB).await.unwrap();

    let reached = server.state.dispatcher().dispatch(
        Namespace::Channel,
        ALICE_BOB_DM,
        "TYPING_START",
        &json!({ "channel_id": "3002", "user_id": "1001" }),
    );
    assert_eq!(reached.len(), 2);

    alice.recv_dispatch("TYPING_START").await.unwrap();
    bob.recv_dispatch("TYPING_START").await.unwrap();
}

#[tokio::test]
async fn test_sequence_numbers_increase_per_session() {
    let server = TestServer::start().await.unwrap();
    let (mut client, ready) = server.identify(DAVE).await.unwrap();
    let mut last = ready["s"].as_u64().unwrap();

    for n in 0..3 {
        server
            .state
            .dispatcher()
            .dispatch_user(DAVE, "TEST_EVENT", &json!({ "n": n }));
        let frame = client.recv_dispatch("TEST_EVENT").await.unwrap();
        let seq = frame["s"].as_u64().unwrap();
        assert!(seq > last);
        last = seq;
    }
}

#[tokio::test]
async fn test_friend_comes_online() {
    let server = TestServer::start().await.unwrap();
    let (mut alice, _) = server.identify(ALICE).await.unwrap();
    let (_carol, _) = server.identify(CAROL).await.unwrap();

    loop {
        let frame = alice.recv_dispatch("PRESENCE_UPDATE").await.unwrap();
        if frame["d"]["user"]["id"] == "1003" {
            assert_eq!(frame["d"]["status"], "online");
            break;
        }
    }
}

#[tokio::test]
async fn test_guild_member_removal_flow() {
    let server = TestServer::start().await.unwrap();
    let (mut alice, _) = server.identify(ALICE).await.unwrap();
    let (mut bob, _) = server.identify(BOB).await.unwrap();

    server.store.remove_member(GUILD, BOB);
    server
        .state
        .dispatcher()
        .remove_guild_member(server.state.storage(), GUILD, BOB)
        .await
        .unwrap();

    let deleted = bob.recv_dispatch("GUILD_DELETE").await.unwrap();
    assert_eq!(deleted["d"], json!({ "id": "2001", "unavailable": false }));

    let removed = alice.recv_dispatch("GUILD_MEMBER_REMOVE").await.unwrap();
    assert_eq!(removed["d"]["user"]["id"], "1002");

    // Bob no longer hears the guild's channel
    let reached = server.state.dispatcher().dispatch(
        Namespace::Channel,
        GENERAL,
        "MESSAGE_CREATE",
        &json!({ "content": "after" }),
    );
    assert_eq!(reached.len(), 1);

    // Nor anything addressed to it as a member of the guild
    let reached = server.state.dispatcher().dispatch_user_guild(
        BOB,
        GUILD,
        "GUILD_UPDATE",
        &json!({ "id": "2001" }),
    );
    assert!(reached.is_empty());
    assert!(bob.is_quiet(Duration::from_millis(200)).await);
}

#[tokio::test]
async fn test_member_list_sync_on_identify() {
    let server = TestServer::start().await.unwrap();
    let (mut alice, _) = server.identify(ALICE).await.unwrap();

    let update = alice.recv_dispatch("GUILD_MEMBER_LIST_UPDATE").await.unwrap();
    assert_eq!(update["d"]["guild_id"], "2001");
    assert_eq!(update["d"]["member_count"], 2);
    assert_eq!(update["d"]["ops"][0]["op"], "SYNC");
}

// ============================================================================
// Resume
// ============================================================================

#[tokio::test]
async fn test_resume_unknown_session_keeps_connection_open() {
    let server = TestServer::start().await.unwrap();
    let mut client = server.connect().await.unwrap();
    let token = server.token(ALICE).unwrap();

    client.resume(&token, "no-such-session", 0).await.unwrap();
    let invalid = client.recv_op(9).await.unwrap();
    assert_eq!(invalid["d"], false);

    // Still in the handshake; a fresh identify works on the same socket
    client.identify(&token).await.unwrap();
    let ready = client.recv_dispatch("READY").await.unwrap();
    assert_eq!(ready["s"], 1);
}

#[tokio::test]
async fn test_resume_replays_missed_events() {
    let server = TestServer::start().await.unwrap();
    let token = server.token(ALICE).unwrap();
    let (mut first, ready) = server.identify(ALICE).await.unwrap();
    let session_id = ready["d"]["session_id"].as_str().unwrap().to_string();

    // Identify is complete once the member list sync arrives
    first.recv_dispatch("GUILD_MEMBER_LIST_UPDATE").await.unwrap();

    server
        .state
        .dispatcher()
        .dispatch_user(ALICE, "TEST_EVENT", &json!({ "n": 1 }));
    let seen = first.recv_dispatch("TEST_EVENT").await.unwrap();
    let seen_seq = seen["s"].as_u64().unwrap();

    first.close(4000).await.unwrap();
    server
        .wait_for(|state| {
            state.registry().sessions_for_user(ALICE).is_empty()
                && state.registry().retained_count() == 1
        })
        .await
        .unwrap();

    // Missed while disconnected, still counted as delivered
    let reached = server
        .state
        .dispatcher()
        .dispatch_user(ALICE, "TEST_EVENT", &json!({ "n": 2 }));
    assert_eq!(reached, vec![session_id.clone()]);

    let mut second = server.connect().await.unwrap();
    second.resume(&token, &session_id, seen_seq).await.unwrap();

    let replayed = second.recv_dispatch("TEST_EVENT").await.unwrap();
    assert_eq!(replayed["d"]["n"], 2);
    assert!(replayed["s"].as_u64().unwrap() > seen_seq);
    second.recv_dispatch("RESUMED").await.unwrap();

    assert_eq!(server.state.registry().sessions_for_user(ALICE).len(), 1);
    assert_eq!(server.state.registry().retained_count(), 0);
}

#[tokio::test]
async fn test_resume_during_dispatch_loses_no_events() {
    const EVENTS: u64 = 100;

    let server = TestServer::start().await.unwrap();
    let token = server.token(ALICE).unwrap();
    let (mut first, ready) = server.identify(ALICE).await.unwrap();
    let session_id = ready["d"]["session_id"].as_str().unwrap().to_string();
    first.recv_dispatch("GUILD_MEMBER_LIST_UPDATE").await.unwrap();

    first.close(4000).await.unwrap();
    server
        .wait_for(|state| state.registry().retained_count() == 1)
        .await
        .unwrap();

    let mut second = server.connect().await.unwrap();
    let state = server.state.clone();
    let dispatching = tokio::spawn(async move {
        let mut misses = 0;
        for n in 0..EVENTS {
            if state
                .dispatcher()
                .dispatch_user(ALICE, "TEST_EVENT", &json!({ "n": n }))
                .is_empty()
            {
                misses += 1;
            }
            tokio::task::yield_now().await;
        }
        misses
    });
    second.resume(&token, &session_id, 0).await.unwrap();

    assert_eq!(dispatching.await.unwrap(), 0);

    // Replayed or live, every event arrives once and in order
    let mut seen = Vec::new();
    while seen.len() < EVENTS as usize {
        let frame = second.recv_dispatch("TEST_EVENT").await.unwrap();
        seen.push(frame["d"]["n"].as_u64().unwrap());
    }
    assert_eq!(seen, (0..EVENTS).collect::<Vec<_>>());
    assert_eq!(server.state.registry().retained_count(), 0);
}

#[tokio::test]
async fn test_resume_of_expired_session_keeps_connection_open() {
    let server = TestServer::start_with(|config| config.gateway.resume_window_secs = 0)
        .await
        .unwrap();
    let token = server.token(ALICE).unwrap();
    let (mut first, ready) = server.identify(ALICE).await.unwrap();
    let session_id = ready["d"]["session_id"].as_str().unwrap().to_string();

    first.close(4000).await.unwrap();
    server
        .wait_for(|state| state.registry().sessions_for_user(ALICE).is_empty())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut second = server.connect().await.unwrap();
    second.resume(&token, &session_id, 1).await.unwrap();
    let invalid = second.recv_op(9).await.unwrap();
    assert_eq!(invalid["d"], false);

    second.identify(&token).await.unwrap();
    second.recv_dispatch("READY").await.unwrap();
}

#[tokio::test]
async fn test_resume_after_normal_close_is_invalid() {
    let server = TestServer::start().await.unwrap();
    let token = server.token(ALICE).unwrap();
    let (mut first, ready) = server.identify(ALICE).await.unwrap();
    let session_id = ready["d"]["session_id"].as_str().unwrap().to_string();

    first.close(1000).await.unwrap();
    server
        .wait_for(|state| state.registry().sessions_for_user(ALICE).is_empty())
        .await
        .unwrap();
    assert_eq!(server.state.registry().retained_count(), 0);

    let mut second = server.connect().await.unwrap();
    second.resume(&token, &session_id, 1).await.unwrap();
    let invalid = second.recv_op(9).await.unwrap();
    assert_eq!(invalid["d"], false);
}

#[tokio::test]
async fn test_resume_as_another_user_is_invalid() {
    let server = TestServer::start().await.unwrap();
    let (mut first, ready) = server.identify(ALICE).await.unwrap();
    let session_id = ready["d"]["session_id"].as_str().unwrap().to_string();

    first.close(4000).await.unwrap();
    server
        .wait_for(|state| state.registry().retained_count() == 1)
        .await
        .unwrap();

    let mut second = server.connect().await.unwrap();
    second
        .resume(&server.token(BOB).unwrap(), &session_id, 1)
        .await
        .unwrap();
    second.recv_op(9).await.unwrap();

    // The session is still there for its owner
    assert_eq!(server.state.registry().retained_count(), 1);
}

#[tokio::test]
async fn test_resume_with_future_sequence_closes_4007() {
    let server = TestServer::start().await.unwrap();
    let token = server.token(ALICE).unwrap();
    let (mut first, ready) = server.identify(ALICE).await.unwrap();
    let session_id = ready["d"]["session_id"].as_str().unwrap().to_string();

    first.close(4000).await.unwrap();
    server
        .wait_for(|state| state.registry().retained_count() == 1)
        .await
        .unwrap();

    let mut second = server.connect().await.unwrap();
    second.resume(&token, &session_id, 9_999).await.unwrap();
    let closed = second.recv_close().await.unwrap();
    assert_eq!(closed.code, Some(4007));
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_asks_clients_to_reconnect() {
    let mut server = TestServer::start().await.unwrap();
    let (mut client, _) = server.identify(ALICE).await.unwrap();

    let (stopped, closed) = tokio::join!(server.shutdown(), async {
        let reconnect = client.recv_op(7).await?;
        let closed = client.recv_close().await?;
        anyhow::Ok((reconnect, closed))
    });

    stopped.unwrap();
    let (reconnect, closed) = closed.unwrap();
    assert_eq!(reconnect["op"], 7);
    assert_eq!(closed.code, Some(4000));
}
