//! End-to-end relay behavior through a running gateway.

mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use metrics_exporter_prometheus::PrometheusBuilder;
use rtc_gateway::observability::metrics::{SESSIONS_ACTIVE, SESSIONS_TOTAL, UPSTREAM_FAILURES_TOTAL};

use common::*;

/// Read until the peer closes or the stream ends. Returns the close frame if one arrived.
async fn expect_closed<S>(ws: &mut WebSocketStream<S>) -> Option<CloseFrame>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        let next = tokio::time::timeout(WINDOW, ws.next())
            .await
            .expect("leg was not closed within window");
        match next {
            Some(Ok(Message::Close(frame))) => return frame,
            Some(Ok(Message::Text(_) | Message::Binary(_))) => panic!("data after close"),
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return None,
        }
    }
}

#[tokio::test]
async fn relays_session_with_forced_origin() {
    let mut upstream = MockUpstream::start().await;
    let gateway = start_gateway(test_config(upstream.addr)).await;

    let mut client = connect_client(&gateway.ws_url("/rtasr?lang=en")).await;
    let mut conn = upstream.next_conn().await;
    assert_eq!(conn.path, "/v1/ws?lang=en");
    assert_eq!(conn.origin.as_deref(), Some(ORIGIN));

    client
        .send(Message::binary(vec![0xDE, 0xAD, 0xBE, 0xEF]))
        .await
        .unwrap();
    assert_eq!(
        next_message(&mut conn.ws).await,
        Message::binary(vec![0xDE, 0xAD, 0xBE, 0xEF])
    );

    conn.ws.send(Message::text("partial:hi")).await.unwrap();
    assert_eq!(next_message(&mut client).await, Message::text("partial:hi"));

    client.close(None).await.unwrap();
    expect_closed(&mut conn.ws).await;

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn preserves_order_and_framing() {
    let mut upstream = MockUpstream::start().await;
    let gateway = start_gateway(test_config(upstream.addr)).await;

    let mut client = connect_client(&gateway.ws_url("/rtasr")).await;
    let mut conn = upstream.next_conn().await;

    for i in 0..50u8 {
        let msg = if i % 2 == 0 {
            Message::text(format!("chunk-{i}"))
        } else {
            Message::binary(vec![i; 64])
        };
        client.send(msg).await.unwrap();
    }
    for i in 0..50u8 {
        let expected = if i % 2 == 0 {
            Message::text(format!("chunk-{i}"))
        } else {
            Message::binary(vec![i; 64])
        };
        assert_eq!(next_message(&mut conn.ws).await, expected);
    }

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn upstream_close_reaches_client() {
    let mut upstream = MockUpstream::start().await;
    let gateway = start_gateway(test_config(upstream.addr)).await;

    let mut client = connect_client(&gateway.ws_url("/rtasr")).await;
    let mut conn = upstream.next_conn().await;

    conn.ws
        .close(Some(CloseFrame {
            code: CloseCode::from(4000),
            reason: "session over".into(),
        }))
        .await
        .unwrap();

    let frame = expect_closed(&mut client).await.expect("close frame");
    assert_eq!(u16::from(frame.code), 4000);
    assert_eq!(frame.reason.as_str(), "session over");

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn sessions_are_independent() {
    let mut upstream = MockUpstream::start().await;
    let gateway = start_gateway(test_config(upstream.addr)).await;

    let mut first = connect_client(&gateway.ws_url("/rtasr?session=1")).await;
    let mut first_up = upstream.next_conn().await;
    let mut second = connect_client(&gateway.ws_url("/rtasr?session=2")).await;
    let mut second_up = upstream.next_conn().await;
    assert_eq!(first_up.path, "/v1/ws?session=1");
    assert_eq!(second_up.path, "/v1/ws?session=2");

    first.send(Message::text("one")).await.unwrap();
    second.send(Message::text("two")).await.unwrap();
    assert_eq!(next_message(&mut first_up.ws).await, Message::text("one"));
    assert_eq!(next_message(&mut second_up.ws).await, Message::text("two"));

    // Ending the first session leaves the second one running.
    first.close(None).await.unwrap();
    expect_closed(&mut first_up.ws).await;

    second_up.ws.send(Message::text("still here")).await.unwrap();
    assert_eq!(next_message(&mut second).await, Message::text("still here"));

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn unreachable_upstream_closes_client_with_error() {
    let gateway = start_gateway(test_config(dead_addr().await)).await;

    let mut client = connect_client(&gateway.ws_url("/rtasr")).await;
    let frame = expect_closed(&mut client).await.expect("close frame");
    assert_eq!(frame.code, CloseCode::Error);
    assert_eq!(frame.reason.as_str(), "upstream unavailable");

    // The gateway keeps serving.
    let resp = reqwest::get(gateway.http_url("/health")).await.unwrap();
    assert_eq!(resp.status(), 200);

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn shutdown_closes_both_legs() {
    let mut upstream = MockUpstream::start().await;
    let gateway = start_gateway(test_config(upstream.addr)).await;

    let mut client = connect_client(&gateway.ws_url("/rtasr")).await;
    let mut conn = upstream.next_conn().await;

    gateway.shutdown.trigger();

    expect_closed(&mut client).await;
    expect_closed(&mut conn.ws).await;

    tokio::time::timeout(Duration::from_secs(5), gateway.handle)
        .await
        .expect("gateway did not stop")
        .unwrap();
}

#[tokio::test]
async fn refused_upstream_handshake_closes_client_with_error() {
    let mut upstream = MockUpstream::refusing(403).await;
    let gateway = start_gateway(test_config(upstream.addr)).await;

    let mut client = connect_client(&gateway.ws_url("/rtasr?lang=en")).await;
    assert_eq!(upstream.next_refused().await, "/v1/ws?lang=en");

    let frame = expect_closed(&mut client).await.expect("close frame");
    assert_eq!(frame.code, CloseCode::Error);
    assert_eq!(frame.reason.as_str(), "upstream unavailable");

    let resp = reqwest::get(gateway.http_url("/health")).await.unwrap();
    assert_eq!(resp.status(), 200);

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn signed_query_reaches_upstream_unchanged() {
    let mut upstream = MockUpstream::start().await;
    let gateway = start_gateway(test_config(upstream.addr)).await;

    let query = "appid=abc&name='bob'&signa=a%2Bb%3D&ts=1700000000";
    let _client = connect_client(&gateway.ws_url(&format!("/rtasr?{}", query))).await;

    let conn = upstream.next_conn().await;
    assert_eq!(conn.path.as_bytes(), format!("/v1/ws?{}", query).as_bytes());

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn failed_dial_is_an_upstream_failure_not_a_session() {
    // The runtime is single-threaded, so every gateway task records here.
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    let _recorder = metrics::set_default_local_recorder(&recorder);

    let gateway = start_gateway(test_config(dead_addr().await)).await;

    let mut client = connect_client(&gateway.ws_url("/rtasr")).await;
    let frame = expect_closed(&mut client).await.expect("close frame");
    assert_eq!(frame.reason.as_str(), "upstream unavailable");

    let output = handle.render();
    assert!(output.contains(UPSTREAM_FAILURES_TOTAL), "got {output}");
    assert!(!output.contains(SESSIONS_TOTAL), "got {output}");
    assert!(!output.contains(SESSIONS_ACTIVE), "got {output}");

    gateway.shutdown.trigger();
}
