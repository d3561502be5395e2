//! Integration tests for request tunneling
//!
//! These tests drive `proxy_fetch` through a scripted host and verify:
//! - Id allocation and delivery under concurrent requests
//! - Each body transport (base64, plain, side channel)
//! - Every fallback path

use anyhow::Result;
use bytes::Bytes;
use kiraplayer::bridge::{FetchRequest, RequestBody, PROBE_FRAME};
use kiraplayer::protocol::AppMessage;
use kiraplayer_integration_tests::{plain_env, tunneling_env, Harness, ProxyReply};
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn test_concurrent_requests_never_cross_deliver() -> Result<()> {
    let harness = Arc::new(Harness::new(tunneling_env()).await);
    harness.host.set_jitter(true);

    let mut handles = Vec::new();
    for i in 0..16 {
        let harness = Arc::clone(&harness);
        handles.push(tokio::spawn(async move {
            let url = format!("https://media.example.com/segment/{}", i);
            let response = harness.context.proxy_fetch(FetchRequest::get(url.clone())).await;
            (url, response)
        }));
    }

    for handle in handles {
        let (url, response) = handle.await?;
        let response = response?;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, Bytes::from(url));
    }

    let ids: HashSet<u32> = harness.host.proxied().iter().map(|r| r.id).collect();
    assert_eq!(ids.len(), 16);
    assert!(!ids.contains(&0));
    assert!(harness.context.registry().is_empty());
    assert!(harness.fetcher.urls().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_web_message_body_arrives_over_side_channel() -> Result<()> {
    let harness = Harness::new(tunneling_env()).await;
    assert_eq!(harness.port.frames(), vec![Bytes::from_static(&PROBE_FRAME)]);

    harness.echo_probe().await;
    assert!(harness
        .host
        .posted()
        .contains(&AppMessage::SupportWebMessage { support: true }));

    harness.host.set_responder(|_| ProxyReply::WebMessage {
        status: 206,
        body: vec![0xDE, 0xAD, 0xBE, 0xEF],
    });
    let response = harness
        .context
        .proxy_fetch(FetchRequest::get("https://media.example.com/init.mp4"))
        .await?;

    assert_eq!(response.status, 206);
    assert_eq!(response.body.as_ref(), &[0xDE, 0xAD, 0xBE, 0xEF]);
    assert!(response.headers.is_empty());
    assert!(harness.context.registry().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_plain_reply_and_request_serialization() -> Result<()> {
    let harness = Harness::new(tunneling_env()).await;
    harness.host.set_responder(|_| ProxyReply::Plain {
        status: 200,
        body: "{\"ok\":true}".to_string(),
    });

    let request = FetchRequest::post(
        "https://api.example.com/v1/player",
        RequestBody::Text("{\"videoId\":\"abc\"}".to_string()),
    )
    .with_header("X-Goog-Visitor-Id", "visitor");
    let response = harness.context.proxy_fetch(request).await?;
    assert_eq!(response.text()?, "{\"ok\":true}");
    assert_eq!(response.status_text, "OK");

    let wire = &harness.host.proxied()[0];
    assert_eq!(wire.method, "POST");
    assert_eq!(wire.body.as_deref(), Some("{\"videoId\":\"abc\"}"));
    assert_eq!(wire.body_base64, None);
    assert_eq!(wire.headers.get("x-goog-visitor-id").map(String::as_str), Some("visitor"));
    assert!(wire.headers.contains_key("user-agent"));

    Ok(())
}

#[tokio::test]
async fn test_binary_request_body_is_base64_encoded() -> Result<()> {
    let harness = Harness::new(tunneling_env()).await;

    let request = FetchRequest::post(
        "https://api.example.com/upload",
        RequestBody::Binary(Bytes::from_static(b"hello")),
    );
    harness.context.proxy_fetch(request).await?;

    let wire = &harness.host.proxied()[0];
    assert_eq!(wire.body, None);
    assert_eq!(wire.body_base64.as_deref(), Some("aGVsbG8="));

    Ok(())
}

#[tokio::test]
async fn test_host_failure_falls_back_to_endpoint() -> Result<()> {
    let harness = Harness::new(tunneling_env()).await;
    harness.host.set_responder(|_| ProxyReply::Fail("handler threw".to_string()));

    let response = harness
        .context
        .proxy_fetch(FetchRequest::get("https://media.example.com/a.mp4"))
        .await?;

    let urls = harness.fetcher.urls();
    assert_eq!(urls, vec!["http://127.0.0.1:5173/a.mp4?__host=media.example.com"]);
    assert_eq!(response.text()?, format!("direct:{}", urls[0]));
    assert!(harness.context.registry().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_mismatched_reply_falls_back() -> Result<()> {
    let harness = Harness::new(tunneling_env()).await;
    harness.host.set_responder(|_| ProxyReply::WrongId { id: 4242 });

    harness
        .context
        .proxy_fetch(FetchRequest::get("https://media.example.com/b.mp4"))
        .await?;

    assert_eq!(harness.host.proxied().len(), 1);
    assert_eq!(harness.fetcher.urls().len(), 1);
    assert!(harness.context.registry().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_tunnel_addressed_url_is_fetched_unchanged() -> Result<()> {
    let harness = Harness::new(tunneling_env()).await;
    let url = "http://127.0.0.1:5173/videoplayback?__host=rr1.example.com";

    harness.context.proxy_fetch(FetchRequest::get(url)).await?;

    assert_eq!(harness.fetcher.urls(), vec![url]);
    assert!(harness.host.proxied().is_empty());
    assert_eq!(harness.host.check_proxy_calls(), 0);

    Ok(())
}

#[tokio::test]
async fn test_running_proxy_server_is_asked_every_time() -> Result<()> {
    let harness = Harness::new(tunneling_env()).await;
    harness.host.set_proxy_running(true);

    harness
        .context
        .proxy_fetch(FetchRequest::get("https://media.example.com/1"))
        .await?;
    harness
        .context
        .proxy_fetch(FetchRequest::get("https://media.example.com/2"))
        .await?;
    assert_eq!(harness.host.check_proxy_calls(), 2);
    assert!(harness.host.proxied().is_empty());
    assert_eq!(harness.fetcher.urls().len(), 2);

    // Stopping the server is picked up on the next request
    harness.host.set_proxy_running(false);
    harness
        .context
        .proxy_fetch(FetchRequest::get("https://media.example.com/3"))
        .await?;
    assert_eq!(harness.host.check_proxy_calls(), 3);
    assert_eq!(harness.host.proxied().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_without_inject_proxy_nothing_is_tunneled() -> Result<()> {
    let harness = Harness::new(plain_env()).await;
    assert!(!harness.context.proxy().tunneling_available());

    harness
        .context
        .proxy_fetch(FetchRequest::get("https://media.example.com/c.mp4"))
        .await?;

    assert!(harness.host.proxied().is_empty());
    assert_eq!(harness.host.check_proxy_calls(), 0);
    assert_eq!(harness.fetcher.urls().len(), 1);
    // The side channel is never probed without useWebMessage
    assert!(harness.port.frames().is_empty());

    Ok(())
}
