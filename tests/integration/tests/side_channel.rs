//! Integration tests for the binary side channel handshake and framing

use anyhow::Result;
use bytes::Bytes;
use kiraplayer::bridge::PROBE_FRAME;
use kiraplayer::protocol::AppMessage;
use kiraplayer_integration_tests::{data_frame, plain_env, tunneling_env, Harness};
use serde_json::json;

fn support_acks(harness: &Harness) -> usize {
    harness
        .host
        .posted()
        .iter()
        .filter(|m| matches!(m, AppMessage::SupportWebMessage { support: true }))
        .count()
}

#[tokio::test]
async fn test_handshake_acknowledged_once() -> Result<()> {
    let harness = Harness::new(tunneling_env()).await;

    // testWebMessage after init does not probe again
    harness.command(json!({"cmd": "testWebMessage"})).await;
    assert_eq!(harness.port.frames().len(), 1);

    harness.echo_probe().await;
    harness.echo_probe().await;
    assert_eq!(support_acks(&harness), 1);
    assert!(harness.context.side_channel().map_or(false, |c| c.is_supported()));

    Ok(())
}

#[tokio::test]
async fn test_host_triggered_probe() -> Result<()> {
    let harness = Harness::new(plain_env()).await;
    assert!(harness.port.frames().is_empty());

    harness.command(json!({"cmd": "testWebMessage"})).await;
    assert_eq!(harness.port.frames(), vec![Bytes::from_static(&PROBE_FRAME)]);

    Ok(())
}

#[tokio::test]
async fn test_echo_before_any_probe_is_ignored() -> Result<()> {
    let harness = Harness::new(plain_env()).await;

    harness.echo_probe().await;
    assert_eq!(support_acks(&harness), 0);
    assert!(!harness.context.side_channel().map_or(true, |c| c.is_supported()));

    harness.command(json!({"cmd": "testWebMessage"})).await;
    harness.echo_probe().await;
    assert_eq!(support_acks(&harness), 1);

    Ok(())
}

#[tokio::test]
async fn test_frame_completes_pending_request() -> Result<()> {
    let harness = Harness::new(tunneling_env()).await;
    harness.echo_probe().await;
    let channel = harness.context.side_channel().expect("side channel");

    let pending = harness.context.registry().create(7);
    channel
        .on_message(Bytes::from_static(&[0x00, 0x00, 0x00, 0x07, 0xAA, 0xBB]))
        .await;

    assert_eq!(pending.wait().await?.as_ref(), &[0xAA, 0xBB]);
    assert!(!harness.context.registry().contains(7));

    Ok(())
}

#[tokio::test]
async fn test_unknown_short_and_early_frames_are_dropped() -> Result<()> {
    let harness = Harness::new(tunneling_env()).await;
    let channel = harness.context.side_channel().expect("side channel");
    let registry = harness.context.registry();
    let _pending = registry.create(3);

    // Before the handshake nothing is delivered
    channel.on_message(data_frame(3, b"early")).await;
    assert!(registry.contains(3));

    harness.echo_probe().await;
    channel.on_message(Bytes::from_static(&[0, 0, 3])).await;
    channel.on_message(data_frame(99, b"stray")).await;
    assert!(registry.contains(3));
    assert_eq!(registry.len(), 1);

    channel.on_message(data_frame(3, b"late")).await;
    assert!(registry.is_empty());

    Ok(())
}
