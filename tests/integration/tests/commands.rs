//! Integration tests for host command dispatch
//!
//! These tests verify the command flows end to end, from the raw JSON
//! command through the controller to the headless engine:
//! - The resume heuristic around the 1000 ms window
//! - Ads gating of every play path
//! - Track listing and the selection fallback chain

use anyhow::Result;
use kiraplayer::player::{MediaElement, VariantTrack};
use kiraplayer_integration_tests::{plain_env, Harness};
use serde_json::json;

fn lifecycle(state: &str) -> serde_json::Value {
    json!({"cmd": "appLifecycleState", "state": state, "isAndroid": false})
}

async fn playing_harness() -> Harness {
    let harness = Harness::new(plain_env()).await;
    harness.videos.insert_playable("abc", "dash://abc");
    harness.command(json!({"cmd": "loadVideo", "videoId": "abc"})).await;
    harness.settle().await;
    harness
}

#[tokio::test]
async fn test_resume_just_inside_window() -> Result<()> {
    let harness = playing_harness().await;
    assert_eq!(harness.engine.play_calls(), 1);

    harness.command(json!({"cmd": "controller", "action": "pause"})).await;
    harness.settle().await;
    assert!(harness.engine.paused());
    assert!(harness.context.play_history().last_pause.is_some());

    harness.clock.advance(999);
    harness.command(lifecycle("paused")).await;
    assert_eq!(harness.engine.play_calls(), 2);
    assert!(!harness.engine.paused());

    Ok(())
}

#[tokio::test]
async fn test_no_resume_at_window_edge() -> Result<()> {
    let harness = playing_harness().await;

    harness.command(json!({"cmd": "controller", "action": "pause"})).await;
    harness.settle().await;

    harness.clock.advance(1000);
    harness.command(lifecycle("resumed")).await;
    assert_eq!(harness.engine.play_calls(), 1);
    assert!(harness.engine.paused());

    Ok(())
}

#[tokio::test]
async fn test_android_lifecycle_never_resumes() -> Result<()> {
    let harness = playing_harness().await;
    harness.command(json!({"cmd": "controller", "action": "pause"})).await;
    harness.settle().await;

    harness
        .command(json!({"cmd": "appLifecycleState", "state": "resumed", "isAndroid": true}))
        .await;
    assert_eq!(harness.engine.play_calls(), 1);

    Ok(())
}

#[tokio::test]
async fn test_ads_gate_every_play_path() -> Result<()> {
    let harness = playing_harness().await;

    harness.command(json!({"cmd": "showingAds", "showing": true})).await;
    harness.settle().await;
    assert!(harness.engine.paused());

    // Neither the controller nor a quick lifecycle bounce may resume
    harness.command(json!({"cmd": "controller", "action": "play"})).await;
    harness.command(lifecycle("resumed")).await;
    assert_eq!(harness.engine.play_calls(), 1);

    harness.command(json!({"cmd": "showingAds", "showing": false})).await;
    assert_eq!(harness.engine.play_calls(), 2);

    // Clearing an already clear flag does nothing
    harness.command(json!({"cmd": "showingAds", "showing": false})).await;
    assert_eq!(harness.engine.play_calls(), 2);

    Ok(())
}

#[tokio::test]
async fn test_get_tracks_one_entry_per_height() -> Result<()> {
    let harness = Harness::new(plain_env()).await;
    harness.engine.set_variant_tracks(vec![
        VariantTrack { id: 1, height: 480, width: 854, video_codec: Some("avc1.4d401e".into()), ..Default::default() },
        VariantTrack { id: 2, height: 480, width: 854, video_codec: Some("vp9".into()), ..Default::default() },
        VariantTrack {
            id: 3,
            height: 720,
            width: 1280,
            video_codec: Some("avc1.4d401f".into()),
            active: true,
            ..Default::default()
        },
    ]);

    let reply = harness.command(json!({"cmd": "getTracks"})).await.expect("getTracks replies");
    let tracks = reply["tracks"].as_array().expect("tracks array");
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0]["height"], 480);
    assert_eq!(tracks[0]["active"], false);
    assert_eq!(tracks[1]["height"], 720);
    assert_eq!(tracks[1]["label"], "720p");
    assert_eq!(tracks[1]["active"], true);

    Ok(())
}

#[tokio::test]
async fn test_excluded_codec_never_selected() -> Result<()> {
    let harness = Harness::new(plain_env()).await;
    harness.engine.set_variant_tracks(vec![
        VariantTrack { id: 1, height: 1080, video_codec: Some("av01.0.08M.08".into()), ..Default::default() },
        VariantTrack { id: 2, height: 1080, video_codec: Some("avc1.640028".into()), ..Default::default() },
        VariantTrack { id: 3, height: 1440, video_codec: Some("av01.0.12M.08".into()), ..Default::default() },
    ]);

    let reply = harness.command(json!({"cmd": "getTracks"})).await.expect("getTracks replies");
    assert_eq!(reply["tracks"][0]["id"], 2);

    harness.command(json!({"cmd": "selectTrack", "height": 1440})).await;
    assert!(harness.engine.selected_variants().is_empty());

    harness.command(json!({"cmd": "selectTrack", "height": 1080})).await;
    assert_eq!(harness.engine.selected_variants(), vec![2]);

    Ok(())
}

#[tokio::test]
async fn test_track_selection_prefers_main_role_over_other_language() -> Result<()> {
    let harness = Harness::new(plain_env()).await;
    harness.engine.set_variant_tracks(vec![
        VariantTrack {
            id: 10,
            height: 480,
            language: "en".into(),
            roles: vec!["main".into()],
            ..Default::default()
        },
        VariantTrack { id: 11, height: 480, language: "es".into(), ..Default::default() },
        VariantTrack { id: 12, height: 720, language: "en".into(), active: true, ..Default::default() },
    ]);

    harness
        .command(json!({"cmd": "selectTrack", "height": 480, "language": "fr"}))
        .await;

    assert_eq!(harness.engine.selected_variants(), vec![10]);
    assert!(!harness.engine.abr_enabled());
    let setting = harness.context.controller().player_setting();
    assert_eq!(setting.default_height, 480);
    assert_eq!(setting.language.as_deref(), Some("fr"));

    Ok(())
}

#[tokio::test]
async fn test_settings_persist_across_loads() -> Result<()> {
    let harness = playing_harness().await;

    harness.command(json!({"cmd": "volume", "volume": 1.7})).await;
    assert_eq!(harness.engine.volume(), 1.0);
    harness.command(json!({"cmd": "volume", "volume": 0.25})).await;

    harness
        .command(json!({"cmd": "controller", "action": "seekTo", "data": 63.0}))
        .await;
    harness.videos.insert_playable("next", "dash://next");
    harness.command(json!({"cmd": "loadVideo", "videoId": "next"})).await;

    assert_eq!(harness.context.storage().position("abc"), 63.0);
    assert_eq!(harness.context.storage().volume(), Some(0.25));
    assert_eq!(harness.engine.volume(), 0.25);
    assert_eq!(harness.context.video_id().as_deref(), Some("next"));

    Ok(())
}

#[tokio::test]
async fn test_unplayable_video_reports_not_available() -> Result<()> {
    let harness = Harness::new(plain_env()).await;

    harness.command(json!({"cmd": "loadVideo", "videoId": "missing"})).await;
    harness.settle().await;

    assert_eq!(harness.host.statuses().last().map(String::as_str), Some("videoNotAvailable"));
    let toasts = harness.context.toasts().toasts();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].message, "Unplayable video.");
    assert_eq!(harness.engine.play_calls(), 0);

    Ok(())
}
