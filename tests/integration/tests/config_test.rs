//! Integration tests for configuration loading and persisted endpoints

use anyhow::Result;
use kiraplayer::bridge::FetchRequest;
use kiraplayer::player::StaticVideoInfo;
use kiraplayer::storage::Storage;
use kiraplayer::utils::config::{Config, ProxyEndpoint};
use kiraplayer::AppPlayerContext;
use kiraplayer_integration_tests::{plain_env, tunneling_env, Harness, ProxyReply, ScriptedFetcher, ScriptedHost};
use serial_test::serial;
use std::sync::Arc;
use tempfile::TempDir;

const ENV_VARS: [&str; 4] = [
    "KIRAPLAYER_PROXY_HOST",
    "KIRAPLAYER_PROXY_PORT",
    "KIRAPLAYER_REQUEST_TIMEOUT_MS",
    "KIRAPLAYER_LOG_LEVEL",
];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_file_then_environment_overrides() -> Result<()> {
    clear_env();
    let dir = TempDir::new()?;
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[proxy]
host = "10.0.0.2"
port = "9000"

[player]
resume_window_ms = 1500
"#,
    )?;

    std::env::set_var("KIRAPLAYER_PROXY_PORT", "9443");
    std::env::set_var("KIRAPLAYER_LOG_LEVEL", "debug");
    let config = Config::from_file(&path);
    clear_env();
    let config = config?;

    assert_eq!(config.proxy.host, "10.0.0.2");
    assert_eq!(config.proxy.port, "9443");
    assert_eq!(config.proxy.protocol, "http");
    assert_eq!(config.player.resume_window_ms, 1500);
    assert_eq!(config.player.progress_threshold_secs, 0.9);
    assert_eq!(config.general.log_level, "debug");

    Ok(())
}

#[test]
#[serial]
fn test_invalid_environment_value_is_rejected() -> Result<()> {
    clear_env();
    let dir = TempDir::new()?;
    let path = dir.path().join("config.toml");
    Config::default().save_to(&path)?;

    std::env::set_var("KIRAPLAYER_REQUEST_TIMEOUT_MS", "soon");
    let result = Config::from_file(&path);
    clear_env();
    assert!(result.is_err());

    std::env::set_var("KIRAPLAYER_PROXY_PORT", "0");
    let result = Config::from_file(&path);
    clear_env();
    assert!(result.is_err());

    Ok(())
}

#[tokio::test]
async fn test_configured_endpoint_used_by_fallback() -> Result<()> {
    let mut config = Config::default();
    config.proxy = ProxyEndpoint {
        protocol: "https".into(),
        host: "tunnel.local".into(),
        port: "8443".into(),
    };
    let harness = Harness::with_config(tunneling_env(), config).await;
    harness.host.set_responder(|_| ProxyReply::Fail("offline".to_string()));

    harness
        .context
        .proxy_fetch(FetchRequest::get("https://media.example.com/v.mp4?itag=18"))
        .await?;

    assert_eq!(
        harness.fetcher.urls(),
        vec!["https://tunnel.local:8443/v.mp4?itag=18&__host=media.example.com"]
    );

    Ok(())
}

fn session(state_file: &std::path::Path) -> kiraplayer::Result<AppPlayerContext> {
    AppPlayerContext::builder()
        .with_host(Arc::new(ScriptedHost::new(plain_env())))
        .with_fetcher(Arc::new(ScriptedFetcher::default()))
        .with_video_info(Arc::new(StaticVideoInfo::new()))
        .with_storage(Arc::new(Storage::open(state_file)))
        .build()
}

#[test]
fn test_persisted_endpoint_survives_restart() -> Result<()> {
    let dir = TempDir::new()?;
    let state_file = dir.path().join("state.json");
    let endpoint = ProxyEndpoint {
        protocol: "http".into(),
        host: "192.168.1.20".into(),
        port: "8080".into(),
    };

    let first = session(&state_file)?;
    first.set_proxy_endpoint(endpoint.clone())?;
    assert_eq!(first.proxy().endpoint(), endpoint);
    drop(first);

    let second = session(&state_file)?;
    assert_eq!(second.proxy().endpoint(), endpoint);

    Ok(())
}
