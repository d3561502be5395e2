use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use kiraplayer::bridge::StdioHost;
use kiraplayer::player::StaticVideoInfo;
use kiraplayer::storage::Storage;
use kiraplayer::utils::config::Config;
use kiraplayer::utils::load_config;
use kiraplayer::{AppPlayerContext, CommandDispatcher};

/// KiraPlayer - drive the player bridge with JSON commands on stdin
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Persisted state file
    #[arg(long, value_name = "FILE")]
    state_file: Option<PathBuf>,

    /// Video to register and load at startup
    #[arg(long, value_name = "ID")]
    video_id: Option<String>,

    /// Manifest used for the startup video
    #[arg(long, value_name = "URI", default_value = "dash://local")]
    manifest: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => load_config()?,
    };

    // Initialize logging
    let log_level = if args.debug { "debug" } else { config.general.log_level.as_str() };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("Starting KiraPlayer v{}", env!("CARGO_PKG_VERSION"));

    let storage = match args.state_file.clone().or_else(Storage::default_path) {
        Some(path) => Storage::open(&path),
        None => Storage::in_memory(),
    };

    let videos = Arc::new(StaticVideoInfo::new());
    if let Some(video_id) = &args.video_id {
        videos.insert_playable(video_id, &args.manifest);
    }

    let context = Arc::new(
        AppPlayerContext::builder()
            .with_config(config)
            .with_host(Arc::new(StdioHost::stdout()))
            .with_video_info(videos)
            .with_storage(Arc::new(storage))
            .build()?,
    );
    context.init().await;
    context.spawn_event_loop();

    if let Some(video_id) = &args.video_id {
        if let Err(e) = context.loader().load_video(video_id, None).await {
            error!("Failed to load {}: {}", video_id, e);
        }
    }

    let dispatcher = CommandDispatcher::new(Arc::clone(&context));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(reply) = dispatcher.handle_str(&line).await {
                    println!("{}", reply);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    context.shutdown().await;
    Ok(())
}
