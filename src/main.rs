use anyhow::{bail, Context, Result};
use clap::Parser;
use duplex_call::audio::{share_capture, share_playback};
use duplex_call::{
    create_router, AppState, AudioSettingsHandle, CallSession, Config, FileCaptureDevice,
    FilePlaybackDevice, WebSocketConnector,
};
use std::sync::Arc;
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(author, version, about = "Duplex audio call client", long_about = None)]
struct Args {
    /// Config file (extension optional, file optional)
    #[arg(short, long, default_value = "config/duplex-call")]
    config: String,

    /// WebSocket endpoint, overrides the config file
    #[arg(short, long)]
    endpoint: Option<String>,

    /// WAV file replayed as the microphone
    #[arg(short, long)]
    input: Option<String>,

    /// Directory for playback clips
    #[arg(short, long)]
    output_dir: Option<String>,

    /// Start the call immediately
    #[arg(long)]
    autostart: bool,

    /// Do not serve the HTTP control API (implies --autostart)
    #[arg(long)]
    no_http: bool,

    /// Enable detailed logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut cfg = Config::load(&args.config)?;
    if let Some(endpoint) = args.endpoint {
        cfg.call.endpoint = endpoint;
    }

    info!("Duplex Call v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Endpoint: {}", cfg.call.endpoint);

    let Some(input) = args.input.or(cfg.audio.input_path.clone()) else {
        bail!("No microphone input: pass --input <file.wav> or set audio.input_path");
    };
    let input = shellexpand::tilde(&input).into_owned();
    let microphone = FileCaptureDevice::open(&input)
        .with_context(|| format!("Failed to open input {}", input))?;

    // The file decides the capture format; resampling is not supported
    let format = microphone.format();
    if format.sample_rate != cfg.call.sample_rate || format.channels != cfg.call.channels {
        warn!(
            "Input is {}Hz {}ch, overriding configured {}Hz {}ch",
            format.sample_rate, format.channels, cfg.call.sample_rate, cfg.call.channels
        );
        cfg.call.sample_rate = format.sample_rate;
        cfg.call.channels = format.channels;
    }

    let output_dir = args.output_dir.unwrap_or(cfg.audio.playback_dir.clone());
    let output_dir = shellexpand::tilde(&output_dir).into_owned();
    let speaker = FilePlaybackDevice::new(&output_dir)?;

    let session = CallSession::new(
        cfg.call.clone(),
        share_capture(microphone),
        share_playback(speaker),
        Arc::new(WebSocketConnector),
        AudioSettingsHandle::new(cfg.settings),
    );

    let serve_http = cfg.service.http.enabled && !args.no_http;

    if args.autostart || !serve_http {
        let call_id = session.start().await?;
        info!("Call {} started", call_id);
    }

    if serve_http {
        let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        info!("HTTP API listening on {}", addr);

        let app = create_router(AppState::new(session.clone()));
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server failed")?;
    } else {
        shutdown_signal().await;
    }

    let status = session.stop().await;
    info!(
        "Call ended: {} segment(s) sent, {} dropped, {} clip(s) played, {} reconnect(s)",
        status.segments_sent, status.segments_dropped, status.clips_played, status.reconnect_attempts
    );
    if let Some(err) = status.last_error {
        warn!("Last error: {}", err);
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
    }
    info!("Shutting down");
}
