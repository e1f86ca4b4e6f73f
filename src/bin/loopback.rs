//! Loopback demo
//!
//! Wires the synthetic camera, the null transcoder and a scripted OBS into an
//! endpoint handler, streams for a while, then disconnects.
//!
//! Usage: `camrelay-loopback [config.toml] [seconds]`

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use camrelay::{
    camera::{CaptureArbiter, CaptureTarget, PreviewTarget, RecordTarget},
    config::{AppConfig, EndpointConfig, ObsConfig, ObsStreamData, StaticConfigSource},
    endpoint::EndpointHandler,
    model::{AudioConfig, StreamProtocol},
    sim::{ScriptedRemote, SimEngine, SimProvider, ToneSource},
    stream::{AudioCaptureTarget, CameraVideoTarget, SessionManager},
};

const DEFAULT_RUN_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting camrelay loopback");

    let path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => AppConfig::default_path()?,
    };
    let run_for = std::env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(DEFAULT_RUN_SECS));

    let mut config = AppConfig::load_or_default(&path)?;
    tracing::info!("Config: {}", path.display());

    if config.endpoint.is_none() {
        config.endpoint = Some(EndpointConfig::Obs(ObsConfig::new("127.0.0.1", 4455, "")));
    }
    if config.stream.is_none() {
        let mut data = ObsStreamData::new(StreamProtocol::Mpegts, "udp://127.0.0.1:9000");
        data.audio = Some(AudioConfig::default());
        config.stream = Some(data);
    }

    // Capture side
    let provider = Arc::new(SimProvider::phone());
    let arbiter = Arc::new(CaptureArbiter::new(provider.clone())?);
    if let Some(id) = &config.camera.device_id {
        arbiter.set_device(id);
    }

    let preview = PreviewTarget::new(arbiter.clone());
    preview.set_window_size(config.camera.preview_window);
    preview.start();

    let record = Arc::new(RecordTarget::new(arbiter.clone()));
    let video = Arc::new(CameraVideoTarget::new(record));

    let audio_config = config.stream.as_ref().and_then(|s| s.audio).unwrap_or_default();
    let tone = Arc::new(ToneSource::new(audio_config, 440.0));
    let audio = Arc::new(AudioCaptureTarget::new(tone));

    // Stream and endpoint side
    let engine = Arc::new(SimEngine::new());
    let manager = Arc::new(SessionManager::new(engine.clone()));
    let remote = Arc::new(ScriptedRemote::new());
    let source = Arc::new(StaticConfigSource::new(config));

    let handler = EndpointHandler::new(source, remote.clone(), manager.clone(), video).with_audio(audio);

    let mut states = handler.state().subscribe();
    let watcher = tokio::spawn(async move {
        while let Some(state) = states.recv().await {
            tracing::info!(?state, "Endpoint state");
        }
    });

    let state = handler.connect().await;
    tracing::info!(?state, "Connect finished");
    if !state.is_started() {
        tracing::warn!("Endpoint did not start, nothing to stream");
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let deadline = tokio::time::sleep(run_for);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            _ = ticker.tick() => {
                tracing::info!(active = ?arbiter.active_slots(), device = ?arbiter.current_device_id(), "Capture");
                if let Some(runner) = manager.current().await {
                    for relay in runner.video_relays() {
                        let stats = relay.stats();
                        tracing::info!(relay = %relay.id(), sent = stats.sent, failed = stats.failed, bytes = stats.bytes, "Video relay");
                    }
                    for relay in runner.audio_relays() {
                        let stats = relay.stats();
                        tracing::info!(relay = %relay.id(), sent = stats.sent, bytes = stats.bytes, "Audio relay");
                    }
                }
            }
        }
    }

    let state = handler.disconnect().await;
    tracing::info!(?state, "Disconnected");

    preview.stop();
    manager.clear().await;
    watcher.abort();

    tracing::info!(
        frames = engine.log().total_video_frames(),
        audio_blocks = engine.log().total_audio_blocks(),
        inputs = remote.created_inputs().len(),
        "Loopback finished"
    );

    Ok(())
}
