//! Signal alarm daemon.
//!
//! Loads the signal list, runs the alarm engine and serves the control API
//! until SIGINT or SIGTERM, or until the engine or the API stops on its
//! own.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use signal_alarm::api::{self, SharedState};
use signal_alarm::audio::terminal::TerminalAudioBackend;
use signal_alarm::config::AlarmConfig;
use signal_alarm::engine::{AlarmEngine, EngineParts, EngineSettings, SystemClock};
use signal_alarm::keepalive::IntervalKeepAlive;
use signal_alarm::store::{JsonFileStore, SignalSource};
use signal_alarm::tracing::{self, prelude::*};
use signal_alarm::wake::desktop::DesktopWakePlatform;

const NUDGE_CHANNEL_SIZE: usize = 16;

#[tokio::main]
async fn main() -> Result<()> {
    tracing::init();

    let config = AlarmConfig::from_env().context("invalid configuration")?;
    let custom_sound = config.load_sound().await?;
    info!(
        signals = %config.signals_path.display(),
        antidelay = %config.antidelay,
        custom_sound = custom_sound.is_some(),
        "Starting signal alarm daemon"
    );

    let source: Arc<dyn SignalSource> = Arc::new(JsonFileStore::new(config.signals_path.clone()));
    let (nudge_tx, nudge_rx) = mpsc::channel(NUDGE_CHANNEL_SIZE);

    let settings = EngineSettings {
        antidelay: config.antidelay,
        custom_sound: custom_sound.clone(),
        ..EngineSettings::default()
    };
    let (engine, handle) = AlarmEngine::new(
        settings,
        EngineParts {
            clock: Arc::new(SystemClock),
            audio: Arc::new(TerminalAudioBackend::new()),
            wake: Arc::new(DesktopWakePlatform::new(config.notifications)),
            keepalive: Arc::new(IntervalKeepAlive::new(nudge_tx)),
            source: source.clone(),
            nudge_rx,
        },
    );

    let cancellation = CancellationToken::new();
    let engine_task = tokio::spawn(engine.run(cancellation.clone()));

    let state = SharedState {
        engine: handle,
        source,
        custom_sound: custom_sound.is_some(),
    };
    let api_task = tokio::spawn(api::serve(config.api_addr, state, cancellation.clone()));

    let mut sigterm = signal(SignalKind::terminate())?;
    let shutdown = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    };

    supervise(engine_task, api_task, shutdown, cancellation).await?;

    info!("Exiting");
    Ok(())
}

/// Run until `shutdown` completes or either task ends on its own.
///
/// Both tasks are expected to live until cancellation. An early exit of
/// either one cancels the other and is reported as an error, so the
/// service manager restarts the daemon instead of leaving it half alive.
async fn supervise(
    mut engine_task: JoinHandle<()>,
    mut api_task: JoinHandle<signal_alarm::error::Result<()>>,
    shutdown: impl Future<Output = ()>,
    cancellation: CancellationToken,
) -> Result<()> {
    let stopped = tokio::select! {
        _ = shutdown => None,
        joined = &mut engine_task => Some(Stopped::Engine(joined)),
        joined = &mut api_task => Some(Stopped::Api(joined)),
    };
    cancellation.cancel();

    match stopped {
        None => {
            engine_task.await?;
            api_task.await?.context("API server failed")?;
            Ok(())
        }
        Some(Stopped::Engine(joined)) => {
            match joined {
                Ok(()) => error!("Alarm engine stopped unexpectedly"),
                Err(e) => error!(error = %e, "Alarm engine task failed"),
            }
            if let Ok(Err(e)) = api_task.await {
                warn!(error = %e, "API server failed during shutdown");
            }
            bail!("alarm engine stopped")
        }
        Some(Stopped::Api(joined)) => {
            match joined {
                Ok(Ok(())) => error!("API server stopped unexpectedly"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task failed"),
            }
            if let Err(e) = engine_task.await {
                warn!(error = %e, "Alarm engine failed during shutdown");
            }
            bail!("API server stopped")
        }
    }
}

enum Stopped {
    Engine(Result<(), JoinError>),
    Api(Result<signal_alarm::error::Result<()>, JoinError>),
}
