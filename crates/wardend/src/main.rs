use anyhow::{anyhow, bail, Context, Result};
use std::io::BufRead;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod evidence;
mod notify;
mod recorder;

use config::Config;
use engine::{LoopExit, StopSignal};
use notify::{AlertDispatcher, EmailNotifier, MessagingNotifier, Notifier};
use recorder::ScreenRecorder;

/// Alerts waiting for delivery. The loop drops alerts rather than block when full.
const ALERT_QUEUE_DEPTH: usize = 16;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "wardend starting");

    let config = Config::from_env();
    tracing::info!(
        data_dir = %config.data_dir.display(),
        log_dir = %config.log_dir.display(),
        policy = ?config.cooldown_policy,
        cooldown_secs = config.alert_cooldown_secs,
        "configuration loaded"
    );

    let (alert_tx, alert_rx) = mpsc::channel(ALERT_QUEUE_DEPTH);
    let stop = StopSignal::new();

    let detection = engine::initialize(&config, alert_tx, stop.clone()).context("startup failed")?;
    let dispatcher = build_dispatcher(&config)?;
    let dispatcher_task = tokio::spawn(dispatcher.run(alert_rx));

    watch_signals(stop.clone());
    watch_stdin(stop.clone());

    let loop_state = detection.watch_state();
    let detect_thread = engine::spawn(detection)?;
    tracing::info!("wardend ready; type q and Enter, or press Ctrl-C, to stop");

    let exit = tokio::task::spawn_blocking(move || detect_thread.join())
        .await?
        .map_err(|_| anyhow!("detection thread panicked"))?;
    tracing::info!(state = ?*loop_state.borrow(), "detection loop finished");

    // The loop dropped its sender; wait for queued alerts to go out.
    let handled = dispatcher_task.await?;
    tracing::info!(alerts = handled, "wardend shutting down");

    match exit {
        LoopExit::Stopped => Ok(()),
        LoopExit::SourceFailed { failures, last_error } => {
            bail!("camera failed {failures} times in a row: {last_error}")
        }
    }
}

fn build_dispatcher(config: &Config) -> Result<AlertDispatcher> {
    let mut channels: Vec<Box<dyn Notifier>> = Vec::new();

    if let Some(email) = &config.email {
        channels.push(Box::new(EmailNotifier::new(email.clone()).context("email channel")?));
    }
    if let Some(messaging) = &config.messaging {
        channels.push(Box::new(
            MessagingNotifier::new(messaging.clone(), config.notify_timeout()).context("WhatsApp channel")?,
        ));
    }

    let mut dispatcher = AlertDispatcher::new(channels, config.notify_timeout());
    if dispatcher.channel_names().is_empty() {
        tracing::warn!("no alert channels configured; intruders will only be logged and photographed");
    } else {
        tracing::info!(channels = ?dispatcher.channel_names(), "alert channels enabled");
    }

    if let Some(recording) = &config.screen_recording {
        tracing::info!(secs = recording.duration.as_secs(), fps = recording.fps, "screen recording enabled");
        dispatcher = dispatcher.with_recorder(ScreenRecorder::new(recording.clone(), &config.log_dir));
    }

    Ok(dispatcher)
}

/// Ctrl-C and SIGTERM both request a stop.
fn watch_signals(stop: StopSignal) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => tracing::info!("interrupt received"),
                        _ = term.recv() => tracing::info!("SIGTERM received"),
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cannot listen for SIGTERM");
                    let _ = tokio::signal::ctrl_c().await;
                    tracing::info!("interrupt received");
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("interrupt received");
        }
        stop.stop();
    });
}

/// A line reading `q` on stdin requests a stop.
///
/// Runs on its own thread; a pending stdin read must not hold up runtime shutdown.
fn watch_stdin(stop: StopSignal) {
    let spawned = std::thread::Builder::new()
        .name("warden-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().eq_ignore_ascii_case("q") {
                    tracing::info!("quit requested from terminal");
                    stop.stop();
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "cannot watch stdin; use Ctrl-C to stop");
    }
}
