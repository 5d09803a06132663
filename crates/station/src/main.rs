mod cli;
mod commands;
mod config;
mod display;
mod ffmpeg;

use anyhow::Context;
use batch::{BatchConfig, BatchStore, JpegEncoder};
use capture::{CameraConfig, V4lCamera, diagnostics};
use clap::Parser;
use cli::{Cli, CliCommand};
use commands::Command;
use common::TelemetryGuard;
use config::StationConfig;
use display::TerminalDisplay;
use session::{
    Clock, MessageBus, PluginContext, PluginFactory, PluginRegistry, SessionConfig,
    SessionController, SessionParts, SystemClock, redraw_listener,
};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    flag,
};
use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

const PLUGIN_TABLE: &[(&str, PluginFactory)] = &[("ffmpeg", ffmpeg::factory)];

const SIGNAL_POLL: Duration = Duration::from_millis(100);

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = StationConfig::from_env()?;

    // TelemetryGuard needs a live Tokio runtime for its batch exporters and
    // installs the subscriber itself.
    let (_telemetry, _runtime) = if let Some(endpoint) = config.otel_endpoint.as_ref() {
        let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
        let guard =
            rt.block_on(async { TelemetryGuard::init("station", endpoint, config.environment) })?;
        (Some(guard), Some(rt))
    } else {
        common::setup_logging(config.environment);
        (None, None)
    };

    match cli.command {
        Some(CliCommand::Devices) => {
            let devices = diagnostics::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for device in devices {
                println!("{}", device);
            }
            Ok(())
        }
        Some(CliCommand::Info { device }) => {
            let report = diagnostics::describe(&device)
                .with_context(|| format!("Failed to inspect {}", device.display()))?;
            print!("{}", report);
            Ok(())
        }
        None => run(&config),
    }
}

fn run(config: &StationConfig) -> anyhow::Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, Arc::clone(&shutdown))?;
    flag::register(SIGINT, Arc::clone(&shutdown))?;
    tracing::info!("Signal handlers registered (SIGTERM, SIGINT)");

    let session_config = SessionConfig::from_env();
    let camera_config = CameraConfig::from_env()?;
    let batch_config = BatchConfig::from_env();
    tracing::info!(session = ?session_config, camera = ?camera_config, batch = ?batch_config, "Loaded configuration");

    let camera = V4lCamera::open(&camera_config)
        .context("Failed to initialize camera - check V4L2 device availability")?;

    let display = Arc::new(TerminalDisplay::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let messages = MessageBus::new(redraw_listener(display.clone()), Arc::clone(&clock));

    let plugins = PluginRegistry::build(
        &config.plugin_settings(&batch_config),
        PLUGIN_TABLE,
        &PluginContext {
            messages: messages.clone(),
            playback_fps: session_config.playback_fps,
        },
    )
    .context("Failed to load plugins")?;
    tracing::info!(count = plugins.len(), "Plugins loaded");

    let encoder = JpegEncoder::new(batch_config.jpeg_quality);
    let controller = SessionController::new(SessionParts {
        config: session_config,
        camera: Arc::new(camera),
        store: Box::new(BatchStore::new(batch_config)),
        encoder: Arc::new(encoder),
        display: display.clone(),
        messages,
        plugins,
        clock,
    });

    controller.start_new_batch();
    controller.request_live_view();
    controller.welcome(commands::HINT);

    let renderer = {
        let controller = controller.clone();
        let display = Arc::clone(&display);
        let shutdown = Arc::clone(&shutdown);
        thread::Builder::new()
            .name("render".into())
            .spawn(move || display.render_loop(&controller, &shutdown))
            .context("Failed to spawn render thread")?
    };

    command_loop(&controller, &shutdown);

    shutdown.store(true, Ordering::Relaxed);
    controller.shutdown();
    if renderer.join().is_err() {
        tracing::error!("Render thread panicked");
    }
    tracing::info!("Station stopped");
    Ok(())
}

/// Feed stdin lines to the controller until quit, EOF or a signal.
fn command_loop(controller: &SessionController, shutdown: &AtomicBool) {
    let (tx, rx) = mpsc::channel();
    // Detached: a blocked read must not hold up exit.
    let spawned = thread::Builder::new().name("stdin".into()).spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to read stdin: {}", e);
                    return;
                }
            }
        }
    });
    if let Err(e) = spawned {
        tracing::error!("Failed to spawn stdin reader: {}", e);
        return;
    }

    while !shutdown.load(Ordering::Relaxed) {
        let line = match rx.recv_timeout(SIGNAL_POLL) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                tracing::info!("Input closed");
                break;
            }
        };

        match line.parse::<Command>() {
            Ok(command) => {
                if commands::apply(controller, command).is_break() {
                    break;
                }
            }
            Err(e) => println!("{} ({})", e, commands::HINT),
        }
    }
}
