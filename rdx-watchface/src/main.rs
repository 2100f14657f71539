use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use watchface::prelude::*;
use watchface::{ENGINE_NAME, VERSION};

/// State kept by the demo face between callbacks.
#[derive(Debug, Default)]
struct DemoFace {
    frames: u64,
    ambient_frames: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging; RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // 2. Load the configuration from an optional TOML path.
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = WatchConfig::load(config_path.as_deref())?;
    info!("{} v{} starting '{}'", ENGINE_NAME.cyan(), VERSION, config.app_id);

    // 3. Build the face and the app around it.
    let mut app = WatchApp::new(config, demo_callbacks(), DemoFace::default())?;
    app.add_event_handler(
        SystemEventKind::LowBattery,
        Arc::new(|event: &AppEvent| info!("[EVENT] Battery is low: {:?}", event.value)),
    )?;

    // 4. Listen to lifecycle notices and play the host's part.
    spawn_notice_listener(&app);
    let handle = app.handle();
    tokio::spawn(async move {
        if let Err(e) = handle.resume().await {
            info!("Could not make the face visible: {}", e);
        }
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received. Asking the face to exit...");
        handle.exit();
    });

    // 5. Run until Ctrl+C.
    app.run(LaunchBundle::new()).await?;
    let face = app.data();
    info!(
        "Drew {} frames and {} ambient frames. Goodbye.",
        face.frames, face.ambient_frames
    );
    Ok(())
}

fn demo_callbacks() -> LifecycleCallbacks<DemoFace> {
    LifecycleCallbacks::<DemoFace>::new()
        .on_create(|width, height, _| {
            info!("[FACE] Created on a {}x{} surface", width, height);
            true
        })
        .on_app_control(|control, _| info!("[FACE] Launched with {}", control.operation))
        .on_resume(|_| info!("[FACE] Visible"))
        .on_pause(|_| info!("[FACE] Hidden"))
        .on_time_tick(|now, face| {
            face.frames += 1;
            info!(
                "[FACE] {}",
                format!("{:02}:{:02}:{:02}", now.hour, now.minute, now.second).bold()
            );
        })
        .on_ambient_tick(|now, face| {
            face.ambient_frames += 1;
            info!("[FACE] {}", format!("{:02}:{:02}", now.hour, now.minute).dimmed());
        })
        .on_ambient_changed(|ambient, _| info!("[FACE] Ambient mode: {}", ambient))
        .on_terminate(|face| info!("[FACE] Terminating after {} frames", face.frames))
}

/// Logs every lifecycle notice except the per-second ticks.
fn spawn_notice_listener(app: &WatchApp<DemoFace>) {
    let mut notices = app.subscribe_lifecycle_events();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            match notice {
                LifecycleNotice::TimeTick { .. } | LifecycleNotice::AmbientTick { .. } => {}
                LifecycleNotice::Exited => {
                    info!("[NOTICE] => {:?}", notice);
                    break;
                }
                other => info!("[NOTICE] => {:?}", other),
            }
        }
    });
}
