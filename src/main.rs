//! Standalone CLI for the mirror map pipeline
//!
//! Run with: cargo run --features cli --bin mirror-map-cli
//! Desktop window: cargo run --features gui --bin mirror-map-cli -- --gui
//!
//! Configuration comes from MIRROR_MAP_CONFIG (JSON file) and
//! MIRROR_MAP_ORIGIN (page origin, e.g. https://mirror.example.org).

#[cfg(not(target_arch = "wasm32"))]
use mirror_map::{connection::ConnectionManager, core::MapConfig};

/// Origin used when neither the config nor the environment names one
#[cfg(not(target_arch = "wasm32"))]
const DEFAULT_ORIGIN: &str = "http://127.0.0.1:8080";

/// How often the headless client logs a summary
#[cfg(not(target_arch = "wasm32"))]
const STATS_INTERVAL_SECS: f64 = 5.0;

#[cfg(not(target_arch = "wasm32"))]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mirror_map=debug"));
    fmt().with_env_filter(filter).with_target(true).init();

    let config = MapConfig::from_env()?;
    let origin = config
        .origin
        .clone()
        .unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
    let manager = ConnectionManager::from_config(&config, &origin)?;
    tracing::info!(
        endpoint = manager.endpoint(),
        window_secs = config.window_secs(),
        tick_ms = config.tick_interval.as_millis() as u64,
        timestamps = ?config.timestamps,
        "Configuration resolved"
    );

    #[cfg(feature = "gui")]
    if std::env::args().any(|arg| arg == "--gui") {
        return run_gui(config, manager);
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(run_headless(config, manager))
}

/// Ingest and render against an offscreen surface, logging periodic stats
#[cfg(not(target_arch = "wasm32"))]
async fn run_headless(
    config: MapConfig,
    manager: ConnectionManager,
) -> Result<(), Box<dyn std::error::Error>> {
    use std::sync::Arc;

    use mirror_map::core::MapState;
    use mirror_map::render::{RecordingSurface, RenderLoop};
    use mirror_map::scheduler::run_ticks;
    use mirror_map::time::now_seconds;
    use mirror_map::websocket_native::run_connection;
    use parking_lot::Mutex;
    use tokio_util::sync::CancellationToken;
    use tracing::info;

    let manager = Arc::new(Mutex::new(manager));
    let cancel = CancellationToken::new();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
    let connection = tokio::spawn(run_connection(
        manager.clone(),
        cancel.clone(),
        move |frame| tx.send(frame).is_ok(),
    ));

    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            cancel_on_signal.cancel();
        }
    });

    let mut map = MapState::new(&config);
    let mut render = RenderLoop::new(&config);
    let mut surface = RecordingSurface::new(1440.0, 720.0);
    let mut last_stats = now_seconds();
    let mut hits_last = 0u64;

    let ticks = run_ticks(config.tick_interval, cancel.clone(), || {
        let now = now_seconds();
        while let Ok(frame) = rx.try_recv() {
            manager.lock().on_frame(&frame, now, &mut map);
        }
        render.tick(now, &mut map, &mut surface);

        let elapsed = now - last_stats;
        if elapsed >= STATS_INTERVAL_SECS {
            let hits = map.aggregator.total_hits();
            let top: Vec<&str> = surface.legend_labels().into_iter().take(5).collect();
            let manager = manager.lock();
            info!(
                state = %manager.state(),
                on_map = map.buffer.len(),
                overflowed = map.buffer.overflowed(),
                hits,
                "/sec" = format!("{:.1}", (hits - hits_last) as f64 / elapsed),
                reconnects = manager.reconnects(),
                top = ?top,
                "stats"
            );
            last_stats = now;
            hits_last = hits;
        }
    })
    .await;

    connection.await?;
    info!(ticks, "Stopped");
    Ok(())
}

#[cfg(all(not(target_arch = "wasm32"), feature = "gui"))]
fn run_gui(config: MapConfig, manager: ConnectionManager) -> Result<(), Box<dyn std::error::Error>> {
    use mirror_map::app::MapApp;

    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "Mirror map",
        options,
        Box::new(move |cc| Ok(Box::new(MapApp::new(cc, &config, manager)))),
    )?;
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {}
