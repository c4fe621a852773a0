//! HTTP surface for the download panel: JSON control API, the live SSE log
//! feed, static assets, and the disk/mount utility endpoints. All job state
//! lives in [`dlpanel_core`]; this crate is glue.

mod api;
mod disks;
mod static_files;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use axum::routing::post;
use dlpanel_core::JobSupervisor;
use dlpanel_core::LogBroadcaster;
use tokio::net::TcpListener;
use tracing::info;
use tracing::warn;

pub const DEFAULT_YTDLP_BIN: &str = "yt-dlp";

/// Roots scanned for download destinations, removable media first.
pub const DEFAULT_DOWNLOAD_DIRS: &[&str] = &[
    "/media/pi",
    "/media/usb",
    "/mnt",
    "/home/pi/Downloads",
    "/srv/downloads",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub ytdlp_bin: String,
    pub static_dir: PathBuf,
    pub download_dirs: Vec<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ytdlp_bin: DEFAULT_YTDLP_BIN.to_string(),
            static_dir: PathBuf::from("static"),
            download_dirs: DEFAULT_DOWNLOAD_DIRS.iter().map(PathBuf::from).collect(),
        }
    }
}

/// Shared handle threaded through every handler. Cloning is cheap; the
/// supervisor and broadcaster are process-wide singletons by construction,
/// not by global access.
#[derive(Clone)]
pub struct AppState {
    pub(crate) supervisor: JobSupervisor,
    pub(crate) broadcaster: LogBroadcaster,
    pub(crate) config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let broadcaster = LogBroadcaster::new();
        Self {
            supervisor: JobSupervisor::new(broadcaster.clone()),
            broadcaster,
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(static_files::index))
        .route("/api/start", post(api::start))
        .route("/api/run_raw", post(api::run_raw))
        .route("/api/stop", post(api::stop))
        .route("/api/status", get(api::status))
        .route("/api/logs", get(api::logs))
        .route("/api/lsblk", get(disks::lsblk))
        .route("/api/df", get(disks::df))
        .route("/api/list_destinations", get(disks::list_destinations))
        .route("/api/mount", post(disks::mount))
        .route("/api/umount", post(disks::umount))
        .fallback(static_files::passthrough)
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "panel listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(?error, "failed to listen for shutdown signal");
    }
}
