use std::net::IpAddr;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use dlpanel_server::AppState;
use dlpanel_server::DEFAULT_DOWNLOAD_DIRS;
use dlpanel_server::DEFAULT_YTDLP_BIN;
use dlpanel_server::ServerConfig;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Local-network control panel for a yt-dlp download box.
#[derive(Debug, Parser)]
#[command(name = "dlpanel", version, about)]
struct Cli {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Directory holding the panel's static assets.
    #[arg(long, default_value = "static")]
    static_dir: PathBuf,

    /// Downloader executable to launch.
    #[arg(long, default_value = DEFAULT_YTDLP_BIN)]
    ytdlp_bin: String,

    /// Root offered as a download destination; repeat for several.
    #[arg(long = "download-dir")]
    download_dirs: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let download_dirs = if cli.download_dirs.is_empty() {
        DEFAULT_DOWNLOAD_DIRS.iter().map(PathBuf::from).collect()
    } else {
        cli.download_dirs
    };
    let config = ServerConfig {
        ytdlp_bin: cli.ytdlp_bin,
        static_dir: cli.static_dir,
        download_dirs,
    };

    let addr = SocketAddr::new(cli.host, cli.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    dlpanel_server::serve(listener, AppState::new(config)).await
}
