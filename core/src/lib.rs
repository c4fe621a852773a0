//! Supervision core for the download panel: a single-slot job supervisor
//! that spawns the external downloader, fans its output out to any number
//! of live subscribers, and keeps a bounded rolling history for late
//! joiners. HTTP concerns live in the server crate.

mod args;
mod broadcast;
mod error;
mod supervisor;

pub use args::DownloadKind;
pub use args::DownloadRequest;
pub use args::FormatMode;
pub use args::build_args;
pub use args::split_raw_command;
pub use broadcast::LOG_HISTORY_MAX;
pub use broadcast::LogBroadcaster;
pub use broadcast::REPLAY_MAX;
pub use broadcast::SUBSCRIBER_CHANNEL_CAPACITY;
pub use broadcast::Subscription;
pub use error::ArgsError;
pub use error::StartError;
pub use supervisor::JobStatus;
pub use supervisor::JobSupervisor;
pub use supervisor::StopOutcome;
