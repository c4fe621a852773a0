use std::io;

use thiserror::Error;

/// Failures surfaced synchronously by [`JobSupervisor::start`].
///
/// [`JobSupervisor::start`]: crate::JobSupervisor::start
#[derive(Debug, Error)]
pub enum StartError {
    #[error("another task is running")]
    AlreadyRunning,
    #[error("command is empty")]
    EmptyCommand,
    #[error("failed to spawn `{program}`: {error}")]
    Spawn {
        program: String,
        #[source]
        error: io::Error,
    },
}

/// Failures building an argument list from request fields.
#[derive(Debug, Error)]
pub enum ArgsError {
    #[error("Missing URL")]
    MissingUrl,
    #[error("Missing cmd")]
    MissingCommand,
    #[error("command has unbalanced quoting")]
    UnbalancedQuoting,
}
