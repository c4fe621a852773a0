use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::Command;
use tracing::debug;
use tracing::warn;

use crate::broadcast::LogBroadcaster;
use crate::error::StartError;

// Conventional shell encoding for signal deaths: 128 + signal.
#[cfg(unix)]
const EXIT_CODE_SIGNAL_BASE: i32 = 128;

#[derive(Debug)]
struct ActiveJob {
    /// Process group id to signal on stop; the group is the child's own
    /// (spawned with `process_group(0)`), so signals reach its descendants.
    #[cfg_attr(not(unix), allow(dead_code))]
    pgid: Option<i32>,
    args: Vec<String>,
    raw: bool,
    started_at: DateTime<Utc>,
}

/// Point-in-time snapshot of the job slot.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub running: bool,
    pub args: Option<Vec<String>>,
    pub raw: Option<bool>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Outcome of a stop request. Stopping is asynchronous: the slot clears only
/// once the reader observes process exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Idle,
    Stopping,
}

#[derive(Debug)]
struct SupervisorInner {
    slot: Mutex<Option<ActiveJob>>,
    broadcaster: LogBroadcaster,
}

impl SupervisorInner {
    fn lock_slot(&self) -> MutexGuard<'_, Option<ActiveJob>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The single authoritative transition back to idle, performed by the
    /// reader task once per spawned process.
    fn clear_slot(&self) {
        *self.lock_slot() = None;
    }

    async fn supervise(self: Arc<Self>, mut child: Child) {
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdout_task = stdout.map(|pipe| {
            tokio::spawn(forward_lines(
                BufReader::new(pipe),
                self.broadcaster.clone(),
            ))
        });
        let stderr_task = stderr.map(|pipe| {
            tokio::spawn(forward_lines(
                BufReader::new(pipe),
                self.broadcaster.clone(),
            ))
        });

        // Drain both pipes to EOF first so the synthetic finished line always
        // lands after the last line of real output.
        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        let code = match child.wait().await {
            Ok(status) => exit_code(status),
            Err(error) => {
                warn!(?error, "failed to await job exit status");
                -1
            }
        };

        self.broadcaster.append(&format!("# Finished with exit code {code}"));
        self.clear_slot();
    }
}

async fn forward_lines<R>(reader: R, broadcaster: LogBroadcaster)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => broadcaster.append(&line),
            Ok(None) => break,
            Err(error) => {
                debug!(?error, "job output pipe closed unexpectedly");
                break;
            }
        }
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or_else(|| {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return EXIT_CODE_SIGNAL_BASE + signal;
            }
        }
        -1
    })
}

/// Single-slot supervisor for the external download process.
///
/// At most one job runs at a time; its merged stdout/stderr is forwarded
/// line-by-line to the shared [`LogBroadcaster`]. Cloning is cheap and all
/// clones share the same slot.
#[derive(Debug, Clone)]
pub struct JobSupervisor {
    inner: Arc<SupervisorInner>,
}

impl JobSupervisor {
    pub fn new(broadcaster: LogBroadcaster) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                slot: Mutex::new(None),
                broadcaster,
            }),
        }
    }

    pub fn broadcaster(&self) -> &LogBroadcaster {
        &self.inner.broadcaster
    }

    /// Spawns `args` (program first) as the one active job.
    ///
    /// Must be called from within a tokio runtime: the spawned child and its
    /// reader task are driven by it. Spawn failures surface here and leave
    /// the slot empty; from then on the job only reports back through the
    /// broadcast log and [`status`](Self::status).
    pub fn start(&self, args: Vec<String>, raw: bool) -> Result<(), StartError> {
        let Some((program, rest)) = args.split_first() else {
            return Err(StartError::EmptyCommand);
        };

        let mut slot = self.inner.lock_slot();
        if slot.is_some() {
            return Err(StartError::AlreadyRunning);
        }

        self.inner
            .broadcaster
            .append(&format!("# Starting: {}", quote_command(&args)));

        let mut command = Command::new(program);
        command
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|error| StartError::Spawn {
            program: program.clone(),
            error,
        })?;

        #[cfg(unix)]
        let pgid = child.id().map(|id| id as i32);
        #[cfg(not(unix))]
        let pgid = None;

        *slot = Some(ActiveJob {
            pgid,
            args,
            raw,
            started_at: Utc::now(),
        });
        drop(slot);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(inner.supervise(child));
        Ok(())
    }

    /// Requests termination of the running job, if any.
    ///
    /// Best-effort and asynchronous: SIGINT goes to the whole process group
    /// and the call returns without waiting. Repeated calls while the job
    /// winds down keep reporting [`StopOutcome::Stopping`].
    pub fn stop(&self) -> StopOutcome {
        let slot = self.inner.lock_slot();
        let Some(job) = slot.as_ref() else {
            return StopOutcome::Idle;
        };
        #[cfg(unix)]
        if let Some(pgid) = job.pgid {
            // A failure here means the group is already gone; same outcome.
            let rc = unsafe { libc::killpg(pgid, libc::SIGINT) };
            if rc != 0 {
                debug!(pgid, "process group already gone when signalled");
            }
        }
        #[cfg(not(unix))]
        {
            let _ = job;
            warn!("stop is a no-op on this platform");
        }
        StopOutcome::Stopping
    }

    /// Never blocks on the process and never touches it.
    pub fn status(&self) -> JobStatus {
        let slot = self.inner.lock_slot();
        match slot.as_ref() {
            Some(job) => JobStatus {
                running: true,
                args: Some(job.args.clone()),
                raw: Some(job.raw),
                started_at: Some(job.started_at),
            },
            None => JobStatus {
                running: false,
                args: None,
                raw: None,
                started_at: None,
            },
        }
    }
}

fn quote_command(args: &[String]) -> String {
    shlex::try_join(args.iter().map(String::as_str)).unwrap_or_else(|_| args.join(" "))
}
