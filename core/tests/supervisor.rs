//! End-to-end job lifecycle: real processes, real pipes.
#![cfg(unix)]

use std::time::Duration;

use dlpanel_core::JobSupervisor;
use dlpanel_core::LogBroadcaster;
use dlpanel_core::StartError;
use dlpanel_core::StopOutcome;
use dlpanel_core::Subscription;
use pretty_assertions::assert_eq;

const LINE_TIMEOUT: Duration = Duration::from_secs(10);
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

fn supervisor() -> (JobSupervisor, LogBroadcaster) {
    let broadcaster = LogBroadcaster::new();
    (JobSupervisor::new(broadcaster.clone()), broadcaster)
}

async fn next_line(subscription: &mut Subscription) -> String {
    tokio::time::timeout(LINE_TIMEOUT, subscription.next_line())
        .await
        .expect("timed out waiting for a broadcast line")
        .expect("subscriber channel closed unexpectedly")
}

/// Reads lines until the synthetic finished line, inclusive.
async fn read_until_finished(subscription: &mut Subscription) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        let line = next_line(subscription).await;
        let done = line.starts_with("# Finished with exit code");
        lines.push(line);
        if done {
            return lines;
        }
    }
}

async fn wait_until_idle(supervisor: &JobSupervisor) {
    tokio::time::timeout(IDLE_TIMEOUT, async {
        while supervisor.status().running {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job did not return to idle in time");
}

#[tokio::test]
async fn output_flows_in_order_and_ends_with_finished_line() {
    let (supervisor, broadcaster) = supervisor();
    let mut live = broadcaster.subscribe();

    supervisor
        .start(sh("printf 'A\\nB\\nC\\n'"), false)
        .expect("start");

    let lines = read_until_finished(&mut live).await;
    assert!(lines[0].starts_with("# Starting: "));
    let rest: Vec<&str> = lines[1..].iter().map(String::as_str).collect();
    assert_eq!(rest, vec!["A", "B", "C", "# Finished with exit code 0"]);

    wait_until_idle(&supervisor).await;
    assert!(!supervisor.status().running);

    // A late subscriber replays the exact same sequence from history.
    let mut late = broadcaster.subscribe();
    assert_eq!(late.replay_len(), lines.len());
    let mut replayed = Vec::new();
    for _ in 0..lines.len() {
        replayed.push(next_line(&mut late).await);
    }
    assert_eq!(replayed, lines);
}

#[tokio::test]
async fn status_snapshots_the_running_job() {
    let (supervisor, _broadcaster) = supervisor();
    let args = sh("sleep 30");
    supervisor.start(args.clone(), true).expect("start");

    let status = supervisor.status();
    assert!(status.running);
    assert_eq!(status.args.as_deref(), Some(args.as_slice()));
    assert_eq!(status.raw, Some(true));
    assert!(status.started_at.is_some());

    assert_eq!(supervisor.stop(), StopOutcome::Stopping);
    wait_until_idle(&supervisor).await;
    let status = supervisor.status();
    assert!(!status.running);
    assert_eq!(status.args, None);
    assert_eq!(status.started_at, None);
}

#[tokio::test]
async fn second_start_is_rejected_and_leaves_the_first_job_flowing() {
    let (supervisor, broadcaster) = supervisor();
    let mut live = broadcaster.subscribe();

    supervisor
        .start(
            sh("echo first; sleep 0.3; echo second; sleep 0.3; echo third"),
            false,
        )
        .expect("start");

    // Wait for proof the first job is producing output.
    loop {
        if next_line(&mut live).await == "first" {
            break;
        }
    }

    let rejected = supervisor.start(sh("echo intruder"), false);
    assert!(matches!(rejected, Err(StartError::AlreadyRunning)));

    // The rejected start must not disturb the running job's stream.
    let rest = read_until_finished(&mut live).await;
    let rest: Vec<&str> = rest.iter().map(String::as_str).collect();
    assert_eq!(rest, vec!["second", "third", "# Finished with exit code 0"]);
    wait_until_idle(&supervisor).await;
}

#[tokio::test]
async fn stop_while_idle_is_a_noop() {
    let (supervisor, _broadcaster) = supervisor();
    assert_eq!(supervisor.stop(), StopOutcome::Idle);
    assert_eq!(supervisor.stop(), StopOutcome::Idle);
}

#[tokio::test]
async fn repeated_stop_keeps_reporting_stopping_until_exit() {
    let (supervisor, _broadcaster) = supervisor();
    supervisor.start(sh("sleep 30"), false).expect("start");

    assert_eq!(supervisor.stop(), StopOutcome::Stopping);
    // Mid-shutdown stops stay safe and keep reporting the same outcome.
    while supervisor.status().running {
        assert_eq!(supervisor.stop(), StopOutcome::Stopping);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(supervisor.stop(), StopOutcome::Idle);
}

#[tokio::test]
async fn nonzero_exit_is_reported_and_slot_clears() {
    let (supervisor, broadcaster) = supervisor();
    let mut live = broadcaster.subscribe();
    supervisor.start(sh("exit 7"), false).expect("start");

    let lines = read_until_finished(&mut live).await;
    assert_eq!(
        lines.last().map(String::as_str),
        Some("# Finished with exit code 7")
    );
    wait_until_idle(&supervisor).await;

    // Job failure is local; the supervisor accepts new jobs afterwards.
    supervisor.start(sh("true"), false).expect("restart");
    wait_until_idle(&supervisor).await;
}

#[tokio::test]
async fn job_with_no_output_still_emits_start_and_finish() {
    let (supervisor, broadcaster) = supervisor();
    let mut live = broadcaster.subscribe();
    supervisor.start(sh("true"), false).expect("start");

    let lines = read_until_finished(&mut live).await;
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("# Starting: "));
    assert_eq!(lines[1], "# Finished with exit code 0");
    wait_until_idle(&supervisor).await;
}

#[tokio::test]
async fn stderr_lines_are_merged_into_the_same_feed() {
    let (supervisor, broadcaster) = supervisor();
    let mut live = broadcaster.subscribe();
    supervisor
        .start(sh("echo out; echo err >&2"), false)
        .expect("start");

    let lines = read_until_finished(&mut live).await;
    assert!(lines.contains(&"out".to_string()));
    assert!(lines.contains(&"err".to_string()));
    wait_until_idle(&supervisor).await;
}

#[tokio::test]
async fn spawn_failure_surfaces_synchronously_and_slot_stays_empty() {
    let (supervisor, _broadcaster) = supervisor();
    let result = supervisor.start(
        vec!["/definitely/not/a/real/binary".to_string()],
        false,
    );
    assert!(matches!(result, Err(StartError::Spawn { .. })));
    assert!(!supervisor.status().running);

    // The slot is free for the next job immediately.
    supervisor.start(sh("true"), false).expect("start");
    wait_until_idle(&supervisor).await;
}

#[tokio::test]
async fn empty_command_is_rejected() {
    let (supervisor, _broadcaster) = supervisor();
    assert!(matches!(
        supervisor.start(Vec::new(), false),
        Err(StartError::EmptyCommand)
    ));
    assert!(!supervisor.status().running);
}

#[tokio::test]
async fn interrupt_reaches_the_whole_process_group() {
    let (supervisor, broadcaster) = supervisor();
    let mut live = broadcaster.subscribe();
    // The shell spawns a grandchild; the group signal must reach both.
    supervisor
        .start(sh("sh -c 'sleep 30' & echo spawned; wait"), false)
        .expect("start");

    loop {
        if next_line(&mut live).await == "spawned" {
            break;
        }
    }
    assert_eq!(supervisor.stop(), StopOutcome::Stopping);
    wait_until_idle(&supervisor).await;

    let lines = read_until_finished(&mut live).await;
    assert!(
        lines
            .last()
            .is_some_and(|line| line.starts_with("# Finished with exit code"))
    );
}
