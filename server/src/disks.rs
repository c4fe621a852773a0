//! Disk and mount utilities: thin shell-outs the panel exposes so a
//! headless box can be pointed at removable media without SSH.

use std::collections::BTreeSet;
use std::path::PathBuf;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;
use tokio::process::Command;
use walkdir::WalkDir;

use crate::AppState;

const LSBLK_COLUMNS: &str = "NAME,PATH,SIZE,FSTYPE,MOUNTPOINT,RM,ROTA,MODEL,LABEL";

/// Destination listing stays shallow: each root plus one level below it.
const DESTINATION_WALK_DEPTH: usize = 1;

struct UtilityFailure {
    output: String,
    code: Option<i32>,
}

/// Runs a utility command, returning its stdout+stderr merged in order of
/// capture; non-zero exit comes back as a failure with the same output.
async fn run_utility(program: &str, args: &[&str]) -> Result<String, UtilityFailure> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|error| UtilityFailure {
            output: error.to_string(),
            code: None,
        })?;
    let mut merged = String::from_utf8_lossy(&output.stdout).into_owned();
    merged.push_str(&String::from_utf8_lossy(&output.stderr));
    if output.status.success() {
        Ok(merged)
    } else {
        Err(UtilityFailure {
            output: merged,
            code: output.status.code(),
        })
    }
}

pub(crate) async fn lsblk() -> Response {
    match run_utility("lsblk", &["-o", LSBLK_COLUMNS]).await {
        Ok(out) => Json(json!({ "ok": true, "lsblk": out })).into_response(),
        Err(failure) => utility_error(&failure),
    }
}

pub(crate) async fn df() -> Response {
    match run_utility("df", &["-hT"]).await {
        Ok(out) => Json(json!({ "ok": true, "df": out })).into_response(),
        Err(failure) => utility_error(&failure),
    }
}

fn utility_error(failure: &UtilityFailure) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "ok": false, "error": failure.output, "code": failure.code })),
    )
        .into_response()
}

pub(crate) async fn list_destinations(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "paths": collect_destinations(&state.config.download_dirs) }))
}

fn collect_destinations(roots: &[PathBuf]) -> Vec<String> {
    let mut found = BTreeSet::new();
    for root in roots {
        if !root.is_dir() {
            continue;
        }
        let walker = WalkDir::new(root).max_depth(DESTINATION_WALK_DEPTH);
        for entry in walker.into_iter().filter_map(Result::ok) {
            if entry.file_type().is_dir() {
                found.insert(entry.path().display().to_string());
            }
        }
    }
    found.into_iter().collect()
}

#[derive(Debug, Deserialize)]
pub(crate) struct MountRequest {
    #[serde(default)]
    device: String,
    #[serde(default)]
    mountpoint: String,
}

pub(crate) async fn mount(Json(request): Json<MountRequest>) -> Response {
    let device = request.device.trim();
    let mountpoint = request.mountpoint.trim();
    if device.is_empty() || mountpoint.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "device and mountpoint required" })),
        )
            .into_response();
    }
    if let Err(error) = tokio::fs::create_dir_all(mountpoint).await {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "ok": false, "error": error.to_string() })),
        )
            .into_response();
    }
    match run_utility("sudo", &["mount", device, mountpoint]).await {
        Ok(out) => Json(json!({ "ok": true, "out": out })).into_response(),
        Err(failure) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "ok": false, "out": failure.output, "code": failure.code })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UmountRequest {
    #[serde(default)]
    target: String,
}

pub(crate) async fn umount(Json(request): Json<UmountRequest>) -> Response {
    let target = request.target.trim();
    if target.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "target required" })),
        )
            .into_response();
    }
    match run_utility("sudo", &["umount", target]).await {
        Ok(out) => Json(json!({ "ok": true, "out": out })).into_response(),
        Err(failure) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "ok": false, "out": failure.output, "code": failure.code })),
        )
            .into_response(),
    }
}
