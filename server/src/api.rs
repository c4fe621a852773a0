use std::convert::Infallible;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use dlpanel_core::ArgsError;
use dlpanel_core::DownloadRequest;
use dlpanel_core::JobStatus;
use dlpanel_core::StartError;
use futures::Stream;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

use crate::AppState;

/// JSON error body with an HTTP status, the shape the panel UI expects.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    #[cfg(test)]
    pub(crate) fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<ArgsError> for ApiError {
    fn from(error: ArgsError) -> Self {
        Self::bad_request(error.to_string())
    }
}

impl From<StartError> for ApiError {
    fn from(error: StartError) -> Self {
        Self::bad_request(error.to_string())
    }
}

pub(crate) async fn start(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> Result<Json<Value>, ApiError> {
    let args = dlpanel_core::build_args(&request, &state.config.ytdlp_bin)?;
    state.supervisor.start(args, false)?;
    Ok(Json(json!({ "status": "started" })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawCommand {
    #[serde(default)]
    cmd: String,
}

pub(crate) async fn run_raw(
    State(state): State<AppState>,
    Json(request): Json<RawCommand>,
) -> Result<Json<Value>, ApiError> {
    let args = dlpanel_core::split_raw_command(&request.cmd)?;
    state.supervisor.start(args, true)?;
    Ok(Json(json!({ "status": "started" })))
}

pub(crate) async fn stop(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": state.supervisor.stop() }))
}

pub(crate) async fn status(State(state): State<AppState>) -> Json<JobStatus> {
    Json(state.supervisor.status())
}

/// One `data:` event per log line, recent history first, then live output
/// until the client goes away. Dropping the stream drops the subscription,
/// which unregisters it from the broadcaster.
pub(crate) async fn logs(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut subscription = state.broadcaster.subscribe();
    let stream = async_stream::stream! {
        while let Some(line) = subscription.next_line().await {
            yield Ok(Event::default().data(line));
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}
