use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;

use crate::AppState;

pub(crate) async fn index(State(state): State<AppState>) -> Response {
    serve_file(&state.config.static_dir, "index.html").await
}

/// Fallback route: anything that is not an API path is looked up in the
/// static asset directory.
pub(crate) async fn passthrough(State(state): State<AppState>, uri: Uri) -> Response {
    serve_file(&state.config.static_dir, uri.path().trim_start_matches('/')).await
}

async fn serve_file(root: &Path, requested: &str) -> Response {
    let Some(path) = resolve(root, requested) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.to_string())], bytes).into_response()
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Maps a request path to a file under `root`. Anything that is not a plain
/// relative path of normal components is refused.
fn resolve(root: &Path, requested: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(requested).ok()?;
    if decoded.is_empty() {
        return None;
    }
    let relative = Path::new(decoded.as_ref());
    if relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(relative))
}
