use std::path::Path;

use serde::Deserialize;
use serde::Deserializer;

use crate::error::ArgsError;

/// Toggles the form is allowed to pass straight through to yt-dlp.
const ALLOWED_TOGGLES: &[&str] = &[
    "--no-abort-on-error",
    "--skip-unavailable-fragments",
    "--continue",
    "--restrict-filenames",
    "--windows-filenames",
    "--embed-thumbnail",
    "--embed-metadata",
    "--embed-chapters",
    "--write-description",
    "--write-info-json",
    "--no-clean-info-json",
    "--write-subs",
    "--no-simulate",
    "--no-ignore-no-formats-error",
    "--list-formats",
    "--list-subs",
    "--progress",
    "--console-title",
    "--no-keep-fragments",
];

const DEFAULT_OUTPUT_TEMPLATE: &str = "%(uploader)s/%(title)s.%(ext)s";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatMode {
    #[default]
    Preset,
    Custom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadKind {
    #[default]
    VideoAudio,
    Video,
    Audio,
}

/// Structured form fields for one download job.
///
/// Every field defaults to "absent" so partial forms deserialize cleanly.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub output_template: String,
    #[serde(default)]
    pub archive_path: String,
    #[serde(default)]
    pub format_mode: FormatMode,
    #[serde(default)]
    pub custom_format: String,
    #[serde(default)]
    pub dl_kind: DownloadKind,
    #[serde(default, deserialize_with = "string_or_number")]
    pub max_height: Option<String>,
    #[serde(default)]
    pub limit_rate: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub sleep_interval: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub max_sleep_interval: Option<String>,
    #[serde(default)]
    pub toggles: Vec<String>,
    #[serde(default)]
    pub destination_dir: String,
}

/// Forms historically send numeric fields as either numbers or strings;
/// accept both and normalize to a trimmed string, with empty meaning unset.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let text = match value {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

/// Builds the full yt-dlp argument vector (program name first, URL last)
/// from one [`DownloadRequest`].
pub fn build_args(request: &DownloadRequest, ytdlp_bin: &str) -> Result<Vec<String>, ArgsError> {
    let url = request.url.trim();
    if url.is_empty() {
        return Err(ArgsError::MissingUrl);
    }

    let mut args = vec![ytdlp_bin.to_string(), "--newline".to_string()];

    let output_template = request.output_template.trim();
    if !output_template.is_empty() {
        args.push("-o".to_string());
        args.push(output_template.to_string());
    }

    let archive_path = request.archive_path.trim();
    if !archive_path.is_empty() {
        args.push("--download-archive".to_string());
        args.push(archive_path.to_string());
    }

    match request.format_mode {
        FormatMode::Custom => {
            let custom = request.custom_format.trim();
            if !custom.is_empty() {
                args.push("-f".to_string());
                args.push(custom.to_string());
            }
        }
        FormatMode::Preset => {
            args.push("-f".to_string());
            args.push(preset_format(request.dl_kind, request.max_height.as_deref()));
        }
    }

    let limit_rate = request.limit_rate.trim();
    if !limit_rate.is_empty() {
        args.push("--limit-rate".to_string());
        args.push(limit_rate.to_string());
    }
    if let Some(sleep) = request.sleep_interval.as_deref() {
        args.push("--sleep-interval".to_string());
        args.push(sleep.to_string());
    }
    if let Some(sleep_max) = request.max_sleep_interval.as_deref() {
        args.push("--max-sleep-interval".to_string());
        args.push(sleep_max.to_string());
    }

    for toggle in &request.toggles {
        if ALLOWED_TOGGLES.contains(&toggle.as_str()) {
            args.push(toggle.clone());
        }
    }

    // Convenience: a bare destination directory gets a safe default template.
    let destination_dir = request.destination_dir.trim();
    if !destination_dir.is_empty() && output_template.is_empty() {
        args.push("-o".to_string());
        args.push(
            Path::new(destination_dir)
                .join(DEFAULT_OUTPUT_TEMPLATE)
                .display()
                .to_string(),
        );
    }

    args.push(url.to_string());
    Ok(args)
}

fn preset_format(kind: DownloadKind, max_height: Option<&str>) -> String {
    match (kind, max_height) {
        (DownloadKind::Audio, _) => "bestaudio/best".to_string(),
        (DownloadKind::Video, Some(h)) => format!("bestvideo*[height<={h}]/bestvideo"),
        (DownloadKind::Video, None) => "bestvideo".to_string(),
        (DownloadKind::VideoAudio, Some(h)) => {
            format!("bestvideo*[height<={h}]+bestaudio/best[height<={h}]/best")
        }
        (DownloadKind::VideoAudio, None) => "bestvideo+bestaudio/best".to_string(),
    }
}

/// Splits a raw command line the way a shell would, for the raw-command
/// endpoint. Raw jobs go through the same single-slot supervisor as
/// form-built ones.
pub fn split_raw_command(cmd: &str) -> Result<Vec<String>, ArgsError> {
    let cmd = cmd.trim();
    if cmd.is_empty() {
        return Err(ArgsError::MissingCommand);
    }
    let args = shlex::split(cmd).ok_or(ArgsError::UnbalancedQuoting)?;
    if args.is_empty() {
        return Err(ArgsError::MissingCommand);
    }
    Ok(args)
}
