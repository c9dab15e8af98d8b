//! YouTube resolution through an external `yt-dlp` binary.
//!
//! yt-dlp is asked for the best WebM/Opus format and prints one JSON object
//! per result; the `media_url` it returns is fetched separately over HTTP.

use std::{
    io,
    path::PathBuf,
    process::Stdio,
    sync::LazyLock,
    time::Duration,
};

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info};

use super::plugin::{Query, Resolver, TrackInfo};
use crate::{cache::ContentId, common::errors::AcquisitionError, configs::AcquisitionConfig};

static VIDEO_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(https?://)?(www\.)?(youtube\.com/watch\?v=|youtu\.?be/)([-A-Za-z0-9_]{11})")
        .expect("valid video url pattern")
});

/// `j` conversions JSON-escape each field, so quotes in titles survive.
const PRINT_TEMPLATE: &str =
    r#"{"title": %(title)j, "duration": %(duration)j, "id": %(id)j, "media_url": %(url)j}"#;

pub fn extract_video_id(url: &str) -> Option<ContentId> {
    VIDEO_URL_RE
        .captures(url)
        .and_then(|caps| caps.get(4))
        .and_then(|m| ContentId::parse(m.as_str()).ok())
}

/// The argument yt-dlp gets for `query`.
pub fn yt_dlp_target(query: &Query) -> String {
    match query {
        Query::Id(id) => format!("https://www.youtube.com/watch?v={}", id),
        Query::Url(url) => url.clone(),
        Query::Search(text) => format!("ytsearch:{}", text),
    }
}

/// Parses the first JSON line yt-dlp printed.
pub fn parse_metadata(stdout: &[u8]) -> Result<TrackInfo, AcquisitionError> {
    let output = String::from_utf8_lossy(stdout);
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();

    serde_json::from_str(line).map_err(|source| AcquisitionError::InvalidMetadata {
        source,
        output: output.trim().to_string(),
    })
}

pub struct YtDlpResolver {
    path: PathBuf,
    format: String,
    timeout: Duration,
}

impl YtDlpResolver {
    pub fn new(config: &AcquisitionConfig) -> Self {
        Self {
            path: PathBuf::from(&config.yt_dlp_path),
            format: config.format.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn resolve(&self, query: &Query) -> Result<TrackInfo, AcquisitionError> {
        let target = yt_dlp_target(query);
        debug!("Getting video info for query: {}", target);

        let mut command = Command::new(&self.path);
        command
            .args(["-f", &self.format, "--no-playlist", "--no-warnings"])
            .args(["--print", PRINT_TEMPLATE])
            .arg(&target)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| AcquisitionError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| match e.kind() {
                // Bare names go through PATH, so only the spawn can tell.
                io::ErrorKind::NotFound => AcquisitionError::ResolverMissing {
                    path: self.path.display().to_string(),
                },
                _ => AcquisitionError::Spawn(e),
            })?;

        if !output.status.success() {
            return Err(AcquisitionError::ResolverFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let track = parse_metadata(&output.stdout)?;
        info!(
            "Found video: {} (ID: {}, Duration: {:?} seconds)",
            track.title, track.id, track.duration
        );
        Ok(track)
    }
}
