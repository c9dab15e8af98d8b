use std::io;

use serde::{Deserialize, Serialize};

/// Exception severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Common,
    Suspicious,
    Fault,
}

/// Malformed container. Always fatal to the conversion.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid variable-length integer at offset {offset}")]
    InvalidVint { offset: u64 },
    #[error("stream truncated at offset {offset}")]
    Truncated { offset: u64 },
    #[error("audio block at offset {offset} is {len} bytes, expected more than 4")]
    BlockTooShort { offset: u64, len: usize },
    #[error("audio block at offset {offset} carries {len} payload bytes, over the frame limit")]
    FrameTooLarge { offset: u64, len: usize },
    #[error("element {id:#x} at offset {offset} declares {size} bytes (limit {limit})")]
    ElementTooLarge {
        id: u32,
        offset: u64,
        size: u64,
        limit: u64,
    },
    #[error("leaf element {id:#x} at offset {offset} has unknown size")]
    UnknownSizeLeaf { id: u32, offset: u64 },
    #[error("element {id:#x} at offset {offset} overruns its parent ending at {parent_end}")]
    Overrun { id: u32, offset: u64, parent_end: u64 },
    #[error("element {id:#x} has an invalid {kind} payload of {size} bytes")]
    InvalidPayload {
        id: u32,
        kind: &'static str,
        size: u64,
    },
}

/// Frame-format encode/decode failure.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame payload of {0} bytes exceeds the 65535-byte limit")]
    TooLarge(usize),
    #[error("frame truncated: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Everything that can stop the demuxer, split by which side failed.
#[derive(Debug, thiserror::Error)]
pub enum DemuxError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("failed to read container stream: {0}")]
    Read(#[source] io::Error),
    #[error("failed to write frame: {0}")]
    Sink(#[source] io::Error),
}

/// Metadata lookup or media download failure.
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("empty query")]
    EmptyQuery,
    #[error("yt-dlp not found at {path}")]
    ResolverMissing { path: String },
    #[error("failed to run yt-dlp: {0}")]
    Spawn(#[source] io::Error),
    #[error("yt-dlp exited with {status}: {stderr}")]
    ResolverFailed { status: String, stderr: String },
    #[error("metadata lookup timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("failed to parse metadata: {source}; output: {output}")]
    InvalidMetadata {
        #[source]
        source: serde_json::Error,
        output: String,
    },
    #[error("invalid content id: {0:?}")]
    InvalidContentId(String),
    #[error("failed to get media stream: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to get media stream: HTTP status {0}")]
    Status(u16),
    #[error("media stream interrupted: {0}")]
    Stream(#[source] io::Error),
}

/// Playback sink or frame source failure during a session.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("error joining voice channel: {0}")]
    Join(String),
    #[error("error opening cached audio: {0}")]
    SourceOpen(#[source] io::Error),
    #[error("playback sink failed: {0}")]
    Sink(String),
    #[error("error reading audio frame: {0}")]
    Read(#[from] FrameError),
}

impl PlaybackError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Join(_) => Severity::Common,
            Self::Read(_) => Severity::Suspicious,
            Self::SourceOpen(_) | Self::Sink(_) => Severity::Fault,
        }
    }
}

/// Umbrella error surfaced to whoever asked for playback.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),
    #[error("malformed container: {0}")]
    Parse(#[from] ParseError),
    #[error("cache write failed: {0}")]
    Sink(#[source] io::Error),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error("conversion task aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Acquisition(_) => Severity::Common,
            Self::Parse(_) => Severity::Suspicious,
            Self::Playback(e) => e.severity(),
            Self::Sink(_) | Self::Aborted(_) => Severity::Fault,
        }
    }
}

impl From<DemuxError> for PipelineError {
    fn from(e: DemuxError) -> Self {
        match e {
            DemuxError::Parse(p) => Self::Parse(p),
            DemuxError::Read(io) => Self::Acquisition(AcquisitionError::Stream(io)),
            DemuxError::Sink(io) => Self::Sink(io),
        }
    }
}
