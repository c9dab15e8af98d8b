use std::io::Read;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::youtube;
use crate::{cache::ContentId, common::errors::AcquisitionError};

/// Metadata the resolver returns for one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TrackInfo {
    pub title: String,
    /// Seconds; absent for live streams.
    #[serde(default)]
    pub duration: Option<f64>,
    pub id: String,
    pub media_url: String,
}

/// What the requester asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// A YouTube link; the id is known before anything is fetched.
    Id(ContentId),
    /// Any other URL, handed to the resolver as-is.
    Url(String),
    /// Free text, resolved to the first search hit.
    Search(String),
}

impl Query {
    pub fn parse(input: &str) -> Result<Self, AcquisitionError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(AcquisitionError::EmptyQuery);
        }

        if let Some(id) = youtube::extract_video_id(input) {
            return Ok(Self::Id(id));
        }

        if input.starts_with("http://") || input.starts_with("https://") {
            Ok(Self::Url(input.to_owned()))
        } else {
            Ok(Self::Search(input.to_owned()))
        }
    }

    pub fn content_id(&self) -> Option<&ContentId> {
        match self {
            Self::Id(id) => Some(id),
            _ => None,
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "YouTube video {}", id),
            Self::Url(url) => write!(f, "{}", url),
            Self::Search(text) => write!(f, "search \"{}\"", text),
        }
    }
}

/// Looks up track metadata, including a directly fetchable media URL.
#[async_trait]
pub trait Resolver: Send + Sync {
    fn name(&self) -> &str;

    async fn resolve(&self, query: &Query) -> Result<TrackInfo, AcquisitionError>;
}

/// Blocking byte stream of a container. Read it off the async runtime.
pub type MediaStream = Box<dyn Read + Send>;

/// Opens the container bytes behind a media URL.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn open(&self, url: &str) -> Result<MediaStream, AcquisitionError>;
}
