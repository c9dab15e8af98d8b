//! `FrameSource` — the one capability playback needs: "read the next frame".
//!
//! Two origins implement it:
//!
//! | Origin | Backing | When |
//! |---|---|---|
//! | [`AudioSource::Cached`] | finished `<id>.dca` file | cache hit |
//! | [`AudioSource::Live`] | [`PipeReader`] fed by the converter | first play of a track |
//!
//! Playback only ever sees `Box<dyn FrameSource>`.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::PathBuf,
};

use bytes::Bytes;

use crate::{
    audio::{frame::FrameReader, pipe::PipeReader},
    common::errors::{FrameError, PlaybackError},
};

pub trait FrameSource: Send {
    /// `Ok(None)` on a clean end of stream.
    fn next_frame(&mut self) -> Result<Option<Bytes>, FrameError>;
}

impl<R: Read + Send> FrameSource for FrameReader<R> {
    fn next_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        FrameReader::next_frame(self)
    }
}

/// Where a session's frames come from, before it is opened.
pub enum AudioSource {
    Cached(PathBuf),
    Live(PipeReader),
}

impl AudioSource {
    pub fn open(self) -> Result<Box<dyn FrameSource>, PlaybackError> {
        match self {
            Self::Cached(path) => {
                let file = File::open(&path).map_err(PlaybackError::SourceOpen)?;
                Ok(Box::new(FrameReader::new(BufReader::new(file))))
            }
            Self::Live(reader) => Ok(Box::new(FrameReader::new(reader))),
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }
}

impl std::fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cached(path) => f.debug_tuple("Cached").field(path).finish(),
            Self::Live(_) => f.write_str("Live"),
        }
    }
}
