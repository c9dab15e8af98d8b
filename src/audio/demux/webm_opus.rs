//! WebM / Matroska → DCA frame demuxer.
//!
//! Every `SimpleBlock` (and every `Block` inside a `BlockGroup`) carries one
//! Opus packet behind a 4-byte header: track number vint, 16-bit relative
//! timecode, flags. The header is dropped and the packet is written out as a
//! DCA frame, in stream order, without touching the audio.

use std::io::{Read, Write};

use serde::Serialize;

use super::ebml::{self, ElementHandler, ElementId, ElementInfo, ids};
use crate::{
    audio::frame::{FrameWriter, MAX_FRAME_LEN},
    common::errors::{DemuxError, FrameError, ParseError},
};

/// Track/timing header in front of every block payload.
pub const BLOCK_PREFIX_LEN: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemuxStats {
    pub frames: u64,
    pub bytes: u64,
}

/// Walks a WebM stream and writes its audio blocks as DCA frames.
pub struct WebmOpusDemuxer<W> {
    frames: FrameWriter<W>,
}

impl<W: Write> WebmOpusDemuxer<W> {
    pub fn new(output: W) -> Self {
        Self {
            frames: FrameWriter::new(output),
        }
    }

    /// Consumes `input` once, front to back. Frames written before an error
    /// stay written.
    pub fn run<R: Read>(mut self, input: R) -> Result<(DemuxStats, W), DemuxError> {
        ebml::walk(input, &mut self)?;
        self.frames.flush().map_err(DemuxError::Sink)?;

        let stats = DemuxStats {
            frames: self.frames.frames(),
            bytes: self.frames.bytes_written(),
        };
        Ok((stats, self.frames.into_inner()))
    }
}

impl<W: Write> ElementHandler for WebmOpusDemuxer<W> {
    fn binary(&mut self, id: ElementId, value: &[u8], info: &ElementInfo) -> Result<(), DemuxError> {
        if id != ids::SIMPLE_BLOCK && id != ids::BLOCK {
            return Ok(());
        }

        if value.len() <= BLOCK_PREFIX_LEN {
            return Err(ParseError::BlockTooShort {
                offset: info.offset,
                len: value.len(),
            }
            .into());
        }

        let payload = &value[BLOCK_PREFIX_LEN..];
        if payload.len() > MAX_FRAME_LEN {
            return Err(ParseError::FrameTooLarge {
                offset: info.offset,
                len: payload.len(),
            }
            .into());
        }

        self.frames.write_frame(payload).map_err(|e| match e {
            FrameError::Io(io) => DemuxError::Sink(io),
            other => DemuxError::Sink(std::io::Error::other(other)),
        })
    }
}

/// Convenience wrapper: demux `input` into `output`, returning the counts.
pub fn demux_to_frames<R: Read, W: Write>(input: R, output: W) -> Result<DemuxStats, DemuxError> {
    WebmOpusDemuxer::new(output)
        .run(input)
        .map(|(stats, _)| stats)
}
