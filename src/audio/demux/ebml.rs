//! Single-pass EBML (Matroska / WebM) element walker.
//!
//! The input is consumed exactly once, front to back, with no seeking. Every
//! element is reported to an [`ElementHandler`] depth-first: master elements
//! as begin/end pairs around their children, leaves as typed values.
//!
//! ```text
//!  ┌──────────┬────────────┬─────────────────────────┐
//!  │ ID vint  │ size vint  │ data (children or value)│
//!  │ 1-4 B    │ 1-8 B      │ size bytes              │
//!  └──────────┴────────────┴─────────────────────────┘
//! ```
//!
//! Masters muxed live may carry an "unknown" size (all value bits set). Such
//! a master stays open until an element of the same or a higher level shows
//! up, or the stream ends.

use std::io::{self, Read};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use time::{Duration, OffsetDateTime, macros::datetime};

use crate::common::errors::{DemuxError, ParseError};

pub type ElementId = u32;

/// Leaves above this size are refused instead of buffered.
pub const MAX_LEAF_SIZE: u64 = 16 * 1024 * 1024;

/// Matroska dates count nanoseconds from this instant.
const MATROSKA_EPOCH: OffsetDateTime = datetime!(2001-01-01 0:00 UTC);

pub mod ids {
    use super::ElementId;

    pub const EBML: ElementId = 0x1A45_DFA3;
    pub const EBML_VERSION: ElementId = 0x4286;
    pub const EBML_READ_VERSION: ElementId = 0x42F7;
    pub const EBML_MAX_ID_LENGTH: ElementId = 0x42F2;
    pub const EBML_MAX_SIZE_LENGTH: ElementId = 0x42F3;
    pub const DOC_TYPE: ElementId = 0x4282;
    pub const DOC_TYPE_VERSION: ElementId = 0x4287;
    pub const DOC_TYPE_READ_VERSION: ElementId = 0x4285;
    pub const VOID: ElementId = 0xEC;
    pub const CRC32: ElementId = 0xBF;

    pub const SEGMENT: ElementId = 0x1853_8067;

    pub const SEEK_HEAD: ElementId = 0x114D_9B74;
    pub const SEEK: ElementId = 0x4DBB;
    pub const SEEK_ID: ElementId = 0x53AB;
    pub const SEEK_POSITION: ElementId = 0x53AC;

    pub const INFO: ElementId = 0x1549_A966;
    pub const TIMECODE_SCALE: ElementId = 0x2A_D7B1;
    pub const DURATION: ElementId = 0x4489;
    pub const DATE_UTC: ElementId = 0x4461;
    pub const TITLE: ElementId = 0x7BA9;
    pub const MUXING_APP: ElementId = 0x4D80;
    pub const WRITING_APP: ElementId = 0x5741;

    pub const TRACKS: ElementId = 0x1654_AE6B;
    pub const TRACK_ENTRY: ElementId = 0xAE;
    pub const TRACK_NUMBER: ElementId = 0xD7;
    pub const TRACK_UID: ElementId = 0x73C5;
    pub const TRACK_TYPE: ElementId = 0x83;
    pub const FLAG_LACING: ElementId = 0x9C;
    pub const DEFAULT_DURATION: ElementId = 0x23_E383;
    pub const LANGUAGE: ElementId = 0x22_B59C;
    pub const CODEC_ID: ElementId = 0x86;
    pub const CODEC_PRIVATE: ElementId = 0x63A2;
    pub const CODEC_DELAY: ElementId = 0x56AA;
    pub const SEEK_PRE_ROLL: ElementId = 0x56BB;
    pub const AUDIO: ElementId = 0xE1;
    pub const SAMPLING_FREQUENCY: ElementId = 0xB5;
    pub const CHANNELS: ElementId = 0x9F;
    pub const BIT_DEPTH: ElementId = 0x6264;

    pub const CLUSTER: ElementId = 0x1F43_B675;
    pub const TIMECODE: ElementId = 0xE7;
    pub const SIMPLE_BLOCK: ElementId = 0xA3;
    pub const BLOCK_GROUP: ElementId = 0xA0;
    pub const BLOCK: ElementId = 0xA1;
    pub const BLOCK_DURATION: ElementId = 0x9B;
    pub const REFERENCE_BLOCK: ElementId = 0xFB;
    pub const DISCARD_PADDING: ElementId = 0x75A2;

    pub const CUES: ElementId = 0x1C53_BB6B;
    pub const CUE_POINT: ElementId = 0xBB;
    pub const CUE_TIME: ElementId = 0xB3;
    pub const CUE_TRACK_POSITIONS: ElementId = 0xB7;
    pub const CUE_TRACK: ElementId = 0xF7;
    pub const CUE_CLUSTER_POSITION: ElementId = 0xF1;
    pub const CUE_RELATIVE_POSITION: ElementId = 0xF0;

    pub const CHAPTERS: ElementId = 0x1043_A770;
    pub const ATTACHMENTS: ElementId = 0x1941_A469;
    pub const TAGS: ElementId = 0x1254_C367;
    pub const TAG: ElementId = 0x7373;
    pub const TARGETS: ElementId = 0x63C0;
    pub const SIMPLE_TAG: ElementId = 0x67C8;
    pub const TAG_NAME: ElementId = 0x45A3;
    pub const TAG_STRING: ElementId = 0x4487;
}

/// How an element's data is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Master,
    Unsigned,
    Signed,
    Float,
    String,
    Date,
    Binary,
    /// Not in the table; skipped without being reported.
    Unknown,
}

pub fn kind_of(id: ElementId) -> ElementKind {
    use ids::*;

    match id {
        EBML | SEGMENT | SEEK_HEAD | SEEK | INFO | TRACKS | TRACK_ENTRY | AUDIO | CLUSTER
        | BLOCK_GROUP | CUES | CUE_POINT | CUE_TRACK_POSITIONS | CHAPTERS | ATTACHMENTS
        | TAGS | TAG | TARGETS | SIMPLE_TAG => ElementKind::Master,

        EBML_VERSION | EBML_READ_VERSION | EBML_MAX_ID_LENGTH | EBML_MAX_SIZE_LENGTH
        | DOC_TYPE_VERSION | DOC_TYPE_READ_VERSION | SEEK_POSITION | TIMECODE_SCALE
        | TRACK_NUMBER | TRACK_UID | TRACK_TYPE | FLAG_LACING | DEFAULT_DURATION
        | CODEC_DELAY | SEEK_PRE_ROLL | CHANNELS | BIT_DEPTH | TIMECODE | BLOCK_DURATION
        | CUE_TIME | CUE_TRACK | CUE_CLUSTER_POSITION | CUE_RELATIVE_POSITION => {
            ElementKind::Unsigned
        }

        REFERENCE_BLOCK | DISCARD_PADDING => ElementKind::Signed,

        DURATION | SAMPLING_FREQUENCY => ElementKind::Float,

        DOC_TYPE | CODEC_ID | LANGUAGE | TITLE | MUXING_APP | WRITING_APP | TAG_NAME
        | TAG_STRING => ElementKind::String,

        DATE_UTC => ElementKind::Date,

        VOID | CRC32 | SEEK_ID | CODEC_PRIVATE | SIMPLE_BLOCK | BLOCK => ElementKind::Binary,

        _ => ElementKind::Unknown,
    }
}

/// Direct children of a Segment. Any of these ends an open unknown-size Cluster.
fn is_segment_child(id: ElementId) -> bool {
    use ids::*;
    matches!(
        id,
        SEEK_HEAD | INFO | TRACKS | CLUSTER | CUES | CHAPTERS | ATTACHMENTS | TAGS
    )
}

/// Position and extent of one element, handed to every callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementInfo {
    /// Offset of the element's ID.
    pub offset: u64,
    /// Offset of the element's data.
    pub data_offset: u64,
    /// `None` for unknown-size masters.
    pub size: Option<u64>,
    /// Number of enclosing masters.
    pub depth: usize,
}

/// Receives elements as the walker meets them. Every method defaults to
/// "ignore", so implementors only override what they extract.
pub trait ElementHandler {
    /// Return `false` to skip the master's children.
    fn master_begin(&mut self, _id: ElementId, _info: &ElementInfo) -> Result<bool, DemuxError> {
        Ok(true)
    }

    fn master_end(&mut self, _id: ElementId, _info: &ElementInfo) -> Result<(), DemuxError> {
        Ok(())
    }

    fn string(&mut self, _id: ElementId, _value: &str, _info: &ElementInfo) -> Result<(), DemuxError> {
        Ok(())
    }

    /// Signed and unsigned integers both land here.
    fn integer(&mut self, _id: ElementId, _value: i64, _info: &ElementInfo) -> Result<(), DemuxError> {
        Ok(())
    }

    fn float(&mut self, _id: ElementId, _value: f64, _info: &ElementInfo) -> Result<(), DemuxError> {
        Ok(())
    }

    fn date(
        &mut self,
        _id: ElementId,
        _value: OffsetDateTime,
        _info: &ElementInfo,
    ) -> Result<(), DemuxError> {
        Ok(())
    }

    fn binary(&mut self, _id: ElementId, _value: &[u8], _info: &ElementInfo) -> Result<(), DemuxError> {
        Ok(())
    }
}

struct OpenMaster {
    id: ElementId,
    info: ElementInfo,
    end: Option<u64>,
}

/// Byte source that remembers how far it has read.
struct Tracked<R> {
    inner: R,
    pos: u64,
}

impl<R: Read> Tracked<R> {
    /// `Ok(None)` only at a clean end of stream.
    fn read_byte(&mut self) -> Result<Option<u8>, DemuxError> {
        match self.inner.read_u8() {
            Ok(b) => {
                self.pos += 1;
                Ok(Some(b))
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(DemuxError::Read(e)),
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), DemuxError> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.pos += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(ParseError::Truncated { offset: self.pos }.into())
            }
            Err(e) => Err(DemuxError::Read(e)),
        }
    }

    fn skip(&mut self, n: u64) -> Result<(), DemuxError> {
        let copied = io::copy(&mut (&mut self.inner).take(n), &mut io::sink())
            .map_err(DemuxError::Read)?;
        self.pos += copied;
        if copied < n {
            return Err(ParseError::Truncated { offset: self.pos }.into());
        }
        Ok(())
    }

    /// Reads the rest of a vint whose first byte is `first`. Returns the value
    /// and the vint's total length.
    fn read_vint(&mut self, first: u8, keep_marker: bool, offset: u64) -> Result<(u64, usize), DemuxError> {
        let len = first.leading_zeros() as usize + 1;
        if len > 8 {
            return Err(ParseError::InvalidVint { offset }.into());
        }

        let mut value = if keep_marker {
            first as u64
        } else {
            (first & (0xFF >> len)) as u64
        };

        for _ in 1..len {
            let b = self
                .read_byte()?
                .ok_or(ParseError::Truncated { offset: self.pos })?;
            value = (value << 8) | b as u64;
        }

        Ok((value, len))
    }
}

/// Walks every element of `input`, calling `handler` along the way.
///
/// Stops at the first handler error or malformed element. A stream that ends
/// inside a sized master is reported as truncated.
pub fn walk<R: Read, H: ElementHandler>(input: R, handler: &mut H) -> Result<(), DemuxError> {
    let mut src = Tracked {
        inner: input,
        pos: 0,
    };
    let mut open: Vec<OpenMaster> = Vec::new();

    loop {
        close_finished(&mut open, src.pos, handler)?;

        let offset = src.pos;
        let Some(first) = src.read_byte()? else {
            break;
        };

        let (id, id_len) = src.read_vint(first, true, offset)?;
        if id_len > 4 {
            return Err(ParseError::InvalidVint { offset }.into());
        }
        let id = id as ElementId;

        let size_offset = src.pos;
        let size_first = src
            .read_byte()?
            .ok_or(ParseError::Truncated { offset: src.pos })?;
        let (raw_size, size_len) = src.read_vint(size_first, false, size_offset)?;
        let size = if raw_size == (1u64 << (7 * size_len)) - 1 {
            None
        } else {
            Some(raw_size)
        };

        let data_offset = src.pos;
        let kind = kind_of(id);

        close_unknown_sized(&mut open, id, handler)?;

        if let (Some(size), Some(parent_end)) = (size, open.iter().rev().find_map(|m| m.end)) {
            if data_offset + size > parent_end {
                return Err(ParseError::Overrun {
                    id,
                    offset,
                    parent_end,
                }
                .into());
            }
        }

        let info = ElementInfo {
            offset,
            data_offset,
            size,
            depth: open.len(),
        };

        match kind {
            ElementKind::Master => {
                let descend = handler.master_begin(id, &info)?;
                match (descend, size) {
                    (false, Some(size)) => {
                        src.skip(size)?;
                        handler.master_end(id, &info)?;
                    }
                    // an unknown-size master cannot be skipped, only walked
                    _ => open.push(OpenMaster {
                        id,
                        info,
                        end: size.map(|s| data_offset + s),
                    }),
                }
            }
            ElementKind::Unknown => {
                let size = size.ok_or(ParseError::UnknownSizeLeaf { id, offset })?;
                src.skip(size)?;
            }
            leaf => {
                let size = size.ok_or(ParseError::UnknownSizeLeaf { id, offset })?;
                if size > MAX_LEAF_SIZE {
                    return Err(ParseError::ElementTooLarge {
                        id,
                        offset,
                        size,
                        limit: MAX_LEAF_SIZE,
                    }
                    .into());
                }

                let mut data = vec![0u8; size as usize];
                src.read_exact(&mut data)?;
                dispatch_leaf(leaf, id, &data, &info, handler)?;
            }
        }
    }

    while let Some(master) = open.pop() {
        if master.end.is_some_and(|end| src.pos < end) {
            return Err(ParseError::Truncated { offset: src.pos }.into());
        }
        handler.master_end(master.id, &master.info)?;
    }

    Ok(())
}

fn close_finished<H: ElementHandler>(
    open: &mut Vec<OpenMaster>,
    pos: u64,
    handler: &mut H,
) -> Result<(), DemuxError> {
    while open.last().is_some_and(|m| m.end.is_some_and(|end| pos >= end)) {
        if let Some(master) = open.pop() {
            handler.master_end(master.id, &master.info)?;
        }
    }
    Ok(())
}

fn close_unknown_sized<H: ElementHandler>(
    open: &mut Vec<OpenMaster>,
    id: ElementId,
    handler: &mut H,
) -> Result<(), DemuxError> {
    loop {
        let Some(idx) = open.iter().rposition(|m| m.end.is_none()) else {
            return Ok(());
        };

        let master_id = open[idx].id;
        let closes = id == master_id
            || (master_id == ids::CLUSTER && is_segment_child(id))
            || (master_id == ids::SEGMENT && id == ids::EBML);
        if !closes {
            return Ok(());
        }

        while open.len() > idx {
            if let Some(master) = open.pop() {
                handler.master_end(master.id, &master.info)?;
            }
        }
    }
}

fn dispatch_leaf<H: ElementHandler>(
    kind: ElementKind,
    id: ElementId,
    data: &[u8],
    info: &ElementInfo,
    handler: &mut H,
) -> Result<(), DemuxError> {
    let invalid = |kind: &'static str| ParseError::InvalidPayload {
        id,
        kind,
        size: data.len() as u64,
    };

    match kind {
        ElementKind::Unsigned => {
            if data.len() > 8 {
                return Err(invalid("unsigned integer").into());
            }
            let value = data.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
            handler.integer(id, value as i64, info)
        }
        ElementKind::Signed => {
            if data.len() > 8 {
                return Err(invalid("signed integer").into());
            }
            let seed: i64 = if data.first().is_some_and(|b| b & 0x80 != 0) {
                -1
            } else {
                0
            };
            let value = data.iter().fold(seed, |acc, &b| (acc << 8) | b as i64);
            handler.integer(id, value, info)
        }
        ElementKind::Float => {
            let value = match data.len() {
                0 => 0.0,
                4 => BigEndian::read_f32(data) as f64,
                8 => BigEndian::read_f64(data),
                _ => return Err(invalid("float").into()),
            };
            handler.float(id, value, info)
        }
        ElementKind::String => {
            let trimmed = match data.iter().position(|&b| b == 0) {
                Some(nul) => &data[..nul],
                None => data,
            };
            handler.string(id, &String::from_utf8_lossy(trimmed), info)
        }
        ElementKind::Date => {
            let nanos = match data.len() {
                0 => 0,
                8 => BigEndian::read_i64(data),
                _ => return Err(invalid("date").into()),
            };
            let value = MATROSKA_EPOCH
                .checked_add(Duration::nanoseconds(nanos))
                .ok_or_else(|| invalid("date"))?;
            handler.date(id, value, info)
        }
        ElementKind::Binary => handler.binary(id, data, info),
        ElementKind::Master | ElementKind::Unknown => Ok(()),
    }
}
