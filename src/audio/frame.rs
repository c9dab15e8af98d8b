//! DCA frame format: `[u16 LE length][payload]`, repeated until the stream
//! closes. No header, no terminator frame.
//!
//! The same bytes are written to the cache file and to the live pipe, so a
//! [`FrameReader`] can decode either.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use bytes::Bytes;

use crate::common::errors::FrameError;

/// Largest payload a single frame can carry.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

const LEN_PREFIX: usize = 2;

/// Encodes payloads as length-prefixed frames.
///
/// Each frame reaches the inner writer in a single `write_all`, which keeps a
/// fan-out sink from ever interleaving half frames.
pub struct FrameWriter<W> {
    inner: W,
    scratch: Vec<u8>,
    frames: u64,
    bytes: u64,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            scratch: Vec::with_capacity(LEN_PREFIX + 1024),
            frames: 0,
            bytes: 0,
        }
    }

    pub fn write_frame(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        if payload.len() > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge(payload.len()));
        }

        self.scratch.clear();
        self.scratch.write_u16::<LittleEndian>(payload.len() as u16)?;
        self.scratch.extend_from_slice(payload);
        self.inner.write_all(&self.scratch)?;

        self.frames += 1;
        self.bytes += self.scratch.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    /// Frames written so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Encoded bytes written so far, length prefixes included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Decodes a frame stream. End of stream is only clean on a frame boundary.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Returns `Ok(None)` on exact end-of-stream.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        let mut len_buf = [0u8; LEN_PREFIX];
        let got = read_full(&mut self.inner, &mut len_buf)?;
        if got == 0 {
            return Ok(None);
        }
        if got < LEN_PREFIX {
            return Err(FrameError::Truncated {
                expected: LEN_PREFIX,
                got,
            });
        }

        let len = u16::from_le_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        let got = read_full(&mut self.inner, &mut payload)?;
        if got < len {
            return Err(FrameError::Truncated { expected: len, got });
        }

        Ok(Some(Bytes::from(payload)))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = Result<Bytes, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

/// Like `read_exact`, but reports how far it got before EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
