//! Bounded in-process pipe from the converter to a live playback reader.
//!
//! The writer blocks once `capacity` chunks are queued, so a slow reader paces
//! the conversion (and with it the cache file) just like an unbuffered pipe
//! would, only with some slack. A reader that goes away detaches instead of
//! failing the writer: the cache side keeps converting to the end.

use std::{
    fmt::Display,
    io::{self, Read, Write},
};

use bytes::{Buf, Bytes};
use tracing::debug;

enum Chunk {
    Data(Bytes),
    Failed(String),
}

pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = flume::bounded(capacity.max(1));
    (
        PipeWriter { tx: Some(tx) },
        PipeReader {
            rx,
            current: Bytes::new(),
        },
    )
}

pub struct PipeWriter {
    tx: Option<flume::Sender<Chunk>>,
}

impl PipeWriter {
    /// Ends the stream with an error instead of a clean EOF.
    pub fn fail(mut self, reason: impl Display) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Chunk::Failed(reason.to_string()));
        }
    }

    /// True once the reader has been dropped.
    pub fn is_detached(&self) -> bool {
        self.tx.is_none()
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if let Some(tx) = &self.tx {
            if tx.send(Chunk::Data(Bytes::copy_from_slice(buf))).is_err() {
                debug!("Live reader went away; conversion continues without it");
                self.tx = None;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct PipeReader {
    rx: flume::Receiver<Chunk>,
    current: Bytes,
}

impl Read for PipeReader {
    /// Blocks until data, the writer's failure, or the writer being dropped.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.current.is_empty() {
            match self.rx.recv() {
                Ok(Chunk::Data(bytes)) => self.current = bytes,
                Ok(Chunk::Failed(reason)) => return Err(io::Error::other(reason)),
                Err(flume::RecvError::Disconnected) => return Ok(0),
            }
        }

        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current.advance(n);
        Ok(n)
    }
}
