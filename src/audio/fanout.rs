//! Fan-out sink — one logical write replicated, unmodified, to every wrapped
//! writer in a fixed order.
//!
//! Not transactional: when a writer fails, the writers after it never see the
//! buffer and the ones before it already have. Callers treat every wrapped
//! writer as truncated from that point on.

use std::io::{self, Write};

pub struct FanoutWriter<W> {
    sinks: Vec<W>,
}

impl<W: Write> FanoutWriter<W> {
    pub fn new(sinks: Vec<W>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn into_inner(self) -> Vec<W> {
        self.sinks
    }
}

impl<W: Write> Write for FanoutWriter<W> {
    /// Returns only once every sink accepted the whole buffer, so the slowest
    /// sink paces all of them.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for (index, sink) in self.sinks.iter_mut().enumerate() {
            sink.write_all(buf)
                .map_err(|e| io::Error::new(e.kind(), format!("fan-out sink #{index}: {e}")))?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}
