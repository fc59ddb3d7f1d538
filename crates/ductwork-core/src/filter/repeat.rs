//! Repeating source: cycle a seekable underlying device.
//!
//! Reads pass through until the underlying reports EOF; the source is
//! then rewound to the start and reading continues. An empty source is
//! not cycled — it reads as EOF. A non-seekable source fails at the
//! first rewind attempt.

use crate::device::{parse_mode, Backend, Device, Stream, Whence};
use crate::errno::{Errno, Result};

/// Cycling-read backend.
#[derive(Debug)]
pub struct Repeat<S: Stream> {
    inner: S,
    /// Bytes served since the last rewind.
    cycle_served: u64,
    /// Bytes served in total (the logical position).
    total_served: u64,
}

impl<S: Stream> Repeat<S> {
    /// Open a cycling reader over `inner`. The mode must be read-only.
    pub fn open(inner: S, mode_str: &str) -> Result<Device<Self>> {
        let mode = parse_mode(mode_str)?;
        if mode.writable {
            return Err(Errno::InvalidArgument);
        }
        Ok(Device::with_mode(
            Repeat {
                inner,
                cycle_served: 0,
                total_served: 0,
            },
            mode,
        ))
    }
}

impl<S: Stream> Backend for Repeat<S> {
    fn kind(&self) -> &'static str {
        "repeat"
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let n = self.inner.read(buf)?;
            if n > 0 {
                self.cycle_served += n as u64;
                self.total_served += n as u64;
                return Ok(n);
            }
            // EOF on the source: cycle only if this pass produced bytes.
            if self.cycle_served == 0 {
                return Ok(0);
            }
            self.inner.seek(0, Whence::Start)?;
            self.cycle_served = 0;
        }
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.total_served)
    }

    fn clear_err(&mut self) {
        self.inner.clear_err();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
