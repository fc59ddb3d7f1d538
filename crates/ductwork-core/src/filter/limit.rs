//! Byte limiter: a window onto an underlying device.
//!
//! Restricts access to `[offset, offset + length)` of the underlying
//! stream. Reads clamp at the window end; writing past it reports
//! exhausted buffer space; seeks are window-relative and bounded.

use crate::device::{parse_mode, Backend, Device, Stream, Whence};
use crate::errno::{Errno, Result};

/// Windowed-access backend.
#[derive(Debug)]
pub struct Limit<S: Stream> {
    inner: S,
    offset: u64,
    length: u64,
    /// Position within the window.
    pos: u64,
}

impl<S: Stream> Limit<S> {
    /// Open a window of `length` bytes starting at `offset`.
    ///
    /// The underlying device is positioned at `offset` when it is
    /// seekable; a non-seekable underlying is accepted for a window at
    /// offset zero (a pure length cap on a live stream).
    pub fn open(mut inner: S, offset: u64, length: u64, mode_str: &str) -> Result<Device<Self>> {
        let mode = parse_mode(mode_str)?;
        let start = i64::try_from(offset).map_err(|_| Errno::InvalidArgument)?;
        match inner.seek(start, Whence::Start) {
            Ok(_) => {}
            Err(Errno::NotSeekable) if offset == 0 => {}
            Err(e) => return Err(e),
        }
        Ok(Device::with_mode(
            Limit {
                inner,
                offset,
                length,
                pos: 0,
            },
            mode,
        ))
    }

    fn remaining(&self) -> u64 {
        self.length.saturating_sub(self.pos)
    }
}

impl<S: Stream> Backend for Limit<S> {
    fn kind(&self) -> &'static str {
        "limit"
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let want = (buf.len() as u64).min(self.remaining()) as usize;
        if want == 0 {
            return Ok(0);
        }
        let n = self.inner.read(&mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let want = (buf.len() as u64).min(self.remaining()) as usize;
        if want == 0 {
            return Err(Errno::NoBufferSpace);
        }
        let n = self.inner.write(&buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn seek(&mut self, off: i64, whence: Whence) -> Result<u64> {
        let base = match whence {
            Whence::Start => 0i64,
            Whence::Current => self.pos as i64,
            Whence::End => self.length as i64,
        };
        let target = base.checked_add(off).ok_or(Errno::InvalidArgument)?;
        if target < 0 || target as u64 > self.length {
            return Err(Errno::InvalidArgument);
        }
        let abs = self
            .offset
            .checked_add(target as u64)
            .ok_or(Errno::InvalidArgument)?;
        self.inner
            .seek(i64::try_from(abs).map_err(|_| Errno::InvalidArgument)?, Whence::Start)?;
        self.pos = target as u64;
        Ok(self.pos)
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.pos)
    }

    fn clear_err(&mut self) {
        self.inner.clear_err();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
