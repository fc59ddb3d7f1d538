//! Device core: the uniform byte-stream handle.
//!
//! A device is a handle over any producer/consumer of bytes. Concrete
//! devices implement the [`Backend`] capability trait; the [`Device`]
//! handle layers the shared machinery on top: mode flags, the
//! read/write direction state machine, the sticky error and EOF
//! indicators, and a small pushback buffer. Callers (and filters
//! wrapping other devices) talk through the object-safe [`Stream`]
//! trait, which `&mut S` also implements — a filter built over a
//! mutable borrow can never close the device it wraps.
//!
//! Design: the direction rule is explicit. On a read-write handle,
//! changing direction flushes pending writes, discards pushback, and
//! notifies the backend through [`Backend::switch`] before the new
//! operation dispatches.

pub mod file;
pub mod memory;
pub mod mode;
pub mod printf;
pub mod scanf;

pub use mode::{parse_mode, Mode};
pub use printf::Arg;
pub use scanf::ScanArg;

use crate::errno::{Errno, Result};

/// Origin for a seek request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Absolute position from the start of the stream.
    Start,
    /// Relative to the current position.
    Current,
    /// Relative to the end of the stream.
    End,
}

/// Which half of a bidirectional transport to shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Read,
    Write,
    Both,
}

/// Last-operation direction of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// No read or write has been issued yet.
    Fresh,
    Reading,
    Writing,
}

/// Pushback capacity. At least 4 bytes so multi-byte lookahead can be
/// undone; reads drain pushback last-in first-out.
const UNGET_CAP: usize = 8;

// ---------------------------------------------------------------------------
// Backend: the per-device capability set
// ---------------------------------------------------------------------------

/// Capabilities of a concrete device.
///
/// Every method has a conservative default so a backend only implements
/// what it supports: reads and writes are refused, seeking reports
/// [`Errno::NotSeekable`], flush and close succeed trivially.
pub trait Backend {
    /// Short human tag for diagnostics ("memory", "tcp", "aes", ...).
    fn kind(&self) -> &'static str;

    /// Produce up to `buf.len()` bytes. `Ok(0)` means end of data at a
    /// clean boundary.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let _ = buf;
        Err(Errno::NotSupported)
    }

    /// Consume bytes from `buf`, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let _ = buf;
        Err(Errno::NotSupported)
    }

    /// Push any buffered output down to the next layer.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Reposition the stream; returns the new absolute position.
    fn seek(&mut self, off: i64, whence: Whence) -> Result<u64> {
        let _ = (off, whence);
        Err(Errno::NotSeekable)
    }

    /// Current absolute position.
    fn tell(&mut self) -> Result<u64> {
        Err(Errno::NotSeekable)
    }

    /// Direction-switch barrier on a read-write handle. Called after
    /// pending writes are flushed and pushback is discarded.
    fn switch(&mut self, to: Direction) -> Result<()> {
        let _ = to;
        Ok(())
    }

    /// Close one or both halves of a bidirectional transport.
    fn shutdown(&mut self, how: Shutdown) -> Result<()> {
        let _ = how;
        Err(Errno::NotSupported)
    }

    /// Forward an error-clear request (filters pass it downstream).
    fn clear_err(&mut self) {}

    /// Release device resources. Called exactly once, after the final
    /// flush; the handle is destroyed regardless of the outcome.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stream: the caller-facing operation set
// ---------------------------------------------------------------------------

/// Uniform operations available on every open device handle.
///
/// Implemented by [`Device`] and, by delegation, by `&mut S` for any
/// stream `S` — which is how filters reference a downstream device they
/// do not own.
pub trait Stream {
    /// Read up to `buf.len()` bytes. Loops internally: a short count is
    /// returned only at end of data or on error. `Ok(0)` with a
    /// non-empty `buf` means EOF.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write bytes. Loops internally; a short count means the sticky
    /// error was set mid-transfer.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Flush buffered output down the stack.
    fn flush(&mut self) -> Result<()>;

    /// Reposition; clears EOF and pushback. Fails with
    /// [`Errno::NotSeekable`] on sequential devices.
    fn seek(&mut self, off: i64, whence: Whence) -> Result<u64>;

    /// Logical position: the backend position minus pending pushback.
    fn tell(&mut self) -> Result<u64>;

    /// Push a byte back so the next read returns it first. Guaranteed
    /// capacity for at least one byte after any read; beyond the buffer
    /// capacity fails with [`Errno::NoBufferSpace`].
    fn ungetc(&mut self, byte: u8) -> Result<()>;

    /// Shut down one or both halves of a bidirectional transport.
    fn shutdown(&mut self, how: Shutdown) -> Result<()>;

    fn readable(&self) -> bool;
    fn writable(&self) -> bool;

    /// True once a read has hit end of data (cleared by seek/clear_err).
    fn at_eof(&self) -> bool;

    /// The sticky error, if set.
    fn last_error(&self) -> Option<Errno>;

    /// Clear the sticky error and the EOF indicator.
    fn clear_err(&mut self);

    /// Short human tag of the concrete device.
    fn kind(&self) -> &'static str;

    // -- provided conveniences ----------------------------------------------

    /// Read a single byte; `None` at EOF.
    fn getc(&mut self) -> Result<Option<u8>> {
        let mut b = [0u8; 1];
        Ok(match self.read(&mut b)? {
            0 => None,
            _ => Some(b[0]),
        })
    }

    /// Write the whole buffer or report the failure.
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let n = self.write(buf)?;
        if n != buf.len() {
            return Err(self.last_error().unwrap_or(Errno::WriteFault));
        }
        Ok(())
    }

    /// Write a string verbatim (no trailing newline is added).
    fn puts(&mut self, s: &str) -> Result<()> {
        self.write_all(s.as_bytes())
    }

    /// Formatted output. See [`printf`](crate::device::printf) for the
    /// supported conversions. Returns the number of bytes written.
    fn printf(&mut self, fmt: &[u8], args: &[Arg<'_>]) -> Result<usize> {
        let rendered = printf::render(fmt, args)?;
        self.write_all(&rendered)?;
        Ok(rendered.len())
    }

    /// Formatted input over `getc`/`ungetc`. Returns the number of
    /// destinations assigned. See [`scanf`](crate::device::scanf).
    fn scanf(&mut self, fmt: &[u8], dst: &mut [ScanArg<'_>]) -> Result<usize> {
        scanf::scan(self, fmt, dst)
    }

    /// Stream size via save-position, seek-to-end, seek-back.
    fn size(&mut self) -> Result<u64> {
        let saved = self.tell()?;
        let end = self.seek(0, Whence::End)?;
        self.seek(saved as i64, Whence::Start)?;
        Ok(end)
    }
}

impl<S: Stream + ?Sized> Stream for &mut S {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }
    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
    fn seek(&mut self, off: i64, whence: Whence) -> Result<u64> {
        (**self).seek(off, whence)
    }
    fn tell(&mut self) -> Result<u64> {
        (**self).tell()
    }
    fn ungetc(&mut self, byte: u8) -> Result<()> {
        (**self).ungetc(byte)
    }
    fn shutdown(&mut self, how: Shutdown) -> Result<()> {
        (**self).shutdown(how)
    }
    fn readable(&self) -> bool {
        (**self).readable()
    }
    fn writable(&self) -> bool {
        (**self).writable()
    }
    fn at_eof(&self) -> bool {
        (**self).at_eof()
    }
    fn last_error(&self) -> Option<Errno> {
        (**self).last_error()
    }
    fn clear_err(&mut self) {
        (**self).clear_err();
    }
    fn kind(&self) -> &'static str {
        (**self).kind()
    }
}

// ---------------------------------------------------------------------------
// Device: the handle
// ---------------------------------------------------------------------------

/// A device handle: one backend plus the shared stream machinery.
#[derive(Debug)]
pub struct Device<B: Backend> {
    backend: B,
    mode: Mode,
    dir: Direction,
    err: Option<Errno>,
    eof: bool,
    unget: [u8; UNGET_CAP],
    unget_len: usize,
    closed: bool,
}

impl<B: Backend> Device<B> {
    /// Wrap `backend` in a handle configured by `mode_str`.
    pub fn open(backend: B, mode_str: &str) -> Result<Device<B>> {
        Ok(Device::with_mode(backend, parse_mode(mode_str)?))
    }

    /// Wrap `backend` with already-parsed mode flags.
    pub fn with_mode(backend: B, mode: Mode) -> Device<B> {
        Device {
            backend,
            mode,
            dir: Direction::Fresh,
            err: None,
            eof: false,
            unget: [0; UNGET_CAP],
            unget_len: 0,
            closed: false,
        }
    }

    /// The parsed mode flags.
    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// Typed per-device state (the concrete backend).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the concrete backend.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// True if the last operation was a read.
    pub fn just_read(&self) -> bool {
        self.dir == Direction::Reading
    }

    /// True if the last operation was a write.
    pub fn just_wrote(&self) -> bool {
        self.dir == Direction::Writing
    }

    /// Range-checked 32-bit position.
    pub fn tell32(&mut self) -> Result<u32> {
        let pos = Stream::tell(self)?;
        u32::try_from(pos).map_err(|_| Errno::InvalidArgument)
    }

    /// Range-checked 32-bit seek.
    pub fn seek32(&mut self, off: i32, whence: Whence) -> Result<u32> {
        let pos = Stream::seek(self, i64::from(off), whence)?;
        u32::try_from(pos).map_err(|_| Errno::InvalidArgument)
    }

    /// Flush pending output, release the backend, and consume the
    /// handle. Returns the first error encountered; the handle is gone
    /// either way.
    pub fn close(mut self) -> Result<()> {
        let r = self.close_once();
        self.closed = true;
        r
    }

    fn close_once(&mut self) -> Result<()> {
        let mut first = None;
        if self.dir == Direction::Writing {
            if let Err(e) = self.backend.flush() {
                first = Some(e);
            }
        }
        if let Err(e) = self.backend.close() {
            first = first.or(Some(e));
        }
        match first {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Direction barrier: flush pending writes, discard pushback, and
    /// notify the backend before the direction changes.
    fn switch_to(&mut self, to: Direction) -> Result<()> {
        if self.dir == to {
            return Ok(());
        }
        if self.dir == Direction::Fresh {
            self.dir = to;
            return Ok(());
        }
        if self.dir == Direction::Writing {
            if let Err(e) = self.backend.flush() {
                self.err = Some(e);
                return Err(e);
            }
        }
        self.unget_len = 0;
        if let Err(e) = self.backend.switch(to) {
            self.err = Some(e);
            return Err(e);
        }
        self.dir = to;
        Ok(())
    }

    fn fail(&mut self, e: Errno) -> Errno {
        self.err = Some(e);
        e
    }
}

impl<B: Backend> Stream for Device<B> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.mode.readable {
            return Err(self.fail(Errno::PermissionDenied));
        }
        if let Some(e) = self.err {
            return Err(e);
        }
        // Permission and sticky-error checks come first: a zero-length
        // read on a write-only or errored handle still fails.
        if buf.is_empty() {
            return Ok(0);
        }
        self.switch_to(Direction::Reading)?;

        let mut n = 0;
        while n < buf.len() && self.unget_len > 0 {
            self.unget_len -= 1;
            buf[n] = self.unget[self.unget_len];
            n += 1;
        }
        while n < buf.len() {
            match self.backend.read(&mut buf[n..]) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(k) => n += k,
                Err(e) => {
                    self.err = Some(e);
                    if n == 0 {
                        return Err(e);
                    }
                    break;
                }
            }
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.mode.writable {
            return Err(self.fail(Errno::PermissionDenied));
        }
        if let Some(e) = self.err {
            return Err(e);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        self.switch_to(Direction::Writing)?;

        let mut n = 0;
        while n < buf.len() {
            match self.backend.write(&buf[n..]) {
                Ok(0) => {
                    self.err = Some(Errno::WriteFault);
                    break;
                }
                Ok(k) => n += k,
                Err(e) => {
                    self.err = Some(e);
                    break;
                }
            }
        }
        if n == 0 {
            return Err(self.err.unwrap_or(Errno::WriteFault));
        }
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        if self.dir != Direction::Writing {
            return Ok(());
        }
        self.backend.flush().map_err(|e| self.fail(e))
    }

    fn seek(&mut self, off: i64, whence: Whence) -> Result<u64> {
        if self.dir == Direction::Writing {
            if let Err(e) = self.backend.flush() {
                return Err(self.fail(e));
            }
        }
        let pos = self.backend.seek(off, whence).map_err(|e| self.fail(e))?;
        self.unget_len = 0;
        self.eof = false;
        Ok(pos)
    }

    fn tell(&mut self) -> Result<u64> {
        let pos = self.backend.tell()?;
        Ok(pos.saturating_sub(self.unget_len as u64))
    }

    fn ungetc(&mut self, byte: u8) -> Result<()> {
        if !self.mode.readable {
            return Err(self.fail(Errno::PermissionDenied));
        }
        if self.unget_len == UNGET_CAP {
            return Err(Errno::NoBufferSpace);
        }
        self.unget[self.unget_len] = byte;
        self.unget_len += 1;
        self.eof = false;
        Ok(())
    }

    fn shutdown(&mut self, how: Shutdown) -> Result<()> {
        self.backend.shutdown(how).map_err(|e| self.fail(e))
    }

    fn readable(&self) -> bool {
        self.mode.readable
    }

    fn writable(&self) -> bool {
        self.mode.writable
    }

    fn at_eof(&self) -> bool {
        self.eof
    }

    fn last_error(&self) -> Option<Errno> {
        self.err
    }

    fn clear_err(&mut self) {
        self.err = None;
        self.eof = false;
        self.backend.clear_err();
    }

    fn kind(&self) -> &'static str {
        self.backend.kind()
    }
}

impl<B: Backend> Drop for Device<B> {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close_once();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::memory::Memory;
    use super::*;

    #[test]
    fn test_read_write_permissions() {
        let mut dev = Memory::open("r").unwrap();
        assert_eq!(dev.write(b"x"), Err(Errno::PermissionDenied));
        dev.clear_err();

        let mut dev = Memory::open("w").unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(dev.read(&mut buf), Err(Errno::PermissionDenied));
    }

    #[test]
    fn test_zero_length_io_still_checks_permissions() {
        let mut dev = Memory::open("w").unwrap();
        assert_eq!(dev.read(&mut []), Err(Errno::PermissionDenied));
        dev.clear_err();

        let mut dev = Memory::open("r").unwrap();
        assert_eq!(dev.write(b""), Err(Errno::PermissionDenied));
    }

    #[test]
    fn test_zero_length_io_reports_sticky_error() {
        let mut dev = Memory::with_contents(b"ab".to_vec(), "r+").unwrap();
        assert_eq!(dev.shutdown(Shutdown::Both), Err(Errno::NotSupported));
        assert_eq!(dev.read(&mut []), Err(Errno::NotSupported));
        assert_eq!(dev.write(b""), Err(Errno::NotSupported));
        dev.clear_err();
        assert_eq!(dev.read(&mut []).unwrap(), 0);
        assert_eq!(dev.write(b"").unwrap(), 0);
    }

    #[test]
    fn test_ungetc_lifo_order() {
        let mut dev = Memory::with_contents(b"cd".to_vec(), "r").unwrap();
        dev.ungetc(b'b').unwrap();
        dev.ungetc(b'a').unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(dev.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
    }

    #[test]
    fn test_ungetc_capacity() {
        let mut dev = Memory::with_contents(vec![], "r").unwrap();
        for i in 0..UNGET_CAP {
            dev.ungetc(i as u8).unwrap();
        }
        assert_eq!(dev.ungetc(0xff), Err(Errno::NoBufferSpace));
    }

    #[test]
    fn test_ungetc_clears_eof() {
        let mut dev = Memory::with_contents(vec![], "r").unwrap();
        assert_eq!(dev.getc().unwrap(), None);
        assert!(dev.at_eof());
        dev.ungetc(b'z').unwrap();
        assert!(!dev.at_eof());
        assert_eq!(dev.getc().unwrap(), Some(b'z'));
    }

    #[test]
    fn test_tell_accounts_for_pushback() {
        let mut dev = Memory::with_contents(b"abcdef".to_vec(), "r").unwrap();
        let mut buf = [0u8; 3];
        dev.read(&mut buf).unwrap();
        assert_eq!(dev.tell().unwrap(), 3);
        dev.ungetc(b'c').unwrap();
        assert_eq!(dev.tell().unwrap(), 2);
    }

    #[test]
    fn test_seek_discards_pushback_and_eof() {
        let mut dev = Memory::with_contents(b"ab".to_vec(), "r").unwrap();
        let mut buf = [0u8; 2];
        dev.read(&mut buf).unwrap();
        assert_eq!(dev.getc().unwrap(), None);
        assert!(dev.at_eof());
        dev.ungetc(b'!').unwrap();
        dev.seek(0, Whence::Start).unwrap();
        assert!(!dev.at_eof());
        assert_eq!(dev.getc().unwrap(), Some(b'a'));
    }

    #[test]
    fn test_direction_switch_on_update_handle() {
        let mut dev = Memory::with_contents(b"abc".to_vec(), "r+").unwrap();
        assert_eq!(dev.getc().unwrap(), Some(b'a'));
        assert!(dev.just_read());
        dev.ungetc(b'a').unwrap();
        // Switching to write discards the pushback.
        dev.seek(0, Whence::Start).unwrap();
        dev.write(b"X").unwrap();
        assert!(dev.just_wrote());
        dev.seek(0, Whence::Start).unwrap();
        assert_eq!(dev.getc().unwrap(), Some(b'X'));
        assert!(dev.just_read());
    }

    #[test]
    fn test_sticky_error_until_cleared() {
        let mut dev = Memory::with_contents(b"ab".to_vec(), "r").unwrap();
        assert_eq!(dev.write(b"x"), Err(Errno::PermissionDenied));
        // The sticky error now blocks reads too.
        let mut buf = [0u8; 1];
        assert_eq!(dev.read(&mut buf), Err(Errno::PermissionDenied));
        dev.clear_err();
        assert_eq!(dev.read(&mut buf).unwrap(), 1);
    }

    #[test]
    fn test_size_restores_position() {
        let mut dev = Memory::with_contents(b"hello".to_vec(), "r").unwrap();
        let mut buf = [0u8; 2];
        dev.read(&mut buf).unwrap();
        assert_eq!(dev.size().unwrap(), 5);
        assert_eq!(dev.tell().unwrap(), 2);
    }

    #[test]
    fn test_seek32_range_check() {
        let mut dev = Memory::open("w+").unwrap();
        dev.seek(u64::from(u32::MAX) as i64 + 10, Whence::Start)
            .unwrap();
        assert_eq!(dev.tell32(), Err(Errno::InvalidArgument));
    }

    #[test]
    fn test_puts_writes_verbatim() {
        let mut dev = Memory::open("w+").unwrap();
        dev.puts("no newline added").unwrap();
        assert_eq!(dev.backend().contents(), b"no newline added");
    }

    #[test]
    fn test_seek32_round_trip() {
        let mut dev = Memory::with_contents(vec![0u8; 64], "r").unwrap();
        assert_eq!(dev.seek32(10, Whence::Start).unwrap(), 10);
        assert_eq!(dev.seek32(-4, Whence::Current).unwrap(), 6);
        assert_eq!(dev.tell32().unwrap(), 6);
    }

    #[test]
    fn test_filter_over_borrow_leaves_base_open() {
        // A handle wrapped through `&mut` stays usable after the wrapper
        // is dropped: the borrow cannot close it.
        let mut base = Memory::open("w+").unwrap();
        {
            let mut view: &mut dyn Stream = &mut base;
            view.write_all(b"hi").unwrap();
        }
        base.seek(0, Whence::Start).unwrap();
        assert_eq!(base.getc().unwrap(), Some(b'h'));
    }
}
