//! HTTP/1.1 chunked transfer-encoding codec.
//!
//! RFC 7230 §4.1 framing: `hex-len [";" ext] CRLF data CRLF` repeated,
//! terminated by a zero-length chunk. The reader and writer are
//! standalone state machines shared with the HTTP message layer (which
//! frames bodies through them without an extra device), plus a filter
//! device for standalone use.
//!
//! The reader stops after the zero chunk and does not consume trailer
//! headers — the response finalizer owns those. The writer terminates
//! with `0 CRLF CRLF` (an empty trailer section).

use crate::device::{parse_mode, Arg, Backend, Device, Stream};
use crate::errno::{Errno, Result};

/// Decoder state machine.
#[derive(Debug, Default)]
pub struct ChunkReader {
    /// Bytes left in the current chunk.
    remaining: u64,
    /// Payload bytes produced so far.
    total: u64,
    /// A chunk's trailing CRLF is still unconsumed.
    after_data: bool,
    done: bool,
}

impl ChunkReader {
    pub fn new() -> ChunkReader {
        ChunkReader::default()
    }

    /// True once the zero-length chunk has been consumed.
    pub fn finished(&self) -> bool {
        self.done
    }

    /// Total payload bytes decoded.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Decode into `buf` from `src`. Returns at most the remainder of
    /// the current chunk per call; `Ok(0)` after the final chunk.
    pub fn read_from<S: Stream + ?Sized>(&mut self, src: &mut S, buf: &mut [u8]) -> Result<usize> {
        if self.done {
            return Ok(0);
        }
        if self.remaining == 0 {
            if self.after_data {
                expect_crlf(src)?;
                self.after_data = false;
            }
            let len = read_chunk_header(src)?;
            if len == 0 {
                self.done = true;
                return Ok(0);
            }
            self.remaining = len;
            self.after_data = true;
        }
        let want = (buf.len() as u64).min(self.remaining) as usize;
        let n = src.read(&mut buf[..want])?;
        if n == 0 {
            // The peer closed inside a chunk.
            return Err(Errno::BadMessage);
        }
        self.remaining -= n as u64;
        self.total += n as u64;
        Ok(n)
    }
}

/// Parse `hex-len [";" extension] CRLF`.
fn read_chunk_header<S: Stream + ?Sized>(src: &mut S) -> Result<u64> {
    let mut len: u64 = 0;
    let mut digits = 0usize;
    let byte = loop {
        match src.getc()? {
            Some(b) => match hex_value(b) {
                Some(v) => {
                    if digits >= 16 {
                        return Err(Errno::BadMessage);
                    }
                    len = (len << 4) | u64::from(v);
                    digits += 1;
                }
                None => break b,
            },
            None => return Err(Errno::BadMessage),
        }
    };
    if digits == 0 {
        return Err(Errno::BadMessage);
    }
    match byte {
        b';' => {
            // Extensions are consumed and discarded.
            loop {
                match src.getc()? {
                    Some(b'\r') => break,
                    Some(_) => continue,
                    None => return Err(Errno::BadMessage),
                }
            }
            expect_lf(src)?;
        }
        b'\r' => expect_lf(src)?,
        _ => return Err(Errno::BadMessage),
    }
    Ok(len)
}

fn expect_crlf<S: Stream + ?Sized>(src: &mut S) -> Result<()> {
    match src.getc()? {
        Some(b'\r') => expect_lf(src),
        _ => Err(Errno::BadMessage),
    }
}

fn expect_lf<S: Stream + ?Sized>(src: &mut S) -> Result<()> {
    match src.getc()? {
        Some(b'\n') => Ok(()),
        _ => Err(Errno::BadMessage),
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Encoder state machine.
#[derive(Debug, Default)]
pub struct ChunkWriter {
    total: u64,
    terminated: bool,
}

impl ChunkWriter {
    pub fn new() -> ChunkWriter {
        ChunkWriter::default()
    }

    /// True once the terminating chunk went out.
    pub fn terminated(&self) -> bool {
        self.terminated
    }

    /// Emit one chunk frame. An empty payload is a no-op — a zero
    /// length on the wire would terminate the body.
    pub fn write_to<S: Stream + ?Sized>(&mut self, dst: &mut S, payload: &[u8]) -> Result<()> {
        if self.terminated {
            return Err(Errno::InvalidArgument);
        }
        if payload.is_empty() {
            return Ok(());
        }
        dst.printf(b"%llx\r\n", &[Arg::Uint(payload.len() as u64)])?;
        dst.write_all(payload)?;
        dst.write_all(b"\r\n")?;
        self.total += payload.len() as u64;
        Ok(())
    }

    /// Emit the terminating zero chunk and the empty trailer section.
    pub fn finish<S: Stream + ?Sized>(&mut self, dst: &mut S) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = true;
        dst.write_all(b"0\r\n\r\n")
    }
}

// ---------------------------------------------------------------------------
// Filter device
// ---------------------------------------------------------------------------

/// Chunked-framing filter: encodes on write, decodes on read.
#[derive(Debug)]
pub struct Chunked<S: Stream> {
    inner: S,
    reader: ChunkReader,
    writer: ChunkWriter,
    encode_on_close: bool,
}

impl<S: Stream> Chunked<S> {
    /// Open a chunked codec over `inner`.
    pub fn open(inner: S, mode_str: &str) -> Result<Device<Self>> {
        let mode = parse_mode(mode_str)?;
        Ok(Device::with_mode(
            Chunked {
                inner,
                reader: ChunkReader::new(),
                writer: ChunkWriter::new(),
                encode_on_close: mode.writable,
            },
            mode,
        ))
    }
}

impl<S: Stream> Backend for Chunked<S> {
    fn kind(&self) -> &'static str {
        "chunked"
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reader.read_from(&mut self.inner, buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.writer.write_to(&mut self.inner, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn close(&mut self) -> Result<()> {
        if self.encode_on_close {
            self.writer.finish(&mut self.inner)?;
            self.inner.flush()?;
        }
        Ok(())
    }

    fn clear_err(&mut self) {
        self.inner.clear_err();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
