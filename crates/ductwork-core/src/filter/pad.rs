//! Bit-padding encoder: `0x80` then zeros to a block multiple.
//!
//! Write side: payload bytes pass through; closing the device appends
//! the padding so the total is the next block multiple. The marker is
//! always appended — input already at a block boundary gains a full
//! block — so the transform is reversible. Read side: the underlying
//! source is forwarded to EOF, then the padding is produced, then EOF.
//!
//! For input length `L` and block size `B`, the padded length is
//! `ceil((L+1)/B)*B` with `padded[L] == 0x80` and zeros after.

use crate::device::{parse_mode, Backend, Device, Direction, Stream};
use crate::errno::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadPhase {
    Source,
    Marker,
    Zeros(u64),
    Done,
}

/// Padding-adapter backend.
#[derive(Debug)]
pub struct BitPad<S: Stream> {
    inner: S,
    block_size: u64,
    /// Bytes passed through so far (either direction).
    count: u64,
    /// The handle can write; padding may be owed at close.
    emit_on_close: bool,
    /// The handle is read-write and a write actually happened.
    wrote: bool,
    phase: ReadPhase,
}

impl<S: Stream> BitPad<S> {
    /// Open a padding adapter with the given block size (0 acts as 1).
    pub fn open(inner: S, block_size: usize, mode_str: &str) -> Result<Device<Self>> {
        let mode = parse_mode(mode_str)?;
        Ok(Device::with_mode(
            BitPad {
                inner,
                block_size: (block_size.max(1)) as u64,
                count: 0,
                // Write-only handles always owe padding; a read-write
                // handle owes it only once a write happens.
                emit_on_close: mode.writable && !mode.readable,
                wrote: false,
                phase: ReadPhase::Source,
            },
            mode,
        ))
    }

    /// Zeros that follow the `0x80` marker for the current count.
    fn trailing_zeros(&self) -> u64 {
        let used = (self.count + 1) % self.block_size;
        if used == 0 {
            0
        } else {
            self.block_size - used
        }
    }
}

impl<S: Stream> Backend for BitPad<S> {
    fn kind(&self) -> &'static str {
        "bitpad"
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.phase {
                ReadPhase::Source => {
                    let k = self.inner.read(&mut buf[n..])?;
                    if k == 0 {
                        self.phase = ReadPhase::Marker;
                        continue;
                    }
                    self.count += k as u64;
                    n += k;
                }
                ReadPhase::Marker => {
                    buf[n] = 0x80;
                    n += 1;
                    self.phase = ReadPhase::Zeros(self.trailing_zeros());
                }
                ReadPhase::Zeros(0) => {
                    self.phase = ReadPhase::Done;
                }
                ReadPhase::Zeros(remaining) => {
                    let take = (buf.len() - n).min(remaining as usize);
                    buf[n..n + take].fill(0);
                    n += take;
                    self.phase = ReadPhase::Zeros(remaining - take as u64);
                }
                ReadPhase::Done => break,
            }
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.inner.write_all(buf)?;
        self.count += buf.len() as u64;
        self.wrote = true;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn switch(&mut self, to: Direction) -> Result<()> {
        // The byte count is per-direction; a switch restarts it.
        if to == Direction::Reading {
            self.phase = ReadPhase::Source;
        }
        self.count = 0;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.emit_on_close && !self.wrote {
            return Ok(());
        }
        self.inner.write_all(&[0x80])?;
        let zeros = self.trailing_zeros();
        let chunk = [0u8; 64];
        let mut left = zeros;
        while left > 0 {
            let take = (chunk.len() as u64).min(left) as usize;
            self.inner.write_all(&chunk[..take])?;
            left -= take as u64;
        }
        self.inner.flush()
    }

    fn clear_err(&mut self) {
        self.inner.clear_err();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
