//! MD5 hashing device.
//!
//! Streaming RFC 1321 MD5 behind the device interface, usable two ways:
//!
//! 1. **Push sink** — the caller writes payload bytes in. On close, a
//!    write-only device finalizes and writes the 16-byte digest to the
//!    underlying device. A read-write device instead keeps the digest
//!    available through `read`.
//! 2. **Pull source** — the caller reads. If nothing was written first,
//!    the device drains the underlying device into the hash, finalizes,
//!    and serves the digest. After finalization the device is seekable
//!    within the digest (0..16) but will not hash further input.
//!
//! The four state words are serialized little-endian.

use crate::bytes::{load_u32_le, store_u32_le, store_u64_le};
use crate::device::{parse_mode, Backend, Device, Stream, Whence};
use crate::errno::{Errno, Result};

const INIT: [u32; 4] = [0x6745_2301, 0xefcd_ab89, 0x98ba_dcfe, 0x1032_5476];

/// Per-step rotate amounts.
const S: [u32; 64] = [
    7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, //
    5, 9, 14, 20, 5, 9, 14, 20, 5, 9, 14, 20, 5, 9, 14, 20, //
    4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23, //
    6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21,
];

/// Sine-derived additive constants.
const K: [u32; 64] = [
    0xd76a_a478, 0xe8c7_b756, 0x2420_70db, 0xc1bd_ceee, 0xf57c_0faf, 0x4787_c62a, 0xa830_4613,
    0xfd46_9501, 0x6980_98d8, 0x8b44_f7af, 0xffff_5bb1, 0x895c_d7be, 0x6b90_1122, 0xfd98_7193,
    0xa679_438e, 0x49b4_0821, 0xf61e_2562, 0xc040_b340, 0x265e_5a51, 0xe9b6_c7aa, 0xd62f_105d,
    0x0244_1453, 0xd8a1_e681, 0xe7d3_fbc8, 0x21e1_cde6, 0xc337_07d6, 0xf4d5_0d87, 0x455a_14ed,
    0xa9e3_e905, 0xfcef_a3f8, 0x676f_02d9, 0x8d2a_4c8a, 0xfffa_3942, 0x8771_f681, 0x6d9d_6122,
    0xfde5_380c, 0xa4be_ea44, 0x4bde_cfa9, 0xf6bb_4b60, 0xbebf_bc70, 0x289b_7ec6, 0xeaa1_27fa,
    0xd4ef_3085, 0x0488_1d05, 0xd9d4_d039, 0xe6db_99e5, 0x1fa2_7cf8, 0xc4ac_5665, 0xf429_2244,
    0x432a_ff97, 0xab94_23a7, 0xfc93_a039, 0x655b_59c3, 0x8f0c_cc92, 0xffef_f47d, 0x8584_5dd1,
    0x6fa8_7e4f, 0xfe2c_e6e0, 0xa301_4314, 0x4e08_11a1, 0xf753_7e82, 0xbd3a_f235, 0x2ad7_d2bb,
    0xeb86_d391,
];

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

/// Raw streaming MD5 state.
#[derive(Debug, Clone)]
pub struct Md5State {
    h: [u32; 4],
    buf: [u8; 64],
    fill: usize,
    length_bits: u64,
}

impl Default for Md5State {
    fn default() -> Self {
        Md5State {
            h: INIT,
            buf: [0; 64],
            fill: 0,
            length_bits: 0,
        }
    }
}

impl Md5State {
    /// Absorb payload bytes.
    pub fn update(&mut self, mut data: &[u8]) {
        self.length_bits = self.length_bits.wrapping_add((data.len() as u64) * 8);
        if self.fill > 0 {
            let take = data.len().min(64 - self.fill);
            self.buf[self.fill..self.fill + take].copy_from_slice(&data[..take]);
            self.fill += take;
            data = &data[take..];
            if self.fill == 64 {
                let block = self.buf;
                self.compress(&block);
                self.fill = 0;
            }
        }
        while data.len() >= 64 {
            let mut block = [0u8; 64];
            block.copy_from_slice(&data[..64]);
            self.compress(&block);
            data = &data[64..];
        }
        if !data.is_empty() {
            self.buf[..data.len()].copy_from_slice(data);
            self.fill = data.len();
        }
    }

    /// Finalize (consuming a copy of the rolling state) into the
    /// 16-byte little-endian digest.
    pub fn digest(&self) -> [u8; 16] {
        let mut state = self.clone();
        state.update_padding();
        let mut out = [0u8; 16];
        for (i, word) in state.h.iter().enumerate() {
            store_u32_le(&mut out[i * 4..], *word);
        }
        out
    }

    fn update_padding(&mut self) {
        let length_bits = self.length_bits;
        let mut trailer = [0u8; 72];
        trailer[0] = 0x80;
        // Pad to 56 mod 64, then the 64-bit little-endian bit length.
        let pad_len = (56usize.wrapping_sub(self.fill + 1)) % 64;
        store_u64_le(&mut trailer[1 + pad_len..], length_bits);
        let total = 1 + pad_len + 8;
        // update() also advances length_bits, but the stored value above
        // is the payload length; the extra advance is never read again.
        self.update(&trailer[..total]);
    }

    fn compress(&mut self, block: &[u8; 64]) {
        let mut m = [0u32; 16];
        for (i, word) in m.iter_mut().enumerate() {
            *word = load_u32_le(&block[i * 4..]);
        }

        let [mut a, mut b, mut c, mut d] = self.h;
        for i in 0..64 {
            let (f, g) = match i / 16 {
                0 => ((b & c) | (!b & d), i),
                1 => ((d & b) | (!d & c), (5 * i + 1) % 16),
                2 => (b ^ c ^ d, (3 * i + 5) % 16),
                _ => (c ^ (b | !d), (7 * i) % 16),
            };
            let tmp = d;
            d = c;
            c = b;
            b = b.wrapping_add(
                a.wrapping_add(f)
                    .wrapping_add(K[i])
                    .wrapping_add(m[g])
                    .rotate_left(S[i]),
            );
            a = tmp;
        }

        self.h[0] = self.h[0].wrapping_add(a);
        self.h[1] = self.h[1].wrapping_add(b);
        self.h[2] = self.h[2].wrapping_add(c);
        self.h[3] = self.h[3].wrapping_add(d);
    }
}

/// One-shot digest of a byte slice.
pub fn md5(data: &[u8]) -> [u8; 16] {
    let mut state = Md5State::default();
    state.update(data);
    state.digest()
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// MD5 device backend.
#[derive(Debug)]
pub struct Md5<S: Stream> {
    inner: S,
    state: Md5State,
    wrote: bool,
    /// Set once finalized; the device then only serves these bytes.
    digest: Option<[u8; 16]>,
    digest_pos: usize,
    emit_on_close: bool,
}

impl<S: Stream> Md5<S> {
    /// Open an MD5 device over `inner`.
    ///
    /// `"w"` makes a push sink that writes its digest to `inner` on
    /// close; `"w+"` keeps the digest readable instead; `"r"` makes a
    /// pull source hashing `inner`'s remaining bytes.
    pub fn open(inner: S, mode_str: &str) -> Result<Device<Self>> {
        let mode = parse_mode(mode_str)?;
        Ok(Device::with_mode(
            Md5 {
                inner,
                state: Md5State::default(),
                wrote: false,
                digest: None,
                digest_pos: 0,
                emit_on_close: mode.writable && !mode.readable,
            },
            mode,
        ))
    }

    fn finalize(&mut self) -> [u8; 16] {
        match self.digest {
            Some(d) => d,
            None => {
                let d = self.state.digest();
                self.digest = Some(d);
                d
            }
        }
    }
}

impl<S: Stream> Backend for Md5<S> {
    fn kind(&self) -> &'static str {
        "md5"
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.digest.is_some() {
            // Finalized: the hash cannot be reopened.
            return Err(Errno::InvalidArgument);
        }
        self.state.update(buf);
        self.wrote = true;
        Ok(buf.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.digest.is_none() {
            if !self.wrote {
                // Pull source: hash the underlying device to EOF.
                let mut chunk = [0u8; 4096];
                loop {
                    let k = self.inner.read(&mut chunk)?;
                    if k == 0 {
                        break;
                    }
                    self.state.update(&chunk[..k]);
                }
            }
            self.finalize();
        }
        let digest = self.finalize();
        let n = buf.len().min(16 - self.digest_pos);
        buf[..n].copy_from_slice(&digest[self.digest_pos..self.digest_pos + n]);
        self.digest_pos += n;
        Ok(n)
    }

    fn seek(&mut self, off: i64, whence: Whence) -> Result<u64> {
        if self.digest.is_none() {
            return Err(Errno::NotSeekable);
        }
        let base = match whence {
            Whence::Start => 0i64,
            Whence::Current => self.digest_pos as i64,
            Whence::End => 16,
        };
        let target = base.checked_add(off).ok_or(Errno::InvalidArgument)?;
        if !(0..=16).contains(&target) {
            return Err(Errno::InvalidArgument);
        }
        self.digest_pos = target as usize;
        Ok(self.digest_pos as u64)
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(match self.digest {
            Some(_) => self.digest_pos as u64,
            None => self.state.length_bits / 8,
        })
    }

    fn close(&mut self) -> Result<()> {
        if !self.emit_on_close {
            return Ok(());
        }
        let digest = self.finalize();
        self.inner.write_all(&digest)?;
        self.inner.flush()
    }

    fn clear_err(&mut self) {
        self.inner.clear_err();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::memory::Memory;

    fn hex_digest(d: &[u8]) -> String {
        d.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn test_rfc1321_vectors() {
        // RFC 1321 appendix A.5.
        let cases: &[(&[u8], &str)] = &[
            (b"", "d41d8cd98f00b204e9800998ecf8427e"),
            (b"a", "0cc175b9c0f1b6a831c399e269772661"),
            (b"abc", "900150983cd24fb0d6963f7d28e17f72"),
            (b"message digest", "f96b697d7cb7938d525a2f31aaf161d0"),
            (
                b"abcdefghijklmnopqrstuvwxyz",
                "c3fcd3d76192e4007dfb496cca67e13b",
            ),
            (
                b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789",
                "d174ab98d277d9f5a5611c2c9f419d9f",
            ),
            (
                b"12345678901234567890123456789012345678901234567890123456789012345678901234567890",
                "57edf4a22be3c955ac49da2e2107b67a",
            ),
        ];
        for (input, expected) in cases {
            assert_eq!(hex_digest(&md5(input)), *expected);
        }
    }

    #[test]
    fn test_quick_brown_fox() {
        assert_eq!(
            hex_digest(&md5(b"The quick brown fox jumps over the lazy dog")),
            "9e107d9d372bb6826bd81d3542a419d6"
        );
    }

    #[test]
    fn test_incremental_matches_oneshot() {
        let mut state = Md5State::default();
        state.update(b"The quick brown fox ");
        state.update(b"jumps over ");
        state.update(b"the lazy dog");
        assert_eq!(
            hex_digest(&state.digest()),
            "9e107d9d372bb6826bd81d3542a419d6"
        );
    }

    #[test]
    fn test_boundary_lengths() {
        // Lengths straddling the 55/56/64 padding boundaries.
        for len in [55usize, 56, 63, 64, 65, 119, 120, 128] {
            let data = vec![b'x'; len];
            let mut state = Md5State::default();
            for chunk in data.chunks(7) {
                state.update(chunk);
            }
            assert_eq!(state.digest(), md5(&data));
        }
    }

    #[test]
    fn test_sink_writes_digest_on_close() {
        let mut sink = Memory::open("w+").unwrap();
        let mut dev = Md5::open(&mut sink, "w").unwrap();
        dev.write_all(b"abc").unwrap();
        dev.close().unwrap();
        assert_eq!(
            hex_digest(sink.backend().contents()),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_readable_sink_serves_digest_instead() {
        let mut sink = Memory::open("w+").unwrap();
        {
            let mut dev = Md5::open(&mut sink, "w+").unwrap();
            dev.write_all(b"abc").unwrap();
            let mut digest = [0u8; 16];
            assert_eq!(dev.read(&mut digest).unwrap(), 16);
            assert_eq!(hex_digest(&digest), "900150983cd24fb0d6963f7d28e17f72");
            dev.close().unwrap();
        }
        // Digest is not auto-emitted when the device is readable.
        assert!(sink.backend().contents().is_empty());
    }

    #[test]
    fn test_pull_source_hashes_underlying() {
        let mut src = Memory::with_contents(
            b"The quick brown fox jumps over the lazy dog".to_vec(),
            "r",
        )
        .unwrap();
        let mut dev = Md5::open(&mut src, "r").unwrap();
        let mut digest = [0u8; 16];
        assert_eq!(dev.read(&mut digest).unwrap(), 16);
        assert_eq!(hex_digest(&digest), "9e107d9d372bb6826bd81d3542a419d6");
        assert_eq!(dev.read(&mut digest).unwrap(), 0);
    }

    #[test]
    fn test_digest_seek_window() {
        let mut src = Memory::with_contents(b"abc".to_vec(), "r").unwrap();
        let mut dev = Md5::open(&mut src, "r").unwrap();
        let mut digest = [0u8; 16];
        dev.read(&mut digest).unwrap();
        dev.seek(4, Whence::Start).unwrap();
        let mut tail = [0u8; 16];
        assert_eq!(dev.read(&mut tail).unwrap(), 12);
        assert_eq!(&tail[..12], &digest[4..]);
        assert_eq!(dev.seek(17, Whence::Start), Err(Errno::InvalidArgument));
    }

    #[test]
    fn test_no_rehash_after_finalize() {
        let mut src = Memory::with_contents(b"abc".to_vec(), "r").unwrap();
        let mut dev = Md5::open(&mut src, "r+").unwrap();
        let mut digest = [0u8; 16];
        dev.read(&mut digest).unwrap();
        assert_eq!(dev.write(b"more"), Err(Errno::InvalidArgument));
    }
}
