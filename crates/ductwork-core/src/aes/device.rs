//! AES streaming device.
//!
//! Buffers writes into a 16-byte block and emits one transformed block
//! at a time to the underlying device; reads pull a full block from the
//! underlying device, transform it, and hand it out in requested
//! chunks. The device never pads — compose a
//! [`BitPad`](crate::filter::BitPad) upstream when the payload length
//! is not a block multiple.
//!
//! The per-block transform is selected once at construction from the
//! chaining mode, the direction, and hardware support; a `<` mode token
//! forces the software path. CFB and OFB run the encrypt primitive in
//! both directions.

use super::block::{self, AesKey, MAX_KEY_SCHEDULE};
#[cfg(target_arch = "x86_64")]
use super::ni;
use crate::bytes::xor_bytes;
use crate::device::{parse_mode, Backend, Device, Direction, Stream, Whence};
use crate::errno::{Errno, Result};

/// Block chaining mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainMode {
    Ecb,
    Cbc,
    Pcbc,
    Cfb,
    Ofb,
}

impl ChainMode {
    /// Modes whose decrypt path runs the block decryption primitive
    /// (CFB/OFB reuse encryption for both directions).
    fn uses_inverse_cipher(self) -> bool {
        matches!(self, ChainMode::Ecb | ChainMode::Cbc | ChainMode::Pcbc)
    }
}

/// AES codec backend.
#[derive(Debug)]
pub struct Aes<S: Stream> {
    inner: S,
    key: AesKey,
    /// Equivalent-inverse schedule for the hardware decrypt path.
    inv_keys: Option<Box<[u8; MAX_KEY_SCHEDULE]>>,
    iv: [u8; 16],
    previous: [u8; 16],
    state: [u8; 16],
    /// Buffered byte count (writing) or served byte count (reading).
    pos: usize,
    /// Error met after bytes were already produced in the same call;
    /// surfaced on the next read.
    pending: Option<Errno>,
    chain: ChainMode,
    decryptor: bool,
    accel: bool,
    readable: bool,
    writable: bool,
    /// Last dispatched direction, for position accounting.
    reading: bool,
}

impl<S: Stream> Aes<S> {
    /// Open an encrypting device over `inner`.
    pub fn encryptor(
        inner: S,
        mode_str: &str,
        chain: ChainMode,
        key: &[u8],
        iv: &[u8; 16],
    ) -> Result<Device<Self>> {
        Self::open(inner, mode_str, chain, key, iv, false)
    }

    /// Open a decrypting device over `inner`.
    pub fn decryptor(
        inner: S,
        mode_str: &str,
        chain: ChainMode,
        key: &[u8],
        iv: &[u8; 16],
    ) -> Result<Device<Self>> {
        Self::open(inner, mode_str, chain, key, iv, true)
    }

    fn open(
        inner: S,
        mode_str: &str,
        chain: ChainMode,
        key: &[u8],
        iv: &[u8; 16],
        decryptor: bool,
    ) -> Result<Device<Self>> {
        let mode = parse_mode(mode_str)?;
        let key = AesKey::expand(key).ok_or(Errno::InvalidArgument)?;

        #[cfg(target_arch = "x86_64")]
        let accel = !mode.no_accel && ni::available();
        #[cfg(not(target_arch = "x86_64"))]
        let accel = false;

        #[cfg(target_arch = "x86_64")]
        let inv_keys = (accel && decryptor && chain.uses_inverse_cipher())
            .then(|| Box::new(ni::inverse_schedule(&key)));
        #[cfg(not(target_arch = "x86_64"))]
        let inv_keys = None;

        Ok(Device::with_mode(
            Aes {
                inner,
                key,
                inv_keys,
                iv: *iv,
                previous: *iv,
                state: [0; 16],
                pos: 0,
                pending: None,
                chain,
                decryptor,
                accel,
                readable: mode.readable,
                writable: mode.writable,
                reading: false,
            },
            mode,
        ))
    }

    fn raw_encrypt(&self, blk: &mut [u8; 16]) {
        #[cfg(target_arch = "x86_64")]
        if self.accel {
            ni::encrypt_block(&self.key, blk);
            return;
        }
        block::encrypt_block(&self.key, blk);
    }

    fn raw_decrypt(&self, blk: &mut [u8; 16]) {
        #[cfg(target_arch = "x86_64")]
        if let Some(inv) = &self.inv_keys {
            ni::decrypt_block(inv, self.key.rounds, blk);
            return;
        }
        block::decrypt_block(&self.key, blk);
    }

    /// Apply the configured mode transform to one block in place,
    /// advancing the chaining state.
    fn crypt_block(&mut self, blk: &mut [u8; 16]) {
        match (self.chain, self.decryptor) {
            (ChainMode::Ecb, false) => self.raw_encrypt(blk),
            (ChainMode::Ecb, true) => self.raw_decrypt(blk),
            (ChainMode::Cbc, false) => {
                xor_bytes(blk, &self.previous);
                self.raw_encrypt(blk);
                self.previous = *blk;
            }
            (ChainMode::Cbc, true) => {
                let cipher_in = *blk;
                self.raw_decrypt(blk);
                xor_bytes(blk, &self.previous);
                self.previous = cipher_in;
            }
            (ChainMode::Pcbc, false) => {
                let plain = *blk;
                xor_bytes(blk, &self.previous);
                self.raw_encrypt(blk);
                self.previous = plain;
                xor_bytes(&mut self.previous, blk);
            }
            (ChainMode::Pcbc, true) => {
                let cipher_in = *blk;
                self.raw_decrypt(blk);
                xor_bytes(blk, &self.previous);
                self.previous = *blk;
                xor_bytes(&mut self.previous, &cipher_in);
            }
            (ChainMode::Cfb, false) => {
                let mut keystream = self.previous;
                self.raw_encrypt(&mut keystream);
                xor_bytes(blk, &keystream);
                self.previous = *blk;
            }
            (ChainMode::Cfb, true) => {
                let cipher_in = *blk;
                let mut keystream = self.previous;
                self.raw_encrypt(&mut keystream);
                xor_bytes(blk, &keystream);
                self.previous = cipher_in;
            }
            (ChainMode::Ofb, _) => {
                let mut keystream = self.previous;
                self.raw_encrypt(&mut keystream);
                self.previous = keystream;
                xor_bytes(blk, &keystream);
            }
        }
    }

    /// Pull one full block from the underlying device into `state` and
    /// transform it. `Ok(false)` at a clean EOF; a trailing partial
    /// block is malformed input.
    fn fetch_block(&mut self) -> Result<bool> {
        let mut got = 0;
        while got < 16 {
            let k = self.inner.read(&mut self.state[got..])?;
            if k == 0 {
                break;
            }
            got += k;
        }
        match got {
            0 => Ok(false),
            16 => {
                let mut blk = self.state;
                self.crypt_block(&mut blk);
                self.state = blk;
                Ok(true)
            }
            _ => Err(Errno::BadMessage),
        }
    }

    fn logical_pos(&mut self) -> Result<u64> {
        let inner_pos = self.inner.tell()?;
        Ok(if self.reading {
            if self.pos > 0 {
                inner_pos.saturating_sub(16 - self.pos as u64)
            } else {
                inner_pos
            }
        } else {
            inner_pos + self.pos as u64
        })
    }
}

impl<S: Stream> Backend for Aes<S> {
    fn kind(&self) -> &'static str {
        "aes"
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reading = true;
        if let Some(e) = self.pending.take() {
            return Err(e);
        }
        let mut n = 0;
        while n < buf.len() {
            if self.pos == 0 {
                match self.fetch_block() {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) if n > 0 => {
                        self.pending = Some(e);
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
            let take = (16 - self.pos).min(buf.len() - n);
            buf[n..n + take].copy_from_slice(&self.state[self.pos..self.pos + take]);
            self.pos += take;
            n += take;
            if self.pos == 16 {
                self.pos = 0;
            }
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.reading = false;
        let mut consumed = 0;
        while consumed < buf.len() {
            let take = (16 - self.pos).min(buf.len() - consumed);
            self.state[self.pos..self.pos + take].copy_from_slice(&buf[consumed..consumed + take]);
            self.pos += take;
            consumed += take;
            if self.pos == 16 {
                let mut blk = self.state;
                self.crypt_block(&mut blk);
                self.inner.write_all(&blk)?;
                self.pos = 0;
            }
        }
        Ok(consumed)
    }

    fn flush(&mut self) -> Result<()> {
        // A partial block stays buffered; only complete output moves on.
        self.inner.flush()
    }

    fn switch(&mut self, _to: Direction) -> Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn seek(&mut self, off: i64, whence: Whence) -> Result<u64> {
        let target = match whence {
            Whence::Start => off,
            Whence::Current => self.logical_pos()? as i64 + off,
            Whence::End => self.inner.size()? as i64 + off,
        };
        if target < 0 {
            return Err(Errno::InvalidArgument);
        }
        let target = target as u64;
        let aligned = target % 16 == 0;

        match self.chain {
            ChainMode::Ofb | ChainMode::Pcbc => {
                if target != 0 {
                    return Err(Errno::NotSupported);
                }
            }
            _ if self.writable => {
                if !aligned {
                    return Err(Errno::InvalidArgument);
                }
                let allowed = if self.readable {
                    matches!(self.chain, ChainMode::Ecb | ChainMode::Cbc | ChainMode::Cfb)
                } else {
                    // CBC/CFB need the preceding ciphertext block, which
                    // a write-only device cannot read back.
                    matches!(self.chain, ChainMode::Ecb)
                };
                if !allowed {
                    return Err(Errno::NotSupported);
                }
            }
            _ => {} // read-only ECB/CBC/CFB: any byte position
        }

        if !self.reading && self.pos != 0 {
            // A buffered partial block has nowhere to go.
            return Err(Errno::InvalidArgument);
        }

        let block_addr = target & !15;
        let sub = (target % 16) as usize;

        if block_addr == 0 {
            self.previous = self.iv;
            self.inner.seek(0, Whence::Start)?;
        } else if self.chain == ChainMode::Ecb {
            self.inner.seek(block_addr as i64, Whence::Start)?;
        } else {
            // Re-seed the chain from the preceding block.
            self.inner.seek(block_addr as i64 - 16, Whence::Start)?;
            let mut seed = [0u8; 16];
            let mut got = 0;
            while got < 16 {
                let k = self.inner.read(&mut seed[got..])?;
                if k == 0 {
                    return Err(Errno::BadMessage);
                }
                got += k;
            }
            self.previous = seed;
        }

        self.pos = 0;
        if sub != 0 {
            // Byte granularity: transform the block and discard the head.
            self.reading = true;
            if !self.fetch_block()? {
                return Err(Errno::InvalidArgument);
            }
            self.pos = sub;
        }
        Ok(target)
    }

    fn tell(&mut self) -> Result<u64> {
        self.logical_pos()
    }

    fn close(&mut self) -> Result<()> {
        if !self.reading && self.pos != 0 {
            // The device never pads; a trailing partial block is a
            // caller error (compose a padding filter upstream).
            return Err(Errno::InvalidArgument);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::memory::Memory;

    const KEY: &str = "2b7e151628aed2a6abf7158809cf4f3c";
    const IV: &str = "000102030405060708090a0b0c0d0e0f";
    // SP 800-38A appendix F plaintext blocks 1 and 2.
    const PLAIN: &str = "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51";

    fn unhex(s: &str) -> Vec<u8> {
        hex::decode(s).unwrap()
    }

    fn iv_bytes() -> [u8; 16] {
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&unhex(IV));
        iv
    }

    fn encrypt_via_write(chain: ChainMode, mode_str: &str, plain: &[u8]) -> Vec<u8> {
        let mut sink = Memory::open("w+").unwrap();
        let mut enc =
            Aes::encryptor(&mut sink, mode_str, chain, &unhex(KEY), &iv_bytes()).unwrap();
        enc.write_all(plain).unwrap();
        enc.close().unwrap();
        sink.backend().contents().to_vec()
    }

    fn decrypt_via_read(chain: ChainMode, mode_str: &str, cipher: &[u8]) -> Vec<u8> {
        let mut src = Memory::with_contents(cipher.to_vec(), "r").unwrap();
        let mut dec =
            Aes::decryptor(&mut src, mode_str, chain, &unhex(KEY), &iv_bytes()).unwrap();
        let mut out = vec![0u8; cipher.len()];
        let n = dec.read(&mut out).unwrap();
        out.truncate(n);
        out
    }

    #[test]
    fn test_ecb_vectors() {
        let cipher = encrypt_via_write(ChainMode::Ecb, "w", &unhex(PLAIN));
        assert_eq!(
            cipher,
            unhex("3ad77bb40d7a3660a89ecaf32466ef97f5d3d58503b9699de785895a96fdbaaf")
        );
        assert_eq!(
            decrypt_via_read(ChainMode::Ecb, "r", &cipher),
            unhex(PLAIN)
        );
    }

    #[test]
    fn test_cbc_vectors() {
        let cipher = encrypt_via_write(ChainMode::Cbc, "w", &unhex(PLAIN));
        assert_eq!(
            cipher,
            unhex("7649abac8119b246cee98e9b12e9197d5086cb9b507219ee95db113a917678b2")
        );
        assert_eq!(
            decrypt_via_read(ChainMode::Cbc, "r", &cipher),
            unhex(PLAIN)
        );
    }

    #[test]
    fn test_cfb_vectors() {
        let cipher = encrypt_via_write(ChainMode::Cfb, "w", &unhex(PLAIN));
        assert_eq!(
            cipher,
            unhex("3b3fd92eb72dad20333449f8e83cfb4ac8a64537a0b3a93fcde3cdad9f1ce58b")
        );
        assert_eq!(
            decrypt_via_read(ChainMode::Cfb, "r", &cipher),
            unhex(PLAIN)
        );
    }

    #[test]
    fn test_ofb_vectors() {
        let cipher = encrypt_via_write(ChainMode::Ofb, "w", &unhex(PLAIN));
        assert_eq!(
            cipher,
            unhex("3b3fd92eb72dad20333449f8e83cfb4a7789508d16918f03f53c52dac54ed825")
        );
        assert_eq!(
            decrypt_via_read(ChainMode::Ofb, "r", &cipher),
            unhex(PLAIN)
        );
    }

    #[test]
    fn test_all_modes_roundtrip() {
        let plain: Vec<u8> = (0u8..96).collect();
        for chain in [
            ChainMode::Ecb,
            ChainMode::Cbc,
            ChainMode::Pcbc,
            ChainMode::Cfb,
            ChainMode::Ofb,
        ] {
            let cipher = encrypt_via_write(chain, "w", &plain);
            assert_eq!(cipher.len(), plain.len());
            assert_ne!(cipher, plain);
            assert_eq!(decrypt_via_read(chain, "r", &cipher), plain, "{chain:?}");
        }
    }

    #[test]
    fn test_software_path_matches_accelerated() {
        // `<` disables acceleration; outputs must be identical.
        let plain: Vec<u8> = (0u8..64).collect();
        for chain in [ChainMode::Ecb, ChainMode::Cbc, ChainMode::Cfb] {
            let fast = encrypt_via_write(chain, "w", &plain);
            let soft = encrypt_via_write(chain, "w<", &plain);
            assert_eq!(fast, soft);
            assert_eq!(decrypt_via_read(chain, "r<", &soft), plain);
        }
    }

    #[test]
    fn test_dribble_writes_match_bulk() {
        let plain = unhex(PLAIN);
        let bulk = encrypt_via_write(ChainMode::Cbc, "w", &plain);

        let mut sink = Memory::open("w+").unwrap();
        let mut enc =
            Aes::encryptor(&mut sink, "w", ChainMode::Cbc, &unhex(KEY), &iv_bytes()).unwrap();
        for chunk in plain.chunks(5) {
            enc.write_all(chunk).unwrap();
        }
        enc.close().unwrap();
        assert_eq!(sink.backend().contents(), &bulk[..]);
    }

    #[test]
    fn test_reads_in_small_chunks() {
        let plain = unhex(PLAIN);
        let cipher = encrypt_via_write(ChainMode::Cbc, "w", &plain);
        let mut src = Memory::with_contents(cipher, "r").unwrap();
        let mut dec =
            Aes::decryptor(&mut src, "r", ChainMode::Cbc, &unhex(KEY), &iv_bytes()).unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = dec.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, plain);
    }

    #[test]
    fn test_partial_close_rejected() {
        let mut sink = Memory::open("w+").unwrap();
        let mut enc =
            Aes::encryptor(&mut sink, "w", ChainMode::Ecb, &unhex(KEY), &iv_bytes()).unwrap();
        enc.write_all(b"short").unwrap();
        assert_eq!(enc.close(), Err(Errno::InvalidArgument));
    }

    #[test]
    fn test_trailing_partial_block_is_bad_message() {
        let mut src = Memory::with_contents(vec![0u8; 20], "r").unwrap();
        let mut dec =
            Aes::decryptor(&mut src, "r", ChainMode::Ecb, &unhex(KEY), &iv_bytes()).unwrap();
        let mut out = [0u8; 32];
        // The first block decrypts; the 4 trailing bytes are malformed.
        let n = dec.read(&mut out).unwrap();
        assert_eq!(n, 16);
        assert_eq!(dec.last_error(), Some(Errno::BadMessage));
    }

    #[test]
    fn test_seek_reseeds_cbc_chain() {
        let plain = unhex(PLAIN);
        let cipher = encrypt_via_write(ChainMode::Cbc, "w", &plain);
        let mut src = Memory::with_contents(cipher, "r").unwrap();
        let mut dec =
            Aes::decryptor(&mut src, "r", ChainMode::Cbc, &unhex(KEY), &iv_bytes()).unwrap();

        // Jump straight to the second block.
        dec.seek(16, Whence::Start).unwrap();
        let mut out = [0u8; 16];
        assert_eq!(dec.read(&mut out).unwrap(), 16);
        assert_eq!(&out[..], &plain[16..32]);

        // Back to the start: the IV is restored.
        dec.seek(0, Whence::Start).unwrap();
        assert_eq!(dec.read(&mut out).unwrap(), 16);
        assert_eq!(&out[..], &plain[..16]);
    }

    #[test]
    fn test_unaligned_seek_read_only() {
        let plain = unhex(PLAIN);
        let cipher = encrypt_via_write(ChainMode::Cbc, "w", &plain);
        let mut src = Memory::with_contents(cipher, "r").unwrap();
        let mut dec =
            Aes::decryptor(&mut src, "r", ChainMode::Cbc, &unhex(KEY), &iv_bytes()).unwrap();
        assert_eq!(dec.seek(20, Whence::Start).unwrap(), 20);
        let mut out = [0u8; 12];
        assert_eq!(dec.read(&mut out).unwrap(), 12);
        assert_eq!(&out[..], &plain[20..32]);
        assert_eq!(dec.tell().unwrap(), 32);
    }

    #[test]
    fn test_seek_rules_by_mode_and_direction() {
        let cipher = encrypt_via_write(ChainMode::Ofb, "w", &unhex(PLAIN));

        // OFB: only position 0.
        let mut src = Memory::with_contents(cipher, "r").unwrap();
        let mut dec =
            Aes::decryptor(&mut src, "r", ChainMode::Ofb, &unhex(KEY), &iv_bytes()).unwrap();
        assert_eq!(dec.seek(16, Whence::Start), Err(Errno::NotSupported));
        assert_eq!(dec.seek(0, Whence::Start).unwrap(), 0);

        // Write-only CBC: no seeking away from 0 at all.
        let mut sink = Memory::open("w+").unwrap();
        let mut enc =
            Aes::encryptor(&mut sink, "w", ChainMode::Cbc, &unhex(KEY), &iv_bytes()).unwrap();
        assert_eq!(enc.seek(16, Whence::Start), Err(Errno::NotSupported));

        // Write-only ECB: aligned positions are fine, unaligned are not.
        let mut sink = Memory::open("w+").unwrap();
        let mut enc =
            Aes::encryptor(&mut sink, "w", ChainMode::Ecb, &unhex(KEY), &iv_bytes()).unwrap();
        assert_eq!(enc.seek(32, Whence::Start).unwrap(), 32);
        assert_eq!(enc.seek(8, Whence::Start), Err(Errno::InvalidArgument));
    }

    #[test]
    fn test_aes256_cbc_vector() {
        let key = unhex("603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4");
        let plain = unhex(PLAIN);
        let mut sink = Memory::open("w+").unwrap();
        let mut enc =
            Aes::encryptor(&mut sink, "w", ChainMode::Cbc, &key, &iv_bytes()).unwrap();
        enc.write_all(&plain).unwrap();
        enc.close().unwrap();
        let cipher = sink.backend().contents().to_vec();
        // SP 800-38A F.2.5 block 1.
        assert_eq!(
            &cipher[..16],
            &unhex("f58c4c04d6e5f1ba779eabfb5f7bfbd6")[..]
        );
        let mut src = Memory::with_contents(cipher, "r").unwrap();
        let mut dec = Aes::decryptor(&mut src, "r", ChainMode::Cbc, &key, &iv_bytes()).unwrap();
        let mut out = vec![0u8; 32];
        assert_eq!(dec.read(&mut out).unwrap(), 32);
        assert_eq!(out, plain);
    }
}
