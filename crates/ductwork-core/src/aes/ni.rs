//! AES-NI accelerated block functions (x86_64).
//!
//! The key schedule stays in software; only the per-block transform is
//! replaced. Decryption uses the equivalent inverse cipher: round keys
//! 1..rounds-1 pass through `aesimc` once at construction, then the
//! rounds run `aesdec`/`aesdeclast` over the reversed schedule. CFB and
//! OFB never call these decrypt functions — they run the encrypt
//! primitive in both directions, so their keys are left untouched.
//!
//! Safety: every intrinsic call is gated behind a runtime
//! `is_x86_feature_detected!("aes")` check made before a function
//! pointer to this module is ever selected.

#![allow(unsafe_code)]

use core::arch::x86_64::{
    __m128i, _mm_aesdec_si128, _mm_aesdeclast_si128, _mm_aesenc_si128, _mm_aesenclast_si128,
    _mm_aesimc_si128, _mm_loadu_si128, _mm_storeu_si128, _mm_xor_si128,
};

use super::block::{AesKey, MAX_KEY_SCHEDULE};

/// Runtime support check. The detection result is cached process-wide
/// by the standard library.
pub fn available() -> bool {
    std::arch::is_x86_feature_detected!("aes")
}

/// Build the equivalent-inverse-cipher schedule for `aesdec`.
///
/// `out[0] = rk[rounds]`, `out[i] = aesimc(rk[rounds-i])` for the middle
/// rounds, `out[rounds] = rk[0]`.
pub fn inverse_schedule(key: &AesKey) -> [u8; MAX_KEY_SCHEDULE] {
    debug_assert!(available());
    let mut out = [0u8; MAX_KEY_SCHEDULE];
    out[..16].copy_from_slice(key.round_key(key.rounds));
    for i in 1..key.rounds {
        // SAFETY: caller selected this module only after `available()`.
        unsafe {
            let rk = load(key.round_key(key.rounds - i));
            let imc = _mm_aesimc_si128(rk);
            store(&mut out[i * 16..i * 16 + 16], imc);
        }
    }
    out[key.rounds * 16..key.rounds * 16 + 16].copy_from_slice(key.round_key(0));
    out
}

/// Encrypt one block with `aesenc`.
pub fn encrypt_block(key: &AesKey, state: &mut [u8; 16]) {
    debug_assert!(available());
    // SAFETY: caller selected this module only after `available()`.
    unsafe { encrypt_block_impl(key, state) }
}

/// Decrypt one block with `aesdec` over an [`inverse_schedule`].
pub fn decrypt_block(inv_keys: &[u8; MAX_KEY_SCHEDULE], rounds: usize, state: &mut [u8; 16]) {
    debug_assert!(available());
    // SAFETY: caller selected this module only after `available()`.
    unsafe { decrypt_block_impl(inv_keys, rounds, state) }
}

#[target_feature(enable = "aes")]
unsafe fn encrypt_block_impl(key: &AesKey, state: &mut [u8; 16]) {
    let mut s = load(state);
    s = _mm_xor_si128(s, load(key.round_key(0)));
    for round in 1..key.rounds {
        s = _mm_aesenc_si128(s, load(key.round_key(round)));
    }
    s = _mm_aesenclast_si128(s, load(key.round_key(key.rounds)));
    store(state, s);
}

#[target_feature(enable = "aes")]
unsafe fn decrypt_block_impl(inv_keys: &[u8; MAX_KEY_SCHEDULE], rounds: usize, state: &mut [u8; 16]) {
    let mut s = load(state);
    s = _mm_xor_si128(s, load(&inv_keys[..16]));
    for round in 1..rounds {
        s = _mm_aesdec_si128(s, load(&inv_keys[round * 16..round * 16 + 16]));
    }
    s = _mm_aesdeclast_si128(s, load(&inv_keys[rounds * 16..rounds * 16 + 16]));
    store(state, s);
}

#[inline]
unsafe fn load(bytes: &[u8]) -> __m128i {
    _mm_loadu_si128(bytes.as_ptr().cast::<__m128i>())
}

#[inline]
unsafe fn store(bytes: &mut [u8], v: __m128i) {
    _mm_storeu_si128(bytes.as_mut_ptr().cast::<__m128i>(), v);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aes::block;

    #[test]
    fn test_ni_matches_software() {
        if !available() {
            return;
        }
        let key_bytes: Vec<u8> = (0u8..32).collect();
        for len in [16usize, 24, 32] {
            let key = AesKey::expand(&key_bytes[..len]).unwrap();
            let inv = inverse_schedule(&key);
            let mut soft = *b"ductwork test bk";
            let mut fast = soft;
            block::encrypt_block(&key, &mut soft);
            encrypt_block(&key, &mut fast);
            assert_eq!(soft, fast);
            block::decrypt_block(&key, &mut soft);
            decrypt_block(&inv, key.rounds, &mut fast);
            assert_eq!(soft, fast);
        }
    }
}
