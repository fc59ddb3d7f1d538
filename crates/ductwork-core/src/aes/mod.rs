//! AES block-cipher device.
//!
//! AES-128/192/256 in ECB, CBC, PCBC, CFB and OFB chaining, as an
//! encrypting or decrypting stream device. The wire format is the raw
//! concatenation of 16-byte blocks: no header, no IV prefix, no
//! padding, no authentication tag — the IV travels out of band.
//!
//! Hardware acceleration (AES-NI) is selected at construction when the
//! CPU advertises it and the mode string does not carry `<`.

pub mod block;
pub mod device;
#[cfg(target_arch = "x86_64")]
pub mod ni;
pub mod tables;

pub use block::AesKey;
pub use device::{Aes, ChainMode};
