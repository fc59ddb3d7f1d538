//! Mode-string parsing.
//!
//! Devices are configured by fopen-style mode strings. Tokens are
//! order-insensitive: exactly one of `r`/`w`/`a` selects the base direction,
//! `+` grants the opposite direction, `b`/`t` select binary/text (the core
//! performs no text translation either way), `x` requests exclusive create,
//! `<` disables a device-specific acceleration, and `@ncp` selects the
//! platform native code page for path resolution. Unknown tokens are
//! ignored without error.

use crate::errno::{Errno, Result};

/// Parsed mode flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mode {
    pub readable: bool,
    pub writable: bool,
    pub append: bool,
    pub create: bool,
    pub truncate: bool,
    pub exclusive: bool,
    /// `+` was present: the handle is open in both directions.
    pub update: bool,
    pub binary: bool,
    pub text: bool,
    /// `<` was present: skip hardware-accelerated code paths.
    pub no_accel: bool,
    /// `@ncp` was present: resolve paths in the native code page.
    pub native_codepage: bool,
}

/// Parse a mode string.
///
/// Fails with [`Errno::InvalidArgument`] when no base token (`r`/`w`/`a`)
/// is present or when more than one is.
pub fn parse_mode(mode: &str) -> Result<Mode> {
    let bytes = mode.as_bytes();
    let mut flags = Mode::default();
    let mut base: Option<u8> = None;
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            c @ (b'r' | b'w' | b'a') => {
                if base.is_some() {
                    return Err(Errno::InvalidArgument);
                }
                base = Some(c);
            }
            b'+' => flags.update = true,
            b'b' => flags.binary = true,
            b't' => flags.text = true,
            b'x' => flags.exclusive = true,
            b'<' => flags.no_accel = true,
            b'@' if bytes[pos..].starts_with(b"@ncp") => {
                flags.native_codepage = true;
                pos += 3;
            }
            _ => {} // unknown tokens are ignored
        }
        pos += 1;
    }

    match base {
        Some(b'r') => flags.readable = true,
        Some(b'w') => {
            flags.writable = true;
            flags.create = true;
            flags.truncate = true;
        }
        Some(b'a') => {
            flags.writable = true;
            flags.create = true;
            flags.append = true;
        }
        _ => return Err(Errno::InvalidArgument),
    }
    if flags.update {
        flags.readable = true;
        flags.writable = true;
    }

    Ok(flags)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
