//! Formatted-input engine.
//!
//! The mirror of [`printf`](super::printf): a runtime scanf interpreter
//! over a device's `getc`/`ungetc`. A whitespace run in the format skips
//! any input whitespace; a literal byte must match or scanning stops; a
//! directive converts input into the next destination.
//!
//! Supported directives: `%u %d %x %s %c` and `%[...]`/`%[^...]`
//! character classes, each with an optional width (`%3u`), the
//! `hh h l ll z t j` length modifiers (grammar only — destinations are
//! already width-typed), and `*` assignment suppression (`%*[^\r]`).
//! `%%` matches a literal percent. Scanning stops at the first mismatch
//! or end of data; the count of assigned destinations is returned.

use crate::device::Stream;
use crate::errno::{Errno, Result};

/// A typed destination for one conversion.
#[derive(Debug)]
pub enum ScanArg<'a> {
    /// Destination for `%u` and `%x`.
    Uint(&'a mut u64),
    /// Destination for `%d`.
    Int(&'a mut i64),
    /// Destination for `%s`, `%c` and `%[...]`; the scan appends.
    Bytes(&'a mut Vec<u8>),
}

/// Run the format against the device. Returns the number of
/// destinations assigned (suppressed conversions do not count).
pub fn scan<S: Stream + ?Sized>(
    dev: &mut S,
    fmt: &[u8],
    dst: &mut [ScanArg<'_>],
) -> Result<usize> {
    let mut assigned = 0;
    let mut next_dst = 0;
    let mut pos = 0;

    while pos < fmt.len() {
        let byte = fmt[pos];

        if byte.is_ascii_whitespace() {
            while pos < fmt.len() && fmt[pos].is_ascii_whitespace() {
                pos += 1;
            }
            skip_input_whitespace(dev)?;
            continue;
        }

        if byte != b'%' {
            pos += 1;
            match dev.getc()? {
                Some(b) if b == byte => continue,
                Some(b) => {
                    dev.ungetc(b)?;
                    break;
                }
                None => break,
            }
        }

        // Directive.
        pos += 1;
        if pos < fmt.len() && fmt[pos] == b'%' {
            pos += 1;
            match dev.getc()? {
                Some(b'%') => continue,
                Some(b) => {
                    dev.ungetc(b)?;
                    break;
                }
                None => break,
            }
        }

        let (directive, consumed) = parse_directive(&fmt[pos..])?;
        pos += consumed;

        let matched = match directive.conversion {
            Conversion::Unsigned => scan_unsigned(dev, directive.width, 10)?,
            Conversion::Hex => scan_unsigned(dev, directive.width, 16)?,
            Conversion::Signed => scan_signed(dev, directive.width)?,
            Conversion::Word => Scanned::Bytes(scan_word(dev, directive.width)?),
            Conversion::Chars => Scanned::Bytes(scan_chars(dev, directive.width)?),
            Conversion::Class => {
                Scanned::Bytes(scan_class(dev, directive.width, &directive.class)?)
            }
        };

        let produced = match &matched {
            Scanned::None => false,
            Scanned::Uint(_) | Scanned::Int(_) => true,
            Scanned::Bytes(b) => !b.is_empty() || directive.conversion == Conversion::Class,
        };
        if !produced {
            break;
        }
        if directive.suppress {
            continue;
        }

        let slot = dst.get_mut(next_dst).ok_or(Errno::InvalidArgument)?;
        next_dst += 1;
        match (matched, slot) {
            (Scanned::Uint(v), ScanArg::Uint(out)) => **out = v,
            (Scanned::Int(v), ScanArg::Int(out)) => **out = v,
            (Scanned::Bytes(v), ScanArg::Bytes(out)) => out.extend_from_slice(&v),
            _ => return Err(Errno::InvalidArgument),
        }
        assigned += 1;
    }

    Ok(assigned)
}

// ---------------------------------------------------------------------------
// Directive grammar
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    Unsigned,
    Signed,
    Hex,
    Word,
    Chars,
    Class,
}

#[derive(Debug)]
struct Directive {
    suppress: bool,
    width: Option<usize>,
    conversion: Conversion,
    /// Class membership table for `%[...]`.
    class: ClassSet,
}

#[derive(Debug)]
struct ClassSet {
    members: [bool; 256],
    negated: bool,
}

impl Default for ClassSet {
    fn default() -> Self {
        ClassSet {
            members: [false; 256],
            negated: false,
        }
    }
}

impl ClassSet {
    fn contains(&self, b: u8) -> bool {
        self.members[b as usize] != self.negated
    }
}

/// Parse one directive starting after the `%`. Returns the directive
/// and bytes consumed.
fn parse_directive(fmt: &[u8]) -> Result<(Directive, usize)> {
    let mut pos = 0;
    let len = fmt.len();

    let suppress = pos < len && fmt[pos] == b'*';
    if suppress {
        pos += 1;
    }

    let width = {
        let start = pos;
        while pos < len && fmt[pos].is_ascii_digit() {
            pos += 1;
        }
        if pos > start {
            let mut w = 0usize;
            for &d in &fmt[start..pos] {
                w = w.saturating_mul(10).saturating_add((d - b'0') as usize);
            }
            Some(w)
        } else {
            None
        }
    };

    // Length modifiers are accepted and discarded.
    while pos < len {
        match fmt[pos] {
            b'h' | b'l' => pos += 1,
            b'z' | b't' | b'j' => {
                pos += 1;
                break;
            }
            _ => break,
        }
    }

    if pos >= len {
        return Err(Errno::InvalidArgument);
    }

    let mut class = ClassSet::default();
    let conversion = match fmt[pos] {
        b'u' => Conversion::Unsigned,
        b'd' | b'i' => Conversion::Signed,
        b'x' | b'X' => Conversion::Hex,
        b's' => Conversion::Word,
        b'c' => Conversion::Chars,
        b'[' => {
            pos += 1;
            if pos < len && fmt[pos] == b'^' {
                class.negated = true;
                pos += 1;
            }
            let start = pos;
            while pos < len && (fmt[pos] != b']' || pos == start) {
                class.members[fmt[pos] as usize] = true;
                pos += 1;
            }
            if pos >= len {
                return Err(Errno::InvalidArgument);
            }
            Conversion::Class
        }
        _ => return Err(Errno::InvalidArgument),
    };
    pos += 1;

    Ok((
        Directive {
            suppress,
            width,
            conversion,
            class,
        },
        pos,
    ))
}

// ---------------------------------------------------------------------------
// Conversion readers
// ---------------------------------------------------------------------------

enum Scanned {
    None,
    Uint(u64),
    Int(i64),
    Bytes(Vec<u8>),
}

fn skip_input_whitespace<S: Stream + ?Sized>(dev: &mut S) -> Result<()> {
    loop {
        match dev.getc()? {
            Some(b) if b.is_ascii_whitespace() => continue,
            Some(b) => {
                dev.ungetc(b)?;
                return Ok(());
            }
            None => return Ok(()),
        }
    }
}

fn digit_value(b: u8, base: u64) -> Option<u64> {
    let v = match b {
        b'0'..=b'9' => u64::from(b - b'0'),
        b'a'..=b'f' => u64::from(b - b'a') + 10,
        b'A'..=b'F' => u64::from(b - b'A') + 10,
        _ => return None,
    };
    (v < base).then_some(v)
}

fn scan_unsigned<S: Stream + ?Sized>(
    dev: &mut S,
    width: Option<usize>,
    base: u64,
) -> Result<Scanned> {
    skip_input_whitespace(dev)?;
    let limit = width.unwrap_or(usize::MAX);
    let mut value = 0u64;
    let mut digits = 0usize;

    while digits < limit {
        match dev.getc()? {
            Some(b) => match digit_value(b, base) {
                Some(v) => {
                    value = value.saturating_mul(base).saturating_add(v);
                    digits += 1;
                }
                None => {
                    dev.ungetc(b)?;
                    break;
                }
            },
            None => break,
        }
    }
    Ok(if digits == 0 {
        Scanned::None
    } else {
        Scanned::Uint(value)
    })
}

fn scan_signed<S: Stream + ?Sized>(dev: &mut S, width: Option<usize>) -> Result<Scanned> {
    skip_input_whitespace(dev)?;
    let mut limit = width.unwrap_or(usize::MAX);
    let mut negative = false;

    let first = match dev.getc()? {
        Some(b) => b,
        None => return Ok(Scanned::None),
    };
    match first {
        b'-' if limit > 1 => {
            negative = true;
            limit -= 1;
        }
        b'+' if limit > 1 => limit -= 1,
        _ => dev.ungetc(first)?,
    }

    match scan_unsigned_nows(dev, limit, 10)? {
        Scanned::Uint(v) => {
            let v = v.min(i64::MAX as u64) as i64;
            Ok(Scanned::Int(if negative { -v } else { v }))
        }
        _ => {
            if negative || first == b'+' {
                // Sign with no digits: push the sign back and mismatch.
                dev.ungetc(first)?;
            }
            Ok(Scanned::None)
        }
    }
}

fn scan_unsigned_nows<S: Stream + ?Sized>(
    dev: &mut S,
    limit: usize,
    base: u64,
) -> Result<Scanned> {
    let mut value = 0u64;
    let mut digits = 0usize;
    while digits < limit {
        match dev.getc()? {
            Some(b) => match digit_value(b, base) {
                Some(v) => {
                    value = value.saturating_mul(base).saturating_add(v);
                    digits += 1;
                }
                None => {
                    dev.ungetc(b)?;
                    break;
                }
            },
            None => break,
        }
    }
    Ok(if digits == 0 {
        Scanned::None
    } else {
        Scanned::Uint(value)
    })
}

fn scan_word<S: Stream + ?Sized>(dev: &mut S, width: Option<usize>) -> Result<Vec<u8>> {
    skip_input_whitespace(dev)?;
    let limit = width.unwrap_or(usize::MAX);
    let mut out = Vec::new();
    while out.len() < limit {
        match dev.getc()? {
            Some(b) if !b.is_ascii_whitespace() => out.push(b),
            Some(b) => {
                dev.ungetc(b)?;
                break;
            }
            None => break,
        }
    }
    Ok(out)
}

fn scan_chars<S: Stream + ?Sized>(dev: &mut S, width: Option<usize>) -> Result<Vec<u8>> {
    let want = width.unwrap_or(1);
    let mut out = Vec::with_capacity(want);
    while out.len() < want {
        match dev.getc()? {
            Some(b) => out.push(b),
            None => return Ok(Vec::new()), // short input is a mismatch
        }
    }
    Ok(out)
}

fn scan_class<S: Stream + ?Sized>(
    dev: &mut S,
    width: Option<usize>,
    class: &ClassSet,
) -> Result<Vec<u8>> {
    let limit = width.unwrap_or(usize::MAX);
    let mut out = Vec::new();
    while out.len() < limit {
        match dev.getc()? {
            Some(b) if class.contains(b) => out.push(b),
            Some(b) => {
                dev.ungetc(b)?;
                break;
            }
            None => break,
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::memory::Memory;

    fn reader(input: &[u8]) -> crate::device::Device<Memory> {
        Memory::with_contents(input.to_vec(), "r").unwrap()
    }

    #[test]
    fn test_scan_unsigned_basic() {
        let mut dev = reader(b"42 tail");
        let mut v = 0u64;
        let n = dev.scanf(b"%u", &mut [ScanArg::Uint(&mut v)]).unwrap();
        assert_eq!(n, 1);
        assert_eq!(v, 42);
    }

    #[test]
    fn test_scan_width_limit() {
        let mut dev = reader(b"20017");
        let mut v = 0u64;
        dev.scanf(b"%3u", &mut [ScanArg::Uint(&mut v)]).unwrap();
        assert_eq!(v, 200);
        // The remaining digits are still in the stream.
        assert_eq!(dev.getc().unwrap(), Some(b'1'));
    }

    #[test]
    fn test_scan_hex() {
        let mut dev = reader(b"1aF;");
        let mut v = 0u64;
        dev.scanf(b"%x", &mut [ScanArg::Uint(&mut v)]).unwrap();
        assert_eq!(v, 0x1af);
        assert_eq!(dev.getc().unwrap(), Some(b';'));
    }

    #[test]
    fn test_scan_llx() {
        let mut dev = reader(b"deadbeefcafe");
        let mut v = 0u64;
        let n = dev.scanf(b"%llx", &mut [ScanArg::Uint(&mut v)]).unwrap();
        assert_eq!(n, 1);
        assert_eq!(v, 0xdead_beef_cafe);
    }

    #[test]
    fn test_scan_signed() {
        let mut dev = reader(b"-17");
        let mut v = 0i64;
        dev.scanf(b"%d", &mut [ScanArg::Int(&mut v)]).unwrap();
        assert_eq!(v, -17);
    }

    #[test]
    fn test_scan_word() {
        let mut dev = reader(b"  hello world");
        let mut w = Vec::new();
        dev.scanf(b"%s", &mut [ScanArg::Bytes(&mut w)]).unwrap();
        assert_eq!(w, b"hello");
    }

    #[test]
    fn test_scan_class_skip() {
        // The HTTP status-line idiom: match the numbers, skip the reason.
        let mut dev = reader(b"HTTP/1.1 200 OK Maybe\r\nHeader: v\r\n");
        let (mut major, mut minor, mut status) = (0u64, 0u64, 0u64);
        let n = dev
            .scanf(
                b"HTTP/%u.%u %3u%*[^\r]",
                &mut [
                    ScanArg::Uint(&mut major),
                    ScanArg::Uint(&mut minor),
                    ScanArg::Uint(&mut status),
                ],
            )
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!((major, minor, status), (1, 1, 200));
        assert_eq!(dev.getc().unwrap(), Some(b'\r'));
    }

    #[test]
    fn test_scan_literal_mismatch_stops() {
        let mut dev = reader(b"HTXP/1.1");
        let mut v = 0u64;
        let n = dev
            .scanf(b"HTTP/%u", &mut [ScanArg::Uint(&mut v)])
            .unwrap();
        assert_eq!(n, 0);
        // Mismatched byte is pushed back.
        assert_eq!(dev.getc().unwrap(), Some(b'X'));
    }

    #[test]
    fn test_scan_whitespace_run() {
        let mut dev = reader(b"a   \t b");
        let mut w = Vec::new();
        let n = dev.scanf(b"a %s", &mut [ScanArg::Bytes(&mut w)]).unwrap();
        assert_eq!(n, 1);
        assert_eq!(w, b"b");
    }

    #[test]
    fn test_scan_percent_escape() {
        let mut dev = reader(b"50%");
        let mut v = 0u64;
        let n = dev.scanf(b"%u%%", &mut [ScanArg::Uint(&mut v)]).unwrap();
        assert_eq!(n, 1);
        assert_eq!(v, 50);
        assert_eq!(dev.getc().unwrap(), None);
    }

    #[test]
    fn test_scan_eof_before_match() {
        let mut dev = reader(b"");
        let mut v = 0u64;
        let n = dev.scanf(b"%u", &mut [ScanArg::Uint(&mut v)]).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_scan_type_mismatch_is_error() {
        let mut dev = reader(b"42");
        let mut w = Vec::new();
        assert_eq!(
            dev.scanf(b"%u", &mut [ScanArg::Bytes(&mut w)]),
            Err(Errno::InvalidArgument)
        );
    }

    #[test]
    fn test_scan_chars_exact() {
        let mut dev = reader(b"abcd");
        let mut w = Vec::new();
        let n = dev.scanf(b"%2c", &mut [ScanArg::Bytes(&mut w)]).unwrap();
        assert_eq!(n, 1);
        assert_eq!(w, b"ab");
    }
}
