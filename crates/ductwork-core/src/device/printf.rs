//! Formatted-output engine.
//!
//! A runtime printf interpreter for device output: parses `%`-directives
//! with flag/width/precision/length grammar and renders typed arguments
//! to a byte buffer which the handle then writes in one piece.
//!
//! Supported conversions: `d i u x X o s c f e g G` plus `%%`, with
//! `-`/`+`/space/`#`/`0` flags, fixed width and precision, and the
//! `hh h l ll z t j` length modifiers (accepted for grammar
//! compatibility; arguments are already width-typed). A malformed
//! directive is emitted literally rather than failing the whole write.

use crate::errno::{Errno, Result};

/// Flags parsed from a format directive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatFlags {
    pub left_justify: bool, // '-'
    pub force_sign: bool,   // '+'
    pub space_sign: bool,   // ' '
    pub alt_form: bool,     // '#'
    pub zero_pad: bool,     // '0'
}

/// Length modifier. Parsed and carried for grammar fidelity only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthMod {
    None,
    Hh,
    H,
    L,
    Ll,
    Z,
    T,
    J,
}

/// A parsed format directive.
#[derive(Debug, Clone)]
pub struct FormatSpec {
    pub flags: FormatFlags,
    pub width: Option<usize>,
    pub precision: Option<usize>,
    pub length: LengthMod,
    pub conversion: u8,
}

/// A typed argument value.
#[derive(Debug, Clone, Copy)]
pub enum Arg<'a> {
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(&'a [u8]),
    Char(u8),
}

/// A piece of a parsed format string.
#[derive(Debug, Clone)]
enum Segment<'a> {
    Literal(&'a [u8]),
    Percent,
    Spec(FormatSpec),
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse one directive starting after the `%`. Returns the parsed
/// directive and the number of bytes consumed, or `None` if malformed.
fn parse_spec(fmt: &[u8]) -> Option<(FormatSpec, usize)> {
    let mut pos = 0;
    let len = fmt.len();

    let mut flags = FormatFlags::default();
    while pos < len {
        match fmt[pos] {
            b'-' => flags.left_justify = true,
            b'+' => flags.force_sign = true,
            b' ' => flags.space_sign = true,
            b'#' => flags.alt_form = true,
            b'0' => flags.zero_pad = true,
            _ => break,
        }
        pos += 1;
    }
    // '+' overrides ' '; '-' overrides '0'.
    if flags.force_sign {
        flags.space_sign = false;
    }
    if flags.left_justify {
        flags.zero_pad = false;
    }

    let width = {
        let start = pos;
        while pos < len && fmt[pos].is_ascii_digit() {
            pos += 1;
        }
        (pos > start).then(|| parse_decimal(&fmt[start..pos]))
    };

    let precision = if pos < len && fmt[pos] == b'.' {
        pos += 1;
        let start = pos;
        while pos < len && fmt[pos].is_ascii_digit() {
            pos += 1;
        }
        Some(parse_decimal(&fmt[start..pos]))
    } else {
        None
    };

    let length = if pos < len {
        match fmt[pos] {
            b'h' => {
                pos += 1;
                if pos < len && fmt[pos] == b'h' {
                    pos += 1;
                    LengthMod::Hh
                } else {
                    LengthMod::H
                }
            }
            b'l' => {
                pos += 1;
                if pos < len && fmt[pos] == b'l' {
                    pos += 1;
                    LengthMod::Ll
                } else {
                    LengthMod::L
                }
            }
            b'z' => {
                pos += 1;
                LengthMod::Z
            }
            b't' => {
                pos += 1;
                LengthMod::T
            }
            b'j' => {
                pos += 1;
                LengthMod::J
            }
            _ => LengthMod::None,
        }
    } else {
        LengthMod::None
    };

    if pos >= len {
        return None;
    }
    let conversion = fmt[pos];
    pos += 1;

    match conversion {
        b'd' | b'i' | b'u' | b'x' | b'X' | b'o' | b's' | b'c' | b'f' | b'F' | b'e' | b'E'
        | b'g' | b'G' => {}
        _ => return None,
    }

    Some((
        FormatSpec {
            flags,
            width,
            precision,
            length,
            conversion,
        },
        pos,
    ))
}

fn parse_segments(fmt: &[u8]) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut pos = 0;
    let len = fmt.len();

    while pos < len {
        let start = pos;
        while pos < len && fmt[pos] != b'%' {
            pos += 1;
        }
        if pos > start {
            segments.push(Segment::Literal(&fmt[start..pos]));
        }
        if pos >= len {
            break;
        }
        pos += 1; // skip '%'
        if pos >= len {
            segments.push(Segment::Literal(&fmt[pos - 1..pos]));
            break;
        }
        if fmt[pos] == b'%' {
            segments.push(Segment::Percent);
            pos += 1;
            continue;
        }
        if let Some((spec, consumed)) = parse_spec(&fmt[pos..]) {
            pos += consumed;
            segments.push(Segment::Spec(spec));
        } else {
            segments.push(Segment::Literal(&fmt[pos - 1..pos]));
        }
    }
    segments
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render `fmt` with `args` to a byte buffer.
///
/// Fails with [`Errno::InvalidArgument`] when a directive has no
/// matching argument or the argument type does not fit the conversion.
pub fn render(fmt: &[u8], args: &[Arg<'_>]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(fmt.len() + args.len() * 8);
    let mut next_arg = 0;

    for segment in parse_segments(fmt) {
        match segment {
            Segment::Literal(lit) => out.extend_from_slice(lit),
            Segment::Percent => out.push(b'%'),
            Segment::Spec(spec) => {
                let arg = *args.get(next_arg).ok_or(Errno::InvalidArgument)?;
                next_arg += 1;
                render_one(&spec, arg, &mut out)?;
            }
        }
    }
    Ok(out)
}

fn render_one(spec: &FormatSpec, arg: Arg<'_>, out: &mut Vec<u8>) -> Result<()> {
    match spec.conversion {
        b'd' | b'i' => format_signed(as_signed(arg)?, spec, out),
        b'u' | b'x' | b'X' | b'o' => format_unsigned(as_unsigned(arg)?, spec, out),
        b's' => match arg {
            Arg::Str(s) => format_str(s, spec, out),
            _ => return Err(Errno::InvalidArgument),
        },
        b'c' => match arg {
            Arg::Char(c) => format_char(c, spec, out),
            Arg::Int(i) => format_char(i as u8, spec, out),
            Arg::Uint(u) => format_char(u as u8, spec, out),
            _ => return Err(Errno::InvalidArgument),
        },
        b'f' | b'F' | b'e' | b'E' | b'g' | b'G' => match arg {
            Arg::Float(v) => format_float(v, spec, out),
            _ => return Err(Errno::InvalidArgument),
        },
        _ => return Err(Errno::InvalidArgument),
    }
    Ok(())
}

fn as_signed(arg: Arg<'_>) -> Result<i64> {
    match arg {
        Arg::Int(v) => Ok(v),
        Arg::Uint(v) => i64::try_from(v).map_err(|_| Errno::InvalidArgument),
        Arg::Char(c) => Ok(i64::from(c)),
        _ => Err(Errno::InvalidArgument),
    }
}

fn as_unsigned(arg: Arg<'_>) -> Result<u64> {
    match arg {
        Arg::Uint(v) => Ok(v),
        Arg::Int(v) => Ok(v as u64),
        Arg::Char(c) => Ok(u64::from(c)),
        _ => Err(Errno::InvalidArgument),
    }
}

fn format_signed(value: i64, spec: &FormatSpec, out: &mut Vec<u8>) {
    let negative = value < 0;
    let abs = value.unsigned_abs();

    let (base, uppercase) = int_base(spec.conversion);
    let mut digits = [0u8; 64];
    let digit_count = render_digits(abs, base, uppercase, &mut digits);
    let digit_slice = &digits[64 - digit_count..];

    let sign = if negative {
        Some(b'-')
    } else if spec.flags.force_sign {
        Some(b'+')
    } else if spec.flags.space_sign {
        Some(b' ')
    } else {
        None
    };

    let precision = spec.precision.unwrap_or(1);
    let zero_prefix = precision.saturating_sub(digit_count);
    let suppress = value == 0 && spec.precision == Some(0);
    let content = if suppress {
        sign.is_some() as usize
    } else {
        sign.is_some() as usize + zero_prefix + digit_count
    };
    let pad_total = spec.width.unwrap_or(0).saturating_sub(content);

    if !spec.flags.left_justify && !spec.flags.zero_pad {
        pad(out, b' ', pad_total);
    }
    if let Some(s) = sign {
        out.push(s);
    }
    if !spec.flags.left_justify && spec.flags.zero_pad {
        pad(out, b'0', pad_total);
    }
    if !suppress {
        pad(out, b'0', zero_prefix);
        out.extend_from_slice(digit_slice);
    }
    if spec.flags.left_justify {
        pad(out, b' ', pad_total);
    }
}

fn format_unsigned(value: u64, spec: &FormatSpec, out: &mut Vec<u8>) {
    let (base, uppercase) = int_base(spec.conversion);
    let mut digits = [0u8; 64];
    let digit_count = render_digits(value, base, uppercase, &mut digits);
    let digit_slice = &digits[64 - digit_count..];

    let precision = spec.precision.unwrap_or(1);
    let zero_prefix = precision.saturating_sub(digit_count);
    let prefix: &[u8] = if value != 0 { alt_prefix(spec) } else { b"" };

    let suppress = value == 0 && spec.precision == Some(0);
    let content = if suppress {
        prefix.len()
    } else {
        prefix.len() + zero_prefix + digit_count
    };
    let pad_total = spec.width.unwrap_or(0).saturating_sub(content);

    if !spec.flags.left_justify && !spec.flags.zero_pad {
        pad(out, b' ', pad_total);
    }
    out.extend_from_slice(prefix);
    if !spec.flags.left_justify && spec.flags.zero_pad {
        pad(out, b'0', pad_total);
    }
    if !suppress {
        pad(out, b'0', zero_prefix);
        out.extend_from_slice(digit_slice);
    }
    if spec.flags.left_justify {
        pad(out, b' ', pad_total);
    }
}

fn format_str(s: &[u8], spec: &FormatSpec, out: &mut Vec<u8>) {
    let max_len = spec.precision.unwrap_or(s.len());
    let effective = &s[..s.len().min(max_len)];
    let pad_total = spec.width.unwrap_or(0).saturating_sub(effective.len());

    if !spec.flags.left_justify {
        pad(out, b' ', pad_total);
    }
    out.extend_from_slice(effective);
    if spec.flags.left_justify {
        pad(out, b' ', pad_total);
    }
}

fn format_char(c: u8, spec: &FormatSpec, out: &mut Vec<u8>) {
    let pad_total = spec.width.unwrap_or(0).saturating_sub(1);
    if !spec.flags.left_justify {
        pad(out, b' ', pad_total);
    }
    out.push(c);
    if spec.flags.left_justify {
        pad(out, b' ', pad_total);
    }
}

fn format_float(value: f64, spec: &FormatSpec, out: &mut Vec<u8>) {
    let precision = spec.precision.unwrap_or(6);

    if value.is_nan() || value.is_infinite() {
        let upper = spec.conversion.is_ascii_uppercase();
        let body = match (value.is_nan(), upper, value.is_sign_negative()) {
            (true, false, _) => "nan",
            (true, true, _) => "NAN",
            (false, false, false) => "inf",
            (false, false, true) => "-inf",
            (false, true, false) => "INF",
            (false, true, true) => "-INF",
        };
        let pad_total = spec.width.unwrap_or(0).saturating_sub(body.len());
        if !spec.flags.left_justify {
            pad(out, b' ', pad_total);
        }
        out.extend_from_slice(body.as_bytes());
        if spec.flags.left_justify {
            pad(out, b' ', pad_total);
        }
        return;
    }

    let negative = value.is_sign_negative();
    let abs = value.abs();
    let body = match spec.conversion | 0x20 {
        b'e' => format_e(abs, precision, spec.conversion.is_ascii_uppercase()),
        b'g' => format_g(abs, precision, spec.conversion.is_ascii_uppercase()),
        _ => format!("{:.*}", precision, abs),
    };

    let sign = if negative {
        Some(b'-')
    } else if spec.flags.force_sign {
        Some(b'+')
    } else if spec.flags.space_sign {
        Some(b' ')
    } else {
        None
    };
    let content = sign.is_some() as usize + body.len();
    let pad_total = spec.width.unwrap_or(0).saturating_sub(content);

    if !spec.flags.left_justify && !spec.flags.zero_pad {
        pad(out, b' ', pad_total);
    }
    if let Some(s) = sign {
        out.push(s);
    }
    if !spec.flags.left_justify && spec.flags.zero_pad {
        pad(out, b'0', pad_total);
    }
    out.extend_from_slice(body.as_bytes());
    if spec.flags.left_justify {
        pad(out, b' ', pad_total);
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn parse_decimal(digits: &[u8]) -> usize {
    let mut result = 0usize;
    for &d in digits {
        result = result.saturating_mul(10).saturating_add((d - b'0') as usize);
    }
    result
}

fn int_base(conversion: u8) -> (u64, bool) {
    match conversion {
        b'o' => (8, false),
        b'x' => (16, false),
        b'X' => (16, true),
        _ => (10, false),
    }
}

/// Render `value` right-aligned into the tail of `buf`; returns the
/// digit count.
fn render_digits(mut value: u64, base: u64, uppercase: bool, buf: &mut [u8; 64]) -> usize {
    if value == 0 {
        buf[63] = b'0';
        return 1;
    }
    let alpha = if uppercase { b'A' } else { b'a' };
    let mut pos = 64;
    while value > 0 && pos > 0 {
        pos -= 1;
        let digit = (value % base) as u8;
        buf[pos] = if digit < 10 {
            b'0' + digit
        } else {
            alpha + (digit - 10)
        };
        value /= base;
    }
    64 - pos
}

fn alt_prefix(spec: &FormatSpec) -> &'static [u8] {
    if !spec.flags.alt_form {
        return b"";
    }
    match spec.conversion {
        b'o' => b"0",
        b'x' => b"0x",
        b'X' => b"0X",
        _ => b"",
    }
}

fn pad(out: &mut Vec<u8>, byte: u8, count: usize) {
    // Bounded by the width grammar; cap defends against pathological widths.
    let count = count.min(4096);
    out.extend(std::iter::repeat(byte).take(count));
}

fn format_e(value: f64, precision: usize, uppercase: bool) -> String {
    let e_char = if uppercase { 'E' } else { 'e' };
    if value == 0.0 {
        return if precision == 0 {
            format!("0{e_char}+00")
        } else {
            format!("0.{:0>width$}{e_char}+00", "", width = precision)
        };
    }
    let exp = value.log10().floor() as i32;
    let mantissa = value / 10f64.powi(exp);
    let sign = if exp < 0 { '-' } else { '+' };
    let abs_exp = exp.unsigned_abs();
    if precision == 0 {
        format!("{}{e_char}{sign}{abs_exp:02}", mantissa.round() as u64)
    } else {
        format!("{mantissa:.precision$}{e_char}{sign}{abs_exp:02}")
    }
}

fn format_g(value: f64, precision: usize, uppercase: bool) -> String {
    let p = precision.max(1);
    if value == 0.0 {
        return "0".into();
    }
    let exp = value.log10().floor() as i32;
    if exp >= -4 && exp < p as i32 {
        let frac_digits = (p as i32 - 1 - exp).max(0) as usize;
        let mut s = format!("{:.*}", frac_digits, value);
        strip_trailing_zeros(&mut s);
        s
    } else {
        let mut s = format_e(value, p.saturating_sub(1), uppercase);
        if let Some(e_pos) = s.bytes().position(|b| b == b'e' || b == b'E') {
            let mut mantissa = s[..e_pos].to_string();
            strip_trailing_zeros(&mut mantissa);
            let exp_part = &s[e_pos..];
            s = format!("{mantissa}{exp_part}");
        }
        s
    }
}

fn strip_trailing_zeros(s: &mut String) {
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(format: &[u8], args: &[Arg<'_>]) -> Vec<u8> {
        render(format, args).unwrap()
    }

    #[test]
    fn test_literal_passthrough() {
        assert_eq!(fmt(b"plain text", &[]), b"plain text");
    }

    #[test]
    fn test_percent_escape() {
        assert_eq!(fmt(b"100%%", &[]), b"100%");
    }

    #[test]
    fn test_signed_basic() {
        assert_eq!(fmt(b"%d", &[Arg::Int(42)]), b"42");
        assert_eq!(fmt(b"%d", &[Arg::Int(-123)]), b"-123");
    }

    #[test]
    fn test_i64_min() {
        assert_eq!(
            fmt(b"%lld", &[Arg::Int(i64::MIN)]),
            b"-9223372036854775808"
        );
    }

    #[test]
    fn test_unsigned_and_hex() {
        assert_eq!(fmt(b"%u", &[Arg::Uint(7)]), b"7");
        assert_eq!(fmt(b"%x", &[Arg::Uint(255)]), b"ff");
        assert_eq!(fmt(b"%X", &[Arg::Uint(255)]), b"FF");
        assert_eq!(fmt(b"%#x", &[Arg::Uint(255)]), b"0xff");
        assert_eq!(fmt(b"%o", &[Arg::Uint(8)]), b"10");
    }

    #[test]
    fn test_long_long_and_size_mods() {
        assert_eq!(
            fmt(b"%llx", &[Arg::Uint(0xdead_beef_cafe)]),
            b"deadbeefcafe"
        );
        assert_eq!(fmt(b"%llu", &[Arg::Uint(u64::MAX)]), b"18446744073709551615");
        assert_eq!(fmt(b"%zu", &[Arg::Uint(4096)]), b"4096");
        assert_eq!(fmt(b"%zx", &[Arg::Uint(4096)]), b"1000");
    }

    #[test]
    fn test_width_and_zero_pad() {
        assert_eq!(fmt(b"%8d", &[Arg::Int(42)]), b"      42");
        assert_eq!(fmt(b"%08d", &[Arg::Int(42)]), b"00000042");
        assert_eq!(fmt(b"%-8d|", &[Arg::Int(42)]), b"42      |");
    }

    #[test]
    fn test_precision_on_integers() {
        assert_eq!(fmt(b"%.5d", &[Arg::Int(42)]), b"00042");
        assert_eq!(fmt(b"%.0d", &[Arg::Int(0)]), b"");
    }

    #[test]
    fn test_string_conversion() {
        assert_eq!(fmt(b"%s", &[Arg::Str(b"hello")]), b"hello");
        assert_eq!(fmt(b"%.3s", &[Arg::Str(b"hello")]), b"hel");
        assert_eq!(fmt(b"%8s", &[Arg::Str(b"hi")]), b"      hi");
    }

    #[test]
    fn test_char_conversion() {
        assert_eq!(fmt(b"%c", &[Arg::Char(b'A')]), b"A");
        assert_eq!(fmt(b"%3c", &[Arg::Char(b'A')]), b"  A");
    }

    #[test]
    fn test_float_g() {
        assert_eq!(fmt(b"%g", &[Arg::Float(0.5)]), b"0.5");
        assert_eq!(fmt(b"%g", &[Arg::Float(100000.0)]), b"100000");
        assert_eq!(fmt(b"%g", &[Arg::Float(0.0)]), b"0");
    }

    #[test]
    fn test_mixed_directives() {
        assert_eq!(
            fmt(
                b"%s %s HTTP/1.1\r\n",
                &[Arg::Str(b"GET"), Arg::Str(b"/index.html")]
            ),
            b"GET /index.html HTTP/1.1\r\n"
        );
    }

    #[test]
    fn test_missing_argument_rejected() {
        assert_eq!(render(b"%d %d", &[Arg::Int(1)]), Err(Errno::InvalidArgument));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        assert_eq!(render(b"%s", &[Arg::Int(1)]), Err(Errno::InvalidArgument));
        assert_eq!(render(b"%f", &[Arg::Str(b"x")]), Err(Errno::InvalidArgument));
    }

    #[test]
    fn test_malformed_spec_emitted_literally() {
        assert_eq!(fmt(b"%q", &[]), b"%q");
        assert_eq!(fmt(b"tail %", &[]), b"tail %");
    }
}
