//! Cross-cutting handle contract checks: pushback, direction switches,
//! error propagation through filters, and non-ownership of wrapped
//! devices.

use ductwork_core::device::memory::Memory;
use ductwork_core::device::{Arg, Stream, Whence};
use ductwork_core::errno::Errno;
use ductwork_core::filter::{Limit, Repeat};
use ductwork_core::http::Chunked;

#[test]
fn test_multibyte_pushback() {
    let mut dev = Memory::with_contents(b"tail".to_vec(), "r").unwrap();
    // Push four bytes back (the guaranteed minimum capacity).
    for &b in b"daeh".iter() {
        dev.ungetc(b).unwrap();
    }
    let mut buf = [0u8; 8];
    assert_eq!(dev.read(&mut buf).unwrap(), 8);
    assert_eq!(&buf, b"headtail");
}

#[test]
fn test_filter_error_propagates_from_underlying() {
    // The base refuses writes; the limiter surfaces the same condition.
    let mut base = Memory::with_contents(vec![0u8; 10], "r").unwrap();
    let mut lim = Limit::open(&mut base, 0, 10, "w").unwrap();
    assert_eq!(lim.write(b"x"), Err(Errno::PermissionDenied));
    assert_eq!(lim.last_error(), Some(Errno::PermissionDenied));
    // clear_err forwards down the stack.
    lim.clear_err();
    assert_eq!(lim.last_error(), None);
    drop(lim);
    assert_eq!(base.last_error(), None);
}

#[test]
fn test_repeat_cycles_through_limit() {
    let mut base = Memory::with_contents(b"ab".to_vec(), "r").unwrap();
    let mut repeat = Repeat::open(&mut base, "r").unwrap();
    let mut lim = Limit::open(&mut repeat, 0, 6, "r").unwrap();
    let mut buf = [0u8; 6];
    assert_eq!(lim.read(&mut buf).unwrap(), 6);
    assert_eq!(&buf, b"ababab");
}

#[test]
fn test_repeat_requires_seekable_source() {
    // A repeat view over a forward-only stream fails at the first
    // rewind, not at construction.
    let mut base = Memory::with_contents(b"2\r\nab\r\n0\r\n\r\n".to_vec(), "r").unwrap();
    let mut decoder = Chunked::open(&mut base, "r").unwrap();
    let mut repeat = Repeat::open(&mut decoder, "r").unwrap();
    let mut buf = [0u8; 6];
    // The first pass delivers the payload; the rewind then fails.
    assert_eq!(repeat.read(&mut buf).unwrap(), 2);
    assert_eq!(repeat.last_error(), Some(Errno::NotSeekable));
}

#[test]
fn test_close_reports_deferred_flush_failure() {
    // A limiter with a one-byte window: the second byte cannot be
    // delivered, and the handle reports it at write time.
    let mut base = Memory::open("w+").unwrap();
    let mut lim = Limit::open(&mut base, 0, 1, "w").unwrap();
    assert_eq!(lim.write(b"ab").unwrap(), 1);
    assert_eq!(lim.last_error(), Some(Errno::NoBufferSpace));
}

#[test]
fn test_update_handle_switch_discipline() {
    let mut dev = Memory::with_contents(b"abcdef".to_vec(), "r+").unwrap();
    let mut buf = [0u8; 2];
    dev.read(&mut buf).unwrap();
    assert!(dev.just_read());

    // Write after read: pushback is discarded by the switch barrier.
    dev.ungetc(b'b').unwrap();
    dev.write(b"XY").unwrap();
    assert!(dev.just_wrote());
    assert_eq!(dev.tell().unwrap(), 4);

    dev.seek(0, Whence::Start).unwrap();
    let mut all = [0u8; 6];
    dev.read(&mut all).unwrap();
    assert_eq!(&all, b"abXYef");
}

#[test]
fn test_printf_conversion_coverage() {
    let mut dev = Memory::open("w+").unwrap();
    dev.printf(
        b"%d %u %x %o %s %c %lld %llu %llx %zu %zx %g %%",
        &[
            Arg::Int(-7),
            Arg::Uint(7),
            Arg::Uint(255),
            Arg::Uint(8),
            Arg::Str(b"str"),
            Arg::Char(b'Z'),
            Arg::Int(-(1i64 << 40)),
            Arg::Uint(1u64 << 40),
            Arg::Uint(0xabcdef012345),
            Arg::Uint(9000),
            Arg::Uint(0x1000),
            Arg::Float(2.5),
        ],
    )
    .unwrap();
    assert_eq!(
        dev.backend().contents(),
        b"-7 7 ff 10 str Z -1099511627776 1099511627776 abcdef012345 9000 1000 2.5 %"
    );
}

#[test]
fn test_size_on_filters() {
    let mut base = Memory::with_contents((0..50u8).collect(), "r").unwrap();
    let mut lim = Limit::open(&mut base, 5, 20, "r").unwrap();
    assert_eq!(lim.size().unwrap(), 20);
    // size() restored the window position.
    assert_eq!(lim.tell().unwrap(), 0);
    assert_eq!(lim.getc().unwrap(), Some(5));
}
