//! Process-wide transport initialization.
//!
//! A dead peer must surface as a `BrokenPipe` error from write, not
//! kill the process; SIGPIPE is ignored once, before the first socket
//! is created. Teardown is not required.

#![allow(unsafe_code)]

#[cfg(unix)]
pub fn ignore_sigpipe() {
    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        // SAFETY: SIG_IGN installs the kernel-side ignore disposition;
        // no Rust-side handler state is involved.
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        }
    });
}

#[cfg(not(unix))]
pub fn ignore_sigpipe() {}
