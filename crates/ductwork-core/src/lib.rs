//! # ductwork-core
//!
//! Composable byte-stream devices. Any producer or consumer of bytes —
//! file, socket, memory buffer, TLS tunnel, AES codec, MD5 hasher,
//! HTTP chunked framer, byte limiter, repeating source, padding
//! adapter — sits behind one uniform handle ([`device::Device`]), and
//! handles stack into pipelines that read, write, seek, flush and
//! close as a group.
//!
//! A filter takes its downstream device by value; pass `&mut dev` to
//! build a filter that borrows — and therefore can never close — the
//! device it wraps. The HTTP connection is the one wrapper that owns
//! its transport.
//!
//! The model is synchronous blocking I/O: all operations on one handle
//! are serialized by the caller, distinct handles may be used from
//! different threads.

#![deny(unsafe_code)]

pub mod aes;
pub mod bytes;
pub mod device;
pub mod errno;
pub mod filter;
pub mod http;
pub mod md5;
pub mod net;

pub use device::{Backend, Device, Stream};
pub use errno::{Errno, Result};
