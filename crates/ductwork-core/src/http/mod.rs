//! HTTP/1.1 client plumbing.
//!
//! Chunked transfer-encoding codec, header storage, request-target
//! splitting, and the request/response state machine over any stream
//! transport.

pub mod chunked;
pub mod client;
pub mod headers;
pub mod url;

pub use chunked::{ChunkReader, ChunkWriter, Chunked};
pub use client::{HttpConnection, RequestBody, ResponseBody};
pub use headers::Headers;
pub use url::HttpTarget;
