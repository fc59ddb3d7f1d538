//! HTTP/1.1 message state machine.
//!
//! One sequential request/response cycle at a time over one transport,
//! with keep-alive reuse:
//!
//! `idle → request line → headers → body → status line → response
//! headers → response body → end → idle`
//!
//! The connection owns its transport (pass `&mut dev` to borrow one
//! instead). Body handles returned by [`HttpConnection::request_body`]
//! and [`HttpConnection::response_body`] are devices viewing the
//! connection; the framing state lives here so `end_response` can
//! always drain what is left.
//!
//! Request lines and headers go out through the device `printf`; the
//! status line comes in through the device `scanf`.

use tracing::debug;

use super::chunked::{ChunkReader, ChunkWriter};
use super::headers::{has_token, Headers};
use super::url::HttpTarget;
use crate::device::{Arg, Backend, Device, ScanArg, Stream, Whence};
use crate::errno::{Errno, Result};

/// How the current response body is delimited.
#[derive(Debug)]
enum BodyFraming {
    /// 1xx, 204, 304: no body bytes on the wire.
    Empty,
    /// `Content-Length`: this many bytes remain.
    Length(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked(ChunkReader),
    /// Neither: the body runs to connection close.
    UntilClose,
}

/// HTTP/1.1 client-side connection state.
#[derive(Debug)]
pub struct HttpConnection<S: Stream> {
    transport: S,
    /// Headers of the most recent response.
    headers: Headers,
    status: u16,
    /// Request framing declared so far.
    chunked_request: bool,
    declared_length: Option<u64>,
    body_sent: bool,
    /// The request header section has not been terminated yet.
    headers_open: bool,
    /// A streaming request-body device is outstanding.
    body_open: bool,
    request_writer: ChunkWriter,
    response: Option<BodyFraming>,
    /// The peer advertised `Connection: close`.
    closing: bool,
    /// The transport failed or was poisoned; no further requests.
    dead: bool,
}

impl<S: Stream> HttpConnection<S> {
    /// Wrap a connected transport.
    pub fn new(transport: S) -> HttpConnection<S> {
        HttpConnection {
            transport,
            headers: Headers::new(),
            status: 0,
            chunked_request: false,
            declared_length: None,
            body_sent: false,
            headers_open: false,
            body_open: false,
            request_writer: ChunkWriter::new(),
            response: None,
            closing: false,
            dead: false,
        }
    }

    /// Give the transport back (for pipelining elsewhere or closing).
    pub fn into_transport(self) -> S {
        self.transport
    }

    /// Status code of the most recent response.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// A received header value, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// All received headers in arrival order.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// True when no further requests can be issued on this connection.
    pub fn is_closed(&self) -> bool {
        self.dead || self.closing
    }

    // -- request side -------------------------------------------------------

    /// Start a request: emits the request line and the `Host` header.
    ///
    /// Fails with [`Errno::BrokenPipe`] once the connection is
    /// poisoned or the previous response said `Connection: close`.
    pub fn begin_request(&mut self, method: &str, url: &str) -> Result<()> {
        if self.dead || self.closing {
            return Err(Errno::BrokenPipe);
        }
        if self.response.is_some() {
            return Err(Errno::InvalidArgument);
        }
        let target = HttpTarget::parse(url)?;
        let host = target.host_header();
        debug!(method, path = %target.path_and_query, %host, "request");

        self.chunked_request = false;
        self.declared_length = None;
        self.body_sent = false;
        self.body_open = false;
        self.request_writer = ChunkWriter::new();
        self.status = 0;

        self.transport.printf(
            b"%s %s HTTP/1.1\r\nHost: %s\r\n",
            &[
                Arg::Str(method.as_bytes()),
                Arg::Str(target.path_and_query.as_bytes()),
                Arg::Str(host.as_bytes()),
            ],
        )?;
        self.headers_open = true;
        Ok(())
    }

    /// Emit one request header.
    ///
    /// Framing headers are interpreted: `Transfer-Encoding: chunked`
    /// and `Content-Length` select the body framing and are mutually
    /// exclusive. Nothing can be added once the header section closed.
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<()> {
        if !self.headers_open {
            return Err(Errno::InvalidArgument);
        }
        if name.eq_ignore_ascii_case("transfer-encoding") {
            if has_token(value, "chunked") {
                if self.declared_length.is_some() {
                    return Err(Errno::InvalidArgument);
                }
                self.chunked_request = true;
            }
        } else if name.eq_ignore_ascii_case("content-length") {
            if self.chunked_request {
                return Err(Errno::InvalidArgument);
            }
            let n = value
                .trim()
                .parse::<u64>()
                .map_err(|_| Errno::InvalidArgument)?;
            self.declared_length = Some(n);
        }
        self.transport
            .printf(
                b"%s: %s\r\n",
                &[Arg::Str(name.as_bytes()), Arg::Str(value.as_bytes())],
            )
            .map(|_| ())
    }

    /// Terminate the header section and copy `source` as the body.
    ///
    /// With no framing declared, a seekable source gets
    /// `Content-Length`; anything else is sent chunked. A pre-declared
    /// `Content-Length` must match the source size.
    pub fn add_body<B: Stream>(&mut self, source: &mut B) -> Result<()> {
        if !self.headers_open || self.body_sent {
            return Err(Errno::InvalidArgument);
        }
        if let Some(declared) = self.declared_length {
            if let Some(len) = remaining_len(source) {
                if len != declared {
                    return Err(Errno::InvalidArgument);
                }
            }
            self.transport.write_all(b"\r\n")?;
            copy_stream(source, &mut self.transport)?;
        } else if self.chunked_request {
            self.transport.write_all(b"\r\n")?;
            chunk_pipe(source, &mut self.transport)?;
        } else if let Some(len) = remaining_len(source) {
            self.transport
                .printf(b"Content-Length: %llu\r\n\r\n", &[Arg::Uint(len)])?;
            copy_stream(source, &mut self.transport)?;
        } else {
            self.transport
                .write_all(b"Transfer-Encoding: chunked\r\n\r\n")?;
            chunk_pipe(source, &mut self.transport)?;
        }
        self.headers_open = false;
        self.body_sent = true;
        self.transport.flush()
    }

    /// Terminate the header section and send an in-memory body.
    pub fn add_body_bytes(&mut self, body: &[u8]) -> Result<()> {
        if !self.headers_open || self.body_sent {
            return Err(Errno::InvalidArgument);
        }
        if let Some(declared) = self.declared_length {
            if declared != body.len() as u64 {
                return Err(Errno::InvalidArgument);
            }
            self.transport.write_all(b"\r\n")?;
            self.transport.write_all(body)?;
        } else if self.chunked_request {
            self.transport.write_all(b"\r\n")?;
            let mut writer = ChunkWriter::new();
            writer.write_to(&mut self.transport, body)?;
            writer.finish(&mut self.transport)?;
        } else {
            self.transport.printf(
                b"Content-Length: %llu\r\n\r\n",
                &[Arg::Uint(body.len() as u64)],
            )?;
            self.transport.write_all(body)?;
        }
        self.headers_open = false;
        self.body_sent = true;
        self.transport.flush()
    }

    /// Terminate the header section and return a device to stream the
    /// body through. Chunked framing is forced; closing the device
    /// terminates the body. Incompatible with a pre-declared
    /// `Content-Length`.
    pub fn request_body(&mut self, mime: &str) -> Result<Device<RequestBody<'_, S>>> {
        if !self.headers_open || self.body_sent || self.declared_length.is_some() {
            return Err(Errno::InvalidArgument);
        }
        if !self.chunked_request {
            self.transport
                .write_all(b"Transfer-Encoding: chunked\r\n")?;
            self.chunked_request = true;
        }
        if !mime.is_empty() {
            self.transport
                .printf(b"Content-Type: %s\r\n", &[Arg::Str(mime.as_bytes())])?;
        }
        self.transport.write_all(b"\r\n")?;
        self.headers_open = false;
        self.body_open = true;
        self.request_writer = ChunkWriter::new();
        Device::open(RequestBody { conn: self }, "wb")
    }

    // -- response side ------------------------------------------------------

    /// Read the status line and headers; returns the status code.
    ///
    /// Finishes any still-open request body or header section first.
    pub fn begin_response(&mut self) -> Result<u16> {
        if self.dead {
            return Err(Errno::BrokenPipe);
        }
        if self.body_open {
            self.body_open = false;
            self.body_sent = true;
            let HttpConnection {
                transport,
                request_writer,
                ..
            } = self;
            request_writer.finish(transport)?;
        }
        if self.headers_open {
            self.transport.write_all(b"\r\n")?;
            self.headers_open = false;
        }
        self.transport.flush()?;

        match self.parse_response() {
            Ok(status) => Ok(status),
            Err(e) => {
                self.dead = true;
                Err(e)
            }
        }
    }

    fn parse_response(&mut self) -> Result<u16> {
        self.headers.clear();

        let (mut major, mut minor, mut status) = (0u64, 0u64, 0u64);
        let n = self.transport.scanf(
            b"HTTP/%u.%u %3u%*[^\r]",
            &mut [
                ScanArg::Uint(&mut major),
                ScanArg::Uint(&mut minor),
                ScanArg::Uint(&mut status),
            ],
        )?;
        if n != 3 || !read_header_line(&mut self.transport)?.is_empty() {
            return Err(Errno::BadMessage);
        }
        if major != 1 || minor > 1 {
            return Err(Errno::BadMessage);
        }

        loop {
            let line = read_header_line(&mut self.transport)?;
            if line.is_empty() {
                break;
            }
            if line[0] == b' ' || line[0] == b'\t' {
                // Folded continuation: unfold into the previous value.
                let text = String::from_utf8_lossy(&line);
                self.headers.extend_last(text.trim());
                continue;
            }
            let text = String::from_utf8_lossy(&line).into_owned();
            let (name, value) = text.split_once(':').ok_or(Errno::BadMessage)?;
            self.headers
                .push(name.trim().to_string(), value.trim().to_string());
        }

        if self
            .headers
            .get("connection")
            .is_some_and(|v| has_token(v, "close"))
        {
            self.closing = true;
        }
        let chunked = self
            .headers
            .get("transfer-encoding")
            .is_some_and(|v| has_token(v, "chunked"));
        let content_length = match self.headers.get("content-length") {
            Some(v) => Some(
                v.trim()
                    .parse::<u64>()
                    .map_err(|_| Errno::BadMessage)?,
            ),
            None => None,
        };

        let no_body = (100..200).contains(&status) || status == 204 || status == 304;
        self.status = status as u16;
        self.response = Some(if no_body {
            BodyFraming::Empty
        } else if chunked {
            BodyFraming::Chunked(ChunkReader::new())
        } else if let Some(len) = content_length {
            BodyFraming::Length(len)
        } else {
            // Close-delimited: this connection cannot be reused.
            self.closing = true;
            BodyFraming::UntilClose
        });
        debug!(status = self.status, closing = self.closing, "response");
        Ok(self.status)
    }

    /// A device reading the response body according to its framing.
    /// The framing state stays on the connection, so `end_response`
    /// can drain whatever the caller leaves behind.
    pub fn response_body(&mut self) -> Result<Device<ResponseBody<'_, S>>> {
        if self.response.is_none() {
            return Err(Errno::InvalidArgument);
        }
        Device::open(ResponseBody { conn: self }, "rb")
    }

    /// Drain the rest of the body (and chunked trailers) and return the
    /// connection to idle — or mark it closed when the peer asked.
    pub fn end_response(&mut self) -> Result<()> {
        if self.response.is_none() {
            return Err(Errno::InvalidArgument);
        }
        let result = self.finish_response();
        if result.is_err() {
            self.dead = true;
        }
        self.response = None;
        if self.closing {
            self.dead = true;
        }
        result
    }

    fn finish_response(&mut self) -> Result<()> {
        let mut scratch = [0u8; 4096];
        loop {
            if self.read_body_into(&mut scratch)? == 0 {
                break;
            }
        }
        if matches!(self.response, Some(BodyFraming::Chunked(_))) {
            // Optional trailer headers, discarded up to the blank line.
            loop {
                if read_header_line(&mut self.transport)?.is_empty() {
                    break;
                }
            }
        }
        Ok(())
    }

    fn read_body_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        let HttpConnection {
            transport,
            response,
            ..
        } = self;
        match response {
            None => Err(Errno::InvalidArgument),
            Some(BodyFraming::Empty) => Ok(0),
            Some(BodyFraming::Length(remaining)) => {
                if *remaining == 0 {
                    return Ok(0);
                }
                let want = (buf.len() as u64).min(*remaining) as usize;
                let n = transport.read(&mut buf[..want])?;
                if n == 0 {
                    // The peer closed before delivering the full length.
                    return Err(Errno::BadMessage);
                }
                *remaining -= n as u64;
                Ok(n)
            }
            Some(BodyFraming::Chunked(reader)) => reader.read_from(transport, buf),
            Some(BodyFraming::UntilClose) => transport.read(buf),
        }
    }
}

// ---------------------------------------------------------------------------
// Body devices
// ---------------------------------------------------------------------------

/// Write-side body device: frames writes as chunks; closing emits the
/// terminating chunk.
#[derive(Debug)]
pub struct RequestBody<'c, S: Stream> {
    conn: &'c mut HttpConnection<S>,
}

impl<S: Stream> Backend for RequestBody<'_, S> {
    fn kind(&self) -> &'static str {
        "http-request-body"
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let HttpConnection {
            transport,
            request_writer,
            ..
        } = &mut *self.conn;
        request_writer.write_to(transport, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.conn.transport.flush()
    }

    fn close(&mut self) -> Result<()> {
        self.conn.body_open = false;
        self.conn.body_sent = true;
        let HttpConnection {
            transport,
            request_writer,
            ..
        } = &mut *self.conn;
        request_writer.finish(transport)?;
        transport.flush()
    }
}

/// Read-side body device over the connection's framing state.
#[derive(Debug)]
pub struct ResponseBody<'c, S: Stream> {
    conn: &'c mut HttpConnection<S>,
}

impl<S: Stream> Backend for ResponseBody<'_, S> {
    fn kind(&self) -> &'static str {
        "http-response-body"
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.conn.read_body_into(buf)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read a CRLF-terminated line, returned without the CRLF. Bare LF and
/// EOF mid-line are malformed.
fn read_header_line<S: Stream + ?Sized>(src: &mut S) -> Result<Vec<u8>> {
    let mut line = Vec::new();
    loop {
        match src.getc()? {
            Some(b'\r') => {
                return match src.getc()? {
                    Some(b'\n') => Ok(line),
                    _ => Err(Errno::BadMessage),
                };
            }
            Some(b) => {
                if line.len() >= 16 * 1024 {
                    return Err(Errno::BadMessage);
                }
                line.push(b);
            }
            None => return Err(Errno::BadMessage),
        }
    }
}

/// Remaining bytes of a seekable stream from its current position.
fn remaining_len<B: Stream>(src: &mut B) -> Option<u64> {
    let pos = src.tell().ok()?;
    let end = src.seek(0, Whence::End).ok()?;
    src.seek(pos as i64, Whence::Start).ok()?;
    Some(end.saturating_sub(pos))
}

fn copy_stream<B: Stream, D: Stream>(src: &mut B, dst: &mut D) -> Result<()> {
    let mut buf = [0u8; 4096];
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        dst.write_all(&buf[..n])?;
    }
}

fn chunk_pipe<B: Stream, D: Stream>(src: &mut B, dst: &mut D) -> Result<()> {
    let mut writer = ChunkWriter::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_to(dst, &buf[..n])?;
    }
    writer.finish(dst)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
