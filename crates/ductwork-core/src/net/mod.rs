//! Socket transport devices: TCP, UDP, and TLS.
//!
//! One backend for all three kinds; the kind tag is typed state on the
//! backend. Opening resolves the host and tries each candidate address
//! in order; for TLS the client handshake (SNI, trust-anchor chain
//! verification, strict hostname check) completes before the device is
//! handed out.
//!
//! Reads and writes loop over partial transfers and map OS errors into
//! the crate taxonomy. TLS shutdown sends close_notify and then drains
//! the peer's; half-close is rejected on TLS.

pub mod init;
pub mod tls;

use std::io::{Read as _, Write as _};
use std::net::{TcpStream, ToSocketAddrs, UdpSocket};

use rustls::{ClientConnection, StreamOwned};
use tracing::debug;

use crate::device::{parse_mode, Backend, Device, Shutdown};
use crate::errno::{Errno, Result};

/// Transport kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Udp,
    Tcp,
    Tls,
}

#[derive(Debug)]
enum Transport {
    Tcp(TcpStream),
    Udp(UdpSocket),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

/// Socket backend.
#[derive(Debug)]
pub struct Socket {
    transport: Transport,
    kind: SocketKind,
    /// A protocol-level failure occurred; skip the graceful TLS
    /// shutdown on close.
    poisoned: bool,
}

impl Socket {
    /// Connect a TCP stream device.
    pub fn tcp(host: &str, port: u16, mode_str: &str) -> Result<Device<Socket>> {
        let mode = parse_mode(mode_str)?;
        let stream = connect_tcp(host, port)?;
        Ok(Device::with_mode(
            Socket {
                transport: Transport::Tcp(stream),
                kind: SocketKind::Tcp,
                poisoned: false,
            },
            mode,
        ))
    }

    /// Connect a UDP datagram device.
    pub fn udp(host: &str, port: u16, mode_str: &str) -> Result<Device<Socket>> {
        let mode = parse_mode(mode_str)?;
        init::ignore_sigpipe();
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| Errno::from_io(&e))?;
        socket
            .connect((host, port))
            .map_err(|e| Errno::from_io_or(&e, Errno::NotFound))?;
        debug!(host, port, "udp association");
        Ok(Device::with_mode(
            Socket {
                transport: Transport::Udp(socket),
                kind: SocketKind::Udp,
                poisoned: false,
            },
            mode,
        ))
    }

    /// Connect a TCP stream and run the TLS client handshake over it.
    pub fn tls(host: &str, port: u16, mode_str: &str) -> Result<Device<Socket>> {
        let mode = parse_mode(mode_str)?;
        let stream = connect_tcp(host, port)?;
        let tls = tls::handshake(host, stream)?;
        Ok(Device::with_mode(
            Socket {
                transport: Transport::Tls(Box::new(tls)),
                kind: SocketKind::Tls,
                poisoned: false,
            },
            mode,
        ))
    }

    /// Wrap an already-connected TCP stream (loopback fixtures,
    /// accepted connections).
    pub fn from_tcp_stream(stream: TcpStream, mode_str: &str) -> Result<Device<Socket>> {
        let mode = parse_mode(mode_str)?;
        init::ignore_sigpipe();
        Ok(Device::with_mode(
            Socket {
                transport: Transport::Tcp(stream),
                kind: SocketKind::Tcp,
                poisoned: false,
            },
            mode,
        ))
    }

    /// The transport kind tag.
    pub fn socket_kind(&self) -> SocketKind {
        self.kind
    }
}

/// Resolve and connect, trying each candidate address in order.
fn connect_tcp(host: &str, port: u16) -> Result<TcpStream> {
    init::ignore_sigpipe();
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|_| Errno::NotFound)?;
    let mut last = Errno::NotFound;
    for addr in addrs {
        match TcpStream::connect(addr) {
            Ok(stream) => {
                debug!(host, port, %addr, "connected");
                return Ok(stream);
            }
            Err(e) => {
                debug!(host, port, %addr, error = %e, "connect failed");
                last = Errno::from_io_or(&e, Errno::BrokenPipe);
            }
        }
    }
    Err(last)
}

impl Backend for Socket {
    fn kind(&self) -> &'static str {
        match self.kind {
            SocketKind::Udp => "udp",
            SocketKind::Tcp => "tcp",
            SocketKind::Tls => "tls",
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let r = match &mut self.transport {
                Transport::Tcp(s) => s.read(buf),
                Transport::Udp(s) => s.recv(buf),
                Transport::Tls(s) => match s.read(buf) {
                    Ok(n) => return Ok(n),
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let errno = tls::map_read_error(&e);
                        if errno == Errno::Protocol {
                            self.poisoned = true;
                        }
                        return Err(errno);
                    }
                },
            };
            match r {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Errno::from_io(&e)),
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        loop {
            let r = match &mut self.transport {
                Transport::Tcp(s) => s.write(buf),
                Transport::Udp(s) => s.send(buf),
                Transport::Tls(s) => s.write(buf),
            };
            match r {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Errno::from_io_or(&e, Errno::WriteFault)),
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        match &mut self.transport {
            Transport::Tls(s) => s
                .flush()
                .map_err(|e| Errno::from_io_or(&e, Errno::WriteFault)),
            _ => Ok(()),
        }
    }

    fn shutdown(&mut self, how: Shutdown) -> Result<()> {
        match &mut self.transport {
            Transport::Tcp(s) => {
                let how = match how {
                    Shutdown::Read => std::net::Shutdown::Read,
                    Shutdown::Write => std::net::Shutdown::Write,
                    Shutdown::Both => std::net::Shutdown::Both,
                };
                s.shutdown(how).map_err(|e| Errno::from_io(&e))
            }
            Transport::Udp(_) => Err(Errno::NotSupported),
            Transport::Tls(s) => {
                if how != Shutdown::Both {
                    // TLS has no half-close; close_notify ends the session.
                    return Err(Errno::NotSupported);
                }
                s.conn.send_close_notify();
                let _ = s.flush();
                // Drain the peer's close_notify so the session ends
                // cleanly on both sides.
                let mut scratch = [0u8; 256];
                while let Ok(n) = s.read(&mut scratch) {
                    if n == 0 {
                        break;
                    }
                }
                s.sock
                    .shutdown(std::net::Shutdown::Both)
                    .map_err(|e| Errno::from_io(&e))
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Transport::Tls(s) = &mut self.transport {
            if !self.poisoned {
                s.conn.send_close_notify();
                let _ = s.flush();
            }
        }
        // Descriptors close on drop.
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
