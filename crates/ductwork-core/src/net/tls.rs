//! TLS client plumbing over rustls.
//!
//! One process-wide client configuration: system trust anchors from
//! webpki-roots, rustls' safe protocol defaults (TLS 1.2 minimum), and
//! strict hostname verification — the server name is pinned via SNI
//! and checked against the peer chain during the handshake.

use std::io;
use std::net::TcpStream;
use std::sync::{Arc, OnceLock};

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, StreamOwned};
use tracing::debug;

use crate::errno::{Errno, Result};

fn client_config() -> Arc<ClientConfig> {
    static CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    CONFIG
        .get_or_init(|| {
            let mut roots = rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            Arc::new(
                ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth(),
            )
        })
        .clone()
}

/// Run the client handshake over a connected TCP stream.
///
/// Verification failures and protocol alerts map to
/// [`Errno::Protocol`]; a transport failure mid-handshake maps to
/// [`Errno::BrokenPipe`] — the descriptor is no longer usable.
pub fn handshake(
    host: &str,
    mut tcp: TcpStream,
) -> Result<StreamOwned<ClientConnection, TcpStream>> {
    let name = ServerName::try_from(host.to_string()).map_err(|_| Errno::InvalidArgument)?;
    let mut conn =
        ClientConnection::new(client_config(), name).map_err(|_| Errno::Protocol)?;
    while conn.is_handshaking() {
        conn.complete_io(&mut tcp).map_err(|e| {
            debug!(error = %e, "tls handshake failed");
            if e.kind() == io::ErrorKind::InvalidData {
                Errno::Protocol
            } else {
                Errno::BrokenPipe
            }
        })?;
    }
    debug!(host, "tls handshake complete");
    Ok(StreamOwned::new(conn, tcp))
}

/// Map a TLS-layer read error. A close without close_notify is a
/// truncation attack signal and reads as a connection reset.
pub fn map_read_error(e: &io::Error) -> Errno {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => Errno::ConnectionReset,
        io::ErrorKind::InvalidData => Errno::Protocol,
        _ => Errno::from_io(e),
    }
}
