//! Test harness for ductwork.
//!
//! Loopback fixtures shared by the scenario tests in `tests/`: a
//! scripted HTTP/1.1 server over a real TCP socket, and helpers for
//! driving device pipelines end to end.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::JoinHandle;

use tracing::debug;

/// A scripted HTTP server on a loopback port.
///
/// Accepts one connection and serves the canned responses in order:
/// for each one it reads a request through the blank line, then writes
/// the response bytes verbatim. The connection closes when the script
/// runs out.
pub struct ScriptedServer {
    pub port: u16,
    handle: JoinHandle<Vec<Vec<u8>>>,
}

impl ScriptedServer {
    /// Spawn the server thread with the given response script.
    pub fn spawn(responses: Vec<Vec<u8>>) -> ScriptedServer {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let port = listener.local_addr().expect("local addr").port();
        let handle = std::thread::spawn(move || serve(listener, responses));
        ScriptedServer { port, handle }
    }

    /// Wait for the server to finish; returns the raw requests it saw.
    pub fn join(self) -> Vec<Vec<u8>> {
        self.handle.join().expect("server thread")
    }
}

fn serve(listener: TcpListener, responses: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
    let (mut peer, addr) = listener.accept().expect("accept");
    debug!(%addr, "fixture accepted");
    let mut requests = Vec::new();
    for response in responses {
        match read_request_head(&mut peer) {
            Some(request) => requests.push(request),
            None => break,
        }
        debug!(bytes = response.len(), "fixture responding");
        peer.write_all(&response).expect("write response");
        peer.flush().expect("flush response");
    }
    requests
}

/// Read bytes until the header-terminating blank line. `None` when the
/// client closed first.
fn read_request_head(peer: &mut impl Read) -> Option<Vec<u8>> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match peer.read(&mut byte) {
            Ok(0) => return None,
            Ok(_) => {
                head.push(byte[0]);
                if head.ends_with(b"\r\n\r\n") {
                    return Some(head);
                }
            }
            Err(_) => return None,
        }
    }
}
