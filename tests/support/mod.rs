//! A minimal scripted TCP server for the end-to-end tests, grounded on
//! the teacher's `src/testserver.rs` (`TestServer::new`'s accept-loop
//! shape) and the `tests/override-addresses.rs` pattern of a bare
//! `TcpListener` plus a joinable handler thread.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A background server bound to an ephemeral `127.0.0.1` port, running
/// `handler` once per accepted connection.
pub struct TestServer {
    pub port: u16,
    accept_thread: Option<JoinHandle<()>>,
}

impl TestServer {
    pub fn new<F>(handler: F) -> TestServer
    where
        F: Fn(TcpStream) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let port = listener.local_addr().expect("local_addr").port();
        let handler = Arc::new(handler);

        let accept_thread = thread::spawn(move || {
            for stream in listener.incoming() {
                let stream = match stream {
                    Ok(s) => s,
                    Err(_) => break,
                };
                let handler = Arc::clone(&handler);
                thread::spawn(move || handler(stream));
            }
        });

        TestServer {
            port,
            accept_thread: Some(accept_thread),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // The listener is dropped with the closure's capture once the
        // accept thread's `for` loop observes the next connect-or-error;
        // nothing to join against a blocking `accept()` without also
        // shutting down the socket, so just detach.
        self.accept_thread.take();
    }
}

/// Read one request's status/request line plus headers off `stream`
/// (up to the blank line), returning them as individual lines with the
/// trailing CRLF stripped.
pub fn read_request_head(reader: &mut BufReader<&TcpStream>) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).expect("read request line");
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        if line.is_empty() {
            break;
        }
        lines.push(line);
    }
    lines
}

/// Read exactly `len` bytes of request body after the headers.
pub fn read_request_body(reader: &mut BufReader<&TcpStream>, len: usize) -> Vec<u8> {
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).expect("read request body");
    body
}

pub fn header_value<'a>(lines: &'a [String], name: &str) -> Option<&'a str> {
    lines.iter().find_map(|l| {
        let (n, v) = l.split_once(':')?;
        if n.trim().eq_ignore_ascii_case(name) {
            Some(v.trim())
        } else {
            None
        }
    })
}

pub fn content_length(lines: &[String]) -> usize {
    header_value(lines, "content-length").and_then(|v| v.parse().ok()).unwrap_or(0)
}

/// Write `response` verbatim and flush.
pub fn reply(mut stream: &TcpStream, response: &[u8]) {
    stream.write_all(response).expect("write response");
    stream.flush().ok();
}
