//! Buffered line/byte reader over the connection stream.
//!
//! A fixed socket-sized refill buffer feeds a byte-at-a-time CRLF scan for
//! header lines, with a residual-first read discipline so bytes the
//! header scan over-reads are not lost to the chunked/gzip decoders
//! layered on top.

use std::io::{self, Read};
use std::time::{Duration, Instant};

use crate::Error;

const SOCKET_BUF_SIZE: usize = 8 * 1024;
const INITIAL_LINE_BUF: usize = 1000;
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Line-oriented buffered reader. Owns the underlying stream so headers
/// and body can be read through the same residual buffer without losing
/// bytes the header scan over-read.
pub(crate) struct ReceiverHelper<R> {
    source: R,
    buf: Box<[u8]>,
    pos: usize,
    len: usize,
    read_write_timeout: Duration,
}

impl<R: Read> ReceiverHelper<R> {
    pub(crate) fn new(source: R, read_write_timeout: Duration) -> Self {
        ReceiverHelper {
            source,
            buf: vec![0u8; SOCKET_BUF_SIZE].into_boxed_slice(),
            pos: 0,
            len: 0,
            read_write_timeout,
        }
    }

    pub(crate) fn into_inner(self) -> R {
        self.source
    }

    /// Refill the internal buffer if it is empty. Returns `false` on a
    /// true EOF. A non-EOF zero-byte read (e.g. a transport that can
    /// surface `WouldBlock` as `Ok(0)`) is retried on a 10ms poll bounded
    /// by `read_write_timeout`.
    fn fill(&mut self) -> Result<bool, Error> {
        if self.pos < self.len {
            return Ok(true);
        }

        let deadline = Instant::now() + self.read_write_timeout;
        loop {
            match self.source.read(&mut self.buf) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.pos = 0;
                    self.len = n;
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {
                    if Instant::now() >= deadline {
                        return Err(Error::receive("wait timeout", false));
                    }
                    std::thread::sleep(WAIT_POLL_INTERVAL);
                }
                Err(e) => return Err(Error::receive(e.to_string(), false)),
            }
        }
    }

    fn read_byte(&mut self) -> Result<Option<u8>, Error> {
        if !self.fill()? {
            return Ok(None);
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(Some(b))
    }

    /// Read one line, consuming and stripping its terminating `\n` (and a
    /// preceding `\r`, if present). Returns the accumulated bytes as-is on
    /// EOF with no terminator.
    ///
    /// Returns `Ok(None)` only when the stream was at EOF before any byte
    /// of this line was read -- the caller uses that distinction to raise
    /// `empty_message_body` for a reused connection the server closed
    /// while idle, which drives the silent keep-alive reconnect.
    pub(crate) fn read_line(&mut self) -> Result<Option<String>, Error> {
        let mut line: Vec<u8> = Vec::with_capacity(INITIAL_LINE_BUF);
        loop {
            match self.read_byte()? {
                None => {
                    if line.is_empty() {
                        return Ok(None);
                    }
                    break;
                }
                Some(b'\n') => break,
                Some(b) => line.push(b),
            }
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line)
            .map(Some)
            .map_err(|_| Error::receive("non-UTF-8 byte in header line", false))
    }

    /// Drain residual buffered bytes into `dst` before touching the
    /// socket again.
    pub(crate) fn read_buffered(&mut self, dst: &mut [u8]) -> Result<usize, Error> {
        if !self.fill()? {
            return Ok(0);
        }
        let avail = self.len - self.pos;
        let n = avail.min(dst.len());
        dst[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Exposes the helper as a plain `Read` so chunked/gzip decoders can
/// layer on top without knowing about the residual buffer underneath.
impl<R: Read> Read for ReceiverHelper<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_buffered(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_line_strips_crlf() {
        let mut r = ReceiverHelper::new(Cursor::new(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello".to_vec()), Duration::from_secs(1));
        assert_eq!(r.read_line().unwrap(), Some("HTTP/1.1 200 OK".to_string()));
        assert_eq!(r.read_line().unwrap(), Some("Content-Length: 5".to_string()));
        assert_eq!(r.read_line().unwrap(), Some("".to_string()));
    }

    #[test]
    fn residual_bytes_are_consumed_before_the_socket() {
        let mut r = ReceiverHelper::new(Cursor::new(b"X\r\nhello world".to_vec()), Duration::from_secs(1));
        assert_eq!(r.read_line().unwrap(), Some("X".to_string()));

        let mut out = [0u8; 5];
        let n = r.read_buffered(&mut out).unwrap();
        assert_eq!(&out[..n], b"hello");
    }

    #[test]
    fn read_line_tolerates_missing_terminator_at_eof() {
        let mut r = ReceiverHelper::new(Cursor::new(b"no newline".to_vec()), Duration::from_secs(1));
        assert_eq!(r.read_line().unwrap(), Some("no newline".to_string()));
        assert_eq!(r.read_line().unwrap(), None);
    }
}
