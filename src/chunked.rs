// Copyright 2015 The tiny-http Contributors
// Copyright 2015 The rust-chunked-transfer Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//	https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! `Transfer-Encoding: chunked` decoder: hex-size line, read size bytes,
//! CRLF, repeat until size=0.

use std::fmt;
use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult};

/// Reads HTTP chunks from `source` and yields the decoded body bytes.
pub struct ChunkedDecoder<R> {
    source: R,
    remaining_chunk_size: Option<usize>,
}

impl<R> ChunkedDecoder<R>
where
    R: Read,
{
    pub fn new(source: R) -> ChunkedDecoder<R> {
        ChunkedDecoder {
            source,
            remaining_chunk_size: None,
        }
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    fn read_chunk_size(&mut self) -> IoResult<usize> {
        let mut chunk_size_bytes = Vec::new();
        let mut has_ext = false;

        loop {
            let byte = match self.source.by_ref().bytes().next() {
                Some(b) => b?,
                None => return Err(IoError::new(ErrorKind::InvalidInput, ChunkedDecodeError)),
            };

            if byte == b'\r' {
                break;
            }
            if byte == b';' {
                has_ext = true;
                break;
            }
            chunk_size_bytes.push(byte);
        }

        if has_ext {
            loop {
                let byte = match self.source.by_ref().bytes().next() {
                    Some(b) => b?,
                    None => return Err(IoError::new(ErrorKind::InvalidInput, ChunkedDecodeError)),
                };
                if byte == b'\r' {
                    break;
                }
            }
        }

        self.read_line_feed()?;

        String::from_utf8(chunk_size_bytes)
            .ok()
            .and_then(|c| usize::from_str_radix(c.trim(), 16).ok())
            .ok_or_else(|| IoError::new(ErrorKind::InvalidInput, ChunkedDecodeError))
    }

    fn read_carriage_return(&mut self) -> IoResult<()> {
        match self.source.by_ref().bytes().next() {
            Some(Ok(b'\r')) => Ok(()),
            _ => Err(IoError::new(ErrorKind::InvalidInput, ChunkedDecodeError)),
        }
    }

    fn read_line_feed(&mut self) -> IoResult<()> {
        match self.source.by_ref().bytes().next() {
            Some(Ok(b'\n')) => Ok(()),
            _ => Err(IoError::new(ErrorKind::InvalidInput, ChunkedDecodeError)),
        }
    }
}

impl<R> Read for ChunkedDecoder<R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        let remaining_chunk_size = match self.remaining_chunk_size {
            Some(c) => c,
            None => {
                let chunk_size = self.read_chunk_size()?;
                if chunk_size == 0 {
                    self.read_carriage_return()?;
                    self.read_line_feed()?;
                    return Ok(0);
                }
                chunk_size
            }
        };

        if buf.len() < remaining_chunk_size {
            let read = self.source.read(buf)?;
            self.remaining_chunk_size = Some(remaining_chunk_size - read);
            return Ok(read);
        }

        let buf = &mut buf[..remaining_chunk_size];
        let read = self.source.read(buf)?;

        self.remaining_chunk_size = if read == remaining_chunk_size {
            self.read_carriage_return()?;
            self.read_line_feed()?;
            None
        } else {
            Some(remaining_chunk_size - read)
        };

        Ok(read)
    }
}

#[derive(Debug, Copy, Clone)]
struct ChunkedDecodeError;

impl fmt::Display for ChunkedDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed chunked-transfer size line")
    }
}

impl std::error::Error for ChunkedDecodeError {}

#[cfg(test)]
mod test {
    use super::ChunkedDecoder;
    use std::io;
    use std::io::Read;

    #[test]
    fn read_chunk_size_variants() {
        fn read(s: &str, expected: usize) {
            let mut decoded = ChunkedDecoder::new(s.as_bytes());
            let actual = decoded.read_chunk_size().unwrap();
            assert_eq!(expected, actual);
        }

        fn read_err(s: &str) {
            let mut decoded = ChunkedDecoder::new(s.as_bytes());
            let err_kind = decoded.read_chunk_size().unwrap_err().kind();
            assert_eq!(err_kind, io::ErrorKind::InvalidInput);
        }

        read("1\r\n", 1);
        read("01\r\n", 1);
        read("0\r\n", 0);
        read("Ff\r\n", 255);
        read_err("F\rF");
        read_err("X\r\n");
        read("1;extension\r\n", 1);
        read("2; extension...\r\n", 2);
        read_err("1 invalid extension\r\n");
    }

    #[test]
    fn decodes_multi_chunk_body() {
        let source = io::Cursor::new(b"3\r\nhel\r\nb\r\nlo world!!!\r\n0\r\n\r\n".to_vec());
        let mut decoded = ChunkedDecoder::new(source);

        let mut string = String::new();
        decoded.read_to_string(&mut string).unwrap();
        assert_eq!(string, "hello world!!!");
    }

    #[test]
    fn zero_length_body() {
        let mut decoder = ChunkedDecoder::new(b"0\r\n\r\n" as &[u8]);
        let mut decoded = String::new();
        decoder.read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, "");
    }

    #[test]
    fn truncated_body_is_an_error() {
        let source = io::Cursor::new(b"2\r\nhel\r\nb\r\nlo world!!!\r\n0\r\n".to_vec());
        let mut decoded = ChunkedDecoder::new(source);
        let mut string = String::new();
        assert!(decoded.read_to_string(&mut string).is_err());
    }
}
