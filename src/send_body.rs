//! Request content sources.
//!
//! A closed tagged-variant set rather than an open trait object: the
//! framer needs to know `content_length()` up front to decide whether to
//! send `Content-Length` at all, which an arbitrary `dyn Read` can't
//! always answer.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use crate::Error;

/// Called as body bytes are written to the socket: `(sent_so_far, total)`.
/// `total` is `None` when the source has no known length.
pub type ProgressCallback<'a> = Box<dyn FnMut(u64, Option<u64>) + Send + 'a>;

/// One part of a `multipart/form-data` body.
pub struct MultipartField {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub content: Vec<u8>,
}

impl MultipartField {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        MultipartField {
            name: name.into(),
            filename: None,
            content_type: None,
            content: value.into().into_bytes(),
        }
    }

    pub fn file(name: impl Into<String>, filename: impl Into<String>, content_type: impl Into<String>, content: Vec<u8>) -> Self {
        MultipartField {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
            content,
        }
    }
}

/// The request body a [`crate::Request`] owns until it is sent, then
/// dropped.
pub enum ContentSource {
    Empty,
    Bytes(Vec<u8>),
    Text(String),
    File(PathBuf),
    /// `application/x-www-form-urlencoded` pairs.
    Form(Vec<(String, String)>),
    /// A caller-supplied reader of unknown length.
    Reader(Box<dyn Read + Send>),
    Multipart { boundary: String, fields: Vec<MultipartField> },
}

impl ContentSource {
    pub fn bytes(v: impl Into<Vec<u8>>) -> Self {
        ContentSource::Bytes(v.into())
    }

    pub fn text(v: impl Into<String>) -> Self {
        ContentSource::Text(v.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        ContentSource::File(path.into())
    }

    pub fn form(pairs: Vec<(String, String)>) -> Self {
        ContentSource::Form(pairs)
    }

    pub fn reader(r: impl Read + Send + 'static) -> Self {
        ContentSource::Reader(Box::new(r))
    }

    pub fn multipart(boundary: impl Into<String>, fields: Vec<MultipartField>) -> Self {
        ContentSource::Multipart {
            boundary: boundary.into(),
            fields,
        }
    }

    /// The `Content-Type` this source implies, if the framer should set
    /// one when the caller didn't. `Content-Type` is a reserved,
    /// framer-managed header.
    pub(crate) fn content_type(&self) -> Option<String> {
        match self {
            ContentSource::Empty | ContentSource::Bytes(_) | ContentSource::File(_) | ContentSource::Reader(_) => None,
            ContentSource::Text(_) => Some("text/plain; charset=utf-8".to_string()),
            ContentSource::Form(_) => Some("application/x-www-form-urlencoded".to_string()),
            ContentSource::Multipart { boundary, .. } => Some(format!("multipart/form-data; boundary={boundary}")),
        }
    }

    /// The body length in bytes, if knowable without reading the whole
    /// source.
    pub(crate) fn content_length(&self) -> Result<Option<u64>, Error> {
        Ok(match self {
            ContentSource::Empty => Some(0),
            ContentSource::Bytes(b) => Some(b.len() as u64),
            ContentSource::Text(s) => Some(s.len() as u64),
            ContentSource::File(path) => Some(
                std::fs::metadata(path)
                    .map_err(|e| Error::InvalidInput(format!("cannot stat {path:?}: {e}")))?
                    .len(),
            ),
            ContentSource::Form(pairs) => Some(encode_form(pairs).len() as u64),
            ContentSource::Reader(_) => None,
            ContentSource::Multipart { boundary, fields } => Some(multipart_len(boundary, fields)),
        })
    }

    /// Write the whole body to `sink` in `chunk_size`-byte writes, invoking
    /// `progress` after each chunk.
    pub(crate) fn write_to(
        &mut self,
        sink: &mut impl io::Write,
        chunk_size: usize,
        mut progress: Option<ProgressCallback<'_>>,
    ) -> Result<(), Error> {
        let total = self.content_length()?;

        match self {
            ContentSource::Empty => {}
            ContentSource::Bytes(b) => write_all_chunked(sink, b, chunk_size, total, &mut progress)?,
            ContentSource::Text(s) => write_all_chunked(sink, s.as_bytes(), chunk_size, total, &mut progress)?,
            ContentSource::Form(pairs) => {
                let encoded = encode_form(pairs);
                write_all_chunked(sink, encoded.as_bytes(), chunk_size, total, &mut progress)?;
            }
            ContentSource::File(path) => {
                let mut f = File::open(&path).map_err(|e| Error::InvalidInput(format!("cannot open {path:?}: {e}")))?;
                copy_chunked(sink, &mut f, chunk_size, total, &mut progress)?;
            }
            ContentSource::Reader(r) => {
                copy_chunked(sink, r, chunk_size, None, &mut progress)?;
            }
            ContentSource::Multipart { boundary, fields } => {
                write_multipart(sink, boundary, fields, chunk_size, total, &mut progress)?;
            }
        }

        Ok(())
    }
}

fn write_all_chunked(
    sink: &mut impl io::Write,
    mut data: &[u8],
    chunk_size: usize,
    total: Option<u64>,
    progress: &mut Option<ProgressCallback<'_>>,
) -> Result<(), Error> {
    let mut sent: u64 = 0;
    while !data.is_empty() {
        let n = data.len().min(chunk_size.max(1));
        let (head, rest) = data.split_at(n);
        sink.write_all(head).map_err(|e| Error::SendFailure(e.to_string()))?;
        sent += n as u64;
        data = rest;
        if let Some(cb) = progress.as_mut() {
            cb(sent, total);
        }
    }
    Ok(())
}

fn copy_chunked(
    sink: &mut impl io::Write,
    source: &mut impl Read,
    chunk_size: usize,
    total: Option<u64>,
    progress: &mut Option<ProgressCallback<'_>>,
) -> Result<(), Error> {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut sent: u64 = 0;
    loop {
        let n = source.read(&mut buf).map_err(|e| Error::SendFailure(e.to_string()))?;
        if n == 0 {
            break;
        }
        sink.write_all(&buf[..n]).map_err(|e| Error::SendFailure(e.to_string()))?;
        sent += n as u64;
        if let Some(cb) = progress.as_mut() {
            cb(sent, total);
        }
    }
    Ok(())
}

fn encode_form(pairs: &[(String, String)]) -> String {
    use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", utf8_percent_encode(k, NON_ALPHANUMERIC), utf8_percent_encode(v, NON_ALPHANUMERIC)))
        .collect::<Vec<_>>()
        .join("&")
}

fn multipart_len(boundary: &str, fields: &[MultipartField]) -> u64 {
    let mut len = 0u64;
    for f in fields {
        len += part_header(boundary, f).len() as u64;
        len += f.content.len() as u64;
        len += 2; // trailing CRLF
    }
    len += format!("--{boundary}--\r\n").len() as u64;
    len
}

fn part_header(boundary: &str, f: &MultipartField) -> String {
    let mut h = format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"", f.name);
    if let Some(filename) = &f.filename {
        h.push_str(&format!("; filename=\"{filename}\""));
    }
    h.push_str("\r\n");
    if let Some(ct) = &f.content_type {
        h.push_str(&format!("Content-Type: {ct}\r\n"));
    }
    h.push_str("\r\n");
    h
}

fn write_multipart(
    sink: &mut impl io::Write,
    boundary: &str,
    fields: &[MultipartField],
    chunk_size: usize,
    total: Option<u64>,
    progress: &mut Option<ProgressCallback<'_>>,
) -> Result<(), Error> {
    let mut sent: u64 = 0;
    for f in fields {
        let header = part_header(boundary, f);
        sink.write_all(header.as_bytes()).map_err(|e| Error::SendFailure(e.to_string()))?;
        sent += header.len() as u64;

        let mut body = f.content.as_slice();
        while !body.is_empty() {
            let n = body.len().min(chunk_size.max(1));
            let (head, rest) = body.split_at(n);
            sink.write_all(head).map_err(|e| Error::SendFailure(e.to_string()))?;
            sent += n as u64;
            body = rest;
            if let Some(cb) = progress.as_mut() {
                cb(sent, total);
            }
        }

        sink.write_all(b"\r\n").map_err(|e| Error::SendFailure(e.to_string()))?;
        sent += 2;
    }

    let trailer = format!("--{boundary}--\r\n");
    sink.write_all(trailer.as_bytes()).map_err(|e| Error::SendFailure(e.to_string()))?;
    sent += trailer.len() as u64;
    if let Some(cb) = progress.as_mut() {
        cb(sent, total);
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bytes_source_reports_length_and_writes_exactly() {
        let mut src = ContentSource::bytes(b"hello".to_vec());
        assert_eq!(src.content_length().unwrap(), Some(5));

        let mut out = Vec::new();
        src.write_to(&mut out, 2, None).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn form_source_url_encodes_pairs() {
        let mut src = ContentSource::form(vec![("a".into(), "b c".into())]);
        let mut out = Vec::new();
        src.write_to(&mut out, 4096, None).unwrap();
        assert_eq!(out, b"a=b%20c");
    }

    #[test]
    fn reader_source_has_no_known_length() {
        let src = ContentSource::reader(std::io::Cursor::new(b"x".to_vec()));
        assert_eq!(src.content_length().unwrap(), None);
    }

    #[test]
    fn progress_callback_observes_total_bytes_sent() {
        let mut src = ContentSource::bytes(b"0123456789".to_vec());
        let mut seen = 0u64;
        {
            let cb: ProgressCallback = Box::new(|sent, _total| seen = sent);
            src.write_to(&mut Vec::new(), 3, Some(cb)).unwrap();
        }
        assert_eq!(seen, 10);
    }
}
