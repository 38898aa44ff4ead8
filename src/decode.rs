//! Content-Encoding decoders, composed orthogonally with the framing
//! decoder.

use std::io::{Read, Result as IoResult};

#[cfg(feature = "gzip")]
use flate2::read::{DeflateDecoder, GzDecoder};

use crate::Error;

/// A body reader wrapping the chosen content decoding, if any.
pub(crate) enum ContentDecoder<R> {
    Identity(R),
    #[cfg(feature = "gzip")]
    Gzip(GzDecoder<R>),
    #[cfg(feature = "gzip")]
    Deflate(DeflateDecoder<R>),
}

impl<R: Read> ContentDecoder<R> {
    pub(crate) fn new(source: R, content_encoding: Option<&str>) -> Result<ContentDecoder<R>, Error> {
        match content_encoding.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("identity") => Ok(ContentDecoder::Identity(source)),
            #[cfg(feature = "gzip")]
            Some("gzip") | Some("x-gzip") => Ok(ContentDecoder::Gzip(GzDecoder::new(source))),
            #[cfg(feature = "gzip")]
            Some("deflate") => Ok(ContentDecoder::Deflate(DeflateDecoder::new(source))),
            Some(other) => Err(Error::InvalidEncoding(other.to_string())),
        }
    }
}

impl<R: Read> Read for ContentDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        match self {
            ContentDecoder::Identity(r) => r.read(buf),
            #[cfg(feature = "gzip")]
            ContentDecoder::Gzip(r) => r.read(buf),
            #[cfg(feature = "gzip")]
            ContentDecoder::Deflate(r) => r.read(buf),
        }
    }
}

#[cfg(all(test, feature = "gzip"))]
mod test {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn gzip_round_trips() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"abc123").unwrap();
        let compressed = enc.finish().unwrap();

        let mut decoder = ContentDecoder::new(&compressed[..], Some("gzip")).unwrap();
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc123");
    }

    #[test]
    fn unknown_encoding_is_an_error() {
        assert!(ContentDecoder::new(&b""[..], Some("br")).is_err());
    }

    #[test]
    fn identity_passes_through() {
        let mut decoder = ContentDecoder::new(&b"hello"[..], None).unwrap();
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");
    }
}
