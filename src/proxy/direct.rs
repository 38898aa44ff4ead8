//! No proxy: dial straight to the destination (spec.md §4.1 "Direct").

use std::time::Duration;

use crate::stream::{connect_tcp, Stream};
use crate::Error;

pub(super) fn dial(host: &str, port: u16, connect_timeout: Duration) -> Result<Stream, Error> {
    let tcp = connect_tcp(host, port, connect_timeout)?;
    Ok(Stream::Plain(tcp))
}
