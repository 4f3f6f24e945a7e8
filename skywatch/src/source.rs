//! Input sources for the driver loop.
//!
//! The engine consumes any `BufRead` producing one JSON object per line.
//! These helpers cover the two bundled cases: replaying a recorded file and
//! connecting to a TCP JSON feed (readsb/dump1090 style). Anything fancier
//! — HTTP polling, message queues — belongs to the host application.

use std::fs::File;
use std::io::BufReader;
use std::net::TcpStream;

use tracing::info;

use crate::error::Result;

/// Open a recorded JSON-lines file for replay.
pub fn open_replay(path: impl AsRef<std::path::Path>) -> Result<BufReader<File>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    info!(path = %path.display(), "replaying file");
    Ok(BufReader::new(file))
}

/// Connect to a TCP JSON-lines feed, e.g. `host:30154`.
pub fn connect_tcp(addr: &str) -> Result<BufReader<TcpStream>> {
    let stream = TcpStream::connect(addr)?;
    info!(addr, "connected");
    Ok(BufReader::new(stream))
}
