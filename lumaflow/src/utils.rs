//! # Utility module

use anyhow::{anyhow, Result};
use log::*;
use std::io::{ErrorKind, Read};
use std::net::{TcpListener, TcpStream};

/// Where an input stream comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputLocation<'a> {
    /// Local file path.
    File(&'a str),
    /// Listen on the given port and read from the first connection.
    Listen(u16),
    /// Connect to `host:port`.
    Connect(&'a str),
}

impl<'a> InputLocation<'a> {
    /// Parse a file path or a `tcp://host:port` URL.
    ///
    /// `tcp://@:port` listens for an incoming connection instead of connecting.
    pub fn parse(input: &'a str) -> Result<Self> {
        let addr = match input.strip_prefix("tcp://") {
            Some(addr) => addr,
            None => return Ok(Self::File(input)),
        };

        let (host, port) = addr
            .split_once(':')
            .ok_or_else(|| anyhow!("Invalid format, expected tcp://host:port"))?;
        let port: u16 = str::parse(port)?;

        if host == "@" {
            Ok(Self::Listen(port))
        } else {
            Ok(Self::Connect(addr))
        }
    }
}

/// Open a file or an input stream.
pub fn open_file(input: &str) -> Result<Box<dyn Read + Send>> {
    match InputLocation::parse(input)? {
        InputLocation::File(path) => std::fs::File::open(path)
            .map(|i| Box::new(i) as _)
            .map_err(Into::into),
        InputLocation::Listen(port) => {
            let listener = TcpListener::bind(("0.0.0.0", port))?;
            info!("Listening on port {}", port);
            let (sock, addr) = listener.accept()?;
            info!("Accept {}", addr);
            Ok(Box::new(sock))
        }
        InputLocation::Connect(addr) => {
            info!("Connecting to {}", addr);
            let stream = TcpStream::connect(addr)?;
            info!("Got stream!");
            Ok(Box::new(stream))
        }
    }
}

/// Fill `buf` completely from `reader`.
///
/// Returns `Ok(false)` if the stream ended cleanly before the first byte. A stream that ends
/// midway through the buffer is an error.
pub fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;

    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(anyhow!(
                    "stream ended after {} of {} bytes",
                    filled,
                    buf.len()
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(true)
}
