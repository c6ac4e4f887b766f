/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

/// The raw byte stream a [`SecureSocket`](crate::SecureSocket) is layered on.
///
/// Non-blocking transports must report `io::ErrorKind::WouldBlock` when no
/// progress can be made.
pub trait RawTransport: Read + Write {
    /// Release the transport. Called once after the tls session has been shut
    /// down, the transport itself is dropped right after.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn ignore_not_connected(r: io::Result<()>) -> io::Result<()> {
    match r {
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        r => r,
    }
}

impl RawTransport for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        ignore_not_connected(self.shutdown(Shutdown::Both))
    }
}

#[cfg(unix)]
impl RawTransport for std::os::unix::net::UnixStream {
    fn close(&mut self) -> io::Result<()> {
        ignore_not_connected(self.shutdown(Shutdown::Both))
    }
}
