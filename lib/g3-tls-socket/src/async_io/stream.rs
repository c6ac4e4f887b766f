/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::IoWrapper;
use crate::{IoStatus, SecureSocket};

/// An established tls session over a tokio stream.
pub struct TlsStream<S: AsyncRead + AsyncWrite + Unpin> {
    socket: SecureSocket<IoWrapper<S>>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> TlsStream<S> {
    pub(super) fn new(socket: SecureSocket<IoWrapper<S>>) -> Self {
        TlsStream { socket }
    }

    #[inline]
    pub fn socket(&self) -> &SecureSocket<IoWrapper<S>> {
        &self.socket
    }

    pub fn selected_alpn_protocol(&self) -> Option<&[u8]> {
        self.socket.selected_alpn_protocol()
    }

    fn with_context<F, R>(&mut self, cx: &mut Context<'_>, f: F) -> R
    where
        F: FnOnce(&mut SecureSocket<IoWrapper<S>>) -> R,
    {
        if let Some(io) = self.socket.transport_mut() {
            io.register(cx);
        }
        f(&mut self.socket)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for TlsStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let status = this.with_context(cx, |s| s.read(buf.initialize_unfilled()));
        match status {
            IoStatus::Progress(n) => {
                buf.advance(n);
                Poll::Ready(Ok(()))
            }
            IoStatus::WouldBlock => Poll::Pending,
            IoStatus::Closed => Poll::Ready(Ok(())),
            IoStatus::Fatal(e) => Poll::Ready(Err(e.into())),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for TlsStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let status = this.with_context(cx, |s| s.write(buf));
        match status {
            IoStatus::Progress(n) => Poll::Ready(Ok(n)),
            IoStatus::WouldBlock => Poll::Pending,
            IoStatus::Closed => Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe))),
            IoStatus::Fatal(e) => Poll::Ready(Err(e.into())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.socket.transport_mut() {
            Some(io) => io.poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let status = this.with_context(cx, |s| s.shutdown());
        match status {
            IoStatus::WouldBlock => return Poll::Pending,
            IoStatus::Fatal(e) => return Poll::Ready(Err(e.into())),
            IoStatus::Progress(_) | IoStatus::Closed => {}
        }

        match this.socket.transport_mut() {
            Some(io) => io.poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}
