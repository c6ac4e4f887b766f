/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::future::poll_fn;
use std::io;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite};

use super::{IoWrapper, TlsStream, handshake_poll};
use crate::{SecureSocket, TlsContext};

/// Server side handshake driver for a tokio stream.
pub struct TlsAcceptor<S: AsyncRead + AsyncWrite + Unpin> {
    socket: SecureSocket<IoWrapper<S>>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> TlsAcceptor<S> {
    pub fn new(context: Arc<TlsContext>, stream: S) -> Self {
        TlsAcceptor {
            socket: SecureSocket::new(context, IoWrapper::new(stream)),
        }
    }

    pub fn poll_accept(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if let Some(io) = self.socket.transport_mut() {
            io.register(cx);
        }

        let status = self.socket.accept();
        handshake_poll(status)
    }

    pub async fn accept(mut self) -> io::Result<TlsStream<S>> {
        poll_fn(|cx| self.poll_accept(cx)).await?;
        Ok(TlsStream::new(self.socket))
    }
}
