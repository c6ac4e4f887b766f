/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::future;
use std::io;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite};

use super::{IoWrapper, TlsStream, handshake_poll};
use crate::{SecureSocket, TlsContext};

/// Client side handshake driver for a tokio stream.
///
/// No timeout is applied here, wrap [`connect`](Self::connect) in
/// `tokio::time::timeout` if needed.
pub struct TlsConnector<S: AsyncRead + AsyncWrite + Unpin> {
    socket: SecureSocket<IoWrapper<S>>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> TlsConnector<S> {
    pub fn new(context: Arc<TlsContext>, stream: S) -> Self {
        TlsConnector {
            socket: SecureSocket::new(context, IoWrapper::new(stream)),
        }
    }

    pub fn poll_connect(&mut self, cx: &mut Context<'_>, server_name: &str) -> Poll<io::Result<()>> {
        if let Some(io) = self.socket.transport_mut() {
            io.register(cx);
        }

        let status = self.socket.connect(server_name);
        handshake_poll(status)
    }

    pub async fn connect(mut self, server_name: &str) -> io::Result<TlsStream<S>> {
        future::poll_fn(|cx| self.poll_connect(cx, server_name)).await?;
        Ok(TlsStream::new(self.socket))
    }
}
