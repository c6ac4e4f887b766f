/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io::{self, Read, Write};
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::RawTransport;

/// A tokio stream presented to the engine as a non-blocking transport.
///
/// Each engine call polls the stream once with the waker of the task that
/// last registered itself, and `Poll::Pending` becomes `WouldBlock`.
pub struct IoWrapper<S> {
    io: S,
    waker: Option<Waker>,
}

impl<S> IoWrapper<S> {
    pub(crate) fn new(io: S) -> Self {
        IoWrapper { io, waker: None }
    }

    /// Wake the task behind `cx` once the stream is ready again.
    pub(crate) fn register(&mut self, cx: &Context<'_>) {
        match &mut self.waker {
            Some(waker) => waker.clone_from(cx.waker()),
            None => self.waker = Some(cx.waker().clone()),
        }
    }

    #[inline]
    pub fn get_ref(&self) -> &S {
        &self.io
    }
}

impl<S: Unpin> IoWrapper<S> {
    fn poll_once<T, F>(&mut self, f: F) -> io::Result<T>
    where
        F: FnOnce(Pin<&mut S>, &mut Context<'_>) -> Poll<io::Result<T>>,
    {
        // outside of a poll nobody is waiting for a wakeup
        let waker = self.waker.as_ref().unwrap_or(Waker::noop());
        let mut cx = Context::from_waker(waker);
        match f(Pin::new(&mut self.io), &mut cx) {
            Poll::Ready(r) => r,
            Poll::Pending => Err(io::Error::from(io::ErrorKind::WouldBlock)),
        }
    }
}

impl<S: AsyncWrite + Unpin> IoWrapper<S> {
    pub(crate) fn poll_flush(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    pub(crate) fn poll_shutdown(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}

impl<S: AsyncRead + Unpin> Read for IoWrapper<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.poll_once(|io, cx| {
            let mut buf = ReadBuf::new(buf);
            io.poll_read(cx, &mut buf).map_ok(|_| buf.filled().len())
        })
    }
}

impl<S: AsyncWrite + Unpin> Write for IoWrapper<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.poll_once(|io, cx| io.poll_write(cx, buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.poll_once(|io, cx| io.poll_flush(cx))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> RawTransport for IoWrapper<S> {
    /// Best effort, a shutdown that would block is abandoned.
    fn close(&mut self) -> io::Result<()> {
        match self.poll_once(|io, cx| io.poll_shutdown(cx)) {
            Err(e)
                if e.kind() != io::ErrorKind::WouldBlock
                    && e.kind() != io::ErrorKind::NotConnected =>
            {
                Err(e)
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn pending_is_would_block() {
        let (a, b) = tokio::io::duplex(4);
        let mut io = IoWrapper::new(a);

        let mut buf = [0u8; 8];
        let e = io.read(&mut buf).unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::WouldBlock);

        assert_eq!(io.write(b"abcdef").unwrap(), 4);
        let e = io.write(b"ef").unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::WouldBlock);
        io.flush().unwrap();

        RawTransport::close(&mut io).unwrap();
        drop(b);
    }

    #[tokio::test]
    async fn close_shuts_down_write_side() {
        let (a, mut b) = tokio::io::duplex(64);
        let mut io = IoWrapper::new(a);
        assert_eq!(io.write(b"done").unwrap(), 4);
        RawTransport::close(&mut io).unwrap();

        let mut received = Vec::new();
        b.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"done");
    }
}
