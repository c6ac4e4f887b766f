/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use bytes::{Buf, Bytes};

use super::{MAX_EXCESS_SIGNAL_COUNT, Readiness, SharedSocket};
use crate::{IoStatus, RawTransport, TlsError};

/// What a writable notification produced.
#[derive(Debug)]
pub enum SinkEvent {
    Handshaking,
    Idle,
    /// `n` bytes written, the rest of the buffer is kept for the next
    /// notification.
    Progress(usize),
    /// The last `n` bytes of the buffer were written and the buffer is
    /// acknowledged, a new one may be submitted.
    Flushed(usize),
    /// The socket was closed, reported once.
    Closed,
    /// The stream failed, reported once.
    Error(TlsError),
}

/// Write side adapter: buffers in, fully flushed writes out.
pub struct TlsSink<S: RawTransport, R: Readiness> {
    socket: SharedSocket<S>,
    readiness: R,
    pending: Option<Bytes>,
    suspended: bool,
    excess_signals: usize,
    closed: bool,
}

impl<S: RawTransport, R: Readiness> TlsSink<S, R> {
    /// The write subscription stays suspended until the first submission.
    pub fn new(socket: SharedSocket<S>, readiness: R) -> Self {
        TlsSink {
            socket,
            readiness,
            pending: None,
            suspended: true,
            excess_signals: 0,
            closed: false,
        }
    }

    #[inline]
    pub fn socket(&self) -> &SharedSocket<S> {
        &self.socket
    }

    /// Whether a new buffer may be submitted.
    #[inline]
    pub fn is_ready(&self) -> bool {
        !self.closed && self.pending.is_none()
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Bytes of the current buffer not written yet.
    pub fn remaining(&self) -> usize {
        self.pending.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    /// Queue one buffer. The previous one must have been flushed.
    pub fn submit(&mut self, buf: Bytes) -> Result<(), TlsError> {
        if self.closed {
            return Err(TlsError::Usage("sink already closed"));
        }
        if self.pending.is_some() {
            return Err(TlsError::Overproduced);
        }
        self.pending = Some(buf);
        self.resume_if_suspended();
        Ok(())
    }

    /// Handle one writable notification.
    pub fn on_writable(&mut self) -> SinkEvent {
        if self.closed {
            return SinkEvent::Idle;
        }

        if !self.socket.borrow().is_established() {
            let status = self.socket.borrow_mut().handshake();
            return match status {
                IoStatus::Progress(_) | IoStatus::WouldBlock => SinkEvent::Handshaking,
                IoStatus::Closed => {
                    self.close();
                    SinkEvent::Closed
                }
                IoStatus::Fatal(e) => {
                    self.close();
                    SinkEvent::Error(e)
                }
            };
        }

        let Some(buf) = self.pending.as_mut() else {
            self.excess_signals = self.excess_signals.saturating_add(1);
            if self.excess_signals >= MAX_EXCESS_SIGNAL_COUNT && !self.suspended {
                log::trace!("tls sink suspended, nothing to write");
                self.readiness.suspend();
                self.suspended = true;
            }
            return SinkEvent::Idle;
        };
        self.excess_signals = 0;

        let status = self.socket.borrow_mut().write(buf);
        match status {
            IoStatus::Progress(n) => {
                buf.advance(n);
                if buf.is_empty() {
                    self.pending = None;
                    SinkEvent::Flushed(n)
                } else {
                    SinkEvent::Progress(n)
                }
            }
            IoStatus::WouldBlock => {
                self.resume_if_suspended();
                SinkEvent::Idle
            }
            IoStatus::Closed => {
                self.close();
                SinkEvent::Closed
            }
            IoStatus::Fatal(e) => {
                self.close();
                SinkEvent::Error(e)
            }
        }
    }

    /// Cancel the write subscription and close the socket. A buffer that has
    /// not been flushed yet is dropped.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(buf) = self.pending.take() {
            log::debug!("tls sink closed with {} bytes unsent", buf.len());
        }
        self.readiness.cancel();
        self.socket.borrow_mut().close();
        log::debug!("tls sink closed");
    }

    fn resume_if_suspended(&mut self) {
        if !self.suspended {
            return;
        }
        self.suspended = false;
        self.readiness.resume();
    }
}
