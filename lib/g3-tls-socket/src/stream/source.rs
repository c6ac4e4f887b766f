/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use super::{MAX_EXCESS_SIGNAL_COUNT, Readiness, SharedSocket};
use crate::{IoStatus, RawTransport, TlsError};

/// What a readable notification produced.
#[derive(Debug)]
pub enum SourceEvent<'a> {
    /// A handshake step was driven, no application data this time.
    Handshaking,
    Idle,
    /// Decrypted bytes, valid until the next call on the source.
    Data(&'a [u8]),
    /// The peer closed the session. Reported once.
    End,
    /// The stream failed. Reported once.
    Error(TlsError),
}

/// Read side adapter: readable notifications in, decrypted bytes out.
///
/// Only one delivery is outstanding at any time. After a `Data` event no
/// further read is attempted until [`acknowledge`](Self::acknowledge) is
/// called.
pub struct TlsSource<S: RawTransport, R: Readiness> {
    socket: SharedSocket<S>,
    readiness: R,
    buffer: Box<[u8]>,
    downstream_ready: bool,
    suspended: bool,
    excess_signals: usize,
    closed: bool,
}

impl<S: RawTransport, R: Readiness> TlsSource<S, R> {
    pub fn new(socket: SharedSocket<S>, readiness: R, buffer_size: usize) -> Self {
        let mut source = TlsSource {
            socket,
            readiness,
            buffer: vec![0u8; buffer_size.max(1)].into_boxed_slice(),
            downstream_ready: true,
            suspended: true,
            excess_signals: 0,
            closed: false,
        };
        source.resume_if_suspended();
        source
    }

    #[inline]
    pub fn socket(&self) -> &SharedSocket<S> {
        &self.socket
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Handle one readable notification.
    pub fn on_readable(&mut self) -> SourceEvent<'_> {
        if self.closed {
            return SourceEvent::Idle;
        }

        if !self.socket.borrow().is_established() {
            let status = self.socket.borrow_mut().handshake();
            return match status {
                IoStatus::Progress(_) | IoStatus::WouldBlock => SourceEvent::Handshaking,
                IoStatus::Closed => {
                    self.close();
                    SourceEvent::End
                }
                IoStatus::Fatal(e) => {
                    self.close();
                    SourceEvent::Error(e)
                }
            };
        }

        if !self.downstream_ready {
            self.excess_signals = self.excess_signals.saturating_add(1);
            if self.excess_signals >= MAX_EXCESS_SIGNAL_COUNT && !self.suspended {
                log::trace!("tls source suspended, downstream not ready");
                self.readiness.suspend();
                self.suspended = true;
            }
            return SourceEvent::Idle;
        }
        self.excess_signals = 0;

        let status = self.socket.borrow_mut().read(&mut self.buffer);
        match status {
            IoStatus::Progress(0) => SourceEvent::Idle,
            IoStatus::Progress(n) => {
                self.downstream_ready = false;
                SourceEvent::Data(&self.buffer[..n])
            }
            IoStatus::WouldBlock => {
                self.resume_if_suspended();
                SourceEvent::Idle
            }
            IoStatus::Closed => {
                self.close();
                SourceEvent::End
            }
            IoStatus::Fatal(e) => {
                self.close();
                SourceEvent::Error(e)
            }
        }
    }

    /// Downstream is done with the last delivery and wants more.
    pub fn acknowledge(&mut self) {
        if self.closed {
            return;
        }
        self.downstream_ready = true;
        self.excess_signals = 0;
        self.resume_if_suspended();
    }

    /// Cancel the read subscription and close the socket.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.readiness.cancel();
        self.socket.borrow_mut().close();
        log::debug!("tls source closed");
    }

    fn resume_if_suspended(&mut self) {
        if !self.suspended {
            return;
        }
        self.suspended = false;
        self.readiness.resume();
    }
}
