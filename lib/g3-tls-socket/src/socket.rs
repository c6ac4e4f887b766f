/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::mem;
use std::net::IpAddr;
use std::sync::Arc;

use openssl::ssl::{self, ErrorCode, ShutdownResult};
use openssl::x509::X509VerifyResult;

use crate::{IoStatus, RawTransport, TlsContext, TlsError, TlsMode};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HandshakeState {
    NotStarted,
    InProgress,
    Established,
    Failed,
    Closed,
}

enum Session<S: RawTransport> {
    /// No engine session yet, only the raw transport.
    Raw(S),
    Active(ssl::SslStream<S>),
    Released,
}

/// One raw transport plus one engine session.
///
/// The session is created on the first [`connect`](Self::connect) or
/// [`accept`](Self::accept) call, and both the session and the transport are
/// released exactly once, by [`close`](Self::close) or on drop.
pub struct SecureSocket<S: RawTransport> {
    context: Arc<TlsContext>,
    session: Session<S>,
    state: HandshakeState,
    shutdown_sent: bool,
}

impl<S: RawTransport> SecureSocket<S> {
    pub fn new(context: Arc<TlsContext>, transport: S) -> Self {
        SecureSocket {
            context,
            session: Session::Raw(transport),
            state: HandshakeState::NotStarted,
            shutdown_sent: false,
        }
    }

    #[inline]
    pub fn handshake_state(&self) -> HandshakeState {
        self.state
    }

    #[inline]
    pub fn is_established(&self) -> bool {
        self.state == HandshakeState::Established
    }

    #[inline]
    pub fn mode(&self) -> TlsMode {
        self.context.mode()
    }

    #[inline]
    pub fn context(&self) -> &Arc<TlsContext> {
        &self.context
    }

    /// The raw transport, as long as it has not been released.
    pub fn transport_mut(&mut self) -> Option<&mut S> {
        match &mut self.session {
            Session::Raw(io) => Some(io),
            Session::Active(stream) => Some(stream.get_mut()),
            Session::Released => None,
        }
    }

    pub fn selected_alpn_protocol(&self) -> Option<&[u8]> {
        match &self.session {
            Session::Active(stream) if self.state == HandshakeState::Established => {
                stream.ssl().selected_alpn_protocol()
            }
            _ => None,
        }
    }

    /// Start, or continue, the client side handshake.
    ///
    /// Call it again on every readiness notification until it returns
    /// `Progress(0)` or `Fatal`. The server name is only used by the first
    /// call.
    pub fn connect(&mut self, server_name: &str) -> IoStatus {
        if self.context.mode() != TlsMode::Client {
            return IoStatus::Fatal(TlsError::Usage("connect requires a client mode context"));
        }
        if self.state == HandshakeState::NotStarted {
            if let Err(e) = self.start_session(Some(server_name)) {
                return IoStatus::Fatal(e);
            }
        }
        self.handshake()
    }

    /// Start, or continue, the server side handshake.
    pub fn accept(&mut self) -> IoStatus {
        if self.context.mode() != TlsMode::Server {
            return IoStatus::Fatal(TlsError::Usage("accept requires a server mode context"));
        }
        if self.state == HandshakeState::NotStarted {
            if let Err(e) = self.start_session(None) {
                return IoStatus::Fatal(e);
            }
        }
        self.handshake()
    }

    fn start_session(&mut self, server_name: Option<&str>) -> Result<(), TlsError> {
        let Session::Raw(io) = mem::replace(&mut self.session, Session::Released) else {
            self.state = HandshakeState::Closed;
            return Err(TlsError::Usage("raw transport already released"));
        };

        match self.new_session(io, server_name) {
            Ok(stream) => {
                self.session = Session::Active(stream);
                self.state = HandshakeState::InProgress;
                log::debug!("tls {:?} session created", self.context.mode());
                Ok(())
            }
            Err(e) => {
                self.state = HandshakeState::Failed;
                Err(e)
            }
        }
    }

    fn new_session(
        &self,
        mut io: S,
        server_name: Option<&str>,
    ) -> Result<ssl::SslStream<S>, TlsError> {
        let mut ssl = match self.context.new_ssl() {
            Ok(ssl) => ssl,
            Err(e) => {
                close_transport(&mut io);
                return Err(TlsError::Engine(format!("failed to create ssl session: {e}")));
            }
        };

        if let Some(name) = server_name {
            let r = match name.parse::<IpAddr>() {
                Ok(ip) => {
                    if self.context.verify_host() {
                        ssl.param_mut().set_ip(ip)
                    } else {
                        Ok(())
                    }
                }
                Err(_) => {
                    let r = ssl.set_hostname(name);
                    if r.is_ok() && self.context.verify_host() {
                        ssl.param_mut().set_host(name)
                    } else {
                        r
                    }
                }
            };
            if let Err(e) = r {
                close_transport(&mut io);
                return Err(TlsError::Engine(format!(
                    "failed to bind server name {name}: {e}"
                )));
            }
        }

        match self.context.mode() {
            TlsMode::Client => ssl.set_connect_state(),
            TlsMode::Server => ssl.set_accept_state(),
        }

        // the transport is consumed on failure, so it is released there
        ssl::SslStream::new(ssl, io)
            .map_err(|e| TlsError::Engine(format!("failed to bind transport: {e}")))
    }

    /// Drive one handshake step for whichever role was started.
    pub fn handshake(&mut self) -> IoStatus {
        match self.state {
            HandshakeState::NotStarted => {
                return IoStatus::Fatal(TlsError::Usage("handshake has not been started"));
            }
            HandshakeState::Established => return IoStatus::Progress(0),
            // the failure itself has already been reported once
            HandshakeState::Failed | HandshakeState::Closed => return IoStatus::Closed,
            HandshakeState::InProgress => {}
        }

        let Session::Active(stream) = &mut self.session else {
            self.state = HandshakeState::Closed;
            return IoStatus::Closed;
        };

        match stream.do_handshake() {
            Ok(_) => {
                self.state = HandshakeState::Established;
                log::debug!(
                    "tls {:?} handshake established with {}",
                    self.context.mode(),
                    stream.ssl().version_str()
                );
                IoStatus::Progress(0)
            }
            Err(e) => match e.code() {
                ErrorCode::WANT_READ | ErrorCode::WANT_WRITE => IoStatus::WouldBlock,
                _ => {
                    let verify_result = stream.ssl().verify_result();
                    let err = if self.context.verify_peer()
                        && verify_result != X509VerifyResult::OK
                    {
                        TlsError::CertificateVerify(verify_result.error_string().to_string())
                    } else {
                        match e.into_io_error() {
                            Ok(io_err) => TlsError::Io(io_err),
                            Err(e) => TlsError::Handshake(e.to_string()),
                        }
                    };
                    log::debug!("tls {:?} handshake failed: {err}", self.context.mode());
                    self.release();
                    self.state = HandshakeState::Failed;
                    IoStatus::Fatal(err)
                }
            },
        }
    }

    fn ready_for_io(&mut self) -> Result<(), IoStatus> {
        match self.state {
            HandshakeState::Established => Ok(()),
            HandshakeState::InProgress => match self.handshake() {
                IoStatus::Progress(_) => Ok(()),
                status => Err(status),
            },
            HandshakeState::NotStarted => Err(IoStatus::Fatal(TlsError::Usage(
                "connect or accept must be called first",
            ))),
            HandshakeState::Failed | HandshakeState::Closed => Err(IoStatus::Closed),
        }
    }

    /// Decrypt at most `buf.len()` bytes into `buf`.
    pub fn read(&mut self, buf: &mut [u8]) -> IoStatus {
        if let Err(status) = self.ready_for_io() {
            return status;
        }
        if buf.is_empty() {
            return IoStatus::Progress(0);
        }
        let Session::Active(stream) = &mut self.session else {
            return IoStatus::Closed;
        };

        match stream.ssl_read(buf) {
            Ok(0) => IoStatus::Closed,
            Ok(n) => IoStatus::Progress(n),
            Err(e) => classify_io_error(e),
        }
    }

    /// Encrypt and send as much of `buf` as the engine takes in one go.
    ///
    /// A short `Progress(n)` is normal, the caller must retry with `&buf[n..]`.
    /// After a `WouldBlock` the retry must pass the same unsent bytes again.
    pub fn write(&mut self, buf: &[u8]) -> IoStatus {
        if let Err(status) = self.ready_for_io() {
            return status;
        }
        if buf.is_empty() {
            return IoStatus::Progress(0);
        }
        let Session::Active(stream) = &mut self.session else {
            return IoStatus::Closed;
        };

        match stream.ssl_write(buf) {
            Ok(n) => IoStatus::Progress(n),
            Err(e) => classify_io_error(e),
        }
    }

    /// Send the close_notify alert without releasing anything.
    pub fn shutdown(&mut self) -> IoStatus {
        if self.state != HandshakeState::Established {
            return IoStatus::Closed;
        }
        if self.shutdown_sent {
            return IoStatus::Progress(0);
        }
        let Session::Active(stream) = &mut self.session else {
            return IoStatus::Closed;
        };

        match stream.shutdown() {
            Ok(ShutdownResult::Sent) | Ok(ShutdownResult::Received) => {
                self.shutdown_sent = true;
                IoStatus::Progress(0)
            }
            Err(e) => match e.code() {
                ErrorCode::ZERO_RETURN => {
                    self.shutdown_sent = true;
                    IoStatus::Progress(0)
                }
                ErrorCode::WANT_READ | ErrorCode::WANT_WRITE => IoStatus::WouldBlock,
                _ => classify_io_error(e),
            },
        }
    }

    /// Shut the session down and release both the session and the transport.
    ///
    /// Safe to call in any state, calls after the first one do nothing.
    pub fn close(&mut self) {
        if matches!(self.session, Session::Released) {
            self.state = HandshakeState::Closed;
            return;
        }

        if let Session::Active(stream) = &mut self.session {
            if !self.shutdown_sent {
                match stream.shutdown() {
                    Ok(_) => {}
                    Err(e) => match e.code() {
                        ErrorCode::WANT_READ | ErrorCode::WANT_WRITE | ErrorCode::ZERO_RETURN => {}
                        _ => log::warn!("tls close_notify not sent: {e}"),
                    },
                }
                self.shutdown_sent = true;
            }
        }
        self.release();
        self.state = HandshakeState::Closed;
        log::debug!("tls {:?} socket closed", self.context.mode());
    }

    fn release(&mut self) {
        match mem::replace(&mut self.session, Session::Released) {
            Session::Raw(mut io) => close_transport(&mut io),
            Session::Active(mut stream) => close_transport(stream.get_mut()),
            Session::Released => {}
        }
    }
}

impl<S: RawTransport> Drop for SecureSocket<S> {
    fn drop(&mut self) {
        self.close();
    }
}

fn close_transport<S: RawTransport>(io: &mut S) {
    if let Err(e) = io.close() {
        log::warn!("failed to close raw transport: {e}");
    }
}

fn classify_io_error(e: ssl::Error) -> IoStatus {
    match e.code() {
        ErrorCode::WANT_READ | ErrorCode::WANT_WRITE => IoStatus::WouldBlock,
        ErrorCode::ZERO_RETURN => IoStatus::Closed,
        ErrorCode::SYSCALL => match e.into_io_error() {
            Ok(io_err) => IoStatus::Fatal(TlsError::Io(io_err)),
            // eof without close_notify
            Err(_) => IoStatus::Closed,
        },
        _ => match e.into_io_error() {
            Ok(io_err) => IoStatus::Fatal(TlsError::Io(io_err)),
            Err(e) => IoStatus::Fatal(TlsError::Engine(e.to_string())),
        },
    }
}
