/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! Non-blocking TLS on top of an event driven byte transport.
//!
//! [`SecureSocket`] owns one raw transport and one OpenSSL session and reports
//! every handshake / read / write attempt as an [`IoStatus`]. [`TlsSource`] and
//! [`TlsSink`] turn readiness notifications into a push stream of decrypted
//! bytes and fully flushed writes, while [`TlsConnector`], [`TlsAcceptor`] and
//! [`TlsStream`] bind the same socket to tokio.

mod engine;
pub use engine::{EngineToken, init};

mod error;
pub use error::{ErrorKind, TlsError};

mod status;
pub use status::IoStatus;

mod context;
pub use context::{
    CertificateSignature, CertificateSpec, CipherPolicy, TlsContext, TlsContextBuilder, TlsMode,
};

mod transport;
pub use transport::RawTransport;

mod socket;
pub use socket::{HandshakeState, SecureSocket};

mod stream;
pub use stream::{
    DEFAULT_BUFFER_SIZE, Readiness, SharedSocket, SinkEvent, SourceEvent, TlsSink, TlsSource,
    tls_stream,
};

mod async_io;
pub use async_io::{IoWrapper, TlsAcceptor, TlsConnector, TlsStream};

#[cfg(feature = "yaml")]
pub mod config;
