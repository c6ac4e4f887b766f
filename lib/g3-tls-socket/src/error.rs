/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;

use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Configuration,
    Handshake,
    Syscall,
    Engine,
    Usage,
}

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("invalid tls configuration: {0:#}")]
    Configuration(anyhow::Error),
    #[error("tls handshake failed: {0}")]
    Handshake(String),
    #[error("peer certificate verification failed: {0}")]
    CertificateVerify(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("tls engine error: {0}")]
    Engine(String),
    #[error("invalid usage: {0}")]
    Usage(&'static str),
    #[error("previous buffer has not been acknowledged yet")]
    Overproduced,
}

impl TlsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TlsError::Configuration(_) => ErrorKind::Configuration,
            TlsError::Handshake(_) | TlsError::CertificateVerify(_) => ErrorKind::Handshake,
            TlsError::Io(_) => ErrorKind::Syscall,
            TlsError::Engine(_) => ErrorKind::Engine,
            TlsError::Usage(_) | TlsError::Overproduced => ErrorKind::Usage,
        }
    }

    #[inline]
    pub fn is_handshake_error(&self) -> bool {
        self.kind() == ErrorKind::Handshake
    }
}

impl From<TlsError> for io::Error {
    fn from(e: TlsError) -> Self {
        match e {
            TlsError::Io(e) => e,
            TlsError::Usage(_) | TlsError::Overproduced => {
                io::Error::new(io::ErrorKind::InvalidInput, e)
            }
            TlsError::Configuration(_) => io::Error::new(io::ErrorKind::InvalidData, e),
            _ => io::Error::other(e),
        }
    }
}
