/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use crate::TlsError;

/// Outcome of a single handshake, read or write attempt.
#[derive(Debug)]
pub enum IoStatus {
    /// The attempt moved forward. For reads and writes this is the number of
    /// plaintext bytes, which may be less than requested. A completed
    /// handshake step reports `Progress(0)`.
    Progress(usize),
    /// Nothing can be done until the next readiness notification.
    WouldBlock,
    /// The peer closed the session gracefully, or the socket has been closed.
    Closed,
    Fatal(TlsError),
}

impl IoStatus {
    #[inline]
    pub fn is_would_block(&self) -> bool {
        matches!(self, IoStatus::WouldBlock)
    }

    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, IoStatus::Fatal(_))
    }

    pub fn progress(&self) -> Option<usize> {
        match self {
            IoStatus::Progress(n) => Some(*n),
            _ => None,
        }
    }
}
