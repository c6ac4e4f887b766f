/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::task::Poll;

use crate::{IoStatus, TlsError};

mod wrapper;
pub use wrapper::IoWrapper;

mod connect;
pub use connect::TlsConnector;

mod accept;
pub use accept::TlsAcceptor;

mod stream;
pub use stream::TlsStream;

fn handshake_poll(status: IoStatus) -> Poll<io::Result<()>> {
    match status {
        IoStatus::Progress(_) => Poll::Ready(Ok(())),
        IoStatus::WouldBlock => Poll::Pending,
        IoStatus::Closed => Poll::Ready(Err(TlsError::Handshake(
            "connection closed during handshake".to_string(),
        )
        .into())),
        IoStatus::Fatal(e) => Poll::Ready(Err(e.into())),
    }
}
