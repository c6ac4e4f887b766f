/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::cell::RefCell;
use std::rc::Rc;

use crate::{RawTransport, SecureSocket};

mod source;
pub use source::{SourceEvent, TlsSource};

mod sink;
pub use sink::{SinkEvent, TlsSink};

pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Notifications received while the other side is not ready, before the
/// subscription gets suspended.
const MAX_EXCESS_SIGNAL_COUNT: usize = 2;

/// A socket shared by the source and the sink of one connection.
///
/// Both live on the same event loop thread, so no locking is involved.
pub type SharedSocket<S> = Rc<RefCell<SecureSocket<S>>>;

/// Readiness subscription handed out by the host event loop.
pub trait Readiness {
    /// Stop delivering notifications until [`resume`](Self::resume).
    fn suspend(&mut self);
    fn resume(&mut self);
    /// Drop the subscription for good.
    fn cancel(&mut self);
}

/// Build the read and write adapters for one socket.
pub fn tls_stream<S, RR, WR>(
    socket: SecureSocket<S>,
    read_readiness: RR,
    write_readiness: WR,
    buffer_size: usize,
) -> (TlsSource<S, RR>, TlsSink<S, WR>)
where
    S: RawTransport,
    RR: Readiness,
    WR: Readiness,
{
    let socket = Rc::new(RefCell::new(socket));
    let source = TlsSource::new(socket.clone(), read_readiness, buffer_size);
    let sink = TlsSink::new(socket, write_readiness);
    (source, sink)
}
