/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

/// Proof that the TLS engine library has been initialized for this process.
///
/// Obtain it once at startup with [`init`] and hand it to whatever builds
/// [`TlsContext`](crate::TlsContext)s.
#[derive(Clone, Copy, Debug)]
pub struct EngineToken {
    _private: (),
}

/// Initialize the TLS engine library.
///
/// Calling it more than once is harmless, every call returns a usable token.
pub fn init() -> EngineToken {
    openssl::init();
    log::debug!("tls engine initialized: {}", openssl::version::version());
    EngineToken { _private: () }
}
