/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;

use anyhow::anyhow;
use openssl::error::ErrorStack;
use openssl::ssl::{
    AlpnError, Ssl, SslContext, SslContextBuilder, SslMethod, SslMode, SslOptions, SslVerifyMode,
};

use crate::{EngineToken, TlsError};

mod cert;
pub use cert::{CertificateSignature, CertificateSpec};

mod cipher;
pub use cipher::CipherPolicy;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TlsMode {
    Client,
    Server,
}

/// Long lived engine configuration shared by every socket created from it.
#[derive(Clone)]
pub struct TlsContext {
    mode: TlsMode,
    verify_host: bool,
    verify_certificates: bool,
    verify_peer: bool,
    ssl_context: SslContext,
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("mode", &self.mode)
            .field("verify_host", &self.verify_host)
            .field("verify_certificates", &self.verify_certificates)
            .finish()
    }
}

impl TlsContext {
    pub fn create(
        token: &EngineToken,
        mode: TlsMode,
        certificates: CertificateSpec,
        verify_host: bool,
        verify_certificates: bool,
        cipher_policy: Option<CipherPolicy>,
    ) -> Result<Self, TlsError> {
        let mut builder = TlsContextBuilder::new(mode);
        builder.set_certificates(certificates);
        builder.set_verify_host(verify_host);
        builder.set_verify_certificates(verify_certificates);
        if let Some(policy) = cipher_policy {
            builder.set_cipher_policy(policy);
        }
        builder.build(token)
    }

    #[inline]
    pub fn mode(&self) -> TlsMode {
        self.mode
    }

    #[inline]
    pub fn verify_host(&self) -> bool {
        self.verify_host
    }

    #[inline]
    pub fn verify_certificates(&self) -> bool {
        self.verify_certificates
    }

    /// Whether the peer certificate chain is actually checked.
    #[inline]
    pub(crate) fn verify_peer(&self) -> bool {
        self.verify_peer
    }

    pub(crate) fn new_ssl(&self) -> Result<Ssl, ErrorStack> {
        Ssl::new(&self.ssl_context)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TlsContextBuilder {
    mode: TlsMode,
    certificates: CertificateSpec,
    verify_host: bool,
    verify_certificates: bool,
    cipher_policy: Option<CipherPolicy>,
    verify_depth: Option<u32>,
    alpn_protocols: Vec<String>,
}

impl TlsContextBuilder {
    pub fn new(mode: TlsMode) -> Self {
        TlsContextBuilder {
            mode,
            certificates: CertificateSpec::None,
            verify_host: true,
            verify_certificates: true,
            cipher_policy: None,
            verify_depth: None,
            alpn_protocols: Vec::new(),
        }
    }

    #[inline]
    pub fn mode(&self) -> TlsMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: TlsMode) {
        self.mode = mode;
    }

    pub fn set_certificates(&mut self, certificates: CertificateSpec) {
        self.certificates = certificates;
    }

    #[inline]
    pub fn certificates(&self) -> &CertificateSpec {
        &self.certificates
    }

    pub fn set_verify_host(&mut self, verify: bool) {
        self.verify_host = verify;
    }

    pub fn set_verify_certificates(&mut self, verify: bool) {
        self.verify_certificates = verify;
    }

    pub fn set_cipher_policy(&mut self, policy: CipherPolicy) {
        self.cipher_policy = Some(policy);
    }

    pub fn set_verify_depth(&mut self, depth: u32) {
        self.verify_depth = Some(depth);
    }

    pub fn set_alpn_protocols(&mut self, protocols: Vec<String>) {
        self.alpn_protocols = protocols;
    }

    pub fn check(&self) -> anyhow::Result<()> {
        self.certificates.check(self.mode)?;

        for p in &self.alpn_protocols {
            if p.is_empty() || p.len() > 255 {
                return Err(anyhow!("invalid alpn protocol length for {p:?}"));
            }
        }

        if let Some(depth) = self.verify_depth {
            if depth > i32::MAX as u32 {
                return Err(anyhow!("verify depth {depth} is too large"));
            }
        }

        Ok(())
    }

    #[inline]
    fn verify_peer(&self) -> bool {
        self.verify_certificates && !self.certificates.is_self_signed()
    }

    fn alpn_wire_sequence(&self) -> Vec<u8> {
        let len = self.alpn_protocols.iter().map(|p| p.len() + 1).sum();
        let mut buf = Vec::with_capacity(len);
        for p in &self.alpn_protocols {
            buf.push(p.len() as u8);
            buf.extend_from_slice(p.as_bytes());
        }
        buf
    }

    fn new_ssl_builder(&self) -> anyhow::Result<SslContextBuilder> {
        let method = match self.mode {
            TlsMode::Client => SslMethod::tls_client(),
            TlsMode::Server => SslMethod::tls_server(),
        };
        let mut ctx_builder = SslContext::builder(method)
            .map_err(|e| anyhow!("failed to create ssl context builder: {e}"))?;

        // writes may be partial and may be retried from a moved buffer
        ctx_builder.set_mode(
            SslMode::AUTO_RETRY | SslMode::ACCEPT_MOVING_WRITE_BUFFER | SslMode::ENABLE_PARTIAL_WRITE,
        );

        let mut options = SslOptions::NO_COMPRESSION;
        if self.mode == TlsMode::Server {
            options |= SslOptions::NO_SSLV3;
        }
        #[cfg(ossl300)]
        {
            options |= SslOptions::IGNORE_UNEXPECTED_EOF;
        }
        ctx_builder.set_options(options);

        Ok(ctx_builder)
    }

    fn build_ssl_context(&self) -> anyhow::Result<SslContext> {
        self.check()?;

        let mut ctx_builder = self.new_ssl_builder()?;

        self.certificates
            .install_certificate(&mut ctx_builder, self.mode)?;

        let verify_peer = self.verify_peer();
        self.certificates
            .install_trust_anchor(&mut ctx_builder, verify_peer)?;
        if verify_peer {
            ctx_builder.set_verify(SslVerifyMode::PEER);
        } else {
            if self.verify_certificates {
                log::debug!("self-signed certificates in use, peer verification is relaxed");
            }
            ctx_builder.set_verify(SslVerifyMode::NONE);
        }
        if let Some(depth) = self.verify_depth {
            ctx_builder.set_verify_depth(depth);
        }

        if let Some(policy) = &self.cipher_policy {
            let cipher_list = policy.to_string();
            ctx_builder
                .set_cipher_list(&cipher_list)
                .map_err(|e| anyhow!("cipher policy {cipher_list} rejected: {e}"))?;
        }

        if !self.alpn_protocols.is_empty() {
            let wire = self.alpn_wire_sequence();
            match self.mode {
                TlsMode::Client => {
                    ctx_builder
                        .set_alpn_protos(&wire)
                        .map_err(|e| anyhow!("failed to set alpn protocols: {e}"))?;
                }
                TlsMode::Server => {
                    ctx_builder.set_alpn_select_callback(move |_ssl, client| {
                        select_alpn_protocol(&wire, client).ok_or(AlpnError::NOACK)
                    });
                }
            }
        }

        Ok(ctx_builder.build())
    }

    pub fn build(&self, _token: &EngineToken) -> Result<TlsContext, TlsError> {
        let ssl_context = self.build_ssl_context().map_err(TlsError::Configuration)?;
        Ok(TlsContext {
            mode: self.mode,
            verify_host: self.verify_host,
            verify_certificates: self.verify_certificates,
            verify_peer: self.verify_peer(),
            ssl_context,
        })
    }
}

/// Walk a length prefixed ALPN protocol list. Stops at the first malformed
/// entry.
fn alpn_protocols(wire: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut left = wire;
    std::iter::from_fn(move || {
        let (&len, rest) = left.split_first()?;
        let len = usize::from(len);
        if len == 0 || rest.len() < len {
            left = &[];
            return None;
        }
        let (protocol, rest) = rest.split_at(len);
        left = rest;
        Some(protocol)
    })
}

/// Pick the first protocol in the server preference list that the client
/// also offers. The returned slice points into `client`.
fn select_alpn_protocol<'a>(server: &[u8], client: &'a [u8]) -> Option<&'a [u8]> {
    alpn_protocols(server)
        .find_map(|wanted| alpn_protocols(client).find(|offered| *offered == wanted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::path::PathBuf;

    #[test]
    fn client_default() {
        let token = crate::init();
        let ctx = TlsContext::create(
            &token,
            TlsMode::Client,
            CertificateSpec::None,
            true,
            false,
            None,
        )
        .unwrap();
        assert_eq!(ctx.mode(), TlsMode::Client);
        assert!(ctx.verify_host());
        assert!(!ctx.verify_certificates());
    }

    #[test]
    fn rejected_cipher_policy() {
        let token = crate::init();
        let e = TlsContext::create(
            &token,
            TlsMode::Client,
            CertificateSpec::None,
            false,
            false,
            Some(CipherPolicy::Custom("NO-SUCH-CIPHER".to_string())),
        )
        .unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn accepted_cipher_policy() {
        let token = crate::init();
        let policy = CipherPolicy::List(vec![
            CipherPolicy::Default,
            CipherPolicy::not(CipherPolicy::Custom("aNULL".to_string())),
        ]);
        assert!(
            TlsContext::create(
                &token,
                TlsMode::Client,
                CertificateSpec::None,
                false,
                false,
                Some(policy)
            )
            .is_ok()
        );
    }

    #[test]
    fn unreadable_certificate_file() {
        let token = crate::init();
        let spec = CertificateSpec::Files {
            certificate: PathBuf::from("/nonexistent/g3-tls-socket/cert.pem"),
            private_key: PathBuf::from("/nonexistent/g3-tls-socket/key.pem"),
            signature: CertificateSignature::SelfSigned,
        };
        let e = TlsContext::create(&token, TlsMode::Server, spec, false, false, None).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn unreadable_trust_anchor() {
        let token = crate::init();
        let spec = CertificateSpec::Authority {
            signature: CertificateSignature::SignedByFile(PathBuf::from(
                "/nonexistent/g3-tls-socket/ca.pem",
            )),
        };
        let e = TlsContext::create(&token, TlsMode::Client, spec, true, true, None).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Configuration);

        let spec = CertificateSpec::Authority {
            signature: CertificateSignature::SignedByBytes(b"not a pem".to_vec()),
        };
        let e = TlsContext::create(&token, TlsMode::Client, spec, true, true, None).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn invalid_alpn() {
        let mut builder = TlsContextBuilder::new(TlsMode::Client);
        builder.set_alpn_protocols(vec!["h2".to_string(), String::new()]);
        assert!(builder.check().is_err());

        builder.set_alpn_protocols(vec!["h2".to_string(), "http/1.1".to_string()]);
        assert!(builder.check().is_ok());
        assert_eq!(builder.alpn_wire_sequence(), b"\x02h2\x08http/1.1");
    }

    #[test]
    fn alpn_selection() {
        let server = b"\x02h2\x08http/1.1";

        let client = b"\x08http/1.1\x02h2";
        let selected = select_alpn_protocol(server, client).unwrap();
        assert_eq!(selected, b"h2");
        // borrowed from the client list
        assert_eq!(selected.as_ptr(), client[10..].as_ptr());

        assert_eq!(
            select_alpn_protocol(server, b"\x06spdy/3\x08http/1.1"),
            Some(&b"http/1.1"[..])
        );
        assert_eq!(select_alpn_protocol(server, b"\x06spdy/3"), None);
        assert_eq!(select_alpn_protocol(server, b""), None);
        // truncated client entry
        assert_eq!(select_alpn_protocol(server, b"\x08http/1"), None);
        assert_eq!(select_alpn_protocol(server, b"\x00\x02h2"), None);
    }
}
