/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use openssl::pkey::PKey;
use openssl::ssl::{SslContextBuilder, SslFiletype};
use openssl::x509::X509;
use openssl::x509::store::{X509Lookup, X509StoreBuilder};

use super::TlsMode;

/// Where the trust anchor for the certificate material comes from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CertificateSignature {
    /// Not chained to an external authority. Peer verification is relaxed.
    SelfSigned,
    SignedByFile(PathBuf),
    /// A hashed certificate directory, as prepared by `openssl rehash`.
    SignedByDirectory(PathBuf),
    /// PEM encoded authority certificates held in memory.
    SignedByBytes(Vec<u8>),
}

impl CertificateSignature {
    #[inline]
    pub fn is_self_signed(&self) -> bool {
        matches!(self, CertificateSignature::SelfSigned)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum CertificateSpec {
    #[default]
    None,
    Files {
        certificate: PathBuf,
        private_key: PathBuf,
        signature: CertificateSignature,
    },
    /// A PEM file holding the certificate chain, and optionally the private key.
    Chain {
        chain: PathBuf,
        signature: CertificateSignature,
    },
    Authority {
        signature: CertificateSignature,
    },
    Bytes {
        certificate: Vec<u8>,
        private_key: Vec<u8>,
        signature: CertificateSignature,
    },
}

impl CertificateSpec {
    pub fn signature(&self) -> Option<&CertificateSignature> {
        match self {
            CertificateSpec::None => None,
            CertificateSpec::Files { signature, .. }
            | CertificateSpec::Chain { signature, .. }
            | CertificateSpec::Authority { signature }
            | CertificateSpec::Bytes { signature, .. } => Some(signature),
        }
    }

    pub fn is_self_signed(&self) -> bool {
        self.signature()
            .map(|s| s.is_self_signed())
            .unwrap_or(false)
    }

    fn has_local_certificate(&self) -> bool {
        matches!(
            self,
            CertificateSpec::Files { .. } | CertificateSpec::Chain { .. } | CertificateSpec::Bytes { .. }
        )
    }

    pub(super) fn check(&self, mode: TlsMode) -> anyhow::Result<()> {
        if mode == TlsMode::Server && !self.has_local_certificate() {
            return Err(anyhow!("server mode requires a certificate and private key"));
        }
        match self {
            CertificateSpec::Bytes {
                certificate,
                private_key,
                ..
            } => {
                if certificate.is_empty() {
                    return Err(anyhow!("empty certificate bytes"));
                }
                if private_key.is_empty() {
                    return Err(anyhow!("empty private key bytes"));
                }
            }
            CertificateSpec::Authority {
                signature: CertificateSignature::SelfSigned,
            } => {
                return Err(anyhow!(
                    "a certificate authority spec needs a non self-signed signature"
                ));
            }
            _ => {}
        }
        Ok(())
    }

    /// Install the local certificate material. Must run before any trust
    /// anchor is configured.
    pub(super) fn install_certificate(
        &self,
        builder: &mut SslContextBuilder,
        mode: TlsMode,
    ) -> anyhow::Result<()> {
        match self {
            CertificateSpec::None | CertificateSpec::Authority { .. } => Ok(()),
            CertificateSpec::Files {
                certificate,
                private_key,
                ..
            } => {
                check_readable_file(certificate)?;
                builder
                    .set_certificate_file(certificate, SslFiletype::PEM)
                    .map_err(|e| {
                        anyhow!(
                            "failed to load certificate file {}: {e}",
                            certificate.display()
                        )
                    })?;
                check_readable_file(private_key)?;
                builder
                    .set_private_key_file(private_key, SslFiletype::PEM)
                    .map_err(|e| {
                        anyhow!(
                            "failed to load private key file {}: {e}",
                            private_key.display()
                        )
                    })?;
                builder
                    .check_private_key()
                    .map_err(|e| anyhow!("certificate and private key mismatch: {e}"))
            }
            CertificateSpec::Chain { chain, .. } => {
                check_readable_file(chain)?;
                builder.set_certificate_chain_file(chain).map_err(|e| {
                    anyhow!("failed to load certificate chain {}: {e}", chain.display())
                })?;
                match builder.set_private_key_file(chain, SslFiletype::PEM) {
                    Ok(_) => builder
                        .check_private_key()
                        .map_err(|e| anyhow!("certificate and private key mismatch: {e}")),
                    Err(e) => {
                        if mode == TlsMode::Server {
                            Err(anyhow!(
                                "no usable private key in chain file {}: {e}",
                                chain.display()
                            ))
                        } else {
                            log::debug!(
                                "no private key found in chain file {}, continue without it",
                                chain.display()
                            );
                            Ok(())
                        }
                    }
                }
            }
            CertificateSpec::Bytes {
                certificate,
                private_key,
                ..
            } => {
                let certs = X509::stack_from_pem(certificate)
                    .map_err(|e| anyhow!("invalid certificate pem: {e}"))?;
                let mut certs = certs.into_iter();
                let Some(leaf) = certs.next() else {
                    return Err(anyhow!("no valid certificate found in certificate bytes"));
                };
                builder
                    .set_certificate(&leaf)
                    .map_err(|e| anyhow!("failed to set certificate: {e}"))?;
                for (i, cert) in certs.enumerate() {
                    builder
                        .add_extra_chain_cert(cert)
                        .map_err(|e| anyhow!("failed to add chain certificate #{i}: {e}"))?;
                }
                let key = PKey::private_key_from_pem(private_key)
                    .map_err(|e| anyhow!("invalid private key pem: {e}"))?;
                builder
                    .set_private_key(&key)
                    .map_err(|e| anyhow!("failed to set private key: {e}"))?;
                builder
                    .check_private_key()
                    .map_err(|e| anyhow!("certificate and private key mismatch: {e}"))
            }
        }
    }

    /// Resolve and install the trust anchor.
    ///
    /// Without any signature the system default paths are used, and only when
    /// `use_default` is set.
    pub(super) fn install_trust_anchor(
        &self,
        builder: &mut SslContextBuilder,
        use_default: bool,
    ) -> anyhow::Result<()> {
        match self.signature() {
            None => {
                if use_default {
                    builder
                        .set_default_verify_paths()
                        .map_err(|e| anyhow!("failed to load default ca certs: {e}"))?;
                }
                Ok(())
            }
            Some(CertificateSignature::SelfSigned) => Ok(()),
            Some(CertificateSignature::SignedByFile(path)) => {
                check_readable_file(path)?;
                builder
                    .set_ca_file(path)
                    .map_err(|e| anyhow!("failed to load ca file {}: {e}", path.display()))
            }
            Some(CertificateSignature::SignedByDirectory(path)) => {
                let meta = std::fs::metadata(path).map_err(|e| {
                    anyhow!("unable to access ca directory {}: {e}", path.display())
                })?;
                if !meta.is_dir() {
                    return Err(anyhow!("ca path {} is not a directory", path.display()));
                }
                let dir = path
                    .to_str()
                    .ok_or_else(|| anyhow!("ca directory {} is not utf-8", path.display()))?;

                let mut store_builder = X509StoreBuilder::new()
                    .map_err(|e| anyhow!("failed to create ca cert store builder: {e}"))?;
                store_builder
                    .add_lookup(X509Lookup::hash_dir())
                    .map_err(|e| anyhow!("failed to add hash dir lookup: {e}"))?
                    .add_dir(dir, SslFiletype::PEM)
                    .map_err(|e| anyhow!("failed to add ca directory {dir}: {e}"))?;
                builder
                    .set_verify_cert_store(store_builder.build())
                    .map_err(|e| anyhow!("failed to set ca certs: {e}"))
            }
            Some(CertificateSignature::SignedByBytes(pem)) => {
                let certs = X509::stack_from_pem(pem)
                    .map_err(|e| anyhow!("invalid ca certificate pem: {e}"))?;
                if certs.is_empty() {
                    return Err(anyhow!("no valid ca certificate found in ca bytes"));
                }

                let mut store_builder = X509StoreBuilder::new()
                    .map_err(|e| anyhow!("failed to create ca cert store builder: {e}"))?;
                for (i, cert) in certs.into_iter().enumerate() {
                    store_builder
                        .add_cert(cert)
                        .map_err(|e| anyhow!("failed to add ca certificate #{i}: {e}"))?;
                }
                builder
                    .set_verify_cert_store(store_builder.build())
                    .map_err(|e| anyhow!("failed to set ca certs: {e}"))
            }
        }
    }
}

fn check_readable_file(path: &Path) -> anyhow::Result<()> {
    File::open(path)
        .map(|_| ())
        .map_err(|e| anyhow!("unable to read file {}: {e}", path.display()))
}
