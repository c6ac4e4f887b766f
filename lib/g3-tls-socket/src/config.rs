/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! Yaml configuration of [`TlsContextBuilder`].
//!
//! ```yaml
//! mode: server
//! certificate: server.crt
//! private_key: server.key
//! ca_certificate: ca.crt
//! ciphers: HIGH:!aNULL
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, anyhow};
use yaml_rust::{Yaml, yaml};

use crate::{CertificateSignature, CertificateSpec, CipherPolicy, TlsContextBuilder, TlsMode};

const MAX_PEM_FILE_SIZE: u64 = 256_000;

enum Material {
    Path(PathBuf),
    Pem(Vec<u8>),
}

impl Material {
    fn into_pem(self) -> anyhow::Result<Vec<u8>> {
        match self {
            Material::Pem(v) => Ok(v),
            Material::Path(p) => {
                let meta = std::fs::metadata(&p)
                    .map_err(|e| anyhow!("unable to access file {}: {e}", p.display()))?;
                if meta.len() > MAX_PEM_FILE_SIZE {
                    return Err(anyhow!("file {} is too large", p.display()));
                }
                std::fs::read(&p)
                    .map_err(|e| anyhow!("failed to read contents of file {}: {e}", p.display()))
            }
        }
    }
}

fn normalize_key(s: &str) -> String {
    s.to_lowercase().replace('-', "_")
}

fn foreach_kv<F>(map: &yaml::Hash, mut f: F) -> anyhow::Result<()>
where
    F: FnMut(&str, &Yaml) -> anyhow::Result<()>,
{
    for (k, v) in map.iter() {
        let Yaml::String(key) = k else {
            return Err(anyhow!("key in hash should be string"));
        };
        f(key, v)?;
    }
    Ok(())
}

fn as_bool(v: &Yaml) -> anyhow::Result<bool> {
    match v {
        Yaml::String(s) => match s.to_lowercase().as_str() {
            "on" | "true" | "yes" | "1" => Ok(true),
            "off" | "false" | "no" | "0" => Ok(false),
            _ => Err(anyhow!("invalid yaml string value for 'bool': {s}")),
        },
        Yaml::Boolean(value) => Ok(*value),
        Yaml::Integer(i) => Ok(*i != 0),
        _ => Err(anyhow!(
            "yaml value type for 'bool' should be 'boolean' / 'string' / 'integer'"
        )),
    }
}

fn as_u32(v: &Yaml) -> anyhow::Result<u32> {
    match v {
        Yaml::String(s) => Ok(u32::from_str(s)?),
        Yaml::Integer(i) => Ok(u32::try_from(*i)?),
        _ => Err(anyhow!(
            "yaml value type for 'u32' should be 'string' or 'integer'"
        )),
    }
}

fn as_string(v: &Yaml) -> anyhow::Result<String> {
    match v {
        Yaml::String(s) => Ok(s.to_string()),
        _ => Err(anyhow!("yaml value type for string should be 'string'")),
    }
}

fn as_mode(v: &Yaml) -> anyhow::Result<TlsMode> {
    let s = as_string(v)?;
    match s.to_lowercase().as_str() {
        "client" => Ok(TlsMode::Client),
        "server" => Ok(TlsMode::Server),
        _ => Err(anyhow!("unknown tls mode {s}")),
    }
}

fn as_path(v: &Yaml, lookup_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let Yaml::String(s) = v else {
        return Err(anyhow!("yaml value type for path should be 'string'"));
    };
    let path = PathBuf::from(s);
    if path.is_absolute() {
        return Ok(path);
    }
    match lookup_dir {
        Some(dir) => Ok(dir.join(path)),
        None => Err(anyhow!(
            "invalid value: {} is not an absolute path",
            path.display()
        )),
    }
}

fn as_material(v: &Yaml, lookup_dir: Option<&Path>) -> anyhow::Result<Material> {
    if let Yaml::String(s) = v {
        if s.trim_start().starts_with("--") {
            return Ok(Material::Pem(s.as_bytes().to_vec()));
        }
    }
    as_path(v, lookup_dir).map(Material::Path)
}

fn as_cipher_policy(v: &Yaml) -> anyhow::Result<CipherPolicy> {
    match v {
        Yaml::String(s) => CipherPolicy::from_str(s),
        Yaml::Array(seq) => {
            let mut list = Vec::with_capacity(seq.len());
            for (i, v) in seq.iter().enumerate() {
                let s = as_string(v).context(format!("invalid value for list element #{i}"))?;
                list.push(
                    CipherPolicy::from_str(&s)
                        .context(format!("invalid cipher policy for list element #{i}"))?,
                );
            }
            if list.is_empty() {
                return Err(anyhow!("empty cipher policy list"));
            }
            Ok(CipherPolicy::List(list))
        }
        _ => Err(anyhow!(
            "yaml value type for cipher policy should be 'string' or 'array'"
        )),
    }
}

fn as_alpn_protocols(v: &Yaml) -> anyhow::Result<Vec<String>> {
    match v {
        Yaml::Array(seq) => {
            let mut list = Vec::with_capacity(seq.len());
            for (i, v) in seq.iter().enumerate() {
                let s = as_string(v).context(format!("invalid value for list element #{i}"))?;
                list.push(s);
            }
            Ok(list)
        }
        _ => Ok(vec![as_string(v)?]),
    }
}

#[derive(Default)]
struct CertificateFields {
    certificate: Option<Material>,
    private_key: Option<Material>,
    chain: Option<PathBuf>,
    ca_certificate: Option<Material>,
    ca_directory: Option<PathBuf>,
    self_signed: bool,
}

impl CertificateFields {
    fn signature(&mut self) -> anyhow::Result<Option<CertificateSignature>> {
        let ca_count =
            usize::from(self.ca_certificate.is_some()) + usize::from(self.ca_directory.is_some());
        if self.self_signed {
            if ca_count > 0 {
                return Err(anyhow!("self_signed conflicts with ca settings"));
            }
            return Ok(Some(CertificateSignature::SelfSigned));
        }
        if ca_count > 1 {
            return Err(anyhow!("only one of ca_certificate and ca_directory is allowed"));
        }
        if let Some(dir) = self.ca_directory.take() {
            return Ok(Some(CertificateSignature::SignedByDirectory(dir)));
        }
        match self.ca_certificate.take() {
            Some(Material::Path(p)) => Ok(Some(CertificateSignature::SignedByFile(p))),
            Some(Material::Pem(v)) => Ok(Some(CertificateSignature::SignedByBytes(v))),
            None => Ok(None),
        }
    }

    fn into_spec(mut self) -> anyhow::Result<CertificateSpec> {
        let signature = self.signature()?;

        if let Some(chain) = self.chain.take() {
            if self.certificate.is_some() || self.private_key.is_some() {
                return Err(anyhow!(
                    "chain can not be used together with certificate or private_key"
                ));
            }
            let signature = signature
                .ok_or_else(|| anyhow!("chain requires self_signed or a ca setting"))?;
            return Ok(CertificateSpec::Chain { chain, signature });
        }

        match (self.certificate.take(), self.private_key.take()) {
            (Some(certificate), Some(private_key)) => {
                let signature = signature.ok_or_else(|| {
                    anyhow!("certificate requires self_signed or a ca setting")
                })?;
                match (certificate, private_key) {
                    (Material::Path(certificate), Material::Path(private_key)) => {
                        Ok(CertificateSpec::Files {
                            certificate,
                            private_key,
                            signature,
                        })
                    }
                    (certificate, private_key) => Ok(CertificateSpec::Bytes {
                        certificate: certificate.into_pem()?,
                        private_key: private_key.into_pem()?,
                        signature,
                    }),
                }
            }
            (Some(_), None) => Err(anyhow!("certificate is set without private_key")),
            (None, Some(_)) => Err(anyhow!("private_key is set without certificate")),
            (None, None) => match signature {
                Some(CertificateSignature::SelfSigned) => Err(anyhow!(
                    "self_signed requires local certificate material"
                )),
                Some(signature) => Ok(CertificateSpec::Authority { signature }),
                None => Ok(CertificateSpec::None),
            },
        }
    }
}

/// Parse a yaml map into a context builder.
///
/// Relative paths are resolved against `lookup_dir`, and must be absolute if
/// it is not set. The built context still has to go through
/// [`TlsContextBuilder::build`].
pub fn parse_context_builder(
    value: &Yaml,
    lookup_dir: Option<&Path>,
) -> anyhow::Result<TlsContextBuilder> {
    let Yaml::Hash(map) = value else {
        return Err(anyhow!("yaml value type for tls context should be 'map'"));
    };

    let mut builder = TlsContextBuilder::new(TlsMode::Client);
    let mut fields = CertificateFields::default();

    foreach_kv(map, |k, v| match normalize_key(k).as_str() {
        "mode" => {
            let mode = as_mode(v).context(format!("invalid tls mode value for key {k}"))?;
            builder.set_mode(mode);
            Ok(())
        }
        "certificate" | "cert" => {
            fields.certificate = Some(
                as_material(v, lookup_dir)
                    .context(format!("invalid certificate value for key {k}"))?,
            );
            Ok(())
        }
        "private_key" | "key" => {
            fields.private_key = Some(
                as_material(v, lookup_dir)
                    .context(format!("invalid private key value for key {k}"))?,
            );
            Ok(())
        }
        "chain" => {
            fields.chain =
                Some(as_path(v, lookup_dir).context(format!("invalid path value for key {k}"))?);
            Ok(())
        }
        "ca_certificate" | "ca_file" => {
            fields.ca_certificate = Some(
                as_material(v, lookup_dir)
                    .context(format!("invalid ca certificate value for key {k}"))?,
            );
            Ok(())
        }
        "ca_directory" | "ca_dir" => {
            fields.ca_directory =
                Some(as_path(v, lookup_dir).context(format!("invalid path value for key {k}"))?);
            Ok(())
        }
        "self_signed" => {
            fields.self_signed = as_bool(v).context(format!("invalid bool value for key {k}"))?;
            Ok(())
        }
        "verify_host" | "verify_name" => {
            let verify = as_bool(v).context(format!("invalid bool value for key {k}"))?;
            builder.set_verify_host(verify);
            Ok(())
        }
        "verify_certificates" => {
            let verify = as_bool(v).context(format!("invalid bool value for key {k}"))?;
            builder.set_verify_certificates(verify);
            Ok(())
        }
        "ciphers" => {
            let policy =
                as_cipher_policy(v).context(format!("invalid cipher policy value for key {k}"))?;
            builder.set_cipher_policy(policy);
            Ok(())
        }
        "verify_depth" => {
            let depth = as_u32(v).context(format!("invalid u32 value for key {k}"))?;
            builder.set_verify_depth(depth);
            Ok(())
        }
        "alpn_protocols" => {
            let protocols =
                as_alpn_protocols(v).context(format!("invalid alpn protocols value for key {k}"))?;
            builder.set_alpn_protocols(protocols);
            Ok(())
        }
        _ => Err(anyhow!("invalid key {k}")),
    })?;

    builder.set_certificates(fields.into_spec()?);
    builder.check()?;
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use yaml_rust::YamlLoader;

    fn load(s: &str) -> Yaml {
        YamlLoader::load_from_str(s).unwrap().remove(0)
    }

    #[test]
    fn client_defaults() {
        let doc = load("mode: client");
        let builder = parse_context_builder(&doc, None).unwrap();
        assert_eq!(builder, TlsContextBuilder::new(TlsMode::Client));
    }

    #[test]
    fn server_files() {
        let doc = load(
            r#"
            Mode: server
            cert: server.crt
            private-key: server.key
            self_signed: true
            verify_host: off
            "#,
        );
        let builder = parse_context_builder(&doc, Some(Path::new("/etc/tls"))).unwrap();
        assert_eq!(builder.mode(), TlsMode::Server);
        assert_eq!(
            builder.certificates(),
            &CertificateSpec::Files {
                certificate: PathBuf::from("/etc/tls/server.crt"),
                private_key: PathBuf::from("/etc/tls/server.key"),
                signature: CertificateSignature::SelfSigned,
            }
        );
    }

    #[test]
    fn client_authority() {
        let doc = load(
            r#"
            ca_dir: /etc/ssl/certs
            verify_depth: 4
            ciphers:
              - DEFAULT
              - "!aNULL"
            alpn_protocols: [h2, http/1.1]
            "#,
        );
        let builder = parse_context_builder(&doc, None).unwrap();
        assert_eq!(
            builder.certificates(),
            &CertificateSpec::Authority {
                signature: CertificateSignature::SignedByDirectory(PathBuf::from(
                    "/etc/ssl/certs"
                )),
            }
        );

        let pem = "ca_certificate: |\n  -----BEGIN CERTIFICATE-----\n  AAAA\n  -----END CERTIFICATE-----\n";
        let builder = parse_context_builder(&load(pem), None).unwrap();
        let Some(CertificateSignature::SignedByBytes(v)) = builder.certificates().signature()
        else {
            panic!("in memory ca expected");
        };
        assert!(v.starts_with(b"-----BEGIN CERTIFICATE-----"));
    }

    #[test]
    fn invalid() {
        // relative path without lookup dir
        assert!(parse_context_builder(&load("ca_file: ca.pem"), None).is_err());
        assert!(parse_context_builder(&load("unknown: 1"), None).is_err());
        assert!(parse_context_builder(&load("mode: proxy"), None).is_err());
        assert!(parse_context_builder(&load("- a"), None).is_err());
        // server without certificate
        assert!(parse_context_builder(&load("mode: server"), None).is_err());
        // certificate without key
        assert!(
            parse_context_builder(&load("cert: /a.pem\nself_signed: true"), None).is_err()
        );
        // certificate without signature
        assert!(parse_context_builder(&load("cert: /a.pem\nkey: /b.pem"), None).is_err());
        assert!(
            parse_context_builder(&load("self_signed: true\nca_file: /ca.pem"), None).is_err()
        );
        assert!(parse_context_builder(&load("ciphers: ''"), None).is_err());
    }
}
