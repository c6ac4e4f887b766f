/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::x509::extension::{BasicConstraints, SubjectAlternativeName};
use openssl::x509::{X509, X509NameBuilder};

use g3_tls_socket::{
    CertificateSignature, CertificateSpec, Readiness, SecureSocket, TlsContext, TlsContextBuilder,
    TlsMode,
};

pub struct TestCert {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
    /// Name of the file in a hashed certificate directory.
    pub hash_name: String,
}

/// A scratch directory removed on drop.
pub struct TempDir(PathBuf);

impl TempDir {
    pub fn new(tag: &str) -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "g3-tls-socket-{}-{tag}-{n}",
            std::process::id()
        ));
        std::fs::create_dir_all(&path).unwrap();
        TempDir(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.0.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// A self-signed certificate for `localhost` and `127.0.0.1`.
pub fn self_signed_cert() -> TestCert {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, "localhost").unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap();
    builder
        .set_serial_number(&Asn1Integer::from_bn(&serial).unwrap())
        .unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(1).unwrap())
        .unwrap();
    builder.set_pubkey(&key).unwrap();

    let bc = BasicConstraints::new().critical().ca().build().unwrap();
    builder.append_extension(bc).unwrap();
    let san = SubjectAlternativeName::new()
        .dns("localhost")
        .ip(&IpAddr::V4(Ipv4Addr::LOCALHOST).to_string())
        .build(&builder.x509v3_context(None, None))
        .unwrap();
    builder.append_extension(san).unwrap();

    builder.sign(&key, MessageDigest::sha256()).unwrap();
    let cert = builder.build();

    TestCert {
        cert_pem: cert.to_pem().unwrap(),
        key_pem: key.private_key_to_pem_pkcs8().unwrap(),
        hash_name: format!("{:08x}.0", cert.subject_name_hash()),
    }
}

pub fn server_context(cert: &TestCert) -> Arc<TlsContext> {
    let token = g3_tls_socket::init();
    let mut builder = TlsContextBuilder::new(TlsMode::Server);
    builder.set_certificates(CertificateSpec::Bytes {
        certificate: cert.cert_pem.clone(),
        private_key: cert.key_pem.clone(),
        signature: CertificateSignature::SelfSigned,
    });
    Arc::new(builder.build(&token).unwrap())
}

/// A client trusting `cert` as its only authority.
pub fn client_context(cert: &TestCert, verify_host: bool) -> Arc<TlsContext> {
    let token = g3_tls_socket::init();
    let mut builder = TlsContextBuilder::new(TlsMode::Client);
    builder.set_certificates(CertificateSpec::Authority {
        signature: CertificateSignature::SignedByBytes(cert.cert_pem.clone()),
    });
    builder.set_verify_host(verify_host);
    builder.set_verify_certificates(true);
    Arc::new(builder.build(&token).unwrap())
}

/// A client that does not check the peer certificate at all.
pub fn insecure_client_context() -> Arc<TlsContext> {
    let token = g3_tls_socket::init();
    let mut builder = TlsContextBuilder::new(TlsMode::Client);
    builder.set_verify_certificates(false);
    Arc::new(builder.build(&token).unwrap())
}

struct Channel {
    buf: VecDeque<u8>,
    capacity: usize,
    closed: bool,
}

impl Channel {
    fn new(capacity: usize) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Channel {
            buf: VecDeque::with_capacity(capacity),
            capacity,
            closed: false,
        }))
    }
}

/// One end of an in-memory, capacity bounded, non-blocking byte pipe.
pub struct PipeEnd {
    rx: Rc<RefCell<Channel>>,
    tx: Rc<RefCell<Channel>>,
    close_count: Rc<Cell<usize>>,
}

impl PipeEnd {
    pub fn close_count(&self) -> Rc<Cell<usize>> {
        self.close_count.clone()
    }
}

pub fn pipe(capacity: usize) -> (PipeEnd, PipeEnd) {
    let a_to_b = Channel::new(capacity);
    let b_to_a = Channel::new(capacity);
    let a = PipeEnd {
        rx: b_to_a.clone(),
        tx: a_to_b.clone(),
        close_count: Rc::new(Cell::new(0)),
    };
    let b = PipeEnd {
        rx: a_to_b,
        tx: b_to_a,
        close_count: Rc::new(Cell::new(0)),
    };
    (a, b)
}

impl Read for PipeEnd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut ch = self.rx.borrow_mut();
        if ch.buf.is_empty() {
            return if ch.closed {
                Ok(0)
            } else {
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            };
        }
        let n = buf.len().min(ch.buf.len());
        for (dst, src) in buf.iter_mut().zip(ch.buf.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Write for PipeEnd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut ch = self.tx.borrow_mut();
        if ch.closed {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        let space = ch.capacity - ch.buf.len();
        if space == 0 {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        let n = buf.len().min(space);
        ch.buf.extend(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl g3_tls_socket::RawTransport for PipeEnd {
    fn close(&mut self) -> io::Result<()> {
        self.close_count.set(self.close_count.get() + 1);
        self.tx.borrow_mut().closed = true;
        self.rx.borrow_mut().closed = true;
        Ok(())
    }
}

#[derive(Default)]
pub struct ReadinessLog {
    pub active: bool,
    pub suspended: usize,
    pub resumed: usize,
    pub cancelled: usize,
}

/// Readiness handle recording every call, shared with the test body.
#[derive(Clone, Default)]
pub struct RecordingReadiness(Rc<RefCell<ReadinessLog>>);

impl RecordingReadiness {
    pub fn is_active(&self) -> bool {
        self.0.borrow().active
    }

    pub fn suspended(&self) -> usize {
        self.0.borrow().suspended
    }

    pub fn resumed(&self) -> usize {
        self.0.borrow().resumed
    }

    pub fn cancelled(&self) -> usize {
        self.0.borrow().cancelled
    }
}

impl Readiness for RecordingReadiness {
    fn suspend(&mut self) {
        let mut log = self.0.borrow_mut();
        log.active = false;
        log.suspended += 1;
    }

    fn resume(&mut self) {
        let mut log = self.0.borrow_mut();
        log.active = true;
        log.resumed += 1;
    }

    fn cancel(&mut self) {
        let mut log = self.0.borrow_mut();
        log.active = false;
        log.cancelled += 1;
    }
}

/// Drive both handshakes to completion over an in-memory pipe.
pub fn establish(
    client: &mut SecureSocket<PipeEnd>,
    server: &mut SecureSocket<PipeEnd>,
    server_name: &str,
) {
    for _ in 0..100 {
        let c = client.connect(server_name);
        assert!(!c.is_fatal(), "client handshake failed: {c:?}");
        let s = server.accept();
        assert!(!s.is_fatal(), "server handshake failed: {s:?}");
        if client.is_established() && server.is_established() {
            return;
        }
    }
    panic!("handshake did not complete");
}

pub fn test_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
