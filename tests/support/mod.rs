//! In-process TLS endpoints for probe and scan tests.
#![allow(dead_code)]

use async_trait::async_trait;
use h2_hunter::error::LatencyError;
use h2_hunter::latency::LatencyProbe;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ServerConfig, SupportedProtocolVersion};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

pub static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];
pub static TLS12_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS12];

/// Self-signed certificate whose subject CN is `cn`.
pub fn self_signed(cn: &str) -> (CertificateDer<'static>, PrivateKeyDer<'static>) {
    let mut params = rcgen::CertificateParams::new(vec![cn.trim_start_matches("*.").to_string()]);
    let mut dn = rcgen::DistinguishedName::new();
    dn.push(rcgen::DnType::CommonName, cn.to_string());
    params.distinguished_name = dn;
    let cert = rcgen::Certificate::from_params(params).expect("generate cert");
    let der = cert.serialize_der().expect("serialize cert");
    let key = PrivatePkcs8KeyDer::from(cert.serialize_private_key_der());
    (CertificateDer::from(der), PrivateKeyDer::from(key))
}

/// Mock endpoint description.
pub struct MockServer {
    pub cn: &'static str,
    pub versions: &'static [&'static SupportedProtocolVersion],
    pub alpn: &'static [&'static str],
}

impl MockServer {
    pub fn h2_tls13(cn: &'static str) -> Self {
        Self {
            cn,
            versions: TLS13_ONLY,
            alpn: &["h2", "http/1.1"],
        }
    }

    /// Bind on `bind` (port 0 for an ephemeral port) and serve handshakes
    /// until the test runtime shuts down.
    pub async fn spawn(self, bind: &str) -> SocketAddr {
        let (cert, key) = self_signed(self.cn);
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_protocol_versions(self.versions)
            .expect("protocol versions")
            .with_no_client_auth()
            .with_single_cert(vec![cert], key)
            .expect("server cert");
        config.alpn_protocols = self.alpn.iter().map(|p| p.as_bytes().to_vec()).collect();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind(bind).await.expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    if let Ok(mut tls) = acceptor.accept(stream).await {
                        let mut buf = [0u8; 64];
                        // Hold the session until the client hangs up.
                        let _ = tls.read(&mut buf).await;
                    }
                });
            }
        });
        addr
    }
}

/// Latency probe returning a fixed value and remembering what it was asked.
#[derive(Debug, Default)]
pub struct FixedLatency {
    pub seconds: f64,
    pub fail: bool,
    pub calls: Mutex<Vec<(String, u32)>>,
}

impl FixedLatency {
    pub fn new(seconds: f64) -> Self {
        Self {
            seconds,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LatencyProbe for FixedLatency {
    async fn measure(&self, host: &str, count: u32) -> Result<f64, LatencyError> {
        self.calls.lock().unwrap().push((host.to_string(), count));
        if self.fail {
            return Err(LatencyError::Timeout {
                host: host.to_string(),
                timeout: std::time::Duration::from_secs(1),
            });
        }
        Ok(self.seconds)
    }
}
