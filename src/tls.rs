//! TLS client capability used by the probe and the latency pinger.
//!
//! Certificate verification is an explicit setting of the client rather than
//! a hidden default: the scanner runs with [`CertVerification::Disabled`] and
//! only inspects the subject of the leaf certificate.

use anyhow::Result;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{self, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{
    ClientConfig, ClientConnection, DigitallySignedStruct, ProtocolVersion, RootCertStore,
    SignatureScheme,
};
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use x509_parser::parse_x509_certificate;

pub const ALPN_H2: &str = "h2";
pub const ALPN_HTTP11: &str = "http/1.1";
pub const TLS13_LABEL: &str = "1.3";

/// How the client treats the certificate chain presented by a server.
#[derive(Debug, Clone)]
pub enum CertVerification {
    /// Accept any chain; signatures over the handshake are still checked.
    Disabled,
    /// Verify the chain against the given trust anchors.
    Roots(Arc<RootCertStore>),
}

/// Negotiated parameters of a finished handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// `"1.3"`, `"1.2"`, ... or empty if unknown.
    pub version: &'static str,
    /// Negotiated ALPN protocol, empty if none was agreed.
    pub alpn: String,
    /// Subject common name of the leaf certificate, empty if absent.
    pub common_name: String,
}

/// Cloneable TLS client offering `h2` and `http/1.1` via ALPN.
#[derive(Clone)]
pub struct TlsClient {
    connector: TlsConnector,
    verification: CertVerification,
}

impl fmt::Debug for TlsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsClient")
            .field("verification", &self.verification)
            .finish_non_exhaustive()
    }
}

impl TlsClient {
    pub fn new(verification: CertVerification) -> Result<Self> {
        let provider = Arc::new(crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?;

        let mut config = match &verification {
            CertVerification::Disabled => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider }))
                .with_no_client_auth(),
            CertVerification::Roots(roots) => builder
                .with_root_certificates(roots.clone())
                .with_no_client_auth(),
        };
        config.alpn_protocols = vec![ALPN_H2.as_bytes().to_vec(), ALPN_HTTP11.as_bytes().to_vec()];

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            verification,
        })
    }

    /// Client used by the scanner: chain verification switched off.
    pub fn insecure() -> Result<Self> {
        Self::new(CertVerification::Disabled)
    }

    pub fn verifies_certificates(&self) -> bool {
        matches!(self.verification, CertVerification::Roots(_))
    }

    /// Run the client handshake over an already connected stream.
    pub async fn handshake(
        &self,
        server_name: ServerName<'static>,
        stream: TcpStream,
    ) -> io::Result<TlsStream<TcpStream>> {
        self.connector.connect(server_name, stream).await
    }
}

/// Read version, ALPN and leaf common name off an established session.
pub fn session_info(conn: &ClientConnection) -> SessionInfo {
    let alpn = conn
        .alpn_protocol()
        .map(|p| String::from_utf8_lossy(p).into_owned())
        .unwrap_or_default();
    let common_name = conn
        .peer_certificates()
        .and_then(|chain| chain.first())
        .and_then(|leaf| common_name(leaf.as_ref()))
        .unwrap_or_default();
    SessionInfo {
        version: version_label(conn.protocol_version()),
        alpn,
        common_name,
    }
}

pub fn version_label(version: Option<ProtocolVersion>) -> &'static str {
    match version {
        Some(ProtocolVersion::TLSv1_0) => "1.0",
        Some(ProtocolVersion::TLSv1_1) => "1.1",
        Some(ProtocolVersion::TLSv1_2) => "1.2",
        Some(ProtocolVersion::TLSv1_3) => TLS13_LABEL,
        _ => "",
    }
}

/// Subject CN of a DER certificate, if it parses and carries one.
pub fn common_name(der: &[u8]) -> Option<String> {
    let (_, cert) = parse_x509_certificate(der).ok()?;
    let cn = cert.subject().iter_common_name().next()?;
    cn.as_str().ok().map(str::to_owned)
}

#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert_with_cn(cn: &str) -> Vec<u8> {
        let mut params = rcgen::CertificateParams::new(vec![cn.to_string()]);
        let mut dn = rcgen::DistinguishedName::new();
        dn.push(rcgen::DnType::CommonName, cn.to_string());
        params.distinguished_name = dn;
        rcgen::Certificate::from_params(params)
            .expect("generate cert")
            .serialize_der()
            .expect("serialize cert")
    }

    #[test]
    fn extracts_subject_common_name() {
        let der = cert_with_cn("example.com");
        assert_eq!(common_name(&der).as_deref(), Some("example.com"));
    }

    #[test]
    fn missing_common_name_is_none() {
        let mut params = rcgen::CertificateParams::new(vec!["example.com".to_string()]);
        params.distinguished_name = rcgen::DistinguishedName::new();
        let der = rcgen::Certificate::from_params(params)
            .expect("generate cert")
            .serialize_der()
            .expect("serialize cert");
        assert_eq!(common_name(&der), None);
    }

    #[test]
    fn garbage_is_not_a_certificate() {
        assert_eq!(common_name(b"not a certificate"), None);
    }

    #[test]
    fn version_labels() {
        assert_eq!(version_label(Some(ProtocolVersion::TLSv1_3)), "1.3");
        assert_eq!(version_label(Some(ProtocolVersion::TLSv1_2)), "1.2");
        assert_eq!(version_label(None), "");
    }

    #[test]
    fn verification_mode_is_explicit() {
        let insecure = TlsClient::insecure().expect("client");
        assert!(!insecure.verifies_certificates());
        let strict = TlsClient::new(CertVerification::Roots(Arc::new(RootCertStore::empty())))
            .expect("client");
        assert!(strict.verifies_certificates());
    }
}
