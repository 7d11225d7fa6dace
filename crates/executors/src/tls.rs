//! Peer certificate inspection for `check_cert_expiry` monitors.
//!
//! A raw TLS handshake to `host:443` (no HTTP involved) is enough to read
//! the leaf certificate's issuer and expiry — reqwest doesn't expose the
//! negotiated certificate chain, so this bypasses it entirely.

use std::sync::Arc;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use uptime_domain::TlsInfo;
use x509_parser::prelude::*;

pub async fn fetch_leaf_cert_info(host: &str, port: u16) -> Result<TlsInfo, String> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| format!("invalid hostname for tls check: {e}"))?;

    let tcp = tokio::net::TcpStream::connect((host, port))
        .await
        .map_err(|e| format!("tcp connect failed: {e}"))?;

    let tls_stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| format!("tls handshake failed: {e}"))?;

    let (_, session) = tls_stream.get_ref();
    let certs = session
        .peer_certificates()
        .ok_or_else(|| "server presented no certificates".to_string())?;

    let leaf = certs
        .first()
        .ok_or_else(|| "empty certificate chain".to_string())?;

    let (_, parsed) =
        X509Certificate::from_der(leaf.as_ref()).map_err(|e| format!("failed to parse certificate: {e}"))?;

    let not_after = parsed.validity().not_after;
    let valid_to = chrono::DateTime::from_timestamp(not_after.timestamp(), 0)
        .ok_or_else(|| "certificate not_after out of range".to_string())?;

    Ok(TlsInfo {
        issuer: parsed.issuer().to_string(),
        valid_to,
    })
}
