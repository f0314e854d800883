//! Accept loops.
//!
//! One accept task per listener. Each accepted socket gets a fresh
//! [`Client`] handle and a spawned connection task; for TLS the handshake
//! happens inside that task, so a stalled peer cannot block the loop.

use crate::client::{self, Client};
use crate::daemon::ClientEvent;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::{error, info};

/// Accept plaintext connections forever.
pub async fn accept_loop(
    listener: TcpListener,
    hostname: String,
    events: mpsc::Sender<ClientEvent>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!(%addr, "connection accepted");
                let (handle, outbound) = Client::new(&hostname, addr);
                tokio::spawn(client::run(handle, stream, outbound, events.clone()));
            }
            Err(e) => error!(error = %e, "accept failed"),
        }
    }
}

/// Accept TLS connections forever.
pub async fn accept_loop_tls(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    hostname: String,
    events: mpsc::Sender<ClientEvent>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!(%addr, tls = true, "connection accepted");
                let (handle, outbound) = Client::new(&hostname, addr);
                let acceptor = acceptor.clone();
                let events = events.clone();
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(stream) => client::run(handle, stream, outbound, events).await,
                        Err(e) => error!(%addr, error = %e, "TLS handshake failed"),
                    }
                });
            }
            Err(e) => error!(error = %e, "accept failed"),
        }
    }
}

/// Load the certificate chain and private key and build an acceptor.
pub fn tls_acceptor(cert: &Path, key: &Path) -> anyhow::Result<TlsAcceptor> {
    let cert_data = std::fs::read(cert)?;
    let key_data = std::fs::read(key)?;

    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut &cert_data[..]).collect::<Result<_, _>>()?;
    if certs.is_empty() {
        anyhow::bail!("no certificates found in {}", cert.display());
    }
    let key_der: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut &key_data[..])?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {}", key.display()))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key_der)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}
