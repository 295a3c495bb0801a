//! TLS termination for the webhook endpoint.

use anyhow::{Context, Result};
use axum::extract::Request;
use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

/// Build a server config from a PEM certificate chain and private key
pub(super) fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>> {
    let mut cert_reader = BufReader::new(
        File::open(cert_path)
            .with_context(|| format!("Failed to open {}", cert_path.display()))?,
    );
    let mut key_reader = BufReader::new(
        File::open(key_path).with_context(|| format!("Failed to open {}", key_path.display()))?,
    );

    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to parse certificates in {}", cert_path.display()))?;
    if certs.is_empty() {
        anyhow::bail!("No certificate found in {}", cert_path.display());
    }
    let key = rustls_pemfile::private_key(&mut key_reader)
        .with_context(|| format!("Failed to parse private key in {}", key_path.display()))?
        .with_context(|| format!("No private key found in {}", key_path.display()))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("Certificate and key do not match")?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

/// Accept TLS connections and hand each one to the router
pub(super) async fn serve(addr: SocketAddr, router: Router, config: Arc<ServerConfig>) -> Result<()> {
    let tls_acceptor = TlsAcceptor::from(config);
    let tcp_listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind webhook listener on {addr}"))?;
    info!("Admission webhook listening on https://{}", addr);

    loop {
        let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(error = %e, "Failed to accept webhook connection");
                continue;
            }
        };
        let tls_acceptor = tls_acceptor.clone();
        let router = router.clone();

        tokio::spawn(async move {
            let tls_stream = match tls_acceptor.accept(tcp_stream).await {
                Ok(stream) => TokioIo::new(stream),
                Err(e) => {
                    error!(error = %e, "TLS handshake failed for connection from {}", remote_addr);
                    return;
                }
            };

            // Router is always ready, so oneshot does not wait on poll_ready
            let service = hyper::service::service_fn(move |request: Request<Incoming>| {
                router.clone().oneshot(request)
            });

            if let Err(e) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                .serve_connection_with_upgrades(tls_stream, service)
                .await
            {
                debug!(error = %e, "Connection from {} closed with error", remote_addr);
            }
        });
    }
}
