//! TCP and TLS connection setup.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::rustls;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::{RelayError, Result};

/// Byte stream an IRC connection runs over, plain or TLS.
pub trait IrcStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> IrcStream for T {}

/// Boxed stream returned by [`connect`].
pub type BoxedStream = Box<dyn IrcStream>;

/// Open a connection to `host:port`, optionally wrapped in TLS.
///
/// The whole attempt, including the TLS handshake, is bounded by `timeout`.
pub async fn connect(host: &str, port: u16, use_tls: bool, timeout: Duration) -> Result<BoxedStream> {
    tokio::time::timeout(timeout, establish(host, port, use_tls))
        .await
        .map_err(|_| RelayError::Timeout(timeout.as_secs()))?
}

async fn establish(host: &str, port: u16, use_tls: bool) -> Result<BoxedStream> {
    let tcp = TcpStream::connect((host, port))
        .await
        .map_err(|e| RelayError::Connection(format!("{}:{}: {}", host, port, e)))?;
    debug!("TCP connected to {}:{}", host, port);

    if !use_tls {
        return Ok(Box::new(tcp));
    }

    let connector = TlsConnector::from(Arc::new(tls_config()));
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| RelayError::Tls(format!("invalid server name {}: {}", host, e)))?;
    let tls = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| RelayError::Tls(format!("handshake with {} failed: {}", host, e)))?;
    debug!("TLS established with {}", host);

    Ok(Box::new(tls))
}

/// Client configuration trusting the Mozilla root set.
fn tls_config() -> rustls::ClientConfig {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}
