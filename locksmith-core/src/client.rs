//! Sample Locksmith client.
//!
//! Thin asynchronous wrapper over the wire protocol: connect over TCP or
//! TLS, fire acquire/release frames, and receive granted tags through a
//! channel fed by a background read task. The server sends nothing but
//! ACQUIRED frames, so the channel carries plain tags.

use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use rustls::pki_types::ServerName;
use rustls::RootCertStore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;

use crate::protocol::{self, Acquired, Request, RequestKind};
use crate::server::tls;

/// TLS options for [`Client::connect_tls`].
pub struct ClientTlsOptions {
    /// Name the server certificate must present.
    pub domain: String,
    /// CA bundle (PEM) used to verify the server.
    pub ca_cert_path: String,
    /// Client certificate (PEM), for servers requiring mTLS.
    pub cert_path: Option<String>,
    /// Client private key (PEM), for servers requiring mTLS.
    pub key_path: Option<String>,
}

/// A connected Locksmith client.
pub struct Client {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
}

impl Client {
    /// Connect over plain TCP. Returns the client and the stream of granted
    /// tags; the stream ends when the server closes the connection.
    pub async fn connect(
        host: &str,
        port: u16,
    ) -> Result<(Self, mpsc::UnboundedReceiver<String>)> {
        log::info!("dialing server {}:{}", host, port);
        let stream = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("failed to connect to {}:{}", host, port))?;
        Ok(Self::start(stream))
    }

    /// Connect over TLS, optionally presenting a client certificate.
    pub async fn connect_tls(
        host: &str,
        port: u16,
        options: &ClientTlsOptions,
    ) -> Result<(Self, mpsc::UnboundedReceiver<String>)> {
        tls::install_crypto_provider();

        let mut roots = RootCertStore::empty();
        for cert in tls::load_certs(&options.ca_cert_path)? {
            roots.add(cert).context("invalid certificate in CA file")?;
        }
        let builder = rustls::ClientConfig::builder().with_root_certificates(roots);
        let config = match (&options.cert_path, &options.key_path) {
            (Some(cert), Some(key)) => builder
                .with_client_auth_cert(tls::load_certs(cert)?, tls::load_key(key)?)
                .context("invalid client certificate or key")?,
            _ => builder.with_no_client_auth(),
        };

        log::info!("dialing (TLS) server {}:{}", host, port);
        let stream = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("failed to connect to {}:{}", host, port))?;
        let domain = ServerName::try_from(options.domain.clone())
            .with_context(|| format!("invalid TLS server name: {}", options.domain))?;
        let stream = TlsConnector::from(Arc::new(config))
            .connect(domain, stream)
            .await
            .context("TLS handshake failed")?;
        Ok(Self::start(stream))
    }

    fn start<S>(stream: S) -> (Self, mpsc::UnboundedReceiver<String>)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(read_loop(read, tx));
        (Self { writer: Box::new(write) }, rx)
    }

    /// Request the given lock tag. The grant arrives on the acquired-tags
    /// stream once the lock is ours.
    pub async fn acquire(&mut self, tag: &str) -> Result<()> {
        self.send(Request { kind: RequestKind::Acquire, tag: tag.to_string() }).await
    }

    /// Release the given lock tag. The server sends no confirmation.
    pub async fn release(&mut self, tag: &str) -> Result<()> {
        self.send(Request { kind: RequestKind::Release, tag: tag.to_string() }).await
    }

    async fn send(&mut self, request: Request) -> Result<()> {
        ensure!(
            !request.tag.is_empty() && request.tag.len() <= 255,
            "lock tag must be 1..=255 bytes"
        );
        self.writer
            .write_all(&request.encode())
            .await
            .context("failed to write to lock server")
    }
}

async fn read_loop<R>(mut read: R, acquired: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = [0u8; protocol::MAX_FRAME_LEN];
    loop {
        match read.read(&mut buffer).await {
            Ok(0) => {
                log::info!("connection closed by remote (EOF)");
                break;
            }
            Ok(n) => match Acquired::decode(&buffer[..n]) {
                Ok(message) => {
                    if acquired.send(message.tag).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    log::error!("failed to decode message: {}", err);
                }
            },
            Err(err) => {
                log::error!("connection read error: {}", err);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_oversized_tag() {
        let (stream, _peer) = tokio::io::duplex(64);
        let (mut client, _acquired) = Client::start(stream);
        assert!(client.acquire(&"t".repeat(256)).await.is_err());
        assert!(client.acquire("").await.is_err());
    }

    #[tokio::test]
    async fn test_acquire_writes_frame_and_grant_is_surfaced() {
        let (stream, mut peer) = tokio::io::duplex(64);
        let (mut client, mut acquired) = Client::start(stream);

        client.acquire("HH").await.unwrap();
        let mut frame = [0u8; 4];
        peer.read_exact(&mut frame).await.unwrap();
        assert_eq!(frame, [0x00, 0x02, 0x48, 0x48]);

        peer.write_all(&[0x00, 0x02, 0x48, 0x48]).await.unwrap();
        assert_eq!(acquired.recv().await.unwrap(), "HH");
    }
}
