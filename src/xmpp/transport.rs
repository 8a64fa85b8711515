/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::future::Future;
use std::io;
use std::sync::Arc;

use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls::pki_types::ServerName;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// A byte stream the client can run over.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

pub type BoxedTransport = Box<dyn Transport>;

/// Opens connections and upgrades them to TLS.
pub trait Connector {
    fn connect(&self, host: &str, port: u16) -> impl Future<Output = io::Result<BoxedTransport>>;

    /// Runs a TLS handshake over an established connection, verifying
    /// the certificate against the XMPP domain.
    fn start_tls(
        &self,
        transport: BoxedTransport,
        domain: &str,
    ) -> impl Future<Output = io::Result<BoxedTransport>>;
}

/// TCP connections with rustls for STARTTLS.
#[derive(Clone)]
pub struct TcpConnector {
    tls_config: Arc<ClientConfig>,
}

impl TcpConnector {
    /// Creates a connector trusting the Mozilla root certificates.
    pub fn new() -> io::Result<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(io::Error::other)?
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Self::with_tls_config(Arc::new(config)))
    }

    pub fn with_tls_config(tls_config: Arc<ClientConfig>) -> Self {
        TcpConnector { tls_config }
    }
}

impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> io::Result<BoxedTransport> {
        debug!(host, port, "connecting");
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        debug!(peer = ?stream.peer_addr().ok(), "tcp connection established");
        Ok(Box::new(stream))
    }

    async fn start_tls(&self, transport: BoxedTransport, domain: &str) -> io::Result<BoxedTransport> {
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let connector = TlsConnector::from(self.tls_config.clone());
        let stream = connector.connect(server_name, transport).await?;
        let (_, connection) = stream.get_ref();
        debug!(
            version = ?connection.protocol_version(),
            cipher = ?connection.negotiated_cipher_suite().map(|suite| suite.suite()),
            "TLS handshake complete"
        );
        Ok(Box::new(stream))
    }
}
