/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::ReadHalf;
use tokio::io::WriteHalf;
use tokio::sync::Notify;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::Element;

use super::Action;
use super::ClientConfig;
use super::ClientError;
use super::ClientEvent;
use super::ClientProtocol;
use super::IqDisposition;
use super::Jid;
use super::ProtocolState;
use super::Session;
use super::TlsMode;
use super::XmppClientError;
use super::XmppHandler;
use super::resolver::Resolver;
use super::resolver::SrvResolver;
use super::transport::BoxedTransport;
use super::transport::Connector;
use super::transport::TcpConnector;

const READ_BUFFER_SIZE: usize = 4096;

type Halves = (ReadHalf<BoxedTransport>, WriteHalf<BoxedTransport>);

/// Builder for [XmppClient] with the default TCP connector and SRV resolver.
pub struct XmppClientBuilder {
    config: ClientConfig,
}

impl XmppClientBuilder {
    pub fn new(jid: Jid, password: &str) -> Self {
        XmppClientBuilder {
            config: ClientConfig::new(jid, password),
        }
    }

    /// Connects to this server instead of resolving the domain.
    pub fn server(mut self, server: Option<String>) -> Self {
        self.config.server = server;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn resolve(mut self, resolve: bool) -> Self {
        self.config.resolve = resolve;
        self
    }

    pub fn tls(mut self, tls: TlsMode) -> Self {
        self.config.tls = tls;
        self
    }

    pub fn authenticate(mut self, authenticate: bool) -> Self {
        self.config.authenticate = authenticate;
        self
    }

    pub fn resource(mut self, resource: Option<String>) -> Self {
        self.config.resource = resource;
        self
    }

    pub fn bind_resource(mut self, bind_resource: bool) -> Self {
        self.config.bind_resource = bind_resource;
        self
    }

    pub fn create_session(mut self, create_session: bool) -> Self {
        self.config.create_session = create_session;
        self
    }

    pub fn send_presence(mut self, send_presence: bool) -> Self {
        self.config.send_presence = send_presence;
        self
    }

    pub fn presence(mut self, priority: Option<i8>, status: Option<String>) -> Self {
        self.config.presence_priority = priority;
        self.config.presence_status = status;
        self
    }

    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        self.config.step_timeout = timeout;
        self
    }

    pub fn iq_timeout(mut self, timeout: Duration) -> Self {
        self.config.iq_timeout = timeout;
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    pub fn config(self) -> ClientConfig {
        self.config
    }

    pub fn build(self) -> Result<XmppClient, XmppClientError> {
        let connector = TcpConnector::new()?;
        Ok(XmppClient::new(self.config, connector, SrvResolver))
    }
}

/// Requests a graceful close of a running client from anywhere.
#[derive(Clone)]
pub struct CloseHandle(Arc<Notify>);

impl CloseHandle {
    pub fn close(&self) {
        self.0.notify_one();
    }
}

/// Runs a [ClientProtocol] over real connections.
///
/// The driver owns the transport. It reads, writes at most one pending
/// chunk at a time, and fires timers, feeding everything into the
/// protocol engine on a single task.
pub struct XmppClient<C = TcpConnector, R = SrvResolver> {
    protocol: ClientProtocol,
    connector: C,
    resolver: R,
    close_signal: Arc<Notify>,
}

impl<C: Connector, R: Resolver> XmppClient<C, R> {
    pub fn new(config: ClientConfig, connector: C, resolver: R) -> Self {
        XmppClient {
            protocol: ClientProtocol::new(config),
            connector,
            resolver,
            close_signal: Arc::new(Notify::new()),
        }
    }

    pub fn protocol(&self) -> &ClientProtocol {
        &self.protocol
    }

    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle(self.close_signal.clone())
    }

    /// Connects and runs until the connection ends.
    ///
    /// Returns the failure if the connection ended with one. The client
    /// can be run again afterwards to reconnect.
    pub async fn run(&mut self, handler: &mut impl XmppHandler) -> Result<(), XmppClientError> {
        let mut failure = FailureTracker {
            handler,
            failure: None,
        };
        self.protocol.open(&mut failure, Instant::now())?;
        self.drive(&mut failure, None).await;

        match failure.failure {
            Some(err) => Err(XmppClientError::Failed(err)),
            None => Ok(()),
        }
    }

    // Performs actions and moves bytes until the protocol disconnects.
    async fn drive(&mut self, handler: &mut impl XmppHandler, mut io: Option<Halves>) {
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];

        loop {
            while let Some(action) = self.protocol.poll_action() {
                self.perform(&mut *handler, action, &mut io).await;
            }
            if self.protocol.state() == ProtocolState::Disconnected {
                if let Some(halves) = io.take() {
                    self.shutdown(halves).await;
                }
                break;
            }
            let Some((reader, writer)) = io.as_mut() else {
                // Waiting on resolution or connection happens in perform()
                warn!(state = ?self.protocol.state(), "no transport to drive");
                self.protocol
                    .connection_lost(&mut *handler, Some("no transport"), Instant::now());
                continue;
            };

            let has_write = self.protocol.pending_write().is_some();
            let deadline = self.protocol.next_deadline();
            tokio::select! {
                result = reader.read(&mut buffer) => {
                    let now = Instant::now();
                    match result {
                        Ok(0) => self.protocol.connection_lost(&mut *handler, None, now),
                        Ok(n) => self.protocol.receive_bytes(&mut *handler, &buffer[..n], now),
                        Err(err) => {
                            let reason = err.to_string();
                            self.protocol.connection_lost(&mut *handler, Some(&reason), now);
                        }
                    }
                }
                result = writer.write(self.protocol.pending_write().unwrap_or_default()), if has_write => {
                    match result {
                        Ok(0) => {
                            self.protocol.connection_lost(&mut *handler, Some("write returned zero"), Instant::now());
                        }
                        Ok(n) => {
                            trace!(size = n, "written");
                            self.protocol.write_completed(n);
                            if self.protocol.pending_write().is_none() {
                                if let Err(err) = writer.flush().await {
                                    let reason = err.to_string();
                                    self.protocol.connection_lost(&mut *handler, Some(&reason), Instant::now());
                                }
                            }
                        }
                        Err(err) => {
                            let reason = err.to_string();
                            self.protocol.connection_lost(&mut *handler, Some(&reason), Instant::now());
                        }
                    }
                }
                _ = sleep_until(deadline), if deadline.is_some() => {
                    self.protocol.handle_timeout(&mut *handler, Instant::now());
                }
                _ = self.close_signal.notified() => {
                    self.protocol.close(&mut *handler, Instant::now());
                }
            }
        }
    }

    async fn perform(&mut self, handler: &mut impl XmppHandler, action: Action, io: &mut Option<Halves>) {
        match action {
            Action::Resolve { domain } => {
                let target = tokio::select! {
                    target = self.resolver.resolve(&domain) => target,
                    _ = self.close_signal.notified() => {
                        self.protocol.close(handler, Instant::now());
                        return;
                    }
                };
                let now = Instant::now();
                match target {
                    Some(target) => self.protocol.resolved(handler, &target.host, target.port, now),
                    None => self.protocol.resolve_failed(handler, now),
                }
            }
            Action::Connect { host, port } => {
                let timeout = self.protocol.config().connect_timeout;
                let result = tokio::select! {
                    result = tokio::time::timeout(timeout, self.connector.connect(&host, port)) => result,
                    _ = self.close_signal.notified() => {
                        self.protocol.close(handler, Instant::now());
                        return;
                    }
                };
                let now = Instant::now();
                match result {
                    Ok(Ok(transport)) => {
                        *io = Some(tokio::io::split(transport));
                        self.protocol.connected(handler, now);
                    }
                    Ok(Err(err)) => {
                        self.protocol.connect_failed(handler, &err.to_string(), now);
                    }
                    Err(_) => self.protocol.connect_failed(handler, "connection timed out", now),
                }
            }
            Action::StartTls { domain } => {
                let Some((reader, mut writer)) = io.take() else {
                    self.protocol.tls_failed(handler, "no connection", Instant::now());
                    return;
                };
                if let Err(err) = self.flush(&mut writer).await {
                    self.protocol.tls_failed(handler, &err.to_string(), Instant::now());
                    return;
                }
                let transport = reader.unsplit(writer);
                let timeout = self.protocol.config().step_timeout;
                let result = tokio::time::timeout(timeout, self.connector.start_tls(transport, &domain)).await;
                let now = Instant::now();
                match result {
                    Ok(Ok(transport)) => {
                        *io = Some(tokio::io::split(transport));
                        self.protocol.tls_established(handler, now);
                    }
                    Ok(Err(err)) => self.protocol.tls_failed(handler, &err.to_string(), now),
                    Err(_) => self.protocol.tls_failed(handler, "TLS handshake timed out", now),
                }
            }
            Action::CloseTransport => {
                if let Some(halves) = io.take() {
                    self.shutdown(halves).await;
                } else {
                    self.protocol.transport_closed();
                }
            }
        }
    }

    // Writes everything queued, used before handing the transport over.
    async fn flush(&mut self, writer: &mut WriteHalf<BoxedTransport>) -> std::io::Result<()> {
        while let Some(bytes) = self.protocol.pending_write() {
            let n = writer.write(bytes).await?;
            if n == 0 {
                return Err(std::io::ErrorKind::WriteZero.into());
            }
            self.protocol.write_completed(n);
        }
        writer.flush().await
    }

    async fn shutdown(&mut self, (reader, mut writer): Halves) {
        let timeout = self.protocol.config().close_timeout;
        match tokio::time::timeout(timeout, self.flush(&mut writer)).await {
            Ok(Ok(())) => (),
            Ok(Err(err)) => debug!(%err, "cannot flush before closing"),
            Err(_) => debug!("flush before closing timed out"),
        }
        let mut transport = reader.unsplit(writer);
        if let Err(err) = transport.shutdown().await {
            debug!(%err, "transport shutdown failed");
        }
        self.protocol.transport_closed();
        debug!("transport closed");
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
    }
}

// Wraps the application handler to remember the failure of a run.
struct FailureTracker<'a, H: XmppHandler> {
    handler: &'a mut H,
    failure: Option<ClientError>,
}

impl<H: XmppHandler> XmppHandler for FailureTracker<'_, H> {
    fn handle_event(&mut self, session: &mut Session, event: &ClientEvent) {
        if let ClientEvent::Error(err) = event {
            self.failure = Some(err.clone());
        }
        self.handler.handle_event(session, event);
    }

    fn handle_message(&mut self, session: &mut Session, message: &Element) {
        self.handler.handle_message(session, message);
    }

    fn handle_presence(&mut self, session: &mut Session, presence: &Element) {
        self.handler.handle_presence(session, presence);
    }

    fn handle_iq(&mut self, session: &mut Session, iq: &Element) -> IqDisposition {
        self.handler.handle_iq(session, iq)
    }

    fn handle_iq_reply(&mut self, session: &mut Session, reply: &Element) {
        self.handler.handle_iq_reply(session, reply);
    }
}

#[cfg(test)]
mod tests;
