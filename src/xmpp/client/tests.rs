/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::io;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::DuplexStream;

use super::*;
use crate::MessageType;
use crate::ServerTarget;
use crate::StreamErrorCondition;

const SERVER_HEADER: &str = "<?xml version='1.0'?><stream:stream xmlns='jabber:client' \
    xmlns:stream='http://etherx.jabber.org/streams' id='c2s1' from='example.com' version='1.0'>";

const END_OF_CLIENT_HEADER: &str = "xml:lang='en'>";

struct MockConnector {
    stream: Mutex<Option<DuplexStream>>,
    upgrades: AtomicUsize,
}

impl MockConnector {
    fn new(stream: Option<DuplexStream>) -> MockConnector {
        MockConnector {
            stream: Mutex::new(stream),
            upgrades: AtomicUsize::new(0),
        }
    }
}

impl Connector for MockConnector {
    async fn connect(&self, _host: &str, _port: u16) -> io::Result<BoxedTransport> {
        match self.stream.lock().unwrap().take() {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(io::Error::new(io::ErrorKind::ConnectionRefused, "no server")),
        }
    }

    async fn start_tls(&self, transport: BoxedTransport, _domain: &str) -> io::Result<BoxedTransport> {
        self.upgrades.fetch_add(1, Ordering::SeqCst);
        Ok(transport)
    }
}

struct StaticResolver;

impl Resolver for StaticResolver {
    async fn resolve(&self, _domain: &str) -> Option<ServerTarget> {
        Some(ServerTarget {
            host: "xmpp.example.com".to_string(),
            port: 5222,
        })
    }
}

struct NeverResolver;

impl Resolver for NeverResolver {
    async fn resolve(&self, _domain: &str) -> Option<ServerTarget> {
        std::future::pending().await
    }
}

#[derive(Default)]
struct Greeter {
    events: Vec<ClientEvent>,
}

impl XmppHandler for Greeter {
    fn handle_event(&mut self, session: &mut Session, event: &ClientEvent) {
        self.events.push(event.clone());
        if *event == ClientEvent::Active {
            let message = Element::message("romeo@example.net", MessageType::Chat, "Hello");
            session.send(&message).unwrap();
            session.close();
        }
    }
}

struct Server {
    stream: DuplexStream,
    seen: String,
}

impl Server {
    async fn expect(&mut self, needle: &str) {
        let mut buffer = [0u8; 1024];
        while !self.seen.contains(needle) {
            let n = self.stream.read(&mut buffer).await.unwrap();
            assert!(n > 0, "client closed before sending {needle}");
            self.seen.push_str(std::str::from_utf8(&buffer[..n]).unwrap());
        }
        let end = self.seen.find(needle).unwrap() + needle.len();
        self.seen.drain(..end);
    }

    async fn send(&mut self, data: &str) {
        self.stream.write_all(data.as_bytes()).await.unwrap();
    }

    async fn wait_for_eof(&mut self) {
        let mut buffer = [0u8; 1024];
        while self.stream.read(&mut buffer).await.unwrap_or(0) > 0 {}
    }
}

fn config() -> ClientConfig {
    ClientConfig::new(Jid::new("juliet@example.com/balcony").unwrap(), "secret")
}

#[tokio::test]
async fn session_over_duplex() {
    let (client_end, server_end) = tokio::io::duplex(4096);
    let server = tokio::spawn(async move {
        let mut server = Server {
            stream: server_end,
            seen: String::new(),
        };
        server.expect(END_OF_CLIENT_HEADER).await;
        server.send(SERVER_HEADER).await;
        server
            .send(
                "<stream:features><starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>\
                 </stream:features>",
            )
            .await;
        server.expect("<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>").await;
        server.send("<proceed xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>").await;

        server.expect(END_OF_CLIENT_HEADER).await;
        server.send(SERVER_HEADER).await;
        server
            .send(
                "<stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
                 <mechanism>PLAIN</mechanism></mechanisms></stream:features>",
            )
            .await;
        server.expect("AGp1bGlldABzZWNyZXQ=</auth>").await;
        server.send("<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>").await;

        server.expect(END_OF_CLIENT_HEADER).await;
        server.send(SERVER_HEADER).await;
        server
            .send(
                "<stream:features><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/>\
                 <session xmlns='urn:ietf:params:xml:ns:xmpp-session'/></stream:features>",
            )
            .await;
        server.expect("<resource>balcony</resource></bind></iq>").await;
        server
            .send(
                "<iq type='result' id='1'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'>\
                 <jid>juliet@example.com/balcony</jid></bind></iq>",
            )
            .await;
        server.expect("xmpp-session'/></iq>").await;
        server.send("<iq type='result' id='2'/>").await;

        server.expect("<presence/>").await;
        server
            .expect("<message to='romeo@example.net' type='chat'><body>Hello</body></message>")
            .await;
        server.expect("</stream:stream>").await;
        server.send("</stream:stream>").await;
        server.wait_for_eof().await;
    });

    let connector = MockConnector::new(Some(client_end));
    let mut client = XmppClient::new(config(), connector, StaticResolver);
    let mut handler = Greeter::default();
    let result = tokio::time::timeout(Duration::from_secs(10), client.run(&mut handler))
        .await
        .unwrap();
    assert!(result.is_ok());
    server.await.unwrap();

    assert_eq!(client.connector.upgrades.load(Ordering::SeqCst), 1);
    assert_eq!(client.protocol().state(), ProtocolState::Disconnected);
    assert_eq!(
        handler.events,
        vec![
            ClientEvent::Connecting,
            ClientEvent::Connected,
            ClientEvent::InitializingTls,
            ClientEvent::InitializedTls,
            ClientEvent::Authenticating,
            ClientEvent::Authenticated,
            ClientEvent::Active,
            ClientEvent::Disconnected,
        ]
    );
}

#[tokio::test]
async fn stream_error_ends_run() {
    let (client_end, server_end) = tokio::io::duplex(4096);
    let server = tokio::spawn(async move {
        let mut server = Server {
            stream: server_end,
            seen: String::new(),
        };
        server.expect(END_OF_CLIENT_HEADER).await;
        server.send(SERVER_HEADER).await;
        server
            .send(
                "<stream:error><system-shutdown xmlns='urn:ietf:params:xml:ns:xmpp-streams'/>\
                 </stream:error></stream:stream>",
            )
            .await;
        server.expect("</stream:stream>").await;
        server.wait_for_eof().await;
    });

    let connector = MockConnector::new(Some(client_end));
    let mut client = XmppClient::new(config(), connector, StaticResolver);
    let mut handler = Greeter::default();
    let result = tokio::time::timeout(Duration::from_secs(10), client.run(&mut handler))
        .await
        .unwrap();
    server.await.unwrap();
    match result {
        Err(XmppClientError::Failed(ClientError::Stream { condition, text })) => {
            assert_eq!(condition, StreamErrorCondition::SystemShutdown);
            assert_eq!(text, None);
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert_eq!(handler.events.last(), Some(&ClientEvent::Disconnected));
}

#[tokio::test]
async fn connection_refused() {
    let connector = MockConnector::new(None);
    let mut client = XmppClient::new(config(), connector, StaticResolver);
    let mut handler = Greeter::default();
    let result = client.run(&mut handler).await;
    assert!(matches!(
        result,
        Err(XmppClientError::Failed(ClientError::Connect(ref reason))) if reason == "no server"
    ));
    assert_eq!(
        handler.events,
        vec![
            ClientEvent::Connecting,
            ClientEvent::Error(ClientError::Connect("no server".to_string())),
            ClientEvent::Disconnected,
        ]
    );

    // The same client can try again
    let result = client.run(&mut handler).await;
    assert!(matches!(result, Err(XmppClientError::Failed(_))));
}

#[tokio::test]
async fn close_during_resolution() {
    let connector = MockConnector::new(None);
    let mut client = XmppClient::new(config(), connector, NeverResolver);
    client.close_handle().close();
    let mut handler = Greeter::default();
    let result = tokio::time::timeout(Duration::from_secs(10), client.run(&mut handler))
        .await
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(
        handler.events,
        vec![ClientEvent::Connecting, ClientEvent::Disconnected]
    );
}

#[tokio::test]
async fn live_protocol_without_transport() {
    let connector = MockConnector::new(None);
    let mut client = XmppClient::new(config(), connector, StaticResolver);
    let mut handler = Greeter::default();
    let now = Instant::now();
    client.protocol.open(&mut handler, now).unwrap();
    client
        .protocol
        .resolved(&mut handler, "xmpp.example.com", 5222, now);
    client.protocol.connected(&mut handler, now);
    while client.protocol.poll_action().is_some() {}
    assert_eq!(client.protocol().state(), ProtocolState::Connected);

    client.drive(&mut handler, None).await;
    assert_eq!(client.protocol().state(), ProtocolState::Disconnected);
    assert_eq!(
        handler.events[handler.events.len() - 2..],
        [
            ClientEvent::Error(ClientError::ConnectionLost(Some("no transport".to_string()))),
            ClientEvent::Disconnected,
        ]
    );

    // Not left open, so the next run starts a new attempt
    let result = client.run(&mut handler).await;
    assert!(matches!(
        result,
        Err(XmppClientError::Failed(ClientError::Connect(_)))
    ));
}

#[test]
fn builder_settings() {
    let jid = Jid::new("juliet@example.com/balcony").unwrap();
    let config = XmppClientBuilder::new(jid, "secret")
        .server(Some("10.0.0.1".to_string()))
        .port(5223)
        .tls(TlsMode::Required)
        .resource(Some("garden".to_string()))
        .presence(Some(-1), None)
        .iq_timeout(Duration::from_secs(5))
        .config();
    assert_eq!(config.server.as_deref(), Some("10.0.0.1"));
    assert_eq!(config.port, 5223);
    assert_eq!(config.tls, TlsMode::Required);
    assert_eq!(config.resource.as_deref(), Some("garden"));
    assert_eq!(config.presence_priority, Some(-1));
    assert_eq!(config.iq_timeout, Duration::from_secs(5));
    assert_eq!(config.domain(), "example.com");
}
