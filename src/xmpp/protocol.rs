/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::Element;
use crate::ElementKind;
use crate::ErrorType;
use crate::IqType;
use crate::SaslCondition;
use crate::StreamErrorCondition;
use crate::StreamEvent;
use crate::WriteMode;

use super::ClientConfig;
use super::ClientError;
use super::Jid;
use super::SendError;
use super::StreamError;
use super::StreamParser;
use super::TlsMode;
use super::XmppClientError;
use super::constants::CLIENT_NS;
use super::constants::SASL_PLAIN;
use super::correlator::Correlator;
use super::send_queue::SendCallback;
use super::send_queue::SendQueue;
use super::send_queue::SendStatus;

/// Connection lifecycle of a client.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProtocolState {
    Disconnected,
    Resolving,
    Connecting,
    Connected,
    InitializingTls,
    Authenticating,
    Authenticated,
    BindingResource,
    CreatingSession,
    Active,
    Disconnecting,
}

/// A negotiation step guarded by a timeout.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    StreamStart,
    StartTls,
    Authentication,
    ResourceBinding,
    SessionCreation,
    Closing,
}

impl Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Step::StreamStart => "stream start",
            Step::StartTls => "STARTTLS negotiation",
            Step::Authentication => "authentication",
            Step::ResourceBinding => "resource binding",
            Step::SessionCreation => "session creation",
            Step::Closing => "stream close",
        })
    }
}

/// Lifecycle notifications delivered to the [XmppHandler].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClientEvent {
    Connecting,
    Connected,
    InitializingTls,
    InitializedTls,
    Authenticating,
    Authenticated,
    Active,
    Error(ClientError),
    Disconnected,
}

/// Work the I/O driver must perform for the protocol.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Action {
    /// Find the server for the domain, then call
    /// [resolved()](ClientProtocol::resolved) or
    /// [resolve_failed()](ClientProtocol::resolve_failed).
    Resolve { domain: String },
    /// Open a connection, then call [connected()](ClientProtocol::connected)
    /// or [connect_failed()](ClientProtocol::connect_failed).
    Connect { host: String, port: u16 },
    /// Flush pending writes and upgrade the transport, then call
    /// [tls_established()](ClientProtocol::tls_established) or
    /// [tls_failed()](ClientProtocol::tls_failed).
    StartTls { domain: String },
    /// Flush pending writes, close the transport, then call
    /// [transport_closed()](ClientProtocol::transport_closed).
    CloseTransport,
}

/// Why an IQ request got no reply.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IqFailure {
    TimedOut,
    Disconnected,
}

/// Outcome of an IQ request. Error replies from the peer are
/// delivered as `Ok` elements with the `error` type.
pub type IqResult = Result<Element, IqFailure>;

type IqCallback = Box<dyn FnOnce(&mut Session, IqResult)>;

/// Whether the application answered an incoming IQ request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IqDisposition {
    Handled,
    /// The client replies with a `feature-not-implemented` error.
    Unhandled,
}

/// Application callbacks of a client.
///
/// Every method gets the [Session] which can be used to send stanzas
/// or request a close from inside the callback.
pub trait XmppHandler {
    fn handle_event(&mut self, _session: &mut Session, _event: &ClientEvent) {}

    fn handle_message(&mut self, _session: &mut Session, _message: &Element) {}

    fn handle_presence(&mut self, _session: &mut Session, _presence: &Element) {}

    fn handle_iq(&mut self, _session: &mut Session, _iq: &Element) -> IqDisposition {
        IqDisposition::Unhandled
    }

    /// Called for `result` and `error` IQs which answer no request made
    /// with [send_iq()](Session::send_iq), for example replies to IQs the
    /// application sent with its own ids.
    fn handle_iq_reply(&mut self, _session: &mut Session, _reply: &Element) {}
}

/// The application facing side of a connection.
pub struct Session {
    state: ProtocolState,
    jid: Jid,
    now: Instant,
    queue: SendQueue,
    correlator: Correlator<IqCallback>,
    close_requested: bool,
}

impl Session {
    fn new(jid: Jid, iq_timeout: Duration) -> Session {
        Session {
            state: ProtocolState::Disconnected,
            jid,
            now: Instant::now(),
            queue: SendQueue::new(),
            correlator: Correlator::new(iq_timeout),
            close_requested: false,
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == ProtocolState::Active
    }

    /// Our address, the full JID assigned by the server once bound.
    pub fn jid(&self) -> &Jid {
        &self.jid
    }

    /// Number of IQ requests waiting for a reply.
    pub fn pending_iqs(&self) -> usize {
        self.correlator.len()
    }

    /// Queues a stanza.
    pub fn send(&mut self, stanza: &Element) -> Result<(), SendError> {
        self.check_active()?;
        self.queue.push(stanza, WriteMode::Full, None);
        Ok(())
    }

    /// Queues a stanza and calls `on_complete` once it is written or dropped.
    pub fn send_with_callback(
        &mut self,
        stanza: &Element,
        on_complete: impl FnOnce(SendStatus) + 'static,
    ) -> Result<(), SendError> {
        self.check_active()?;
        let callback: SendCallback = Box::new(on_complete);
        self.queue.push(stanza, WriteMode::Full, Some(callback));
        Ok(())
    }

    /// Sends an IQ request and calls `callback` with its reply.
    ///
    /// A fresh id is assigned to the request and returned. The callback
    /// runs exactly once: with the reply, or with a failure if the
    /// request times out or the connection ends first.
    pub fn send_iq(
        &mut self,
        iq: &Element,
        callback: impl FnOnce(&mut Session, IqResult) + 'static,
    ) -> Result<String, SendError> {
        let timeout = self.correlator.timeout();
        self.send_iq_with_timeout(iq, timeout, callback)
    }

    pub fn send_iq_with_timeout(
        &mut self,
        iq: &Element,
        timeout: Duration,
        callback: impl FnOnce(&mut Session, IqResult) + 'static,
    ) -> Result<String, SendError> {
        self.check_active()?;
        let id = self
            .correlator
            .register_with_timeout(Box::new(callback), self.now, timeout);
        iq.set_attribute("id", &id);
        self.queue.push(iq, WriteMode::Full, None);
        Ok(id)
    }

    /// Asks for a graceful close once the current callback returns.
    pub fn close(&mut self) {
        self.close_requested = true;
    }

    fn check_active(&self) -> Result<(), SendError> {
        if self.state != ProtocolState::Active {
            return Err(SendError::NotActive);
        }
        Ok(())
    }

    fn enqueue(&mut self, element: &Element, mode: WriteMode) {
        self.queue.push(element, mode, None);
    }

    fn enqueue_header(&mut self, domain: &str) {
        let mut header = String::from("<?xml version='1.0'?>");
        Element::stream_header(domain).write_to(&mut header, WriteMode::OpenOnly);
        self.queue.push_bytes(header.into_bytes(), None);
    }

    fn enqueue_footer(&mut self) {
        self.queue.push_bytes(b"</stream:stream>".to_vec(), None);
    }
}

fn plain_payload(user: &str, password: &str) -> String {
    let mut message = Vec::with_capacity(user.len() + password.len() + 2);
    message.push(0);
    message.extend_from_slice(user.as_bytes());
    message.push(0);
    message.extend_from_slice(password.as_bytes());
    BASE64.encode(message)
}

/// Client side XMPP protocol engine without any I/O.
///
/// The engine is driven by calling its entry points when something
/// happens on the network or a deadline passes. It reports what it
/// needs from the network through [poll_action()](ClientProtocol::poll_action)
/// and [pending_write()](ClientProtocol::pending_write), and reports
/// everything else to the application through an [XmppHandler].
///
/// A connection goes through resolution, connection, optional STARTTLS,
/// SASL PLAIN authentication, resource binding and session creation
/// before becoming [Active](ProtocolState::Active). Each negotiation
/// step has a timeout. Any failure is reported as exactly one
/// [ClientEvent::Error] followed by [ClientEvent::Disconnected].
pub struct ClientProtocol {
    config: ClientConfig,
    parser: StreamParser,
    session: Session,
    actions: VecDeque<Action>,
    step: Option<(Step, Instant)>,
    expected_id: Option<String>,
    transport_open: bool,
    tls_active: bool,
    tls_pending: bool,
    session_needed: bool,
}

impl ClientProtocol {
    pub fn new(config: ClientConfig) -> Self {
        let session = Session::new(config.jid.clone(), config.iq_timeout);
        ClientProtocol {
            config,
            parser: StreamParser::new(),
            session,
            actions: VecDeque::new(),
            step: None,
            expected_id: None,
            transport_open: false,
            tls_active: false,
            tls_pending: false,
            session_needed: false,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ProtocolState {
        self.session.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn is_tls_active(&self) -> bool {
        self.tls_active
    }

    /// Next thing the driver must do, if any.
    pub fn poll_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    /// Bytes waiting to be written to the transport.
    pub fn pending_write(&self) -> Option<&[u8]> {
        self.session.queue.pending()
    }

    /// Reports that the transport accepted `n` bytes of the pending write.
    pub fn write_completed(&mut self, n: usize) {
        self.session.queue.advance(n);
    }

    /// When [handle_timeout()](ClientProtocol::handle_timeout) should be called next.
    pub fn next_deadline(&self) -> Option<Instant> {
        let step = self.step.map(|(_, deadline)| deadline);
        match (step, self.session.correlator.next_sweep()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    //
    // Entry points
    //

    /// Starts connecting.
    pub fn open(&mut self, handler: &mut impl XmppHandler, now: Instant) -> Result<(), XmppClientError> {
        if self.state() != ProtocolState::Disconnected {
            return Err(XmppClientError::AlreadyOpen);
        }
        self.reset_connection();
        self.session.now = now;
        let domain = self.config.domain().to_string();
        match &self.config.server {
            Some(server) => {
                let action = Action::Connect {
                    host: server.clone(),
                    port: self.config.port,
                };
                self.set_state(ProtocolState::Connecting);
                self.actions.push_back(action);
            }
            None if !self.config.resolve => {
                self.set_state(ProtocolState::Connecting);
                self.actions.push_back(Action::Connect {
                    host: domain,
                    port: self.config.port,
                });
            }
            None => {
                self.set_state(ProtocolState::Resolving);
                self.actions.push_back(Action::Resolve { domain });
            }
        }
        self.emit(handler, ClientEvent::Connecting);
        self.process_requests(handler, now);
        Ok(())
    }

    pub fn resolved(&mut self, handler: &mut impl XmppHandler, host: &str, port: u16, now: Instant) {
        self.session.now = now;
        if self.state() != ProtocolState::Resolving {
            debug!(host, "ignoring late resolution result");
            return;
        }
        debug!(host, port, "server resolved");
        self.set_state(ProtocolState::Connecting);
        self.actions.push_back(Action::Connect {
            host: host.to_string(),
            port,
        });
        self.process_requests(handler, now);
    }

    pub fn resolve_failed(&mut self, handler: &mut impl XmppHandler, now: Instant) {
        self.session.now = now;
        if self.state() == ProtocolState::Resolving {
            self.fail(handler, ClientError::Resolve, None);
        }
        self.process_requests(handler, now);
    }

    pub fn connected(&mut self, handler: &mut impl XmppHandler, now: Instant) {
        self.session.now = now;
        if self.state() != ProtocolState::Connecting {
            debug!("ignoring late connection");
            return;
        }
        self.transport_open = true;
        self.set_state(ProtocolState::Connected);
        self.emit(handler, ClientEvent::Connected);
        self.start_stream(now);
        self.process_requests(handler, now);
    }

    pub fn connect_failed(&mut self, handler: &mut impl XmppHandler, reason: &str, now: Instant) {
        self.session.now = now;
        if self.state() == ProtocolState::Connecting {
            self.fail(handler, ClientError::Connect(reason.to_string()), None);
        }
        self.process_requests(handler, now);
    }

    pub fn tls_established(&mut self, handler: &mut impl XmppHandler, now: Instant) {
        self.session.now = now;
        if self.state() != ProtocolState::InitializingTls || !self.tls_pending {
            debug!("ignoring unexpected TLS completion");
            return;
        }
        self.tls_pending = false;
        self.tls_active = true;
        self.set_state(ProtocolState::Connected);
        self.emit(handler, ClientEvent::InitializedTls);
        self.start_stream(now);
        self.process_requests(handler, now);
    }

    pub fn tls_failed(&mut self, handler: &mut impl XmppHandler, reason: &str, now: Instant) {
        self.session.now = now;
        if self.state() == ProtocolState::InitializingTls {
            self.transport_open = false;
            self.fail(handler, ClientError::TlsHandshake(reason.to_string()), None);
        }
        self.process_requests(handler, now);
    }

    /// Processes bytes read from the transport.
    pub fn receive_bytes(&mut self, handler: &mut impl XmppHandler, bytes: &[u8], now: Instant) {
        self.session.now = now;
        if !self.is_reading() {
            debug!(size = bytes.len(), "ignoring received bytes");
            return;
        }
        trace!(size = bytes.len(), "received bytes");
        self.parser.feed(bytes);
        while self.is_reading() {
            match self.parser.next_event() {
                Ok(Some(event)) => self.handle_stream_event(handler, event, now),
                Ok(None) => break,
                Err(err) => {
                    self.stream_failure(handler, err);
                    break;
                }
            }
        }
        self.process_requests(handler, now);
    }

    /// Fires expired step timers and IQ timeouts.
    pub fn handle_timeout(&mut self, handler: &mut impl XmppHandler, now: Instant) {
        self.session.now = now;
        if let Some((step, deadline)) = self.step {
            if now >= deadline {
                self.step = None;
                if step == Step::Closing {
                    debug!("server did not close its stream in time");
                    self.finish_close(handler);
                } else {
                    self.fail(handler, ClientError::Timeout(step), None);
                }
            }
        }
        for callback in self.session.correlator.sweep(now) {
            callback(&mut self.session, Err(IqFailure::TimedOut));
        }
        self.process_requests(handler, now);
    }

    /// Reports end of file or an I/O error on the transport.
    pub fn connection_lost(&mut self, handler: &mut impl XmppHandler, reason: Option<&str>, now: Instant) {
        self.session.now = now;
        self.transport_open = false;
        match self.state() {
            ProtocolState::Disconnected => (),
            ProtocolState::Disconnecting => self.finish_close(handler),
            _ => self.fail(
                handler,
                ClientError::ConnectionLost(reason.map(str::to_string)),
                None,
            ),
        }
        self.process_requests(handler, now);
    }

    /// Starts a graceful close.
    ///
    /// An established stream is ended with a footer and the transport is
    /// closed when the server answers with its own footer, the close
    /// timeout passes, or the connection drops.
    pub fn close(&mut self, handler: &mut impl XmppHandler, now: Instant) {
        self.session.now = now;
        self.start_close(handler, now);
        self.process_requests(handler, now);
    }

    /// Reports that the transport is gone. Unwritten sends are aborted.
    pub fn transport_closed(&mut self) {
        self.transport_open = false;
        self.session.queue.abort_all();
    }

    //
    // Internals
    //

    fn is_reading(&self) -> bool {
        self.transport_open && !self.tls_pending && self.state() != ProtocolState::Disconnected
    }

    fn set_state(&mut self, state: ProtocolState) {
        if self.session.state != state {
            debug!(from = ?self.session.state, to = ?state, "state change");
            self.session.state = state;
        }
    }

    fn emit(&mut self, handler: &mut impl XmppHandler, event: ClientEvent) {
        debug!(?event, "client event");
        handler.handle_event(&mut self.session, &event);
    }

    fn arm(&mut self, step: Step, now: Instant) {
        let timeout = match step {
            Step::Closing => self.config.close_timeout,
            _ => self.config.step_timeout,
        };
        trace!(%step, ?timeout, "step timer armed");
        self.step = Some((step, now + timeout));
    }

    fn disarm(&mut self) {
        self.step = None;
    }

    fn reset_connection(&mut self) {
        self.parser.reset();
        self.session.queue.abort_all();
        for callback in self.session.correlator.drain() {
            callback(&mut self.session, Err(IqFailure::Disconnected));
        }
        self.session.correlator.reset();
        self.session.jid = self.config.jid.clone();
        self.session.close_requested = false;
        self.actions.clear();
        self.step = None;
        self.expected_id = None;
        self.transport_open = false;
        self.tls_active = false;
        self.tls_pending = false;
        self.session_needed = false;
    }

    fn process_requests(&mut self, handler: &mut impl XmppHandler, now: Instant) {
        while self.session.close_requested {
            self.session.close_requested = false;
            self.start_close(handler, now);
        }
    }

    fn start_stream(&mut self, now: Instant) {
        self.parser.reset();
        self.arm(Step::StreamStart, now);
        let domain = self.config.domain().to_string();
        self.session.enqueue_header(&domain);
    }

    fn start_close(&mut self, handler: &mut impl XmppHandler, now: Instant) {
        match self.state() {
            ProtocolState::Disconnected | ProtocolState::Disconnecting => (),
            ProtocolState::Resolving | ProtocolState::Connecting => {
                info!("connection attempt cancelled");
                self.actions.clear();
                self.actions.push_back(Action::CloseTransport);
                self.teardown(handler);
            }
            _ => {
                if !self.transport_open || self.tls_pending {
                    self.actions.push_back(Action::CloseTransport);
                    self.teardown(handler);
                    return;
                }
                info!("closing the stream");
                self.expected_id = None;
                self.session.enqueue_footer();
                self.set_state(ProtocolState::Disconnecting);
                self.arm(Step::Closing, now);
            }
        }
    }

    fn finish_close(&mut self, handler: &mut impl XmppHandler) {
        self.actions.push_back(Action::CloseTransport);
        self.teardown(handler);
    }

    fn fail(
        &mut self,
        handler: &mut impl XmppHandler,
        error: ClientError,
        condition: Option<StreamErrorCondition>,
    ) {
        if self.state() == ProtocolState::Disconnected {
            return;
        }
        warn!(%error, "connection failed");
        let header_sent = !matches!(
            self.state(),
            ProtocolState::Resolving | ProtocolState::Connecting
        );
        // A closing stream has its footer queued already
        let footer_sent = self.state() == ProtocolState::Disconnecting;
        if self.transport_open && !self.tls_pending && header_sent && !footer_sent {
            if let Some(condition) = condition {
                self.session
                    .enqueue(&Element::stream_error(condition, None), WriteMode::Full);
            }
            self.session.enqueue_footer();
        }
        self.actions.push_back(Action::CloseTransport);
        self.emit(handler, ClientEvent::Error(error));
        self.teardown(handler);
    }

    fn teardown(&mut self, handler: &mut impl XmppHandler) {
        self.step = None;
        self.expected_id = None;
        self.tls_pending = false;
        self.set_state(ProtocolState::Disconnected);
        for callback in self.session.correlator.drain() {
            callback(&mut self.session, Err(IqFailure::Disconnected));
        }
        self.emit(handler, ClientEvent::Disconnected);
    }

    fn stream_failure(&mut self, handler: &mut impl XmppHandler, err: StreamError) {
        let condition = match err {
            StreamError::BadXml(_) => StreamErrorCondition::NotWellFormed,
            StreamError::BadStream(build) if build.is_xml_error() => {
                StreamErrorCondition::NotWellFormed
            }
            StreamError::BadStream(_) => StreamErrorCondition::BadFormat,
        };
        self.fail(handler, ClientError::Xml(err), Some(condition));
    }

    fn handle_stream_event(&mut self, handler: &mut impl XmppHandler, event: StreamEvent, now: Instant) {
        match event {
            StreamEvent::Opened(root) => self.handle_stream_start(handler, &root),
            StreamEvent::Closed => self.handle_stream_end(handler),
            StreamEvent::Stanza(element) => self.handle_element(handler, element, now),
        }
    }

    fn handle_stream_start(&mut self, handler: &mut impl XmppHandler, root: &Element) {
        if root.kind() != ElementKind::Stream {
            let condition = if root.name() == "stream" {
                StreamErrorCondition::InvalidNamespace
            } else {
                StreamErrorCondition::BadFormat
            };
            self.fail(
                handler,
                ClientError::ProtocolViolation("root element is not a stream"),
                Some(condition),
            );
            return;
        }
        if root.resolve_prefix(None).as_deref() != Some(CLIENT_NS) {
            self.fail(
                handler,
                ClientError::ProtocolViolation("stream content namespace is not jabber:client"),
                Some(StreamErrorCondition::InvalidNamespace),
            );
            return;
        }
        debug!(id = ?root.attribute("id"), from = ?root.from(), "stream opened");
    }

    fn handle_stream_end(&mut self, handler: &mut impl XmppHandler) {
        if self.state() == ProtocolState::Disconnecting {
            debug!("server closed its stream");
            self.finish_close(handler);
        } else {
            self.fail(
                handler,
                ClientError::ConnectionLost(Some("server closed the stream".to_string())),
                None,
            );
        }
    }

    fn handle_element(&mut self, handler: &mut impl XmppHandler, element: Element, now: Instant) {
        let state = self.state();
        match element.kind() {
            ElementKind::StreamFeatures => self.handle_features(handler, &element, now),
            ElementKind::StreamError => {
                let error = ClientError::Stream {
                    condition: element.stream_error_condition(),
                    text: element.stream_error_text(),
                };
                self.fail(handler, error, None);
            }
            ElementKind::TlsProceed if state == ProtocolState::InitializingTls => {
                self.disarm();
                self.tls_pending = true;
                self.actions.push_back(Action::StartTls {
                    domain: self.config.domain().to_string(),
                });
            }
            ElementKind::TlsFailure if state == ProtocolState::InitializingTls => {
                self.fail(handler, ClientError::TlsRefused, None);
            }
            ElementKind::SaslChallenge if state == ProtocolState::Authenticating => {
                self.session
                    .enqueue(&Element::sasl_response(""), WriteMode::Full);
            }
            ElementKind::SaslSuccess if state == ProtocolState::Authenticating => {
                self.disarm();
                self.set_state(ProtocolState::Authenticated);
                self.emit(handler, ClientEvent::Authenticated);
                self.start_stream(now);
            }
            ElementKind::SaslFailure if state == ProtocolState::Authenticating => {
                let condition = element.sasl_failure_condition();
                self.fail(handler, ClientError::AuthenticationFailed(condition), None);
            }
            ElementKind::Iq => self.handle_iq(handler, element, now),
            ElementKind::Message if state == ProtocolState::Active => {
                handler.handle_message(&mut self.session, &element);
            }
            ElementKind::Presence if state == ProtocolState::Active => {
                handler.handle_presence(&mut self.session, &element);
            }
            kind => debug!(?kind, ?state, "ignoring element"),
        }
    }

    fn handle_features(&mut self, handler: &mut impl XmppHandler, features: &Element, now: Instant) {
        match self.state() {
            ProtocolState::Connected => {
                self.disarm();
                if !self.tls_active {
                    let offered = features.starttls_offer().is_some();
                    let required = features.starttls_required();
                    match self.config.tls {
                        TlsMode::Disabled if required => {
                            self.fail(handler, ClientError::TlsRequired, None);
                            return;
                        }
                        TlsMode::Required if !offered => {
                            self.fail(handler, ClientError::TlsRequired, None);
                            return;
                        }
                        TlsMode::IfAvailable | TlsMode::Required if offered => {
                            self.begin_tls(handler, now);
                            return;
                        }
                        _ => (),
                    }
                }
                if self.config.authenticate {
                    self.begin_auth(handler, features, now);
                } else {
                    self.begin_binding(handler, features, now);
                }
            }
            ProtocolState::Authenticated => {
                self.disarm();
                self.begin_binding(handler, features, now);
            }
            state => debug!(?state, "ignoring stream features"),
        }
    }

    fn begin_tls(&mut self, handler: &mut impl XmppHandler, now: Instant) {
        self.set_state(ProtocolState::InitializingTls);
        self.emit(handler, ClientEvent::InitializingTls);
        self.arm(Step::StartTls, now);
        self.session.enqueue(&Element::starttls(), WriteMode::Full);
    }

    fn begin_auth(&mut self, handler: &mut impl XmppHandler, features: &Element, now: Instant) {
        self.set_state(ProtocolState::Authenticating);
        self.emit(handler, ClientEvent::Authenticating);
        let mechanisms = features.sasl_mechanisms();
        if !mechanisms.iter().any(|name| name == SASL_PLAIN) {
            debug!(?mechanisms, "no supported SASL mechanism");
            self.fail(
                handler,
                ClientError::AuthenticationFailed(Some(SaslCondition::InvalidMechanism)),
                None,
            );
            return;
        }
        let user = self.config.jid.localpart().unwrap_or_default();
        let payload = plain_payload(user, &self.config.password);
        self.arm(Step::Authentication, now);
        self.session
            .enqueue(&Element::sasl_auth(SASL_PLAIN, &payload), WriteMode::Full);
    }

    fn begin_binding(&mut self, handler: &mut impl XmppHandler, features: &Element, now: Instant) {
        self.session_needed = self.config.create_session
            && features.has_session()
            && !features.session_optional();
        if self.config.bind_resource && features.has_bind() {
            self.set_state(ProtocolState::BindingResource);
            let id = self.session.correlator.next_id();
            self.arm(Step::ResourceBinding, now);
            let request = Element::bind_request(&id, self.config.resource.as_deref());
            self.expected_id = Some(id);
            self.session.enqueue(&request, WriteMode::Full);
        } else {
            self.begin_session(handler, now);
        }
    }

    fn begin_session(&mut self, handler: &mut impl XmppHandler, now: Instant) {
        if self.session_needed {
            self.set_state(ProtocolState::CreatingSession);
            let id = self.session.correlator.next_id();
            self.arm(Step::SessionCreation, now);
            let request = Element::session_request(&id);
            self.expected_id = Some(id);
            self.session.enqueue(&request, WriteMode::Full);
        } else {
            self.become_active(handler);
        }
    }

    fn become_active(&mut self, handler: &mut impl XmppHandler) {
        self.disarm();
        self.expected_id = None;
        self.set_state(ProtocolState::Active);
        if self.config.send_presence {
            let presence = Element::presence();
            if let Some(priority) = self.config.presence_priority {
                presence.set_priority(priority);
            }
            if let Some(status) = &self.config.presence_status {
                presence.set_status(status);
            }
            self.session.enqueue(&presence, WriteMode::Full);
        }
        info!(jid = %self.session.jid, "session is active");
        self.emit(handler, ClientEvent::Active);
    }

    fn handle_iq(&mut self, handler: &mut impl XmppHandler, iq: Element, now: Instant) {
        match iq.iq_type() {
            Some(IqType::Result | IqType::Error) => {
                let Some(id) = iq.id() else {
                    debug!("dropping IQ reply without an id");
                    return;
                };
                if self.expected_id.as_deref() == Some(id.as_str()) {
                    self.expected_id = None;
                    self.handle_negotiation_reply(handler, &iq, now);
                    return;
                }
                match self.session.correlator.resolve(&id) {
                    Some(callback) => callback(&mut self.session, Ok(iq)),
                    None if self.state() == ProtocolState::Active => {
                        handler.handle_iq_reply(&mut self.session, &iq);
                    }
                    None => debug!(%id, "dropping IQ reply with no pending request"),
                }
            }
            Some(IqType::Get | IqType::Set) => {
                let disposition = if self.state() == ProtocolState::Active {
                    handler.handle_iq(&mut self.session, &iq)
                } else {
                    IqDisposition::Unhandled
                };
                if disposition == IqDisposition::Unhandled && self.transport_open {
                    let reply = iq.error_reply(ErrorType::Cancel, "feature-not-implemented");
                    self.session.enqueue(&reply, WriteMode::Full);
                }
            }
            None => warn!(id = ?iq.id(), "ignoring IQ without a valid type"),
        }
    }

    fn handle_negotiation_reply(&mut self, handler: &mut impl XmppHandler, reply: &Element, now: Instant) {
        let success = reply.iq_type() == Some(IqType::Result);
        match self.state() {
            ProtocolState::BindingResource => {
                self.disarm();
                if !success {
                    self.fail(handler, ClientError::BindFailed(reply.error_condition()), None);
                    return;
                }
                if let Some(bound) = reply.bound_jid() {
                    match Jid::new(&bound) {
                        Ok(jid) => self.session.jid = jid,
                        Err(err) => warn!(%err, %bound, "server assigned an invalid JID"),
                    }
                }
                info!(jid = %self.session.jid, "resource bound");
                self.begin_session(handler, now);
            }
            ProtocolState::CreatingSession => {
                self.disarm();
                if !success {
                    self.fail(handler, ClientError::SessionFailed(reply.error_condition()), None);
                    return;
                }
                self.become_active(handler);
            }
            state => debug!(?state, "ignoring negotiation reply"),
        }
    }
}
