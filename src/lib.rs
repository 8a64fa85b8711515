/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! Incremental XML stream tokenizer and XMPP client protocol engine.
//!
//! The [Tokenizer] turns bytes arriving in arbitrary chunks into tokens,
//! the [ElementBuilder] assembles those into [Element] trees, and the
//! [ClientProtocol] drives an XMPP client connection over them without
//! doing any I/O itself. With the `client` feature, [XmppClient] runs
//! the protocol over TCP and TLS using tokio.

mod element;
pub mod entities;
mod tokenizer;
mod xmpp;

pub use tokenizer::Location;
pub use tokenizer::Node;
pub use tokenizer::NodeKind;
pub use tokenizer::Token;
pub use tokenizer::TokenAttribute;
pub use tokenizer::TokenError;
pub use tokenizer::TokenErrorKind;
pub use tokenizer::Tokenizer;

pub use element::Attribute;
pub use element::BuildError;
pub use element::Element;
pub use element::ElementBuilder;
pub use element::ElementKind;
pub use element::ErrorType;
pub use element::IqType;
pub use element::MessageType;
pub use element::PresenceShow;
pub use element::PresenceType;
pub use element::SaslCondition;
pub use element::StreamErrorCondition;
pub use element::StreamEvent;
pub use element::WriteMode;

pub use xmpp::Action;
pub use xmpp::BadJid;
pub use xmpp::ClientConfig;
pub use xmpp::ClientError;
pub use xmpp::ClientEvent;
pub use xmpp::ClientProtocol;
pub use xmpp::Correlator;
pub use xmpp::IqDisposition;
pub use xmpp::IqFailure;
pub use xmpp::IqResult;
pub use xmpp::Jid;
pub use xmpp::JidPart;
pub use xmpp::ProtocolState;
pub use xmpp::SendCallback;
pub use xmpp::SendError;
pub use xmpp::SendQueue;
pub use xmpp::SendStatus;
pub use xmpp::Session;
pub use xmpp::Step;
pub use xmpp::StreamError;
pub use xmpp::StreamParser;
pub use xmpp::TlsMode;
pub use xmpp::XmppClientError;
pub use xmpp::XmppHandler;
pub use xmpp::constants;

#[cfg(feature = "client")]
pub use xmpp::BoxedTransport;
#[cfg(feature = "client")]
pub use xmpp::CloseHandle;
#[cfg(feature = "client")]
pub use xmpp::Connector;
#[cfg(feature = "client")]
pub use xmpp::Resolver;
#[cfg(feature = "client")]
pub use xmpp::ServerTarget;
#[cfg(feature = "client")]
pub use xmpp::SrvResolver;
#[cfg(feature = "client")]
pub use xmpp::TcpConnector;
#[cfg(feature = "client")]
pub use xmpp::Transport;
#[cfg(feature = "client")]
pub use xmpp::XmppClient;
#[cfg(feature = "client")]
pub use xmpp::XmppClientBuilder;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
