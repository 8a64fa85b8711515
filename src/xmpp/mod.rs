/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

#[cfg(feature = "client")]
mod client;
mod config;
pub mod constants;
mod correlator;
mod error;
mod jid;
mod parser;
mod protocol;
#[cfg(feature = "client")]
mod resolver;
mod send_queue;
#[cfg(feature = "client")]
mod transport;

#[cfg(feature = "client")]
pub use client::CloseHandle;
#[cfg(feature = "client")]
pub use client::XmppClient;
#[cfg(feature = "client")]
pub use client::XmppClientBuilder;
pub use config::ClientConfig;
pub use config::TlsMode;
pub use correlator::Correlator;
pub use error::ClientError;
pub use error::SendError;
pub use error::StreamError;
pub use error::XmppClientError;
pub use jid::BadJid;
pub use jid::JidPart;
pub use jid::Jid;
pub use parser::StreamParser;
pub use protocol::Action;
pub use protocol::ClientEvent;
pub use protocol::ClientProtocol;
pub use protocol::IqDisposition;
pub use protocol::IqFailure;
pub use protocol::IqResult;
pub use protocol::ProtocolState;
pub use protocol::Session;
pub use protocol::Step;
pub use protocol::XmppHandler;
#[cfg(feature = "client")]
pub use resolver::Resolver;
#[cfg(feature = "client")]
pub use resolver::ServerTarget;
#[cfg(feature = "client")]
pub use resolver::SrvResolver;
pub use send_queue::SendCallback;
pub use send_queue::SendQueue;
pub use send_queue::SendStatus;
#[cfg(feature = "client")]
pub use transport::BoxedTransport;
#[cfg(feature = "client")]
pub use transport::Connector;
#[cfg(feature = "client")]
pub use transport::TcpConnector;
#[cfg(feature = "client")]
pub use transport::Transport;
