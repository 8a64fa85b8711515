/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::error::Error;
use std::fmt::Display;

use super::protocol::Step;
use crate::BuildError;
use crate::SaslCondition;
use crate::StreamErrorCondition;
use crate::TokenError;

/// Errors from the incoming stream parser.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum StreamError {
    BadXml(TokenError),
    BadStream(BuildError),
}

impl Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamError::BadXml(err) => err.fmt(f),
            StreamError::BadStream(err) => err.fmt(f),
        }
    }
}

impl Error for StreamError {}

impl From<TokenError> for StreamError {
    fn from(err: TokenError) -> Self {
        StreamError::BadXml(err)
    }
}

impl From<BuildError> for StreamError {
    fn from(err: BuildError) -> Self {
        StreamError::BadStream(err)
    }
}

/// Why a connection attempt or an established session failed.
///
/// Exactly one of these is reported per failure, right before the
/// client returns to the disconnected state.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ClientError {
    /// No server could be found for the domain.
    Resolve,
    Connect(String),
    /// The server sent malformed XML.
    Xml(StreamError),
    /// The server broke a stream level rule.
    ProtocolViolation(&'static str),
    /// The server reported a stream error.
    Stream {
        condition: StreamErrorCondition,
        text: Option<String>,
    },
    /// TLS was required by one side but cannot be used.
    TlsRequired,
    /// The server refused to start TLS.
    TlsRefused,
    TlsHandshake(String),
    AuthenticationFailed(Option<SaslCondition>),
    BindFailed(Option<String>),
    SessionFailed(Option<String>),
    Timeout(Step),
    ConnectionLost(Option<String>),
}

impl Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Resolve => write!(f, "cannot resolve server address"),
            ClientError::Connect(msg) => write!(f, "cannot connect to server: {msg}"),
            ClientError::Xml(err) => err.fmt(f),
            ClientError::ProtocolViolation(msg) => write!(f, "invalid stream protocol: {msg}"),
            ClientError::Stream { condition, text } => match text {
                Some(text) => write!(f, "stream error: {condition} ({text})"),
                None => write!(f, "stream error: {condition}"),
            },
            ClientError::TlsRequired => write!(f, "TLS is required but not available"),
            ClientError::TlsRefused => write!(f, "server refused to start TLS"),
            ClientError::TlsHandshake(msg) => write!(f, "TLS handshake failed: {msg}"),
            ClientError::AuthenticationFailed(condition) => match condition {
                Some(condition) => write!(f, "authentication failed: {condition}"),
                None => write!(f, "authentication failed"),
            },
            ClientError::BindFailed(condition) => match condition {
                Some(condition) => write!(f, "resource binding failed: {condition}"),
                None => write!(f, "resource binding failed"),
            },
            ClientError::SessionFailed(condition) => match condition {
                Some(condition) => write!(f, "session creation failed: {condition}"),
                None => write!(f, "session creation failed"),
            },
            ClientError::Timeout(step) => write!(f, "timed out during {step}"),
            ClientError::ConnectionLost(reason) => match reason {
                Some(reason) => write!(f, "connection lost: {reason}"),
                None => write!(f, "connection closed by server"),
            },
        }
    }
}

impl Error for ClientError {}

/// Returned when a stanza cannot be queued.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum SendError {
    /// Stanzas can only be sent once the session is active.
    NotActive,
}

impl Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::NotActive => write!(f, "session is not active"),
        }
    }
}

impl Error for SendError {}

#[derive(Debug)]
pub enum XmppClientError {
    /// The client is already connecting or connected.
    AlreadyOpen,
    /// The connection ended because of this failure.
    Failed(ClientError),
    IOError(std::io::Error),
}

impl Display for XmppClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            XmppClientError::AlreadyOpen => write!(f, "client is already open"),
            XmppClientError::Failed(err) => err.fmt(f),
            XmppClientError::IOError(err) => err.fmt(f),
        }
    }
}

impl Error for XmppClientError {}

impl From<ClientError> for XmppClientError {
    fn from(err: ClientError) -> Self {
        XmppClientError::Failed(err)
    }
}

impl From<std::io::Error> for XmppClientError {
    fn from(err: std::io::Error) -> Self {
        XmppClientError::IOError(err)
    }
}
