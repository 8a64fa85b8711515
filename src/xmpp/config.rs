/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::time::Duration;

use super::Jid;
use super::constants::CLIENT_PORT;

/// When to upgrade the connection with STARTTLS.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TlsMode {
    /// Never start TLS. Fails if the server requires it.
    Disabled,
    /// Start TLS if the server offers it.
    #[default]
    IfAvailable,
    /// Fail unless the server offers TLS.
    Required,
}

/// Settings of a client connection.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub jid: Jid,
    pub password: String,
    /// Connect to this host instead of resolving the JID domain.
    pub server: Option<String>,
    pub port: u16,
    /// Look up the SRV record of the domain when no server is given.
    pub resolve: bool,
    pub tls: TlsMode,
    pub authenticate: bool,
    pub bind_resource: bool,
    pub create_session: bool,
    /// Resource requested during binding. Defaults to the JID resource.
    pub resource: Option<String>,
    pub send_presence: bool,
    pub presence_priority: Option<i8>,
    pub presence_status: Option<String>,
    /// Limit for each negotiation step.
    pub step_timeout: Duration,
    /// Default limit for IQ requests sent by the application.
    pub iq_timeout: Duration,
    pub connect_timeout: Duration,
    /// How long to wait for the server to close its stream.
    pub close_timeout: Duration,
}

impl ClientConfig {
    pub fn new(jid: Jid, password: &str) -> ClientConfig {
        let resource = jid.resourcepart().map(str::to_string);
        ClientConfig {
            jid,
            password: password.to_string(),
            server: None,
            port: CLIENT_PORT,
            resolve: true,
            tls: TlsMode::IfAvailable,
            authenticate: true,
            bind_resource: true,
            create_session: true,
            resource,
            send_presence: true,
            presence_priority: None,
            presence_status: None,
            step_timeout: Duration::from_secs(30),
            iq_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(15),
            close_timeout: Duration::from_secs(5),
        }
    }

    /// The domain the stream is opened to.
    pub fn domain(&self) -> &str {
        self.jid.domainpart()
    }
}
