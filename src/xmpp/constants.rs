/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

pub const CLIENT_PORT: u16 = 5222;

pub const CLIENT_SRV_SERVICE: &str = "_xmpp-client._tcp";

pub const STREAM_PREFIX: &str = "stream";

pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

pub const STREAM_NS: &str = "http://etherx.jabber.org/streams";

pub const CLIENT_NS: &str = "jabber:client";

pub const STREAM_ERROR_NS: &str = "urn:ietf:params:xml:ns:xmpp-streams";

pub const STANZA_ERROR_NS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";

pub const TLS_NS: &str = "urn:ietf:params:xml:ns:xmpp-tls";

pub const SASL_NS: &str = "urn:ietf:params:xml:ns:xmpp-sasl";

pub const BIND_NS: &str = "urn:ietf:params:xml:ns:xmpp-bind";

pub const SESSION_NS: &str = "urn:ietf:params:xml:ns:xmpp-session";

pub const SASL_PLAIN: &str = "PLAIN";
