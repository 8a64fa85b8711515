/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::fmt::Display;

use super::Element;
use super::ElementKind;
use crate::xmpp::constants::*;

macro_rules! named_values {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Protocol name of the value.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn from_name(name: &str) -> Option<$name> {
                match name {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

named_values! {
    /// The `type` attribute of an IQ stanza.
    IqType {
        Get => "get",
        Set => "set",
        Result => "result",
        Error => "error",
    }
}

named_values! {
    /// The `type` attribute of a message stanza.
    MessageType {
        Normal => "normal",
        Chat => "chat",
        Groupchat => "groupchat",
        Headline => "headline",
        Error => "error",
    }
}

named_values! {
    /// The `type` attribute of a presence stanza, absent for available.
    PresenceType {
        Unavailable => "unavailable",
        Subscribe => "subscribe",
        Subscribed => "subscribed",
        Unsubscribe => "unsubscribe",
        Unsubscribed => "unsubscribed",
        Probe => "probe",
        Error => "error",
    }
}

named_values! {
    PresenceShow {
        Away => "away",
        Chat => "chat",
        Dnd => "dnd",
        Xa => "xa",
    }
}

named_values! {
    /// The `type` attribute of a stanza error.
    ErrorType {
        Auth => "auth",
        Cancel => "cancel",
        Continue => "continue",
        Modify => "modify",
        Wait => "wait",
    }
}

named_values! {
    /// Defined conditions of stream level errors.
    StreamErrorCondition {
        BadFormat => "bad-format",
        BadNamespacePrefix => "bad-namespace-prefix",
        Conflict => "conflict",
        ConnectionTimeout => "connection-timeout",
        HostGone => "host-gone",
        HostUnknown => "host-unknown",
        ImproperAddressing => "improper-addressing",
        InternalServerError => "internal-server-error",
        InvalidFrom => "invalid-from",
        InvalidId => "invalid-id",
        InvalidNamespace => "invalid-namespace",
        InvalidXml => "invalid-xml",
        NotAuthorized => "not-authorized",
        NotWellFormed => "not-well-formed",
        PolicyViolation => "policy-violation",
        RemoteConnectionFailed => "remote-connection-failed",
        Reset => "reset",
        ResourceConstraint => "resource-constraint",
        RestrictedXml => "restricted-xml",
        SeeOtherHost => "see-other-host",
        SystemShutdown => "system-shutdown",
        UndefinedCondition => "undefined-condition",
        UnsupportedEncoding => "unsupported-encoding",
        UnsupportedFeature => "unsupported-feature",
        UnsupportedStanzaType => "unsupported-stanza-type",
        UnsupportedVersion => "unsupported-version",
    }
}

named_values! {
    /// Reasons a server gives for a failed authentication.
    SaslCondition {
        Aborted => "aborted",
        AccountDisabled => "account-disabled",
        CredentialsExpired => "credentials-expired",
        EncryptionRequired => "encryption-required",
        IncorrectEncoding => "incorrect-encoding",
        InvalidAuthzid => "invalid-authzid",
        InvalidMechanism => "invalid-mechanism",
        MalformedRequest => "malformed-request",
        MechanismTooWeak => "mechanism-too-weak",
        NotAuthorized => "not-authorized",
        TemporaryAuthFailure => "temporary-auth-failure",
    }
}

impl StreamErrorCondition {
    fn from_name_lenient(name: &str) -> StreamErrorCondition {
        // Names from the older RFC 3920 still seen in the wild
        match name {
            "xml-not-well-formed" => StreamErrorCondition::NotWellFormed,
            "invalid-namespace-prefix" => StreamErrorCondition::BadNamespacePrefix,
            _ => StreamErrorCondition::from_name(name)
                .unwrap_or(StreamErrorCondition::UndefinedCondition),
        }
    }
}

fn condition_child(parent: &Element, namespace: &str) -> Option<Element> {
    parent.children().into_iter().find(|child| {
        child.name() != "text" && child.namespace_uri().as_deref() == Some(namespace)
    })
}

//
// Builders for outgoing elements
//

impl Element {
    /// The root element of a client stream to the given domain.
    pub fn stream_header(to: &str) -> Element {
        let stream = Element::with_kind(ElementKind::Stream, "stream:stream");
        stream
            .set_attribute("xmlns", CLIENT_NS)
            .set_prefixed_attribute(Some("xmlns"), STREAM_PREFIX, STREAM_NS)
            .set_attribute("to", to)
            .set_attribute("version", "1.0")
            .set_prefixed_attribute(Some("xml"), "lang", "en");
        stream
    }

    /// A stream error to be sent inside an open stream.
    pub fn stream_error(condition: StreamErrorCondition, text: Option<&str>) -> Element {
        let error = Element::with_kind(ElementKind::StreamError, "stream:error");
        error.append_child(Element::with_namespace(condition.as_str(), STREAM_ERROR_NS));
        if let Some(text) = text {
            let child = error.append_child(Element::with_namespace("text", STREAM_ERROR_NS));
            child.set_prefixed_attribute(Some("xml"), "lang", "en");
            child.set_text(text);
        }
        error
    }

    pub fn starttls() -> Element {
        Element::with_namespace("starttls", TLS_NS)
    }

    /// Initial SASL exchange, the payload is already base64 encoded.
    pub fn sasl_auth(mechanism: &str, payload: &str) -> Element {
        let auth = Element::with_namespace("auth", SASL_NS);
        auth.set_attribute("mechanism", mechanism);
        // An empty initial response is sent as a single equals sign
        auth.set_text(if payload.is_empty() { "=" } else { payload });
        auth
    }

    pub fn sasl_response(payload: &str) -> Element {
        let response = Element::with_namespace("response", SASL_NS);
        if !payload.is_empty() {
            response.set_text(payload);
        }
        response
    }

    pub fn iq(iq_type: IqType, id: &str) -> Element {
        let iq = Element::with_kind(ElementKind::Iq, "iq");
        iq.set_attribute("type", iq_type.as_str()).set_attribute("id", id);
        iq
    }

    pub fn bind_request(id: &str, resource: Option<&str>) -> Element {
        let iq = Element::iq(IqType::Set, id);
        let bind = iq.append_child(Element::with_namespace("bind", BIND_NS));
        if let Some(resource) = resource {
            bind.insert_child("resource").set_text(resource);
        }
        iq
    }

    pub fn session_request(id: &str) -> Element {
        let iq = Element::iq(IqType::Set, id);
        iq.append_child(Element::with_namespace("session", SESSION_NS));
        iq
    }

    pub fn message(to: &str, message_type: MessageType, body: &str) -> Element {
        let message = Element::with_kind(ElementKind::Message, "message");
        message.set_attribute("to", to);
        if message_type != MessageType::Normal {
            message.set_attribute("type", message_type.as_str());
        }
        message.insert_child("body").set_text(body);
        message
    }

    pub fn presence() -> Element {
        Element::with_kind(ElementKind::Presence, "presence")
    }

    pub fn presence_of_type(presence_type: PresenceType) -> Element {
        let presence = Element::presence();
        presence.set_attribute("type", presence_type.as_str());
        presence
    }

    /// Sets or replaces the text of a direct child.
    pub fn set_child_text(&self, name: &str, text: &str) -> &Self {
        match self.child(name) {
            Some(child) => {
                child.set_text(text);
            }
            None => {
                self.insert_child(name).set_text(text);
            }
        }
        self
    }

    pub fn set_priority(&self, priority: i8) -> &Self {
        self.set_child_text("priority", &priority.to_string())
    }

    pub fn set_status(&self, status: &str) -> &Self {
        self.set_child_text("status", status)
    }

    pub fn set_show(&self, show: PresenceShow) -> &Self {
        self.set_child_text("show", show.as_str())
    }

    fn reply(&self) -> Element {
        let reply = Element::with_kind(self.kind(), &self.qualified_name());
        if let Some(from) = self.from() {
            reply.set_attribute("to", &from);
        }
        if let Some(id) = self.id() {
            reply.set_attribute("id", &id);
        }
        reply
    }

    /// An empty result for this IQ request.
    pub fn iq_result(&self) -> Element {
        let reply = self.reply();
        reply.set_attribute("type", IqType::Result.as_str());
        reply
    }

    /// An error reply to this stanza with a defined stanza error condition.
    pub fn error_reply(&self, error_type: ErrorType, condition: &str) -> Element {
        let reply = self.reply();
        reply.set_attribute("type", "error");
        let error = reply.insert_child("error");
        error.set_attribute("type", error_type.as_str());
        error.append_child(Element::with_namespace(condition, STANZA_ERROR_NS));
        reply
    }
}

//
// Accessors for incoming elements
//

impl Element {
    pub fn id(&self) -> Option<String> {
        self.attribute("id")
    }

    pub fn to(&self) -> Option<String> {
        self.attribute("to")
    }

    pub fn from(&self) -> Option<String> {
        self.attribute("from")
    }

    pub fn iq_type(&self) -> Option<IqType> {
        self.attribute("type").and_then(|t| IqType::from_name(&t))
    }

    /// Message type, a missing or unknown type means normal.
    pub fn message_type(&self) -> MessageType {
        self.attribute("type")
            .and_then(|t| MessageType::from_name(&t))
            .unwrap_or(MessageType::Normal)
    }

    /// Presence type, None for available presence.
    pub fn presence_type(&self) -> Option<PresenceType> {
        self.attribute("type").and_then(|t| PresenceType::from_name(&t))
    }

    pub fn body(&self) -> Option<String> {
        self.child_text("body")
    }

    pub fn subject(&self) -> Option<String> {
        self.child_text("subject")
    }

    pub fn thread(&self) -> Option<String> {
        self.child_text("thread")
    }

    pub fn show(&self) -> Option<PresenceShow> {
        self.child_text("show")
            .and_then(|s| PresenceShow::from_name(s.trim()))
    }

    pub fn status(&self) -> Option<String> {
        self.child_text("status")
    }

    /// Presence priority, zero when missing or unparsable.
    pub fn priority(&self) -> i8 {
        self.child_text("priority")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(0)
    }

    /// The STARTTLS advertisement in a features element.
    pub fn starttls_offer(&self) -> Option<Element> {
        self.find_child(TLS_NS, "starttls")
    }

    /// True if the features element marks STARTTLS as mandatory.
    pub fn starttls_required(&self) -> bool {
        self.starttls_offer()
            .is_some_and(|offer| offer.find_child(TLS_NS, "required").is_some())
    }

    /// SASL mechanism names advertised in a features element.
    pub fn sasl_mechanisms(&self) -> Vec<String> {
        let Some(mechanisms) = self.find_child(SASL_NS, "mechanisms") else {
            return Vec::new();
        };
        mechanisms
            .children()
            .into_iter()
            .filter(|child| child.name() == "mechanism")
            .filter_map(|child| child.text())
            .map(|name| name.trim().to_string())
            .collect()
    }

    pub fn has_bind(&self) -> bool {
        self.find_child(BIND_NS, "bind").is_some()
    }

    pub fn has_session(&self) -> bool {
        self.find_child(SESSION_NS, "session").is_some()
    }

    /// True if the session feature is advertised as optional.
    pub fn session_optional(&self) -> bool {
        self.find_child(SESSION_NS, "session")
            .is_some_and(|session| session.child("optional").is_some())
    }

    /// The JID assigned in a resource binding result.
    pub fn bound_jid(&self) -> Option<String> {
        self.find_child(BIND_NS, "bind")
            .and_then(|bind| bind.child_text("jid"))
            .map(|jid| jid.trim().to_string())
    }

    pub fn stream_error_condition(&self) -> StreamErrorCondition {
        condition_child(self, STREAM_ERROR_NS)
            .map(|child| StreamErrorCondition::from_name_lenient(child.name()))
            .unwrap_or(StreamErrorCondition::UndefinedCondition)
    }

    pub fn stream_error_text(&self) -> Option<String> {
        self.find_child(STREAM_ERROR_NS, "text")
            .and_then(|text| text.text())
    }

    pub fn sasl_failure_condition(&self) -> Option<SaslCondition> {
        condition_child(self, SASL_NS).and_then(|child| SaslCondition::from_name(child.name()))
    }

    pub fn sasl_failure_text(&self) -> Option<String> {
        self.find_child(SASL_NS, "text").and_then(|text| text.text())
    }

    pub fn error_type(&self) -> Option<ErrorType> {
        self.child("error")
            .and_then(|error| error.attribute("type"))
            .and_then(|t| ErrorType::from_name(&t))
    }

    /// Defined condition of a stanza error.
    pub fn error_condition(&self) -> Option<String> {
        self.child("error")
            .and_then(|error| condition_child(&error, STANZA_ERROR_NS))
            .map(|child| child.name().to_string())
    }
}
