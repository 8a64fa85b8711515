/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use crate::xmpp::constants::*;

/// Protocol role of an element, decided once when it is created.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ElementKind {
    Stream,
    StreamFeatures,
    StreamError,
    Iq,
    IqError,
    Message,
    Presence,
    StartTls,
    TlsProceed,
    TlsFailure,
    SaslMechanisms,
    SaslAuth,
    SaslChallenge,
    SaslResponse,
    SaslSuccess,
    SaslFailure,
    SaslAbort,
    Bind,
    Session,
    Unknown,
}

struct KindEntry {
    namespace: &'static str,
    name: &'static str,
    // None matches under any parent
    parent: Option<ElementKind>,
    kind: ElementKind,
}

const fn entry(
    namespace: &'static str,
    name: &'static str,
    parent: Option<ElementKind>,
    kind: ElementKind,
) -> KindEntry {
    KindEntry {
        namespace,
        name,
        parent,
        kind,
    }
}

static KIND_TABLE: &[KindEntry] = &[
    entry(STREAM_NS, "stream", None, ElementKind::Stream),
    entry(STREAM_NS, "features", None, ElementKind::StreamFeatures),
    entry(STREAM_NS, "error", None, ElementKind::StreamError),
    entry(CLIENT_NS, "iq", None, ElementKind::Iq),
    entry(CLIENT_NS, "error", Some(ElementKind::Iq), ElementKind::IqError),
    entry(CLIENT_NS, "message", None, ElementKind::Message),
    entry(CLIENT_NS, "presence", None, ElementKind::Presence),
    entry(TLS_NS, "starttls", None, ElementKind::StartTls),
    entry(TLS_NS, "proceed", None, ElementKind::TlsProceed),
    entry(TLS_NS, "failure", None, ElementKind::TlsFailure),
    entry(SASL_NS, "mechanisms", None, ElementKind::SaslMechanisms),
    entry(SASL_NS, "auth", None, ElementKind::SaslAuth),
    entry(SASL_NS, "challenge", None, ElementKind::SaslChallenge),
    entry(SASL_NS, "response", None, ElementKind::SaslResponse),
    entry(SASL_NS, "success", None, ElementKind::SaslSuccess),
    entry(SASL_NS, "failure", None, ElementKind::SaslFailure),
    entry(SASL_NS, "abort", None, ElementKind::SaslAbort),
    entry(BIND_NS, "bind", None, ElementKind::Bind),
    entry(SESSION_NS, "session", None, ElementKind::Session),
];

impl ElementKind {
    /// Finds the kind for a namespace, local name and parent kind.
    ///
    /// Elements without a namespace or with an unlisted combination are
    /// [Unknown](ElementKind::Unknown).
    pub fn lookup(namespace: Option<&str>, name: &str, parent: Option<ElementKind>) -> ElementKind {
        let Some(namespace) = namespace else {
            return ElementKind::Unknown;
        };
        KIND_TABLE
            .iter()
            .find(|e| {
                e.namespace == namespace
                    && e.name == name
                    && (e.parent.is_none() || e.parent == parent)
            })
            .map(|e| e.kind)
            .unwrap_or(ElementKind::Unknown)
    }

    /// True for the top level units of a stream the application sees.
    pub fn is_stanza(&self) -> bool {
        matches!(
            self,
            ElementKind::Iq | ElementKind::Message | ElementKind::Presence
        )
    }
}
