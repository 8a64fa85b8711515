/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod error;

use std::fmt::Display;
use std::str::FromStr;

pub use error::BadJid;
pub use error::JidPart;

const MAX_PART: usize = 1023;

fn check_part(part: JidPart, value: &str) -> Result<(), BadJid> {
    if value.is_empty() {
        return Err(BadJid::Empty(part));
    }
    if value.len() > MAX_PART {
        return Err(BadJid::TooLong(part));
    }
    Ok(())
}

/// The address of an entity in the XMPP protocol.
///
/// Each JID has three parts:
/// - Local part: Optionally identifies a local entity on the domain.
/// - Domain part: Identifies an XMPP server.
/// - Resource part: Optionally identifies a session or an object.
///
/// More details can be found in [RFC7622](https://datatracker.ietf.org/doc/rfc7622/)
///
/// ```
/// use iksjab::Jid;
///
/// let jid: Jid = "juliet@example.com/balcony".parse().unwrap();
/// assert_eq!(jid.localpart(), Some("juliet"));
/// assert_eq!(jid.bare().to_string(), "juliet@example.com");
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Jid {
    local: Option<String>,
    domain: String,
    resource: Option<String>,
}

impl Jid {
    /// Create a JID from a string.
    pub fn new(jid: &str) -> Result<Self, BadJid> {
        // The resource may contain '@' and '/', so split it off first
        let (bare, resource) = match jid.split_once('/') {
            Some((bare, resource)) => (bare, Some(resource)),
            None => (jid, None),
        };
        let (local, mut domain) = match bare.split_once('@') {
            Some((local, domain)) => (Some(local), domain),
            None => (None, bare),
        };
        if let Some(stripped) = domain.strip_suffix('.') {
            // Remove final dot as per RFC 7622 section 3.2
            domain = stripped;
        }
        check_part(JidPart::Domain, domain)?;
        if let Some(local) = local {
            check_part(JidPart::Local, local)?;
        }
        if let Some(resource) = resource {
            check_part(JidPart::Resource, resource)?;
        }
        Ok(Jid {
            local: local.map(str::to_string),
            domain: domain.to_string(),
            resource: resource.map(str::to_string),
        })
    }

    /// Bare form of the JID without the resource part.
    pub fn bare(&self) -> Jid {
        Jid {
            local: self.local.clone(),
            domain: self.domain.clone(),
            resource: None,
        }
    }

    /// Only the local part of the JID.
    pub fn localpart(&self) -> Option<&str> {
        self.local.as_deref()
    }

    /// Only the domain part of the JID.
    pub fn domainpart(&self) -> &str {
        &self.domain
    }

    /// Only the resource part of the JID.
    pub fn resourcepart(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// True if the JID does not contain a resource part.
    pub fn is_bare(&self) -> bool {
        self.resource.is_none()
    }

    /// Creates another JID by overriding the resource part.
    pub fn with_resource(self, resource: &str) -> Result<Jid, BadJid> {
        check_part(JidPart::Resource, resource)?;
        Ok(Jid {
            resource: Some(resource.to_string()),
            ..self
        })
    }
}

impl FromStr for Jid {
    type Err = BadJid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Jid::new(s)
    }
}

impl Display for Jid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(local) = &self.local {
            write!(f, "{}@", local)?;
        }
        f.write_str(&self.domain)?;
        if let Some(resource) = &self.resource {
            write!(f, "/{}", resource)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
