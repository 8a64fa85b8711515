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

/// One of the three parts of a JID.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum JidPart {
    Local,
    Domain,
    Resource,
}

/// A string which cannot be parsed as a JID.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum BadJid {
    /// The part is present but has no characters.
    Empty(JidPart),
    /// The part is longer than 1023 octets.
    TooLong(JidPart),
}

impl BadJid {
    pub fn part(&self) -> JidPart {
        match self {
            BadJid::Empty(part) | BadJid::TooLong(part) => *part,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BadJid::Empty(JidPart::Local) => description::LOCAL_EMPTY,
            BadJid::Empty(JidPart::Domain) => description::DOMAIN_EMPTY,
            BadJid::Empty(JidPart::Resource) => description::RESOURCE_EMPTY,
            BadJid::TooLong(JidPart::Local) => description::LOCAL_TOO_LONG,
            BadJid::TooLong(JidPart::Domain) => description::DOMAIN_TOO_LONG,
            BadJid::TooLong(JidPart::Resource) => description::RESOURCE_TOO_LONG,
        }
    }
}

impl Display for BadJid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid JID: {}", self.description())
    }
}

impl Error for BadJid {}

mod description {
    pub(super) const LOCAL_EMPTY: &str = "localpart is empty";
    pub(super) const LOCAL_TOO_LONG: &str = "localpart is longer than 1023 octets";
    pub(super) const DOMAIN_EMPTY: &str = "domainpart is empty";
    pub(super) const DOMAIN_TOO_LONG: &str = "domainpart is longer than 1023 octets";
    pub(super) const RESOURCE_EMPTY: &str = "resourcepart is empty";
    pub(super) const RESOURCE_TOO_LONG: &str = "resourcepart is longer than 1023 octets";
}
