/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use super::*;

fn check_jid(
    jid: Jid,
    full: &str,
    bare: &str,
    local: Option<&str>,
    domain: &str,
    resource: Option<&str>,
) {
    assert_eq!(jid.to_string(), full);
    assert_eq!(jid.bare().to_string(), bare);
    assert_eq!(jid.localpart(), local);
    assert_eq!(jid.domainpart(), domain);
    assert_eq!(jid.resourcepart(), resource);
    assert_eq!(jid.is_bare(), resource.is_none());
}

#[test]
fn good_jids() {
    check_jid(
        Jid::new("juliet@example.com").unwrap(),
        "juliet@example.com",
        "juliet@example.com",
        Some("juliet"),
        "example.com",
        None,
    );
    check_jid(
        Jid::new("juliet@example.com/foo@bar").unwrap(),
        "juliet@example.com/foo@bar",
        "juliet@example.com",
        Some("juliet"),
        "example.com",
        Some("foo@bar"),
    );
    check_jid(
        Jid::new("a.example.com/b@example.net/c").unwrap(),
        "a.example.com/b@example.net/c",
        "a.example.com",
        None,
        "a.example.com",
        Some("b@example.net/c"),
    );
    check_jid(
        "example.com.".parse().unwrap(),
        "example.com",
        "example.com",
        None,
        "example.com",
        None,
    );
}

#[test]
fn resource_change() {
    let jid = Jid::new("juliet@example.com/balcony").unwrap();
    check_jid(
        jid.with_resource("orchard").unwrap(),
        "juliet@example.com/orchard",
        "juliet@example.com",
        Some("juliet"),
        "example.com",
        Some("orchard"),
    );
    let jid = Jid::new("juliet@example.com").unwrap();
    assert_eq!(
        jid.with_resource(""),
        Err(BadJid::Empty(JidPart::Resource))
    );
}

#[test]
fn bad_jids() {
    assert_eq!(Jid::new(""), Err(BadJid::Empty(JidPart::Domain)));
    assert_eq!(Jid::new("/resource"), Err(BadJid::Empty(JidPart::Domain)));
    assert_eq!(Jid::new("local@/resource"), Err(BadJid::Empty(JidPart::Domain)));
    assert_eq!(Jid::new("@example.com"), Err(BadJid::Empty(JidPart::Local)));
    assert_eq!(Jid::new("example.com/"), Err(BadJid::Empty(JidPart::Resource)));
    let long = "a".repeat(1024);
    assert_eq!(
        Jid::new(&format!("{}@example.com", long)),
        Err(BadJid::TooLong(JidPart::Local))
    );
    assert_eq!(
        Jid::new(&long),
        Err(BadJid::TooLong(JidPart::Domain))
    );
    assert_eq!(
        BadJid::Empty(JidPart::Domain).to_string(),
        "invalid JID: domainpart is empty"
    );
}

#[test]
fn trailing_dot_and_parts() {
    let jid: Jid = "romeo@montague.example./orchard".parse().unwrap();
    assert_eq!(jid.domainpart(), "montague.example");
    assert_eq!(jid.to_string(), "romeo@montague.example/orchard");
    assert_eq!(jid.bare(), Jid::new("romeo@montague.example").unwrap());
    assert_eq!("a@.".parse::<Jid>(), Err(BadJid::Empty(JidPart::Domain)));
    assert_eq!(BadJid::TooLong(JidPart::Resource).part(), JidPart::Resource);
}
