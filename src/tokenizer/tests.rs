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

fn attr(prefix: Option<&str>, name: &str, value: &str) -> TokenAttribute {
    TokenAttribute {
        prefix: prefix.map(|s| s.to_string()),
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn node(kind: NodeKind, prefix: Option<&str>, name: &str, attributes: Vec<TokenAttribute>) -> Token {
    Token::Node(Node {
        kind,
        prefix: prefix.map(|s| s.to_string()),
        name: name.to_string(),
        attributes,
    })
}

fn text(s: &str) -> Token {
    Token::Text(s.to_string())
}

// Pulls every token out, allowing text only inside the root element
// the same way the stream builder does.
fn drain(tokenizer: &mut Tokenizer, depth: &mut usize, out: &mut Vec<Token>) {
    while let Some(token) = tokenizer.next_token(*depth > 0).unwrap() {
        if let Token::Node(node) = &token {
            match node.kind {
                NodeKind::Open => *depth += 1,
                NodeKind::Close => *depth -= 1,
                _ => (),
            }
        }
        out.push(token);
    }
}

fn tokenize_chunks(chunks: &[&[u8]]) -> Vec<Token> {
    let mut tokenizer = Tokenizer::new();
    let mut depth = 0;
    let mut out = Vec::new();
    for chunk in chunks {
        tokenizer.feed(chunk);
        drain(&mut tokenizer, &mut depth, &mut out);
    }
    out
}

fn check(s: &str, expected: &[Token]) {
    let bytes = s.as_bytes();
    assert_eq!(tokenize_chunks(&[bytes]), expected);

    // now try byte by byte
    let singles: Vec<&[u8]> = bytes.chunks(1).collect();
    assert_eq!(tokenize_chunks(&singles), expected);

    // and every possible two way split
    for i in 1..bytes.len() {
        let (a, b) = bytes.split_at(i);
        assert_eq!(tokenize_chunks(&[a, b]), expected, "split at {}", i);
    }
}

fn check_bad(s: &str, bad_byte: usize, kind: TokenErrorKind) {
    let mut tokenizer = Tokenizer::new();
    let mut depth = 0;
    tokenizer.feed(s.as_bytes());
    let err = loop {
        match tokenizer.next_token(depth > 0) {
            Ok(Some(Token::Node(node))) => match node.kind {
                NodeKind::Open => depth += 1,
                NodeKind::Close => depth -= 1,
                _ => (),
            },
            Ok(Some(_)) => (),
            Ok(None) => panic!("no error in {:?}", s),
            Err(err) => break err,
        }
    };
    assert_eq!(err.kind, kind, "input {:?}", s);
    assert_eq!(err.location.bytes, bad_byte + 1, "input {:?}", s);
}

#[test]
fn tags() {
    check(
        "<a><b/><c></c></a>",
        &[
            node(NodeKind::Open, None, "a", vec![]),
            node(NodeKind::Single, None, "b", vec![]),
            node(NodeKind::Open, None, "c", vec![]),
            node(NodeKind::Close, None, "c", vec![]),
            node(NodeKind::Close, None, "a", vec![]),
        ],
    );
    check(
        "<Stream_Root\n><Upper-Case.Name  /></Stream_Root >",
        &[
            node(NodeKind::Open, None, "Stream_Root", vec![]),
            node(NodeKind::Single, None, "Upper-Case.Name", vec![]),
            node(NodeKind::Close, None, "Stream_Root", vec![]),
        ],
    );
}

#[test]
fn stream_header() {
    check(
        "<?xml version='1.0'?>\n<stream:stream xmlns='jabber:client' \
         xmlns:stream=\"http://etherx.jabber.org/streams\" version = '1.0'>",
        &[
            node(NodeKind::XmlInfo, None, "xml", vec![attr(None, "version", "1.0")]),
            node(
                NodeKind::Open,
                Some("stream"),
                "stream",
                vec![
                    attr(None, "xmlns", "jabber:client"),
                    attr(Some("xmlns"), "stream", "http://etherx.jabber.org/streams"),
                    attr(None, "version", "1.0"),
                ],
            ),
        ],
    );
}

#[test]
fn attributes() {
    check(
        "<a x='1' y=\"2\" xml:lang='en' q='say \"hi\"' s=\"it's\"/>",
        &[node(
            NodeKind::Single,
            None,
            "a",
            vec![
                attr(None, "x", "1"),
                attr(None, "y", "2"),
                attr(Some("xml"), "lang", "en"),
                attr(None, "q", "say \"hi\""),
                attr(None, "s", "it's"),
            ],
        )],
    );
    check(
        "<a v='&lt;&amp;&#65;&x42;&u0043;&bogus;'/>",
        &[node(NodeKind::Single, None, "a", vec![attr(None, "v", "<&ABC&bogus;")])],
    );
}

#[test]
fn text_content() {
    check(
        "<r><body>Hello &amp; welcome &#x263A;</body> \n </r>",
        &[
            node(NodeKind::Open, None, "r", vec![]),
            node(NodeKind::Open, None, "body", vec![]),
            text("Hello & welcome \u{263A}"),
            node(NodeKind::Close, None, "body", vec![]),
            text(" \n "),
            node(NodeKind::Close, None, "r", vec![]),
        ],
    );
    check(
        "<r><b>çağrı</b></r>",
        &[
            node(NodeKind::Open, None, "r", vec![]),
            node(NodeKind::Open, None, "b", vec![]),
            text("çağrı"),
            node(NodeKind::Close, None, "b", vec![]),
            node(NodeKind::Close, None, "r", vec![]),
        ],
    );
}

#[test]
fn whitespace_before_root() {
    check("\n  \t<a/>", &[node(NodeKind::Single, None, "a", vec![])]);
}

#[test]
fn suspends_inside_tokens() {
    let mut tokenizer = Tokenizer::new();
    tokenizer.feed(b"<message to='ro");
    assert_eq!(tokenizer.next_token(false), Ok(None));
    assert!(!tokenizer.is_idle());
    tokenizer.feed(b"meo'>");
    assert_eq!(
        tokenizer.next_token(false),
        Ok(Some(node(
            NodeKind::Open,
            None,
            "message",
            vec![attr(None, "to", "romeo")]
        )))
    );
    assert!(tokenizer.is_idle());
    // Text is only complete once the next tag starts
    tokenizer.feed(b"partial");
    assert_eq!(tokenizer.next_token(true), Ok(None));
    tokenizer.feed(b" text<");
    assert_eq!(tokenizer.next_token(true), Ok(Some(text("partial text"))));
}

#[test]
fn bad_markup() {
    check_bad("<>", 1, TokenErrorKind::TagEmptyName);
    check_bad("</>", 2, TokenErrorKind::TagEmptyName);
    check_bad("<a\u{1}>", 2, TokenErrorKind::TagBadName);
    check_bad("<1a/>", 1, TokenErrorKind::TagBadName);
    check_bad("<a:/>", 4, TokenErrorKind::TagBadName);
    check_bad("<a></a/>", 6, TokenErrorKind::TagDoubleEnd);
    check_bad("<a></a x='1'>", 7, TokenErrorKind::EndTagAttributes);
    check_bad("<a/ >", 3, TokenErrorKind::EmptyTagMissingEnd);
    check_bad("<?xml version='1.0'>", 19, TokenErrorKind::DeclarationNotClosed);
    check_bad("<?xml?x", 6, TokenErrorKind::DeclarationMissingEnd);
    check_bad("<a?>", 2, TokenErrorKind::UnexpectedDeclarationEnd);
    check_bad("<a =''/>", 3, TokenErrorKind::AttributeBadName);
    check_bad("<a b/>", 4, TokenErrorKind::AttributeWithoutEqual);
    check_bad("<a b=c/>", 5, TokenErrorKind::AttributeWithoutQuote);
    check_bad("<a b='<'/>", 6, TokenErrorKind::AttributeBadValue);
    check_bad("hello", 0, TokenErrorKind::TextNotAllowed);
    check_bad("<a/>x", 4, TokenErrorKind::TextNotAllowed);
}

#[test]
fn unsupported_constructs() {
    check_bad("<!-- comment -->", 1, TokenErrorKind::TagBadName);
    check_bad("<a><![CDATA[x]]></a>", 4, TokenErrorKind::TagBadName);
    check_bad("<a>ok</a x>", 9, TokenErrorKind::EndTagAttributes);
}

#[test]
fn invalid_utf8() {
    let mut tokenizer = Tokenizer::new();
    tokenizer.feed(b"<a>\xff\xfe<");
    assert!(matches!(tokenizer.next_token(false), Ok(Some(Token::Node(_)))));
    let err = tokenizer.next_token(true).unwrap_err();
    assert_eq!(err.kind, TokenErrorKind::InvalidUtf8);
}

#[test]
fn reuse_needs_reset() {
    let mut tokenizer = Tokenizer::new();
    tokenizer.feed(b"<a b>");
    assert!(tokenizer.next_token(false).is_err());
    tokenizer.feed(b"<c/>");
    assert_eq!(
        tokenizer.next_token(false).unwrap_err().kind,
        TokenErrorKind::ReuseWithoutReset
    );
    tokenizer.reset();
    tokenizer.feed(b"<c/>");
    assert_eq!(
        tokenizer.next_token(false),
        Ok(Some(node(NodeKind::Single, None, "c", vec![])))
    );
}

#[test]
fn location_tracking() {
    let mut tokenizer = Tokenizer::new();
    tokenizer.feed(b"<a>\nline\n  <b/>");
    while let Ok(Some(_)) = tokenizer.next_token(true) {}
    let location = tokenizer.location();
    assert_eq!(location.bytes, 15);
    assert_eq!(location.lines, 2);
    assert_eq!(location.column, 6);
    assert_eq!(
        format!("{}", location),
        "byte: 15, line: 2, column: 6"
    );
}

#[test]
fn error_display() {
    let mut tokenizer = Tokenizer::new();
    tokenizer.feed(b"<a b>");
    let err = tokenizer.next_token(false).unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid xml syntax: Tag attributes must have '=' before the value (byte: 5, line: 0, column: 5)"
    );
}
