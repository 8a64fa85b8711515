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
mod location;

pub use error::TokenError;
pub use error::TokenErrorKind;
pub use location::Location;

use crate::entities;

/// Kind of a markup token.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeKind {
    /// A start tag like `<a>`.
    Open,
    /// An end tag like `</a>`.
    Close,
    /// An empty element tag like `<a/>`.
    Single,
    /// The `<?xml ...?>` declaration.
    XmlInfo,
}

/// An attribute as it appears in the markup.
///
/// References in the value are already replaced.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TokenAttribute {
    pub prefix: Option<String>,
    pub name: String,
    pub value: String,
}

/// A tag read from the input.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub prefix: Option<String>,
    pub name: String,
    pub attributes: Vec<TokenAttribute>,
}

impl Node {
    /// The name as written in the markup, with the prefix if any.
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.name),
            None => self.name.clone(),
        }
    }
}

/// A single complete unit of the XML stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Token {
    Node(Node),
    /// A run of character data with references replaced.
    Text(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Idle,
    TextRun,
    TagKind,
    TagName,
    WhitespaceSkip,
    AttributeName,
    PreEquals,
    PostEquals,
    AttributeValue,
    SelfCloseCheck,
    EndTagConfirm,
}

macro_rules! whitespace {
    () => {
        b' ' | b'\t' | b'\r' | b'\n'
    };
}

fn is_name_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'_' | b'-' | b'.' | b':')
}

// Compact the input buffer once this many consumed bytes pile up.
const COMPACT_THRESHOLD: usize = 4096;

/// Incremental pull tokenizer for the XML subset used by XMPP streams.
///
/// Bytes arrive in arbitrary chunks through [feed()](Tokenizer::feed) and
/// complete tokens are pulled out with [next_token()](Tokenizer::next_token).
/// A construct split across chunks is held internally until the rest
/// arrives, so the token sequence does not depend on where the input
/// happens to be cut.
///
/// Only tags, attributes, character data and the XML declaration are
/// recognized. Comments, CDATA sections, processing instructions and
/// doctype declarations are not part of the accepted grammar and are
/// reported as errors.
///
/// # Examples
///
/// ```
/// use iksjab::{NodeKind, Token, Tokenizer};
///
/// let mut tokenizer = Tokenizer::new();
/// tokenizer.feed(b"<message to='romeo@example.net'><body>hi</bo");
/// let Some(Token::Node(node)) = tokenizer.next_token(false).unwrap() else {
///     panic!("expected a tag");
/// };
/// assert_eq!(node.kind, NodeKind::Open);
/// assert_eq!(node.name, "message");
///
/// assert!(matches!(tokenizer.next_token(true), Ok(Some(Token::Node(_)))));
/// assert_eq!(tokenizer.next_token(true), Ok(Some(Token::Text("hi".into()))));
/// // The end tag is incomplete, nothing more to return yet
/// assert_eq!(tokenizer.next_token(true), Ok(None));
/// tokenizer.feed(b"dy>");
/// assert!(matches!(tokenizer.next_token(true), Ok(Some(Token::Node(_)))));
/// ```
pub struct Tokenizer {
    state: State,
    failed: bool,
    input: Vec<u8>,
    pos: usize,
    location: Location,
    kind: NodeKind,
    quote: u8,
    name: Vec<u8>,
    attribute_name: Vec<u8>,
    value: Vec<u8>,
    text: Vec<u8>,
    attributes: Vec<TokenAttribute>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Tokenizer {
        Tokenizer {
            state: State::Idle,
            failed: false,
            input: Vec::new(),
            pos: 0,
            location: Location::new(),
            kind: NodeKind::Open,
            quote: b'"',
            name: Vec::new(),
            attribute_name: Vec::new(),
            value: Vec::new(),
            text: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Discards all buffered input and partial tokens.
    ///
    /// This is the only way to recover from an error. It is also used
    /// when a new XML stream starts over the same connection.
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.failed = false;
        self.input.clear();
        self.pos = 0;
        self.location = Location::new();
        self.clear_tag();
        self.text.clear();
    }

    /// Position of the last consumed byte.
    pub fn location(&self) -> Location {
        self.location
    }

    /// True if no partial token is being held.
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle && self.pos == self.input.len()
    }

    /// Appends a chunk of input.
    pub fn feed(&mut self, bytes: &[u8]) {
        if self.pos == self.input.len() {
            self.input.clear();
            self.pos = 0;
        } else if self.pos > COMPACT_THRESHOLD {
            self.input.drain(..self.pos);
            self.pos = 0;
        }
        self.input.extend_from_slice(bytes);
    }

    /// Returns the next complete token, if any.
    ///
    /// `Ok(None)` means the buffered input ends inside a token or is
    /// empty; feed more bytes and call again. When `allow_text` is false
    /// only whitespace may appear between tags, which is the case outside
    /// of the root element of an XMPP stream.
    pub fn next_token(&mut self, allow_text: bool) -> Result<Option<Token>, TokenError> {
        if self.failed {
            return Err(TokenError::new(
                TokenErrorKind::ReuseWithoutReset,
                self.location,
            ));
        }
        while self.pos < self.input.len() {
            let c = self.input[self.pos];
            self.pos += 1;
            self.location.advance(c);
            match self.step(c, allow_text) {
                Ok(Some(token)) => return Ok(Some(token)),
                Ok(None) => (),
                Err(kind) => {
                    self.failed = true;
                    return Err(TokenError::new(kind, self.location));
                }
            }
        }
        Ok(None)
    }

    fn step(&mut self, c: u8, allow_text: bool) -> Result<Option<Token>, TokenErrorKind> {
        match self.state {
            State::Idle => match c {
                b'<' => self.state = State::TagKind,
                _ if allow_text => {
                    self.text.push(c);
                    self.state = State::TextRun;
                }
                whitespace!() => (),
                _ => return Err(TokenErrorKind::TextNotAllowed),
            },

            State::TextRun => match c {
                b'<' => {
                    self.state = State::TagKind;
                    let text = take_string(&mut self.text)?;
                    return Ok(Some(Token::Text(entities::unescape(&text).into_owned())));
                }
                _ => self.text.push(c),
            },

            State::TagKind => {
                match c {
                    b'?' => self.kind = NodeKind::XmlInfo,
                    b'/' => self.kind = NodeKind::Close,
                    _ if is_name_start(c) => {
                        self.kind = NodeKind::Open;
                        self.name.push(c);
                    }
                    b'>' | whitespace!() => return Err(TokenErrorKind::TagEmptyName),
                    _ => return Err(TokenErrorKind::TagBadName),
                }
                self.state = State::TagName;
            }

            State::TagName => {
                if self.name.is_empty() {
                    if is_name_start(c) {
                        self.name.push(c);
                    } else if matches!(c, b'>' | b'/' | b'?' | whitespace!()) {
                        return Err(TokenErrorKind::TagEmptyName);
                    } else {
                        return Err(TokenErrorKind::TagBadName);
                    }
                } else if is_name_char(c) {
                    self.name.push(c);
                } else {
                    match c {
                        whitespace!() => self.state = State::WhitespaceSkip,
                        b'>' | b'/' | b'?' => return self.tag_end(c),
                        _ => return Err(TokenErrorKind::TagBadName),
                    }
                }
            }

            State::WhitespaceSkip => match c {
                whitespace!() => (),
                b'>' | b'/' | b'?' => return self.tag_end(c),
                _ if is_name_start(c) => {
                    if self.kind == NodeKind::Close {
                        return Err(TokenErrorKind::EndTagAttributes);
                    }
                    self.attribute_name.push(c);
                    self.state = State::AttributeName;
                }
                _ => return Err(TokenErrorKind::AttributeBadName),
            },

            State::AttributeName => match c {
                _ if is_name_char(c) => self.attribute_name.push(c),
                whitespace!() => self.state = State::PreEquals,
                b'=' => self.state = State::PostEquals,
                b'>' | b'/' | b'?' => return Err(TokenErrorKind::AttributeWithoutEqual),
                _ => return Err(TokenErrorKind::AttributeBadName),
            },

            State::PreEquals => match c {
                whitespace!() => (),
                b'=' => self.state = State::PostEquals,
                _ => return Err(TokenErrorKind::AttributeWithoutEqual),
            },

            State::PostEquals => match c {
                whitespace!() => (),
                b'"' | b'\'' => {
                    self.quote = c;
                    self.state = State::AttributeValue;
                }
                _ => return Err(TokenErrorKind::AttributeWithoutQuote),
            },

            State::AttributeValue => {
                if c == self.quote {
                    self.push_attribute()?;
                    self.state = State::WhitespaceSkip;
                } else if c == b'<' {
                    return Err(TokenErrorKind::AttributeBadValue);
                } else {
                    self.value.push(c);
                }
            }

            State::SelfCloseCheck => match c {
                b'>' => return self.emit_node().map(Some),
                _ => return Err(TokenErrorKind::EmptyTagMissingEnd),
            },

            State::EndTagConfirm => match c {
                b'>' => return self.emit_node().map(Some),
                _ => return Err(TokenErrorKind::DeclarationMissingEnd),
            },
        }
        Ok(None)
    }

    fn tag_end(&mut self, c: u8) -> Result<Option<Token>, TokenErrorKind> {
        match c {
            b'>' => {
                if self.kind == NodeKind::XmlInfo {
                    return Err(TokenErrorKind::DeclarationNotClosed);
                }
                self.emit_node().map(Some)
            }
            b'/' => {
                if self.kind != NodeKind::Open {
                    return Err(TokenErrorKind::TagDoubleEnd);
                }
                self.kind = NodeKind::Single;
                self.state = State::SelfCloseCheck;
                Ok(None)
            }
            _ => {
                if self.kind != NodeKind::XmlInfo {
                    return Err(TokenErrorKind::UnexpectedDeclarationEnd);
                }
                self.state = State::EndTagConfirm;
                Ok(None)
            }
        }
    }

    fn push_attribute(&mut self) -> Result<(), TokenErrorKind> {
        let full = take_string(&mut self.attribute_name)?;
        let (prefix, name) =
            split_name(full).ok_or(TokenErrorKind::AttributeBadName)?;
        let value = take_string(&mut self.value)?;
        self.attributes.push(TokenAttribute {
            prefix,
            name,
            value: entities::unescape(&value).into_owned(),
        });
        Ok(())
    }

    fn emit_node(&mut self) -> Result<Token, TokenErrorKind> {
        let full = take_string(&mut self.name)?;
        let (prefix, name) = split_name(full).ok_or(TokenErrorKind::TagBadName)?;
        let node = Node {
            kind: self.kind,
            prefix,
            name,
            attributes: std::mem::take(&mut self.attributes),
        };
        self.state = State::Idle;
        Ok(Token::Node(node))
    }

    fn clear_tag(&mut self) {
        self.kind = NodeKind::Open;
        self.name.clear();
        self.attribute_name.clear();
        self.value.clear();
        self.attributes.clear();
    }
}

fn take_string(buffer: &mut Vec<u8>) -> Result<String, TokenErrorKind> {
    String::from_utf8(std::mem::take(buffer)).map_err(|_| TokenErrorKind::InvalidUtf8)
}

// Splits "prefix:name" at the first colon. Both halves must be non-empty.
fn split_name(full: String) -> Option<(Option<String>, String)> {
    match full.find(':') {
        None => Some((None, full)),
        Some(pos) => {
            let (prefix, rest) = full.split_at(pos);
            let name = &rest[1..];
            if prefix.is_empty() || name.is_empty() || name.contains(':') {
                return None;
            }
            Some((Some(prefix.to_string()), name.to_string()))
        }
    }
}

#[cfg(test)]
mod tests;
