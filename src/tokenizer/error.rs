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

use super::Location;

/// Category of a tokenizer failure.
///
/// Every variant is terminal: the tokenizer refuses further reads
/// until it is [reset](crate::Tokenizer::reset).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenErrorKind {
    ReuseWithoutReset,
    TextNotAllowed,
    TagEmptyName,
    TagBadName,
    TagDoubleEnd,
    EndTagAttributes,
    EmptyTagMissingEnd,
    DeclarationNotClosed,
    DeclarationMissingEnd,
    UnexpectedDeclarationEnd,
    AttributeBadName,
    AttributeWithoutEqual,
    AttributeWithoutQuote,
    AttributeBadValue,
    InvalidUtf8,
}

impl TokenErrorKind {
    pub fn description(&self) -> &'static str {
        match self {
            TokenErrorKind::ReuseWithoutReset => "cannot continue after an error without a reset",
            TokenErrorKind::TextNotAllowed => "character data is not allowed here",
            TokenErrorKind::TagEmptyName => "Tag has no name",
            TokenErrorKind::TagBadName => "Tag name has an invalid character",
            TokenErrorKind::TagDoubleEnd => "End tag has standalone ending too",
            TokenErrorKind::EndTagAttributes => "End tag cannot have attributes",
            TokenErrorKind::EmptyTagMissingEnd => "Empty element tags must end after the '/'",
            TokenErrorKind::DeclarationNotClosed => "XML declaration must end with '?>'",
            TokenErrorKind::DeclarationMissingEnd => {
                "XML declaration must end after closing the '?'"
            }
            TokenErrorKind::UnexpectedDeclarationEnd => "Only XML declarations can end with '?>'",
            TokenErrorKind::AttributeBadName => "Tag attribute name has an invalid character",
            TokenErrorKind::AttributeWithoutEqual => "Tag attributes must have '=' before the value",
            TokenErrorKind::AttributeWithoutQuote => {
                "Tag attribute value must be double or single quotes"
            }
            TokenErrorKind::AttributeBadValue => {
                "Tag value cannot have '<' character without a reference"
            }
            TokenErrorKind::InvalidUtf8 => "Invalid UTF8 sequence in character data",
        }
    }
}

/// A terminal tokenizer error with the position of the offending byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TokenError {
    pub kind: TokenErrorKind,
    pub location: Location,
}

impl TokenError {
    pub(super) fn new(kind: TokenErrorKind, location: Location) -> Self {
        TokenError { kind, location }
    }
}

impl Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid xml syntax: {} ({})",
            self.kind.description(),
            self.location
        )
    }
}

impl Error for TokenError {}
