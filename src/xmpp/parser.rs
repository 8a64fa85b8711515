/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use crate::ElementBuilder;
use crate::StreamEvent;
use crate::Tokenizer;

use super::StreamError;

/// Turns incoming stream bytes into stream events.
///
/// After an error the parser must be [reset](StreamParser::reset)
/// before it is used again.
pub struct StreamParser {
    tokenizer: Tokenizer,
    builder: ElementBuilder,
}

impl StreamParser {
    pub fn new() -> Self {
        Self {
            tokenizer: Tokenizer::new(),
            builder: ElementBuilder::new(),
        }
    }

    /// Prepares for a new stream, dropping any buffered input.
    pub fn reset(&mut self) {
        self.tokenizer.reset();
        self.builder.reset();
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.tokenizer.feed(bytes);
    }

    /// Returns the next event from the buffered input, if complete.
    pub fn next_event(&mut self) -> Result<Option<StreamEvent>, StreamError> {
        loop {
            let allow_text = self.builder.depth() > 0;
            let Some(token) = self.tokenizer.next_token(allow_text)? else {
                return Ok(None);
            };
            if let Some(event) = self.builder.handle_token(token)? {
                return Ok(Some(event));
            }
        }
    }
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}
