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

use super::Attribute;
use super::Element;
use super::ElementKind;
use super::declaration;
use crate::tokenizer::Node;
use crate::tokenizer::NodeKind;
use crate::tokenizer::Token;
use crate::xmpp::constants::XML_NS;

/// Structural problems in an otherwise well formed token sequence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BuildError {
    /// An end tag does not match the innermost open element.
    TagMismatch,
    /// An end tag appeared with no open element.
    CloseWithoutOpen,
    /// Non-whitespace text directly under the stream root.
    TextAtStreamLevel,
    /// An XML declaration after the root element started.
    MisplacedDeclaration,
    /// The root element closed itself immediately.
    EmptyStream,
}

impl BuildError {
    pub fn description(&self) -> &'static str {
        match self {
            BuildError::TagMismatch => "end tag does not match the start tag",
            BuildError::CloseWithoutOpen => "end tag without a start tag",
            BuildError::TextAtStreamLevel => "character data outside of stanzas",
            BuildError::MisplacedDeclaration => "XML declaration inside the stream",
            BuildError::EmptyStream => "stream root has no content",
        }
    }

    /// True for errors which make the input not well formed XML.
    pub fn is_xml_error(&self) -> bool {
        matches!(
            self,
            BuildError::TagMismatch | BuildError::CloseWithoutOpen | BuildError::MisplacedDeclaration
        )
    }
}

impl Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid stream structure: {}", self.description())
    }
}

impl Error for BuildError {}

/// Notable points of an XML stream.
#[derive(Debug)]
pub enum StreamEvent {
    /// The root element started. Its content is never collected.
    Opened(Element),
    /// A complete direct child of the root.
    ///
    /// Namespaces declared on the root are only reachable while the
    /// root is alive. Keep the [Opened](StreamEvent::Opened) element or
    /// the builder around for as long as the stanza is queried.
    Stanza(Element),
    /// The root element ended.
    Closed,
}

/// Builds element trees from tokens.
///
/// The root is reported as soon as its start tag arrives, and each
/// direct child of the root is reported once its end tag arrives. All
/// deeper elements are attached to their parents.
#[derive(Default)]
pub struct ElementBuilder {
    root: Option<Element>,
    stack: Vec<Element>,
}

impl ElementBuilder {
    pub fn new() -> ElementBuilder {
        ElementBuilder {
            root: None,
            stack: Vec::new(),
        }
    }

    /// Forgets the root and all partial elements.
    pub fn reset(&mut self) {
        self.root = None;
        self.stack.clear();
    }

    /// Number of currently open elements, the root included.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn root(&self) -> Option<&Element> {
        self.root.as_ref()
    }

    pub fn handle_token(&mut self, token: Token) -> Result<Option<StreamEvent>, BuildError> {
        match token {
            Token::Text(text) => self.handle_text(&text),
            Token::Node(node) => match node.kind {
                NodeKind::XmlInfo => {
                    if self.root.is_some() {
                        return Err(BuildError::MisplacedDeclaration);
                    }
                    Ok(None)
                }
                NodeKind::Open | NodeKind::Single => self.handle_start(node),
                NodeKind::Close => self.handle_end(node),
            },
        }
    }

    fn handle_text(&mut self, text: &str) -> Result<Option<StreamEvent>, BuildError> {
        if self.stack.len() >= 2 {
            if let Some(top) = self.stack.last() {
                top.append_text(text);
            }
            return Ok(None);
        }
        if text.bytes().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }
        Err(BuildError::TextAtStreamLevel)
    }

    fn handle_start(&mut self, node: Node) -> Result<Option<StreamEvent>, BuildError> {
        let mut attributes: Vec<Attribute> = Vec::with_capacity(node.attributes.len());
        for attr in node.attributes {
            let attr = Attribute::from(attr);
            match attributes
                .iter_mut()
                .find(|a| a.matches(attr.prefix.as_deref(), &attr.name))
            {
                Some(existing) => existing.value = attr.value,
                None => attributes.push(attr),
            }
        }

        let parent = self.stack.last();
        let namespace = match node.prefix.as_deref() {
            Some("xml") => Some(XML_NS.to_string()),
            prefix => match declaration(&attributes, prefix) {
                Some(found) => found,
                None => parent.and_then(|p| p.resolve_prefix(prefix)),
            },
        };
        let kind = ElementKind::lookup(
            namespace.as_deref(),
            &node.name,
            parent.map(|p| p.kind()),
        );
        let element = Element::from_parts(kind, node.prefix, node.name, attributes, parent);
        let is_single = node.kind == NodeKind::Single;

        match self.stack.len() {
            0 => {
                if is_single {
                    return Err(BuildError::EmptyStream);
                }
                self.root = Some(element.clone());
                self.stack.push(element.clone());
                Ok(Some(StreamEvent::Opened(element)))
            }
            1 => {
                if is_single {
                    return Ok(Some(StreamEvent::Stanza(element)));
                }
                self.stack.push(element);
                Ok(None)
            }
            _ => {
                if let Some(parent) = self.stack.last() {
                    parent.append_child(element.clone());
                }
                if !is_single {
                    self.stack.push(element);
                }
                Ok(None)
            }
        }
    }

    fn handle_end(&mut self, node: Node) -> Result<Option<StreamEvent>, BuildError> {
        let Some(top) = self.stack.last() else {
            return Err(BuildError::CloseWithoutOpen);
        };
        if top.prefix() != node.prefix.as_deref() || top.name() != node.name {
            return Err(BuildError::TagMismatch);
        }
        let Some(element) = self.stack.pop() else {
            return Err(BuildError::CloseWithoutOpen);
        };
        match self.stack.len() {
            0 => Ok(Some(StreamEvent::Closed)),
            1 => Ok(Some(StreamEvent::Stanza(element))),
            _ => Ok(None),
        }
    }
}
