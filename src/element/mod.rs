/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod builder;
mod kind;
mod stanza;

use std::cell::RefCell;
use std::fmt::Debug;
use std::fmt::Display;
use std::rc::Rc;
use std::rc::Weak;

pub use builder::BuildError;
pub use builder::ElementBuilder;
pub use builder::StreamEvent;
pub use kind::ElementKind;
pub use stanza::ErrorType;
pub use stanza::IqType;
pub use stanza::MessageType;
pub use stanza::PresenceShow;
pub use stanza::PresenceType;
pub use stanza::SaslCondition;
pub use stanza::StreamErrorCondition;

use crate::entities;
use crate::tokenizer::TokenAttribute;
use crate::xmpp::constants::XML_NS;

/// An element attribute.
///
/// Namespace declarations are ordinary attributes, either named `xmlns`
/// or prefixed with `xmlns`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attribute {
    pub prefix: Option<String>,
    pub name: String,
    pub value: String,
}

impl Attribute {
    fn matches(&self, prefix: Option<&str>, name: &str) -> bool {
        self.prefix.as_deref() == prefix && self.name == name
    }
}

impl From<TokenAttribute> for Attribute {
    fn from(attr: TokenAttribute) -> Self {
        Attribute {
            prefix: attr.prefix,
            name: attr.name,
            value: attr.value,
        }
    }
}

/// Which part of an element to serialize.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteMode {
    /// The whole element with its content.
    Full,
    /// Only the start tag, used for stream headers.
    OpenOnly,
    /// Only the end tag, used for stream footers.
    CloseOnly,
}

enum Content {
    Child(Element),
    Text(String),
}

struct Node {
    kind: ElementKind,
    prefix: Option<String>,
    name: String,
    parent: RefCell<Weak<Node>>,
    attributes: RefCell<Vec<Attribute>>,
    content: RefCell<Vec<Content>>,
}

/// A node of an XMPP element tree.
///
/// Elements are reference counted handles, cloning one gives another
/// handle to the same node. Parents own their children, and a child
/// keeps a non-owning link back to its parent which is used for
/// namespace resolution. Stanzas produced by the
/// [ElementBuilder] link back to the stream root without being stored
/// in it, so the root does not grow over the lifetime of a stream.
///
/// Since the link to the parent does not own it, namespace lookups
/// through [namespace_uri()](Element::namespace_uri) only see the
/// declarations of ancestors which still have a handle somewhere. A
/// stanza kept after its stream root is gone loses the inherited
/// default namespace.
#[derive(Clone)]
pub struct Element(Rc<Node>);

fn split_qualified(name: &str) -> (Option<String>, String) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, name.to_string()),
    }
}

// Finds the namespace a declaration list binds to a prefix.
// Some(None) means the default namespace was explicitly undeclared.
fn declaration(attributes: &[Attribute], prefix: Option<&str>) -> Option<Option<String>> {
    attributes
        .iter()
        .find(|attr| match prefix {
            None => attr.prefix.is_none() && attr.name == "xmlns",
            Some(prefix) => attr.prefix.as_deref() == Some("xmlns") && attr.name == prefix,
        })
        .map(|attr| {
            if attr.value.is_empty() {
                None
            } else {
                Some(attr.value.clone())
            }
        })
}

impl Element {
    /// Creates an element without a namespace declaration.
    ///
    /// The name can be qualified with a prefix like `stream:error`.
    pub fn new(name: &str) -> Element {
        let (prefix, name) = split_qualified(name);
        Element::from_parts(ElementKind::Unknown, prefix, name, Vec::new(), None)
    }

    /// Creates an element and declares its namespace on it.
    pub fn with_namespace(name: &str, namespace: &str) -> Element {
        let (prefix, local) = split_qualified(name);
        let kind = ElementKind::lookup(Some(namespace), &local, None);
        let declaration = match &prefix {
            Some(prefix) => Attribute {
                prefix: Some("xmlns".to_string()),
                name: prefix.clone(),
                value: namespace.to_string(),
            },
            None => Attribute {
                prefix: None,
                name: "xmlns".to_string(),
                value: namespace.to_string(),
            },
        };
        Element::from_parts(kind, prefix, local, vec![declaration], None)
    }

    pub(crate) fn with_kind(kind: ElementKind, name: &str) -> Element {
        let (prefix, name) = split_qualified(name);
        Element::from_parts(kind, prefix, name, Vec::new(), None)
    }

    pub(crate) fn from_parts(
        kind: ElementKind,
        prefix: Option<String>,
        name: String,
        attributes: Vec<Attribute>,
        parent: Option<&Element>,
    ) -> Element {
        let parent = match parent {
            Some(parent) => Rc::downgrade(&parent.0),
            None => Weak::new(),
        };
        Element(Rc::new(Node {
            kind,
            prefix,
            name,
            parent: RefCell::new(parent),
            attributes: RefCell::new(attributes),
            content: RefCell::new(Vec::new()),
        }))
    }

    pub fn kind(&self) -> ElementKind {
        self.0.kind
    }

    /// Local name without the prefix.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn prefix(&self) -> Option<&str> {
        self.0.prefix.as_deref()
    }

    pub fn qualified_name(&self) -> String {
        match &self.0.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.0.name),
            None => self.0.name.clone(),
        }
    }

    pub fn parent(&self) -> Option<Element> {
        self.0.parent.borrow().upgrade().map(Element)
    }

    /// True if both handles point to the same node.
    pub fn is_same(&self, other: &Element) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    //
    // Attributes
    //

    /// Value of an unprefixed attribute.
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.prefixed_attribute(None, name)
    }

    pub fn prefixed_attribute(&self, prefix: Option<&str>, name: &str) -> Option<String> {
        self.0
            .attributes
            .borrow()
            .iter()
            .find(|attr| attr.matches(prefix, name))
            .map(|attr| attr.value.clone())
    }

    /// Sets an unprefixed attribute, replacing any previous value.
    pub fn set_attribute(&self, name: &str, value: &str) -> &Self {
        self.set_prefixed_attribute(None, name, value)
    }

    pub fn set_prefixed_attribute(&self, prefix: Option<&str>, name: &str, value: &str) -> &Self {
        let mut attributes = self.0.attributes.borrow_mut();
        match attributes.iter_mut().find(|attr| attr.matches(prefix, name)) {
            Some(attr) => attr.value = value.to_string(),
            None => attributes.push(Attribute {
                prefix: prefix.map(|s| s.to_string()),
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
        self
    }

    pub fn remove_attribute(&self, prefix: Option<&str>, name: &str) -> Option<String> {
        let mut attributes = self.0.attributes.borrow_mut();
        let pos = attributes.iter().position(|attr| attr.matches(prefix, name))?;
        Some(attributes.remove(pos).value)
    }

    pub fn attributes(&self) -> Vec<Attribute> {
        self.0.attributes.borrow().clone()
    }

    //
    // Namespaces
    //

    /// Namespace of the element itself.
    pub fn namespace_uri(&self) -> Option<String> {
        self.resolve_prefix(self.prefix())
    }

    /// Resolves a prefix, or the default namespace for None, by walking
    /// the declarations from this element up to the root.
    pub fn resolve_prefix(&self, prefix: Option<&str>) -> Option<String> {
        if prefix == Some("xml") {
            return Some(XML_NS.to_string());
        }
        let mut node = Some(self.0.clone());
        while let Some(current) = node {
            if let Some(found) = declaration(&current.attributes.borrow(), prefix) {
                return found;
            }
            node = current.parent.borrow().upgrade();
        }
        None
    }

    //
    // Content
    //

    /// Appends a child and links it back to this element.
    pub fn append_child(&self, child: Element) -> Element {
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.content.borrow_mut().push(Content::Child(child.clone()));
        child
    }

    /// Creates a child in the same namespace context and appends it.
    pub fn insert_child(&self, name: &str) -> Element {
        self.append_child(Element::new(name))
    }

    pub fn children(&self) -> Vec<Element> {
        self.0
            .content
            .borrow()
            .iter()
            .filter_map(|content| match content {
                Content::Child(child) => Some(child.clone()),
                Content::Text(_) => None,
            })
            .collect()
    }

    pub fn first_child(&self) -> Option<Element> {
        self.0.content.borrow().iter().find_map(|content| match content {
            Content::Child(child) => Some(child.clone()),
            Content::Text(_) => None,
        })
    }

    /// First child with the given local name in any namespace.
    pub fn child(&self, name: &str) -> Option<Element> {
        self.children().into_iter().find(|child| child.name() == name)
    }

    /// First child with the given namespace and local name.
    pub fn find_child(&self, namespace: &str, name: &str) -> Option<Element> {
        self.children().into_iter().find(|child| {
            child.name() == name && child.namespace_uri().as_deref() == Some(namespace)
        })
    }

    /// Concatenated character data directly under this element.
    pub fn text(&self) -> Option<String> {
        let content = self.0.content.borrow();
        let mut text: Option<String> = None;
        for piece in content.iter() {
            if let Content::Text(s) = piece {
                text.get_or_insert_with(String::new).push_str(s);
            }
        }
        text
    }

    /// Text of the first child with the given local name.
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).and_then(|child| child.text())
    }

    /// Replaces all character data with the given text.
    pub fn set_text(&self, text: &str) -> &Self {
        let mut content = self.0.content.borrow_mut();
        content.retain(|piece| matches!(piece, Content::Child(_)));
        content.push(Content::Text(text.to_string()));
        self
    }

    pub fn append_text(&self, text: &str) -> &Self {
        let mut content = self.0.content.borrow_mut();
        if let Some(Content::Text(last)) = content.last_mut() {
            last.push_str(text);
        } else {
            content.push(Content::Text(text.to_string()));
        }
        self
    }

    //
    // Serialization
    //

    fn write_start(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.qualified_name());
        for attr in self.0.attributes.borrow().iter() {
            out.push(' ');
            if let Some(prefix) = &attr.prefix {
                out.push_str(prefix);
                out.push(':');
            }
            out.push_str(&attr.name);
            out.push_str("='");
            entities::escape_into(&attr.value, out);
            out.push('\'');
        }
    }

    fn write_end(&self, out: &mut String) {
        out.push_str("</");
        out.push_str(&self.qualified_name());
        out.push('>');
    }

    /// Serializes the element into the string.
    ///
    /// Attribute values are single quoted and markup characters are
    /// escaped. An element without content is written as an empty
    /// element tag in [Full](WriteMode::Full) mode.
    pub fn write_to(&self, out: &mut String, mode: WriteMode) {
        match mode {
            WriteMode::CloseOnly => self.write_end(out),
            WriteMode::OpenOnly => {
                self.write_start(out);
                out.push('>');
            }
            WriteMode::Full => {
                self.write_start(out);
                let content = self.0.content.borrow();
                let is_empty = content.iter().all(|piece| match piece {
                    Content::Text(s) => s.is_empty(),
                    Content::Child(_) => false,
                });
                if is_empty {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for piece in content.iter() {
                    match piece {
                        Content::Child(child) => child.write_to(out, WriteMode::Full),
                        Content::Text(s) => entities::escape_into(s, out),
                    }
                }
                self.write_end(out);
            }
        }
    }

    pub fn to_string_with(&self, mode: WriteMode) -> String {
        let mut out = String::new();
        self.write_to(&mut out, mode);
        out
    }
}

impl Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_string_with(WriteMode::Full))
    }
}

impl Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Element({:?}, {})", self.0.kind, self)
    }
}
