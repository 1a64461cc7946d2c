//! Namespace-aware XML element tree.
//!
//! SAML signature work needs more than event scanning: the verifier has
//! to locate elements by namespace, strip the enveloped signature, and
//! re-serialize byte-stably. This module parses a document once into an
//! owned tree (whitespace preserved, namespaces resolved at parse time)
//! and serializes through the exclusive canonicalizer in [`c14n`].

mod c14n;

pub use c14n::exclusive_c14n;

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

use crate::error::{SamlError, SamlResult};

/// A namespace declaration (`xmlns` or `xmlns:prefix`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    /// Declared prefix; `None` for the default namespace.
    pub prefix: Option<String>,
    /// The namespace URI.
    pub uri: String,
}

/// An attribute with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute prefix, if any.
    pub prefix: Option<String>,
    /// Local attribute name.
    pub local: String,
    /// Resolved namespace URI; unprefixed attributes have none.
    pub namespace: Option<String>,
    /// Unescaped attribute value.
    pub value: String,
}

/// A child node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A child element.
    Element(Element),
    /// Character data (unescaped).
    Text(String),
}

/// An XML element with resolved namespaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Element prefix, if any.
    pub prefix: Option<String>,
    /// Local element name.
    pub local: String,
    /// Resolved namespace URI.
    pub namespace: Option<String>,
    /// Namespace declarations carried on this element.
    pub declarations: Vec<NamespaceDecl>,
    /// Attributes in document order.
    pub attributes: Vec<Attribute>,
    /// Child nodes in document order.
    pub children: Vec<Node>,
}

impl Element {
    /// Parses a document and returns the root element.
    ///
    /// Comments and processing instructions are dropped (the exclusive
    /// canonicalization used downstream excludes comments anyway).
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::XmlParse`] on malformed input.
    pub fn parse(xml: &str) -> SamlResult<Element> {
        let mut reader = Reader::from_str(xml);
        let config = reader.config_mut();
        config.trim_text(false);
        config.expand_empty_elements = true;

        let mut scope_stack: Vec<HashMap<Option<String>, String>> = vec![HashMap::new()];
        let mut element_stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => {
                    if root.is_some() {
                        return Err(SamlError::XmlParse(
                            "content after document element".to_string(),
                        ));
                    }

                    let mut declarations = Vec::new();
                    let mut raw_attrs = Vec::new();

                    for attr in start.attributes() {
                        let attr = attr
                            .map_err(|e| SamlError::XmlParse(format!("bad attribute: {e}")))?;
                        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                        let value = attr
                            .unescape_value()
                            .map_err(|e| SamlError::XmlParse(format!("bad attribute value: {e}")))?
                            .into_owned();

                        if key == "xmlns" {
                            declarations.push(NamespaceDecl { prefix: None, uri: value });
                        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                            declarations.push(NamespaceDecl {
                                prefix: Some(prefix.to_string()),
                                uri: value,
                            });
                        } else {
                            raw_attrs.push((key, value));
                        }
                    }

                    let mut scope = scope_stack
                        .last()
                        .cloned()
                        .unwrap_or_default();
                    for decl in &declarations {
                        scope.insert(decl.prefix.clone(), decl.uri.clone());
                    }

                    let (prefix, local) = split_qname(&String::from_utf8_lossy(start.name().as_ref()));
                    let namespace = match &prefix {
                        Some(p) => Some(scope.get(&Some(p.clone())).cloned().ok_or_else(|| {
                            SamlError::XmlParse(format!("undeclared namespace prefix '{p}'"))
                        })?),
                        None => scope.get(&None).filter(|uri| !uri.is_empty()).cloned(),
                    };

                    let attributes = raw_attrs
                        .into_iter()
                        .map(|(key, value)| {
                            let (attr_prefix, attr_local) = split_qname(&key);
                            let attr_namespace = match &attr_prefix {
                                Some(p) if p == "xml" => {
                                    Some("http://www.w3.org/XML/1998/namespace".to_string())
                                }
                                Some(p) => {
                                    Some(scope.get(&Some(p.clone())).cloned().ok_or_else(
                                        || {
                                            SamlError::XmlParse(format!(
                                                "undeclared namespace prefix '{p}'"
                                            ))
                                        },
                                    )?)
                                }
                                None => None,
                            };
                            Ok(Attribute {
                                prefix: attr_prefix,
                                local: attr_local,
                                namespace: attr_namespace,
                                value,
                            })
                        })
                        .collect::<SamlResult<Vec<_>>>()?;

                    scope_stack.push(scope);
                    element_stack.push(Element {
                        prefix,
                        local,
                        namespace,
                        declarations,
                        attributes,
                        children: Vec::new(),
                    });
                }
                Ok(Event::End(_)) => {
                    scope_stack.pop();
                    let finished = element_stack
                        .pop()
                        .ok_or_else(|| SamlError::XmlParse("unbalanced end tag".to_string()))?;
                    match element_stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(finished)),
                        None => root = Some(finished),
                    }
                }
                Ok(Event::Text(text)) => {
                    if let Some(parent) = element_stack.last_mut() {
                        let value = text
                            .unescape()
                            .map_err(|e| SamlError::XmlParse(format!("bad text: {e}")))?
                            .into_owned();
                        parent.children.push(Node::Text(value));
                    }
                }
                Ok(Event::CData(data)) => {
                    if let Some(parent) = element_stack.last_mut() {
                        let value = String::from_utf8_lossy(data.as_ref()).into_owned();
                        parent.children.push(Node::Text(value));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(SamlError::XmlParse(e.to_string())),
            }
        }

        root.ok_or_else(|| SamlError::XmlParse("no document element".to_string()))
    }

    /// Returns true when the element has the given namespace and local
    /// name.
    #[must_use]
    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.local == local && self.namespace.as_deref() == Some(namespace)
    }

    /// Returns the fully-qualified tag name as written.
    #[must_use]
    pub fn qname(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.local),
            None => self.local.clone(),
        }
    }

    /// Iterates the direct child elements.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// Returns the first direct child with the given namespace and name.
    #[must_use]
    pub fn child(&self, namespace: &str, local: &str) -> Option<&Element> {
        self.child_elements().find(|el| el.is(namespace, local))
    }

    /// Returns all direct children with the given namespace and name.
    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        local: &'a str,
    ) -> impl Iterator<Item = &'a Element> {
        self.child_elements().filter(move |el| el.is(namespace, local))
    }

    /// Returns the value of an unprefixed attribute.
    #[must_use]
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.prefix.is_none() && attr.local == local)
            .map(|attr| attr.value.as_str())
    }

    /// Returns the concatenated direct text content.
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(value) = node {
                out.push_str(value);
            }
        }
        out
    }

    /// Returns a copy of this element with the first matching direct
    /// child removed. Used for the enveloped-signature transform.
    #[must_use]
    pub fn without_child(&self, namespace: &str, local: &str) -> Element {
        let mut copy = self.clone();
        let mut removed = false;
        copy.children.retain(|node| {
            if removed {
                return true;
            }
            if let Node::Element(el) = node {
                if el.is(namespace, local) {
                    removed = true;
                    return false;
                }
            }
            true
        });
        copy
    }

    /// Serializes the element through exclusive canonicalization.
    ///
    /// The output is well-formed standalone XML; the same bytes feed
    /// digest computation, so serialize-then-parse is stable.
    #[must_use]
    pub fn to_xml(&self) -> String {
        exclusive_c14n(self)
    }
}

fn split_qname(qname: &str) -> (Option<String>, String) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, qname.to_string()),
    }
}

/// Escapes character data for element content.
#[must_use]
pub fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
