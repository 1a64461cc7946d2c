//! Exclusive XML canonicalization (without comments).
//!
//! Implements the parts of xml-exc-c14n the SAML signature profile
//! exercises: namespace declarations are emitted only where visibly
//! utilized and not already rendered by an ancestor, namespace nodes
//! precede attributes, attributes sort by (namespace URI, local name),
//! and character data is escaped per the C14N rules. The output of the
//! signer and the verifier must agree byte for byte, so both sides of
//! this crate serialize exclusively through here.

use super::{Element, Node};

/// Canonicalizes an element subtree.
#[must_use]
pub fn exclusive_c14n(root: &Element) -> String {
    let mut out = String::new();
    render(root, &[], &mut out);
    out
}

/// A (prefix, uri) pair already rendered in the output ancestry.
type RenderedNs = (Option<String>, String);

fn lookup<'a>(rendered: &'a [RenderedNs], prefix: &Option<String>) -> Option<&'a str> {
    rendered
        .iter()
        .rev()
        .find(|(p, _)| p == prefix)
        .map(|(_, uri)| uri.as_str())
}

fn render(element: &Element, rendered: &[RenderedNs], out: &mut String) {
    // Collect the namespace declarations this element must emit: the
    // visibly-utilized prefixes (its own plus its attributes') whose
    // binding is not already in the rendered output context.
    let mut new_decls: Vec<RenderedNs> = Vec::new();

    match (&element.prefix, &element.namespace) {
        (prefix, Some(uri)) => {
            if lookup(rendered, prefix) != Some(uri.as_str()) {
                new_decls.push((prefix.clone(), uri.clone()));
            }
        }
        (None, None) => {
            // An unqualified element must undeclare an inherited default
            // namespace.
            if lookup(rendered, &None).is_some_and(|uri| !uri.is_empty()) {
                new_decls.push((None, String::new()));
            }
        }
        (Some(_), None) => {}
    }

    for attr in &element.attributes {
        if let (Some(prefix), Some(uri)) = (&attr.prefix, &attr.namespace) {
            if prefix == "xml" {
                continue;
            }
            let key = Some(prefix.clone());
            if lookup(rendered, &key) != Some(uri.as_str())
                && !new_decls.iter().any(|(p, _)| p == &key)
            {
                new_decls.push((key, uri.clone()));
            }
        }
    }

    // Default namespace first, then by prefix.
    new_decls.sort_by(|(a, _), (b, _)| match (a, b) {
        (None, None) => std::cmp::Ordering::Equal,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (Some(_), None) => std::cmp::Ordering::Greater,
        (Some(a), Some(b)) => a.cmp(b),
    });

    let qname = element.qname();
    out.push('<');
    out.push_str(&qname);

    for (prefix, uri) in &new_decls {
        match prefix {
            None => {
                out.push_str(" xmlns=\"");
            }
            Some(prefix) => {
                out.push_str(" xmlns:");
                out.push_str(prefix);
                out.push_str("=\"");
            }
        }
        escape_attribute(uri, out);
        out.push('"');
    }

    let mut attrs: Vec<&super::Attribute> = element.attributes.iter().collect();
    attrs.sort_by(|a, b| {
        let a_ns = a.namespace.as_deref().unwrap_or("");
        let b_ns = b.namespace.as_deref().unwrap_or("");
        a_ns.cmp(b_ns).then_with(|| a.local.cmp(&b.local))
    });

    for attr in attrs {
        out.push(' ');
        if let Some(prefix) = &attr.prefix {
            out.push_str(prefix);
            out.push(':');
        }
        out.push_str(&attr.local);
        out.push_str("=\"");
        escape_attribute(&attr.value, out);
        out.push('"');
    }

    out.push('>');

    let mut child_context: Vec<RenderedNs> = rendered.to_vec();
    child_context.extend(new_decls);

    for node in &element.children {
        match node {
            Node::Element(child) => render(child, &child_context, out),
            Node::Text(text) => escape_text(text, out),
        }
    }

    out.push_str("</");
    out.push_str(&qname);
    out.push('>');
}

fn escape_text(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::Element;
    use super::*;

    #[test]
    fn attributes_are_sorted() {
        let root = Element::parse(r#"<Root b="2" a="1" c="3"></Root>"#).unwrap();
        assert_eq!(exclusive_c14n(&root), r#"<Root a="1" b="2" c="3"></Root>"#);
    }

    #[test]
    fn empty_elements_expand() {
        let root = Element::parse("<Root><Child/></Root>").unwrap();
        assert_eq!(exclusive_c14n(&root), "<Root><Child></Child></Root>");
    }

    #[test]
    fn unused_namespace_declarations_are_dropped() {
        let root = Element::parse(
            r#"<a:Root xmlns:a="urn:a" xmlns:unused="urn:unused"><a:Child/></a:Root>"#,
        )
        .unwrap();
        assert_eq!(
            exclusive_c14n(&root),
            r#"<a:Root xmlns:a="urn:a"><a:Child></a:Child></a:Root>"#
        );
    }

    #[test]
    fn inherited_namespaces_are_not_re_rendered() {
        let root = Element::parse(
            r#"<a:Root xmlns:a="urn:a"><a:Child attr="v"><a:Leaf/></a:Child></a:Root>"#,
        )
        .unwrap();
        let canonical = exclusive_c14n(&root);
        assert_eq!(canonical.matches("xmlns:a").count(), 1);
    }

    #[test]
    fn namespace_declared_on_ancestor_reappears_on_subtree_root() {
        // Canonicalizing a subtree whose namespace was declared higher up
        // must re-emit the declaration.
        let root = Element::parse(
            r#"<a:Root xmlns:a="urn:a" xmlns:b="urn:b"><b:Inner>x</b:Inner></a:Root>"#,
        )
        .unwrap();
        let inner = root.child("urn:b", "Inner").unwrap();
        assert_eq!(
            exclusive_c14n(inner),
            r#"<b:Inner xmlns:b="urn:b">x</b:Inner>"#
        );
    }

    #[test]
    fn attribute_namespaces_are_emitted() {
        let root = Element::parse(
            r#"<Root xmlns:x="urn:x"><Child x:attr="v"/></Root>"#,
        )
        .unwrap();
        let child = root.child_elements().next().unwrap();
        assert_eq!(
            exclusive_c14n(child),
            r#"<Child xmlns:x="urn:x" x:attr="v"></Child>"#
        );
    }

    #[test]
    fn text_escaping_follows_c14n() {
        let root = Element::parse("<Root>a &amp; b\r\nc</Root>").unwrap();
        assert_eq!(exclusive_c14n(&root), "<Root>a &amp; b&#xD;\nc</Root>");
    }

    #[test]
    fn canonical_form_is_idempotent() {
        let root = Element::parse(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" Version="2.0" ID="_r1"><samlp:Status/></samlp:Response>"#,
        )
        .unwrap();
        let first = exclusive_c14n(&root);
        let second = exclusive_c14n(&Element::parse(&first).unwrap());
        assert_eq!(first, second);
    }
}
