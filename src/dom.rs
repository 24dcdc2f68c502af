//! Query and mutation facade over a parsed `scraper::Html` tree.
//!
//! The page stays in the html5ever-built `ego_tree` for its whole life.
//! Enhancement passes edit that tree in place and html5ever's serializer
//! writes it back out, so markup the passes never touch round-trips the way
//! a browser would re-serialize it.
//!
//! Detached nodes stay in the tree's arena but lose their parent, so every
//! query that walks from the document root ignores them.

use std::io;

use ego_tree::iter::Edge;
use ego_tree::NodeRef;
use html5ever::serialize::{serialize, Serialize, SerializeOpts, Serializer, TraversalScope};
use html5ever::tendril::StrTendril;
use html5ever::{Attribute, LocalName, Namespace, QualName};
use scraper::node::Element;
use scraper::{Html, Node};
use tracing::debug;

/// Handle to a node in the document tree.
pub type NodeId = ego_tree::NodeId;

/// Elements whose first newline is eaten by the parser.
const NEWLINE_EATING_ELEMENTS: &[&str] = &["pre", "textarea", "listing"];

/// A mutable HTML document.
#[derive(Debug, Clone)]
pub struct Document {
    html: Html,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl Document {
    /// Parse a complete HTML document.
    ///
    /// Parsing never fails; html5ever recovers from malformed markup the same
    /// way a browser does (implied `<html>`, `<head>` and `<body>` included).
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    fn node(&self, id: NodeId) -> Option<NodeRef<'_, Node>> {
        self.html.tree.get(id)
    }

    fn root(&self) -> NodeId {
        self.html.tree.root().id()
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

impl Document {
    pub fn element(&self, id: NodeId) -> Option<&Element> {
        self.node(id).and_then(|n| n.value().as_element())
    }

    /// Lowercase local name, e.g. `h2`.
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(Element::name)
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attr(name))
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .map(|c| c.split_ascii_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    /// Pre-order descendants of `id`, not including `id` itself. Inert
    /// `<template>` contents are skipped.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node(id)
            .into_iter()
            .flat_map(|n| n.descendants().skip(1))
            .filter(|n| !in_template(*n))
            .map(|n| n.id())
    }

    /// Every element attached to the document, in document order.
    pub fn elements(&self) -> impl Iterator<Item = NodeId> + '_ {
        let root = self.root();
        self.descendants(root)
            .filter(move |&id| self.element(id).is_some())
    }

    /// Attached elements with the given tag name, in document order.
    pub fn elements_by_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.elements()
            .filter(move |&id| self.tag_name(id) == Some(tag))
    }

    /// First attached element whose `id` attribute equals `id`.
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.elements().find(|&n| self.attr(n, "id") == Some(id))
    }

    /// `true` when `node` is `ancestor` or lies somewhere below it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor
            || self
                .node(node)
                .map(|n| n.ancestors().any(|a| a.id() == ancestor))
                .unwrap_or(false)
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .filter_map(|n| self.node(n))
            .filter_map(|n| n.value().as_text().map(|t| &**t))
            .collect()
    }
}

#[cfg(test)]
impl Document {
    /// `true` when the node is reachable from the document root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.contains(self.root(), id)
    }

    /// Value of a single property in the inline `style` attribute.
    pub fn style_property(&self, id: NodeId, property: &str) -> Option<String> {
        let style = self.attr(id, "style")?;
        parse_style(style)
            .into_iter()
            .find(|(k, _)| k == property)
            .map(|(_, v)| v)
    }

    /// `true` when the inline style suppresses display.
    pub fn is_hidden(&self, id: NodeId) -> bool {
        self.style_property(id, "display").as_deref() == Some("none")
    }
}

// ---------------------------------------------------------------------------
// Mutation
// ---------------------------------------------------------------------------

impl Document {
    /// Rebuild an element with edited attributes. Returns the closure's
    /// result, or `None` for non-element nodes.
    ///
    /// scraper caches `id` and class lookups on the element, so attributes
    /// are never edited in place.
    fn edit_attrs<T>(
        &mut self,
        id: NodeId,
        edit: impl FnOnce(&mut Vec<Attribute>) -> T,
    ) -> Option<T> {
        let mut node = self.html.tree.get_mut(id)?;
        let (name, mut attrs) = match node.value() {
            Node::Element(element) => (
                element.name.clone(),
                element
                    .attrs
                    .iter()
                    .map(|(name, value)| Attribute {
                        name: name.clone(),
                        value: StrTendril::from_slice(value),
                    })
                    .collect::<Vec<_>>(),
            ),
            _ => return None,
        };
        let result = edit(&mut attrs);
        *node.value() = Node::Element(Element::new(name, attrs));
        Some(result)
    }

    /// Set (or replace) an attribute. No-op on non-element nodes.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        self.edit_attrs(id, |attrs| {
            let value = StrTendril::from_slice(value);
            match attrs.iter_mut().find(|a| is_plain_attr(a, name)) {
                Some(attr) => attr.value = value,
                None => attrs.push(Attribute {
                    name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
                    value,
                }),
            }
        });
    }

    /// Remove an attribute. Returns `true` if it was present.
    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> bool {
        self.edit_attrs(id, |attrs| {
            let before = attrs.len();
            attrs.retain(|a| !is_plain_attr(a, name));
            attrs.len() != before
        })
        .unwrap_or(false)
    }

    /// Set one property of the inline `style` attribute, keeping the others.
    pub fn set_style_property(&mut self, id: NodeId, property: &str, value: &str) {
        let mut props = self
            .attr(id, "style")
            .map(parse_style)
            .unwrap_or_default();
        match props.iter_mut().find(|(k, _)| k == property) {
            Some((_, v)) => *v = value.to_owned(),
            None => props.push((property.to_owned(), value.to_owned())),
        }
        let style = props
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("; ");
        self.set_attr(id, "style", &style);
    }

    /// Replace all children of `id` with the nodes parsed from `html`.
    pub fn set_inner_html(&mut self, id: NodeId, html: &str) {
        let old: Vec<NodeId> = match self.node(id) {
            Some(node) => node.children().map(|c| c.id()).collect(),
            None => return,
        };
        for child in old {
            self.remove(child);
        }
        let fragment = Html::parse_fragment(html);
        // Fragment parsing wraps the content in a synthetic <html> element.
        self.copy_children(id, *fragment.root_element());
    }

    fn copy_children(&mut self, parent: NodeId, source: NodeRef<'_, Node>) {
        for child in source.children() {
            let Some(mut target) = self.html.tree.get_mut(parent) else {
                return;
            };
            let copied = target.append(child.value().clone()).id();
            self.copy_children(copied, child);
        }
    }

    /// Detach a node (and its subtree) from the document.
    pub fn remove(&mut self, id: NodeId) {
        if let Some(mut node) = self.html.tree.get_mut(id) {
            node.detach();
        }
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

impl Document {
    /// Serialize the whole document.
    pub fn to_html(&self) -> String {
        write_markup(self.html.tree.root(), TraversalScope::IncludeNode)
    }

    /// Serialize the children of `id`.
    pub fn inner_html(&self, id: NodeId) -> String {
        match self.node(id) {
            Some(node) => {
                let parent = node.value().as_element().map(|e| e.name.clone());
                write_markup(node, TraversalScope::ChildrenOnly(parent))
            }
            None => String::new(),
        }
    }
}

/// A subtree handed to html5ever's serializer.
struct Markup<'a>(NodeRef<'a, Node>);

impl Serialize for Markup<'_> {
    fn serialize<S: Serializer>(&self, serializer: &mut S, scope: TraversalScope) -> io::Result<()> {
        let skip_self = matches!(scope, TraversalScope::ChildrenOnly(_));
        for edge in self.0.traverse() {
            match edge {
                Edge::Open(node) if skip_self && node == self.0 => {}
                Edge::Close(node) if skip_self && node == self.0 => {}
                Edge::Open(node) => match node.value() {
                    Node::Doctype(doctype) => serializer.write_doctype(doctype.name())?,
                    Node::Comment(comment) => serializer.write_comment(comment)?,
                    Node::Text(text) => serializer.write_text(text)?,
                    Node::Element(element) => {
                        let attrs = element.attrs.iter().map(|(k, v)| (k, &v[..]));
                        serializer.start_elem(element.name.clone(), attrs)?;
                        if eats_leading_newline(node) {
                            serializer.write_text("\n")?;
                        }
                    }
                    _ => {}
                },
                Edge::Close(node) => {
                    if let Some(element) = node.value().as_element() {
                        serializer.end_elem(element.name.clone())?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// `<pre>\n\nx` parses to the text `"\nx"`, so the dropped newline has to be
/// written back or the next parse loses another one.
fn eats_leading_newline(node: NodeRef<'_, Node>) -> bool {
    let is_html_pre = node
        .value()
        .as_element()
        .map(|e| {
            e.name.ns == Namespace::from("http://www.w3.org/1999/xhtml")
                && NEWLINE_EATING_ELEMENTS.contains(&e.name())
        })
        .unwrap_or(false);
    is_html_pre
        && node
            .first_child()
            .and_then(|c| c.value().as_text().map(|t| t.starts_with('\n')))
            .unwrap_or(false)
}

fn write_markup(node: NodeRef<'_, Node>, scope: TraversalScope) -> String {
    // The parser runs with scripting enabled, so <noscript> holds raw text
    // and has to be written back unescaped.
    let opts = SerializeOpts {
        scripting_enabled: true,
        traversal_scope: scope,
        create_missing_parent: false,
    };
    let mut buf = Vec::new();
    if let Err(e) = serialize(&mut buf, &Markup(node), opts) {
        debug!(error = %e, "serialization stopped early");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Template contents hang off the `<template>` element under a fragment node.
fn in_template(node: NodeRef<'_, Node>) -> bool {
    node.ancestors().any(|a| a.value().is_fragment())
}

fn is_plain_attr(attr: &Attribute, name: &str) -> bool {
    attr.name.prefix.is_none() && &*attr.name.local == name
}

fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (k, v) = decl.split_once(':')?;
            let k = k.trim();
            if k.is_empty() {
                return None;
            }
            Some((k.to_ascii_lowercase(), v.trim().to_owned()))
        })
        .collect()
}

/// Escape a double-quoted attribute value.
pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
