//! Reference HTML parsing for integration tests
//!
//! Rendered output is fed to html5ever, a conforming HTML5 parser, so tests
//! can compare what a browser would build against what the template author
//! wrote. Not every test binary uses every helper.

#![allow(dead_code)]

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// Routes engine logs to the test harness output. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();
}

fn parse(html: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default()).one(html)
}

/// Element structure of a document: one entry per element in document order,
/// with its tag name, attribute names and nesting depth. Text and comments
/// are left out.
pub fn element_shape(html: &str) -> Vec<String> {
    let dom = parse(html);
    let mut shape = Vec::new();
    collect_shape(&dom.document, 0, &mut shape);
    shape
}

fn collect_shape(handle: &Handle, depth: usize, shape: &mut Vec<String>) {
    if let NodeData::Element { name, attrs, .. } = &handle.data {
        let attrs: Vec<String> = attrs
            .borrow()
            .iter()
            .map(|attr| attr.name.local.to_string())
            .collect();
        shape.push(format!("{}{}[{}]", "  ".repeat(depth), &*name.local, attrs.join(" ")));
    }
    for child in handle.children.borrow().iter() {
        collect_shape(child, depth + 1, shape);
    }
}

/// The first element named `tag`, as its attributes and its text content.
pub fn find_element(html: &str, tag: &str) -> Option<(Vec<(String, String)>, String)> {
    let dom = parse(html);
    let handle = find(&dom.document, tag)?;
    let attrs = match &handle.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
            .collect(),
        _ => Vec::new(),
    };
    let mut text = String::new();
    collect_text(&handle, &mut text);
    Some((attrs, text))
}

/// Value of attribute `attr` on the first element named `tag`.
pub fn attribute(html: &str, tag: &str, attr: &str) -> Option<String> {
    let (attrs, _) = find_element(html, tag)?;
    attrs
        .into_iter()
        .find(|(name, _)| name == attr)
        .map(|(_, value)| value)
}

/// Text content of the first element named `tag`.
pub fn text_of(html: &str, tag: &str) -> Option<String> {
    find_element(html, tag).map(|(_, text)| text)
}

fn find(handle: &Handle, tag: &str) -> Option<Handle> {
    if let NodeData::Element { name, .. } = &handle.data {
        if &*name.local == tag {
            return Some(handle.clone());
        }
    }
    handle
        .children
        .borrow()
        .iter()
        .find_map(|child| find(child, tag))
}

fn collect_text(handle: &Handle, out: &mut String) {
    if let NodeData::Text { contents } = &handle.data {
        out.push_str(&contents.borrow());
    }
    for child in handle.children.borrow().iter() {
        collect_text(child, out);
    }
}
