//! Document builder: folds styles and assembled script blocks into the page
//! template and serializes the final self-contained HTML document.
//!
//! The template is parsed with html5ever, which guarantees `<head>` and
//! `<body>` exist even for a fragmentary template. Styles land at the end of
//! `<head>`, scripts at the end of `<body>` in registration order; the
//! serializer writes `<script>`/`<style>` text content raw.

use std::cell::RefCell;
use std::rc::Rc;

use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{local_name, namespace_url, ns, parse_document};
use html5ever::{Attribute, LocalName, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};

use crate::assemble::{Assembly, BlockKind};
use crate::error::BuildError;
use crate::runtime::HOT_RELOAD_CLIENT;

/// Where the hot-reload client polls for the build version.
#[derive(Debug, Clone)]
pub struct HotReloadEndpoint {
    pub host: String,
    pub port: u16,
}

pub fn build_document(
    page_html: &str,
    styles: &[String],
    assembly: &Assembly,
    hot_reload: Option<&HotReloadEndpoint>,
) -> Result<String, BuildError> {
    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut page_html.as_bytes())
        .map_err(|e| BuildError::page(format!("failed to parse page template: {e}")))?;

    let head = find_element(&dom.document, "head")
        .ok_or_else(|| BuildError::page("page template has no <head>"))?;
    let body = find_element(&dom.document, "body")
        .ok_or_else(|| BuildError::page("page template has no <body>"))?;

    for style in styles {
        let node = element(local_name!("style"), Vec::new());
        append(&node, text_node(style));
        append(&head, node);
    }

    for block in &assembly.blocks {
        let mut attrs = Vec::new();
        match block.kind {
            BlockKind::ImportMap => attrs.push(attr("type", "importmap")),
            BlockKind::Bootstrap => {}
            BlockKind::Module => {
                attrs.push(attr("type", "module"));
                if let Some(key) = &block.module_key {
                    attrs.push(attr("data-imex-module", key));
                }
                if let Some(path) = &block.source_path {
                    attrs.push(attr("data-imex-source", path));
                }
            }
        }
        let node = element(local_name!("script"), attrs);
        append(&node, text_node(&block.code));
        append(&body, node);
    }

    if let Some(endpoint) = hot_reload {
        let client = HOT_RELOAD_CLIENT
            .replace("$HOST", &endpoint.host)
            .replace("$PORT", &endpoint.port.to_string());
        let node = element(local_name!("script"), Vec::new());
        append(&node, text_node(&client));
        append(&body, node);
    }

    let mut out = Vec::new();
    let document: SerializableHandle = dom.document.clone().into();
    serialize(&mut out, &document, SerializeOpts::default())
        .map_err(|e| BuildError::page(format!("failed to serialize document: {e}")))?;
    String::from_utf8(out).map_err(|e| BuildError::page(format!("non-utf8 document: {e}")))
}

fn find_element(handle: &Handle, tag: &str) -> Option<Handle> {
    if let NodeData::Element { name, .. } = &handle.data {
        if name.local.as_ref() == tag {
            return Some(handle.clone());
        }
    }
    for child in handle.children.borrow().iter() {
        if let Some(found) = find_element(child, tag) {
            return Some(found);
        }
    }
    None
}

fn element(tag: LocalName, attrs: Vec<Attribute>) -> Handle {
    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), tag),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

fn text_node(content: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from(content)),
    })
}

fn attr(name: &str, value: &str) -> Attribute {
    Attribute {
        name: QualName::new(None, ns!(), LocalName::from(name)),
        value: StrTendril::from(value),
    }
}

fn append(parent: &Handle, child: Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}
