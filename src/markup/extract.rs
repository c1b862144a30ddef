use crate::dom::{open_tag, Document, Element, NodeData, NodeId, VOID_ELEMENTS};

use super::segment::{MarkupList, MarkupSegment, SourceRef};

/// Elements whose end reads as a paragraph break.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "blockquote", "div", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ol",
    "p", "pre", "section", "table", "tr", "ul",
];

/// Content that never reaches the flat text.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "template", "noscript"];

/// Parse an HTML fragment and flatten it into a markup list.
pub fn extract(html: &str) -> MarkupList {
    let doc = Document::from_body_html(html);
    extract_node(&doc, doc.body())
}

/// Flatten the subtree below `root` of a live document.
///
/// Text node indexes are computed as if the tree had been normalized, so
/// they stay valid after the applier normalizes the parent.
pub fn extract_node(doc: &Document, root: NodeId) -> MarkupList {
    let mut walker = Walker {
        doc,
        segments: Vec::new(),
    };
    walker.walk_children(root, None);
    MarkupList::new(walker.segments)
}

struct Walker<'a> {
    doc: &'a Document,
    segments: Vec<MarkupSegment>,
}

impl Walker<'_> {
    fn walk_children(&mut self, parent: NodeId, selector: Option<&str>) {
        let mut index = 0;
        let mut element_ordinal = 0;
        let mut pending: Option<String> = None;
        let doc = self.doc;

        for &child in doc.children(parent) {
            match doc.data(child) {
                Some(NodeData::Text(text)) => {
                    if !text.is_empty() {
                        pending.get_or_insert_with(String::new).push_str(text);
                    }
                }
                Some(NodeData::Element(el)) => {
                    if let Some(text) = pending.take() {
                        self.push_text(text, selector, index);
                        index += 1;
                    }
                    element_ordinal += 1;
                    let path = child_selector(selector, &el.tag, element_ordinal);
                    self.walk_element(child, el, &path);
                    index += 1;
                }
                None => {}
            }
        }

        if let Some(text) = pending.take() {
            self.push_text(text, selector, index);
        }
    }

    fn walk_element(&mut self, id: NodeId, el: &Element, path: &str) {
        let tag = el.tag.as_str();
        if SKIPPED_ELEMENTS.contains(&tag) {
            return;
        }
        if tag == "br" {
            self.segments.push(MarkupSegment::markup(open_tag(el), "\n"));
            return;
        }
        if VOID_ELEMENTS.contains(&tag) {
            self.segments.push(MarkupSegment::markup(open_tag(el), ""));
            return;
        }

        self.segments.push(MarkupSegment::markup(open_tag(el), ""));
        self.walk_children(id, Some(path));
        let interpret_as = if BLOCK_ELEMENTS.contains(&tag) {
            "\n\n"
        } else {
            ""
        };
        self.segments
            .push(MarkupSegment::markup(format!("</{tag}>"), interpret_as));
    }

    fn push_text(&mut self, text: String, selector: Option<&str>, index: usize) {
        self.segments.push(MarkupSegment::sourced(
            text,
            SourceRef {
                selector: selector.map(str::to_string),
                text_node_index: index,
            },
        ));
    }
}

fn child_selector(parent: Option<&str>, tag: &str, ordinal: usize) -> String {
    match parent {
        Some(parent) => format!("{parent} > {tag}:nth-child({ordinal})"),
        None => format!("{tag}:nth-child({ordinal})"),
    }
}

/// Find the element a selector path from [`extract_node`] points at, starting below `root`.
///
/// Returns `None` when any step no longer matches the live tree.
pub fn resolve_selector(doc: &Document, root: NodeId, selector: &str) -> Option<NodeId> {
    let mut current = root;
    for step in selector.split(" > ") {
        let (tag, rest) = step.trim().split_once(":nth-child(")?;
        let ordinal: usize = rest.strip_suffix(')')?.parse().ok()?;
        let child = *doc.element_children(current).get(ordinal.checked_sub(1)?)?;
        if doc.tag_name(child) != Some(tag) {
            return None;
        }
        current = child;
    }
    Some(current)
}
