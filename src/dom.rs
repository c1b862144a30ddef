//! Arena model of a live page document.
//!
//! Nodes are addressed by [`NodeId`] and never freed; removing a node only
//! detaches it. Frames hold their own document behind a shared handle so a
//! caller can borrow the frame without keeping the parent borrowed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use scraper::{ElementRef, Html, Node as HtmlNode};

use crate::error::DomError;

pub type SharedDocument = Rc<RefCell<Document>>;

/// Elements serialized without a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    value: Option<String>,
}

impl Element {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            value: None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Input,
    Change,
    MouseDown,
    MouseUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchedEvent {
    pub target: NodeId,
    pub kind: EventKind,
    pub bubbles: bool,
}

/// A boundary point inside a text node; `offset` is a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub node: NodeId,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomRange {
    pub start: Boundary,
    pub end: Boundary,
}

impl DomRange {
    pub fn collapsed(at: Boundary) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub document: SharedDocument,
    pub same_origin: bool,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    body: NodeId,
    active_element: Option<NodeId>,
    selection: Option<DomRange>,
    frames: HashMap<NodeId, Frame>,
    events: Vec<DispatchedEvent>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            body: NodeId(0),
            active_element: None,
            selection: None,
            frames: HashMap::new(),
            events: Vec::new(),
        };
        let root = doc.create_element("html");
        let body = doc.create_element("body");
        doc.push_child(root, body);
        doc.root = root;
        doc.body = body;
        doc
    }

    /// Build a document whose body holds the parsed `html`.
    pub fn from_body_html(html: &str) -> Self {
        let mut doc = Self::new();
        let body = doc.body;
        doc.append_html(body, html);
        doc
    }

    pub fn into_shared(self) -> SharedDocument {
        Rc::new(RefCell::new(self))
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push_node(NodeData::Element(Element::new(tag)))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeData::Text(text.to_string()))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.element(parent)?;
        self.node(child)?;
        self.detach(child);
        self.push_child(parent, child);
        Ok(())
    }

    pub fn remove_child(&mut self, child: NodeId) -> Result<(), DomError> {
        self.node(child)?;
        self.detach(child);
        Ok(())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.is_element(*c))
            .collect()
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0).map(|n| &n.data)
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.data(id), Some(NodeData::Element(_)))
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.data(id), Some(NodeData::Text(_)))
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Element(el)) => Some(el.tag.as_str()),
            _ => None,
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Element(el)) => el.attr(name),
            _ => None,
        }
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.attribute(id, name).is_some()
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let el = self.element_mut(id)?;
        match el
            .attributes
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(pos) => el.attributes[pos].1 = value.to_string(),
            None => el
                .attributes
                .push((name.to_ascii_lowercase(), value.to_string())),
        }
        Ok(())
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Text(t)) => Some(t.as_str()),
            _ => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<(), DomError> {
        match self.nodes.get_mut(id.0).map(|n| &mut n.data) {
            Some(NodeData::Text(t)) => {
                *t = text.to_string();
                Ok(())
            }
            Some(NodeData::Element(_)) => Err(DomError::NotText(id.0)),
            None => Err(DomError::MissingNode(id.0)),
        }
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            if let Some(t) = self.text(node) {
                out.push_str(t);
            }
        }
        out
    }

    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> Result<(), DomError> {
        self.element(id)?;
        self.clear_children(id);
        if !text.is_empty() {
            let child = self.create_text(text);
            self.push_child(id, child);
        }
        Ok(())
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(id) {
            self.serialize(*child, &mut out);
        }
        out
    }

    pub fn set_inner_html(&mut self, id: NodeId, html: &str) -> Result<(), DomError> {
        self.element(id)?;
        self.clear_children(id);
        self.append_html(id, html);
        Ok(())
    }

    /// Live value of a form control. Textareas fall back to their text, inputs
    /// to their `value` attribute.
    pub fn value(&self, id: NodeId) -> Option<String> {
        let Some(NodeData::Element(el)) = self.data(id) else {
            return None;
        };
        if let Some(v) = &el.value {
            return Some(v.clone());
        }
        match el.tag.as_str() {
            "textarea" => Some(self.text_content(id)),
            "input" => Some(el.attr("value").unwrap_or_default().to_string()),
            _ => None,
        }
    }

    pub fn set_value(&mut self, id: NodeId, value: &str) -> Result<(), DomError> {
        self.element_mut(id)?.value = Some(value.to_string());
        Ok(())
    }

    /// Merge adjacent text nodes and drop empty ones, recursively.
    pub fn normalize(&mut self, id: NodeId) {
        let children = self.children(id).to_vec();
        let mut kept: Vec<NodeId> = Vec::with_capacity(children.len());
        for child in children {
            match self.nodes[child.0].data.clone() {
                NodeData::Text(text) => {
                    if text.is_empty() {
                        self.nodes[child.0].parent = None;
                        continue;
                    }
                    if let Some(prev) = kept.last().copied().filter(|p| self.is_text(*p)) {
                        if let NodeData::Text(prev_text) = &mut self.nodes[prev.0].data {
                            prev_text.push_str(&text);
                        }
                        self.nodes[child.0].parent = None;
                        continue;
                    }
                    kept.push(child);
                }
                NodeData::Element(_) => {
                    self.normalize(child);
                    kept.push(child);
                }
            }
        }
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.children = kept;
        }
    }

    /// Pre-order walk of `id` and everything below it.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if self.nodes.get(next.0).is_none() {
                continue;
            }
            out.push(next);
            for child in self.children(next).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    pub fn elements_by_tag_name(&self, tag: &str) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|id| self.tag_name(*id) == Some(tag))
            .collect()
    }

    pub fn is_content_editable(&self, id: NodeId) -> bool {
        self.has_attribute(id, "contenteditable")
    }

    pub fn active_element(&self) -> Option<NodeId> {
        self.active_element
    }

    pub fn focus(&mut self, id: NodeId) -> Result<(), DomError> {
        self.element(id)?;
        self.active_element = Some(id);
        Ok(())
    }

    pub fn blur(&mut self) {
        self.active_element = None;
    }

    pub fn selection(&self) -> Option<DomRange> {
        self.selection
    }

    pub fn set_selection(&mut self, range: Option<DomRange>) {
        self.selection = range;
    }

    /// Select `len` bytes of a single text node.
    pub fn select_text(&mut self, node: NodeId, start: usize, end: usize) {
        self.selection = Some(DomRange {
            start: Boundary {
                node,
                offset: start,
            },
            end: Boundary { node, offset: end },
        });
    }

    /// Text covered by the current selection, in document order.
    pub fn selection_text(&self) -> String {
        let Some(range) = self.selection else {
            return String::new();
        };
        if range.is_collapsed() {
            return String::new();
        }
        let mut out = String::new();
        let mut inside = false;
        for id in self.descendants(self.root) {
            let Some(text) = self.text(id) else {
                continue;
            };
            let start = if id == range.start.node {
                inside = true;
                range.start.offset.min(text.len())
            } else {
                0
            };
            if !inside {
                continue;
            }
            let end = if id == range.end.node {
                range.end.offset.min(text.len())
            } else {
                text.len()
            };
            out.push_str(text.get(start..end).unwrap_or_default());
            if id == range.end.node {
                break;
            }
        }
        out
    }

    pub fn dispatch_event(&mut self, target: NodeId, kind: EventKind) {
        self.events.push(DispatchedEvent {
            target,
            kind,
            bubbles: true,
        });
    }

    pub fn events(&self) -> &[DispatchedEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<DispatchedEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn attach_frame(
        &mut self,
        iframe: NodeId,
        document: Document,
        same_origin: bool,
    ) -> Result<SharedDocument, DomError> {
        if self.tag_name(iframe) != Some("iframe") {
            return Err(DomError::NotAFrame(iframe.0));
        }
        let shared = document.into_shared();
        self.frames.insert(
            iframe,
            Frame {
                document: shared.clone(),
                same_origin,
            },
        );
        Ok(shared)
    }

    /// The frame's document, or `CrossOrigin` when the page may not reach into it.
    pub fn frame_document(&self, iframe: NodeId) -> Result<SharedDocument, DomError> {
        match self.frames.get(&iframe) {
            Some(frame) if frame.same_origin => Ok(frame.document.clone()),
            Some(_) => Err(DomError::CrossOrigin),
            None => Err(DomError::NotAFrame(iframe.0)),
        }
    }

    fn node(&self, id: NodeId) -> Result<&Node, DomError> {
        self.nodes.get(id.0).ok_or(DomError::MissingNode(id.0))
    }

    fn element(&self, id: NodeId) -> Result<&Element, DomError> {
        match &self.node(id)?.data {
            NodeData::Element(el) => Ok(el),
            NodeData::Text(_) => Err(DomError::NotAnElement(id.0)),
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut Element, DomError> {
        match self.nodes.get_mut(id.0).map(|n| &mut n.data) {
            Some(NodeData::Element(el)) => Ok(el),
            Some(NodeData::Text(_)) => Err(DomError::NotAnElement(id.0)),
            None => Err(DomError::MissingNode(id.0)),
        }
    }

    fn push_node(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    fn push_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.nodes[child.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != child);
        }
    }

    fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
    }

    fn append_html(&mut self, parent: NodeId, html: &str) {
        let fragment = Html::parse_fragment(html);
        self.append_parsed(parent, fragment.root_element());
    }

    fn append_parsed(&mut self, parent: NodeId, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                HtmlNode::Text(text) => {
                    let id = self.create_text(&**text);
                    self.push_child(parent, id);
                }
                HtmlNode::Element(el) => {
                    let id = self.create_element(el.name());
                    if let Ok(created) = self.element_mut(id) {
                        created.attributes = el
                            .attrs()
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .collect();
                    }
                    self.push_child(parent, id);
                    if let Some(child_ref) = ElementRef::wrap(child) {
                        self.append_parsed(id, child_ref);
                    }
                }
                _ => {}
            }
        }
    }

    fn serialize(&self, id: NodeId, out: &mut String) {
        match self.data(id) {
            Some(NodeData::Text(text)) => out.push_str(&html_escape::encode_text(text)),
            Some(NodeData::Element(el)) => {
                out.push_str(&open_tag(el));
                if VOID_ELEMENTS.contains(&el.tag.as_str()) {
                    return;
                }
                for child in self.children(id) {
                    self.serialize(*child, out);
                }
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
            None => {}
        }
    }
}

pub(crate) fn open_tag(el: &Element) -> String {
    let mut out = format!("<{}", el.tag);
    for (name, value) in &el.attributes {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&html_escape::encode_double_quoted_attribute(value));
        out.push('"');
    }
    out.push('>');
    out
}
