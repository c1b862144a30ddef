//! Tracks which editable element has focus and extracts its content.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::MetaData;
use crate::dom::{Document, NodeId, SharedDocument};
use crate::error::{DomError, ExtractionError};
use crate::markup::{extract_node, MarkupList};
use crate::session::SurfaceId;
use crate::telemetry::Telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    SimpleInput,
    ContentEditable,
    IframeDelegate,
}

/// The focused editable element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Surface {
    pub id: SurfaceId,
    pub element: NodeId,
    pub kind: SurfaceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceChange {
    pub previous: Option<SurfaceId>,
    pub current: Option<Surface>,
}

pub type SurfaceObserver = Box<dyn Fn(&SurfaceChange)>;

/// Extracted content ready for a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckText {
    pub markup_list: MarkupList,
    pub meta_data: MetaData,
    /// False for selections; corrections cannot be applied to them.
    pub is_editable_text: bool,
    pub url: String,
}

/// `textarea`, or an `input` of type text or search. A missing type reads as text.
pub fn is_simple_input(doc: &Document, element: NodeId) -> bool {
    match doc.tag_name(element) {
        Some("textarea") => true,
        Some("input") => matches!(
            doc.attribute(element, "type")
                .map(str::to_ascii_lowercase)
                .as_deref(),
            None | Some("text") | Some("search")
        ),
        _ => false,
    }
}

pub fn classify(doc: &Document, element: NodeId) -> Option<SurfaceKind> {
    if is_simple_input(doc, element) {
        Some(SurfaceKind::SimpleInput)
    } else if doc.is_content_editable(element) {
        Some(SurfaceKind::ContentEditable)
    } else if doc.tag_name(element) == Some("iframe") {
        Some(SurfaceKind::IframeDelegate)
    } else {
        None
    }
}

/// Content of `element` as the checker sees it.
pub fn markup_of_element(
    doc: &Document,
    element: Option<NodeId>,
) -> Result<MarkupList, ExtractionError> {
    let Some(element) = element else {
        return Err(ExtractionError::PlaceCursor3);
    };
    match classify(doc, element) {
        Some(SurfaceKind::SimpleInput) => Ok(MarkupList::from_plain(
            doc.value(element).unwrap_or_default(),
        )),
        Some(SurfaceKind::ContentEditable) => Ok(extract_node(doc, element)),
        Some(SurfaceKind::IframeDelegate) => {
            let frame = doc.frame_document(element)?;
            let frame = frame.borrow();
            let inner = frame
                .active_element()
                .ok_or(ExtractionError::PlaceCursor1)?;
            frame_element_markup(&frame, inner)
        }
        None => Err(ExtractionError::PlaceCursor2(
            doc.tag_name(element).unwrap_or_default().to_string(),
        )),
    }
}

fn frame_element_markup(frame: &Document, element: NodeId) -> Result<MarkupList, ExtractionError> {
    if !frame.children(element).is_empty() {
        return Ok(extract_node(frame, element));
    }
    let text = frame.text_content(element);
    if !text.is_empty() {
        return Ok(MarkupList::from_plain(text));
    }
    Err(ExtractionError::PlaceCursor1)
}

/// Focus state machine over one page document.
pub struct SurfaceLocator {
    document: SharedDocument,
    page_url: String,
    telemetry: Arc<dyn Telemetry>,
    current: Option<Surface>,
    observers: Vec<SurfaceObserver>,
}

impl SurfaceLocator {
    pub fn new(
        document: SharedDocument,
        page_url: impl Into<String>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            document,
            page_url: page_url.into(),
            telemetry,
            current: None,
            observers: Vec::new(),
        }
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    pub fn surface(&self) -> Option<Surface> {
        self.current
    }

    pub fn subscribe(&mut self, observer: SurfaceObserver) {
        self.observers.push(observer);
    }

    /// Re-evaluate the surface after focus moved to `element`.
    pub fn on_focus_change(&mut self, element: Option<NodeId>) -> Option<Surface> {
        let kind = element.and_then(|el| self.detect(el).map(|kind| (el, kind)));

        let unchanged = match (self.current, kind) {
            (Some(current), Some((el, kind))) => current.element == el && current.kind == kind,
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return self.current;
        }

        let previous = self.current.map(|s| s.id);
        self.current = kind.map(|(element, kind)| Surface {
            id: SurfaceId::new(),
            element,
            kind,
        });
        tracing::debug!(?previous, current = ?self.current, "active surface changed");

        let change = SurfaceChange {
            previous,
            current: self.current,
        };
        for observer in &self.observers {
            observer(&change);
        }
        self.current
    }

    fn detect(&self, element: NodeId) -> Option<SurfaceKind> {
        let doc = self.document.borrow();
        let kind = classify(&doc, element)?;
        if kind == SurfaceKind::IframeDelegate {
            match doc.frame_document(element) {
                Ok(_) => {}
                Err(DomError::CrossOrigin) => {
                    self.telemetry
                        .track(&self.page_url, "cross-origin frame is not accessible");
                    return None;
                }
                Err(e) => {
                    tracing::debug!("frame without document: {}", e);
                    return None;
                }
            }
        }
        Some(kind)
    }

    /// Markup list of the active surface.
    pub fn current_markup_list(&self) -> Result<MarkupList, ExtractionError> {
        let doc = self.document.borrow();
        match self.current {
            Some(surface) => markup_of_element(&doc, Some(surface.element)),
            None => markup_of_element(&doc, doc.active_element()),
        }
    }

    /// What a check should look at right now. A selection wins over the
    /// focused element; if extraction fails, each same-origin frame's active
    /// element is tried in turn.
    pub fn check_text(&self, meta: MetaData) -> Result<CheckText, ExtractionError> {
        let doc = self.document.borrow();
        let url = meta.page_url.clone();
        let read_only = |text: String| CheckText {
            markup_list: MarkupList::from_plain(text),
            meta_data: meta.clone(),
            is_editable_text: false,
            url: url.clone(),
        };

        if let Some(active) = doc
            .active_element()
            .filter(|el| doc.tag_name(*el) == Some("iframe"))
        {
            match doc.frame_document(active) {
                Ok(frame) => {
                    let selected = frame.borrow().selection_text();
                    if !selected.is_empty() {
                        return Ok(read_only(selected));
                    }
                }
                Err(e) => self
                    .telemetry
                    .track(&url, &format!("error on checkText for iframe: {}", e)),
            }
        }

        let selected = doc.selection_text();
        if !selected.is_empty() {
            return Ok(read_only(selected.replace('\n', "\n\n")));
        }
        drop(doc);

        let editable = |markup_list| CheckText {
            markup_list,
            meta_data: meta.clone(),
            is_editable_text: true,
            url: url.clone(),
        };

        match self.current_markup_list() {
            Ok(list) => Ok(editable(list)),
            Err(err) => {
                self.telemetry
                    .track(&url, &format!("error on checkText - get selection: {}", err));
                if let Some(list) = self.first_frame_markup() {
                    return Ok(editable(list));
                }
                self.telemetry.track(
                    &url,
                    &format!("Exception and failing fallback in checkText: {}", err),
                );
                Err(err)
            }
        }
    }

    fn first_frame_markup(&self) -> Option<MarkupList> {
        let doc = self.document.borrow();
        doc.elements_by_tag_name("iframe")
            .into_iter()
            .filter_map(|iframe| doc.frame_document(iframe).ok())
            .find_map(|frame| {
                let frame = frame.borrow();
                markup_of_element(&frame, frame.active_element()).ok()
            })
    }
}
