//! Writes an accepted correction back into the page.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use crate::dom::{Boundary, Document, DomRange, EventKind, NodeId, SharedDocument};
use crate::error::ApplyError;
use crate::markup::{
    extract_node, find_node_replacements, replace, resolve_selector, to_html, to_plain, MarkupList,
    NodeReplacement,
};
use crate::surface::{classify, is_simple_input, SurfaceKind};

/// Awaited between a simulated selection and the mutation that follows it,
/// so the host page's own handlers can react.
pub trait SettleSignal {
    fn settle(&self) -> impl Future<Output = ()>;
}

#[derive(Debug, Clone, Copy)]
pub struct DelaySettle(pub Duration);

impl Default for DelaySettle {
    fn default() -> Self {
        Self(Duration::from_millis(25))
    }
}

impl SettleSignal for DelaySettle {
    fn settle(&self) -> impl Future<Output = ()> {
        tokio::time::sleep(self.0)
    }
}

/// One accepted suggestion against the list it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    pub markup_list: MarkupList,
    pub offset: usize,
    pub length: usize,
    pub replacement: String,
    /// False when the list came from a selection.
    pub editable: bool,
}

/// How the correction reached the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Value,
    TextNodes(usize),
    InnerHtml,
    TextContent,
}

#[derive(Debug, Default)]
pub struct CorrectionApplier<S = DelaySettle> {
    settle: S,
}

impl<S: SettleSignal> CorrectionApplier<S> {
    pub fn new(settle: S) -> Self {
        Self { settle }
    }

    /// Apply `correction` to `target`, a focused element of `doc`. Either the
    /// whole correction lands or the document is left as it was.
    pub async fn apply(
        &self,
        doc: &SharedDocument,
        target: NodeId,
        correction: &Correction,
    ) -> Result<Applied, ApplyError> {
        if !correction.editable {
            return Err(ApplyError::ReadOnly);
        }
        let kind = classify(&doc.borrow(), target).ok_or(ApplyError::Unsupported)?;
        tracing::debug!(?kind, offset = correction.offset, length = correction.length, "applying correction");
        match kind {
            SurfaceKind::SimpleInput => apply_value(&mut doc.borrow_mut(), target, correction),
            SurfaceKind::ContentEditable => self.apply_nodes(doc, target, correction).await,
            SurfaceKind::IframeDelegate => {
                let frame = doc.borrow().frame_document(target)?;
                self.apply_in_frame(&frame, correction).await
            }
        }
    }

    async fn apply_in_frame(
        &self,
        frame: &SharedDocument,
        correction: &Correction,
    ) -> Result<Applied, ApplyError> {
        let (active, has_children) = {
            let doc = frame.borrow();
            let active = doc.active_element().ok_or(ApplyError::NoSurface)?;
            (active, !doc.children(active).is_empty())
        };
        if is_simple_input(&frame.borrow(), active) {
            return apply_value(&mut frame.borrow_mut(), active, correction);
        }
        if frame.borrow().is_content_editable(active) {
            return self.apply_nodes(frame, active, correction).await;
        }

        let mut doc = frame.borrow_mut();
        let fixed = replace(
            &correction.markup_list,
            correction.offset,
            correction.length,
            &correction.replacement,
        )?;
        if has_children {
            if extract_node(&doc, active) != correction.markup_list {
                return Err(stale_root());
            }
            let html = to_html(&fixed)?;
            doc.set_inner_html(active, &html)?;
            simulate_input(&mut doc, active);
            Ok(Applied::InnerHtml)
        } else {
            let current = doc.text_content(active);
            if current.is_empty() {
                return Err(ApplyError::Unsupported);
            }
            if current != correction.markup_list.flat_text() {
                return Err(stale_root());
            }
            doc.set_text_content(active, &to_plain(&fixed))?;
            simulate_input(&mut doc, active);
            Ok(Applied::TextContent)
        }
    }

    async fn apply_nodes(
        &self,
        doc: &SharedDocument,
        editable: NodeId,
        correction: &Correction,
    ) -> Result<Applied, ApplyError> {
        let replacements = find_node_replacements(
            &correction.markup_list,
            correction.offset,
            correction.length,
            &correction.replacement,
        )?;

        // Every node must be found before anything changes.
        {
            let mut d = doc.borrow_mut();
            for rep in &replacements {
                locate_text_node(&mut d, editable, rep, true).ok_or_else(|| stale(rep))?;
            }
        }

        let count = replacements.len();
        let mut queue: VecDeque<NodeReplacement> = replacements.into();
        let mut done: Vec<(NodeId, String)> = Vec::with_capacity(count);

        while let Some(rep) = queue.pop_front() {
            let node = {
                let mut d = doc.borrow_mut();
                let Some(node) = locate_text_node(&mut d, editable, &rep, false) else {
                    revert(&mut d, &done);
                    return Err(stale(&rep));
                };
                simulate_selection(&mut d, node);
                node
            };

            self.settle.settle().await;

            let mut d = doc.borrow_mut();
            if locate_text_node(&mut d, editable, &rep, false) != Some(node) {
                tracing::debug!(selector = ?rep.selector, index = rep.text_node_index, "text node changed while settling");
                revert(&mut d, &done);
                return Err(stale(&rep));
            }
            d.set_text(node, &rep.new_text)?;
            done.push((node, rep.old_text));
        }

        simulate_input(&mut doc.borrow_mut(), editable);
        Ok(Applied::TextNodes(count))
    }
}

fn apply_value(
    doc: &mut Document,
    target: NodeId,
    correction: &Correction,
) -> Result<Applied, ApplyError> {
    let current = doc.value(target).ok_or(ApplyError::Unsupported)?;
    if current != correction.markup_list.flat_text() {
        return Err(stale_root());
    }
    let fixed = replace(
        &correction.markup_list,
        correction.offset,
        correction.length,
        &correction.replacement,
    )?;
    doc.set_value(target, &to_plain(&fixed))?;
    simulate_input(doc, target);
    Ok(Applied::Value)
}

/// The text node `rep` addresses, if it still holds `old_text`.
fn locate_text_node(
    doc: &mut Document,
    editable: NodeId,
    rep: &NodeReplacement,
    normalize: bool,
) -> Option<NodeId> {
    let parent = match &rep.selector {
        Some(selector) => resolve_selector(doc, editable, selector)?,
        None => editable,
    };
    if normalize {
        doc.normalize(parent);
    }
    let node = *doc.children(parent).get(rep.text_node_index)?;
    (doc.text(node) == Some(rep.old_text.as_str())).then_some(node)
}

fn revert(doc: &mut Document, done: &[(NodeId, String)]) {
    for (node, old_text) in done.iter().rev() {
        if let Err(e) = doc.set_text(*node, old_text) {
            tracing::warn!("failed to revert text node: {}", e);
        }
    }
}

fn stale(rep: &NodeReplacement) -> ApplyError {
    ApplyError::StaleNode {
        selector: rep.selector.clone(),
        text_node_index: rep.text_node_index,
    }
}

fn stale_root() -> ApplyError {
    ApplyError::StaleNode {
        selector: None,
        text_node_index: 0,
    }
}

/// Collapse the selection at the start of `node` and click it.
fn simulate_selection(doc: &mut Document, node: NodeId) {
    doc.set_selection(Some(DomRange::collapsed(Boundary { node, offset: 0 })));
    doc.dispatch_event(node, EventKind::MouseDown);
    doc.dispatch_event(node, EventKind::MouseUp);
}

fn simulate_input(doc: &mut Document, target: NodeId) {
    doc.dispatch_event(target, EventKind::Input);
    doc.dispatch_event(target, EventKind::Change);
}
