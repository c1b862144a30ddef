use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::ReplacementError;

use super::segment::{utf16_to_byte, MarkupList, MarkupSegment, SourceRef};

/// New content for one text node of a contenteditable surface.
///
/// The node is looked up again at apply time; `old_text` guards against the
/// page having changed it since extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeReplacement {
    pub selector: Option<String>,
    pub text_node_index: usize,
    pub old_text: String,
    pub new_text: String,
    /// Byte range of `old_text` inside the edited span.
    pub covered: Range<usize>,
}

struct Hit<'a> {
    index: usize,
    text: &'a str,
    source: Option<&'a SourceRef>,
    local: Range<usize>,
}

/// Which text segments a flat-text span touches, with the byte range touched in each.
fn locate(
    list: &MarkupList,
    offset: usize,
    length: usize,
) -> Result<Vec<Hit<'_>>, ReplacementError> {
    let total = list.flat_len();
    let end = offset
        .checked_add(length)
        .filter(|end| *end <= total)
        .ok_or(ReplacementError::OutOfRange {
            offset,
            length,
            total,
        })?;

    let mut hits = Vec::new();
    let mut pos = 0;
    for (index, segment) in list.iter().enumerate() {
        let seg_start = pos;
        let seg_end = pos + segment.flat_len();
        pos = seg_end;

        match segment {
            MarkupSegment::Markup { .. } => {
                if seg_end > seg_start && seg_start < end && seg_end > offset {
                    return Err(ReplacementError::SpansBoundary { offset, length });
                }
            }
            MarkupSegment::Text { text, source } => {
                let touches = if length == 0 {
                    hits.is_empty() && seg_start <= offset && offset <= seg_end
                } else {
                    seg_start < end && seg_end > offset
                };
                if !touches {
                    continue;
                }
                let local_start = offset.max(seg_start) - seg_start;
                let local_end = end.min(seg_end) - seg_start;
                let start_byte = utf16_to_byte(text, local_start)
                    .ok_or(ReplacementError::SplitsCharacter(offset))?;
                let end_byte =
                    utf16_to_byte(text, local_end).ok_or(ReplacementError::SplitsCharacter(end))?;
                hits.push(Hit {
                    index,
                    text,
                    source: source.as_ref(),
                    local: start_byte..end_byte,
                });
            }
        }
    }

    if hits.is_empty() {
        return Err(ReplacementError::SpansBoundary { offset, length });
    }
    Ok(hits)
}

/// New text of a touched segment. The first touched segment receives the
/// replacement; later ones only lose the covered part.
fn rewrite(hit: &Hit<'_>, first: bool, replacement: &str) -> String {
    let mut out = String::with_capacity(hit.text.len() + replacement.len());
    out.push_str(&hit.text[..hit.local.start]);
    if first {
        out.push_str(replacement);
    }
    out.push_str(&hit.text[hit.local.end..]);
    out
}

/// Translate a flat-text edit into per-node edits for a contenteditable surface.
pub fn find_node_replacements(
    list: &MarkupList,
    offset: usize,
    length: usize,
    replacement: &str,
) -> Result<Vec<NodeReplacement>, ReplacementError> {
    let hits = locate(list, offset, length)?;
    hits.iter()
        .enumerate()
        .map(|(n, hit)| {
            let source = hit
                .source
                .ok_or(ReplacementError::Unaddressable { index: hit.index })?;
            Ok(NodeReplacement {
                selector: source.selector.clone(),
                text_node_index: source.text_node_index,
                old_text: hit.text.to_string(),
                new_text: rewrite(hit, n == 0, replacement),
                covered: hit.local.clone(),
            })
        })
        .collect()
}

/// Apply a flat-text edit to the list itself.
pub fn replace(
    list: &MarkupList,
    offset: usize,
    length: usize,
    replacement: &str,
) -> Result<MarkupList, ReplacementError> {
    let edits: Vec<(usize, String)> = locate(list, offset, length)?
        .iter()
        .enumerate()
        .map(|(n, hit)| (hit.index, rewrite(hit, n == 0, replacement)))
        .collect();

    let mut out = list.clone();
    for (index, new_text) in edits {
        if let MarkupSegment::Text { text, .. } = &mut out.segments_mut()[index] {
            *text = new_text;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::extract;
    use crate::markup::segment::utf16_slice;

    #[test]
    fn plain_value_replacement() {
        let list = MarkupList::from_plain("Ths is a tset.");
        let fixed = replace(&list, 0, 3, "This").unwrap();
        assert_eq!(fixed.flat_text(), "This is a tset.");
    }

    #[test]
    fn plain_value_cannot_be_addressed_by_node() {
        let list = MarkupList::from_plain("Ths is a tset.");
        assert_eq!(
            find_node_replacements(&list, 0, 3, "This").unwrap_err(),
            ReplacementError::Unaddressable { index: 0 }
        );
    }

    #[test]
    fn single_node_keeps_prefix_and_suffix() {
        let list = extract("<p>I has a cat.</p>");
        let reps = find_node_replacements(&list, 2, 3, "have").unwrap();
        assert_eq!(
            reps,
            vec![NodeReplacement {
                selector: Some("p:nth-child(1)".into()),
                text_node_index: 0,
                old_text: "I has a cat.".into(),
                new_text: "I have a cat.".into(),
                covered: 2..5,
            }]
        );
    }

    #[test]
    fn span_across_inline_markup_touches_each_node() {
        let list = extract("<p>recieve<b>d it</b> now</p>");
        // "recieved it" -> "received it"
        let reps = find_node_replacements(&list, 0, 8, "received").unwrap();
        assert_eq!(reps.len(), 2);
        assert_eq!(reps[0].new_text, "received");
        assert_eq!(reps[1].selector.as_deref(), Some("p:nth-child(1) > b:nth-child(1)"));
        assert_eq!(reps[1].new_text, " it");

        let fixed = replace(&list, 0, 8, "received").unwrap();
        assert_eq!(fixed.flat_text(), "received it now\n\n");
    }

    #[test]
    fn span_over_block_break_is_refused() {
        let list = extract("<p>one</p><p>two</p>");
        assert_eq!(
            find_node_replacements(&list, 2, 3, "x").unwrap_err(),
            ReplacementError::SpansBoundary {
                offset: 2,
                length: 3
            }
        );
    }

    #[test]
    fn out_of_range_is_reported() {
        let list = extract("<p>short</p>");
        assert!(matches!(
            find_node_replacements(&list, 5, 10, "x"),
            Err(ReplacementError::OutOfRange { .. })
        ));
    }

    #[test]
    fn insertion_attaches_to_preceding_text() {
        let list = extract("ab<i>cd</i>");
        let reps = find_node_replacements(&list, 2, 0, "X").unwrap();
        assert_eq!(reps.len(), 1);
        assert_eq!(reps[0].new_text, "abX");
    }

    #[test]
    fn offsets_are_utf16() {
        let list = extract("<p>😀 teh end</p>");
        let reps = find_node_replacements(&list, 3, 3, "the").unwrap();
        assert_eq!(reps[0].new_text, "😀 the end");
        assert_eq!(
            find_node_replacements(&list, 1, 2, "x").unwrap_err(),
            ReplacementError::SplitsCharacter(1)
        );
    }

    #[test]
    fn covered_ranges_concatenate_to_the_flat_span() {
        let list = extract("<div>Hello <b>brave</b> <i>new <u>wide</u></i> world</div>");
        let flat = list.flat_text();
        let total = list.flat_len() - 2; // trailing block break is not text
        for offset in 0..total {
            for length in 1..=(total - offset) {
                let reps = find_node_replacements(&list, offset, length, "").unwrap();
                let covered: String = reps
                    .iter()
                    .map(|r| &r.old_text[r.covered.clone()])
                    .collect();
                assert_eq!(
                    covered,
                    utf16_slice(&flat, offset, offset + length).unwrap(),
                    "span {offset}+{length}"
                );
            }
        }
    }
}
