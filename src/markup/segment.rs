use serde::{Deserialize, Serialize};

/// Where a text segment came from: the parent element (as a selector path
/// relative to the extraction root, `None` for the root itself) and the text
/// node's index among that parent's normalized child nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub text_node_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkupSegment {
    Text {
        text: String,
        #[serde(default, rename = "sourceRef", skip_serializing_if = "Option::is_none")]
        source: Option<SourceRef>,
    },
    /// A raw tag. Zero width unless `interpret_as` stands in for it in the flat text.
    Markup {
        markup: String,
        #[serde(default, rename = "interpretAs", skip_serializing_if = "String::is_empty")]
        interpret_as: String,
    },
}

impl MarkupSegment {
    pub fn text(text: impl Into<String>) -> Self {
        MarkupSegment::Text {
            text: text.into(),
            source: None,
        }
    }

    pub fn sourced(text: impl Into<String>, source: SourceRef) -> Self {
        MarkupSegment::Text {
            text: text.into(),
            source: Some(source),
        }
    }

    pub fn markup(markup: impl Into<String>, interpret_as: impl Into<String>) -> Self {
        MarkupSegment::Markup {
            markup: markup.into(),
            interpret_as: interpret_as.into(),
        }
    }

    /// What this segment contributes to the flat text.
    pub fn flat(&self) -> &str {
        match self {
            MarkupSegment::Text { text, .. } => text,
            MarkupSegment::Markup { interpret_as, .. } => interpret_as,
        }
    }

    pub fn flat_len(&self) -> usize {
        utf16_len(self.flat())
    }

    pub fn source(&self) -> Option<&SourceRef> {
        match self {
            MarkupSegment::Text { source, .. } => source.as_ref(),
            MarkupSegment::Markup { .. } => None,
        }
    }
}

// Content equality; where a segment came from does not matter.
impl PartialEq for MarkupSegment {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MarkupSegment::Text { text: a, .. }, MarkupSegment::Text { text: b, .. }) => a == b,
            (
                MarkupSegment::Markup {
                    markup: a,
                    interpret_as: ai,
                },
                MarkupSegment::Markup {
                    markup: b,
                    interpret_as: bi,
                },
            ) => a == b && ai == bi,
            _ => false,
        }
    }
}

impl Eq for MarkupSegment {}

/// Ordered segments of one surface's content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkupList(Vec<MarkupSegment>);

impl MarkupList {
    pub fn new(segments: Vec<MarkupSegment>) -> Self {
        Self(segments)
    }

    /// A whole plain value as one sourceless segment.
    pub fn from_plain(text: impl Into<String>) -> Self {
        Self(vec![MarkupSegment::text(text)])
    }

    pub fn segments(&self) -> &[MarkupSegment] {
        &self.0
    }

    pub fn segments_mut(&mut self) -> &mut [MarkupSegment] {
        &mut self.0
    }

    pub fn push(&mut self, segment: MarkupSegment) {
        self.0.push(segment);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MarkupSegment> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The text offsets refer to.
    pub fn flat_text(&self) -> String {
        self.0.iter().map(MarkupSegment::flat).collect()
    }

    /// Length of the flat text in UTF-16 code units.
    pub fn flat_len(&self) -> usize {
        self.0.iter().map(MarkupSegment::flat_len).sum()
    }

    /// True when no segment carries any characters.
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|s| s.flat().is_empty())
    }
}

impl<'a> IntoIterator for &'a MarkupList {
    type Item = &'a MarkupSegment;
    type IntoIter = std::slice::Iter<'a, MarkupSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<MarkupSegment> for MarkupList {
    fn from_iter<I: IntoIterator<Item = MarkupSegment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

/// Byte index of a UTF-16 offset, `None` past the end or inside a surrogate pair.
pub fn utf16_to_byte(s: &str, offset: usize) -> Option<usize> {
    let mut units = 0;
    for (idx, ch) in s.char_indices() {
        if units == offset {
            return Some(idx);
        }
        units += ch.len_utf16();
        if units > offset {
            return None;
        }
    }
    (units == offset).then_some(s.len())
}

/// Slice of `s` between two UTF-16 offsets.
pub fn utf16_slice(s: &str, start: usize, end: usize) -> Option<&str> {
    let start = utf16_to_byte(s, start)?;
    let end = utf16_to_byte(s, end)?;
    s.get(start..end)
}
