//! Flattening of editable content into a markup list and back.
//!
//! A markup list is the surface's text as the checking service sees it: text
//! segments interleaved with raw tags. Offsets reported by the service are
//! UTF-16 offsets into the concatenated flat text, and this module maps them
//! back to the text nodes they came from.

mod extract;
mod render;
mod replace;
mod segment;

pub use extract::{extract, extract_node, resolve_selector};
pub use render::{to_html, to_plain};
pub use replace::{find_node_replacements, replace, NodeReplacement};
pub use segment::{utf16_len, utf16_slice, utf16_to_byte, MarkupList, MarkupSegment, SourceRef};
