use std::sync::LazyLock;

use regex::Regex;

use crate::error::ReplacementError;

use super::segment::{MarkupList, MarkupSegment};

// A single start or end tag with well-formed attributes.
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^<(/?)([a-zA-Z][a-zA-Z0-9-]*)((?:\s+[^\s"'<>/=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))?)*)\s*/?>$"#,
    )
    .expect("TAG_RE: hardcoded regex is valid")
});

static EVENT_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\son[a-z]+\s*=").expect("EVENT_ATTR_RE: hardcoded regex is valid")
});

static SCRIPT_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(java|vb)script\s*:").expect("SCRIPT_URL_RE: hardcoded regex is valid")
});

const FORBIDDEN_TAGS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "frame", "frameset", "link", "meta", "base",
];

/// Rebuild HTML from a markup list.
///
/// Text is always escaped. Markup segments are passed through only when they
/// are a single harmless tag; anything else fails instead of being dropped.
pub fn to_html(list: &MarkupList) -> Result<String, ReplacementError> {
    let mut out = String::new();
    for segment in list {
        match segment {
            MarkupSegment::Text { text, .. } => out.push_str(&html_escape::encode_text(text)),
            MarkupSegment::Markup { markup, .. } => {
                check_markup(markup)?;
                out.push_str(markup);
            }
        }
    }
    Ok(out)
}

/// Plain value for `value` / `textContent` targets.
pub fn to_plain(list: &MarkupList) -> String {
    list.flat_text()
}

fn check_markup(markup: &str) -> Result<(), ReplacementError> {
    let unsafe_markup = || ReplacementError::UnsafeMarkup(markup.to_string());
    let caps = TAG_RE.captures(markup).ok_or_else(unsafe_markup)?;
    let tag = caps[2].to_ascii_lowercase();
    if FORBIDDEN_TAGS.contains(&tag.as_str()) {
        return Err(unsafe_markup());
    }
    let attrs = &caps[3];
    if EVENT_ATTR_RE.is_match(attrs) || SCRIPT_URL_RE.is_match(attrs) {
        return Err(unsafe_markup());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::extract;

    #[test]
    fn round_trip_keeps_visible_text_in_order() {
        let html = r#"<p class="lead">Hello <b>big</b> world</p><ul><li>one</li><li>two &amp; three</li></ul>"#;
        let rebuilt = to_html(&extract(html)).unwrap();
        assert_eq!(rebuilt, html);
        assert_eq!(extract(&rebuilt).flat_text(), extract(html).flat_text());
    }

    #[test]
    fn text_is_escaped() {
        let list = MarkupList::from_plain("<img src=x onerror=alert(1)>");
        assert_eq!(
            to_html(&list).unwrap(),
            "&lt;img src=x onerror=alert(1)&gt;"
        );
    }

    #[test]
    fn unsafe_markup_is_rejected() {
        for markup in [
            "<script>",
            "<img src=x onerror=alert(1)>",
            r#"<a href="javascript:alert(1)">"#,
            "<b>oops</b>",
        ] {
            let list = MarkupList::new(vec![MarkupSegment::markup(markup, "")]);
            assert!(
                matches!(to_html(&list), Err(ReplacementError::UnsafeMarkup(_))),
                "{markup} should be rejected"
            );
        }
    }
}
