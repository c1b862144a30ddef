use thiserror::Error;

/// The active element could not be turned into a markup list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("Please place the cursor in an editable text field.")]
    PlaceCursor1,
    #[error("Please place the cursor in an editable text field (the active element is a <{0}>).")]
    PlaceCursor2(String),
    #[error("Please place the cursor in an editable text field (no active element).")]
    PlaceCursor3,
    #[error("cannot access cross-origin frame")]
    CrossOrigin,
}

impl ExtractionError {
    /// Cross-origin failures are expected on many pages and only go to telemetry.
    pub fn is_benign(&self) -> bool {
        matches!(self, ExtractionError::CrossOrigin)
    }
}

/// An (offset, length) span could not be mapped onto the markup list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplacementError {
    #[error("span {offset}+{length} is outside the text (length {total})")]
    OutOfRange {
        offset: usize,
        length: usize,
        total: usize,
    },
    #[error("span {offset}+{length} crosses an element boundary")]
    SpansBoundary { offset: usize, length: usize },
    #[error("text segment {index} has no source node")]
    Unaddressable { index: usize },
    #[error("offset {0} falls inside a surrogate pair")]
    SplitsCharacter(usize),
    #[error("refusing to render unsafe markup: {0}")]
    UnsafeMarkup(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Replacement(#[from] ReplacementError),
    #[error("text node {text_node_index} under {selector:?} no longer matches")]
    StaleNode {
        selector: Option<String>,
        text_node_index: usize,
    },
    #[error("no active text field")]
    NoSurface,
    #[error("selected text is read-only")]
    ReadOnly,
    #[error("cannot replace text in this element")]
    Unsupported,
    #[error(transparent)]
    Dom(#[from] DomError),
}

impl ApplyError {
    /// Message shown to the user when a correction could not be applied.
    pub fn user_message(&self) -> &'static str {
        "No replacement possible. The text may have changed in the meantime."
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("node {0} does not exist")]
    MissingNode(usize),
    #[error("node {0} is not an element")]
    NotAnElement(usize),
    #[error("node {0} is not a text node")]
    NotText(usize),
    #[error("node {0} is not an iframe")]
    NotAFrame(usize),
    #[error("blocked access to a cross-origin frame")]
    CrossOrigin,
}

impl From<DomError> for ExtractionError {
    fn from(err: DomError) -> Self {
        match err {
            DomError::CrossOrigin => ExtractionError::CrossOrigin,
            _ => ExtractionError::PlaceCursor1,
        }
    }
}

/// Remote check failed before a usable response arrived.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Server error ({status}): {message}")]
    Status { status: u16, message: String },
    #[error("Failed to parse response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] confy::ConfyError),
    #[error("settings store is poisoned")]
    Poisoned,
}
