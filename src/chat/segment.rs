//! Typed content units that make up a turn.
use serde::{Deserialize, Serialize};

/// The category of a segment. Textual kinds coalesce while streaming,
/// everything else opens a new segment per event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Text,
    Code,
    Reasoning,
    Image,
    GeneratedImage,
    Upload,
    Download,
}

impl SegmentKind {
    /// Textual kinds extend the trailing segment when events of the same
    /// kind arrive back to back.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::Text | Self::Code | Self::Reasoning)
    }
}

/// Payload for the binary segment kinds. Content is never absent; an
/// empty byte vector stands in for "no data yet".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilePayload {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
    pub file_id: Option<String>,
}

impl FilePayload {
    pub fn new(bytes: Vec<u8>, filename: Option<String>, file_id: Option<String>) -> Self {
        Self {
            bytes,
            filename,
            file_id,
        }
    }
}

/// One typed unit of turn content. Each kind carries exactly the payload
/// shape it needs so illegal combinations cannot be constructed.
#[derive(Clone, Debug, PartialEq)]
pub enum Segment {
    Text(String),
    Code(String),
    Reasoning(String),
    Image(FilePayload),
    GeneratedImage(FilePayload),
    Upload(FilePayload),
    Download(FilePayload),
}

impl Segment {
    pub fn kind(&self) -> SegmentKind {
        match self {
            Self::Text(_) => SegmentKind::Text,
            Self::Code(_) => SegmentKind::Code,
            Self::Reasoning(_) => SegmentKind::Reasoning,
            Self::Image(_) => SegmentKind::Image,
            Self::GeneratedImage(_) => SegmentKind::GeneratedImage,
            Self::Upload(_) => SegmentKind::Upload,
            Self::Download(_) => SegmentKind::Download,
        }
    }

    pub fn is_kind(&self, kind: SegmentKind) -> bool {
        self.kind() == kind
    }

    /// The accumulated text for textual segments.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Code(s) | Self::Reasoning(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn text_mut(&mut self) -> Option<&mut String> {
        match self {
            Self::Text(s) | Self::Code(s) | Self::Reasoning(s) => Some(s),
            _ => None,
        }
    }

    /// The payload for binary segments.
    pub fn payload(&self) -> Option<&FilePayload> {
        match self {
            Self::Image(p) | Self::GeneratedImage(p) | Self::Upload(p) | Self::Download(p) => {
                Some(p)
            }
            _ => None,
        }
    }
}
