//! Wire types for the chat backend. Client → server JSON bodies and the
//! `data: `-prefixed frames of the streamed answer.

use serde::{Deserialize, Serialize};

use crate::transcript::Mode;

/// Marker that starts every frame line of a streamed answer.
pub const FRAME_MARKER: &str = "data: ";

/// Client → server: question body. The variant decides the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryRequest<'a> {
    /// Answer from the whole document; POSTed to the query endpoint.
    Document {
        question: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        chapter_id: Option<&'a str>,
    },
    /// Answer from highlighted text; POSTed to the excerpt endpoint.
    Excerpt {
        question: &'a str,
        selected_text: &'a str,
    },
}

impl<'a> QueryRequest<'a> {
    pub fn document(question: &'a str, chapter_id: Option<&'a str>) -> Self {
        QueryRequest::Document {
            question,
            chapter_id,
        }
    }

    pub fn excerpt(question: &'a str, selected_text: &'a str) -> Self {
        QueryRequest::Excerpt {
            question,
            selected_text,
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            QueryRequest::Document { .. } => Mode::WholeDocument,
            QueryRequest::Excerpt { .. } => Mode::Excerpt,
        }
    }

    pub fn question(&self) -> &'a str {
        match self {
            QueryRequest::Document { question, .. } | QueryRequest::Excerpt { question, .. } => {
                *question
            }
        }
    }
}

/// Server → client: one frame payload. Both fields are optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StreamFrame {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub done: Option<bool>,
}

impl StreamFrame {
    /// `None` for lines that are not frames, `Some(Err)` for a frame whose
    /// payload is not valid JSON.
    pub fn parse_line(line: &str) -> Option<Result<Self, serde_json::Error>> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let payload = line.strip_prefix(FRAME_MARKER)?;
        Some(serde_json::from_str(payload))
    }

    /// Non-empty content fragment, if the frame carries one.
    pub fn fragment(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.is_empty())
    }

    pub fn is_done(&self) -> bool {
        self.done == Some(true)
    }
}
