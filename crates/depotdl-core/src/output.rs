//! Output lines surfaced from the worker's standard streams.

use serde::{Deserialize, Serialize};

/// Which worker stream a line arrived on.
///
/// Control messages are recognized on stdout only; stderr content is always
/// surfaced verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamOrigin {
    Stdout,
    Stderr,
}

/// One line of worker output, with the stream it came from.
///
/// Lines from the same stream arrive in the order the worker wrote them;
/// no ordering holds across the two streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    pub content: String,
    pub origin: StreamOrigin,
}

impl OutputLine {
    pub fn stdout(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            origin: StreamOrigin::Stdout,
        }
    }

    pub fn stderr(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            origin: StreamOrigin::Stderr,
        }
    }

    /// Whether the line came from the worker's error stream.
    pub const fn is_error(&self) -> bool {
        matches!(self.origin, StreamOrigin::Stderr)
    }
}
