//! Download payload descriptors.
//!
//! Framing these as HTTP headers and bodies is the front end's job; the
//! descriptors only carry what that framing needs.

use serde::{Deserialize, Serialize};

/// Bytes served for a range read.
///
/// `[start, end)` is the half-open slice actually served, which may be
/// shorter than what was asked for (reads are capped per call).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangePayload {
    pub file_name: String,
    pub data: Vec<u8>,
    pub start: u64,
    pub end: u64,
    pub total_size: u64,
}

impl RangePayload {
    /// Number of bytes served.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True when the served slice reaches the end of the source.
    pub fn is_last(&self) -> bool {
        self.end >= self.total_size
    }

    /// Value for a `Content-Range` header, e.g. `bytes 500-999/2000`.
    pub fn content_range(&self) -> String {
        if self.is_empty() {
            format!("bytes */{}", self.total_size)
        } else {
            format!("bytes {}-{}/{}", self.start, self.end - 1, self.total_size)
        }
    }
}

/// A complete download: either a single file or a zip of the selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Download {
    pub file_name: String,
    pub data: Vec<u8>,
}
