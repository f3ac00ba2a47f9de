//! Operation outcomes returned to callers.
//!
//! Multi-item operations (paste, delete) never abort on the first failure:
//! each item gets an [`ItemResult`] and the aggregate is folded into a
//! [`ResultCode`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::JobId;

/// Aggregate outcome of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(ascii_case_insensitive)]
pub enum ResultCode {
    /// Every item succeeded.
    Success,
    /// Some items failed.
    Partial,
    /// Every item failed, or the request was rejected.
    Error,
    /// A background job is still running.
    #[strum(serialize = "in-progress", serialize = "inprogress", serialize = "running")]
    InProgress,
}

impl ResultCode {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCode::Success => "success",
            ResultCode::Partial => "partial",
            ResultCode::Error => "error",
            ResultCode::InProgress => "in-progress",
        }
    }

    /// Fold per-item outcomes: all ok → Success, all failed → Error, else Partial.
    ///
    /// An empty result set counts as success.
    pub fn from_results(results: &[ItemResult]) -> Self {
        let failures = results.iter().filter(|r| !r.success).count();
        if failures == 0 {
            ResultCode::Success
        } else if failures == results.len() {
            ResultCode::Error
        } else {
            ResultCode::Partial
        }
    }

    /// True for every code except `InProgress`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResultCode::InProgress)
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a paste does with the clipboard items.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum ClipboardAction {
    /// Cut: items leave their source.
    #[strum(serialize = "move", serialize = "cut")]
    Move,
    /// Copy: sources stay in place.
    Copy,
}

impl ClipboardAction {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipboardAction::Move => "move",
            ClipboardAction::Copy => "copy",
        }
    }

    /// Progress verb, e.g. "Moving report.pdf".
    pub fn verb(&self) -> &'static str {
        match self {
            ClipboardAction::Move => "Moving",
            ClipboardAction::Copy => "Copying",
        }
    }

    /// Title for a job performing this action.
    pub fn title(&self) -> &'static str {
        match self {
            ClipboardAction::Move => "Moving Files",
            ClipboardAction::Copy => "Copying Files",
        }
    }
}

impl std::fmt::Display for ClipboardAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a single item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    pub success: bool,
    pub message: String,
}

impl ItemResult {
    /// A successful item.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// A failed item.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Outcome of a synchronous operation (cut, copy, delete, rename).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub code: ResultCode,
    pub message: String,
    pub results: Vec<ItemResult>,
}

impl OperationResult {
    pub fn new(code: ResultCode, message: impl Into<String>, results: Vec<ItemResult>) -> Self {
        Self {
            code,
            message: message.into(),
            results,
        }
    }

    /// A successful operation without per-item detail.
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ResultCode::Success, message, Vec::new())
    }

    /// A rejected operation without per-item detail.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ResultCode::Error, message, Vec::new())
    }

    pub fn is_success(&self) -> bool {
        self.code == ResultCode::Success
    }
}

/// Snapshot of a background paste job.
///
/// While the job runs, `message` is the current progress label
/// (e.g. "Moving photos"). Once finished it is `"complete"`, or the first
/// failure's message when any item failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: JobId,
    pub code: ResultCode,
    pub title: String,
    pub message: String,
    pub results: Vec<ItemResult>,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        self.code.is_terminal()
    }
}

/// Upload lifecycle step acknowledged by the upload manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Started,
    Uploading,
    Complete,
    Cancelled,
}

/// Acknowledgement returned by each upload call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub upload_id: String,
    pub status: UploadStatus,
}

impl UploadReceipt {
    pub fn new(upload_id: impl Into<String>, status: UploadStatus) -> Self {
        Self {
            upload_id: upload_id.into(),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_results_all_ok() {
        let results = vec![ItemResult::ok("a"), ItemResult::ok("b")];
        assert_eq!(ResultCode::from_results(&results), ResultCode::Success);
    }

    #[test]
    fn test_from_results_partial() {
        let results = vec![ItemResult::ok("a"), ItemResult::failed("b")];
        assert_eq!(ResultCode::from_results(&results), ResultCode::Partial);
    }

    #[test]
    fn test_from_results_all_failed() {
        let results = vec![ItemResult::failed("a"), ItemResult::failed("b")];
        assert_eq!(ResultCode::from_results(&results), ResultCode::Error);
    }

    #[test]
    fn test_from_results_empty_is_success() {
        assert_eq!(ResultCode::from_results(&[]), ResultCode::Success);
    }

    #[test]
    fn test_result_code_parse_aliases() {
        assert_eq!(ResultCode::from_str("SUCCESS"), Some(ResultCode::Success));
        assert_eq!(ResultCode::from_str("running"), Some(ResultCode::InProgress));
        assert_eq!(ResultCode::from_str("bogus"), None);
    }

    #[test]
    fn test_result_code_serde_kebab() {
        let json = serde_json::to_string(&ResultCode::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
        assert_eq!(ResultCode::InProgress.to_string(), "in-progress");
    }

    #[test]
    fn test_clipboard_action_labels() {
        assert_eq!(ClipboardAction::Move.verb(), "Moving");
        assert_eq!(ClipboardAction::Copy.title(), "Copying Files");
        assert_eq!("cut".parse::<ClipboardAction>().unwrap(), ClipboardAction::Move);
    }
}
