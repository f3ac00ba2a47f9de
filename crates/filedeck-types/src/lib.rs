//! Shared identifiers, result codes and view types for filedeck.
//!
//! This crate has **no internal filedeck dependencies**. It is a pure leaf crate
//! that the kernel and any front end (CLI, web controller) build on. Every
//! type here is plain data: serializable, cloneable, free of I/O.
//!
//! # Key Types
//!
//! |--------------------|-----------------------------------------------|
//! | Type               | Purpose                                       |
//! |--------------------|-----------------------------------------------|
//! | [`JobId`]          | Which background paste job                    |
//! | [`ResultCode`]     | Success / Partial / Error / InProgress        |
//! | [`ItemResult`]     | Outcome of one item within an operation       |
//! | [`OperationResult`]| Outcome of a synchronous multi-item operation |
//! | [`JobStatus`]      | Snapshot of a paste job, polled by callers    |
//! | [`UploadReceipt`]  | Acknowledgement of an upload step             |
//! | [`FileView`]       | One entry in a folder listing                 |
//! | [`FolderNode`]     | One node of the folder tree                   |
//! | [`RangePayload`]   | Bytes served for a (possibly partial) read    |
//! |--------------------|-----------------------------------------------|

pub mod ids;
pub mod payload;
pub mod results;
pub mod views;

// Re-export primary types at crate root for convenience.
pub use ids::JobId;
pub use payload::{Download, RangePayload};
pub use results::{
    ClipboardAction, ItemResult, JobStatus, OperationResult, ResultCode, UploadReceipt,
    UploadStatus,
};
pub use views::{EntryKind, FileCategory, FileView, FolderNode, TextContent};
