//! Line-addressable text buffers.
//!
//! This module provides the buffer abstractions the tracker observes:
//! - [`LineText`]: read-only line/offset access (base and working buffers)
//! - [`WorkingBuffer`]: a `LineText` that can be edited in place
//! - [`TextDocument`]: the stock implementation backed by a `String`

mod document;
pub mod lines;

pub use document::TextDocument;
pub use lines::{LineText, WorkingBuffer, compute_line_starts, is_blank};
