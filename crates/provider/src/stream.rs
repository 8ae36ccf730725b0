//! Per-stream tool-call buffering.

use crate::ToolCall;
use serde::de::IgnoredAny;
use std::collections::HashMap;
use tracing::{debug, warn};

const EMPTY_ARGUMENTS: &str = "{}";

#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Buffers streamed tool-call arguments by content-block index.
///
/// Owned by exactly one stream adapter. Arguments surface once, complete,
/// when the block closes.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    pending: HashMap<u32, PendingToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tool-use block opening at `index`.
    ///
    /// Returns the call with empty arguments so the caller can announce it.
    pub fn start(&mut self, index: u32, id: impl Into<String>, name: impl Into<String>) -> ToolCall {
        let pending = PendingToolCall {
            id: id.into(),
            name: name.into(),
            arguments: String::new(),
        };
        let announced = ToolCall::new(&pending.id, &pending.name, "");
        if self.pending.insert(index, pending).is_some() {
            warn!(index, "tool-use block reopened before it was closed");
        }
        announced
    }

    /// Append an argument fragment. Returns false if no block is open at `index`.
    pub fn append(&mut self, index: u32, fragment: &str) -> bool {
        match self.pending.get_mut(&index) {
            Some(pending) => {
                pending.arguments.push_str(fragment);
                true
            }
            None => {
                debug!(index, "argument fragment for unknown block ignored");
                false
            }
        }
    }

    /// Close the block at `index`, yielding the complete call if it was a tool-use block.
    ///
    /// Empty or malformed arguments become `"{}"`.
    pub fn finish(&mut self, index: u32) -> Option<ToolCall> {
        let pending = self.pending.remove(&index)?;

        let arguments = if pending.arguments.trim().is_empty() {
            EMPTY_ARGUMENTS.to_string()
        } else if serde_json::from_str::<IgnoredAny>(&pending.arguments).is_err() {
            warn!(
                tool = %pending.name,
                id = %pending.id,
                "discarding malformed streamed tool arguments"
            );
            EMPTY_ARGUMENTS.to_string()
        } else {
            pending.arguments
        };

        Some(ToolCall::new(pending.id, pending.name, arguments))
    }

    /// Drop all unfinished calls. Returns how many were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_join_and_flush_once() {
        let mut acc = ToolCallAccumulator::new();
        let announced = acc.start(1, "t1", "foo");
        assert_eq!(announced.function.arguments, "");

        assert!(acc.append(1, "{\"a\":"));
        assert!(acc.append(1, "1}"));

        let call = acc.finish(1).unwrap();
        assert_eq!(call.id, "t1");
        assert_eq!(call.function.name, "foo");
        assert_eq!(call.function.arguments, "{\"a\":1}");

        assert!(acc.finish(1).is_none());
        assert!(acc.is_empty());
    }

    #[test]
    fn empty_arguments_become_empty_object() {
        let mut acc = ToolCallAccumulator::new();
        acc.start(0, "t", "noargs");
        assert_eq!(acc.finish(0).unwrap().function.arguments, "{}");
    }

    #[test]
    fn malformed_arguments_become_empty_object() {
        let mut acc = ToolCallAccumulator::new();
        acc.start(0, "t", "broken");
        acc.append(0, "{\"a\": tru");
        assert_eq!(acc.finish(0).unwrap().function.arguments, "{}");
    }

    #[test]
    fn interleaved_blocks_stay_separate() {
        let mut acc = ToolCallAccumulator::new();
        acc.start(1, "a", "first");
        acc.start(2, "b", "second");
        acc.append(2, "{\"x\":2}");
        acc.append(1, "{\"x\":1}");

        assert_eq!(acc.finish(2).unwrap().function.arguments, "{\"x\":2}");
        assert_eq!(acc.finish(1).unwrap().function.arguments, "{\"x\":1}");
    }

    #[test]
    fn unknown_index_is_ignored() {
        let mut acc = ToolCallAccumulator::new();
        assert!(!acc.append(7, "{}"));
        assert!(acc.finish(7).is_none());
    }

    #[test]
    fn clear_discards_pending_calls() {
        let mut acc = ToolCallAccumulator::new();
        acc.start(0, "a", "x");
        acc.append(0, "{\"partial\":");
        assert_eq!(acc.clear(), 1);
        assert!(acc.finish(0).is_none());
    }
}
