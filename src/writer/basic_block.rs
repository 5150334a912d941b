//! Control flow graph of a method, as built by the method writer
//!
//! Blocks live in an arena owned by the method writer and refer to each other by index. A
//! label visited at the same bytecode offset as an existing (still empty) block becomes an
//! alias of that block rather than a block of its own.

use crate::frame::{AbstractType, Frame};

pub(crate) type NodeId = usize;

#[derive(Copy, Clone, Debug)]
pub(crate) enum EdgeKind {
    /// Normal control flow, with the stack size at the jump relative to the input stack size
    /// of the source block (only used when computing the maximum stack size)
    Jump(i32),

    /// Exception handler, with the type of the caught exception
    Exception(AbstractType),
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct Edge {
    pub successor: NodeId,
    pub kind: EdgeKind,
}

#[derive(Debug, Default)]
pub(crate) struct BasicBlock {
    /// Bytecode offset of the first instruction (`None` until the block is visited)
    pub offset: Option<u32>,

    /// Block which this one is an alias of
    pub canonical: Option<NodeId>,

    pub frame: Frame,
    pub edges: Vec<Edge>,

    /// Stack size when entering the block (maximum stack size computation only)
    pub input_stack_size: i32,

    /// Highest stack size reached in the block, relative to `input_stack_size`
    pub output_stack_max: i32,

    pub jump_target: bool,
    pub reachable: bool,

    /// Whether the block is currently (or was ever, for max stack computation) in a worklist
    pub queued: bool,
}

/// Entry of the exception table, with resolved bytecode offsets
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Handler {
    pub start: u32,
    pub end: u32,
    pub handler: u32,

    /// Class constant of the caught exception, or 0 for `finally` handlers
    pub catch_type: u16,
    pub catch_type_name: Option<String>,
}

impl Handler {
    /// Remove the range `[start, end)` from a list of handlers (`end` is `None` for the end of
    /// the method)
    ///
    /// Handlers fully covered by the range disappear, and handlers that strictly contain it
    /// are split in two.
    pub(crate) fn remove_range(handlers: Vec<Handler>, start: u32, end: Option<u32>) -> Vec<Handler> {
        let end = end.unwrap_or(u32::MAX);
        let mut remaining = Vec::with_capacity(handlers.len());
        for handler in handlers {
            if start >= handler.end || end <= handler.start {
                remaining.push(handler);
            } else if start <= handler.start {
                if end < handler.end {
                    remaining.push(Handler { start: end, ..handler });
                }
            } else if end >= handler.end {
                remaining.push(Handler { end: start, ..handler });
            } else {
                remaining.push(Handler {
                    end: start,
                    ..handler.clone()
                });
                remaining.push(Handler { start: end, ..handler });
            }
        }
        remaining
    }
}

/// Borrow a block immutably and another one mutably
pub(crate) fn pair_mut(
    blocks: &mut [BasicBlock],
    source: NodeId,
    target: NodeId,
) -> (&BasicBlock, &mut BasicBlock) {
    debug_assert_ne!(source, target);
    if source < target {
        let (left, right) = blocks.split_at_mut(target);
        (&left[source], &mut right[0])
    } else {
        let (left, right) = blocks.split_at_mut(source);
        (&right[0], &mut left[target])
    }
}

#[cfg(test)]
mod basic_block_tests {
    use super::*;

    fn handler(start: u32, end: u32) -> Handler {
        Handler {
            start,
            end,
            handler: 100,
            catch_type: 0,
            catch_type_name: None,
        }
    }

    fn ranges(handlers: &[Handler]) -> Vec<(u32, u32)> {
        handlers.iter().map(|h| (h.start, h.end)).collect()
    }

    #[test]
    fn removing_ranges() {
        let handlers = vec![handler(0, 10), handler(10, 20), handler(20, 30)];
        let handlers = Handler::remove_range(handlers, 5, Some(25));
        assert_eq!(ranges(&handlers), vec![(0, 5), (25, 30)]);

        let handlers = Handler::remove_range(vec![handler(0, 30)], 10, Some(20));
        assert_eq!(ranges(&handlers), vec![(0, 10), (20, 30)]);

        let handlers = Handler::remove_range(vec![handler(0, 30)], 10, None);
        assert_eq!(ranges(&handlers), vec![(0, 10)]);

        let handlers = Handler::remove_range(vec![handler(5, 30)], 0, Some(5));
        assert_eq!(ranges(&handlers), vec![(5, 30)]);
    }

    #[test]
    fn split_borrows() {
        let mut blocks = vec![BasicBlock::default(), BasicBlock::default(), BasicBlock::default()];
        blocks[2].offset = Some(7);
        let (source, target) = pair_mut(&mut blocks, 2, 0);
        target.offset = source.offset;
        assert_eq!(blocks[0].offset, Some(7));
    }
}
