// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

use crate::{
    basic_block::{
        BlockId, BlockRef, BlockType, EdgeKind, RawType, StructuredType, VirtualTarget,
        SYNTHETIC_OFFSET,
    },
    control_flow_graph::ControlFlowGraph,
};
use std::collections::BTreeSet;

use super::dominance::FlowAnalysis;

/// How a chain of settled blocks ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArmEnd {
    /// Continues into a block that is not part of the chain.
    Join(BlockId),
    /// Continues into a virtual target.
    Jump(VirtualTarget),
    /// Never continues: return, throw or a literal jump.
    Terminal,
}

impl ArmEnd {
    /// Whether control never reaches the block after the enclosing construct.
    pub fn is_exit(self) -> bool {
        !matches!(self, ArmEnd::Join(_))
    }
}

/// A straight chain of settled blocks forming one arm of a construct.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Arm {
    pub blocks: Vec<BlockId>,
    pub end: ArmEnd,
}

impl Arm {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn head(&self) -> Option<BlockId> {
        self.blocks.first().copied()
    }

    pub fn last(&self) -> Option<BlockId> {
        self.blocks.last().copied()
    }

    /// Whether the arm ends by handing a value to the join on the operand stack.
    pub fn leaves_value(&self, graph: &ControlFlowGraph) -> bool {
        self.last().map_or(false, |last| graph.block(last).leaves_value())
    }

    pub fn contains_type(&self, graph: &ControlFlowGraph, block_type: BlockType) -> bool {
        self.blocks
            .iter()
            .any(|id| graph.block(*id).block_type == block_type)
    }
}

/// Limits on the blocks a chain may absorb.
pub(crate) struct ArmBounds<'a> {
    /// The flow predecessors the first block may have.
    pub entry: &'a BTreeSet<BlockId>,
    /// The first block must start after this offset.
    pub after: Option<u32>,
    /// Every block must start before this offset.
    pub before: Option<u32>,
}

/// Follows `next` edges from `start` while the blocks are settled, entered only from the
/// previous block of the chain, and laid out in increasing offset order. A literal goto ends
/// the chain. Jumps from literal gotos do not count as entries: their targets are labels.
pub(crate) fn walk_arm(
    graph: &ControlFlowGraph,
    analysis: &FlowAnalysis,
    start: BlockRef,
    bounds: &ArmBounds,
) -> Arm {
    let mut blocks: Vec<BlockId> = vec![];
    let mut cursor = start;
    loop {
        let id = match cursor {
            BlockRef::Virtual(target) => {
                return Arm {
                    blocks,
                    end: ArmEnd::Jump(target),
                }
            }
            BlockRef::Block(id) => id,
        };
        let block = graph.block(id);
        let preds: BTreeSet<BlockId> = graph
            .flow_predecessors(id)
            .into_iter()
            .filter(|pred| !graph.block(*pred).block_type.is_goto())
            .collect();
        let entered_from_chain = match blocks.last() {
            None => !preds.is_empty() && preds.is_subset(bounds.entry),
            Some(prev) => preds.len() == 1 && preds.contains(prev),
        };
        let lower = match blocks.last() {
            None => bounds.after,
            Some(prev) => Some(graph.block(*prev).from_offset),
        };
        let in_bounds = block.from_offset != SYNTHETIC_OFFSET
            && lower.map_or(true, |lower| block.from_offset > lower)
            && bounds.before.map_or(true, |before| block.from_offset < before);
        if !block.is_settled()
            || !entered_from_chain
            || !in_bounds
            || blocks.contains(&id)
            || analysis.is_loop_header(id)
        {
            return Arm {
                blocks,
                end: ArmEnd::Join(id),
            };
        }
        blocks.push(id);
        if block.block_type.is_goto() {
            return Arm {
                blocks,
                end: ArmEnd::Terminal,
            };
        }
        match block.next {
            None => {
                return Arm {
                    blocks,
                    end: ArmEnd::Terminal,
                }
            }
            Some(next) => cursor = next,
        }
    }
}

/// Points an arm that joins the block after its construct at `target` instead.
pub(crate) fn close_arm(graph: &mut ControlFlowGraph, arm: &Arm, target: BlockRef) {
    if let (ArmEnd::Join(_), Some(last)) = (arm.end, arm.last()) {
        graph.set_edge(last, EdgeKind::Next, Some(target));
    }
}

/// Turns an open condition into an operand of a composite: its successors are dropped and its
/// test is optionally negated.
pub(crate) fn close_condition(graph: &mut ControlFlowGraph, id: BlockId, invert: bool) {
    graph.update(id, |block| {
        if block.block_type == BlockType::Raw(RawType::ConditionalBranch) {
            block.block_type = BlockType::Structured(StructuredType::Condition);
        }
        block.next = None;
        block.branch = None;
        if invert {
            block.inverse_condition = !block.inverse_condition;
        }
    });
}

/// Adds a structured block covering the code and lines of every block in `absorbed`.
pub(crate) fn new_composite(
    graph: &mut ControlFlowGraph,
    block_type: StructuredType,
    absorbed: &[BlockId],
) -> BlockId {
    let covered = || {
        absorbed
            .iter()
            .map(|id| graph.block(*id))
            .filter(|block| block.from_offset != SYNTHETIC_OFFSET)
    };
    let from = covered()
        .map(|block| block.from_offset)
        .min()
        .unwrap_or(SYNTHETIC_OFFSET);
    let to = covered()
        .map(|block| block.to_offset)
        .max()
        .unwrap_or(SYNTHETIC_OFFSET);
    let first_line = covered()
        .filter(|block| block.first_line_number.is_some())
        .min_by_key(|block| block.from_offset)
        .and_then(|block| block.first_line_number);
    let last_line = covered().filter_map(|block| block.last_line_number).max();
    let id = graph.add_block(BlockType::Structured(block_type), from, to);
    graph.update(id, |block| {
        block.first_line_number = first_line;
        block.last_line_number = last_line;
    });
    id
}

/// Adds a literal jump to `target` placed at `offset`.
pub(crate) fn literal_goto(
    graph: &mut ControlFlowGraph,
    goto_type: StructuredType,
    offset: u32,
    target: BlockRef,
) -> BlockId {
    let id = graph.add_block(BlockType::Structured(goto_type), offset, offset);
    graph.set_edge(id, EdgeKind::Branch, Some(target));
    id
}
