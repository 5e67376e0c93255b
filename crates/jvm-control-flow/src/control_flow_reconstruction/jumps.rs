// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Rules for blocks that need no structure of their own: gotos, straight-line code and
//! subroutine calls.

use crate::{
    basic_block::{BlockId, BlockRef, BlockType, RawType, StructuredType},
    control_flow_graph::ControlFlowGraph,
};
use log::debug;

use super::dominance::FlowAnalysis;

/// Removes empty gotos by pointing their predecessors at the goto target. A goto carrying code
/// (or leading nowhere) becomes a statements block; an empty goto to itself becomes an endless
/// loop.
pub(crate) fn reduce_goto(graph: &mut ControlFlowGraph, _: &FlowAnalysis, id: BlockId) -> bool {
    let block = graph.block(id);
    if !matches!(
        block.block_type,
        BlockType::Raw(RawType::Goto) | BlockType::Raw(RawType::Jump)
    ) {
        return false;
    }
    let target = block.next;
    if !block.instructions.is_empty() || target.is_none() {
        graph.update(id, |block| {
            block.block_type = BlockType::Structured(StructuredType::Statements)
        });
        return true;
    }
    match target {
        Some(BlockRef::Block(target)) if target == id => {
            debug!("[reduce_goto] block {} jumps to itself", id);
            graph.update(id, |block| {
                block.block_type = BlockType::Structured(StructuredType::InfiniteGoto);
                block.next = None;
            });
        }
        Some(target) => {
            debug!("[reduce_goto] eliding block {} in favour of {}", id, target);
            graph.redirect(id, target);
            graph.detach(id);
        }
        None => {}
    }
    true
}

/// Settles blocks whose raw type already is their structured form.
pub(crate) fn promote_leaf(graph: &mut ControlFlowGraph, _: &FlowAnalysis, id: BlockId) -> bool {
    let structured = match graph.block(id).block_type {
        BlockType::Raw(RawType::Statements) => StructuredType::Statements,
        BlockType::Raw(RawType::Return) => StructuredType::Return,
        BlockType::Raw(RawType::ReturnValue) => StructuredType::ReturnValue,
        BlockType::Raw(RawType::Throw) => StructuredType::Throw,
        BlockType::Raw(RawType::Ret) => StructuredType::Ret,
        _ => return false,
    };
    graph.update(id, |block| block.block_type = BlockType::Structured(structured));
    true
}

/// Settles a subroutine call once the subroutine itself is settled. The subroutine becomes a
/// child of the call.
pub(crate) fn reduce_jsr(graph: &mut ControlFlowGraph, _: &FlowAnalysis, id: BlockId) -> bool {
    let block = graph.block(id);
    if block.block_type != BlockType::Raw(RawType::Jsr) {
        return false;
    }
    let ready = match block.branch {
        Some(BlockRef::Block(subroutine)) => graph.block(subroutine).is_settled(),
        _ => true,
    };
    if ready {
        graph.update(id, |block| block.block_type = BlockType::Structured(StructuredType::Jsr));
    }
    ready
}
