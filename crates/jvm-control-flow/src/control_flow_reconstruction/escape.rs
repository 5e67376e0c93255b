// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Fallbacks for graphs no pattern matches, typically irreducible ones. Each turns one pending
//! block into its structured form, or unshares one block, by keeping the offending jumps as
//! literal gotos.

use crate::{
    basic_block::{BlockId, BlockRef, BlockType, EdgeKind, RawType, StructuredType},
    control_flow_graph::ControlFlowGraph,
};
use log::warn;

use super::{
    branches::{build_if, IfShape},
    dominance::FlowAnalysis,
    helpers::*,
};

fn goto_to(
    graph: &mut ControlFlowGraph,
    goto_type: StructuredType,
    offset: u32,
    target: BlockRef,
) -> BlockRef {
    match target {
        BlockRef::Block(_) => BlockRef::Block(literal_goto(graph, goto_type, offset, target)),
        BlockRef::Virtual(_) => target,
    }
}

/// `if (c) goto T;` followed by the fall-through successor.
pub(crate) fn escape_condition(
    graph: &mut ControlFlowGraph,
    _: &FlowAnalysis,
    id: BlockId,
) -> bool {
    let block = graph.block(id);
    if !block.is_open_condition() {
        return false;
    }
    let (Some(next), Some(branch)) = (block.next, block.branch) else {
        return false;
    };
    let goto_type = match branch {
        BlockRef::Block(target) if graph.block(target).from_offset <= block.from_offset => {
            StructuredType::InfiniteGoto
        }
        _ => {
            let preds = graph.flow_predecessors(id);
            let inside_ternary = preds.len() == 1
                && preds
                    .iter()
                    .all(|pred| graph.block(*pred).leaves_value());
            if inside_ternary {
                StructuredType::GotoInTernaryOperator
            } else {
                StructuredType::Goto
            }
        }
    };
    let offset = block.to_offset;
    warn!(
        "[escape_condition] block {} keeps its jump to {} as a literal goto",
        id, branch
    );
    let then = goto_to(graph, goto_type, offset, branch);
    build_if(
        graph,
        id,
        IfShape {
            block_type: StructuredType::If,
            invert: false,
            then,
            otherwise: None,
            next: Some(next),
            arms: vec![],
        },
    );
    true
}

/// Every case jumps to its body through a literal goto.
pub(crate) fn escape_switch(graph: &mut ControlFlowGraph, _: &FlowAnalysis, id: BlockId) -> bool {
    let block = graph.block(id);
    if block.block_type != BlockType::Raw(RawType::SwitchDeclaration) {
        return false;
    }
    let offset = block.to_offset;
    let mut cases = block.switch_cases.clone();
    warn!("[escape_switch] switch {} dispatches through literal gotos", id);
    for case in &mut cases {
        case.target = goto_to(graph, StructuredType::Goto, offset, case.target);
    }
    graph.update(id, |block| {
        block.block_type = BlockType::Structured(StructuredType::Switch);
        block.switch_cases = cases;
        block.next = None;
    });
    true
}

/// The body and every handler of the try are literal gotos.
pub(crate) fn escape_try(graph: &mut ControlFlowGraph, _: &FlowAnalysis, id: BlockId) -> bool {
    let block = graph.block(id);
    if block.block_type != BlockType::Raw(RawType::TryDeclaration) {
        return false;
    }
    let offset = block.from_offset;
    let body = block.next.unwrap_or(BlockRef::END);
    let mut handlers = block.exception_handlers.clone();
    warn!("[escape_try] try {} enters its body and handlers through literal gotos", id);
    let body = goto_to(graph, StructuredType::Goto, offset, body);
    for handler in &mut handlers {
        handler.handler = goto_to(graph, StructuredType::Goto, offset, handler.handler);
    }
    handlers.sort_by_key(|handler| handler.is_finally());
    graph.update(id, |block| {
        block.block_type = BlockType::Structured(StructuredType::Try);
        block.sub1 = Some(body);
        block.exception_handlers = handlers;
        block.next = None;
    });
    true
}

/// Calls a subroutine that never settled.
pub(crate) fn escape_jsr(graph: &mut ControlFlowGraph, _: &FlowAnalysis, id: BlockId) -> bool {
    if graph.block(id).block_type != BlockType::Raw(RawType::Jsr) {
        return false;
    }
    warn!("[escape_jsr] subroutine call {} settles before its subroutine", id);
    graph.update(id, |block| {
        block.block_type = BlockType::Structured(StructuredType::Jsr)
    });
    true
}

/// Once nothing is pending, a block entered from several predecessors keeps the one laid out
/// right before it (or `START`) and is reached from the others through a literal goto. A block
/// closing a cycle of single entries is cut at the member with the lowest offset.
pub(crate) fn escape_shared_entry(
    graph: &mut ControlFlowGraph,
    analysis: &FlowAnalysis,
    id: BlockId,
) -> bool {
    if analysis
        .reachable()
        .iter()
        .any(|block| graph.block(*block).is_pending())
    {
        return false;
    }
    let position = |block: BlockId| (graph.block(block).from_offset, block);
    let entries = graph.entering_predecessors(id);
    let source = if entries.len() > 1 {
        let keep = if entries.contains(&ControlFlowGraph::START) {
            Some(ControlFlowGraph::START)
        } else {
            entries
                .iter()
                .copied()
                .filter(|pred| position(*pred) < position(id))
                .max_by_key(|pred| position(*pred))
                .or_else(|| entries.iter().copied().min_by_key(|pred| position(*pred)))
        };
        entries
            .iter()
            .copied()
            .filter(|pred| Some(*pred) != keep)
            .max_by_key(|pred| position(*pred))
    } else {
        match graph.entry_cycle(id) {
            Some(cycle) if cycle.iter().all(|member| position(id) <= position(*member)) => {
                entries.first().copied()
            }
            _ => None,
        }
    };
    let Some(source) = source else {
        return false;
    };

    let from = graph.block(source);
    let goto_type = if graph.block(id).from_offset <= from.from_offset {
        StructuredType::InfiniteGoto
    } else {
        StructuredType::Goto
    };
    let offset = from.to_offset;
    warn!(
        "[escape_shared_entry] block {} enters {} through a literal goto",
        source, id
    );
    let goto = literal_goto(graph, goto_type, offset, BlockRef::Block(id));
    graph.update(source, |block| {
        for (kind, target) in block.edges() {
            if kind != EdgeKind::Branch && target == BlockRef::Block(id) {
                block.set_edge(kind, Some(BlockRef::Block(goto)));
            }
        }
    });
    true
}
