// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Composite boolean tests: `a ? b : c` inside a condition, `a || b` and `a && b`.
//!
//! A composite is itself an open condition with the `next` and `branch` successors of the
//! tests it replaces, so the rules compose bottom-up.

use crate::{
    basic_block::{BlockId, BlockRef, StructuredType},
    control_flow_graph::ControlFlowGraph,
};
use log::debug;
use std::collections::BTreeSet;

use super::{dominance::FlowAnalysis, helpers::*};

/// An operand test may only be entered from the test before it.
fn is_operand(graph: &ControlFlowGraph, analysis: &FlowAnalysis, id: BlockId, owner: BlockId) -> bool {
    graph.block(id).is_open_condition()
        && !analysis.is_loop_header(id)
        && graph.flow_predecessors(id) == BTreeSet::from([owner])
}

/// `C` selects between two tests `X` (when false) and `Y` (when true) that share both
/// successors.
pub(crate) fn reduce_condition_ternary(
    graph: &mut ControlFlowGraph,
    analysis: &FlowAnalysis,
    id: BlockId,
) -> bool {
    let block = graph.block(id);
    if !block.is_open_condition() {
        return false;
    }
    let (Some(BlockRef::Block(when_false)), Some(BlockRef::Block(when_true))) =
        (block.next, block.branch)
    else {
        return false;
    };
    if when_false == when_true || when_false == id || when_true == id {
        return false;
    }
    if !is_operand(graph, analysis, when_false, id) || !is_operand(graph, analysis, when_true, id)
    {
        return false;
    }
    let (x, y) = (graph.block(when_false), graph.block(when_true));
    if x.next != y.next || x.branch != y.branch {
        return false;
    }
    let (next, branch) = (x.next, x.branch);

    let composite = new_composite(
        graph,
        StructuredType::ConditionTernaryOperator,
        &[id, when_false, when_true],
    );
    graph.redirect(id, BlockRef::Block(composite));
    for operand in [id, when_false, when_true] {
        close_condition(graph, operand, false);
    }
    graph.update(composite, |block| {
        block.condition = Some(BlockRef::Block(id));
        block.sub1 = Some(BlockRef::Block(when_true));
        block.sub2 = Some(BlockRef::Block(when_false));
        block.next = next;
        block.branch = branch;
    });
    debug!(
        "[reduce_condition_ternary] block {} selects between {} and {}",
        composite, when_true, when_false
    );
    true
}

/// `B` falls through to a test `S` sharing one of its successors. When both branch to the same
/// block the pair is a disjunction; when `B` branches to where `S` falls through, it is a
/// conjunction of the negated `B` with `S`.
pub(crate) fn reduce_and_or(
    graph: &mut ControlFlowGraph,
    analysis: &FlowAnalysis,
    id: BlockId,
) -> bool {
    let block = graph.block(id);
    if !block.is_open_condition() {
        return false;
    }
    let Some(BlockRef::Block(second)) = block.next else {
        return false;
    };
    if second == id || !is_operand(graph, analysis, second, id) {
        return false;
    }
    let first_branch = block.branch;
    let operand = graph.block(second);
    let (block_type, invert_first) = if operand.branch == first_branch {
        (StructuredType::ConditionOr, false)
    } else if operand.next == first_branch {
        (StructuredType::ConditionAnd, true)
    } else {
        return false;
    };
    let (next, branch) = (operand.next, operand.branch);

    let composite = new_composite(graph, block_type, &[id, second]);
    graph.redirect(id, BlockRef::Block(composite));
    close_condition(graph, id, invert_first);
    close_condition(graph, second, false);
    graph.update(composite, |block| {
        block.sub1 = Some(BlockRef::Block(id));
        block.sub2 = Some(BlockRef::Block(second));
        block.next = next;
        block.branch = branch;
    });
    debug!(
        "[reduce_and_or] block {} combines {} and {} as {}",
        composite,
        id,
        second,
        graph.block(composite).block_type
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_block::{BlockType, EdgeKind, RawType};

    fn condition(graph: &mut ControlFlowGraph, from: u32) -> BlockId {
        graph.add_block(BlockType::Raw(RawType::ConditionalBranch), from, from + 4)
    }

    fn statements(graph: &mut ControlFlowGraph, from: u32) -> BlockId {
        graph.add_block(BlockType::Structured(StructuredType::Statements), from, from + 4)
    }

    fn link(graph: &mut ControlFlowGraph, id: BlockId, next: BlockId, branch: Option<BlockId>) {
        graph.set_edge(id, EdgeKind::Next, Some(BlockRef::Block(next)));
        graph.set_edge(id, EdgeKind::Branch, branch.map(BlockRef::Block));
    }

    #[test]
    fn test_disjunction() {
        // if (a || b) then; join
        let mut graph = ControlFlowGraph::new();
        let a = condition(&mut graph, 0);
        let b = condition(&mut graph, 4);
        let then = statements(&mut graph, 8);
        let join = statements(&mut graph, 12);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(a)));
        link(&mut graph, a, b, Some(then));
        link(&mut graph, b, join, Some(then));
        let analysis = FlowAnalysis::compute(&graph);
        assert!(!reduce_condition_ternary(&mut graph, &analysis, a));
        assert!(reduce_and_or(&mut graph, &analysis, a));

        let composite = graph.block(ControlFlowGraph::START).next.and_then(BlockRef::block).unwrap();
        let block = graph.block(composite);
        assert_eq!(block.block_type, BlockType::Structured(StructuredType::ConditionOr));
        assert_eq!(block.branch, Some(BlockRef::Block(then)));
        assert_eq!(block.next, Some(BlockRef::Block(join)));
        assert!(!graph.block(a).inverse_condition);
        assert!(graph.block(a).is_settled());
    }

    #[test]
    fn test_conjunction_negates_first_operand() {
        let mut graph = ControlFlowGraph::new();
        let a = condition(&mut graph, 0);
        let b = condition(&mut graph, 4);
        let then = statements(&mut graph, 8);
        let join = statements(&mut graph, 12);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(a)));
        link(&mut graph, a, b, Some(join));
        link(&mut graph, b, join, Some(then));
        let analysis = FlowAnalysis::compute(&graph);
        assert!(reduce_and_or(&mut graph, &analysis, a));
        let composite = graph.block(ControlFlowGraph::START).next.and_then(BlockRef::block).unwrap();
        let block = graph.block(composite);
        assert_eq!(block.block_type, BlockType::Structured(StructuredType::ConditionAnd));
        assert_eq!(block.branch, Some(BlockRef::Block(then)));
        assert!(graph.block(a).inverse_condition);
    }

    #[test]
    fn test_ternary_condition() {
        // if (c ? y : x) then; join
        let mut graph = ControlFlowGraph::new();
        let c = condition(&mut graph, 0);
        let x = condition(&mut graph, 4);
        let y = condition(&mut graph, 8);
        let then = statements(&mut graph, 12);
        let join = statements(&mut graph, 16);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(c)));
        link(&mut graph, c, x, Some(y));
        link(&mut graph, x, join, Some(then));
        link(&mut graph, y, join, Some(then));
        let analysis = FlowAnalysis::compute(&graph);
        assert!(reduce_condition_ternary(&mut graph, &analysis, c));
        let composite = graph.block(ControlFlowGraph::START).next.and_then(BlockRef::block).unwrap();
        let block = graph.block(composite);
        assert_eq!(block.condition, Some(BlockRef::Block(c)));
        assert_eq!(block.sub1, Some(BlockRef::Block(y)));
        assert_eq!(block.sub2, Some(BlockRef::Block(x)));
        assert!(block.is_open_condition());
        assert_eq!(graph.flow_predecessors(then), [composite].into_iter().collect());
    }
}
