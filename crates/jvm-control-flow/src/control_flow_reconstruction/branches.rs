// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! `if`, `if`/`else` and value-producing `?:` over an open condition.
//!
//! A raw condition falls through to `next` when its test fails and jumps to `branch` when it
//! holds. The structured blocks run `sub1` when the (possibly negated) condition holds.

use crate::{
    basic_block::{BlockId, BlockRef, StructuredType},
    control_flow_graph::ControlFlowGraph,
};
use log::debug;
use std::collections::BTreeSet;

use super::{dominance::FlowAnalysis, helpers::*};

pub(crate) struct IfShape {
    pub block_type: StructuredType,
    /// Negate the condition so that `then` runs when it holds.
    pub invert: bool,
    pub then: BlockRef,
    pub otherwise: Option<BlockRef>,
    pub next: Option<BlockRef>,
    pub arms: Vec<Arm>,
}

/// Replaces the open condition `condition` by a structured block of `shape`. Arms that join
/// the following block are closed with `END`.
pub(crate) fn build_if(graph: &mut ControlFlowGraph, condition: BlockId, shape: IfShape) -> BlockId {
    let mut absorbed = vec![condition];
    absorbed.extend(shape.arms.iter().flat_map(|arm| arm.blocks.iter().copied()));
    let composite = new_composite(graph, shape.block_type, &absorbed);
    graph.redirect(condition, BlockRef::Block(composite));
    close_condition(graph, condition, shape.invert);
    for arm in &shape.arms {
        close_arm(graph, arm, BlockRef::END);
    }
    graph.update(composite, |block| {
        block.condition = Some(BlockRef::Block(condition));
        block.sub1 = Some(shape.then);
        block.sub2 = shape.otherwise;
        block.next = shape.next;
    });
    debug!(
        "[build_if] block {} is {} over condition {}",
        composite,
        graph.block(composite).block_type,
        condition
    );
    composite
}

pub(crate) fn reduce_if(graph: &mut ControlFlowGraph, analysis: &FlowAnalysis, id: BlockId) -> bool {
    let block = graph.block(id);
    if !block.is_open_condition() || analysis.is_loop_header(id) {
        return false;
    }
    let (Some(next), Some(branch)) = (block.next, block.branch) else {
        return false;
    };
    let from = block.from_offset;

    // Both successors coincide: the test only has side effects.
    if next == branch {
        build_if(
            graph,
            id,
            IfShape {
                block_type: StructuredType::If,
                invert: false,
                then: BlockRef::END,
                otherwise: None,
                next: Some(next),
                arms: vec![],
            },
        );
        return true;
    }
    let (next_block, branch_block) = match (next, branch) {
        (_, BlockRef::Virtual(_)) => {
            build_if(
                graph,
                id,
                IfShape {
                    block_type: StructuredType::If,
                    invert: false,
                    then: branch,
                    otherwise: None,
                    next: Some(next),
                    arms: vec![],
                },
            );
            return true;
        }
        (BlockRef::Virtual(_), _) => {
            build_if(
                graph,
                id,
                IfShape {
                    block_type: StructuredType::If,
                    invert: true,
                    then: next,
                    otherwise: None,
                    next: Some(branch),
                    arms: vec![],
                },
            );
            return true;
        }
        (BlockRef::Block(n), BlockRef::Block(t)) => (n, t),
    };

    let entry = BTreeSet::from([id]);
    let branch_from = graph.block(branch_block).from_offset;
    let fall_arm = walk_arm(
        graph,
        analysis,
        next,
        &ArmBounds {
            entry: &entry,
            after: Some(from),
            before: (branch_from > from).then_some(branch_from),
        },
    );
    let jump_arm = walk_arm(
        graph,
        analysis,
        branch,
        &ArmBounds {
            entry: &entry,
            after: Some(from),
            before: None,
        },
    );

    // if (!c) { fall arm } and the arm rejoins at the jump target or never rejoins.
    if !fall_arm.is_empty()
        && !fall_arm.leaves_value(graph)
        && (fall_arm.end == ArmEnd::Join(branch_block) || fall_arm.end.is_exit())
    {
        build_if(
            graph,
            id,
            IfShape {
                block_type: StructuredType::If,
                invert: true,
                then: next,
                otherwise: None,
                next: Some(branch),
                arms: vec![fall_arm],
            },
        );
        return true;
    }

    // if (c) { jump arm } and the arm falls back to the fall-through block.
    if !jump_arm.is_empty()
        && !jump_arm.leaves_value(graph)
        && jump_arm.end == ArmEnd::Join(next_block)
    {
        build_if(
            graph,
            id,
            IfShape {
                block_type: StructuredType::If,
                invert: false,
                then: branch,
                otherwise: None,
                next: Some(next),
                arms: vec![jump_arm],
            },
        );
        return true;
    }

    if fall_arm.is_empty() || jump_arm.is_empty() {
        return false;
    }
    let join = match (fall_arm.end, jump_arm.end) {
        (ArmEnd::Join(a), ArmEnd::Join(b)) if a == b => Some(a),
        (ArmEnd::Join(a), end) | (end, ArmEnd::Join(a)) if end.is_exit() => Some(a),
        (ArmEnd::Join(_), ArmEnd::Join(_)) => return false,
        _ => None,
    };
    if join == Some(id) {
        return false;
    }
    let fall_value = fall_arm.leaves_value(graph);
    let jump_value = jump_arm.leaves_value(graph);
    let block_type = match (fall_value, jump_value) {
        (false, false) => StructuredType::IfElse,
        (true, true)
            if fall_arm.blocks.len() == 1
                && jump_arm.blocks.len() == 1
                && join.is_some()
                && fall_arm.end == jump_arm.end =>
        {
            StructuredType::TernaryOperator
        }
        _ => return false,
    };
    build_if(
        graph,
        id,
        IfShape {
            block_type,
            invert: true,
            then: next,
            otherwise: Some(branch),
            next: join.map(BlockRef::Block),
            arms: vec![fall_arm, jump_arm],
        },
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_block::{BlockType, EdgeKind, RawType, VirtualTarget};

    struct Diamond {
        graph: ControlFlowGraph,
        cond: BlockId,
        left: BlockId,
        right: BlockId,
        join: BlockId,
    }

    /// cond -> left (fall through) | right (jump); left and right continue at join.
    fn diamond() -> Diamond {
        let mut graph = ControlFlowGraph::new();
        let cond = graph.add_block(BlockType::Raw(RawType::ConditionalBranch), 0, 4);
        let left = graph.add_block(BlockType::Structured(StructuredType::Statements), 4, 8);
        let right = graph.add_block(BlockType::Structured(StructuredType::Statements), 8, 12);
        let join = graph.add_block(BlockType::Structured(StructuredType::Return), 12, 13);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(cond)));
        graph.set_edge(cond, EdgeKind::Next, Some(BlockRef::Block(left)));
        graph.set_edge(cond, EdgeKind::Branch, Some(BlockRef::Block(right)));
        graph.set_edge(left, EdgeKind::Next, Some(BlockRef::Block(join)));
        graph.set_edge(right, EdgeKind::Next, Some(BlockRef::Block(join)));
        Diamond {
            graph,
            cond,
            left,
            right,
            join,
        }
    }

    fn composite_after_start(graph: &ControlFlowGraph) -> BlockId {
        graph
            .block(ControlFlowGraph::START)
            .next
            .and_then(BlockRef::block)
            .unwrap()
    }

    #[test]
    fn test_if_else() {
        let Diamond {
            mut graph,
            cond,
            left,
            right,
            join,
        } = diamond();
        let analysis = FlowAnalysis::compute(&graph);
        assert!(reduce_if(&mut graph, &analysis, cond));
        let block = graph.block(composite_after_start(&graph));
        assert_eq!(block.block_type, BlockType::Structured(StructuredType::IfElse));
        assert_eq!(block.sub1, Some(BlockRef::Block(left)));
        assert_eq!(block.sub2, Some(BlockRef::Block(right)));
        assert_eq!(block.next, Some(BlockRef::Block(join)));
        assert!(graph.block(cond).inverse_condition);
        assert_eq!(graph.block(left).next, Some(BlockRef::END));
        assert_eq!(graph.block(right).next, Some(BlockRef::END));
    }

    #[test]
    fn test_if_without_else() {
        let Diamond {
            mut graph,
            cond,
            left,
            right,
            ..
        } = diamond();
        graph.set_edge(left, EdgeKind::Next, Some(BlockRef::Block(right)));
        let analysis = FlowAnalysis::compute(&graph);
        assert!(reduce_if(&mut graph, &analysis, cond));
        let block = graph.block(composite_after_start(&graph));
        assert_eq!(block.block_type, BlockType::Structured(StructuredType::If));
        assert_eq!(block.sub1, Some(BlockRef::Block(left)));
        assert_eq!(block.next, Some(BlockRef::Block(right)));
        assert_eq!(graph.flow_predecessors(right).len(), 1);
    }

    #[test]
    fn test_jump_to_virtual_target() {
        let Diamond {
            mut graph,
            cond,
            left,
            ..
        } = diamond();
        let brk = BlockRef::Virtual(VirtualTarget::LoopEnd);
        graph.set_edge(cond, EdgeKind::Branch, Some(brk));
        let analysis = FlowAnalysis::compute(&graph);
        assert!(reduce_if(&mut graph, &analysis, cond));
        let block = graph.block(composite_after_start(&graph));
        assert_eq!(block.sub1, Some(brk));
        assert_eq!(block.next, Some(BlockRef::Block(left)));
        assert!(!graph.block(cond).inverse_condition);
    }

    #[test]
    fn test_value_arms_form_ternary() {
        let Diamond {
            mut graph,
            cond,
            left,
            right,
            ..
        } = diamond();
        use jvm_bytecode_model::{opcodes, Instruction, InstructionKind};
        for arm in [left, right] {
            graph.update(arm, |block| {
                let value = Instruction::new(
                    opcodes::ICONST_1,
                    block.from_offset,
                    None,
                    InstructionKind::IntConstant { value: 1 },
                );
                block.instructions = vec![Instruction::new(
                    opcodes::ICONST_1,
                    block.from_offset,
                    None,
                    InstructionKind::LeftOnStack {
                        value: Box::new(value),
                    },
                )]
            });
        }
        let analysis = FlowAnalysis::compute(&graph);
        assert!(reduce_if(&mut graph, &analysis, cond));
        let block = graph.block(composite_after_start(&graph));
        assert_eq!(
            block.block_type,
            BlockType::Structured(StructuredType::TernaryOperator)
        );
    }
}
