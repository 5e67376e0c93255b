// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

use crate::{
    basic_block::{BlockId, BlockRef, BlockType, EdgeKind, RawType, StructuredType, VirtualTarget},
    control_flow_graph::ControlFlowGraph,
};
use itertools::Itertools;
use log::debug;
use std::collections::BTreeSet;

use super::{dominance::FlowAnalysis, helpers::*};

/// Structures a switch declaration once every case body is a chain of settled blocks.
///
/// Case bodies are laid out in offset order and one that runs into the next body ends with
/// `END`. The block the other bodies continue at is the join: jumps there become
/// `SWITCH_BREAK`, or `END` for the last body. A default that only leads to the join is
/// dropped, and so are cases that only lead there when no real default exists.
pub(crate) fn reduce_switch(
    graph: &mut ControlFlowGraph,
    analysis: &FlowAnalysis,
    id: BlockId,
) -> bool {
    let declaration = graph.block(id);
    if declaration.block_type != BlockType::Raw(RawType::SwitchDeclaration)
        || analysis.is_loop_header(id)
    {
        return false;
    }
    let from = declaration.from_offset;
    let default_head = declaration
        .switch_cases
        .iter()
        .find(|case| case.is_default)
        .and_then(|case| case.target.block());
    let heads: Vec<BlockId> = declaration
        .switch_cases
        .iter()
        .filter_map(|case| case.target.block())
        .unique()
        .sorted_by_key(|head| (graph.block(*head).from_offset, *head))
        .collect();

    let mut arms: Vec<Arm> = vec![];
    for (i, head) in heads.iter().enumerate() {
        let mut entry = BTreeSet::from([id]);
        if let Some(previous) = arms.last() {
            if previous.end == ArmEnd::Join(*head) {
                entry.extend(previous.last());
            }
        }
        let bounds = ArmBounds {
            entry: &entry,
            after: Some(from),
            before: heads.get(i + 1).map(|next| graph.block(*next).from_offset),
        };
        arms.push(walk_arm(graph, analysis, BlockRef::Block(*head), &bounds));
    }

    let falls_through =
        |i: usize, arm: &Arm| matches!(arm.end, ArmEnd::Join(j) if heads.get(i + 1) == Some(&j));
    let joins: BTreeSet<BlockId> = arms
        .iter()
        .enumerate()
        .filter(|(i, arm)| !falls_through(*i, arm))
        .filter_map(|(_, arm)| match arm.end {
            ArmEnd::Join(j) => Some(j),
            _ => None,
        })
        .collect();
    // Without explicit breaks, the last body is the join when the body before runs into it.
    let join = match joins.len() {
        0 => heads
            .last()
            .copied()
            .filter(|last| arms.iter().any(|arm| arm.end == ArmEnd::Join(*last))),
        1 => joins.first().copied(),
        _ => return false,
    };
    if let Some(join) = join {
        if join == id || (heads.contains(&join) && heads.last() != Some(&join)) {
            return false;
        }
    }

    let kept: Vec<(usize, &Arm)> = arms
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(heads[*i]) != join)
        .collect();
    for (i, arm) in &kept {
        if arm.is_empty() {
            return false;
        }
        if let ArmEnd::Join(j) = arm.end {
            if Some(j) != join && !falls_through(*i, arm) {
                return false;
            }
        }
    }

    let last_kept = kept.last().map(|(i, _)| *i);
    let mut ends = vec![];
    for (i, arm) in &kept {
        if let (ArmEnd::Join(j), Some(last)) = (arm.end, arm.last()) {
            let target = if Some(j) == join && Some(*i) != last_kept {
                BlockRef::Virtual(VirtualTarget::SwitchBreak)
            } else {
                BlockRef::END
            };
            ends.push((last, target));
        }
    }
    for (last, target) in ends {
        graph.set_edge(last, EdgeKind::Next, Some(target));
    }

    let has_default = default_head.map_or(true, |head| Some(head) != join);
    graph.update(id, |block| {
        block.block_type = BlockType::Structured(StructuredType::Switch);
        if let Some(join) = join.map(BlockRef::Block) {
            block
                .switch_cases
                .retain(|case| !(case.is_default && case.target == join));
            if has_default {
                for case in &mut block.switch_cases {
                    if case.target == join {
                        case.target = BlockRef::Virtual(VirtualTarget::SwitchBreak);
                    }
                }
            } else {
                block.switch_cases.retain(|case| case.target != join);
            }
        }
        block.next = join.map(BlockRef::Block);
    });
    debug!(
        "[reduce_switch] block {} switches over {} bodies and continues at {:?}",
        id,
        kept.len(),
        join
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_block::SwitchCase;

    fn case(value: i32, is_default: bool, target: BlockId) -> SwitchCase {
        SwitchCase {
            value,
            is_default,
            target: BlockRef::Block(target),
        }
    }

    fn settled(graph: &mut ControlFlowGraph, from: u32) -> BlockId {
        graph.add_block(BlockType::Structured(StructuredType::Statements), from, from + 4)
    }

    #[test]
    fn test_break_to_join_and_fallthrough() {
        // switch (x) { case 1: a; case 2: b; break; case 3: c; } join
        let mut graph = ControlFlowGraph::new();
        let switch = graph.add_block(BlockType::Raw(RawType::SwitchDeclaration), 0, 4);
        let a = settled(&mut graph, 4);
        let b = settled(&mut graph, 8);
        let c = settled(&mut graph, 12);
        let join = graph.add_block(BlockType::Structured(StructuredType::Return), 16, 17);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(switch)));
        graph.update(switch, |block| {
            block.switch_cases = vec![
                case(1, false, a),
                case(2, false, b),
                case(3, false, c),
                case(0, true, join),
            ]
        });
        graph.set_edge(a, EdgeKind::Next, Some(BlockRef::Block(b)));
        graph.set_edge(b, EdgeKind::Next, Some(BlockRef::Block(join)));
        graph.set_edge(c, EdgeKind::Next, Some(BlockRef::Block(join)));

        let analysis = FlowAnalysis::compute(&graph);
        assert!(reduce_switch(&mut graph, &analysis, switch));
        let block = graph.block(switch);
        assert_eq!(block.block_type, BlockType::Structured(StructuredType::Switch));
        assert_eq!(block.next, Some(BlockRef::Block(join)));
        assert_eq!(block.switch_cases.len(), 3);
        assert_eq!(graph.block(a).next, Some(BlockRef::END));
        assert_eq!(
            graph.block(b).next,
            Some(BlockRef::Virtual(VirtualTarget::SwitchBreak))
        );
        assert_eq!(graph.block(c).next, Some(BlockRef::END));
    }

    #[test]
    fn test_case_to_join_is_dropped_without_default() {
        // switch (x) { case 1: a; break; case 2: } join
        let mut graph = ControlFlowGraph::new();
        let switch = graph.add_block(BlockType::Raw(RawType::SwitchDeclaration), 0, 4);
        let a = settled(&mut graph, 4);
        let join = graph.add_block(BlockType::Structured(StructuredType::Return), 8, 9);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(switch)));
        graph.update(switch, |block| {
            block.switch_cases = vec![case(1, false, a), case(2, false, join), case(0, true, join)]
        });
        graph.set_edge(a, EdgeKind::Next, Some(BlockRef::Block(join)));

        let analysis = FlowAnalysis::compute(&graph);
        assert!(reduce_switch(&mut graph, &analysis, switch));
        let block = graph.block(switch);
        assert_eq!(block.switch_cases, vec![case(1, false, a)]);
        assert_eq!(graph.block(a).next, Some(BlockRef::END));
    }

    #[test]
    fn test_case_to_join_breaks_with_real_default() {
        // switch (x) { case 1: break; default: d; } join
        let mut graph = ControlFlowGraph::new();
        let switch = graph.add_block(BlockType::Raw(RawType::SwitchDeclaration), 0, 4);
        let d = settled(&mut graph, 4);
        let join = graph.add_block(BlockType::Structured(StructuredType::Return), 8, 9);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(switch)));
        graph.update(switch, |block| {
            block.switch_cases = vec![case(1, false, join), case(0, true, d)]
        });
        graph.set_edge(d, EdgeKind::Next, Some(BlockRef::Block(join)));

        let analysis = FlowAnalysis::compute(&graph);
        assert!(reduce_switch(&mut graph, &analysis, switch));
        let block = graph.block(switch);
        assert_eq!(
            block.switch_cases[0].target,
            BlockRef::Virtual(VirtualTarget::SwitchBreak)
        );
        assert_eq!(block.switch_cases[1].target, BlockRef::Block(d));
    }
}
