// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Consistency checks over a block graph. A failure is always a bug in the builder or in a
//! structuring rule.

use crate::{
    basic_block::{BasicBlock, BlockType, EdgeKind, StructuredType},
    control_flow_graph::ControlFlowGraph,
    error::InvariantViolation,
};

/// The children a structured block of the given type must have.
fn required_children(block_type: BlockType) -> &'static [(EdgeKind, &'static str)] {
    use StructuredType::*;
    const CONDITION: (EdgeKind, &str) = (EdgeKind::Condition, "condition");
    const SUB1: (EdgeKind, &str) = (EdgeKind::Sub1, "sub1");
    const SUB2: (EdgeKind, &str) = (EdgeKind::Sub2, "sub2");
    const BRANCH: (EdgeKind, &str) = (EdgeKind::Branch, "branch");
    match block_type {
        BlockType::Structured(If) => &[CONDITION, SUB1],
        BlockType::Structured(IfElse | TernaryOperator | ConditionTernaryOperator) => {
            &[CONDITION, SUB1, SUB2]
        }
        BlockType::Structured(ConditionOr | ConditionAnd) => &[SUB1, SUB2],
        BlockType::Structured(Loop | Try | TryJsr | TryEclipse) => &[SUB1],
        BlockType::Structured(Jsr | Goto | GotoInTernaryOperator) => &[BRANCH],
        _ => &[],
    }
}

fn verify_children(block: &BasicBlock) -> Result<(), InvariantViolation> {
    for (kind, child) in required_children(block.block_type) {
        if block.edge(*kind).is_none() {
            return Err(InvariantViolation::MissingChild {
                block: block.index,
                block_type: block.block_type.name(),
                child: *child,
            });
        }
    }
    Ok(())
}

/// Checks that predecessor sets mirror the edges exactly, that nothing enters `START`, and that
/// every reachable structured block has its children.
pub fn verify_graph(graph: &ControlFlowGraph) -> Result<(), InvariantViolation> {
    for block in graph.blocks() {
        for target in block.targets() {
            if target >= graph.len() {
                return Err(InvariantViolation::DanglingEdge {
                    from: block.index,
                    to: target,
                });
            }
            if !graph.block(target).predecessors.contains(&block.index) {
                return Err(InvariantViolation::PredecessorMissing {
                    from: block.index,
                    to: target,
                });
            }
        }
        for pred in &block.predecessors {
            if *pred >= graph.len() || !graph.block(*pred).targets().contains(&block.index) {
                return Err(InvariantViolation::StalePredecessor {
                    block: block.index,
                    predecessor: *pred,
                });
            }
        }
    }
    if let Some(predecessor) = graph.block(ControlFlowGraph::START).predecessors.first() {
        return Err(InvariantViolation::StartHasPredecessor {
            predecessor: *predecessor,
        });
    }
    for id in graph.reachable() {
        verify_children(graph.block(id))?;
    }
    Ok(())
}

/// [`verify_graph`], plus: no reachable block is raw or an undecided condition, and the blocks
/// nest. Every block other than `START` is entered through at most one non-goto edge, and
/// following those edges never leads back to where it began.
pub fn verify_structured(graph: &ControlFlowGraph) -> Result<(), InvariantViolation> {
    verify_graph(graph)?;
    for id in graph.reachable() {
        let block = graph.block(id);
        if block.is_pending() {
            return Err(InvariantViolation::Unstructured {
                block: id,
                block_type: block.block_type.name(),
            });
        }
    }
    for id in graph.reachable() {
        let entries = graph.entering_predecessors(id);
        if entries.len() > 1 {
            return Err(InvariantViolation::SharedEntry {
                block: id,
                predecessors: entries.into_iter().collect(),
            });
        }
        if let Some(cycle) = graph.entry_cycle(id) {
            return Err(InvariantViolation::EntryCycle { block: id, cycle });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_block::{BlockRef, RawType};

    #[test]
    fn test_stale_predecessor_is_reported() {
        let mut graph = ControlFlowGraph::new();
        let a = graph.add_block(BlockType::Raw(RawType::Return), 0, 1);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(a)));
        assert_eq!(verify_graph(&graph), Ok(()));
        assert_eq!(
            verify_structured(&graph),
            Err(InvariantViolation::Unstructured {
                block: a,
                block_type: "RETURN"
            })
        );

        let mut broken = graph.clone();
        broken.update(a, |block| {
            block.predecessors.insert(a);
        });
        assert_eq!(
            verify_graph(&broken),
            Err(InvariantViolation::StalePredecessor {
                block: a,
                predecessor: a
            })
        );
    }

    #[test]
    fn test_missing_child_is_reported() {
        let mut graph = ControlFlowGraph::new();
        let lp = graph.add_block(BlockType::Structured(StructuredType::Loop), 0, 1);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(lp)));
        assert_eq!(
            verify_graph(&graph),
            Err(InvariantViolation::MissingChild {
                block: lp,
                block_type: "LOOP",
                child: "sub1"
            })
        );
    }

    #[test]
    fn test_unnested_blocks_are_reported() {
        // START -> a -> b -> a: b jumps back to a without a goto.
        let mut graph = ControlFlowGraph::new();
        let a = graph.add_block(BlockType::Structured(StructuredType::Statements), 0, 4);
        let b = graph.add_block(BlockType::Structured(StructuredType::Statements), 4, 8);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(a)));
        graph.set_edge(a, EdgeKind::Next, Some(BlockRef::Block(b)));
        graph.set_edge(b, EdgeKind::Next, Some(BlockRef::Block(a)));
        assert_eq!(
            verify_structured(&graph),
            Err(InvariantViolation::SharedEntry {
                block: a,
                predecessors: vec![ControlFlowGraph::START, b]
            })
        );

        // Entered through a goto only, the pair still runs in a circle.
        let goto = graph.add_block(BlockType::Structured(StructuredType::Goto), 0, 0);
        graph.set_edge(goto, EdgeKind::Branch, Some(BlockRef::Block(a)));
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(goto)));
        assert_eq!(
            verify_structured(&graph),
            Err(InvariantViolation::EntryCycle {
                block: a,
                cycle: vec![a, b]
            })
        );

        graph.set_edge(b, EdgeKind::Next, None);
        assert_eq!(verify_structured(&graph), Ok(()));
    }

    #[test]
    fn test_edge_into_start_is_reported() {
        let mut graph = ControlFlowGraph::new();
        let a = graph.add_block(BlockType::Raw(RawType::Goto), 0, 3);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(a)));
        graph.set_edge(a, EdgeKind::Next, Some(BlockRef::Block(ControlFlowGraph::START)));
        assert_eq!(
            verify_graph(&graph),
            Err(InvariantViolation::StartHasPredecessor { predecessor: a })
        );
    }
}
