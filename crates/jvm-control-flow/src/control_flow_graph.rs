// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! The block arena of one method.
//!
//! Blocks are addressed by index and never removed; a block dropped from the structure is
//! detached (all outgoing edges cleared) and becomes unreachable. Every edge mutation goes
//! through [`ControlFlowGraph::update`], which keeps predecessor sets in sync with the edges.

use crate::basic_block::{BasicBlock, BlockId, BlockRef, BlockType, EdgeKind, SYNTHETIC_OFFSET};
use std::collections::{BTreeSet, VecDeque};

#[derive(Clone, Debug)]
pub struct ControlFlowGraph {
    blocks: Vec<BasicBlock>,
}

impl Default for ControlFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlFlowGraph {
    /// The synthetic entry block.
    pub const START: BlockId = 0;

    pub fn new() -> Self {
        Self {
            blocks: vec![BasicBlock::new(
                Self::START,
                BlockType::Start,
                SYNTHETIC_OFFSET,
                SYNTHETIC_OFFSET,
            )],
        }
    }

    pub fn add_block(&mut self, block_type: BlockType, from_offset: u32, to_offset: u32) -> BlockId {
        let index = self.blocks.len();
        self.blocks
            .push(BasicBlock::new(index, block_type, from_offset, to_offset));
        index
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.len() <= 1
    }

    /// Mutates one block, then brings the predecessor sets of its old and new targets up to
    /// date.
    pub fn update<R>(&mut self, id: BlockId, f: impl FnOnce(&mut BasicBlock) -> R) -> R {
        let before = self.blocks[id].targets();
        let result = f(&mut self.blocks[id]);
        let after = self.blocks[id].targets();
        for removed in before.difference(&after) {
            self.blocks[*removed].predecessors.remove(&id);
        }
        for added in after.difference(&before) {
            self.blocks[*added].predecessors.insert(id);
        }
        result
    }

    pub fn set_edge(&mut self, id: BlockId, kind: EdgeKind, target: Option<BlockRef>) {
        self.update(id, |block| block.set_edge(kind, target));
    }

    /// Points every edge that targets `old`, from any predecessor accepted by `filter`, at
    /// `new` instead.
    pub fn redirect_filtered(
        &mut self,
        old: BlockId,
        new: BlockRef,
        filter: impl Fn(&BasicBlock) -> bool,
    ) {
        let preds: Vec<BlockId> = self.blocks[old].predecessors.iter().copied().collect();
        for pred in preds {
            if filter(&self.blocks[pred]) {
                self.update(pred, |block| block.replace_target(BlockRef::Block(old), new));
            }
        }
    }

    /// Points every edge that targets `old` at `new` instead.
    pub fn redirect(&mut self, old: BlockId, new: BlockRef) {
        self.redirect_filtered(old, new, |_| true);
    }

    /// Clears all outgoing edges of a block that leaves the structure.
    pub fn detach(&mut self, id: BlockId) {
        self.update(id, |block| {
            block.next = None;
            block.branch = None;
            block.condition = None;
            block.sub1 = None;
            block.sub2 = None;
            block.switch_cases.clear();
            block.exception_handlers.clear();
        });
    }

    /// Recomputes every predecessor set from the edges.
    pub fn rebuild_predecessors(&mut self) {
        for block in &mut self.blocks {
            block.predecessors.clear();
        }
        for id in 0..self.blocks.len() {
            for target in self.blocks[id].targets() {
                self.blocks[target].predecessors.insert(id);
            }
        }
    }

    /// Blocks reachable from `START` along edges of any kind, in index order.
    pub fn reachable(&self) -> BTreeSet<BlockId> {
        let mut seen = BTreeSet::new();
        let mut work = VecDeque::from([Self::START]);
        while let Some(id) = work.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            for target in self.blocks[id].targets() {
                if !seen.contains(&target) {
                    work.push_back(target);
                }
            }
        }
        seen
    }

    /// Distinct real flow successors, in edge order.
    pub fn flow_successors(&self, id: BlockId) -> Vec<BlockId> {
        let mut result = vec![];
        for (_, target) in self.blocks[id].flow_edges() {
            if let Some(target) = target.block() {
                if !result.contains(&target) {
                    result.push(target);
                }
            }
        }
        result
    }

    /// Predecessors with a flow edge (rather than only a child edge) to `id`.
    pub fn flow_predecessors(&self, id: BlockId) -> BTreeSet<BlockId> {
        self.blocks[id]
            .predecessors
            .iter()
            .copied()
            .filter(|pred| {
                self.blocks[*pred]
                    .flow_edges()
                    .iter()
                    .any(|(_, target)| *target == BlockRef::Block(id))
            })
            .collect()
    }

    /// Predecessors that place `id` in the nesting: those with an edge to it other than
    /// `branch`. Once structured, only literal gotos and subroutine calls keep a `branch`, and
    /// their targets are labels.
    pub fn entering_predecessors(&self, id: BlockId) -> BTreeSet<BlockId> {
        self.blocks[id]
            .predecessors
            .iter()
            .copied()
            .filter(|pred| {
                self.blocks[*pred]
                    .edges()
                    .iter()
                    .any(|(kind, target)| *kind != EdgeKind::Branch && *target == BlockRef::Block(id))
            })
            .collect()
    }

    /// The blocks of the cycle `id` closes when every one of them has a single entering
    /// predecessor, listed from `id` backwards.
    pub fn entry_cycle(&self, id: BlockId) -> Option<Vec<BlockId>> {
        let mut members = vec![id];
        let mut current = id;
        loop {
            let entries = self.entering_predecessors(current);
            let (Some(pred), 1) = (entries.first().copied(), entries.len()) else {
                return None;
            };
            if pred == id {
                return Some(members);
            }
            if members.contains(&pred) {
                return None;
            }
            members.push(pred);
            current = pred;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_block::{RawType, StructuredType};

    fn statements(graph: &mut ControlFlowGraph, from: u32) -> BlockId {
        graph.add_block(BlockType::Raw(RawType::Statements), from, from + 1)
    }

    #[test]
    fn test_update_keeps_predecessors_in_sync() {
        let mut graph = ControlFlowGraph::new();
        let a = statements(&mut graph, 0);
        let b = statements(&mut graph, 1);
        let c = statements(&mut graph, 2);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(a)));
        graph.set_edge(a, EdgeKind::Next, Some(BlockRef::Block(b)));
        graph.set_edge(a, EdgeKind::Branch, Some(BlockRef::Block(b)));
        assert_eq!(graph.block(b).predecessors, [a].into_iter().collect());

        // A second edge to the same target keeps the predecessor until both are gone.
        graph.set_edge(a, EdgeKind::Next, Some(BlockRef::Block(c)));
        assert!(graph.block(b).predecessors.contains(&a));
        graph.set_edge(a, EdgeKind::Branch, None);
        assert!(graph.block(b).predecessors.is_empty());
        assert_eq!(graph.block(c).predecessors, [a].into_iter().collect());
    }

    #[test]
    fn test_redirect_and_reachability() {
        let mut graph = ControlFlowGraph::new();
        let a = statements(&mut graph, 0);
        let b = statements(&mut graph, 1);
        let c = statements(&mut graph, 2);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(a)));
        graph.set_edge(a, EdgeKind::Next, Some(BlockRef::Block(b)));
        graph.set_edge(b, EdgeKind::Next, Some(BlockRef::Block(c)));
        graph.redirect(b, BlockRef::Block(c));
        graph.detach(b);
        assert_eq!(graph.block(a).next, Some(BlockRef::Block(c)));
        assert_eq!(graph.reachable(), [0, a, c].into_iter().collect());
        assert!(graph.block(c).predecessors.contains(&a));
        assert!(!graph.block(c).predecessors.contains(&b));
    }

    #[test]
    fn test_child_edges_are_not_flow_edges() {
        let mut graph = ControlFlowGraph::new();
        let body = graph.add_block(BlockType::Structured(StructuredType::Statements), 0, 4);
        let join = statements(&mut graph, 4);
        let lp = graph.add_block(BlockType::Structured(StructuredType::Loop), 0, 4);
        graph.update(lp, |block| {
            block.sub1 = Some(BlockRef::Block(body));
            block.next = Some(BlockRef::Block(join));
        });
        assert!(graph.flow_predecessors(body).is_empty());
        assert_eq!(graph.flow_predecessors(join), [lp].into_iter().collect());
        assert_eq!(graph.flow_successors(lp), vec![join]);
    }

    #[test]
    fn test_entering_predecessors_skip_labels() {
        let mut graph = ControlFlowGraph::new();
        let a = graph.add_block(BlockType::Structured(StructuredType::Statements), 0, 4);
        let b = graph.add_block(BlockType::Structured(StructuredType::Statements), 4, 8);
        let goto = graph.add_block(BlockType::Structured(StructuredType::Goto), 8, 8);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(a)));
        graph.set_edge(a, EdgeKind::Next, Some(BlockRef::Block(b)));
        graph.set_edge(goto, EdgeKind::Branch, Some(BlockRef::Block(b)));
        assert_eq!(graph.entering_predecessors(b), [a].into_iter().collect());
        assert_eq!(graph.entry_cycle(b), None);

        // b -> a closes a cycle once nothing else enters a.
        graph.set_edge(b, EdgeKind::Next, Some(BlockRef::Block(a)));
        assert_eq!(graph.entering_predecessors(a).len(), 2);
        assert_eq!(graph.entry_cycle(a), None);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(goto)));
        assert_eq!(graph.entry_cycle(a), Some(vec![a, b]));
    }
}
