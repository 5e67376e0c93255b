// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Dominance, back edges and natural loops of the current graph.
//!
//! Dominators are computed over every edge, so blocks nested inside a structured block are
//! dominated by it. Back edges are flow edges whose target dominates their source. Literal
//! goto blocks are neither back-edge sources nor part of natural loops: their jumps stay
//! literal.

use crate::{
    basic_block::{BlockId, BlockRef, EdgeKind},
    control_flow_graph::ControlFlowGraph,
};
use petgraph::{
    algo::dominators::{self, Dominators},
    graph::{DiGraph, NodeIndex},
};
use std::collections::{BTreeMap, BTreeSet};

pub(crate) struct FlowAnalysis {
    reachable: BTreeSet<BlockId>,
    node_of: BTreeMap<BlockId, NodeIndex>,
    dominators: Dominators<NodeIndex>,
    back_edges: Vec<(BlockId, BlockId)>,
    headers: BTreeSet<BlockId>,
}

impl FlowAnalysis {
    pub fn compute(graph: &ControlFlowGraph) -> Self {
        let reachable = graph.reachable();
        let mut digraph: DiGraph<BlockId, ()> = DiGraph::new();
        let node_of: BTreeMap<BlockId, NodeIndex> = reachable
            .iter()
            .map(|id| (*id, digraph.add_node(*id)))
            .collect();
        for (id, node) in &node_of {
            for target in graph.block(*id).targets() {
                if let Some(target) = node_of.get(&target) {
                    digraph.add_edge(*node, *target, ());
                }
            }
        }
        let root = node_of[&ControlFlowGraph::START];
        let dominators = dominators::simple_fast(&digraph, root);

        let mut analysis = FlowAnalysis {
            reachable,
            node_of,
            dominators,
            back_edges: vec![],
            headers: BTreeSet::new(),
        };
        let mut back_edges = vec![];
        for id in &analysis.reachable {
            let block = graph.block(*id);
            if block.block_type.is_goto() {
                continue;
            }
            for (kind, target) in block.flow_edges() {
                if matches!(kind, EdgeKind::Handler(_)) {
                    continue;
                }
                if let BlockRef::Block(target) = target {
                    if analysis.dominates(target, *id) {
                        back_edges.push((*id, target));
                    }
                }
            }
        }
        analysis.headers = back_edges.iter().map(|(_, header)| *header).collect();
        analysis.back_edges = back_edges;
        analysis
    }

    pub fn reachable(&self) -> &BTreeSet<BlockId> {
        &self.reachable
    }

    /// Whether every path from `START` to `block` passes through `dominator`.
    pub fn dominates(&self, dominator: BlockId, block: BlockId) -> bool {
        let (Some(&dominator), Some(&block)) =
            (self.node_of.get(&dominator), self.node_of.get(&block))
        else {
            return false;
        };
        let mut current = block;
        loop {
            if current == dominator {
                return true;
            }
            match self.dominators.immediate_dominator(current) {
                Some(idom) if idom != current => current = idom,
                _ => return false,
            }
        }
    }

    /// Back edges as `(source, header)` pairs.
    pub fn back_edges(&self) -> &[(BlockId, BlockId)] {
        &self.back_edges
    }

    pub fn loop_headers(&self) -> &BTreeSet<BlockId> {
        &self.headers
    }

    pub fn is_loop_header(&self, id: BlockId) -> bool {
        self.headers.contains(&id)
    }

    /// The header plus every block that reaches one of its back-edge sources without passing
    /// through the header.
    pub fn natural_loop(&self, graph: &ControlFlowGraph, header: BlockId) -> BTreeSet<BlockId> {
        let mut body = BTreeSet::from([header]);
        let mut work: Vec<BlockId> = self
            .back_edges
            .iter()
            .filter(|(_, h)| *h == header)
            .map(|(source, _)| *source)
            .collect();
        while let Some(id) = work.pop() {
            if !body.insert(id) {
                continue;
            }
            for pred in graph.flow_predecessors(id) {
                if !body.contains(&pred)
                    && self.reachable.contains(&pred)
                    && !graph.block(pred).block_type.is_goto()
                {
                    work.push(pred);
                }
            }
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_block::{BlockType, RawType, StructuredType};

    /// START -> a -> b -> c, with c -> b and b -> d.
    fn looped() -> (ControlFlowGraph, [BlockId; 4]) {
        let mut graph = ControlFlowGraph::new();
        let a = graph.add_block(BlockType::Structured(StructuredType::Statements), 0, 4);
        let b = graph.add_block(BlockType::Raw(RawType::ConditionalBranch), 4, 8);
        let c = graph.add_block(BlockType::Structured(StructuredType::Statements), 8, 12);
        let d = graph.add_block(BlockType::Structured(StructuredType::Return), 12, 13);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(a)));
        graph.set_edge(a, EdgeKind::Next, Some(BlockRef::Block(b)));
        graph.set_edge(b, EdgeKind::Next, Some(BlockRef::Block(c)));
        graph.set_edge(b, EdgeKind::Branch, Some(BlockRef::Block(d)));
        graph.set_edge(c, EdgeKind::Next, Some(BlockRef::Block(b)));
        (graph, [a, b, c, d])
    }

    #[test]
    fn test_back_edge_and_natural_loop() {
        let (graph, [a, b, c, d]) = looped();
        let analysis = FlowAnalysis::compute(&graph);
        assert!(analysis.dominates(a, c));
        assert!(analysis.dominates(b, d));
        assert!(!analysis.dominates(c, d));
        assert_eq!(analysis.back_edges(), &[(c, b)]);
        assert_eq!(analysis.natural_loop(&graph, b), [b, c].into_iter().collect());
    }

    #[test]
    fn test_literal_goto_is_not_a_back_edge() {
        let (mut graph, [_, b, c, _]) = looped();
        graph.update(c, |block| {
            block.block_type = BlockType::Structured(StructuredType::Goto);
            block.next = None;
            block.branch = Some(BlockRef::Block(b));
        });
        let analysis = FlowAnalysis::compute(&graph);
        assert!(analysis.back_edges().is_empty());
        assert!(!analysis.is_loop_header(b));
    }
}
