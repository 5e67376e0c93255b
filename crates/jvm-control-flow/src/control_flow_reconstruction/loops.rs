// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

use crate::{
    basic_block::{BlockId, BlockRef, EdgeKind, StructuredType, VirtualTarget, SYNTHETIC_OFFSET},
    control_flow_graph::ControlFlowGraph,
};
use log::debug;
use std::collections::BTreeSet;

use super::{dominance::FlowAnalysis, helpers::*};

fn is_innermost(
    graph: &ControlFlowGraph,
    analysis: &FlowAnalysis,
    header: BlockId,
) -> bool {
    analysis
        .natural_loop(graph, header)
        .iter()
        .all(|id| *id == header || !analysis.is_loop_header(*id))
}

/// Blocks reachable from `start` that neither rejoin the loop nor reach its exit, and that are
/// entered from the loop only. Such code (an early `return` or `throw`) moves into the loop.
fn terminal_region(
    graph: &ControlFlowGraph,
    analysis: &FlowAnalysis,
    body: &BTreeSet<BlockId>,
    start: BlockId,
    exit: Option<BlockId>,
) -> Option<BTreeSet<BlockId>> {
    let mut region = BTreeSet::new();
    let mut work = vec![start];
    while let Some(id) = work.pop() {
        if body.contains(&id) || Some(id) == exit || analysis.is_loop_header(id) {
            return None;
        }
        if !region.insert(id) {
            continue;
        }
        for (_, target) in graph.block(id).flow_edges() {
            match target {
                BlockRef::Block(target) => work.push(target),
                BlockRef::Virtual(VirtualTarget::Return) => {}
                BlockRef::Virtual(_) => return None,
            }
        }
    }
    let entered_from_loop = region.iter().all(|id| {
        graph
            .flow_predecessors(*id)
            .iter()
            .all(|pred| region.contains(pred) || body.contains(pred))
    });
    entered_from_loop.then_some(region)
}

/// Wraps the natural loop of an innermost header in a loop block. Back edges become
/// `LOOP_START` (fall-through) or `LOOP_CONTINUE` (jump), edges to the loop exit become
/// `LOOP_END`, and any other edge leaving the loop becomes a literal goto.
pub(crate) fn reduce_loop(
    graph: &mut ControlFlowGraph,
    analysis: &FlowAnalysis,
    header: BlockId,
) -> bool {
    if !analysis.is_loop_header(header) {
        return false;
    }
    if !is_innermost(graph, analysis, header) {
        // Irreducible nests have no innermost header; any header will do then.
        let any_innermost = analysis
            .loop_headers()
            .iter()
            .any(|other| is_innermost(graph, analysis, *other));
        if any_innermost {
            return false;
        }
    }
    let mut body = analysis.natural_loop(graph, header);

    let exits = |body: &BTreeSet<BlockId>| -> BTreeSet<BlockId> {
        body.iter()
            .flat_map(|id| graph.block(*id).flow_edges())
            .filter(|(kind, _)| !matches!(kind, EdgeKind::Handler(_)))
            .filter_map(|(_, target)| target.block())
            .filter(|target| !body.contains(target))
            .collect()
    };
    let last_offset = body
        .iter()
        .map(|id| graph.block(*id).from_offset)
        .filter(|offset| *offset != SYNTHETIC_OFFSET)
        .max()
        .unwrap_or(0);
    let candidates = exits(&body);
    let by_offset = |id: &BlockId| (graph.block(*id).from_offset, *id);
    let loop_end = candidates
        .iter()
        .copied()
        .filter(|id| graph.block(*id).from_offset > last_offset)
        .min_by_key(by_offset)
        .or_else(|| candidates.iter().copied().min_by_key(by_offset));
    for exit in &candidates {
        if Some(*exit) == loop_end {
            continue;
        }
        if let Some(region) = terminal_region(graph, analysis, &body, *exit, loop_end) {
            debug!(
                "[reduce_loop] moving terminal blocks {:?} into the loop at {}",
                region, header
            );
            body.extend(region);
        }
    }

    let mut rewrites = vec![];
    let mut literal_exits = vec![];
    for id in &body {
        for (kind, target) in graph.block(*id).flow_edges() {
            let BlockRef::Block(target) = target else {
                continue;
            };
            if matches!(kind, EdgeKind::Handler(_)) {
                continue;
            }
            if target == header {
                let virtual_target = if kind == EdgeKind::Next {
                    VirtualTarget::LoopStart
                } else {
                    VirtualTarget::LoopContinue
                };
                rewrites.push((*id, kind, BlockRef::Virtual(virtual_target)));
            } else if Some(target) == loop_end {
                rewrites.push((*id, kind, BlockRef::Virtual(VirtualTarget::LoopEnd)));
            } else if !body.contains(&target) {
                literal_exits.push((*id, kind, target));
            }
        }
    }

    let absorbed: Vec<BlockId> = body.iter().copied().collect();
    let composite = new_composite(graph, StructuredType::Loop, &absorbed);
    graph.redirect_filtered(header, BlockRef::Block(composite), |pred| {
        !body.contains(&pred.index)
    });
    for (id, kind, target) in rewrites {
        graph.set_edge(id, kind, Some(target));
    }
    for (id, kind, target) in literal_exits {
        let offset = graph.block(id).to_offset;
        let goto = literal_goto(graph, StructuredType::Goto, offset, BlockRef::Block(target));
        graph.set_edge(id, kind, Some(BlockRef::Block(goto)));
        debug!(
            "[reduce_loop] edge {} -> {} leaves the loop at {} through goto {}",
            id, target, header, goto
        );
    }
    graph.update(composite, |block| {
        block.sub1 = Some(BlockRef::Block(header));
        block.next = loop_end.map(BlockRef::Block);
    });
    debug!(
        "[reduce_loop] block {} loops over {:?} and exits to {:?}",
        composite, body, loop_end
    );
    true
}
