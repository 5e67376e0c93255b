// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

use crate::{
    basic_block::{BlockId, BlockRef, BlockType, RawType, StructuredType},
    control_flow_graph::ControlFlowGraph,
};
use itertools::Itertools;
use log::debug;
use std::collections::BTreeSet;

use super::{dominance::FlowAnalysis, helpers::*};

/// Structures a try declaration once its body and every handler are chains of settled blocks
/// that agree on where they continue.
///
/// A try whose arms call a subroutine is a `TRY_JSR`; one whose `finally` handler rejoins the
/// code after the try (as Eclipse compiles it) is a `TRY_ECLIPSE`. The `finally` handler is
/// always listed last.
pub(crate) fn reduce_try(graph: &mut ControlFlowGraph, analysis: &FlowAnalysis, id: BlockId) -> bool {
    let declaration = graph.block(id);
    if declaration.block_type != BlockType::Raw(RawType::TryDeclaration) {
        return false;
    }
    let Some(body) = declaration.next else {
        return false;
    };
    let Some(handler_heads) = declaration
        .exception_handlers
        .iter()
        .map(|handler| handler.handler.block())
        .collect::<Option<Vec<BlockId>>>()
    else {
        return false;
    };
    let handler_heads: Vec<BlockId> = handler_heads
        .into_iter()
        .unique()
        .sorted_by_key(|head| (graph.block(*head).from_offset, *head))
        .collect();
    let finally_head = declaration
        .exception_handlers
        .iter()
        .find(|handler| handler.is_finally())
        .and_then(|handler| handler.handler.block());

    let entry = BTreeSet::from([id]);
    let offset_of = |head: Option<&BlockId>| head.map(|head| graph.block(*head).from_offset);
    let body_arm = walk_arm(
        graph,
        analysis,
        body,
        &ArmBounds {
            entry: &entry,
            after: None,
            before: offset_of(handler_heads.first()),
        },
    );
    if body_arm.is_empty() {
        return false;
    }
    let mut handler_arms = vec![];
    for (i, head) in handler_heads.iter().enumerate() {
        let arm = walk_arm(
            graph,
            analysis,
            BlockRef::Block(*head),
            &ArmBounds {
                entry: &entry,
                after: None,
                before: offset_of(handler_heads.get(i + 1)),
            },
        );
        if arm.is_empty() {
            return false;
        }
        handler_arms.push(arm);
    }

    let joins: BTreeSet<BlockId> = std::iter::once(&body_arm)
        .chain(handler_arms.iter())
        .filter_map(|arm| match arm.end {
            ArmEnd::Join(join) => Some(join),
            _ => None,
        })
        .collect();
    if joins.len() > 1 {
        return false;
    }
    let join = joins.first().copied();
    if let Some(join) = join {
        if join == id || handler_heads.contains(&join) || body_arm.head() == Some(join) {
            return false;
        }
    }

    let jsr = BlockType::Structured(StructuredType::Jsr);
    let block_type = if std::iter::once(&body_arm)
        .chain(handler_arms.iter())
        .any(|arm| arm.contains_type(graph, jsr))
    {
        StructuredType::TryJsr
    } else if handler_arms
        .iter()
        .any(|arm| arm.head() == finally_head && !arm.end.is_exit())
    {
        StructuredType::TryEclipse
    } else {
        StructuredType::Try
    };

    close_arm(graph, &body_arm, BlockRef::END);
    for arm in &handler_arms {
        close_arm(graph, arm, BlockRef::END);
    }
    graph.update(id, |block| {
        block.block_type = BlockType::Structured(block_type);
        // Stable, so catch clauses keep their table order.
        block.exception_handlers.sort_by_key(|handler| handler.is_finally());
        block.sub1 = Some(body);
        block.next = join.map(BlockRef::Block);
    });
    debug!(
        "[reduce_try] block {} is {} with {} handlers and continues at {:?}",
        id,
        graph.block(id).block_type,
        handler_heads.len(),
        join
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_block::{EdgeKind, ExceptionHandler};

    fn handler(name: Option<&str>, target: BlockId) -> ExceptionHandler {
        ExceptionHandler {
            throwable_name: name.map(str::to_string),
            other_throwable_names: vec![],
            handler: BlockRef::Block(target),
        }
    }

    fn settled(graph: &mut ControlFlowGraph, from: u32) -> BlockId {
        graph.add_block(BlockType::Structured(StructuredType::Statements), from, from + 4)
    }

    #[test]
    fn test_try_catch_finally() {
        // try { body } catch (E) { catch } finally { rethrow } join
        let mut graph = ControlFlowGraph::new();
        let declaration = graph.add_block(BlockType::Raw(RawType::TryDeclaration), 0, 0);
        let body = settled(&mut graph, 0);
        let catch = settled(&mut graph, 4);
        let finally = graph.add_block(BlockType::Structured(StructuredType::Throw), 8, 12);
        let join = graph.add_block(BlockType::Structured(StructuredType::Return), 12, 13);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(declaration)));
        graph.update(declaration, |block| {
            block.next = Some(BlockRef::Block(body));
            block.exception_handlers = vec![handler(None, finally), handler(Some("E"), catch)];
        });
        graph.set_edge(body, EdgeKind::Next, Some(BlockRef::Block(join)));
        graph.set_edge(catch, EdgeKind::Next, Some(BlockRef::Block(join)));

        let analysis = FlowAnalysis::compute(&graph);
        assert!(reduce_try(&mut graph, &analysis, declaration));
        let block = graph.block(declaration);
        assert_eq!(block.block_type, BlockType::Structured(StructuredType::Try));
        assert_eq!(block.sub1, Some(BlockRef::Block(body)));
        assert_eq!(block.next, Some(BlockRef::Block(join)));
        assert!(block.exception_handlers.last().unwrap().is_finally());
        assert_eq!(graph.block(body).next, Some(BlockRef::END));
        assert_eq!(graph.block(catch).next, Some(BlockRef::END));
        assert_eq!(graph.flow_predecessors(join), [declaration].into_iter().collect());
    }

    #[test]
    fn test_finally_rejoining_is_eclipse_style() {
        let mut graph = ControlFlowGraph::new();
        let declaration = graph.add_block(BlockType::Raw(RawType::TryDeclaration), 0, 0);
        let body = settled(&mut graph, 0);
        let finally = settled(&mut graph, 4);
        let join = graph.add_block(BlockType::Structured(StructuredType::Return), 8, 9);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(declaration)));
        graph.update(declaration, |block| {
            block.next = Some(BlockRef::Block(body));
            block.exception_handlers = vec![handler(None, finally)];
        });
        graph.set_edge(body, EdgeKind::Next, Some(BlockRef::Block(join)));
        graph.set_edge(finally, EdgeKind::Next, Some(BlockRef::Block(join)));

        let analysis = FlowAnalysis::compute(&graph);
        assert!(reduce_try(&mut graph, &analysis, declaration));
        assert_eq!(
            graph.block(declaration).block_type,
            BlockType::Structured(StructuredType::TryEclipse)
        );
    }

    #[test]
    fn test_subroutine_call_in_body_is_try_jsr() {
        // try { jsr fin } finally { throw } join, with `fin` a subroutine ending in `ret`.
        let mut graph = ControlFlowGraph::new();
        let declaration = graph.add_block(BlockType::Raw(RawType::TryDeclaration), 0, 0);
        let call = graph.add_block(BlockType::Structured(StructuredType::Jsr), 0, 3);
        let finally = graph.add_block(BlockType::Structured(StructuredType::Throw), 4, 8);
        let join = graph.add_block(BlockType::Structured(StructuredType::Return), 8, 9);
        let subroutine = graph.add_block(BlockType::Structured(StructuredType::Ret), 10, 12);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(declaration)));
        graph.update(declaration, |block| {
            block.next = Some(BlockRef::Block(call));
            block.exception_handlers = vec![handler(None, finally)];
        });
        graph.update(call, |block| {
            block.branch = Some(BlockRef::Block(subroutine));
            block.next = Some(BlockRef::Block(join));
        });

        let analysis = FlowAnalysis::compute(&graph);
        assert!(reduce_try(&mut graph, &analysis, declaration));
        let block = graph.block(declaration);
        assert_eq!(block.block_type, BlockType::Structured(StructuredType::TryJsr));
        assert_eq!(block.sub1, Some(BlockRef::Block(call)));
        assert_eq!(block.next, Some(BlockRef::Block(join)));
        assert_eq!(graph.block(call).next, Some(BlockRef::END));
        assert_eq!(graph.block(call).branch, Some(BlockRef::Block(subroutine)));
    }

    #[test]
    fn test_unsettled_handler_waits() {
        let mut graph = ControlFlowGraph::new();
        let declaration = graph.add_block(BlockType::Raw(RawType::TryDeclaration), 0, 0);
        let body = settled(&mut graph, 0);
        let catch = graph.add_block(BlockType::Raw(RawType::Statements), 4, 8);
        graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, Some(BlockRef::Block(declaration)));
        graph.update(declaration, |block| {
            block.next = Some(BlockRef::Block(body));
            block.exception_handlers = vec![handler(Some("E"), catch)];
        });
        let analysis = FlowAnalysis::compute(&graph);
        assert!(!reduce_try(&mut graph, &analysis, declaration));
    }
}
