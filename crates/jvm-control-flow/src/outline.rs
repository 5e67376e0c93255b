// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! An indented text rendering of a block graph, for tests and logs.
//!
//! ```text
//! START
//!   #7 IF_ELSE 0..14
//!     condition:
//!       #1 CONDITION 1..4 not
//!     then:
//!       #2 STATEMENTS 4..10
//!       -> END
//!     else:
//!       #3 STATEMENTS 10..13
//!       -> END
//!   #4 RETURN 14..15
//! ```

use crate::{
    basic_block::{BasicBlock, BlockId, BlockRef, BlockType, StructuredType, SYNTHETIC_OFFSET},
    control_flow_graph::ControlFlowGraph,
};
use std::{collections::BTreeSet, fmt::Write};

const INDENT: &str = "  ";

pub fn outline(graph: &ControlFlowGraph) -> String {
    let mut renderer = Renderer {
        graph,
        visited: BTreeSet::from([ControlFlowGraph::START]),
        out: String::new(),
    };
    renderer.line(0, "START");
    renderer.chain(graph.block(ControlFlowGraph::START).next, 1);
    renderer.out
}

struct Renderer<'a> {
    graph: &'a ControlFlowGraph,
    visited: BTreeSet<BlockId>,
    out: String,
}

impl Renderer<'_> {
    fn line(&mut self, depth: usize, text: &str) {
        let _ = writeln!(self.out, "{}{}", INDENT.repeat(depth), text);
    }

    /// Renders `start` and the blocks following it through `next`. A block already rendered
    /// elsewhere shows as a jump to it.
    fn chain(&mut self, start: Option<BlockRef>, depth: usize) {
        let mut cursor = start;
        while let Some(target) = cursor {
            let id = match target {
                BlockRef::Virtual(target) => {
                    self.line(depth, &format!("-> {}", target.name()));
                    return;
                }
                BlockRef::Block(id) => id,
            };
            if !self.visited.insert(id) {
                self.line(depth, &format!("-> #{}", id));
                return;
            }
            let block = self.graph.block(id);
            self.line(depth, &header(block));
            for (label, child) in children(block) {
                self.line(depth + 1, &format!("{}:", label));
                self.chain(Some(child), depth + 2);
            }
            cursor = block.next;
        }
    }
}

fn header(block: &BasicBlock) -> String {
    let mut text = format!("#{} {}", block.index, block.block_type);
    if block.from_offset != SYNTHETIC_OFFSET {
        let _ = write!(text, " {}..{}", block.from_offset, block.to_offset);
    }
    if block.block_type.is_condition() && block.inverse_condition {
        text.push_str(" not");
    }
    if block.block_type.is_goto() {
        if let Some(target) = block.branch {
            let _ = write!(text, " -> {}", target);
        }
    }
    text
}

/// The nested edges of a block with their labels, in rendering order.
fn children(block: &BasicBlock) -> Vec<(String, BlockRef)> {
    use StructuredType::*;
    let mut result: Vec<(String, BlockRef)> = vec![];
    let mut push = |label: &str, target: Option<BlockRef>| {
        if let Some(target) = target {
            result.push((label.to_string(), target));
        }
    };
    match block.block_type {
        BlockType::Structured(If | IfElse | TernaryOperator | ConditionTernaryOperator) => {
            push("condition", block.condition);
            push("then", block.sub1);
            push("else", block.sub2);
        }
        BlockType::Structured(ConditionOr | ConditionAnd) => {
            push("left", block.sub1);
            push("right", block.sub2);
        }
        BlockType::Structured(Loop) => push("body", block.sub1),
        BlockType::Structured(Jsr) => push("subroutine", block.branch),
        BlockType::Structured(Try | TryJsr | TryEclipse) => push("try", block.sub1),
        BlockType::Raw(_) => push("branch", block.branch),
        _ => {}
    }
    for case in &block.switch_cases {
        let label = if case.is_default {
            "default".to_string()
        } else {
            format!("case {}", case.value)
        };
        result.push((label, case.target));
    }
    for handler in &block.exception_handlers {
        let label = match &handler.throwable_name {
            None => "finally".to_string(),
            Some(name) => std::iter::once(name.as_str())
                .chain(handler.other_throwable_names.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" | "),
        };
        let label = if handler.is_finally() {
            label
        } else {
            format!("catch {}", label)
        };
        result.push((label, handler.handler));
    }
    result
}
