// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

use crate::{
    basic_block::{BlockId, BlockRef, BlockType, RawType, VirtualTarget},
    control_flow_graph::ControlFlowGraph,
    error::StructuringError,
    invariants::{verify_graph, verify_structured},
    options::Options,
};
use jvm_bytecode_model::InstructionKind;
use log::{debug, warn};

use super::{branches, conditions, dominance::FlowAnalysis, escape, jumps, loops, switches, tries};

/// A rewrite of the graph around one block. Returns whether it applied.
type Rule = fn(&mut ControlFlowGraph, &FlowAnalysis, BlockId) -> bool;

/// Rules in priority order. After any rule applies, matching restarts from the first one.
const RULES: [(&str, Rule); 9] = [
    ("goto", jumps::reduce_goto),
    ("leaf", jumps::promote_leaf),
    ("condition-ternary", conditions::reduce_condition_ternary),
    ("and-or", conditions::reduce_and_or),
    ("loop", loops::reduce_loop),
    ("if", branches::reduce_if),
    ("switch", switches::reduce_switch),
    ("try", tries::reduce_try),
    ("jsr", jumps::reduce_jsr),
];

/// Applied only when no rule matches. Conditions are escaped from the last block backwards so
/// that inner jumps turn into gotos before the ones around them. Shared entries are only
/// escaped once no block is pending.
const ESCAPES: [(&str, Rule, bool); 5] = [
    ("escape-condition", escape::escape_condition, true),
    ("escape-switch", escape::escape_switch, false),
    ("escape-try", escape::escape_try, false),
    ("escape-jsr", escape::escape_jsr, false),
    ("escape-shared-entry", escape::escape_shared_entry, false),
];

/// What a structuring run did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StructuringReport {
    /// Number of rewrites, escapes included.
    pub rewrites: usize,
    /// Number of rewrites that kept a jump as a literal goto.
    pub escapes: usize,
    /// Names of the applied rules, in order.
    pub applied: Vec<&'static str>,
}

/// The structurer's termination measure, compared lexicographically. Every rewrite must
/// decrease it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Progress {
    pending: usize,
    back_edges: usize,
    /// Blocks entered through more than one non-goto edge, or closing a cycle of such edges.
    shared_entries: usize,
}

impl Progress {
    fn measure(graph: &ControlFlowGraph, analysis: &FlowAnalysis) -> Self {
        let reachable = analysis.reachable();
        Progress {
            pending: reachable
                .iter()
                .filter(|id| graph.block(**id).is_pending())
                .count(),
            back_edges: analysis.back_edges().len(),
            shared_entries: reachable
                .iter()
                .filter(|id| {
                    graph.entering_predecessors(**id).len() > 1
                        || graph.entry_cycle(**id).is_some()
                })
                .count(),
        }
    }

    fn is_done(self) -> bool {
        self.pending == 0 && self.back_edges == 0 && self.shared_entries == 0
    }

    fn triple(self) -> (usize, usize, usize) {
        (self.pending, self.back_edges, self.shared_entries)
    }
}

/// Rewrites `graph` until every reachable block is structured.
///
/// Fails when a rewrite does not bring the graph closer to that goal, or after too many
/// rounds; both point at a bug in a rule rather than at the input.
pub fn structure_graph(
    graph: &mut ControlFlowGraph,
    options: &Options,
) -> Result<StructuringReport, StructuringError> {
    split_conditions(graph);
    if options.return_sentinel {
        share_returns(graph);
    }
    if options.verify_each_step {
        verify_graph(graph)?;
    }

    let limit = options
        .round_limit_factor
        .saturating_mul(graph.len())
        .saturating_add(16);
    let mut report = StructuringReport::default();
    let mut analysis = FlowAnalysis::compute(graph);
    loop {
        let before = Progress::measure(graph, &analysis);
        if before.is_done() {
            break;
        }
        if report.rewrites >= limit {
            return Err(StructuringError::RoundLimit { limit });
        }
        let rule = match apply_first(graph, &analysis, &RULES) {
            Some(rule) => rule,
            None => {
                let Some(rule) = apply_escape(graph, &analysis) else {
                    return Err(StructuringError::NoProgress {
                        rule: "escape",
                        before: before.triple(),
                        after: before.triple(),
                    });
                };
                report.escapes += 1;
                rule
            }
        };
        report.rewrites += 1;
        report.applied.push(rule);
        if options.verify_each_step {
            verify_graph(graph)?;
        }
        analysis = FlowAnalysis::compute(graph);
        let after = Progress::measure(graph, &analysis);
        debug!(
            "[structure_graph] `{}` took the graph from {:?} to {:?}",
            rule,
            before.triple(),
            after.triple()
        );
        if after >= before {
            return Err(StructuringError::NoProgress {
                rule,
                before: before.triple(),
                after: after.triple(),
            });
        }
    }
    verify_structured(graph)?;
    debug!(
        "[structure_graph] done after {} rewrites ({} escapes)",
        report.rewrites, report.escapes
    );
    Ok(report)
}

fn apply_first(
    graph: &mut ControlFlowGraph,
    analysis: &FlowAnalysis,
    rules: &[(&'static str, Rule)],
) -> Option<&'static str> {
    let blocks: Vec<BlockId> = analysis.reachable().iter().copied().collect();
    for (name, rule) in rules {
        for id in &blocks {
            if rule(graph, analysis, *id) {
                debug!("[apply_first] `{}` rewrote block {}", name, id);
                return Some(*name);
            }
        }
    }
    None
}

fn apply_escape(graph: &mut ControlFlowGraph, analysis: &FlowAnalysis) -> Option<&'static str> {
    for (name, rule, descending) in ESCAPES {
        let mut blocks: Vec<BlockId> = analysis.reachable().iter().copied().collect();
        if descending {
            blocks.reverse();
        }
        for id in blocks {
            if rule(graph, analysis, id) {
                warn!("[apply_escape] `{}` rewrote block {}", name, id);
                return Some(name);
            }
        }
    }
    None
}

/// Moves the statements in front of a branch into a block of their own, so that every raw
/// condition holds just its test.
fn split_conditions(graph: &mut ControlFlowGraph) {
    for id in graph.reachable() {
        let block = graph.block(id);
        if block.block_type != BlockType::Raw(RawType::ConditionalBranch)
            || block.instructions.len() <= 1
        {
            continue;
        }
        let mut head = block.instructions.clone();
        let Some(test) = head.pop() else {
            continue;
        };
        let (from, test_offset) = (block.from_offset, test.offset);
        let first_line = block.first_line_number;
        let test_line = test.line_number.or(block.last_line_number);
        let statements = graph.add_block(BlockType::Raw(RawType::Statements), from, test_offset);
        graph.redirect(id, BlockRef::Block(statements));
        graph.update(statements, |block| {
            block.first_line_number = first_line;
            block.last_line_number = head.iter().rev().find_map(|insn| insn.line_number);
            block.instructions = head;
            block.next = Some(BlockRef::Block(id));
        });
        graph.update(id, |block| {
            block.from_offset = test_offset;
            block.first_line_number = test_line;
            block.instructions = vec![test];
        });
        debug!(
            "[split_conditions] statements of block {} moved to {}",
            id, statements
        );
    }
}

/// Shared empty `return` blocks become the `RETURN` virtual target.
fn share_returns(graph: &mut ControlFlowGraph) {
    for id in graph.reachable() {
        let block = graph.block(id);
        let only_return = block
            .instructions
            .iter()
            .all(|insn| matches!(insn.kind, InstructionKind::Return));
        if block.block_type == BlockType::Raw(RawType::Return)
            && only_return
            && graph.flow_predecessors(id).len() >= 2
        {
            debug!("[share_returns] block {} becomes {}", id, VirtualTarget::Return.name());
            graph.redirect(id, BlockRef::Virtual(VirtualTarget::Return));
            graph.detach(id);
        }
    }
}
