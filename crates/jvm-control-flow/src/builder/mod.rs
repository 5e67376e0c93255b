// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Builds the raw control flow graph of one method.
//!
//! The result holds one block per straight-line run of instructions, split at every branch
//! target and exception range boundary, with raw block types, expression trees, a try
//! declaration per protected range and a synthetic `START` block leading to the entry.

mod exceptions;
mod expressions;

use crate::{
    basic_block::{BlockId, BlockRef, BlockType, EdgeKind, RawType, SwitchCase},
    control_flow_graph::ControlFlowGraph,
    error::MalformedInput,
    options::BuilderOptions,
};
use expressions::ExpressionBuilder;
use jvm_bytecode_model::{
    opcodes, ConstantPool, Instruction, InstructionKind, MethodBody, Operand, RawInstruction,
};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};

/// Builds the raw graph for `body`. The constant pool resolves invocation arities and catch
/// type names; without it, code containing invocations is rejected.
pub fn build_graph(
    body: &MethodBody,
    constants: Option<&dyn ConstantPool>,
    options: &BuilderOptions,
) -> Result<ControlFlowGraph, MalformedInput> {
    validate(body)?;
    let code = &body.code;
    let leaders = find_leaders(body);

    let mut graph = ControlFlowGraph::new();
    let mut block_at: BTreeMap<u32, BlockId> = BTreeMap::new();
    let mut runs: Vec<(BlockId, usize, usize)> = vec![];
    let mut start = 0;
    for (i, insn) in code.iter().enumerate() {
        let ends_run = code
            .get(i + 1)
            .map_or(true, |next| leaders.contains(&next.offset))
            || opcodes::ends_block(insn.opcode);
        if !ends_run {
            continue;
        }
        let to_offset = code.get(i + 1).map_or(body.code_length, |next| next.offset);
        let id = graph.add_block(
            BlockType::Raw(raw_type(insn.opcode)),
            code[start].offset,
            to_offset,
        );
        block_at.insert(code[start].offset, id);
        runs.push((id, start, i + 1));
        start = i + 1;
    }

    // The caught exception is on the stack when a handler starts.
    let mut handler_types: BTreeMap<u32, Option<u16>> = BTreeMap::new();
    for entry in &body.exception_table {
        handler_types.entry(entry.handler).or_insert(entry.catch_type);
    }

    let mut expressions = ExpressionBuilder::new(constants);
    for (id, first, end) in runs {
        let run = &code[first..end];
        let head = &run[0];
        let last = &run[run.len() - 1];
        let entry = handler_types.get(&head.offset).map(|class_index| {
            Instruction::new(
                head.opcode,
                head.offset,
                head.line_number,
                InstructionKind::ExceptionLoad {
                    class_index: *class_index,
                },
            )
        });
        let instructions = expressions.translate_block(run, entry)?;
        let fallthrough = code
            .get(end)
            .and_then(|next| block_at.get(&next.offset))
            .map(|id| BlockRef::Block(*id));
        let edges = successor_edges(last, fallthrough, &block_at)?;
        graph.update(id, |block| {
            block.instructions = instructions;
            block.first_line_number = run.iter().find_map(|insn| insn.line_number);
            block.last_line_number = run.iter().rev().find_map(|insn| insn.line_number);
            block.next = edges.next;
            block.branch = edges.branch;
            block.switch_cases = edges.cases;
        });
    }

    let entry = block_at
        .get(&code[0].offset)
        .map(|id| BlockRef::Block(*id));
    graph.set_edge(ControlFlowGraph::START, EdgeKind::Next, entry);

    let ranges = exceptions::normalise(&body.exception_table, options);
    exceptions::insert_try_declarations(&mut graph, &ranges, &block_at, constants)?;

    remove_dead_code(&mut graph);
    debug!("[build_graph] built {} blocks", graph.len());
    Ok(graph)
}

/// Checks the structural requirements the rest of the builder relies on.
fn validate(body: &MethodBody) -> Result<(), MalformedInput> {
    let code = &body.code;
    let last = code.last().ok_or(MalformedInput::EmptyCode)?;
    let mut offsets = BTreeSet::new();
    let mut previous: Option<u32> = None;
    for insn in code {
        if previous.map_or(false, |p| insn.offset <= p) {
            return Err(MalformedInput::UnorderedOffsets {
                offset: insn.offset,
            });
        }
        if insn.offset >= body.code_length {
            return Err(MalformedInput::OffsetOutOfRange {
                offset: insn.offset,
                code_length: body.code_length,
            });
        }
        offsets.insert(insn.offset);
        previous = Some(insn.offset);
    }
    for insn in code {
        let op = insn.opcode;
        let has_branch = matches!(insn.operand, Operand::Branch(_));
        let has_switch = matches!(insn.operand, Operand::Switch { .. });
        if (opcodes::is_conditional_branch(op) || opcodes::is_goto(op) || opcodes::is_jsr(op))
            && !has_branch
        {
            return Err(MalformedInput::MissingOperand {
                offset: insn.offset,
                expected: "branch target",
            });
        }
        if opcodes::is_switch(op) && !has_switch {
            return Err(MalformedInput::MissingOperand {
                offset: insn.offset,
                expected: "switch table",
            });
        }
        if let Some(target) = insn
            .jump_targets()
            .into_iter()
            .find(|target| !offsets.contains(target))
        {
            return Err(MalformedInput::DanglingBranch {
                offset: insn.offset,
                target,
            });
        }
    }
    if !opcodes::ends_flow(last.opcode) {
        return Err(MalformedInput::FallsOffEnd {
            offset: last.offset,
        });
    }
    for entry in &body.exception_table {
        let end_ok = offsets.contains(&entry.end) || entry.end == body.code_length;
        if entry.start >= entry.end || !offsets.contains(&entry.start) || !end_ok {
            return Err(MalformedInput::InvalidExceptionRange {
                start: entry.start,
                end: entry.end,
            });
        }
        if !offsets.contains(&entry.handler) {
            return Err(MalformedInput::DanglingHandler {
                handler: entry.handler,
            });
        }
    }
    Ok(())
}

fn find_leaders(body: &MethodBody) -> BTreeSet<u32> {
    let code = &body.code;
    let mut leaders: BTreeSet<u32> = code.first().map(|insn| insn.offset).into_iter().collect();
    for (i, insn) in code.iter().enumerate() {
        leaders.extend(insn.jump_targets());
        if opcodes::ends_block(insn.opcode) {
            if let Some(next) = code.get(i + 1) {
                leaders.insert(next.offset);
            }
        }
    }
    for entry in &body.exception_table {
        leaders.insert(entry.start);
        leaders.insert(entry.handler);
        if entry.end < body.code_length {
            leaders.insert(entry.end);
        }
    }
    leaders
}

fn raw_type(last_opcode: u16) -> RawType {
    match last_opcode {
        op if opcodes::is_conditional_branch(op) => RawType::ConditionalBranch,
        op if opcodes::is_goto(op) => RawType::Goto,
        op if opcodes::is_jsr(op) => RawType::Jsr,
        op if opcodes::is_switch(op) => RawType::SwitchDeclaration,
        opcodes::RET => RawType::Ret,
        opcodes::RETURN => RawType::Return,
        op if opcodes::is_return(op) => RawType::ReturnValue,
        opcodes::ATHROW => RawType::Throw,
        _ => RawType::Statements,
    }
}

#[derive(Default)]
struct SuccessorEdges {
    next: Option<BlockRef>,
    branch: Option<BlockRef>,
    cases: Vec<SwitchCase>,
}

/// The outgoing edges of a block ending in `last`.
fn successor_edges(
    last: &RawInstruction,
    fallthrough: Option<BlockRef>,
    block_at: &BTreeMap<u32, BlockId>,
) -> Result<SuccessorEdges, MalformedInput> {
    let block = |target: u32| {
        block_at
            .get(&target)
            .map(|id| BlockRef::Block(*id))
            .ok_or(MalformedInput::DanglingBranch {
                offset: last.offset,
                target,
            })
    };
    let mut edges = SuccessorEdges::default();
    match (raw_type(last.opcode), &last.operand) {
        (RawType::Goto, Operand::Branch(target)) => edges.next = Some(block(*target)?),
        (RawType::ConditionalBranch | RawType::Jsr, Operand::Branch(target)) => {
            edges.next = fallthrough;
            edges.branch = Some(block(*target)?);
        }
        (RawType::SwitchDeclaration, Operand::Switch { default, cases }) => {
            for (value, target) in cases {
                edges.cases.push(SwitchCase {
                    value: *value,
                    is_default: false,
                    target: block(*target)?,
                });
            }
            edges.cases.push(SwitchCase {
                value: 0,
                is_default: true,
                target: block(*default)?,
            });
        }
        (RawType::Statements, _) => edges.next = fallthrough,
        _ => {}
    }
    Ok(edges)
}

/// Detaches blocks that cannot be reached from the entry, so they never count as
/// predecessors.
fn remove_dead_code(graph: &mut ControlFlowGraph) {
    let reachable = graph.reachable();
    for id in 1..graph.len() {
        if !reachable.contains(&id) && !graph.block(id).targets().is_empty() {
            warn!("[remove_dead_code] block {} is unreachable", id);
            graph.detach(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jvm_bytecode_model::{opcodes::*, ExceptionTableEntry};

    fn raw(offset: u32, opcode: u16, operand: Operand) -> RawInstruction {
        RawInstruction::new(offset, opcode, operand)
    }

    fn build(body: &MethodBody) -> Result<ControlFlowGraph, MalformedInput> {
        build_graph(body, None, &BuilderOptions::default())
    }

    #[test]
    fn test_diamond_produces_four_blocks() {
        // if (local1 == 0) local2 = 1; else local2 = 2; return;
        let body = MethodBody::new(
            vec![
                raw(0, ILOAD_1, Operand::None),
                raw(1, IFNE, Operand::Branch(9)),
                raw(4, ICONST_1, Operand::None),
                raw(5, ISTORE_2, Operand::None),
                raw(6, GOTO, Operand::Branch(11)),
                raw(9, ICONST_2, Operand::None),
                raw(10, ISTORE_2, Operand::None),
                raw(11, RETURN, Operand::None),
            ],
            12,
        );
        let graph = build(&body).unwrap();
        assert_eq!(graph.len(), 5);
        let entry = graph.block(1);
        assert_eq!(entry.block_type, BlockType::Raw(RawType::ConditionalBranch));
        assert_eq!(entry.next, Some(BlockRef::Block(2)));
        assert_eq!(entry.branch, Some(BlockRef::Block(3)));
        assert_eq!(graph.block(2).block_type, BlockType::Raw(RawType::Goto));
        assert_eq!(graph.block(2).next, Some(BlockRef::Block(4)));
        assert_eq!(graph.block(4).predecessors, [2, 3].into_iter().collect());
        assert_eq!((graph.block(3).from_offset, graph.block(3).to_offset), (9, 11));
    }

    #[test]
    fn test_try_declaration_takes_over_entry() {
        let mut body = MethodBody::new(
            vec![
                raw(0, ICONST_0, Operand::None),
                raw(1, ISTORE_1, Operand::None),
                raw(2, RETURN, Operand::None),
                raw(3, ASTORE_2, Operand::None),
                raw(4, RETURN, Operand::None),
            ],
            5,
        );
        body.exception_table.push(ExceptionTableEntry {
            start: 0,
            end: 3,
            handler: 3,
            catch_type: None,
        });
        let graph = build(&body).unwrap();
        let declaration = graph
            .blocks()
            .iter()
            .find(|b| b.block_type == BlockType::Raw(RawType::TryDeclaration))
            .unwrap();
        assert_eq!(
            graph.block(ControlFlowGraph::START).next,
            Some(BlockRef::Block(declaration.index))
        );
        assert_eq!(declaration.exception_handlers.len(), 1);
        assert!(declaration.exception_handlers[0].is_finally());
        let handler = declaration.exception_handlers[0].handler.block().unwrap();
        assert!(matches!(
            &graph.block(handler).instructions[0].kind,
            InstructionKind::Store { value, .. }
                if matches!(value.kind, InstructionKind::ExceptionLoad { class_index: None })
        ));
    }

    #[test]
    fn test_malformed_inputs_are_rejected() {
        assert_eq!(build(&MethodBody::default()).unwrap_err(), MalformedInput::EmptyCode);

        let dangling = MethodBody::new(
            vec![raw(0, GOTO, Operand::Branch(7)), raw(3, RETURN, Operand::None)],
            4,
        );
        assert_eq!(
            build(&dangling).unwrap_err(),
            MalformedInput::DanglingBranch { offset: 0, target: 7 }
        );

        let falls_off = MethodBody::new(vec![raw(0, ICONST_0, Operand::None)], 1);
        assert_eq!(
            build(&falls_off).unwrap_err(),
            MalformedInput::FallsOffEnd { offset: 0 }
        );

        let mut bad_range = MethodBody::new(vec![raw(0, RETURN, Operand::None)], 1);
        bad_range.exception_table.push(ExceptionTableEntry {
            start: 0,
            end: 0,
            handler: 0,
            catch_type: None,
        });
        assert_eq!(
            build(&bad_range).unwrap_err(),
            MalformedInput::InvalidExceptionRange { start: 0, end: 0 }
        );
    }

    #[test]
    fn test_unreachable_code_is_detached() {
        let body = MethodBody::new(
            vec![
                raw(0, RETURN, Operand::None),
                raw(1, ICONST_0, Operand::None),
                raw(2, IFEQ, Operand::Branch(0)),
                raw(5, RETURN, Operand::None),
            ],
            6,
        );
        let graph = build(&body).unwrap();
        assert_eq!(
            graph.block(1).predecessors,
            [ControlFlowGraph::START].into_iter().collect()
        );
        assert!(graph.block(2).targets().is_empty());
    }
}
