// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Error types.
//!
//! Inference gaps are not errors (see `Instruction::inferred_type`) and structuring stalls are
//! resolved by emitting literal gotos. What remains is bad input and internal bugs.

use crate::basic_block::BlockId;
use thiserror::Error;

/// Bytecode that cannot be turned into a control flow graph. Reported for one method only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedInput {
    #[error("method has no code")]
    EmptyCode,

    #[error("instruction offsets are not strictly increasing at {offset}")]
    UnorderedOffsets { offset: u32 },

    #[error("instruction at {offset} lies outside the code length {code_length}")]
    OffsetOutOfRange { offset: u32, code_length: u32 },

    #[error("branch at {offset} targets {target}, which is not an instruction boundary")]
    DanglingBranch { offset: u32, target: u32 },

    #[error("control falls off the end of the code after {offset}")]
    FallsOffEnd { offset: u32 },

    #[error("exception range {start}..{end} is not a valid instruction range")]
    InvalidExceptionRange { start: u32, end: u32 },

    #[error("exception handler {handler} is not an instruction boundary")]
    DanglingHandler { handler: u32 },

    #[error("instruction at {offset} refers to constant #{index}, which cannot be resolved")]
    UnresolvedConstant { offset: u32, index: u16 },

    #[error("unsupported opcode {opcode} at {offset}")]
    UnsupportedOpcode { offset: u32, opcode: u16 },

    #[error("instruction at {offset} lacks its {expected} operand")]
    MissingOperand {
        offset: u32,
        expected: &'static str,
    },
}

/// A broken graph invariant. Always an implementation bug, never a property of the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("block {from} has an edge to block {to}, which does not exist")]
    DanglingEdge { from: BlockId, to: BlockId },

    #[error("block {from} has an edge to block {to}, but is not among its predecessors")]
    PredecessorMissing { from: BlockId, to: BlockId },

    #[error("block {block} lists {predecessor} as a predecessor without an edge from it")]
    StalePredecessor {
        block: BlockId,
        predecessor: BlockId,
    },

    #[error("the start block has predecessor {predecessor}")]
    StartHasPredecessor { predecessor: BlockId },

    #[error("block {block} of type {block_type} lacks its {child} child")]
    MissingChild {
        block: BlockId,
        block_type: &'static str,
        child: &'static str,
    },

    #[error("block {block} of type {block_type} is still reachable after structuring")]
    Unstructured {
        block: BlockId,
        block_type: &'static str,
    },

    #[error("block {block} is entered from {predecessors:?} without a goto")]
    SharedEntry {
        block: BlockId,
        predecessors: Vec<BlockId>,
    },

    #[error("block {block} continues into itself through {cycle:?}")]
    EntryCycle { block: BlockId, cycle: Vec<BlockId> },
}

/// Why a method could not be structured.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuringError {
    #[error("malformed input: {0}")]
    Malformed(#[from] MalformedInput),

    #[error("internal error: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error(
        "rule `{rule}` made no progress (pending, back edges, shared entries) {before:?} -> {after:?}"
    )]
    NoProgress {
        rule: &'static str,
        before: (usize, usize, usize),
        after: (usize, usize, usize),
    },

    #[error("structuring did not finish within {limit} rounds")]
    RoundLimit { limit: usize },
}

/// A listing that cannot be assembled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListingError {
    #[error("line {line}: cannot parse `{text}`")]
    Syntax { line: usize, text: String },

    #[error("line {line}: unknown mnemonic `{mnemonic}`")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("line {line}: invalid operand `{operand}` for `{mnemonic}`")]
    InvalidOperand {
        line: usize,
        mnemonic: String,
        operand: String,
    },

    #[error("line {line}: unknown directive `{directive}`")]
    UnknownDirective { line: usize, directive: String },

    #[error("listing contains no instructions")]
    Empty,
}
