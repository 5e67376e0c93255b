// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Basic blocks and the edges between them.
//!
//! A block starts out with a raw type assigned by the builder and is retyped in place as the
//! structurer collapses patterns. Implicit control transfers (falling off a nested body, loop
//! back-edges, `break`, `continue`) are not blocks: edges name them through [`VirtualTarget`].

use jvm_bytecode_model::Instruction;
use std::{collections::BTreeSet, fmt};

pub type BlockId = usize;

/// Offset used by synthetic blocks that do not cover real code.
pub const SYNTHETIC_OFFSET: u32 = u32::MAX;

/// A control transfer that does not lead to a block of its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VirtualTarget {
    /// The end of a nested body: control continues after the enclosing construct.
    End,
    /// An implicit `return` from a void method.
    Return,
    /// The natural end of a loop body, going back to the loop header.
    LoopStart,
    /// An explicit `continue` of the innermost loop.
    LoopContinue,
    /// A `break` out of the innermost loop.
    LoopEnd,
    /// A `break` out of the innermost switch.
    SwitchBreak,
}

impl VirtualTarget {
    pub fn name(self) -> &'static str {
        match self {
            VirtualTarget::End => "END",
            VirtualTarget::Return => "RETURN",
            VirtualTarget::LoopStart => "LOOP_START",
            VirtualTarget::LoopContinue => "LOOP_CONTINUE",
            VirtualTarget::LoopEnd => "LOOP_END",
            VirtualTarget::SwitchBreak => "SWITCH_BREAK",
        }
    }
}

/// The target of an edge: a real block or a virtual target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlockRef {
    Block(BlockId),
    Virtual(VirtualTarget),
}

impl BlockRef {
    pub const END: BlockRef = BlockRef::Virtual(VirtualTarget::End);

    pub fn block(self) -> Option<BlockId> {
        match self {
            BlockRef::Block(id) => Some(id),
            BlockRef::Virtual(_) => None,
        }
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockRef::Block(id) => write!(f, "#{}", id),
            BlockRef::Virtual(target) => f.write_str(target.name()),
        }
    }
}

/// Block types assigned by the CFG builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RawType {
    Statements,
    ConditionalBranch,
    SwitchDeclaration,
    TryDeclaration,
    Jsr,
    Ret,
    Goto,
    Return,
    ReturnValue,
    Throw,
    /// An artificial edge with no code of its own.
    Jump,
}

/// Block types produced by the structurer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StructuredType {
    Statements,
    Return,
    ReturnValue,
    Throw,
    Ret,
    Jsr,
    If,
    IfElse,
    Loop,
    Switch,
    Try,
    TryJsr,
    TryEclipse,
    Condition,
    ConditionOr,
    ConditionAnd,
    ConditionTernaryOperator,
    TernaryOperator,
    GotoInTernaryOperator,
    InfiniteGoto,
    Goto,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockType {
    Start,
    Raw(RawType),
    Structured(StructuredType),
}

impl BlockType {
    pub fn name(self) -> &'static str {
        match self {
            BlockType::Start => "START",
            BlockType::Raw(raw) => match raw {
                RawType::Statements => "STATEMENTS",
                RawType::ConditionalBranch => "CONDITIONAL_BRANCH",
                RawType::SwitchDeclaration => "SWITCH_DECLARATION",
                RawType::TryDeclaration => "TRY_DECLARATION",
                RawType::Jsr => "JSR",
                RawType::Ret => "RET",
                RawType::Goto => "GOTO",
                RawType::Return => "RETURN",
                RawType::ReturnValue => "RETURN_VALUE",
                RawType::Throw => "THROW",
                RawType::Jump => "JUMP",
            },
            BlockType::Structured(structured) => match structured {
                StructuredType::Statements => "STATEMENTS",
                StructuredType::Return => "RETURN",
                StructuredType::ReturnValue => "RETURN_VALUE",
                StructuredType::Throw => "THROW",
                StructuredType::Ret => "RET",
                StructuredType::Jsr => "JSR",
                StructuredType::If => "IF",
                StructuredType::IfElse => "IF_ELSE",
                StructuredType::Loop => "LOOP",
                StructuredType::Switch => "SWITCH",
                StructuredType::Try => "TRY",
                StructuredType::TryJsr => "TRY_JSR",
                StructuredType::TryEclipse => "TRY_ECLIPSE",
                StructuredType::Condition => "CONDITION",
                StructuredType::ConditionOr => "CONDITION_OR",
                StructuredType::ConditionAnd => "CONDITION_AND",
                StructuredType::ConditionTernaryOperator => "CONDITION_TERNARY_OPERATOR",
                StructuredType::TernaryOperator => "TERNARY_OPERATOR",
                StructuredType::GotoInTernaryOperator => "GOTO_IN_TERNARY_OPERATOR",
                StructuredType::InfiniteGoto => "INFINITE_GOTO",
                StructuredType::Goto => "GOTO",
            },
        }
    }

    pub fn is_raw(self) -> bool {
        matches!(self, BlockType::Raw(_))
    }

    /// Types whose block is a boolean test (possibly composite).
    pub fn is_condition(self) -> bool {
        matches!(
            self,
            BlockType::Raw(RawType::ConditionalBranch)
                | BlockType::Structured(
                    StructuredType::Condition
                        | StructuredType::ConditionOr
                        | StructuredType::ConditionAnd
                        | StructuredType::ConditionTernaryOperator
                )
        )
    }

    /// Literal jumps kept in the structured output.
    pub fn is_goto(self) -> bool {
        matches!(
            self,
            BlockType::Structured(
                StructuredType::Goto
                    | StructuredType::InfiniteGoto
                    | StructuredType::GotoInTernaryOperator
            )
        )
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockType::Raw(_) => write!(f, "raw {}", self.name()),
            _ => f.write_str(self.name()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwitchCase {
    pub value: i32,
    pub is_default: bool,
    pub target: BlockRef,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Internal name of the caught class; `None` marks a `finally` handler.
    pub throwable_name: Option<String>,
    /// Further classes of a multi-catch handler.
    pub other_throwable_names: Vec<String>,
    pub handler: BlockRef,
}

impl ExceptionHandler {
    pub fn is_finally(&self) -> bool {
        self.throwable_name.is_none()
    }
}

/// Identifies one outgoing edge of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    Next,
    Branch,
    Condition,
    Sub1,
    Sub2,
    Case(usize),
    Handler(usize),
}

#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub index: BlockId,
    pub block_type: BlockType,
    pub from_offset: u32,
    /// Exclusive end of the covered code range.
    pub to_offset: u32,
    pub first_line_number: Option<u32>,
    pub last_line_number: Option<u32>,
    /// The continuation; `None` when control never continues (return, throw, endless loop).
    pub next: Option<BlockRef>,
    /// The alternate target of a branch, or the target of a literal goto.
    pub branch: Option<BlockRef>,
    pub condition: Option<BlockRef>,
    pub sub1: Option<BlockRef>,
    pub sub2: Option<BlockRef>,
    pub switch_cases: Vec<SwitchCase>,
    pub exception_handlers: Vec<ExceptionHandler>,
    /// Blocks with at least one edge (of any kind) to this block.
    pub predecessors: BTreeSet<BlockId>,
    /// Negates the test of a condition block.
    pub inverse_condition: bool,
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn new(index: BlockId, block_type: BlockType, from_offset: u32, to_offset: u32) -> Self {
        Self {
            index,
            block_type,
            from_offset,
            to_offset,
            first_line_number: None,
            last_line_number: None,
            next: None,
            branch: None,
            condition: None,
            sub1: None,
            sub2: None,
            switch_cases: vec![],
            exception_handlers: vec![],
            predecessors: BTreeSet::new(),
            inverse_condition: false,
            instructions: vec![],
        }
    }

    /// Every outgoing edge, in a fixed order.
    pub fn edges(&self) -> Vec<(EdgeKind, BlockRef)> {
        let single = [
            (EdgeKind::Next, self.next),
            (EdgeKind::Branch, self.branch),
            (EdgeKind::Condition, self.condition),
            (EdgeKind::Sub1, self.sub1),
            (EdgeKind::Sub2, self.sub2),
        ];
        single
            .into_iter()
            .filter_map(|(kind, target)| target.map(|t| (kind, t)))
            .chain(
                self.switch_cases
                    .iter()
                    .enumerate()
                    .map(|(i, case)| (EdgeKind::Case(i), case.target)),
            )
            .chain(
                self.exception_handlers
                    .iter()
                    .enumerate()
                    .map(|(i, handler)| (EdgeKind::Handler(i), handler.handler)),
            )
            .collect()
    }

    /// The edges along which control leaves this block at its own nesting level. Children of
    /// structured blocks are not flow edges.
    pub fn flow_edges(&self) -> Vec<(EdgeKind, BlockRef)> {
        match self.block_type {
            BlockType::Raw(_) => self
                .edges()
                .into_iter()
                .filter(|(kind, _)| {
                    matches!(
                        kind,
                        EdgeKind::Next | EdgeKind::Branch | EdgeKind::Case(_) | EdgeKind::Handler(_)
                    )
                })
                .collect(),
            _ if self.is_open_condition() || self.block_type.is_goto() => self
                .edges()
                .into_iter()
                .filter(|(kind, _)| matches!(kind, EdgeKind::Next | EdgeKind::Branch))
                .collect(),
            _ => self.next.map(|next| (EdgeKind::Next, next)).into_iter().collect(),
        }
    }

    pub fn edge(&self, kind: EdgeKind) -> Option<BlockRef> {
        match kind {
            EdgeKind::Next => self.next,
            EdgeKind::Branch => self.branch,
            EdgeKind::Condition => self.condition,
            EdgeKind::Sub1 => self.sub1,
            EdgeKind::Sub2 => self.sub2,
            EdgeKind::Case(i) => self.switch_cases.get(i).map(|case| case.target),
            EdgeKind::Handler(i) => self.exception_handlers.get(i).map(|h| h.handler),
        }
    }

    /// Points the edge `kind` at `target`. Case and handler edges always have a target, so
    /// `None` leaves them unchanged.
    pub fn set_edge(&mut self, kind: EdgeKind, target: Option<BlockRef>) {
        match kind {
            EdgeKind::Next => self.next = target,
            EdgeKind::Branch => self.branch = target,
            EdgeKind::Condition => self.condition = target,
            EdgeKind::Sub1 => self.sub1 = target,
            EdgeKind::Sub2 => self.sub2 = target,
            EdgeKind::Case(i) => {
                if let (Some(case), Some(target)) = (self.switch_cases.get_mut(i), target) {
                    case.target = target;
                }
            }
            EdgeKind::Handler(i) => {
                if let (Some(handler), Some(target)) = (self.exception_handlers.get_mut(i), target)
                {
                    handler.handler = target;
                }
            }
        }
    }

    /// Replaces every edge to `old` by an edge to `new`. Returns whether anything changed.
    pub fn replace_target(&mut self, old: BlockRef, new: BlockRef) -> bool {
        let mut changed = false;
        for (kind, target) in self.edges() {
            if target == old {
                self.set_edge(kind, Some(new));
                changed = true;
            }
        }
        changed
    }

    /// The real blocks this block has an edge to.
    pub fn targets(&self) -> BTreeSet<BlockId> {
        self.edges()
            .into_iter()
            .filter_map(|(_, target)| target.block())
            .collect()
    }

    /// A condition that still decides between two flow successors.
    pub fn is_open_condition(&self) -> bool {
        self.block_type.is_condition() && self.branch.is_some()
    }

    /// Blocks the structurer still has to reduce.
    pub fn is_pending(&self) -> bool {
        self.block_type.is_raw() || self.is_open_condition()
    }

    /// Blocks that are fully structured and may be absorbed into an enclosing construct.
    pub fn is_settled(&self) -> bool {
        matches!(self.block_type, BlockType::Structured(_)) && !self.is_open_condition()
    }

    /// Whether the block hands a value to its successor on the operand stack, i.e. it is part
    /// of an expression that continues past the end of the block.
    pub fn leaves_value(&self) -> bool {
        if self.block_type == BlockType::Structured(StructuredType::TernaryOperator) {
            return true;
        }
        self.instructions
            .iter()
            .rev()
            .find(|insn| !insn.is_terminator())
            .map_or(false, |insn| insn.leaves_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_edges_depend_on_type() {
        let mut block = BasicBlock::new(3, BlockType::Raw(RawType::ConditionalBranch), 0, 4);
        block.next = Some(BlockRef::Block(4));
        block.branch = Some(BlockRef::Block(7));
        assert_eq!(block.flow_edges().len(), 2);
        assert!(block.is_pending());

        block.block_type = BlockType::Structured(StructuredType::Condition);
        assert!(block.is_open_condition());
        assert!(!block.is_settled());

        block.branch = None;
        block.next = None;
        assert!(block.is_settled());
        assert!(block.flow_edges().is_empty());

        let mut if_block = BasicBlock::new(5, BlockType::Structured(StructuredType::If), 0, 9);
        if_block.condition = Some(BlockRef::Block(3));
        if_block.sub1 = Some(BlockRef::Block(4));
        if_block.next = Some(BlockRef::Block(8));
        assert_eq!(if_block.flow_edges(), vec![(EdgeKind::Next, BlockRef::Block(8))]);
        assert_eq!(if_block.targets(), [3, 4, 8].into_iter().collect());
    }

    #[test]
    fn test_replace_target_rewrites_all_matching_edges() {
        let mut block = BasicBlock::new(1, BlockType::Raw(RawType::SwitchDeclaration), 0, 1);
        block.switch_cases = vec![
            SwitchCase {
                value: 0,
                is_default: false,
                target: BlockRef::Block(2),
            },
            SwitchCase {
                value: 0,
                is_default: true,
                target: BlockRef::Block(2),
            },
        ];
        assert!(block.replace_target(BlockRef::Block(2), BlockRef::END));
        assert!(block.targets().is_empty());
        assert!(!block.replace_target(BlockRef::Block(2), BlockRef::END));
    }
}
