// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Decoded bytecode as delivered by the class-file parser.

use crate::opcodes;
use std::fmt;

/// The decoded operand of one instruction. Branch and switch targets are absolute offsets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    None,
    /// `bipush` / `sipush` immediate.
    Int(i32),
    /// Local variable slot of a load, store or `ret` (including the `wide` forms).
    Local(u16),
    Iinc { slot: u16, delta: i16 },
    /// Constant pool index (`ldc`, field and method references, class references).
    PoolIndex(u16),
    /// `multianewarray` class and dimension count.
    MultiArray { index: u16, dimensions: u8 },
    /// `newarray` primitive type code.
    ArrayType(u8),
    Branch(u32),
    Switch { default: u32, cases: Vec<(i32, u32)> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawInstruction {
    pub offset: u32,
    pub opcode: u16,
    pub line_number: Option<u32>,
    pub operand: Operand,
}

impl RawInstruction {
    pub fn new(offset: u32, opcode: u16, operand: Operand) -> Self {
        Self {
            offset,
            opcode,
            line_number: None,
            operand,
        }
    }

    pub fn with_line(mut self, line_number: u32) -> Self {
        self.line_number = Some(line_number);
        self
    }

    /// All offsets this instruction may transfer control to, other than the next instruction.
    pub fn jump_targets(&self) -> Vec<u32> {
        match &self.operand {
            Operand::Branch(target) => vec![*target],
            Operand::Switch { default, cases } => std::iter::once(*default)
                .chain(cases.iter().map(|(_, target)| *target))
                .collect(),
            _ => vec![],
        }
    }
}

impl fmt::Display for RawInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = opcodes::mnemonic(self.opcode).unwrap_or("<invalid>");
        write!(f, "{}: {}", self.offset, name)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Int(value) => write!(f, " {}", value),
            Operand::Local(slot) => write!(f, " {}", slot),
            Operand::Iinc { slot, delta } => write!(f, " {} {}", slot, delta),
            Operand::PoolIndex(index) => write!(f, " #{}", index),
            Operand::MultiArray { index, dimensions } => write!(f, " #{} {}", index, dimensions),
            Operand::ArrayType(atype) => write!(f, " {}", atype),
            Operand::Branch(target) => write!(f, " {}", target),
            Operand::Switch { default, cases } => {
                write!(f, " {}", default)?;
                for (key, target) in cases {
                    write!(f, " {}:{}", key, target)?;
                }
                Ok(())
            }
        }
    }
}

/// One row of a method's exception table. `end` is exclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start: u32,
    pub end: u32,
    pub handler: u32,
    /// Constant pool index of the caught class; `None` for a catch-all (`finally`).
    pub catch_type: Option<u16>,
}

/// The code attribute of one method.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MethodBody {
    pub code: Vec<RawInstruction>,
    pub exception_table: Vec<ExceptionTableEntry>,
    /// Length of the code array in bytes.
    pub code_length: u32,
}

impl MethodBody {
    pub fn new(code: Vec<RawInstruction>, code_length: u32) -> Self {
        Self {
            code,
            exception_table: vec![],
            code_length,
        }
    }
}
