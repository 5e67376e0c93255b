// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! The bytecode side of the decompiler: decoded instructions as they come from the class-file
//! parser, the read-only metadata tables they refer to, and the expression trees the CFG
//! builder produces together with their type inference.

pub mod bytecode;
pub mod constants;
pub mod instruction;
pub mod locals;
pub mod opcodes;
pub mod resolver;
pub mod signature;

pub use bytecode::{ExceptionTableEntry, MethodBody, Operand, RawInstruction};
pub use constants::{Constant, ConstantPool, ConstantPoolTable};
pub use instruction::{Instruction, InstructionKind};
pub use locals::{LocalVariable, LocalVariableTable, LocalVariables};
pub use signature::{MethodDescriptor, Signature};
