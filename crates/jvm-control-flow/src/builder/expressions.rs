// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Operand stack simulation turning the raw instructions of one block into expression trees.

use crate::error::MalformedInput;
use jvm_bytecode_model::{
    instruction::{
        ArrayKind, BinaryOperator, Comparison, InvokeKind, Literal, MonitorAction, ValueKind,
    },
    opcodes::*,
    ConstantPool, Instruction, InstructionKind, MethodDescriptor, Operand, RawInstruction,
    Signature,
};

const VALUE_KINDS: [ValueKind; 5] = [
    ValueKind::Int,
    ValueKind::Long,
    ValueKind::Float,
    ValueKind::Double,
    ValueKind::Reference,
];

const ARRAY_KINDS: [ArrayKind; 8] = [
    ArrayKind::Int,
    ArrayKind::Long,
    ArrayKind::Float,
    ArrayKind::Double,
    ArrayKind::Reference,
    ArrayKind::Byte,
    ArrayKind::Char,
    ArrayKind::Short,
];

const COMPARISONS: [Comparison; 6] = [
    Comparison::Eq,
    Comparison::Ne,
    Comparison::Lt,
    Comparison::Ge,
    Comparison::Gt,
    Comparison::Le,
];

/// Translates blocks one at a time. Ids of duplicated values are unique per method.
pub(crate) struct ExpressionBuilder<'a> {
    constants: Option<&'a dyn ConstantPool>,
    next_dup_id: usize,
}

/// The simulated state of one block.
#[derive(Default)]
struct BlockState {
    stack: Vec<Instruction>,
    statements: Vec<Instruction>,
    terminator: Option<Instruction>,
    /// Number of values taken from the stack a predecessor left behind.
    inherited: usize,
}

fn node(raw: &RawInstruction, kind: InstructionKind) -> Instruction {
    Instruction::new(raw.opcode, raw.offset, raw.line_number, kind)
}

impl BlockState {
    fn pop(&mut self, raw: &RawInstruction) -> Instruction {
        match self.stack.pop() {
            Some(value) => value,
            None => {
                let depth = self.inherited;
                self.inherited += 1;
                node(raw, InstructionKind::StackEntry { depth })
            }
        }
    }

    fn pop_boxed(&mut self, raw: &RawInstruction) -> Box<Instruction> {
        Box::new(self.pop(raw))
    }

    /// Pops `count` values and returns them in push order.
    fn pop_many(&mut self, raw: &RawInstruction, count: usize) -> Vec<Instruction> {
        let mut values: Vec<Instruction> = (0..count).map(|_| self.pop(raw)).collect();
        values.reverse();
        values
    }

    fn push(&mut self, value: Instruction) {
        self.stack.push(value);
    }

    fn statement(&mut self, value: Instruction) {
        self.statements.push(value);
    }

    /// Statements, then the values left on the stack (bottom first), then the terminator.
    fn finish(self) -> Vec<Instruction> {
        let mut result = self.statements;
        result.extend(self.stack.into_iter().map(|value| {
            Instruction::new(
                value.opcode,
                value.offset,
                value.line_number,
                InstructionKind::LeftOnStack {
                    value: Box::new(value),
                },
            )
        }));
        result.extend(self.terminator);
        result
    }
}

fn pool_index(raw: &RawInstruction) -> Result<u16, MalformedInput> {
    match raw.operand {
        Operand::PoolIndex(index) | Operand::MultiArray { index, .. } => Ok(index),
        _ => Err(MalformedInput::MissingOperand {
            offset: raw.offset,
            expected: "constant pool index",
        }),
    }
}

fn int_operand(raw: &RawInstruction) -> Result<i32, MalformedInput> {
    match raw.operand {
        Operand::Int(value) => Ok(value),
        _ => Err(MalformedInput::MissingOperand {
            offset: raw.offset,
            expected: "immediate",
        }),
    }
}

fn branch_target(raw: &RawInstruction) -> Result<u32, MalformedInput> {
    match raw.operand {
        Operand::Branch(target) => Ok(target),
        _ => Err(MalformedInput::MissingOperand {
            offset: raw.offset,
            expected: "branch target",
        }),
    }
}

fn local_operand(raw: &RawInstruction) -> Result<u16, MalformedInput> {
    match raw.operand {
        Operand::Local(slot) => Ok(slot),
        _ => Err(MalformedInput::MissingOperand {
            offset: raw.offset,
            expected: "local variable",
        }),
    }
}

/// Category and slot of a load or store, from the explicit or the `_<n>` form.
fn local_access(
    raw: &RawInstruction,
    explicit: u16,
    implicit: u16,
) -> Result<(ValueKind, u16), MalformedInput> {
    let op = raw.opcode;
    if op >= implicit {
        let n = usize::from(op - implicit);
        Ok((VALUE_KINDS[n / 4], (n % 4) as u16))
    } else {
        Ok((VALUE_KINDS[usize::from(op - explicit)], local_operand(raw)?))
    }
}

fn conversion_target(op: u16) -> Signature {
    match op {
        I2L | F2L | D2L => Signature::LONG,
        I2F | L2F | D2F => Signature::FLOAT,
        I2D | L2D | F2D => Signature::DOUBLE,
        I2B => Signature::BYTE,
        I2C => Signature::CHAR,
        I2S => Signature::SHORT,
        _ => Signature::INT,
    }
}

impl<'a> ExpressionBuilder<'a> {
    pub fn new(constants: Option<&'a dyn ConstantPool>) -> Self {
        Self {
            constants,
            next_dup_id: 0,
        }
    }

    /// Translates the instructions of one block. `entry` is the value on the stack when the
    /// block starts, if the builder knows it (the caught exception of a handler).
    pub fn translate_block(
        &mut self,
        code: &[RawInstruction],
        entry: Option<Instruction>,
    ) -> Result<Vec<Instruction>, MalformedInput> {
        let mut state = BlockState {
            stack: entry.into_iter().collect(),
            ..BlockState::default()
        };
        for raw in code {
            self.translate(&mut state, raw)?;
        }
        Ok(state.finish())
    }

    /// Duplicates a stack value: cheap values are cloned, anything else is evaluated once
    /// into a dup store and read back twice.
    fn duplicate(
        &mut self,
        state: &mut BlockState,
        raw: &RawInstruction,
        value: Instruction,
    ) -> (Instruction, Instruction) {
        if value.is_trivial() {
            return (value.clone(), value);
        }
        let id = self.next_dup_id;
        self.next_dup_id += 1;
        state.statement(node(
            raw,
            InstructionKind::DupStore {
                id,
                value: Box::new(value.clone()),
            },
        ));
        let load = node(
            raw,
            InstructionKind::DupLoad {
                id,
                value: Box::new(value),
            },
        );
        (load.clone(), load)
    }

    fn is_wide(&self, value: &Instruction) -> bool {
        value.is_wide(self.constants)
    }

    fn translate(
        &mut self,
        state: &mut BlockState,
        raw: &RawInstruction,
    ) -> Result<(), MalformedInput> {
        use InstructionKind as K;
        let op = raw.opcode;
        match op {
            NOP | WIDE | GOTO | GOTO_W => {}
            ACONST_NULL => state.push(node(raw, K::Literal(Literal::Null))),
            ICONST_M1..=ICONST_5 => state.push(node(
                raw,
                K::IntConstant {
                    value: i32::from(op) - i32::from(ICONST_0),
                },
            )),
            LCONST_0 | LCONST_1 => state.push(node(
                raw,
                K::Literal(Literal::Long(i64::from(op - LCONST_0))),
            )),
            FCONST_0..=FCONST_2 => state.push(node(
                raw,
                K::Literal(Literal::Float(f32::from(op - FCONST_0))),
            )),
            DCONST_0 | DCONST_1 => state.push(node(
                raw,
                K::Literal(Literal::Double(f64::from(op - DCONST_0))),
            )),
            BIPUSH | SIPUSH => state.push(node(
                raw,
                K::IntConstant {
                    value: int_operand(raw)?,
                },
            )),
            LDC | LDC_W | LDC2_W => state.push(node(
                raw,
                K::Ldc {
                    index: pool_index(raw)?,
                },
            )),
            ILOAD..=ALOAD | ILOAD_0..=ALOAD_3 => {
                let (kind, slot) = local_access(raw, ILOAD, ILOAD_0)?;
                state.push(node(raw, K::Load { kind, slot }));
            }
            IALOAD..=SALOAD => {
                let index = state.pop_boxed(raw);
                let array = state.pop_boxed(raw);
                state.push(node(
                    raw,
                    K::ArrayLoad {
                        element: ARRAY_KINDS[usize::from(op - IALOAD)],
                        array,
                        index,
                    },
                ));
            }
            ISTORE..=ASTORE | ISTORE_0..=ASTORE_3 => {
                let (kind, slot) = local_access(raw, ISTORE, ISTORE_0)?;
                let value = state.pop_boxed(raw);
                state.statement(node(raw, K::Store { kind, slot, value }));
            }
            IASTORE..=SASTORE => {
                let value = state.pop_boxed(raw);
                let index = state.pop_boxed(raw);
                let array = state.pop_boxed(raw);
                state.statement(node(
                    raw,
                    K::ArrayStore {
                        element: ARRAY_KINDS[usize::from(op - IASTORE)],
                        array,
                        index,
                        value,
                    },
                ));
            }
            POP => {
                let value = state.pop_boxed(raw);
                state.statement(node(raw, K::Pop { value }));
            }
            POP2 => {
                let top = state.pop(raw);
                if self.is_wide(&top) {
                    state.statement(node(raw, K::Pop { value: Box::new(top) }));
                } else {
                    let below = state.pop_boxed(raw);
                    state.statement(node(raw, K::Pop { value: below }));
                    state.statement(node(raw, K::Pop { value: Box::new(top) }));
                }
            }
            DUP => {
                let value = state.pop(raw);
                let (first, second) = self.duplicate(state, raw, value);
                state.push(first);
                state.push(second);
            }
            DUP_X1 => {
                let top = state.pop(raw);
                let below = state.pop(raw);
                let (copy, original) = self.duplicate(state, raw, top);
                state.push(copy);
                state.push(below);
                state.push(original);
            }
            DUP_X2 => {
                let top = state.pop(raw);
                let second = state.pop(raw);
                let (copy, original) = self.duplicate(state, raw, top);
                if self.is_wide(&second) {
                    state.push(copy);
                    state.push(second);
                } else {
                    let third = state.pop(raw);
                    state.push(copy);
                    state.push(third);
                    state.push(second);
                }
                state.push(original);
            }
            DUP2 => {
                let top = state.pop(raw);
                if self.is_wide(&top) {
                    let (first, second) = self.duplicate(state, raw, top);
                    state.push(first);
                    state.push(second);
                } else {
                    let below = state.pop(raw);
                    let (below_copy, below) = self.duplicate(state, raw, below);
                    let (top_copy, top) = self.duplicate(state, raw, top);
                    state.push(below_copy);
                    state.push(top_copy);
                    state.push(below);
                    state.push(top);
                }
            }
            DUP2_X1 | DUP2_X2 => {
                let top = state.pop(raw);
                let pair = if self.is_wide(&top) {
                    vec![top]
                } else {
                    let below = state.pop(raw);
                    vec![below, top]
                };
                let under = state.pop(raw);
                let mut buried = vec![under];
                if op == DUP2_X2 && !self.is_wide(&buried[0]) {
                    buried.insert(0, state.pop(raw));
                }
                let mut copies = vec![];
                let mut originals = vec![];
                for value in pair {
                    let (copy, original) = self.duplicate(state, raw, value);
                    copies.push(copy);
                    originals.push(original);
                }
                for value in copies.into_iter().chain(buried).chain(originals) {
                    state.push(value);
                }
            }
            SWAP => {
                let top = state.pop(raw);
                let below = state.pop(raw);
                state.push(top);
                state.push(below);
            }
            IADD..=DREM | ISHL..=LXOR => {
                let (operator, family) = match op {
                    IADD..=DREM => {
                        let n = usize::from(op - IADD);
                        let operators = [
                            BinaryOperator::Add,
                            BinaryOperator::Sub,
                            BinaryOperator::Mul,
                            BinaryOperator::Div,
                            BinaryOperator::Rem,
                        ];
                        (operators[n / 4], VALUE_KINDS[n % 4])
                    }
                    ISHL..=LUSHR => {
                        let n = usize::from(op - ISHL);
                        let operators = [BinaryOperator::Shl, BinaryOperator::Shr, BinaryOperator::UShr];
                        (operators[n / 2], VALUE_KINDS[n % 2])
                    }
                    _ => {
                        let n = usize::from(op - IAND);
                        let operators = [BinaryOperator::And, BinaryOperator::Or, BinaryOperator::Xor];
                        (operators[n / 2], VALUE_KINDS[n % 2])
                    }
                };
                let right = state.pop_boxed(raw);
                let left = state.pop_boxed(raw);
                state.push(node(
                    raw,
                    K::BinaryOperator {
                        operator,
                        family,
                        left,
                        right,
                    },
                ));
            }
            INEG..=DNEG => {
                let value = state.pop_boxed(raw);
                state.push(node(
                    raw,
                    K::Negate {
                        family: VALUE_KINDS[usize::from(op - INEG)],
                        value,
                    },
                ));
            }
            IINC => match raw.operand {
                Operand::Iinc { slot, delta } => {
                    state.statement(node(raw, K::Increment { slot, delta }))
                }
                _ => {
                    return Err(MalformedInput::MissingOperand {
                        offset: raw.offset,
                        expected: "increment",
                    })
                }
            },
            I2L..=I2S => {
                let value = state.pop_boxed(raw);
                state.push(node(
                    raw,
                    K::Convert {
                        signature: conversion_target(op),
                        value,
                    },
                ));
            }
            LCMP..=DCMPG => {
                let right = state.pop_boxed(raw);
                let left = state.pop_boxed(raw);
                state.push(node(raw, K::Compare { left, right }));
            }
            IFEQ..=IFLE => {
                let value = state.pop_boxed(raw);
                state.terminator = Some(node(
                    raw,
                    K::If {
                        comparison: COMPARISONS[usize::from(op - IFEQ)],
                        value,
                    },
                ));
            }
            IF_ICMPEQ..=IF_ACMPNE => {
                let n = usize::from(op - IF_ICMPEQ);
                let comparison = if n < 6 { COMPARISONS[n] } else { COMPARISONS[n - 6] };
                let right = state.pop_boxed(raw);
                let left = state.pop_boxed(raw);
                state.terminator = Some(node(
                    raw,
                    K::IfCmp {
                        comparison,
                        left,
                        right,
                    },
                ));
            }
            IFNULL | IFNONNULL => {
                let value = state.pop_boxed(raw);
                let comparison = if op == IFNULL {
                    Comparison::Eq
                } else {
                    Comparison::Ne
                };
                state.terminator = Some(node(raw, K::IfNull { comparison, value }));
            }
            JSR | JSR_W => {
                state.terminator = Some(node(
                    raw,
                    K::Jsr {
                        target: branch_target(raw)?,
                    },
                ));
            }
            RET => {
                state.terminator = Some(node(
                    raw,
                    K::Ret {
                        slot: local_operand(raw)?,
                    },
                ));
            }
            TABLESWITCH | LOOKUPSWITCH => {
                let value = state.pop_boxed(raw);
                state.terminator = Some(node(raw, K::Switch { value }));
            }
            IRETURN..=ARETURN => {
                let value = state.pop_boxed(raw);
                state.terminator = Some(node(raw, K::ReturnValue { value }));
            }
            RETURN => state.terminator = Some(node(raw, K::Return)),
            ATHROW => {
                let value = state.pop_boxed(raw);
                state.terminator = Some(node(raw, K::Throw { value }));
            }
            GETSTATIC => state.push(node(
                raw,
                K::GetStatic {
                    index: pool_index(raw)?,
                },
            )),
            PUTSTATIC => {
                let value = state.pop_boxed(raw);
                state.statement(node(
                    raw,
                    K::PutStatic {
                        index: pool_index(raw)?,
                        value,
                    },
                ));
            }
            GETFIELD => {
                let object = state.pop_boxed(raw);
                state.push(node(
                    raw,
                    K::GetField {
                        index: pool_index(raw)?,
                        object,
                    },
                ));
            }
            PUTFIELD => {
                let value = state.pop_boxed(raw);
                let object = state.pop_boxed(raw);
                state.statement(node(
                    raw,
                    K::PutField {
                        index: pool_index(raw)?,
                        object,
                        value,
                    },
                ));
            }
            INVOKEVIRTUAL..=INVOKEDYNAMIC => self.translate_invoke(state, raw)?,
            NEW => state.push(node(
                raw,
                K::New {
                    class_index: pool_index(raw)?,
                },
            )),
            NEWARRAY => {
                let atype = match raw.operand {
                    Operand::ArrayType(atype) => atype,
                    _ => {
                        return Err(MalformedInput::MissingOperand {
                            offset: raw.offset,
                            expected: "array type",
                        })
                    }
                };
                let length = state.pop_boxed(raw);
                state.push(node(raw, K::NewArray { atype, length }));
            }
            ANEWARRAY => {
                let length = state.pop_boxed(raw);
                state.push(node(
                    raw,
                    K::NewObjectArray {
                        class_index: pool_index(raw)?,
                        length,
                    },
                ));
            }
            MULTIANEWARRAY => {
                let (class_index, dimensions) = match raw.operand {
                    Operand::MultiArray { index, dimensions } => (index, dimensions),
                    _ => {
                        return Err(MalformedInput::MissingOperand {
                            offset: raw.offset,
                            expected: "array dimensions",
                        })
                    }
                };
                let dimensions = state.pop_many(raw, usize::from(dimensions));
                state.push(node(
                    raw,
                    K::MultiNewArray {
                        class_index,
                        dimensions,
                    },
                ));
            }
            ARRAYLENGTH => {
                let array = state.pop_boxed(raw);
                state.push(node(raw, K::ArrayLength { array }));
            }
            CHECKCAST | INSTANCEOF => {
                let value = state.pop_boxed(raw);
                let class_index = pool_index(raw)?;
                state.push(node(
                    raw,
                    if op == CHECKCAST {
                        K::CheckCast { class_index, value }
                    } else {
                        K::InstanceOf { class_index, value }
                    },
                ));
            }
            MONITORENTER | MONITOREXIT => {
                let value = state.pop_boxed(raw);
                let action = if op == MONITORENTER {
                    MonitorAction::Enter
                } else {
                    MonitorAction::Exit
                };
                state.statement(node(raw, K::Monitor { action, value }));
            }
            _ => {
                return Err(MalformedInput::UnsupportedOpcode {
                    offset: raw.offset,
                    opcode: op,
                })
            }
        }
        Ok(())
    }

    fn translate_invoke(
        &mut self,
        state: &mut BlockState,
        raw: &RawInstruction,
    ) -> Result<(), MalformedInput> {
        let index = pool_index(raw)?;
        let unresolved = MalformedInput::UnresolvedConstant {
            offset: raw.offset,
            index,
        };
        let constants = self.constants.ok_or_else(|| unresolved.clone())?;
        let descriptor = constants
            .member_descriptor(index)
            .and_then(MethodDescriptor::parse)
            .ok_or(unresolved)?;
        let kind = match raw.opcode {
            INVOKEVIRTUAL => InvokeKind::Virtual,
            INVOKESPECIAL => InvokeKind::Special,
            INVOKESTATIC => InvokeKind::Static,
            INVOKEINTERFACE => InvokeKind::Interface,
            _ => InvokeKind::Dynamic,
        };
        let arguments = state.pop_many(raw, descriptor.parameters.len());
        let object = match kind {
            InvokeKind::Static | InvokeKind::Dynamic => None,
            _ => Some(state.pop_boxed(raw)),
        };

        let is_constructor = kind == InvokeKind::Special && constants.member_name(index) == Some("<init>");
        if let (true, Some(InstructionKind::New { class_index })) =
            (is_constructor, object.as_ref().map(|o| &o.kind))
        {
            let class_index = *class_index;
            let creation = node(
                raw,
                InstructionKind::InvokeNew {
                    class_index,
                    constructor_index: index,
                    arguments,
                },
            );
            // `new C; dup; <init>` leaves the second copy of `new C` on the stack.
            let duplicated = matches!(
                state.stack.last(),
                Some(Instruction { kind: InstructionKind::New { class_index: top }, .. }) if *top == class_index
            );
            if duplicated {
                state.stack.pop();
                state.push(creation);
            } else {
                state.statement(creation);
            }
            return Ok(());
        }

        let invoke = node(
            raw,
            InstructionKind::Invoke {
                kind,
                index,
                object,
                arguments,
            },
        );
        if descriptor.returns_value() {
            state.push(invoke);
        } else {
            state.statement(invoke);
        }
        Ok(())
    }
}
