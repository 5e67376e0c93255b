// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Type inference over expression trees.
//!
//! Every instruction answers the JVM type it produces. The answer is `None` when inference is
//! unavailable (missing metadata, unresolved pool entries, values inherited through the operand
//! stack). That is not an error: callers default it at the boundary where a type is required.

use crate::{
    constants::ConstantPool,
    instruction::{ArrayKind, Instruction, InstructionKind, Literal, ValueKind},
    locals::LocalVariables,
    opcodes,
    signature::{primitive_array_element, MethodDescriptor, Signature},
};

impl Instruction {
    /// The type this expression produces, resolved against the method's constant pool and local
    /// variable table.
    pub fn inferred_type(
        &self,
        constants: Option<&dyn ConstantPool>,
        locals: Option<&dyn LocalVariables>,
    ) -> Option<Signature> {
        use InstructionKind::*;
        match &self.kind {
            IntConstant { .. } | Increment { .. } | ArrayLength { .. } | Compare { .. } => {
                Some(Signature::INT)
            }
            Literal(literal) => literal_signature(*literal),
            Ldc { index } => constants?.loadable_signature(*index),
            Load { kind, slot } | Store { kind, slot, .. } => match kind {
                ValueKind::Reference => {
                    self.local_signature(*slot, Signature::OBJECT, constants, locals)
                }
                ValueKind::Int => self.local_signature(*slot, Signature::INT, constants, locals),
                other => other.signature(),
            },
            Convert { signature, .. } => Some(signature.clone()),
            BinaryOperator {
                family: ValueKind::Int,
                left,
                right,
                ..
            } => {
                // Narrow int literals carry no type of their own, so the other operand decides.
                let (first, second) = if opcodes::is_narrow_int_literal(left.opcode) {
                    (right, left)
                } else {
                    (left, right)
                };
                first
                    .inferred_type(constants, locals)
                    .or_else(|| second.inferred_type(constants, locals))
            }
            BinaryOperator { family, .. } => family.signature(),
            Negate {
                family: ValueKind::Int,
                value,
            } => value
                .inferred_type(constants, locals)
                .or(Some(Signature::INT)),
            Negate { family, .. } => family.signature(),
            ArrayLoad { element, array, .. } => {
                let array_type = array.inferred_type(constants, locals);
                match element {
                    ArrayKind::Reference | ArrayKind::Byte => array_type
                        .and_then(|sig| sig.element_type())
                        .or(match element {
                            ArrayKind::Byte => Some(Signature::BYTE),
                            _ => None,
                        }),
                    ArrayKind::Int => Some(Signature::INT),
                    ArrayKind::Long => Some(Signature::LONG),
                    ArrayKind::Float => Some(Signature::FLOAT),
                    ArrayKind::Double => Some(Signature::DOUBLE),
                    ArrayKind::Char => Some(Signature::CHAR),
                    ArrayKind::Short => Some(Signature::SHORT),
                }
            }
            NewArray { atype, .. } => primitive_array_element(*atype).map(|sig| sig.array_of()),
            NewObjectArray { class_index, .. } => {
                class_signature(constants?, *class_index).map(|sig| sig.array_of())
            }
            MultiNewArray { class_index, .. }
            | New { class_index }
            | InvokeNew { class_index, .. }
            | CheckCast { class_index, .. } => class_signature(constants?, *class_index),
            GetStatic { index } | GetField { index, .. } => constants?
                .member_descriptor(*index)
                .map(|descriptor| Signature::new(descriptor.to_string())),
            Invoke { index, .. } => {
                let descriptor = MethodDescriptor::parse(constants?.member_descriptor(*index)?)?;
                descriptor
                    .returns_value()
                    .then_some(descriptor.return_type)
            }
            InstanceOf { .. } | If { .. } | IfCmp { .. } | IfNull { .. } => {
                Some(Signature::BOOLEAN)
            }
            ReturnValue { value }
            | DupStore { value, .. }
            | DupLoad { value, .. }
            | LeftOnStack { value } => value.inferred_type(constants, locals),
            ExceptionLoad {
                class_index: Some(index),
            } => class_signature(constants?, *index),
            ExceptionLoad { class_index: None } => Some(Signature::THROWABLE),
            ArrayStore { .. }
            | PutStatic { .. }
            | PutField { .. }
            | Switch { .. }
            | Return
            | Throw { .. }
            | Jsr { .. }
            | Ret { .. }
            | Pop { .. }
            | Monitor { .. }
            | StackEntry { .. } => None,
        }
    }

    /// Whether the value takes two operand stack slots (`long` and `double`).
    pub fn is_wide(&self, constants: Option<&dyn ConstantPool>) -> bool {
        self.inferred_type(constants, None)
            .map_or(false, |sig| sig.is_wide())
    }

    /// Looks up the local variable active at this instruction. Inference is unavailable when
    /// either table is missing; an untyped or unknown local falls back to `fallback`.
    fn local_signature(
        &self,
        slot: u16,
        fallback: Signature,
        constants: Option<&dyn ConstantPool>,
        locals: Option<&dyn LocalVariables>,
    ) -> Option<Signature> {
        let (constants, locals) = (constants?, locals?);
        let declared = locals
            .lookup(slot, self.offset)
            .and_then(|var| var.type_index())
            .and_then(|index| constants.utf8(index));
        Some(match declared {
            Some(descriptor) => Signature::new(descriptor.to_string()),
            None => fallback,
        })
    }
}

fn literal_signature(literal: Literal) -> Option<Signature> {
    match literal {
        Literal::Long(_) => Some(Signature::LONG),
        Literal::Float(_) => Some(Signature::FLOAT),
        Literal::Double(_) => Some(Signature::DOUBLE),
        Literal::Null => None,
    }
}

fn class_signature(constants: &dyn ConstantPool, index: u16) -> Option<Signature> {
    constants.class_name(index).map(Signature::from_internal_name)
}
