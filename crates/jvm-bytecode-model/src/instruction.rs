// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Expression trees built from bytecode.
//!
//! Each [`Instruction`] owns its operands, so an instruction graph is always a tree. Values that
//! bytecode duplicates on the operand stack are either cloned (when cheap and side-effect free)
//! or split into a [`InstructionKind::DupStore`] statement and [`InstructionKind::DupLoad`]
//! reads that each carry their own copy of the stored expression.

use crate::signature::Signature;
use std::fmt;

/// The value category an opcode operates on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ValueKind {
    /// The fixed descriptor of the category. References have none.
    pub fn signature(self) -> Option<Signature> {
        match self {
            ValueKind::Int => Some(Signature::INT),
            ValueKind::Long => Some(Signature::LONG),
            ValueKind::Float => Some(Signature::FLOAT),
            ValueKind::Double => Some(Signature::DOUBLE),
            ValueKind::Reference => None,
        }
    }
}

/// Element category of array loads and stores (`baload` serves both byte and boolean arrays).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArrayKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
    Byte,
    Char,
    Short,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Literal {
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    UShr,
    And,
    Or,
    Xor,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Rem => "%",
            BinaryOperator::Shl => "<<",
            BinaryOperator::Shr => ">>",
            BinaryOperator::UShr => ">>>",
            BinaryOperator::And => "&",
            BinaryOperator::Or => "|",
            BinaryOperator::Xor => "^",
        }
    }

    /// Java operator precedence; lower binds tighter.
    pub fn priority(self) -> u8 {
        match self {
            BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Rem => 3,
            BinaryOperator::Add | BinaryOperator::Sub => 4,
            BinaryOperator::Shl | BinaryOperator::Shr | BinaryOperator::UShr => 5,
            BinaryOperator::And => 8,
            BinaryOperator::Xor => 9,
            BinaryOperator::Or => 10,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Comparison {
    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
            Comparison::Lt => "<",
            Comparison::Ge => ">=",
            Comparison::Gt => ">",
            Comparison::Le => "<=",
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Comparison::Eq => Comparison::Ne,
            Comparison::Ne => Comparison::Eq,
            Comparison::Lt => Comparison::Ge,
            Comparison::Ge => Comparison::Lt,
            Comparison::Gt => Comparison::Le,
            Comparison::Le => Comparison::Gt,
        }
    }

    pub fn priority(self) -> u8 {
        match self {
            Comparison::Eq | Comparison::Ne => 7,
            _ => 6,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
    Dynamic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MonitorAction {
    Enter,
    Exit,
}

/// A node of an expression tree, carrying its provenance in the bytecode.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub opcode: u16,
    pub offset: u32,
    pub line_number: Option<u32>,
    pub kind: InstructionKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InstructionKind {
    /// `iconst_*`, `bipush` and `sipush`; the opcode tells which.
    IntConstant {
        value: i32,
    },
    Literal(Literal),
    Ldc {
        index: u16,
    },
    Load {
        kind: ValueKind,
        slot: u16,
    },
    Store {
        kind: ValueKind,
        slot: u16,
        value: Box<Instruction>,
    },
    Increment {
        slot: u16,
        delta: i16,
    },
    /// An explicit primitive conversion such as `i2b`; its result type is fixed.
    Convert {
        signature: Signature,
        value: Box<Instruction>,
    },
    BinaryOperator {
        operator: BinaryOperator,
        family: ValueKind,
        left: Box<Instruction>,
        right: Box<Instruction>,
    },
    Negate {
        family: ValueKind,
        value: Box<Instruction>,
    },
    /// `lcmp`, `fcmpl`, `fcmpg`, `dcmpl`, `dcmpg`.
    Compare {
        left: Box<Instruction>,
        right: Box<Instruction>,
    },
    ArrayLoad {
        element: ArrayKind,
        array: Box<Instruction>,
        index: Box<Instruction>,
    },
    ArrayStore {
        element: ArrayKind,
        array: Box<Instruction>,
        index: Box<Instruction>,
        value: Box<Instruction>,
    },
    ArrayLength {
        array: Box<Instruction>,
    },
    /// `newarray` with its primitive type code.
    NewArray {
        atype: u8,
        length: Box<Instruction>,
    },
    /// `anewarray` of the referenced element class.
    NewObjectArray {
        class_index: u16,
        length: Box<Instruction>,
    },
    /// `multianewarray`; the referenced class is the array type itself.
    MultiNewArray {
        class_index: u16,
        dimensions: Vec<Instruction>,
    },
    GetStatic {
        index: u16,
    },
    GetField {
        index: u16,
        object: Box<Instruction>,
    },
    PutStatic {
        index: u16,
        value: Box<Instruction>,
    },
    PutField {
        index: u16,
        object: Box<Instruction>,
        value: Box<Instruction>,
    },
    Invoke {
        kind: InvokeKind,
        index: u16,
        object: Option<Box<Instruction>>,
        arguments: Vec<Instruction>,
    },
    New {
        class_index: u16,
    },
    /// A `new`/`dup`/`invokespecial <init>` sequence folded into one creation expression.
    InvokeNew {
        class_index: u16,
        constructor_index: u16,
        arguments: Vec<Instruction>,
    },
    CheckCast {
        class_index: u16,
        value: Box<Instruction>,
    },
    InstanceOf {
        class_index: u16,
        value: Box<Instruction>,
    },
    /// `if<cond>`: compares an int against zero.
    If {
        comparison: Comparison,
        value: Box<Instruction>,
    },
    /// `if_icmp<cond>` and `if_acmp<cond>`.
    IfCmp {
        comparison: Comparison,
        left: Box<Instruction>,
        right: Box<Instruction>,
    },
    /// `ifnull` (`Eq`) and `ifnonnull` (`Ne`).
    IfNull {
        comparison: Comparison,
        value: Box<Instruction>,
    },
    /// The selector of a `tableswitch` or `lookupswitch`.
    Switch {
        value: Box<Instruction>,
    },
    Return,
    ReturnValue {
        value: Box<Instruction>,
    },
    Throw {
        value: Box<Instruction>,
    },
    Jsr {
        target: u32,
    },
    Ret {
        slot: u16,
    },
    Pop {
        value: Box<Instruction>,
    },
    Monitor {
        action: MonitorAction,
        value: Box<Instruction>,
    },
    /// Evaluates a duplicated expression once; `DupLoad`s with the same id read it back.
    DupStore {
        id: usize,
        value: Box<Instruction>,
    },
    DupLoad {
        id: usize,
        value: Box<Instruction>,
    },
    /// A value a predecessor block left on the operand stack; `depth` counts from the top.
    StackEntry {
        depth: usize,
    },
    /// A value this block leaves on the operand stack for its successor.
    LeftOnStack {
        value: Box<Instruction>,
    },
    /// The caught exception at the start of a handler; `None` for a catch-all handler.
    ExceptionLoad {
        class_index: Option<u16>,
    },
}

impl Instruction {
    pub fn new(opcode: u16, offset: u32, line_number: Option<u32>, kind: InstructionKind) -> Self {
        Self {
            opcode,
            offset,
            line_number,
            kind,
        }
    }

    /// Expression-printing precedence; lower binds tighter.
    pub fn priority(&self) -> u8 {
        use InstructionKind::*;
        match &self.kind {
            Convert { .. } | CheckCast { .. } | Negate { .. } => 2,
            BinaryOperator { operator, .. } => operator.priority(),
            Compare { .. } | InstanceOf { .. } => 6,
            If { comparison, .. } | IfCmp { comparison, .. } | IfNull { comparison, .. } => {
                comparison.priority()
            }
            Store { .. }
            | Increment { .. }
            | ArrayStore { .. }
            | PutStatic { .. }
            | PutField { .. }
            | DupStore { .. } => 14,
            LeftOnStack { value } => value.priority(),
            _ => 0,
        }
    }

    /// The direct operands of this node, in evaluation order.
    pub fn operands(&self) -> Vec<&Instruction> {
        use InstructionKind::*;
        match &self.kind {
            Store { value, .. }
            | Convert { value, .. }
            | Negate { value, .. }
            | PutStatic { value, .. }
            | CheckCast { value, .. }
            | InstanceOf { value, .. }
            | If { value, .. }
            | IfNull { value, .. }
            | Switch { value }
            | ReturnValue { value }
            | Throw { value }
            | Pop { value }
            | Monitor { value, .. }
            | DupStore { value, .. }
            | DupLoad { value, .. }
            | LeftOnStack { value } => vec![&**value],
            BinaryOperator { left, right, .. }
            | Compare { left, right }
            | IfCmp { left, right, .. } => vec![&**left, &**right],
            ArrayLoad { array, index, .. } => vec![&**array, &**index],
            ArrayStore {
                array,
                index,
                value,
                ..
            } => vec![&**array, &**index, &**value],
            ArrayLength { array } => vec![&**array],
            NewArray { length, .. } | NewObjectArray { length, .. } => vec![&**length],
            MultiNewArray { dimensions, .. } => dimensions.iter().collect(),
            GetField { object, .. } => vec![&**object],
            PutField { object, value, .. } => vec![&**object, &**value],
            Invoke {
                object, arguments, ..
            } => object
                .iter()
                .map(|o| &**o)
                .chain(arguments.iter())
                .collect(),
            InvokeNew { arguments, .. } => arguments.iter().collect(),
            IntConstant { .. }
            | Literal(_)
            | Ldc { .. }
            | Load { .. }
            | Increment { .. }
            | GetStatic { .. }
            | New { .. }
            | Return
            | Jsr { .. }
            | Ret { .. }
            | StackEntry { .. }
            | ExceptionLoad { .. } => vec![],
        }
    }

    /// Whether this is a conditional jump, i.e. the boolean test of a branch block.
    pub fn is_condition(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::If { .. } | InstructionKind::IfCmp { .. } | InstructionKind::IfNull { .. }
        )
    }

    /// Whether this node ends its block (branch, switch, return, throw, subroutine call).
    pub fn is_terminator(&self) -> bool {
        use InstructionKind::*;
        self.is_condition()
            || matches!(
                self.kind,
                Switch { .. } | Return | ReturnValue { .. } | Throw { .. } | Jsr { .. } | Ret { .. }
            )
    }

    /// Whether this node is evaluated for its effect only and produces no value.
    pub fn is_statement(&self) -> bool {
        use InstructionKind::*;
        self.is_terminator()
            || matches!(
                self.kind,
                Store { .. }
                    | Increment { .. }
                    | ArrayStore { .. }
                    | PutStatic { .. }
                    | PutField { .. }
                    | Pop { .. }
                    | Monitor { .. }
                    | DupStore { .. }
            )
    }

    /// Whether this node is a value handed to the successor block on the operand stack.
    pub fn leaves_value(&self) -> bool {
        matches!(self.kind, InstructionKind::LeftOnStack { .. })
    }

    /// Whether the expression is cheap and free of side effects, so that duplicating it by
    /// cloning does not change evaluation.
    pub fn is_trivial(&self) -> bool {
        use InstructionKind::*;
        matches!(
            self.kind,
            IntConstant { .. }
                | Literal(_)
                | Ldc { .. }
                | Load { .. }
                | New { .. }
                | DupLoad { .. }
                | StackEntry { .. }
                | ExceptionLoad { .. }
        )
    }

    /// Whether some node of the tree satisfies `pred`.
    pub fn any(&self, pred: &dyn Fn(&Instruction) -> bool) -> bool {
        let mut work = vec![self];
        while let Some(node) = work.pop() {
            if pred(node) {
                return true;
            }
            work.extend(node.operands());
        }
        false
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use InstructionKind::*;
        // Wraps operands that bind looser than their parent.
        let wrap = |child: &Instruction| {
            if child.priority() > self.priority() {
                format!("({})", child)
            } else {
                child.to_string()
            }
        };
        match &self.kind {
            IntConstant { value } => write!(f, "{}", value),
            Literal(crate::instruction::Literal::Long(v)) => write!(f, "{}L", v),
            Literal(crate::instruction::Literal::Float(v)) => write!(f, "{:?}F", v),
            Literal(crate::instruction::Literal::Double(v)) => write!(f, "{:?}D", v),
            Literal(crate::instruction::Literal::Null) => write!(f, "null"),
            Ldc { index } => write!(f, "ldc #{}", index),
            Load { slot, .. } => write!(f, "local{}", slot),
            Store { slot, value, .. } => write!(f, "local{} = {}", slot, value),
            Increment { slot, delta } => write!(f, "local{} += {}", slot, delta),
            Convert { signature, value } => write!(f, "({}) {}", signature, wrap(value)),
            BinaryOperator {
                operator,
                left,
                right,
                ..
            } => write!(f, "{} {} {}", wrap(left), operator.symbol(), wrap(right)),
            Negate { value, .. } => write!(f, "-{}", wrap(value)),
            Compare { left, right } => write!(f, "cmp({}, {})", left, right),
            ArrayLoad { array, index, .. } => write!(f, "{}[{}]", wrap(array), index),
            ArrayStore {
                array,
                index,
                value,
                ..
            } => write!(f, "{}[{}] = {}", wrap(array), index, value),
            ArrayLength { array } => write!(f, "{}.length", wrap(array)),
            NewArray { atype, length } => write!(f, "newarray {}[{}]", atype, length),
            NewObjectArray {
                class_index,
                length,
            } => write!(f, "new #{}[{}]", class_index, length),
            MultiNewArray {
                class_index,
                dimensions,
            } => {
                write!(f, "new #{}", class_index)?;
                for dim in dimensions {
                    write!(f, "[{}]", dim)?;
                }
                Ok(())
            }
            GetStatic { index } => write!(f, "#{}", index),
            GetField { index, object } => write!(f, "{}.#{}", wrap(object), index),
            PutStatic { index, value } => write!(f, "#{} = {}", index, value),
            PutField {
                index,
                object,
                value,
            } => write!(f, "{}.#{} = {}", wrap(object), index, value),
            Invoke {
                index,
                object,
                arguments,
                ..
            } => {
                if let Some(object) = object {
                    write!(f, "{}.", wrap(object))?;
                }
                write!(f, "#{}(", index)?;
                write_list(f, arguments)?;
                write!(f, ")")
            }
            New { class_index } => write!(f, "new #{}", class_index),
            InvokeNew {
                class_index,
                arguments,
                ..
            } => {
                write!(f, "new #{}(", class_index)?;
                write_list(f, arguments)?;
                write!(f, ")")
            }
            CheckCast { class_index, value } => write!(f, "(#{}) {}", class_index, wrap(value)),
            InstanceOf { class_index, value } => {
                write!(f, "{} instanceof #{}", wrap(value), class_index)
            }
            If { comparison, value } => write!(f, "{} {} 0", wrap(value), comparison.symbol()),
            IfCmp {
                comparison,
                left,
                right,
            } => write!(f, "{} {} {}", wrap(left), comparison.symbol(), wrap(right)),
            IfNull { comparison, value } => {
                write!(f, "{} {} null", wrap(value), comparison.symbol())
            }
            Switch { value } => write!(f, "switch ({})", value),
            Return => write!(f, "return"),
            ReturnValue { value } => write!(f, "return {}", value),
            Throw { value } => write!(f, "throw {}", value),
            Jsr { target } => write!(f, "jsr {}", target),
            Ret { slot } => write!(f, "ret local{}", slot),
            Pop { value } => write!(f, "{}", value),
            Monitor { action, value } => match action {
                MonitorAction::Enter => write!(f, "monitorenter({})", value),
                MonitorAction::Exit => write!(f, "monitorexit({})", value),
            },
            DupStore { id, value } => write!(f, "dup{} = {}", id, value),
            DupLoad { id, .. } => write!(f, "dup{}", id),
            StackEntry { depth } => write!(f, "stack{}", depth),
            LeftOnStack { value } => write!(f, "push {}", value),
            ExceptionLoad { .. } => write!(f, "exception"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Instruction]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes;

    fn load(slot: u16) -> Instruction {
        Instruction::new(
            opcodes::ILOAD,
            0,
            None,
            InstructionKind::Load {
                kind: ValueKind::Int,
                slot,
            },
        )
    }

    fn binary(operator: BinaryOperator, left: Instruction, right: Instruction) -> Instruction {
        Instruction::new(
            opcodes::IADD,
            0,
            None,
            InstructionKind::BinaryOperator {
                operator,
                family: ValueKind::Int,
                left: Box::new(left),
                right: Box::new(right),
            },
        )
    }

    #[test]
    fn test_display_respects_priority() {
        let sum = binary(BinaryOperator::Add, load(1), load(2));
        let product = binary(BinaryOperator::Mul, sum.clone(), load(3));
        assert_eq!(product.to_string(), "(local1 + local2) * local3");
        let flat = binary(BinaryOperator::Add, binary(BinaryOperator::Mul, load(1), load(2)), load(3));
        assert_eq!(flat.to_string(), "local1 * local2 + local3");
    }

    #[test]
    fn test_operands_and_search() {
        let sum = binary(BinaryOperator::Add, load(1), load(2));
        assert_eq!(sum.operands().len(), 2);
        assert!(sum.any(&|node| matches!(node.kind, InstructionKind::Load { slot: 2, .. })));
        assert!(!sum.any(&|node| matches!(node.kind, InstructionKind::StackEntry { .. })));
        assert!(load(1).is_trivial());
        assert!(!sum.is_trivial());
    }

    #[test]
    fn test_comparison_negation_round_trips() {
        for cmp in [
            Comparison::Eq,
            Comparison::Ne,
            Comparison::Lt,
            Comparison::Ge,
            Comparison::Gt,
            Comparison::Le,
        ] {
            assert_ne!(cmp.negate(), cmp);
            assert_eq!(cmp.negate().negate(), cmp);
        }
    }
}
