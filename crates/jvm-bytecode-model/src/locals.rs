// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Read access to a method's local variable table.

/// One entry of a `LocalVariableTable` (merged with its `LocalVariableTypeTable` entry, if any).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariable {
    pub slot: u16,
    pub start_pc: u32,
    pub length: u32,
    pub name_index: u16,
    pub descriptor_index: u16,
    /// Constant pool index of the generic signature, or 0 when there is none.
    pub signature_index: u16,
}

impl LocalVariable {
    /// Whether this variable is in scope at `offset`.
    pub fn covers(&self, offset: u32) -> bool {
        self.start_pc <= offset && offset < self.start_pc.saturating_add(self.length)
    }

    /// The pool index of the most precise type this variable declares: the generic signature
    /// when present, else the descriptor. Returns `None` when neither is recorded.
    pub fn type_index(&self) -> Option<u16> {
        [self.signature_index, self.descriptor_index]
            .into_iter()
            .find(|index| *index > 0)
    }
}

pub trait LocalVariables {
    /// The variable stored in `slot` that is active at byte `offset`.
    fn lookup(&self, slot: u16, offset: u32) -> Option<&LocalVariable>;
}

#[derive(Clone, Debug, Default)]
pub struct LocalVariableTable {
    variables: Vec<LocalVariable>,
}

impl LocalVariableTable {
    pub fn new(variables: Vec<LocalVariable>) -> Self {
        Self { variables }
    }

    pub fn push(&mut self, variable: LocalVariable) {
        self.variables.push(variable);
    }

    pub fn variables(&self) -> &[LocalVariable] {
        &self.variables
    }
}

impl LocalVariables for LocalVariableTable {
    fn lookup(&self, slot: u16, offset: u32) -> Option<&LocalVariable> {
        self.variables
            .iter()
            .find(|var| var.slot == slot && var.covers(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(slot: u16, start_pc: u32, length: u32, descriptor_index: u16) -> LocalVariable {
        LocalVariable {
            slot,
            start_pc,
            length,
            name_index: 1,
            descriptor_index,
            signature_index: 0,
        }
    }

    #[test]
    fn test_lookup_respects_scope() {
        let table = LocalVariableTable::new(vec![var(1, 0, 10, 3), var(1, 10, 5, 4)]);
        assert_eq!(table.lookup(1, 0).map(|v| v.descriptor_index), Some(3));
        assert_eq!(table.lookup(1, 9).map(|v| v.descriptor_index), Some(3));
        assert_eq!(table.lookup(1, 10).map(|v| v.descriptor_index), Some(4));
        assert_eq!(table.lookup(1, 15), None);
        assert_eq!(table.lookup(2, 3), None);
    }

    #[test]
    fn test_generic_signature_wins() {
        let mut generic = var(0, 0, 4, 3);
        assert_eq!(generic.type_index(), Some(3));
        generic.signature_index = 9;
        assert_eq!(generic.type_index(), Some(9));
        generic.signature_index = 0;
        generic.descriptor_index = 0;
        assert_eq!(generic.type_index(), None);
    }
}
