// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Read access to a class file's constant pool.
//!
//! The pool is produced by the class-file parser and never mutated by control flow analysis.
//! [`ConstantPoolTable`] is an in-memory implementation that also supports interning new
//! entries, which the listing assembler uses to author test inputs.

use crate::signature::Signature;
use std::collections::BTreeMap;

/// The lookups type inference and the CFG builder need from a constant pool. All indexes are
/// the 1-based indexes used by the bytecode.
pub trait ConstantPool {
    /// The string of a `CONSTANT_Utf8` entry.
    fn utf8(&self, index: u16) -> Option<&str>;

    /// The internal name of the class referenced by a `CONSTANT_Class` entry.
    fn class_name(&self, index: u16) -> Option<&str>;

    /// The descriptor of a field, method, interface method or invokedynamic reference.
    fn member_descriptor(&self, index: u16) -> Option<&str>;

    /// The simple name of a field, method, interface method or invokedynamic reference.
    fn member_name(&self, index: u16) -> Option<&str>;

    /// The type of the value an `ldc` of this entry pushes.
    fn loadable_signature(&self, index: u16) -> Option<Signature>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { utf8_index: u16 },
    FieldRef { class_index: u16, name_and_type_index: u16 },
    MethodRef { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    InvokeDynamic { bootstrap_index: u16, name_and_type_index: u16 },
    /// The unusable slot following a long or double entry.
    Gap,
}

impl Constant {
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// A constant pool backed by a vector of entries.
#[derive(Clone, Debug, Default)]
pub struct ConstantPoolTable {
    entries: Vec<Constant>,
    utf8_index: BTreeMap<String, u16>,
}

impl ConstantPoolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = Constant>) -> Self {
        let mut table = Self::new();
        for entry in entries {
            table.push(entry);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        let slot = usize::from(index).checked_sub(1)?;
        self.entries.get(slot).filter(|c| !matches!(c, Constant::Gap))
    }

    /// Appends an entry and returns its index. Long and double entries take two indexes.
    pub fn push(&mut self, constant: Constant) -> u16 {
        let wide = constant.is_wide();
        if let Constant::Utf8(text) = &constant {
            let index = (self.entries.len() + 1) as u16;
            self.utf8_index.entry(text.clone()).or_insert(index);
        }
        self.entries.push(constant);
        let index = self.entries.len() as u16;
        if wide {
            self.entries.push(Constant::Gap);
        }
        index
    }

    /// Returns the index of an existing equal entry, or appends a new one.
    pub fn intern(&mut self, constant: Constant) -> u16 {
        if let Constant::Utf8(text) = &constant {
            if let Some(index) = self.utf8_index.get(text) {
                return *index;
            }
        }
        match self.entries.iter().position(|c| *c == constant) {
            Some(pos) => (pos + 1) as u16,
            None => self.push(constant),
        }
    }

    pub fn intern_utf8(&mut self, text: &str) -> u16 {
        self.intern(Constant::Utf8(text.to_string()))
    }

    pub fn intern_class(&mut self, internal_name: &str) -> u16 {
        let name_index = self.intern_utf8(internal_name);
        self.intern(Constant::Class { name_index })
    }

    pub fn intern_string(&mut self, text: &str) -> u16 {
        let utf8_index = self.intern_utf8(text);
        self.intern(Constant::String { utf8_index })
    }

    pub fn intern_name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.intern_utf8(name);
        let descriptor_index = self.intern_utf8(descriptor);
        self.intern(Constant::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    pub fn intern_field(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.intern_class(owner);
        let name_and_type_index = self.intern_name_and_type(name, descriptor);
        self.intern(Constant::FieldRef {
            class_index,
            name_and_type_index,
        })
    }

    pub fn intern_method(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.intern_class(owner);
        let name_and_type_index = self.intern_name_and_type(name, descriptor);
        self.intern(Constant::MethodRef {
            class_index,
            name_and_type_index,
        })
    }

    pub fn intern_interface_method(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.intern_class(owner);
        let name_and_type_index = self.intern_name_and_type(name, descriptor);
        self.intern(Constant::InterfaceMethodRef {
            class_index,
            name_and_type_index,
        })
    }

    fn member_name_and_type(&self, index: u16) -> Option<(u16, u16)> {
        let name_and_type_index = match self.get(index)? {
            Constant::FieldRef {
                name_and_type_index,
                ..
            }
            | Constant::MethodRef {
                name_and_type_index,
                ..
            }
            | Constant::InterfaceMethodRef {
                name_and_type_index,
                ..
            }
            | Constant::InvokeDynamic {
                name_and_type_index,
                ..
            } => *name_and_type_index,
            _ => return None,
        };
        match self.get(name_and_type_index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Some((*name_index, *descriptor_index)),
            _ => None,
        }
    }
}

impl ConstantPool for ConstantPoolTable {
    fn utf8(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            Constant::Utf8(text) => Some(text),
            _ => None,
        }
    }

    fn class_name(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => None,
        }
    }

    fn member_descriptor(&self, index: u16) -> Option<&str> {
        let (_, descriptor_index) = self.member_name_and_type(index)?;
        self.utf8(descriptor_index)
    }

    fn member_name(&self, index: u16) -> Option<&str> {
        let (name_index, _) = self.member_name_and_type(index)?;
        self.utf8(name_index)
    }

    fn loadable_signature(&self, index: u16) -> Option<Signature> {
        Some(match self.get(index)? {
            Constant::Integer(_) => Signature::INT,
            Constant::Float(_) => Signature::FLOAT,
            Constant::Long(_) => Signature::LONG,
            Constant::Double(_) => Signature::DOUBLE,
            Constant::String { .. } => Signature::STRING,
            Constant::Class { .. } => Signature::CLASS,
            Constant::MethodType { .. } => Signature::METHOD_TYPE,
            Constant::MethodHandle { .. } => Signature::METHOD_HANDLE,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_reuses_entries() {
        let mut pool = ConstantPoolTable::new();
        let first = pool.intern_method("java/io/PrintStream", "println", "(I)V");
        let second = pool.intern_method("java/io/PrintStream", "println", "(I)V");
        assert_eq!(first, second);
        assert_eq!(pool.member_descriptor(first), Some("(I)V"));
        assert_eq!(pool.member_name(first), Some("println"));
        let class = pool.intern_class("java/io/PrintStream");
        assert_eq!(pool.class_name(class), Some("java/io/PrintStream"));
    }

    #[test]
    fn test_wide_entries_take_two_slots() {
        let mut pool = ConstantPoolTable::new();
        let long = pool.push(Constant::Long(7));
        let next = pool.push(Constant::Integer(1));
        assert_eq!(next, long + 2);
        assert_eq!(pool.get(long + 1), None);
        assert_eq!(pool.loadable_signature(long), Some(Signature::LONG));
        assert_eq!(pool.loadable_signature(next), Some(Signature::INT));
        assert_eq!(pool.loadable_signature(0), None);
    }
}
