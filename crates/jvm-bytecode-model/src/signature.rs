// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! JVM type descriptors.

use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt};

/// A JVM field type descriptor, e.g. `I`, `[B` or `Ljava/lang/String;`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Signature(Cow<'static, str>);

impl Signature {
    pub const BOOLEAN: Signature = Signature(Cow::Borrowed("Z"));
    pub const BYTE: Signature = Signature(Cow::Borrowed("B"));
    pub const CHAR: Signature = Signature(Cow::Borrowed("C"));
    pub const SHORT: Signature = Signature(Cow::Borrowed("S"));
    pub const INT: Signature = Signature(Cow::Borrowed("I"));
    pub const LONG: Signature = Signature(Cow::Borrowed("J"));
    pub const FLOAT: Signature = Signature(Cow::Borrowed("F"));
    pub const DOUBLE: Signature = Signature(Cow::Borrowed("D"));
    pub const VOID: Signature = Signature(Cow::Borrowed("V"));
    pub const OBJECT: Signature = Signature(Cow::Borrowed("Ljava/lang/Object;"));
    pub const STRING: Signature = Signature(Cow::Borrowed("Ljava/lang/String;"));
    pub const CLASS: Signature = Signature(Cow::Borrowed("Ljava/lang/Class;"));
    pub const THROWABLE: Signature = Signature(Cow::Borrowed("Ljava/lang/Throwable;"));
    pub const METHOD_TYPE: Signature = Signature(Cow::Borrowed("Ljava/lang/invoke/MethodType;"));
    pub const METHOD_HANDLE: Signature =
        Signature(Cow::Borrowed("Ljava/lang/invoke/MethodHandle;"));

    pub fn new(descriptor: impl Into<Cow<'static, str>>) -> Self {
        Signature(descriptor.into())
    }

    /// The descriptor of a class given by its internal name (`java/lang/String`). Array class
    /// names are already descriptors and are kept as they are.
    pub fn from_internal_name(name: &str) -> Self {
        if name.starts_with('[') {
            Signature(Cow::Owned(name.to_string()))
        } else {
            Signature(Cow::Owned(format!("L{};", name)))
        }
    }

    /// The array type whose elements have this type.
    pub fn array_of(&self) -> Self {
        Signature(Cow::Owned(format!("[{}", self.0)))
    }

    /// The element type, if this is an array type.
    pub fn element_type(&self) -> Option<Signature> {
        self.0
            .strip_prefix('[')
            .map(|element| Signature(Cow::Owned(element.to_string())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_array(&self) -> bool {
        self.0.starts_with('[')
    }

    pub fn is_reference(&self) -> bool {
        self.0.starts_with('L') || self.is_array()
    }

    /// Whether a value of this type takes two operand stack slots.
    pub fn is_wide(&self) -> bool {
        matches!(self.as_str(), "J" | "D")
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A method descriptor split into parameter and return types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub parameters: Vec<Signature>,
    pub return_type: Signature,
}

impl MethodDescriptor {
    /// Parses `(IJLjava/lang/String;)V` style descriptors. Returns `None` on malformed input.
    pub fn parse(descriptor: &str) -> Option<Self> {
        let rest = descriptor.strip_prefix('(')?;
        let close = rest.find(')')?;
        let (mut params, ret) = (&rest[..close], &rest[close + 1..]);
        let mut parameters = vec![];
        while !params.is_empty() {
            let len = field_type_len(params)?;
            parameters.push(Signature::new(params[..len].to_string()));
            params = &params[len..];
        }
        if ret != "V" && field_type_len(ret)? != ret.len() {
            return None;
        }
        Some(MethodDescriptor {
            parameters,
            return_type: Signature::new(ret.to_string()),
        })
    }

    pub fn returns_value(&self) -> bool {
        self.return_type != Signature::VOID
    }
}

/// Length in bytes of the leading field type of `descriptor`.
fn field_type_len(descriptor: &str) -> Option<usize> {
    let dims = descriptor.bytes().take_while(|b| *b == b'[').count();
    match descriptor.as_bytes().get(dims)? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => Some(dims + 1),
        b'L' => descriptor[dims..].find(';').map(|end| dims + end + 1),
        _ => None,
    }
}

/// The element descriptor for a `newarray` type code.
pub fn primitive_array_element(atype: u8) -> Option<Signature> {
    Some(match atype {
        4 => Signature::BOOLEAN,
        5 => Signature::CHAR,
        6 => Signature::FLOAT,
        7 => Signature::DOUBLE,
        8 => Signature::BYTE,
        9 => Signature::SHORT,
        10 => Signature::INT,
        11 => Signature::LONG,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_descriptor_parsing() {
        let desc = MethodDescriptor::parse("(I[JLjava/lang/String;[[Ljava/lang/Object;)Z").unwrap();
        assert_eq!(
            desc.parameters,
            vec![
                Signature::INT,
                Signature::new("[J"),
                Signature::STRING,
                Signature::new("[[Ljava/lang/Object;"),
            ]
        );
        assert_eq!(desc.return_type, Signature::BOOLEAN);
        assert!(desc.returns_value());

        let void = MethodDescriptor::parse("()V").unwrap();
        assert!(void.parameters.is_empty());
        assert!(!void.returns_value());

        assert_eq!(MethodDescriptor::parse("(Q)V"), None);
        assert_eq!(MethodDescriptor::parse("(I"), None);
        assert_eq!(MethodDescriptor::parse("()Ljava/lang/String"), None);
    }

    #[test]
    fn test_class_and_array_descriptors() {
        assert_eq!(Signature::from_internal_name("java/lang/String"), Signature::STRING);
        assert_eq!(Signature::from_internal_name("[I"), Signature::new("[I"));
        assert_eq!(Signature::INT.array_of().element_type(), Some(Signature::INT));
        assert_eq!(Signature::INT.element_type(), None);
        assert!(Signature::LONG.is_wide());
        assert!(!Signature::OBJECT.is_wide());
    }
}
