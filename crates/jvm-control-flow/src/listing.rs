// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! A small assembler for textual method listings, used to write test inputs by hand.
//!
//! ```text
//! # comments start with a hash
//! .catch 0 8 11 java/lang/Exception
//! .local 1 0 14 count I
//! .line 3
//! 0: iload 1
//! 1: ifeq 8
//! 4: getstatic java/lang/System.out:Ljava/io/PrintStream;
//! 7: invokevirtual java/io/PrintStream.println()V
//! 8: return
//! ```
//!
//! Offsets are given explicitly. Member references are spelled out and interned into the
//! listing's own constant pool. `.catch` takes `start end handler` and a class name or `any`;
//! `.local` takes `slot start length name descriptor` and an optional generic signature; `.line`
//! sets the source line of the instructions that follow.

use crate::error::ListingError;
use jvm_bytecode_model::{
    opcodes::{self, *},
    Constant, ConstantPoolTable, ExceptionTableEntry, LocalVariable, LocalVariableTable,
    MethodBody, Operand, RawInstruction,
};
use once_cell::sync::Lazy;
use regex::Regex;

static INSTRUCTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+):\s*([a-z0-9_]+)(?:\s+(.*))?$").unwrap());
static DIRECTIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\.(\w+)\s*(.*)$").unwrap());
static FIELD_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([\w/$]+)\.([\w$<>]+):(\S+)$").unwrap());
static METHOD_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([\w/$]+)\.([\w$<>]+)(\(\S*\)\S+)$").unwrap());
static DYNAMIC_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([\w$<>]+)(\(\S*\)\S+)$").unwrap());
static CASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(-?\d+):(\d+)$").unwrap());

/// An assembled method together with the tables its code refers to.
#[derive(Clone, Debug, Default)]
pub struct MethodListing {
    pub body: MethodBody,
    pub constants: ConstantPoolTable,
    pub locals: LocalVariableTable,
}

pub fn parse_listing(text: &str) -> Result<MethodListing, ListingError> {
    let mut listing = MethodListing::default();
    let mut line_number: Option<u32> = None;
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let content = raw.trim();
        if content.is_empty() || content.starts_with('#') {
            continue;
        }
        if let Some(captures) = DIRECTIVE.captures(content) {
            let args: Vec<&str> = captures[2].split_whitespace().collect();
            match &captures[1] {
                "catch" => parse_catch(&mut listing, &args, line, content)?,
                "local" => parse_local(&mut listing, &args, line, content)?,
                "line" => {
                    line_number = Some(number(args.first().copied(), line, content)?);
                }
                other => {
                    return Err(ListingError::UnknownDirective {
                        line,
                        directive: other.to_string(),
                    })
                }
            }
            continue;
        }
        let captures = INSTRUCTION.captures(content).ok_or_else(|| syntax(line, content))?;
        let offset: u32 = number(Some(&captures[1]), line, content)?;
        let mnemonic = &captures[2];
        let opcode =
            opcodes::from_mnemonic(mnemonic).ok_or_else(|| ListingError::UnknownMnemonic {
                line,
                mnemonic: mnemonic.to_string(),
            })?;
        let operand_text = captures.get(3).map_or("", |m| m.as_str().trim());
        let operand = parse_operand(&mut listing.constants, opcode, operand_text).ok_or_else(|| {
            ListingError::InvalidOperand {
                line,
                mnemonic: mnemonic.to_string(),
                operand: operand_text.to_string(),
            }
        })?;
        let mut instruction = RawInstruction::new(offset, opcode, operand);
        if let Some(number) = line_number {
            instruction = instruction.with_line(number);
        }
        listing.body.code.push(instruction);
    }
    let last = listing.body.code.last().ok_or(ListingError::Empty)?;
    listing.body.code_length = last.offset + 1;
    Ok(listing)
}

fn syntax(line: usize, text: &str) -> ListingError {
    ListingError::Syntax {
        line,
        text: text.to_string(),
    }
}

fn number<T: std::str::FromStr>(
    text: Option<&str>,
    line: usize,
    content: &str,
) -> Result<T, ListingError> {
    text.and_then(|text| text.parse().ok())
        .ok_or_else(|| syntax(line, content))
}

fn parse_catch(
    listing: &mut MethodListing,
    args: &[&str],
    line: usize,
    content: &str,
) -> Result<(), ListingError> {
    let &[start, end, handler, class] = args else {
        return Err(syntax(line, content));
    };
    let catch_type = match class {
        "any" => None,
        name => Some(listing.constants.intern_class(name)),
    };
    listing.body.exception_table.push(ExceptionTableEntry {
        start: number(Some(start), line, content)?,
        end: number(Some(end), line, content)?,
        handler: number(Some(handler), line, content)?,
        catch_type,
    });
    Ok(())
}

fn parse_local(
    listing: &mut MethodListing,
    args: &[&str],
    line: usize,
    content: &str,
) -> Result<(), ListingError> {
    let (slot, start_pc, length, name, descriptor, signature) = match args {
        &[slot, start, length, name, descriptor] => (slot, start, length, name, descriptor, None),
        &[slot, start, length, name, descriptor, signature] => {
            (slot, start, length, name, descriptor, Some(signature))
        }
        _ => return Err(syntax(line, content)),
    };
    let constants = &mut listing.constants;
    let variable = LocalVariable {
        slot: number(Some(slot), line, content)?,
        start_pc: number(Some(start_pc), line, content)?,
        length: number(Some(length), line, content)?,
        name_index: constants.intern_utf8(name),
        descriptor_index: constants.intern_utf8(descriptor),
        signature_index: signature.map_or(0, |signature| constants.intern_utf8(signature)),
    };
    listing.locals.push(variable);
    Ok(())
}

/// Decodes the operand text of `opcode`, interning whatever it names. `None` means the text
/// does not fit the opcode.
fn parse_operand(constants: &mut ConstantPoolTable, opcode: u16, text: &str) -> Option<Operand> {
    let operand = match opcode {
        BIPUSH | SIPUSH => Operand::Int(text.parse().ok()?),
        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Operand::Local(text.parse().ok()?),
        IINC => {
            let (slot, delta) = split_pair(text)?;
            Operand::Iinc {
                slot: slot.parse().ok()?,
                delta: delta.parse().ok()?,
            }
        }
        LDC | LDC_W | LDC2_W => Operand::PoolIndex(parse_loadable(constants, text)?),
        GETSTATIC..=PUTFIELD => {
            let captures = FIELD_REF.captures(text)?;
            Operand::PoolIndex(constants.intern_field(&captures[1], &captures[2], &captures[3]))
        }
        INVOKEVIRTUAL..=INVOKEINTERFACE => {
            let captures = METHOD_REF.captures(text)?;
            let (owner, name, descriptor) = (&captures[1], &captures[2], &captures[3]);
            Operand::PoolIndex(if opcode == INVOKEINTERFACE {
                constants.intern_interface_method(owner, name, descriptor)
            } else {
                constants.intern_method(owner, name, descriptor)
            })
        }
        INVOKEDYNAMIC => {
            let captures = DYNAMIC_REF.captures(text)?;
            let name_and_type_index = constants.intern_name_and_type(&captures[1], &captures[2]);
            Operand::PoolIndex(constants.intern(Constant::InvokeDynamic {
                bootstrap_index: 0,
                name_and_type_index,
            }))
        }
        NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => {
            Operand::PoolIndex(constants.intern_class(class_name(text)?))
        }
        MULTIANEWARRAY => {
            let (class, dimensions) = split_pair(text)?;
            Operand::MultiArray {
                index: constants.intern_class(class_name(class)?),
                dimensions: dimensions.parse().ok()?,
            }
        }
        NEWARRAY => Operand::ArrayType(array_type(text)?),
        IFEQ..=JSR | IFNULL..=JSR_W => Operand::Branch(text.parse().ok()?),
        TABLESWITCH | LOOKUPSWITCH => parse_switch(text)?,
        _ if text.is_empty() => Operand::None,
        _ => return None,
    };
    Some(operand)
}

fn split_pair(text: &str) -> Option<(&str, &str)> {
    let mut parts = text.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(first), Some(second), None) => Some((first, second)),
        _ => None,
    }
}

fn class_name(text: &str) -> Option<&str> {
    (!text.is_empty() && !text.contains(char::is_whitespace)).then_some(text)
}

/// `ldc` operands: `"text"`, `class Name`, `12L`, `1.5f`, `2.5` or `2d`, a plain int, or a raw
/// pool reference `#7`.
fn parse_loadable(constants: &mut ConstantPoolTable, text: &str) -> Option<u16> {
    if let Some(index) = text.strip_prefix('#') {
        return index.parse().ok();
    }
    if let Some(quoted) = text.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) {
        return Some(constants.intern_string(quoted));
    }
    if let Some(name) = text.strip_prefix("class ") {
        return Some(constants.intern_class(class_name(name.trim())?));
    }
    let constant = if let Some(value) = text.strip_suffix(['L', 'l']) {
        Constant::Long(value.parse().ok()?)
    } else if let Some(value) = text.strip_suffix(['F', 'f']) {
        Constant::Float(value.parse().ok()?)
    } else if let Some(value) = text.strip_suffix(['D', 'd']) {
        Constant::Double(value.parse().ok()?)
    } else if text.contains('.') {
        Constant::Double(text.parse().ok()?)
    } else {
        Constant::Integer(text.parse().ok()?)
    };
    Some(constants.intern(constant))
}

fn array_type(text: &str) -> Option<u8> {
    let code = match text {
        "boolean" => 4,
        "char" => 5,
        "float" => 6,
        "double" => 7,
        "byte" => 8,
        "short" => 9,
        "int" => 10,
        "long" => 11,
        other => other.parse().ok()?,
    };
    Some(code)
}

/// `default key:target ...`, the same form [`RawInstruction`] prints.
fn parse_switch(text: &str) -> Option<Operand> {
    let mut parts = text.split_whitespace();
    let default = parts.next()?.parse().ok()?;
    let cases = parts
        .map(|part| {
            let captures = CASE.captures(part)?;
            Some((captures[1].parse().ok()?, captures[2].parse().ok()?))
        })
        .collect::<Option<Vec<(i32, u32)>>>()?;
    Some(Operand::Switch { default, cases })
}
