// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! JVM opcode numbers and their mnemonics.
//!
//! Opcodes are kept as plain `u16` values so that instructions can carry the exact opcode they
//! were decoded from. The mnemonic table is used by the listing assembler and by diagnostics.

use bimap::BiMap;
use once_cell::sync::Lazy;

pub const NOP: u16 = 0;
pub const ACONST_NULL: u16 = 1;
pub const ICONST_M1: u16 = 2;
pub const ICONST_0: u16 = 3;
pub const ICONST_1: u16 = 4;
pub const ICONST_2: u16 = 5;
pub const ICONST_3: u16 = 6;
pub const ICONST_4: u16 = 7;
pub const ICONST_5: u16 = 8;
pub const LCONST_0: u16 = 9;
pub const LCONST_1: u16 = 10;
pub const FCONST_0: u16 = 11;
pub const FCONST_1: u16 = 12;
pub const FCONST_2: u16 = 13;
pub const DCONST_0: u16 = 14;
pub const DCONST_1: u16 = 15;
pub const BIPUSH: u16 = 16;
pub const SIPUSH: u16 = 17;
pub const LDC: u16 = 18;
pub const LDC_W: u16 = 19;
pub const LDC2_W: u16 = 20;
pub const ILOAD: u16 = 21;
pub const LLOAD: u16 = 22;
pub const FLOAD: u16 = 23;
pub const DLOAD: u16 = 24;
pub const ALOAD: u16 = 25;
pub const ILOAD_0: u16 = 26;
pub const ILOAD_1: u16 = 27;
pub const ILOAD_2: u16 = 28;
pub const ILOAD_3: u16 = 29;
pub const LLOAD_0: u16 = 30;
pub const LLOAD_1: u16 = 31;
pub const LLOAD_2: u16 = 32;
pub const LLOAD_3: u16 = 33;
pub const FLOAD_0: u16 = 34;
pub const FLOAD_1: u16 = 35;
pub const FLOAD_2: u16 = 36;
pub const FLOAD_3: u16 = 37;
pub const DLOAD_0: u16 = 38;
pub const DLOAD_1: u16 = 39;
pub const DLOAD_2: u16 = 40;
pub const DLOAD_3: u16 = 41;
pub const ALOAD_0: u16 = 42;
pub const ALOAD_1: u16 = 43;
pub const ALOAD_2: u16 = 44;
pub const ALOAD_3: u16 = 45;
pub const IALOAD: u16 = 46;
pub const LALOAD: u16 = 47;
pub const FALOAD: u16 = 48;
pub const DALOAD: u16 = 49;
pub const AALOAD: u16 = 50;
pub const BALOAD: u16 = 51;
pub const CALOAD: u16 = 52;
pub const SALOAD: u16 = 53;
pub const ISTORE: u16 = 54;
pub const LSTORE: u16 = 55;
pub const FSTORE: u16 = 56;
pub const DSTORE: u16 = 57;
pub const ASTORE: u16 = 58;
pub const ISTORE_0: u16 = 59;
pub const ISTORE_1: u16 = 60;
pub const ISTORE_2: u16 = 61;
pub const ISTORE_3: u16 = 62;
pub const LSTORE_0: u16 = 63;
pub const LSTORE_1: u16 = 64;
pub const LSTORE_2: u16 = 65;
pub const LSTORE_3: u16 = 66;
pub const FSTORE_0: u16 = 67;
pub const FSTORE_1: u16 = 68;
pub const FSTORE_2: u16 = 69;
pub const FSTORE_3: u16 = 70;
pub const DSTORE_0: u16 = 71;
pub const DSTORE_1: u16 = 72;
pub const DSTORE_2: u16 = 73;
pub const DSTORE_3: u16 = 74;
pub const ASTORE_0: u16 = 75;
pub const ASTORE_1: u16 = 76;
pub const ASTORE_2: u16 = 77;
pub const ASTORE_3: u16 = 78;
pub const IASTORE: u16 = 79;
pub const LASTORE: u16 = 80;
pub const FASTORE: u16 = 81;
pub const DASTORE: u16 = 82;
pub const AASTORE: u16 = 83;
pub const BASTORE: u16 = 84;
pub const CASTORE: u16 = 85;
pub const SASTORE: u16 = 86;
pub const POP: u16 = 87;
pub const POP2: u16 = 88;
pub const DUP: u16 = 89;
pub const DUP_X1: u16 = 90;
pub const DUP_X2: u16 = 91;
pub const DUP2: u16 = 92;
pub const DUP2_X1: u16 = 93;
pub const DUP2_X2: u16 = 94;
pub const SWAP: u16 = 95;
pub const IADD: u16 = 96;
pub const LADD: u16 = 97;
pub const FADD: u16 = 98;
pub const DADD: u16 = 99;
pub const ISUB: u16 = 100;
pub const LSUB: u16 = 101;
pub const FSUB: u16 = 102;
pub const DSUB: u16 = 103;
pub const IMUL: u16 = 104;
pub const LMUL: u16 = 105;
pub const FMUL: u16 = 106;
pub const DMUL: u16 = 107;
pub const IDIV: u16 = 108;
pub const LDIV: u16 = 109;
pub const FDIV: u16 = 110;
pub const DDIV: u16 = 111;
pub const IREM: u16 = 112;
pub const LREM: u16 = 113;
pub const FREM: u16 = 114;
pub const DREM: u16 = 115;
pub const INEG: u16 = 116;
pub const LNEG: u16 = 117;
pub const FNEG: u16 = 118;
pub const DNEG: u16 = 119;
pub const ISHL: u16 = 120;
pub const LSHL: u16 = 121;
pub const ISHR: u16 = 122;
pub const LSHR: u16 = 123;
pub const IUSHR: u16 = 124;
pub const LUSHR: u16 = 125;
pub const IAND: u16 = 126;
pub const LAND: u16 = 127;
pub const IOR: u16 = 128;
pub const LOR: u16 = 129;
pub const IXOR: u16 = 130;
pub const LXOR: u16 = 131;
pub const IINC: u16 = 132;
pub const I2L: u16 = 133;
pub const I2F: u16 = 134;
pub const I2D: u16 = 135;
pub const L2I: u16 = 136;
pub const L2F: u16 = 137;
pub const L2D: u16 = 138;
pub const F2I: u16 = 139;
pub const F2L: u16 = 140;
pub const F2D: u16 = 141;
pub const D2I: u16 = 142;
pub const D2L: u16 = 143;
pub const D2F: u16 = 144;
pub const I2B: u16 = 145;
pub const I2C: u16 = 146;
pub const I2S: u16 = 147;
pub const LCMP: u16 = 148;
pub const FCMPL: u16 = 149;
pub const FCMPG: u16 = 150;
pub const DCMPL: u16 = 151;
pub const DCMPG: u16 = 152;
pub const IFEQ: u16 = 153;
pub const IFNE: u16 = 154;
pub const IFLT: u16 = 155;
pub const IFGE: u16 = 156;
pub const IFGT: u16 = 157;
pub const IFLE: u16 = 158;
pub const IF_ICMPEQ: u16 = 159;
pub const IF_ICMPNE: u16 = 160;
pub const IF_ICMPLT: u16 = 161;
pub const IF_ICMPGE: u16 = 162;
pub const IF_ICMPGT: u16 = 163;
pub const IF_ICMPLE: u16 = 164;
pub const IF_ACMPEQ: u16 = 165;
pub const IF_ACMPNE: u16 = 166;
pub const GOTO: u16 = 167;
pub const JSR: u16 = 168;
pub const RET: u16 = 169;
pub const TABLESWITCH: u16 = 170;
pub const LOOKUPSWITCH: u16 = 171;
pub const IRETURN: u16 = 172;
pub const LRETURN: u16 = 173;
pub const FRETURN: u16 = 174;
pub const DRETURN: u16 = 175;
pub const ARETURN: u16 = 176;
pub const RETURN: u16 = 177;
pub const GETSTATIC: u16 = 178;
pub const PUTSTATIC: u16 = 179;
pub const GETFIELD: u16 = 180;
pub const PUTFIELD: u16 = 181;
pub const INVOKEVIRTUAL: u16 = 182;
pub const INVOKESPECIAL: u16 = 183;
pub const INVOKESTATIC: u16 = 184;
pub const INVOKEINTERFACE: u16 = 185;
pub const INVOKEDYNAMIC: u16 = 186;
pub const NEW: u16 = 187;
pub const NEWARRAY: u16 = 188;
pub const ANEWARRAY: u16 = 189;
pub const ARRAYLENGTH: u16 = 190;
pub const ATHROW: u16 = 191;
pub const CHECKCAST: u16 = 192;
pub const INSTANCEOF: u16 = 193;
pub const MONITORENTER: u16 = 194;
pub const MONITOREXIT: u16 = 195;
pub const WIDE: u16 = 196;
pub const MULTIANEWARRAY: u16 = 197;
pub const IFNULL: u16 = 198;
pub const IFNONNULL: u16 = 199;
pub const GOTO_W: u16 = 200;
pub const JSR_W: u16 = 201;

static MNEMONICS: Lazy<BiMap<u16, &'static str>> = Lazy::new(|| {
    let mut table = BiMap::new();
    table.insert(NOP, "nop");
    table.insert(ACONST_NULL, "aconst_null");
    table.insert(ICONST_M1, "iconst_m1");
    table.insert(ICONST_0, "iconst_0");
    table.insert(ICONST_1, "iconst_1");
    table.insert(ICONST_2, "iconst_2");
    table.insert(ICONST_3, "iconst_3");
    table.insert(ICONST_4, "iconst_4");
    table.insert(ICONST_5, "iconst_5");
    table.insert(LCONST_0, "lconst_0");
    table.insert(LCONST_1, "lconst_1");
    table.insert(FCONST_0, "fconst_0");
    table.insert(FCONST_1, "fconst_1");
    table.insert(FCONST_2, "fconst_2");
    table.insert(DCONST_0, "dconst_0");
    table.insert(DCONST_1, "dconst_1");
    table.insert(BIPUSH, "bipush");
    table.insert(SIPUSH, "sipush");
    table.insert(LDC, "ldc");
    table.insert(LDC_W, "ldc_w");
    table.insert(LDC2_W, "ldc2_w");
    table.insert(ILOAD, "iload");
    table.insert(LLOAD, "lload");
    table.insert(FLOAD, "fload");
    table.insert(DLOAD, "dload");
    table.insert(ALOAD, "aload");
    table.insert(ILOAD_0, "iload_0");
    table.insert(ILOAD_1, "iload_1");
    table.insert(ILOAD_2, "iload_2");
    table.insert(ILOAD_3, "iload_3");
    table.insert(LLOAD_0, "lload_0");
    table.insert(LLOAD_1, "lload_1");
    table.insert(LLOAD_2, "lload_2");
    table.insert(LLOAD_3, "lload_3");
    table.insert(FLOAD_0, "fload_0");
    table.insert(FLOAD_1, "fload_1");
    table.insert(FLOAD_2, "fload_2");
    table.insert(FLOAD_3, "fload_3");
    table.insert(DLOAD_0, "dload_0");
    table.insert(DLOAD_1, "dload_1");
    table.insert(DLOAD_2, "dload_2");
    table.insert(DLOAD_3, "dload_3");
    table.insert(ALOAD_0, "aload_0");
    table.insert(ALOAD_1, "aload_1");
    table.insert(ALOAD_2, "aload_2");
    table.insert(ALOAD_3, "aload_3");
    table.insert(IALOAD, "iaload");
    table.insert(LALOAD, "laload");
    table.insert(FALOAD, "faload");
    table.insert(DALOAD, "daload");
    table.insert(AALOAD, "aaload");
    table.insert(BALOAD, "baload");
    table.insert(CALOAD, "caload");
    table.insert(SALOAD, "saload");
    table.insert(ISTORE, "istore");
    table.insert(LSTORE, "lstore");
    table.insert(FSTORE, "fstore");
    table.insert(DSTORE, "dstore");
    table.insert(ASTORE, "astore");
    table.insert(ISTORE_0, "istore_0");
    table.insert(ISTORE_1, "istore_1");
    table.insert(ISTORE_2, "istore_2");
    table.insert(ISTORE_3, "istore_3");
    table.insert(LSTORE_0, "lstore_0");
    table.insert(LSTORE_1, "lstore_1");
    table.insert(LSTORE_2, "lstore_2");
    table.insert(LSTORE_3, "lstore_3");
    table.insert(FSTORE_0, "fstore_0");
    table.insert(FSTORE_1, "fstore_1");
    table.insert(FSTORE_2, "fstore_2");
    table.insert(FSTORE_3, "fstore_3");
    table.insert(DSTORE_0, "dstore_0");
    table.insert(DSTORE_1, "dstore_1");
    table.insert(DSTORE_2, "dstore_2");
    table.insert(DSTORE_3, "dstore_3");
    table.insert(ASTORE_0, "astore_0");
    table.insert(ASTORE_1, "astore_1");
    table.insert(ASTORE_2, "astore_2");
    table.insert(ASTORE_3, "astore_3");
    table.insert(IASTORE, "iastore");
    table.insert(LASTORE, "lastore");
    table.insert(FASTORE, "fastore");
    table.insert(DASTORE, "dastore");
    table.insert(AASTORE, "aastore");
    table.insert(BASTORE, "bastore");
    table.insert(CASTORE, "castore");
    table.insert(SASTORE, "sastore");
    table.insert(POP, "pop");
    table.insert(POP2, "pop2");
    table.insert(DUP, "dup");
    table.insert(DUP_X1, "dup_x1");
    table.insert(DUP_X2, "dup_x2");
    table.insert(DUP2, "dup2");
    table.insert(DUP2_X1, "dup2_x1");
    table.insert(DUP2_X2, "dup2_x2");
    table.insert(SWAP, "swap");
    table.insert(IADD, "iadd");
    table.insert(LADD, "ladd");
    table.insert(FADD, "fadd");
    table.insert(DADD, "dadd");
    table.insert(ISUB, "isub");
    table.insert(LSUB, "lsub");
    table.insert(FSUB, "fsub");
    table.insert(DSUB, "dsub");
    table.insert(IMUL, "imul");
    table.insert(LMUL, "lmul");
    table.insert(FMUL, "fmul");
    table.insert(DMUL, "dmul");
    table.insert(IDIV, "idiv");
    table.insert(LDIV, "ldiv");
    table.insert(FDIV, "fdiv");
    table.insert(DDIV, "ddiv");
    table.insert(IREM, "irem");
    table.insert(LREM, "lrem");
    table.insert(FREM, "frem");
    table.insert(DREM, "drem");
    table.insert(INEG, "ineg");
    table.insert(LNEG, "lneg");
    table.insert(FNEG, "fneg");
    table.insert(DNEG, "dneg");
    table.insert(ISHL, "ishl");
    table.insert(LSHL, "lshl");
    table.insert(ISHR, "ishr");
    table.insert(LSHR, "lshr");
    table.insert(IUSHR, "iushr");
    table.insert(LUSHR, "lushr");
    table.insert(IAND, "iand");
    table.insert(LAND, "land");
    table.insert(IOR, "ior");
    table.insert(LOR, "lor");
    table.insert(IXOR, "ixor");
    table.insert(LXOR, "lxor");
    table.insert(IINC, "iinc");
    table.insert(I2L, "i2l");
    table.insert(I2F, "i2f");
    table.insert(I2D, "i2d");
    table.insert(L2I, "l2i");
    table.insert(L2F, "l2f");
    table.insert(L2D, "l2d");
    table.insert(F2I, "f2i");
    table.insert(F2L, "f2l");
    table.insert(F2D, "f2d");
    table.insert(D2I, "d2i");
    table.insert(D2L, "d2l");
    table.insert(D2F, "d2f");
    table.insert(I2B, "i2b");
    table.insert(I2C, "i2c");
    table.insert(I2S, "i2s");
    table.insert(LCMP, "lcmp");
    table.insert(FCMPL, "fcmpl");
    table.insert(FCMPG, "fcmpg");
    table.insert(DCMPL, "dcmpl");
    table.insert(DCMPG, "dcmpg");
    table.insert(IFEQ, "ifeq");
    table.insert(IFNE, "ifne");
    table.insert(IFLT, "iflt");
    table.insert(IFGE, "ifge");
    table.insert(IFGT, "ifgt");
    table.insert(IFLE, "ifle");
    table.insert(IF_ICMPEQ, "if_icmpeq");
    table.insert(IF_ICMPNE, "if_icmpne");
    table.insert(IF_ICMPLT, "if_icmplt");
    table.insert(IF_ICMPGE, "if_icmpge");
    table.insert(IF_ICMPGT, "if_icmpgt");
    table.insert(IF_ICMPLE, "if_icmple");
    table.insert(IF_ACMPEQ, "if_acmpeq");
    table.insert(IF_ACMPNE, "if_acmpne");
    table.insert(GOTO, "goto");
    table.insert(JSR, "jsr");
    table.insert(RET, "ret");
    table.insert(TABLESWITCH, "tableswitch");
    table.insert(LOOKUPSWITCH, "lookupswitch");
    table.insert(IRETURN, "ireturn");
    table.insert(LRETURN, "lreturn");
    table.insert(FRETURN, "freturn");
    table.insert(DRETURN, "dreturn");
    table.insert(ARETURN, "areturn");
    table.insert(RETURN, "return");
    table.insert(GETSTATIC, "getstatic");
    table.insert(PUTSTATIC, "putstatic");
    table.insert(GETFIELD, "getfield");
    table.insert(PUTFIELD, "putfield");
    table.insert(INVOKEVIRTUAL, "invokevirtual");
    table.insert(INVOKESPECIAL, "invokespecial");
    table.insert(INVOKESTATIC, "invokestatic");
    table.insert(INVOKEINTERFACE, "invokeinterface");
    table.insert(INVOKEDYNAMIC, "invokedynamic");
    table.insert(NEW, "new");
    table.insert(NEWARRAY, "newarray");
    table.insert(ANEWARRAY, "anewarray");
    table.insert(ARRAYLENGTH, "arraylength");
    table.insert(ATHROW, "athrow");
    table.insert(CHECKCAST, "checkcast");
    table.insert(INSTANCEOF, "instanceof");
    table.insert(MONITORENTER, "monitorenter");
    table.insert(MONITOREXIT, "monitorexit");
    table.insert(WIDE, "wide");
    table.insert(MULTIANEWARRAY, "multianewarray");
    table.insert(IFNULL, "ifnull");
    table.insert(IFNONNULL, "ifnonnull");
    table.insert(GOTO_W, "goto_w");
    table.insert(JSR_W, "jsr_w");
    table
});

/// Returns the mnemonic of `opcode`, if it is a defined JVM opcode.
pub fn mnemonic(opcode: u16) -> Option<&'static str> {
    MNEMONICS.get_by_left(&opcode).copied()
}

/// Returns the opcode spelled by `mnemonic`.
pub fn from_mnemonic(mnemonic: &str) -> Option<u16> {
    MNEMONICS.get_by_right(mnemonic).copied()
}

/// The push-constant-int family whose literal carries no authoritative type of its own.
pub fn is_narrow_int_literal(opcode: u16) -> bool {
    matches!(opcode, ICONST_M1..=ICONST_5 | BIPUSH | SIPUSH)
}

pub fn is_conditional_branch(opcode: u16) -> bool {
    matches!(opcode, IFEQ..=IF_ACMPNE | IFNULL | IFNONNULL)
}

pub fn is_goto(opcode: u16) -> bool {
    matches!(opcode, GOTO | GOTO_W)
}

pub fn is_jsr(opcode: u16) -> bool {
    matches!(opcode, JSR | JSR_W)
}

pub fn is_switch(opcode: u16) -> bool {
    matches!(opcode, TABLESWITCH | LOOKUPSWITCH)
}

pub fn is_return(opcode: u16) -> bool {
    matches!(opcode, IRETURN..=RETURN)
}

/// Whether control never continues with the next instruction after `opcode`.
pub fn ends_flow(opcode: u16) -> bool {
    is_goto(opcode) || is_switch(opcode) || is_return(opcode) || matches!(opcode, ATHROW | RET)
}

/// Whether `opcode` ends a basic block.
pub fn ends_block(opcode: u16) -> bool {
    ends_flow(opcode) || is_conditional_branch(opcode) || is_jsr(opcode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mnemonic_table_is_bijective() {
        for opcode in NOP..=JSR_W {
            let name = mnemonic(opcode).unwrap();
            assert_eq!(from_mnemonic(name), Some(opcode));
        }
        assert_eq!(mnemonic(JSR_W + 1), None);
    }

    #[test]
    fn test_opcode_classes() {
        assert!(is_narrow_int_literal(ICONST_M1));
        assert!(is_narrow_int_literal(SIPUSH));
        assert!(!is_narrow_int_literal(LDC));
        assert!(is_conditional_branch(IFNONNULL));
        assert!(!is_conditional_branch(GOTO));
        assert!(ends_flow(ATHROW));
        assert!(!ends_flow(JSR));
        assert!(ends_block(JSR_W));
    }
}
