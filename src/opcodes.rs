//! JVM opcodes, along with the internal opcodes used to stage long forward jumps
//!
//! Visitor instructions carry raw opcodes, so these are plain `u8` constants rather than an
//! enum. The classification in [`InsnKind`] drives both instruction decoding and the sizing
//! of instructions in the writer.

pub const NOP: u8 = 0;
pub const ACONST_NULL: u8 = 1;
pub const ICONST_M1: u8 = 2;
pub const ICONST_0: u8 = 3;
pub const ICONST_1: u8 = 4;
pub const ICONST_2: u8 = 5;
pub const ICONST_3: u8 = 6;
pub const ICONST_4: u8 = 7;
pub const ICONST_5: u8 = 8;
pub const LCONST_0: u8 = 9;
pub const LCONST_1: u8 = 10;
pub const FCONST_0: u8 = 11;
pub const FCONST_1: u8 = 12;
pub const FCONST_2: u8 = 13;
pub const DCONST_0: u8 = 14;
pub const DCONST_1: u8 = 15;
pub const BIPUSH: u8 = 16;
pub const SIPUSH: u8 = 17;
pub const LDC: u8 = 18;
pub const LDC_W: u8 = 19;
pub const LDC2_W: u8 = 20;
pub const ILOAD: u8 = 21;
pub const LLOAD: u8 = 22;
pub const FLOAD: u8 = 23;
pub const DLOAD: u8 = 24;
pub const ALOAD: u8 = 25;
pub const ILOAD_0: u8 = 26;
pub const ALOAD_3: u8 = 45;
pub const IALOAD: u8 = 46;
pub const LALOAD: u8 = 47;
pub const FALOAD: u8 = 48;
pub const DALOAD: u8 = 49;
pub const AALOAD: u8 = 50;
pub const BALOAD: u8 = 51;
pub const CALOAD: u8 = 52;
pub const SALOAD: u8 = 53;
pub const ISTORE: u8 = 54;
pub const LSTORE: u8 = 55;
pub const FSTORE: u8 = 56;
pub const DSTORE: u8 = 57;
pub const ASTORE: u8 = 58;
pub const ISTORE_0: u8 = 59;
pub const ASTORE_3: u8 = 78;
pub const IASTORE: u8 = 79;
pub const LASTORE: u8 = 80;
pub const FASTORE: u8 = 81;
pub const DASTORE: u8 = 82;
pub const AASTORE: u8 = 83;
pub const BASTORE: u8 = 84;
pub const CASTORE: u8 = 85;
pub const SASTORE: u8 = 86;
pub const POP: u8 = 87;
pub const POP2: u8 = 88;
pub const DUP: u8 = 89;
pub const DUP_X1: u8 = 90;
pub const DUP_X2: u8 = 91;
pub const DUP2: u8 = 92;
pub const DUP2_X1: u8 = 93;
pub const DUP2_X2: u8 = 94;
pub const SWAP: u8 = 95;
pub const IADD: u8 = 96;
pub const LADD: u8 = 97;
pub const FADD: u8 = 98;
pub const DADD: u8 = 99;
pub const ISUB: u8 = 100;
pub const LSUB: u8 = 101;
pub const FSUB: u8 = 102;
pub const DSUB: u8 = 103;
pub const IMUL: u8 = 104;
pub const LMUL: u8 = 105;
pub const FMUL: u8 = 106;
pub const DMUL: u8 = 107;
pub const IDIV: u8 = 108;
pub const LDIV: u8 = 109;
pub const FDIV: u8 = 110;
pub const DDIV: u8 = 111;
pub const IREM: u8 = 112;
pub const LREM: u8 = 113;
pub const FREM: u8 = 114;
pub const DREM: u8 = 115;
pub const INEG: u8 = 116;
pub const LNEG: u8 = 117;
pub const FNEG: u8 = 118;
pub const DNEG: u8 = 119;
pub const ISHL: u8 = 120;
pub const LSHL: u8 = 121;
pub const ISHR: u8 = 122;
pub const LSHR: u8 = 123;
pub const IUSHR: u8 = 124;
pub const LUSHR: u8 = 125;
pub const IAND: u8 = 126;
pub const LAND: u8 = 127;
pub const IOR: u8 = 128;
pub const LOR: u8 = 129;
pub const IXOR: u8 = 130;
pub const LXOR: u8 = 131;
pub const IINC: u8 = 132;
pub const I2L: u8 = 133;
pub const I2F: u8 = 134;
pub const I2D: u8 = 135;
pub const L2I: u8 = 136;
pub const L2F: u8 = 137;
pub const L2D: u8 = 138;
pub const F2I: u8 = 139;
pub const F2L: u8 = 140;
pub const F2D: u8 = 141;
pub const D2I: u8 = 142;
pub const D2L: u8 = 143;
pub const D2F: u8 = 144;
pub const I2B: u8 = 145;
pub const I2C: u8 = 146;
pub const I2S: u8 = 147;
pub const LCMP: u8 = 148;
pub const FCMPL: u8 = 149;
pub const FCMPG: u8 = 150;
pub const DCMPL: u8 = 151;
pub const DCMPG: u8 = 152;
pub const IFEQ: u8 = 153;
pub const IFNE: u8 = 154;
pub const IFLT: u8 = 155;
pub const IFGE: u8 = 156;
pub const IFGT: u8 = 157;
pub const IFLE: u8 = 158;
pub const IF_ICMPEQ: u8 = 159;
pub const IF_ICMPNE: u8 = 160;
pub const IF_ICMPLT: u8 = 161;
pub const IF_ICMPGE: u8 = 162;
pub const IF_ICMPGT: u8 = 163;
pub const IF_ICMPLE: u8 = 164;
pub const IF_ACMPEQ: u8 = 165;
pub const IF_ACMPNE: u8 = 166;
pub const GOTO: u8 = 167;
pub const JSR: u8 = 168;
pub const RET: u8 = 169;
pub const TABLESWITCH: u8 = 170;
pub const LOOKUPSWITCH: u8 = 171;
pub const IRETURN: u8 = 172;
pub const LRETURN: u8 = 173;
pub const FRETURN: u8 = 174;
pub const DRETURN: u8 = 175;
pub const ARETURN: u8 = 176;
pub const RETURN: u8 = 177;
pub const GETSTATIC: u8 = 178;
pub const PUTSTATIC: u8 = 179;
pub const GETFIELD: u8 = 180;
pub const PUTFIELD: u8 = 181;
pub const INVOKEVIRTUAL: u8 = 182;
pub const INVOKESPECIAL: u8 = 183;
pub const INVOKESTATIC: u8 = 184;
pub const INVOKEINTERFACE: u8 = 185;
pub const INVOKEDYNAMIC: u8 = 186;
pub const NEW: u8 = 187;
pub const NEWARRAY: u8 = 188;
pub const ANEWARRAY: u8 = 189;
pub const ARRAYLENGTH: u8 = 190;
pub const ATHROW: u8 = 191;
pub const CHECKCAST: u8 = 192;
pub const INSTANCEOF: u8 = 193;
pub const MONITORENTER: u8 = 194;
pub const MONITOREXIT: u8 = 195;
pub const WIDE: u8 = 196;
pub const MULTIANEWARRAY: u8 = 197;
pub const IFNULL: u8 = 198;
pub const IFNONNULL: u8 = 199;
pub const GOTO_W: u8 = 200;
pub const JSR_W: u8 = 201;

/// Offset from a short jump opcode to its internal "unsigned offset" counterpart
///
/// `IFEQ..=JSR` map to `202..=217`, `IFNULL`/`IFNONNULL` map to `218`/`219` (see
/// [`ASM_IFNULL_OPCODE_DELTA`]). These only ever exist in the writer's output buffer between
/// the first and second serialization pass.
pub(crate) const ASM_OPCODE_DELTA: u8 = 49;
pub(crate) const ASM_IFNULL_OPCODE_DELTA: u8 = 20;
pub(crate) const ASM_IFEQ: u8 = IFEQ + ASM_OPCODE_DELTA;
pub(crate) const ASM_IFNULL: u8 = IFNULL + ASM_IFNULL_OPCODE_DELTA;
pub(crate) const ASM_IFNONNULL: u8 = IFNONNULL + ASM_IFNULL_OPCODE_DELTA;
pub(crate) const ASM_GOTO_W: u8 = 220;

/// Difference between `GOTO_W`/`JSR_W` and `GOTO`/`JSR`
pub(crate) const WIDE_JUMP_OPCODE_DELTA: u8 = GOTO_W - GOTO;

/// Element type codes of `NEWARRAY`
pub const T_BOOLEAN: u8 = 4;
pub const T_CHAR: u8 = 5;
pub const T_FLOAT: u8 = 6;
pub const T_DOUBLE: u8 = 7;
pub const T_BYTE: u8 = 8;
pub const T_SHORT: u8 = 9;
pub const T_INT: u8 = 10;
pub const T_LONG: u8 = 11;

/// How an instruction is laid out after its opcode byte
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum InsnKind {
    /// No operands
    NoArg,
    /// Implicit local variable (eg. `iload_2`)
    ImplicitVar,
    /// One signed byte (`bipush`, `newarray`)
    SignedByte,
    /// One signed short (`sipush`)
    Short,
    /// One unsigned byte local variable index
    Var,
    /// Class constant index (`new`, `anewarray`, `checkcast`, `instanceof`)
    Type,
    /// Field or method reference
    FieldOrMethod,
    /// `invokeinterface`, with its count and zero bytes
    InterfaceMethod,
    /// `invokedynamic`, with its two zero bytes
    InvokeDynamic,
    /// Signed 16-bit jump offset
    Label,
    /// Signed 32-bit jump offset
    WideLabel,
    /// Internal unsigned 16-bit forward jump offset
    AsmLabel,
    /// Internal 32-bit `goto_w`
    AsmWideLabel,
    /// One byte constant index
    Ldc,
    /// Two byte constant index (`ldc_w`, `ldc2_w`)
    WideLdc,
    Iinc,
    TableSwitch,
    LookupSwitch,
    MultiANewArray,
    Wide,
}

/// Classify an opcode, including the internal opcodes, or `None` for undefined opcodes
pub(crate) fn insn_kind(opcode: u8) -> Option<InsnKind> {
    let kind = match opcode {
        NOP..=DCONST_1 => InsnKind::NoArg,
        BIPUSH | NEWARRAY => InsnKind::SignedByte,
        SIPUSH => InsnKind::Short,
        LDC => InsnKind::Ldc,
        LDC_W | LDC2_W => InsnKind::WideLdc,
        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => InsnKind::Var,
        ILOAD_0..=ALOAD_3 | ISTORE_0..=ASTORE_3 => InsnKind::ImplicitVar,
        IALOAD..=SALOAD | IASTORE..=LXOR => InsnKind::NoArg,
        IINC => InsnKind::Iinc,
        I2L..=DCMPG => InsnKind::NoArg,
        IFEQ..=JSR | IFNULL | IFNONNULL => InsnKind::Label,
        TABLESWITCH => InsnKind::TableSwitch,
        LOOKUPSWITCH => InsnKind::LookupSwitch,
        IRETURN..=RETURN => InsnKind::NoArg,
        GETSTATIC..=INVOKESTATIC => InsnKind::FieldOrMethod,
        INVOKEINTERFACE => InsnKind::InterfaceMethod,
        INVOKEDYNAMIC => InsnKind::InvokeDynamic,
        NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => InsnKind::Type,
        ARRAYLENGTH | ATHROW | MONITORENTER | MONITOREXIT => InsnKind::NoArg,
        WIDE => InsnKind::Wide,
        MULTIANEWARRAY => InsnKind::MultiANewArray,
        GOTO_W | JSR_W => InsnKind::WideLabel,
        ASM_IFEQ..=ASM_IFNONNULL => InsnKind::AsmLabel,
        ASM_GOTO_W => InsnKind::AsmWideLabel,
        _ => return None,
    };
    Some(kind)
}

/// Opcode of the conditional jump with the opposite condition
///
/// Only valid for `IFEQ..=IF_ACMPNE`, `IFNULL` and `IFNONNULL`.
pub(crate) fn opposite_jump(opcode: u8) -> u8 {
    if opcode < GOTO {
        ((opcode + 1) ^ 1) - 1
    } else {
        opcode ^ 1
    }
}

/// Net change in stack size (in slots) for instructions whose effect does not depend on their
/// operands, or `None` for instructions which need their operands to figure this out
pub(crate) fn stack_size_delta(opcode: u8) -> Option<i32> {
    let delta = match opcode {
        NOP => 0,
        ACONST_NULL..=ICONST_5 => 1,
        LCONST_0 | LCONST_1 => 2,
        FCONST_0..=FCONST_2 => 1,
        DCONST_0 | DCONST_1 => 2,
        BIPUSH | SIPUSH => 1,
        ILOAD | FLOAD | ALOAD => 1,
        LLOAD | DLOAD => 2,
        IALOAD | FALOAD | AALOAD | BALOAD | CALOAD | SALOAD => -1,
        LALOAD | DALOAD => 0,
        ISTORE | FSTORE | ASTORE => -1,
        LSTORE | DSTORE => -2,
        IASTORE | FASTORE | AASTORE | BASTORE | CASTORE | SASTORE => -3,
        LASTORE | DASTORE => -4,
        POP => -1,
        POP2 => -2,
        DUP | DUP_X1 | DUP_X2 => 1,
        DUP2 | DUP2_X1 | DUP2_X2 => 2,
        SWAP => 0,
        IADD | FADD | ISUB | FSUB | IMUL | FMUL | IDIV | FDIV | IREM | FREM => -1,
        LADD | DADD | LSUB | DSUB | LMUL | DMUL | LDIV | DDIV | LREM | DREM => -2,
        INEG | LNEG | FNEG | DNEG => 0,
        ISHL | ISHR | IUSHR | LSHL | LSHR | LUSHR => -1,
        IAND | IOR | IXOR => -1,
        LAND | LOR | LXOR => -2,
        IINC => 0,
        I2L | I2D | F2L | F2D => 1,
        I2F | L2D | F2I | D2L | I2B | I2C | I2S => 0,
        L2I | L2F | D2I | D2F => -1,
        LCMP | DCMPL | DCMPG => -3,
        FCMPL | FCMPG => -1,
        IFEQ..=IFLE => -1,
        IF_ICMPEQ..=IF_ACMPNE => -2,
        GOTO => 0,
        JSR => 1,
        RET => 0,
        TABLESWITCH | LOOKUPSWITCH => -1,
        IRETURN | FRETURN | ARETURN => -1,
        LRETURN | DRETURN => -2,
        RETURN => 0,
        NEW => 1,
        NEWARRAY | ANEWARRAY | ARRAYLENGTH => 0,
        ATHROW => 0,
        CHECKCAST | INSTANCEOF => 0,
        MONITORENTER | MONITOREXIT => -1,
        IFNULL | IFNONNULL => -1,
        GOTO_W => 0,
        JSR_W => 1,
        _ => return None,
    };
    Some(delta)
}
