use crate::label::Label;
use crate::Version;
use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// A read ran past the end of the class file
    UnexpectedEof { offset: usize },

    /// The class file does not start with `0xCAFEBABE`
    InvalidMagic { found: u32 },

    /// The major version is newer than what we can decode
    UnsupportedVersion(Version),

    InvalidConstantTag { tag: u8, offset: usize },

    /// A constant pool reference is out of bounds, or points at the wrong kind of constant
    InvalidConstantIndex { index: u16, offset: usize },

    InvalidOpcode { opcode: u8, offset: usize },

    /// A jump, switch, exception handler or debug entry points outside of the method body
    InvalidBranchTarget { target: i64, offset: usize },

    InvalidStackMapFrame { frame_type: u8, offset: usize },
    InvalidVerificationType { tag: u8, offset: usize },
    InvalidElementValue { tag: u8, offset: usize },
    InvalidTypeAnnotationTarget { target: u8, offset: usize },

    /// Malformed field or method descriptor
    InvalidDescriptor(String),

    /// The constant pool has more entries than can be addressed with a `u16`
    ConstantPoolOverflow {
        class_name: String,
        constant_pool_count: usize,
    },

    /// A method body is longer than the 65535 bytes allowed in a `Code` attribute
    MethodCodeOverflow {
        class_name: String,
        method_name: String,
        descriptor: String,
        code_length: usize,
    },

    /// A string constant encodes to more than 65535 bytes of modified UTF-8
    Utf8Overflow { length: usize },

    /// `jsr`/`ret` cannot be simulated when computing stack map frames
    SubroutinesUnsupported { opcode: u8 },

    /// A stack map frame cannot be encoded (eg. compressed frames before Java 6)
    InvalidFrame(String),

    /// A label was referenced by a method body but never visited
    UnresolvedLabel(Label),

    IoError(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnexpectedEof { offset } => {
                write!(f, "unexpected end of class file at byte {}", offset)
            }
            Error::InvalidMagic { found } => write!(f, "invalid magic number {:#010x}", found),
            Error::UnsupportedVersion(version) => {
                write!(f, "unsupported class file version {:?}", version)
            }
            Error::InvalidConstantTag { tag, offset } => {
                write!(f, "invalid constant tag {} at byte {}", tag, offset)
            }
            Error::InvalidConstantIndex { index, offset } => {
                write!(f, "invalid constant pool index {} at byte {}", index, offset)
            }
            Error::InvalidOpcode { opcode, offset } => {
                write!(f, "invalid opcode {} at bytecode offset {}", opcode, offset)
            }
            Error::InvalidBranchTarget { target, offset } => write!(
                f,
                "branch target {} out of bounds at bytecode offset {}",
                target, offset
            ),
            Error::InvalidStackMapFrame { frame_type, offset } => {
                write!(f, "invalid stack map frame type {} at byte {}", frame_type, offset)
            }
            Error::InvalidVerificationType { tag, offset } => {
                write!(f, "invalid verification type {} at byte {}", tag, offset)
            }
            Error::InvalidElementValue { tag, offset } => write!(
                f,
                "invalid annotation element tag '{}' at byte {}",
                *tag as char, offset
            ),
            Error::InvalidTypeAnnotationTarget { target, offset } => write!(
                f,
                "invalid type annotation target {:#04x} at byte {}",
                target, offset
            ),
            Error::InvalidDescriptor(descriptor) => write!(f, "invalid descriptor: {}", descriptor),
            Error::ConstantPoolOverflow {
                class_name,
                constant_pool_count,
            } => write!(
                f,
                "class {} has too many constants ({})",
                class_name, constant_pool_count
            ),
            Error::MethodCodeOverflow {
                class_name,
                method_name,
                descriptor,
                code_length,
            } => write!(
                f,
                "method {}.{}{} has too much code ({} bytes)",
                class_name, method_name, descriptor, code_length
            ),
            Error::Utf8Overflow { length } => {
                write!(f, "string constant too large ({} bytes)", length)
            }
            Error::SubroutinesUnsupported { opcode } => write!(
                f,
                "opcode {} (jsr/ret) is not supported when computing frames",
                opcode
            ),
            Error::InvalidFrame(msg) => write!(f, "invalid stack map frame: {}", msg),
            Error::UnresolvedLabel(label) => write!(f, "label {:?} was never visited", label),
            Error::IoError(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}
