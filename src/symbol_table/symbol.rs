/// Tags of constant pool entries
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
pub(crate) const CONSTANT_UTF8_TAG: u8 = 1;
pub(crate) const CONSTANT_INTEGER_TAG: u8 = 3;
pub(crate) const CONSTANT_FLOAT_TAG: u8 = 4;
pub(crate) const CONSTANT_LONG_TAG: u8 = 5;
pub(crate) const CONSTANT_DOUBLE_TAG: u8 = 6;
pub(crate) const CONSTANT_CLASS_TAG: u8 = 7;
pub(crate) const CONSTANT_STRING_TAG: u8 = 8;
pub(crate) const CONSTANT_FIELDREF_TAG: u8 = 9;
pub(crate) const CONSTANT_METHODREF_TAG: u8 = 10;
pub(crate) const CONSTANT_INTERFACE_METHODREF_TAG: u8 = 11;
pub(crate) const CONSTANT_NAME_AND_TYPE_TAG: u8 = 12;
pub(crate) const CONSTANT_METHOD_HANDLE_TAG: u8 = 15;
pub(crate) const CONSTANT_METHOD_TYPE_TAG: u8 = 16;
pub(crate) const CONSTANT_DYNAMIC_TAG: u8 = 17;
pub(crate) const CONSTANT_INVOKE_DYNAMIC_TAG: u8 = 18;
pub(crate) const CONSTANT_MODULE_TAG: u8 = 19;
pub(crate) const CONSTANT_PACKAGE_TAG: u8 = 20;

/// Entry of the symbol table
///
/// Two structurally equal symbols always get the same index. Constant pool entries, bootstrap
/// methods, and frame-computation types live in separate index spaces, but share the same
/// hash map (the variant tells them apart).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Symbol {
    Utf8(String),
    Integer(i32),

    /// Bits of the float (so that `NaN`s and `-0.0` are interned exactly)
    Float(u32),
    Long(i64),

    /// Bits of the double
    Double(u64),
    Class(String),
    String(String),
    MethodType(String),
    Module(String),
    Package(String),
    FieldRef {
        owner: String,
        name: String,
        descriptor: String,
    },
    MethodRef {
        owner: String,
        name: String,
        descriptor: String,
    },
    InterfaceMethodRef {
        owner: String,
        name: String,
        descriptor: String,
    },
    NameAndType {
        name: String,
        descriptor: String,
    },
    MethodHandle {
        reference_kind: u8,
        owner: String,
        name: String,
        descriptor: String,
        is_interface: bool,
    },
    Dynamic {
        name: String,
        descriptor: String,
        bootstrap_method_index: u16,
    },
    InvokeDynamic {
        name: String,
        descriptor: String,
        bootstrap_method_index: u16,
    },

    /// Entry of the `BootstrapMethods` attribute (constant pool indices)
    BootstrapMethod {
        method_handle: u16,
        arguments: Vec<u16>,
    },

    /// Internal name of a class or descriptor of an array (frame computation only)
    Type(String),

    /// Object created by the `new` at the given bytecode offset, before its constructor call
    UninitializedType {
        name: String,
        bytecode_offset: u32,
    },

    /// Pair of type indices, smallest first, whose merge has been computed
    MergedType(u32, u32),
}

impl Symbol {
    /// Number of constant pool slots the entry takes
    pub(crate) fn width(&self) -> u32 {
        match self {
            Symbol::Long(_) | Symbol::Double(_) => 2,
            _ => 1,
        }
    }
}
