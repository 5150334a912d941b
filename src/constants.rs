//! Values that flow through the visitor calls: loadable constants, method handles, annotation
//! element values, and type annotation targets

/// Kind of a method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4.8
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl HandleKind {
    /// The `reference_kind` byte of a `CONSTANT_MethodHandle_info`
    pub fn tag(&self) -> u8 {
        match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        }
    }

    pub fn from_tag(tag: u8) -> Option<HandleKind> {
        let kind = match tag {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            _ => return None,
        };
        Some(kind)
    }

    /// Does the handle refer to a field (as opposed to a method)?
    pub fn is_field(&self) -> bool {
        self.tag() <= HandleKind::PutStatic.tag()
    }
}

/// Reference to a field or method, as loaded by `ldc` or passed to a bootstrap method
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Handle {
    pub kind: HandleKind,
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub is_interface: bool,
}

/// Dynamically-computed constant (`CONSTANT_Dynamic_info`)
#[derive(Clone, PartialEq, Debug)]
pub struct ConstantDynamic {
    pub name: String,
    pub descriptor: String,
    pub bootstrap_method: Handle,
    pub bootstrap_arguments: Vec<ConstantValue>,
}

impl ConstantDynamic {
    /// Number of stack slots the constant takes
    pub fn size(&self) -> usize {
        match self.descriptor.as_str() {
            "J" | "D" => 2,
            _ => 1,
        }
    }
}

/// Loadable constant
///
/// These are the operands of `ldc`, the bootstrap method arguments, and the values of the
/// `ConstantValue` attribute on fields (which only accepts the numeric and string variants).
#[derive(Clone, PartialEq, Debug)]
pub enum ConstantValue {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),

    /// Internal name of a class, or descriptor of an array type
    Class(String),

    /// Method descriptor
    MethodType(String),

    Handle(Handle),
    Dynamic(Box<ConstantDynamic>),
}

impl ConstantValue {
    /// Does loading this constant push a `long` or `double`?
    pub fn is_wide(&self) -> bool {
        match self {
            ConstantValue::Long(_) | ConstantValue::Double(_) => true,
            ConstantValue::Dynamic(dynamic) => dynamic.size() == 2,
            _ => false,
        }
    }
}

/// Primitive, string, or class element value of an annotation
///
/// Enums, nested annotations, and arrays have their own calls on `AnnotationVisitor`.
#[derive(Clone, PartialEq, Debug)]
pub enum AnnotationValue {
    Byte(i8),
    Char(u16),
    Double(f64),
    Float(f32),
    Int(i32),
    Long(i64),
    Short(i16),
    Boolean(bool),
    String(String),

    /// Return descriptor of the class (eg. `Ljava/lang/String;`, `I` or `V`)
    Class(String),
}

/// Target of a type annotation, packed as in the `target_type` and `target_info` items
///
/// The sort is in the top byte. The remaining bits depend on the sort: a type parameter index,
/// a formal parameter index, a bound index, a supertype index, an exception table index, or a
/// type argument index. Bytecode offsets are never stored here: they are implied by the
/// position of the visitor call.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct TypeReference(pub u32);

impl TypeReference {
    pub const CLASS_TYPE_PARAMETER: u8 = 0x00;
    pub const METHOD_TYPE_PARAMETER: u8 = 0x01;
    pub const CLASS_EXTENDS: u8 = 0x10;
    pub const CLASS_TYPE_PARAMETER_BOUND: u8 = 0x11;
    pub const METHOD_TYPE_PARAMETER_BOUND: u8 = 0x12;
    pub const FIELD: u8 = 0x13;
    pub const METHOD_RETURN: u8 = 0x14;
    pub const METHOD_RECEIVER: u8 = 0x15;
    pub const METHOD_FORMAL_PARAMETER: u8 = 0x16;
    pub const THROWS: u8 = 0x17;
    pub const LOCAL_VARIABLE: u8 = 0x40;
    pub const RESOURCE_VARIABLE: u8 = 0x41;
    pub const EXCEPTION_PARAMETER: u8 = 0x42;
    pub const INSTANCEOF: u8 = 0x43;
    pub const NEW: u8 = 0x44;
    pub const CONSTRUCTOR_REFERENCE: u8 = 0x45;
    pub const METHOD_REFERENCE: u8 = 0x46;
    pub const CAST: u8 = 0x47;
    pub const CONSTRUCTOR_INVOCATION_TYPE_ARGUMENT: u8 = 0x48;
    pub const METHOD_INVOCATION_TYPE_ARGUMENT: u8 = 0x49;
    pub const CONSTRUCTOR_REFERENCE_TYPE_ARGUMENT: u8 = 0x4A;
    pub const METHOD_REFERENCE_TYPE_ARGUMENT: u8 = 0x4B;

    pub fn new(sort: u8) -> TypeReference {
        TypeReference((sort as u32) << 24)
    }

    pub fn sort(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Reference to the `index`-th entry of the exception table (for `EXCEPTION_PARAMETER`)
    pub fn exception_parameter(index: u16) -> TypeReference {
        TypeReference((TypeReference::EXCEPTION_PARAMETER as u32) << 24 | (index as u32) << 8)
    }

    pub fn exception_index(&self) -> u16 {
        ((self.0 & 0x00FF_FF00) >> 8) as u16
    }

    /// Same reference with the exception table index replaced
    pub fn with_exception_index(&self, index: u16) -> TypeReference {
        TypeReference(self.0 & 0xFF00_00FF | (index as u32) << 8)
    }
}

/// One step in a [`TypePath`]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct TypePathStep {
    pub kind: u8,
    pub type_argument_index: u8,
}

/// Path to the annotated part of a type (eg. the `String` inside `List<String>`)
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct TypePath {
    pub steps: Vec<TypePathStep>,
}

impl TypePath {
    pub const ARRAY_ELEMENT: u8 = 0;
    pub const INNER_TYPE: u8 = 1;
    pub const WILDCARD_BOUND: u8 = 2;
    pub const TYPE_ARGUMENT: u8 = 3;
}

#[cfg(test)]
mod constants_tests {
    use super::*;

    #[test]
    fn handle_kinds() {
        for tag in 1..=9 {
            assert_eq!(HandleKind::from_tag(tag).map(|k| k.tag()), Some(tag));
        }
        assert_eq!(HandleKind::from_tag(0), None);
        assert!(HandleKind::PutStatic.is_field());
        assert!(!HandleKind::InvokeVirtual.is_field());
    }

    #[test]
    fn exception_parameter_references() {
        let reference = TypeReference::exception_parameter(3);
        assert_eq!(reference.sort(), TypeReference::EXCEPTION_PARAMETER);
        assert_eq!(reference.exception_index(), 3);
        assert_eq!(reference.with_exception_index(7).exception_index(), 7);
    }
}
