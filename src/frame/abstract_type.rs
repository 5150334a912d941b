use crate::errors::Error;
use crate::symbol_table::SymbolTable;
use std::fmt;

/// Verification type tags (`verification_type_info` items), plus the primitive array element
/// types that only ever appear with a non-zero array dimension
pub(crate) const ITEM_TOP: i32 = 0;
pub(crate) const ITEM_INTEGER: i32 = 1;
pub(crate) const ITEM_FLOAT: i32 = 2;
pub(crate) const ITEM_DOUBLE: i32 = 3;
pub(crate) const ITEM_LONG: i32 = 4;
pub(crate) const ITEM_NULL: i32 = 5;
pub(crate) const ITEM_UNINITIALIZED_THIS: i32 = 6;
pub(crate) const ITEM_OBJECT: i32 = 7;
pub(crate) const ITEM_UNINITIALIZED: i32 = 8;
pub(crate) const ITEM_BOOLEAN: i32 = 9;
pub(crate) const ITEM_BYTE: i32 = 10;
pub(crate) const ITEM_CHAR: i32 = 11;
pub(crate) const ITEM_SHORT: i32 = 12;

const DIM_SIZE: i32 = 6;
const KIND_SIZE: i32 = 4;
const FLAGS_SIZE: i32 = 2;
const VALUE_SIZE: i32 = 32 - KIND_SIZE - DIM_SIZE - FLAGS_SIZE;

const DIM_SHIFT: i32 = KIND_SIZE + FLAGS_SIZE + VALUE_SIZE;
const KIND_SHIFT: i32 = FLAGS_SIZE + VALUE_SIZE;
const FLAGS_SHIFT: i32 = VALUE_SIZE;

const DIM_MASK: i32 = ((1 << DIM_SIZE) - 1) << DIM_SHIFT;
const KIND_MASK: i32 = ((1 << KIND_SIZE) - 1) << KIND_SHIFT;
const VALUE_MASK: i32 = (1 << VALUE_SIZE) - 1;

const ARRAY_OF: i32 = 1 << DIM_SHIFT;
const ELEMENT_OF: i32 = -1 << DIM_SHIFT;

pub(crate) const CONSTANT_KIND: i32 = 1 << KIND_SHIFT;
pub(crate) const REFERENCE_KIND: i32 = 2 << KIND_SHIFT;
pub(crate) const UNINITIALIZED_KIND: i32 = 3 << KIND_SHIFT;
pub(crate) const LOCAL_KIND: i32 = 4 << KIND_SHIFT;
pub(crate) const STACK_KIND: i32 = 5 << KIND_SHIFT;

/// When a forwarded local resolves to a `long` or `double`, it actually holds `Top`: its first
/// half was overwritten by a store to the preceding local
const TOP_IF_LONG_OR_DOUBLE_FLAG: i32 = 1 << FLAGS_SHIFT;

/// Type of a local variable or stack slot, as tracked while computing frames
///
/// This packs 4 fields in an `i32`:
///
/// ```text
///   DIM   KIND FLAGS       VALUE
/// [31-26][25-22][21-20][19-------0]
/// ```
///
///   - `DIM` is a signed number of array dimensions (relative, for the `LOCAL` and `STACK`
///     kinds, in which case it can be negative)
///   - `KIND` is one of `CONSTANT` (the value is an `ITEM_*` tag), `REFERENCE` (the value is
///     an index in the symbol table's type table), `UNINITIALIZED` (same, but pointing at an
///     uninitialized type), `LOCAL` (the value is the index of an input local of the basic
///     block) or `STACK` (the value is a position from the top of the input stack of the
///     basic block)
///   - `FLAGS` holds `TOP_IF_LONG_OR_DOUBLE_FLAG`
///
/// `LOCAL` and `STACK` types are placeholders: they can only be turned into concrete types
/// once the input frame of the basic block is known. The all-zeroes value means "unset".
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct AbstractType(i32);

impl AbstractType {
    pub const UNSET: AbstractType = AbstractType(0);
    pub const TOP: AbstractType = AbstractType(CONSTANT_KIND | ITEM_TOP);
    pub const BOOLEAN: AbstractType = AbstractType(CONSTANT_KIND | ITEM_BOOLEAN);
    pub const BYTE: AbstractType = AbstractType(CONSTANT_KIND | ITEM_BYTE);
    pub const CHAR: AbstractType = AbstractType(CONSTANT_KIND | ITEM_CHAR);
    pub const SHORT: AbstractType = AbstractType(CONSTANT_KIND | ITEM_SHORT);
    pub const INTEGER: AbstractType = AbstractType(CONSTANT_KIND | ITEM_INTEGER);
    pub const FLOAT: AbstractType = AbstractType(CONSTANT_KIND | ITEM_FLOAT);
    pub const LONG: AbstractType = AbstractType(CONSTANT_KIND | ITEM_LONG);
    pub const DOUBLE: AbstractType = AbstractType(CONSTANT_KIND | ITEM_DOUBLE);
    pub const NULL: AbstractType = AbstractType(CONSTANT_KIND | ITEM_NULL);
    pub const UNINITIALIZED_THIS: AbstractType =
        AbstractType(CONSTANT_KIND | ITEM_UNINITIALIZED_THIS);

    pub fn bits(self) -> i32 {
        self.0
    }

    pub fn is_unset(self) -> bool {
        self.0 == 0
    }

    pub fn kind(self) -> i32 {
        self.0 & KIND_MASK
    }

    /// Signed number of array dimensions
    pub fn dimensions(self) -> i32 {
        self.0 >> DIM_SHIFT
    }

    pub fn value(self) -> u32 {
        (self.0 & VALUE_MASK) as u32
    }

    pub fn is_long_or_double(self) -> bool {
        self == AbstractType::LONG || self == AbstractType::DOUBLE
    }

    /// Is this an object or array type (or a placeholder thereof)?
    pub fn is_reference_or_array(self) -> bool {
        self.0 & DIM_MASK != 0 || self.kind() == REFERENCE_KIND
    }

    /// Type whose value is the type table entry at the given index
    pub fn reference(type_index: u32) -> AbstractType {
        AbstractType(REFERENCE_KIND | type_index as i32)
    }

    pub fn uninitialized(type_index: u32) -> AbstractType {
        AbstractType(UNINITIALIZED_KIND | type_index as i32)
    }

    /// Placeholder for the type of an input local
    pub fn input_local(index: u16) -> AbstractType {
        AbstractType(LOCAL_KIND | index as i32)
    }

    /// Placeholder for the type of the `depth`-th input stack entry from the top (1 is the top)
    pub fn input_stack(depth: i32) -> AbstractType {
        AbstractType(STACK_KIND | depth)
    }

    pub fn array_of(self) -> AbstractType {
        AbstractType(self.0.wrapping_add(ARRAY_OF))
    }

    pub fn element_of(self) -> AbstractType {
        AbstractType(self.0.wrapping_add(ELEMENT_OF))
    }

    /// Same type, but with `dimensions` extra array dimensions (which can be negative)
    pub(crate) fn add_dimensions(self, dimensions: i32) -> AbstractType {
        AbstractType(self.0.wrapping_add(dimensions << DIM_SHIFT))
    }

    /// Just the dimension bits of this type (for recombination with another type)
    pub(crate) fn dimension_bits(self) -> i32 {
        self.0 & DIM_MASK
    }

    /// Just the dimension and kind bits of this type
    pub(crate) fn dimension_and_kind_bits(self) -> i32 {
        self.0 & (DIM_MASK | KIND_MASK)
    }

    pub(crate) fn from_bits(bits: i32) -> AbstractType {
        AbstractType(bits)
    }

    pub(crate) fn with_top_if_long_or_double(self) -> AbstractType {
        AbstractType(self.0 | TOP_IF_LONG_OR_DOUBLE_FLAG)
    }

    pub(crate) fn is_top_if_long_or_double(self) -> bool {
        self.0 & TOP_IF_LONG_OR_DOUBLE_FLAG != 0
    }

    /// Type of an internal name, or of an array descriptor
    pub fn from_internal_name(symbols: &mut SymbolTable, name: &str) -> Result<AbstractType, Error> {
        if name.starts_with('[') {
            AbstractType::from_descriptor(symbols, name)
        } else {
            Ok(AbstractType::reference(symbols.add_type(name)))
        }
    }

    /// Type of a field descriptor (or of a return descriptor, in which case `V` gives `UNSET`)
    pub fn from_descriptor(symbols: &mut SymbolTable, descriptor: &str) -> Result<AbstractType, Error> {
        let invalid = || Error::InvalidDescriptor(descriptor.to_string());
        let bytes = descriptor.as_bytes();
        let typ = match bytes.first().copied().ok_or_else(invalid)? {
            b'V' => AbstractType::UNSET,
            b'Z' | b'C' | b'S' | b'B' | b'I' => AbstractType::INTEGER,
            b'F' => AbstractType::FLOAT,
            b'J' => AbstractType::LONG,
            b'D' => AbstractType::DOUBLE,
            b'L' => {
                let name = descriptor
                    .get(1..descriptor.len() - 1)
                    .filter(|name| !name.is_empty() && descriptor.ends_with(';'))
                    .ok_or_else(invalid)?;
                AbstractType::reference(symbols.add_type(name))
            }
            b'[' => {
                let dimensions = bytes.iter().take_while(|b| **b == b'[').count();
                if dimensions > 63 {
                    return Err(invalid());
                }
                let element = match bytes.get(dimensions).copied().ok_or_else(invalid)? {
                    b'Z' => AbstractType::BOOLEAN,
                    b'C' => AbstractType::CHAR,
                    b'B' => AbstractType::BYTE,
                    b'S' => AbstractType::SHORT,
                    b'I' => AbstractType::INTEGER,
                    b'F' => AbstractType::FLOAT,
                    b'J' => AbstractType::LONG,
                    b'D' => AbstractType::DOUBLE,
                    b'L' => {
                        let name = descriptor
                            .get(dimensions + 1..descriptor.len() - 1)
                            .filter(|name| !name.is_empty() && descriptor.ends_with(';'))
                            .ok_or_else(invalid)?;
                        AbstractType::reference(symbols.add_type(name))
                    }
                    _ => return Err(invalid()),
                };
                element.add_dimensions(dimensions as i32)
            }
            _ => return Err(invalid()),
        };
        Ok(typ)
    }
}

impl fmt::Debug for AbstractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unset() {
            return f.write_str("unset");
        }
        for _ in 0..self.dimensions().max(0) {
            f.write_str("[")?;
        }
        let value = self.value();
        match self.kind() {
            CONSTANT_KIND => {
                let name = match value as i32 {
                    ITEM_TOP => "top",
                    ITEM_INTEGER => "I",
                    ITEM_FLOAT => "F",
                    ITEM_DOUBLE => "D",
                    ITEM_LONG => "J",
                    ITEM_NULL => "null",
                    ITEM_UNINITIALIZED_THIS => "uninitialized_this",
                    ITEM_BOOLEAN => "Z",
                    ITEM_BYTE => "B",
                    ITEM_CHAR => "C",
                    ITEM_SHORT => "S",
                    _ => "?",
                };
                f.write_str(name)
            }
            REFERENCE_KIND => write!(f, "ref#{}", value),
            UNINITIALIZED_KIND => write!(f, "uninitialized#{}", value),
            LOCAL_KIND => write!(f, "local{}", value),
            STACK_KIND => write!(f, "stack-{}", value),
            _ => write!(f, "{:#x}", self.0),
        }?;
        if self.dimensions() < 0 {
            write!(f, "[{}]", self.dimensions())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod abstract_type_tests {
    use super::*;

    #[test]
    fn packing() {
        let int_array = AbstractType::INTEGER.array_of();
        assert_eq!(int_array.dimensions(), 1);
        assert_eq!(int_array.kind(), CONSTANT_KIND);
        assert_eq!(int_array.value(), ITEM_INTEGER as u32);
        assert_eq!(int_array.element_of(), AbstractType::INTEGER);

        // Relative dimensions on placeholders can be negative
        let element = AbstractType::input_local(3).element_of();
        assert_eq!(element.dimensions(), -1);
        assert_eq!(element.kind(), LOCAL_KIND);
        assert_eq!(element.value(), 3);
        assert_eq!(element.array_of(), AbstractType::input_local(3));
    }

    #[test]
    fn descriptors() {
        let mut symbols = SymbolTable::new();
        assert_eq!(AbstractType::from_descriptor(&mut symbols, "V").unwrap(), AbstractType::UNSET);
        assert_eq!(AbstractType::from_descriptor(&mut symbols, "Z").unwrap(), AbstractType::INTEGER);
        assert_eq!(AbstractType::from_descriptor(&mut symbols, "J").unwrap(), AbstractType::LONG);

        let string = AbstractType::from_descriptor(&mut symbols, "Ljava/lang/String;").unwrap();
        assert_eq!(string.kind(), REFERENCE_KIND);
        assert_eq!(symbols.type_name(string.value()), "java/lang/String");

        let strings = AbstractType::from_descriptor(&mut symbols, "[[Ljava/lang/String;").unwrap();
        assert_eq!(strings.dimensions(), 2);
        assert_eq!(strings.element_of().element_of(), string);

        let booleans = AbstractType::from_descriptor(&mut symbols, "[Z").unwrap();
        assert_eq!(booleans, AbstractType::BOOLEAN.array_of());

        assert_eq!(AbstractType::from_internal_name(&mut symbols, "[Z").unwrap(), booleans);
        assert_eq!(
            AbstractType::from_internal_name(&mut symbols, "java/lang/String").unwrap(),
            string
        );
    }

    #[test]
    fn invalid_descriptors() {
        let mut symbols = SymbolTable::new();
        assert!(AbstractType::from_descriptor(&mut symbols, "").is_err());
        assert!(AbstractType::from_descriptor(&mut symbols, "L;").is_err());
        assert!(AbstractType::from_descriptor(&mut symbols, "Ljava/lang/String").is_err());
        assert!(AbstractType::from_descriptor(&mut symbols, "[").is_err());
        assert!(AbstractType::from_descriptor(&mut symbols, "Q").is_err());
    }
}
