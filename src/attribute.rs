//! Non-standard attributes
//!
//! Attributes the reader does not interpret are passed along as [`RawAttribute`], which the
//! writer copies byte for byte. Callers that want to interpret an attribute register an
//! [`AttributeReader`] for its name when accepting a visitor.

use crate::byte_vector::ByteVector;
use crate::errors::Error;
use crate::reader::ClassReader;
use crate::symbol_table::SymbolTable;
use std::fmt::Debug;

pub trait Attribute: Debug {
    /// Name of the attribute, as stored in the constant pool
    fn type_name(&self) -> &str;

    /// Is the attribute found in a `Code` attribute (as opposed to on a class, field, method,
    /// or record component)?
    fn is_code_attribute(&self) -> bool {
        false
    }

    /// Body of the attribute (without the name index and length)
    ///
    /// Constants referenced from the body should be added to the symbol table.
    fn write(&self, symbols: &mut SymbolTable) -> Result<ByteVector, Error>;
}

/// Opaque attribute
///
/// Constant pool indices inside the content are not remapped: copying one of these into a
/// different class file is only valid when that class file's symbol table was seeded from the
/// class the attribute was read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawAttribute {
    pub type_name: String,
    pub content: Vec<u8>,
    pub in_code: bool,
}

impl Attribute for RawAttribute {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn is_code_attribute(&self) -> bool {
        self.in_code
    }

    fn write(&self, _symbols: &mut SymbolTable) -> Result<ByteVector, Error> {
        let mut bytes = ByteVector::with_capacity(self.content.len());
        bytes.put_bytes(&self.content);
        Ok(bytes)
    }
}

/// Interprets one kind of non-standard attribute
pub trait AttributeReader {
    /// Name of the attributes this reader handles
    fn type_name(&self) -> &str;

    /// Read the attribute whose body spans `length` bytes starting at `offset`
    ///
    /// `code_offset` is the offset of the enclosing `Code` attribute's bytecode, for attributes
    /// found inside method bodies.
    fn read(
        &self,
        reader: &ClassReader<'_>,
        offset: usize,
        length: usize,
        code_offset: Option<usize>,
    ) -> Result<Box<dyn Attribute>, Error>;
}
