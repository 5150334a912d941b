//! Constant pool, bootstrap methods, and the types used while computing frames
//!
//! The table is append-only: once a symbol has an index, that index never changes. Every
//! `add_*` method first looks for a structurally equal symbol and returns its index if there
//! is one. Otherwise, it adds the components of the symbol (eg. the class and name-and-type of
//! a method reference), encodes the entry at the end of the constant pool bytes, and assigns
//! the next index.

mod symbol;

pub use symbol::Symbol;
pub(crate) use symbol::*;

use crate::byte_vector::ByteVector;
use crate::class_hierarchy::ClassHierarchy;
use crate::constants::{ConstantDynamic, ConstantValue, Handle};
use crate::errors::Error;
use crate::reader::ClassReader;
use crate::version::Version;
use std::collections::HashMap;

pub struct SymbolTable {
    /// Internal name of the class being written
    class_name: String,
    major_version: u16,

    /// Index of every symbol, in its own index space
    entries: HashMap<Symbol, u32>,

    /// Next constant pool index (the pool starts at index 1)
    constant_pool_count: u32,
    constant_pool: ByteVector,

    bootstrap_method_count: u32,
    bootstrap_methods: ByteVector,

    /// `Symbol::Type` and `Symbol::UninitializedType` entries, by type index
    type_table: Vec<Symbol>,

    /// First string which could not be encoded (reported when the class is serialized)
    error: Option<Error>,
}

impl Default for SymbolTable {
    fn default() -> SymbolTable {
        SymbolTable::new()
    }
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable {
            class_name: String::new(),
            major_version: 0,
            entries: HashMap::new(),
            constant_pool_count: 1,
            constant_pool: ByteVector::new(),
            bootstrap_method_count: 0,
            bootstrap_methods: ByteVector::new(),
            type_table: vec![],
            error: None,
        }
    }

    /// Table whose constant pool and bootstrap methods are a verbatim copy of those of an
    /// existing class
    ///
    /// Indices of the existing constants are preserved, so attributes that were read as raw
    /// bytes can be copied over without remapping.
    pub fn from_reader(reader: &ClassReader<'_>) -> Result<SymbolTable, Error> {
        let mut table = SymbolTable::new();
        let pool_start = 10;
        let pool_end = reader.constant_pool_end();
        table
            .constant_pool
            .put_bytes(&reader.bytes()[pool_start..pool_end]);
        table.constant_pool_count = reader.item_count() as u32;

        let mut index: u32 = 1;
        while index < table.constant_pool_count {
            let offset = reader.item(index as u16)?;
            let tag = reader.read_u8(offset - 1)?;
            let symbol = match tag {
                CONSTANT_FIELDREF_TAG | CONSTANT_METHODREF_TAG | CONSTANT_INTERFACE_METHODREF_TAG => {
                    let owner = reader.read_class(offset)?.to_string();
                    let name_and_type = reader.item(reader.read_u16(offset + 2)?)?;
                    let name = reader.read_utf8(name_and_type)?.to_string();
                    let descriptor = reader.read_utf8(name_and_type + 2)?.to_string();
                    match tag {
                        CONSTANT_FIELDREF_TAG => Symbol::FieldRef {
                            owner,
                            name,
                            descriptor,
                        },
                        CONSTANT_METHODREF_TAG => Symbol::MethodRef {
                            owner,
                            name,
                            descriptor,
                        },
                        _ => Symbol::InterfaceMethodRef {
                            owner,
                            name,
                            descriptor,
                        },
                    }
                }
                CONSTANT_INTEGER_TAG => Symbol::Integer(reader.read_i32(offset)?),
                CONSTANT_FLOAT_TAG => Symbol::Float(reader.read_i32(offset)? as u32),
                CONSTANT_LONG_TAG => Symbol::Long(reader.read_i64(offset)?),
                CONSTANT_DOUBLE_TAG => Symbol::Double(reader.read_i64(offset)? as u64),
                CONSTANT_NAME_AND_TYPE_TAG => Symbol::NameAndType {
                    name: reader.read_utf8(offset)?.to_string(),
                    descriptor: reader.read_utf8(offset + 2)?.to_string(),
                },
                CONSTANT_UTF8_TAG => Symbol::Utf8(reader.utf8_at(index as u16)?.to_string()),
                CONSTANT_METHOD_HANDLE_TAG => {
                    let reference_kind = reader.read_u8(offset)?;
                    let member = reader.item(reader.read_u16(offset + 1)?)?;
                    let is_interface =
                        reader.read_u8(member - 1)? == CONSTANT_INTERFACE_METHODREF_TAG;
                    let name_and_type = reader.item(reader.read_u16(member + 2)?)?;
                    Symbol::MethodHandle {
                        reference_kind,
                        owner: reader.read_class(member)?.to_string(),
                        name: reader.read_utf8(name_and_type)?.to_string(),
                        descriptor: reader.read_utf8(name_and_type + 2)?.to_string(),
                        is_interface,
                    }
                }
                CONSTANT_DYNAMIC_TAG | CONSTANT_INVOKE_DYNAMIC_TAG => {
                    let bootstrap_method_index = reader.read_u16(offset)?;
                    let name_and_type = reader.item(reader.read_u16(offset + 2)?)?;
                    let name = reader.read_utf8(name_and_type)?.to_string();
                    let descriptor = reader.read_utf8(name_and_type + 2)?.to_string();
                    if tag == CONSTANT_DYNAMIC_TAG {
                        Symbol::Dynamic {
                            name,
                            descriptor,
                            bootstrap_method_index,
                        }
                    } else {
                        Symbol::InvokeDynamic {
                            name,
                            descriptor,
                            bootstrap_method_index,
                        }
                    }
                }
                CONSTANT_CLASS_TAG => Symbol::Class(reader.read_utf8(offset)?.to_string()),
                CONSTANT_STRING_TAG => Symbol::String(reader.read_utf8(offset)?.to_string()),
                CONSTANT_METHOD_TYPE_TAG => {
                    Symbol::MethodType(reader.read_utf8(offset)?.to_string())
                }
                CONSTANT_MODULE_TAG => Symbol::Module(reader.read_utf8(offset)?.to_string()),
                CONSTANT_PACKAGE_TAG => Symbol::Package(reader.read_utf8(offset)?.to_string()),
                _ => return Err(Error::InvalidConstantTag { tag, offset: offset - 1 }),
            };
            let width = symbol.width();
            table.entries.entry(symbol).or_insert(index);
            index += width;
        }

        for &offset in reader.bootstrap_method_offsets() {
            let method_handle = reader.read_u16(offset)?;
            let argument_count = reader.read_u16(offset + 2)?;
            let mut arguments = Vec::with_capacity(argument_count as usize);
            for i in 0..argument_count as usize {
                arguments.push(reader.read_u16(offset + 4 + 2 * i)?);
            }
            table.bootstrap_methods.put_u16(method_handle).put_u16(argument_count);
            for argument in &arguments {
                table.bootstrap_methods.put_u16(*argument);
            }
            let symbol = Symbol::BootstrapMethod {
                method_handle,
                arguments,
            };
            let index = table.bootstrap_method_count;
            table.entries.entry(symbol).or_insert(index);
            table.bootstrap_method_count += 1;
        }

        log::debug!(
            "seeded symbol table with {} constants and {} bootstrap methods",
            table.constant_pool_count - 1,
            table.bootstrap_method_count
        );
        Ok(table)
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn major_version(&self) -> u16 {
        self.major_version
    }

    /// Version of the class being written (the minor version does not matter for features)
    pub fn version(&self) -> Version {
        Version::new(self.major_version, 0)
    }

    /// Set the version and name of the class, returning the index of its class constant
    pub fn set_major_version_and_class_name(&mut self, major_version: u16, class_name: &str) -> u16 {
        self.major_version = major_version;
        self.class_name = class_name.to_string();
        self.add_class(class_name)
    }

    /// Number of constant pool slots used so far, plus one (the `constant_pool_count` item)
    pub fn constant_pool_count(&self) -> u32 {
        self.constant_pool_count
    }

    /// Length of the encoded constant pool entries
    pub fn constant_pool_length(&self) -> usize {
        self.constant_pool.len()
    }

    pub fn bootstrap_method_count(&self) -> u32 {
        self.bootstrap_method_count
    }

    /// Take the first error encountered while encoding a constant
    pub(crate) fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    /// Write `constant_pool_count` followed by the constant pool entries
    pub fn put_constant_pool(&self, output: &mut ByteVector) {
        output
            .put_u16(self.constant_pool_count as u16)
            .put_bytes(self.constant_pool.as_slice());
    }

    /// Size of the `BootstrapMethods` attribute, or 0 if there are no bootstrap methods
    ///
    /// This also adds the attribute name to the constant pool.
    pub fn compute_bootstrap_methods_size(&mut self) -> usize {
        if self.bootstrap_method_count == 0 {
            return 0;
        }
        self.add_utf8("BootstrapMethods");
        8 + self.bootstrap_methods.len()
    }

    pub fn put_bootstrap_methods(&mut self, output: &mut ByteVector) {
        if self.bootstrap_method_count == 0 {
            return;
        }
        let name_index = self.add_utf8("BootstrapMethods");
        output
            .put_u16(name_index)
            .put_u32(self.bootstrap_methods.len() as u32 + 2)
            .put_u16(self.bootstrap_method_count as u16)
            .put_bytes(self.bootstrap_methods.as_slice());
    }

    fn lookup(&self, symbol: &Symbol) -> Option<u16> {
        self.entries.get(symbol).map(|index| *index as u16)
    }

    /// Record a symbol whose bytes have just been appended to the constant pool
    fn push_constant(&mut self, symbol: Symbol) -> u16 {
        let index = self.constant_pool_count;
        self.constant_pool_count += symbol.width();
        self.entries.insert(symbol, index);
        index as u16
    }

    /// Add a loadable constant (the operand of `ldc`, or a bootstrap method argument)
    pub fn add_constant(&mut self, value: &ConstantValue) -> u16 {
        match value {
            ConstantValue::Integer(integer) => self.add_integer(*integer),
            ConstantValue::Float(float) => self.add_float(*float),
            ConstantValue::Long(long) => self.add_long(*long),
            ConstantValue::Double(double) => self.add_double(*double),
            ConstantValue::String(string) => self.add_string(string),
            ConstantValue::Class(class) => self.add_class(class),
            ConstantValue::MethodType(descriptor) => self.add_method_type(descriptor),
            ConstantValue::Handle(handle) => self.add_handle(handle),
            ConstantValue::Dynamic(dynamic) => self.add_constant_dynamic(dynamic),
        }
    }

    pub fn add_utf8(&mut self, value: &str) -> u16 {
        let symbol = Symbol::Utf8(value.to_string());
        if let Some(index) = self.lookup(&symbol) {
            return index;
        }
        self.constant_pool.put_u8(CONSTANT_UTF8_TAG);
        if let Err(err) = self.constant_pool.put_utf8(value) {
            self.constant_pool.put_u16(0);
            self.error.get_or_insert(err);
        }
        self.push_constant(symbol)
    }

    pub fn add_integer(&mut self, value: i32) -> u16 {
        let symbol = Symbol::Integer(value);
        if let Some(index) = self.lookup(&symbol) {
            return index;
        }
        self.constant_pool.put_u8(CONSTANT_INTEGER_TAG).put_i32(value);
        self.push_constant(symbol)
    }

    pub fn add_float(&mut self, value: f32) -> u16 {
        let bits = value.to_bits();
        let symbol = Symbol::Float(bits);
        if let Some(index) = self.lookup(&symbol) {
            return index;
        }
        self.constant_pool.put_u8(CONSTANT_FLOAT_TAG).put_u32(bits);
        self.push_constant(symbol)
    }

    /// Add a long, which takes two constant pool slots
    pub fn add_long(&mut self, value: i64) -> u16 {
        let symbol = Symbol::Long(value);
        if let Some(index) = self.lookup(&symbol) {
            return index;
        }
        self.constant_pool.put_u8(CONSTANT_LONG_TAG).put_u64(value as u64);
        self.push_constant(symbol)
    }

    /// Add a double, which takes two constant pool slots
    pub fn add_double(&mut self, value: f64) -> u16 {
        let bits = value.to_bits();
        let symbol = Symbol::Double(bits);
        if let Some(index) = self.lookup(&symbol) {
            return index;
        }
        self.constant_pool.put_u8(CONSTANT_DOUBLE_TAG).put_u64(bits);
        self.push_constant(symbol)
    }

    /// Add an entry which just refers to a UTF-8 constant
    fn add_utf8_reference(&mut self, tag: u8, symbol: Symbol, value: &str) -> u16 {
        if let Some(index) = self.lookup(&symbol) {
            return index;
        }
        let utf8 = self.add_utf8(value);
        self.constant_pool.put_12(tag, utf8);
        self.push_constant(symbol)
    }

    /// Add a class, from its internal name (or from its descriptor, for arrays)
    pub fn add_class(&mut self, value: &str) -> u16 {
        let symbol = Symbol::Class(value.to_string());
        self.add_utf8_reference(CONSTANT_CLASS_TAG, symbol, value)
    }

    pub fn add_string(&mut self, value: &str) -> u16 {
        let symbol = Symbol::String(value.to_string());
        self.add_utf8_reference(CONSTANT_STRING_TAG, symbol, value)
    }

    pub fn add_method_type(&mut self, descriptor: &str) -> u16 {
        let symbol = Symbol::MethodType(descriptor.to_string());
        self.add_utf8_reference(CONSTANT_METHOD_TYPE_TAG, symbol, descriptor)
    }

    pub fn add_module(&mut self, module_name: &str) -> u16 {
        let symbol = Symbol::Module(module_name.to_string());
        self.add_utf8_reference(CONSTANT_MODULE_TAG, symbol, module_name)
    }

    pub fn add_package(&mut self, package_name: &str) -> u16 {
        let symbol = Symbol::Package(package_name.to_string());
        self.add_utf8_reference(CONSTANT_PACKAGE_TAG, symbol, package_name)
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let symbol = Symbol::NameAndType {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        };
        if let Some(index) = self.lookup(&symbol) {
            return index;
        }
        let name_index = self.add_utf8(name);
        let descriptor_index = self.add_utf8(descriptor);
        self.constant_pool
            .put_122(CONSTANT_NAME_AND_TYPE_TAG, name_index, descriptor_index);
        self.push_constant(symbol)
    }

    fn add_member_reference(
        &mut self,
        tag: u8,
        symbol: Symbol,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> u16 {
        if let Some(index) = self.lookup(&symbol) {
            return index;
        }
        let class_index = self.add_class(owner);
        let name_and_type_index = self.add_name_and_type(name, descriptor);
        self.constant_pool
            .put_122(tag, class_index, name_and_type_index);
        self.push_constant(symbol)
    }

    pub fn add_field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let symbol = Symbol::FieldRef {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        };
        self.add_member_reference(CONSTANT_FIELDREF_TAG, symbol, owner, name, descriptor)
    }

    pub fn add_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> u16 {
        let (owned_owner, owned_name, owned_descriptor) =
            (owner.to_string(), name.to_string(), descriptor.to_string());
        let (tag, symbol) = if is_interface {
            let symbol = Symbol::InterfaceMethodRef {
                owner: owned_owner,
                name: owned_name,
                descriptor: owned_descriptor,
            };
            (CONSTANT_INTERFACE_METHODREF_TAG, symbol)
        } else {
            let symbol = Symbol::MethodRef {
                owner: owned_owner,
                name: owned_name,
                descriptor: owned_descriptor,
            };
            (CONSTANT_METHODREF_TAG, symbol)
        };
        self.add_member_reference(tag, symbol, owner, name, descriptor)
    }

    pub fn add_handle(&mut self, handle: &Handle) -> u16 {
        self.add_method_handle(
            handle.kind.tag(),
            &handle.owner,
            &handle.name,
            &handle.descriptor,
            handle.is_interface,
        )
    }

    pub fn add_method_handle(
        &mut self,
        reference_kind: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> u16 {
        let symbol = Symbol::MethodHandle {
            reference_kind,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_interface,
        };
        if let Some(index) = self.lookup(&symbol) {
            return index;
        }
        // Kinds 1-4 refer to fields, the others to methods
        let reference_index = if reference_kind <= 4 {
            self.add_field_ref(owner, name, descriptor)
        } else {
            self.add_method_ref(owner, name, descriptor, is_interface)
        };
        self.constant_pool
            .put_u8(CONSTANT_METHOD_HANDLE_TAG)
            .put_u8(reference_kind)
            .put_u16(reference_index);
        self.push_constant(symbol)
    }

    pub fn add_constant_dynamic(&mut self, dynamic: &ConstantDynamic) -> u16 {
        let bootstrap_method_index =
            self.add_bootstrap_method(&dynamic.bootstrap_method, &dynamic.bootstrap_arguments);
        let symbol = Symbol::Dynamic {
            name: dynamic.name.clone(),
            descriptor: dynamic.descriptor.clone(),
            bootstrap_method_index,
        };
        self.add_dynamic_reference(
            CONSTANT_DYNAMIC_TAG,
            symbol,
            &dynamic.name,
            &dynamic.descriptor,
            bootstrap_method_index,
        )
    }

    pub fn add_invoke_dynamic(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap_method: &Handle,
        bootstrap_arguments: &[ConstantValue],
    ) -> u16 {
        let bootstrap_method_index =
            self.add_bootstrap_method(bootstrap_method, bootstrap_arguments);
        let symbol = Symbol::InvokeDynamic {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            bootstrap_method_index,
        };
        self.add_dynamic_reference(
            CONSTANT_INVOKE_DYNAMIC_TAG,
            symbol,
            name,
            descriptor,
            bootstrap_method_index,
        )
    }

    fn add_dynamic_reference(
        &mut self,
        tag: u8,
        symbol: Symbol,
        name: &str,
        descriptor: &str,
        bootstrap_method_index: u16,
    ) -> u16 {
        if let Some(index) = self.lookup(&symbol) {
            return index;
        }
        let name_and_type_index = self.add_name_and_type(name, descriptor);
        self.constant_pool
            .put_122(tag, bootstrap_method_index, name_and_type_index);
        self.push_constant(symbol)
    }

    /// Add an entry to the `BootstrapMethods` attribute, returning its index in that attribute
    pub fn add_bootstrap_method(
        &mut self,
        bootstrap_method: &Handle,
        bootstrap_arguments: &[ConstantValue],
    ) -> u16 {
        let method_handle = self.add_handle(bootstrap_method);
        let arguments: Vec<u16> = bootstrap_arguments
            .iter()
            .map(|argument| self.add_constant(argument))
            .collect();
        let symbol = Symbol::BootstrapMethod {
            method_handle,
            arguments,
        };
        if let Some(index) = self.lookup(&symbol) {
            return index;
        }
        self.bootstrap_methods
            .put_u16(method_handle)
            .put_u16(bootstrap_arguments.len() as u16);
        if let Symbol::BootstrapMethod { arguments, .. } = &symbol {
            for argument in arguments {
                self.bootstrap_methods.put_u16(*argument);
            }
        }
        let index = self.bootstrap_method_count;
        self.bootstrap_method_count += 1;
        self.entries.insert(symbol, index);
        index as u16
    }

    fn push_type(&mut self, symbol: Symbol) -> u32 {
        let index = self.type_table.len() as u32;
        self.type_table.push(symbol.clone());
        self.entries.insert(symbol, index);
        index
    }

    /// Add a type (internal name, or array descriptor) to the type table
    pub fn add_type(&mut self, value: &str) -> u32 {
        let symbol = Symbol::Type(value.to_string());
        match self.entries.get(&symbol) {
            Some(index) => *index,
            None => self.push_type(symbol),
        }
    }

    /// Add the type of an object created by a `new` instruction (but not yet initialized)
    pub fn add_uninitialized_type(&mut self, value: &str, bytecode_offset: u32) -> u32 {
        let symbol = Symbol::UninitializedType {
            name: value.to_string(),
            bytecode_offset,
        };
        match self.entries.get(&symbol) {
            Some(index) => *index,
            None => self.push_type(symbol),
        }
    }

    /// Add the closest common super class of two types (by type index)
    ///
    /// The result is cached by the unordered pair, so the class hierarchy is only asked once
    /// for each pair.
    pub fn add_merged_type(
        &mut self,
        type1: u32,
        type2: u32,
        hierarchy: &dyn ClassHierarchy,
    ) -> u32 {
        let key = if type1 < type2 {
            Symbol::MergedType(type1, type2)
        } else {
            Symbol::MergedType(type2, type1)
        };
        if let Some(index) = self.entries.get(&key) {
            return *index;
        }
        let common = hierarchy.common_super_class(self.type_name(type1), self.type_name(type2));
        let index = self.add_type(&common);
        self.entries.insert(key, index);
        index
    }

    /// Entry of the type table
    pub fn type_entry(&self, index: u32) -> &Symbol {
        &self.type_table[index as usize]
    }

    /// Internal name (or array descriptor) of a type table entry
    pub fn type_name(&self, index: u32) -> &str {
        match &self.type_table[index as usize] {
            Symbol::Type(name) => name,
            Symbol::UninitializedType { name, .. } => name,
            other => unreachable!("not a type: {:?}", other),
        }
    }
}

#[cfg(test)]
mod symbol_table_tests {
    use super::*;
    use crate::class_hierarchy::{KnownClassHierarchy, ObjectHierarchy};
    use crate::constants::HandleKind;

    #[test]
    fn interning_is_idempotent() {
        let mut symbols = SymbolTable::new();
        let first = symbols.add_string("hello");
        let length = symbols.constant_pool_length();
        let count = symbols.constant_pool_count();
        let second = symbols.add_string("hello");
        assert_eq!(first, second);
        assert_eq!(symbols.constant_pool_length(), length);
        assert_eq!(symbols.constant_pool_count(), count);
    }

    #[test]
    fn components_are_interned() {
        let mut symbols = SymbolTable::new();
        let method = symbols.add_method_ref("java/lang/Object", "<init>", "()V", false);

        // Utf8 "java/lang/Object", Class, Utf8 "<init>", Utf8 "()V", NameAndType, MethodRef
        assert_eq!(method, 6);
        assert_eq!(symbols.constant_pool_count(), 7);
        assert_eq!(symbols.add_class("java/lang/Object"), 2);
        assert_eq!(symbols.add_utf8("<init>"), 3);
        assert_eq!(symbols.add_name_and_type("<init>", "()V"), 5);

        // Same member, but on an interface, is a distinct constant
        let interface_method = symbols.add_method_ref("java/lang/Object", "<init>", "()V", true);
        assert_eq!(interface_method, 7);
    }

    #[test]
    fn constant_pool_bytes() {
        let mut symbols = SymbolTable::new();
        symbols.add_class("A");
        let mut output = ByteVector::new();
        symbols.put_constant_pool(&mut output);
        assert_eq!(output.as_slice(), &[0, 3, 1, 0, 1, b'A', 7, 0, 1]);
    }

    #[test]
    fn two_slot_rule() {
        let mut symbols = SymbolTable::new();
        symbols.add_integer(1);
        let before = symbols.constant_pool_count();
        let long = symbols.add_long(42);
        assert_eq!(symbols.constant_pool_count(), before + 2);
        assert_eq!(long as u32, before);
        let next = symbols.add_integer(2);
        assert_eq!(next as u32, before + 2);
        assert_eq!(symbols.add_long(42), long);

        let double = symbols.add_double(0.5);
        assert_eq!(symbols.add_integer(3), double + 2);
    }

    #[test]
    fn floats_are_interned_by_bits() {
        let mut symbols = SymbolTable::new();
        let zero = symbols.add_float(0.0);
        let negative_zero = symbols.add_float(-0.0);
        assert_ne!(zero, negative_zero);
        assert_eq!(symbols.add_float(f32::NAN), symbols.add_float(f32::NAN));
    }

    #[test]
    fn bootstrap_methods() {
        let mut symbols = SymbolTable::new();
        let handle = Handle {
            kind: HandleKind::InvokeStatic,
            owner: "Boot".to_string(),
            name: "strap".to_string(),
            descriptor: "()Ljava/lang/invoke/CallSite;".to_string(),
            is_interface: false,
        };
        let arguments = [ConstantValue::Integer(1), ConstantValue::String("x".to_string())];
        let first = symbols.add_invoke_dynamic("run", "()V", &handle, &arguments);
        let second = symbols.add_invoke_dynamic("run", "()V", &handle, &arguments);
        assert_eq!(first, second);
        assert_eq!(symbols.bootstrap_method_count(), 1);

        symbols.add_invoke_dynamic("run", "()V", &handle, &[]);
        assert_eq!(symbols.bootstrap_method_count(), 2);

        // name (2) + length (4) + count (2) + [handle, 2, arg, arg] + [handle, 0]
        assert_eq!(symbols.compute_bootstrap_methods_size(), 8 + 8 + 4);
    }

    #[test]
    fn merged_types_are_cached() {
        let mut symbols = SymbolTable::new();
        let mut hierarchy = KnownClassHierarchy::new();
        hierarchy.insert("a/Base", Some("java/lang/Object"), &[], false);
        hierarchy.insert("a/Left", Some("a/Base"), &[], false);
        hierarchy.insert("a/Right", Some("a/Base"), &[], false);

        let left = symbols.add_type("a/Left");
        let right = symbols.add_type("a/Right");
        let merged = symbols.add_merged_type(left, right, &hierarchy);
        assert_eq!(symbols.type_name(merged), "a/Base");

        // Cached: a different hierarchy is not consulted again, whatever the order
        assert_eq!(symbols.add_merged_type(right, left, &ObjectHierarchy), merged);
    }

    #[test]
    fn uninitialized_types() {
        let mut symbols = SymbolTable::new();
        let first = symbols.add_uninitialized_type("a/A", 4);
        let second = symbols.add_uninitialized_type("a/A", 8);
        assert_ne!(first, second);
        assert_eq!(symbols.add_uninitialized_type("a/A", 4), first);
        assert_eq!(symbols.type_name(second), "a/A");
        assert_ne!(symbols.add_type("a/A"), first);
    }

    #[test]
    fn oversized_utf8_is_reported_later() {
        let mut symbols = SymbolTable::new();
        let huge = "x".repeat(70000);
        symbols.add_utf8(&huge);
        assert!(matches!(
            symbols.take_error(),
            Some(Error::Utf8Overflow { length: 70000 })
        ));
    }
}
