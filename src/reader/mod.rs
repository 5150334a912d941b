//! Class file reader
//!
//! A [`ClassReader`] indexes the constant pool of a class file once, then replays the whole
//! class as a sequence of visitor calls (see [`crate::visitor`] for the order). Everything is
//! read straight out of the borrowed buffer: nothing is copied except the strings that need
//! decoding and the values handed to visitors.

mod annotations;
mod code;
mod frames;

use crate::access_flags::*;
use crate::attribute::{Attribute, AttributeReader, RawAttribute};
use crate::byte_vector::decode_modified_utf8;
use crate::constants::{ConstantDynamic, ConstantValue, Handle, HandleKind};
use crate::errors::Error;
use crate::symbol_table::{
    CONSTANT_CLASS_TAG, CONSTANT_DOUBLE_TAG, CONSTANT_DYNAMIC_TAG, CONSTANT_FIELDREF_TAG,
    CONSTANT_FLOAT_TAG, CONSTANT_INTEGER_TAG, CONSTANT_INTERFACE_METHODREF_TAG,
    CONSTANT_INVOKE_DYNAMIC_TAG, CONSTANT_LONG_TAG, CONSTANT_METHODREF_TAG,
    CONSTANT_METHOD_HANDLE_TAG, CONSTANT_METHOD_TYPE_TAG, CONSTANT_MODULE_TAG,
    CONSTANT_NAME_AND_TYPE_TAG, CONSTANT_PACKAGE_TAG, CONSTANT_STRING_TAG, CONSTANT_UTF8_TAG,
};
use crate::visitor::ClassVisitor;
use crate::Version;
use annotations::AnnotationAttributes;
use bitflags::bitflags;
use byteorder::{BigEndian, ByteOrder};
use std::borrow::Cow;

bitflags! {
    /// Options for [`ClassReader::accept`]
    pub struct ReaderOptions: u32 {
        /// Do not visit method bodies
        const SKIP_CODE = 1;

        /// Do not visit source files, line numbers, local variables and method parameters
        const SKIP_DEBUG = 2;

        /// Do not visit stack map frames
        const SKIP_FRAMES = 4;

        /// Visit every stack map frame in the expanded (`New`) form
        const EXPAND_FRAMES = 8;

        /// Replace the internal long forward jump opcodes emitted by the writer with standard
        /// instructions (`IFNOT L; GOTO_W target; L:`)
        const EXPAND_ASM_INSNS = 256;
    }
}

const MAGIC: u32 = 0xCAFE_BABE;

/// Offset of the first constant pool entry
const CONSTANT_POOL_START: usize = 10;

/// Parsed class file, ready to be visited
pub struct ClassReader<'a> {
    bytes: &'a [u8],
    version: Version,

    /// For every constant pool index, the offset right after the entry tag (`0` for index 0 and
    /// for the unusable slot following longs and doubles)
    cp_offsets: Vec<usize>,

    /// Decoded `CONSTANT_Utf8` entries, by constant pool index
    strings: Vec<Option<Cow<'a, str>>>,

    /// Size of the largest `CONSTANT_Utf8` entry
    max_string_length: usize,

    /// Offset of the `access_flags` item (end of the constant pool)
    header: usize,

    /// Offset of every entry in the `BootstrapMethods` attribute
    bootstrap_method_offsets: Vec<usize>,
}

/// State shared by everything decoded during one `accept` call
pub(crate) struct Context<'c> {
    options: ReaderOptions,
    attribute_readers: &'c [&'c dyn AttributeReader],
    class_name: &'c str,
}

impl<'c> Context<'c> {
    fn skip_debug(&self) -> bool {
        self.options.contains(ReaderOptions::SKIP_DEBUG)
    }
}

impl<'a> ClassReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<ClassReader<'a>, Error> {
        let magic = read_at(bytes, 0, 4, BigEndian::read_u32)?;
        if magic != MAGIC {
            return Err(Error::InvalidMagic { found: magic });
        }
        let minor_version = read_at(bytes, 4, 2, BigEndian::read_u16)?;
        let major_version = read_at(bytes, 6, 2, BigEndian::read_u16)?;
        let version = Version::new(major_version, minor_version);
        if major_version > Version::MAX_SUPPORTED_MAJOR {
            return Err(Error::UnsupportedVersion(version));
        }

        let item_count = read_at(bytes, 8, 2, BigEndian::read_u16)? as usize;
        let mut cp_offsets = vec![0; item_count];
        let mut max_string_length = 0;
        let mut has_bootstrap_methods = false;
        let mut offset = CONSTANT_POOL_START;
        let mut index = 1;
        while index < item_count {
            let tag = read_at(bytes, offset, 1, |b| b[0])?;
            cp_offsets[index] = offset + 1;
            let size = match tag {
                CONSTANT_FIELDREF_TAG
                | CONSTANT_METHODREF_TAG
                | CONSTANT_INTERFACE_METHODREF_TAG
                | CONSTANT_INTEGER_TAG
                | CONSTANT_FLOAT_TAG
                | CONSTANT_NAME_AND_TYPE_TAG => 5,
                CONSTANT_DYNAMIC_TAG | CONSTANT_INVOKE_DYNAMIC_TAG => {
                    has_bootstrap_methods = true;
                    5
                }
                CONSTANT_LONG_TAG | CONSTANT_DOUBLE_TAG => {
                    index += 1;
                    9
                }
                CONSTANT_UTF8_TAG => {
                    let size = 3 + read_at(bytes, offset + 1, 2, BigEndian::read_u16)? as usize;
                    max_string_length = max_string_length.max(size);
                    size
                }
                CONSTANT_METHOD_HANDLE_TAG => 4,
                CONSTANT_CLASS_TAG
                | CONSTANT_STRING_TAG
                | CONSTANT_METHOD_TYPE_TAG
                | CONSTANT_MODULE_TAG
                | CONSTANT_PACKAGE_TAG => 3,
                _ => return Err(Error::InvalidConstantTag { tag, offset }),
            };
            index += 1;
            offset += size;
        }
        if offset > bytes.len() {
            return Err(Error::UnexpectedEof {
                offset: bytes.len(),
            });
        }

        let mut strings: Vec<Option<Cow<'a, str>>> = vec![None; item_count];
        for (index, &entry) in cp_offsets.iter().enumerate() {
            if entry != 0 && bytes[entry - 1] == CONSTANT_UTF8_TAG {
                let length = BigEndian::read_u16(&bytes[entry..entry + 2]) as usize;
                strings[index] = Some(decode_utf8(&bytes[entry + 2..entry + 2 + length]));
            }
        }

        let mut reader = ClassReader {
            bytes,
            version,
            cp_offsets,
            strings,
            max_string_length,
            header: offset,
            bootstrap_method_offsets: vec![],
        };
        if has_bootstrap_methods {
            reader.bootstrap_method_offsets = reader.find_bootstrap_methods()?;
        }

        let name = reader.class_name()?;
        log::debug!(
            "read class {} (version {}.{}, {} constants)",
            name,
            major_version,
            minor_version,
            item_count
        );
        Ok(reader)
    }

    /// Locate the entries of the `BootstrapMethods` class attribute
    fn find_bootstrap_methods(&self) -> Result<Vec<usize>, Error> {
        let mut offsets = vec![];
        let (attributes, _) = self.attributes(self.class_attributes_offset()?)?;
        for (name, offset, _) in attributes {
            if name != "BootstrapMethods" {
                continue;
            }
            let count = self.read_u16(offset)?;
            let mut current = offset + 2;
            for _ in 0..count {
                offsets.push(current);
                current += 4 + 2 * self.read_u16(current + 2)? as usize;
            }
        }
        Ok(offsets)
    }

    /// Underlying class file bytes
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Offset of the first byte after the constant pool
    pub fn constant_pool_end(&self) -> usize {
        self.header
    }

    /// The `constant_pool_count` item: one more than the largest constant pool index
    pub fn item_count(&self) -> usize {
        self.cp_offsets.len()
    }

    /// Offset of the constant pool entry `index`, right after its tag byte
    pub fn item(&self, index: u16) -> Result<usize, Error> {
        self.item_from(index, CONSTANT_POOL_START)
    }

    fn item_from(&self, index: u16, at: usize) -> Result<usize, Error> {
        match self.cp_offsets.get(index as usize) {
            Some(&offset) if offset != 0 => Ok(offset),
            _ => Err(Error::InvalidConstantIndex { index, offset: at }),
        }
    }

    /// Constant pool entry whose index is stored at `offset`
    fn entry(&self, offset: usize) -> Result<usize, Error> {
        let index = self.read_u16(offset)?;
        self.item_from(index, offset)
    }

    /// Constant pool entry whose index is stored at `offset`, which must have the given tag
    fn typed_entry(&self, offset: usize, tag: u8) -> Result<usize, Error> {
        let entry = self.entry(offset)?;
        if self.bytes[entry - 1] != tag {
            let index = self.read_u16(offset)?;
            return Err(Error::InvalidConstantIndex { index, offset });
        }
        Ok(entry)
    }

    /// Size of the largest string in the constant pool, in bytes
    pub fn max_string_length(&self) -> usize {
        self.max_string_length
    }

    pub fn access(&self) -> Result<ClassAccessFlags, Error> {
        let access = self.read_u16(self.header)?;
        Ok(ClassAccessFlags::from_bits_truncate(access as u32))
    }

    pub fn class_name(&self) -> Result<&str, Error> {
        self.read_class(self.header + 2)
    }

    /// Name of the super class (`None` only for `java/lang/Object` and `module-info`)
    pub fn super_name(&self) -> Result<Option<&str>, Error> {
        self.read_optional_class(self.header + 4)
    }

    pub fn interfaces(&self) -> Result<Vec<&str>, Error> {
        let count = self.read_u16(self.header + 6)? as usize;
        (0..count)
            .map(|i| self.read_class(self.header + 8 + 2 * i))
            .collect()
    }

    /// Offsets of the entries in the `BootstrapMethods` attribute
    pub fn bootstrap_method_offsets(&self) -> &[usize] {
        &self.bootstrap_method_offsets
    }

    fn slice(&self, offset: usize, length: usize) -> Result<&'a [u8], Error> {
        match offset.checked_add(length) {
            Some(end) if end <= self.bytes.len() => Ok(&self.bytes[offset..end]),
            _ => Err(Error::UnexpectedEof {
                offset: self.bytes.len(),
            }),
        }
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8, Error> {
        read_at(self.bytes, offset, 1, |b| b[0])
    }

    pub fn read_i8(&self, offset: usize) -> Result<i8, Error> {
        self.read_u8(offset).map(|byte| byte as i8)
    }

    pub fn read_u16(&self, offset: usize) -> Result<u16, Error> {
        read_at(self.bytes, offset, 2, BigEndian::read_u16)
    }

    pub fn read_i16(&self, offset: usize) -> Result<i16, Error> {
        read_at(self.bytes, offset, 2, BigEndian::read_i16)
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32, Error> {
        read_at(self.bytes, offset, 4, BigEndian::read_u32)
    }

    pub fn read_i32(&self, offset: usize) -> Result<i32, Error> {
        read_at(self.bytes, offset, 4, BigEndian::read_i32)
    }

    pub fn read_i64(&self, offset: usize) -> Result<i64, Error> {
        read_at(self.bytes, offset, 8, BigEndian::read_i64)
    }

    /// String of the `CONSTANT_Utf8` entry `index`
    pub fn utf8_at(&self, index: u16) -> Result<&str, Error> {
        self.utf8_from(index, CONSTANT_POOL_START)
    }

    fn utf8_from(&self, index: u16, at: usize) -> Result<&str, Error> {
        match self.strings.get(index as usize) {
            Some(Some(string)) => Ok(&**string),
            _ => Err(Error::InvalidConstantIndex { index, offset: at }),
        }
    }

    /// String of the `CONSTANT_Utf8` entry whose index is stored at `offset`
    pub fn read_utf8(&self, offset: usize) -> Result<&str, Error> {
        let index = self.read_u16(offset)?;
        self.utf8_from(index, offset)
    }

    /// Like [`ClassReader::read_utf8`], but index 0 stands for no string
    pub fn read_optional_utf8(&self, offset: usize) -> Result<Option<&str>, Error> {
        match self.read_u16(offset)? {
            0 => Ok(None),
            index => self.utf8_from(index, offset).map(Some),
        }
    }

    /// Name of the `CONSTANT_Class` entry whose index is stored at `offset`
    pub fn read_class(&self, offset: usize) -> Result<&str, Error> {
        self.read_named(offset, CONSTANT_CLASS_TAG)
    }

    /// Like [`ClassReader::read_class`], but index 0 stands for no class
    pub fn read_optional_class(&self, offset: usize) -> Result<Option<&str>, Error> {
        match self.read_u16(offset)? {
            0 => Ok(None),
            _ => self.read_class(offset).map(Some),
        }
    }

    /// Name of a class, module or package entry
    fn read_named(&self, offset: usize, tag: u8) -> Result<&str, Error> {
        let entry = self.typed_entry(offset, tag)?;
        self.read_utf8(entry)
    }

    /// Name and descriptor of the `CONSTANT_NameAndType` entry whose index is stored at `offset`
    fn read_name_and_type(&self, offset: usize) -> Result<(&str, &str), Error> {
        let entry = self.typed_entry(offset, CONSTANT_NAME_AND_TYPE_TAG)?;
        Ok((self.read_utf8(entry)?, self.read_utf8(entry + 2)?))
    }

    /// Loadable constant at `index`
    pub fn read_const(&self, index: u16) -> Result<ConstantValue, Error> {
        let offset = self.item(index)?;
        let value = match self.bytes[offset - 1] {
            CONSTANT_INTEGER_TAG => ConstantValue::Integer(self.read_i32(offset)?),
            CONSTANT_FLOAT_TAG => ConstantValue::Float(f32::from_bits(self.read_u32(offset)?)),
            CONSTANT_LONG_TAG => ConstantValue::Long(self.read_i64(offset)?),
            CONSTANT_DOUBLE_TAG => {
                ConstantValue::Double(f64::from_bits(self.read_i64(offset)? as u64))
            }
            CONSTANT_CLASS_TAG => ConstantValue::Class(self.read_utf8(offset)?.to_string()),
            CONSTANT_STRING_TAG => ConstantValue::String(self.read_utf8(offset)?.to_string()),
            CONSTANT_METHOD_TYPE_TAG => {
                ConstantValue::MethodType(self.read_utf8(offset)?.to_string())
            }
            CONSTANT_METHOD_HANDLE_TAG => ConstantValue::Handle(self.read_handle(offset)?),
            CONSTANT_DYNAMIC_TAG => {
                let (name, descriptor) = self.read_name_and_type(offset + 2)?;
                let (bootstrap_method, bootstrap_arguments) =
                    self.read_bootstrap_method(self.read_u16(offset)?, offset)?;
                ConstantValue::Dynamic(Box::new(ConstantDynamic {
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                    bootstrap_method,
                    bootstrap_arguments,
                }))
            }
            _ => {
                return Err(Error::InvalidConstantIndex {
                    index,
                    offset: offset - 1,
                })
            }
        };
        Ok(value)
    }

    /// Body of a `CONSTANT_MethodHandle` entry
    fn read_handle(&self, offset: usize) -> Result<Handle, Error> {
        let reference_kind = self.read_u8(offset)?;
        let kind = HandleKind::from_tag(reference_kind).ok_or(Error::InvalidConstantTag {
            tag: reference_kind,
            offset,
        })?;
        let member = self.entry(offset + 1)?;
        let is_interface = self.bytes[member - 1] == CONSTANT_INTERFACE_METHODREF_TAG;
        let (name, descriptor) = self.read_name_and_type(member + 2)?;
        Ok(Handle {
            kind,
            owner: self.read_class(member)?.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_interface,
        })
    }

    /// Method handle and arguments of bootstrap method `index`, referenced at `at`
    fn read_bootstrap_method(
        &self,
        index: u16,
        at: usize,
    ) -> Result<(Handle, Vec<ConstantValue>), Error> {
        let offset = *self
            .bootstrap_method_offsets
            .get(index as usize)
            .ok_or(Error::InvalidConstantIndex { index, offset: at })?;
        let handle = self.typed_entry(offset, CONSTANT_METHOD_HANDLE_TAG)?;
        let handle = self.read_handle(handle)?;
        let count = self.read_u16(offset + 2)? as usize;
        let arguments = (0..count)
            .map(|i| self.read_const(self.read_u16(offset + 4 + 2 * i)?))
            .collect::<Result<Vec<_>, Error>>()?;
        Ok((handle, arguments))
    }

    /// `(name, body offset, body length)` for each entry of the attribute table at `offset`,
    /// along with the offset right after the table
    fn attributes(&self, offset: usize) -> Result<(Vec<(&str, usize, usize)>, usize), Error> {
        let count = self.read_u16(offset)?;
        let mut current = offset + 2;
        let mut attributes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = self.read_utf8(current)?;
            let length = self.read_u32(current + 2)? as usize;
            current += 6;
            self.slice(current, length)?;
            attributes.push((name, current, length));
            current += length;
        }
        Ok((attributes, current))
    }

    /// Offset right after a `fields` or `methods` table
    fn skip_members(&self, offset: usize) -> Result<usize, Error> {
        let count = self.read_u16(offset)?;
        let mut current = offset + 2;
        for _ in 0..count {
            let (_, end) = self.attributes(current + 6)?;
            current = end;
        }
        Ok(current)
    }

    fn first_field_offset(&self) -> Result<usize, Error> {
        Ok(self.header + 8 + 2 * self.read_u16(self.header + 6)? as usize)
    }

    fn class_attributes_offset(&self) -> Result<usize, Error> {
        let methods = self.skip_members(self.first_field_offset()?)?;
        self.skip_members(methods)
    }

    /// Interpret a non-standard attribute with a registered reader, or keep it as raw bytes
    fn read_attribute(
        &self,
        context: &Context<'_>,
        type_name: &str,
        offset: usize,
        length: usize,
        code_offset: Option<usize>,
    ) -> Result<Box<dyn Attribute>, Error> {
        if let Some(reader) = context
            .attribute_readers
            .iter()
            .find(|reader| reader.type_name() == type_name)
        {
            return reader.read(self, offset, length, code_offset);
        }
        Ok(Box::new(RawAttribute {
            type_name: type_name.to_string(),
            content: self.slice(offset, length)?.to_vec(),
            in_code: code_offset.is_some(),
        }))
    }

    /// Make the visitor visit the whole class
    pub fn accept(&self, visitor: &mut dyn ClassVisitor, options: ReaderOptions) -> Result<(), Error> {
        self.accept_with_attributes(visitor, &[], options)
    }

    /// Make the visitor visit the whole class, interpreting the non-standard attributes for
    /// which there is a matching reader
    pub fn accept_with_attributes(
        &self,
        visitor: &mut dyn ClassVisitor,
        attribute_readers: &[&dyn AttributeReader],
        options: ReaderOptions,
    ) -> Result<(), Error> {
        let name = self.class_name()?;
        let context = Context {
            options,
            attribute_readers,
            class_name: name,
        };

        let mut access = self.read_u16(self.header)? as u32;
        let super_name = self.super_name()?;
        let interfaces = self.interfaces()?;
        let fields_offset = self.first_field_offset()?;
        let methods_offset = self.skip_members(fields_offset)?;
        let (attributes, _) = self.attributes(self.skip_members(methods_offset)?)?;

        let mut signature = None;
        let mut source_file = None;
        let mut source_debug = None;
        let mut inner_classes = None;
        let mut enclosing_method = None;
        let mut nest_host = None;
        let mut nest_members = None;
        let mut permitted_subclasses = None;
        let mut record = None;
        let mut module = None;
        let mut module_main_class = None;
        let mut module_packages = None;
        let mut annotations = AnnotationAttributes::default();
        let mut custom = vec![];
        for (attribute, offset, length) in attributes {
            if annotations.record(attribute, offset) {
                continue;
            }
            match attribute {
                "SourceFile" => {
                    if !context.skip_debug() {
                        source_file = Some(self.read_utf8(offset)?);
                    }
                }
                "SourceDebugExtension" => {
                    if !context.skip_debug() {
                        let (debug, lossy) = decode_modified_utf8(self.slice(offset, length)?);
                        if lossy {
                            log::warn!("lossy decoding of the SourceDebugExtension of {}", name);
                        }
                        source_debug = Some(debug);
                    }
                }
                "InnerClasses" => inner_classes = Some(offset),
                "EnclosingMethod" => enclosing_method = Some(offset),
                "NestHost" => nest_host = Some(self.read_class(offset)?),
                "NestMembers" => nest_members = Some(offset),
                "PermittedSubclasses" => permitted_subclasses = Some(offset),
                "Signature" => signature = Some(self.read_utf8(offset)?),
                "Deprecated" => access |= ClassAccessFlags::DEPRECATED.bits(),
                "Synthetic" => access |= ClassAccessFlags::SYNTHETIC.bits(),
                "Record" => {
                    access |= ClassAccessFlags::RECORD.bits();
                    record = Some(offset);
                }
                "Module" => module = Some(offset),
                "ModuleMainClass" => module_main_class = Some(self.read_class(offset)?),
                "ModulePackages" => module_packages = Some(offset),
                "BootstrapMethods" => (),
                _ => custom.push(self.read_attribute(&context, attribute, offset, length, None)?),
            }
        }

        visitor.visit(
            self.version,
            ClassAccessFlags::from_bits_truncate(access),
            name,
            signature,
            super_name,
            &interfaces,
        )?;

        if source_file.is_some() || source_debug.is_some() {
            visitor.visit_source(source_file, source_debug.as_deref())?;
        }

        if let Some(offset) = module {
            self.read_module(visitor, offset, module_packages, module_main_class)?;
        }

        if let Some(nest_host) = nest_host {
            visitor.visit_nest_host(nest_host)?;
        }

        if let Some(offset) = enclosing_method {
            let owner = self.read_class(offset)?;
            let (method_name, method_descriptor) = match self.read_u16(offset + 2)? {
                0 => (None, None),
                _ => {
                    let (name, descriptor) = self.read_name_and_type(offset + 2)?;
                    (Some(name), Some(descriptor))
                }
            };
            visitor.visit_outer_class(owner, method_name, method_descriptor)?;
        }

        self.visit_annotations(&mut *visitor, &annotations)?;
        for attribute in custom {
            visitor.visit_attribute(attribute)?;
        }

        if let Some(offset) = nest_members {
            for class in self.read_class_list(offset)? {
                visitor.visit_nest_member(class)?;
            }
        }
        if let Some(offset) = permitted_subclasses {
            for class in self.read_class_list(offset)? {
                visitor.visit_permitted_subclass(class)?;
            }
        }

        if let Some(offset) = inner_classes {
            let count = self.read_u16(offset)?;
            let mut current = offset + 2;
            for _ in 0..count {
                visitor.visit_inner_class(
                    self.read_class(current)?,
                    self.read_optional_class(current + 2)?,
                    self.read_optional_utf8(current + 4)?,
                    InnerClassAccessFlags::from_bits_truncate(self.read_u16(current + 6)? as u32),
                )?;
                current += 8;
            }
        }

        if let Some(offset) = record {
            let count = self.read_u16(offset)?;
            let mut current = offset + 2;
            for _ in 0..count {
                current = self.read_record_component(visitor, &context, current)?;
            }
        }

        let mut current = fields_offset + 2;
        for _ in 0..self.read_u16(fields_offset)? {
            current = self.read_field(visitor, &context, current)?;
        }
        let mut current = methods_offset + 2;
        for _ in 0..self.read_u16(methods_offset)? {
            current = self.read_method(visitor, &context, current)?;
        }

        visitor.visit_end()
    }

    /// Classes of a `u16` counted list of class indices
    fn read_class_list(&self, offset: usize) -> Result<Vec<&str>, Error> {
        let count = self.read_u16(offset)? as usize;
        (0..count)
            .map(|i| self.read_class(offset + 2 + 2 * i))
            .collect()
    }

    fn read_module(
        &self,
        visitor: &mut dyn ClassVisitor,
        offset: usize,
        packages: Option<usize>,
        main_class: Option<&str>,
    ) -> Result<(), Error> {
        let name = self.read_named(offset, CONSTANT_MODULE_TAG)?;
        let access = ModuleAccessFlags::from_bits_truncate(self.read_u16(offset + 2)? as u32);
        let version = self.read_optional_utf8(offset + 4)?;
        let mut module = match visitor.visit_module(name, access, version) {
            Some(module) => module,
            None => return Ok(()),
        };

        if let Some(main_class) = main_class {
            module.visit_main_class(main_class)?;
        }
        if let Some(packages) = packages {
            let count = self.read_u16(packages)? as usize;
            for i in 0..count {
                module.visit_package(self.read_named(packages + 2 + 2 * i, CONSTANT_PACKAGE_TAG)?)?;
            }
        }

        let mut current = offset + 6;
        let requires = self.read_u16(current)?;
        current += 2;
        for _ in 0..requires {
            module.visit_require(
                self.read_named(current, CONSTANT_MODULE_TAG)?,
                ModuleAccessFlags::from_bits_truncate(self.read_u16(current + 2)? as u32),
                self.read_optional_utf8(current + 4)?,
            )?;
            current += 6;
        }

        for opens in [false, true] {
            let count = self.read_u16(current)?;
            current += 2;
            for _ in 0..count {
                let package = self.read_named(current, CONSTANT_PACKAGE_TAG)?;
                let access = ModuleAccessFlags::from_bits_truncate(self.read_u16(current + 2)? as u32);
                let module_count = self.read_u16(current + 4)? as usize;
                let modules = (0..module_count)
                    .map(|i| self.read_named(current + 6 + 2 * i, CONSTANT_MODULE_TAG))
                    .collect::<Result<Vec<_>, Error>>()?;
                current += 6 + 2 * module_count;
                if opens {
                    module.visit_open(package, access, &modules)?;
                } else {
                    module.visit_export(package, access, &modules)?;
                }
            }
        }

        let uses = self.read_class_list(current)?;
        current += 2 + 2 * uses.len();
        for service in uses {
            module.visit_use(service)?;
        }

        let provides = self.read_u16(current)?;
        current += 2;
        for _ in 0..provides {
            let service = self.read_class(current)?;
            let providers = self.read_class_list(current + 2)?;
            current += 4 + 2 * providers.len();
            module.visit_provide(service, &providers)?;
        }

        module.visit_end()
    }

    /// Read a `record_component_info` and return the offset right after it
    fn read_record_component(
        &self,
        visitor: &mut dyn ClassVisitor,
        context: &Context<'_>,
        offset: usize,
    ) -> Result<usize, Error> {
        let name = self.read_utf8(offset)?;
        let descriptor = self.read_utf8(offset + 2)?;
        let (attributes, end) = self.attributes(offset + 4)?;

        let mut signature = None;
        let mut annotations = AnnotationAttributes::default();
        let mut custom = vec![];
        for (attribute, offset, length) in attributes {
            if annotations.record(attribute, offset) {
                continue;
            }
            match attribute {
                "Signature" => signature = Some(self.read_utf8(offset)?),
                _ => custom.push(self.read_attribute(context, attribute, offset, length, None)?),
            }
        }

        let mut component = match visitor.visit_record_component(name, descriptor, signature) {
            Some(component) => component,
            None => return Ok(end),
        };
        self.visit_annotations(&mut *component, &annotations)?;
        for attribute in custom {
            component.visit_attribute(attribute)?;
        }
        component.visit_end()?;
        Ok(end)
    }

    /// Read a `field_info` and return the offset right after it
    fn read_field(
        &self,
        visitor: &mut dyn ClassVisitor,
        context: &Context<'_>,
        offset: usize,
    ) -> Result<usize, Error> {
        let mut access = self.read_u16(offset)? as u32;
        let name = self.read_utf8(offset + 2)?;
        let descriptor = self.read_utf8(offset + 4)?;
        let (attributes, end) = self.attributes(offset + 6)?;

        let mut signature = None;
        let mut value = None;
        let mut annotations = AnnotationAttributes::default();
        let mut custom = vec![];
        for (attribute, offset, length) in attributes {
            if annotations.record(attribute, offset) {
                continue;
            }
            match attribute {
                "ConstantValue" => match self.read_u16(offset)? {
                    0 => (),
                    index => value = Some(self.read_const(index)?),
                },
                "Signature" => signature = Some(self.read_utf8(offset)?),
                "Deprecated" => access |= FieldAccessFlags::DEPRECATED.bits(),
                "Synthetic" => access |= FieldAccessFlags::SYNTHETIC.bits(),
                _ => custom.push(self.read_attribute(context, attribute, offset, length, None)?),
            }
        }

        let access = FieldAccessFlags::from_bits_truncate(access);
        let mut field = match visitor.visit_field(access, name, descriptor, signature, value.as_ref())
        {
            Some(field) => field,
            None => return Ok(end),
        };
        self.visit_annotations(&mut *field, &annotations)?;
        for attribute in custom {
            field.visit_attribute(attribute)?;
        }
        field.visit_end()?;
        Ok(end)
    }

    /// Read a `method_info` and return the offset right after it
    fn read_method(
        &self,
        visitor: &mut dyn ClassVisitor,
        context: &Context<'_>,
        offset: usize,
    ) -> Result<usize, Error> {
        let mut access = self.read_u16(offset)? as u32;
        let name = self.read_utf8(offset + 2)?;
        let descriptor = self.read_utf8(offset + 4)?;
        let (attributes, end) = self.attributes(offset + 6)?;

        let mut code = None;
        let mut exceptions = vec![];
        let mut signature = None;
        let mut annotation_default = None;
        let mut parameters = None;
        let mut visible_parameter_annotations = None;
        let mut invisible_parameter_annotations = None;
        let mut annotations = AnnotationAttributes::default();
        let mut custom = vec![];
        for (attribute, offset, length) in attributes {
            if annotations.record(attribute, offset) {
                continue;
            }
            match attribute {
                "Code" => {
                    if !context.options.contains(ReaderOptions::SKIP_CODE) {
                        code = Some(offset);
                    }
                }
                "Exceptions" => exceptions = self.read_class_list(offset)?,
                "Signature" => signature = Some(self.read_utf8(offset)?),
                "Deprecated" => access |= MethodAccessFlags::DEPRECATED.bits(),
                "Synthetic" => access |= MethodAccessFlags::SYNTHETIC.bits(),
                "AnnotationDefault" => annotation_default = Some(offset),
                "MethodParameters" => parameters = Some(offset),
                "RuntimeVisibleParameterAnnotations" => visible_parameter_annotations = Some(offset),
                "RuntimeInvisibleParameterAnnotations" => {
                    invisible_parameter_annotations = Some(offset)
                }
                _ => custom.push(self.read_attribute(context, attribute, offset, length, None)?),
            }
        }

        log::trace!("reading method {}.{}{}", context.class_name, name, descriptor);
        let access = MethodAccessFlags::from_bits_truncate(access);
        let mut method = match visitor.visit_method(access, name, descriptor, signature, &exceptions) {
            Some(method) => method,
            None => return Ok(end),
        };

        if let Some(offset) = parameters {
            if !context.skip_debug() {
                let count = self.read_u8(offset)? as usize;
                for i in 0..count {
                    let entry = offset + 1 + 4 * i;
                    let flags = self.read_u16(entry + 2)? as u32;
                    method.visit_parameter(
                        self.read_optional_utf8(entry)?,
                        ParameterAccessFlags::from_bits_truncate(flags),
                    )?;
                }
            }
        }

        if let Some(offset) = annotation_default {
            let mut default = method.visit_annotation_default();
            self.read_element_value(default.as_deref_mut(), offset, None)?;
            if let Some(default) = default.as_deref_mut() {
                default.visit_end()?;
            }
        }

        self.visit_annotations(&mut *method, &annotations)?;
        if let Some(offset) = visible_parameter_annotations {
            self.read_parameter_annotations(&mut *method, offset, true)?;
        }
        if let Some(offset) = invisible_parameter_annotations {
            self.read_parameter_annotations(&mut *method, offset, false)?;
        }
        for attribute in custom {
            method.visit_attribute(attribute)?;
        }

        if let Some(offset) = code {
            method.visit_code()?;
            let info = code::MethodInfo {
                access,
                name,
                descriptor,
            };
            self.read_code(&mut *method, context, &info, offset)?;
        }
        method.visit_end()?;
        Ok(end)
    }
}

/// Bounds checked big-endian read
fn read_at<T>(bytes: &[u8], offset: usize, size: usize, read: impl Fn(&[u8]) -> T) -> Result<T, Error> {
    match offset.checked_add(size) {
        Some(end) if end <= bytes.len() => Ok(read(&bytes[offset..end])),
        _ => Err(Error::UnexpectedEof {
            offset: bytes.len(),
        }),
    }
}

/// Decode a `CONSTANT_Utf8` body, borrowing it when it is also valid UTF-8
///
/// Modified UTF-8 only differs from UTF-8 for `U+0000` (encoded as `C0 80`) and for
/// supplementary characters (encoded as surrogate pairs), neither of which is valid UTF-8.
fn decode_utf8(bytes: &[u8]) -> Cow<'_, str> {
    if let Ok(string) = std::str::from_utf8(bytes) {
        if !bytes.contains(&0) {
            return Cow::Borrowed(string);
        }
    }
    let (string, lossy) = decode_modified_utf8(bytes);
    if lossy {
        log::warn!("lossy decoding of string constant {:?}", string);
    }
    Cow::Owned(string)
}
